//! Tokio adapter for [`Interface`].

use std::io;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::interface::Interface;

/// An [`Interface`] whose blocking calls run on tokio's blocking pool.
///
/// Cloning is cheap; clones share the same interface, so one task can read
/// while another writes. [`close`](AsyncInterface::close) unblocks a pending
/// [`read`](AsyncInterface::read).
#[derive(Debug, Clone)]
pub struct AsyncInterface {
    inner: Arc<Interface>,
}

impl AsyncInterface {
    /// Wrap an opened interface.
    pub fn new(iface: Interface) -> Self {
        Self {
            inner: Arc::new(iface),
        }
    }

    /// Get the interface name.
    pub fn name(&self) -> &str {
        self.inner.name()
    }

    /// Get the wrapped interface.
    pub fn inner(&self) -> &Arc<Interface> {
        &self.inner
    }

    /// Read one packet of at most `max_len` bytes.
    pub async fn read(&self, max_len: usize) -> io::Result<Vec<u8>> {
        let iface = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let mut buf = vec![0u8; max_len];
            let n = iface.read(&mut buf)?;
            buf.truncate(n);
            Ok(buf)
        })
        .await
        .map_err(io::Error::other)?
    }

    /// Write one packet.
    pub async fn write(&self, packet: Vec<u8>) -> io::Result<usize> {
        let iface = self.inner.clone();
        tokio::task::spawn_blocking(move || iface.write(&packet))
            .await
            .map_err(io::Error::other)?
    }

    /// Set the interface MTU.
    pub async fn set_mtu(&self, mtu: u32) -> Result<()> {
        let iface = self.inner.clone();
        tokio::task::spawn_blocking(move || iface.set_mtu(mtu))
            .await
            .map_err(|e| Error::Io(io::Error::other(e)))?
    }

    /// Close the interface.
    pub async fn close(&self) -> Result<()> {
        let iface = self.inner.clone();
        tokio::task::spawn_blocking(move || iface.close())
            .await
            .map_err(|e| Error::Io(io::Error::other(e)))?
    }
}

impl From<Interface> for AsyncInterface {
    fn from(iface: Interface) -> Self {
        Self::new(iface)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeviceType;
    use crate::transport::{MtuControl, Transport};
    use std::sync::Mutex;
    use std::sync::mpsc::{Receiver, Sender, channel};

    /// A transport whose reads are fed through a channel.
    struct Channel {
        tx: Mutex<Sender<Option<Vec<u8>>>>,
        rx: Mutex<Receiver<Option<Vec<u8>>>>,
    }

    impl Channel {
        fn new() -> Self {
            let (tx, rx) = channel();
            Self {
                tx: Mutex::new(tx),
                rx: Mutex::new(rx),
            }
        }
    }

    impl Transport for Channel {
        fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
            match self.rx.lock().unwrap().recv() {
                Ok(Some(packet)) => {
                    buf[..packet.len()].copy_from_slice(&packet);
                    Ok(packet.len())
                }
                _ => Err(crate::error::closed()),
            }
        }

        fn write(&self, buf: &[u8]) -> io::Result<usize> {
            let _ = self.tx.lock().unwrap().send(Some(buf.to_vec()));
            Ok(buf.len())
        }

        fn close(&self) -> Result<()> {
            let _ = self.tx.lock().unwrap().send(None);
            Ok(())
        }
    }

    struct NoMtu;

    impl MtuControl for NoMtu {
        fn set_mtu(&self, _name: &str, _secondary: Option<&str>, _mtu: u32) -> Result<()> {
            Ok(())
        }
    }

    fn iface() -> AsyncInterface {
        Interface::from_transport(
            DeviceType::Tun,
            "tun9",
            Arc::new(Channel::new()),
            Arc::new(NoMtu),
        )
        .into()
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let iface = iface();
        assert_eq!(iface.name(), "tun9");
        assert_eq!(iface.write(vec![0x45, 0, 0, 20]).await.unwrap(), 4);
        assert_eq!(iface.read(1500).await.unwrap(), vec![0x45, 0, 0, 20]);
    }

    #[tokio::test]
    async fn test_close_unblocks_read() {
        let iface = iface();
        let reader = {
            let iface = iface.clone();
            tokio::spawn(async move { iface.read(1500).await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        iface.close().await.unwrap();

        let result = tokio::time::timeout(std::time::Duration::from_secs(3), reader)
            .await
            .expect("read still blocked after close")
            .unwrap();
        assert_eq!(result.unwrap_err().kind(), io::ErrorKind::NotConnected);
    }
}
