//! The platform-independent interface handle.

use std::fmt;
use std::io;
use std::sync::Arc;

use crate::config::{Config, DeviceType, InterfaceBuilder};
use crate::error::{Error, Result};
use crate::transport::{MtuControl, Transport};
use crate::vector::{ScalarVector, VectorError, VectorIo};

/// Turns a [`Config`] into a live [`Interface`].
///
/// Each platform provides one implementation per driver variant;
/// [`Interface::new`] picks the right one for the target and configuration.
pub trait DeviceOpener {
    /// Validate `config`, acquire the kernel or driver resources and wrap them.
    ///
    /// On failure, everything acquired so far has been released.
    fn open(&self, config: &Config) -> Result<Interface>;
}

/// A TUN/TAP interface.
///
/// All methods take `&self`: share the handle behind an [`Arc`] to read on one
/// thread and write on another. [`close`](Interface::close) may be called
/// while a [`read`](Interface::read) is blocked; the read then fails promptly.
///
/// With multi-queue enabled (Linux), open several interfaces with the same
/// name to send and receive packets in parallel.
pub struct Interface {
    device_type: DeviceType,
    name: String,
    secondary_name: Option<String>,
    transport: Arc<dyn Transport>,
    vector: Arc<dyn VectorIo>,
    mtu: Arc<dyn MtuControl>,
}

impl Interface {
    /// Create a new interface using `config`.
    pub fn new(config: Config) -> Result<Self> {
        let opener = crate::platform::opener(&config)?;
        Self::open_with(opener.as_ref(), config)
    }

    /// Create a new interface through a specific opener.
    pub fn open_with(opener: &dyn DeviceOpener, config: Config) -> Result<Self> {
        let iface = opener.open(&config)?;
        if iface.name.is_empty() {
            // Dropping `iface` closes the transport.
            return Err(Error::InterfaceNameNotFound);
        }
        tracing::debug!(
            name = %iface.name,
            secondary = ?iface.secondary_name,
            device_type = %iface.device_type,
            vector_native = iface.vector.is_vector_native(),
            "opened interface"
        );
        Ok(iface)
    }

    /// Create a new builder.
    pub fn builder() -> InterfaceBuilder {
        InterfaceBuilder::new()
    }

    /// Assemble an interface from an opened transport.
    ///
    /// The scalar vector fallback is installed; use
    /// [`with_vector`](Interface::with_vector) for transports with a native
    /// batched path.
    pub fn from_transport(
        device_type: DeviceType,
        name: impl Into<String>,
        transport: Arc<dyn Transport>,
        mtu: Arc<dyn MtuControl>,
    ) -> Self {
        Self {
            device_type,
            name: name.into(),
            secondary_name: None,
            vector: Arc::new(ScalarVector::new(transport.clone())),
            transport,
            mtu,
        }
    }

    /// Replace the vector implementation.
    pub fn with_vector(mut self, vector: Arc<dyn VectorIo>) -> Self {
        self.vector = vector;
        self
    }

    /// Record the peer interface of a bridged pair.
    pub fn with_secondary_name(mut self, name: impl Into<String>) -> Self {
        self.secondary_name = Some(name.into());
        self
    }

    /// Get the interface name (tun0, utun3, feth0, ...).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the peer interface name of a bridged TAP pair (macOS feth).
    pub fn secondary_name(&self) -> Option<&str> {
        self.secondary_name.as_deref()
    }

    /// Get the device type.
    pub fn device_type(&self) -> DeviceType {
        self.device_type
    }

    /// Check if this is a TUN interface.
    pub fn is_tun(&self) -> bool {
        self.device_type == DeviceType::Tun
    }

    /// Check if this is a TAP interface.
    pub fn is_tap(&self) -> bool {
        self.device_type == DeviceType::Tap
    }

    /// Read one packet (TUN) or frame (TAP), blocking until one arrives.
    pub fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        self.transport.read(buf)
    }

    /// Write one packet (TUN) or frame (TAP).
    pub fn write(&self, buf: &[u8]) -> io::Result<usize> {
        self.transport.write(buf)
    }

    /// Read several packets in one call.
    pub fn read_vector(
        &self,
        bufs: &mut [&mut [u8]],
        sizes: &mut [usize],
    ) -> std::result::Result<usize, VectorError> {
        self.vector.read_vector(bufs, sizes)
    }

    /// Write several packets in one call.
    pub fn write_vector(&self, bufs: &[&[u8]]) -> std::result::Result<usize, VectorError> {
        self.vector.write_vector(bufs)
    }

    /// Check if vector I/O saves driver calls on this interface.
    pub fn is_vector_native(&self) -> bool {
        self.vector.is_vector_native()
    }

    /// Set the MTU.
    pub fn set_mtu(&self, mtu: u32) -> Result<()> {
        self.mtu
            .set_mtu(&self.name, self.secondary_name.as_deref(), mtu)
    }

    /// Close the interface and release every kernel/driver resource.
    ///
    /// Closing twice is a no-op.
    pub fn close(&self) -> Result<()> {
        tracing::debug!(name = %self.name, "closing interface");
        self.transport.close()
    }
}

impl Drop for Interface {
    fn drop(&mut self) {
        if let Err(e) = self.transport.close() {
            tracing::warn!(name = %self.name, error = %e, "failed to close interface");
        }
    }
}

impl fmt::Debug for Interface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interface")
            .field("device_type", &self.device_type)
            .field("name", &self.name)
            .field("secondary_name", &self.secondary_name)
            .field("vector_native", &self.vector.is_vector_native())
            .finish_non_exhaustive()
    }
}

impl io::Read for &Interface {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Interface::read(self, buf)
    }
}

impl io::Write for &Interface {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Interface::write(self, buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Loopback {
        queue: Mutex<Vec<Vec<u8>>>,
        closes: AtomicUsize,
    }

    impl Transport for Loopback {
        fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
            let packet = self
                .queue
                .lock()
                .unwrap()
                .pop()
                .ok_or_else(|| io::Error::from(io::ErrorKind::WouldBlock))?;
            buf[..packet.len()].copy_from_slice(&packet);
            Ok(packet.len())
        }

        fn write(&self, buf: &[u8]) -> io::Result<usize> {
            self.queue.lock().unwrap().push(buf.to_vec());
            Ok(buf.len())
        }

        fn close(&self) -> Result<()> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordMtu(Mutex<Vec<(String, Option<String>, u32)>>);

    impl MtuControl for RecordMtu {
        fn set_mtu(&self, name: &str, secondary: Option<&str>, mtu: u32) -> Result<()> {
            self.0
                .lock()
                .unwrap()
                .push((name.to_string(), secondary.map(str::to_string), mtu));
            Ok(())
        }
    }

    struct FixedOpener {
        name: &'static str,
        transport: Arc<Loopback>,
    }

    impl DeviceOpener for FixedOpener {
        fn open(&self, config: &Config) -> Result<Interface> {
            Ok(Interface::from_transport(
                config.device_type,
                self.name,
                self.transport.clone(),
                Arc::new(RecordMtu::default()),
            ))
        }
    }

    #[test]
    fn test_open_with_reports_type_and_name() {
        let opener = FixedOpener {
            name: "tap9",
            transport: Arc::new(Loopback::default()),
        };
        let iface = Interface::open_with(&opener, Config::new(DeviceType::Tap)).unwrap();
        assert!(iface.is_tap());
        assert!(!iface.is_tun());
        assert_eq!(iface.name(), "tap9");
        assert_eq!(iface.secondary_name(), None);
        assert!(!iface.is_vector_native());
    }

    #[test]
    fn test_open_with_rejects_empty_name() {
        let transport = Arc::new(Loopback::default());
        let opener = FixedOpener {
            name: "",
            transport: transport.clone(),
        };
        let err = Interface::open_with(&opener, Config::default()).unwrap_err();
        assert!(matches!(err, Error::InterfaceNameNotFound));
        assert_eq!(transport.closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_read_write_through_transport() {
        let transport = Arc::new(Loopback::default());
        let iface = Interface::from_transport(
            DeviceType::Tun,
            "tun0",
            transport,
            Arc::new(RecordMtu::default()),
        );

        assert_eq!(iface.write(&[0x45, 0, 0, 20]).unwrap(), 4);
        let mut buf = [0u8; 64];
        let n = iface.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], &[0x45, 0, 0, 20]);

        let mut writer = &iface;
        io::Write::write_all(&mut writer, &[0x60, 0]).unwrap();
        let mut reader = &iface;
        let n = io::Read::read(&mut reader, &mut buf).unwrap();
        assert_eq!(n, 2);
    }

    #[test]
    fn test_vector_fallback_installed() {
        let iface = Interface::from_transport(
            DeviceType::Tun,
            "tun0",
            Arc::new(Loopback::default()),
            Arc::new(RecordMtu::default()),
        );
        let bufs: [&[u8]; 2] = [b"ab", b"cde"];
        assert_eq!(iface.write_vector(&bufs).unwrap(), 2);

        let mut a = [0u8; 8];
        let mut b = [0u8; 8];
        let mut sizes = [0usize; 2];
        let mut out: [&mut [u8]; 2] = [&mut a, &mut b];
        assert_eq!(iface.read_vector(&mut out, &mut sizes).unwrap(), 2);
        assert_eq!(sizes, [3, 2]);
    }

    #[test]
    fn test_set_mtu_passes_secondary_name() {
        let mtu = Arc::new(RecordMtu::default());
        let iface = Interface::from_transport(
            DeviceType::Tap,
            "feth0",
            Arc::new(Loopback::default()),
            mtu.clone(),
        )
        .with_secondary_name("feth1");

        iface.set_mtu(9000).unwrap();
        let calls = mtu.0.lock().unwrap();
        assert_eq!(
            calls[0],
            ("feth0".to_string(), Some("feth1".to_string()), 9000)
        );
    }

    #[test]
    fn test_close_then_drop() {
        let transport = Arc::new(Loopback::default());
        {
            let iface = Interface::from_transport(
                DeviceType::Tun,
                "tun0",
                transport.clone(),
                Arc::new(RecordMtu::default()),
            );
            iface.close().unwrap();
        }
        assert_eq!(transport.closes.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_interface_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Interface>();
    }
}
