//! Address-family framing for the utun transport.
//!
//! The utun control socket prepends a 4-byte big-endian address family to
//! every packet in both directions. [`Framed`] strips it on read and derives
//! it from the IP version nibble on write, so callers only ever see bare IP
//! packets.

use std::io;
use std::sync::Mutex;

use crate::error::{Error, Result};
use crate::transport::Transport;

/// Length of the address-family prefix.
pub(crate) const PREFIX_LEN: usize = 4;

/// `AF_INET` as seen by the Darwin network stack.
pub(crate) const AF_INET: u32 = 2;

/// `AF_INET6` as seen by the Darwin network stack.
pub(crate) const AF_INET6: u32 = 30;

/// Map the version nibble of an IP packet to its address-family prefix.
pub(crate) fn family_prefix(packet: &[u8]) -> Result<[u8; PREFIX_LEN]> {
    let first = packet.first().ok_or(Error::EmptyPacket)?;
    let family = match first >> 4 {
        4 => AF_INET,
        6 => AF_INET6,
        version => return Err(Error::UnknownIpVersion(version)),
    };
    Ok(family.to_be_bytes())
}

/// Transport wrapper adding and removing the address-family prefix.
///
/// Scratch buffers are reused across calls. Each direction has its own, so
/// a reader and a writer never contend.
pub(crate) struct Framed<T> {
    inner: T,
    read_buf: Mutex<Vec<u8>>,
    write_buf: Mutex<Vec<u8>>,
}

impl<T: Transport> Framed<T> {
    pub(crate) fn new(inner: T) -> Self {
        Self {
            inner,
            read_buf: Mutex::new(Vec::new()),
            write_buf: Mutex::new(Vec::new()),
        }
    }
}

impl<T: Transport> Transport for Framed<T> {
    fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        let mut scratch = self.read_buf.lock().unwrap_or_else(|e| e.into_inner());
        scratch.resize(buf.len() + PREFIX_LEN, 0);

        let n = self.inner.read(&mut scratch)?;
        if n < PREFIX_LEN {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("packet of {n} bytes is shorter than its address-family prefix"),
            ));
        }

        let len = n - PREFIX_LEN;
        buf[..len].copy_from_slice(&scratch[PREFIX_LEN..n]);
        Ok(len)
    }

    fn write(&self, buf: &[u8]) -> io::Result<usize> {
        let prefix = family_prefix(buf).map_err(|e| e.into_io(io::ErrorKind::InvalidInput))?;

        let mut scratch = self.write_buf.lock().unwrap_or_else(|e| e.into_inner());
        scratch.clear();
        scratch.extend_from_slice(&prefix);
        scratch.extend_from_slice(buf);

        let n = self.inner.write(&scratch)?;
        Ok(n.saturating_sub(PREFIX_LEN))
    }

    fn close(&self) -> Result<()> {
        self.inner.close()
    }
}
