//! Transport and MTU seams.
//!
//! A [`Transport`] is the live kernel or driver object behind an
//! [`Interface`](crate::Interface): a file descriptor, a socket bridge, an
//! overlapped driver handle or a ring-buffer session. Each implementation
//! owns its OS resources exclusively.

use std::io;

use crate::error::Result;

/// Blocking packet transport.
///
/// One call moves exactly one packet or frame. Implementations keep separate
/// read-side and write-side locks so a reader and a writer never block each
/// other while two readers (or two writers) serialize.
pub trait Transport: Send + Sync {
    /// Read one packet into `buf`, blocking until one is available.
    fn read(&self, buf: &mut [u8]) -> io::Result<usize>;

    /// Write one packet.
    fn write(&self, buf: &[u8]) -> io::Result<usize>;

    /// Release every OS resource held by the transport.
    ///
    /// Must unblock a concurrent [`read`](Transport::read) promptly, must be
    /// idempotent, and must attempt every release step even when an earlier
    /// one fails.
    fn close(&self) -> Result<()>;
}

/// Post-creation MTU reconfiguration.
pub trait MtuControl: Send + Sync {
    /// Set the MTU of the interface named `name`.
    ///
    /// `secondary` is the peer interface of a bridged TAP pair, which must
    /// carry the same MTU.
    fn set_mtu(&self, name: &str, secondary: Option<&str>, mtu: u32) -> Result<()>;
}

impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        (**self).read(buf)
    }

    fn write(&self, buf: &[u8]) -> io::Result<usize> {
        (**self).write(buf)
    }

    fn close(&self) -> Result<()> {
        (**self).close()
    }
}
