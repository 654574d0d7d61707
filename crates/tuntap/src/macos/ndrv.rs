//! Raw frame injection through an `AF_NDRV` socket.

use std::io;
use std::os::fd::{AsRawFd, OwnedFd};

use zerocopy::{FromZeros, Immutable, IntoBytes, KnownLayout};

use crate::error::{Error, Result};
use crate::name::IFNAMSIZ;
use crate::unix::owned;

const AF_NDRV: libc::c_int = 27;

/// `struct sockaddr_ndrv`.
#[repr(C)]
#[derive(Debug, Clone, Copy, FromZeros, IntoBytes, Immutable, KnownLayout)]
struct SockaddrNdrv {
    snd_len: u8,
    snd_family: u8,
    snd_name: [u8; IFNAMSIZ],
}

impl SockaddrNdrv {
    fn new(interface: &str) -> Result<Self> {
        crate::name::validate(interface)?;
        let mut addr = Self::new_zeroed();
        addr.snd_len = size_of::<Self>() as u8;
        addr.snd_family = AF_NDRV as u8;
        addr.snd_name[..interface.len()].copy_from_slice(interface.as_bytes());
        Ok(addr)
    }

    fn as_sockaddr(&self) -> *const libc::sockaddr {
        (self as *const Self).cast()
    }
}

/// Open a raw socket bound and connected to `interface`.
///
/// Every write on the socket leaves `interface` as one Ethernet frame.
pub(super) fn open(interface: &str) -> Result<OwnedFd> {
    let addr = SockaddrNdrv::new(interface)?;
    let fd = owned(
        unsafe { libc::socket(AF_NDRV, libc::SOCK_RAW, 0) },
        "socket(AF_NDRV)",
    )?;

    let len = size_of::<SockaddrNdrv>() as libc::socklen_t;
    if unsafe { libc::bind(fd.as_raw_fd(), addr.as_sockaddr(), len) } < 0 {
        return Err(Error::syscall("bind(AF_NDRV)", io::Error::last_os_error()));
    }
    if unsafe { libc::connect(fd.as_raw_fd(), addr.as_sockaddr(), len) } < 0 {
        return Err(Error::syscall(
            "connect(AF_NDRV)",
            io::Error::last_os_error(),
        ));
    }
    Ok(fd)
}
