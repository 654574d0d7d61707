//! Shared Unix plumbing: descriptors, `ifreq` ioctls and system databases.

mod fd;

pub(crate) use fd::{PollFd, owned};

#[cfg(any(target_os = "macos", test))]
use std::ffi::CStr;
#[cfg(any(target_os = "linux", test))]
use std::ffi::CString;
use std::io;
use std::os::fd::{AsRawFd, OwnedFd, RawFd};

use zerocopy::{FromBytes, FromZeros, Immutable, IntoBytes, KnownLayout};

use crate::error::{Error, Result};
use crate::name::IFNAMSIZ;
use crate::transport::MtuControl;

#[cfg(target_os = "linux")]
const SIOCSIFMTU: libc::c_ulong = 0x8922;
#[cfg(target_os = "macos")]
const SIOCSIFMTU: libc::c_ulong = 0x8020_6934;

/// `struct ifreq`, sized for the largest member of the union on either
/// platform.
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub(crate) struct IfReq {
    name: [u8; IFNAMSIZ],
    data: [u8; 24],
}

impl IfReq {
    /// Create a request addressed to `name`.
    pub(crate) fn new(name: &str) -> Result<Self> {
        crate::name::validate(name)?;
        let mut req = Self::new_zeroed();
        req.name[..name.len()].copy_from_slice(name.as_bytes());
        Ok(req)
    }

    /// An unnamed request; the kernel fills the name in.
    #[cfg(any(target_os = "linux", test))]
    pub(crate) fn unnamed() -> Self {
        Self::new_zeroed()
    }

    /// The interface name, trimmed of padding.
    #[cfg(any(target_os = "linux", test))]
    pub(crate) fn name(&self) -> String {
        let len = self
            .name
            .iter()
            .position(|&c| c == 0)
            .unwrap_or(self.name.len());
        String::from_utf8_lossy(&self.name[..len]).into_owned()
    }

    /// `ifr_flags`.
    #[cfg(any(target_os = "macos", test))]
    pub(crate) fn flags(&self) -> i16 {
        i16::from_ne_bytes([self.data[0], self.data[1]])
    }

    pub(crate) fn set_flags(&mut self, flags: i16) {
        self.data[..2].copy_from_slice(&flags.to_ne_bytes());
    }

    /// `ifr_mtu` (an `int` in the same union slot).
    pub(crate) fn set_mtu(&mut self, mtu: i32) {
        self.data[..4].copy_from_slice(&mtu.to_ne_bytes());
    }

    /// Issue `request` on `fd` with this structure as argument.
    pub(crate) fn ioctl(
        &mut self,
        fd: RawFd,
        request: libc::c_ulong,
        what: &'static str,
    ) -> Result<()> {
        let ret = unsafe { libc::ioctl(fd, request as _, self as *mut Self) };
        if ret < 0 {
            return Err(Error::ioctl(what, io::Error::last_os_error()));
        }
        Ok(())
    }
}

/// Open a throwaway `AF_INET` datagram socket for interface ioctls.
pub(crate) fn control_socket() -> Result<OwnedFd> {
    owned(
        unsafe { libc::socket(libc::AF_INET, libc::SOCK_DGRAM, 0) },
        "socket",
    )
}

/// MTU through `SIOCSIFMTU` on an `AF_INET` socket.
///
/// The secondary interface of a bridged pair, if any, is set after the
/// primary.
#[derive(Debug, Clone, Copy, Default)]
pub struct IoctlMtu;

impl IoctlMtu {
    pub(crate) fn set_one(name: &str, mtu: u32) -> Result<()> {
        let mtu = i32::try_from(mtu)
            .map_err(|_| Error::InvalidConfig(format!("MTU {mtu} out of range")))?;
        let sock = control_socket()?;
        let mut req = IfReq::new(name)?;
        req.set_mtu(mtu);
        req.ioctl(sock.as_raw_fd(), SIOCSIFMTU, "SIOCSIFMTU")?;
        tracing::debug!(interface = name, mtu, "set MTU");
        Ok(())
    }
}

impl MtuControl for IoctlMtu {
    fn set_mtu(&self, name: &str, secondary: Option<&str>, mtu: u32) -> Result<()> {
        Self::set_one(name, mtu)?;
        if let Some(secondary) = secondary {
            Self::set_one(secondary, mtu)?;
        }
        Ok(())
    }
}

/// Names of every interface known to the kernel, without duplicates.
#[cfg(any(target_os = "macos", test))]
pub(crate) fn list_interface_names() -> Result<Vec<String>> {
    let mut head: *mut libc::ifaddrs = std::ptr::null_mut();
    if unsafe { libc::getifaddrs(&mut head) } < 0 {
        return Err(Error::syscall("getifaddrs", io::Error::last_os_error()));
    }

    let mut names: Vec<String> = Vec::new();
    let mut cur = head;
    while !cur.is_null() {
        let entry = unsafe { &*cur };
        if !entry.ifa_name.is_null() {
            let name = unsafe { CStr::from_ptr(entry.ifa_name) }
                .to_string_lossy()
                .into_owned();
            if !names.contains(&name) {
                names.push(name);
            }
        }
        cur = entry.ifa_next;
    }

    unsafe { libc::freeifaddrs(head) };
    Ok(names)
}

/// Look up a user by name and return the UID.
#[cfg(any(target_os = "linux", test))]
pub(crate) fn lookup_user(name: &str) -> Result<u32> {
    let name_cstr =
        CString::new(name).map_err(|_| Error::invalid_name(name, "contains a NUL byte"))?;

    unsafe {
        let pwd = libc::getpwnam(name_cstr.as_ptr());
        if pwd.is_null() {
            return Err(Error::UserNotFound(name.to_string()));
        }
        Ok((*pwd).pw_uid)
    }
}

/// Look up a group by name and return the GID.
#[cfg(any(target_os = "linux", test))]
pub(crate) fn lookup_group(name: &str) -> Result<u32> {
    let name_cstr =
        CString::new(name).map_err(|_| Error::invalid_name(name, "contains a NUL byte"))?;

    unsafe {
        let grp = libc::getgrnam(name_cstr.as_ptr());
        if grp.is_null() {
            return Err(Error::GroupNotFound(name.to_string()));
        }
        Ok((*grp).gr_gid)
    }
}
