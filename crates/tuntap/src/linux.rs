//! Linux TUN/TAP through the `/dev/net/tun` clone device.

use std::fs::OpenOptions;
use std::io;
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::sync::Arc;

use crate::TUN_DEVICE_PATH;
use crate::config::{Config, DeviceType, PlatformConfig};
use crate::error::{Error, Result};
use crate::interface::{DeviceOpener, Interface};
use crate::unix::{IfReq, PollFd};

pub use crate::unix::IoctlMtu;

// TUN/TAP ioctl constants
const TUNSETIFF: libc::c_ulong = 0x400454ca;
const TUNSETPERSIST: libc::c_ulong = 0x400454cb;
const TUNSETOWNER: libc::c_ulong = 0x400454cc;
const TUNSETGROUP: libc::c_ulong = 0x400454ce;

// TUN/TAP flags (from linux/if_tun.h)
/// TUN device (Layer 3).
const IFF_TUN: i16 = 0x0001;
/// TAP device (Layer 2).
const IFF_TAP: i16 = 0x0002;
/// No protocol information.
const IFF_NO_PI: i16 = 0x1000;
/// Multi-queue support.
const IFF_MULTI_QUEUE: i16 = 0x0100;

/// Compute the `TUNSETIFF` flags for a configuration.
///
/// `IFF_NO_PI` is always set: packets never carry the 4-byte protocol
/// information header.
fn ifr_flags(device_type: DeviceType, platform: &PlatformConfig) -> i16 {
    let mut flags = match device_type {
        DeviceType::Tun => IFF_TUN,
        DeviceType::Tap => IFF_TAP,
    };
    flags |= IFF_NO_PI;
    if platform.multi_queue {
        flags |= IFF_MULTI_QUEUE;
    }
    flags
}

/// Opener for `/dev/net/tun`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TunTapOpener;

impl DeviceOpener for TunTapOpener {
    fn open(&self, config: &Config) -> Result<Interface> {
        let platform = &config.platform;

        let mut req = match platform.name.as_deref() {
            Some(name) if !name.is_empty() => IfReq::new(name)?,
            _ => IfReq::unnamed(),
        };
        req.set_flags(ifr_flags(config.device_type, platform));

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(TUN_DEVICE_PATH)
            .map_err(|e| Error::syscall("open /dev/net/tun", e))?;
        let fd = OwnedFd::from(file);

        // Dropping `fd` on error closes it.
        configure(fd.as_raw_fd(), &mut req, platform)?;

        let name = req.name();
        let transport = Arc::new(PollFd::new(fd)?);

        tracing::debug!(
            name = %name,
            device_type = %config.device_type,
            multi_queue = platform.multi_queue,
            persist = platform.persist,
            "created tun/tap device"
        );

        Ok(Interface::from_transport(
            config.device_type,
            name,
            transport,
            Arc::new(IoctlMtu),
        ))
    }
}

fn configure(fd: RawFd, req: &mut IfReq, platform: &PlatformConfig) -> Result<()> {
    req.ioctl(fd, TUNSETIFF, "TUNSETIFF")?;

    if let Some(perms) = platform.permissions {
        ioctl_value(fd, TUNSETOWNER, perms.owner.into(), "TUNSETOWNER")?;
        ioctl_value(fd, TUNSETGROUP, perms.group.into(), "TUNSETGROUP")?;
    }

    // Always issued, so reopening a stale persistent device clears the flag
    // unless persistence was requested again.
    ioctl_value(fd, TUNSETPERSIST, platform.persist.into(), "TUNSETPERSIST")?;
    Ok(())
}

fn ioctl_value(
    fd: RawFd,
    request: libc::c_ulong,
    value: libc::c_ulong,
    what: &'static str,
) -> Result<()> {
    let ret = unsafe { libc::ioctl(fd, request as _, value) };
    if ret < 0 {
        return Err(Error::ioctl(what, io::Error::last_os_error()));
    }
    Ok(())
}

/// Select the opener for `config`.
pub(crate) fn opener(_config: &Config) -> Result<Box<dyn DeviceOpener>> {
    Ok(Box::new(TunTapOpener))
}
