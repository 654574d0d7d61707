//! TUN/TAP through the tuntaposx kext (`/dev/tunN`, `/dev/tapN`).

use std::fs::OpenOptions;
use std::os::fd::{AsRawFd, OwnedFd};
use std::os::unix::fs::OpenOptionsExt;
use std::sync::Arc;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::interface::{DeviceOpener, Interface};
use crate::unix::{IfReq, IoctlMtu, PollFd, control_socket};

const SIOCGIFFLAGS: libc::c_ulong = 0xc020_6911;
const SIOCSIFFLAGS: libc::c_ulong = 0x8020_6910;

/// Opener for the tuntaposx character devices.
#[derive(Debug, Clone, Copy, Default)]
pub struct TunTapOsxOpener;

/// The device name, checked against the device type.
fn device_name(config: &Config) -> Result<&str> {
    let prefix = config.device_type.name();
    let name = config.platform.name.as_deref().unwrap_or_default();

    if !name.starts_with(prefix) {
        return Err(Error::invalid_name(
            name,
            format!("device name must start with {prefix} for a {prefix} device"),
        ));
    }
    if name.len() >= 15 {
        return Err(Error::NameTooLong {
            name: name.to_string(),
            len: name.len(),
        });
    }
    crate::name::validate(name)?;
    Ok(name)
}

impl DeviceOpener for TunTapOsxOpener {
    fn open(&self, config: &Config) -> Result<Interface> {
        let name = device_name(config)?;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(format!("/dev/{name}"))
            .map_err(|e| Error::syscall("open /dev/tun", e))?;
        let fd = OwnedFd::from(file);

        bring_up(name)?;

        tracing::debug!(name, device_type = %config.device_type, "opened tuntaposx device");
        Ok(Interface::from_transport(
            config.device_type,
            name,
            Arc::new(PollFd::new(fd)?),
            Arc::new(IoctlMtu),
        ))
    }
}

/// Set `IFF_UP | IFF_RUNNING` on `name`.
fn bring_up(name: &str) -> Result<()> {
    let sock = control_socket()?;
    let mut req = IfReq::new(name)?;
    req.ioctl(sock.as_raw_fd(), SIOCGIFFLAGS, "SIOCGIFFLAGS")?;
    req.set_flags(req.flags() | (libc::IFF_UP | libc::IFF_RUNNING) as i16);
    req.ioctl(sock.as_raw_fd(), SIOCSIFFLAGS, "SIOCSIFFLAGS")
}
