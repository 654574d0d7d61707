//! Windows openers: wintun for TUN, tap-windows6 for TAP.

mod registry;
mod ring;
mod tap;

use std::process::Command;

use crate::config::{Config, DeviceType, Driver};
use crate::error::{Error, Result};
use crate::interface::DeviceOpener;
use crate::transport::MtuControl;

pub use ring::WintunOpener;
pub use tap::TapWindowsOpener;

/// Select the opener for `config`.
pub(crate) fn opener(config: &Config) -> Result<Box<dyn DeviceOpener>> {
    match (config.platform.driver_for(config.device_type), config.device_type) {
        (Driver::Wintun, DeviceType::Tun) => Ok(Box::new(WintunOpener)),
        (Driver::TapWindows, DeviceType::Tap) => Ok(Box::new(TapWindowsOpener)),
        (Driver::Wintun, DeviceType::Tap) => Err(Error::InvalidConfig(
            "wintun only carries TUN packets".into(),
        )),
        (Driver::TapWindows, DeviceType::Tun) => Err(Error::InvalidConfig(
            "tap-windows is only used for TAP devices".into(),
        )),
    }
}

/// Interface MTU through `netsh`.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct NetshMtu;

impl MtuControl for NetshMtu {
    fn set_mtu(&self, name: &str, _secondary: Option<&str>, mtu: u32) -> Result<()> {
        netsh(&[
            "interface",
            "ipv4",
            "set",
            "subinterface",
            name,
            &format!("mtu={mtu}"),
            "store=active",
        ])
    }
}

fn netsh(args: &[&str]) -> Result<()> {
    let output = Command::new("netsh")
        .args(args)
        .output()
        .map_err(|e| Error::syscall("spawn netsh", e))?;

    if !output.status.success() {
        // netsh reports failures on stdout.
        let mut message = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if message.is_empty() {
            message = String::from_utf8_lossy(&output.stdout).trim().to_string();
        }
        return Err(Error::Command {
            command: format!("netsh {}", args.join(" ")),
            status: output.status.to_string(),
            stderr: message,
        });
    }
    tracing::debug!(args = ?args, "netsh");
    Ok(())
}

/// NUL-terminated UTF-16 for wide Win32 calls.
fn wide(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(std::iter::once(0)).collect()
}

/// Decode a UTF-16 buffer up to its first NUL.
fn from_wide(buf: &[u16]) -> String {
    let len = buf.iter().position(|&c| c == 0).unwrap_or(buf.len());
    String::from_utf16_lossy(&buf[..len])
}
