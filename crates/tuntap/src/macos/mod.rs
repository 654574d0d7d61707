//! macOS openers.
//!
//! - [`UtunOpener`]: TUN over the utun kernel control socket.
//! - [`FethOpener`]: TAP over a peered `feth` pair, with BPF capture for
//!   reads and an NDRV socket for writes.
//! - [`TunTapOsxOpener`]: TUN or TAP through the tuntaposx kext.

mod bpf;
mod feth;
mod ndrv;
mod sysctl;
mod tuntaposx;
mod utun;

pub use feth::FethOpener;
pub use tuntaposx::TunTapOsxOpener;
pub use utun::UtunOpener;

use std::process::Command;

use crate::config::{Config, DeviceType, Driver};
use crate::error::{Error, Result};
use crate::interface::DeviceOpener;

/// Select the opener for `config`.
pub(crate) fn opener(config: &Config) -> Result<Box<dyn DeviceOpener>> {
    Ok(match (config.platform.driver, config.device_type) {
        (Driver::TunTapOsx, _) => Box::new(TunTapOsxOpener),
        (Driver::System, DeviceType::Tun) => Box::new(UtunOpener),
        (Driver::System, DeviceType::Tap) => Box::new(FethOpener::new()),
    })
}

/// Run `ifconfig` with `args`, failing on a non-zero exit.
pub(crate) fn ifconfig(args: &[&str]) -> Result<()> {
    let output = Command::new("ifconfig")
        .args(args)
        .output()
        .map_err(|e| Error::syscall("ifconfig", e))?;

    if !output.status.success() {
        return Err(Error::Command {
            command: format!("ifconfig {}", args.join(" ")),
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(())
}
