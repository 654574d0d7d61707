//! Targets without a TUN/TAP opener.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::interface::{DeviceOpener, Interface};

/// Opener that always fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnsupportedOpener;

impl DeviceOpener for UnsupportedOpener {
    fn open(&self, _config: &Config) -> Result<Interface> {
        Err(Error::Unsupported("TUN/TAP is not available on this platform"))
    }
}

/// Select the opener for `config`.
pub(crate) fn opener(_config: &Config) -> Result<Box<dyn DeviceOpener>> {
    Ok(Box::new(UnsupportedOpener))
}
