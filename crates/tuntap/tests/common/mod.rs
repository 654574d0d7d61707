//! Common test utilities for integration tests.
//!
//! Helpers to run the system's network configuration commands and a macro
//! that skips tests when not running as root.

#![allow(dead_code)]

use std::process::Command;
use std::sync::Once;
use std::sync::atomic::{AtomicU32, Ordering};

use tuntap::{Error, Result};

/// Global counter for unique subnets.
static SUBNET_COUNTER: AtomicU32 = AtomicU32::new(0);

/// A private /24 not shared with any other test in this process.
///
/// Returns the third octet of `10.213.X.0/24`.
pub fn unique_subnet() -> u8 {
    let id = SUBNET_COUNTER.fetch_add(1, Ordering::SeqCst);
    (10 + id % 200) as u8
}

/// Install a tracing subscriber once, filtered by `RUST_LOG`.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::from_default_env()
                    .add_directive(tracing::Level::WARN.into()),
            )
            .with_test_writer()
            .try_init();
    });
}

/// Run a command and return its standard output.
pub fn exec(cmd: &str, args: &[&str]) -> Result<String> {
    let output = Command::new(cmd).args(args).output()?;

    if !output.status.success() {
        return Err(Error::Command {
            command: format!("{} {}", cmd, args.join(" ")),
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Run a command, ignoring errors.
pub fn exec_ignore(cmd: &str, args: &[&str]) {
    let _ = Command::new(cmd).args(args).output();
}

/// Check if running as root.
#[cfg(unix)]
pub fn is_root() -> bool {
    unsafe { libc::geteuid() == 0 }
}

#[cfg(not(unix))]
pub fn is_root() -> bool {
    false
}

/// Skip the test if not running as root.
///
/// Use this at the beginning of integration tests that require root privileges.
#[macro_export]
macro_rules! require_root {
    () => {
        if !crate::common::is_root() {
            eprintln!("Skipping test: requires root");
            return Ok(());
        }
        crate::common::init_tracing();
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_subnet() {
        assert_ne!(unique_subnet(), unique_subnet());
    }
}
