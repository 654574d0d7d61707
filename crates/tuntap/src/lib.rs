//! Cross-platform TUN/TAP interface library.
//!
//! This crate creates virtual point-to-point (TUN) and Ethernet-like (TAP)
//! network interfaces on Linux, macOS and Windows, and exposes them through a
//! single blocking handle, [`Interface`].
//!
//! # Overview
//!
//! TUN devices operate at Layer 3 (IP packets) and TAP devices operate at
//! Layer 2 (Ethernet frames). Each platform backs them differently:
//!
//! | Platform | TUN | TAP |
//! |----------|-----|-----|
//! | Linux | `/dev/net/tun` | `/dev/net/tun` |
//! | macOS | utun kernel control socket | peered `feth` pair + BPF/NDRV bridge |
//! | macOS (tuntaposx) | `/dev/tunN` | `/dev/tapN` |
//! | Windows | wintun ring buffer | tap-windows6 driver |
//!
//! Whatever the backing, one [`read`](Interface::read) returns exactly one
//! packet or frame and one [`write`](Interface::write) sends exactly one.
//!
//! # Example
//!
//! ```ignore
//! use tuntap::{DeviceType, Interface};
//!
//! let iface = Interface::builder()
//!     .device_type(DeviceType::Tun)
//!     .create()?;
//!
//! println!("Created device: {}", iface.name());
//!
//! let mut buf = [0u8; 1500];
//! let n = iface.read(&mut buf)?;
//! iface.write(&buf[..n])?;
//! ```
//!
//! # Concurrency
//!
//! All handle methods take `&self`. Share the handle behind an `Arc`, read on
//! one thread and write on another; same-direction calls serialize. Calling
//! [`close`](Interface::close) unblocks a pending read.
//!
//! # Async Support
//!
//! Enable the `async` feature to get [`AsyncInterface`], which runs the
//! blocking calls on tokio's blocking pool:
//!
//! ```ignore
//! use tuntap::{AsyncInterface, Interface};
//!
//! let iface = AsyncInterface::new(Interface::builder().create()?);
//! let packet = iface.read(1500).await?;
//! iface.write(packet).await?;
//! ```

mod config;
mod error;
mod interface;
mod name;
mod transport;
mod vector;

#[cfg(any(target_os = "macos", test))]
mod capture;
#[cfg(any(target_os = "macos", test))]
mod framing;
#[cfg(any(windows, test))]
mod leftover;
#[cfg(any(target_os = "macos", test))]
mod mtu;
#[cfg(any(target_os = "macos", test))]
mod teardown;

#[cfg(any(target_os = "linux", target_os = "macos"))]
mod unix;

#[cfg(target_os = "linux")]
mod linux;
#[cfg(target_os = "linux")]
use linux as platform;

#[cfg(target_os = "macos")]
mod macos;
#[cfg(target_os = "macos")]
use macos as platform;

#[cfg(windows)]
mod windows;
#[cfg(windows)]
use windows as platform;

#[cfg(not(any(target_os = "linux", target_os = "macos", windows)))]
mod unsupported;
#[cfg(not(any(target_os = "linux", target_os = "macos", windows)))]
use unsupported as platform;

#[cfg(feature = "async")]
mod async_io;

pub use config::{Config, DeviceType, InterfaceBuilder, PlatformConfig};
pub use error::{Error, Result};
pub use interface::{DeviceOpener, Interface};
pub use name::IFNAMSIZ;
pub use transport::{MtuControl, Transport};
pub use vector::{ScalarVector, VectorError, VectorIo};

#[cfg(target_os = "linux")]
pub use config::Permissions;
#[cfg(target_os = "linux")]
pub use linux::{IoctlMtu, TunTapOpener};

#[cfg(target_os = "macos")]
pub use config::Driver;
#[cfg(target_os = "macos")]
pub use macos::{FethOpener, TunTapOsxOpener, UtunOpener};

#[cfg(windows)]
pub use config::{
    DEFAULT_RING_CAPACITY, DEFAULT_TAP_COMPONENT_ID, DEFAULT_WINTUN_NAME,
    DEFAULT_WINTUN_TUNNEL_TYPE, Driver,
};
#[cfg(windows)]
pub use windows::{TapWindowsOpener, WintunOpener};

#[cfg(feature = "async")]
pub use async_io::AsyncInterface;

/// The path to the Linux TUN clone device.
#[cfg(target_os = "linux")]
pub const TUN_DEVICE_PATH: &str = "/dev/net/tun";
