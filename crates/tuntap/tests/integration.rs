//! Integration test entry point.
//!
//! The actual tests are organized per platform in the `integration/`
//! directory.
//!
//! # Running Tests
//!
//! Integration tests create real interfaces and require root privileges:
//!
//! ```bash
//! # Run all integration tests
//! sudo cargo test --test integration
//!
//! # Run a single test
//! sudo cargo test --test integration test_tun_ping_observed
//!
//! # Run with driver logs
//! sudo RUST_LOG=tuntap=debug cargo test --test integration -- --nocapture
//! ```
//!
//! # Test Organization
//!
//! - `linux.rs` - `/dev/net/tun` TUN and TAP devices
//! - `macos.rs` - utun and feth-bridged TAP devices

#[macro_use]
#[path = "common/mod.rs"]
mod common;

#[cfg(target_os = "linux")]
#[path = "integration/linux.rs"]
mod linux;

#[cfg(target_os = "macos")]
#[path = "integration/macos.rs"]
mod macos;
