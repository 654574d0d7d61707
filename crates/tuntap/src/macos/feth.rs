//! TAP over a peered `feth` pair.
//!
//! The first interface is the one the host sees. Its peer carries our end:
//! frames written to an NDRV socket bound to the peer come out of the first
//! interface, and a BPF capture on the peer reads what the host sends.

use std::io;
use std::sync::{Arc, Mutex};

use super::bpf::BpfCapture;
use super::sysctl::{SysctlCeiling, shared_ceiling};
use super::{ifconfig, ndrv};
use crate::config::{Config, DeviceType};
use crate::error::{Error, Result};
use crate::interface::{DeviceOpener, Interface};
use crate::mtu::MtuCeiling;
use crate::name::{lowest_free, parse_optional_unit};
use crate::teardown::Teardown;
use crate::transport::{MtuControl, Transport};
use crate::unix::{IoctlMtu, PollFd, list_interface_names};

const PREFIX: &str = "feth";

/// Opener for bridged TAP devices.
pub struct FethOpener {
    ceiling: Arc<MtuCeiling<SysctlCeiling>>,
}

impl FethOpener {
    /// Create an opener sharing the process-wide MTU ceiling.
    pub fn new() -> Self {
        Self {
            ceiling: shared_ceiling(),
        }
    }
}

impl Default for FethOpener {
    fn default() -> Self {
        Self::new()
    }
}

/// The requested primary and injector names, checked before anything is
/// created.
fn requested_names(config: &Config) -> Result<(Option<String>, Option<String>)> {
    let name = config.platform.name.as_deref().filter(|n| !n.is_empty());
    let injector = config
        .platform
        .tap_injector_name
        .as_deref()
        .filter(|n| !n.is_empty());

    parse_optional_unit(name, PREFIX)?;
    parse_optional_unit(injector, PREFIX)?;

    if let (Some(a), Some(b)) = (name, injector)
        && a == b
    {
        return Err(Error::NameConflict(format!(
            "interface name and injector name are both {a}"
        )));
    }
    Ok((name.map(str::to_string), injector.map(str::to_string)))
}

/// Pick the lowest free `fethN`, skipping `reserved`.
fn free_name(reserved: Option<&str>) -> Result<String> {
    let existing = list_interface_names()?;
    Ok(lowest_free(
        PREFIX,
        existing.iter().map(String::as_str).chain(reserved),
    ))
}

fn create_interface(name: &str, teardown: &mut Teardown) -> Result<()> {
    ifconfig(&[name, "create"])?;
    teardown.push_interface(name);
    tracing::debug!(interface = name, "created feth interface");
    Ok(())
}

fn destroy_interface(name: &str) -> Result<()> {
    ifconfig(&[name, "destroy"])
}

struct Bridge {
    name: String,
    injector: String,
    capture: Arc<BpfCapture>,
    inject: Arc<PollFd>,
}

/// Acquire every resource, registering each with `teardown` as it lands.
fn build(
    name: Option<String>,
    injector: Option<String>,
    teardown: &mut Teardown,
) -> Result<Bridge> {
    let name = match name {
        Some(name) => name,
        None => free_name(injector.as_deref())?,
    };
    create_interface(&name, teardown)?;

    let injector = match injector {
        Some(injector) => injector,
        None => free_name(Some(name.as_str()))?,
    };
    create_interface(&injector, teardown)?;

    ifconfig(&[name.as_str(), "peer", injector.as_str()])?;

    let inject = Arc::new(PollFd::new(ndrv::open(&injector)?)?);
    {
        let inject = inject.clone();
        teardown.push_closer("close ndrv socket", move || inject.close());
    }

    let capture = Arc::new(BpfCapture::open(&injector)?);
    {
        let capture = capture.clone();
        teardown.push_closer("close bpf capture", move || capture.close());
    }

    Ok(Bridge {
        name,
        injector,
        capture,
        inject,
    })
}

impl DeviceOpener for FethOpener {
    fn open(&self, config: &Config) -> Result<Interface> {
        if config.device_type != DeviceType::Tap {
            return Err(Error::InvalidConfig(
                "a feth pair only carries TAP frames".into(),
            ));
        }
        let (name, injector) = requested_names(config)?;

        let mut teardown = Teardown::new(destroy_interface);
        let bridge = match build(name, injector, &mut teardown) {
            Ok(bridge) => bridge,
            Err(e) => return Err(teardown.rollback(e)),
        };

        tracing::debug!(
            name = %bridge.name,
            injector = %bridge.injector,
            "opened feth bridge"
        );

        let transport = Arc::new(FethBridge {
            capture: bridge.capture,
            inject: bridge.inject,
            teardown: Mutex::new(teardown),
        });
        let mtu = Arc::new(FethMtu {
            ceiling: self.ceiling.clone(),
        });

        Ok(Interface::from_transport(DeviceType::Tap, bridge.name, transport, mtu)
            .with_secondary_name(bridge.injector))
    }
}

/// Capture for reads, injection for writes, teardown on close.
struct FethBridge {
    capture: Arc<BpfCapture>,
    inject: Arc<PollFd>,
    teardown: Mutex<Teardown>,
}

impl Transport for FethBridge {
    fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            match self.capture.read(buf) {
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                result => return result,
            }
        }
    }

    fn write(&self, buf: &[u8]) -> io::Result<usize> {
        self.inject.write(buf)
    }

    fn close(&self) -> Result<()> {
        self.teardown
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .run()
    }
}

/// MTU of both pair members, after raising the feth ceiling if needed.
struct FethMtu {
    ceiling: Arc<MtuCeiling<SysctlCeiling>>,
}

impl MtuControl for FethMtu {
    fn set_mtu(&self, name: &str, secondary: Option<&str>, mtu: u32) -> Result<()> {
        self.ceiling.ensure(mtu)?;
        if let Some(secondary) = secondary {
            IoctlMtu::set_one(secondary, mtu)?;
        }
        IoctlMtu::set_one(name, mtu)
    }
}
