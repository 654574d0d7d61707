//! Interface configuration.
//!
//! [`Config`] is plain data: a device type plus a per-platform parameter
//! bag. It is only consulted while the interface is being opened.
//! `Config::default()` is the platform default (a TUN device on the default
//! driver with a kernel-assigned name).

use crate::error::Result;
use crate::interface::Interface;

/// Device type (TUN or TAP).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum DeviceType {
    /// TUN device - operates at Layer 3 (IP packets).
    #[default]
    Tun,
    /// TAP device - operates at Layer 2 (Ethernet frames).
    Tap,
}

impl DeviceType {
    /// Get the device type name.
    pub fn name(&self) -> &'static str {
        match self {
            DeviceType::Tun => "tun",
            DeviceType::Tap => "tap",
        }
    }
}

impl std::fmt::Display for DeviceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Parameters required to create a TUN/TAP interface.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Config {
    /// Whether the device carries IP packets or Ethernet frames.
    pub device_type: DeviceType,
    /// Parameters that differ between platforms.
    pub platform: PlatformConfig,
}

impl Config {
    /// Default configuration for the given device type.
    pub fn new(device_type: DeviceType) -> Self {
        Self {
            device_type,
            platform: PlatformConfig::default(),
        }
    }
}

/// Owner and group assigned to a Linux TUN/TAP device.
#[cfg(target_os = "linux")]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Permissions {
    /// Owner UID.
    pub owner: u32,
    /// Group GID.
    pub group: u32,
}

#[cfg(target_os = "linux")]
impl Permissions {
    /// Resolve a user and a group name through the passwd/group databases.
    pub fn from_names(user: &str, group: &str) -> Result<Self> {
        Ok(Self {
            owner: crate::unix::lookup_user(user)?,
            group: crate::unix::lookup_group(group)?,
        })
    }
}

/// Linux parameters.
#[cfg(target_os = "linux")]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PlatformConfig {
    /// Requested interface name. The kernel picks `tunN`/`tapN` when unset.
    pub name: Option<String>,
    /// Create a multi-queue device (Linux > 3.8). Each queue is opened as its
    /// own [`Interface`] with the same name.
    pub multi_queue: bool,
    /// Keep the device after the last handle is closed.
    pub persist: bool,
    /// Owner and group allowed to attach to the device without privileges.
    pub permissions: Option<Permissions>,
}

/// macOS driver variant.
#[cfg(target_os = "macos")]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Driver {
    /// Built-in drivers: utun for TUN, a peered feth pair for TAP.
    #[default]
    System,
    /// The third-party tuntaposx kext (`/dev/tunN`, `/dev/tapN`).
    TunTapOsx,
}

/// macOS parameters.
#[cfg(target_os = "macos")]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PlatformConfig {
    /// Requested interface name: `utunN` (TUN), `fethN` (TAP) or, with
    /// [`Driver::TunTapOsx`], the mandatory `tunN`/`tapN`.
    pub name: Option<String>,
    /// Which driver backs the interface.
    pub driver: Driver,
    /// Name of the second feth interface used to capture and inject frames
    /// for a TAP device. The lowest free `fethN` is used when unset.
    pub tap_injector_name: Option<String>,
}

/// Windows driver variant.
#[cfg(windows)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Driver {
    /// Ring-buffer adapter (TUN only).
    Wintun,
    /// OpenVPN tap-windows6 driver (TAP only).
    TapWindows,
}

/// Default tap-windows component id.
#[cfg(windows)]
pub const DEFAULT_TAP_COMPONENT_ID: &str = "root\\tap0901";

/// Default wintun adapter name.
#[cfg(windows)]
pub const DEFAULT_WINTUN_NAME: &str = "TunTapWintun";

/// Default wintun tunnel type.
#[cfg(windows)]
pub const DEFAULT_WINTUN_TUNNEL_TYPE: &str = "TunTap";

/// Default wintun ring capacity (8 MiB).
#[cfg(windows)]
pub const DEFAULT_RING_CAPACITY: u32 = 0x80_0000;

/// Windows parameters.
#[cfg(windows)]
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PlatformConfig {
    /// Driver to use. Follows the device type when unset (TUN uses wintun,
    /// TAP uses tap-windows).
    pub driver: Option<Driver>,
    /// tap-windows: driver component id to look up in the registry.
    /// wintun: tunnel type of a newly created adapter.
    pub component_id: Option<String>,
    /// tap-windows: network connection name the adapter must carry.
    /// wintun: adapter name to open or create.
    pub interface_name: Option<String>,
    /// Path to `wintun.dll`. The default DLL search path is used when unset.
    pub wintun_dll: Option<std::path::PathBuf>,
    /// wintun ring capacity in bytes.
    pub ring_capacity: u32,
}

#[cfg(windows)]
impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            driver: None,
            component_id: None,
            interface_name: None,
            wintun_dll: None,
            ring_capacity: DEFAULT_RING_CAPACITY,
        }
    }
}

#[cfg(windows)]
impl PlatformConfig {
    /// The driver that will back a device of the given type.
    pub fn driver_for(&self, device_type: DeviceType) -> Driver {
        self.driver.unwrap_or(match device_type {
            DeviceType::Tun => Driver::Wintun,
            DeviceType::Tap => Driver::TapWindows,
        })
    }
}

/// Parameters on platforms without an opener.
#[cfg(not(any(target_os = "linux", target_os = "macos", windows)))]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PlatformConfig {}

/// Builder for creating TUN/TAP interfaces.
#[derive(Debug, Clone, Default)]
pub struct InterfaceBuilder {
    config: Config,
}

impl InterfaceBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the device type (TUN or TAP).
    pub fn device_type(mut self, device_type: DeviceType) -> Self {
        self.config.device_type = device_type;
        self
    }

    /// Set the device name.
    ///
    /// If not specified, the OS assigns a name (tun0, utun3, feth0, ...).
    #[cfg(any(target_os = "linux", target_os = "macos"))]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.platform.name = Some(name.into());
        self
    }

    /// Enable multi-queue support.
    #[cfg(target_os = "linux")]
    pub fn multi_queue(mut self, value: bool) -> Self {
        self.config.platform.multi_queue = value;
        self
    }

    /// Make the device persistent (survives close).
    #[cfg(target_os = "linux")]
    pub fn persist(mut self, persist: bool) -> Self {
        self.config.platform.persist = persist;
        self
    }

    /// Set the owner UID and group GID.
    #[cfg(target_os = "linux")]
    pub fn permissions(mut self, owner: u32, group: u32) -> Self {
        self.config.platform.permissions = Some(Permissions { owner, group });
        self
    }

    /// Set the owner and group by name.
    #[cfg(target_os = "linux")]
    pub fn permissions_by_name(mut self, user: &str, group: &str) -> Result<Self> {
        self.config.platform.permissions = Some(Permissions::from_names(user, group)?);
        Ok(self)
    }

    /// Set the driver variant.
    #[cfg(target_os = "macos")]
    pub fn driver(mut self, driver: Driver) -> Self {
        self.config.platform.driver = driver;
        self
    }

    /// Set the injector feth name of a TAP device.
    #[cfg(target_os = "macos")]
    pub fn tap_injector_name(mut self, name: impl Into<String>) -> Self {
        self.config.platform.tap_injector_name = Some(name.into());
        self
    }

    /// Set the driver variant.
    #[cfg(windows)]
    pub fn driver(mut self, driver: Driver) -> Self {
        self.config.platform.driver = Some(driver);
        self
    }

    /// Set the driver component id (tap-windows) or tunnel type (wintun).
    #[cfg(windows)]
    pub fn component_id(mut self, id: impl Into<String>) -> Self {
        self.config.platform.component_id = Some(id.into());
        self
    }

    /// Set the adapter name.
    #[cfg(windows)]
    pub fn interface_name(mut self, name: impl Into<String>) -> Self {
        self.config.platform.interface_name = Some(name.into());
        self
    }

    /// Load `wintun.dll` from the given path.
    #[cfg(windows)]
    pub fn wintun_dll(mut self, path: impl Into<std::path::PathBuf>) -> Self {
        self.config.platform.wintun_dll = Some(path.into());
        self
    }

    /// Set the wintun ring capacity in bytes.
    #[cfg(windows)]
    pub fn ring_capacity(mut self, bytes: u32) -> Self {
        self.config.platform.ring_capacity = bytes;
        self
    }

    /// Get the configuration built so far.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Finish the builder without opening anything.
    pub fn build(self) -> Config {
        self.config
    }

    /// Create the TUN/TAP interface.
    pub fn create(self) -> Result<Interface> {
        Interface::new(self.config)
    }
}
