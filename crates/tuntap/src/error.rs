//! Error types for TUN/TAP operations.

use std::io;

/// Result type for TUN/TAP operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while opening, configuring or closing an interface.
///
/// Packet I/O (`read`/`write`) reports plain [`io::Error`]s so the handle can
/// implement [`std::io::Read`] and [`std::io::Write`]. Encoding failures on
/// that path carry one of the variants below as the inner error.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Device name too long (max 15 characters).
    #[error("device name too long: {name} ({len} > 15 characters)")]
    NameTooLong {
        /// The name that was too long.
        name: String,
        /// The length of the name.
        len: usize,
    },

    /// Device name does not follow the platform naming convention.
    #[error("invalid device name {name:?}: {reason}")]
    InvalidName {
        /// The rejected name.
        name: String,
        /// What the platform expects instead.
        reason: String,
    },

    /// Two names that must differ are the same.
    #[error("name conflict: {0}")]
    NameConflict(String),

    /// Configuration rejected before touching the OS.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// User not found.
    #[error("user not found: {0}")]
    UserNotFound(String),

    /// Group not found.
    #[error("group not found: {0}")]
    GroupNotFound(String),

    /// ioctl (or DeviceIoControl) failed.
    #[error("ioctl {name} failed: {source}")]
    Ioctl {
        /// The ioctl name.
        name: &'static str,
        /// The underlying error.
        source: io::Error,
    },

    /// Some other system call failed while acquiring resources.
    #[error("{name} failed: {source}")]
    Syscall {
        /// The system call name.
        name: &'static str,
        /// The underlying error.
        source: io::Error,
    },

    /// An external configuration command exited unsuccessfully.
    #[error("command `{command}` failed ({status}): {stderr}")]
    Command {
        /// The command line that was run.
        command: String,
        /// Exit status, as displayed by the OS.
        status: String,
        /// Captured standard error, trimmed.
        stderr: String,
    },

    /// The requested driver adapter is not installed or not registered.
    #[error("adapter not found: component id {component_id:?}{}", .interface_name.as_deref().map(|n| format!(", interface {n:?}")).unwrap_or_default())]
    AdapterNotFound {
        /// The driver component id that was searched for.
        component_id: String,
        /// The connection name that was required to match, if any.
        interface_name: Option<String>,
    },

    /// The adapter was opened but no OS interface carries its hardware address.
    #[error("failed to find the name of the interface")]
    InterfaceNameNotFound,

    /// A TUN packet that is neither IPv4 nor IPv6.
    #[error("unable to determine IP version from packet (version nibble {0})")]
    UnknownIpVersion(u8),

    /// A zero-length packet was written to a transport that needs to inspect it.
    #[error("cannot write an empty packet")]
    EmptyPacket,

    /// The interface has been closed.
    #[error("interface is closed")]
    Closed,

    /// No opener exists for the current platform or driver.
    #[error("not supported: {0}")]
    Unsupported(&'static str),

    /// Several independent steps failed (close or rollback).
    #[error("{} errors: {}", .0.len(), .0.iter().map(ToString::to_string).collect::<Vec<_>>().join("; "))]
    Aggregate(Vec<Error>),
}

impl Error {
    /// Create an ioctl error.
    pub fn ioctl(name: &'static str, source: io::Error) -> Self {
        Error::Ioctl { name, source }
    }

    /// Create a system call error.
    pub fn syscall(name: &'static str, source: io::Error) -> Self {
        Error::Syscall { name, source }
    }

    /// Create an invalid name error.
    pub fn invalid_name(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::InvalidName {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Collapse the outcome of several independent steps.
    ///
    /// No errors is success, a single error is returned as is, and more
    /// than one is wrapped in [`Error::Aggregate`] in the order they happened.
    pub fn aggregate(mut errors: Vec<Error>) -> Result<()> {
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(Error::Aggregate(errors)),
        }
    }

    /// Get the OS error code, if this error carries one.
    pub fn errno(&self) -> Option<i32> {
        match self {
            Self::Io(e) | Self::Ioctl { source: e, .. } | Self::Syscall { source: e, .. } => {
                e.raw_os_error()
            }
            _ => None,
        }
    }

    /// Check if this is a "not found" error (missing driver, device or user).
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::AdapterNotFound { .. }
            | Self::InterfaceNameNotFound
            | Self::UserNotFound(_)
            | Self::GroupNotFound(_) => true,
            Self::Io(e) | Self::Ioctl { source: e, .. } | Self::Syscall { source: e, .. } => {
                e.kind() == io::ErrorKind::NotFound
            }
            _ => false,
        }
    }

    /// Check if this is a permission error (EPERM, EACCES).
    pub fn is_permission_denied(&self) -> bool {
        match self {
            Self::Io(e) | Self::Ioctl { source: e, .. } | Self::Syscall { source: e, .. } => {
                e.kind() == io::ErrorKind::PermissionDenied || e.raw_os_error() == Some(1)
            }
            Self::Aggregate(errors) => errors.iter().any(Error::is_permission_denied),
            _ => false,
        }
    }

    /// Check if this error was raised before any OS resource was touched.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::NameTooLong { .. }
                | Self::InvalidName { .. }
                | Self::NameConflict(_)
                | Self::InvalidConfig(_)
        )
    }

    /// Wrap this error for the packet I/O path.
    pub(crate) fn into_io(self, kind: io::ErrorKind) -> io::Error {
        match self {
            Self::Io(e) => e,
            other => io::Error::new(kind, other),
        }
    }
}

/// Error returned by I/O on a closed interface.
pub(crate) fn closed() -> io::Error {
    Error::Closed.into_io(io::ErrorKind::NotConnected)
}
