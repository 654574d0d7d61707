//! The `net.link.fake.max_mtu` ceiling.

use std::ffi::CStr;
use std::io;
use std::sync::{Arc, OnceLock};

use crate::error::{Error, Result};
use crate::mtu::{CeilingStore, MtuCeiling};

const MAX_MTU: &CStr = c"net.link.fake.max_mtu";

/// The feth MTU ceiling sysctl.
pub(super) struct SysctlCeiling;

impl CeilingStore for SysctlCeiling {
    fn get(&self) -> Result<u32> {
        let mut value: u32 = 0;
        let mut len = size_of::<u32>();
        let ret = unsafe {
            libc::sysctlbyname(
                MAX_MTU.as_ptr(),
                (&mut value as *mut u32).cast(),
                &mut len,
                std::ptr::null_mut(),
                0,
            )
        };
        if ret < 0 {
            return Err(Error::syscall("sysctlbyname", io::Error::last_os_error()));
        }
        Ok(value)
    }

    fn set(&self, value: u32) -> Result<()> {
        let mut value = value;
        let ret = unsafe {
            libc::sysctlbyname(
                MAX_MTU.as_ptr(),
                std::ptr::null_mut(),
                std::ptr::null_mut(),
                (&mut value as *mut u32).cast(),
                size_of::<u32>(),
            )
        };
        if ret < 0 {
            return Err(Error::syscall("sysctlbyname", io::Error::last_os_error()));
        }
        Ok(())
    }
}

/// The process-wide ceiling shared by every feth interface.
pub(super) fn shared_ceiling() -> Arc<MtuCeiling<SysctlCeiling>> {
    static CEILING: OnceLock<Arc<MtuCeiling<SysctlCeiling>>> = OnceLock::new();
    CEILING
        .get_or_init(|| Arc::new(MtuCeiling::new(SysctlCeiling)))
        .clone()
}
