//! tap-windows adapter lookup in the registry.

use std::io;
use std::ptr;

use windows_sys::Win32::Foundation::{ERROR_NO_MORE_ITEMS, ERROR_SUCCESS, WIN32_ERROR};
use windows_sys::Win32::System::Registry::{
    HKEY, HKEY_LOCAL_MACHINE, KEY_READ, REG_EXPAND_SZ, REG_SZ, RegCloseKey, RegEnumKeyExW,
    RegOpenKeyExW, RegQueryValueExW,
};

use super::{from_wide, wide};
use crate::error::{Error, Result};

/// Network adapter device class.
const ADAPTER_KEY: &str =
    r"SYSTEM\CurrentControlSet\Control\Class\{4D36E972-E325-11CE-BFC1-08002BE10318}";

/// Connection names of network adapters, keyed by instance GUID.
const NETWORK_KEY: &str =
    r"SYSTEM\CurrentControlSet\Control\Network\{4D36E972-E325-11CE-BFC1-08002BE10318}";

/// Longest key name the registry allows, plus the terminator.
const MAX_KEY_LEN: usize = 256;

fn check(code: WIN32_ERROR) -> io::Result<()> {
    if code == ERROR_SUCCESS {
        Ok(())
    } else {
        Err(io::Error::from_raw_os_error(code as i32))
    }
}

/// An open registry key, closed on drop.
struct Key(HKEY);

impl Key {
    fn open(parent: HKEY, path: &str) -> io::Result<Self> {
        let path = wide(path);
        let mut key: HKEY = ptr::null_mut();
        check(unsafe { RegOpenKeyExW(parent, path.as_ptr(), 0, KEY_READ, &mut key) })?;
        Ok(Self(key))
    }

    fn open_local_machine(path: &str) -> io::Result<Self> {
        Self::open(HKEY_LOCAL_MACHINE, path)
    }

    fn subkey(&self, name: &str) -> io::Result<Self> {
        Self::open(self.0, name)
    }

    fn subkey_names(&self) -> io::Result<Vec<String>> {
        let mut names = Vec::new();
        let mut buf = [0u16; MAX_KEY_LEN];
        for index in 0.. {
            let mut len = buf.len() as u32;
            let code = unsafe {
                RegEnumKeyExW(
                    self.0,
                    index,
                    buf.as_mut_ptr(),
                    &mut len,
                    ptr::null(),
                    ptr::null_mut(),
                    ptr::null_mut(),
                    ptr::null_mut(),
                )
            };
            if code == ERROR_NO_MORE_ITEMS {
                break;
            }
            check(code)?;
            names.push(String::from_utf16_lossy(&buf[..len as usize]));
        }
        Ok(names)
    }

    /// Read a `REG_SZ` value.
    fn string(&self, name: &str) -> io::Result<String> {
        let name = wide(name);
        let mut kind = 0;
        let mut size = 0u32;
        check(unsafe {
            RegQueryValueExW(
                self.0,
                name.as_ptr(),
                ptr::null(),
                &mut kind,
                ptr::null_mut(),
                &mut size,
            )
        })?;
        if kind != REG_SZ && kind != REG_EXPAND_SZ {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "registry value is not a string",
            ));
        }

        let mut buf = vec![0u16; (size as usize).div_ceil(2)];
        check(unsafe {
            RegQueryValueExW(
                self.0,
                name.as_ptr(),
                ptr::null(),
                &mut kind,
                buf.as_mut_ptr().cast(),
                &mut size,
            )
        })?;
        Ok(from_wide(&buf))
    }
}

impl Drop for Key {
    fn drop(&mut self) {
        unsafe {
            RegCloseKey(self.0);
        }
    }
}

/// Connection name the user sees for the adapter with instance id `guid`.
fn connection_name(guid: &str) -> io::Result<String> {
    Key::open_local_machine(&format!(r"{NETWORK_KEY}\{guid}\Connection"))?.string("Name")
}

/// Find the instance GUID of an installed adapter.
///
/// The first adapter whose `ComponentId` equals `component_id` wins; with
/// `interface_name`, its connection name must match as well.
pub(super) fn find_adapter(component_id: &str, interface_name: Option<&str>) -> Result<String> {
    let not_found = || Error::AdapterNotFound {
        component_id: component_id.to_string(),
        interface_name: interface_name.map(str::to_string),
    };

    let class = Key::open_local_machine(ADAPTER_KEY).map_err(|e| {
        tracing::debug!(error = %e, "adapter class key unavailable");
        not_found()
    })?;
    let subkeys = class
        .subkey_names()
        .map_err(|e| Error::syscall("RegEnumKeyExW", e))?;

    for name in subkeys {
        // Some subkeys (Properties) are not readable without privileges.
        let Ok(adapter) = class.subkey(&name) else {
            continue;
        };
        let Ok(id) = adapter.string("ComponentId") else {
            continue;
        };
        if id != component_id {
            continue;
        }
        let Ok(guid) = adapter.string("NetCfgInstanceId") else {
            continue;
        };
        if let Some(want) = interface_name {
            match connection_name(&guid) {
                Ok(have) if have == want => {}
                _ => continue,
            }
        }
        tracing::debug!(component_id, guid = %guid, "found tap-windows adapter");
        return Ok(guid);
    }
    Err(not_found())
}
