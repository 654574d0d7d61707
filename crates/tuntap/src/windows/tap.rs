//! TAP through the tap-windows6 driver.
//!
//! The adapter is found in the registry, its device is opened for overlapped
//! I/O and every read or write waits for its own completion, so callers see
//! plain blocking calls.

use std::io;
use std::ptr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock, TryLockError};
use std::thread;
use std::time::Duration;

use windows_sys::Win32::Foundation::{
    CloseHandle, ERROR_BUFFER_OVERFLOW, ERROR_IO_PENDING, ERROR_SUCCESS, GENERIC_READ,
    GENERIC_WRITE, HANDLE, INVALID_HANDLE_VALUE,
};
use windows_sys::Win32::NetworkManagement::IpHelper::{
    GetAdaptersAddresses, IP_ADAPTER_ADDRESSES_LH,
};
use windows_sys::Win32::Networking::WinSock::AF_UNSPEC;
use windows_sys::Win32::Storage::FileSystem::{
    CreateFileW, FILE_ATTRIBUTE_SYSTEM, FILE_FLAG_OVERLAPPED, FILE_SHARE_READ, FILE_SHARE_WRITE,
    OPEN_EXISTING, ReadFile, WriteFile,
};
use windows_sys::Win32::System::IO::{
    CancelIoEx, DeviceIoControl, GetOverlappedResult, OVERLAPPED,
};
use windows_sys::Win32::System::Threading::{CreateEventW, ResetEvent};

use super::{NetshMtu, registry, wide};
use crate::config::{Config, DEFAULT_TAP_COMPONENT_ID, DeviceType};
use crate::error::{self, Error, Result};
use crate::interface::{DeviceOpener, Interface};
use crate::transport::Transport;

const FILE_DEVICE_UNKNOWN: u32 = 0x22;
const METHOD_BUFFERED: u32 = 0;
const FILE_ANY_ACCESS: u32 = 0;

const fn tap_control_code(function: u32) -> u32 {
    (FILE_DEVICE_UNKNOWN << 16) | (FILE_ANY_ACCESS << 14) | (function << 2) | METHOD_BUFFERED
}

const TAP_IOCTL_GET_MAC: u32 = tap_control_code(1);
const TAP_IOCTL_SET_MEDIA_STATUS: u32 = tap_control_code(6);

/// Opener for tap-windows6 adapters.
#[derive(Debug, Clone, Copy, Default)]
pub struct TapWindowsOpener;

impl DeviceOpener for TapWindowsOpener {
    fn open(&self, config: &Config) -> Result<Interface> {
        if config.device_type != DeviceType::Tap {
            return Err(Error::InvalidConfig(
                "tap-windows is only used for TAP devices".into(),
            ));
        }
        let platform = &config.platform;
        let component_id = platform
            .component_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .unwrap_or(DEFAULT_TAP_COMPONENT_ID);
        let connection = platform.interface_name.as_deref().filter(|n| !n.is_empty());

        let guid = registry::find_adapter(component_id, connection)?;
        let device = TapDevice::open(&guid)?;
        let mac = device.mac()?;
        device.set_media_status(true)?;
        let name = interface_name_for(&mac)?;

        tracing::debug!(
            name = %name,
            guid = %guid,
            component_id,
            "opened tap-windows adapter"
        );
        Ok(Interface::from_transport(
            DeviceType::Tap,
            name,
            Arc::new(device),
            Arc::new(NetshMtu),
        ))
    }
}

/// A device handle, closed on drop.
struct Handle(HANDLE);

// A HANDLE is an opaque kernel reference usable from any thread.
unsafe impl Send for Handle {}
unsafe impl Sync for Handle {}

impl Handle {
    /// Close now and report the outcome.
    fn close(self) -> io::Result<()> {
        let raw = self.0;
        std::mem::forget(self);
        if unsafe { CloseHandle(raw) } == 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        unsafe {
            CloseHandle(self.0);
        }
    }
}

/// An `OVERLAPPED` with its own manual-reset event.
struct Overlapped(Box<OVERLAPPED>);

unsafe impl Send for Overlapped {}

impl Overlapped {
    fn new() -> io::Result<Self> {
        let event = unsafe { CreateEventW(ptr::null(), 1, 0, ptr::null()) };
        if event.is_null() {
            return Err(io::Error::last_os_error());
        }
        let mut overlapped: Box<OVERLAPPED> = Box::new(unsafe { std::mem::zeroed() });
        overlapped.hEvent = event;
        Ok(Self(overlapped))
    }

    /// Issue one request and wait for it to complete.
    ///
    /// `issue` returns the Win32 `BOOL` of the call it makes; a pending
    /// request is awaited like a synchronous one.
    fn run(&mut self, handle: HANDLE, issue: impl FnOnce(*mut OVERLAPPED) -> i32) -> io::Result<usize> {
        if unsafe { ResetEvent(self.0.hEvent) } == 0 {
            return Err(io::Error::last_os_error());
        }
        if issue(&mut *self.0) == 0 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() != Some(ERROR_IO_PENDING as i32) {
                return Err(err);
            }
        }
        let mut transferred = 0u32;
        if unsafe { GetOverlappedResult(handle, &*self.0, &mut transferred, 1) } == 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(transferred as usize)
    }
}

impl Drop for Overlapped {
    fn drop(&mut self) {
        unsafe {
            CloseHandle(self.0.hEvent);
        }
    }
}

/// The overlapped device handle with one request slot per direction.
struct TapDevice {
    handle: RwLock<Option<Handle>>,
    closed: AtomicBool,
    reader: Mutex<Overlapped>,
    writer: Mutex<Overlapped>,
}

impl TapDevice {
    fn open(guid: &str) -> Result<Self> {
        let path = wide(&format!(r"\\.\Global\{guid}.tap"));
        let raw = unsafe {
            CreateFileW(
                path.as_ptr(),
                GENERIC_READ | GENERIC_WRITE,
                FILE_SHARE_READ | FILE_SHARE_WRITE,
                ptr::null(),
                OPEN_EXISTING,
                FILE_ATTRIBUTE_SYSTEM | FILE_FLAG_OVERLAPPED,
                ptr::null_mut(),
            )
        };
        if raw == INVALID_HANDLE_VALUE {
            return Err(Error::syscall("CreateFileW", io::Error::last_os_error()));
        }
        let handle = Handle(raw);

        let overlapped = || Overlapped::new().map_err(|e| Error::syscall("CreateEventW", e));
        Ok(Self {
            reader: Mutex::new(overlapped()?),
            writer: Mutex::new(overlapped()?),
            handle: RwLock::new(Some(handle)),
            closed: AtomicBool::new(false),
        })
    }

    fn control(&self, code: u32, input: &[u8], output: &mut [u8], what: &'static str) -> Result<()> {
        let guard = self.handle.read().unwrap_or_else(|e| e.into_inner());
        let handle = guard.as_ref().ok_or(Error::Closed)?.0;

        let mut overlapped = Overlapped::new().map_err(|e| Error::syscall("CreateEventW", e))?;
        overlapped
            .run(handle, |ov| unsafe {
                DeviceIoControl(
                    handle,
                    code,
                    input.as_ptr().cast(),
                    input.len() as u32,
                    output.as_mut_ptr().cast(),
                    output.len() as u32,
                    ptr::null_mut(),
                    ov,
                )
            })
            .map_err(|e| Error::ioctl(what, e))?;
        Ok(())
    }

    fn mac(&self) -> Result<[u8; 6]> {
        let mut mac = [0u8; 6];
        self.control(TAP_IOCTL_GET_MAC, &[], &mut mac, "TAP_IOCTL_GET_MAC")?;
        Ok(mac)
    }

    fn set_media_status(&self, connected: bool) -> Result<()> {
        let status = u32::from(connected).to_ne_bytes();
        let mut out = [0u8; 4];
        self.control(
            TAP_IOCTL_SET_MEDIA_STATUS,
            &status,
            &mut out,
            "TAP_IOCTL_SET_MEDIA_STATUS",
        )
    }

    /// Run an overlapped request on the live handle.
    fn transfer(
        &self,
        slot: &Mutex<Overlapped>,
        issue: impl FnOnce(HANDLE, *mut OVERLAPPED) -> i32,
    ) -> io::Result<usize> {
        let guard = self.handle.read().unwrap_or_else(|e| e.into_inner());
        let handle = match guard.as_ref() {
            Some(handle) if !self.closed.load(Ordering::Acquire) => handle.0,
            _ => return Err(error::closed()),
        };
        let mut overlapped = slot.lock().unwrap_or_else(|e| e.into_inner());
        overlapped
            .run(handle, |ov| issue(handle, ov))
            .map_err(|e| {
                if self.closed.load(Ordering::Acquire) {
                    error::closed()
                } else {
                    e
                }
            })
    }
}

impl Transport for TapDevice {
    fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        let len = u32::try_from(buf.len()).unwrap_or(u32::MAX);
        self.transfer(&self.reader, |handle, ov| unsafe {
            ReadFile(handle, buf.as_mut_ptr(), len, ptr::null_mut(), ov)
        })
    }

    fn write(&self, buf: &[u8]) -> io::Result<usize> {
        let len = u32::try_from(buf.len())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "frame too large"))?;
        self.transfer(&self.writer, |handle, ov| unsafe {
            WriteFile(handle, buf.as_ptr(), len, ptr::null_mut(), ov)
        })
    }

    fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        // Cancel until every in-flight request has released the handle; a
        // request issued just after a cancel is caught by the next one.
        let mut guard = loop {
            if let Some(handle) = self
                .handle
                .read()
                .unwrap_or_else(|e| e.into_inner())
                .as_ref()
            {
                unsafe {
                    CancelIoEx(handle.0, ptr::null());
                }
            }
            match self.handle.try_write() {
                Ok(guard) => break guard,
                Err(TryLockError::Poisoned(e)) => break e.into_inner(),
                Err(TryLockError::WouldBlock) => thread::sleep(Duration::from_millis(1)),
            }
        };

        match guard.take() {
            Some(handle) => {
                let result = handle.close().map_err(|e| Error::syscall("CloseHandle", e));
                tracing::debug!(ok = result.is_ok(), "closed tap-windows handle");
                result
            }
            None => Ok(()),
        }
    }
}

/// Friendly name of the adapter whose hardware address is `mac`.
fn interface_name_for(mac: &[u8; 6]) -> Result<String> {
    let mut size: u32 = 16 * 1024;
    let mut buf: Vec<u64>;
    loop {
        buf = vec![0u64; (size as usize).div_ceil(size_of::<u64>())];
        let ret = unsafe {
            GetAdaptersAddresses(
                u32::from(AF_UNSPEC),
                0,
                ptr::null(),
                buf.as_mut_ptr().cast(),
                &mut size,
            )
        };
        match ret {
            ERROR_SUCCESS => break,
            ERROR_BUFFER_OVERFLOW => continue,
            code => {
                return Err(Error::syscall(
                    "GetAdaptersAddresses",
                    io::Error::from_raw_os_error(code as i32),
                ));
            }
        }
    }

    let mut cursor = buf.as_ptr().cast::<IP_ADAPTER_ADDRESSES_LH>();
    while !cursor.is_null() {
        let adapter = unsafe { &*cursor };
        let len = adapter.PhysicalAddressLength as usize;
        if len >= mac.len() && adapter.PhysicalAddress[..mac.len()] == mac[..] {
            return Ok(unsafe { wide_ptr_to_string(adapter.FriendlyName) });
        }
        cursor = adapter.Next;
    }
    Err(Error::InterfaceNameNotFound)
}

/// # Safety
///
/// `ptr` must be null or point to a NUL-terminated UTF-16 string.
unsafe fn wide_ptr_to_string(ptr: *const u16) -> String {
    if ptr.is_null() {
        return String::new();
    }
    let mut len = 0;
    unsafe {
        while *ptr.add(len) != 0 {
            len += 1;
        }
        String::from_utf16_lossy(std::slice::from_raw_parts(ptr, len))
    }
}
