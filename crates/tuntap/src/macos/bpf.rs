//! Frame capture through a `/dev/bpfN` descriptor.

use std::fs::OpenOptions;
use std::io;
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::sync::Mutex;

use crate::capture::RecordBuffer;
use crate::error::{Error, Result};
use crate::transport::Transport;
use crate::unix::{IfReq, PollFd};

const BIOCGBLEN: libc::c_ulong = 0x4004_4266;
const BIOCSBLEN: libc::c_ulong = 0xc004_4266;
const BIOCPROMISC: libc::c_ulong = 0x2000_4269;
const BIOCSETIF: libc::c_ulong = 0x8020_426c;
const BIOCIMMEDIATE: libc::c_ulong = 0x8004_4270;
const BIOCSHDRCMPLT: libc::c_ulong = 0x8004_4275;
const BIOCSSEESENT: libc::c_ulong = 0x8004_4277;

/// Requested kernel buffer length.
const BUFFER_LEN: u32 = 32767;

/// Highest `/dev/bpfN` unit probed.
const MAX_UNITS: u32 = 256;

/// A promiscuous, immediate-mode capture on one interface.
pub(super) struct BpfCapture {
    fd: PollFd,
    records: Mutex<RecordBuffer>,
}

impl BpfCapture {
    /// Open a capture on `interface`.
    ///
    /// Frames sent from this host are not reported, so frames injected on the
    /// same interface are never read back.
    pub(super) fn open(interface: &str) -> Result<Self> {
        let mut req = IfReq::new(interface)?;
        let fd = open_device()?;
        let raw = fd.as_raw_fd();

        // The buffer length must be set before attaching.
        let mut len = BUFFER_LEN;
        ioctl_u32(raw, BIOCSBLEN, &mut len, "BIOCSBLEN")?;
        req.ioctl(raw, BIOCSETIF, "BIOCSETIF")?;
        ioctl_u32(raw, BIOCIMMEDIATE, &mut 1, "BIOCIMMEDIATE")?;
        if unsafe { libc::ioctl(raw, BIOCPROMISC as _) } < 0 {
            return Err(Error::ioctl("BIOCPROMISC", io::Error::last_os_error()));
        }
        ioctl_u32(raw, BIOCSHDRCMPLT, &mut 1, "BIOCSHDRCMPLT")?;
        ioctl_u32(raw, BIOCSSEESENT, &mut 0, "BIOCSSEESENT")?;

        let mut actual = 0;
        ioctl_u32(raw, BIOCGBLEN, &mut actual, "BIOCGBLEN")?;

        tracing::debug!(interface, buffer = actual, "opened bpf capture");
        Ok(Self {
            fd: PollFd::new(fd)?,
            records: Mutex::new(RecordBuffer::new(actual as usize)),
        })
    }

    /// Read one frame, truncated to `buf`.
    pub(super) fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        loop {
            if let Some(n) = records.next_frame(buf)? {
                return Ok(n);
            }
            records.refill(|batch| self.fd.read(batch))?;
        }
    }

    pub(super) fn close(&self) -> Result<()> {
        self.fd.close()
    }
}

/// Open the first `/dev/bpfN` not already in use.
fn open_device() -> Result<OwnedFd> {
    for unit in 0..MAX_UNITS {
        let path = format!("/dev/bpf{unit}");
        match OpenOptions::new().read(true).write(true).open(&path) {
            Ok(file) => return Ok(OwnedFd::from(file)),
            Err(e) if e.raw_os_error() == Some(libc::EBUSY) => continue,
            Err(e) => return Err(Error::syscall("open /dev/bpf", e)),
        }
    }
    Err(Error::syscall(
        "open /dev/bpf",
        io::Error::from_raw_os_error(libc::EBUSY),
    ))
}

fn ioctl_u32(fd: RawFd, request: libc::c_ulong, value: &mut u32, what: &'static str) -> Result<()> {
    let ret = unsafe { libc::ioctl(fd, request as _, value as *mut u32) };
    if ret < 0 {
        return Err(Error::ioctl(what, io::Error::last_os_error()));
    }
    Ok(())
}
