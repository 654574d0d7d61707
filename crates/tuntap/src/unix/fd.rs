//! Closable non-blocking descriptor.
//!
//! The descriptor is switched to non-blocking mode and every blocking wait
//! goes through `poll(2)` together with one end of a wake socket pair.
//! [`PollFd::close`] shuts that pair down, which wakes every waiter, then
//! closes the descriptor once no call is using it.

use std::io;
use std::net::Shutdown;
use std::os::fd::{AsRawFd, FromRawFd, IntoRawFd, OwnedFd, RawFd};
use std::os::unix::net::UnixStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, RwLock};

use crate::error::{self, Error, Result};
use crate::transport::Transport;

pub(crate) struct PollFd {
    fd: RwLock<Option<OwnedFd>>,
    closed: AtomicBool,
    wake_tx: UnixStream,
    wake_rx: UnixStream,
    read_lock: Mutex<()>,
    write_lock: Mutex<()>,
}

impl PollFd {
    /// Take ownership of `fd` and switch it to non-blocking mode.
    pub(crate) fn new(fd: OwnedFd) -> Result<Self> {
        set_nonblocking(fd.as_raw_fd())?;
        let (wake_tx, wake_rx) =
            UnixStream::pair().map_err(|e| Error::syscall("socketpair", e))?;
        Ok(Self {
            fd: RwLock::new(Some(fd)),
            closed: AtomicBool::new(false),
            wake_tx,
            wake_rx,
            read_lock: Mutex::new(()),
            write_lock: Mutex::new(()),
        })
    }

    /// Retry `op` until it stops returning `EAGAIN`, waiting for `events`.
    fn blocking(
        &self,
        events: libc::c_short,
        mut op: impl FnMut(RawFd) -> isize,
    ) -> io::Result<usize> {
        loop {
            let guard = self.fd.read().unwrap_or_else(|e| e.into_inner());
            let fd = match guard.as_ref() {
                Some(fd) if !self.closed.load(Ordering::Acquire) => fd.as_raw_fd(),
                _ => return Err(error::closed()),
            };

            let n = op(fd);
            if n >= 0 {
                return Ok(n as usize);
            }
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::WouldBlock {
                return Err(err);
            }

            self.wait(fd, events)?;
        }
    }

    fn wait(&self, fd: RawFd, events: libc::c_short) -> io::Result<()> {
        let mut fds = [
            libc::pollfd {
                fd,
                events,
                revents: 0,
            },
            libc::pollfd {
                fd: self.wake_rx.as_raw_fd(),
                events: libc::POLLIN,
                revents: 0,
            },
        ];

        let ret = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, -1) };
        if ret < 0 {
            return Err(io::Error::last_os_error());
        }
        if fds[1].revents != 0 {
            return Err(error::closed());
        }
        Ok(())
    }
}

impl Transport for PollFd {
    fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        let _guard = self.read_lock.lock().unwrap_or_else(|e| e.into_inner());
        self.blocking(libc::POLLIN, |fd| unsafe {
            libc::read(fd, buf.as_mut_ptr().cast(), buf.len())
        })
    }

    fn write(&self, buf: &[u8]) -> io::Result<usize> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        self.blocking(libc::POLLOUT, |fd| unsafe {
            libc::write(fd, buf.as_ptr().cast(), buf.len())
        })
    }

    fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        // Level-triggered: every current and future poll sees the hangup.
        let _ = self.wake_tx.shutdown(Shutdown::Both);

        let fd = self.fd.write().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(fd) = fd {
            let ret = unsafe { libc::close(fd.into_raw_fd()) };
            if ret < 0 {
                return Err(Error::syscall("close", io::Error::last_os_error()));
            }
        }
        Ok(())
    }
}

/// Switch a descriptor to non-blocking mode.
fn set_nonblocking(fd: RawFd) -> Result<()> {
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags < 0 {
        return Err(Error::syscall("fcntl", io::Error::last_os_error()));
    }
    if unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) } < 0 {
        return Err(Error::syscall("fcntl", io::Error::last_os_error()));
    }
    Ok(())
}

/// Wrap a descriptor returned by a raw system call.
pub(crate) fn owned(fd: RawFd, call: &'static str) -> Result<OwnedFd> {
    if fd < 0 {
        return Err(Error::syscall(call, io::Error::last_os_error()));
    }
    Ok(unsafe { OwnedFd::from_raw_fd(fd) })
}
