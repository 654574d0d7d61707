//! TUN through a wintun ring-buffer session.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use windows_sys::Win32::Foundation::ERROR_BUFFER_OVERFLOW;
use wintun::{Adapter, Session};

use super::NetshMtu;
use crate::config::{Config, DEFAULT_WINTUN_NAME, DEFAULT_WINTUN_TUNNEL_TYPE, DeviceType};
use crate::error::{self, Error, Result};
use crate::interface::{DeviceOpener, Interface};
use crate::leftover::Leftover;
use crate::transport::Transport;
use crate::vector::{VectorError, VectorIo, check_sizes};

/// Longest adapter name wintun accepts, terminator included.
const MAX_ADAPTER_NAME: usize = 128;

/// Opener for wintun adapters.
#[derive(Debug, Clone, Copy, Default)]
pub struct WintunOpener;

fn check_ring_capacity(capacity: u32) -> Result<()> {
    if !(wintun::MIN_RING_CAPACITY..=wintun::MAX_RING_CAPACITY).contains(&capacity)
        || !capacity.is_power_of_two()
    {
        return Err(Error::InvalidConfig(format!(
            "ring capacity {capacity:#x} must be a power of two between {:#x} and {:#x}",
            wintun::MIN_RING_CAPACITY,
            wintun::MAX_RING_CAPACITY
        )));
    }
    Ok(())
}

fn check_adapter_name(name: &str) -> Result<()> {
    if name.encode_utf16().count() >= MAX_ADAPTER_NAME {
        return Err(Error::invalid_name(
            name,
            format!("adapter names are limited to {} characters", MAX_ADAPTER_NAME - 1),
        ));
    }
    Ok(())
}

fn driver_error(what: &'static str, err: impl std::fmt::Display) -> Error {
    Error::syscall(what, io::Error::other(err.to_string()))
}

impl DeviceOpener for WintunOpener {
    fn open(&self, config: &Config) -> Result<Interface> {
        if config.device_type != DeviceType::Tun {
            return Err(Error::InvalidConfig("wintun only carries TUN packets".into()));
        }
        let platform = &config.platform;
        let name = platform
            .interface_name
            .as_deref()
            .filter(|n| !n.is_empty())
            .unwrap_or(DEFAULT_WINTUN_NAME);
        let tunnel_type = platform
            .component_id
            .as_deref()
            .filter(|t| !t.is_empty())
            .unwrap_or(DEFAULT_WINTUN_TUNNEL_TYPE);
        check_adapter_name(name)?;
        check_ring_capacity(platform.ring_capacity)?;

        let wintun = match &platform.wintun_dll {
            Some(path) => unsafe { wintun::load_from_path(path) },
            None => unsafe { wintun::load() },
        }
        .map_err(|e| driver_error("load wintun.dll", e))?;

        let adapter = match Adapter::open(&wintun, name) {
            Ok(adapter) => adapter,
            Err(e) => {
                tracing::debug!(name, error = %e, "no existing wintun adapter, creating one");
                Adapter::create(&wintun, name, tunnel_type, None)
                    .map_err(|e| driver_error("WintunCreateAdapter", e))?
            }
        };
        let session = adapter
            .start_session(platform.ring_capacity)
            .map_err(|e| driver_error("WintunStartSession", e))?;

        tracing::debug!(
            name,
            tunnel_type,
            ring_capacity = platform.ring_capacity,
            "started wintun session"
        );

        let ring = Arc::new(WintunRing {
            session: Mutex::new(Some(Arc::new(session))),
            adapter: Mutex::new(Some(adapter)),
            closed: AtomicBool::new(false),
            leftover: Mutex::new(Leftover::default()),
            send_lock: Mutex::new(()),
        });
        Ok(
            Interface::from_transport(DeviceType::Tun, name, ring.clone(), Arc::new(NetshMtu))
                .with_vector(ring),
        )
    }
}

/// A wintun session.
///
/// `leftover` doubles as the read-side lock.
struct WintunRing {
    session: Mutex<Option<Arc<Session>>>,
    adapter: Mutex<Option<Arc<Adapter>>>,
    closed: AtomicBool,
    leftover: Mutex<Leftover>,
    send_lock: Mutex<()>,
}

impl WintunRing {
    fn session(&self) -> io::Result<Arc<Session>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(error::closed());
        }
        self.session
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .ok_or_else(error::closed)
    }

    fn io_error(&self, err: wintun::Error) -> io::Error {
        if self.closed.load(Ordering::Acquire) {
            error::closed()
        } else {
            io::Error::other(err.to_string())
        }
    }

    /// Submit one packet. A full ring drops it and reports 0 bytes.
    fn send(&self, session: &Arc<Session>, buf: &[u8]) -> io::Result<usize> {
        let len = u16::try_from(buf.len()).map_err(|_| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("packet of {} bytes exceeds the ring packet limit", buf.len()),
            )
        })?;
        let mut packet = match session.allocate_send_packet(len) {
            Ok(packet) => packet,
            Err(e) if is_ring_full(&e) => {
                tracing::trace!(len = buf.len(), "wintun ring full, dropping packet");
                return Ok(0);
            }
            Err(e) => return Err(self.io_error(e)),
        };
        packet.bytes_mut().copy_from_slice(buf);
        session.send_packet(packet);
        Ok(buf.len())
    }
}

/// `WintunAllocateSendPacket` fails with `ERROR_BUFFER_OVERFLOW` when the
/// send ring has no room left.
fn is_ring_full(err: &wintun::Error) -> bool {
    matches!(err, wintun::Error::Io(e) if e.raw_os_error() == Some(ERROR_BUFFER_OVERFLOW as i32))
}

impl Transport for WintunRing {
    fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        let mut leftover = self.leftover.lock().unwrap_or_else(|e| e.into_inner());
        if !leftover.is_empty() {
            return Ok(leftover.take_into(buf));
        }
        let session = self.session()?;
        let packet = session.receive_blocking().map_err(|e| self.io_error(e))?;
        Ok(leftover.deliver(packet.bytes(), buf))
    }

    fn write(&self, buf: &[u8]) -> io::Result<usize> {
        let _send = self.send_lock.lock().unwrap_or_else(|e| e.into_inner());
        let session = self.session()?;
        self.send(&session, buf)
    }

    fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let session = self.session.lock().unwrap_or_else(|e| e.into_inner()).take();
        let result = match &session {
            Some(session) => session
                .shutdown()
                .map_err(|e| driver_error("WintunEndSession", e)),
            None => Ok(()),
        };
        // Blocked readers hold their own reference; the session ends when the
        // last one returns.
        drop(session);
        self.adapter.lock().unwrap_or_else(|e| e.into_inner()).take();
        tracing::debug!(ok = result.is_ok(), "closed wintun session");
        result
    }
}

impl VectorIo for WintunRing {
    /// Blocks for the first packet, then drains whatever else the ring holds
    /// without waiting.
    fn read_vector(
        &self,
        bufs: &mut [&mut [u8]],
        sizes: &mut [usize],
    ) -> std::result::Result<usize, VectorError> {
        check_sizes(bufs.len(), sizes.len())?;
        if bufs.is_empty() {
            return Ok(0);
        }
        let mut leftover = self.leftover.lock().unwrap_or_else(|e| e.into_inner());
        let session = self.session().map_err(|e| VectorError::new(0, 0, e))?;

        let mut filled = 0;
        for (i, buf) in bufs.iter_mut().enumerate() {
            if !leftover.is_empty() {
                sizes[i] = leftover.take_into(buf);
                filled += 1;
                continue;
            }
            let packet = if i == 0 {
                session
                    .receive_blocking()
                    .map_err(|e| VectorError::new(i, 0, self.io_error(e)))?
            } else {
                match session.try_receive() {
                    Ok(Some(packet)) => packet,
                    Ok(None) => break,
                    Err(e) => return Err(VectorError::new(i, 0, self.io_error(e))),
                }
            };
            sizes[i] = leftover.deliver(packet.bytes(), buf);
            filled += 1;
        }
        Ok(filled)
    }

    /// Packets dropped on a full ring count as written.
    fn write_vector(&self, bufs: &[&[u8]]) -> std::result::Result<usize, VectorError> {
        let _send = self.send_lock.lock().unwrap_or_else(|e| e.into_inner());
        let session = self.session().map_err(|e| VectorError::new(0, 0, e))?;
        for (i, buf) in bufs.iter().enumerate() {
            self.send(&session, buf)
                .map_err(|e| VectorError::new(i, 0, e))?;
        }
        Ok(bufs.len())
    }

    fn is_vector_native(&self) -> bool {
        true
    }
}
