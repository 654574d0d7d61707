//! Remainder of a packet that did not fit the caller's buffer.

use bytes::{Buf, Bytes};

/// Holds the unread tail of the last received packet.
///
/// The tail is served before any new packet is pulled, so packet order is
/// preserved even when callers read with small buffers.
#[derive(Debug, Default)]
pub(crate) struct Leftover {
    pending: Bytes,
}

impl Leftover {
    /// Whether a tail is waiting to be read.
    pub(crate) fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Copy as much of the pending tail as fits into `out`.
    pub(crate) fn take_into(&mut self, out: &mut [u8]) -> usize {
        let n = self.pending.len().min(out.len());
        self.pending.copy_to_slice(&mut out[..n]);
        n
    }

    /// Copy `packet` into `out`; keep whatever does not fit.
    pub(crate) fn deliver(&mut self, packet: &[u8], out: &mut [u8]) -> usize {
        let n = packet.len().min(out.len());
        out[..n].copy_from_slice(&packet[..n]);
        if n < packet.len() {
            self.pending = Bytes::copy_from_slice(&packet[n..]);
        }
        n
    }
}
