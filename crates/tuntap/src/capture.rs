//! BPF capture record parsing.
//!
//! A read from a BPF descriptor returns a batch of records. Each record is a
//! `bpf_hdr` followed by the captured frame, and each record starts on a
//! 4-byte boundary. [`RecordBuffer`] keeps the batch and hands frames out one
//! at a time.

use std::io;

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// BPF record alignment (`BPF_ALIGNMENT`).
pub(crate) const BPF_ALIGNMENT: usize = 4;

/// Round `len` up to the record alignment (`BPF_WORDALIGN`).
pub(crate) const fn word_align(len: usize) -> usize {
    (len + BPF_ALIGNMENT - 1) & !(BPF_ALIGNMENT - 1)
}

/// `struct bpf_hdr` with the 32-bit timestamp used by Darwin.
///
/// Only the leading fields are described; `hdrlen` gives the real offset of
/// the frame, including any trailing padding the kernel adds.
#[repr(C, packed)]
#[derive(Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub(crate) struct BpfHeader {
    /// Timestamp seconds.
    pub tv_sec: u32,
    /// Timestamp microseconds.
    pub tv_usec: u32,
    /// Captured length.
    pub caplen: u32,
    /// Original frame length on the wire.
    pub datalen: u32,
    /// Length of this header plus padding.
    pub hdrlen: u16,
}

impl BpfHeader {
    /// Parse from bytes.
    pub(crate) fn from_bytes(data: &[u8]) -> Option<Self> {
        Self::read_from_prefix(data).map(|(h, _)| h).ok()
    }
}

/// A batch of capture records read from the kernel in one call.
pub(crate) struct RecordBuffer {
    buf: Vec<u8>,
    start: usize,
    end: usize,
}

impl RecordBuffer {
    /// Create a buffer matching the descriptor's `BIOCSBLEN` size.
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            buf: vec![0; capacity],
            start: 0,
            end: 0,
        }
    }

    /// Whether every record of the current batch has been handed out.
    pub(crate) fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    /// Replace the batch with the result of one kernel read.
    pub(crate) fn refill(
        &mut self,
        read: impl FnOnce(&mut [u8]) -> io::Result<usize>,
    ) -> io::Result<()> {
        self.start = 0;
        self.end = 0;
        let n = read(&mut self.buf)?;
        self.end = n.min(self.buf.len());
        Ok(())
    }

    /// Copy the next frame into `out`, truncating it to `out.len()`.
    ///
    /// Returns `None` once the batch is exhausted. A record that claims more
    /// bytes than the batch holds discards the rest of the batch.
    pub(crate) fn next_frame(&mut self, out: &mut [u8]) -> io::Result<Option<usize>> {
        if self.is_empty() {
            return Ok(None);
        }

        let record = &self.buf[self.start..self.end];
        let Some(header) = BpfHeader::from_bytes(record) else {
            self.start = self.end;
            return Err(malformed("truncated bpf header"));
        };

        let hdrlen = header.hdrlen as usize;
        let caplen = header.caplen as usize;
        if hdrlen < size_of::<BpfHeader>() || hdrlen + caplen > record.len() {
            self.start = self.end;
            return Err(malformed("bpf record exceeds the capture buffer"));
        }

        let frame = &record[hdrlen..hdrlen + caplen];
        let n = frame.len().min(out.len());
        out[..n].copy_from_slice(&frame[..n]);

        self.start += word_align(hdrlen + caplen);
        Ok(Some(n))
    }
}

fn malformed(msg: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.to_string())
}
