//! Batched (vectorized) packet I/O.
//!
//! Every [`Interface`](crate::Interface) exposes [`VectorIo`]. Transports
//! with a genuine batched driver path implement it natively; everything else
//! gets [`ScalarVector`], which issues one scalar call per buffer.

use std::io;
use std::sync::Arc;

use crate::transport::Transport;

/// Failure part-way through a batch.
///
/// Buffers before `index` were fully transferred; buffers after it were not
/// attempted.
#[derive(Debug, thiserror::Error)]
#[error("vector I/O failed at buffer {index} after {partial} bytes: {source}")]
pub struct VectorError {
    /// Index of the buffer that failed.
    pub index: usize,
    /// Bytes transferred for the failing buffer.
    pub partial: usize,
    /// The underlying error.
    #[source]
    pub source: io::Error,
}

impl VectorError {
    /// Create a new vector error.
    pub fn new(index: usize, partial: usize, source: io::Error) -> Self {
        Self {
            index,
            partial,
            source,
        }
    }
}

impl From<VectorError> for io::Error {
    fn from(err: VectorError) -> Self {
        io::Error::new(err.source.kind(), err)
    }
}

/// Batched read/write of several independent packets.
pub trait VectorIo: Send + Sync {
    /// Read up to `bufs.len()` packets, storing each length in `sizes`.
    ///
    /// Returns the number of buffers filled. `sizes` must be at least as long
    /// as `bufs`.
    fn read_vector(&self, bufs: &mut [&mut [u8]], sizes: &mut [usize])
    -> Result<usize, VectorError>;

    /// Write every buffer as its own packet, returning the number written.
    fn write_vector(&self, bufs: &[&[u8]]) -> Result<usize, VectorError>;

    /// Whether a batch costs fewer driver calls than the same scalar calls.
    fn is_vector_native(&self) -> bool;
}

/// Scalar fallback: one transport call per buffer, stopping at the first
/// failure.
pub struct ScalarVector {
    transport: Arc<dyn Transport>,
}

impl ScalarVector {
    /// Wrap a transport.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }
}

impl VectorIo for ScalarVector {
    fn read_vector(
        &self,
        bufs: &mut [&mut [u8]],
        sizes: &mut [usize],
    ) -> Result<usize, VectorError> {
        check_sizes(bufs.len(), sizes.len())?;
        for (i, buf) in bufs.iter_mut().enumerate() {
            sizes[i] = self
                .transport
                .read(buf)
                .map_err(|e| VectorError::new(i, 0, e))?;
        }
        Ok(bufs.len())
    }

    fn write_vector(&self, bufs: &[&[u8]]) -> Result<usize, VectorError> {
        for (i, buf) in bufs.iter().enumerate() {
            let n = self
                .transport
                .write(buf)
                .map_err(|e| VectorError::new(i, 0, e))?;
            if n != buf.len() {
                return Err(VectorError::new(
                    i,
                    n,
                    io::Error::new(
                        io::ErrorKind::WriteZero,
                        format!("expected to write {} but wrote {}", buf.len(), n),
                    ),
                ));
            }
        }
        Ok(bufs.len())
    }

    fn is_vector_native(&self) -> bool {
        false
    }
}

/// Reject a `sizes` slice too short for the batch.
pub(crate) fn check_sizes(bufs: usize, sizes: usize) -> Result<(), VectorError> {
    if sizes < bufs {
        return Err(VectorError::new(
            0,
            0,
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("sizes holds {sizes} entries for {bufs} buffers"),
            ),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Transport scripted with one outcome per call.
    #[derive(Default)]
    struct Scripted {
        reads: Mutex<VecDeque<io::Result<Vec<u8>>>>,
        writes: Mutex<VecDeque<io::Result<usize>>>,
        written: Mutex<Vec<Vec<u8>>>,
    }

    impl Transport for Scripted {
        fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
            let packet = self.reads.lock().unwrap().pop_front().unwrap()?;
            buf[..packet.len()].copy_from_slice(&packet);
            Ok(packet.len())
        }

        fn write(&self, buf: &[u8]) -> io::Result<usize> {
            self.written.lock().unwrap().push(buf.to_vec());
            self.writes.lock().unwrap().pop_front().unwrap()
        }

        fn close(&self) -> crate::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_write_vector_all() {
        let transport = Arc::new(Scripted::default());
        transport
            .writes
            .lock()
            .unwrap()
            .extend([Ok(3), Ok(2), Ok(4)]);
        let vector = ScalarVector::new(transport.clone());

        let bufs: [&[u8]; 3] = [b"abc", b"de", b"fghi"];
        let n = vector.write_vector(&bufs).unwrap();
        assert_eq!(n, 3);
        assert_eq!(transport.written.lock().unwrap().len(), 3);
    }

    #[test]
    fn test_write_vector_short_write_stops() {
        let transport = Arc::new(Scripted::default());
        transport
            .writes
            .lock()
            .unwrap()
            .extend([Ok(3), Ok(1), Ok(4)]);
        let vector = ScalarVector::new(transport.clone());

        let bufs: [&[u8]; 3] = [b"abc", b"de", b"fghi"];
        let err = vector.write_vector(&bufs).unwrap_err();
        assert_eq!(err.index, 1);
        assert_eq!(err.partial, 1);
        assert_eq!(err.source.kind(), io::ErrorKind::WriteZero);

        // The third buffer was never attempted.
        let written = transport.written.lock().unwrap();
        assert_eq!(written.len(), 2);
        assert_eq!(written[1], b"de");
    }

    #[test]
    fn test_write_vector_error_stops() {
        let transport = Arc::new(Scripted::default());
        transport.writes.lock().unwrap().extend([
            Ok(1),
            Err(io::Error::from(io::ErrorKind::BrokenPipe)),
            Ok(1),
        ]);
        let vector = ScalarVector::new(transport.clone());

        let bufs: [&[u8]; 3] = [b"a", b"b", b"c"];
        let err = vector.write_vector(&bufs).unwrap_err();
        assert_eq!(err.index, 1);
        assert_eq!(err.partial, 0);
        assert_eq!(err.source.kind(), io::ErrorKind::BrokenPipe);
        assert_eq!(transport.written.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_read_vector() {
        let transport = Arc::new(Scripted::default());
        transport.reads.lock().unwrap().extend([
            Ok(b"one".to_vec()),
            Ok(b"three".to_vec()),
            Err(io::Error::from(io::ErrorKind::Interrupted)),
        ]);
        let vector = ScalarVector::new(transport);

        let mut a = [0u8; 16];
        let mut b = [0u8; 16];
        let mut c = [0u8; 16];
        let mut sizes = [0usize; 3];
        let mut bufs: [&mut [u8]; 3] = [&mut a, &mut b, &mut c];

        let err = vector.read_vector(&mut bufs, &mut sizes).unwrap_err();
        assert_eq!(err.index, 2);
        assert_eq!(sizes[..2], [3, 5]);
        assert_eq!(&bufs[1][..5], b"three");
    }

    #[test]
    fn test_read_vector_sizes_too_short() {
        let vector = ScalarVector::new(Arc::new(Scripted::default()));
        let mut a = [0u8; 4];
        let mut bufs: [&mut [u8]; 1] = [&mut a];
        let err = vector.read_vector(&mut bufs, &mut []).unwrap_err();
        assert_eq!(err.source.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn test_not_native() {
        let vector = ScalarVector::new(Arc::new(Scripted::default()));
        assert!(!vector.is_vector_native());
    }
}
