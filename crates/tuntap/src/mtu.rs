//! System-wide MTU ceiling.
//!
//! Some virtual interfaces (macOS `feth`) refuse an MTU above a global
//! limit. [`MtuCeiling`] remembers the limit once read and raises it at most
//! once per larger request.

use std::sync::Mutex;

use crate::error::Result;

/// Backing store of the ceiling (a sysctl in production).
pub(crate) trait CeilingStore: Send + Sync {
    /// Read the current ceiling.
    fn get(&self) -> Result<u32>;

    /// Write a new ceiling.
    fn set(&self, value: u32) -> Result<()>;
}

/// Cached ceiling guarded by its own lock.
pub(crate) struct MtuCeiling<S> {
    store: S,
    /// Zero until the store has been read.
    cached: Mutex<u32>,
}

impl<S: CeilingStore> MtuCeiling<S> {
    pub(crate) fn new(store: S) -> Self {
        Self {
            store,
            cached: Mutex::new(0),
        }
    }

    /// Make sure the ceiling is at least `mtu`.
    pub(crate) fn ensure(&self, mtu: u32) -> Result<()> {
        let mut cached = self.cached.lock().unwrap_or_else(|e| e.into_inner());
        if *cached == 0 {
            *cached = self.store.get()?;
        }
        if mtu <= *cached {
            return Ok(());
        }

        self.store.set(mtu)?;
        tracing::debug!(from = *cached, to = mtu, "raised MTU ceiling");
        *cached = mtu;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

    struct FakeSysctl {
        value: AtomicU32,
        gets: AtomicUsize,
        sets: AtomicUsize,
        fail_set: bool,
    }

    impl FakeSysctl {
        fn new(value: u32) -> Self {
            Self {
                value: AtomicU32::new(value),
                gets: AtomicUsize::new(0),
                sets: AtomicUsize::new(0),
                fail_set: false,
            }
        }
    }

    impl CeilingStore for &FakeSysctl {
        fn get(&self) -> Result<u32> {
            self.gets.fetch_add(1, Ordering::SeqCst);
            Ok(self.value.load(Ordering::SeqCst))
        }

        fn set(&self, value: u32) -> Result<()> {
            if self.fail_set {
                return Err(Error::syscall(
                    "sysctlbyname",
                    std::io::Error::from_raw_os_error(1),
                ));
            }
            self.sets.fetch_add(1, Ordering::SeqCst);
            self.value.store(value, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn test_below_ceiling_reads_once() {
        let sysctl = FakeSysctl::new(1500);
        let ceiling = MtuCeiling::new(&sysctl);

        ceiling.ensure(1400).unwrap();
        ceiling.ensure(1500).unwrap();

        assert_eq!(sysctl.gets.load(Ordering::SeqCst), 1);
        assert_eq!(sysctl.sets.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_raise_once() {
        let sysctl = FakeSysctl::new(1500);
        let ceiling = MtuCeiling::new(&sysctl);

        ceiling.ensure(9000).unwrap();
        ceiling.ensure(9000).unwrap();
        ceiling.ensure(4000).unwrap();

        assert_eq!(sysctl.sets.load(Ordering::SeqCst), 1);
        assert_eq!(sysctl.value.load(Ordering::SeqCst), 9000);

        ceiling.ensure(9001).unwrap();
        assert_eq!(sysctl.sets.load(Ordering::SeqCst), 2);
        assert_eq!(sysctl.gets.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failed_raise_is_not_cached() {
        let mut sysctl = FakeSysctl::new(1500);
        sysctl.fail_set = true;
        let ceiling = MtuCeiling::new(&sysctl);

        let err = ceiling.ensure(9000).unwrap_err();
        assert!(err.is_permission_denied());
        assert!(ceiling.ensure(9000).is_err());
        assert!(ceiling.ensure(1500).is_ok());
    }
}
