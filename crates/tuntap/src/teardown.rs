//! Rollback and close of multi-resource interfaces.
//!
//! A bridged TAP device owns several OS objects: virtual interfaces created
//! with an external command plus descriptors opened afterwards. [`Teardown`]
//! records each one as it is acquired and releases all of them later, either
//! to roll back a failed open or to close a live device.
//!
//! Descriptors are closed first, newest first. Interfaces are destroyed
//! afterwards in creation order. Every step runs even if an earlier one
//! failed; failures are collected with [`Error::aggregate`].

use crate::error::{Error, Result};

type Closer = Box<dyn FnOnce() -> Result<()> + Send>;
type Destroy = Box<dyn Fn(&str) -> Result<()> + Send + Sync>;

pub(crate) struct Teardown {
    closers: Vec<(&'static str, Closer)>,
    interfaces: Vec<String>,
    destroy: Destroy,
}

impl Teardown {
    /// Create an empty teardown that destroys interfaces with `destroy`.
    pub(crate) fn new(destroy: impl Fn(&str) -> Result<()> + Send + Sync + 'static) -> Self {
        Self {
            closers: Vec::new(),
            interfaces: Vec::new(),
            destroy: Box::new(destroy),
        }
    }

    /// Register a created interface.
    pub(crate) fn push_interface(&mut self, name: impl Into<String>) {
        self.interfaces.push(name.into());
    }

    /// Register an opened resource.
    pub(crate) fn push_closer(
        &mut self,
        what: &'static str,
        close: impl FnOnce() -> Result<()> + Send + 'static,
    ) {
        self.closers.push((what, Box::new(close)));
    }

    /// Release everything registered so far.
    pub(crate) fn run(&mut self) -> Result<()> {
        let mut errors = Vec::new();

        while let Some((what, close)) = self.closers.pop() {
            tracing::debug!(resource = what, "closing");
            if let Err(e) = close() {
                tracing::warn!(resource = what, error = %e, "close failed");
                errors.push(e);
            }
        }

        for name in self.interfaces.drain(..) {
            tracing::debug!(interface = %name, "destroying");
            if let Err(e) = (self.destroy)(&name) {
                tracing::warn!(interface = %name, error = %e, "destroy failed");
                errors.push(e);
            }
        }

        Error::aggregate(errors)
    }

    /// Roll back after `err`, keeping `err` as the primary cause.
    pub(crate) fn rollback(mut self, err: Error) -> Error {
        match self.run() {
            Ok(()) => err,
            Err(Error::Aggregate(mut more)) => {
                more.insert(0, err);
                Error::Aggregate(more)
            }
            Err(other) => Error::Aggregate(vec![err, other]),
        }
    }
}
