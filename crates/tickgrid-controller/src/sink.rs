//! The host's writable rate slot.

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

/// Capability to set the host's current rate.
///
/// Injected at construction; the controller is the only writer while it
/// is alive.
pub trait RateSink: Send + Sync {
    fn apply_rate(&self, rate: i32);
}

impl<F> RateSink for F
where
    F: Fn(i32) + Send + Sync,
{
    fn apply_rate(&self, rate: i32) {
        self(rate)
    }
}

/// A rate slot shared between the controller and whoever reads it.
#[derive(Debug, Clone, Default)]
pub struct SharedRate(Arc<AtomicI32>);

impl SharedRate {
    pub fn new(initial: i32) -> Self {
        Self(Arc::new(AtomicI32::new(initial)))
    }

    pub fn get(&self) -> i32 {
        self.0.load(Ordering::Acquire)
    }
}

impl RateSink for SharedRate {
    fn apply_rate(&self, rate: i32) {
        self.0.store(rate, Ordering::Release);
    }
}
