//! Cooperative stop requests.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Clonable stop flag.  Any clone may request a stop, from any thread or a
/// signal handler; the main loop checks it between steps.
#[derive(Clone, Debug, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}
