//! Cooperative shutdown flag.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Process-wide cancellation flag.
///
/// Cloning shares the flag. The gate observes it within one poll interval,
/// the cyclic task within one period.
#[derive(Debug, Clone, Default)]
pub struct ShutdownController {
    requested: Arc<AtomicBool>,
}

impl ShutdownController {
    /// Controller with the flag cleared.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request shutdown.
    #[inline]
    pub fn request(&self) {
        self.requested.store(true, Ordering::SeqCst);
    }

    /// Whether shutdown was requested.
    #[inline]
    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    /// Set the flag on SIGINT. The handler does nothing else.
    pub fn install_signal_handler(&self) -> Result<(), ctrlc::Error> {
        let requested = Arc::clone(&self.requested);
        ctrlc::set_handler(move || {
            requested.store(true, Ordering::SeqCst);
        })
    }
}
