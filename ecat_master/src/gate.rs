//! Supervisor gate: hold the cycle until the supervisor enables it.

use crate::shutdown::ShutdownController;
use ecat_shm::{FutexWait, futex_wait};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tracing::{debug, info};

/// How the gate was left.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateOutcome {
    /// The supervisor flag was set.
    Enabled,
    /// Shutdown was requested first.
    Cancelled,
}

/// Blocks on the supervisor flag word.
///
/// Each wait is a futex wait on the flag bounded by `poll_interval`, so a
/// supervisor that only stores the flag (and never wakes) is still seen
/// within one interval, as is a shutdown request.
#[derive(Debug, Clone, Copy)]
pub struct SupervisorGate {
    poll_interval: Duration,
}

impl SupervisorGate {
    /// Gate polling at most every `poll_interval`.
    pub fn new(poll_interval: Duration) -> Self {
        Self { poll_interval }
    }

    /// Poll interval.
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Wait until `flag` is non-zero or shutdown is requested.
    ///
    /// Shutdown takes precedence when both hold.
    pub fn wait(&self, flag: &AtomicU32, shutdown: &ShutdownController) -> GateOutcome {
        let mut logged = false;
        loop {
            if shutdown.is_requested() {
                info!("Shutdown requested while waiting for supervisor");
                return GateOutcome::Cancelled;
            }
            let value = flag.load(Ordering::Acquire);
            if value != 0 {
                info!("Supervisor enabled, starting cyclic exchange");
                return GateOutcome::Enabled;
            }
            if !logged {
                info!(
                    poll_ms = self.poll_interval.as_millis() as u64,
                    "Waiting for supervisor"
                );
                logged = true;
            }
            let woke = futex_wait(flag, value, self.poll_interval);
            if woke != FutexWait::TimedOut {
                debug!(?woke, "Gate wait returned early");
            }
        }
    }
}
