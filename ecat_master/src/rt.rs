//! Real-time setup of the cyclic thread.
//!
//! Applied once, on the thread that will run the cycle, right before the
//! supervisor gate:
//! 1. `sched_setaffinity` - pin to one CPU core.
//! 2. `mlockall(MCL_CURRENT | MCL_FUTURE)` - lock all pages.
//! 3. Prefault `MAX_SAFE_STACK` bytes of stack.
//! 4. `sched_setscheduler(SCHED_FIFO, priority)`.
//!
//! Each step is best-effort: a failure is logged and startup continues,
//! unless `strict` is set.

use ecat_common::config::RtConfig;
use ecat_common::consts::MAX_SAFE_STACK;
use std::fmt;
use thiserror::Error;
use tracing::{info, warn};

/// One step of the setup sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RtStep {
    /// CPU pinning.
    PinCpu,
    /// Memory locking.
    LockMemory,
    /// Stack prefault.
    PrefaultStack,
    /// SCHED_FIFO priority.
    SetPriority,
}

impl fmt::Display for RtStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RtStep::PinCpu => "cpu affinity",
            RtStep::LockMemory => "mlockall",
            RtStep::PrefaultStack => "stack prefault",
            RtStep::SetPriority => "SCHED_FIFO",
        })
    }
}

/// Result of one step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// Step succeeded.
    Applied,
    /// Step disabled by configuration.
    Skipped,
    /// Step failed; execution continued.
    Failed(String),
}

impl StepOutcome {
    /// Whether the step took effect.
    pub fn is_applied(&self) -> bool {
        matches!(self, StepOutcome::Applied)
    }

    fn label(&self) -> &'static str {
        match self {
            StepOutcome::Applied => "applied",
            StepOutcome::Skipped => "skipped",
            StepOutcome::Failed(_) => "failed",
        }
    }
}

/// Outcome of every step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtReport {
    /// CPU pinning.
    pub pin_cpu: StepOutcome,
    /// Memory locking.
    pub lock_memory: StepOutcome,
    /// Stack prefault.
    pub prefault_stack: StepOutcome,
    /// SCHED_FIFO priority.
    pub set_priority: StepOutcome,
}

impl RtReport {
    /// Whether every enabled step succeeded.
    pub fn fully_applied(&self) -> bool {
        [
            &self.pin_cpu,
            &self.lock_memory,
            &self.prefault_stack,
            &self.set_priority,
        ]
        .iter()
        .all(|o| !matches!(o, StepOutcome::Failed(_)))
    }
}

/// A step failed while `strict` was set.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("real-time setup step '{step}' failed: {reason}")]
pub struct RtSetupError {
    /// Failing step.
    pub step: RtStep,
    /// OS error text.
    pub reason: String,
}

/// Applies [`RtConfig`] to the calling thread.
#[derive(Debug, Clone)]
pub struct RealTimeScheduler {
    config: RtConfig,
}

impl RealTimeScheduler {
    /// Scheduler for `config`.
    pub fn new(config: &RtConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// Run the setup sequence on the calling thread.
    ///
    /// # Errors
    /// Returns the first failing step if `strict` is set.
    pub fn apply(&self) -> Result<RtReport, RtSetupError> {
        let c = &self.config;
        let core = c.cpu_core;
        let priority = c.priority;

        let report = RtReport {
            pin_cpu: self.step(RtStep::PinCpu, c.pin_cpu, || set_affinity(core))?,
            lock_memory: self.step(RtStep::LockMemory, c.lock_memory, lock_memory)?,
            prefault_stack: self.step(RtStep::PrefaultStack, c.prefault_stack, || {
                prefault_stack();
                Ok(())
            })?,
            set_priority: self.step(RtStep::SetPriority, c.set_priority, || {
                set_fifo_priority(priority)
            })?,
        };

        info!(
            cpu = %report.pin_cpu.label(),
            mlockall = %report.lock_memory.label(),
            prefault = %report.prefault_stack.label(),
            sched_fifo = %report.set_priority.label(),
            "Real-time setup done"
        );
        Ok(report)
    }

    fn step(
        &self,
        step: RtStep,
        enabled: bool,
        run: impl FnOnce() -> Result<(), String>,
    ) -> Result<StepOutcome, RtSetupError> {
        if !enabled {
            return Ok(StepOutcome::Skipped);
        }
        match run() {
            Ok(()) => Ok(StepOutcome::Applied),
            Err(reason) if self.config.strict => Err(RtSetupError { step, reason }),
            Err(reason) => {
                warn!("{step} failed, continuing without it: {reason}");
                Ok(StepOutcome::Failed(reason))
            }
        }
    }
}

/// Pin the calling thread to `cpu`.
fn set_affinity(cpu: usize) -> Result<(), String> {
    use nix::sched::{CpuSet, sched_setaffinity};
    use nix::unistd::Pid;

    let mut cpuset = CpuSet::new();
    cpuset
        .set(cpu)
        .map_err(|e| format!("CpuSet::set({cpu}) failed: {e}"))?;
    sched_setaffinity(Pid::from_raw(0), &cpuset)
        .map_err(|e| format!("sched_setaffinity({cpu}) failed: {e}"))
}

/// Lock all current and future pages.
fn lock_memory() -> Result<(), String> {
    use nix::sys::mman::{MlockAllFlags, mlockall};
    mlockall(MlockAllFlags::MCL_CURRENT | MlockAllFlags::MCL_FUTURE)
        .map_err(|e| format!("mlockall failed: {e}"))
}

/// Touch `MAX_SAFE_STACK` bytes of stack so the pages are resident.
#[inline(never)]
fn prefault_stack() {
    let mut buf = [0u8; MAX_SAFE_STACK];
    for byte in buf.iter_mut() {
        // SAFETY: `byte` is a valid exclusive reference.
        unsafe { core::ptr::write_volatile(byte, 0) };
    }
    core::hint::black_box(&buf);
}

/// Switch the calling thread to SCHED_FIFO at `priority`.
fn set_fifo_priority(priority: i32) -> Result<(), String> {
    let param = libc::sched_param {
        sched_priority: priority,
    };
    // SAFETY: `param` is a valid sched_param; pid 0 is the calling thread.
    let ret = unsafe { libc::sched_setscheduler(0, libc::SCHED_FIFO, &param) };
    if ret != 0 {
        let err = std::io::Error::last_os_error();
        return Err(format!("sched_setscheduler(SCHED_FIFO, {priority}) failed: {err}"));
    }
    Ok(())
}
