//! Deterministic cyclic exchange: receive → health → feedback → commands →
//! send → cancellation check.
//!
//! ## Pacing
//! Absolute-time sleep on `CLOCK_MONOTONIC` (`clock_nanosleep` with
//! `TIMER_ABSTIME`) for drift-free periods. A cycle that ends past its
//! deadline counts as an overrun and re-phases the schedule from its end;
//! overruns never stop the loop.
//!
//! ## Faults
//! Send/receive failures and health changes are logged on transition only.
//! The loop keeps running; there is no retry.

use crate::channel::SharedMemoryChannel;
use crate::lifecycle::{LifecycleState, MasterLifecycleManager};
use crate::shutdown::ShutdownController;
use ecat_common::consts::MAX_JOINTS;
use ecat_common::fieldbus::driver::BusError;
use ecat_common::fieldbus::types::{BusState, DomainState, WcState};
use ecat_common::shm::records::{FeedbackTable, JointFeedback, MasterStatus};
use nix::sys::time::TimeSpec;
use nix::time::{ClockId, ClockNanosleepFlags, clock_gettime, clock_nanosleep};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

// ─── Cycle Statistics ──────────────────────────────────────────────

/// O(1) per-cycle timing statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleStats {
    /// Total cycles executed.
    pub cycle_count: u64,
    /// Last cycle duration [ns].
    pub last_cycle_ns: i64,
    /// Minimum cycle duration [ns].
    pub min_cycle_ns: i64,
    /// Maximum cycle duration [ns].
    pub max_cycle_ns: i64,
    /// Running sum for average computation.
    pub sum_cycle_ns: i64,
    /// Cycles that ended past their deadline.
    pub overruns: u64,
    /// Maximum wake-up latency [ns] (actual wake minus scheduled wake).
    pub max_latency_ns: i64,
}

impl CycleStats {
    /// Create a new zeroed stats instance.
    pub const fn new() -> Self {
        Self {
            cycle_count: 0,
            last_cycle_ns: 0,
            min_cycle_ns: i64::MAX,
            max_cycle_ns: 0,
            sum_cycle_ns: 0,
            overruns: 0,
            max_latency_ns: 0,
        }
    }

    /// Record a cycle duration. O(1), no allocation.
    #[inline]
    pub fn record(&mut self, duration_ns: i64, latency_ns: i64) {
        self.cycle_count += 1;
        self.last_cycle_ns = duration_ns;
        self.min_cycle_ns = self.min_cycle_ns.min(duration_ns);
        self.max_cycle_ns = self.max_cycle_ns.max(duration_ns);
        self.sum_cycle_ns = self.sum_cycle_ns.saturating_add(duration_ns);
        self.max_latency_ns = self.max_latency_ns.max(latency_ns);
    }

    /// Average cycle time [ns] (returns 0 if no cycles).
    #[inline]
    pub fn avg_cycle_ns(&self) -> i64 {
        if self.cycle_count == 0 {
            0
        } else {
            self.sum_cycle_ns / self.cycle_count as i64
        }
    }
}

impl Default for CycleStats {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Health Monitoring ─────────────────────────────────────────────

/// Logs bus and domain health, but only when it changes.
#[derive(Debug, Default)]
pub struct BusHealthMonitor {
    bus: Option<BusState>,
    domain: Option<DomainState>,
}

impl BusHealthMonitor {
    /// Monitor with no previous observation.
    pub fn new() -> Self {
        Self::default()
    }

    /// Compare with the previous observation and log differences.
    ///
    /// Returns `true` if anything changed.
    pub fn observe(&mut self, bus: BusState, domain: DomainState) -> bool {
        let mut changed = false;

        if self.bus != Some(bus) {
            let previous = self.bus.unwrap_or_default();
            if previous.slaves_responding != bus.slaves_responding {
                info!(slaves = bus.slaves_responding, "Slaves responding changed");
            }
            if previous.al_states != bus.al_states {
                info!(al_states = bus.al_states.bits(), "AL states changed");
            }
            if previous.link_up != bus.link_up {
                if bus.link_up {
                    info!("Link is up");
                } else {
                    warn!("Link is down");
                }
            }
            self.bus = Some(bus);
            changed = true;
        }

        if self.domain != Some(domain) {
            let previous = self.domain.unwrap_or_default();
            if previous.working_counter != domain.working_counter {
                debug!(wc = domain.working_counter, "Domain working counter changed");
            }
            if previous.wc_state != domain.wc_state {
                match domain.wc_state {
                    WcState::Complete => info!("Domain WC state: complete"),
                    WcState::Incomplete => warn!("Domain WC state: incomplete"),
                    WcState::Zero => warn!("Domain WC state: zero"),
                }
            }
            self.domain = Some(domain);
            changed = true;
        }

        changed
    }
}

/// Remembers whether an I/O direction is failing, to log transitions only.
#[derive(Debug, Default)]
struct IoFaultLatch {
    failing: bool,
    failures: u64,
}

impl IoFaultLatch {
    fn update(&mut self, direction: &'static str, result: Result<(), BusError>) {
        match result {
            Ok(()) if self.failing => {
                self.failing = false;
                info!(direction, "Frame exchange recovered");
            }
            Ok(()) => {}
            Err(e) => {
                self.failures += 1;
                if !self.failing {
                    self.failing = true;
                    error!(direction, "Frame exchange failed: {e}");
                }
            }
        }
    }
}

// ─── Cyclic Task ───────────────────────────────────────────────────

/// Errors that stop the cyclic task.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CycleError {
    /// The master is not activated.
    #[error("cyclic exchange requires an activated master (state {0:?})")]
    NotActivated(LifecycleState),

    /// Reading the monotonic clock failed.
    #[error("clock_gettime failed: {0}")]
    Clock(nix::Error),
}

/// Final counters of a finished run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleSummary {
    /// Timing statistics.
    pub stats: CycleStats,
    /// Cycles in which `receive` failed.
    pub receive_failures: u64,
    /// Cycles in which `send` failed.
    pub send_failures: u64,
    /// Cycles that reused the previous command snapshot.
    pub torn_command_reads: u64,
}

/// The per-period exchange between the domain and shared memory.
pub struct CyclicTask<'a> {
    master: &'a mut MasterLifecycleManager,
    channel: &'a mut SharedMemoryChannel,
    shutdown: &'a ShutdownController,
    period_ns: i64,
    feedback: FeedbackTable,
    health: BusHealthMonitor,
    receive: IoFaultLatch,
    send: IoFaultLatch,
    stats: CycleStats,
}

impl<'a> CyclicTask<'a> {
    /// Task exchanging `master`'s domain with `channel` every `period`.
    pub fn new(
        master: &'a mut MasterLifecycleManager,
        channel: &'a mut SharedMemoryChannel,
        shutdown: &'a ShutdownController,
        period: Duration,
    ) -> Self {
        Self {
            master,
            channel,
            shutdown,
            period_ns: period.as_nanos().min(i64::MAX as u128) as i64,
            feedback: [JointFeedback::default(); MAX_JOINTS],
            health: BusHealthMonitor::new(),
            receive: IoFaultLatch::default(),
            send: IoFaultLatch::default(),
            stats: CycleStats::new(),
        }
    }

    /// Run until shutdown is requested.
    ///
    /// The cycle in progress when the flag is set completes (its send is
    /// issued); no further cycle starts.
    pub fn run(mut self) -> Result<CycleSummary, CycleError> {
        let state = self.master.state();
        if state != LifecycleState::Activated {
            return Err(CycleError::NotActivated(state));
        }

        let clock = ClockId::CLOCK_MONOTONIC;
        let now = || clock_gettime(clock).map_err(CycleError::Clock);

        self.channel.publish_status(MasterStatus::Running);
        info!(
            period_us = self.period_ns / 1000,
            joints = self.master.catalog().len(),
            "Cyclic exchange started"
        );

        let mut wake = now()?;
        let mut next_wake = wake;
        loop {
            let cycle_start = wake;
            let latency_ns = timespec_diff_ns(&cycle_start, &next_wake).max(0);
            next_wake = timespec_add_ns(next_wake, self.period_ns);

            self.cycle_body();

            let cycle_end = now()?;
            self.stats
                .record(timespec_diff_ns(&cycle_end, &cycle_start), latency_ns);

            // Step 6: leave without starting another cycle.
            if self.shutdown.is_requested() {
                break;
            }

            if timespec_diff_ns(&cycle_end, &next_wake) > 0 {
                self.stats.overruns += 1;
                next_wake = cycle_end;
            }

            // EINTR only shortens the sleep; the next cycle starts early at worst.
            let _ = clock_nanosleep(clock, ClockNanosleepFlags::TIMER_ABSTIME, &next_wake);
            wake = now()?;

            // A request that arrived during the sleep: no new cycle.
            if self.shutdown.is_requested() {
                break;
            }
        }

        let summary = CycleSummary {
            stats: self.stats.clone(),
            receive_failures: self.receive.failures,
            send_failures: self.send.failures,
            torn_command_reads: self.channel.torn_reads(),
        };
        info!(
            cycles = summary.stats.cycle_count,
            avg_ns = summary.stats.avg_cycle_ns(),
            max_ns = summary.stats.max_cycle_ns,
            max_latency_ns = summary.stats.max_latency_ns,
            overruns = summary.stats.overruns,
            receive_failures = summary.receive_failures,
            send_failures = summary.send_failures,
            torn_command_reads = summary.torn_command_reads,
            "Cyclic exchange stopped"
        );
        Ok(summary)
    }

    /// One cycle, steps 1-5.
    #[inline]
    fn cycle_body(&mut self) {
        // 1. Receive.
        let received = self.master.receive();
        self.receive.update("receive", received);

        // 2. Health, logged on change.
        let bus = self.master.bus_state();
        let domain = self.master.domain_state();
        self.health.observe(bus, domain);

        // 3./4. Feedback out, commands in.
        if let Some((catalog, pd)) = self.master.process_image() {
            catalog.copy_feedback(pd, &mut self.feedback);
            self.channel.publish_feedback(&self.feedback);

            let commands = self.channel.read_commands();
            catalog.copy_commands(commands, pd);
        }

        // 5. Send.
        let sent = self.master.send();
        self.send.update("send", sent);

        self.channel.heartbeat();
    }
}

// ─── Time Helpers ──────────────────────────────────────────────────

/// Add nanoseconds to a TimeSpec.
fn timespec_add_ns(ts: TimeSpec, ns: i64) -> TimeSpec {
    let mut secs = ts.tv_sec();
    let mut nanos = ts.tv_nsec() + ns;
    while nanos >= 1_000_000_000 {
        secs += 1;
        nanos -= 1_000_000_000;
    }
    while nanos < 0 {
        secs -= 1;
        nanos += 1_000_000_000;
    }
    TimeSpec::new(secs, nanos)
}

/// Compute the difference (a - b) in nanoseconds.
fn timespec_diff_ns(a: &TimeSpec, b: &TimeSpec) -> i64 {
    (a.tv_sec() - b.tv_sec()) * 1_000_000_000 + (a.tv_nsec() - b.tv_nsec())
}

// ─── Tests ─────────────────────────────────────────────────────────
