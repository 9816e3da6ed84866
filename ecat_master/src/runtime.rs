//! Startup, gate, cycle and teardown, in that order.
//!
//! ```text
//! acquire → domain → configure joints → open regions → activate
//!   → publish "waiting" → RT setup → gate ─enabled─► cycle
//!                                        └cancelled─► (no cycle)
//! → teardown → publish "stopped"
//! ```
//!
//! The regions are opened only after the bus is configured, so a missing
//! bus never creates them. Teardown runs on every path, including errors.

use crate::channel::SharedMemoryChannel;
use crate::cycle::{CycleError, CycleSummary, CyclicTask};
use crate::driver_registry::RegistryError;
use crate::error::MasterError;
use crate::gate::{GateOutcome, SupervisorGate};
use crate::lifecycle::{LifecycleSettings, MasterLifecycleManager};
use crate::rt::{RealTimeScheduler, RtReport, RtSetupError};
use crate::shutdown::ShutdownController;
use ecat_common::config::{ConfigError, MasterConfig};
use ecat_common::fieldbus::driver::FieldbusDriver;
use ecat_common::shm::records::MasterStatus;
use ecat_shm::ShmError;
use thiserror::Error;
use tracing::info;

/// Anything that ends a run early.
#[derive(Debug, Error)]
pub enum RunError {
    /// Configuration could not be loaded or is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The configured driver does not exist.
    #[error(transparent)]
    Driver(#[from] RegistryError),

    /// Bus acquisition, configuration or activation failed.
    #[error(transparent)]
    Master(#[from] MasterError),

    /// A shared region could not be opened.
    #[error(transparent)]
    SharedMemory(#[from] ShmError),

    /// Real-time setup failed in strict mode.
    #[error(transparent)]
    RtSetup(#[from] RtSetupError),

    /// The cyclic task could not run.
    #[error(transparent)]
    Cycle(#[from] CycleError),
}

/// What a completed run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// Real-time setup outcome.
    pub rt: RtReport,
    /// Cycle counters; `None` if shutdown came before the supervisor.
    pub cycle: Option<CycleSummary>,
}

impl RunSummary {
    /// Whether the gate opened and the cycle ran.
    pub fn entered_cycle(&self) -> bool {
        self.cycle.is_some()
    }
}

/// Run the master on `driver` until shutdown.
///
/// # Errors
/// Returns the first startup failure. Cycle-time faults are logged, never
/// returned.
pub fn run(
    config: &MasterConfig,
    driver: Box<dyn FieldbusDriver>,
    shutdown: &ShutdownController,
) -> Result<RunSummary, RunError> {
    let mut master = MasterLifecycleManager::new(driver, LifecycleSettings::from(config));
    let result = configure_and_run(&mut master, config, shutdown);
    master.teardown();
    result
}

fn configure_and_run(
    master: &mut MasterLifecycleManager,
    config: &MasterConfig,
    shutdown: &ShutdownController,
) -> Result<RunSummary, RunError> {
    master.acquire()?;
    master.create_domain()?;
    master.configure_all_joints()?;

    let mut channel = SharedMemoryChannel::open(&config.shm)?;
    let result = activate_and_cycle(master, &mut channel, config, shutdown);

    master.teardown();
    channel.publish_status(MasterStatus::Stopped);
    info!(heartbeat = channel.system_state().heartbeat(), "Master stopped");
    result
}

fn activate_and_cycle(
    master: &mut MasterLifecycleManager,
    channel: &mut SharedMemoryChannel,
    config: &MasterConfig,
    shutdown: &ShutdownController,
) -> Result<RunSummary, RunError> {
    master.activate()?;
    channel.publish_status(MasterStatus::WaitingForSupervisor);

    let rt = RealTimeScheduler::new(&config.rt).apply()?;

    let gate = SupervisorGate::new(config.shm.gate_poll_interval());
    match gate.wait(channel.supervisor_flag(), shutdown) {
        GateOutcome::Cancelled => Ok(RunSummary { rt, cycle: None }),
        GateOutcome::Enabled => {
            let task = CyclicTask::new(master, channel, shutdown, config.bus.cycle_time());
            let cycle = task.run()?;
            Ok(RunSummary {
                rt,
                cycle: Some(cycle),
            })
        }
    }
}
