//! Shared-memory channel to the safety supervisor.
//!
//! Wraps the two named regions:
//! - JointData: feedback block (written here every cycle) and command block
//!   (written by the supervisor, read here every cycle)
//! - SystemState: the supervisor flag, plus master status and heartbeat

use ecat_common::config::ShmConfig;
use ecat_common::consts::MAX_JOINTS;
use ecat_common::shm::records::{
    CommandTable, FeedbackTable, JointCommand, JointData, MasterStatus, SystemState,
};
use ecat_shm::{SharedRegion, ShmResult};
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::{info, warn};

/// Both shared regions, opened create-or-attach.
pub struct SharedMemoryChannel {
    joint_data: SharedRegion<JointData>,
    system_state: SharedRegion<SystemState>,
    read_attempts: u32,
    last_commands: CommandTable,
    torn: bool,
    torn_reads: u64,
}

impl SharedMemoryChannel {
    /// Open (create or attach) both regions named in `config`.
    pub fn open(config: &ShmConfig) -> ShmResult<Self> {
        let joint_data = SharedRegion::<JointData>::open(&config.joint_data)?;
        let system_state = SharedRegion::<SystemState>::open(&config.system_state)?;

        let mut channel = Self {
            joint_data,
            system_state,
            read_attempts: config.command_read_attempts.max(1),
            last_commands: [JointCommand::default(); MAX_JOINTS],
            torn: false,
            torn_reads: 0,
        };

        // Start from whatever the supervisor left behind on attach.
        if let Some(commands) = channel.joint_data.get().command.read(channel.read_attempts) {
            channel.last_commands = commands;
        }

        info!(
            joint_data = channel.joint_data.name(),
            system_state = channel.system_state.name(),
            supervisor_enabled = channel.supervisor_enabled(),
            "Shared memory channel open"
        );
        Ok(channel)
    }

    /// Publish the feedback table (one seqlock write).
    #[inline]
    pub fn publish_feedback(&self, feedback: &FeedbackTable) {
        self.joint_data.get().feedback.publish(feedback);
    }

    /// Latest consistent command table.
    ///
    /// If every attempt overlaps a supervisor write, the previous snapshot is
    /// returned. The first torn read of an episode and the recovery are logged.
    #[inline]
    pub fn read_commands(&mut self) -> &CommandTable {
        match self.joint_data.get().command.read(self.read_attempts) {
            Some(commands) => {
                if self.torn {
                    self.torn = false;
                    info!("Command snapshot consistent again");
                }
                self.last_commands = commands;
            }
            None => {
                self.torn_reads += 1;
                if !self.torn {
                    self.torn = true;
                    warn!(
                        attempts = self.read_attempts,
                        "Command snapshot torn, reusing previous commands"
                    );
                }
            }
        }
        &self.last_commands
    }

    /// Cycles that reused the previous command snapshot.
    pub fn torn_reads(&self) -> u64 {
        self.torn_reads
    }

    /// Whether the supervisor allows cyclic exchange.
    #[inline]
    pub fn supervisor_enabled(&self) -> bool {
        self.system_state.get().is_supervisor_enabled()
    }

    /// The supervisor flag word, for futex waits.
    pub fn supervisor_flag(&self) -> &AtomicU32 {
        &self.system_state.get().supervisor_enabled
    }

    /// Publish the master status.
    pub fn publish_status(&self, status: MasterStatus) {
        self.system_state.get().set_master_status(status);
    }

    /// Count one completed cycle.
    #[inline]
    pub fn heartbeat(&self) {
        self.system_state
            .get()
            .master_heartbeat
            .fetch_add(1, Ordering::Relaxed);
    }

    /// The JointData record.
    pub fn joint_data(&self) -> &JointData {
        self.joint_data.get()
    }

    /// The SystemState record.
    pub fn system_state(&self) -> &SystemState {
        self.system_state.get()
    }
}
