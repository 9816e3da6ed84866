//! Fixed layouts of the shared regions.
//!
//! Both records are `#[repr(C)]` and valid when every byte is zero, so a
//! freshly created region is immediately usable by either side.
//!
//! # JointData
//!
//! | Block | Writer | Reader |
//! |-------|--------|--------|
//! | `feedback` | master (every cycle) | supervisor |
//! | `command` | supervisor | master (every cycle) |
//!
//! # SystemState
//!
//! | Field | Writer |
//! |-------|--------|
//! | `supervisor_enabled` | supervisor |
//! | `master_status`, `master_heartbeat` | master |

use crate::consts::MAX_JOINTS;
use crate::shm::seqlock::SeqBlock;
use static_assertions::const_assert_eq;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// Marker for types that may be placed in a shared region.
///
/// # Safety
///
/// Implementors must be `#[repr(C)]`, contain no pointers, and be valid when
/// every byte is zero.
pub unsafe trait ShmRecord: Sized + Sync {
    /// Region size in bytes.
    const SIZE: usize = std::mem::size_of::<Self>();
}

/// Feedback of one joint, as published by the master.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JointFeedback {
    /// 0x6064 position actual value.
    pub position_actual: i32,
    /// 0x606C velocity actual value.
    pub velocity_actual: i32,
    /// 0x6041 status word.
    pub status_word: u16,
    /// 0x6077 torque actual value.
    pub torque_actual: i16,
    /// 0x603F error code.
    pub error_code: u16,
    /// 0x6078 current actual value.
    pub current_actual: i16,
    /// 0x6061 mode of operation display.
    pub mode_display: i8,
    _pad: [u8; 3],
}

/// Command of one joint, as written by the supervisor.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JointCommand {
    /// 0x607A target position.
    pub target_position: i32,
    /// 0x6040 control word.
    pub control_word: u16,
    /// 0x6071 target torque.
    pub target_torque: i16,
    /// 0x6073 max current.
    pub max_current: u16,
    /// 0x6060 mode of operation.
    pub mode_command: i8,
    _pad: u8,
}

/// Feedback of all joint slots.
pub type FeedbackTable = [JointFeedback; MAX_JOINTS];

/// Commands of all joint slots.
pub type CommandTable = [JointCommand; MAX_JOINTS];

/// The per-joint command/feedback region.
#[repr(C)]
pub struct JointData {
    /// Written by the master, read by the supervisor.
    pub feedback: SeqBlock<FeedbackTable>,
    /// Written by the supervisor, read by the master.
    pub command: SeqBlock<CommandTable>,
}

impl Default for JointData {
    fn default() -> Self {
        Self {
            feedback: SeqBlock::new([JointFeedback::default(); MAX_JOINTS]),
            command: SeqBlock::new([JointCommand::default(); MAX_JOINTS]),
        }
    }
}

// SAFETY: repr(C), no pointers, all-zero is sequence 0 with zeroed records.
unsafe impl ShmRecord for JointData {}

/// Status the master publishes into [`SystemState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum MasterStatus {
    /// Not started, or the region was just created.
    Offline = 0,
    /// Bus active, waiting for the supervisor flag.
    WaitingForSupervisor = 1,
    /// Cyclic exchange running.
    Running = 2,
    /// Shut down.
    Stopped = 3,
}

impl MasterStatus {
    /// Decode a raw status word; unknown values map to `Offline`.
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            1 => MasterStatus::WaitingForSupervisor,
            2 => MasterStatus::Running,
            3 => MasterStatus::Stopped,
            _ => MasterStatus::Offline,
        }
    }
}

/// The coordination-flag region.
#[repr(C, align(64))]
pub struct SystemState {
    /// Non-zero once the supervisor allows cyclic exchange.
    ///
    /// Also the futex word the gate waits on.
    pub supervisor_enabled: AtomicU32,
    /// Raw [`MasterStatus`].
    pub master_status: AtomicU32,
    /// Incremented once per completed cycle.
    pub master_heartbeat: AtomicU64,
    _reserved: [u8; 48],
}

impl Default for SystemState {
    fn default() -> Self {
        Self {
            supervisor_enabled: AtomicU32::new(0),
            master_status: AtomicU32::new(MasterStatus::Offline as u32),
            master_heartbeat: AtomicU64::new(0),
            _reserved: [0; 48],
        }
    }
}

impl SystemState {
    /// Whether the supervisor flag is set.
    #[inline]
    pub fn is_supervisor_enabled(&self) -> bool {
        self.supervisor_enabled.load(Ordering::Acquire) != 0
    }

    /// Set or clear the supervisor flag.
    pub fn set_supervisor_enabled(&self, enabled: bool) {
        self.supervisor_enabled
            .store(u32::from(enabled), Ordering::Release);
    }

    /// Current master status.
    pub fn master_status(&self) -> MasterStatus {
        MasterStatus::from_raw(self.master_status.load(Ordering::Acquire))
    }

    /// Publish the master status.
    pub fn set_master_status(&self, status: MasterStatus) {
        self.master_status.store(status as u32, Ordering::Release);
    }

    /// Current heartbeat count.
    pub fn heartbeat(&self) -> u64 {
        self.master_heartbeat.load(Ordering::Relaxed)
    }
}

// SAFETY: repr(C), no pointers, all-zero is flag clear and status Offline.
unsafe impl ShmRecord for SystemState {}

const_assert_eq!(std::mem::size_of::<JointFeedback>(), 20);
const_assert_eq!(std::mem::size_of::<JointCommand>(), 12);
const_assert_eq!(std::mem::size_of::<SeqBlock<FeedbackTable>>(), 384);
const_assert_eq!(std::mem::size_of::<SeqBlock<CommandTable>>(), 256);
const_assert_eq!(std::mem::size_of::<JointData>(), 640);
const_assert_eq!(std::mem::size_of::<SystemState>(), 64);
