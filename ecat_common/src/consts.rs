//! System-wide constants for the ECAT workspace.
//!
//! Single source of truth for numeric limits and defaults. The defaults
//! reproduce the values the deployed master has always run with.

/// Maximum number of joints a shared JointData region can carry.
///
/// Fixes the size of the shared region; the configured joint count may be
/// lower but never higher.
pub const MAX_JOINTS: usize = 16;

/// Default number of configured joints.
pub const DEFAULT_JOINT_COUNT: usize = 6;

/// Default fieldbus master index.
pub const DEFAULT_BUS_INDEX: u32 = 0;

/// Default cycle time in microseconds (1 kHz).
pub const DEFAULT_CYCLE_TIME_US: u32 = 1000;

/// Default CPU core the cyclic thread is pinned to.
pub const DEFAULT_CPU_CORE: usize = 3;

/// Default SCHED_FIFO priority of the cyclic thread.
pub const DEFAULT_RT_PRIORITY: i32 = 49;

/// Stack extent touched once before entering the cyclic loop.
pub const MAX_SAFE_STACK: usize = 8 * 1024;

/// Default name of the per-joint shared region.
pub const DEFAULT_JOINT_DATA_NAME: &str = "JointData";

/// Default name of the coordination-flag shared region.
pub const DEFAULT_SYSTEM_STATE_NAME: &str = "SystemStateData";

/// Default poll interval of the supervisor gate in milliseconds.
pub const DEFAULT_GATE_POLL_MS: u64 = 1000;

/// Default number of attempts for one consistent command snapshot per cycle.
pub const DEFAULT_COMMAND_READ_ATTEMPTS: u32 = 4;

/// Default max-current value written to 0x6073 at startup.
pub const DEFAULT_MAX_CURRENT: u16 = 400;

/// Default device vendor id (Ingenia).
pub const DEFAULT_VENDOR_ID: u32 = 0x0000_029C;

/// Default device product code (Denali XCR).
pub const DEFAULT_PRODUCT_CODE: u32 = 0x0383_1002;

/// Default driver name.
pub const DEFAULT_DRIVER: &str = "simulation";

/// Default configuration file path.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/ecat/master.toml";
