//! Commonly used types, re-exported for convenience.

pub use crate::config::{ConfigError, ConfigLoader, LogLevel, MasterConfig};
pub use crate::consts::MAX_JOINTS;
pub use crate::fieldbus::driver::{BusError, DriverFactory, FieldbusDriver};
pub use crate::fieldbus::pdo::{DataItem, Direction, JOINT_REGISTRATION, JOINT_SYNC_MANAGERS};
pub use crate::fieldbus::types::{
    AlStates, BusState, DeviceProfile, DomainId, DomainState, PdoEntry, SlaveHandle, WcState,
};
pub use crate::shm::records::{
    CommandTable, FeedbackTable, JointCommand, JointData, JointFeedback, MasterStatus,
    ShmRecord, SystemState,
};
pub use crate::shm::seqlock::SeqBlock;
