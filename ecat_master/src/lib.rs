//! # EtherCAT Master Library
//!
//! Cyclic process data exchange with a chain of CiA-402 servo joints, gated
//! by a safety supervisor through shared memory.
//!
//! # Module Structure
//!
//! - [`lifecycle`] - bus handle, domain and per-joint configuration
//! - [`catalog`] - joint → process data offsets
//! - [`channel`] - the JointData / SystemState regions
//! - [`gate`] - wait for the supervisor flag
//! - [`rt`] - CPU pinning, memory locking, SCHED_FIFO
//! - [`cycle`] - the periodic exchange and its statistics
//! - [`shutdown`] - cooperative cancellation
//! - [`runtime`] - ordering of all of the above
//! - [`driver_registry`] / [`drivers`] - fieldbus driver factories
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          ecat_master                             │
//! │  ┌─────────────┐    ┌──────────────┐    ┌─────────────────────┐  │
//! │  │ JointData / │◄──►│ CyclicTask   │◄──►│ MasterLifecycle     │  │
//! │  │ SystemState │    │ (RT loop)    │    │ Manager + catalog   │  │
//! │  └──────▲──────┘    └──────────────┘    └──────────┬──────────┘  │
//! │         │                                          ▼             │
//! │   supervisor                              ┌────────────────┐     │
//! │   process                                 │ FieldbusDriver │     │
//! │                                           └────────────────┘     │
//! └──────────────────────────────────────────────────────────────────┘
//! ```

#![warn(missing_docs)]

pub mod catalog;
pub mod channel;
pub mod cycle;
pub mod driver_registry;
pub mod drivers;
pub mod error;
pub mod gate;
pub mod lifecycle;
pub mod rt;
pub mod runtime;
pub mod shutdown;

pub use error::{ActivationError, ConfigStage, JointConfigError, MasterError};
pub use lifecycle::{LifecycleState, MasterLifecycleManager};
pub use runtime::{RunError, RunSummary, run};
pub use shutdown::ShutdownController;
