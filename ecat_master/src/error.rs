//! Error types of the master lifecycle.

use crate::catalog::CatalogError;
use crate::lifecycle::LifecycleState;
use ecat_common::fieldbus::driver::BusError;
use std::fmt;
use thiserror::Error;

/// Stage of joint configuration that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigStage {
    /// Binding the slave at the joint's bus position.
    Bind,
    /// Applying the sync manager / PDO layout.
    Mapping,
    /// Registering the twelve process data items.
    Registration,
    /// Recording the offsets in the catalog.
    Catalog,
    /// Startup SDO download.
    Sdo,
}

impl fmt::Display for ConfigStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConfigStage::Bind => "bind",
            ConfigStage::Mapping => "PDO mapping",
            ConfigStage::Registration => "entry registration",
            ConfigStage::Catalog => "catalog",
            ConfigStage::Sdo => "startup SDO",
        };
        f.write_str(name)
    }
}

/// Cause of a joint configuration failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JointFault {
    /// The driver rejected the request.
    #[error(transparent)]
    Bus(#[from] BusError),
    /// The driver returned offsets the catalog cannot accept.
    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

/// Configuration of one joint failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("joint {joint} (bus position {position}): {stage} failed: {source}")]
pub struct JointConfigError {
    /// Joint index.
    pub joint: usize,
    /// Bus position (`joint + 1`).
    pub position: u16,
    /// Failing stage.
    pub stage: ConfigStage,
    /// Underlying cause.
    #[source]
    pub source: JointFault,
}

/// Activation failed; the master is faulted and must be torn down.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActivationError {
    /// Not every joint in `[0, N)` was configured.
    #[error("only {configured} of {expected} joints configured")]
    IncompleteConfiguration {
        /// Joints configured.
        configured: usize,
        /// Joints required.
        expected: usize,
    },

    /// Offsets overlap or exceed the domain.
    #[error("process data catalog invalid: {0}")]
    Catalog(#[from] CatalogError),

    /// The driver failed to activate.
    #[error("driver activation failed: {0}")]
    Driver(#[from] BusError),

    /// No process data buffer of the expected size after activation.
    #[error("process data unavailable (expected {expected} bytes)")]
    NoProcessData {
        /// Domain size reported by the driver.
        expected: usize,
    },
}

/// Errors of the master lifecycle manager.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MasterError {
    /// No fieldbus master could be reserved.
    #[error("failed to acquire fieldbus master {index}: {source}")]
    Acquisition {
        /// Requested master index.
        index: u32,
        /// Driver error.
        source: BusError,
    },

    /// The process data domain could not be created.
    #[error("failed to create process data domain: {0}")]
    Domain(BusError),

    /// A joint could not be configured.
    #[error(transparent)]
    JointConfig(#[from] JointConfigError),

    /// Joints must be configured in ascending order, each exactly once.
    #[error("joint {requested} requested, next joint to configure is {expected} of {joint_count}")]
    JointOrder {
        /// Joint that was requested.
        requested: usize,
        /// Next joint in order.
        expected: usize,
        /// Configured joint count.
        joint_count: usize,
    },

    /// Activation failed.
    #[error(transparent)]
    Activation(#[from] ActivationError),

    /// Operation not permitted in the current lifecycle state.
    #[error("{operation} not permitted in state {state:?}")]
    InvalidState {
        /// Attempted operation.
        operation: &'static str,
        /// Current state.
        state: LifecycleState,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joint_config_error_names_joint_and_stage() {
        let err = JointConfigError {
            joint: 2,
            position: 3,
            stage: ConfigStage::Mapping,
            source: JointFault::Bus(BusError::Mapping("SM3 rejected".to_string())),
        };
        let msg = err.to_string();
        assert!(msg.contains("joint 2"));
        assert!(msg.contains("bus position 3"));
        assert!(msg.contains("PDO mapping"));
    }

    #[test]
    fn incomplete_configuration_display() {
        let err = MasterError::from(ActivationError::IncompleteConfiguration {
            configured: 2,
            expected: 6,
        });
        assert_eq!(err.to_string(), "only 2 of 6 joints configured");
    }
}
