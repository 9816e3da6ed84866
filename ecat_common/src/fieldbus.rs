//! Fieldbus contract.
//!
//! The fieldbus protocol engine is an external collaborator. This module
//! defines the interface the master consumes ([`driver::FieldbusDriver`]),
//! the value types crossing it ([`types`]) and the fixed process-data item
//! catalogue of the servo drives ([`pdo`]).

pub mod driver;
pub mod pdo;
pub mod types;
