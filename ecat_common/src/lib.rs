//! ECAT Common Library
//!
//! Shared constants, configuration loading, the fieldbus driver contract and
//! the binary layouts of the shared-memory records exchanged with the
//! supervisory process.
//!
//! # Module Structure
//!
//! - [`consts`] - System-wide limits and defaults
//! - [`config`] - Configuration loading traits and the master configuration
//! - [`fieldbus`] - Fieldbus driver trait, bus/domain types, PDO catalogue
//! - [`shm`] - Shared-memory record layouts and the sequence-lock block
//! - [`prelude`] - Common re-exports for convenience
//!
//! # Usage
//!
//! ```rust
//! use ecat_common::prelude::*;
//!
//! let config = MasterConfig::default();
//! assert_eq!(config.bus.joint_count, 6);
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod consts;
pub mod fieldbus;
pub mod prelude;
pub mod shm;
