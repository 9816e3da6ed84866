//! Error types for shared memory operations

use thiserror::Error;

/// Errors that can occur during shared memory operations
#[derive(Error, Debug)]
pub enum ShmError {
    /// Region name is empty or contains an inner '/'
    #[error("Invalid region name: {name:?}")]
    InvalidName {
        /// Offending name
        name: String,
    },

    /// shm_open failed
    #[error("Failed to open region {name}: {source}")]
    Open {
        /// Region name
        name: String,
        /// Source nix error
        source: nix::Error,
    },

    /// Sizing or mapping the region failed
    #[error("Failed to map region {name}: {source}")]
    Map {
        /// Region name
        name: String,
        /// Source IO error
        source: std::io::Error,
    },

    /// Existing region has a different size than the record
    #[error("Region {name} has {actual} bytes, expected {expected}")]
    SizeMismatch {
        /// Region name
        name: String,
        /// Record size in bytes
        expected: usize,
        /// Size found on the existing object
        actual: u64,
    },

    /// shm_unlink failed
    #[error("Failed to unlink region {name}: {source}")]
    Unlink {
        /// Region name
        name: String,
        /// Source nix error
        source: nix::Error,
    },
}

/// Result type for shared memory operations
pub type ShmResult<T> = Result<T, ShmError>;
