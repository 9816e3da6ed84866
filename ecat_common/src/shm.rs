//! Shared memory records.
//!
//! This module contains:
//! - `seqlock`: single-writer sequence-lock block for multi-field records.
//! - `records`: the binary layouts shared with the supervisory process.

pub mod records;
pub mod seqlock;
