//! # ECAT Shared Memory
//!
//! Named POSIX shared-memory regions holding one fixed-layout record each.
//! The master and the supervisory process map the same regions; every field
//! crossing the process boundary is an atomic word or a sequence-locked block
//! from [`ecat_common::shm`].
//!
//! ## Lifecycle
//!
//! - `open` creates the region zero-filled, or attaches with contents kept
//! - dropping a [`SharedRegion`] unmaps it; the object is never removed
//!   implicitly
//! - [`SharedRegion::unlink`] removes the object explicitly (tests, tooling)
//!
//! ## Usage
//!
//! ```rust,no_run
//! use ecat_common::shm::records::SystemState;
//! use ecat_shm::{SharedRegion, ShmResult};
//!
//! # fn main() -> ShmResult<()> {
//! let state = SharedRegion::<SystemState>::open("SystemStateData")?;
//! if state.get().is_supervisor_enabled() {
//!     println!("supervisor ready");
//! }
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod platform;
pub mod region;

pub use error::{ShmError, ShmResult};
pub use platform::{FutexWait, futex_wait, futex_wake};
pub use region::SharedRegion;
