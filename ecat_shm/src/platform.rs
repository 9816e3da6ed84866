//! Platform-specific shared memory primitives (POSIX shm, Linux futex)

mod linux;

pub use linux::*;
