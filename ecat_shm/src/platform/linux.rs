//! Linux-specific shared memory operations

use crate::error::{ShmError, ShmResult};
use memmap2::{MmapMut, MmapOptions};
use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::sys::mman::{shm_open, shm_unlink};
use nix::sys::stat::Mode;
use std::fs::File;
use std::sync::atomic::AtomicU32;
use std::time::Duration;
use tracing::debug;

/// Permissions of newly created regions (subject to umask).
const REGION_MODE: u32 = 0o666;

/// A mapped region and whether this call created it.
pub struct MappedRegion {
    /// Writable shared mapping of exactly the requested size.
    pub mmap: MmapMut,
    /// `true` if the object did not exist before.
    pub created: bool,
}

/// Create the POSIX shared-memory object `path` with `size` zero bytes, or
/// attach to it if it exists.
///
/// An existing object must be exactly `size` bytes. A zero-length object is
/// one whose creator has not sized it yet; it is sized here.
pub fn create_or_attach(path: &str, size: usize) -> ShmResult<MappedRegion> {
    let mode = Mode::from_bits_truncate(REGION_MODE);

    let (fd, created) = match shm_open(path, OFlag::O_CREAT | OFlag::O_EXCL | OFlag::O_RDWR, mode) {
        Ok(fd) => (fd, true),
        Err(Errno::EEXIST) => {
            let fd = shm_open(path, OFlag::O_RDWR, mode).map_err(|source| ShmError::Open {
                name: path.to_string(),
                source,
            })?;
            (fd, false)
        }
        Err(source) => {
            return Err(ShmError::Open {
                name: path.to_string(),
                source,
            });
        }
    };
    let file = File::from(fd);

    let map_err = |source: std::io::Error| ShmError::Map {
        name: path.to_string(),
        source,
    };

    let actual = file.metadata().map_err(map_err)?.len();
    if created || actual == 0 {
        // ftruncate zero-fills the new extent.
        file.set_len(size as u64).map_err(map_err)?;
        debug!(region = path, size, created, "Sized shared region");
    } else if actual != size as u64 {
        return Err(ShmError::SizeMismatch {
            name: path.to_string(),
            expected: size,
            actual,
        });
    }

    // SAFETY: the object is at least `size` bytes; concurrent modification by
    // other processes is confined to atomics and sequence-locked blocks.
    let mmap = unsafe { MmapOptions::new().len(size).map_mut(&file) }.map_err(map_err)?;

    Ok(MappedRegion { mmap, created })
}

/// Remove the object `path`.
pub fn unlink(path: &str) -> ShmResult<()> {
    shm_unlink(path).map_err(|source| ShmError::Unlink {
        name: path.to_string(),
        source,
    })
}

/// Whether the object `path` exists.
pub fn exists(path: &str) -> bool {
    match shm_open(path, OFlag::O_RDONLY, Mode::empty()) {
        Ok(_) => true,
        Err(Errno::EACCES) => true,
        Err(_) => false,
    }
}

/// Result of a futex wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FutexWait {
    /// Woken by `futex_wake` (or spuriously).
    Woken,
    /// The word no longer held the expected value.
    ValueChanged,
    /// The timeout elapsed.
    TimedOut,
    /// A signal interrupted the wait.
    Interrupted,
}

/// Sleep while `word == expected`, for at most `timeout`.
///
/// Uses the shared (non-private) futex so that wakes from other processes
/// mapping the same page are seen.
pub fn futex_wait(word: &AtomicU32, expected: u32, timeout: Duration) -> FutexWait {
    let ts = libc::timespec {
        tv_sec: timeout.as_secs() as libc::time_t,
        tv_nsec: timeout.subsec_nanos() as libc::c_long,
    };

    // SAFETY: `word` is a valid aligned u32 for the duration of the call and
    // `ts` outlives it.
    let ret = unsafe {
        libc::syscall(
            libc::SYS_futex,
            word.as_ptr(),
            libc::FUTEX_WAIT,
            expected,
            &ts as *const libc::timespec,
            std::ptr::null::<u32>(),
            0u32,
        )
    };

    if ret == 0 {
        return FutexWait::Woken;
    }
    match Errno::last() {
        Errno::EAGAIN => FutexWait::ValueChanged,
        Errno::ETIMEDOUT => FutexWait::TimedOut,
        Errno::EINTR => FutexWait::Interrupted,
        _ => FutexWait::Woken,
    }
}

/// Wake up to `waiters` threads sleeping on `word`. Returns how many woke.
pub fn futex_wake(word: &AtomicU32, waiters: u32) -> usize {
    // SAFETY: `word` is a valid aligned u32 for the duration of the call.
    let ret = unsafe {
        libc::syscall(
            libc::SYS_futex,
            word.as_ptr(),
            libc::FUTEX_WAKE,
            waiters.min(i32::MAX as u32),
        )
    };
    if ret < 0 { 0 } else { ret as usize }
}
