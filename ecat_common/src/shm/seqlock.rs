//! Single-writer sequence-locked block.
//!
//! The writer makes the sequence odd, copies the payload, then makes it even
//! again. A reader accepts a copy only if it saw the same even sequence before
//! and after copying. The writer never waits for readers.
//!
//! An all-zero block is valid: sequence 0 (even, stable) and a zeroed payload.
//! This is what a freshly created shared region contains.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU32, Ordering, fence};

/// Sequence-locked payload with exactly one writer.
#[repr(C, align(64))]
pub struct SeqBlock<T: Copy> {
    seq: AtomicU32,
    payload: UnsafeCell<T>,
}

// SAFETY: every access to `payload` goes through volatile copies bracketed by
// the sequence counter; torn copies are discarded by readers.
unsafe impl<T: Copy + Send> Sync for SeqBlock<T> {}

impl<T: Copy> SeqBlock<T> {
    /// Block holding `value` at sequence 0.
    pub const fn new(value: T) -> Self {
        Self {
            seq: AtomicU32::new(0),
            payload: UnsafeCell::new(value),
        }
    }

    /// Current sequence; odd while a write is in progress.
    #[inline]
    pub fn sequence(&self) -> u32 {
        self.seq.load(Ordering::Acquire)
    }

    /// Replace the payload.
    ///
    /// Only the block's single writer may call this. Calling it concurrently
    /// from two writers makes every read torn until one stops.
    #[inline]
    pub fn publish(&self, value: &T) {
        let seq = self.seq.load(Ordering::Relaxed);
        let odd = seq.wrapping_add(1) | 1;
        self.seq.store(odd, Ordering::Relaxed);
        fence(Ordering::Release);

        // SAFETY: payload is valid for writes; concurrent readers detect the
        // odd sequence and discard what they copied.
        unsafe { std::ptr::write_volatile(self.payload.get(), *value) };

        self.seq.store(odd.wrapping_add(1), Ordering::Release);
    }

    /// One read attempt; `None` if a write overlapped.
    #[inline]
    pub fn try_read(&self) -> Option<T> {
        let before = self.seq.load(Ordering::Acquire);
        if before & 1 == 1 {
            return None;
        }

        // SAFETY: payload is valid for reads and `T: Copy` has no drop glue;
        // the copy is only returned if the sequence did not move.
        let value = unsafe { std::ptr::read_volatile(self.payload.get()) };

        fence(Ordering::Acquire);
        let after = self.seq.load(Ordering::Relaxed);
        (before == after).then_some(value)
    }

    /// Up to `attempts` read attempts; `None` if every one was torn.
    #[inline]
    pub fn read(&self, attempts: u32) -> Option<T> {
        for _ in 0..attempts {
            if let Some(value) = self.try_read() {
                return Some(value);
            }
            std::hint::spin_loop();
        }
        None
    }
}

impl<T: Copy + Default> Default for SeqBlock<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}
