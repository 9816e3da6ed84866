//! Typed view of a named shared-memory region.

use crate::error::{ShmError, ShmResult};
use crate::platform;
use ecat_common::shm::records::ShmRecord;
use memmap2::MmapMut;
use std::marker::PhantomData;
use tracing::{debug, info};

/// Named region holding exactly one `T`.
///
/// Opening creates the region zero-filled if it does not exist, otherwise it
/// attaches and leaves the contents untouched. Dropping only unmaps; the
/// object stays in the system so peers and later runs can attach to it.
pub struct SharedRegion<T: ShmRecord> {
    name: String,
    mmap: MmapMut,
    created: bool,
    _record: PhantomData<T>,
}

impl<T: ShmRecord> SharedRegion<T> {
    /// Create or attach the region `name` ("JointData" and "/JointData" are
    /// the same region).
    pub fn open(name: &str) -> ShmResult<Self> {
        let path = object_path(name)?;
        let mapped = platform::create_or_attach(&path, T::SIZE)?;

        if mapped.created {
            info!(region = %path, size = T::SIZE, "Created shared region");
        } else {
            info!(region = %path, size = T::SIZE, "Attached to shared region");
        }

        Ok(Self {
            name: path,
            mmap: mapped.mmap,
            created: mapped.created,
            _record: PhantomData,
        })
    }

    /// Shared reference to the record.
    #[inline]
    pub fn get(&self) -> &T {
        // SAFETY: the mapping is page aligned, exactly `T::SIZE` bytes, and
        // `ShmRecord` guarantees any zeroed or peer-written content is a
        // valid `T` mutated only through interior mutability.
        unsafe { &*(self.mmap.as_ptr() as *const T) }
    }

    /// Whether this open created the object.
    pub fn was_created(&self) -> bool {
        self.created
    }

    /// Object name, with its leading '/'.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Raw bytes of the region.
    pub fn as_bytes(&self) -> &[u8] {
        &self.mmap
    }

    /// Remove the object `name` from the system.
    pub fn unlink(name: &str) -> ShmResult<()> {
        platform::unlink(&object_path(name)?)
    }

    /// Whether the object `name` exists.
    pub fn exists(name: &str) -> bool {
        object_path(name).is_ok_and(|path| platform::exists(&path))
    }
}

impl<T: ShmRecord> Drop for SharedRegion<T> {
    fn drop(&mut self) {
        debug!(region = %self.name, "Detached from shared region");
    }
}

/// Normalize a region name to a POSIX object path ("/Name").
fn object_path(name: &str) -> ShmResult<String> {
    let trimmed = name.strip_prefix('/').unwrap_or(name);
    if trimmed.is_empty() || trimmed.contains('/') {
        return Err(ShmError::InvalidName {
            name: name.to_string(),
        });
    }
    Ok(format!("/{trimmed}"))
}
