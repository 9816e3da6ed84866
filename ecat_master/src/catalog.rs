//! Slave binding catalog: joint → byte offsets of its twelve data items.
//!
//! Built during configuration (one binding per joint, ascending), validated
//! against the domain size at activation, then frozen. The cyclic task only
//! reads it.

use ecat_common::consts::MAX_JOINTS;
use ecat_common::fieldbus::pdo::{
    DataItem, read_i8, read_i16, read_i32, read_u16, write_i8, write_i16, write_i32, write_u16,
};
use ecat_common::fieldbus::types::SlaveHandle;
use ecat_common::shm::records::{CommandTable, FeedbackTable};
use heapless::Vec;
use thiserror::Error;

/// Total number of offsets the catalog can hold.
const MAX_OFFSETS: usize = MAX_JOINTS * DataItem::COUNT;

/// Catalog construction and validation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    /// Bindings must be added for joint 0, 1, 2, ...
    #[error("expected binding for joint {expected}, got joint {got}")]
    OutOfOrder {
        /// Next joint index.
        expected: usize,
        /// Joint index offered.
        got: usize,
    },

    /// More joints than the shared region can carry.
    #[error("catalog full ({MAX_JOINTS} joints)")]
    Full,

    /// Driver returned the wrong number of offsets for a joint.
    #[error("expected {expected} offsets, got {got}")]
    OffsetCount {
        /// Items per joint.
        expected: usize,
        /// Offsets returned.
        got: usize,
    },

    /// Catalog is frozen after activation.
    #[error("catalog is frozen")]
    Frozen,

    /// An item extends past the end of the domain.
    #[error("joint {joint} {item} at offset {offset} exceeds domain of {domain_size} bytes")]
    OutOfBounds {
        /// Joint index.
        joint: usize,
        /// Item name.
        item: &'static str,
        /// Item offset.
        offset: usize,
        /// Domain size.
        domain_size: usize,
    },

    /// Two items share bytes.
    #[error("joint {joint} {item} overlaps joint {other_joint} {other_item}")]
    Overlap {
        /// First joint.
        joint: usize,
        /// First item.
        item: &'static str,
        /// Second joint.
        other_joint: usize,
        /// Second item.
        other_item: &'static str,
    },
}

/// Offsets of the twelve items of one joint, indexed by [`DataItem`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JointOffsets([usize; DataItem::COUNT]);

impl JointOffsets {
    /// Offsets in [`DataItem::ALL`] order.
    pub fn from_registration(offsets: &[usize]) -> Result<Self, CatalogError> {
        let array: [usize; DataItem::COUNT] =
            offsets.try_into().map_err(|_| CatalogError::OffsetCount {
                expected: DataItem::COUNT,
                got: offsets.len(),
            })?;
        Ok(Self(array))
    }

    /// Offset of `item`.
    #[inline]
    pub fn of(&self, item: DataItem) -> usize {
        self.0[item.index()]
    }

    /// Byte ranges of all items.
    pub fn ranges(&self) -> impl Iterator<Item = (DataItem, usize, usize)> + '_ {
        DataItem::ALL
            .into_iter()
            .map(|item| (item, self.of(item), self.of(item) + item.byte_len()))
    }
}

/// A configured joint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JointBinding {
    /// Joint index.
    pub joint: usize,
    /// Bus position.
    pub position: u16,
    /// Driver handle of the bound slave.
    pub slave: SlaveHandle,
    /// Item offsets inside the domain.
    pub offsets: JointOffsets,
}

/// Joint → offset catalog.
#[derive(Debug, Default)]
pub struct SlaveBindingCatalog {
    joints: Vec<JointBinding, MAX_JOINTS>,
    frozen: bool,
}

impl SlaveBindingCatalog {
    /// Empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the binding of the next joint.
    pub fn push(&mut self, binding: JointBinding) -> Result<(), CatalogError> {
        if self.frozen {
            return Err(CatalogError::Frozen);
        }
        if binding.joint != self.joints.len() {
            return Err(CatalogError::OutOfOrder {
                expected: self.joints.len(),
                got: binding.joint,
            });
        }
        self.joints.push(binding).map_err(|_| CatalogError::Full)
    }

    /// Number of configured joints.
    #[inline]
    pub fn len(&self) -> usize {
        self.joints.len()
    }

    /// Whether no joint is configured.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.joints.is_empty()
    }

    /// Binding of `joint`.
    pub fn get(&self, joint: usize) -> Option<&JointBinding> {
        self.joints.get(joint)
    }

    /// All bindings, ascending.
    pub fn iter(&self) -> impl Iterator<Item = &JointBinding> {
        self.joints.iter()
    }

    /// Whether the catalog is frozen.
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Check that every item lies within `domain_size` and no two items
    /// share a byte.
    pub fn validate(&self, domain_size: usize) -> Result<(), CatalogError> {
        let mut ranges: Vec<(usize, usize, usize, DataItem), MAX_OFFSETS> = Vec::new();

        for binding in &self.joints {
            for (item, start, end) in binding.offsets.ranges() {
                if end > domain_size {
                    return Err(CatalogError::OutOfBounds {
                        joint: binding.joint,
                        item: item.name(),
                        offset: start,
                        domain_size,
                    });
                }
                ranges
                    .push((start, end, binding.joint, item))
                    .map_err(|_| CatalogError::Full)?;
            }
        }

        ranges.sort_unstable_by_key(|r| (r.0, r.1));
        for pair in ranges.windows(2) {
            let (_, a_end, a_joint, a_item) = pair[0];
            let (b_start, _, b_joint, b_item) = pair[1];
            if b_start < a_end {
                return Err(CatalogError::Overlap {
                    joint: a_joint,
                    item: a_item.name(),
                    other_joint: b_joint,
                    other_item: b_item.name(),
                });
            }
        }
        Ok(())
    }

    /// Reject further bindings.
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    /// Copy the seven feedback items of every joint from `pd` into `out`.
    ///
    /// `pd` must be at least as large as the size passed to [`validate`].
    ///
    /// [`validate`]: Self::validate
    #[inline]
    pub fn copy_feedback(&self, pd: &[u8], out: &mut FeedbackTable) {
        for binding in &self.joints {
            let o = &binding.offsets;
            let fb = &mut out[binding.joint];
            fb.status_word = read_u16(pd, o.of(DataItem::StatusWord));
            fb.mode_display = read_i8(pd, o.of(DataItem::ModeDisplay));
            fb.position_actual = read_i32(pd, o.of(DataItem::PositionActual));
            fb.velocity_actual = read_i32(pd, o.of(DataItem::VelocityActual));
            fb.torque_actual = read_i16(pd, o.of(DataItem::TorqueActual));
            fb.error_code = read_u16(pd, o.of(DataItem::ErrorCode));
            fb.current_actual = read_i16(pd, o.of(DataItem::CurrentActual));
        }
    }

    /// Copy the five command items of every joint from `commands` into `pd`.
    ///
    /// `pd` must be at least as large as the size passed to [`validate`].
    ///
    /// [`validate`]: Self::validate
    #[inline]
    pub fn copy_commands(&self, commands: &CommandTable, pd: &mut [u8]) {
        for binding in &self.joints {
            let o = &binding.offsets;
            let cmd = &commands[binding.joint];
            write_u16(pd, o.of(DataItem::ControlWord), cmd.control_word);
            write_i8(pd, o.of(DataItem::ModeCommand), cmd.mode_command);
            write_i16(pd, o.of(DataItem::TargetTorque), cmd.target_torque);
            write_i32(pd, o.of(DataItem::TargetPosition), cmd.target_position);
            write_u16(pd, o.of(DataItem::MaxCurrent), cmd.max_current);
        }
    }
}
