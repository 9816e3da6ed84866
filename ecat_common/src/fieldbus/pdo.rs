//! Process data item catalogue of the servo drives.
//!
//! Every joint exchanges the same twelve CiA-402 objects each cycle: seven
//! device→host feedback items (TxPDO) and five host→device command items
//! (RxPDO). Values are little-endian in the domain buffer.
//!
//! | Item | Object | Bits | Direction |
//! |------|--------|------|-----------|
//! | status word | 0x6041 | 16 | Tx |
//! | mode of operation display | 0x6061 | 8 | Tx |
//! | position actual | 0x6064 | 32 | Tx |
//! | velocity actual | 0x606C | 32 | Tx |
//! | torque actual | 0x6077 | 16 | Tx |
//! | error code | 0x603F | 16 | Tx |
//! | current actual | 0x6078 | 16 | Tx |
//! | control word | 0x6040 | 16 | Rx |
//! | mode of operation | 0x6060 | 8 | Rx |
//! | target torque | 0x6071 | 16 | Rx |
//! | target position | 0x607A | 32 | Rx |
//! | max current | 0x6073 | 16 | Rx |

use crate::fieldbus::types::{
    PdoEntry, PdoMapping, SyncDirection, SyncManagerConfig, WatchdogMode,
};

/// Direction of a data item, seen from the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Device → host.
    Feedback,
    /// Host → device.
    Command,
}

/// One of the twelve per-joint process data items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DataItem {
    /// 0x6041 status word.
    StatusWord = 0,
    /// 0x6061 mode of operation display.
    ModeDisplay = 1,
    /// 0x6064 position actual value.
    PositionActual = 2,
    /// 0x606C velocity actual value.
    VelocityActual = 3,
    /// 0x6077 torque actual value.
    TorqueActual = 4,
    /// 0x603F error code.
    ErrorCode = 5,
    /// 0x6078 current actual value.
    CurrentActual = 6,
    /// 0x6040 control word.
    ControlWord = 7,
    /// 0x6060 mode of operation.
    ModeCommand = 8,
    /// 0x6071 target torque.
    TargetTorque = 9,
    /// 0x607A target position.
    TargetPosition = 10,
    /// 0x6073 max current.
    MaxCurrent = 11,
}

impl DataItem {
    /// Number of items per joint.
    pub const COUNT: usize = 12;

    /// All items in registration order: feedback first, then commands.
    pub const ALL: [DataItem; Self::COUNT] = [
        DataItem::StatusWord,
        DataItem::ModeDisplay,
        DataItem::PositionActual,
        DataItem::VelocityActual,
        DataItem::TorqueActual,
        DataItem::ErrorCode,
        DataItem::CurrentActual,
        DataItem::ControlWord,
        DataItem::ModeCommand,
        DataItem::TargetTorque,
        DataItem::TargetPosition,
        DataItem::MaxCurrent,
    ];

    /// Number of feedback items per joint.
    pub const FEEDBACK_COUNT: usize = 7;

    /// Number of command items per joint.
    pub const COMMAND_COUNT: usize = 5;

    /// Position in [`DataItem::ALL`].
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Exchange direction.
    pub const fn direction(self) -> Direction {
        match self {
            DataItem::StatusWord
            | DataItem::ModeDisplay
            | DataItem::PositionActual
            | DataItem::VelocityActual
            | DataItem::TorqueActual
            | DataItem::ErrorCode
            | DataItem::CurrentActual => Direction::Feedback,
            DataItem::ControlWord
            | DataItem::ModeCommand
            | DataItem::TargetTorque
            | DataItem::TargetPosition
            | DataItem::MaxCurrent => Direction::Command,
        }
    }

    /// Object dictionary entry.
    pub const fn entry(self) -> PdoEntry {
        match self {
            DataItem::StatusWord => STATUS_WORD,
            DataItem::ModeDisplay => MODE_DISPLAY,
            DataItem::PositionActual => POSITION_ACTUAL,
            DataItem::VelocityActual => VELOCITY_ACTUAL,
            DataItem::TorqueActual => TORQUE_ACTUAL,
            DataItem::ErrorCode => ERROR_CODE,
            DataItem::CurrentActual => CURRENT_ACTUAL,
            DataItem::ControlWord => CONTROL_WORD,
            DataItem::ModeCommand => MODE_COMMAND,
            DataItem::TargetTorque => TARGET_TORQUE,
            DataItem::TargetPosition => TARGET_POSITION,
            DataItem::MaxCurrent => MAX_CURRENT,
        }
    }

    /// Width in bytes inside the domain buffer.
    pub const fn byte_len(self) -> usize {
        self.entry().byte_len()
    }

    /// Short human-readable name.
    pub const fn name(self) -> &'static str {
        match self {
            DataItem::StatusWord => "status_word",
            DataItem::ModeDisplay => "mode_display",
            DataItem::PositionActual => "position_actual",
            DataItem::VelocityActual => "velocity_actual",
            DataItem::TorqueActual => "torque_actual",
            DataItem::ErrorCode => "error_code",
            DataItem::CurrentActual => "current_actual",
            DataItem::ControlWord => "control_word",
            DataItem::ModeCommand => "mode_command",
            DataItem::TargetTorque => "target_torque",
            DataItem::TargetPosition => "target_position",
            DataItem::MaxCurrent => "max_current",
        }
    }

    /// Look up the item registered for an object entry.
    pub fn from_entry(index: u16, subindex: u8) -> Option<DataItem> {
        Self::ALL
            .into_iter()
            .find(|item| item.entry().index == index && item.entry().subindex == subindex)
    }
}

// ─── Object Dictionary Entries ─────────────────────────────────────

/// 0x6041:00 status word.
pub const STATUS_WORD: PdoEntry = PdoEntry::new(0x6041, 0, 16);
/// 0x6061:00 mode of operation display.
pub const MODE_DISPLAY: PdoEntry = PdoEntry::new(0x6061, 0, 8);
/// 0x6064:00 position actual value.
pub const POSITION_ACTUAL: PdoEntry = PdoEntry::new(0x6064, 0, 32);
/// 0x606C:00 velocity actual value.
pub const VELOCITY_ACTUAL: PdoEntry = PdoEntry::new(0x606C, 0, 32);
/// 0x6077:00 torque actual value.
pub const TORQUE_ACTUAL: PdoEntry = PdoEntry::new(0x6077, 0, 16);
/// 0x603F:00 error code.
pub const ERROR_CODE: PdoEntry = PdoEntry::new(0x603F, 0, 16);
/// 0x6078:00 current actual value.
pub const CURRENT_ACTUAL: PdoEntry = PdoEntry::new(0x6078, 0, 16);
/// 0x6040:00 control word.
pub const CONTROL_WORD: PdoEntry = PdoEntry::new(0x6040, 0, 16);
/// 0x6060:00 mode of operation.
pub const MODE_COMMAND: PdoEntry = PdoEntry::new(0x6060, 0, 8);
/// 0x6071:00 target torque.
pub const TARGET_TORQUE: PdoEntry = PdoEntry::new(0x6071, 0, 16);
/// 0x607A:00 target position.
pub const TARGET_POSITION: PdoEntry = PdoEntry::new(0x607A, 0, 32);
/// 0x6073:00 max current.
pub const MAX_CURRENT: PdoEntry = PdoEntry::new(0x6073, 0, 16);

// ─── PDO Mapping ───────────────────────────────────────────────────

const RXPDO_1600_ENTRIES: [PdoEntry; 5] = [
    CONTROL_WORD,
    MODE_COMMAND,
    TARGET_TORQUE,
    TARGET_POSITION,
    MAX_CURRENT,
];

const TXPDO_1A00_ENTRIES: [PdoEntry; 6] = [
    STATUS_WORD,
    MODE_DISPLAY,
    POSITION_ACTUAL,
    VELOCITY_ACTUAL,
    TORQUE_ACTUAL,
    CURRENT_ACTUAL,
];

const TXPDO_1A01_ENTRIES: [PdoEntry; 1] = [ERROR_CODE];

const RX_PDOS: [PdoMapping; 1] = [PdoMapping {
    index: 0x1600,
    entries: &RXPDO_1600_ENTRIES,
}];

const TX_PDOS: [PdoMapping; 2] = [
    PdoMapping {
        index: 0x1A00,
        entries: &TXPDO_1A00_ENTRIES,
    },
    PdoMapping {
        index: 0x1A01,
        entries: &TXPDO_1A01_ENTRIES,
    },
];

/// Sync manager layout applied to every joint: SM2 outputs, SM3 inputs.
pub const JOINT_SYNC_MANAGERS: [SyncManagerConfig; 2] = [
    SyncManagerConfig {
        index: 2,
        direction: SyncDirection::Output,
        watchdog: WatchdogMode::Enable,
        pdos: &RX_PDOS,
    },
    SyncManagerConfig {
        index: 3,
        direction: SyncDirection::Input,
        watchdog: WatchdogMode::Enable,
        pdos: &TX_PDOS,
    },
];

/// Entries registered per joint, in [`DataItem::ALL`] order.
pub const JOINT_REGISTRATION: [PdoEntry; DataItem::COUNT] = [
    STATUS_WORD,
    MODE_DISPLAY,
    POSITION_ACTUAL,
    VELOCITY_ACTUAL,
    TORQUE_ACTUAL,
    ERROR_CODE,
    CURRENT_ACTUAL,
    CONTROL_WORD,
    MODE_COMMAND,
    TARGET_TORQUE,
    TARGET_POSITION,
    MAX_CURRENT,
];

/// Bytes one joint occupies in the domain.
pub const JOINT_PROCESS_DATA_BYTES: usize = {
    let mut total = 0;
    let mut i = 0;
    while i < DataItem::COUNT {
        total += JOINT_REGISTRATION[i].byte_len();
        i += 1;
    }
    total
};

// ─── Little-Endian Accessors ───────────────────────────────────────
//
// Callers guarantee `offset + width <= pd.len()`; offsets come from a
// catalogue validated against the domain size at activation.

/// Read an unsigned 16-bit value.
#[inline]
pub fn read_u16(pd: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([pd[offset], pd[offset + 1]])
}

/// Read a signed 16-bit value.
#[inline]
pub fn read_i16(pd: &[u8], offset: usize) -> i16 {
    i16::from_le_bytes([pd[offset], pd[offset + 1]])
}

/// Read a signed 8-bit value.
#[inline]
pub fn read_i8(pd: &[u8], offset: usize) -> i8 {
    pd[offset] as i8
}

/// Read a signed 32-bit value.
#[inline]
pub fn read_i32(pd: &[u8], offset: usize) -> i32 {
    i32::from_le_bytes([pd[offset], pd[offset + 1], pd[offset + 2], pd[offset + 3]])
}

/// Write an unsigned 16-bit value.
#[inline]
pub fn write_u16(pd: &mut [u8], offset: usize, value: u16) {
    pd[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

/// Write a signed 16-bit value.
#[inline]
pub fn write_i16(pd: &mut [u8], offset: usize, value: i16) {
    pd[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

/// Write a signed 8-bit value.
#[inline]
pub fn write_i8(pd: &mut [u8], offset: usize, value: i8) {
    pd[offset] = value as u8;
}

/// Write a signed 32-bit value.
#[inline]
pub fn write_i32(pd: &mut [u8], offset: usize, value: i32) {
    pd[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn catalogue_counts() {
        let feedback = DataItem::ALL
            .iter()
            .filter(|i| i.direction() == Direction::Feedback)
            .count();
        assert_eq!(feedback, DataItem::FEEDBACK_COUNT);
        assert_eq!(DataItem::ALL.len() - feedback, DataItem::COMMAND_COUNT);
    }

    #[test]
    fn index_matches_position_in_all() {
        for (pos, item) in DataItem::ALL.iter().enumerate() {
            assert_eq!(item.index(), pos);
            assert_eq!(JOINT_REGISTRATION[pos], item.entry());
        }
    }

    #[test]
    fn entries_are_unique() {
        let set: HashSet<_> = DataItem::ALL.iter().map(|i| i.entry()).collect();
        assert_eq!(set.len(), DataItem::COUNT);
    }

    #[test]
    fn joint_occupies_28_bytes() {
        // 17 bytes of feedback + 11 bytes of commands.
        assert_eq!(JOINT_PROCESS_DATA_BYTES, 28);
    }

    #[test]
    fn every_registered_item_is_mapped_in_its_direction() {
        for item in DataItem::ALL {
            let wanted = match item.direction() {
                Direction::Feedback => SyncDirection::Input,
                Direction::Command => SyncDirection::Output,
            };
            let mapped = JOINT_SYNC_MANAGERS
                .iter()
                .filter(|sm| sm.direction == wanted)
                .any(|sm| sm.entries().any(|e| *e == item.entry()));
            assert!(mapped, "{} is not mapped", item.name());
        }
    }

    #[test]
    fn from_entry_lookup() {
        assert_eq!(DataItem::from_entry(0x607A, 0), Some(DataItem::TargetPosition));
        assert_eq!(DataItem::from_entry(0x60FF, 0), None);
    }

    #[test]
    fn little_endian_accessors() {
        let mut pd = [0u8; 8];
        write_i32(&mut pd, 0, -2);
        assert_eq!(pd[..4], [0xFE, 0xFF, 0xFF, 0xFF]);
        assert_eq!(read_i32(&pd, 0), -2);

        write_u16(&mut pd, 4, 0x1234);
        assert_eq!(pd[4..6], [0x34, 0x12]);
        assert_eq!(read_u16(&pd, 4), 0x1234);

        write_i16(&mut pd, 4, -300);
        assert_eq!(read_i16(&pd, 4), -300);

        write_i8(&mut pd, 7, -8);
        assert_eq!(read_i8(&pd, 7), -8);
    }
}
