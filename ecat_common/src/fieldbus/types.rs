//! Value types crossing the fieldbus driver interface.

use bitflags::bitflags;
use std::fmt;

/// Identity a bound device must report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceProfile {
    /// Vendor id (object 0x1018:01).
    pub vendor_id: u32,
    /// Product code (object 0x1018:02).
    pub product_code: u32,
}

impl fmt::Display for DeviceProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}:{:#010x}", self.vendor_id, self.product_code)
    }
}

/// Driver-assigned handle of a bound slave configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlaveHandle(pub u16);

/// Driver-assigned handle of a process data domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DomainId(pub usize);

/// Direction of a sync manager, seen from the master.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncDirection {
    /// Host → device (RxPDO).
    Output,
    /// Device → host (TxPDO).
    Input,
}

/// Sync manager watchdog mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogMode {
    /// Keep the device default.
    Default,
    /// Enable the process data watchdog.
    Enable,
    /// Disable the process data watchdog.
    Disable,
}

/// One mapped object dictionary entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PdoEntry {
    /// Object index.
    pub index: u16,
    /// Object subindex.
    pub subindex: u8,
    /// Width in bits.
    pub bit_len: u8,
}

impl PdoEntry {
    /// Construct an entry.
    pub const fn new(index: u16, subindex: u8, bit_len: u8) -> Self {
        Self {
            index,
            subindex,
            bit_len,
        }
    }

    /// Width in whole bytes (all catalogue entries are byte aligned).
    pub const fn byte_len(&self) -> usize {
        (self.bit_len as usize).div_ceil(8)
    }
}

impl fmt::Display for PdoEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#06x}:{:02x}/{}", self.index, self.subindex, self.bit_len)
    }
}

/// A PDO and its mapped entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PdoMapping {
    /// PDO index (0x16xx for RxPDO, 0x1Axx for TxPDO).
    pub index: u16,
    /// Entries in mapping order.
    pub entries: &'static [PdoEntry],
}

/// Sync manager configuration with its assigned PDOs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncManagerConfig {
    /// Sync manager index.
    pub index: u8,
    /// Data direction.
    pub direction: SyncDirection,
    /// Watchdog mode.
    pub watchdog: WatchdogMode,
    /// Assigned PDOs in assignment order.
    pub pdos: &'static [PdoMapping],
}

impl SyncManagerConfig {
    /// Iterate all entries mapped through this sync manager.
    pub fn entries(&self) -> impl Iterator<Item = &'static PdoEntry> + '_ {
        self.pdos.iter().flat_map(|pdo| pdo.entries.iter())
    }
}

/// Working counter evaluation of the last exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WcState {
    /// No registered process data was exchanged.
    #[default]
    Zero,
    /// Some registered process data was exchanged.
    Incomplete,
    /// All registered process data was exchanged.
    Complete,
}

/// Domain health pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DomainState {
    /// Working counter of the last exchange.
    pub working_counter: u32,
    /// Evaluation of the working counter.
    pub wc_state: WcState,
}

bitflags! {
    /// Application-layer states reported by the responding devices (OR-ed).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct AlStates: u8 {
        /// INIT.
        const INIT = 0x01;
        /// PRE-OPERATIONAL.
        const PREOP = 0x02;
        /// SAFE-OPERATIONAL.
        const SAFEOP = 0x04;
        /// OPERATIONAL.
        const OP = 0x08;
    }
}

/// Aggregate bus state snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BusState {
    /// Number of devices responding on the bus.
    pub slaves_responding: u32,
    /// OR of the application-layer states of all devices.
    pub al_states: AlStates,
    /// Physical link up.
    pub link_up: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_byte_len_rounds_up() {
        assert_eq!(PdoEntry::new(0x6060, 0, 8).byte_len(), 1);
        assert_eq!(PdoEntry::new(0x6041, 0, 16).byte_len(), 2);
        assert_eq!(PdoEntry::new(0x6064, 0, 32).byte_len(), 4);
        assert_eq!(PdoEntry::new(0x2000, 1, 1).byte_len(), 1);
    }

    #[test]
    fn al_states_display_as_mask() {
        let states = AlStates::SAFEOP | AlStates::OP;
        assert_eq!(states.bits(), 0x0C);
        assert!(states.contains(AlStates::OP));
    }

    #[test]
    fn defaults_are_zeroed() {
        let bus = BusState::default();
        assert_eq!(bus.slaves_responding, 0);
        assert!(bus.al_states.is_empty());
        assert!(!bus.link_up);
        assert_eq!(DomainState::default().wc_state, WcState::Zero);
    }
}
