//! Simulation driver implementation.
//!
//! The `SimulationDriver` implements the `FieldbusDriver` trait over an
//! in-process bus of CiA-402 drives, so the master can run end to end without
//! a network interface:
//! - position 0 holds the bus coupler, drives sit at positions `1..=N`
//! - one process data domain, laid out in registration order
//! - `receive()` copies drive feedback into the domain, `send()` applies the
//!   domain's commands and steps every bound drive

use super::device::SimulatedDrive;
use ecat_common::consts::{DEFAULT_PRODUCT_CODE, DEFAULT_VENDOR_ID, MAX_JOINTS};
use ecat_common::fieldbus::driver::{BusError, FieldbusDriver};
use ecat_common::fieldbus::pdo::{
    self, DataItem, Direction, read_i8, read_i16, read_i32, read_u16, write_i8, write_i16,
    write_i32, write_u16,
};
use ecat_common::fieldbus::types::{
    AlStates, BusState, DeviceProfile, DomainId, DomainState, PdoEntry, SlaveHandle,
    SyncDirection, SyncManagerConfig, WcState,
};
use tracing::{debug, info, warn};

/// The single domain handed out by this driver.
const DOMAIN: DomainId = DomainId(0);

/// A bound slave configuration.
#[derive(Debug)]
struct SlaveSlot {
    /// Index into `drives`.
    drive: usize,
    position: u16,
    mapped: Vec<PdoEntry>,
    offsets: [Option<usize>; DataItem::COUNT],
}

impl SlaveSlot {
    fn has_direction(&self, direction: Direction) -> bool {
        DataItem::ALL
            .iter()
            .any(|item| item.direction() == direction && self.offsets[item.index()].is_some())
    }
}

/// A startup SDO, downloaded at activation.
#[derive(Debug)]
struct PendingSdo {
    slot: usize,
    index: u16,
    subindex: u8,
    data: Vec<u8>,
}

/// Simulation driver implementing the FieldbusDriver trait.
pub struct SimulationDriver {
    /// Driver name
    name: &'static str,
    /// Driver version
    version: &'static str,
    /// Drives on the bus, position `i + 1`
    drives: Vec<SimulatedDrive>,
    /// Acquired master index
    acquired: Option<u32>,
    domain_created: bool,
    slots: Vec<SlaveSlot>,
    pending_sdos: Vec<PendingSdo>,
    domain_size: usize,
    process_data: Vec<u8>,
    send_interval_us: u32,
    active: bool,
    link_up: bool,
    expected_wc: u32,
    domain_state: DomainState,
}

impl SimulationDriver {
    /// Create a new simulation driver with a full bus of drives.
    pub fn new() -> Self {
        Self::with_slaves(MAX_JOINTS)
    }

    /// Simulated bus with `count` drives at positions `1..=count`.
    pub fn with_slaves(count: usize) -> Self {
        let profile = DeviceProfile {
            vendor_id: DEFAULT_VENDOR_ID,
            product_code: DEFAULT_PRODUCT_CODE,
        };
        Self {
            name: "simulation",
            version: env!("CARGO_PKG_VERSION"),
            drives: (0..count).map(|_| SimulatedDrive::new(profile)).collect(),
            acquired: None,
            domain_created: false,
            slots: Vec::new(),
            pending_sdos: Vec::new(),
            domain_size: 0,
            process_data: Vec::new(),
            send_interval_us: 0,
            active: false,
            link_up: true,
            expected_wc: 0,
            domain_state: DomainState::default(),
        }
    }

    /// Drive at bus `position`.
    pub fn drive(&self, position: u16) -> Option<&SimulatedDrive> {
        self.drives.get(usize::from(position).checked_sub(1)?)
    }

    /// Mutable drive at bus `position`.
    pub fn drive_mut(&mut self, position: u16) -> Option<&mut SimulatedDrive> {
        self.drives.get_mut(usize::from(position).checked_sub(1)?)
    }

    /// Plug or unplug the simulated cable.
    pub fn set_link_up(&mut self, up: bool) {
        self.link_up = up;
    }

    /// Programmed send interval.
    pub fn send_interval_us(&self) -> u32 {
        self.send_interval_us
    }

    fn require_acquired(&self) -> Result<(), BusError> {
        self.acquired.map(|_| ()).ok_or(BusError::NotAcquired)
    }

    fn require_domain(&self, domain: DomainId) -> Result<(), BusError> {
        if self.domain_created && domain == DOMAIN {
            Ok(())
        } else {
            Err(BusError::UnknownDomain)
        }
    }

    fn require_live(&self, domain: DomainId) -> Result<(), BusError> {
        self.require_domain(domain)?;
        if self.active {
            Ok(())
        } else {
            Err(BusError::NotActive)
        }
    }

    fn slot_mut(&mut self, slave: SlaveHandle) -> Result<&mut SlaveSlot, BusError> {
        self.slots
            .get_mut(usize::from(slave.0))
            .ok_or_else(|| BusError::SlaveConfig(format!("unknown slave handle {}", slave.0)))
    }

    fn download_sdos(&mut self) -> Result<(), BusError> {
        for sdo in self.pending_sdos.drain(..) {
            let drive = &mut self.drives[self.slots[sdo.slot].drive];
            let entry = pdo::MAX_CURRENT;
            match (sdo.index, sdo.subindex, sdo.data.as_slice()) {
                (index, subindex, &[lo, hi]) if index == entry.index && subindex == entry.subindex => {
                    drive.set_max_current(u16::from_le_bytes([lo, hi]));
                }
                (index, subindex, _) => {
                    return Err(BusError::Sdo {
                        index,
                        subindex,
                        reason: "object does not exist".to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}

impl Default for SimulationDriver {
    fn default() -> Self {
        Self::new()
    }
}

/// Check one PDO entry against the drive's object dictionary.
fn check_mapped_entry(direction: SyncDirection, entry: &PdoEntry) -> Result<(), BusError> {
    let item = DataItem::from_entry(entry.index, entry.subindex)
        .ok_or_else(|| BusError::Mapping(format!("object {entry} is not mappable")))?;
    let expected = match direction {
        SyncDirection::Output => Direction::Command,
        SyncDirection::Input => Direction::Feedback,
    };
    if item.direction() != expected {
        return Err(BusError::Mapping(format!(
            "object {entry} cannot be mapped as {direction:?}"
        )));
    }
    if item.entry().bit_len != entry.bit_len {
        return Err(BusError::Mapping(format!(
            "object {entry} has width {}",
            item.entry().bit_len
        )));
    }
    Ok(())
}

impl FieldbusDriver for SimulationDriver {
    fn name(&self) -> &'static str {
        self.name
    }

    fn version(&self) -> &'static str {
        self.version
    }

    fn acquire(&mut self, bus_index: u32) -> Result<(), BusError> {
        if bus_index != 0 {
            return Err(BusError::MasterUnavailable {
                index: bus_index,
                reason: "simulation provides master 0 only".to_string(),
            });
        }
        if self.acquired.is_some() {
            return Err(BusError::MasterUnavailable {
                index: bus_index,
                reason: "already reserved".to_string(),
            });
        }
        self.acquired = Some(bus_index);
        info!(drives = self.drives.len(), "Simulated bus acquired");
        Ok(())
    }

    fn create_domain(&mut self) -> Result<DomainId, BusError> {
        self.require_acquired()?;
        if self.domain_created {
            return Err(BusError::Registration(
                "simulation supports a single process data domain".to_string(),
            ));
        }
        self.domain_created = true;
        Ok(DOMAIN)
    }

    fn bind_slave(
        &mut self,
        alias: u16,
        position: u16,
        profile: &DeviceProfile,
    ) -> Result<SlaveHandle, BusError> {
        self.require_acquired()?;
        if alias != 0 {
            return Err(BusError::SlaveNotFound { position });
        }
        if position == 0 {
            return Err(BusError::SlaveConfig(
                "position 0 is the bus coupler".to_string(),
            ));
        }
        let drive = usize::from(position) - 1;
        let actual = self
            .drives
            .get(drive)
            .ok_or(BusError::SlaveNotFound { position })?
            .profile();
        if actual != *profile {
            return Err(BusError::SlaveConfig(format!(
                "position {position} reports {actual}, expected {profile}"
            )));
        }
        if self.slots.iter().any(|s| s.position == position) {
            return Err(BusError::SlaveConfig(format!(
                "position {position} is already bound"
            )));
        }

        let handle = SlaveHandle(self.slots.len() as u16);
        self.slots.push(SlaveSlot {
            drive,
            position,
            mapped: Vec::new(),
            offsets: [None; DataItem::COUNT],
        });
        debug!(position, handle = handle.0, "Simulated slave bound");
        Ok(handle)
    }

    fn apply_pdo_mapping(
        &mut self,
        slave: SlaveHandle,
        sync_managers: &[SyncManagerConfig],
    ) -> Result<(), BusError> {
        if self.active {
            return Err(BusError::Mapping("master is active".to_string()));
        }
        let mut mapped = Vec::new();
        for sm in sync_managers {
            let expected = match sm.index {
                2 => SyncDirection::Output,
                3 => SyncDirection::Input,
                other => {
                    return Err(BusError::Mapping(format!(
                        "sync manager {other} carries no process data"
                    )));
                }
            };
            if sm.direction != expected {
                return Err(BusError::Mapping(format!(
                    "sync manager {} must be {expected:?}",
                    sm.index
                )));
            }
            for entry in sm.entries() {
                check_mapped_entry(sm.direction, entry)?;
                mapped.push(*entry);
            }
        }
        self.slot_mut(slave)?.mapped = mapped;
        Ok(())
    }

    fn register_entries(
        &mut self,
        domain: DomainId,
        slave: SlaveHandle,
        entries: &[PdoEntry],
    ) -> Result<Vec<usize>, BusError> {
        self.require_domain(domain)?;
        if self.active {
            return Err(BusError::Registration("master is active".to_string()));
        }
        let mut next = self.domain_size;
        let slot = self
            .slots
            .get_mut(usize::from(slave.0))
            .ok_or_else(|| BusError::Registration(format!("unknown slave handle {}", slave.0)))?;

        let mut offsets = Vec::with_capacity(entries.len());
        for entry in entries {
            if !slot.mapped.contains(entry) {
                return Err(BusError::Registration(format!(
                    "object {entry} is not mapped on position {}",
                    slot.position
                )));
            }
            let item = DataItem::from_entry(entry.index, entry.subindex).ok_or_else(|| {
                BusError::Registration(format!("object {entry} is not mappable"))
            })?;
            let offset = match slot.offsets[item.index()] {
                Some(existing) => existing,
                None => {
                    let offset = next;
                    next += entry.byte_len();
                    slot.offsets[item.index()] = Some(offset);
                    offset
                }
            };
            offsets.push(offset);
        }
        self.domain_size = next;
        Ok(offsets)
    }

    fn write_sdo(
        &mut self,
        slave: SlaveHandle,
        index: u16,
        subindex: u8,
        data: &[u8],
    ) -> Result<(), BusError> {
        let slot = usize::from(slave.0);
        if slot >= self.slots.len() {
            return Err(BusError::Sdo {
                index,
                subindex,
                reason: format!("unknown slave handle {}", slave.0),
            });
        }
        self.pending_sdos.push(PendingSdo {
            slot,
            index,
            subindex,
            data: data.to_vec(),
        });
        Ok(())
    }

    fn set_send_interval(&mut self, interval_us: u32) -> Result<(), BusError> {
        if interval_us == 0 {
            return Err(BusError::Activation(
                "send interval must be non-zero".to_string(),
            ));
        }
        self.send_interval_us = interval_us;
        Ok(())
    }

    fn activate(&mut self) -> Result<(), BusError> {
        self.require_acquired()?;
        if self.active {
            return Err(BusError::Activation("already active".to_string()));
        }
        self.download_sdos()?;

        self.process_data = vec![0; self.domain_size];
        // One read and one write datagram per slave: inputs count 1,
        // outputs count 2.
        self.expected_wc = self
            .slots
            .iter()
            .map(|s| {
                u32::from(s.has_direction(Direction::Feedback))
                    + 2 * u32::from(s.has_direction(Direction::Command))
            })
            .sum();
        self.active = true;
        info!(
            domain_size = self.domain_size,
            slaves = self.slots.len(),
            expected_wc = self.expected_wc,
            "Simulated bus active"
        );
        Ok(())
    }

    fn domain_size(&self, domain: DomainId) -> usize {
        if self.require_domain(domain).is_ok() {
            self.domain_size
        } else {
            0
        }
    }

    fn process_data(&mut self, domain: DomainId) -> Option<&mut [u8]> {
        self.require_live(domain).ok()?;
        Some(&mut self.process_data)
    }

    fn receive(&mut self, domain: DomainId) -> Result<(), BusError> {
        self.require_live(domain)?;
        if !self.link_up {
            self.domain_state = DomainState::default();
            return Err(BusError::Exchange("link down".to_string()));
        }

        let pd = &mut self.process_data;
        for slot in &self.slots {
            let drive = &self.drives[slot.drive];
            let at = |item: DataItem| slot.offsets[item.index()];
            if let Some(o) = at(DataItem::StatusWord) {
                write_u16(pd, o, drive.status_word());
            }
            if let Some(o) = at(DataItem::ModeDisplay) {
                write_i8(pd, o, drive.mode_display());
            }
            if let Some(o) = at(DataItem::PositionActual) {
                write_i32(pd, o, drive.position());
            }
            if let Some(o) = at(DataItem::VelocityActual) {
                write_i32(pd, o, drive.velocity());
            }
            if let Some(o) = at(DataItem::TorqueActual) {
                write_i16(pd, o, drive.torque());
            }
            if let Some(o) = at(DataItem::ErrorCode) {
                write_u16(pd, o, drive.error_code());
            }
            if let Some(o) = at(DataItem::CurrentActual) {
                write_i16(pd, o, drive.current());
            }
        }

        let wc = self.expected_wc;
        self.domain_state = DomainState {
            working_counter: wc,
            wc_state: if wc == 0 {
                WcState::Zero
            } else {
                WcState::Complete
            },
        };
        Ok(())
    }

    fn send(&mut self, domain: DomainId) -> Result<(), BusError> {
        self.require_live(domain)?;
        if !self.link_up {
            return Err(BusError::Exchange("link down".to_string()));
        }

        let pd = &self.process_data;
        for slot in &self.slots {
            let at = |item: DataItem| slot.offsets[item.index()];
            let drive = &mut self.drives[slot.drive];
            let control_word = at(DataItem::ControlWord).map_or(0, |o| read_u16(pd, o));
            let mode = at(DataItem::ModeCommand).map_or(0, |o| read_i8(pd, o));
            let torque = at(DataItem::TargetTorque).map_or(0, |o| read_i16(pd, o));
            let position = at(DataItem::TargetPosition).map_or(drive.position(), |o| read_i32(pd, o));
            let max_current = at(DataItem::MaxCurrent).map_or(drive.max_current(), |o| read_u16(pd, o));
            drive.apply_commands(control_word, mode, torque, position, max_current);
            drive.step();
        }
        Ok(())
    }

    fn domain_state(&self, domain: DomainId) -> DomainState {
        if self.require_live(domain).is_ok() {
            self.domain_state
        } else {
            DomainState::default()
        }
    }

    fn bus_state(&self) -> BusState {
        if !self.link_up {
            return BusState::default();
        }
        let al_states = match (self.acquired, self.active) {
            (_, true) => AlStates::OP,
            (Some(_), false) => AlStates::PREOP,
            (None, false) => AlStates::INIT,
        };
        BusState {
            slaves_responding: self.drives.len() as u32 + 1,
            al_states,
            link_up: true,
        }
    }

    fn deactivate(&mut self) {
        if self.active {
            self.active = false;
            self.domain_state = DomainState::default();
            debug!("Simulated bus deactivated");
        }
    }

    fn release(&mut self) {
        if self.acquired.take().is_none() {
            return;
        }
        if self.active {
            warn!("Releasing an active simulated bus");
            self.active = false;
        }
        self.slots.clear();
        self.pending_sdos.clear();
        self.process_data.clear();
        self.domain_created = false;
        self.domain_size = 0;
        self.expected_wc = 0;
        debug!("Simulated bus released");
    }
}
