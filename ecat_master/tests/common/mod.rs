//! Stub fieldbus driver and fixtures shared by the integration tests.

#![allow(dead_code)]

use ecat_common::config::MasterConfig;
use ecat_common::fieldbus::driver::{BusError, FieldbusDriver};
use ecat_common::fieldbus::pdo::{
    DataItem, read_i8, read_i16, read_i32, read_u16, write_i8, write_i16, write_i32, write_u16,
};
use ecat_common::fieldbus::types::{
    AlStates, BusState, DeviceProfile, DomainId, DomainState, PdoEntry, SlaveHandle,
    SyncManagerConfig, WcState,
};
use ecat_common::shm::records::{JointCommand, JointData, JointFeedback, SystemState};
use ecat_master::ShutdownController;
use ecat_shm::SharedRegion;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

// ─── Recorded Calls ────────────────────────────────────────────────

/// One driver call, in the order issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Acquire,
    CreateDomain,
    Bind(u16),
    Map(u16),
    Register(u16),
    Sdo(u16),
    SendInterval(u32),
    Activate,
    Receive,
    Send,
    Deactivate,
    Release,
}

/// Where the stub fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailAt {
    Acquire,
    CreateDomain,
    Bind(u16),
    Map(u16),
    Activate,
    /// The `nth` receive (1-based).
    Receive(usize),
    /// The `nth` send (1-based).
    Send(usize),
}

/// Everything the stub saw.
#[derive(Debug, Default)]
pub struct StubLog {
    pub events: Vec<Event>,
    /// Offsets returned per registration, in call order.
    pub offsets: Vec<Vec<usize>>,
    /// Domain buffer at every send.
    pub sent: Vec<Vec<u8>>,
    /// (position, index, subindex, data) of every SDO.
    pub sdos: Vec<(u16, u16, u8, Vec<u8>)>,
}

impl StubLog {
    pub fn count(&self, event: Event) -> usize {
        self.events.iter().filter(|e| **e == event).count()
    }
}

/// Handle on the log of a driver that has been boxed away.
#[derive(Clone)]
pub struct StubRecorder(Arc<Mutex<StubLog>>);

impl StubRecorder {
    pub fn log(&self) -> MutexGuard<'_, StubLog> {
        self.0.lock().unwrap()
    }
}

// ─── Stub Driver ───────────────────────────────────────────────────

const DOMAIN: DomainId = DomainId(0);

/// Stub bus with `slaves` conforming devices at positions `1..=slaves`.
pub struct StubDriver {
    log: Arc<Mutex<StubLog>>,
    slaves: u16,
    fail: Vec<FailAt>,
    cancel: Option<(ShutdownController, usize)>,
    cancel_after_send: Option<(ShutdownController, Duration)>,
    positions: Vec<u16>,
    offsets: Vec<[Option<usize>; DataItem::COUNT]>,
    domain_size: usize,
    pd: Vec<u8>,
    active: bool,
    receives: usize,
    sends: usize,
}

impl StubDriver {
    pub fn new(slaves: u16) -> (Self, StubRecorder) {
        let log = Arc::new(Mutex::new(StubLog::default()));
        let driver = Self {
            log: Arc::clone(&log),
            slaves,
            fail: Vec::new(),
            cancel: None,
            cancel_after_send: None,
            positions: Vec::new(),
            offsets: Vec::new(),
            domain_size: 0,
            pd: Vec::new(),
            active: false,
            receives: 0,
            sends: 0,
        };
        (driver, StubRecorder(log))
    }

    pub fn failing_at(mut self, fail: FailAt) -> Self {
        self.fail.push(fail);
        self
    }

    /// Request shutdown from inside the `nth` receive (1-based).
    pub fn cancel_on_receive(mut self, shutdown: &ShutdownController, nth: usize) -> Self {
        self.cancel = Some((shutdown.clone(), nth));
        self
    }

    /// Request shutdown `delay` after the first send returns, from another
    /// thread, so the request lands while the cycle sleeps.
    pub fn cancel_after_first_send(mut self, shutdown: &ShutdownController, delay: Duration) -> Self {
        self.cancel_after_send = Some((shutdown.clone(), delay));
        self
    }

    fn record(&self, event: Event) {
        self.log.lock().unwrap().events.push(event);
    }

    fn check(&self, point: FailAt) -> Result<(), String> {
        if self.fail.contains(&point) {
            Err(format!("injected failure at {point:?}"))
        } else {
            Ok(())
        }
    }
}

impl FieldbusDriver for StubDriver {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn version(&self) -> &'static str {
        "0.0.0"
    }

    fn acquire(&mut self, bus_index: u32) -> Result<(), BusError> {
        self.record(Event::Acquire);
        self.check(FailAt::Acquire)
            .map_err(|reason| BusError::MasterUnavailable {
                index: bus_index,
                reason,
            })
    }

    fn create_domain(&mut self) -> Result<DomainId, BusError> {
        self.record(Event::CreateDomain);
        self.check(FailAt::CreateDomain)
            .map_err(BusError::Registration)?;
        Ok(DOMAIN)
    }

    fn bind_slave(
        &mut self,
        _alias: u16,
        position: u16,
        _profile: &DeviceProfile,
    ) -> Result<SlaveHandle, BusError> {
        self.record(Event::Bind(position));
        if self.fail.contains(&FailAt::Bind(position)) || position == 0 || position > self.slaves {
            return Err(BusError::SlaveNotFound { position });
        }
        self.positions.push(position);
        self.offsets.push([None; DataItem::COUNT]);
        Ok(SlaveHandle(self.positions.len() as u16 - 1))
    }

    fn apply_pdo_mapping(
        &mut self,
        slave: SlaveHandle,
        _sync_managers: &[SyncManagerConfig],
    ) -> Result<(), BusError> {
        let position = self.positions[usize::from(slave.0)];
        self.record(Event::Map(position));
        self.check(FailAt::Map(position)).map_err(BusError::Mapping)
    }

    fn register_entries(
        &mut self,
        _domain: DomainId,
        slave: SlaveHandle,
        entries: &[PdoEntry],
    ) -> Result<Vec<usize>, BusError> {
        let handle = usize::from(slave.0);
        self.record(Event::Register(self.positions[handle]));

        let mut offsets = Vec::with_capacity(entries.len());
        for entry in entries {
            let item = DataItem::from_entry(entry.index, entry.subindex)
                .ok_or_else(|| BusError::Registration(format!("unknown entry {entry}")))?;
            self.offsets[handle][item.index()] = Some(self.domain_size);
            offsets.push(self.domain_size);
            self.domain_size += entry.byte_len();
        }
        self.log.lock().unwrap().offsets.push(offsets.clone());
        Ok(offsets)
    }

    fn write_sdo(
        &mut self,
        slave: SlaveHandle,
        index: u16,
        subindex: u8,
        data: &[u8],
    ) -> Result<(), BusError> {
        let position = self.positions[usize::from(slave.0)];
        self.record(Event::Sdo(position));
        self.log
            .lock()
            .unwrap()
            .sdos
            .push((position, index, subindex, data.to_vec()));
        Ok(())
    }

    fn set_send_interval(&mut self, interval_us: u32) -> Result<(), BusError> {
        self.record(Event::SendInterval(interval_us));
        Ok(())
    }

    fn activate(&mut self) -> Result<(), BusError> {
        self.record(Event::Activate);
        self.check(FailAt::Activate).map_err(BusError::Activation)?;
        self.pd = vec![0; self.domain_size];
        self.active = true;
        Ok(())
    }

    fn domain_size(&self, _domain: DomainId) -> usize {
        self.domain_size
    }

    fn process_data(&mut self, _domain: DomainId) -> Option<&mut [u8]> {
        if self.active { Some(&mut self.pd) } else { None }
    }

    fn receive(&mut self, _domain: DomainId) -> Result<(), BusError> {
        self.record(Event::Receive);
        self.receives += 1;
        for (handle, position) in self.positions.iter().enumerate() {
            let joint = usize::from(*position) - 1;
            write_feedback(&mut self.pd, &self.offsets[handle], &feedback_for(joint));
        }
        if let Some((shutdown, nth)) = &self.cancel {
            if self.receives == *nth {
                shutdown.request();
            }
        }
        self.check(FailAt::Receive(self.receives))
            .map_err(BusError::Exchange)
    }

    fn send(&mut self, _domain: DomainId) -> Result<(), BusError> {
        self.record(Event::Send);
        self.sends += 1;
        self.log.lock().unwrap().sent.push(self.pd.clone());
        if self.sends == 1 {
            if let Some((shutdown, delay)) = self.cancel_after_send.take() {
                thread::spawn(move || {
                    thread::sleep(delay);
                    shutdown.request();
                });
            }
        }
        self.check(FailAt::Send(self.sends)).map_err(BusError::Exchange)
    }

    fn domain_state(&self, _domain: DomainId) -> DomainState {
        DomainState {
            working_counter: 3 * self.positions.len() as u32,
            wc_state: WcState::Complete,
        }
    }

    fn bus_state(&self) -> BusState {
        BusState {
            slaves_responding: u32::from(self.slaves),
            al_states: if self.active {
                AlStates::OP
            } else {
                AlStates::PREOP
            },
            link_up: true,
        }
    }

    fn deactivate(&mut self) {
        self.record(Event::Deactivate);
        self.active = false;
    }

    fn release(&mut self) {
        self.record(Event::Release);
    }
}

// ─── Data Patterns ─────────────────────────────────────────────────

/// Distinct feedback the stub reports for `joint`.
pub fn feedback_for(joint: usize) -> JointFeedback {
    let j = joint as i32;
    let mut fb = JointFeedback::default();
    fb.status_word = 0x0027 | ((joint as u16) << 8);
    fb.mode_display = 8 + joint as i8;
    fb.position_actual = 10_000 * (j + 1) + 1;
    fb.velocity_actual = -7 * (j + 1);
    fb.torque_actual = -(100 + j as i16);
    fb.error_code = 0x7000 + joint as u16;
    fb.current_actual = 200 + j as i16;
    fb
}

/// Distinct command the supervisor writes for `joint`.
pub fn command_for(joint: usize) -> JointCommand {
    let j = joint as i32;
    let mut cmd = JointCommand::default();
    cmd.target_position = -50_000 * (j + 1);
    cmd.control_word = 0x000F | ((joint as u16) << 8);
    cmd.target_torque = 300 + j as i16;
    cmd.max_current = 400 + joint as u16;
    cmd.mode_command = 10;
    cmd
}

fn write_feedback(pd: &mut [u8], offsets: &[Option<usize>; DataItem::COUNT], fb: &JointFeedback) {
    let at = |item: DataItem| offsets[item.index()];
    if let Some(o) = at(DataItem::StatusWord) {
        write_u16(pd, o, fb.status_word);
    }
    if let Some(o) = at(DataItem::ModeDisplay) {
        write_i8(pd, o, fb.mode_display);
    }
    if let Some(o) = at(DataItem::PositionActual) {
        write_i32(pd, o, fb.position_actual);
    }
    if let Some(o) = at(DataItem::VelocityActual) {
        write_i32(pd, o, fb.velocity_actual);
    }
    if let Some(o) = at(DataItem::TorqueActual) {
        write_i16(pd, o, fb.torque_actual);
    }
    if let Some(o) = at(DataItem::ErrorCode) {
        write_u16(pd, o, fb.error_code);
    }
    if let Some(o) = at(DataItem::CurrentActual) {
        write_i16(pd, o, fb.current_actual);
    }
}

/// Decode the command items of one joint from a sent buffer.
///
/// `offsets` are the twelve offsets of the joint, in registration order.
pub fn decode_command(pd: &[u8], offsets: &[usize]) -> JointCommand {
    let at = |item: DataItem| offsets[item.index()];
    let mut cmd = JointCommand::default();
    cmd.control_word = read_u16(pd, at(DataItem::ControlWord));
    cmd.mode_command = read_i8(pd, at(DataItem::ModeCommand));
    cmd.target_torque = read_i16(pd, at(DataItem::TargetTorque));
    cmd.target_position = read_i32(pd, at(DataItem::TargetPosition));
    cmd.max_current = read_u16(pd, at(DataItem::MaxCurrent));
    cmd
}

// ─── Configuration And Regions ─────────────────────────────────────

/// Unique region names per test and process; unlinks both on drop.
pub struct TestRegions {
    pub joint_data: String,
    pub system_state: String,
}

impl TestRegions {
    pub fn new(tag: &str) -> Self {
        let pid = std::process::id();
        let regions = Self {
            joint_data: format!("ecat_it_jd_{tag}_{pid}"),
            system_state: format!("ecat_it_ss_{tag}_{pid}"),
        };
        regions.unlink();
        regions
    }

    pub fn exist(&self) -> (bool, bool) {
        (
            SharedRegion::<JointData>::exists(&self.joint_data),
            SharedRegion::<SystemState>::exists(&self.system_state),
        )
    }

    fn unlink(&self) {
        let _ = SharedRegion::<JointData>::unlink(&self.joint_data);
        let _ = SharedRegion::<SystemState>::unlink(&self.system_state);
    }
}

impl Drop for TestRegions {
    fn drop(&mut self) {
        self.unlink();
    }
}

/// Configuration for `joints` joints on `regions`, with RT setup that
/// needs no privileges and a short gate poll.
pub fn test_config(joints: usize, regions: &TestRegions) -> MasterConfig {
    let mut config = MasterConfig::default();
    config.bus.joint_count = joints;
    config.bus.driver = "stub".to_string();
    config.rt.pin_cpu = false;
    config.rt.lock_memory = false;
    config.rt.set_priority = false;
    config.rt.prefault_stack = true;
    config.shm.joint_data = regions.joint_data.clone();
    config.shm.system_state = regions.system_state.clone();
    config.shm.gate_poll_ms = 20;
    config
}
