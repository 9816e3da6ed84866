//! Simulated CiA-402 servo drive.
//!
//! Models the power state machine driven by the control word, plus two
//! operating modes:
//! - CSP (8): the position follows the target, limited to `max_step` per cycle
//! - CST (10): the torque follows the target, clamped by the current limit

use ecat_common::fieldbus::types::DeviceProfile;
use tracing::{debug, trace};

/// Cyclic synchronous position mode.
pub const MODE_CSP: i8 = 8;
/// Cyclic synchronous torque mode.
pub const MODE_CST: i8 = 10;

/// Control word bit: fault reset (edge triggered).
const CW_FAULT_RESET: u16 = 0x0080;

/// Largest position change per cycle in CSP.
const DEFAULT_MAX_STEP: i32 = 1_000;

/// Power state of the drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriveState {
    /// Power stage off, waiting for "shutdown".
    SwitchOnDisabled,
    /// Ready, waiting for "switch on".
    ReadyToSwitchOn,
    /// Switched on, waiting for "enable operation".
    SwitchedOn,
    /// Following targets.
    OperationEnabled,
    /// Latched fault; needs a fault reset edge.
    Fault,
}

impl DriveState {
    /// Status word bits 0-6 for this state.
    pub const fn status_word(self) -> u16 {
        match self {
            DriveState::SwitchOnDisabled => 0x0040,
            DriveState::ReadyToSwitchOn => 0x0021,
            DriveState::SwitchedOn => 0x0023,
            DriveState::OperationEnabled => 0x0027,
            DriveState::Fault => 0x0008,
        }
    }
}

/// One drive on the simulated bus.
#[derive(Debug, Clone)]
pub struct SimulatedDrive {
    profile: DeviceProfile,
    state: DriveState,
    last_control: u16,
    mode: i8,
    target_position: i32,
    target_torque: i16,
    position: i32,
    velocity: i32,
    torque: i16,
    current: i16,
    error_code: u16,
    max_current: u16,
    max_step: i32,
}

impl SimulatedDrive {
    /// Powered-up drive reporting `profile`.
    pub fn new(profile: DeviceProfile) -> Self {
        Self {
            profile,
            state: DriveState::SwitchOnDisabled,
            last_control: 0,
            mode: 0,
            target_position: 0,
            target_torque: 0,
            position: 0,
            velocity: 0,
            torque: 0,
            current: 0,
            error_code: 0,
            max_current: 0,
            max_step: DEFAULT_MAX_STEP,
        }
    }

    /// Identity reported by the drive.
    pub fn profile(&self) -> DeviceProfile {
        self.profile
    }

    /// Power state.
    pub fn state(&self) -> DriveState {
        self.state
    }

    /// 0x6041 status word.
    pub fn status_word(&self) -> u16 {
        self.state.status_word()
    }

    /// 0x6061 mode display.
    pub fn mode_display(&self) -> i8 {
        self.mode
    }

    /// 0x6064 position actual.
    pub fn position(&self) -> i32 {
        self.position
    }

    /// 0x606C velocity actual (increments per cycle).
    pub fn velocity(&self) -> i32 {
        self.velocity
    }

    /// 0x6077 torque actual.
    pub fn torque(&self) -> i16 {
        self.torque
    }

    /// 0x6078 current actual.
    pub fn current(&self) -> i16 {
        self.current
    }

    /// 0x603F error code.
    pub fn error_code(&self) -> u16 {
        self.error_code
    }

    /// 0x6073 max current; `0` means unlimited.
    pub fn max_current(&self) -> u16 {
        self.max_current
    }

    /// Write 0x6073.
    pub fn set_max_current(&mut self, value: u16) {
        self.max_current = value;
    }

    /// Latch a fault with `code`.
    pub fn inject_fault(&mut self, code: u16) {
        debug!(code, "Simulated drive fault");
        self.state = DriveState::Fault;
        self.error_code = code;
    }

    /// Apply the command items of one cycle.
    pub fn apply_commands(
        &mut self,
        control_word: u16,
        mode: i8,
        target_torque: i16,
        target_position: i32,
        max_current: u16,
    ) {
        self.apply_control_word(control_word);
        self.mode = mode;
        self.target_torque = target_torque;
        self.target_position = target_position;
        self.max_current = max_current;
    }

    fn apply_control_word(&mut self, cw: u16) {
        let rising = cw & !self.last_control;
        self.last_control = cw;

        let next = match self.state {
            DriveState::Fault if rising & CW_FAULT_RESET != 0 => {
                self.error_code = 0;
                DriveState::SwitchOnDisabled
            }
            DriveState::Fault => DriveState::Fault,
            // Disable voltage.
            _ if cw & 0x0002 == 0 => DriveState::SwitchOnDisabled,
            // Quick stop.
            _ if cw & 0x0004 == 0 => DriveState::SwitchOnDisabled,
            // Shutdown.
            _ if cw & 0x0087 == 0x0006 => DriveState::ReadyToSwitchOn,
            // Switch on / disable operation.
            DriveState::ReadyToSwitchOn | DriveState::OperationEnabled
                if cw & 0x008F == 0x0007 =>
            {
                DriveState::SwitchedOn
            }
            DriveState::ReadyToSwitchOn if cw & 0x008F == 0x000F => DriveState::SwitchedOn,
            // Enable operation.
            DriveState::SwitchedOn if cw & 0x008F == 0x000F => {
                self.target_position = self.position;
                DriveState::OperationEnabled
            }
            state => state,
        };

        if next != self.state {
            trace!(from = ?self.state, to = ?next, control_word = cw, "Drive state change");
            self.state = next;
        }
    }

    /// Advance the drive by one cycle.
    pub fn step(&mut self) {
        if self.state != DriveState::OperationEnabled {
            self.velocity = 0;
            self.torque = 0;
            self.current = 0;
            return;
        }

        match self.mode {
            MODE_CSP => {
                let delta = self
                    .target_position
                    .saturating_sub(self.position)
                    .clamp(-self.max_step, self.max_step);
                self.position = self.position.saturating_add(delta);
                self.velocity = delta;
                self.torque = 0;
            }
            MODE_CST => {
                let limit = self.torque_limit();
                self.torque = self.target_torque.clamp(-limit, limit);
                self.velocity = i32::from(self.torque) / 10;
                self.position = self.position.saturating_add(self.velocity);
            }
            _ => {
                self.velocity = 0;
                self.torque = 0;
            }
        }
        self.current = self.torque.saturating_abs();
    }

    fn torque_limit(&self) -> i16 {
        match self.max_current {
            0 => i16::MAX,
            limit => i16::try_from(limit).unwrap_or(i16::MAX),
        }
    }
}
