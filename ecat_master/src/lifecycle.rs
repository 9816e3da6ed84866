//! Master lifecycle manager.
//!
//! Owns the fieldbus driver, the process data domain and the binding catalog,
//! and walks them through:
//!
//! ```text
//! Uninitialized ─acquire─► Acquired ─create_domain─► DomainCreated
//!   ─configure_joint(0..N)─► JointsConfigured ─activate─► Activated
//!   ─teardown─► Deactivated
//! ```
//!
//! Any failure after acquisition moves the manager to `Faulted`; only
//! `teardown` is possible from there. Teardown deactivates (if activated)
//! then releases (if acquired), exactly once, and also runs on drop.

use crate::catalog::{JointBinding, JointOffsets, SlaveBindingCatalog};
use crate::error::{ActivationError, ConfigStage, JointConfigError, JointFault, MasterError};
use ecat_common::config::MasterConfig;
use ecat_common::fieldbus::driver::{BusError, FieldbusDriver};
use ecat_common::fieldbus::pdo::{DataItem, JOINT_REGISTRATION, JOINT_SYNC_MANAGERS};
use ecat_common::fieldbus::types::{BusState, DeviceProfile, DomainId, DomainState};
use tracing::{debug, info, warn};

/// Lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Nothing acquired.
    Uninitialized,
    /// Bus handle held.
    Acquired,
    /// Domain created, no joint configured yet.
    DomainCreated,
    /// At least one joint configured.
    JointsConfigured,
    /// Cyclic exchange permitted.
    Activated,
    /// Torn down.
    Deactivated,
    /// A configuration or activation step failed.
    Faulted,
}

/// Descriptor of the live process data domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessDataDomain {
    /// Driver handle.
    pub id: DomainId,
    /// Size in bytes.
    pub size: usize,
}

/// What the manager needs from the configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecycleSettings {
    /// Fieldbus master index.
    pub bus_index: u32,
    /// Number of joints (positions `1..=joint_count`).
    pub joint_count: usize,
    /// Identity every joint must report.
    pub profile: DeviceProfile,
    /// Startup value of 0x6073:00; `0` skips the download.
    pub max_current: u16,
    /// Frame send interval in microseconds.
    pub send_interval_us: u32,
}

impl From<&MasterConfig> for LifecycleSettings {
    fn from(config: &MasterConfig) -> Self {
        Self {
            bus_index: config.bus.index,
            joint_count: config.bus.joint_count,
            profile: DeviceProfile {
                vendor_id: config.bus.vendor_id,
                product_code: config.bus.product_code,
            },
            max_current: config.bus.max_current,
            send_interval_us: config.bus.cycle_time_us,
        }
    }
}

/// Owner of the bus handle, the domain and the catalog.
pub struct MasterLifecycleManager {
    driver: Box<dyn FieldbusDriver>,
    settings: LifecycleSettings,
    state: LifecycleState,
    domain: Option<DomainId>,
    domain_size: usize,
    catalog: SlaveBindingCatalog,
    acquired: bool,
    active: bool,
}

impl MasterLifecycleManager {
    /// Manager in `Uninitialized` state.
    pub fn new(driver: Box<dyn FieldbusDriver>, settings: LifecycleSettings) -> Self {
        Self {
            driver,
            settings,
            state: LifecycleState::Uninitialized,
            domain: None,
            domain_size: 0,
            catalog: SlaveBindingCatalog::new(),
            acquired: false,
            active: false,
        }
    }

    /// Current state.
    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Settings in use.
    pub fn settings(&self) -> &LifecycleSettings {
        &self.settings
    }

    /// The binding catalog.
    pub fn catalog(&self) -> &SlaveBindingCatalog {
        &self.catalog
    }

    /// Name of the underlying driver.
    pub fn driver_name(&self) -> &'static str {
        self.driver.name()
    }

    fn require(&self, operation: &'static str, allowed: &[LifecycleState]) -> Result<(), MasterError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(MasterError::InvalidState {
                operation,
                state: self.state,
            })
        }
    }

    /// Reserve the fieldbus master.
    pub fn acquire(&mut self) -> Result<(), MasterError> {
        self.require("acquire", &[LifecycleState::Uninitialized])?;
        let index = self.settings.bus_index;

        self.driver
            .acquire(index)
            .map_err(|source| MasterError::Acquisition { index, source })?;

        self.acquired = true;
        self.state = LifecycleState::Acquired;
        info!(
            bus_index = index,
            driver = self.driver.name(),
            version = self.driver.version(),
            "Fieldbus master acquired"
        );
        Ok(())
    }

    /// Create the process data domain.
    pub fn create_domain(&mut self) -> Result<(), MasterError> {
        self.require("create_domain", &[LifecycleState::Acquired])?;

        match self.driver.create_domain() {
            Ok(id) => {
                self.domain = Some(id);
                self.state = LifecycleState::DomainCreated;
                debug!(domain = id.0, "Process data domain created");
                Ok(())
            }
            Err(e) => {
                self.state = LifecycleState::Faulted;
                Err(MasterError::Domain(e))
            }
        }
    }

    /// Configure joint `joint`: bind position `joint + 1`, apply the PDO
    /// layout, register the twelve items and queue the startup SDO.
    ///
    /// Joints must be configured in ascending order starting at 0.
    pub fn configure_joint(&mut self, joint: usize) -> Result<(), MasterError> {
        self.require(
            "configure_joint",
            &[LifecycleState::DomainCreated, LifecycleState::JointsConfigured],
        )?;

        let expected = self.catalog.len();
        if joint != expected || joint >= self.settings.joint_count {
            return Err(MasterError::JointOrder {
                requested: joint,
                expected,
                joint_count: self.settings.joint_count,
            });
        }

        match self.bind_joint(joint) {
            Ok(binding) => {
                debug!(
                    joint,
                    position = binding.position,
                    status_word = binding.offsets.of(DataItem::StatusWord),
                    control_word = binding.offsets.of(DataItem::ControlWord),
                    "Joint configured"
                );
                self.state = LifecycleState::JointsConfigured;
                Ok(())
            }
            Err(e) => {
                self.state = LifecycleState::Faulted;
                Err(e.into())
            }
        }
    }

    fn bind_joint(&mut self, joint: usize) -> Result<JointBinding, JointConfigError> {
        let position = joint as u16 + 1;
        let fail = |stage: ConfigStage, source: JointFault| JointConfigError {
            joint,
            position,
            stage,
            source,
        };
        let domain = self
            .domain
            .ok_or_else(|| fail(ConfigStage::Registration, BusError::UnknownDomain.into()))?;

        let slave = self
            .driver
            .bind_slave(0, position, &self.settings.profile)
            .map_err(|e| fail(ConfigStage::Bind, e.into()))?;

        self.driver
            .apply_pdo_mapping(slave, &JOINT_SYNC_MANAGERS)
            .map_err(|e| fail(ConfigStage::Mapping, e.into()))?;

        let offsets = self
            .driver
            .register_entries(domain, slave, &JOINT_REGISTRATION)
            .map_err(|e| fail(ConfigStage::Registration, e.into()))?;
        let offsets = JointOffsets::from_registration(&offsets)
            .map_err(|e| fail(ConfigStage::Catalog, e.into()))?;

        if self.settings.max_current != 0 {
            let entry = DataItem::MaxCurrent.entry();
            self.driver
                .write_sdo(
                    slave,
                    entry.index,
                    entry.subindex,
                    &self.settings.max_current.to_le_bytes(),
                )
                .map_err(|e| fail(ConfigStage::Sdo, e.into()))?;
        }

        let binding = JointBinding {
            joint,
            position,
            slave,
            offsets,
        };
        self.catalog
            .push(binding)
            .map_err(|e| fail(ConfigStage::Catalog, e.into()))?;
        Ok(binding)
    }

    /// Configure joints `0..joint_count` in order, stopping at the first
    /// failure.
    pub fn configure_all_joints(&mut self) -> Result<(), MasterError> {
        for joint in 0..self.settings.joint_count {
            self.configure_joint(joint)?;
        }
        info!(
            joints = self.settings.joint_count,
            profile = %self.settings.profile,
            "All joints configured"
        );
        Ok(())
    }

    /// Activate the master and return the live domain.
    ///
    /// Fails unless every joint in `[0, N)` was configured and the catalog
    /// fits the domain without overlap.
    pub fn activate(&mut self) -> Result<ProcessDataDomain, MasterError> {
        self.require(
            "activate",
            &[LifecycleState::DomainCreated, LifecycleState::JointsConfigured],
        )?;

        match self.activate_inner() {
            Ok(domain) => {
                self.catalog.freeze();
                self.state = LifecycleState::Activated;
                info!(
                    domain_size = domain.size,
                    joints = self.catalog.len(),
                    "Master activated"
                );
                Ok(domain)
            }
            Err(e) => {
                self.state = LifecycleState::Faulted;
                Err(e.into())
            }
        }
    }

    fn activate_inner(&mut self) -> Result<ProcessDataDomain, ActivationError> {
        let expected = self.settings.joint_count;
        if self.catalog.len() != expected {
            return Err(ActivationError::IncompleteConfiguration {
                configured: self.catalog.len(),
                expected,
            });
        }
        let id = self
            .domain
            .ok_or(ActivationError::Driver(BusError::UnknownDomain))?;

        self.driver.activate()?;
        self.active = true;

        // Programmed on the live master; failure is a warning.
        if let Err(e) = self.driver.set_send_interval(self.settings.send_interval_us) {
            warn!(
                interval_us = self.settings.send_interval_us,
                "Failed to set send interval: {e}"
            );
        }

        let size = self.driver.domain_size(id);
        self.catalog.validate(size)?;

        let available = self.driver.process_data(id).map_or(0, |pd| pd.len());
        if available < size || size == 0 {
            return Err(ActivationError::NoProcessData { expected: size });
        }

        self.domain_size = size;
        Ok(ProcessDataDomain { id, size })
    }

    fn live_domain(&self) -> Result<DomainId, BusError> {
        match (self.state, self.domain) {
            (LifecycleState::Activated, Some(id)) => Ok(id),
            _ => Err(BusError::NotActive),
        }
    }

    /// Receive frames and process the domain inputs.
    #[inline]
    pub fn receive(&mut self) -> Result<(), BusError> {
        let id = self.live_domain()?;
        self.driver.receive(id)
    }

    /// Queue the domain outputs and send frames.
    #[inline]
    pub fn send(&mut self) -> Result<(), BusError> {
        let id = self.live_domain()?;
        self.driver.send(id)
    }

    /// Catalog and process data together, for the per-cycle copies.
    ///
    /// `None` unless activated. The slice is cut to the validated domain
    /// size.
    #[inline]
    pub fn process_image(&mut self) -> Option<(&SlaveBindingCatalog, &mut [u8])> {
        let id = self.live_domain().ok()?;
        let size = self.domain_size;
        let pd = self.driver.process_data(id)?;
        let pd = pd.get_mut(..size)?;
        Some((&self.catalog, pd))
    }

    /// Domain health of the last exchange.
    #[inline]
    pub fn domain_state(&self) -> DomainState {
        match self.domain {
            Some(id) if self.active => self.driver.domain_state(id),
            _ => DomainState::default(),
        }
    }

    /// Aggregate bus state.
    #[inline]
    pub fn bus_state(&self) -> BusState {
        if self.acquired {
            self.driver.bus_state()
        } else {
            BusState::default()
        }
    }

    /// Deactivate (if activated) then release (if acquired). Idempotent.
    pub fn teardown(&mut self) {
        if self.active {
            info!("Deactivating fieldbus master");
            self.driver.deactivate();
            self.active = false;
        }
        if self.acquired {
            info!("Releasing fieldbus master");
            self.driver.release();
            self.acquired = false;
            self.domain = None;
            self.state = LifecycleState::Deactivated;
        }
    }
}

impl Drop for MasterLifecycleManager {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::simulation::SimulationDriver;
    use ecat_common::consts::{DEFAULT_PRODUCT_CODE, DEFAULT_VENDOR_ID};

    fn settings(joint_count: usize) -> LifecycleSettings {
        LifecycleSettings {
            bus_index: 0,
            joint_count,
            profile: DeviceProfile {
                vendor_id: DEFAULT_VENDOR_ID,
                product_code: DEFAULT_PRODUCT_CODE,
            },
            max_current: 400,
            send_interval_us: 1000,
        }
    }

    fn manager(bus_slaves: usize, joint_count: usize) -> MasterLifecycleManager {
        MasterLifecycleManager::new(
            Box::new(SimulationDriver::with_slaves(bus_slaves)),
            settings(joint_count),
        )
    }

    #[test]
    fn full_lifecycle_with_simulated_bus() {
        let mut master = manager(6, 6);
        assert_eq!(master.state(), LifecycleState::Uninitialized);

        master.acquire().unwrap();
        master.create_domain().unwrap();
        master.configure_all_joints().unwrap();
        assert_eq!(master.state(), LifecycleState::JointsConfigured);

        let domain = master.activate().unwrap();
        assert_eq!(domain.size, 6 * 28);
        assert_eq!(master.state(), LifecycleState::Activated);
        assert!(master.catalog().is_frozen());

        master.receive().unwrap();
        assert!(master.process_image().is_some());
        master.send().unwrap();

        master.teardown();
        assert_eq!(master.state(), LifecycleState::Deactivated);
        assert_eq!(master.receive(), Err(BusError::NotActive));

        // Second teardown is a no-op.
        master.teardown();
        assert_eq!(master.state(), LifecycleState::Deactivated);
    }

    #[test]
    fn activation_requires_every_joint() {
        let mut master = manager(6, 6);
        master.acquire().unwrap();
        master.create_domain().unwrap();
        master.configure_joint(0).unwrap();
        master.configure_joint(1).unwrap();

        let err = master.activate().unwrap_err();
        assert_eq!(
            err,
            MasterError::Activation(ActivationError::IncompleteConfiguration {
                configured: 2,
                expected: 6
            })
        );
        assert_eq!(master.state(), LifecycleState::Faulted);
        assert!(master.process_image().is_none());
    }

    #[test]
    fn joints_must_be_configured_in_order() {
        let mut master = manager(6, 6);
        master.acquire().unwrap();
        master.create_domain().unwrap();

        let err = master.configure_joint(1).unwrap_err();
        assert!(matches!(
            err,
            MasterError::JointOrder {
                requested: 1,
                expected: 0,
                ..
            }
        ));
        // An ordering mistake does not fault the manager.
        master.configure_joint(0).unwrap();
    }

    #[test]
    fn missing_slave_faults_the_manager() {
        let mut master = manager(3, 4);
        master.acquire().unwrap();
        master.create_domain().unwrap();

        let err = master.configure_all_joints().unwrap_err();
        match err {
            MasterError::JointConfig(e) => {
                assert_eq!(e.joint, 3);
                assert_eq!(e.position, 4);
                assert_eq!(e.stage, ConfigStage::Bind);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(master.state(), LifecycleState::Faulted);
        assert!(matches!(
            master.activate(),
            Err(MasterError::InvalidState { .. })
        ));
    }

    #[test]
    fn operations_out_of_order_are_rejected() {
        let mut master = manager(6, 6);
        assert!(matches!(
            master.create_domain(),
            Err(MasterError::InvalidState {
                operation: "create_domain",
                state: LifecycleState::Uninitialized
            })
        ));
        master.acquire().unwrap();
        assert!(matches!(
            master.acquire(),
            Err(MasterError::InvalidState { .. })
        ));
    }
}
