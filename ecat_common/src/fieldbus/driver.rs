//! Fieldbus driver trait and error types.
//!
//! This module defines:
//! - `FieldbusDriver` trait - Interface to the fieldbus protocol engine
//! - `BusError` enum - Error types reported by drivers
//! - `DriverFactory` type alias - Factory function type

use crate::fieldbus::types::{
    BusState, DeviceProfile, DomainId, DomainState, PdoEntry, SlaveHandle, SyncManagerConfig,
};
use thiserror::Error;

/// Error types reported by a fieldbus driver.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BusError {
    /// No master with this index could be reserved.
    #[error("fieldbus master {index} unavailable: {reason}")]
    MasterUnavailable {
        /// Requested master index.
        index: u32,
        /// Driver-specific reason.
        reason: String,
    },

    /// The operation needs an acquired master.
    #[error("fieldbus master not acquired")]
    NotAcquired,

    /// Domain handle unknown to the driver.
    #[error("unknown process data domain")]
    UnknownDomain,

    /// Nothing answers at the bus position.
    #[error("no slave at bus position {position}")]
    SlaveNotFound {
        /// Bus position.
        position: u16,
    },

    /// Slave configuration rejected (identity mismatch, double binding...).
    #[error("slave configuration rejected: {0}")]
    SlaveConfig(String),

    /// PDO assignment or mapping rejected.
    #[error("PDO mapping rejected: {0}")]
    Mapping(String),

    /// PDO entry registration failed.
    #[error("PDO entry registration failed: {0}")]
    Registration(String),

    /// SDO download failed.
    #[error("SDO download {index:#06x}:{subindex:02x} failed: {reason}")]
    Sdo {
        /// Object index.
        index: u16,
        /// Object subindex.
        subindex: u8,
        /// Driver-specific reason.
        reason: String,
    },

    /// Activation failed.
    #[error("activation failed: {0}")]
    Activation(String),

    /// The domain is not in live exchange.
    #[error("domain not active")]
    NotActive,

    /// Frame send or receive failed.
    #[error("frame exchange failed: {0}")]
    Exchange(String),
}

/// Factory function type for creating driver instances.
pub type DriverFactory = fn() -> Box<dyn FieldbusDriver>;

/// Interface to the fieldbus protocol engine.
///
/// # Lifecycle
///
/// 1. `acquire()` - reserve the master (exactly one per process)
/// 2. `create_domain()` - allocate the process data domain
/// 3. per slave: `bind_slave()`, `apply_pdo_mapping()`, `register_entries()`,
///    optionally `write_sdo()`
/// 4. `activate()` - start cyclic exchange; `process_data()` becomes available
/// 5. every cycle: `receive()`, read/write `process_data()`, `send()`
/// 6. `deactivate()`, then `release()`
///
/// # Timing Contracts
///
/// | Operation | RT Constraint |
/// |-----------|---------------|
/// | steps 1-4 | None (pre-RT, may allocate and block) |
/// | `receive()` / `send()` / state queries | **HARD**, within the cycle |
/// | steps 6 | None (post-RT) |
pub trait FieldbusDriver: Send {
    /// Returns the driver's unique identifier (e.g., "simulation").
    fn name(&self) -> &'static str;

    /// Returns the driver's semantic version.
    fn version(&self) -> &'static str;

    /// Reserve fieldbus master `bus_index`.
    fn acquire(&mut self, bus_index: u32) -> Result<(), BusError>;

    /// Create the process data domain.
    fn create_domain(&mut self) -> Result<DomainId, BusError>;

    /// Bind the slave at `alias`/`position`, which must match `profile`.
    fn bind_slave(
        &mut self,
        alias: u16,
        position: u16,
        profile: &DeviceProfile,
    ) -> Result<SlaveHandle, BusError>;

    /// Replace the slave's sync manager / PDO configuration.
    fn apply_pdo_mapping(
        &mut self,
        slave: SlaveHandle,
        sync_managers: &[SyncManagerConfig],
    ) -> Result<(), BusError>;

    /// Register entries of `slave` in `domain`.
    ///
    /// Returns one byte offset per entry, in the order given.
    fn register_entries(
        &mut self,
        domain: DomainId,
        slave: SlaveHandle,
        entries: &[PdoEntry],
    ) -> Result<Vec<usize>, BusError>;

    /// Queue an SDO download performed when the slave is configured.
    fn write_sdo(
        &mut self,
        slave: SlaveHandle,
        index: u16,
        subindex: u8,
        data: &[u8],
    ) -> Result<(), BusError>;

    /// Program the master's frame send interval.
    ///
    /// Default implementation accepts any interval.
    fn set_send_interval(&mut self, _interval_us: u32) -> Result<(), BusError> {
        Ok(())
    }

    /// Activate the master; the domain enters live exchange.
    fn activate(&mut self) -> Result<(), BusError>;

    /// Size of the domain in bytes.
    fn domain_size(&self, domain: DomainId) -> usize;

    /// Domain process data; `None` before activation.
    fn process_data(&mut self, domain: DomainId) -> Option<&mut [u8]>;

    /// Receive frames and process the domain's input data.
    fn receive(&mut self, domain: DomainId) -> Result<(), BusError>;

    /// Queue the domain's output data and send frames.
    fn send(&mut self, domain: DomainId) -> Result<(), BusError>;

    /// Health pair of the last exchange.
    fn domain_state(&self, domain: DomainId) -> DomainState;

    /// Aggregate bus state.
    fn bus_state(&self) -> BusState;

    /// Leave live exchange. Must tolerate being called when not active.
    fn deactivate(&mut self);

    /// Release the master. Must tolerate being called when not acquired.
    fn release(&mut self);
}
