//! Fieldbus driver implementations.
//!
//! - [`simulation`] - in-process bus of servo drives for development and testing
//!
//! # Adding New Drivers
//!
//! 1. Create a new submodule under `drivers/`
//! 2. Implement the `FieldbusDriver` trait from `ecat_common::fieldbus::driver`
//! 3. Register its factory in [`register_builtin_drivers`]

pub mod simulation;

use crate::driver_registry::{DriverRegistry, RegistryError};

/// Register all built-in drivers in `registry`.
pub fn register_builtin_drivers(registry: &mut DriverRegistry) -> Result<(), RegistryError> {
    registry.register("simulation", simulation::create_driver)
}
