//! Simulation driver module.
//!
//! An in-process bus of CiA-402 servo drives, for development and testing
//! without a network interface.

mod device;
mod driver;

pub use device::{DriveState, MODE_CSP, MODE_CST, SimulatedDrive};
pub use driver::SimulationDriver;

use ecat_common::fieldbus::driver::FieldbusDriver;

/// Factory function to create a simulation driver instance.
pub fn create_driver() -> Box<dyn FieldbusDriver> {
    Box::new(SimulationDriver::new())
}
