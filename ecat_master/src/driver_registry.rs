//! Driver registry for fieldbus drivers.
//!
//! Provides a `DriverRegistry` struct for registering and retrieving driver
//! factories by name. Constructed at startup and passed by value; no global
//! state.

use crate::drivers::register_builtin_drivers;
use ecat_common::fieldbus::driver::{DriverFactory, FieldbusDriver};
use std::collections::HashMap;
use thiserror::Error;

/// Registry lookup and registration errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// No driver registered under this name.
    #[error("fieldbus driver '{0}' not found")]
    DriverNotFound(String),

    /// A driver with this name is already registered.
    #[error("fieldbus driver '{0}' is already registered")]
    DuplicateDriver(&'static str),
}

/// Registry of available fieldbus drivers.
pub struct DriverRegistry {
    factories: HashMap<&'static str, DriverFactory>,
}

impl DriverRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registry holding every built-in driver.
    pub fn with_builtin_drivers() -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        register_builtin_drivers(&mut registry)?;
        Ok(registry)
    }

    /// Register a driver factory.
    ///
    /// # Errors
    /// Returns `RegistryError::DuplicateDriver` if the name is taken.
    pub fn register(&mut self, name: &'static str, factory: DriverFactory) -> Result<(), RegistryError> {
        if self.factories.contains_key(name) {
            return Err(RegistryError::DuplicateDriver(name));
        }
        self.factories.insert(name, factory);
        Ok(())
    }

    /// Get a driver factory by name.
    pub fn get_factory(&self, name: &str) -> Option<DriverFactory> {
        self.factories.get(name).copied()
    }

    /// Create a driver instance by name.
    ///
    /// # Errors
    /// Returns `RegistryError::DriverNotFound` if no driver with the given
    /// name is registered.
    pub fn create_driver(&self, name: &str) -> Result<Box<dyn FieldbusDriver>, RegistryError> {
        let factory = self
            .get_factory(name)
            .ok_or_else(|| RegistryError::DriverNotFound(name.to_string()))?;
        Ok(factory())
    }

    /// List all registered driver names, sorted.
    pub fn list_drivers(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.factories.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

impl Default for DriverRegistry {
    fn default() -> Self {
        Self::new()
    }
}
