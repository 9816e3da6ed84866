//! Configuration loading traits and types.
//!
//! All sections of [`MasterConfig`] have defaults, so an empty TOML file (or
//! no file at all) yields the configuration the master has historically run
//! with: bus 0, six joints, 1 ms cycle, CPU 3, SCHED_FIFO priority 49.
//!
//! # Usage
//!
//! ```rust,no_run
//! use ecat_common::config::{ConfigLoader, MasterConfig, ConfigError};
//! use std::path::Path;
//!
//! fn main() -> Result<(), ConfigError> {
//!     let config = MasterConfig::load(Path::new("master.toml"))?;
//!     config.validate()?;
//!     println!("Joints: {}", config.bus.joint_count);
//!     Ok(())
//! }
//! ```

use crate::consts::*;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Error type for configuration loading operations.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Configuration file not found at specified path.
    #[error("Configuration file not found")]
    FileNotFound,

    /// TOML parsing failed.
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Semantic validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

/// Log level for application logging.
///
/// Uses lowercase serde values for TOML compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Most verbose, detailed tracing information.
    Trace,
    /// Debug information useful during development.
    Debug,
    /// General information about application operation.
    #[default]
    Info,
    /// Warning messages for potentially problematic situations.
    Warn,
    /// Error messages for serious problems.
    Error,
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

/// Common configuration fields.
///
/// # TOML Example
///
/// ```toml
/// [shared]
/// log_level = "debug"
/// service_name = "ecat-master-cell-01"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedConfig {
    /// Logging verbosity level.
    #[serde(default)]
    pub log_level: LogLevel,

    /// Application instance identifier.
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

fn default_service_name() -> String {
    "ecat-master".to_string()
}

impl Default for SharedConfig {
    fn default() -> Self {
        Self {
            log_level: LogLevel::default(),
            service_name: default_service_name(),
        }
    }
}

impl SharedConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if `service_name` is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service_name.is_empty() {
            return Err(ConfigError::ValidationError(
                "service_name cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Fieldbus section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Index of the fieldbus master to acquire.
    pub index: u32,
    /// Name of the driver in the driver registry.
    pub driver: String,
    /// Number of joints; joint `i` sits at bus position `i + 1`.
    pub joint_count: usize,
    /// Cycle period in microseconds, also programmed as the send interval.
    pub cycle_time_us: u32,
    /// Vendor id every bound device must report.
    pub vendor_id: u32,
    /// Product code every bound device must report.
    pub product_code: u32,
    /// Value written to 0x6073:00 during configuration. `0` skips the write.
    pub max_current: u16,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            index: DEFAULT_BUS_INDEX,
            driver: DEFAULT_DRIVER.to_string(),
            joint_count: DEFAULT_JOINT_COUNT,
            cycle_time_us: DEFAULT_CYCLE_TIME_US,
            vendor_id: DEFAULT_VENDOR_ID,
            product_code: DEFAULT_PRODUCT_CODE,
            max_current: DEFAULT_MAX_CURRENT,
        }
    }
}

impl BusConfig {
    /// Cycle period as a `Duration`.
    pub fn cycle_time(&self) -> Duration {
        Duration::from_micros(self.cycle_time_us as u64)
    }
}

/// Real-time setup section.
///
/// Every step is best-effort unless `strict` is set, in which case the first
/// failing step aborts startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RtConfig {
    /// Pin the cyclic thread to `cpu_core`.
    pub pin_cpu: bool,
    /// CPU core for pinning.
    pub cpu_core: usize,
    /// Lock current and future pages with `mlockall`.
    pub lock_memory: bool,
    /// Touch `MAX_SAFE_STACK` bytes of stack before the loop.
    pub prefault_stack: bool,
    /// Switch the thread to SCHED_FIFO at `priority`.
    pub set_priority: bool,
    /// SCHED_FIFO priority (1..=99).
    pub priority: i32,
    /// Promote RT setup failures from warnings to fatal errors.
    pub strict: bool,
}

impl Default for RtConfig {
    fn default() -> Self {
        Self {
            pin_cpu: true,
            cpu_core: DEFAULT_CPU_CORE,
            lock_memory: true,
            prefault_stack: true,
            set_priority: true,
            priority: DEFAULT_RT_PRIORITY,
            strict: false,
        }
    }
}

/// Shared-memory section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShmConfig {
    /// Name of the per-joint command/feedback region.
    pub joint_data: String,
    /// Name of the coordination-flag region.
    pub system_state: String,
    /// Upper bound on one wait of the supervisor gate, in milliseconds.
    pub gate_poll_ms: u64,
    /// Attempts per cycle to obtain a consistent command snapshot.
    pub command_read_attempts: u32,
}

impl Default for ShmConfig {
    fn default() -> Self {
        Self {
            joint_data: DEFAULT_JOINT_DATA_NAME.to_string(),
            system_state: DEFAULT_SYSTEM_STATE_NAME.to_string(),
            gate_poll_ms: DEFAULT_GATE_POLL_MS,
            command_read_attempts: DEFAULT_COMMAND_READ_ATTEMPTS,
        }
    }
}

impl ShmConfig {
    /// Gate poll interval as a `Duration`.
    pub fn gate_poll_interval(&self) -> Duration {
        Duration::from_millis(self.gate_poll_ms)
    }
}

/// Complete master configuration.
///
/// # TOML Example
///
/// ```toml
/// [shared]
/// service_name = "ecat-master"
///
/// [bus]
/// index = 0
/// joint_count = 6
/// cycle_time_us = 1000
///
/// [rt]
/// cpu_core = 3
/// priority = 49
///
/// [shm]
/// joint_data = "JointData"
/// system_state = "SystemStateData"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MasterConfig {
    /// Common fields.
    pub shared: SharedConfig,
    /// Fieldbus section.
    pub bus: BusConfig,
    /// Real-time setup section.
    pub rt: RtConfig,
    /// Shared-memory section.
    pub shm: ShmConfig,
}

impl MasterConfig {
    /// Validate ranges and names.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.shared.validate()?;

        if self.bus.joint_count == 0 || self.bus.joint_count > MAX_JOINTS {
            return Err(ConfigError::ValidationError(format!(
                "bus.joint_count must be in 1..={MAX_JOINTS}, got {}",
                self.bus.joint_count
            )));
        }
        if self.bus.cycle_time_us == 0 {
            return Err(ConfigError::ValidationError(
                "bus.cycle_time_us must be non-zero".to_string(),
            ));
        }
        if self.bus.driver.is_empty() {
            return Err(ConfigError::ValidationError(
                "bus.driver cannot be empty".to_string(),
            ));
        }
        if self.rt.set_priority && !(1..=99).contains(&self.rt.priority) {
            return Err(ConfigError::ValidationError(format!(
                "rt.priority must be in 1..=99, got {}",
                self.rt.priority
            )));
        }
        for (field, name) in [
            ("shm.joint_data", &self.shm.joint_data),
            ("shm.system_state", &self.shm.system_state),
        ] {
            let trimmed = name.strip_prefix('/').unwrap_or(name);
            if trimmed.is_empty() || trimmed.contains('/') {
                return Err(ConfigError::ValidationError(format!(
                    "{field} must be a non-empty name without '/', got {name:?}"
                )));
            }
        }
        let bare = |name: &str| name.strip_prefix('/').unwrap_or(name).to_string();
        if bare(&self.shm.joint_data) == bare(&self.shm.system_state) {
            return Err(ConfigError::ValidationError(
                "shm.joint_data and shm.system_state must differ".to_string(),
            ));
        }
        if self.shm.gate_poll_ms == 0 {
            return Err(ConfigError::ValidationError(
                "shm.gate_poll_ms must be non-zero".to_string(),
            ));
        }
        if self.shm.command_read_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "shm.command_read_attempts must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Trait for loading configuration from TOML files.
///
/// # Contract
///
/// - Returns `ConfigError::FileNotFound` if the file does not exist
/// - Returns `ConfigError::ParseError` if TOML syntax is invalid
pub trait ConfigLoader: Sized + serde::de::DeserializeOwned {
    /// Load configuration from a TOML file.
    fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound
            } else {
                ConfigError::ParseError(e.to_string())
            }
        })?;

        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

// Blanket implementation for all types that implement DeserializeOwned.
impl<T: serde::de::DeserializeOwned> ConfigLoader for T {}
