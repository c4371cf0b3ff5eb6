//! Kiosk configuration with TOML file support.
//!
//! Every section has defaults, so an empty file (or none at all) yields a
//! working kiosk with the sensor disabled and the lock simulated when no GPIO
//! is present. Durations are plain `*_ms` integers.
//!
//! ```toml
//! [sensor]
//! driver = "mock"
//!
//! [actuator]
//! pin = 17
//! hold_ms = 2000
//!
//! [face]
//! enabled = true
//! base_url = "http://10.0.0.5:8000"
//! ```

use crate::coordinator::CoordinatorSettings;
use crate::enrollment::EnrollmentConfig;
use serde::{Deserialize, Serialize};
use smartlocker_actuator::ArbiterConfig;
use smartlocker_biometric::PollerConfig;
use smartlocker_core::{Error, Result, constants};
use smartlocker_hardware::gpio::SYSFS_GPIO_ROOT;
use smartlocker_network::FaceServiceConfig;
use smartlocker_storage::{DatabaseConfig, HashingConfig};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Complete kiosk configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KioskConfig {
    pub sensor: SensorSection,
    pub actuator: ActuatorSection,
    pub polling: PollingSection,
    pub enrollment: EnrollmentSection,
    pub storage: StorageSection,
    pub face: FaceSection,
    pub logging: LoggingSection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorDriver {
    /// No fingerprint module; biometrics stay offline.
    #[default]
    None,

    /// In-process simulated module, driven from the console.
    Mock,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorSection {
    pub driver: SensorDriver,

    /// Template capacity of the simulated module.
    pub capacity: u16,
}

impl Default for SensorSection {
    fn default() -> Self {
        Self {
            driver: SensorDriver::None,
            capacity: constants::DEFAULT_SENSOR_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActuatorDriver {
    /// Linux sysfs GPIO, falling back to simulation when unavailable.
    #[default]
    Gpio,

    /// Log-only lock.
    Simulated,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActuatorSection {
    pub driver: ActuatorDriver,
    pub pin: u32,
    pub sysfs_root: PathBuf,
    pub hold_ms: u64,
    pub cooldown_ms: u64,
}

impl Default for ActuatorSection {
    fn default() -> Self {
        Self {
            driver: ActuatorDriver::Gpio,
            pin: constants::DEFAULT_SOLENOID_PIN,
            sysfs_root: PathBuf::from(SYSFS_GPIO_ROOT),
            hold_ms: constants::DEFAULT_HOLD_MS,
            cooldown_ms: constants::DEFAULT_COOLDOWN_MS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingSection {
    pub idle_interval_ms: u64,
    pub match_debounce_ms: u64,
    pub error_backoff_ms: u64,
}

impl Default for PollingSection {
    fn default() -> Self {
        Self {
            idle_interval_ms: constants::DEFAULT_POLL_INTERVAL_MS,
            match_debounce_ms: constants::DEFAULT_MATCH_DEBOUNCE_MS,
            error_backoff_ms: constants::DEFAULT_ERROR_BACKOFF_MS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrollmentSection {
    pub timeout_ms: u64,
    pub poll_interval_ms: u64,
    pub removal_settle_ms: u64,
}

impl Default for EnrollmentSection {
    fn default() -> Self {
        Self {
            timeout_ms: constants::DEFAULT_ENROLLMENT_TIMEOUT_MS,
            poll_interval_ms: constants::DEFAULT_ENROLLMENT_POLL_MS,
            removal_settle_ms: constants::DEFAULT_REMOVAL_SETTLE_MS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    pub database_path: String,
    pub max_connections: u32,

    /// Argon2id memory cost in KiB.
    pub argon2_memory_kib: u32,
    pub argon2_iterations: u32,
    pub argon2_parallelism: u32,
}

impl Default for StorageSection {
    fn default() -> Self {
        let database = DatabaseConfig::default();
        let hashing = HashingConfig::default();
        Self {
            database_path: database.database_path,
            max_connections: database.max_connections,
            argon2_memory_kib: hashing.memory_kib,
            argon2_iterations: hashing.iterations,
            argon2_parallelism: hashing.parallelism,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FaceSection {
    pub enabled: bool,
    pub base_url: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin_token: Option<String>,

    pub recognize_timeout_ms: u64,
    pub upload_timeout_ms: u64,
    pub train_timeout_ms: u64,

    /// Retrain the face model right after a registration upload.
    pub auto_train: bool,
}

impl Default for FaceSection {
    fn default() -> Self {
        let client = FaceServiceConfig::default();
        Self {
            enabled: false,
            base_url: client.base_url,
            admin_token: None,
            recognize_timeout_ms: client.recognize_timeout.as_millis() as u64,
            upload_timeout_ms: client.upload_timeout.as_millis() as u64,
            train_timeout_ms: client.train_timeout.as_millis() as u64,
            auto_train: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Human,
    Json,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// `EnvFilter` directive, e.g. `"info"` or `"info,smartlocker_kiosk=debug"`.
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Human,
        }
    }
}

impl KioskConfig {
    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Self = toml::from_str(s).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }

    /// Reject values no component can run with.
    pub fn validate(&self) -> Result<()> {
        if self.sensor.capacity <= constants::FIRST_SLOT_ID {
            return Err(Error::Config(format!(
                "sensor.capacity must be greater than {}",
                constants::FIRST_SLOT_ID
            )));
        }
        if self.actuator.hold_ms == 0 {
            return Err(Error::Config("actuator.hold_ms must be positive".into()));
        }
        if self.enrollment.timeout_ms == 0 || self.enrollment.poll_interval_ms == 0 {
            return Err(Error::Config(
                "enrollment timeout and poll interval must be positive".into(),
            ));
        }
        if self.storage.database_path.trim().is_empty() {
            return Err(Error::Config("storage.database_path must not be empty".into()));
        }
        if self.storage.max_connections == 0 {
            return Err(Error::Config("storage.max_connections must be positive".into()));
        }
        if self.face.enabled && self.face.base_url.trim().is_empty() {
            return Err(Error::Config("face.base_url is required when face is enabled".into()));
        }
        Ok(())
    }

    pub fn database_config(&self) -> DatabaseConfig {
        DatabaseConfig::new(self.storage.database_path.clone())
            .max_connections(self.storage.max_connections)
    }

    pub fn hashing_config(&self) -> HashingConfig {
        HashingConfig::new(
            self.storage.argon2_memory_kib,
            self.storage.argon2_iterations,
            self.storage.argon2_parallelism,
        )
    }

    /// Face client settings, or `None` when the service is disabled.
    pub fn face_config(&self) -> Option<FaceServiceConfig> {
        if !self.face.enabled {
            return None;
        }

        let mut config = FaceServiceConfig::new(self.face.base_url.clone())
            .with_recognize_timeout(Duration::from_millis(self.face.recognize_timeout_ms))
            .with_upload_timeout(Duration::from_millis(self.face.upload_timeout_ms))
            .with_train_timeout(Duration::from_millis(self.face.train_timeout_ms));
        if let Some(token) = &self.face.admin_token {
            config = config.with_admin_token(token.clone());
        }
        Some(config)
    }

    pub fn coordinator_settings(&self) -> CoordinatorSettings {
        CoordinatorSettings {
            poller: PollerConfig::default()
                .with_idle_interval(Duration::from_millis(self.polling.idle_interval_ms))
                .with_match_debounce(Duration::from_millis(self.polling.match_debounce_ms))
                .with_error_backoff(Duration::from_millis(self.polling.error_backoff_ms)),
            enrollment: EnrollmentConfig::default()
                .with_timeout(Duration::from_millis(self.enrollment.timeout_ms))
                .with_poll_interval(Duration::from_millis(self.enrollment.poll_interval_ms))
                .with_removal_settle(Duration::from_millis(self.enrollment.removal_settle_ms)),
            arbiter: ArbiterConfig::default()
                .with_hold(Duration::from_millis(self.actuator.hold_ms))
                .with_cooldown(Duration::from_millis(self.actuator.cooldown_ms)),
            auto_train_faces: self.face.auto_train,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config = KioskConfig::from_toml_str("").unwrap();
        assert_eq!(config, KioskConfig::default());
        assert_eq!(config.sensor.driver, SensorDriver::None);
        assert_eq!(config.actuator.pin, 17);
        assert_eq!(config.polling.idle_interval_ms, 100);
        assert!(config.face_config().is_none());
    }

    #[test]
    fn test_partial_toml_overrides() {
        let config = KioskConfig::from_toml_str(
            r#"
            [sensor]
            driver = "mock"

            [actuator]
            driver = "simulated"
            hold_ms = 500

            [face]
            enabled = true
            base_url = "http://10.0.0.5:8000"
            admin_token = "t0ken"

            [logging]
            format = "json"
            "#,
        )
        .unwrap();

        assert_eq!(config.sensor.driver, SensorDriver::Mock);
        assert_eq!(config.sensor.capacity, constants::DEFAULT_SENSOR_CAPACITY);
        assert_eq!(config.actuator.driver, ActuatorDriver::Simulated);
        assert_eq!(config.actuator.cooldown_ms, constants::DEFAULT_COOLDOWN_MS);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.logging.level, "info");

        let face = config.face_config().unwrap();
        assert_eq!(face.base_url, "http://10.0.0.5:8000");
        assert_eq!(face.admin_token.as_deref(), Some("t0ken"));

        let settings = config.coordinator_settings();
        assert_eq!(settings.arbiter.hold, Duration::from_millis(500));
    }

    #[test]
    fn test_default_round_trips_through_toml() {
        let config = KioskConfig::default();
        let parsed = KioskConfig::from_toml_str(&config.to_toml_string().unwrap()).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_example_file_documents_defaults() {
        let example = include_str!("../../../config/smartlocker.example.toml");
        assert_eq!(
            KioskConfig::from_toml_str(example).unwrap(),
            KioskConfig::default()
        );
    }

    #[rstest]
    #[case("[sensor]\ncapacity = 1")]
    #[case("[actuator]\nhold_ms = 0")]
    #[case("[enrollment]\ntimeout_ms = 0")]
    #[case("[storage]\ndatabase_path = \" \"")]
    #[case("[storage]\nmax_connections = 0")]
    #[case("[face]\nenabled = true\nbase_url = \"\"")]
    #[case("[sensor]\ndriver = \"serial\"")]
    fn test_invalid_config_rejected(#[case] toml: &str) {
        assert!(matches!(
            KioskConfig::from_toml_str(toml),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        let result = KioskConfig::from_toml_file("/nonexistent/smartlocker.toml");
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
