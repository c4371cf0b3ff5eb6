//! Lock actuators backed by a GPIO line, plus a simulated fallback.
//!
//! [`SysfsGpioActuator`] drives a pin through the legacy sysfs interface
//! (`/sys/class/gpio`). Kiosks without GPIO access use [`SimulatedActuator`],
//! which only logs what it would have done.

use crate::{
    HardwareError, Result,
    traits::Actuator,
    types::{DeviceInfo, SignalLevel},
};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Default sysfs GPIO root.
pub const SYSFS_GPIO_ROOT: &str = "/sys/class/gpio";

/// Actuator driving a single output pin through sysfs.
#[derive(Debug)]
pub struct SysfsGpioActuator {
    pin: u32,
    pin_dir: PathBuf,
    level: Option<SignalLevel>,
}

impl SysfsGpioActuator {
    /// Export `pin` under `root` if needed, configure it as an output and
    /// drive it low.
    ///
    /// # Errors
    ///
    /// Returns `HardwareError::InitializationFailed` if `root` does not exist,
    /// or `HardwareError::Io` if any sysfs write fails.
    pub async fn open(pin: u32, root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        if !tokio::fs::try_exists(root).await? {
            return Err(HardwareError::initialization_failed(format!(
                "GPIO root {} not found",
                root.display()
            )));
        }

        let pin_dir = root.join(format!("gpio{pin}"));
        if !tokio::fs::try_exists(&pin_dir).await? {
            debug!(pin, "Exporting GPIO pin");
            tokio::fs::write(root.join("export"), pin.to_string()).await?;
        }
        tokio::fs::write(pin_dir.join("direction"), "out").await?;

        let mut actuator = Self {
            pin,
            pin_dir,
            level: None,
        };
        actuator.write(SignalLevel::Low).await?;

        info!(pin, "GPIO actuator ready");
        Ok(actuator)
    }

    /// BCM pin number.
    pub fn pin(&self) -> u32 {
        self.pin
    }

    async fn write(&mut self, level: SignalLevel) -> Result<()> {
        tokio::fs::write(self.pin_dir.join("value"), level.as_sysfs()).await?;
        self.level = Some(level);
        Ok(())
    }
}

impl Actuator for SysfsGpioActuator {
    async fn assert(&mut self) -> Result<()> {
        self.write(SignalLevel::High).await
    }

    async fn deassert(&mut self) -> Result<()> {
        self.write(SignalLevel::Low).await
    }

    fn level(&self) -> Option<SignalLevel> {
        self.level
    }

    async fn get_info(&self) -> Result<DeviceInfo> {
        Ok(DeviceInfo::new(format!("GPIO {}", self.pin), "sysfs GPIO"))
    }
}

/// Actuator used when no GPIO line is available.
#[derive(Debug, Default)]
pub struct SimulatedActuator {
    level: Option<SignalLevel>,
}

impl SimulatedActuator {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Actuator for SimulatedActuator {
    async fn assert(&mut self) -> Result<()> {
        info!("Simulated lock: solenoid energized");
        self.level = Some(SignalLevel::High);
        Ok(())
    }

    async fn deassert(&mut self) -> Result<()> {
        info!("Simulated lock: solenoid released");
        self.level = Some(SignalLevel::Low);
        Ok(())
    }

    fn level(&self) -> Option<SignalLevel> {
        self.level
    }

    async fn get_info(&self) -> Result<DeviceInfo> {
        Ok(DeviceInfo::new("Simulated Lock", "Simulated"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn fake_sysfs(pin: u32) -> TempDir {
        let root = tempfile::tempdir().unwrap();
        tokio::fs::create_dir(root.path().join(format!("gpio{pin}")))
            .await
            .unwrap();
        root
    }

    async fn read_value(root: &TempDir, pin: u32) -> String {
        tokio::fs::read_to_string(root.path().join(format!("gpio{pin}/value")))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_open_configures_output_low() {
        let root = fake_sysfs(17).await;
        let actuator = SysfsGpioActuator::open(17, root.path()).await.unwrap();

        let direction = tokio::fs::read_to_string(root.path().join("gpio17/direction"))
            .await
            .unwrap();
        assert_eq!(direction, "out");
        assert_eq!(read_value(&root, 17).await, "0");
        assert_eq!(actuator.level(), Some(SignalLevel::Low));
        assert_eq!(actuator.pin(), 17);
    }

    #[tokio::test]
    async fn test_assert_and_deassert_write_value() {
        let root = fake_sysfs(17).await;
        let mut actuator = SysfsGpioActuator::open(17, root.path()).await.unwrap();

        actuator.assert().await.unwrap();
        assert_eq!(read_value(&root, 17).await, "1");

        actuator.deassert().await.unwrap();
        assert_eq!(read_value(&root, 17).await, "0");
    }

    #[tokio::test]
    async fn test_unexported_pin_is_exported() {
        let root = tempfile::tempdir().unwrap();

        // Without a kernel nothing creates gpio22/, so the direction write fails
        // after the export request has been issued.
        let result = SysfsGpioActuator::open(22, root.path()).await;
        assert!(matches!(result, Err(HardwareError::Io(_))));

        let export = tokio::fs::read_to_string(root.path().join("export"))
            .await
            .unwrap();
        assert_eq!(export, "22");
    }

    #[tokio::test]
    async fn test_missing_root_fails_initialization() {
        let root = tempfile::tempdir().unwrap();
        let missing = root.path().join("nope");

        let result = SysfsGpioActuator::open(17, &missing).await;
        assert!(matches!(
            result,
            Err(HardwareError::InitializationFailed { .. })
        ));
    }

    #[tokio::test]
    async fn test_simulated_actuator_tracks_level() {
        let mut actuator = SimulatedActuator::new();
        actuator.assert().await.unwrap();
        assert_eq!(actuator.level(), Some(SignalLevel::High));
        actuator.deassert().await.unwrap();
        assert_eq!(actuator.level(), Some(SignalLevel::Low));
    }
}
