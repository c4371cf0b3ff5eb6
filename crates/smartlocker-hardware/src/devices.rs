//! Enum wrappers for hardware device dispatch.
//!
//! Native `async fn` in traits is not object-safe, so `Box<dyn FingerprintSensor>`
//! is not available. The enums in this module give the rest of the kiosk one
//! concrete type per device family while keeping static dispatch.
//!
//! # Examples
//!
//! ```
//! use smartlocker_hardware::devices::AnyFingerprintSensor;
//! use smartlocker_hardware::mock::MockFingerprintSensor;
//!
//! let (sensor, _handle) = MockFingerprintSensor::new();
//! let any_sensor = AnyFingerprintSensor::Mock(sensor);
//! ```

use crate::gpio::{SimulatedActuator, SysfsGpioActuator};
use crate::mock::{MockActuator, MockFingerprintSensor};
use crate::traits::{Actuator, FingerprintSensor};
use crate::types::{CaptureStatus, DeviceInfo, ModelOutcome, SearchHit, SignalLevel};
use crate::Result;
use std::path::Path;
use tracing::warn;

/// Enum wrapper for fingerprint sensor dispatch.
#[derive(Debug)]
#[non_exhaustive]
pub enum AnyFingerprintSensor {
    /// Mock sensor for development and testing.
    Mock(MockFingerprintSensor),
    // TODO: add a UART driver for R307/AS608 modules behind `hardware-serial`
}

impl FingerprintSensor for AnyFingerprintSensor {
    async fn check_module(&mut self) -> Result<bool> {
        match self {
            Self::Mock(device) => device.check_module().await,
        }
    }

    async fn capacity(&self) -> Result<u16> {
        match self {
            Self::Mock(device) => device.capacity().await,
        }
    }

    async fn get_image(&mut self) -> Result<CaptureStatus> {
        match self {
            Self::Mock(device) => device.get_image().await,
        }
    }

    async fn image_to_template(&mut self, buffer: u8) -> Result<()> {
        match self {
            Self::Mock(device) => device.image_to_template(buffer).await,
        }
    }

    async fn search(&mut self) -> Result<Option<SearchHit>> {
        match self {
            Self::Mock(device) => device.search().await,
        }
    }

    async fn create_model(&mut self) -> Result<ModelOutcome> {
        match self {
            Self::Mock(device) => device.create_model().await,
        }
    }

    async fn store_model(&mut self, slot: u16) -> Result<()> {
        match self {
            Self::Mock(device) => device.store_model(slot).await,
        }
    }

    async fn load_model(&mut self, slot: u16) -> Result<bool> {
        match self {
            Self::Mock(device) => device.load_model(slot).await,
        }
    }

    async fn delete_model(&mut self, slot: u16) -> Result<bool> {
        match self {
            Self::Mock(device) => device.delete_model(slot).await,
        }
    }

    async fn template_count(&mut self) -> Result<u16> {
        match self {
            Self::Mock(device) => device.template_count().await,
        }
    }

    async fn get_device_info(&self) -> Result<DeviceInfo> {
        match self {
            Self::Mock(device) => device.get_device_info().await,
        }
    }
}

/// Enum wrapper for lock actuator dispatch.
#[derive(Debug)]
#[non_exhaustive]
pub enum AnyActuator {
    /// Mock actuator for development and testing.
    Mock(MockActuator),

    /// Logging-only actuator for kiosks without a GPIO line.
    Simulated(SimulatedActuator),

    /// Solenoid relay on a sysfs GPIO pin.
    SysfsGpio(SysfsGpioActuator),
}

impl AnyActuator {
    /// Open the GPIO actuator on `pin`, falling back to the simulated
    /// actuator when the line cannot be claimed.
    pub async fn gpio_or_simulated(pin: u32, root: impl AsRef<Path>) -> Self {
        match SysfsGpioActuator::open(pin, root).await {
            Ok(actuator) => Self::SysfsGpio(actuator),
            Err(e) => {
                warn!(pin, error = %e, "GPIO unavailable, using simulated lock");
                Self::Simulated(SimulatedActuator::new())
            }
        }
    }
}

impl Actuator for AnyActuator {
    async fn assert(&mut self) -> Result<()> {
        match self {
            Self::Mock(device) => device.assert().await,
            Self::Simulated(device) => device.assert().await,
            Self::SysfsGpio(device) => device.assert().await,
        }
    }

    async fn deassert(&mut self) -> Result<()> {
        match self {
            Self::Mock(device) => device.deassert().await,
            Self::Simulated(device) => device.deassert().await,
            Self::SysfsGpio(device) => device.deassert().await,
        }
    }

    fn level(&self) -> Option<SignalLevel> {
        match self {
            Self::Mock(device) => device.level(),
            Self::Simulated(device) => device.level(),
            Self::SysfsGpio(device) => device.level(),
        }
    }

    async fn get_info(&self) -> Result<DeviceInfo> {
        match self {
            Self::Mock(device) => device.get_info().await,
            Self::Simulated(device) => device.get_info().await,
            Self::SysfsGpio(device) => device.get_info().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::Presentation;

    #[tokio::test]
    async fn test_any_sensor_dispatch() {
        let (sensor, handle) = MockFingerprintSensor::new();
        let mut sensor = AnyFingerprintSensor::Mock(sensor);
        handle.present(Presentation::Finger("jo".into()));

        assert!(sensor.check_module().await.unwrap());
        assert_eq!(sensor.capacity().await.unwrap(), 128);
        assert_eq!(sensor.get_image().await.unwrap(), CaptureStatus::Captured);
        assert_eq!(sensor.template_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_any_actuator_dispatch() {
        let (actuator, handle) = MockActuator::new();
        let mut actuator = AnyActuator::Mock(actuator);

        actuator.assert().await.unwrap();
        actuator.deassert().await.unwrap();
        assert_eq!(handle.assert_count(), 1);
        assert_eq!(actuator.get_info().await.unwrap().name, "Mock Actuator");
    }

    #[tokio::test]
    async fn test_gpio_falls_back_to_simulated() {
        let root = tempfile::tempdir().unwrap();
        let actuator = AnyActuator::gpio_or_simulated(17, root.path().join("missing")).await;
        assert!(matches!(actuator, AnyActuator::Simulated(_)));
    }
}
