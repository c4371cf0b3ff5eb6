//! Mock lock actuator for testing and development.

use crate::{
    HardwareError, Result,
    traits::Actuator,
    types::{DeviceInfo, SignalLevel},
};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct ActuatorLog {
    transitions: Vec<SignalLevel>,
    fail_assert: bool,
    fail_deassert: bool,
}

fn lock(log: &Arc<Mutex<ActuatorLog>>) -> MutexGuard<'_, ActuatorLog> {
    log.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Mock actuator that records every level it is driven to.
///
/// # Examples
///
/// ```
/// use smartlocker_hardware::mock::MockActuator;
/// use smartlocker_hardware::traits::Actuator;
/// use smartlocker_hardware::types::SignalLevel;
///
/// #[tokio::main]
/// async fn main() -> smartlocker_hardware::Result<()> {
///     let (mut actuator, handle) = MockActuator::new();
///     actuator.assert().await?;
///     actuator.deassert().await?;
///
///     assert_eq!(handle.transitions(), vec![SignalLevel::High, SignalLevel::Low]);
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct MockActuator {
    level: Option<SignalLevel>,
    log: Arc<Mutex<ActuatorLog>>,
}

impl MockActuator {
    /// Create a new mock actuator and its control handle.
    pub fn new() -> (Self, MockActuatorHandle) {
        let log = Arc::new(Mutex::new(ActuatorLog::default()));
        let actuator = Self {
            level: None,
            log: Arc::clone(&log),
        };
        (actuator, MockActuatorHandle { log })
    }

    fn drive(&mut self, level: SignalLevel) -> Result<()> {
        let mut log = lock(&self.log);
        let fail = match level {
            SignalLevel::High => log.fail_assert,
            SignalLevel::Low => log.fail_deassert,
        };
        if fail {
            return Err(HardwareError::communication(format!(
                "Injected fault driving {level:?}"
            )));
        }
        log.transitions.push(level);
        self.level = Some(level);
        Ok(())
    }
}

impl Actuator for MockActuator {
    async fn assert(&mut self) -> Result<()> {
        self.drive(SignalLevel::High)
    }

    async fn deassert(&mut self) -> Result<()> {
        self.drive(SignalLevel::Low)
    }

    fn level(&self) -> Option<SignalLevel> {
        self.level
    }

    async fn get_info(&self) -> Result<DeviceInfo> {
        Ok(DeviceInfo::new("Mock Actuator", "Mock Solenoid v1.0"))
    }
}

/// Handle for inspecting and faulting a mock actuator.
#[derive(Debug, Clone)]
pub struct MockActuatorHandle {
    log: Arc<Mutex<ActuatorLog>>,
}

impl MockActuatorHandle {
    /// Levels successfully written, in order.
    pub fn transitions(&self) -> Vec<SignalLevel> {
        lock(&self.log).transitions.clone()
    }

    /// Number of successful `assert` calls.
    pub fn assert_count(&self) -> usize {
        lock(&self.log)
            .transitions
            .iter()
            .filter(|level| **level == SignalLevel::High)
            .count()
    }

    /// Number of successful `deassert` calls.
    pub fn deassert_count(&self) -> usize {
        lock(&self.log)
            .transitions
            .iter()
            .filter(|level| **level == SignalLevel::Low)
            .count()
    }

    /// Make `assert` fail until cleared.
    pub fn set_fail_assert(&self, fail: bool) {
        lock(&self.log).fail_assert = fail;
    }

    /// Make `deassert` fail until cleared.
    pub fn set_fail_deassert(&self, fail: bool) {
        lock(&self.log).fail_deassert = fail;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_transitions_are_recorded() {
        let (mut actuator, handle) = MockActuator::new();
        assert_eq!(actuator.level(), None);

        actuator.assert().await.unwrap();
        assert_eq!(actuator.level(), Some(SignalLevel::High));
        actuator.deassert().await.unwrap();

        assert_eq!(handle.assert_count(), 1);
        assert_eq!(handle.deassert_count(), 1);
        assert_eq!(actuator.level(), Some(SignalLevel::Low));
    }

    #[tokio::test]
    async fn test_failed_assert_leaves_level_untouched() {
        let (mut actuator, handle) = MockActuator::new();
        handle.set_fail_assert(true);

        assert!(actuator.assert().await.is_err());
        assert_eq!(actuator.level(), None);
        assert!(handle.transitions().is_empty());

        handle.set_fail_assert(false);
        actuator.assert().await.unwrap();
        assert_eq!(handle.assert_count(), 1);
    }
}
