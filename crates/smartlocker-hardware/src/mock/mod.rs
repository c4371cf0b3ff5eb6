//! Mock device implementations for testing and development.
//!
//! This module provides simulated device implementations that can be controlled
//! programmatically without requiring physical hardware.

pub mod actuator;
pub mod sensor;

// Re-export commonly used types
pub use actuator::{MockActuator, MockActuatorHandle};
pub use sensor::{MockFingerprintSensor, MockSensorHandle, Presentation, SensorCall};
