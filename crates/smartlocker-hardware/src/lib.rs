//! Hardware device abstraction layer for the SmartLocker kiosk.
//!
//! This crate provides trait-based abstractions for the two peripherals a
//! locker kiosk drives: a fingerprint module with an on-board template library
//! and a lock actuator. Mock implementations let the rest of the workspace run
//! and be tested without physical hardware.
//!
//! # Design Philosophy
//!
//! - **Async-first**: All I/O operations are asynchronous using native `async fn`
//!   in traits (Rust 1.90 + Edition 2024 RPITIT).
//! - **Enum dispatch**: [`devices::AnyFingerprintSensor`] and
//!   [`devices::AnyActuator`] stand in for trait objects.
//! - **Thread-safe**: All traits require `Send + Sync` for use with Tokio.
//! - **Error-aware**: All operations return `Result<T>` with detailed error information.
//!
//! # Fingerprint Sensors
//!
//! ```no_run
//! use smartlocker_hardware::traits::FingerprintSensor;
//! use smartlocker_hardware::types::ModelOutcome;
//! use smartlocker_hardware::error::Result;
//!
//! async fn store<S: FingerprintSensor>(sensor: &mut S, slot: u16) -> Result<bool> {
//!     // Both character buffers must already hold a template.
//!     if sensor.create_model().await? == ModelOutcome::Mismatch {
//!         return Ok(false);
//!     }
//!     sensor.store_model(slot).await?;
//!     Ok(true)
//! }
//! ```
//!
//! # Error Handling
//!
//! All operations return [`Result<T>`][error::Result] which uses the
//! [`HardwareError`] error type.

pub mod devices;
pub mod error;
pub mod gpio;
pub mod mock;
pub mod traits;
pub mod types;

// Re-export commonly used types for convenience
pub use devices::{AnyActuator, AnyFingerprintSensor};
pub use error::{HardwareError, Result};
pub use traits::{Actuator, FingerprintSensor};
pub use types::{CaptureStatus, DeviceInfo, ModelOutcome, SearchHit, SignalLevel};
