//! Hardware device trait definitions.
//!
//! This module defines the two device contracts the kiosk talks to: a
//! fingerprint module with an on-board template library, and a two-state lock
//! actuator. Both are implemented by mock devices for development and tests,
//! and by real drivers behind the enum wrappers in [`crate::devices`].
//!
//! All traits use native `async fn` methods (Rust 1.90 + Edition 2024 RPITIT),
//! eliminating the need for the `async_trait` macro.

#![allow(async_fn_in_trait)]

use crate::error::Result;
use crate::types::{CaptureStatus, DeviceInfo, ModelOutcome, SearchHit, SignalLevel};

/// Fingerprint module with an on-board template library.
///
/// The operation set mirrors the primitives exposed by R307/AS608 class
/// modules: take an image, convert it into one of two character buffers,
/// then either search the library or merge both buffers into a model that
/// is stored in a numbered slot.
///
/// Implementations are not expected to serialize callers; exclusive access
/// is arranged by the owner of the device.
///
/// # Examples
///
/// ```no_run
/// use smartlocker_hardware::traits::FingerprintSensor;
/// use smartlocker_hardware::types::CaptureStatus;
/// use smartlocker_hardware::error::Result;
///
/// async fn identify<S: FingerprintSensor>(sensor: &mut S) -> Result<Option<u16>> {
///     if sensor.get_image().await? == CaptureStatus::NoFinger {
///         return Ok(None);
///     }
///     sensor.image_to_template(1).await?;
///     Ok(sensor.search().await?.map(|hit| hit.slot))
/// }
/// ```
pub trait FingerprintSensor: Send + Sync {
    /// Handshake with the module and verify its password.
    ///
    /// Returns `Ok(false)` when the module answers but rejects the handshake.
    async fn check_module(&mut self) -> Result<bool>;

    /// Number of template slots in the library.
    async fn capacity(&self) -> Result<u16>;

    /// Take an image into the image buffer.
    async fn get_image(&mut self) -> Result<CaptureStatus>;

    /// Convert the image buffer into character buffer `buffer` (1 or 2).
    ///
    /// # Errors
    ///
    /// Returns `HardwareError::InvalidData` when the image is too poor to
    /// extract features from.
    async fn image_to_template(&mut self, buffer: u8) -> Result<()>;

    /// Search the whole library using character buffer 1.
    async fn search(&mut self) -> Result<Option<SearchHit>>;

    /// Combine both character buffers into a model.
    async fn create_model(&mut self) -> Result<ModelOutcome>;

    /// Store the current model in `slot`.
    ///
    /// # Errors
    ///
    /// Returns `HardwareError::SlotOutOfRange` when `slot` is outside the library.
    async fn store_model(&mut self, slot: u16) -> Result<()>;

    /// Load the template in `slot` into a character buffer.
    ///
    /// Returns `Ok(false)` when the slot is empty.
    async fn load_model(&mut self, slot: u16) -> Result<bool>;

    /// Delete the template in `slot`. Returns `Ok(false)` if it was empty.
    async fn delete_model(&mut self, slot: u16) -> Result<bool>;

    /// Number of stored templates.
    async fn template_count(&mut self) -> Result<u16>;

    /// Get device information.
    async fn get_device_info(&self) -> Result<DeviceInfo>;
}

/// Two-state lock actuator, such as a relay driving a solenoid bolt.
///
/// `assert` energizes the output and `deassert` releases it. Timing is owned
/// by the caller; implementations only switch the line.
pub trait Actuator: Send + Sync {
    /// Drive the output high.
    async fn assert(&mut self) -> Result<()>;

    /// Drive the output low.
    async fn deassert(&mut self) -> Result<()>;

    /// Last level written, if any.
    fn level(&self) -> Option<SignalLevel>;

    /// Get device information.
    async fn get_info(&self) -> Result<DeviceInfo>;
}
