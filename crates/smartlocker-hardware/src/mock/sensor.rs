//! Mock fingerprint module for testing and development.
//!
//! This module provides a simulated template-library sensor that can be
//! driven programmatically: fingers are identified by string tags, and the
//! handle decides what lies on the window each time the sensor takes an image.

use crate::{
    HardwareError, Result,
    traits::FingerprintSensor,
    types::{CaptureStatus, DeviceInfo, ModelOutcome, SearchHit},
};
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Score reported for every successful mock search.
pub const MOCK_MATCH_SCORE: u16 = 100;

/// What the sensor sees the next time it takes an image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Presentation {
    /// A finger identified by `tag`. Two presentations with the same tag
    /// belong to the same finger.
    Finger(String),

    /// Something is on the window but no features can be extracted.
    Smudge,

    /// Nothing on the window.
    Empty,
}

/// A device primitive invoked on the mock, in call order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorCall {
    CheckModule,
    GetImage,
    ImageToTemplate(u8),
    Search,
    CreateModel,
    StoreModel(u16),
    LoadModel(u16),
    DeleteModel(u16),
    TemplateCount,
}

#[derive(Debug, Clone)]
enum ImageBuffer {
    Finger(String),
    Unreadable,
}

#[derive(Debug)]
struct SensorState {
    capacity: u16,
    handshake_ok: bool,
    disconnected: bool,
    pending_failures: u32,
    latency: Option<Duration>,

    /// One-shot presentations, consumed before the resting finger.
    presentations: VecDeque<Presentation>,
    resting: Option<String>,

    image: Option<ImageBuffer>,
    char_buffers: [Option<String>; 2],
    model: Option<String>,
    library: BTreeMap<u16, String>,

    calls: Vec<SensorCall>,
}

impl SensorState {
    fn new(capacity: u16) -> Self {
        Self {
            capacity,
            handshake_ok: true,
            disconnected: false,
            pending_failures: 0,
            latency: None,
            presentations: VecDeque::new(),
            resting: None,
            image: None,
            char_buffers: [None, None],
            model: None,
            library: BTreeMap::new(),
            calls: Vec::new(),
        }
    }

    fn check_slot(&self, slot: u16) -> Result<()> {
        if slot >= self.capacity {
            return Err(HardwareError::slot_out_of_range(slot, self.capacity));
        }
        Ok(())
    }
}

type SharedState = Arc<Mutex<SensorState>>;

fn lock(state: &SharedState) -> MutexGuard<'_, SensorState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Mock fingerprint module.
///
/// # Examples
///
/// ```
/// use smartlocker_hardware::mock::MockFingerprintSensor;
/// use smartlocker_hardware::traits::FingerprintSensor;
/// use smartlocker_hardware::types::CaptureStatus;
///
/// #[tokio::main]
/// async fn main() -> smartlocker_hardware::Result<()> {
///     let (mut sensor, handle) = MockFingerprintSensor::new();
///     handle.store_template(3, "alice");
///     handle.place_finger("alice");
///
///     assert_eq!(sensor.get_image().await?, CaptureStatus::Captured);
///     sensor.image_to_template(1).await?;
///     assert_eq!(sensor.search().await?.map(|hit| hit.slot), Some(3));
///
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct MockFingerprintSensor {
    name: String,
    state: SharedState,
}

impl MockFingerprintSensor {
    /// Create a new mock sensor with the default capacity of 128 slots.
    pub fn new() -> (Self, MockSensorHandle) {
        Self::with_capacity(128)
    }

    /// Create a new mock sensor with a custom library size.
    pub fn with_capacity(capacity: u16) -> (Self, MockSensorHandle) {
        let state = Arc::new(Mutex::new(SensorState::new(capacity)));
        let sensor = Self {
            name: "Mock Fingerprint Sensor".to_string(),
            state: Arc::clone(&state),
        };
        (sensor, MockSensorHandle { state })
    }

    /// Record the call, apply latency, then apply injected faults.
    async fn enter(&self, call: SensorCall) -> Result<()> {
        let latency = {
            let mut state = lock(&self.state);
            state.calls.push(call);
            state.latency
        };

        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let mut state = lock(&self.state);
        if state.disconnected {
            return Err(HardwareError::disconnected(self.name.clone()));
        }
        if state.pending_failures > 0 {
            state.pending_failures -= 1;
            return Err(HardwareError::communication("Injected fault"));
        }
        Ok(())
    }
}

impl FingerprintSensor for MockFingerprintSensor {
    async fn check_module(&mut self) -> Result<bool> {
        self.enter(SensorCall::CheckModule).await?;
        Ok(lock(&self.state).handshake_ok)
    }

    async fn capacity(&self) -> Result<u16> {
        Ok(lock(&self.state).capacity)
    }

    async fn get_image(&mut self) -> Result<CaptureStatus> {
        self.enter(SensorCall::GetImage).await?;

        let mut state = lock(&self.state);
        let presentation = match state.presentations.pop_front() {
            Some(presentation) => presentation,
            None => match &state.resting {
                Some(tag) => Presentation::Finger(tag.clone()),
                None => Presentation::Empty,
            },
        };

        let (image, status) = match presentation {
            Presentation::Finger(tag) => (Some(ImageBuffer::Finger(tag)), CaptureStatus::Captured),
            Presentation::Smudge => (Some(ImageBuffer::Unreadable), CaptureStatus::Captured),
            Presentation::Empty => (None, CaptureStatus::NoFinger),
        };
        state.image = image;
        Ok(status)
    }

    async fn image_to_template(&mut self, buffer: u8) -> Result<()> {
        self.enter(SensorCall::ImageToTemplate(buffer)).await?;

        if !(1..=2).contains(&buffer) {
            return Err(HardwareError::InvalidBuffer(buffer));
        }

        let mut state = lock(&self.state);
        let tag = match &state.image {
            Some(ImageBuffer::Finger(tag)) => tag.clone(),
            Some(ImageBuffer::Unreadable) => {
                return Err(HardwareError::invalid_data("Image too messy"));
            }
            None => return Err(HardwareError::invalid_data("Image buffer is empty")),
        };
        state.char_buffers[usize::from(buffer - 1)] = Some(tag);
        Ok(())
    }

    async fn search(&mut self) -> Result<Option<SearchHit>> {
        self.enter(SensorCall::Search).await?;

        let state = lock(&self.state);
        let Some(tag) = &state.char_buffers[0] else {
            return Err(HardwareError::invalid_data("Character buffer 1 is empty"));
        };

        Ok(state
            .library
            .iter()
            .find(|(_, stored)| *stored == tag)
            .map(|(slot, _)| SearchHit {
                slot: *slot,
                score: MOCK_MATCH_SCORE,
            }))
    }

    async fn create_model(&mut self) -> Result<ModelOutcome> {
        self.enter(SensorCall::CreateModel).await?;

        let mut state = lock(&self.state);
        let model = match &state.char_buffers {
            [Some(first), Some(second)] if first == second => Some(first.clone()),
            _ => None,
        };

        let outcome = if model.is_some() {
            ModelOutcome::Created
        } else {
            ModelOutcome::Mismatch
        };
        state.model = model;
        Ok(outcome)
    }

    async fn store_model(&mut self, slot: u16) -> Result<()> {
        self.enter(SensorCall::StoreModel(slot)).await?;

        let mut state = lock(&self.state);
        state.check_slot(slot)?;
        let model = state
            .model
            .clone()
            .ok_or_else(|| HardwareError::invalid_data("No model to store"))?;
        state.library.insert(slot, model);
        Ok(())
    }

    async fn load_model(&mut self, slot: u16) -> Result<bool> {
        self.enter(SensorCall::LoadModel(slot)).await?;

        let state = lock(&self.state);
        state.check_slot(slot)?;
        Ok(state.library.contains_key(&slot))
    }

    async fn delete_model(&mut self, slot: u16) -> Result<bool> {
        self.enter(SensorCall::DeleteModel(slot)).await?;

        let mut state = lock(&self.state);
        state.check_slot(slot)?;
        Ok(state.library.remove(&slot).is_some())
    }

    async fn template_count(&mut self) -> Result<u16> {
        self.enter(SensorCall::TemplateCount).await?;
        let count = lock(&self.state).library.len();
        Ok(u16::try_from(count).unwrap_or(u16::MAX))
    }

    async fn get_device_info(&self) -> Result<DeviceInfo> {
        Ok(
            DeviceInfo::new(self.name.clone(), "Mock Fingerprint Module v1.0")
                .with_firmware_version("1.0.0"),
        )
    }
}

/// Handle for controlling a mock fingerprint module.
///
/// The handle shares state with the sensor, so it stays usable after the
/// sensor has been moved into a session or a background task.
#[derive(Debug, Clone)]
pub struct MockSensorHandle {
    state: SharedState,
}

impl MockSensorHandle {
    /// Rest a finger on the window until [`lift_finger`](Self::lift_finger).
    pub fn place_finger(&self, tag: impl Into<String>) {
        lock(&self.state).resting = Some(tag.into());
    }

    /// Remove the resting finger.
    pub fn lift_finger(&self) {
        lock(&self.state).resting = None;
    }

    /// Queue a one-shot presentation, seen by exactly one image capture.
    pub fn present(&self, presentation: Presentation) {
        lock(&self.state).presentations.push_back(presentation);
    }

    /// Queue several one-shot presentations in order.
    pub fn present_all(&self, presentations: impl IntoIterator<Item = Presentation>) {
        lock(&self.state).presentations.extend(presentations);
    }

    /// Number of queued presentations not yet consumed.
    pub fn pending_presentations(&self) -> usize {
        lock(&self.state).presentations.len()
    }

    /// Put a template for `tag` directly into the library.
    pub fn store_template(&self, slot: u16, tag: impl Into<String>) {
        lock(&self.state).library.insert(slot, tag.into());
    }

    /// Tag stored in `slot`, if any.
    pub fn template(&self, slot: u16) -> Option<String> {
        lock(&self.state).library.get(&slot).cloned()
    }

    /// Number of templates in the library.
    pub fn template_count(&self) -> usize {
        lock(&self.state).library.len()
    }

    /// Make the next `count` device operations fail with a communication error.
    pub fn fail_next(&self, count: u32) {
        lock(&self.state).pending_failures = count;
    }

    /// Simulate unplugging (or re-plugging) the module.
    pub fn set_disconnected(&self, disconnected: bool) {
        lock(&self.state).disconnected = disconnected;
    }

    /// Make the handshake succeed or fail.
    pub fn set_handshake(&self, ok: bool) {
        lock(&self.state).handshake_ok = ok;
    }

    /// Delay every device operation by `latency`.
    pub fn set_latency(&self, latency: Option<Duration>) {
        lock(&self.state).latency = latency;
    }

    /// Calls made so far, in order.
    pub fn calls(&self) -> Vec<SensorCall> {
        lock(&self.state).calls.clone()
    }

    /// Forget the recorded calls.
    pub fn clear_calls(&self) {
        lock(&self.state).calls.clear();
    }
}
