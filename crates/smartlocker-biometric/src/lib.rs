//! Fingerprint subsystem of the SmartLocker kiosk.
//!
//! - [`session`]: the [`SensorSession`] contract over one fingerprint module,
//!   translating device faults into the core error taxonomy.
//! - [`ownership`]: the token that decides whether the poller or an
//!   enrollment may touch the sensor.
//! - [`poller`]: the [`RecognitionPoller`] background loop.

pub mod ownership;
pub mod poller;
pub mod session;

pub use ownership::{SensorLease, SensorOwner, SensorOwnership};
pub use poller::{FingerprintMatch, PollerConfig, PollerState, PollerStats, RecognitionPoller};
pub use session::{
    Connectivity, DeleteOutcome, FeedOutcome, SensorMatch, SensorMode, SensorSession,
};
