//! The SmartLocker kiosk core.
//!
//! Wires the fingerprint subsystem, the actuator arbiter, the credential
//! store and the face service client into one [`AccessCoordinator`].
//!
//! # Example
//!
//! ```no_run
//! use smartlocker_hardware::AnyActuator;
//! use smartlocker_hardware::gpio::SimulatedActuator;
//! use smartlocker_kiosk::{AccessCoordinator, KioskComponents, KioskConfig};
//! use smartlocker_storage::{CredentialStore, Database};
//!
//! # async fn example() -> smartlocker_core::Result<()> {
//! let config = KioskConfig::default();
//! let db = Database::new(config.database_config()).await?;
//! let store = CredentialStore::new(db, config.hashing_config()).await?;
//!
//! let components = KioskComponents {
//!     sensor: None,
//!     actuator: AnyActuator::Simulated(SimulatedActuator::new()),
//!     store,
//!     face: None,
//! };
//! let (kiosk, mut events) =
//!     AccessCoordinator::start(components, config.coordinator_settings()).await?;
//!
//! kiosk.authenticate("admin", "admin123").await?;
//! kiosk.manual_activate().await?;
//! while let Some(event) = events.recv().await {
//!     println!("{event}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod coordinator;
pub mod enrollment;
pub mod events;

pub use config::{ActuatorDriver, KioskConfig, LogFormat, SensorDriver};
pub use coordinator::{
    AccessCoordinator, AdminSession, BiometricStatus, CoordinatorSettings, EnrollmentTicket,
    KioskComponents, StatusSnapshot,
};
pub use enrollment::{EnrollmentConfig, EnrollmentOutcome, EnrollmentState, EnrollmentWorkflow};
pub use events::{EVENT_CHANNEL_CAPACITY, EventSink, KioskEvent};
