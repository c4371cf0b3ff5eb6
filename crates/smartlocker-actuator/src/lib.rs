//! Lock actuation for the SmartLocker kiosk.
//!
//! The [`ActuatorArbiter`] is the only writer to the lock output. Callers hold
//! an [`ArbiterHandle`] and submit activation requests; duplicates inside the
//! cooldown window collapse into a single unlock cycle.

pub mod arbiter;

pub use arbiter::{
    ActivationOutcome, ActuatorArbiter, ActuatorFault, ArbiterConfig, ArbiterHandle,
};
