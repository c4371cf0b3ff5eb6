//! Actuator arbiter.
//!
//! One actor task owns the lock actuator and the [`ActuatorState`]. Every
//! activation request, whether from a fingerprint match, a face verdict or a
//! manual override, goes through its inbox, so physical writes are totally
//! ordered and never overlap.
//!
//! Policy per request:
//!
//! 1. Within the cooldown of the last activation: coalesced (dropped, never
//!    queued).
//! 2. Otherwise: `Unlocked`, timestamp, assert, hold, deassert, `Locked`.
//!
//! Requests that arrive during a hold are answered right away. If the
//! cooldown is shorter than the hold and expires mid-hold, a new request
//! extends the hold instead of asserting again.

use chrono::{DateTime, Utc};
use smartlocker_core::{
    AccessEvent, AccessSource, ActuatorState, Error, LockPosition, Result, constants,
};
use smartlocker_hardware::{Actuator, AnyActuator};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Inbox depth. Requests beyond it wait for the actor, they are not lost.
const INBOX_CAPACITY: usize = 32;

/// Arbiter timing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArbiterConfig {
    /// How long the actuator stays asserted.
    pub hold: Duration,

    /// Window after an activation during which new requests are coalesced.
    pub cooldown: Duration,
}

impl Default for ArbiterConfig {
    fn default() -> Self {
        Self {
            hold: Duration::from_millis(constants::DEFAULT_HOLD_MS),
            cooldown: Duration::from_millis(constants::DEFAULT_COOLDOWN_MS),
        }
    }
}

impl ArbiterConfig {
    pub fn with_hold(mut self, hold: Duration) -> Self {
        self.hold = hold;
        self
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }
}

/// Answer to an activation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActivationOutcome {
    /// This request started (or extended) an unlock.
    Activated,

    /// An activation is already in effect; nothing was done.
    Coalesced,

    /// Driving the actuator failed. The lock was put back to `Locked`.
    Faulted(String),
}

/// A drive failure the requester could not be told about directly, such as a
/// failed release at the end of a hold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActuatorFault {
    pub operation: &'static str,
    pub message: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug)]
struct ActivationRequest {
    event: AccessEvent,
    reply: oneshot::Sender<ActivationOutcome>,
}

/// Cloneable handle to a running arbiter.
#[derive(Debug, Clone)]
pub struct ArbiterHandle {
    inbox: mpsc::Sender<ActivationRequest>,
    state: watch::Receiver<ActuatorState>,
    faults: broadcast::Sender<ActuatorFault>,
}

impl ArbiterHandle {
    /// Ask for the lock to be opened on behalf of `identity`.
    ///
    /// # Errors
    ///
    /// Returns `Error::ActuatorUnavailable` if the arbiter has stopped.
    pub async fn request_activation(
        &self,
        source: AccessSource,
        identity: impl Into<String>,
    ) -> Result<ActivationOutcome> {
        self.submit(AccessEvent::new(source, identity)).await
    }

    /// Submit a prepared access event.
    pub async fn submit(&self, event: AccessEvent) -> Result<ActivationOutcome> {
        let (reply, outcome) = oneshot::channel();
        self.inbox
            .send(ActivationRequest { event, reply })
            .await
            .map_err(|_| Error::ActuatorUnavailable("Arbiter stopped".into()))?;

        outcome
            .await
            .map_err(|_| Error::ActuatorUnavailable("Arbiter dropped the request".into()))
    }

    /// Current lock state.
    pub fn state(&self) -> ActuatorState {
        *self.state.borrow()
    }

    /// Receiver notified on every state change.
    pub fn subscribe(&self) -> watch::Receiver<ActuatorState> {
        self.state.clone()
    }

    /// Receiver for faults not reported through a request's outcome.
    pub fn faults(&self) -> broadcast::Receiver<ActuatorFault> {
        self.faults.subscribe()
    }
}

/// The actor owning the actuator.
#[derive(Debug)]
pub struct ActuatorArbiter {
    actuator: AnyActuator,
    config: ArbiterConfig,
    inbox: mpsc::Receiver<ActivationRequest>,
    state: watch::Sender<ActuatorState>,
    faults: broadcast::Sender<ActuatorFault>,
    shutdown: CancellationToken,
    last_activation: Option<Instant>,
}

impl ActuatorArbiter {
    /// Spawn the arbiter on the current runtime.
    pub fn spawn(
        actuator: AnyActuator,
        config: ArbiterConfig,
        shutdown: CancellationToken,
    ) -> (ArbiterHandle, JoinHandle<()>) {
        let (inbox_tx, inbox) = mpsc::channel(INBOX_CAPACITY);
        let (state, state_rx) = watch::channel(ActuatorState::default());
        let (faults, _) = broadcast::channel(16);

        if config.cooldown < config.hold {
            warn!(
                hold_ms = config.hold.as_millis() as u64,
                cooldown_ms = config.cooldown.as_millis() as u64,
                "Cooldown shorter than hold; late requests will extend the hold"
            );
        }

        let handle = ArbiterHandle {
            inbox: inbox_tx,
            state: state_rx,
            faults: faults.clone(),
        };
        let arbiter = Self {
            actuator,
            config,
            inbox,
            state,
            faults,
            shutdown,
            last_activation: None,
        };

        (handle, tokio::spawn(arbiter.run()))
    }

    async fn run(mut self) {
        info!("Actuator arbiter started");
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                request = self.inbox.recv() => match request {
                    Some(request) => self.handle(request).await,
                    None => break,
                },
            }
        }

        if self.state.borrow().is_unlocked() {
            self.release().await;
        }
        info!("Actuator arbiter stopped");
    }

    /// Position is not consulted: a request after the hold has ended but
    /// still inside the cooldown is coalesced too.
    fn in_cooldown(&self, now: Instant) -> bool {
        self.last_activation
            .is_some_and(|at| now.duration_since(at) < self.config.cooldown)
    }

    fn reply(request: ActivationRequest, outcome: ActivationOutcome) {
        debug!(
            source = %request.event.source,
            identity = %request.event.identity,
            ?outcome,
            "Activation request answered"
        );
        // The requester may have given up waiting.
        let _ = request.reply.send(outcome);
    }

    fn mark_unlocked(&mut self, now: Instant) -> DateTime<Utc> {
        let at = Utc::now();
        self.last_activation = Some(now);
        self.state.send_replace(ActuatorState {
            position: LockPosition::Unlocked,
            last_activated_at: Some(at),
        });
        at
    }

    fn mark_locked(&self) {
        self.state
            .send_modify(|state| state.position = LockPosition::Locked);
    }

    fn report_fault(&self, operation: &'static str, message: String) {
        error!(operation, %message, "Actuator fault");
        // No subscribers is fine.
        let _ = self.faults.send(ActuatorFault {
            operation,
            message,
            at: Utc::now(),
        });
    }

    async fn handle(&mut self, request: ActivationRequest) {
        let now = Instant::now();
        if self.in_cooldown(now) {
            Self::reply(request, ActivationOutcome::Coalesced);
            return;
        }

        self.mark_unlocked(now);
        if let Err(e) = self.actuator.assert().await {
            let message = e.to_string();
            error!(error = %message, "Failed to energize lock");
            if let Err(e) = self.actuator.deassert().await {
                warn!(error = %e, "Best-effort release after failed assert also failed");
            }
            self.mark_locked();
            Self::reply(request, ActivationOutcome::Faulted(message));
            return;
        }

        info!(
            source = %request.event.source,
            identity = %request.event.identity,
            "Lock opened"
        );
        Self::reply(request, ActivationOutcome::Activated);
        self.hold(now).await;
        self.release().await;
    }

    /// Keep the lock open, answering requests as they arrive.
    async fn hold(&mut self, started: Instant) {
        let mut deadline = started + self.config.hold;
        loop {
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => return,
                _ = self.shutdown.cancelled() => return,
                request = self.inbox.recv() => {
                    let Some(request) = request else { return };
                    let now = Instant::now();
                    if self.in_cooldown(now) {
                        Self::reply(request, ActivationOutcome::Coalesced);
                    } else {
                        self.mark_unlocked(now);
                        deadline = now + self.config.hold;
                        debug!("Hold extended");
                        Self::reply(request, ActivationOutcome::Activated);
                    }
                }
            }
        }
    }

    async fn release(&mut self) {
        if let Err(first) = self.actuator.deassert().await {
            warn!(error = %first, "Failed to release lock, retrying once");
            if let Err(second) = self.actuator.deassert().await {
                self.report_fault("deassert", second.to_string());
            }
        }
        self.mark_locked();
        debug!("Lock released");
    }
}
