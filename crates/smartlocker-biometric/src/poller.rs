//! Recognition poller.
//!
//! A long-lived loop that repeatedly runs capture-and-search against the
//! sensor session while it owns the sensor, and reports library hits on an
//! mpsc channel.
//!
//! ```text
//!              owner != Poller
//!   ┌──────────────────────────────────┐
//!   ▼                                  │
//! Suspended ──owner == Poller──► Polling ──match──► Cooling
//!                                  ▲                  │
//!                                  └────debounce──────┘
//! ```
//!
//! Empty polls sleep for the idle interval. Transient device faults back off
//! and are only logged at debug level; an unavailable device is logged once.

use crate::ownership::{SensorOwner, SensorOwnership};
use crate::session::SensorMatch;
use chrono::{DateTime, Utc};
use smartlocker_core::{Error, SlotId, constants};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Observable poller state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PollerState {
    /// The sensor is owned elsewhere or not yet handed to the poller.
    #[default]
    Suspended,
    Polling,
    /// A match was just reported.
    Cooling,
}

/// A library hit reported by the poller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FingerprintMatch {
    pub slot: SlotId,
    pub score: u16,
    pub at: DateTime<Utc>,
}

impl From<SensorMatch> for FingerprintMatch {
    fn from(hit: SensorMatch) -> Self {
        Self {
            slot: hit.slot,
            score: hit.score,
            at: Utc::now(),
        }
    }
}

/// Poller timing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollerConfig {
    /// Sleep after an empty poll.
    pub idle_interval: Duration,

    /// Pause after a reported match.
    pub match_debounce: Duration,

    /// Pause after a device fault.
    pub error_backoff: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            idle_interval: Duration::from_millis(constants::DEFAULT_POLL_INTERVAL_MS),
            match_debounce: Duration::from_millis(constants::DEFAULT_MATCH_DEBOUNCE_MS),
            error_backoff: Duration::from_millis(constants::DEFAULT_ERROR_BACKOFF_MS),
        }
    }
}

impl PollerConfig {
    pub fn with_idle_interval(mut self, interval: Duration) -> Self {
        self.idle_interval = interval;
        self
    }

    pub fn with_match_debounce(mut self, debounce: Duration) -> Self {
        self.match_debounce = debounce;
        self
    }

    pub fn with_error_backoff(mut self, backoff: Duration) -> Self {
        self.error_backoff = backoff;
        self
    }
}

/// Counters kept by a running poller, published with each state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PollerStats {
    pub polls: u64,
    pub matches: u64,
    pub faults: u64,
}

/// Background fingerprint recognition loop.
#[derive(Debug)]
pub struct RecognitionPoller {
    ownership: SensorOwnership,
    config: PollerConfig,
    matches: mpsc::Sender<FingerprintMatch>,
    state: watch::Sender<PollerState>,
    stats: watch::Sender<PollerStats>,
    shutdown: CancellationToken,
}

impl RecognitionPoller {
    pub fn new(
        ownership: SensorOwnership,
        config: PollerConfig,
        matches: mpsc::Sender<FingerprintMatch>,
        shutdown: CancellationToken,
    ) -> Self {
        let (state, _) = watch::channel(PollerState::Suspended);
        let (stats, _) = watch::channel(PollerStats::default());
        Self {
            ownership,
            config,
            matches,
            state,
            stats,
            shutdown,
        }
    }

    /// Receiver for state changes.
    pub fn state(&self) -> watch::Receiver<PollerState> {
        self.state.subscribe()
    }

    /// Receiver for poll counters.
    pub fn stats(&self) -> watch::Receiver<PollerStats> {
        self.stats.subscribe()
    }

    fn set_state(&self, state: PollerState) {
        self.state.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            debug!(from = ?*current, to = ?state, "Poller state change");
            *current = state;
            true
        });
    }

    /// Sleep for `duration`; returns `false` if shutdown was requested first.
    async fn pause(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = self.shutdown.cancelled() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }

    /// Run until shutdown or until the match receiver is dropped.
    pub async fn run(self) {
        let mut owner_rx = self.ownership.subscribe();
        let mut unavailable_logged = false;
        info!("Recognition poller started");

        loop {
            if self.shutdown.is_cancelled() {
                break;
            }

            if *owner_rx.borrow_and_update() != SensorOwner::Poller {
                self.set_state(PollerState::Suspended);
                tokio::select! {
                    _ = self.shutdown.cancelled() => break,
                    changed = owner_rx.wait_for(|owner| *owner == SensorOwner::Poller) => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
                continue;
            }

            let outcome = {
                let Some(mut session) = self.ownership.lock_for_poller().await else {
                    continue;
                };
                self.set_state(PollerState::Polling);
                session.capture_and_match().await
            };
            self.stats.send_modify(|stats| stats.polls += 1);

            match outcome {
                Ok(None) => {
                    if !self.pause(self.config.idle_interval).await {
                        break;
                    }
                }
                Ok(Some(hit)) => {
                    debug!(slot = %hit.slot, score = hit.score, "Fingerprint matched");
                    self.stats.send_modify(|stats| stats.matches += 1);
                    if self.matches.send(hit.into()).await.is_err() {
                        break; // Receiver gone
                    }

                    self.set_state(PollerState::Cooling);
                    if !self.pause(self.config.match_debounce).await {
                        break;
                    }
                }
                Err(Error::DeviceUnavailable(reason)) => {
                    self.stats.send_modify(|stats| stats.faults += 1);
                    if !unavailable_logged {
                        warn!(%reason, "Fingerprint sensor unavailable, poller idling");
                        unavailable_logged = true;
                    }
                    if !self.pause(self.config.error_backoff).await {
                        break;
                    }
                }
                Err(e) => {
                    self.stats.send_modify(|stats| stats.faults += 1);
                    debug!(error = %e, "Sensor poll failed, backing off");
                    if !self.pause(self.config.error_backoff).await {
                        break;
                    }
                }
            }
        }

        if let Some(mut session) = self.ownership.lock_for_poller().await {
            session.stand_down();
        }
        self.set_state(PollerState::Suspended);
        info!("Recognition poller stopped");
    }
}
