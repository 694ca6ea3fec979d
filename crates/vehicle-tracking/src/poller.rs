//! # Location Poller
//!
//! Periodically fetches a vehicle's location and maintains the position
//! history for one tracking session.
//!
//! Each tick issues a request immediately, so a slow response from tick `N`
//! may land after tick `N + 1` has been sent. Every request is tagged with a
//! monotonic sequence number and [`OrderingPolicy`] decides whether stale
//! responses are applied.

use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::StreamExt;
use futures::stream::FuturesUnordered;
use realtime::{Config, Error, HttpRequest, Identity, Result, bad_request};
use serde::Serialize;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::history::PositionHistory;
use crate::location::{self, VehiclePosition};

const DEFAULT_INTERVAL: Duration = Duration::from_secs(5);
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_HISTORY_LIMIT: usize = 10_000;

/// How responses that complete out of issue order are treated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum OrderingPolicy {
    /// Drop any response older than the newest one already applied.
    #[default]
    Latest,

    /// Apply every response in completion order.
    LastWriteWins,
}

impl FromStr for OrderingPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "latest" | "sequence" => Ok(Self::Latest),
            "last-write-wins" | "last_write_wins" | "lww" => Ok(Self::LastWriteWins),
            other => Err(bad_request!("unknown ordering policy: {}", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Time between polls. Zero disables polling entirely.
    pub interval: Duration,

    /// Per-request timeout. `None` waits indefinitely.
    pub request_timeout: Option<Duration>,

    /// Maximum retained positions. `None` retains everything.
    pub history_limit: Option<usize>,

    pub ordering: OrderingPolicy,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            request_timeout: Some(DEFAULT_REQUEST_TIMEOUT),
            history_limit: Some(DEFAULT_HISTORY_LIMIT),
            ordering: OrderingPolicy::Latest,
        }
    }
}

/// Point-in-time view of a tracking session.
///
/// `latest` and `error` are independent: an error can coexist with a still
/// valid last known position.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationSnapshot {
    pub vehicle_id: Option<String>,
    pub active: bool,
    pub history: PositionHistory,
    pub latest: Option<VehiclePosition>,
    pub error: Option<String>,
    pub samples_applied: u64,
}

/// Handle to a running (or inert) location polling session.
///
/// Dropping the handle stops the session.
#[derive(Debug)]
pub struct LocationPoller {
    active: Arc<AtomicBool>,
    snapshot: watch::Receiver<LocationSnapshot>,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl LocationPoller {
    /// Start polling `vehicle_id` every `config.interval`.
    ///
    /// A missing or blank vehicle id, or a zero interval, yields an inert
    /// poller that never issues a request. Must be called from within a Tokio
    /// runtime.
    pub fn subscribe<P>(provider: P, vehicle_id: Option<&str>, config: PollerConfig) -> Self
    where
        P: Config + HttpRequest + Identity + 'static,
    {
        let vehicle_id = vehicle_id.map(str::trim).filter(|id| !id.is_empty());
        let initial = LocationSnapshot {
            vehicle_id: vehicle_id.map(ToString::to_string),
            history: PositionHistory::new(config.history_limit),
            ..LocationSnapshot::default()
        };

        let Some(vehicle_id) = vehicle_id.filter(|_| !config.interval.is_zero()) else {
            debug!(vehicle_id = ?initial.vehicle_id, "location polling disabled");
            let (_, snapshot) = watch::channel(initial);
            return Self {
                active: Arc::new(AtomicBool::new(false)),
                snapshot,
                shutdown: None,
                task: None,
            };
        };

        let active = Arc::new(AtomicBool::new(true));
        let (state, snapshot) = watch::channel(LocationSnapshot { active: true, ..initial });
        let (shutdown, shutdown_rx) = oneshot::channel();

        let session = Session {
            provider: Arc::new(provider),
            vehicle_id: vehicle_id.to_string(),
            config,
            active: Arc::clone(&active),
            state,
            next_seq: 0,
            last_applied: None,
        };

        info!(vehicle_id = %vehicle_id, "location tracking started");
        let task = tokio::spawn(session.run(shutdown_rx));

        Self { active, snapshot, shutdown: Some(shutdown), task: Some(task) }
    }

    /// Current state of the session.
    #[must_use]
    pub fn snapshot(&self) -> LocationSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Wait for the next change to the snapshot.
    ///
    /// Returns `false` once the session has ended and no further changes will
    /// be published.
    pub async fn changed(&mut self) -> bool {
        self.snapshot.changed().await.is_ok()
    }

    /// A receiver that observes this session independently of the handle.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<LocationSnapshot> {
        self.snapshot.clone()
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Stop polling and discard the history.
    ///
    /// Responses still in flight are never applied. Safe to call more than
    /// once.
    pub async fn stop(&mut self) {
        self.active.store(false, Ordering::Release);
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(task) = self.task.take()
            && let Err(e) = task.await
            && !e.is_cancelled()
        {
            warn!("location polling task failed: {e}");
        }
    }
}

impl Drop for LocationPoller {
    fn drop(&mut self) {
        self.active.store(false, Ordering::Release);
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

struct Session<P> {
    provider: Arc<P>,
    vehicle_id: String,
    config: PollerConfig,
    active: Arc<AtomicBool>,
    state: watch::Sender<LocationSnapshot>,
    next_seq: u64,
    last_applied: Option<u64>,
}

impl<P> Session<P>
where
    P: Config + HttpRequest + Identity + 'static,
{
    async fn run(mut self, mut shutdown: oneshot::Receiver<()>) {
        let mut ticker = time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut in_flight = FuturesUnordered::new();

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => {
                    let seq = self.next_seq;
                    self.next_seq += 1;
                    in_flight.push(poll_once(
                        Arc::clone(&self.provider),
                        self.vehicle_id.clone(),
                        self.config.request_timeout,
                        seq,
                    ));
                }
                Some((seq, result)) = in_flight.next(), if !in_flight.is_empty() => {
                    self.apply(seq, result);
                }
            }
        }

        self.state.send_replace(LocationSnapshot {
            vehicle_id: Some(self.vehicle_id.clone()),
            history: PositionHistory::new(self.config.history_limit),
            ..LocationSnapshot::default()
        });
        info!(vehicle_id = %self.vehicle_id, in_flight = in_flight.len(), "location tracking stopped");
    }

    fn apply(&mut self, seq: u64, result: Result<Option<VehiclePosition>>) {
        let vehicle_id = self.vehicle_id.as_str();

        if !self.active.load(Ordering::Acquire) {
            debug!(vehicle_id = %vehicle_id, seq, "discarding location response after stop");
            return;
        }

        if self.config.ordering == OrderingPolicy::Latest
            && let Some(last) = self.last_applied
            && seq < last
        {
            warn!(
                vehicle_id = %vehicle_id,
                seq,
                last_applied = last,
                monotonic_counter.stale_location_responses = 1,
                "Received out-of-order location response"
            );
            return;
        }
        self.last_applied = Some(self.last_applied.map_or(seq, |last| last.max(seq)));

        match result {
            Ok(Some(position)) => {
                // a stationary vehicle keeps its history entry but still
                // refreshes the live sample
                self.state.send_if_modified(|snapshot| {
                    let cleared = snapshot.error.take().is_some();
                    let refreshed = snapshot.latest.as_ref() != Some(&position);
                    if refreshed {
                        snapshot.latest = Some(position.clone());
                    }
                    let appended = snapshot.history.push(position);
                    if appended {
                        snapshot.samples_applied += 1;
                    }
                    appended || cleared || refreshed
                });
            }
            Ok(None) => {}
            Err(e) => {
                warn!(
                    vehicle_id = %vehicle_id,
                    transient = e.is_transient(),
                    monotonic_counter.location_errors = 1,
                    "location poll failed: {e}"
                );
                let message = e.to_string();
                self.state.send_if_modified(|snapshot| {
                    if snapshot.error.as_deref() == Some(message.as_str()) {
                        return false;
                    }
                    snapshot.error = Some(message);
                    true
                });
            }
        }
    }
}

async fn poll_once<P>(
    provider: Arc<P>, vehicle_id: String, timeout: Option<Duration>, seq: u64,
) -> (u64, Result<Option<VehiclePosition>>)
where
    P: Config + HttpRequest + Identity,
{
    let fetch = location::fetch_location(&vehicle_id, provider.as_ref());
    let result = match timeout {
        Some(limit) => time::timeout(limit, fetch).await.unwrap_or_else(|_elapsed| {
            Err(Error::Timeout(format!(
                "location request for {vehicle_id} exceeded {}ms",
                limit.as_millis()
            )))
        }),
        None => fetch.await,
    };
    (seq, result)
}
