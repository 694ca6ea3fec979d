//! # Trip Monitor
//!
//! Refreshes a trip on a fixed timer and republishes its derived progress.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use realtime::{Config, Error, HttpRequest, Identity, Result};
use serde::Serialize;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::progress::TripProgress;
use crate::trip::{self, Trip};

const DEFAULT_INTERVAL: Duration = Duration::from_secs(10);
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Time between refreshes. Zero disables the monitor.
    pub interval: Duration,

    /// Per-request timeout. `None` waits indefinitely.
    pub request_timeout: Option<Duration>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self { interval: DEFAULT_INTERVAL, request_timeout: Some(DEFAULT_REQUEST_TIMEOUT) }
    }
}

/// Latest known trip and its progress. A refresh error keeps the previous
/// trip in place.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TripSnapshot {
    pub trip_id: Option<String>,
    pub active: bool,
    pub trip: Option<Trip>,
    pub progress: Option<TripProgress>,
    pub error: Option<String>,
}

impl TripSnapshot {
    /// Vehicle currently assigned to the trip.
    #[must_use]
    pub fn vehicle_id(&self) -> Option<&str> {
        self.trip.as_ref().and_then(Trip::vehicle_id)
    }
}

/// Handle to a running (or inert) trip monitor. Dropping it stops the monitor.
#[derive(Debug)]
pub struct TripMonitor {
    active: Arc<AtomicBool>,
    snapshot: watch::Receiver<TripSnapshot>,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl TripMonitor {
    /// Start refreshing `trip_id` every `config.interval`.
    ///
    /// A missing or blank trip id, or a zero interval, yields an inert monitor.
    /// Must be called from within a Tokio runtime.
    pub fn subscribe<P>(provider: P, trip_id: Option<&str>, config: MonitorConfig) -> Self
    where
        P: Config + HttpRequest + Identity + 'static,
    {
        let trip_id = trip_id.map(str::trim).filter(|id| !id.is_empty());
        let initial = TripSnapshot { trip_id: trip_id.map(ToString::to_string), ..TripSnapshot::default() };

        let Some(trip_id) = trip_id.filter(|_| !config.interval.is_zero()) else {
            debug!(trip_id = ?initial.trip_id, "trip monitoring disabled");
            let (_, snapshot) = watch::channel(initial);
            return Self {
                active: Arc::new(AtomicBool::new(false)),
                snapshot,
                shutdown: None,
                task: None,
            };
        };

        let active = Arc::new(AtomicBool::new(true));
        let (state, snapshot) = watch::channel(TripSnapshot { active: true, ..initial });
        let (shutdown, shutdown_rx) = oneshot::channel();

        let refresher = Refresher {
            provider,
            trip_id: trip_id.to_string(),
            config,
            active: Arc::clone(&active),
            state,
        };

        info!(trip_id = %trip_id, "trip monitoring started");
        let task = tokio::spawn(refresher.run(shutdown_rx));

        Self { active, snapshot, shutdown: Some(shutdown), task: Some(task) }
    }

    #[must_use]
    pub fn snapshot(&self) -> TripSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Wait for the next change. Returns `false` once the monitor has ended.
    pub async fn changed(&mut self) -> bool {
        self.snapshot.changed().await.is_ok()
    }

    #[must_use]
    pub fn watch(&self) -> watch::Receiver<TripSnapshot> {
        self.snapshot.clone()
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Stop refreshing. Safe to call more than once.
    pub async fn stop(&mut self) {
        self.active.store(false, Ordering::Release);
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(task) = self.task.take()
            && let Err(e) = task.await
            && !e.is_cancelled()
        {
            warn!("trip monitor task failed: {e}");
        }
    }
}

impl Drop for TripMonitor {
    fn drop(&mut self) {
        self.active.store(false, Ordering::Release);
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

struct Refresher<P> {
    provider: P,
    trip_id: String,
    config: MonitorConfig,
    active: Arc<AtomicBool>,
    state: watch::Sender<TripSnapshot>,
}

impl<P> Refresher<P>
where
    P: Config + HttpRequest + Identity + 'static,
{
    async fn run(self, mut shutdown: oneshot::Receiver<()>) {
        let mut ticker = time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        // refreshes are sequential so responses can never land out of order
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => {}
            }
            let result = tokio::select! {
                _ = &mut shutdown => break,
                result = self.refresh() => result,
            };
            self.apply(result);
        }

        self.state.send_modify(|snapshot| snapshot.active = false);
        info!(trip_id = %self.trip_id, "trip monitoring stopped");
    }

    async fn refresh(&self) -> Result<Trip> {
        let fetch = trip::fetch_trip(&self.trip_id, &self.provider);
        match self.config.request_timeout {
            Some(limit) => time::timeout(limit, fetch).await.unwrap_or_else(|_elapsed| {
                Err(Error::Timeout(format!(
                    "trip request for {} exceeded {}ms",
                    self.trip_id,
                    limit.as_millis()
                )))
            }),
            None => fetch.await,
        }
    }

    fn apply(&self, result: Result<Trip>) {
        if !self.active.load(Ordering::Acquire) {
            return;
        }

        match result {
            Ok(trip) => {
                let progress = TripProgress::from(&trip);
                self.state.send_if_modified(|snapshot| {
                    if snapshot.error.is_none() && snapshot.trip.as_ref() == Some(&trip) {
                        return false;
                    }
                    snapshot.progress = Some(progress);
                    snapshot.trip = Some(trip);
                    snapshot.error = None;
                    true
                });
            }
            Err(e) => {
                warn!(
                    trip_id = %self.trip_id,
                    transient = e.is_transient(),
                    monotonic_counter.trip_errors = 1,
                    "trip refresh failed: {e}"
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
