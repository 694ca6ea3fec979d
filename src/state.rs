//! Live tracking sessions keyed by vehicle and trip.
//!
//! A tracking session is shared by everyone who asked for it: the API and
//! any watched trip the vehicle is assigned to. Releasing the last claim
//! stops the poller.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use camera_stream::{CameraFrame, CameraStatus, CameraStream, StreamState};
use realtime::{Clock, Config, HttpRequest, Identity, Result, StreamConnector, SystemClock, not_found};
use serde_json::Value;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::info;
use vehicle_tracking::map::{self, GeoJsonRenderer, MapScene};
use vehicle_tracking::notifications::{self, Severity};
use vehicle_tracking::{LocationPoller, LocationSnapshot, TripMonitor, TripSnapshot};

use crate::config;
use crate::provider::{Provider, WsConnector};

/// Who asked for a vehicle to be tracked.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Claim {
    Api,
    Trip(String),
}

struct Tracking {
    poller: LocationPoller,
    watcher: JoinHandle<()>,
    claims: HashSet<Claim>,
}

impl Tracking {
    async fn stop(mut self) {
        self.poller.stop().await;
        self.watcher.abort();
    }
}

struct TripWatch {
    monitor: TripMonitor,
    watcher: JoinHandle<()>,
}

struct Camera {
    stream: CameraStream,
    watcher: JoinHandle<()>,
}

pub struct AppState<P = Provider, C = WsConnector, K = SystemClock> {
    inner: Arc<Inner<P, C, K>>,
}

impl<P, C, K> Clone for AppState<P, C, K> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

struct Inner<P, C, K> {
    provider: P,
    connector: C,
    clock: K,
    config: config::Config,
    tracking: Mutex<HashMap<String, Tracking>>,
    trips: Mutex<HashMap<String, TripWatch>>,
    cameras: Mutex<HashMap<String, Camera>>,
}

impl<P, C, K> AppState<P, C, K>
where
    P: Config + HttpRequest + Identity + Clone + 'static,
    C: StreamConnector + Clone,
    K: Clock + Clone + 'static,
{
    pub fn new(provider: P, connector: C, clock: K, config: config::Config) -> Self {
        Self {
            inner: Arc::new(Inner {
                provider,
                connector,
                clock,
                config,
                tracking: Mutex::default(),
                trips: Mutex::default(),
                cameras: Mutex::default(),
            }),
        }
    }

    /// Start tracking a vehicle. Already tracked vehicles are left as they are.
    pub async fn start_tracking(&self, vehicle_id: &str) -> LocationSnapshot {
        self.claim(vehicle_id, Claim::Api).await
    }

    /// Stop tracking a vehicle, whoever started it.
    pub async fn stop_tracking(&self, vehicle_id: &str) -> Result<()> {
        let removed = self.inner.tracking.lock().await.remove(vehicle_id);
        let Some(session) = removed else {
            return Err(not_found!("vehicle {} is not tracked", vehicle_id));
        };
        session.stop().await;
        info!(vehicle_id = %vehicle_id, "tracking stopped");
        Ok(())
    }

    pub async fn tracking(&self, vehicle_id: &str) -> Result<LocationSnapshot> {
        self.inner
            .tracking
            .lock()
            .await
            .get(vehicle_id)
            .map(|t| t.poller.snapshot())
            .ok_or_else(|| not_found!("vehicle {} is not tracked", vehicle_id))
    }

    async fn claim(&self, vehicle_id: &str, claim: Claim) -> LocationSnapshot {
        let mut tracking = self.inner.tracking.lock().await;
        if let Some(existing) = tracking.get_mut(vehicle_id) {
            existing.claims.insert(claim);
            return existing.poller.snapshot();
        }

        let poller = LocationPoller::subscribe(
            self.inner.provider.clone(),
            Some(vehicle_id),
            self.inner.config.poller(),
        );
        let watcher = tokio::spawn(report_location(vehicle_id.to_string(), poller.watch()));
        let snapshot = poller.snapshot();
        tracking.insert(
            vehicle_id.to_string(),
            Tracking { poller, watcher, claims: HashSet::from([claim]) },
        );
        snapshot
    }

    // Drops `claim` from every session holding it and stops sessions nobody
    // claims any more. `only` restricts the release to one vehicle.
    async fn release(&self, claim: &Claim, only: Option<&str>) {
        let orphaned = {
            let mut tracking = self.inner.tracking.lock().await;
            let released = tracking
                .iter_mut()
                .filter(|(vehicle_id, _)| only.is_none_or(|v| v == vehicle_id.as_str()))
                .filter_map(|(vehicle_id, session)| {
                    (session.claims.remove(claim) && session.claims.is_empty())
                        .then(|| vehicle_id.clone())
                })
                .collect::<Vec<_>>();
            released.into_iter().filter_map(|v| tracking.remove(&v).map(|s| (v, s))).collect::<Vec<_>>()
        };

        for (vehicle_id, session) in orphaned {
            session.stop().await;
            info!(vehicle_id = %vehicle_id, ?claim, "tracking released");
        }
    }

    /// Start monitoring a trip. Tracking starts for its vehicle once one is
    /// assigned and moves with the assignment.
    pub async fn watch_trip(&self, trip_id: &str) -> TripSnapshot {
        let mut trips = self.inner.trips.lock().await;
        if let Some(existing) = trips.get(trip_id) {
            return existing.monitor.snapshot();
        }

        let monitor = TripMonitor::subscribe(
            self.inner.provider.clone(),
            Some(trip_id),
            self.inner.config.monitor(),
        );
        let watcher = tokio::spawn(follow_trip(self.clone(), trip_id.to_string(), monitor.watch()));
        let snapshot = monitor.snapshot();
        trips.insert(trip_id.to_string(), TripWatch { monitor, watcher });
        snapshot
    }

    /// Stop monitoring a trip, along with the tracking it started.
    pub async fn unwatch_trip(&self, trip_id: &str) -> Result<()> {
        let removed = self.inner.trips.lock().await.remove(trip_id);
        let Some(mut session) = removed else {
            return Err(not_found!("trip {} is not watched", trip_id));
        };
        session.monitor.stop().await;
        session.watcher.abort();
        // the watcher may be mid-claim; wait for it before releasing
        let _ = session.watcher.await;

        self.release(&Claim::Trip(trip_id.to_string()), None).await;
        Ok(())
    }

    pub async fn trip(&self, trip_id: &str) -> Result<TripSnapshot> {
        self.inner
            .trips
            .lock()
            .await
            .get(trip_id)
            .map(|t| t.monitor.snapshot())
            .ok_or_else(|| not_found!("trip {} is not watched", trip_id))
    }

    /// GeoJSON of the trip route split by progress, plus the assigned
    /// vehicle's traveled path and live position when it is tracked.
    pub async fn trip_map(&self, trip_id: &str) -> Result<Value> {
        let trip = self.trip(trip_id).await?;
        let location = match trip.vehicle_id() {
            Some(vehicle_id) => self.tracking(vehicle_id).await.ok(),
            None => None,
        };

        let history = location.as_ref().map(|l| l.history.path()).unwrap_or_default();
        let live = location.as_ref().and_then(|l| l.latest.as_ref());
        let scene = MapScene::compose(&history, trip.progress.as_ref(), live);

        let mut renderer = GeoJsonRenderer::new();
        map::render(&scene, &mut renderer);
        Ok(renderer.into_value())
    }

    pub async fn start_camera(&self, vehicle_id: &str) -> CameraStatus {
        let mut cameras = self.inner.cameras.lock().await;
        let camera = cameras.entry(vehicle_id.to_string()).or_insert_with(|| {
            let stream = CameraStream::spawn(
                self.inner.connector.clone(),
                self.inner.clock.clone(),
                self.inner.config.camera(),
            );
            let watcher =
                tokio::spawn(report_camera(vehicle_id.to_string(), stream.watch_status()));
            Camera { stream, watcher }
        });

        camera.stream.start(self.inner.config.camera_url(vehicle_id));
        camera.stream.status()
    }

    /// Stop and discard the vehicle's camera client.
    pub async fn stop_camera(&self, vehicle_id: &str) -> Result<()> {
        let removed = self.inner.cameras.lock().await.remove(vehicle_id);
        let Some(camera) = removed else {
            return Err(not_found!("camera for vehicle {} is not running", vehicle_id));
        };
        camera.stream.stop();
        camera.watcher.abort();
        Ok(())
    }

    pub async fn camera(&self, vehicle_id: &str) -> Result<CameraStatus> {
        self.inner
            .cameras
            .lock()
            .await
            .get(vehicle_id)
            .map(|c| c.stream.status())
            .ok_or_else(|| not_found!("camera for vehicle {} is not running", vehicle_id))
    }

    pub async fn camera_frame(&self, vehicle_id: &str) -> Result<CameraFrame> {
        self.inner
            .cameras
            .lock()
            .await
            .get(vehicle_id)
            .and_then(|c| c.stream.latest_frame())
            .ok_or_else(|| not_found!("no frame for vehicle {}", vehicle_id))
    }

    pub async fn shutdown(&self) {
        let trips = std::mem::take(&mut *self.inner.trips.lock().await);
        for (_, mut session) in trips {
            session.monitor.stop().await;
            session.watcher.abort();
        }
        let tracking = std::mem::take(&mut *self.inner.tracking.lock().await);
        for (_, session) in tracking {
            session.stop().await;
        }
        let cameras = std::mem::take(&mut *self.inner.cameras.lock().await);
        for (_, camera) in cameras {
            camera.stream.stop();
            camera.watcher.abort();
        }
        info!("all sessions stopped");
    }
}

/// Record each new location error in the notification log.
async fn report_location(vehicle_id: String, mut snapshots: watch::Receiver<LocationSnapshot>) {
    let mut last_error = None;
    while snapshots.changed().await.is_ok() {
        let error = snapshots.borrow_and_update().error.clone();
        if error != last_error {
            if let Some(message) = &error {
                notifications::append(Severity::Warning, format!("vehicle {vehicle_id}"), message);
            }
            last_error = error;
        }
    }
}

/// Record trip errors and keep tracking on the assigned vehicle.
async fn follow_trip<P, C, K>(
    state: AppState<P, C, K>, trip_id: String, mut snapshots: watch::Receiver<TripSnapshot>,
) where
    P: Config + HttpRequest + Identity + Clone + 'static,
    C: StreamConnector + Clone,
    K: Clock + Clone + 'static,
{
    let claim = Claim::Trip(trip_id.clone());
    let mut last_error = None;
    let mut last_vehicle: Option<String> = None;

    while snapshots.changed().await.is_ok() {
        let (error, vehicle) = {
            let snapshot = snapshots.borrow_and_update();
            (snapshot.error.clone(), snapshot.vehicle_id().map(ToString::to_string))
        };

        if error != last_error {
            if let Some(message) = &error {
                notifications::append(Severity::Warning, format!("trip {trip_id}"), message);
            }
            last_error = error;
        }

        // a failed refresh keeps the last known trip, so this only fires on
        // a real change of assignment
        if vehicle != last_vehicle {
            if let Some(previous) = &last_vehicle {
                state.release(&claim, Some(previous)).await;
            }
            if let Some(vehicle_id) = &vehicle {
                info!(trip_id = %trip_id, vehicle_id = %vehicle_id, "trip vehicle assigned");
                state.claim(vehicle_id, claim.clone()).await;
            }
            last_vehicle = vehicle;
        }
    }
}

/// Record camera disconnects and connection failures.
async fn report_camera(vehicle_id: String, mut statuses: watch::Receiver<CameraStatus>) {
    let mut last_state = StreamState::Idle;
    while statuses.changed().await.is_ok() {
        let (state, reason) = {
            let status = statuses.borrow_and_update();
            (status.state, status.disconnect_reason.clone())
        };

        if state != last_state && matches!(state, StreamState::Closed | StreamState::Failed) {
            let message = reason.unwrap_or_else(|| format!("camera {state}"));
            notifications::append(Severity::Error, format!("camera {vehicle_id}"), message);
        }
        last_state = state;
    }
}
