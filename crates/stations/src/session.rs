//! Map session: owns the store, keeps it refreshed, and merges clicks.

use std::sync::Arc;
use std::time::Duration;

use aqicn_client::AirQualitySource;
use common::{BoundingBox, Error, StationRecord};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::service::StationService;
use crate::store::{RefreshOutcome, StationStore};

pub struct MapSession<S> {
    service: Arc<StationService<S>>,
    store: Arc<StationStore>,
    region: BoundingBox,
    refresh_interval: Duration,
    task: Option<JoinHandle<()>>,
}

impl<S: AirQualitySource + 'static> MapSession<S> {
    pub fn new(service: StationService<S>, region: BoundingBox, refresh_interval: Duration) -> Self {
        Self {
            service: Arc::new(service),
            store: Arc::new(StationStore::new()),
            region,
            refresh_interval,
            task: None,
        }
    }

    pub fn store(&self) -> &StationStore {
        &self.store
    }

    pub fn service(&self) -> &StationService<S> {
        &self.service
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Run the initial bulk load, then keep refreshing on the interval.
    ///
    /// Calling `start` on a running session only reloads.
    pub async fn start(&mut self) -> RefreshOutcome {
        let outcome = refresh(&self.service, &self.store, self.region).await;
        if self.is_running() {
            return outcome;
        }

        let service = self.service.clone();
        let store = self.store.clone();
        let region = self.region;
        let period = self.refresh_interval;
        self.task = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                debug!("Scheduled refresh");
                refresh(&service, &store, region).await;
            }
        }));
        info!(
            "Map session started (refresh every {}s)",
            self.refresh_interval.as_secs()
        );
        outcome
    }

    /// Manual retry, e.g. after a failed refresh.
    pub async fn refresh_now(&self) -> RefreshOutcome {
        refresh(&self.service, &self.store, self.region).await
    }

    /// Look up the station nearest a click and add it to the store.
    ///
    /// Returns the stored record for that id, which is the existing one when
    /// the id was already present.
    pub async fn click(&self, lat: f64, lng: f64) -> Result<Option<StationRecord>, Error> {
        let record = match self.service.load_near(lat, lng).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                info!("No station found near {:.4},{:.4}", lat, lng);
                return Ok(None);
            }
            Err(e) => {
                warn!("Lookup at {:.4},{:.4} failed: {}", lat, lng, e);
                return Err(e);
            }
        };

        if !self.region.contains(&record.position) {
            debug!(
                "{} at {} lies outside the refreshed region",
                record.id,
                record.position.rounded_key()
            );
        }

        let id = record.id.clone();
        if self.store.merge_one(record.clone()).await {
            info!("Added {} ({}) AQI {}", record.city, id, record.aqi);
            Ok(Some(record))
        } else {
            Ok(self.store.get(&id).await)
        }
    }

    /// Stop the refresh task. The store keeps its contents.
    pub fn shutdown(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            info!("Map session stopped");
        }
    }
}

impl<S> Drop for MapSession<S> {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn refresh<S: AirQualitySource>(
    service: &StationService<S>,
    store: &StationStore,
    region: BoundingBox,
) -> RefreshOutcome {
    let ticket = store.begin_refresh().await;
    let result = service.load_region(region).await;
    let outcome = store.apply_refresh(ticket, result).await;

    let evicted = service.source().evict_expired();
    if evicted > 0 {
        debug!("Evicted {} expired cache entries", evicted);
    }
    outcome
}
