//! Cumulative station set backing the map.
//!
//! A bulk refresh replaces the whole set; point lookups add stations one at
//! a time and never overwrite an id that is already present. Refreshes are
//! ticketed: only the most recently started refresh may replace the set,
//! so a slow, superseded load cannot clobber a newer one.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use common::{BoundingBox, Error, StationBatch, StationRecord};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Proof that a refresh was started; hand it back with the result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct RefreshTicket(u64);

/// What `apply_refresh` did with a result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The set was replaced; carries the new station count.
    Replaced(usize),
    /// The load failed; previous stations were kept.
    Failed(String),
    /// A newer refresh was started meanwhile; the result was discarded.
    Superseded,
}

#[derive(Debug, Default)]
struct StoreState {
    stations: HashMap<String, StationRecord>,
    bounds: Option<BoundingBox>,
    issued: u64,
    last_refreshed: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

/// Point-in-time copy of the store for a consumer.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreSnapshot {
    /// Sorted by id.
    pub stations: Vec<StationRecord>,
    pub total: usize,
    pub bounds: Option<BoundingBox>,
    pub last_refreshed: Option<DateTime<Utc>>,
    /// Set while the latest refresh failed; consumers offer a retry.
    pub last_error: Option<String>,
}

/// Thread-safe station map.
#[derive(Debug, Default)]
pub struct StationStore {
    state: RwLock<StoreState>,
}

impl StationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a refresh. Any earlier ticket becomes stale.
    pub async fn begin_refresh(&self) -> RefreshTicket {
        let mut state = self.state.write().await;
        state.issued += 1;
        RefreshTicket(state.issued)
    }

    /// Apply the result of the refresh started with `ticket`.
    ///
    /// Errors keep the current stations and record the message.
    pub async fn apply_refresh(
        &self,
        ticket: RefreshTicket,
        result: Result<StationBatch, Error>,
    ) -> RefreshOutcome {
        let mut state = self.state.write().await;
        if ticket.0 != state.issued {
            debug!(
                "Discarding refresh #{} (latest is #{})",
                ticket.0, state.issued
            );
            return RefreshOutcome::Superseded;
        }

        match result {
            Ok(batch) => {
                let count = replace(&mut state, batch);
                info!("Store refreshed: {} stations", count);
                RefreshOutcome::Replaced(count)
            }
            Err(e) => {
                warn!(
                    "Refresh failed, keeping {} stations: {}",
                    state.stations.len(),
                    e
                );
                let message = e.to_string();
                state.last_error = Some(message.clone());
                RefreshOutcome::Failed(message)
            }
        }
    }

    /// Replace the whole set with `batch`, unconditionally.
    pub async fn replace_all(&self, batch: StationBatch) -> usize {
        let mut state = self.state.write().await;
        replace(&mut state, batch)
    }

    /// Add `record` unless its id is already present.
    ///
    /// Returns whether the store changed.
    pub async fn merge_one(&self, record: StationRecord) -> bool {
        let mut state = self.state.write().await;
        if state.stations.contains_key(&record.id) {
            debug!("Station {} already present; keeping existing", record.id);
            return false;
        }
        debug!("Merged station {} ({})", record.id, record.city);
        state.stations.insert(record.id.clone(), record);
        true
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.stations.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.read().await.stations.is_empty()
    }

    pub async fn get(&self, id: &str) -> Option<StationRecord> {
        self.state.read().await.stations.get(id).cloned()
    }

    pub async fn last_error(&self) -> Option<String> {
        self.state.read().await.last_error.clone()
    }

    pub async fn snapshot(&self) -> StoreSnapshot {
        let state = self.state.read().await;
        let mut stations: Vec<StationRecord> = state.stations.values().cloned().collect();
        stations.sort_by(|a, b| a.id.cmp(&b.id));
        StoreSnapshot {
            total: stations.len(),
            stations,
            bounds: state.bounds,
            last_refreshed: state.last_refreshed,
            last_error: state.last_error.clone(),
        }
    }
}

fn replace(state: &mut StoreState, batch: StationBatch) -> usize {
    state.bounds = Some(batch.bounds());
    state.last_refreshed = Some(batch.fetched_at());
    state.last_error = None;
    state.stations = batch
        .into_stations()
        .into_iter()
        .map(|s| (s.id.clone(), s))
        .collect();
    state.stations.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{GeoPoint, Reading};

    fn record(id: &str, aqi: f64) -> StationRecord {
        let position = GeoPoint::new(28.6, 77.2).unwrap();
        let reading = Reading {
            aqi,
            position: Some(position),
            observed_at: Some("2026-03-01T11:00:00+05:30".into()),
            ..Default::default()
        };
        StationRecord::from_reading(
            id.to_string(),
            format!("City {id}"),
            format!("Station {id}"),
            position,
            &reading,
            Utc::now(),
        )
    }

    fn batch(n: usize) -> StationBatch {
        let stations = (0..n).map(|i| record(&format!("s{i}"), 60.0)).collect();
        StationBatch::new(stations, BoundingBox::INDIA, Utc::now())
    }

    #[tokio::test]
    async fn test_merge_is_first_writer_wins() {
        let store = StationStore::new();
        assert!(store.merge_one(record("a", 40.0)).await);
        assert!(!store.merge_one(record("a", 250.0)).await);

        assert_eq!(store.len().await, 1);
        assert_eq!(store.get("a").await.unwrap().aqi, 40);
    }

    #[tokio::test]
    async fn test_merge_twice_equals_merge_once() {
        let once = StationStore::new();
        once.merge_one(record("a", 88.0)).await;

        let twice = StationStore::new();
        twice.merge_one(record("a", 88.0)).await;
        twice.merge_one(record("a", 88.0)).await;

        assert_eq!(
            once.snapshot().await.stations,
            twice.snapshot().await.stations
        );
    }

    #[tokio::test]
    async fn test_distinct_ids_at_same_spot_both_kept() {
        let store = StationStore::new();
        store.merge_one(record("8190", 100.0)).await;
        store.merge_one(record("geo:28.60,77.20", 100.0)).await;
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn test_merge_does_not_override_bulk_data() {
        let store = StationStore::new();
        store.replace_all(batch(3)).await;
        assert!(!store.merge_one(record("s1", 300.0)).await);
        assert_eq!(store.get("s1").await.unwrap().aqi, 60);
    }

    #[tokio::test]
    async fn test_replace_all_discards_merged_points() {
        let store = StationStore::new();
        store.replace_all(batch(2)).await;
        store.merge_one(record("clicked", 70.0)).await;
        assert_eq!(store.len().await, 3);

        store.replace_all(batch(5)).await;
        assert_eq!(store.len().await, 5);
        assert!(store.get("clicked").await.is_none());
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_stations() {
        let store = StationStore::new();
        let ticket = store.begin_refresh().await;
        store.apply_refresh(ticket, Ok(batch(50))).await;

        let ticket = store.begin_refresh().await;
        let outcome = store
            .apply_refresh(ticket, Err(Error::UpstreamUnavailable("timeout".into())))
            .await;

        assert!(matches!(outcome, RefreshOutcome::Failed(_)));
        assert_eq!(store.len().await, 50);
        let snap = store.snapshot().await;
        assert_eq!(snap.total, 50);
        assert!(snap.last_error.unwrap().contains("timeout"));
    }

    #[tokio::test]
    async fn test_success_clears_last_error() {
        let store = StationStore::new();
        let ticket = store.begin_refresh().await;
        store
            .apply_refresh(ticket, Err(Error::Provider("Invalid key".into())))
            .await;
        assert!(store.last_error().await.is_some());

        let ticket = store.begin_refresh().await;
        assert_eq!(
            store.apply_refresh(ticket, Ok(batch(4))).await,
            RefreshOutcome::Replaced(4)
        );
        assert!(store.last_error().await.is_none());
    }

    #[tokio::test]
    async fn test_superseded_refresh_is_discarded() {
        let store = StationStore::new();
        let slow = store.begin_refresh().await;
        let fast = store.begin_refresh().await;

        store.apply_refresh(fast, Ok(batch(7))).await;
        let outcome = store.apply_refresh(slow, Ok(batch(2))).await;

        assert_eq!(outcome, RefreshOutcome::Superseded);
        assert_eq!(store.len().await, 7);
    }

    #[tokio::test]
    async fn test_concurrent_merges_lose_nothing() {
        let store = std::sync::Arc::new(StationStore::new());
        store.replace_all(batch(10)).await;

        let mut handles = Vec::new();
        for i in 0..20 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.merge_one(record(&format!("p{i}"), 90.0)).await
            }));
        }
        for h in handles {
            assert!(h.await.unwrap());
        }
        assert_eq!(store.len().await, 30);
    }

    #[tokio::test]
    async fn test_snapshot_is_sorted_and_counted() {
        let store = StationStore::new();
        store.merge_one(record("b", 10.0)).await;
        store.merge_one(record("a", 20.0)).await;
        let snap = store.snapshot().await;
        assert_eq!(snap.total, 2);
        assert_eq!(snap.stations[0].id, "a");
        assert!(snap.bounds.is_none());
    }
}
