//! Scripted in-memory source for tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use aqicn_client::{AirQualitySource, Query};
use async_trait::async_trait;
use common::{Error, GeoPoint, Reading};

/// Canned answer for one cache key.
#[derive(Debug, Clone)]
pub enum Scripted {
    Readings(Vec<Reading>),
    Unavailable,
    Provider(String),
}

#[derive(Debug, Default)]
struct State {
    scripts: HashMap<String, Scripted>,
    calls: Vec<String>,
}

/// Answers queries from a script keyed by `Query::cache_key()`.
///
/// Unscripted keys answer like the provider does for an unknown station.
#[derive(Debug, Clone, Default)]
pub struct FakeSource {
    state: Arc<Mutex<State>>,
    total: Arc<AtomicUsize>,
    delay: Duration,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every fetch sleeps this long before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn script(&self, query: &Query, answer: Scripted) {
        self.state
            .lock()
            .unwrap()
            .scripts
            .insert(query.cache_key(), answer);
    }

    pub fn calls(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }

    pub fn calls_for(&self, query: &Query) -> usize {
        let key = query.cache_key();
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|k| **k == key)
            .count()
    }
}

#[async_trait]
impl AirQualitySource for FakeSource {
    async fn fetch(&self, query: &Query) -> Result<Vec<Reading>, Error> {
        let key = query.cache_key();
        self.total.fetch_add(1, Ordering::SeqCst);
        let answer = {
            let mut state = self.state.lock().unwrap();
            state.calls.push(key.clone());
            state.scripts.get(&key).cloned()
        };

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        match answer {
            Some(Scripted::Readings(readings)) => Ok(readings),
            Some(Scripted::Unavailable) => {
                Err(Error::UpstreamUnavailable(format!("{key}: 503 Service Unavailable")))
            }
            Some(Scripted::Provider(msg)) => Err(Error::Provider(msg)),
            None => Err(Error::Provider("Unknown station".into())),
        }
    }
}

/// A reading with a provider id, an index and a position.
pub fn reading(id: &str, aqi: f64, lat: f64, lng: f64) -> Reading {
    Reading {
        station_id: Some(id.to_string()),
        name: Some(format!("Station {id}")),
        position: GeoPoint::new(lat, lng).ok(),
        aqi,
        pm25: aqi * 0.6,
        pm10: aqi * 0.4,
        observed_at: Some("2026-03-01T11:00:00+05:30".into()),
        dominant_pollutant: Some("pm25".into()),
        ..Default::default()
    }
}
