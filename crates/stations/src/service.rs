//! Station loading: bulk region, named fan-out and point lookups.
//!
//! All three paths fetch readings through an `AirQualitySource` and turn
//! them into `StationRecord`s. They differ in failure policy:
//! - `load_region` fails as a whole and never returns a partial batch.
//! - `load_named` never fails; each location succeeds or is dropped alone.
//! - `load_near` fails on upstream errors but treats "nothing here" as
//!   `Ok(None)`.

use chrono::{DateTime, Utc};
use common::config::CityConfig;
use common::{BoundingBox, Error, GeoPoint, Reading, StationBatch, StationRecord};
use futures_util::future::join_all;
use tracing::{debug, info, warn};

use aqicn_client::{AirQualitySource, Query};

/// Loads stations from a source.
#[derive(Debug)]
pub struct StationService<S> {
    source: S,
}

impl<S: AirQualitySource> StationService<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Fetch every station inside `bounds`.
    ///
    /// Readings without a usable index or position are dropped, so the
    /// batch never shows a dead station as "Good".
    pub async fn load_region(&self, bounds: BoundingBox) -> Result<StationBatch, Error> {
        bounds.validate()?;
        let readings = self.source.fetch(&Query::Region(bounds)).await?;
        let now = Utc::now();
        let received = readings.len();

        let stations: Vec<StationRecord> = readings
            .iter()
            .filter_map(|r| region_record(r, now))
            .collect();

        info!(
            "Region load: kept {} / {} stations",
            stations.len(),
            received
        );
        Ok(StationBatch::new(stations, bounds, now))
    }

    /// Query every registry entry concurrently and keep what succeeded.
    pub async fn load_named(&self, registry: &[CityConfig]) -> Vec<StationRecord> {
        let lookups = registry.iter().map(|city| async move {
            let result = self.source.fetch(&Query::Named(city.id.clone())).await;
            (city, result)
        });
        let results = join_all(lookups).await;
        let now = Utc::now();

        let mut stations = Vec::with_capacity(results.len());
        for (city, result) in results {
            match result {
                Ok(readings) => match readings.first().and_then(|r| city_record(city, r, now)) {
                    Some(record) => stations.push(record),
                    None => debug!("No usable reading for {}", city.name),
                },
                Err(e) => warn!("Failed to fetch AQI for {}: {}", city.name, e),
            }
        }

        info!(
            "Named load: {} / {} locations answered",
            stations.len(),
            registry.len()
        );
        stations
    }

    /// Look up a single station by provider name.
    ///
    /// Registry entries keep their configured name and coordinates; other
    /// names take the provider's.
    pub async fn load_city(
        &self,
        name: &str,
        registry: &[CityConfig],
    ) -> Result<Option<StationRecord>, Error> {
        let readings = self.source.fetch(&Query::Named(name.to_string())).await?;
        let Some(reading) = readings.first() else {
            return Ok(None);
        };
        let now = Utc::now();

        let known = registry
            .iter()
            .find(|c| c.id.eq_ignore_ascii_case(name.trim()));
        if let Some(city) = known {
            return Ok(city_record(city, reading, now));
        }

        let Some(position) = reading.position else {
            debug!("{}: provider sent no coordinates", name);
            return Ok(None);
        };
        Ok(Some(StationRecord::from_reading(
            name.trim().to_lowercase(),
            name.trim().to_string(),
            reading.name.clone().unwrap_or_else(|| name.trim().to_string()),
            position,
            reading,
            now,
        )))
    }

    /// Nearest station to a clicked coordinate.
    pub async fn load_near(&self, lat: f64, lng: f64) -> Result<Option<StationRecord>, Error> {
        let click = GeoPoint::new(lat, lng)?;
        let readings = self.source.fetch(&Query::Point(click)).await?;
        let record = readings
            .first()
            .and_then(|r| point_record(click, r, Utc::now()));
        if record.is_none() {
            debug!("No station near {}", click.rounded_key());
        }
        Ok(record)
    }
}

/// Id used when the provider gives a station none.
pub fn synthesized_id(point: &GeoPoint) -> String {
    format!("geo:{}", point.rounded_key())
}

fn region_record(reading: &Reading, now: DateTime<Utc>) -> Option<StationRecord> {
    if reading.severity_index() == 0 {
        return None;
    }
    let position = reading.position?;
    let id = reading
        .station_id
        .clone()
        .unwrap_or_else(|| synthesized_id(&position));
    Some(StationRecord::from_reading(
        id,
        reading
            .name
            .clone()
            .unwrap_or_else(|| "Unknown Station".to_string()),
        reading.name.clone().unwrap_or_else(|| "Unknown".to_string()),
        position,
        reading,
        now,
    ))
}

fn city_record(city: &CityConfig, reading: &Reading, now: DateTime<Utc>) -> Option<StationRecord> {
    let position = match GeoPoint::new(city.lat, city.lng) {
        Ok(p) => p,
        Err(e) => {
            warn!("Registry entry {} has bad coordinates: {}", city.id, e);
            return None;
        }
    };
    Some(StationRecord::from_reading(
        city.id.to_lowercase(),
        city.name.clone(),
        reading.name.clone().unwrap_or_else(|| city.name.clone()),
        position,
        reading,
        now,
    ))
}

fn point_record(click: GeoPoint, reading: &Reading, now: DateTime<Utc>) -> Option<StationRecord> {
    if reading.severity_index() == 0 {
        return None;
    }
    let id = reading
        .station_id
        .clone()
        .unwrap_or_else(|| synthesized_id(&click));
    Some(StationRecord::from_reading(
        id,
        reading
            .name
            .clone()
            .unwrap_or_else(|| "Unknown Location".to_string()),
        reading
            .name
            .clone()
            .unwrap_or_else(|| "Unknown Station".to_string()),
        reading.position.unwrap_or(click),
        reading,
        now,
    ))
}
