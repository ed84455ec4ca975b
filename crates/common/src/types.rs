//! Domain types shared across the station layer.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};

use crate::aqi::{self, classify, AqiCategory};
use crate::error::Error;

/// Decimal places kept when rounding a coordinate for cache keys and
/// synthesized station ids. Two places is roughly 1.1 km.
pub const COORD_PRECISION: i32 = 2;

// ── Geography ─────────────────────────────────────────────────────────

/// A validated WGS84 coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GeoPoint {
    lat: f64,
    lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Result<Self, Error> {
        let valid = lat.is_finite()
            && lng.is_finite()
            && (-90.0..=90.0).contains(&lat)
            && (-180.0..=180.0).contains(&lng);
        if !valid {
            return Err(Error::InvalidCoordinate { lat, lng });
        }
        Ok(Self { lat, lng })
    }

    pub fn lat(&self) -> f64 {
        self.lat
    }

    pub fn lng(&self) -> f64 {
        self.lng
    }

    /// `lat,lng` rounded to [`COORD_PRECISION`] places.
    ///
    /// Clicks a few hundred metres apart produce the same string.
    pub fn rounded_key(&self) -> String {
        let places = COORD_PRECISION as usize;
        format!(
            "{:.*},{:.*}",
            places,
            round_coord(self.lat),
            places,
            round_coord(self.lng)
        )
    }
}

/// Round to [`COORD_PRECISION`] decimal places, normalizing `-0.0`.
pub fn round_coord(value: f64) -> f64 {
    let factor = 10f64.powi(COORD_PRECISION);
    let rounded = (value * factor).round() / factor;
    if rounded == 0.0 {
        0.0
    } else {
        rounded
    }
}

/// Rectangular lat/lng region used for bulk queries.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub south: f64,
    pub west: f64,
    pub north: f64,
    pub east: f64,
}

impl BoundingBox {
    /// Mainland India plus a margin, Kanyakumari to Kashmir and Gujarat to
    /// Arunachal Pradesh.
    pub const INDIA: BoundingBox = BoundingBox {
        south: 6.5,
        west: 68.0,
        north: 37.5,
        east: 97.5,
    };

    pub fn validate(&self) -> Result<(), Error> {
        GeoPoint::new(self.south, self.west)?;
        GeoPoint::new(self.north, self.east)?;
        if self.south >= self.north || self.west >= self.east {
            return Err(Error::Config(format!(
                "bounding box corners out of order: south={} north={} west={} east={}",
                self.south, self.north, self.west, self.east
            )));
        }
        Ok(())
    }

    pub fn contains(&self, point: &GeoPoint) -> bool {
        (self.south..=self.north).contains(&point.lat())
            && (self.west..=self.east).contains(&point.lng())
    }
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self::INDIA
    }
}

// ── Provider readings ─────────────────────────────────────────────────

/// One provider reading, already decoded and coerced.
///
/// Pollutant values that were missing or non-numeric upstream are 0 here.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reading {
    /// Provider station id (`uid` / `idx`), if it sent one.
    pub station_id: Option<String>,
    pub name: Option<String>,
    /// `None` when the provider sent no coordinates or invalid ones.
    pub position: Option<GeoPoint>,
    pub aqi: f64,
    pub pm25: f64,
    pub pm10: f64,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub pressure: Option<f64>,
    pub wind_speed: Option<f64>,
    pub observed_at: Option<String>,
    pub dominant_pollutant: Option<String>,
}

impl Reading {
    /// Severity index as a non-negative integer; 0 means "nothing usable".
    pub fn severity_index(&self) -> u32 {
        if self.aqi.is_finite() && self.aqi > 0.0 {
            self.aqi.round().min(u32::MAX as f64) as u32
        } else {
            0
        }
    }
}

// ── Normalized stations ───────────────────────────────────────────────

/// A station as handed to the map.
///
/// Category, colors and marker size are derived from `aqi` on demand and
/// cannot drift from it.
#[derive(Debug, Clone, PartialEq)]
pub struct StationRecord {
    pub id: String,
    /// Display name.
    pub city: String,
    pub position: GeoPoint,
    pub pm25: f64,
    pub pm10: f64,
    pub aqi: u32,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub pressure: Option<f64>,
    pub wind_speed: Option<f64>,
    /// Provider station name.
    pub station: String,
    pub last_updated: String,
    pub dominant_pollutant: String,
}

impl StationRecord {
    /// Build a record from a reading, filling documented defaults.
    ///
    /// `now` stands in for `last_updated` when the provider sent no time.
    pub fn from_reading(
        id: String,
        city: String,
        station: String,
        position: GeoPoint,
        reading: &Reading,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            city,
            position,
            pm25: non_negative(reading.pm25),
            pm10: non_negative(reading.pm10),
            aqi: reading.severity_index(),
            temperature: reading.temperature,
            humidity: reading.humidity,
            pressure: reading.pressure,
            wind_speed: reading.wind_speed,
            station,
            last_updated: reading
                .observed_at
                .clone()
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| now.to_rfc3339_opts(SecondsFormat::Millis, true)),
            dominant_pollutant: reading
                .dominant_pollutant
                .clone()
                .filter(|p| !p.trim().is_empty())
                .unwrap_or_else(|| "pm25".to_string()),
        }
    }

    pub fn category(&self) -> AqiCategory {
        classify(self.aqi as f64)
    }

    pub fn level(&self) -> &'static str {
        self.category().label()
    }

    pub fn color(&self) -> &'static str {
        self.category().color_hex()
    }

    pub fn marker_size_px(&self) -> u32 {
        aqi::marker_size_px(self.aqi)
    }
}

fn non_negative(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}

impl Serialize for StationRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let category = self.category();
        let mut s = serializer.serialize_struct("StationRecord", 20)?;
        s.serialize_field("id", &self.id)?;
        s.serialize_field("city", &self.city)?;
        s.serialize_field("lat", &self.position.lat())?;
        s.serialize_field("lng", &self.position.lng())?;
        s.serialize_field("pm25", &self.pm25)?;
        s.serialize_field("pm10", &self.pm10)?;
        s.serialize_field("aqi", &self.aqi)?;
        s.serialize_field("category", &category)?;
        s.serialize_field("level", category.label())?;
        s.serialize_field("color", category.color_hex())?;
        s.serialize_field("colorClass", category.color_class())?;
        s.serialize_field("description", category.description())?;
        s.serialize_field("markerSize", &self.marker_size_px())?;
        s.serialize_field("temperature", &self.temperature)?;
        s.serialize_field("humidity", &self.humidity)?;
        s.serialize_field("pressure", &self.pressure)?;
        s.serialize_field("windSpeed", &self.wind_speed)?;
        s.serialize_field("station", &self.station)?;
        s.serialize_field("lastUpdated", &self.last_updated)?;
        s.serialize_field("dominantPollutant", &self.dominant_pollutant)?;
        s.end()
    }
}

/// Result of one bulk region load.
#[derive(Debug, Clone, Serialize)]
pub struct StationBatch {
    stations: Vec<StationRecord>,
    total: usize,
    bounds: BoundingBox,
    fetched_at: DateTime<Utc>,
}

impl StationBatch {
    pub fn new(stations: Vec<StationRecord>, bounds: BoundingBox, fetched_at: DateTime<Utc>) -> Self {
        let total = stations.len();
        Self {
            stations,
            total,
            bounds,
            fetched_at,
        }
    }

    pub fn stations(&self) -> &[StationRecord] {
        &self.stations
    }

    pub fn into_stations(self) -> Vec<StationRecord> {
        self.stations
    }

    /// Always equal to `stations().len()`.
    pub fn total(&self) -> usize {
        self.total
    }

    pub fn bounds(&self) -> BoundingBox {
        self.bounds
    }

    pub fn fetched_at(&self) -> DateTime<Utc> {
        self.fetched_at
    }
}
