//! AQICN response decoding.
//!
//! Every provider response is `{"status": ..., "data": ...}`. When the
//! status is not `"ok"`, `data` carries the error message. Otherwise the
//! payload shape depends on the endpoint: `map/bounds` returns an array of
//! map entries, `feed/*` returns one feed object.
//!
//! Field decoding never fails: numbers may arrive as numbers, numeric
//! strings, `"-"` or not at all. Missing or unusable pollutant values
//! become 0 so one bad field does not drop a whole station.

use common::{Error, GeoPoint, Reading};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::debug;

/// Which payload layout to expect under `data`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    MapBounds,
    Feed,
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    status: String,
    #[serde(default)]
    data: Value,
}

/// Decoded `data` payload, tagged by endpoint.
#[derive(Debug)]
pub enum Payload {
    MapBounds(Vec<MapEntry>),
    /// `None` when the provider answered "ok" with an empty payload.
    Feed(Option<FeedData>),
}

// ── map/bounds ────────────────────────────────────────────────────────

/// One station from `map/bounds`.
#[derive(Debug, Default, Deserialize)]
pub struct MapEntry {
    #[serde(default, deserialize_with = "lenient::opt_number")]
    pub lat: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_number")]
    pub lon: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub uid: Option<String>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub aqi: f64,
    #[serde(default, deserialize_with = "lenient::number")]
    pub pm25: f64,
    #[serde(default, deserialize_with = "lenient::number")]
    pub pm10: f64,
    #[serde(default, deserialize_with = "lenient::opt_struct")]
    pub station: Option<MapStation>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub dominentpol: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct MapStation {
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub time: Option<String>,
}

// ── feed ──────────────────────────────────────────────────────────────

/// Payload of `feed/{name}` and `feed/geo:{lat};{lng}`.
#[derive(Debug, Default, Deserialize)]
pub struct FeedData {
    #[serde(default, deserialize_with = "lenient::number")]
    pub aqi: f64,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub idx: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_struct")]
    pub city: Option<FeedCity>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub dominentpol: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_struct")]
    pub iaqi: Option<Iaqi>,
    #[serde(default, deserialize_with = "lenient::opt_struct")]
    pub time: Option<FeedTime>,
}

#[derive(Debug, Default, Deserialize)]
pub struct FeedCity {
    /// `[lat, lng]`.
    #[serde(default, deserialize_with = "lenient::opt_struct")]
    pub geo: Option<Vec<f64>>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub name: Option<String>,
}

/// Individual AQI sub-indices, each shaped `{"v": <number>}`.
#[derive(Debug, Default, Deserialize)]
pub struct Iaqi {
    #[serde(default, deserialize_with = "lenient::opt_struct")]
    pub pm25: Option<IaqiValue>,
    #[serde(default, deserialize_with = "lenient::opt_struct")]
    pub pm10: Option<IaqiValue>,
    #[serde(default, deserialize_with = "lenient::opt_struct")]
    pub t: Option<IaqiValue>,
    #[serde(default, deserialize_with = "lenient::opt_struct")]
    pub h: Option<IaqiValue>,
    #[serde(default, deserialize_with = "lenient::opt_struct")]
    pub p: Option<IaqiValue>,
    #[serde(default, deserialize_with = "lenient::opt_struct")]
    pub w: Option<IaqiValue>,
}

#[derive(Debug, Default, Deserialize)]
pub struct IaqiValue {
    #[serde(default, deserialize_with = "lenient::opt_number")]
    pub v: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct FeedTime {
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub iso: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub s: Option<String>,
}

// ── Decoding ──────────────────────────────────────────────────────────

/// Check the envelope and decode the payload for `kind`.
pub fn decode_payload(kind: PayloadKind, body: &str) -> Result<Payload, Error> {
    let envelope: Envelope = serde_json::from_str(body).map_err(|e| {
        Error::UpstreamUnavailable(format!("unreadable AQICN response: {e}"))
    })?;

    if envelope.status != "ok" {
        let message = match &envelope.data {
            Value::String(msg) if !msg.trim().is_empty() => msg.trim().to_string(),
            _ => format!("unknown provider error (status={:?})", envelope.status),
        };
        return Err(Error::Provider(message));
    }

    match kind {
        PayloadKind::MapBounds => {
            let Value::Array(items) = envelope.data else {
                return Err(Error::Provider(
                    "map/bounds payload is not an array".into(),
                ));
            };
            let total = items.len();
            let entries: Vec<MapEntry> = items
                .into_iter()
                .filter_map(|item| serde_json::from_value(item).ok())
                .collect();
            if entries.len() < total {
                debug!(
                    "Skipped {} non-object map/bounds entries",
                    total - entries.len()
                );
            }
            Ok(Payload::MapBounds(entries))
        }
        PayloadKind::Feed => {
            let data = envelope.data;
            if !data.is_object() {
                return Ok(Payload::Feed(None));
            }
            Ok(Payload::Feed(serde_json::from_value(data).ok()))
        }
    }
}

/// Decode a response body straight into readings.
pub fn decode_readings(kind: PayloadKind, body: &str) -> Result<Vec<Reading>, Error> {
    Ok(match decode_payload(kind, body)? {
        Payload::MapBounds(entries) => entries.into_iter().map(MapEntry::into_reading).collect(),
        Payload::Feed(Some(feed)) => vec![feed.into_reading()],
        Payload::Feed(None) => Vec::new(),
    })
}

impl MapEntry {
    pub fn into_reading(self) -> Reading {
        let position = match (self.lat, self.lon) {
            (Some(lat), Some(lon)) => GeoPoint::new(lat, lon).ok(),
            _ => None,
        };
        let station = self.station.unwrap_or_default();
        Reading {
            station_id: self.uid,
            name: station.name,
            position,
            aqi: self.aqi,
            pm25: self.pm25,
            pm10: self.pm10,
            observed_at: station.time,
            dominant_pollutant: self.dominentpol,
            ..Default::default()
        }
    }
}

impl FeedData {
    pub fn into_reading(self) -> Reading {
        let city = self.city.unwrap_or_default();
        let position = match city.geo.as_deref() {
            Some([lat, lng, ..]) => GeoPoint::new(*lat, *lng).ok(),
            _ => None,
        };
        let iaqi = self.iaqi.unwrap_or_default();
        let sub = |v: &Option<IaqiValue>| v.as_ref().and_then(|x| x.v);
        let time = self.time.unwrap_or_default();
        Reading {
            station_id: self.idx,
            name: city.name,
            position,
            aqi: self.aqi,
            pm25: sub(&iaqi.pm25).unwrap_or(0.0),
            pm10: sub(&iaqi.pm10).unwrap_or(0.0),
            temperature: sub(&iaqi.t),
            humidity: sub(&iaqi.h),
            pressure: sub(&iaqi.p),
            wind_speed: sub(&iaqi.w),
            observed_at: time.iso.or(time.s),
            dominant_pollutant: self.dominentpol,
        }
    }
}

/// Deserializers that coerce instead of failing.
mod lenient {
    use super::*;

    pub(super) fn coerce_f64(value: &Value) -> Option<f64> {
        let parsed = match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        };
        parsed.filter(|v| v.is_finite())
    }

    pub fn number<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
        let value = Value::deserialize(d)?;
        Ok(coerce_f64(&value).unwrap_or(0.0))
    }

    pub fn opt_number<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
        let value = Value::deserialize(d)?;
        Ok(coerce_f64(&value))
    }

    pub fn opt_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
        let value = Value::deserialize(d)?;
        Ok(match value {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(n) => Some(match n.as_i64() {
                Some(i) => i.to_string(),
                None => n.to_string(),
            }),
            _ => None,
        })
    }

    pub fn opt_struct<'de, D, T>(d: D) -> Result<Option<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: DeserializeOwned,
    {
        let value = Value::deserialize(d)?;
        if value.is_null() {
            return Ok(None);
        }
        Ok(serde_json::from_value(value).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BOUNDS_BODY: &str = r#"{
        "status": "ok",
        "data": [
            {"lat": 28.647622, "lon": 77.315809, "uid": 2553, "aqi": "162",
             "station": {"name": "Anand Vihar, Delhi, India", "time": "2026-03-01T11:00:00+05:30"}},
            {"lat": "19.0760", "lon": "72.8777", "uid": 7021, "aqi": "-",
             "station": {"name": "Worli, Mumbai, India", "time": "2026-03-01T11:00:00+05:30"}},
            {"lat": 12.9716, "lon": 77.5946, "uid": 3758, "aqi": 48, "pm25": "31", "pm10": null,
             "station": "not-an-object"},
            "garbage"
        ]
    }"#;

    const FEED_BODY: &str = r#"{
        "status": "ok",
        "data": {
            "aqi": 162,
            "idx": 2553,
            "city": {"geo": [28.647622, 77.315809], "name": "Anand Vihar, Delhi, India"},
            "dominentpol": "pm25",
            "iaqi": {
                "pm25": {"v": 162},
                "pm10": {"v": "98"},
                "t": {"v": 24.5},
                "h": {"v": 61},
                "w": {"v": "calm"}
            },
            "time": {"s": "2026-03-01 11:00:00", "iso": "2026-03-01T11:00:00+05:30"}
        }
    }"#;

    #[test]
    fn test_bounds_decode_is_lenient() {
        let readings = decode_readings(PayloadKind::MapBounds, BOUNDS_BODY).expect("should decode");
        assert_eq!(readings.len(), 3);

        assert_eq!(readings[0].station_id.as_deref(), Some("2553"));
        assert_eq!(readings[0].aqi, 162.0);
        assert_eq!(readings[0].name.as_deref(), Some("Anand Vihar, Delhi, India"));
        assert!(readings[0].position.is_some());

        // "-" means no index; coordinates as strings still parse.
        assert_eq!(readings[1].aqi, 0.0);
        assert!((readings[1].position.unwrap().lat() - 19.076).abs() < 1e-9);

        assert_eq!(readings[2].pm25, 31.0);
        assert_eq!(readings[2].pm10, 0.0);
        assert!(readings[2].name.is_none());
    }

    #[test]
    fn test_feed_decode_maps_subindices() {
        let readings = decode_readings(PayloadKind::Feed, FEED_BODY).expect("should decode");
        assert_eq!(readings.len(), 1);
        let r = &readings[0];
        assert_eq!(r.station_id.as_deref(), Some("2553"));
        assert_eq!(r.pm25, 162.0);
        assert_eq!(r.pm10, 98.0);
        assert_eq!(r.temperature, Some(24.5));
        assert_eq!(r.humidity, Some(61.0));
        assert_eq!(r.pressure, None);
        assert_eq!(r.wind_speed, None);
        assert_eq!(r.observed_at.as_deref(), Some("2026-03-01T11:00:00+05:30"));
        assert_eq!(r.dominant_pollutant.as_deref(), Some("pm25"));
    }

    #[test]
    fn test_provider_error_keeps_message() {
        let body = r#"{"status": "error", "data": "Unknown station"}"#;
        match decode_readings(PayloadKind::Feed, body) {
            Err(Error::Provider(msg)) => assert_eq!(msg, "Unknown station"),
            other => panic!("expected provider error, got {other:?}"),
        }
    }

    #[test]
    fn test_provider_error_without_message() {
        let body = r#"{"status": "nug"}"#;
        assert!(matches!(
            decode_readings(PayloadKind::MapBounds, body),
            Err(Error::Provider(_))
        ));
    }

    #[test]
    fn test_unreadable_body_is_upstream_unavailable() {
        let err = decode_readings(PayloadKind::Feed, "<html>502</html>").unwrap_err();
        assert!(matches!(err, Error::UpstreamUnavailable(_)));
    }

    #[test]
    fn test_empty_feed_yields_no_readings() {
        let body = r#"{"status": "ok", "data": null}"#;
        let readings = decode_readings(PayloadKind::Feed, body).expect("should decode");
        assert!(readings.is_empty());
    }

    #[test]
    fn test_bounds_payload_must_be_array() {
        let body = r#"{"status": "ok", "data": {"aqi": 10}}"#;
        assert!(matches!(
            decode_readings(PayloadKind::MapBounds, body),
            Err(Error::Provider(_))
        ));
    }

    #[test]
    fn test_out_of_range_geo_drops_position() {
        let body = r#"{"status": "ok", "data": {"aqi": 70, "city": {"geo": [123.0, 77.0], "name": "x"}}}"#;
        let readings = decode_readings(PayloadKind::Feed, body).expect("should decode");
        assert!(readings[0].position.is_none());
        assert!(readings[0].station_id.is_none());
    }
}
