//! AQICN (World Air Quality Index) API client.
//!
//! Issues one HTTP call per query and decodes the response into
//! `Reading`s. Three query shapes are supported: a bounding-box map query,
//! a named station feed and a geo feed for arbitrary coordinates.

pub mod wire;

use std::error::Error as StdError;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::{BoundingBox, Error, GeoPoint, Reading};
use reqwest::Url;
use tracing::{debug, info, warn};

use crate::wire::{decode_readings, PayloadKind};

const DEFAULT_BASE_URL: &str = "https://api.waqi.info";

/// One upstream request.
#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    /// All stations inside a lat/lng box.
    Region(BoundingBox),
    /// A station or city the provider knows by name (e.g. "Delhi").
    Named(String),
    /// Nearest station to a coordinate.
    Point(GeoPoint),
}

impl Query {
    /// Deterministic cache key.
    ///
    /// Point queries use the rounded coordinate so that nearby clicks share
    /// an entry; named queries ignore case.
    pub fn cache_key(&self) -> String {
        match self {
            Query::Region(b) => format!("bounds:{},{},{},{}", b.south, b.west, b.north, b.east),
            Query::Named(name) => format!("feed:{}", name.trim().to_lowercase()),
            Query::Point(p) => format!("geo:{}", p.rounded_key()),
        }
    }

    fn payload_kind(&self) -> PayloadKind {
        match self {
            Query::Region(_) => PayloadKind::MapBounds,
            Query::Named(_) | Query::Point(_) => PayloadKind::Feed,
        }
    }
}

/// Anything that can answer a [`Query`] with readings.
#[async_trait]
pub trait AirQualitySource: Send + Sync {
    async fn fetch(&self, query: &Query) -> Result<Vec<Reading>, Error>;

    /// Drop any expired cached responses; returns how many were dropped.
    /// Sources without a cache have nothing to do.
    fn evict_expired(&self) -> usize {
        0
    }
}

#[async_trait]
impl<S: AirQualitySource + ?Sized> AirQualitySource for Arc<S> {
    async fn fetch(&self, query: &Query) -> Result<Vec<Reading>, Error> {
        (**self).fetch(query).await
    }

    fn evict_expired(&self) -> usize {
        (**self).evict_expired()
    }
}

fn normalize_base_url(raw: &str) -> String {
    raw.trim().trim_end_matches('/').to_string()
}

fn resolve_base_url() -> String {
    if let Ok(override_url) = std::env::var("AQICN_API_BASE_URL") {
        let normalized = normalize_base_url(&override_url);
        if !normalized.is_empty() {
            info!("Using AQICN_API_BASE_URL override: {}", normalized);
            return normalized;
        }
        warn!("Ignoring empty AQICN_API_BASE_URL override");
    }
    DEFAULT_BASE_URL.to_string()
}

fn format_reqwest_error(err: &reqwest::Error) -> String {
    // Keep chained causes so DNS/TLS/socket failures are visible.
    let mut message = err.to_string();
    let mut source = err.source();

    while let Some(cause) = source {
        let cause_msg = cause.to_string();
        if !cause_msg.is_empty() && !message.contains(&cause_msg) {
            message.push_str(": ");
            message.push_str(&cause_msg);
        }
        source = cause.source();
    }

    message
}

/// HTTP client for the AQICN API.
#[derive(Debug, Clone)]
pub struct AqicnClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
    timeout: Duration,
}

impl AqicnClient {
    /// Build a client against the default (or env-overridden) base URL.
    pub fn new(token: &str, timeout: Duration) -> Result<Self, Error> {
        Self::with_base_url(token, &resolve_base_url(), timeout)
    }

    pub fn with_base_url(token: &str, base_url: &str, timeout: Duration) -> Result<Self, Error> {
        let token = token.trim();
        if token.is_empty() {
            return Err(Error::Config("AQICN token is required".into()));
        }
        let base_url = normalize_base_url(base_url);
        Url::parse(&base_url)
            .map_err(|e| Error::Config(format!("invalid AQICN base URL {base_url:?}: {e}")))?;

        let client = reqwest::Client::builder()
            .user_agent("aqi-map/0.1 (station aggregator)")
            .pool_max_idle_per_host(4)
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("failed to build AQICN HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url,
            token: token.to_string(),
            timeout,
        })
    }

    /// Full request URL for a query, token included.
    pub fn request_url(&self, query: &Query) -> Result<Url, Error> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| Error::Config(format!("invalid AQICN base URL: {e}")))?;
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| Error::Config("AQICN base URL cannot hold a path".into()))?;
            segments.pop_if_empty();
            match query {
                Query::Region(_) => {
                    segments.extend(["map", "bounds", ""]);
                }
                Query::Named(name) => {
                    segments.extend(["feed", name.trim(), ""]);
                }
                Query::Point(p) => {
                    let geo = format!("geo:{};{}", p.lat(), p.lng());
                    segments.extend(["feed", geo.as_str(), ""]);
                }
            }
        }
        {
            let mut pairs = url.query_pairs_mut();
            if let Query::Region(b) = query {
                pairs.append_pair(
                    "latlng",
                    &format!("{},{},{},{}", b.south, b.west, b.north, b.east),
                );
            }
            pairs.append_pair("token", &self.token);
        }
        Ok(url)
    }
}

#[async_trait]
impl AirQualitySource for AqicnClient {
    async fn fetch(&self, query: &Query) -> Result<Vec<Reading>, Error> {
        let url = self.request_url(query)?;
        let label = query.cache_key();

        debug!("Fetching AQICN {}", label);

        let resp = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                Error::UpstreamUnavailable(format!(
                    "AQICN request for {label} timed out after {:?}",
                    self.timeout
                ))
            } else {
                Error::UpstreamUnavailable(format!(
                    "HTTP error for {label}: {}",
                    format_reqwest_error(&e)
                ))
            }
        })?;

        let status = resp.status();
        let body = resp.text().await.map_err(|e| {
            Error::UpstreamUnavailable(format!(
                "failed to read AQICN body for {label}: {}",
                format_reqwest_error(&e)
            ))
        })?;

        if !status.is_success() {
            return Err(Error::UpstreamUnavailable(format!(
                "AQICN returned {} for {label}: {}",
                status.as_u16(),
                body.chars().take(500).collect::<String>()
            )));
        }

        let readings = decode_readings(query.payload_kind(), &body)?;
        debug!("Got {} readings for {}", readings.len(), label);
        Ok(readings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> AqicnClient {
        AqicnClient::with_base_url("demo-token", "https://api.waqi.info/", Duration::from_secs(8))
            .expect("client should build")
    }

    #[test]
    fn test_missing_token_is_config_error() {
        let err = AqicnClient::with_base_url("  ", DEFAULT_BASE_URL, Duration::from_secs(8))
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_region_url() {
        let url = client()
            .request_url(&Query::Region(BoundingBox::INDIA))
            .expect("url should build");
        assert_eq!(
            url.as_str(),
            "https://api.waqi.info/map/bounds/?latlng=6.5%2C68%2C37.5%2C97.5&token=demo-token"
        );
    }

    #[test]
    fn test_named_url() {
        let url = client()
            .request_url(&Query::Named("Delhi".into()))
            .expect("url should build");
        assert_eq!(url.as_str(), "https://api.waqi.info/feed/Delhi/?token=demo-token");
    }

    #[test]
    fn test_named_url_escapes_path() {
        let url = client()
            .request_url(&Query::Named("new delhi/x".into()))
            .expect("url should build");
        assert_eq!(
            url.as_str(),
            "https://api.waqi.info/feed/new%20delhi%2Fx/?token=demo-token"
        );
    }

    #[test]
    fn test_point_url() {
        let p = GeoPoint::new(28.61, 77.2).unwrap();
        let url = client().request_url(&Query::Point(p)).expect("url should build");
        assert_eq!(
            url.as_str(),
            "https://api.waqi.info/feed/geo:28.61;77.2/?token=demo-token"
        );
    }

    #[test]
    fn test_cache_keys() {
        let a = GeoPoint::new(28.6139, 77.2090).unwrap();
        let b = GeoPoint::new(28.6101, 77.2140).unwrap();
        assert_eq!(Query::Point(a).cache_key(), Query::Point(b).cache_key());
        assert_eq!(
            Query::Named("Delhi".into()).cache_key(),
            Query::Named(" delhi ".into()).cache_key()
        );
        assert_eq!(
            Query::Region(BoundingBox::INDIA).cache_key(),
            "bounds:6.5,68,37.5,97.5"
        );
    }

    // ── HTTP path against a local one-shot server ──────────────────────

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn http_response(status: &str, body: &str) -> String {
        format!(
            "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        )
    }

    /// Answer a single request with `response` after `delay`; returns the base URL.
    async fn serve_once(response: String, delay: Duration) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4096];
            let _ = socket.read(&mut buf).await;
            tokio::time::sleep(delay).await;
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;
        });
        format!("http://{addr}")
    }

    fn local_client(base: &str, timeout: Duration) -> AqicnClient {
        AqicnClient::with_base_url("demo-token", base, timeout).expect("client should build")
    }

    #[tokio::test]
    async fn test_fetch_non_success_status_is_upstream_unavailable() {
        let base = serve_once(http_response("503 Service Unavailable", "busy"), Duration::ZERO).await;
        let client = local_client(&base, Duration::from_secs(5));

        let err = client.fetch(&Query::Named("Delhi".into())).await.unwrap_err();
        match err {
            Error::UpstreamUnavailable(msg) => {
                assert!(msg.contains("503"), "{msg}");
                assert!(msg.contains("busy"), "{msg}");
            }
            other => panic!("expected upstream unavailable, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_fetch_past_timeout_is_upstream_unavailable() {
        let body = r#"{"status":"ok","data":{"aqi":80}}"#;
        let base = serve_once(http_response("200 OK", body), Duration::from_secs(3)).await;
        let client = local_client(&base, Duration::from_millis(300));

        let err = client.fetch(&Query::Named("Delhi".into())).await.unwrap_err();
        match err {
            Error::UpstreamUnavailable(msg) => {
                assert!(msg.contains("timed out after 300ms"), "{msg}");
            }
            other => panic!("expected upstream unavailable, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_fetch_provider_status_is_provider_error() {
        let body = r#"{"status":"error","data":"Invalid key"}"#;
        let base = serve_once(http_response("200 OK", body), Duration::ZERO).await;
        let client = local_client(&base, Duration::from_secs(5));

        let err = client.fetch(&Query::Named("Delhi".into())).await.unwrap_err();
        assert!(matches!(err, Error::Provider(ref msg) if msg == "Invalid key"), "{err:?}");
    }

    #[tokio::test]
    async fn test_fetch_ok_feed_yields_reading() {
        let body = r#"{"status":"ok","data":{"aqi":"151","idx":8190,"city":{"geo":[28.61,77.21],"name":"Delhi"}}}"#;
        let base = serve_once(http_response("200 OK", body), Duration::ZERO).await;
        let client = local_client(&base, Duration::from_secs(5));

        let readings = client.fetch(&Query::Named("Delhi".into())).await.unwrap();
        assert_eq!(readings.len(), 1);
        assert_eq!(readings[0].station_id.as_deref(), Some("8190"));
        assert_eq!(readings[0].severity_index(), 151);
    }
}
