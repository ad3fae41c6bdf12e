//! Coordinate completion through a Nominatim-compatible search endpoint.

use crate::adapters::directory::PortDirectory;
use crate::domain::model::{Coordinates, PortCode};
use crate::domain::ports::Geocoder;
use crate::utils::error::{RerouteError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

pub const DEFAULT_GEOCODER_ENDPOINT: &str = "https://nominatim.openstreetmap.org/search";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeocoderSettings {
    #[serde(default = "GeocoderSettings::default_enabled")]
    pub enabled: bool,
    #[serde(default = "GeocoderSettings::default_endpoint")]
    pub endpoint: String,
    #[serde(default = "GeocoderSettings::default_user_agent")]
    pub user_agent: String,
    #[serde(default = "GeocoderSettings::default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "GeocoderSettings::default_retry_attempts")]
    pub retry_attempts: u32,
    #[serde(default = "GeocoderSettings::default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Write geocoded coordinates back to the directory file.
    #[serde(default = "GeocoderSettings::default_persist")]
    pub persist: bool,
}

impl GeocoderSettings {
    fn default_enabled() -> bool {
        true
    }

    fn default_persist() -> bool {
        true
    }

    fn default_endpoint() -> String {
        DEFAULT_GEOCODER_ENDPOINT.to_string()
    }

    fn default_user_agent() -> String {
        format!("port-reroute/{}", env!("CARGO_PKG_VERSION"))
    }

    fn default_timeout_ms() -> u64 {
        10_000
    }

    fn default_retry_attempts() -> u32 {
        3
    }

    fn default_retry_delay_ms() -> u64 {
        1_000
    }
}

impl Default for GeocoderSettings {
    fn default() -> Self {
        Self {
            enabled: Self::default_enabled(),
            endpoint: Self::default_endpoint(),
            user_agent: Self::default_user_agent(),
            timeout_ms: Self::default_timeout_ms(),
            retry_attempts: Self::default_retry_attempts(),
            retry_delay_ms: Self::default_retry_delay_ms(),
            persist: Self::default_persist(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    lat: String,
    lon: String,
}

pub struct NominatimGeocoder {
    client: Client,
    settings: GeocoderSettings,
}

impl NominatimGeocoder {
    pub fn new(settings: GeocoderSettings) -> Result<Self> {
        let client = Client::builder()
            .user_agent(settings.user_agent.clone())
            .timeout(Duration::from_millis(settings.timeout_ms))
            .build()?;
        Ok(Self { client, settings })
    }

    fn search_url(&self, query: &str, country: &str) -> Result<Url> {
        let q = if country.is_empty() {
            query.to_string()
        } else {
            format!("{}, {}", query, country)
        };
        Url::parse_with_params(
            &self.settings.endpoint,
            &[("q", q.as_str()), ("format", "json"), ("limit", "1")],
        )
        .map_err(|e| RerouteError::InvalidConfigValueError {
            field: "geocoder.endpoint".to_string(),
            value: self.settings.endpoint.clone(),
            reason: e.to_string(),
        })
    }

    async fn search_once(&self, url: &Url) -> std::result::Result<Vec<SearchHit>, reqwest::Error> {
        self.client
            .get(url.clone())
            .send()
            .await?
            .error_for_status()?
            .json::<Vec<SearchHit>>()
            .await
    }
}

#[async_trait]
impl Geocoder for NominatimGeocoder {
    async fn locate(&self, query: &str, country: &str) -> Result<Option<Coordinates>> {
        let url = self.search_url(query, country)?;
        let attempts = self.settings.retry_attempts.max(1);

        for attempt in 1..=attempts {
            match self.search_once(&url).await {
                Ok(hits) => {
                    let coordinates = hits.first().and_then(|hit| {
                        let latitude = hit.lat.parse::<f64>().ok()?;
                        let longitude = hit.lon.parse::<f64>().ok()?;
                        Coordinates::new(latitude, longitude)
                    });
                    return Ok(coordinates);
                }
                Err(e) if e.is_timeout() => {
                    tracing::warn!(
                        "Geocoding '{}, {}' timed out (attempt {}/{})",
                        query,
                        country,
                        attempt,
                        attempts
                    );
                    if attempt < attempts {
                        tokio::time::sleep(Duration::from_millis(self.settings.retry_delay_ms))
                            .await;
                    }
                }
                Err(e) => {
                    return Err(RerouteError::UpstreamFetch {
                        url: url.to_string(),
                        attempts: attempt,
                        message: e.to_string(),
                    });
                }
            }
        }

        Err(RerouteError::UpstreamFetch {
            url: url.to_string(),
            attempts,
            message: "request timed out".to_string(),
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GeocodeSummary {
    pub attempted: usize,
    pub resolved: usize,
    pub unresolved: usize,
    pub without_directory_entry: usize,
}

impl GeocodeSummary {
    pub fn changed(&self) -> bool {
        self.resolved > 0
    }
}

/// Fills in missing directory coordinates, one lookup at a time.
pub struct CoordinateCompleter<'a> {
    geocoder: &'a dyn Geocoder,
}

impl<'a> CoordinateCompleter<'a> {
    pub fn new(geocoder: &'a dyn Geocoder) -> Self {
        Self { geocoder }
    }

    /// Geocodes the listed ports that lack coordinates. Lookup failures leave
    /// the coordinates absent.
    pub async fn complete<I>(&self, directory: &mut PortDirectory, codes: I) -> GeocodeSummary
    where
        I: IntoIterator<Item = PortCode>,
    {
        let mut summary = GeocodeSummary::default();

        for code in codes {
            let Some(entry) = directory.get(code) else {
                summary.without_directory_entry += 1;
                continue;
            };
            if entry.coordinates.is_some() {
                continue;
            }
            if entry.name.is_empty() {
                // Nothing to search for.
                summary.without_directory_entry += 1;
                continue;
            }

            summary.attempted += 1;
            let mut queries = Vec::with_capacity(2);
            if let Some(port_type) = &entry.port_type {
                queries.push(format!("{} {}", port_type, entry.name));
            }
            queries.push(entry.name.clone());
            let country = entry.country.clone();

            let mut found = None;
            for query in &queries {
                match self.geocoder.locate(query, &country).await {
                    Ok(Some(coordinates)) => {
                        tracing::info!(
                            "Geocoded port {} via '{}': ({}, {})",
                            code,
                            query,
                            coordinates.latitude,
                            coordinates.longitude
                        );
                        found = Some(coordinates);
                        break;
                    }
                    Ok(None) => {
                        tracing::debug!("No geocoding match for '{}, {}'", query, country);
                    }
                    Err(e) => {
                        tracing::warn!("Geocoding port {} failed: {}", code, e);
                    }
                }
            }

            match found {
                Some(coordinates) => {
                    directory.set_coordinates(code, coordinates);
                    summary.resolved += 1;
                }
                None => {
                    tracing::warn!("Coordinates not found for port {}", code);
                    summary.unresolved += 1;
                }
            }
        }

        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::DirectoryEntry;
    use httpmock::prelude::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    fn fast_settings(endpoint: String) -> GeocoderSettings {
        GeocoderSettings {
            endpoint,
            timeout_ms: 200,
            retry_delay_ms: 10,
            ..GeocoderSettings::default()
        }
    }

    #[test]
    fn test_persist_defaults_on_independently_of_enabled() {
        let settings: GeocoderSettings = toml::from_str("enabled = false").unwrap();
        assert!(!settings.enabled);
        assert!(settings.persist);

        let settings: GeocoderSettings = toml::from_str("persist = false").unwrap();
        assert!(settings.enabled);
        assert!(!settings.persist);
    }

    /// Answers from a fixed table and records every query.
    struct TableGeocoder {
        answers: HashMap<String, Coordinates>,
        failing: Vec<String>,
        queries: Mutex<Vec<String>>,
    }

    impl TableGeocoder {
        fn new(answers: &[(&str, (f64, f64))]) -> Self {
            Self {
                answers: answers
                    .iter()
                    .map(|(q, (lat, lon))| (q.to_string(), Coordinates::new(*lat, *lon).unwrap()))
                    .collect(),
                failing: Vec::new(),
                queries: Mutex::new(Vec::new()),
            }
        }

        fn failing_on(mut self, query: &str) -> Self {
            self.failing.push(query.to_string());
            self
        }
    }

    #[async_trait]
    impl Geocoder for TableGeocoder {
        async fn locate(&self, query: &str, _country: &str) -> Result<Option<Coordinates>> {
            self.queries.lock().unwrap().push(query.to_string());
            if self.failing.iter().any(|q| q == query) {
                return Err(RerouteError::UpstreamFetch {
                    url: "mock".to_string(),
                    attempts: 3,
                    message: "timed out".to_string(),
                });
            }
            Ok(self.answers.get(query).copied())
        }
    }

    fn directory() -> PortDirectory {
        let entry = |code: u32, name: &str, port_type: Option<&str>, coordinates| DirectoryEntry {
            code: PortCode::new(code),
            name: name.to_string(),
            country: "CHILE".to_string(),
            port_type: port_type.map(str::to_string),
            coordinates,
        };
        PortDirectory::from_entries(vec![
            entry(905, "VALPARAISO", Some("PUERTO"), Coordinates::new(-33.0472, -71.6127)),
            entry(906, "SAN ANTONIO", Some("PUERTO"), None),
            entry(907, "TALCAHUANO", Some("PUERTO"), None),
            entry(936, "NATALES", None, None),
        ])
    }

    #[tokio::test]
    async fn test_locate_parses_first_hit() {
        let server = MockServer::start();
        let search = server.mock(|when, then| {
            when.method(GET)
                .path("/search")
                .query_param_exists("q")
                .query_param("format", "json");
            then.status(200)
                .header("Content-Type", "application/json")
                .json_body(serde_json::json!([
                    {"lat": "-33.5922", "lon": "-71.6210", "display_name": "San Antonio"}
                ]));
        });
        let geocoder = NominatimGeocoder::new(fast_settings(server.url("/search"))).unwrap();

        let coordinates = geocoder
            .locate("PUERTO SAN ANTONIO", "CHILE")
            .await
            .unwrap()
            .unwrap();

        search.assert();
        assert_eq!(coordinates.latitude, -33.5922);
        assert_eq!(coordinates.longitude, -71.6210);
    }

    #[tokio::test]
    async fn test_locate_without_hits_is_none() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/search");
            then.status(200).json_body(serde_json::json!([]));
        });
        let geocoder = NominatimGeocoder::new(fast_settings(server.url("/search"))).unwrap();

        assert!(geocoder.locate("NOWHERE", "CHILE").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_locate_retries_timeouts_then_gives_up() {
        let server = MockServer::start();
        let slow = server.mock(|when, then| {
            when.method(GET).path("/search");
            then.status(200)
                .delay(Duration::from_millis(1_000))
                .json_body(serde_json::json!([]));
        });
        let geocoder = NominatimGeocoder::new(fast_settings(server.url("/search"))).unwrap();

        let result = geocoder.locate("PUERTO CORONEL", "CHILE").await;

        assert!(matches!(
            result,
            Err(RerouteError::UpstreamFetch { attempts: 3, .. })
        ));
        slow.assert_hits(3);
    }

    #[tokio::test]
    async fn test_locate_does_not_retry_server_errors() {
        let server = MockServer::start();
        let failing = server.mock(|when, then| {
            when.method(GET).path("/search");
            then.status(503);
        });
        let geocoder = NominatimGeocoder::new(fast_settings(server.url("/search"))).unwrap();

        let result = geocoder.locate("PUERTO CORONEL", "CHILE").await;

        assert!(matches!(
            result,
            Err(RerouteError::UpstreamFetch { attempts: 1, .. })
        ));
        failing.assert_hits(1);
    }

    #[tokio::test]
    async fn test_completer_falls_back_to_name_only_query() {
        let geocoder = TableGeocoder::new(&[("SAN ANTONIO", (-33.5922, -71.6210))]);
        let mut directory = directory();

        let summary = CoordinateCompleter::new(&geocoder)
            .complete(&mut directory, [PortCode::new(905), PortCode::new(906)])
            .await;

        assert_eq!(summary.attempted, 1);
        assert_eq!(summary.resolved, 1);
        assert!(summary.changed());
        assert_eq!(
            *geocoder.queries.lock().unwrap(),
            vec!["PUERTO SAN ANTONIO".to_string(), "SAN ANTONIO".to_string()]
        );
        assert!(directory.get(PortCode::new(906)).unwrap().coordinates.is_some());
    }

    #[tokio::test]
    async fn test_completer_leaves_failures_absent() {
        let geocoder = TableGeocoder::new(&[]).failing_on("PUERTO TALCAHUANO");
        let mut directory = directory();

        let summary = CoordinateCompleter::new(&geocoder)
            .complete(
                &mut directory,
                [PortCode::new(907), PortCode::new(936), PortCode::new(999)],
            )
            .await;

        assert_eq!(summary.attempted, 2);
        assert_eq!(summary.resolved, 0);
        assert_eq!(summary.unresolved, 2);
        assert_eq!(summary.without_directory_entry, 1);
        assert!(directory.get(PortCode::new(907)).unwrap().coordinates.is_none());
        // NATALES has no port type, so only the name query runs.
        assert_eq!(
            *geocoder.queries.lock().unwrap(),
            vec![
                "PUERTO TALCAHUANO".to_string(),
                "TALCAHUANO".to_string(),
                "NATALES".to_string()
            ]
        );
    }
}
