// src/nearby.rs
//
// Best-effort environmental hint near a coordinate ("Near: Central
// Station"). The lookup is an external collaborator: it may be disabled,
// slow, or failing, and none of that is allowed to affect detection.

use std::future::Future;
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use crate::types::NearbyConfig;

pub trait NearbyLookup {
    /// Resolve a human-readable hint for the surroundings, or None when
    /// nothing relevant is nearby or the lookup cannot be performed.
    fn find_nearby(
        &self,
        lat: f64,
        lng: f64,
        radius_m: f64,
        categories: &[String],
    ) -> impl Future<Output = Option<String>> + Send;
}

/// Lookup for hosts without a places backend. Always resolves to None.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopLookup;

impl NearbyLookup for NoopLookup {
    async fn find_nearby(
        &self,
        _lat: f64,
        _lng: f64,
        _radius_m: f64,
        _categories: &[String],
    ) -> Option<String> {
        None
    }
}

#[derive(Debug, Deserialize)]
struct NearbySearchResponse {
    #[serde(default)]
    results: Vec<NearbyPlace>,
}

#[derive(Debug, Deserialize)]
struct NearbyPlace {
    name: String,
}

/// Nearby-search client against a places HTTP API.
#[derive(Clone)]
pub struct PlacesClient {
    http_client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl PlacesClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let http_client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http_client,
            base_url: base_url.into(),
            api_key,
        })
    }

    /// Build a client from config, or None when the lookup is disabled.
    pub fn from_config(config: &NearbyConfig) -> anyhow::Result<Option<Self>> {
        if !config.enabled {
            return Ok(None);
        }
        let api_key = std::env::var(&config.api_key_env).ok();
        let client = Self::new(
            config.base_url.clone(),
            api_key,
            Duration::from_secs_f64(config.timeout_seconds),
        )?;
        Ok(Some(client))
    }
}

impl NearbyLookup for PlacesClient {
    async fn find_nearby(
        &self,
        lat: f64,
        lng: f64,
        radius_m: f64,
        categories: &[String],
    ) -> Option<String> {
        let url = format!("{}/nearbysearch/json", self.base_url);
        let mut request = self.http_client.get(&url).query(&[
            ("location", format!("{lat},{lng}")),
            ("radius", format!("{radius_m:.0}")),
            ("type", categories.join("|")),
        ]);
        if let Some(key) = &self.api_key {
            request = request.query(&[("key", key)]);
        }

        let response = match request.send().await {
            Ok(r) => r,
            Err(e) => {
                warn!("nearby lookup request failed: {}", e);
                return None;
            }
        };

        let parsed: NearbySearchResponse = match response.json().await {
            Ok(p) => p,
            Err(e) => {
                warn!("nearby lookup returned malformed payload: {}", e);
                return None;
            }
        };

        parsed
            .results
            .first()
            .map(|place| format!("Near: {}", place.name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_noop_lookup_resolves_none() {
        let hint = NoopLookup
            .find_nearby(52.0, 21.0, 250.0, &["transit_station".to_string()])
            .await;
        assert!(hint.is_none());
    }

    #[test]
    fn test_disabled_config_yields_no_client() {
        let config = NearbyConfig {
            enabled: false,
            ..NearbyConfig::default()
        };
        assert!(PlacesClient::from_config(&config).unwrap().is_none());
    }

    #[test]
    fn test_response_parsing_takes_first_result() {
        let payload = r#"{"results":[{"name":"Centralna"},{"name":"Other"}]}"#;
        let parsed: NearbySearchResponse = serde_json::from_str(payload).unwrap();
        assert_eq!(parsed.results[0].name, "Centralna");
    }

    #[test]
    fn test_response_parsing_tolerates_empty_payload() {
        let parsed: NearbySearchResponse = serde_json::from_str("{}").unwrap();
        assert!(parsed.results.is_empty());
    }
}
