//! Reverse geocoding with a small coordinate-keyed cache.

use anyhow::{Context, Result};
use reqwest::Url;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::cache::BoundedCache;
use crate::config::{GeocoderConfig, LOCATION_CACHE_CAPACITY};
use crate::metadata::Coordinates;

/// Coordinates rounded to three decimals (roughly 100 m), so nearby shots
/// share one lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CoordinateKey {
    lat_milli: i64,
    lng_milli: i64,
}

impl CoordinateKey {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self {
            lat_milli: (lat * 1000.0).round() as i64,
            lng_milli: (lng * 1000.0).round() as i64,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ReverseResponse {
    #[serde(default)]
    address: Option<Address>,
}

#[derive(Debug, Default, Deserialize)]
struct Address {
    city: Option<String>,
    town: Option<String>,
    village: Option<String>,
    state: Option<String>,
    country: Option<String>,
}

impl Address {
    /// `"<city|town|village>, <state>, <country>"` with missing parts skipped.
    fn place_name(&self) -> Option<String> {
        let settlement = [&self.city, &self.town, &self.village]
            .into_iter()
            .find_map(|part| non_blank(part));
        let parts: Vec<&str> = [settlement, non_blank(&self.state), non_blank(&self.country)]
            .into_iter()
            .flatten()
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join(", "))
        }
    }
}

fn non_blank(part: &Option<String>) -> Option<&str> {
    part.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

#[derive(Debug)]
pub struct Geocoder {
    client: Option<reqwest::Client>,
    endpoint: Url,
    cache: BoundedCache<CoordinateKey, String>,
}

impl Geocoder {
    pub fn new(cfg: &GeocoderConfig) -> Result<Self> {
        let endpoint = Url::parse(&cfg.endpoint)
            .with_context(|| format!("invalid geocoder endpoint {:?}", cfg.endpoint))?;
        let client = if cfg.enabled {
            Some(
                reqwest::Client::builder()
                    .timeout(cfg.timeout)
                    .user_agent(cfg.user_agent.clone())
                    .build()
                    .context("failed to build geocoder HTTP client")?,
            )
        } else {
            None
        };
        Ok(Self {
            client,
            endpoint,
            cache: BoundedCache::new(LOCATION_CACHE_CAPACITY),
        })
    }

    /// Place name for the given position.
    ///
    /// Never fails: network errors, timeouts, unparseable bodies and answers
    /// without any address part all yield `"lat, lng"` with four decimals.
    /// Only real place names are cached.
    pub async fn reverse_geocode(&mut self, lat: f64, lng: f64) -> String {
        let fallback = Coordinates { lat, lng }.to_string();
        let key = CoordinateKey::new(lat, lng);
        if let Some(hit) = self.cache.get(&key) {
            debug!(lat, lng, location = %hit, "location cache hit");
            return hit.clone();
        }
        let Some(client) = &self.client else {
            return fallback;
        };

        match lookup(client, &self.endpoint, lat, lng).await {
            Ok(Some(name)) => {
                debug!(lat, lng, location = %name, "reverse geocoded");
                self.cache.put(key, name.clone());
                name
            }
            Ok(None) => {
                debug!(lat, lng, "geocoder returned no address");
                fallback
            }
            Err(err) => {
                warn!(lat, lng, "reverse geocoding failed: {err:#}");
                fallback
            }
        }
    }

    pub fn cached_locations(&self) -> usize {
        self.cache.len()
    }
}

async fn lookup(client: &reqwest::Client, endpoint: &Url, lat: f64, lng: f64) -> Result<Option<String>> {
    let response = client
        .get(endpoint.clone())
        .query(&[
            ("format", "json".to_string()),
            ("lat", lat.to_string()),
            ("lon", lng.to_string()),
            ("zoom", "10".to_string()),
            ("addressdetails", "1".to_string()),
        ])
        .send()
        .await
        .context("geocoder request failed")?
        .error_for_status()
        .context("geocoder returned an error status")?;
    let body: ReverseResponse = response
        .json()
        .await
        .context("geocoder response was not the expected JSON")?;
    Ok(body.address.and_then(|address| address.place_name()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn address(json: &str) -> Address {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn prefers_city_then_town_then_village() {
        let a = address(r#"{"town":"Hallstatt","village":"Lahn","state":"Upper Austria","country":"Austria"}"#);
        assert_eq!(a.place_name().as_deref(), Some("Hallstatt, Upper Austria, Austria"));
        let a = address(r#"{"city":"Lyon","town":"x","country":"France"}"#);
        assert_eq!(a.place_name().as_deref(), Some("Lyon, France"));
        let a = address(r#"{"village":"Giethoorn"}"#);
        assert_eq!(a.place_name().as_deref(), Some("Giethoorn"));
    }

    #[test]
    fn empty_address_has_no_name() {
        assert_eq!(address("{}").place_name(), None);
        assert_eq!(address(r#"{"city":"  "}"#).place_name(), None);
    }

    #[test]
    fn nearby_points_share_a_key() {
        assert_eq!(CoordinateKey::new(48.85661, 2.35222), CoordinateKey::new(48.85690, 2.35179));
        assert_ne!(CoordinateKey::new(48.8566, 2.3522), CoordinateKey::new(48.8576, 2.3522));
        assert_eq!(CoordinateKey::new(-0.0004, 0.0), CoordinateKey::new(0.0, 0.0));
    }

    #[tokio::test]
    async fn disabled_geocoder_formats_coordinates() {
        let cfg = GeocoderConfig {
            enabled: false,
            ..GeocoderConfig::default()
        };
        let mut geocoder = Geocoder::new(&cfg).unwrap();
        assert_eq!(geocoder.reverse_geocode(1.5, -2.25).await, "1.5000, -2.2500");
        assert_eq!(geocoder.cached_locations(), 0);
    }
}
