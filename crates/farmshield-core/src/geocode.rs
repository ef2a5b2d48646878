//! Reverse and forward geocoding against a Nominatim-compatible service.

use crate::config::FarmConfig;
use crate::context::{Coordinates, Place, ReverseGeocoder};
use crate::error::{FarmError, FarmResult};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

/// Address keys tried in order for the locality part of the label.
const LOCALITY_KEYS: [&str; 6] = ["village", "town", "city", "hamlet", "suburb", "county"];

#[derive(Debug, Deserialize)]
struct ReverseResponse {
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    address: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    lat: String,
    lon: String,
    display_name: String,
}

/// A place found by name, for manual location entry.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchMatch {
    pub name: String,
    pub coordinates: Coordinates,
}

pub struct NominatimGeocoder {
    base_url: String,
    client: reqwest::Client,
}

impl NominatimGeocoder {
    pub fn new(config: &FarmConfig) -> FarmResult<Self> {
        let mut builder = reqwest::Client::builder().user_agent(config.user_agent.clone());
        if let Some(timeout) = config.request_timeout() {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| FarmError::Config(format!("geocoder client: {}", e)))?;
        Ok(Self {
            base_url: config.geocoder_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    /// First match for a free-text place name, or `None` when nothing matches.
    pub async fn search(&self, query: &str) -> FarmResult<Option<SearchMatch>> {
        debug!(target: "farmshield::geocode", query, "forward geocode");
        let hits: Vec<SearchHit> = self
            .client
            .get(format!("{}/search", self.base_url))
            .query(&[("format", "json"), ("q", query)])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .map_err(|e| FarmError::IncompleteResponse(format!("search: {}", e)))?;
        first_match(hits)
    }
}

#[async_trait]
impl ReverseGeocoder for NominatimGeocoder {
    async fn reverse(&self, coordinates: Coordinates) -> FarmResult<Place> {
        debug!(
            target: "farmshield::geocode",
            lat = coordinates.latitude,
            lon = coordinates.longitude,
            "reverse geocode"
        );
        let lat = coordinates.latitude.to_string();
        let lon = coordinates.longitude.to_string();
        let body: ReverseResponse = self
            .client
            .get(format!("{}/reverse", self.base_url))
            .query(&[("format", "json"), ("lat", lat.as_str()), ("lon", lon.as_str())])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .map_err(|e| FarmError::IncompleteResponse(format!("reverse: {}", e)))?;
        place_from(body)
    }
}

fn place_from(body: ReverseResponse) -> FarmResult<Place> {
    if let Some(err) = body.error {
        return Err(FarmError::Network(format!("reverse: {}", err)));
    }
    let field = |key: &str| {
        body.address
            .get(key)
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };
    let locality = LOCALITY_KEYS.iter().find_map(|k| field(*k));
    let region = field("state");

    let name = match (&locality, &region) {
        (Some(l), Some(r)) => format!("{}, {}", l, r),
        (Some(l), None) => l.clone(),
        (None, Some(r)) => r.clone(),
        (None, None) => body
            .display_name
            .as_deref()
            .and_then(|d| d.split(',').next())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .ok_or_else(|| FarmError::IncompleteResponse("reverse: no address".into()))?,
    };
    Ok(Place { name, region })
}

fn first_match(hits: Vec<SearchHit>) -> FarmResult<Option<SearchMatch>> {
    let Some(hit) = hits.into_iter().next() else {
        return Ok(None);
    };
    let parse = |raw: &str| {
        raw.trim()
            .parse::<f64>()
            .map_err(|e| FarmError::IncompleteResponse(format!("search: bad coordinate {:?}: {}", raw, e)))
    };
    let coordinates = Coordinates::new(parse(&hit.lat)?, parse(&hit.lon)?);
    let name = hit
        .display_name
        .split(',')
        .next()
        .unwrap_or_default()
        .trim()
        .to_string();
    Ok(Some(SearchMatch { name, coordinates }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reverse(json: &str) -> ReverseResponse {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn label_is_locality_and_state() {
        let place = place_from(reverse(
            r#"{"display_name":"Kothri Kalan, Ashta, Sehore, Madhya Pradesh, India",
                "address":{"village":"Kothri Kalan","county":"Ashta","state":"Madhya Pradesh","country":"India"}}"#,
        ))
        .unwrap();
        assert_eq!(place.name, "Kothri Kalan, Madhya Pradesh");
        assert_eq!(place.region.as_deref(), Some("Madhya Pradesh"));
    }

    #[test]
    fn falls_back_to_display_name() {
        let place = place_from(reverse(r#"{"display_name":"Arabian Sea","address":{}}"#)).unwrap();
        assert_eq!(place.name, "Arabian Sea");
        assert!(place.region.is_none());
    }

    #[test]
    fn service_error_and_empty_address() {
        assert!(matches!(
            place_from(reverse(r#"{"error":"Unable to geocode"}"#)),
            Err(FarmError::Network(_))
        ));
        assert!(matches!(
            place_from(reverse(r#"{}"#)),
            Err(FarmError::IncompleteResponse(_))
        ));
    }

    #[test]
    fn search_takes_first_hit_and_first_segment() {
        let hits: Vec<SearchHit> = serde_json::from_str(
            r#"[{"lat":"22.7196","lon":"75.8577","display_name":"Indore, Indore Tahsil, Madhya Pradesh, India"},
                {"lat":"0","lon":"0","display_name":"Elsewhere"}]"#,
        )
        .unwrap();
        let found = first_match(hits).unwrap().unwrap();
        assert_eq!(found.name, "Indore");
        assert!((found.coordinates.latitude - 22.7196).abs() < 1e-9);
        assert_eq!(first_match(Vec::new()).unwrap(), None);
    }
}
