//! HTTP clients for the public geodata services.
//!
//! One [`GeoClient`] wraps a shared `reqwest` client with the catalog's
//! endpoints: PlantNet species identification, the BAN reverse geocoder,
//! the Géoplateforme elevation service and its WFS for zoning layers.
//! Calls are plain one-shot requests with the configured timeout, no
//! retries.

use std::time::Duration;

use geojson::FeatureCollection;
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::models::catalog::ServiceEndpoints;
use crate::services::extent::MapExtent;
use crate::services::zoning::{self, ZoneFeature};

/// GetFeature page size. The Géoplateforme caps pages at 1000 features.
const WFS_PAGE_SIZE: usize = 1000;

#[derive(Debug, Error)]
pub enum WebError {
    #[error("HTTP client could not be created: {0}")]
    Client(String),

    #[error("invalid service URL {url}: {message}")]
    InvalidUrl { url: String, message: String },

    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        source: reqwest::Error,
    },

    #[error("{url} answered HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("rate limited by {url}")]
    RateLimited { url: String },

    #[error("unusable answer from {url}: {message}")]
    Parse { url: String, message: String },
}

/// Postal address candidate from the reverse geocoder.
#[derive(Debug, Clone, Deserialize)]
pub struct Address {
    pub label: String,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub postcode: Option<String>,
    /// Department and region, e.g. "38, Isère, Auvergne-Rhône-Alpes".
    #[serde(default)]
    pub context: Option<String>,
}

#[derive(Deserialize)]
struct BanResponse {
    #[serde(default)]
    features: Vec<BanFeature>,
}

#[derive(Deserialize)]
struct BanFeature {
    properties: Address,
}

#[derive(Deserialize)]
struct ElevationResponse {
    #[serde(default)]
    elevations: Vec<ElevationPoint>,
}

#[derive(Deserialize)]
struct ElevationPoint {
    z: f64,
}

/// One candidate from the species identification service.
#[derive(Debug, Clone)]
pub struct SpeciesMatch {
    pub score: f64,
    pub scientific_name: String,
    pub common_names: Vec<String>,
}

#[derive(Deserialize)]
struct PlantNetResponse {
    #[serde(default)]
    results: Vec<PlantNetResult>,
}

#[derive(Deserialize)]
struct PlantNetResult {
    score: f64,
    species: PlantNetSpecies,
}

#[derive(Deserialize)]
struct PlantNetSpecies {
    #[serde(rename = "scientificNameWithoutAuthor")]
    scientific_name: String,
    #[serde(default, rename = "commonNames")]
    common_names: Vec<String>,
}

pub struct GeoClient {
    http: Client,
    cfg: ServiceEndpoints,
}

impl GeoClient {
    pub fn new(cfg: ServiceEndpoints) -> Result<Self, WebError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .user_agent(concat!("zonatlas/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| WebError::Client(err.to_string()))?;
        Ok(Self { http, cfg })
    }

    /// Nearest postal address, if the geocoder knows one.
    pub async fn reverse_geocode(&self, lat: f64, lon: f64) -> Result<Option<Address>, WebError> {
        let url = build_url(
            &self.cfg.reverse_geocode,
            &[("lon", lon.to_string()), ("lat", lat.to_string())],
        )?;
        let parsed: BanResponse = self.get_json(url).await?;
        Ok(parsed.features.into_iter().next().map(|f| f.properties))
    }

    /// Ground elevation in metres, when the national model covers the point.
    pub async fn elevation(&self, lat: f64, lon: f64) -> Result<Option<f64>, WebError> {
        let url = build_url(
            &self.cfg.elevation,
            &[
                ("lon", lon.to_string()),
                ("lat", lat.to_string()),
                ("resource", "ign_rge_alti_wld".to_string()),
            ],
        )?;
        let parsed: ElevationResponse = self.get_json(url).await?;
        // The service answers -99999 outside model coverage.
        Ok(parsed
            .elevations
            .first()
            .map(|p| p.z)
            .filter(|z| *z > -1000.0))
    }

    /// Identify a species from a photo, best match first.
    pub async fn identify_species(
        &self,
        image: Vec<u8>,
        file_name: &str,
        organ: &str,
        api_key: &str,
    ) -> Result<Vec<SpeciesMatch>, WebError> {
        let url = build_url(&self.cfg.species_api, &[("api-key", api_key.to_string())])?;
        let part = reqwest::multipart::Part::bytes(image)
            .file_name(file_name.to_string())
            .mime_str("image/jpeg")
            .map_err(|source| WebError::Request {
                url: url.to_string(),
                source,
            })?;
        let form = reqwest::multipart::Form::new()
            .part("images", part)
            .text("organs", organ.to_string());

        debug!(url = %url, "POST multipart");
        crate::metrics::global().record_http_request();
        let response = self
            .http
            .post(url.clone())
            .multipart(form)
            .send()
            .await
            .map_err(|source| WebError::Request {
                url: url.to_string(),
                source,
            })?;
        let response = expect_ok(&url, response)?;
        let parsed: PlantNetResponse =
            response.json().await.map_err(|err| WebError::Parse {
                url: url.to_string(),
                message: err.to_string(),
            })?;
        Ok(parsed
            .results
            .into_iter()
            .map(|r| SpeciesMatch {
                score: r.score,
                scientific_name: r.species.scientific_name,
                common_names: r.species.common_names,
            })
            .collect())
    }

    /// Fetch a WFS layer page by page until a short page ends it.
    pub async fn wfs_features(
        &self,
        type_name: &str,
        bbox: Option<&MapExtent>,
        name_field: &str,
    ) -> Result<Vec<ZoneFeature>, WebError> {
        let mut features = Vec::new();
        let mut start_index = 0usize;
        loop {
            let mut params = vec![
                ("service", "WFS".to_string()),
                ("version", "2.0.0".to_string()),
                ("request", "GetFeature".to_string()),
                ("typenames", type_name.to_string()),
                ("outputFormat", "application/json".to_string()),
                ("srsName", "EPSG:4326".to_string()),
                ("count", WFS_PAGE_SIZE.to_string()),
                ("startIndex", start_index.to_string()),
            ];
            if let Some(extent) = bbox {
                params.push(("bbox", format_bbox(extent)));
            }

            let url = build_url(&self.cfg.wfs, &params)?;
            let page: FeatureCollection = self.get_json(url).await?;
            let page_len = page.features.len();
            for (offset, feature) in page.features.iter().enumerate() {
                if let Some(zone) =
                    zoning::zone_from_geojson(feature, name_field, start_index + offset)
                {
                    features.push(zone);
                }
            }

            if page_len < WFS_PAGE_SIZE {
                break;
            }
            start_index += page_len;
        }
        debug!(type_name, features = features.len(), "WFS layer fetched");
        Ok(features)
    }

    /// Download a page body as text.
    pub async fn fetch_text(&self, url: Url) -> Result<String, WebError> {
        debug!(url = %url, "GET text");
        crate::metrics::global().record_http_request();
        let response = self
            .http
            .get(url.clone())
            .send()
            .await
            .map_err(|source| WebError::Request {
                url: url.to_string(),
                source,
            })?;
        let response = expect_ok(&url, response)?;
        response.text().await.map_err(|err| WebError::Parse {
            url: url.to_string(),
            message: err.to_string(),
        })
    }

    pub fn endpoints(&self) -> &ServiceEndpoints {
        &self.cfg
    }

    pub(crate) async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: Url,
    ) -> Result<T, WebError> {
        debug!(url = %url, "GET");
        crate::metrics::global().record_http_request();
        let response = self
            .http
            .get(url.clone())
            .send()
            .await
            .map_err(|source| WebError::Request {
                url: url.to_string(),
                source,
            })?;
        let response = expect_ok(&url, response)?;
        response.json::<T>().await.map_err(|err| WebError::Parse {
            url: url.to_string(),
            message: err.to_string(),
        })
    }
}

fn expect_ok(url: &Url, response: reqwest::Response) -> Result<reqwest::Response, WebError> {
    let status = response.status();
    if status.as_u16() == 429 {
        return Err(WebError::RateLimited {
            url: url.to_string(),
        });
    }
    if !status.is_success() {
        return Err(WebError::Status {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }
    Ok(response)
}

fn build_url(base: &str, params: &[(&str, String)]) -> Result<Url, WebError> {
    Url::parse_with_params(base, params.iter().map(|(k, v)| (*k, v.as_str()))).map_err(|err| {
        WebError::InvalidUrl {
            url: base.to_string(),
            message: err.to_string(),
        }
    })
}

/// WFS 2.0 bbox with EPSG:4326 axis order, latitude first.
fn format_bbox(extent: &MapExtent) -> String {
    format!(
        "{},{},{},{},EPSG:4326",
        extent.min_y, extent.min_x, extent.max_y, extent.max_x
    )
}
