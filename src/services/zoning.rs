//! Protected-area zoning analysis.
//!
//! A study area is compared against regulatory and inventory layers
//! (ZNIEFF, Natura 2000, réserves, parcs). Each zone either intersects the
//! study area or lies within the search radius; anything further out is
//! dropped. Distances are measured from the study centroid to the nearest
//! zone vertex, a deliberate approximation that keeps the scan fast on
//! national layers.
//!
//! All geometry is expected in geographic WGS84 coordinates (EPSG:4326),
//! which is what the WFS fetches request and what consultant GeoJSON
//! exports carry.

use std::cmp::Ordering;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Local};
use geo::{Centroid, CoordsIter, HaversineBearing, HaversineDistance, Intersects};
use geo_types::{Geometry, Point};
use geojson::{FeatureCollection, GeoJson};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::models::catalog::{LayerSource, ZonageLayer};
use crate::services::coords::CoordinateParser;
use crate::services::extent::MapExtent;
use crate::services::geoservices::{GeoClient, WebError};

/// Metres per degree of latitude on the WGS84 sphere.
const METERS_PER_DEGREE_LAT: f64 = 111_320.0;

/// Growth factor applied to the WFS search window so zones whose nearest
/// vertex sits just outside the radius still get fetched and measured.
const BBOX_PADDING: f64 = 1.5;

#[derive(Debug, Error)]
pub enum ZoningError {
    #[error("no study source given")]
    EmptySource,

    #[error("unusable study source: {0}")]
    BadSource(String),

    #[error("study area has no centroid")]
    NoCentroid,

    #[error("unsupported source extension: {0}")]
    UnsupportedExtension(Utf8PathBuf),

    #[error("could not read {path}: {source}")]
    Io {
        path: Utf8PathBuf,
        source: std::io::Error,
    },

    #[error("unreadable shapefile {path}: {source}")]
    Shapefile {
        path: Utf8PathBuf,
        source: shapefile::Error,
    },

    #[error("invalid GeoJSON in {path}: {message}")]
    GeoJson { path: Utf8PathBuf, message: String },

    #[error(transparent)]
    Web(#[from] WebError),
}

/// The surveyed site, as geometry plus a precomputed centroid.
#[derive(Debug, Clone)]
pub struct StudyArea {
    pub geometry: Geometry<f64>,
    pub centroid: Point<f64>,
}

impl StudyArea {
    pub fn from_geometry(geometry: Geometry<f64>) -> Result<Self, ZoningError> {
        let centroid = geometry.centroid().ok_or(ZoningError::NoCentroid)?;
        Ok(Self { geometry, centroid })
    }

    pub fn from_point(point: Point<f64>) -> Self {
        Self {
            geometry: Geometry::Point(point),
            centroid: point,
        }
    }
}

/// One named zone out of a source layer.
#[derive(Debug, Clone)]
pub struct ZoneFeature {
    pub name: String,
    pub geometry: Geometry<f64>,
}

/// How a zone relates to the study area.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ZoneClass {
    /// The zone overlaps the study area itself.
    Intersects,
    /// The zone lies within the search radius. Bearing is degrees from
    /// north, measured from the study centroid towards the zone.
    Near { distance_m: f64, bearing: f64 },
}

#[derive(Debug, Clone)]
pub struct ZoneHit {
    pub name: String,
    pub class: ZoneClass,
}

/// Scan result for one catalog layer.
#[derive(Debug, Clone)]
pub struct LayerFindings {
    pub key: String,
    pub title: String,
    pub category: String,
    /// Hits sorted intersecting first, then by distance.
    pub hits: Vec<ZoneHit>,
    /// Number of zones actually compared, hits and misses together.
    pub scanned: usize,
    /// Set when the layer could not be loaded at all.
    pub error: Option<String>,
}

impl LayerFindings {
    pub fn intersecting(&self) -> usize {
        self.hits
            .iter()
            .filter(|h| h.class == ZoneClass::Intersects)
            .count()
    }

    /// Best hit after sorting, so the intersecting or closest one.
    pub fn nearest(&self) -> Option<&ZoneHit> {
        self.hits.first()
    }
}

/// Full zoning analysis for a study area.
#[derive(Debug, Clone)]
pub struct ZoningReport {
    pub layers: Vec<LayerFindings>,
    pub radius_m: f64,
    pub generated_at: DateTime<Local>,
}

impl ZoningReport {
    pub fn total_hits(&self) -> usize {
        self.layers.iter().map(|l| l.hits.len()).sum()
    }
}

/// Turn the GUI's free-form study source into a [`StudyArea`].
///
/// Accepts a path to a shapefile or GeoJSON file, or a coordinate pair in
/// any form the [`CoordinateParser`] understands.
pub fn resolve_study_source(
    input: &str,
    parser: &CoordinateParser,
) -> Result<StudyArea, ZoningError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(ZoningError::EmptySource);
    }

    let path = Utf8Path::new(input);
    if path.is_file() {
        let features = load_zone_file(path, "NOM")?;
        let collection: geo_types::GeometryCollection<f64> =
            features.into_iter().map(|f| f.geometry).collect();
        if collection.is_empty() {
            return Err(ZoningError::BadSource(format!("{input}: no usable geometry")));
        }
        return StudyArea::from_geometry(Geometry::GeometryCollection(collection));
    }

    let (lat, lon) = parser
        .parse_point(input)
        .map_err(|err| ZoningError::BadSource(err.to_string()))?;
    Ok(StudyArea::from_point(Point::new(lon, lat)))
}

/// Load a file source by extension.
pub fn load_zone_file(path: &Utf8Path, name_field: &str) -> Result<Vec<ZoneFeature>, ZoningError> {
    match path.extension().map(str::to_ascii_lowercase).as_deref() {
        Some("shp") => load_shapefile(path, name_field),
        Some("geojson") | Some("json") => load_geojson(path, name_field),
        _ => Err(ZoningError::UnsupportedExtension(path.to_path_buf())),
    }
}

/// Read a shapefile into zone features, skipping shapes with no geo-types
/// equivalent (null shapes, multipatches).
pub fn load_shapefile(path: &Utf8Path, name_field: &str) -> Result<Vec<ZoneFeature>, ZoningError> {
    let mut reader = shapefile::Reader::from_path(path.as_std_path()).map_err(|source| {
        ZoningError::Shapefile {
            path: path.to_path_buf(),
            source,
        }
    })?;

    let mut features = Vec::new();
    let mut skipped = 0usize;
    for (index, pair) in reader.iter_shapes_and_records().enumerate() {
        let (shape, record) = match pair {
            Ok(pair) => pair,
            Err(err) => {
                debug!(path = %path, index, error = %err, "Unreadable record skipped");
                skipped += 1;
                continue;
            }
        };
        let geometry = match Geometry::<f64>::try_from(shape) {
            Ok(geometry) => geometry,
            Err(err) => {
                debug!(path = %path, index, error = %err, "Unconvertible shape skipped");
                skipped += 1;
                continue;
            }
        };
        features.push(ZoneFeature {
            name: shapefile_name(&record, name_field, index),
            geometry,
        });
    }
    if skipped > 0 {
        warn!(path = %path, skipped, "Some shapefile records were skipped");
    }
    Ok(features)
}

fn shapefile_name(record: &shapefile::dbase::Record, name_field: &str, index: usize) -> String {
    if let Some(shapefile::dbase::FieldValue::Character(Some(name))) = record.get(name_field) {
        let name = name.trim();
        if !name.is_empty() {
            return name.to_string();
        }
    }
    // Fallback: first non-empty text attribute, in stable key order.
    let mut pairs: Vec<(String, shapefile::dbase::FieldValue)> =
        record.clone().into_iter().collect();
    pairs.sort_by(|a, b| a.0.cmp(&b.0));
    for (_, value) in pairs {
        if let shapefile::dbase::FieldValue::Character(Some(name)) = value {
            let name = name.trim();
            if !name.is_empty() {
                return name.to_string();
            }
        }
    }
    format!("Sans nom {}", index + 1)
}

/// Read a GeoJSON FeatureCollection into zone features.
pub fn load_geojson(path: &Utf8Path, name_field: &str) -> Result<Vec<ZoneFeature>, ZoningError> {
    let content = std::fs::read_to_string(path.as_std_path()).map_err(|source| ZoningError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let parsed = content.parse::<GeoJson>().map_err(|err| ZoningError::GeoJson {
        path: path.to_path_buf(),
        message: err.to_string(),
    })?;
    let collection = FeatureCollection::try_from(parsed).map_err(|err| ZoningError::GeoJson {
        path: path.to_path_buf(),
        message: err.to_string(),
    })?;

    Ok(collection
        .features
        .iter()
        .enumerate()
        .filter_map(|(index, feature)| zone_from_geojson(feature, name_field, index))
        .collect())
}

/// Convert one GeoJSON feature, shared between file sources and WFS pages.
pub(crate) fn zone_from_geojson(
    feature: &geojson::Feature,
    name_field: &str,
    index: usize,
) -> Option<ZoneFeature> {
    let geometry = feature.geometry.as_ref()?;
    let geometry = Geometry::<f64>::try_from(geometry.value.clone()).ok()?;
    Some(ZoneFeature {
        name: geojson_name(feature, name_field, index),
        geometry,
    })
}

fn geojson_name(feature: &geojson::Feature, name_field: &str, index: usize) -> String {
    if let Some(props) = &feature.properties {
        if let Some(serde_json::Value::String(name)) = props.get(name_field) {
            let name = name.trim();
            if !name.is_empty() {
                return name.to_string();
            }
        }
        for value in props.values() {
            if let serde_json::Value::String(name) = value {
                let name = name.trim();
                if !name.is_empty() {
                    return name.to_string();
                }
            }
        }
    }
    format!("Sans nom {}", index + 1)
}

/// Compare every feature against the study area.
///
/// Intersecting zones always count. Non-intersecting zones count when their
/// nearest vertex is within `radius_m` of the study centroid. The result is
/// sorted intersecting first, then by increasing distance, ties by name.
pub fn classify(study: &StudyArea, features: &[ZoneFeature], radius_m: f64) -> Vec<ZoneHit> {
    let mut hits = Vec::new();
    for feature in features {
        if study.geometry.intersects(&feature.geometry) {
            hits.push(ZoneHit {
                name: feature.name.clone(),
                class: ZoneClass::Intersects,
            });
            continue;
        }
        if let Some((distance_m, bearing)) = nearest_vertex(study.centroid, &feature.geometry) {
            if distance_m <= radius_m {
                hits.push(ZoneHit {
                    name: feature.name.clone(),
                    class: ZoneClass::Near {
                        distance_m,
                        bearing,
                    },
                });
            }
        }
    }
    hits.sort_by(|a, b| {
        sort_key(a)
            .partial_cmp(&sort_key(b))
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.name.cmp(&b.name))
    });
    hits
}

fn sort_key(hit: &ZoneHit) -> f64 {
    match hit.class {
        ZoneClass::Intersects => -1.0,
        ZoneClass::Near { distance_m, .. } => distance_m,
    }
}

/// Distance and bearing from `from` to the closest vertex of `geometry`.
///
/// Returns `None` for geometry without any vertex.
fn nearest_vertex(from: Point<f64>, geometry: &Geometry<f64>) -> Option<(f64, f64)> {
    let mut best: Option<(f64, Point<f64>)> = None;
    for coord in geometry.coords_iter() {
        let vertex = Point::from(coord);
        let distance = from.haversine_distance(&vertex);
        let closer = match best {
            None => true,
            Some((best_distance, _)) => distance < best_distance,
        };
        if closer {
            best = Some((distance, vertex));
        }
    }
    best.map(|(distance, vertex)| (distance, from.haversine_bearing(vertex).rem_euclid(360.0)))
}

/// Geographic window sent with WFS requests, the radius padded so borderline
/// zones are still fetched.
pub fn search_bbox(study: &StudyArea, radius_m: f64) -> MapExtent {
    let padded = radius_m.max(0.0) * BBOX_PADDING;
    let lat = study.centroid.y();
    let lon = study.centroid.x();
    let dlat = padded / METERS_PER_DEGREE_LAT;
    let dlon = padded / (METERS_PER_DEGREE_LAT * lat.to_radians().cos().abs().max(0.01));
    MapExtent::new(lon - dlon, lat - dlat, lon + dlon, lat + dlat)
}

/// Run the full analysis over the catalog layers.
///
/// Layers fail independently: a dead WFS or a missing file shows up as an
/// errored [`LayerFindings`] instead of aborting the whole scan.
pub async fn run_zoning(
    study: &StudyArea,
    layers: &[ZonageLayer],
    radius_m: f64,
    client: &GeoClient,
) -> ZoningReport {
    let mut findings = Vec::with_capacity(layers.len());
    for layer in layers {
        findings.push(scan_layer(study, layer, radius_m, client).await);
    }
    let report = ZoningReport {
        layers: findings,
        radius_m,
        generated_at: Local::now(),
    };
    info!(
        layers = report.layers.len(),
        hits = report.total_hits(),
        radius_m,
        "Zoning analysis finished"
    );
    report
}

async fn scan_layer(
    study: &StudyArea,
    layer: &ZonageLayer,
    radius_m: f64,
    client: &GeoClient,
) -> LayerFindings {
    let features = match load_layer(study, layer, radius_m, client).await {
        Ok(features) => features,
        Err(err) => {
            warn!(layer = %layer.key, error = %err, "Layer could not be loaded");
            return LayerFindings {
                key: layer.key.clone(),
                title: layer.title.clone(),
                category: layer.category.clone(),
                hits: Vec::new(),
                scanned: 0,
                error: Some(err.to_string()),
            };
        }
    };

    let hits = classify(study, &features, radius_m);
    debug!(layer = %layer.key, scanned = features.len(), hits = hits.len(), "Layer scanned");
    LayerFindings {
        key: layer.key.clone(),
        title: layer.title.clone(),
        category: layer.category.clone(),
        hits,
        scanned: features.len(),
        error: None,
    }
}

async fn load_layer(
    study: &StudyArea,
    layer: &ZonageLayer,
    radius_m: f64,
    client: &GeoClient,
) -> Result<Vec<ZoneFeature>, ZoningError> {
    match &layer.source {
        LayerSource::Shapefile { path } => load_shapefile(path, &layer.name_field),
        LayerSource::GeoJson { path } => load_geojson(path, &layer.name_field),
        LayerSource::Wfs { typename } => {
            let bbox = search_bbox(study, radius_m);
            Ok(client
                .wfs_features(typename, Some(&bbox), &layer.name_field)
                .await?)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::coords;
    use geo::{point, polygon};
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn study_at(lon: f64, lat: f64) -> StudyArea {
        StudyArea::from_point(point!(x: lon, y: lat))
    }

    fn square(lon: f64, lat: f64, half: f64) -> Geometry<f64> {
        Geometry::Polygon(polygon![
            (x: lon - half, y: lat - half),
            (x: lon + half, y: lat - half),
            (x: lon + half, y: lat + half),
            (x: lon - half, y: lat + half),
        ])
    }

    #[test]
    fn test_classify_detects_intersection() {
        let study = study_at(5.0, 45.0);
        let features = vec![ZoneFeature {
            name: "ZNIEFF des Écouges".to_string(),
            geometry: square(5.0, 45.0, 0.01),
        }];

        let hits = classify(&study, &features, 5000.0);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].class, ZoneClass::Intersects);
    }

    #[test]
    fn test_classify_measures_nearby_zone() {
        let study = study_at(5.0, 45.0);
        // Square two kilometres north of the study point.
        let features = vec![ZoneFeature {
            name: "Marais du nord".to_string(),
            geometry: square(5.0, 45.028, 0.01),
        }];

        let hits = classify(&study, &features, 5000.0);
        assert_eq!(hits.len(), 1);
        match hits[0].class {
            ZoneClass::Near { distance_m, bearing } => {
                // Nearest vertices sit at latitude 45.018, about 2 km away.
                assert!(distance_m > 1900.0 && distance_m < 2100.0, "{distance_m}");
                assert_eq!(coords::compass_sector(bearing), "N");
            }
            ZoneClass::Intersects => panic!("should not intersect"),
        }
    }

    #[test]
    fn test_classify_drops_zones_beyond_radius() {
        let study = study_at(5.0, 45.0);
        let features = vec![ZoneFeature {
            name: "Tourbière lointaine".to_string(),
            geometry: square(5.0, 45.2, 0.01),
        }];

        assert!(classify(&study, &features, 5000.0).is_empty());
    }

    #[test]
    fn test_hits_sorted_intersecting_first_then_distance() {
        let study = study_at(5.0, 45.0);
        let features = vec![
            ZoneFeature {
                name: "Zone à 4 km".to_string(),
                geometry: square(5.0, 45.046, 0.01),
            },
            ZoneFeature {
                name: "Zone à 2 km".to_string(),
                geometry: square(5.0, 45.028, 0.01),
            },
            ZoneFeature {
                name: "Zone traversée".to_string(),
                geometry: square(5.0, 45.0, 0.01),
            },
        ];

        let hits = classify(&study, &features, 10_000.0);
        let names: Vec<&str> = hits.iter().map(|h| h.name.as_str()).collect();
        assert_eq!(names, vec!["Zone traversée", "Zone à 2 km", "Zone à 4 km"]);
    }

    #[test]
    fn test_load_geojson_reads_names_and_geometry() {
        let mut file = NamedTempFile::with_suffix(".geojson").unwrap();
        write!(
            file,
            r#"{{"type":"FeatureCollection","features":[
                {{"type":"Feature","properties":{{"NOM":"ZNIEFF du Vercors"}},
                 "geometry":{{"type":"Polygon","coordinates":[[[5.0,45.0],[5.1,45.0],[5.1,45.1],[5.0,45.1],[5.0,45.0]]]}}}},
                {{"type":"Feature","properties":{{"LIB":"Réserve des Hauts Plateaux"}},
                 "geometry":{{"type":"Point","coordinates":[5.2,45.2]}}}}
            ]}}"#
        )
        .unwrap();
        file.flush().unwrap();

        let path = Utf8PathBuf::from_path_buf(file.path().to_path_buf()).unwrap();
        let features = load_geojson(&path, "NOM").unwrap();
        assert_eq!(features.len(), 2);
        assert_eq!(features[0].name, "ZNIEFF du Vercors");
        // Missing name field falls back to the first text property.
        assert_eq!(features[1].name, "Réserve des Hauts Plateaux");
        assert!(matches!(features[0].geometry, Geometry::Polygon(_)));
    }

    #[test]
    fn test_resolve_study_source_parses_coordinates() {
        let parser = CoordinateParser::new();
        let study = resolve_study_source("45.174, 5.426", &parser).unwrap();
        assert!((study.centroid.y() - 45.174).abs() < 1e-9);
        assert!((study.centroid.x() - 5.426).abs() < 1e-9);
    }

    #[test]
    fn test_resolve_study_source_rejects_garbage() {
        let parser = CoordinateParser::new();
        assert!(matches!(
            resolve_study_source("pas des coordonnées", &parser),
            Err(ZoningError::BadSource(_))
        ));
        assert!(matches!(
            resolve_study_source("  ", &parser),
            Err(ZoningError::EmptySource)
        ));
    }

    #[test]
    fn test_search_bbox_covers_padded_radius() {
        let study = study_at(5.0, 45.0);
        let bbox = search_bbox(&study, 5000.0);

        assert!(bbox.min_x < 5.0 && bbox.max_x > 5.0);
        assert!(bbox.min_y < 45.0 && bbox.max_y > 45.0);
        // 7.5 km of latitude is about 0.067 degrees.
        assert!((bbox.max_y - 45.0 - 0.0674).abs() < 0.001);
        // Longitude widens with latitude.
        assert!(bbox.max_x - 5.0 > bbox.max_y - 45.0);
    }
}
