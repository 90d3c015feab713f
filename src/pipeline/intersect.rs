use crate::error::{Result, PrepError};
use geo::{BooleanOps, Coord, Geometry, MapCoordsInPlace, MultiPolygon};
use geojson::{Feature, FeatureCollection, GeoJson, JsonObject};
use proj4rs::proj::Proj;
use std::cell::Cell;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use tracing::{info, warn};

/// Output coordinates are rounded to 6 decimal places, about 0.1 m at the
/// equator.
const COORD_SCALE: f64 = 1e6;

const WGS84: u32 = 4326;

pub struct IntersectSummary {
    pub features_written: usize,
    pub skipped_features: usize,
}

fn load_collection(path: &Path) -> Result<FeatureCollection> {
    let content = std::fs::read_to_string(path)?;
    let geojson: GeoJson = content
        .parse()
        .map_err(|e: geojson::Error| PrepError::Geometry(format!("{}: {}", path.display(), e)))?;
    match geojson {
        GeoJson::FeatureCollection(collection) => Ok(collection),
        _ => Err(PrepError::Geometry(format!(
            "{}: expected a FeatureCollection",
            path.display()
        ))),
    }
}

/// EPSG code out of the legacy `crs` member StatCan boundary files carry.
/// Absent or WGS84-equivalent names read as 4326.
fn epsg_code(collection: &FeatureCollection) -> u32 {
    collection
        .foreign_members
        .as_ref()
        .and_then(|members| members.get("crs"))
        .and_then(|crs| crs.get("properties"))
        .and_then(|properties| properties.get("name"))
        .and_then(|name| name.as_str())
        .and_then(parse_crs_name)
        .unwrap_or(WGS84)
}

fn parse_crs_name(name: &str) -> Option<u32> {
    // "urn:ogc:def:crs:OGC:1.3:CRS84" is axis-swapped WGS84
    if name.contains("CRS84") {
        return Some(WGS84);
    }
    // "urn:ogc:def:crs:EPSG::3347" or "EPSG:3347"
    name.rsplit(':').find(|part| !part.is_empty())?.parse().ok()
}

/// proj4 definitions for the CRS the boundary files come in.
fn proj_definition(code: u32) -> Result<&'static str> {
    match code {
        // WGS84 geographic
        4326 => Ok("+proj=longlat +datum=WGS84 +no_defs"),
        // NAD83(CSRS) geographic
        4617 => Ok("+proj=longlat +ellps=GRS80 +towgs84=0,0,0 +no_defs"),
        // Statistics Canada Lambert
        3347 => Ok(
            "+proj=lcc +lat_1=49 +lat_2=77 +lat_0=63.390675 +lon_0=-91.866667 \
             +x_0=6200000 +y_0=3000000 +ellps=GRS80 +towgs84=0,0,0 +units=m +no_defs",
        ),
        // Web Mercator
        3857 => Ok(
            "+proj=merc +a=6378137 +b=6378137 +lat_ts=0 +lon_0=0 +x_0=0 +y_0=0 \
             +k=1 +units=m +nadgrids=@null +no_defs",
        ),
        other => Err(PrepError::Geometry(format!("unsupported EPSG code: {other}"))),
    }
}

fn is_geographic(code: u32) -> bool {
    matches!(code, 4326 | 4617)
}

/// Reprojects every coordinate in place. Geographic CRS are degree-valued at
/// this layer; proj4rs works in radians.
fn reproject(geometry: &mut MultiPolygon<f64>, from_code: u32, to_code: u32) -> Result<()> {
    if from_code == to_code {
        return Ok(());
    }
    let from = Proj::from_proj_string(proj_definition(from_code)?)?;
    let to = Proj::from_proj_string(proj_definition(to_code)?)?;

    let failed = Cell::new(false);
    geometry.map_coords_in_place(|coord| {
        let mut point = if is_geographic(from_code) {
            (coord.x.to_radians(), coord.y.to_radians(), 0.0)
        } else {
            (coord.x, coord.y, 0.0)
        };
        if proj4rs::transform::transform(&from, &to, &mut point).is_err() {
            failed.set(true);
            return coord;
        }
        if is_geographic(to_code) {
            Coord { x: point.0.to_degrees(), y: point.1.to_degrees() }
        } else {
            Coord { x: point.0, y: point.1 }
        }
    });

    if failed.get() {
        return Err(PrepError::Geometry(format!(
            "reprojection EPSG:{from_code} -> EPSG:{to_code} failed"
        )));
    }
    Ok(())
}

fn round_coords(geometry: &mut MultiPolygon<f64>) {
    geometry.map_coords_in_place(|coord| Coord {
        x: (coord.x * COORD_SCALE).round() / COORD_SCALE,
        y: (coord.y * COORD_SCALE).round() / COORD_SCALE,
    });
}

/// Areal geometry of a feature. Points, lines and missing geometries have no
/// overlay to contribute and read as `None`.
fn as_multi_polygon(feature: &Feature) -> Option<MultiPolygon<f64>> {
    let geometry = feature.geometry.as_ref()?;
    match Geometry::<f64>::try_from(geometry).ok()? {
        Geometry::Polygon(polygon) => Some(MultiPolygon(vec![polygon])),
        Geometry::MultiPolygon(multi) => Some(multi),
        _ => None,
    }
}

fn merged_properties(first: Option<&JsonObject>, second: Option<&JsonObject>) -> Option<JsonObject> {
    let mut merged = first.cloned().unwrap_or_default();
    if let Some(second) = second {
        merged.extend(second.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
    if merged.is_empty() {
        None
    } else {
        Some(merged)
    }
}

fn areal_features(collection: &FeatureCollection) -> (Vec<(MultiPolygon<f64>, Option<&JsonObject>)>, usize) {
    let mut polygons = Vec::new();
    let mut skipped = 0;
    for feature in &collection.features {
        match as_multi_polygon(feature) {
            Some(multi) => polygons.push((multi, feature.properties.as_ref())),
            None => skipped += 1,
        }
    }
    (polygons, skipped)
}

/// Overlays two boundary files and writes the intersection.
///
/// The first file is reprojected into the second file's CRS before the
/// overlay, mirroring how the boundary extracts arrive (projected areas
/// against an already-cleaned WGS84 layer). Every output feature carries
/// the merged properties of both parents, the second file's winning on
/// collision.
pub fn intersect_files(areas_path: &Path, overlay_path: &Path, output: &Path) -> Result<IntersectSummary> {
    info!(
        areas = %areas_path.display(),
        overlay = %overlay_path.display(),
        "loading boundary files"
    );
    let areas = load_collection(areas_path)?;
    let overlay = load_collection(overlay_path)?;

    let from_code = epsg_code(&areas);
    let to_code = epsg_code(&overlay);
    info!(from = from_code, to = to_code, "reprojecting areas layer");

    let (mut area_polygons, skipped_areas) = areal_features(&areas);
    let (overlay_polygons, skipped_overlay) = areal_features(&overlay);
    let skipped_features = skipped_areas + skipped_overlay;
    if skipped_features > 0 {
        warn!(count = skipped_features, "skipped non-areal features");
    }

    for (polygon, _) in &mut area_polygons {
        reproject(polygon, from_code, to_code)?;
    }

    info!(
        areas = area_polygons.len(),
        overlay = overlay_polygons.len(),
        "computing intersection"
    );
    let mut features = Vec::new();
    for (area, area_props) in &area_polygons {
        for (other, other_props) in &overlay_polygons {
            let mut clipped = area.intersection(other);
            if clipped.0.is_empty() {
                continue;
            }
            round_coords(&mut clipped);
            features.push(Feature {
                bbox: None,
                geometry: Some(geojson::Geometry::new(geojson::Value::from(&clipped))),
                id: None,
                properties: merged_properties(*area_props, *other_props),
                foreign_members: None,
            });
        }
    }

    let features_written = features.len();
    let collection = FeatureCollection { bbox: None, features, foreign_members: None };
    if let Some(parent) = output.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let writer = BufWriter::new(File::create(output)?);
    serde_json::to_writer(writer, &collection)?;

    info!(
        features = features_written,
        output = %output.display(),
        "intersection written"
    );
    Ok(IntersectSummary { features_written, skipped_features })
}
