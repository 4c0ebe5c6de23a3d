use crate::config::InputConfig;
use crate::error::MapError;
use crate::processing::GeometrySet;
use crate::types::{RegionGeometry, ValueRecord};
use anyhow::{anyhow, Context, Result};
use csv::{ReaderBuilder, StringRecord};
use geo::MultiPolygon;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use tracing::{debug, info};

/// Column layout of the value table.
#[derive(Debug, Clone)]
pub struct TableColumns<'a> {
    pub node: &'a str,
    pub value: &'a str,
    pub legacy_value: Option<&'a str>,
}

impl<'a> From<&'a InputConfig> for TableColumns<'a> {
    fn from(input: &'a InputConfig) -> Self {
        Self {
            node: &input.node_column,
            value: &input.value_column,
            legacy_value: input.legacy_value_column.as_deref(),
        }
    }
}

/// Reads the space-delimited value table at `path`.
pub fn load_values(path: &Path, columns: &TableColumns<'_>) -> Result<Vec<ValueRecord>> {
    info!("Loading values from {:?}", path);
    let file = File::open(path)
        .with_context(|| format!("Failed to open value table: {:?}", path))?;
    let records = read_values(file, path, columns)?;
    info!("Loaded {} value records", records.len());
    Ok(records)
}

fn read_values<R: Read>(
    reader: R,
    path: &Path,
    columns: &TableColumns<'_>,
) -> Result<Vec<ValueRecord>> {
    let mut rdr = ReaderBuilder::new()
        .delimiter(b' ')
        .flexible(true)
        .from_reader(reader);

    // Runs of spaces produce empty fields; drop them so "A  B" reads as two columns.
    let headers: Vec<String> = fields(rdr.headers()?)
        .map(|h| match columns.legacy_value {
            Some(legacy) if h == legacy => columns.value.to_string(),
            _ => h.to_string(),
        })
        .collect();

    let position = |name: &str| {
        headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| MapError::MissingColumn {
                path: path.to_path_buf(),
                column: name.to_string(),
            })
    };
    let node_idx = position(columns.node)?;
    let value_idx = position(columns.value)?;
    let needed = node_idx.max(value_idx) + 1;

    let mut records = Vec::new();
    for result in rdr.records() {
        let record = result.with_context(|| format!("Failed to read value table: {:?}", path))?;
        let row = record.position().map(|p| p.line() as usize).unwrap_or(0);
        let row_fields: Vec<&str> = fields(&record).collect();

        if row_fields.is_empty() {
            continue;
        }
        if row_fields.len() < needed {
            return Err(MapError::ShortRow {
                path: path.to_path_buf(),
                row,
                got: row_fields.len(),
                expected: needed,
            }
            .into());
        }

        let raw_value = row_fields[value_idx];
        let value = raw_value.parse::<f64>().map_err(|source| MapError::InvalidValue {
            path: path.to_path_buf(),
            row,
            value: raw_value.to_string(),
            source,
        })?;

        records.push(ValueRecord::new(row_fields[node_idx], value));
    }

    Ok(records)
}

fn fields(record: &StringRecord) -> impl Iterator<Item = &str> {
    record.iter().filter(|f| !f.is_empty())
}

/// Loads one geometry collection (GeoJSON or Shapefile, chosen by extension).
pub fn load_geometry_set(label: &str, path: &Path, id_field: &str) -> Result<GeometrySet> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|s: &str| s.to_lowercase())
        .ok_or_else(|| anyhow!("Input geometry file has no extension: {:?}", path))?;

    let regions = match extension.as_str() {
        "shp" => load_shapefile(path, id_field)?,
        "json" | "geojson" => load_geojson(path, id_field)?,
        _ => {
            return Err(MapError::UnsupportedFormat {
                path: path.to_path_buf(),
                extension: extension.clone(),
            }
            .into())
        }
    };

    info!("Loaded {} regions for '{}' from {:?}", regions.len(), label, path);
    Ok(GeometrySet::new(label, regions))
}

fn load_geojson(path: &Path, id_field: &str) -> Result<Vec<RegionGeometry>> {
    use geojson::GeoJson;

    let file = File::open(path)
        .with_context(|| format!("Failed to open GeoJSON file: {:?}", path))?;
    let reader = BufReader::new(file);

    // Whole document is held in memory.
    let geojson = GeoJson::from_reader(reader)
        .with_context(|| format!("Failed to parse GeoJSON: {:?}", path))?;

    let collection = match geojson {
        GeoJson::FeatureCollection(fc) => fc,
        _ => return Err(MapError::NotFeatureCollection(path.to_path_buf()).into()),
    };

    let mut regions = Vec::new();

    for feature in collection.features {
        let Some(id) = feature_id(&feature, id_field) else {
            debug!("Skipping feature without '{}' in {:?}", id_field, path);
            continue;
        };

        let geometry = match feature.geometry {
            Some(geom) => {
                let value: geo::Geometry<f64> =
                    geom.value.try_into().map_err(|e| MapError::Geometry {
                        id: id.clone(),
                        message: format!("{:?}", e),
                    })?;

                match value {
                    geo::Geometry::MultiPolygon(mp) => mp,
                    geo::Geometry::Polygon(p) => MultiPolygon::new(vec![p]),
                    _ => continue, // Skip points/lines
                }
            }
            None => continue,
        };

        regions.push(RegionGeometry { id, geometry });
    }

    Ok(regions)
}

fn feature_id(feature: &geojson::Feature, id_field: &str) -> Option<String> {
    use geojson::feature::Id;

    let from_props = feature
        .properties
        .as_ref()
        .and_then(|props| props.get(id_field))
        .and_then(|value| match value {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        });

    from_props.or_else(|| match &feature.id {
        Some(Id::String(s)) => Some(s.clone()),
        Some(Id::Number(n)) => Some(n.to_string()),
        None => None,
    })
}

fn load_shapefile(path: &Path, id_field: &str) -> Result<Vec<RegionGeometry>> {
    use shapefile::dbase::FieldValue;
    use shapefile::{Reader, Shape};

    let mut reader = Reader::from_path(path)
        .with_context(|| format!("Failed to open Shapefile: {:?}", path))?;

    let mut regions = Vec::new();

    for result in reader.iter_shapes_and_records() {
        let (shape, record) = result?;

        let id = match record.get(id_field) {
            Some(FieldValue::Character(Some(s))) => s.trim().to_string(),
            Some(FieldValue::Numeric(Some(n))) => n.to_string(),
            Some(FieldValue::Character(None)) | Some(FieldValue::Numeric(None)) => continue,
            Some(_) => return Err(anyhow!("Shapefile id column '{}' must be text or numeric", id_field)),
            None => return Err(anyhow!("Id column '{}' not found in Shapefile {:?}", id_field, path)),
        };

        let geometry: MultiPolygon<f64> = match shape {
            Shape::Polygon(polygon) => polygon.try_into().map_err(|e| MapError::Geometry {
                id: id.clone(),
                message: format!("{:?}", e),
            })?,
            Shape::PolygonM(polygon) => polygon.try_into().map_err(|e| MapError::Geometry {
                id: id.clone(),
                message: format!("{:?}", e),
            })?,
            Shape::PolygonZ(polygon) => polygon.try_into().map_err(|e| MapError::Geometry {
                id: id.clone(),
                message: format!("{:?}", e),
            })?,
            _ => continue, // Skip non-polygon shapes
        };

        regions.push(RegionGeometry { id, geometry });
    }

    Ok(regions)
}
