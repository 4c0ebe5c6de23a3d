use anyhow::{anyhow, Context, Result};
use image::Rgba;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_BOUNDARIES: [f64; 25] = [
    0.0, 0.025, 0.05, 0.075, 0.1, 0.125, 0.15, 0.175, 0.2, 0.25, 0.3, 0.35, 0.4, 0.45, 0.5, 0.55,
    0.6, 0.65, 0.7, 0.75, 0.8, 0.85, 0.9, 0.95, 1.0,
];

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub input: InputConfig,
    pub geometry: GeometryConfig,
    pub style: StyleConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct InputConfig {
    /// Overrides the table path derived from the dataset name.
    /// Set to "average-triangles-common.txt" for the legacy fixed input.
    pub value_table: Option<PathBuf>,
    pub node_column: String,
    pub value_column: String,
    pub legacy_value_column: Option<String>, // renamed to value_column when present
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            value_table: None,
            node_column: "Node".to_string(),
            value_column: "Value".to_string(),
            legacy_value_column: Some("NormTriangles".to_string()),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct GeometryConfig {
    /// Region vintages in lookup priority order.
    pub vintages: Vec<VintageConfig>,
    pub countries: PathBuf,
    pub id_field: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct VintageConfig {
    pub label: String,
    pub path: PathBuf,
}

impl Default for GeometryConfig {
    fn default() -> Self {
        Self {
            vintages: vec![
                VintageConfig {
                    label: "2021".to_string(),
                    path: PathBuf::from("NUTS_RG_01M_2021_3857_LEVL_2.geojson"),
                },
                VintageConfig {
                    label: "2016".to_string(),
                    path: PathBuf::from("NUTS_RG_01M_2016_3857_LEVL_2.geojson"),
                },
            ],
            countries: PathBuf::from("NUTS_RG_01M_2021_3857_LEVL_0.geojson"),
            id_field: "id".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StyleConfig {
    pub boundaries: Vec<f64>,
    pub background: String, // Hex code
    pub outline_color: String,
    pub outline_width: f64, // points
    pub fill_edge_color: String,
    pub fill_edge_width: f64,
    pub country_color: String,
    pub country_width: f64,
}

impl Default for StyleConfig {
    fn default() -> Self {
        Self {
            boundaries: DEFAULT_BOUNDARIES.to_vec(),
            background: "#ffffff".to_string(),
            outline_color: "#000000".to_string(),
            outline_width: 0.05,
            fill_edge_color: "#ffffff".to_string(),
            fill_edge_width: 0.25,
            country_color: "#000000".to_string(),
            country_width: 0.5,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct OutputConfig {
    pub suffix: String,
    pub dpi: u32,
    pub figure_size: f64, // inches, longest side
    pub pad_inches: f64,
    pub extent: Extent,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            suffix: "-plot".to_string(),
            dpi: 300,
            figure_size: 8.0,
            pad_inches: 0.1,
            extent: Extent::default(),
        }
    }
}

impl OutputConfig {
    /// `<hint><suffix>.png`
    pub fn output_path(&self, hint: &str) -> PathBuf {
        PathBuf::from(format!("{}{}.png", hint, self.suffix))
    }
}

/// Map window in EPSG:3857 metres.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
pub struct Extent {
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
}

impl Default for Extent {
    fn default() -> Self {
        Self {
            min_x: -2_750_000.0,
            max_x: 5_000_000.0,
            min_y: 4_000_000.0,
            max_y: 11_500_000.0,
        }
    }
}

impl Extent {
    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }
}

impl AppConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config: AppConfig = toml::from_str(&content)
            .with_context(|| "Failed to parse TOML configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.geometry.vintages.is_empty() {
            return Err(anyhow!("At least one geometry vintage must be configured"));
        }
        if self.output.dpi == 0 || self.output.figure_size <= 0.0 {
            return Err(anyhow!("Output dpi and figure_size must be positive"));
        }
        let extent = &self.output.extent;
        if extent.width() <= 0.0 || extent.height() <= 0.0 {
            return Err(anyhow!("Output extent is empty: {:?}", extent));
        }
        Ok(())
    }
}

pub fn hex_to_rgba(hex: &str) -> Result<Rgba<u8>> {
    let digits = hex.trim_start_matches('#');
    if digits.len() != 6 || !digits.is_ascii() {
        return Err(anyhow!("Invalid hex color: {}", hex));
    }
    let channel = |range: std::ops::Range<usize>| {
        u8::from_str_radix(&digits[range], 16).with_context(|| format!("Invalid hex color: {}", hex))
    };
    Ok(Rgba([channel(0..2)?, channel(2..4)?, channel(4..6)?, 255]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_fixed_layout() {
        let config = AppConfig::default();
        assert_eq!(config.geometry.vintages[0].label, "2021");
        assert_eq!(config.geometry.vintages[1].label, "2016");
        assert_eq!(config.style.boundaries.len(), 25);
        assert_eq!(config.output.dpi, 300);
        assert_eq!(config.output.output_path("triangles"), PathBuf::from("triangles-plot.png"));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [input]
            value_table = "average-triangles-common.txt"

            [output]
            dpi = 72
            "#,
        )
        .unwrap();
        assert_eq!(
            config.input.value_table,
            Some(PathBuf::from("average-triangles-common.txt"))
        );
        assert_eq!(config.input.node_column, "Node");
        assert_eq!(config.output.dpi, 72);
        assert_eq!(config.output.suffix, "-plot");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_example_config_matches_defaults() {
        let config: AppConfig = toml::from_str(include_str!("../config.example.toml")).unwrap();
        let defaults = AppConfig::default();
        assert_eq!(config.style.boundaries, defaults.style.boundaries);
        assert_eq!(config.output.extent, defaults.output.extent);
        assert_eq!(config.geometry.vintages.len(), 2);
        assert_eq!(config.geometry.countries, defaults.geometry.countries);
        assert!(config.input.value_table.is_none());
    }

    #[test]
    fn test_load_from_file_rejects_empty_vintages() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[geometry]\nvintages = []\n").unwrap();
        assert!(AppConfig::load_from_file(&path).is_err());
    }

    #[test]
    fn test_hex_to_rgba() {
        assert_eq!(hex_to_rgba("#ff8000").unwrap(), Rgba([255, 128, 0, 255]));
        assert_eq!(hex_to_rgba("000000").unwrap(), Rgba([0, 0, 0, 255]));
        assert!(hex_to_rgba("#fff").is_err());
        assert!(hex_to_rgba("#gg0000").is_err());
    }
}
