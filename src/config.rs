use crate::error::{Result, PrepError};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

const CONFIG_PATH: &str = "config.toml";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub data: DataConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Single-province characteristic extract driving the menu passes.
    pub census_csv: PathBuf,
    /// Directory holding the full per-province census exports.
    pub census_dir: PathBuf,
    /// SQLite mirror of the census tables.
    pub database: PathBuf,
    /// Boundary layer that gets reprojected before the overlay.
    pub areas: PathBuf,
    /// Boundary layer whose CRS the overlay is expressed in.
    pub overlay: PathBuf,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub dir: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            census_csv: PathBuf::from("data/census/98-401-X2021006_English_CSV_data_Territories.csv"),
            census_dir: PathBuf::from("data/census"),
            database: PathBuf::from("database/database.db"),
            areas: PathBuf::from("data/areas.geojson"),
            overlay: PathBuf::from("data/canada_cleaned.geojson"),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("output"),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_content = fs::read_to_string(CONFIG_PATH)
            .map_err(|e| PrepError::Config(format!("Failed to read config file '{}': {}", CONFIG_PATH, e)))?;

        let config: Config = toml::from_str(&config_content)?;
        Ok(config)
    }

    /// Loads `config.toml` when present, otherwise falls back to the defaults.
    pub fn load_or_default() -> Result<Self> {
        if Path::new(CONFIG_PATH).exists() {
            Self::load()
        } else {
            tracing::debug!("no config.toml found, using default paths");
            Ok(Self::default())
        }
    }

    pub fn characteristic_list_path(&self) -> PathBuf {
        self.output.dir.join("characteristic_list.json")
    }

    pub fn computed_values_path(&self) -> PathBuf {
        self.output.dir.join("computed_values.json")
    }

    pub fn menu_list_path(&self) -> PathBuf {
        self.output.dir.join("menu_list.json")
    }

    pub fn ranges_path(&self) -> PathBuf {
        self.output.dir.join("ranges.json")
    }

    pub fn intersection_path(&self) -> PathBuf {
        self.output.dir.join("canada_buildings.geojson")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_paths_point_at_output_dir() {
        let config = Config::default();
        assert_eq!(config.menu_list_path(), PathBuf::from("output/menu_list.json"));
        assert_eq!(config.ranges_path(), PathBuf::from("output/ranges.json"));
    }

    #[test]
    fn partial_toml_fills_in_defaults() {
        let config: Config = toml::from_str(
            r#"
            [data]
            database = "elsewhere/census.db"
            "#,
        )
        .unwrap();
        assert_eq!(config.data.database, PathBuf::from("elsewhere/census.db"));
        assert_eq!(config.output.dir, PathBuf::from("output"));
    }
}
