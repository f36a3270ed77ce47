//! TOML configuration shared by the CLI and adapters.
//!
//! ```toml
//! lang = "fr"
//!
//! [source]
//! kind = "csv"
//! url = "https://example.org/baugesuche.csv"
//! delimiter = ";"
//!
//! [cache]
//! max_age_secs = 3600
//!
//! [query]
//! sort = "deadline-asc"
//! open_only = true
//! ```

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::locale::Locale;
use crate::mapping::{FieldMapping, SourceSchema};
use crate::query::{AbsentDatePolicy, DateField, SortOrder};

/// File looked up in the working directory when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "baugesuche.toml";

/// ArcGIS feature service of the Kanton Bern building-permit publication.
pub const DEFAULT_ARCGIS_URL: &str =
    "https://services7.arcgis.com/3m6RvGQbF9eE88hU/arcgis/rest/services/Baugesuche/FeatureServer/0/query";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub lang: Locale,
    pub source: SourceConfig,
    pub cache: CacheConfig,
    pub query: QueryDefaults,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            lang: Locale::De,
            source: SourceConfig::default(),
            cache: CacheConfig::default(),
            query: QueryDefaults::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    #[serde(with = "schema_name")]
    pub kind: SourceSchema,
    pub url: String,
    /// CSV field delimiter; ignored by other sources.
    pub delimiter: char,
    /// HTTP timeout in seconds.
    pub timeout_secs: u64,
    /// Replaces the built-in mapping table of `kind` entirely.
    pub fields: Option<FieldMapping>,
    /// Default lower bound for filing dates, pushed down to the source when it can filter.
    pub date_from: Option<NaiveDate>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            kind: SourceSchema::ArcGisFeature,
            url: DEFAULT_ARCGIS_URL.to_string(),
            delimiter: ';',
            timeout_secs: 10,
            fields: None,
            date_from: NaiveDate::from_ymd_opt(2025, 5, 1),
        }
    }
}

impl SourceConfig {
    /// The configured mapping, or the built-in table for `kind`.
    pub fn mapping(&self) -> FieldMapping {
        self.fields
            .clone()
            .unwrap_or_else(|| self.kind.default_mapping())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    /// Snapshot directory; the platform cache dir is used when unset.
    pub dir: Option<PathBuf>,
    /// Snapshots older than this are refetched. `None` keeps them until invalidated.
    pub max_age_secs: Option<u64>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: None,
            max_age_secs: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryDefaults {
    pub sort: SortOrder,
    pub open_only: bool,
    pub date_field: DateField,
    pub absent_dates: AbsentDatePolicy,
}

impl AppConfig {
    pub fn from_toml_str(contents: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load an explicit config file. Errors if it cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&contents, path)?;
        debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    /// Load `path` if given, else `baugesuche.toml` in `dir` if present, else defaults.
    pub fn discover(path: Option<&Path>, dir: &Path) -> Result<Self, ConfigError> {
        if let Some(path) = path {
            return Self::load(path);
        }
        let candidate = dir.join(DEFAULT_CONFIG_FILE);
        if candidate.is_file() {
            Self::load(&candidate)
        } else {
            debug!("no config file found, using defaults");
            Ok(Self::default())
        }
    }
}

mod schema_name {
    use serde::{Deserialize, Deserializer, Serializer};

    use crate::mapping::SourceSchema;

    pub fn serialize<S: Serializer>(schema: &SourceSchema, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(schema.as_str())
    }

    /// Accepts the short names `arcgis`, `csv`, `shapefile` as well.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<SourceSchema, D::Error> {
        let name = String::deserialize(deserializer)?;
        name.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::AbsentDate;

    #[test]
    fn empty_file_gives_defaults() {
        let config = AppConfig::from_toml_str("", Path::new("baugesuche.toml")).unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.source.kind, SourceSchema::ArcGisFeature);
        assert_eq!(config.source.url, DEFAULT_ARCGIS_URL);
        assert_eq!(config.source.timeout_secs, 10);
        assert_eq!(config.query.sort, SortOrder::FilingDesc);
    }

    #[test]
    fn full_file() {
        let toml = r#"
            lang = "fr"

            [source]
            kind = "csv"
            url = "https://example.org/export.csv"
            delimiter = ","
            date_from = "2025-01-01"

            [source.fields]
            id = ["Nr"]
            title = ["Vorhaben"]
            crs = "lv03"
            time_zone = "Europe/Zurich"

            [source.fields.coordinates]
            x = ["Y_LV03"]
            y = ["X_LV03"]

            [cache]
            enabled = false
            max_age_secs = 600

            [query]
            sort = "deadline-asc"
            open_only = true
            date_field = "deadline"

            [query.absent_dates]
            filing = "include"
            deadline = "exclude"
        "#;
        let config = AppConfig::from_toml_str(toml, Path::new("x.toml")).unwrap();
        assert_eq!(config.lang, Locale::Fr);
        assert_eq!(config.source.kind, SourceSchema::CsvRow);
        assert_eq!(config.source.delimiter, ',');
        assert_eq!(config.source.date_from, NaiveDate::from_ymd_opt(2025, 1, 1));
        let mapping = config.source.mapping();
        assert_eq!(mapping.id, vec!["Nr"]);
        assert_eq!(mapping.crs, crate::geo::Crs::Lv03);
        assert_eq!(mapping.coordinates.unwrap().x, vec!["Y_LV03"]);
        assert!(!config.cache.enabled);
        assert_eq!(config.cache.max_age_secs, Some(600));
        assert_eq!(config.query.sort, SortOrder::DeadlineAsc);
        assert!(config.query.open_only);
        assert_eq!(config.query.date_field, DateField::Deadline);
        assert_eq!(config.query.absent_dates.deadline, AbsentDate::Exclude);
    }

    #[test]
    fn mapping_falls_back_to_builtin_table() {
        let config = AppConfig::default();
        assert_eq!(
            config.source.mapping(),
            SourceSchema::ArcGisFeature.default_mapping()
        );
    }

    #[test]
    fn parse_error_names_the_file() {
        let err = AppConfig::from_toml_str("lang = 5", Path::new("bad.toml")).unwrap_err();
        assert!(err.to_string().contains("bad.toml"));
    }

    #[test]
    fn discover_reads_file_from_dir() {
        let tmp = tempfile::TempDir::new().unwrap();
        std::fs::write(tmp.path().join(DEFAULT_CONFIG_FILE), "lang = \"it\"\n").unwrap();
        let config = AppConfig::discover(None, tmp.path()).unwrap();
        assert_eq!(config.lang, Locale::It);
    }

    #[test]
    fn discover_without_file_uses_defaults() {
        let tmp = tempfile::TempDir::new().unwrap();
        let config = AppConfig::discover(None, tmp.path()).unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        let missing = tmp.path().join("nope.toml");
        assert!(matches!(
            AppConfig::discover(Some(&missing), tmp.path()),
            Err(ConfigError::Io { .. })
        ));
    }
}
