//! Field mapping tables from source schemas to the canonical [`Permit`](crate::Permit).
//!
//! Each supported source declares which raw field names feed which canonical
//! attribute. Several candidates per attribute are allowed because published
//! exports drift (`Auflagefrist` vs `AuflageFrist`, `Ort` vs `Gemeinde`); the
//! first candidate with a present value wins. Adding a source means adding a
//! table here, not new normalization logic.

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::geo::Crs;

/// The raw source shapes the normalizer understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceSchema {
    /// `attributes` + `geometry` of an ArcGIS REST feature.
    ArcGisFeature,
    /// DBF attribute row of a shapefile, point geometry flattened alongside.
    ShapefileAttributes,
    /// One row of a CSV export, keyed by header.
    CsvRow,
}

impl SourceSchema {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ArcGisFeature => "arcgis_feature",
            Self::ShapefileAttributes => "shapefile_attributes",
            Self::CsvRow => "csv_row",
        }
    }

    /// The built-in mapping table for this schema.
    pub fn default_mapping(self) -> FieldMapping {
        match self {
            Self::ArcGisFeature => FieldMapping {
                id: names(&["Dossiernummer", "GesuchNr", "Projektname"]),
                title: names(&["Projektname", "Bauvorhaben"]),
                municipality: names(&["Ort", "Gemeinde"]),
                applicant: names(&["Gesuchsteller", "Bauherr"]),
                parcel: names(&["ParzellenNr", "Parzelle"]),
                filing_date: names(&["Eingangsdatum"]),
                deadline_date: names(&["AuflageFrist", "Auflagefrist"]),
                coordinates: Some(CoordinateFields::new(&["geometry.x"], &["geometry.y"])),
                crs: Crs::Wgs84,
                time_zone: chrono_tz::Europe::Zurich,
            },
            Self::ShapefileAttributes => FieldMapping {
                // DBF field names are limited to 10 characters.
                id: names(&["DOSSIERNR", "GESUCHNR", "PROJEKT"]),
                title: names(&["PROJEKT", "BAUVORHAB"]),
                municipality: names(&["GEMEINDE", "ORT"]),
                applicant: names(&["GESUCHST", "BAUHERR"]),
                parcel: names(&["PARZELLE", "PARZ_NR"]),
                filing_date: names(&["EINGANG", "EINGANGSDA"]),
                deadline_date: names(&["AUFLAGEBIS", "AUFLAGEFRI"]),
                coordinates: Some(CoordinateFields::new(&["shape.x"], &["shape.y"])),
                crs: Crs::Lv95,
                time_zone: chrono_tz::Europe::Zurich,
            },
            Self::CsvRow => FieldMapping {
                id: names(&["Dossiernummer", "Nr", "Projektname"]),
                title: names(&["Projektname", "Bauvorhaben"]),
                municipality: names(&["Gemeinde", "Ort"]),
                applicant: names(&["Gesuchsteller", "Bauherrschaft"]),
                parcel: names(&["Parzelle", "ParzellenNr"]),
                filing_date: names(&["Eingangsdatum", "Publikationsdatum"]),
                deadline_date: names(&["Auflagefrist", "Einsprachefrist"]),
                coordinates: Some(CoordinateFields::new(&["E", "Koord_E"], &["N", "Koord_N"])),
                crs: Crs::Lv95,
                time_zone: chrono_tz::Europe::Zurich,
            },
        }
    }
}

impl std::str::FromStr for SourceSchema {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "arcgis" | "arcgis_feature" => Ok(Self::ArcGisFeature),
            "shapefile" | "shp" | "shapefile_attributes" => Ok(Self::ShapefileAttributes),
            "csv" | "csv_row" => Ok(Self::CsvRow),
            other => Err(format!("unknown source schema: {other}")),
        }
    }
}

/// Raw field names for the x (easting / longitude) and y (northing / latitude) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinateFields {
    pub x: Vec<String>,
    pub y: Vec<String>,
}

impl CoordinateFields {
    pub fn new(x: &[&str], y: &[&str]) -> Self {
        Self {
            x: names(x),
            y: names(y),
        }
    }
}

/// Candidate raw field names for each canonical attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldMapping {
    #[serde(default)]
    pub id: Vec<String>,
    #[serde(default)]
    pub title: Vec<String>,
    #[serde(default)]
    pub municipality: Vec<String>,
    #[serde(default)]
    pub applicant: Vec<String>,
    #[serde(default)]
    pub parcel: Vec<String>,
    #[serde(default)]
    pub filing_date: Vec<String>,
    #[serde(default)]
    pub deadline_date: Vec<String>,
    #[serde(default)]
    pub coordinates: Option<CoordinateFields>,
    /// CRS of the coordinate pair. Non-WGS84 pairs are reprojected or dropped.
    #[serde(default)]
    pub crs: Crs,
    /// Zone used to truncate epoch-millisecond timestamps to dates.
    #[serde(default = "utc", with = "tz_name")]
    pub time_zone: Tz,
}

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

fn utc() -> Tz {
    Tz::UTC
}

/// IANA zone names on the wire, e.g. `"Europe/Zurich"`.
mod tz_name {
    use chrono_tz::Tz;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(tz: &Tz, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(tz.name())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Tz, D::Error> {
        let name = String::deserialize(deserializer)?;
        name.parse::<Tz>()
            .map_err(|_| serde::de::Error::custom(format!("unknown time zone: {name}")))
    }
}
