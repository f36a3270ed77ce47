//! Permit normalizer: raw source rows → canonical [`Permit`] records.
//!
//! Normalization is total. A malformed field never fails the row; it turns
//! into an absent attribute on that one permit. Dates follow two rules:
//!
//! - Numbers are epoch milliseconds, truncated to the calendar date in the
//!   mapping's feed time zone (UTC when unspecified). `0` is the "no value"
//!   sentinel of several feeds and becomes absent.
//! - Text is tried against the ISO and Swiss formats seen in the exports.
//!   Anything unparseable becomes absent, never `1970-01-01`.

use std::collections::HashSet;

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use tracing::{debug, info};

use crate::mapping::{FieldMapping, SourceSchema};
use crate::permit::{GeoPoint, Permit};
use crate::raw::{RawRow, RawValue};

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d.%m.%Y", "%d/%m/%Y", "%d.%m.%y"];
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%d.%m.%Y %H:%M:%S",
    "%d.%m.%Y %H:%M",
];

/// Normalize one raw row with the built-in mapping of `schema`.
///
/// `index` is the row's position in the source; it becomes the id when the
/// row has no natural key.
pub fn normalize(row: &RawRow, index: usize, schema: SourceSchema) -> Permit {
    normalize_with(row, index, &schema.default_mapping())
}

/// Normalize one raw row with an explicit mapping table.
pub fn normalize_with(row: &RawRow, index: usize, mapping: &FieldMapping) -> Permit {
    let text = |candidates: &[String]| row.first_present(candidates).and_then(RawValue::as_text);
    let date = |candidates: &[String]| {
        row.first_present(candidates)
            .and_then(|v| date_from_value(v, mapping.time_zone))
    };

    Permit {
        id: text(&mapping.id).unwrap_or_else(|| format!("row-{index}")),
        title: text(&mapping.title),
        municipality: text(&mapping.municipality),
        applicant: text(&mapping.applicant),
        parcel: text(&mapping.parcel),
        filing_date: date(&mapping.filing_date),
        deadline_date: date(&mapping.deadline_date),
        location: location(row, mapping),
    }
}

/// Per-collection normalizer that also enforces id uniqueness.
#[derive(Debug, Clone)]
pub struct Normalizer {
    mapping: FieldMapping,
}

/// Counts of degraded attributes in one normalized collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NormalizeStats {
    pub rows: usize,
    pub synthesized_ids: usize,
    pub duplicate_ids: usize,
    pub missing_filing_date: usize,
    pub missing_deadline_date: usize,
    pub missing_location: usize,
}

impl Normalizer {
    pub fn new(mapping: FieldMapping) -> Self {
        Self { mapping }
    }

    pub fn for_schema(schema: SourceSchema) -> Self {
        Self::new(schema.default_mapping())
    }

    pub fn normalize_row(&self, row: &RawRow, index: usize) -> Permit {
        normalize_with(row, index, &self.mapping)
    }

    /// Normalize a whole refresh. Repeated natural keys get a `#2`, `#3`, …
    /// suffix in input order so ids stay unique.
    pub fn normalize_all(&self, rows: &[RawRow]) -> (Vec<Permit>, NormalizeStats) {
        let mut stats = NormalizeStats {
            rows: rows.len(),
            ..Default::default()
        };
        let mut seen: HashSet<String> = HashSet::with_capacity(rows.len());
        let mut permits = Vec::with_capacity(rows.len());

        for (index, row) in rows.iter().enumerate() {
            let mut permit = self.normalize_row(row, index);

            if row.first_present(&self.mapping.id).is_none() {
                stats.synthesized_ids += 1;
            }
            if !seen.insert(permit.id.clone()) {
                stats.duplicate_ids += 1;
                let base = permit.id.clone();
                let mut n = 2;
                while !seen.insert(format!("{base}#{n}")) {
                    n += 1;
                }
                permit.id = format!("{base}#{n}");
                debug!(id = %permit.id, "suffixed duplicate permit id");
            }

            stats.missing_filing_date += usize::from(permit.filing_date.is_none());
            stats.missing_deadline_date += usize::from(permit.deadline_date.is_none());
            stats.missing_location += usize::from(permit.location.is_none());
            permits.push(permit);
        }

        info!(
            rows = stats.rows,
            duplicate_ids = stats.duplicate_ids,
            missing_filing_date = stats.missing_filing_date,
            missing_location = stats.missing_location,
            "normalized permits"
        );
        (permits, stats)
    }
}

/// Convert a raw date value. Returns `None` for anything that is not a real date.
pub fn date_from_value(value: &RawValue, tz: Tz) -> Option<NaiveDate> {
    let date = match value {
        RawValue::Number(ms) => date_from_epoch_millis(*ms, tz),
        RawValue::Text(s) => parse_date_text(s, tz),
        RawValue::Null | RawValue::Bool(_) => None,
    }?;
    // 1970-01-01 only ever shows up as an unguarded zero timestamp.
    (Some(date) != NaiveDate::from_ymd_opt(1970, 1, 1)).then_some(date)
}

/// Rejects two-digit years read by `%Y` and other nonsense years.
fn plausible(date: &NaiveDate) -> bool {
    (1900..=2200).contains(&date.year())
}

/// Truncate an epoch-millisecond timestamp to its calendar date in `tz`.
pub fn date_from_epoch_millis(ms: f64, tz: Tz) -> Option<NaiveDate> {
    if !ms.is_finite() || ms == 0.0 || ms.abs() > 1e16 {
        return None;
    }
    let instant = Utc.timestamp_millis_opt(ms.trunc() as i64).single()?;
    Some(instant.with_timezone(&tz).date_naive())
}

fn parse_date_text(s: &str, tz: Tz) -> Option<NaiveDate> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    if s.bytes().all(|b| b.is_ascii_digit()) {
        // DBF dates are YYYYMMDD; longer digit runs are epoch milliseconds.
        if s.len() == 8 {
            return NaiveDate::parse_from_str(s, "%Y%m%d").ok();
        }
        return s.parse::<i64>().ok().and_then(|ms| date_from_epoch_millis(ms as f64, tz));
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&tz).date_naive());
    }
    if let Some(date) = DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok().filter(plausible))
    {
        return Some(date);
    }
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|dt| dt.date())
        .filter(plausible)
}

fn location(row: &RawRow, mapping: &FieldMapping) -> Option<GeoPoint> {
    let fields = mapping.coordinates.as_ref()?;
    let x = row.first_present(&fields.x)?.as_f64()?;
    let y = row.first_present(&fields.y)?.as_f64()?;
    if x == 0.0 && y == 0.0 {
        return None;
    }
    mapping.crs.to_wgs84(x, y)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::Crs;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn arcgis_row() -> RawRow {
        RawRow::new()
            .with("Projektname", "Neubau Einfamilienhaus")
            .with("Ort", "Köniz")
            .with("ParzellenNr", 4711.0)
            .with("Gesuchsteller", "Muster AG")
            // 2025-06-15T00:00:00+02:00 (Zurich summer time) = 2025-06-14T22:00Z
            .with("Eingangsdatum", 1_749_938_400_000i64)
            .with("AuflageFrist", 1_752_530_400_000i64)
            .with("geometry.x", 7.4172)
            .with("geometry.y", 46.9341)
    }

    #[test]
    fn arcgis_feature_maps_all_attributes() {
        let p = normalize(&arcgis_row(), 0, SourceSchema::ArcGisFeature);
        assert_eq!(p.id, "Neubau Einfamilienhaus");
        assert_eq!(p.title.as_deref(), Some("Neubau Einfamilienhaus"));
        assert_eq!(p.municipality.as_deref(), Some("Köniz"));
        assert_eq!(p.applicant.as_deref(), Some("Muster AG"));
        assert_eq!(p.parcel.as_deref(), Some("4711"));
        assert_eq!(p.filing_date, Some(date(2025, 6, 15)));
        assert_eq!(p.deadline_date, Some(date(2025, 7, 15)));
        let loc = p.location.unwrap();
        assert_eq!(loc.latitude(), 46.9341);
        assert_eq!(loc.longitude(), 7.4172);
    }

    #[test]
    fn epoch_millis_truncate_in_feed_zone_not_utc() {
        let ms = 1_749_938_400_000.0; // 2025-06-14T22:00Z
        assert_eq!(date_from_epoch_millis(ms, Tz::UTC), Some(date(2025, 6, 14)));
        assert_eq!(
            date_from_epoch_millis(ms, chrono_tz::Europe::Zurich),
            Some(date(2025, 6, 15))
        );
    }

    #[test]
    fn zero_and_missing_dates_are_absent() {
        let row = RawRow::new()
            .with("Projektname", "Anbau")
            .with("Eingangsdatum", 0i64)
            .with("AuflageFrist", RawValue::Null);
        let p = normalize(&row, 3, SourceSchema::ArcGisFeature);
        assert_eq!(p.filing_date, None);
        assert_eq!(p.deadline_date, None);

        let row = RawRow::new().with("Projektname", "Anbau");
        let p = normalize(&row, 3, SourceSchema::ArcGisFeature);
        assert_eq!(p.filing_date, None);
        assert_eq!(p.deadline_date, None);
    }

    #[test]
    fn unparseable_dates_are_absent() {
        for raw in ["unbekannt", "31.02.2025", "2025-13-01", "", "1970-01-01"] {
            assert_eq!(date_from_value(&RawValue::from(raw), Tz::UTC), None, "{raw:?}");
        }
        assert_eq!(date_from_value(&RawValue::Number(f64::NAN), Tz::UTC), None);
        assert_eq!(date_from_value(&RawValue::Bool(true), Tz::UTC), None);
    }

    #[test]
    fn text_date_formats() {
        let cases = [
            ("2025-06-15", date(2025, 6, 15)),
            ("15.06.2025", date(2025, 6, 15)),
            ("1.6.2025", date(2025, 6, 1)),
            ("15/06/2025", date(2025, 6, 15)),
            ("15.06.25", date(2025, 6, 15)),
            ("20250615", date(2025, 6, 15)),
            ("2025-06-15T10:30:00", date(2025, 6, 15)),
            ("2025-06-15 10:30:00.123", date(2025, 6, 15)),
            ("15.06.2025 10:30", date(2025, 6, 15)),
            ("2025-06-14T22:30:00Z", date(2025, 6, 15)),
            ("1749938400000", date(2025, 6, 15)),
        ];
        for (raw, expected) in cases {
            assert_eq!(
                date_from_value(&RawValue::from(raw), chrono_tz::Europe::Zurich),
                Some(expected),
                "{raw:?}"
            );
        }
    }

    #[test]
    fn missing_id_is_synthesized_from_position() {
        let row = RawRow::new().with("Ort", "Thun");
        let p = normalize(&row, 7, SourceSchema::ArcGisFeature);
        assert_eq!(p.id, "row-7");
        assert_eq!(p.title, None);
    }

    #[test]
    fn text_placeholders_are_not_baked_in() {
        let row = RawRow::new().with("Projektname", "   ").with("Ort", RawValue::Null);
        let p = normalize(&row, 0, SourceSchema::ArcGisFeature);
        assert_eq!(p.title, None);
        assert_eq!(p.municipality, None);
        assert_eq!(p.applicant, None);
    }

    #[test]
    fn lv95_coordinates_are_reprojected() {
        let row = RawRow::new()
            .with("Dossiernummer", "BE-1")
            .with("E", "2600000")
            .with("N", "1200000");
        let p = normalize(&row, 0, SourceSchema::CsvRow);
        let loc = p.location.unwrap();
        assert!((loc.latitude() - 46.951).abs() < 0.001);
        assert!((loc.longitude() - 7.4386).abs() < 0.001);
        assert_ne!(loc.longitude(), 2_600_000.0);
    }

    #[test]
    fn unsupported_crs_omits_location() {
        let mut mapping = SourceSchema::CsvRow.default_mapping();
        mapping.crs = Crs::Other(31467);
        let row = RawRow::new().with("E", 3_500_000.0).with("N", 5_400_000.0);
        assert_eq!(normalize_with(&row, 0, &mapping).location, None);
    }

    #[test]
    fn null_island_and_half_pairs_are_absent() {
        let row = RawRow::new().with("geometry.x", 0.0).with("geometry.y", 0.0);
        assert_eq!(normalize(&row, 0, SourceSchema::ArcGisFeature).location, None);
        let row = RawRow::new().with("geometry.x", 7.4);
        assert_eq!(normalize(&row, 0, SourceSchema::ArcGisFeature).location, None);
    }

    #[test]
    fn shapefile_dbf_dates_and_names() {
        let row = RawRow::new()
            .with("DOSSIERNR", "2025-0042")
            .with("PROJEKT", "Umbau Scheune")
            .with("GEMEINDE", "Langnau i.E.")
            .with("EINGANG", "20250602")
            .with("AUFLAGEBIS", "20250702")
            .with("shape.x", 2_626_500.0)
            .with("shape.y", 1_198_800.0);
        let p = normalize(&row, 0, SourceSchema::ShapefileAttributes);
        assert_eq!(p.id, "2025-0042");
        assert_eq!(p.municipality.as_deref(), Some("Langnau i.E."));
        assert_eq!(p.filing_date, Some(date(2025, 6, 2)));
        assert_eq!(p.deadline_date, Some(date(2025, 7, 2)));
        assert!(p.location.is_some());
    }

    #[test]
    fn normalize_is_deterministic() {
        let row = arcgis_row();
        let a = normalize(&row, 5, SourceSchema::ArcGisFeature);
        let b = normalize(&row, 5, SourceSchema::ArcGisFeature);
        assert_eq!(a, b);
        assert_eq!(format!("{a:?}"), format!("{b:?}"));
    }

    #[test]
    fn normalize_all_suffixes_duplicate_ids() {
        let rows = vec![
            RawRow::new().with("Projektname", "Garage"),
            RawRow::new().with("Projektname", "Garage"),
            RawRow::new().with("Projektname", "Garage#2"),
            RawRow::new().with("Ort", "Bern"),
        ];
        let (permits, stats) = Normalizer::for_schema(SourceSchema::ArcGisFeature).normalize_all(&rows);
        let ids: Vec<&str> = permits.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, ["Garage", "Garage#2", "Garage#2#2", "row-3"]);
        assert_eq!(stats.rows, 4);
        assert_eq!(stats.duplicate_ids, 2);
        assert_eq!(stats.synthesized_ids, 1);
        assert_eq!(stats.missing_filing_date, 4);
    }
}
