//! Canonical building-permit record.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A WGS84 coordinate pair.
///
/// Only constructible through [`GeoPoint::new`], which rejects values outside
/// latitude [-90, 90] and longitude [-180, 180].
/// Deserialization goes through the same check.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawGeoPoint")]
pub struct GeoPoint {
    latitude: f64,
    longitude: f64,
}

#[derive(Deserialize)]
struct RawGeoPoint {
    latitude: f64,
    longitude: f64,
}

impl TryFrom<RawGeoPoint> for GeoPoint {
    type Error = String;

    fn try_from(raw: RawGeoPoint) -> Result<Self, Self::Error> {
        GeoPoint::new(raw.latitude, raw.longitude)
            .ok_or_else(|| format!("not a WGS84 coordinate: {}, {}", raw.latitude, raw.longitude))
    }
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Option<Self> {
        let valid = latitude.is_finite()
            && longitude.is_finite()
            && (-90.0..=90.0).contains(&latitude)
            && (-180.0..=180.0).contains(&longitude);
        valid.then_some(Self {
            latitude,
            longitude,
        })
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }
}

/// A normalized building permit ("Baugesuch").
///
/// Created by the normalizer from exactly one raw row and never mutated
/// afterwards. Text attributes stay `None` when the source had nothing;
/// placeholders are a display concern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Permit {
    /// Case number, project name fallback, or `row-{index}`. Unique per collection.
    pub id: String,
    pub title: Option<String>,
    pub municipality: Option<String>,
    pub applicant: Option<String>,
    /// Parcel number as published; display only.
    pub parcel: Option<String>,
    /// Date the application was received.
    pub filing_date: Option<NaiveDate>,
    /// End of the public objection period.
    pub deadline_date: Option<NaiveDate>,
    pub location: Option<GeoPoint>,
}

impl Permit {
    /// A permit with only an id; every optional attribute absent.
    pub fn bare(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: None,
            municipality: None,
            applicant: None,
            parcel: None,
            filing_date: None,
            deadline_date: None,
            location: None,
        }
    }

    /// Whether the objection period is still open on `today`.
    ///
    /// An unknown deadline counts as open.
    pub fn is_open_on(&self, today: NaiveDate) -> bool {
        self.deadline_date.is_none_or(|d| d >= today)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn geo_point_rejects_out_of_range() {
        assert!(GeoPoint::new(46.95, 7.44).is_some());
        assert!(GeoPoint::new(90.0, -180.0).is_some());
        assert!(GeoPoint::new(1_200_000.0, 2_600_000.0).is_none());
        assert!(GeoPoint::new(46.95, 181.0).is_none());
        assert!(GeoPoint::new(f64::NAN, 7.0).is_none());
    }

    #[test]
    fn geo_point_deserialization_is_checked() {
        let err = serde_json::from_str::<GeoPoint>(r#"{"latitude":1200000.0,"longitude":2600000.0}"#);
        assert!(err.is_err());

        let json = r#"{"id":"a","title":null,"municipality":null,"applicant":null,"parcel":null,
            "filing_date":null,"deadline_date":null,"location":{"latitude":1200000,"longitude":2600000}}"#;
        assert!(serde_json::from_str::<Permit>(json).is_err());

        let ok: GeoPoint = serde_json::from_str(r#"{"latitude":46.95,"longitude":7.44}"#).unwrap();
        assert_eq!(ok, GeoPoint::new(46.95, 7.44).unwrap());
    }

    #[test]
    fn open_deadline() {
        let today = date(2025, 6, 1);
        let mut p = Permit::bare("a");
        assert!(p.is_open_on(today));
        p.deadline_date = Some(date(2025, 6, 1));
        assert!(p.is_open_on(today));
        p.deadline_date = Some(date(2025, 5, 31));
        assert!(!p.is_open_on(today));
    }

    #[test]
    fn permit_json_uses_iso_dates() {
        let mut p = Permit::bare("BE-2025-001");
        p.filing_date = Some(date(2025, 6, 15));
        p.location = GeoPoint::new(46.95, 7.44);
        let json = serde_json::to_value(&p).unwrap();
        assert_eq!(json["filing_date"], "2025-06-15");
        assert!(json["deadline_date"].is_null());
        assert_eq!(json["location"]["latitude"], 46.95);

        let parsed: Permit = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, p);
    }
}
