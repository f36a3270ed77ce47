//! Coordinate reference systems and reprojection to WGS84.
//!
//! Swiss feeds publish in LV95 (EPSG:2056) or the older LV03 (EPSG:21781);
//! ArcGIS services default to Web Mercator unless asked for `outSR=4326`.
//! The Swiss conversions use the swisstopo approximate formulas, accurate to
//! about one metre, which is plenty for map markers.

use serde::{Deserialize, Serialize};

use crate::permit::GeoPoint;

const WEB_MERCATOR_RADIUS: f64 = 6_378_137.0;

/// Coordinate reference system declared by a source mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Crs {
    /// EPSG:4326, x = longitude, y = latitude.
    #[default]
    Wgs84,
    /// EPSG:3857 (also published as 102100).
    WebMercator,
    /// EPSG:2056, x = easting (E), y = northing (N).
    Lv95,
    /// EPSG:21781.
    Lv03,
    /// Anything we cannot reproject; locations are dropped.
    Other(u32),
}

impl Crs {
    pub fn from_epsg(code: u32) -> Self {
        match code {
            4326 => Self::Wgs84,
            3857 | 102100 | 102113 | 900913 => Self::WebMercator,
            2056 => Self::Lv95,
            21781 => Self::Lv03,
            other => Self::Other(other),
        }
    }

    /// Convert an x/y pair in this CRS to a WGS84 point.
    ///
    /// Returns `None` when the CRS is not supported or the pair lies outside
    /// the CRS's plausible extent.
    pub fn to_wgs84(self, x: f64, y: f64) -> Option<GeoPoint> {
        if !x.is_finite() || !y.is_finite() {
            return None;
        }
        match self {
            Self::Wgs84 => GeoPoint::new(y, x),
            Self::WebMercator => web_mercator_to_wgs84(x, y),
            Self::Lv95 => {
                let in_extent =
                    (2_400_000.0..=2_900_000.0).contains(&x) && (1_050_000.0..=1_350_000.0).contains(&y);
                in_extent.then(|| swiss_to_wgs84(x - 2_600_000.0, y - 1_200_000.0))?
            }
            Self::Lv03 => {
                let in_extent =
                    (400_000.0..=900_000.0).contains(&x) && (50_000.0..=350_000.0).contains(&y);
                in_extent.then(|| swiss_to_wgs84(x - 600_000.0, y - 200_000.0))?
            }
            Self::Other(_) => None,
        }
    }
}

fn web_mercator_to_wgs84(x: f64, y: f64) -> Option<GeoPoint> {
    let longitude = (x / WEB_MERCATOR_RADIUS).to_degrees();
    let latitude = (2.0 * (y / WEB_MERCATOR_RADIUS).exp().atan() - std::f64::consts::FRAC_PI_2).to_degrees();
    GeoPoint::new(latitude, longitude)
}

/// Offsets are metres from the Bern origin (easting, northing).
fn swiss_to_wgs84(east_offset: f64, north_offset: f64) -> Option<GeoPoint> {
    let y = east_offset / 1_000_000.0;
    let x = north_offset / 1_000_000.0;

    let lambda = 2.677_909_4 + 4.728_982 * y + 0.791_484 * y * x + 0.130_6 * y * x.powi(2)
        - 0.043_6 * y.powi(3);
    let phi = 16.902_389_2 + 3.238_272 * x
        - 0.270_978 * y.powi(2)
        - 0.002_528 * x.powi(2)
        - 0.044_7 * y.powi(2) * x
        - 0.014_0 * x.powi(3);

    // Units of 10000" to degrees.
    GeoPoint::new(phi * 100.0 / 36.0, lambda * 100.0 / 36.0)
}
