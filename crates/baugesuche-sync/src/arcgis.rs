//! ArcGIS REST feature service adapter.
//!
//! Queries `{layer}/query` with `f=json`, asks for WGS84 geometry
//! (`outSR=4326`) and follows `exceededTransferLimit` paging. Each feature's
//! `attributes` become one raw row; point geometry is flattened in as
//! `geometry.x` / `geometry.y`, always as WGS84 longitude / latitude. A
//! service that answers in another spatial reference is reprojected here.

use std::collections::HashSet;

use async_trait::async_trait;
use baugesuche_core::{Crs, RawRow, RawValue, SourceSchema};
use chrono::{NaiveDate, TimeZone};
use chrono_tz::Tz;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::http::{HttpClient, SourceError};
use crate::source::RecordSource;

/// Safety stop for services that keep reporting more pages.
const MAX_PAGES: usize = 200;

pub struct ArcGisSource {
    http: HttpClient,
    url: String,
    date_field: String,
    time_zone: Tz,
}

#[derive(Deserialize)]
struct QueryResponse {
    #[serde(default = "default_object_id_field", rename = "objectIdFieldName")]
    object_id_field: String,
    #[serde(rename = "spatialReference")]
    spatial_reference: Option<SpatialReference>,
    #[serde(default)]
    features: Vec<Feature>,
    #[serde(default, rename = "exceededTransferLimit")]
    exceeded_transfer_limit: bool,
    error: Option<ErrorBody>,
}

fn default_object_id_field() -> String {
    "OBJECTID".to_string()
}

#[derive(Deserialize)]
struct SpatialReference {
    wkid: Option<u32>,
    #[serde(rename = "latestWkid")]
    latest_wkid: Option<u32>,
}

impl SpatialReference {
    fn crs(&self) -> Crs {
        self.latest_wkid.or(self.wkid).map_or(Crs::Wgs84, Crs::from_epsg)
    }
}

#[derive(Deserialize)]
struct Feature {
    #[serde(default)]
    attributes: serde_json::Map<String, serde_json::Value>,
    geometry: Option<PointGeometry>,
}

/// Only point geometry is used; polygons and lines leave both fields empty.
#[derive(Deserialize)]
struct PointGeometry {
    x: Option<f64>,
    y: Option<f64>,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

/// One page of a feature query.
#[derive(Debug)]
pub struct FeaturePage {
    pub rows: Vec<RawRow>,
    /// Object id of each row, parallel to `rows`.
    pub object_ids: Vec<Option<i64>>,
    pub exceeded_transfer_limit: bool,
}

/// Rows gathered across pages, deduplicated by object id.
#[derive(Debug, Default)]
struct Collected {
    rows: Vec<RawRow>,
    seen: HashSet<i64>,
}

impl Collected {
    /// Append a page and return how many of its features were new.
    fn add(&mut self, page: FeaturePage) -> usize {
        let before = self.rows.len();
        for (row, id) in page.rows.into_iter().zip(page.object_ids) {
            if id.is_some_and(|id| !self.seen.insert(id)) {
                continue;
            }
            self.rows.push(row);
        }
        self.rows.len() - before
    }
}

impl ArcGisSource {
    /// `url` is the layer's query endpoint, e.g. `.../FeatureServer/0/query`.
    pub fn new(http: HttpClient, url: impl Into<String>) -> Self {
        Self {
            http,
            url: url.into().trim_end_matches('/').to_string(),
            date_field: "Eingangsdatum".to_string(),
            time_zone: chrono_tz::Europe::Zurich,
        }
    }

    /// Attribute the `date_from` bound is applied to.
    pub fn with_date_field(mut self, field: impl Into<String>) -> Self {
        self.date_field = field.into();
        self
    }

    /// Zone in which `date_from` midnight is interpreted.
    pub fn with_time_zone(mut self, tz: Tz) -> Self {
        self.time_zone = tz;
        self
    }

    /// SQL `where` clause: filings from midnight of `date_from` in the feed zone.
    pub fn where_clause(&self, date_from: Option<NaiveDate>) -> String {
        let millis = date_from
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .and_then(|midnight| self.time_zone.from_local_datetime(&midnight).earliest())
            .map(|start| start.timestamp_millis());
        match millis {
            Some(ms) => format!("{} >= {ms}", self.date_field),
            None => "1=1".to_string(),
        }
    }

    fn query_params(&self, date_from: Option<NaiveDate>, offset: usize) -> Vec<(&'static str, String)> {
        vec![
            ("where", self.where_clause(date_from)),
            ("outFields", "*".to_string()),
            ("returnGeometry", "true".to_string()),
            ("outSR", "4326".to_string()),
            ("resultOffset", offset.to_string()),
            ("f", "json".to_string()),
        ]
    }
}

#[async_trait]
impl RecordSource for ArcGisSource {
    fn schema(&self) -> SourceSchema {
        SourceSchema::ArcGisFeature
    }

    fn url(&self) -> &str {
        &self.url
    }

    fn filters_by_date(&self) -> bool {
        true
    }

    async fn fetch(&self, date_from: Option<NaiveDate>) -> Result<Vec<RawRow>, SourceError> {
        let mut collected = Collected::default();
        let mut offset = 0;
        for page_no in 0..MAX_PAGES {
            let body = self
                .http
                .get_text(&self.url, &self.query_params(date_from, offset))
                .await?;
            let page = parse_response(&body)?;
            let received = page.rows.len();
            let more = page.exceeded_transfer_limit;
            offset += received;

            let added = collected.add(page);
            debug!(page = page_no, features = received, added, "fetched feature page");
            if added == 0 && received > 0 {
                warn!(page = page_no, "service repeated a page, stopping");
            }
            if !more || added == 0 {
                info!(count = collected.rows.len(), "fetched ArcGIS features");
                return Ok(collected.rows);
            }
        }
        warn!(pages = MAX_PAGES, count = collected.rows.len(), "stopped paging ArcGIS features");
        Ok(collected.rows)
    }
}

/// Parse one `f=json` query response.
pub fn parse_response(body: &str) -> Result<FeaturePage, SourceError> {
    let resp: QueryResponse = serde_json::from_str(body)?;
    if let Some(err) = resp.error {
        return Err(SourceError::ArcGis {
            code: err.code,
            message: err.message,
        });
    }

    let crs = resp.spatial_reference.as_ref().map_or(Crs::Wgs84, SpatialReference::crs);
    if crs != Crs::Wgs84 {
        debug!(?crs, "reprojecting feature geometry");
    }

    let mut rows = Vec::with_capacity(resp.features.len());
    let mut object_ids = Vec::with_capacity(resp.features.len());
    let mut unprojected = 0usize;
    for feature in resp.features {
        let mut row: RawRow = feature
            .attributes
            .iter()
            .map(|(k, v)| (k.clone(), RawValue::from(v)))
            .collect();
        if let Some(PointGeometry { x: Some(x), y: Some(y) }) = feature.geometry {
            match crs.to_wgs84(x, y) {
                Some(point) => {
                    row.insert("geometry.x", point.longitude());
                    row.insert("geometry.y", point.latitude());
                }
                None => unprojected += 1,
            }
        }
        object_ids.push(feature.attributes.get(&resp.object_id_field).and_then(|v| v.as_i64()));
        rows.push(row);
    }
    if unprojected > 0 {
        warn!(?crs, count = unprojected, "dropped geometry that cannot be reprojected");
    }

    Ok(FeaturePage {
        rows,
        object_ids,
        exceeded_transfer_limit: resp.exceeded_transfer_limit,
    })
}
