//! Zipped shapefile download adapter.
//!
//! The archive must contain one `.shp` and one `.dbf` member. Each DBF record
//! becomes one raw row; point shapes are flattened in as `shape.x` / `shape.y`
//! in the file's native CRS (usually LV95).

use std::collections::HashMap;
use std::io::{Cursor, Read};

use async_trait::async_trait;
use baugesuche_core::{RawRow, RawValue, SourceSchema};
use chrono::NaiveDate;
use shapefile::dbase::{self, FieldValue};
use shapefile::Shape;
use tracing::{debug, info};

use crate::http::{HttpClient, SourceError};
use crate::source::RecordSource;

pub struct ShapefileSource {
    http: HttpClient,
    url: String,
}

impl ShapefileSource {
    pub fn new(http: HttpClient, url: impl Into<String>) -> Self {
        Self {
            http,
            url: url.into(),
        }
    }
}

#[async_trait]
impl RecordSource for ShapefileSource {
    fn schema(&self) -> SourceSchema {
        SourceSchema::ShapefileAttributes
    }

    fn url(&self) -> &str {
        &self.url
    }

    async fn fetch(&self, _date_from: Option<NaiveDate>) -> Result<Vec<RawRow>, SourceError> {
        let archive = self.http.get_bytes(&self.url).await?;
        let rows = read_zipped_shapefile(archive)?;
        info!(count = rows.len(), "read shapefile records");
        Ok(rows)
    }
}

/// Extract the `.shp` / `.dbf` pair from a zip archive and read its records.
pub fn read_zipped_shapefile(archive: Vec<u8>) -> Result<Vec<RawRow>, SourceError> {
    let mut zip = zip::ZipArchive::new(Cursor::new(archive))?;
    let names: Vec<String> = zip.file_names().map(str::to_string).collect();

    let shp = member(&mut zip, &names, ".shp")?;
    let dbf = member(&mut zip, &names, ".dbf")?;
    read_shapefile(shp, dbf)
}

fn member(
    zip: &mut zip::ZipArchive<Cursor<Vec<u8>>>,
    names: &[String],
    extension: &'static str,
) -> Result<Vec<u8>, SourceError> {
    let name = names
        .iter()
        .filter(|n| !n.starts_with("__MACOSX/"))
        .find(|n| n.to_ascii_lowercase().ends_with(extension))
        .ok_or(SourceError::MissingMember(extension))?;
    debug!(member = %name, "extracting");
    let mut file = zip.by_name(name)?;
    let mut buf = Vec::with_capacity(file.size() as usize);
    file.read_to_end(&mut buf)?;
    Ok(buf)
}

/// Read shapes and their attribute records from in-memory `.shp` and `.dbf` files.
pub fn read_shapefile(shp: Vec<u8>, dbf: Vec<u8>) -> Result<Vec<RawRow>, SourceError> {
    let shapes = shapefile::ShapeReader::new(Cursor::new(shp))?;
    let records = dbase::Reader::new(Cursor::new(dbf))?;
    let mut reader = shapefile::Reader::new(shapes, records);

    let rows = reader
        .read()?
        .into_iter()
        .map(|(shape, record)| {
            let mut row: RawRow = HashMap::<String, FieldValue>::from(record)
                .into_iter()
                .map(|(name, value)| (name, field_value(value)))
                .collect();
            if let Some((x, y)) = point(&shape) {
                row.insert("shape.x", x);
                row.insert("shape.y", y);
            }
            row
        })
        .collect();
    Ok(rows)
}

/// DBF cells become text or numbers; dates are rendered as `YYYYMMDD`.
fn field_value(value: FieldValue) -> RawValue {
    match value {
        FieldValue::Character(Some(s)) | FieldValue::Memo(s) => RawValue::from(s),
        FieldValue::Numeric(Some(n)) => RawValue::Number(n),
        FieldValue::Float(Some(f)) => RawValue::Number(f64::from(f)),
        FieldValue::Integer(i) => RawValue::Number(f64::from(i)),
        FieldValue::Double(d) | FieldValue::Currency(d) => RawValue::Number(d),
        FieldValue::Logical(Some(b)) => RawValue::Bool(b),
        FieldValue::Date(Some(d)) => {
            RawValue::Text(format!("{:04}{:02}{:02}", d.year(), d.month(), d.day()))
        }
        _ => RawValue::Null,
    }
}

fn point(shape: &Shape) -> Option<(f64, f64)> {
    match shape {
        Shape::Point(p) => Some((p.x, p.y)),
        Shape::PointM(p) => Some((p.x, p.y)),
        Shape::PointZ(p) => Some((p.x, p.y)),
        _ => None,
    }
}
