//! CSV export API adapter.
//!
//! Cells are kept as text; the normalizer decides what is a date or a
//! coordinate. The export has no server-side date filter, so `date_from` is
//! left to the query engine.

use async_trait::async_trait;
use baugesuche_core::{RawRow, RawValue, SourceSchema};
use chrono::NaiveDate;
use tracing::info;

use crate::http::{HttpClient, SourceError};
use crate::source::RecordSource;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

pub struct CsvSource {
    http: HttpClient,
    url: String,
    delimiter: u8,
}

impl CsvSource {
    pub fn new(http: HttpClient, url: impl Into<String>) -> Self {
        Self {
            http,
            url: url.into(),
            delimiter: b';',
        }
    }

    /// Field delimiter; Swiss exports usually use `;`.
    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }
}

#[async_trait]
impl RecordSource for CsvSource {
    fn schema(&self) -> SourceSchema {
        SourceSchema::CsvRow
    }

    fn url(&self) -> &str {
        &self.url
    }

    async fn fetch(&self, _date_from: Option<NaiveDate>) -> Result<Vec<RawRow>, SourceError> {
        let body = self.http.get_bytes(&self.url).await?;
        let rows = parse_csv(&body, self.delimiter)?;
        info!(count = rows.len(), "fetched CSV rows");
        Ok(rows)
    }
}

/// Parse a CSV document with a header row into raw rows.
///
/// Short rows are padded with absent values, surplus cells are dropped, and
/// fully empty lines are skipped.
pub fn parse_csv(data: &[u8], delimiter: u8) -> Result<Vec<RawRow>, SourceError> {
    let data = data.strip_prefix(UTF8_BOM).unwrap_or(data);
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(data);

    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        if record.iter().all(str::is_empty) {
            continue;
        }
        let row: RawRow = headers
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let value = match record.get(i) {
                    Some(cell) if !cell.is_empty() => RawValue::from(cell),
                    _ => RawValue::Null,
                };
                (name.clone(), value)
            })
            .collect();
        rows.push(row);
    }
    Ok(rows)
}
