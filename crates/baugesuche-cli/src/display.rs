//! Output renderers for a queried permit list.
//!
//! The table is a localized all-string RecordBatch printed with Arrow's
//! pretty printer; the other formats carry canonical values.

use std::io::Write;
use std::sync::Arc;

use arrow::array::{ArrayRef, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::ipc::writer::FileWriter;
use arrow::record_batch::RecordBatch;
use baugesuche_core::{Column, Locale, Permit, permit_schema, permits_to_batch};
use clap::ValueEnum;
use serde_json::{Value, json};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Localized text table
    #[default]
    Table,
    /// Canonical permits as a JSON array
    Json,
    /// GeoJSON FeatureCollection of located permits
    Geojson,
    /// Arrow IPC file
    Ipc,
}

/// Write `permits` in `format`.
pub fn render(
    out: &mut dyn Write,
    format: OutputFormat,
    permits: &[Permit],
    locale: Locale,
) -> anyhow::Result<()> {
    match format {
        OutputFormat::Table => write_table(out, permits, locale)?,
        OutputFormat::Json => {
            serde_json::to_writer_pretty(&mut *out, permits)?;
            writeln!(out)?;
        }
        OutputFormat::Geojson => {
            serde_json::to_writer_pretty(&mut *out, &geojson(permits))?;
            writeln!(out)?;
        }
        OutputFormat::Ipc => write_ipc(out, permits)?,
    }
    out.flush()?;
    Ok(())
}

// ── Table ──

/// One Utf8 column per display column, headers and values localized.
/// Absent text shows the locale placeholder, absent dates stay empty.
pub fn table_batch(permits: &[Permit], locale: Locale) -> Result<RecordBatch, arrow::error::ArrowError> {
    let fields: Vec<Field> = Column::ALL
        .iter()
        .map(|&c| Field::new(locale.column_header(c), DataType::Utf8, false))
        .collect();
    let columns: Vec<ArrayRef> = Column::ALL
        .iter()
        .map(|&c| {
            let values: Vec<String> = permits.iter().map(|p| cell(p, c, locale)).collect();
            Arc::new(StringArray::from(values)) as ArrayRef
        })
        .collect();
    RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)
}

fn cell(permit: &Permit, column: Column, locale: Locale) -> String {
    match column {
        Column::Id => permit.id.clone(),
        Column::Title => locale.text_or_unknown(permit.title.as_deref()),
        Column::Municipality => locale.text_or_unknown(permit.municipality.as_deref()),
        Column::Parcel => locale.text_or_unknown(permit.parcel.as_deref()),
        Column::Applicant => locale.text_or_unknown(permit.applicant.as_deref()),
        Column::FilingDate => locale.format_optional_date(permit.filing_date),
        Column::DeadlineDate => locale.format_optional_date(permit.deadline_date),
    }
}

fn write_table(out: &mut dyn Write, permits: &[Permit], locale: Locale) -> anyhow::Result<()> {
    if permits.is_empty() {
        writeln!(out, "{}", locale.no_results())?;
        return Ok(());
    }
    let batch = table_batch(permits, locale)?;
    writeln!(out, "{}", arrow::util::pretty::pretty_format_batches(&[batch])?)?;
    Ok(())
}

// ── GeoJSON ──

/// Point features for permits with a location; others are left out.
pub fn geojson(permits: &[Permit]) -> Value {
    let features: Vec<Value> = permits
        .iter()
        .filter_map(|p| {
            let location = p.location?;
            Some(json!({
                "type": "Feature",
                "id": p.id,
                "geometry": {
                    "type": "Point",
                    "coordinates": [location.longitude(), location.latitude()],
                },
                "properties": {
                    "title": p.title,
                    "municipality": p.municipality,
                    "applicant": p.applicant,
                    "parcel": p.parcel,
                    "filing_date": p.filing_date,
                    "deadline_date": p.deadline_date,
                },
            }))
        })
        .collect();
    json!({ "type": "FeatureCollection", "features": features })
}

// ── Arrow IPC ──

fn write_ipc(out: &mut dyn Write, permits: &[Permit]) -> anyhow::Result<()> {
    let batch = permits_to_batch(permits)?;
    let mut writer = FileWriter::try_new(out, &permit_schema())?;
    writer.write(&batch)?;
    writer.finish()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::ipc::reader::FileReader;
    use baugesuche_core::GeoPoint;
    use chrono::NaiveDate;
    use std::io::Cursor;

    fn permits() -> Vec<Permit> {
        vec![
            Permit {
                title: Some("Neubau Carport".into()),
                municipality: Some("Münsingen".into()),
                filing_date: NaiveDate::from_ymd_opt(2025, 6, 5),
                location: GeoPoint::new(46.87, 7.56),
                ..Permit::bare("BG-1")
            },
            Permit::bare("BG-2"),
        ]
    }

    fn rendered(format: OutputFormat, permits: &[Permit], locale: Locale) -> Vec<u8> {
        let mut buf = Vec::new();
        render(&mut buf, format, permits, locale).unwrap();
        buf
    }

    #[test]
    fn table_is_localized() {
        let batch = table_batch(&permits(), Locale::De).unwrap();
        let schema = batch.schema();
        let headers: Vec<&str> = schema.fields().iter().map(|f| f.name().as_str()).collect();
        assert_eq!(
            headers,
            vec!["Projektname", "Ort", "Parzelle", "Bauherr", "Auflagefrist", "Eingangsdatum", "ID"]
        );

        let text = String::from_utf8(rendered(OutputFormat::Table, &permits(), Locale::De)).unwrap();
        assert!(text.contains("Neubau Carport"));
        assert!(text.contains("05.06.2025"));
        assert!(text.contains("Unbekannt"));
    }

    #[test]
    fn empty_table_is_a_message() {
        let text = String::from_utf8(rendered(OutputFormat::Table, &[], Locale::En)).unwrap();
        assert_eq!(text, "No permit applications found.\n");
    }

    #[test]
    fn json_keeps_canonical_values() {
        let value: Value = serde_json::from_slice(&rendered(OutputFormat::Json, &permits(), Locale::Fr)).unwrap();
        assert_eq!(value[0]["filing_date"], "2025-06-05");
        assert_eq!(value[1]["title"], Value::Null);
    }

    #[test]
    fn geojson_skips_unlocated() {
        let value = geojson(&permits());
        let features = value["features"].as_array().unwrap();
        assert_eq!(features.len(), 1);
        assert_eq!(features[0]["id"], "BG-1");
        assert_eq!(features[0]["geometry"]["coordinates"][0], 7.56);
        assert_eq!(features[0]["properties"]["filing_date"], "2025-06-05");
    }

    #[test]
    fn ipc_reads_back() {
        let bytes = rendered(OutputFormat::Ipc, &permits(), Locale::De);
        let reader = FileReader::try_new(Cursor::new(bytes), None).unwrap();
        let batches: Vec<RecordBatch> = reader.collect::<Result<_, _>>().unwrap();
        assert_eq!(batches[0].num_rows(), 2);
        assert_eq!(batches[0].schema().as_ref(), &permit_schema());
    }
}
