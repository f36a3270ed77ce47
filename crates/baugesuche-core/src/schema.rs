//! Arrow schema for canonical permit collections.

use std::sync::Arc;

use arrow::array::{ArrayRef, Date32Array, Float64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::error::ArrowError;
use arrow::record_batch::RecordBatch;
use chrono::NaiveDate;

use crate::permit::Permit;

/// Schema of a permit batch. Dates are `Date32`, coordinates WGS84 degrees.
pub fn permit_schema() -> Schema {
    Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new("title", DataType::Utf8, true),
        Field::new("municipality", DataType::Utf8, true),
        Field::new("applicant", DataType::Utf8, true),
        Field::new("parcel", DataType::Utf8, true),
        Field::new("filing_date", DataType::Date32, true),
        Field::new("deadline_date", DataType::Date32, true),
        Field::new("latitude", DataType::Float64, true),
        Field::new("longitude", DataType::Float64, true),
    ])
}

/// Build one RecordBatch holding `permits` in order.
pub fn permits_to_batch(permits: &[Permit]) -> Result<RecordBatch, ArrowError> {
    let text = |f: fn(&Permit) -> Option<&str>| -> ArrayRef {
        Arc::new(permits.iter().map(f).collect::<StringArray>())
    };
    let date = |f: fn(&Permit) -> Option<NaiveDate>| -> ArrayRef {
        Arc::new(
            permits
                .iter()
                .map(|p| f(p).map(days_since_epoch))
                .collect::<Date32Array>(),
        )
    };

    let columns: Vec<ArrayRef> = vec![
        Arc::new(permits.iter().map(|p| Some(p.id.as_str())).collect::<StringArray>()),
        text(|p| p.title.as_deref()),
        text(|p| p.municipality.as_deref()),
        text(|p| p.applicant.as_deref()),
        text(|p| p.parcel.as_deref()),
        date(|p| p.filing_date),
        date(|p| p.deadline_date),
        Arc::new(
            permits
                .iter()
                .map(|p| p.location.map(|l| l.latitude()))
                .collect::<Float64Array>(),
        ),
        Arc::new(
            permits
                .iter()
                .map(|p| p.location.map(|l| l.longitude()))
                .collect::<Float64Array>(),
        ),
    ];

    RecordBatch::try_new(Arc::new(permit_schema()), columns)
}

fn days_since_epoch(date: NaiveDate) -> i32 {
    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default();
    (date - epoch).num_days() as i32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permit::GeoPoint;
    use arrow::array::Array;

    #[test]
    fn permit_schema_has_expected_fields() {
        let schema = permit_schema();
        assert_eq!(schema.fields().len(), 9);
        assert!(!schema.field_with_name("id").unwrap().is_nullable());
        assert_eq!(
            schema.field_with_name("deadline_date").unwrap().data_type(),
            &DataType::Date32
        );
    }

    #[test]
    fn batch_preserves_order_and_nulls() {
        let mut a = Permit::bare("a");
        a.title = Some("Garage".into());
        a.filing_date = NaiveDate::from_ymd_opt(1970, 1, 11);
        a.location = GeoPoint::new(46.95, 7.44);
        let b = Permit::bare("b");

        let batch = permits_to_batch(&[a, b]).unwrap();
        assert_eq!(batch.num_rows(), 2);

        let ids = batch
            .column_by_name("id")
            .unwrap()
            .as_any()
            .downcast_ref::<StringArray>()
            .unwrap();
        assert_eq!(ids.value(0), "a");
        assert_eq!(ids.value(1), "b");

        let filing = batch
            .column_by_name("filing_date")
            .unwrap()
            .as_any()
            .downcast_ref::<Date32Array>()
            .unwrap();
        assert_eq!(filing.value(0), 10);
        assert!(filing.is_null(1));

        let title = batch.column_by_name("title").unwrap();
        assert!(title.is_null(1));
        let lat = batch
            .column_by_name("latitude")
            .unwrap()
            .as_any()
            .downcast_ref::<Float64Array>()
            .unwrap();
        assert_eq!(lat.value(0), 46.95);
    }

    #[test]
    fn empty_collection_builds_empty_batch() {
        let batch = permits_to_batch(&[]).unwrap();
        assert_eq!(batch.num_rows(), 0);
        assert_eq!(batch.num_columns(), 9);
    }
}
