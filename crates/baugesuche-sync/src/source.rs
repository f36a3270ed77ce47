use async_trait::async_trait;
use baugesuche_core::{RawRow, SourceSchema};
use chrono::NaiveDate;

use crate::SourceError;

/// A record source adapter: fetches raw rows from one data source.
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Which mapping table the rows are shaped for.
    fn schema(&self) -> SourceSchema;

    /// Location of the data, used as the cache key.
    fn url(&self) -> &str;

    /// Whether `date_from` is applied by the source itself. When it is not,
    /// cached rows do not depend on the bound.
    fn filters_by_date(&self) -> bool {
        false
    }

    /// Fetch all rows, optionally restricted to filings on or after `date_from`.
    async fn fetch(&self, date_from: Option<NaiveDate>) -> Result<Vec<RawRow>, SourceError>;
}
