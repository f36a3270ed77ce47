pub mod config;
pub mod geo;
pub mod locale;
pub mod mapping;
pub mod normalize;
pub mod permit;
pub mod query;
pub mod raw;
pub mod schema;

pub use config::{AppConfig, ConfigError};
pub use geo::Crs;
pub use locale::{Column, Locale};
pub use mapping::{CoordinateFields, FieldMapping, SourceSchema};
pub use normalize::{NormalizeStats, Normalizer, normalize, normalize_with};
pub use permit::{GeoPoint, Permit};
pub use query::{AbsentDate, AbsentDatePolicy, DateField, QueryParams, SortKey, SortOrder, query};
pub use raw::{RawRow, RawValue};
pub use schema::{permit_schema, permits_to_batch};
