//! Record source adapters: fetch raw rows from ArcGIS feature services, CSV
//! exports and zipped shapefiles. Nothing here interprets field meaning;
//! that is the normalizer's job.

mod http;
mod source;

pub mod arcgis;
pub mod csv_export;
pub mod shapefile_zip;

pub use arcgis::ArcGisSource;
pub use csv_export::CsvSource;
pub use http::{HttpClient, SourceError};
pub use shapefile_zip::ShapefileSource;
pub use source::RecordSource;
