//! Paginated PDF reports of a permit list.
//!
//! [`layout`] is pure and decides what goes on which page; [`render_pdf`]
//! draws those pages with `printpdf` using the built-in Helvetica fonts.

pub mod layout;
mod pdf;

pub use layout::{Line, Page, layout};
pub use pdf::render_pdf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("PDF rendering failed: {0}")]
    Pdf(#[from] printpdf::Error),
}

/// Page geometry and typography knobs.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportOptions {
    /// Overrides the localized report title.
    pub title: Option<String>,
    pub max_chars_per_line: usize,
    pub lines_per_page: usize,
    /// Body font size in points.
    pub font_size: f32,
    pub line_height_mm: f32,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            title: None,
            max_chars_per_line: 90,
            lines_per_page: 48,
            font_size: 10.0,
            line_height_mm: 5.0,
        }
    }
}
