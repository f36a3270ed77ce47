use baugesuche_core::{Locale, Permit};
use printpdf::{BuiltinFont, IndirectFontRef, Mm, PdfDocument, PdfLayerReference};
use tracing::info;

use crate::layout::{Page, layout};
use crate::{ReportError, ReportOptions};

const PAGE_WIDTH: Mm = Mm(210.0);
const PAGE_HEIGHT: Mm = Mm(297.0);
const MARGIN_LEFT: f32 = 20.0;
const MARGIN_RIGHT: f32 = 20.0;
const HEADER_BASELINE: f32 = 280.0;
const BODY_TOP: f32 = 265.0;
const HEADER_FONT_SIZE: f32 = 14.0;
const LABEL_FONT_SIZE: f32 = 10.0;
const MM_PER_PT: f32 = 0.3528;
/// Average Helvetica advance width in em; exact for digits.
const HELVETICA_EM: f32 = 0.556;

struct Fonts {
    regular: IndirectFontRef,
    bold: IndirectFontRef,
}

/// Render `permits` as an A4 PDF and return the document bytes.
pub fn render_pdf(permits: &[Permit], locale: Locale, options: &ReportOptions) -> Result<Vec<u8>, ReportError> {
    let pages = layout(permits, locale, options);
    let total = pages.len();
    let title = options.title.as_deref().unwrap_or(locale.report_title());

    let (doc, first_page, first_layer) =
        PdfDocument::new(title, PAGE_WIDTH, PAGE_HEIGHT, locale.page_label(1, total));
    let fonts = Fonts {
        regular: doc.add_builtin_font(BuiltinFont::Helvetica)?,
        bold: doc.add_builtin_font(BuiltinFont::HelveticaBold)?,
    };

    for page in &pages {
        let layer = if page.number == 1 {
            doc.get_page(first_page).get_layer(first_layer)
        } else {
            let (p, l) = doc.add_page(PAGE_WIDTH, PAGE_HEIGHT, locale.page_label(page.number, total));
            doc.get_page(p).get_layer(l)
        };
        draw_header(&layer, &fonts, title, &locale.page_label(page.number, total));
        draw_body(&layer, &fonts, page, options);
    }

    let bytes = doc.save_to_bytes()?;
    info!(permits = permits.len(), pages = total, bytes = bytes.len(), "rendered PDF report");
    Ok(bytes)
}

fn draw_header(layer: &PdfLayerReference, fonts: &Fonts, title: &str, page_label: &str) {
    layer.use_text(title, HEADER_FONT_SIZE, Mm(MARGIN_LEFT), Mm(HEADER_BASELINE), &fonts.bold);

    layer.use_text(page_label, LABEL_FONT_SIZE, Mm(label_x(page_label)), Mm(HEADER_BASELINE), &fonts.regular);
}

/// Approximate rendered width in millimetres.
fn text_width(text: &str, font_size: f32) -> f32 {
    text.chars().count() as f32 * HELVETICA_EM * font_size * MM_PER_PT
}

/// Left edge that puts the page label's right edge on the right margin.
fn label_x(page_label: &str) -> f32 {
    PAGE_WIDTH.0 - MARGIN_RIGHT - text_width(page_label, LABEL_FONT_SIZE)
}

fn draw_body(layer: &PdfLayerReference, fonts: &Fonts, page: &Page, options: &ReportOptions) {
    let mut y = BODY_TOP;
    for line in &page.lines {
        if !line.text.is_empty() {
            let font = if line.bold { &fonts.bold } else { &fonts.regular };
            layer.use_text(line.text.as_str(), options.font_size, Mm(MARGIN_LEFT), Mm(y), font);
        }
        y -= options.line_height_mm;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn permits(n: usize) -> Vec<Permit> {
        (0..n)
            .map(|i| Permit {
                title: Some(format!("Anbau Wintergarten {i}")),
                municipality: Some("Köniz".into()),
                deadline_date: NaiveDate::from_ymd_opt(2025, 7, 1),
                ..Permit::bare(format!("BG-{i}"))
            })
            .collect()
    }

    #[test]
    fn produces_a_pdf_document() {
        let bytes = render_pdf(&permits(3), Locale::De, &ReportOptions::default()).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }

    #[test]
    fn empty_report_still_renders() {
        let bytes = render_pdf(&[], Locale::En, &ReportOptions::default()).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }

    #[test]
    fn many_pages() {
        let options = ReportOptions {
            lines_per_page: 12,
            ..ReportOptions::default()
        };
        let few = render_pdf(&permits(2), Locale::It, &options).unwrap();
        let many = render_pdf(&permits(40), Locale::It, &options).unwrap();
        assert!(many.len() > few.len());
    }

    #[test]
    fn page_label_ends_at_right_margin() {
        for label in ["Seite 1 / 1", "Pagina 12 / 140"] {
            let right = label_x(label) + text_width(label, LABEL_FONT_SIZE);
            assert!((right - (PAGE_WIDTH.0 - MARGIN_RIGHT)).abs() < 1e-3);
        }
        assert!(label_x("Pagina 12 / 140") < label_x("Page 1 / 2"));
        assert!(label_x("Page 1 / 2") > MARGIN_LEFT);
    }

    #[test]
    fn custom_title() {
        let options = ReportOptions {
            title: Some("Baugesuche Gemeinde Köniz".into()),
            ..ReportOptions::default()
        };
        assert!(render_pdf(&permits(1), Locale::De, &options).is_ok());
    }
}
