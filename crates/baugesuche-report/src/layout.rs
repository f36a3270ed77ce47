//! Pure page layout: permits in, lines grouped into pages out.

use baugesuche_core::{Column, Locale, Permit};
use chrono::NaiveDate;

use crate::ReportOptions;

/// One line of report body text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    pub text: String,
    pub bold: bool,
}

impl Line {
    fn body(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            bold: false,
        }
    }

    fn blank() -> Self {
        Self::body("")
    }
}

/// One page of body lines. The header is drawn by the renderer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    /// 1-based.
    pub number: usize,
    pub lines: Vec<Line>,
}

/// Lay out `permits` in the given order.
///
/// Each permit is a block of lines that starts a new page rather than being
/// split, unless the block alone is taller than a page. An empty list gives
/// one page with the localized "no results" line.
pub fn layout(permits: &[Permit], locale: Locale, options: &ReportOptions) -> Vec<Page> {
    let width = options.max_chars_per_line.max(1);
    let capacity = options.lines_per_page.max(1);

    if permits.is_empty() {
        return vec![Page {
            number: 1,
            lines: wrap(locale.no_results(), width).into_iter().map(Line::body).collect(),
        }];
    }

    let mut pages: Vec<Vec<Line>> = vec![Vec::new()];
    for permit in permits {
        let block = permit_block(permit, locale, width);
        let current = pages.last().map_or(0, Vec::len);
        if current > 0 && current + block.len() > capacity {
            pages.push(Vec::new());
        }
        for line in block {
            let page_full = pages.last().is_some_and(|p| p.len() >= capacity);
            if page_full {
                pages.push(Vec::new());
            }
            if let Some(page) = pages.last_mut() {
                page.push(line);
            }
        }
        // Separator; never carried over to the top of the next page.
        if let Some(page) = pages.last_mut().filter(|p| p.len() < capacity) {
            page.push(Line::blank());
        }
    }

    pages
        .into_iter()
        .map(|mut lines| {
            while lines.last().is_some_and(|l| l.text.is_empty()) {
                lines.pop();
            }
            lines
        })
        .filter(|lines| !lines.is_empty())
        .enumerate()
        .map(|(i, lines)| Page { number: i + 1, lines })
        .collect()
}

fn permit_block(permit: &Permit, locale: Locale, width: usize) -> Vec<Line> {
    let label = |column| locale.column_header(column);
    let mut lines: Vec<Line> = wrap(&locale.text_or_unknown(permit.title.as_deref()), width)
        .into_iter()
        .map(|text| Line { text, bold: true })
        .collect();

    let details = [
        format!(
            "{}: {}, {}: {}",
            label(Column::Municipality),
            locale.text_or_unknown(permit.municipality.as_deref()),
            label(Column::Parcel),
            locale.text_or_unknown(permit.parcel.as_deref()),
        ),
        format!(
            "{}: {}",
            label(Column::Applicant),
            locale.text_or_unknown(permit.applicant.as_deref()),
        ),
        format!(
            "{}: {}, {}: {}",
            label(Column::FilingDate),
            date_or_unknown(locale, permit.filing_date),
            label(Column::DeadlineDate),
            date_or_unknown(locale, permit.deadline_date),
        ),
        format!("{}: {}", label(Column::Id), permit.id),
    ];
    for detail in details {
        lines.extend(wrap(&detail, width).into_iter().map(Line::body));
    }
    lines
}

fn date_or_unknown(locale: Locale, date: Option<NaiveDate>) -> String {
    match date {
        Some(d) => locale.format_date(d),
        None => locale.unknown().to_string(),
    }
}

/// Greedy word wrap at `width` characters. Words longer than a line are
/// split hard.
pub fn wrap(text: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for word in text.split_whitespace() {
        let mut word: Vec<char> = word.chars().collect();
        while word.len() > width {
            if current_len > 0 {
                lines.push(std::mem::take(&mut current));
                current_len = 0;
            }
            let rest = word.split_off(width);
            lines.push(word.into_iter().collect());
            word = rest;
        }
        if word.is_empty() {
            continue;
        }
        let sep = usize::from(current_len > 0);
        if current_len + sep + word.len() > width {
            lines.push(std::mem::take(&mut current));
            current_len = 0;
        } else if sep == 1 {
            current.push(' ');
            current_len += 1;
        }
        current_len += word.len();
        current.extend(word);
    }
    if current_len > 0 {
        lines.push(current);
    }
    lines
}
