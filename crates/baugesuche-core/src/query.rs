//! Permit query engine: municipality, date and text filters plus ordering.
//!
//! [`query`] is pure. Filters run in a fixed order (municipality → date-from
//! and open deadline → search), each narrowing the working set, then the
//! result is stable-sorted. Permits missing the sort key always end up last,
//! in either direction.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::permit::Permit;

/// Which date the `date_from` filter looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateField {
    #[default]
    Filing,
    Deadline,
}

/// What a date-from filter does with a permit that has no such date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbsentDate {
    Include,
    Exclude,
}

/// Per-field handling of absent dates.
///
/// Defaults: a permit without a filing date cannot be "filed on or after"
/// anything, so it is excluded; a permit without a deadline is treated as
/// still open and passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbsentDatePolicy {
    pub filing: AbsentDate,
    pub deadline: AbsentDate,
}

impl Default for AbsentDatePolicy {
    fn default() -> Self {
        Self {
            filing: AbsentDate::Exclude,
            deadline: AbsentDate::Include,
        }
    }
}

impl AbsentDatePolicy {
    fn for_field(&self, field: DateField) -> AbsentDate {
        match field {
            DateField::Filing => self.filing,
            DateField::Deadline => self.deadline,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    #[default]
    FilingDate,
    DeadlineDate,
}

/// The four orderings offered by the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SortOrder {
    /// Newest filings first.
    #[default]
    #[serde(rename = "filing-desc")]
    FilingDesc,
    #[serde(rename = "filing-asc")]
    FilingAsc,
    /// Nearest deadline first.
    #[serde(rename = "deadline-asc")]
    DeadlineAsc,
    #[serde(rename = "deadline-desc")]
    DeadlineDesc,
}

impl SortOrder {
    pub fn key(self) -> SortKey {
        match self {
            Self::FilingDesc | Self::FilingAsc => SortKey::FilingDate,
            Self::DeadlineAsc | Self::DeadlineDesc => SortKey::DeadlineDate,
        }
    }

    pub fn ascending(self) -> bool {
        matches!(self, Self::FilingAsc | Self::DeadlineAsc)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::FilingDesc => "filing-desc",
            Self::FilingAsc => "filing-asc",
            Self::DeadlineAsc => "deadline-asc",
            Self::DeadlineDesc => "deadline-desc",
        }
    }
}

impl std::str::FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "filing-desc" | "newest" => Ok(Self::FilingDesc),
            "filing-asc" | "oldest" => Ok(Self::FilingAsc),
            "deadline-asc" => Ok(Self::DeadlineAsc),
            "deadline-desc" => Ok(Self::DeadlineDesc),
            other => Err(format!(
                "unknown sort order '{other}' (expected filing-desc, filing-asc, deadline-asc, deadline-desc)"
            )),
        }
    }
}

/// Query parameters. Build with [`QueryParams::as_of`]; the engine never
/// reads the clock, so "today" is always supplied by the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryParams {
    /// Exact-match municipality names; empty means no filtering.
    pub municipalities: BTreeSet<String>,
    pub date_from: Option<NaiveDate>,
    pub date_field: DateField,
    pub absent_dates: AbsentDatePolicy,
    /// Keep only permits whose deadline is unknown or not before `today`.
    pub only_open_deadline: bool,
    pub today: NaiveDate,
    /// Case-insensitive substring over id, title, municipality, applicant.
    pub search_text: Option<String>,
    pub sort_key: SortKey,
    pub sort_ascending: bool,
}

impl QueryParams {
    /// No filters, newest filings first.
    pub fn as_of(today: NaiveDate) -> Self {
        Self {
            municipalities: BTreeSet::new(),
            date_from: None,
            date_field: DateField::default(),
            absent_dates: AbsentDatePolicy::default(),
            only_open_deadline: false,
            today,
            search_text: None,
            sort_key: SortKey::FilingDate,
            sort_ascending: false,
        }
    }

    pub fn with_sort_order(mut self, order: SortOrder) -> Self {
        self.sort_key = order.key();
        self.sort_ascending = order.ascending();
        self
    }

    pub fn with_municipalities<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.municipalities = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_search(mut self, text: impl Into<String>) -> Self {
        self.search_text = Some(text.into());
        self
    }
}

/// Filter and sort `permits`. Never fails; no match is an empty result.
pub fn query(permits: &[Permit], params: &QueryParams) -> Vec<Permit> {
    let mut working: Vec<&Permit> = permits.iter().collect();

    if !params.municipalities.is_empty() {
        working.retain(|p| {
            p.municipality
                .as_ref()
                .is_some_and(|m| params.municipalities.contains(m))
        });
    }

    if let Some(from) = params.date_from {
        let absent = params.absent_dates.for_field(params.date_field);
        working.retain(|p| match date_of(p, params.date_field) {
            Some(d) => d >= from,
            None => absent == AbsentDate::Include,
        });
    }

    if params.only_open_deadline {
        working.retain(|p| p.is_open_on(params.today));
    }

    if let Some(needle) = params
        .search_text
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
    {
        let needle = needle.to_lowercase();
        working.retain(|p| matches_search(p, &needle));
    }

    let key = params.sort_key;
    let ascending = params.sort_ascending;
    working.sort_by(|a, b| compare_dates(sort_date(a, key), sort_date(b, key), ascending));

    working.into_iter().cloned().collect()
}

/// Distinct municipality names, sorted, for a selection list.
pub fn municipalities(permits: &[Permit]) -> Vec<String> {
    let distinct: BTreeSet<&str> = permits
        .iter()
        .filter_map(|p| p.municipality.as_deref())
        .collect();
    distinct.into_iter().map(str::to_string).collect()
}

fn date_of(p: &Permit, field: DateField) -> Option<NaiveDate> {
    match field {
        DateField::Filing => p.filing_date,
        DateField::Deadline => p.deadline_date,
    }
}

fn sort_date(p: &Permit, key: SortKey) -> Option<NaiveDate> {
    match key {
        SortKey::FilingDate => p.filing_date,
        SortKey::DeadlineDate => p.deadline_date,
    }
}

/// Absent keys sort after present ones regardless of direction.
fn compare_dates(a: Option<NaiveDate>, b: Option<NaiveDate>, ascending: bool) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) if ascending => a.cmp(&b),
        (Some(a), Some(b)) => b.cmp(&a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn matches_search(p: &Permit, needle: &str) -> bool {
    [
        Some(p.id.as_str()),
        p.title.as_deref(),
        p.municipality.as_deref(),
        p.applicant.as_deref(),
    ]
    .into_iter()
    .flatten()
    .any(|field| field.to_lowercase().contains(needle))
}
