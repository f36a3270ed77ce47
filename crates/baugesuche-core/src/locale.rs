//! Display-boundary localization.
//!
//! The canonical [`Permit`](crate::Permit) carries plain calendar dates and
//! optional text. Turning those into user-facing strings happens here, with
//! the locale always passed in by the caller.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    #[default]
    De,
    Fr,
    It,
    En,
}

/// Columns shown by table and report renderers, in display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    Id,
    Title,
    Municipality,
    Parcel,
    Applicant,
    FilingDate,
    DeadlineDate,
}

impl Column {
    pub const ALL: [Column; 7] = [
        Column::Title,
        Column::Municipality,
        Column::Parcel,
        Column::Applicant,
        Column::DeadlineDate,
        Column::FilingDate,
        Column::Id,
    ];
}

impl Locale {
    pub fn tag(self) -> &'static str {
        match self {
            Self::De => "de",
            Self::Fr => "fr",
            Self::It => "it",
            Self::En => "en",
        }
    }

    /// Locale data used for month names.
    fn chrono_locale(self) -> chrono::Locale {
        match self {
            Self::De => chrono::Locale::de_CH,
            Self::Fr => chrono::Locale::fr_CH,
            Self::It => chrono::Locale::it_CH,
            Self::En => chrono::Locale::en_US,
        }
    }

    /// Medium date format as used in Swiss publications.
    pub fn format_date(self, date: NaiveDate) -> String {
        let pattern = match self {
            Self::De => "%d.%m.%Y",
            Self::Fr | Self::It => "%-d %b %Y",
            Self::En => "%b %-d, %Y",
        };
        date.format_localized(pattern, self.chrono_locale()).to_string()
    }

    /// Empty string for an absent date.
    pub fn format_optional_date(self, date: Option<NaiveDate>) -> String {
        date.map(|d| self.format_date(d)).unwrap_or_default()
    }

    /// Placeholder for absent text attributes.
    pub fn unknown(self) -> &'static str {
        match self {
            Self::De => "Unbekannt",
            Self::Fr => "Inconnu",
            Self::It => "Sconosciuto",
            Self::En => "Unknown",
        }
    }

    pub fn text_or_unknown(self, value: Option<&str>) -> String {
        value.unwrap_or(self.unknown()).to_string()
    }

    pub fn column_header(self, column: Column) -> &'static str {
        use Column::*;
        match (self, column) {
            (_, Id) => "ID",
            (Self::De, Title) => "Projektname",
            (Self::De, Municipality) => "Ort",
            (Self::De, Parcel) => "Parzelle",
            (Self::De, Applicant) => "Bauherr",
            (Self::De, FilingDate) => "Eingangsdatum",
            (Self::De, DeadlineDate) => "Auflagefrist",
            (Self::Fr, Title) => "Projet",
            (Self::Fr, Municipality) => "Commune",
            (Self::Fr, Parcel) => "Parcelle",
            (Self::Fr, Applicant) => "Maître d'ouvrage",
            (Self::Fr, FilingDate) => "Date de dépôt",
            (Self::Fr, DeadlineDate) => "Délai d'opposition",
            (Self::It, Title) => "Progetto",
            (Self::It, Municipality) => "Comune",
            (Self::It, Parcel) => "Particella",
            (Self::It, Applicant) => "Committente",
            (Self::It, FilingDate) => "Data di deposito",
            (Self::It, DeadlineDate) => "Termine di opposizione",
            (Self::En, Title) => "Project",
            (Self::En, Municipality) => "Municipality",
            (Self::En, Parcel) => "Parcel",
            (Self::En, Applicant) => "Applicant",
            (Self::En, FilingDate) => "Filed",
            (Self::En, DeadlineDate) => "Objection deadline",
        }
    }

    pub fn report_title(self) -> &'static str {
        match self {
            Self::De => "Baugesuche",
            Self::Fr => "Mises à l'enquête",
            Self::It => "Domande di costruzione",
            Self::En => "Building permit applications",
        }
    }

    pub fn found(self, count: usize) -> String {
        match self {
            Self::De => format!("{count} Baugesuche gefunden."),
            Self::Fr => format!("{count} mises à l'enquête trouvées."),
            Self::It => format!("{count} domande di costruzione trovate."),
            Self::En => format!("{count} permit applications found."),
        }
    }

    pub fn no_results(self) -> &'static str {
        match self {
            Self::De => "Keine Baugesuche gefunden.",
            Self::Fr => "Aucune mise à l'enquête trouvée.",
            Self::It => "Nessuna domanda di costruzione trovata.",
            Self::En => "No permit applications found.",
        }
    }

    pub fn new_since_last_visit(self, count: usize) -> String {
        match self {
            Self::De => format!("{count} neue Baugesuche seit dem letzten Besuch."),
            Self::Fr => format!("{count} nouvelles mises à l'enquête depuis la dernière visite."),
            Self::It => format!("{count} nuove domande dall'ultima visita."),
            Self::En => format!("{count} new applications since your last visit."),
        }
    }

    pub fn source_unavailable(self) -> &'static str {
        match self {
            Self::De => "Fehler beim Abrufen der Daten. Bitte versuche es später erneut.",
            Self::Fr => "Erreur lors du chargement des données.",
            Self::It => "Errore durante il caricamento dei dati.",
            Self::En => "Could not load data. Please try again later.",
        }
    }

    pub fn page_label(self, page: usize, total: usize) -> String {
        match self {
            Self::De => format!("Seite {page} / {total}"),
            Self::Fr => format!("Page {page} / {total}"),
            Self::It => format!("Pagina {page} / {total}"),
            Self::En => format!("Page {page} / {total}"),
        }
    }
}

impl std::str::FromStr for Locale {
    type Err = String;

    /// Accepts bare tags and region variants: `de`, `fr-CH`, `it_CH.UTF-8`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lang = s
            .trim()
            .split(['-', '_', '.'])
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();
        match lang.as_str() {
            "de" => Ok(Self::De),
            "fr" => Ok(Self::Fr),
            "it" => Ok(Self::It),
            "en" => Ok(Self::En),
            _ => Err(format!("unsupported locale '{s}' (expected de, fr, it or en)")),
        }
    }
}

impl std::fmt::Display for Locale {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}
