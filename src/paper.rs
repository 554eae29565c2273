use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeSet;

/// A paper record as kept in the library
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Paper {
    /// Stable identifier derived from source and source id, e.g. `Arxiv-2101.00001`
    pub id: String,
    /// Known source key (`arxiv`, `openreview`, ...)
    #[serde(default)]
    pub source: String,
    pub title: String,
    /// Authors joined with " and "
    #[serde(default)]
    pub author: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<String>,
    #[serde(default)]
    pub pdf_link: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub venue: Option<String>,
    /// Free text owned by the user
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bibtex: Option<String>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub favorite: bool,
    #[serde(default, deserialize_with = "lenient_date", skip_serializing_if = "Option::is_none")]
    pub favorite_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub count: u32,
    #[serde(default, deserialize_with = "lenient_date", skip_serializing_if = "Option::is_none")]
    pub add_date: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_date", skip_serializing_if = "Option::is_none")]
    pub last_open_date: Option<DateTime<Utc>>,
    /// Keys written by other tools, kept as-is
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Paper {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source: String::new(),
            title: title.into(),
            author: String::new(),
            year: None,
            pdf_link: String::new(),
            code_link: None,
            venue: None,
            note: None,
            bibtex: None,
            tags: BTreeSet::new(),
            favorite: false,
            favorite_date: None,
            count: 0,
            add_date: None,
            last_open_date: None,
            extra: serde_json::Map::new(),
        }
    }

    /// Current value of a reconciled field
    pub fn field(&self, field: Field) -> Option<&str> {
        match field {
            Field::Venue => self.venue.as_deref(),
            Field::Bibtex => self.bibtex.as_deref(),
            Field::Note => self.note.as_deref(),
            Field::CodeLink => self.code_link.as_deref(),
        }
    }

    pub(crate) fn set_field(&mut self, field: Field, value: String) {
        match field {
            Field::Venue => self.venue = Some(value),
            Field::Bibtex => self.bibtex = Some(value),
            Field::Note => self.note = Some(value),
            Field::CodeLink => self.code_link = Some(value),
        }
    }

    /// Whether the paper still needs a venue
    pub fn lacks_venue(&self) -> bool {
        is_blank(self.venue.as_deref())
    }

    /// Normalize title for comparison (lowercase, remove extra whitespace)
    pub fn normalized_title(&self) -> String {
        normalize_string(&self.title)
    }
}

/// The fields a provider may contribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Field {
    Venue,
    Bibtex,
    Note,
    CodeLink,
}

/// How a provider value competes with a value already present
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergePolicy {
    /// Only set when currently empty
    FillMissing,
    /// Always replace
    Overwrite,
}

impl Field {
    pub const ALL: [Field; 4] = [Field::Venue, Field::Bibtex, Field::Note, Field::CodeLink];

    pub fn policy(self) -> MergePolicy {
        match self {
            Field::Bibtex => MergePolicy::Overwrite,
            Field::Venue | Field::Note | Field::CodeLink => MergePolicy::FillMissing,
        }
    }
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Field::Venue => write!(f, "venue"),
            Field::Bibtex => write!(f, "bibtex"),
            Field::Note => write!(f, "note"),
            Field::CodeLink => write!(f, "codeLink"),
        }
    }
}

/// Optional-field record used both for one provider's answer and for staged changes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldValues {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub venue: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bibtex: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    /// Code repository link, reported by providers as `url`
    #[serde(default, rename = "url", skip_serializing_if = "Option::is_none")]
    pub code_link: Option<String>,
}

impl FieldValues {
    pub fn get(&self, field: Field) -> Option<&str> {
        match field {
            Field::Venue => self.venue.as_deref(),
            Field::Bibtex => self.bibtex.as_deref(),
            Field::Note => self.note.as_deref(),
            Field::CodeLink => self.code_link.as_deref(),
        }
    }

    pub fn set(&mut self, field: Field, value: String) {
        match field {
            Field::Venue => self.venue = Some(value),
            Field::Bibtex => self.bibtex = Some(value),
            Field::Note => self.note = Some(value),
            Field::CodeLink => self.code_link = Some(value),
        }
    }

    /// Present, non-blank values in field order
    pub fn iter(&self) -> impl Iterator<Item = (Field, &str)> + '_ {
        Field::ALL
            .into_iter()
            .filter_map(move |f| self.get(f).filter(|v| !v.trim().is_empty()).map(|v| (f, v)))
    }

    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }
}

/// Changes proposed for one paper, awaiting approval or immediate commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingUpdate {
    pub paper_id: String,
    pub title: String,
    pub changes: FieldValues,
}

/// Accepts RFC 3339 strings and epoch milliseconds. `null` and `""` mean no date.
fn lenient_date<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Millis(i64),
    }

    match Option::<Raw>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Raw::Text(text)) if text.trim().is_empty() => Ok(None),
        Some(Raw::Text(text)) => DateTime::parse_from_rfc3339(text.trim())
            .map(|date| Some(date.with_timezone(&Utc)))
            .map_err(serde::de::Error::custom),
        Some(Raw::Millis(ms)) => DateTime::from_timestamp_millis(ms)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("timestamp out of range: {}", ms))),
    }
}

pub(crate) fn is_blank(value: Option<&str>) -> bool {
    value.map_or(true, |v| v.trim().is_empty())
}

/// Normalize a string for comparison: lowercase, collapse whitespace, remove punctuation
pub fn normalize_string(s: &str) -> String {
    s.to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
