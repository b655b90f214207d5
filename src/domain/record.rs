//! Scraped order records, their natural key and the persisted key set

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Placeholder emitted for a row whose trailing cell carries no hyperlink.
pub const NO_LINK: &str = "No Link";

/// One table row as read off the page, before normalization.
///
/// `cells` holds `(header, value)` pairs in header order for every column
/// except the last one; the last column is reduced to its hyperlink.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawRow {
    pub cells: Vec<(String, String)>,
    pub link: String,
}

/// A single order row in canonical shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Record {
    pub office: String,
    pub order_type: String,
    pub order_no: String,
    /// Free text: `YYYY-MM-DD`, `DD/MM/YYYY` or anything else the portal shows.
    pub order_date: Option<String>,
    pub name_of_party: String,
    pub ra_file_no: String,
    pub category: String,
    pub iec: String,
    pub issued_by: String,
    pub text_of_order: String,
    #[serde(rename = "attachment")]
    pub attachment_url: Option<String>,
    pub pdf_name: Option<String>,
    pub pdf_path: Option<String>,
}

impl Record {
    /// Column names in serialization order, used for artifact headers.
    pub const COLUMNS: [&'static str; 13] = [
        "office",
        "order_type",
        "order_no",
        "order_date",
        "name_of_party",
        "ra_file_no",
        "category",
        "iec",
        "issued_by",
        "text_of_order",
        "attachment",
        "pdf_name",
        "pdf_path",
    ];

    pub fn natural_key(&self) -> NaturalKey {
        NaturalKey {
            order_type: self.order_type.clone(),
            order_no: self.order_no.clone(),
            name_of_party: self.name_of_party.clone(),
            ra_file_no: self.ra_file_no.clone(),
        }
    }

    /// Returns the attachment reference when it is present and non-blank.
    pub fn attachment(&self) -> Option<&str> {
        self.attachment_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }

    #[must_use]
    pub fn with_attachment_location(mut self, pdf_name: String, pdf_path: String) -> Self {
        self.pdf_name = Some(pdf_name);
        self.pdf_path = Some(pdf_path);
        self
    }
}

/// Composite identity of a record: (order type, order no, party, RA file no).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NaturalKey {
    pub order_type: String,
    pub order_no: String,
    pub name_of_party: String,
    pub ra_file_no: String,
}

impl NaturalKey {
    pub fn new(
        order_type: impl Into<String>,
        order_no: impl Into<String>,
        name_of_party: impl Into<String>,
        ra_file_no: impl Into<String>,
    ) -> Self {
        Self {
            order_type: order_type.into(),
            order_no: order_no.into(),
            name_of_party: name_of_party.into(),
            ra_file_no: ra_file_no.into(),
        }
    }
}

impl fmt::Display for NaturalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} / {} / {} / {}",
            self.order_type, self.order_no, self.name_of_party, self.ra_file_no
        )
    }
}

/// Natural keys already known to the store from prior runs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersistedSet {
    keys: BTreeSet<NaturalKey>,
}

impl PersistedSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: NaturalKey) -> bool {
        self.keys.insert(key)
    }

    pub fn contains(&self, key: &NaturalKey) -> bool {
        self.keys.contains(key)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &NaturalKey> {
        self.keys.iter()
    }
}

impl FromIterator<NaturalKey> for PersistedSet {
    fn from_iter<I: IntoIterator<Item = NaturalKey>>(iter: I) -> Self {
        Self {
            keys: iter.into_iter().collect(),
        }
    }
}
