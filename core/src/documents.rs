//! Document listing types and query building.
//!
//! Mirrors the listing contract of the document backend:
//! `GET /api/documents?page&search&persons&person_condition&tags&date_from&date_to`.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Date format the listing endpoint expects
pub const API_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Maximum tag suggestions offered while typing / with an empty input
const SUGGESTIONS_WITH_INPUT: usize = 10;
const SUGGESTIONS_WITHOUT_INPUT: usize = 20;

/// How multiple person filters combine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PersonCondition {
    #[default]
    Any,
    All,
}

impl PersonCondition {
    pub fn as_str(&self) -> &'static str {
        match self {
            PersonCondition::Any => "any",
            PersonCondition::All => "all",
        }
    }
}

/// Filters and page for one listing request
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentQuery {
    pub page: u32,
    pub search: Option<String>,
    pub persons: Vec<String>,
    pub person_condition: PersonCondition,
    pub tags: Vec<String>,
    pub date_from: Option<NaiveDateTime>,
    pub date_to: Option<NaiveDateTime>,
}

impl Default for DocumentQuery {
    fn default() -> Self {
        Self {
            page: 1,
            search: None,
            persons: Vec::new(),
            person_condition: PersonCondition::Any,
            tags: Vec::new(),
            date_from: None,
            date_to: None,
        }
    }
}

impl DocumentQuery {
    pub fn page(page: u32) -> Self {
        Self {
            page: page.max(1),
            ..Self::default()
        }
    }

    /// A new search starts again from the first page
    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        let search = search.into();
        self.search = if search.is_empty() { None } else { Some(search) };
        self.page = 1;
        self
    }

    /// Adds a tag filter once; repeated selections are ignored
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        let tag = tag.into();
        if !self.tags.contains(&tag) {
            self.tags.push(tag);
        }
        self
    }

    pub fn with_persons(mut self, persons: Vec<String>, condition: PersonCondition) -> Self {
        self.persons = persons;
        self.person_condition = condition;
        self
    }

    pub fn with_date_range(
        mut self,
        from: Option<NaiveDateTime>,
        to: Option<NaiveDateTime>,
    ) -> Self {
        self.date_from = from;
        self.date_to = to;
        self
    }

    /// Condition actually in effect: `all` only means something with 2+ persons
    pub fn effective_person_condition(&self) -> PersonCondition {
        if self.persons.len() <= 1 {
            PersonCondition::Any
        } else {
            self.person_condition
        }
    }

    /// Ordered query pairs; empty filters are omitted
    pub fn to_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![("page", self.page.to_string())];

        if let Some(search) = self.search.as_deref().filter(|s| !s.is_empty()) {
            pairs.push(("search", search.to_string()));
        }
        if !self.persons.is_empty() {
            pairs.push(("persons", self.persons.join(",")));
            if self.persons.len() > 1 {
                pairs.push((
                    "person_condition",
                    self.effective_person_condition().as_str().to_string(),
                ));
            }
        }
        if !self.tags.is_empty() {
            pairs.push(("tags", self.tags.join(",")));
        }
        if let Some(from) = self.date_from {
            pairs.push(("date_from", format_api_date(&from)));
        }
        if let Some(to) = self.date_to {
            pairs.push(("date_to", format_api_date(&to)));
        }
        pairs
    }
}

pub fn format_api_date(date: &NaiveDateTime) -> String {
    date.format(API_DATE_FORMAT).to_string()
}

/// Person option labels look like `"Name - details"`; the filter uses the name
pub fn person_name_from_label(label: &str) -> &str {
    label.split(" - ").next().unwrap_or(label).trim()
}

/// Media type of a document, selecting its preview strategy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    #[default]
    Image,
    Video,
    Pdf,
}

impl MediaKind {
    /// Unknown media types fall back to the image preview
    pub fn parse(media_type: &str) -> Self {
        match media_type.to_ascii_lowercase().as_str() {
            "video" => MediaKind::Video,
            "pdf" => MediaKind::Pdf,
            _ => MediaKind::Image,
        }
    }

    /// Primary-backend path serving the full preview
    pub fn preview_path(&self, doc_id: i64) -> String {
        match self {
            MediaKind::Image => format!("/image/{}", doc_id),
            MediaKind::Video => format!("/video/{}", doc_id),
            MediaKind::Pdf => format!("/api/pdf/{}", doc_id),
        }
    }
}

fn deserialize_media_kind<'de, D>(deserializer: D) -> Result<MediaKind, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.as_deref().map(MediaKind::parse).unwrap_or_default())
}

/// `null` reads as the type's default
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Document numbers arrive as strings or bare numbers depending on the row
fn deserialize_docnumber<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Int(i64),
        Float(f64),
    }

    Ok(match Option::<Raw>::deserialize(deserializer)? {
        Some(Raw::Text(s)) => s,
        Some(Raw::Int(n)) => n.to_string(),
        Some(Raw::Float(n)) => n.to_string(),
        None => String::new(),
    })
}

/// One listed document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub doc_id: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(default, rename = "abstract")]
    pub abstract_text: Option<String>,
    #[serde(default, deserialize_with = "deserialize_docnumber")]
    pub docnumber: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub docname: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub date: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub thumbnail_url: String,
    #[serde(default, deserialize_with = "deserialize_media_kind")]
    pub media_type: MediaKind,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tags: Vec<String>,
}

impl Document {
    pub fn preview_path(&self) -> String {
        self.media_type.preview_path(self.doc_id)
    }

    /// Thumbnails are served by the primary backend relative to its root
    pub fn thumbnail_path(&self) -> String {
        format!("/{}", self.thumbnail_url.trim_start_matches('/'))
    }
}

/// One page of the listing
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentPage {
    #[serde(default)]
    pub documents: Vec<Document>,
    #[serde(default = "default_total_pages")]
    pub total_pages: u32,
}

fn default_total_pages() -> u32 {
    1
}

/// Tags not yet on the document that contain `input` (case-insensitive)
pub fn tag_suggestions(all_tags: &[String], current: &[String], input: &str) -> Vec<String> {
    let available = all_tags
        .iter()
        .filter(|tag| !current.iter().any(|c| c.eq_ignore_ascii_case(tag)));

    let input = input.trim().to_lowercase();
    if input.is_empty() {
        available.take(SUGGESTIONS_WITHOUT_INPUT).cloned().collect()
    } else {
        available
            .filter(|tag| tag.to_lowercase().contains(&input))
            .take(SUGGESTIONS_WITH_INPUT)
            .cloned()
            .collect()
    }
}
