//! Data types for pages, events, and reconciliation results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A crawl-source tuple as delivered by the crawler.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageFetch {
    pub url: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub http_status: Option<i32>,
    #[serde(default)]
    pub fetched_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub config_id: Option<String>,
}

/// A page row from the database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page {
    pub page_id: i64,
    pub page_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plain_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_status: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fetched_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attendee {
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub common_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partstat: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rsvp: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alarm {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repeat: Option<i64>,
}

/// An extracted, not-yet-persisted event.
///
/// Every field is optional; extraction never fails on a missing or malformed
/// sub-field, it leaves the field empty instead.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventCandidate {
    pub uid: Option<String>,
    pub dtstamp: Option<String>,
    pub dtstart: Option<String>,
    pub dtend: Option<String>,
    pub duration: Option<String>,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub url: Option<String>,
    pub geo: Option<String>,
    pub categories: Vec<String>,
    pub status: Option<String>,
    pub transp: Option<String>,
    pub sequence: Option<i64>,
    pub created: Option<String>,
    pub last_modified: Option<String>,
    pub organizer: Option<String>,
    pub attendees: Vec<Attendee>,
    pub attach: Vec<String>,
    pub classification: Option<String>,
    pub priority: Option<i64>,
    pub rrule: Option<String>,
    pub rdate: Vec<String>,
    pub exdate: Vec<String>,
    pub recurrence_id: Option<String>,
    pub tzid: Option<String>,
    pub alarms: Vec<Alarm>,

    /// Unparsed source fragment.
    pub raw: Option<String>,
    pub title: Option<String>,
    pub start: Option<String>,

    /// Extractor that produced this candidate.
    pub extraction_version: String,
}

/// A persisted event row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub event_id: i64,
    pub page_id: i64,
    #[serde(flatten)]
    pub fields: EventCandidate,
    pub extracted_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub is_valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
}

/// What reconciliation did with one candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "event_id", rename_all = "snake_case")]
pub enum ReconcileOutcome {
    /// New row written.
    Inserted(i64),
    /// A row with the same fingerprint already exists; nothing written.
    Unchanged(i64),
    /// An existing row with the same logical identity was replaced in place.
    Superseded(i64),
    /// The candidate carried no hashable content.
    Discarded,
}

impl ReconcileOutcome {
    pub fn event_id(&self) -> Option<i64> {
        match self {
            Self::Inserted(id) | Self::Unchanged(id) | Self::Superseded(id) => Some(*id),
            Self::Discarded => None,
        }
    }
}

/// Filters for listing events. Unset fields do not constrain.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EventFilter {
    pub page_id: Option<i64>,
    pub valid: Option<bool>,
    pub extraction_version: Option<String>,
    pub config_id: Option<String>,
    /// Full-text match against the owning page.
    pub query: Option<String>,
    pub limit: Option<usize>,
}

/// Filters for listing pages.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PageFilter {
    pub config_id: Option<String>,
    pub limit: Option<usize>,
}

/// One full-text search result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageHit {
    pub page_id: i64,
    pub page_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_id: Option<String>,
    pub score: f64,
    pub snippet: String,
}

/// Store-level statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreStats {
    pub pages: i64,
    pub events: i64,
    pub valid_events: i64,
    pub migrations_applied: i64,
    pub events_by_version: BTreeMap<String, i64>,
    pub db_path: String,
    pub db_size_mb: f64,
}
