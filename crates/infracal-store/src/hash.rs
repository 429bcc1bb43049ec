//! Content fingerprint for event candidates.
//!
//! The hash is SHA-256 over a canonical JSON object of normalized fields with
//! keys in fixed (sorted) order. `raw`, `dtstamp` and `extraction_version` are
//! left out, so re-running the same or a newer extractor over an unchanged
//! page produces the same fingerprint.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::types::EventCandidate;

/// Trim and collapse internal whitespace. Empty strings become `None`.
pub fn normalize_field(value: Option<&str>) -> Option<String> {
    let collapsed = value?.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        None
    } else {
        Some(collapsed)
    }
}

fn text(value: &Option<String>) -> Value {
    normalize_field(value.as_deref()).map_or(Value::Null, Value::String)
}

fn number(value: Option<i64>) -> Value {
    value.map_or(Value::Null, Value::from)
}

fn string_set(values: &[String]) -> Value {
    let mut items: Vec<String> = values
        .iter()
        .filter_map(|v| normalize_field(Some(v)))
        .collect();
    items.sort();
    items.dedup();
    if items.is_empty() {
        Value::Null
    } else {
        Value::from(items)
    }
}

/// Serialize each element, normalize its string leaves, then sort.
fn structured_set<T: Serialize>(values: &[T]) -> Value {
    let mut items: Vec<String> = values
        .iter()
        .filter_map(|v| serde_json::to_value(v).ok())
        .map(normalize_value)
        .map(|v| v.to_string())
        .collect();
    items.sort();
    items.dedup();
    if items.is_empty() {
        Value::Null
    } else {
        Value::from(items)
    }
}

fn normalize_value(value: Value) -> Value {
    match value {
        Value::String(s) => normalize_field(Some(&s)).map_or(Value::Null, Value::String),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, normalize_value(v)))
                .filter(|(_, v)| !v.is_null())
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(normalize_value).collect()),
        other => other,
    }
}

/// The canonical field map that feeds the fingerprint.
pub fn canonical_fields(c: &EventCandidate) -> BTreeMap<&'static str, Value> {
    let mut m = BTreeMap::new();
    m.insert("uid", text(&c.uid));
    m.insert("dtstart", text(&c.dtstart));
    m.insert("dtend", text(&c.dtend));
    m.insert("duration", text(&c.duration));
    m.insert("summary", text(&c.summary));
    m.insert("description", text(&c.description));
    m.insert("location", text(&c.location));
    m.insert("url", text(&c.url));
    m.insert("geo", text(&c.geo));
    m.insert("categories", string_set(&c.categories));
    m.insert("status", text(&c.status));
    m.insert("transp", text(&c.transp));
    m.insert("sequence", number(c.sequence));
    m.insert("created", text(&c.created));
    m.insert("last_modified", text(&c.last_modified));
    m.insert("organizer", text(&c.organizer));
    m.insert("attendees", structured_set(&c.attendees));
    m.insert("attach", string_set(&c.attach));
    m.insert("classification", text(&c.classification));
    m.insert("priority", number(c.priority));
    m.insert("rrule", text(&c.rrule));
    m.insert("rdate", string_set(&c.rdate));
    m.insert("exdate", string_set(&c.exdate));
    m.insert("recurrence_id", text(&c.recurrence_id));
    m.insert("tzid", text(&c.tzid));
    m.insert("alarms", structured_set(&c.alarms));
    m.insert("title", text(&c.title));
    m.insert("start", text(&c.start));
    m
}

/// SHA-256 hex fingerprint, or `None` when the candidate carries no content.
pub fn content_hash(candidate: &EventCandidate) -> Option<String> {
    let fields = canonical_fields(candidate);
    if fields.values().all(Value::is_null) {
        return None;
    }
    let canonical = serde_json::to_string(&fields).ok()?;
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    Some(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Alarm, Attendee};

    fn candidate() -> EventCandidate {
        EventCandidate {
            summary: Some("Kickoff".into()),
            dtstart: Some("2025-03-01T10:00:00".into()),
            categories: vec!["infra".into(), "meeting".into()],
            extraction_version: "vevent-1".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_hash_is_deterministic() {
        let a = content_hash(&candidate()).unwrap();
        let b = content_hash(&candidate()).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_hash_ignores_whitespace_and_list_order() {
        let mut other = candidate();
        other.summary = Some("  Kickoff \n".into());
        other.categories = vec!["meeting".into(), " infra".into(), "infra".into()];
        assert_eq!(content_hash(&candidate()), content_hash(&other));
    }

    #[test]
    fn test_hash_ignores_volatile_fields() {
        let mut other = candidate();
        other.dtstamp = Some("20250301T120000Z".into());
        other.raw = Some("BEGIN:VEVENT\r\n...".into());
        other.extraction_version = "layered-1".into();
        assert_eq!(content_hash(&candidate()), content_hash(&other));
    }

    #[test]
    fn test_hash_changes_with_content() {
        let mut other = candidate();
        other.summary = Some("Kickoff Meeting".into());
        assert_ne!(content_hash(&candidate()), content_hash(&other));
    }

    #[test]
    fn test_hash_changes_with_sequence() {
        let mut first = candidate();
        first.sequence = Some(1);
        let mut second = candidate();
        second.sequence = Some(2);
        assert_ne!(content_hash(&first), content_hash(&second));
        assert_ne!(content_hash(&candidate()), content_hash(&first));
    }

    #[test]
    fn test_hash_changes_with_attendee_field() {
        let attendee = |partstat: &str| Attendee {
            address: "mailto:a@example.org".into(),
            partstat: Some(partstat.into()),
            ..Default::default()
        };
        let mut x = candidate();
        x.attendees = vec![attendee("ACCEPTED")];
        let mut y = candidate();
        y.attendees = vec![attendee("DECLINED")];
        assert_ne!(content_hash(&x), content_hash(&y));
    }

    #[test]
    fn test_hash_changes_with_alarm_trigger() {
        let alarm = |trigger: &str| Alarm {
            action: Some("DISPLAY".into()),
            trigger: Some(trigger.into()),
            ..Default::default()
        };
        let mut x = candidate();
        x.alarms = vec![alarm("-PT15M")];
        let mut y = candidate();
        y.alarms = vec![alarm("-PT30M")];
        assert_ne!(content_hash(&x), content_hash(&y));
    }

    #[test]
    fn test_empty_candidate_has_no_hash() {
        let empty = EventCandidate {
            summary: Some("   ".into()),
            raw: Some("noise".into()),
            ..Default::default()
        };
        assert!(content_hash(&empty).is_none());
    }

    #[test]
    fn test_attendee_order_irrelevant() {
        let a = Attendee {
            address: "mailto:a@example.org".into(),
            ..Default::default()
        };
        let b = Attendee {
            address: "mailto:b@example.org".into(),
            common_name: Some("B".into()),
            ..Default::default()
        };
        let mut x = candidate();
        x.attendees = vec![a.clone(), b.clone()];
        let mut y = candidate();
        y.attendees = vec![b, a];
        assert_eq!(content_hash(&x), content_hash(&y));
    }
}
