//! Validity classifier: the sole writer of `is_valid`.

use crate::hash::normalize_field;
use crate::types::EventCandidate;

fn present(value: &Option<String>) -> bool {
    normalize_field(value.as_deref()).is_some()
}

/// An event is valid when it has a start (`dtstart` or `start`) and a name
/// (`summary` or `title`).
pub fn classify(candidate: &EventCandidate) -> bool {
    let has_start = present(&candidate.dtstart) || present(&candidate.start);
    let has_name = present(&candidate.summary) || present(&candidate.title);
    has_start && has_name
}
