//! `text-1`: heuristic events from markup-stripped page text.
//!
//! Each line carrying a date becomes one candidate. The closest heading-like
//! line above it is the summary, the next lines are the description, and an
//! `at <Place>` phrase or venue name is the location.

use chrono::NaiveTime;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::extractor::Extractor;
use crate::normalize::{parse_datetime, ParsedDateTime};
use infracal_store::text::strip_markup;
use infracal_store::EventCandidate;

pub const VERSION: &str = "text-1";

const MIN_HEADING_CHARS: usize = 3;
const MAX_HEADING_CHARS: usize = 200;
const HEADING_LOOKBACK: usize = 3;
const DESCRIPTION_LINES: usize = 2;

static LOCATION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(?:at|in)\s+([A-Z][A-Za-z0-9 &,\.\-]{2,100})").unwrap());
static VENUE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\b((?:[A-Z][A-Za-z'&\.\-]*\s+){0,4}(?:Park|Center|Hall|Clubhouse|Gateway|Reservoir|Lake|Trail|Parkway|Auditorium))\b",
    )
    .unwrap()
});
static END_TIME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*(?:-|–|to|until)\s*(\d{1,2})(?::(\d{2}))?\s*([ap])\.?\s*m\.?").unwrap()
});

struct DateLine {
    index: usize,
    parsed: ParsedDateTime,
}

fn is_heading_like(line: &str) -> bool {
    let chars = line.chars().count();
    (MIN_HEADING_CHARS..=MAX_HEADING_CHARS).contains(&chars)
        && line.chars().filter(|c| c.is_alphabetic()).count() >= MIN_HEADING_CHARS
}

fn clean_phrase(s: &str) -> Option<String> {
    let s = s
        .trim()
        .trim_matches(|c: char| matches!(c, ',' | '.' | ';' | ':' | '-' | '–' | '|' | '@'))
        .trim();
    (!s.is_empty()).then(|| s.to_string())
}

/// The date line with the matched date text cut out.
fn remainder(line: &str, parsed: &ParsedDateTime) -> Option<String> {
    let (start, end) = parsed.span;
    let rest = format!("{} {}", &line[..start], &line[end..]);
    clean_phrase(&rest).filter(|r| is_heading_like(r))
}

/// Closing time written after the start time, e.g. `10:00 AM - 12:30 PM`.
fn end_time(line: &str, parsed: &ParsedDateTime) -> Option<String> {
    if parsed.is_date {
        return None;
    }
    let caps = END_TIME_RE.captures(&line[parsed.span.1..])?;
    let hour: u32 = caps.get(1)?.as_str().parse().ok()?;
    let minute: u32 = caps.get(2).map_or(Some(0), |m| m.as_str().parse().ok())?;
    if !(1..=12).contains(&hour) {
        return None;
    }
    let pm = caps[3].eq_ignore_ascii_case("p");
    let hour = match (hour, pm) {
        (12, false) => 0,
        (12, true) => 12,
        (h, true) => h + 12,
        (h, false) => h,
    };
    let end = parsed.at.date().and_time(NaiveTime::from_hms_opt(hour, minute, 0)?);
    (end > parsed.at).then(|| end.format("%Y%m%dT%H%M%S").to_string())
}

fn find_location<'a>(texts: impl Iterator<Item = &'a str> + Clone) -> Option<String> {
    texts
        .clone()
        .find_map(|t| LOCATION_RE.captures(t).and_then(|c| clean_phrase(&c[1])))
        .or_else(|| texts.into_iter().find_map(|t| VENUE_RE.captures(t).and_then(|c| clean_phrase(&c[1]))))
}

/// Run the heuristics over already-stripped lines.
pub fn extract_from_lines(lines: &[&str]) -> Vec<EventCandidate> {
    let dates: Vec<DateLine> = lines
        .iter()
        .enumerate()
        .filter_map(|(index, line)| parse_datetime(line).map(|parsed| DateLine { index, parsed }))
        .collect();

    // Summary line index per date line, chosen before descriptions so a
    // description never swallows the next event's heading.
    let mut summary_at: Vec<Option<usize>> = Vec::with_capacity(dates.len());
    let mut floor = 0usize;
    for date in &dates {
        let low = floor.max(date.index.saturating_sub(HEADING_LOOKBACK));
        let found = (low..date.index)
            .rev()
            .find(|&j| is_heading_like(lines[j]) && parse_datetime(lines[j]).is_none());
        summary_at.push(found);
        floor = date.index + 1;
    }

    let mut candidates = Vec::with_capacity(dates.len());
    for (n, date) in dates.iter().enumerate() {
        let line = lines[date.index];
        let summary = match summary_at[n] {
            Some(j) => clean_phrase(lines[j]),
            None => remainder(line, &date.parsed),
        };

        let stop = dates
            .get(n + 1)
            .map(|next| summary_at[n + 1].unwrap_or(next.index))
            .unwrap_or(lines.len());
        let following: Vec<&str> = lines[date.index + 1..stop]
            .iter()
            .take(DESCRIPTION_LINES)
            .copied()
            .collect();
        let description = (!following.is_empty()).then(|| following.join("\n"));

        let mut context = vec![line];
        context.extend(following.iter().copied());
        if let Some(j) = summary_at[n] {
            context.push(lines[j]);
        }
        let location = find_location(context.iter().copied());

        let (start, end) = date.parsed.span;
        let first = summary_at[n].unwrap_or(date.index);
        let raw = lines[first..date.index + 1 + following.len()].join("\n");

        candidates.push(EventCandidate {
            summary,
            description,
            location,
            dtstart: Some(date.parsed.ical.clone()),
            dtend: end_time(line, &date.parsed),
            start: Some(line[start..end].trim().to_string()),
            raw: Some(raw),
            extraction_version: VERSION.to_string(),
            ..Default::default()
        });
    }
    candidates
}

/// Extractor for pages with no embedded calendar data.
#[derive(Debug, Default, Clone, Copy)]
pub struct TextExtractor;

impl Extractor for TextExtractor {
    fn version(&self) -> &'static str {
        VERSION
    }

    fn extract(&self, content: &str) -> Vec<EventCandidate> {
        let text = strip_markup(content);
        let lines: Vec<&str> = text.lines().collect();
        extract_from_lines(&lines)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fun_hike() {
        let events = TextExtractor.extract("\nFun Hike\nJanuary 10, 2026 10:00 AM\nJoin us for a hike");
        assert_eq!(events.len(), 1);
        let e = &events[0];
        assert_eq!(e.summary.as_deref(), Some("Fun Hike"));
        assert_eq!(e.dtstart.as_deref(), Some("20260110T100000"));
        assert_eq!(e.description.as_deref(), Some("Join us for a hike"));
        assert_eq!(e.start.as_deref(), Some("January 10, 2026 10:00 AM"));
        assert_eq!(e.extraction_version, VERSION);
        assert_eq!(e.location, None);
    }

    #[test]
    fn test_listing_page() {
        let html = "<h1>Parks Department Events</h1>\
                    <h3>Trail Cleanup</h3><p>Sat, March 8, 2025 9:00 AM - 12:00 PM</p>\
                    <p>Meet at Riverside Park, north lot.</p>\
                    <h3>Budget Hearing</h3><p>2025-03-12 18:30</p><p>Council chambers, City Hall</p>";
        let events = TextExtractor.extract(html);
        assert_eq!(events.len(), 2);

        assert_eq!(events[0].summary.as_deref(), Some("Trail Cleanup"));
        assert_eq!(events[0].dtstart.as_deref(), Some("20250308T090000"));
        assert_eq!(events[0].dtend.as_deref(), Some("20250308T120000"));
        assert_eq!(events[0].location.as_deref(), Some("Riverside Park, north lot"));
        assert_eq!(
            events[0].description.as_deref(),
            Some("Meet at Riverside Park, north lot.")
        );

        assert_eq!(events[1].summary.as_deref(), Some("Budget Hearing"));
        assert_eq!(events[1].dtstart.as_deref(), Some("20250312T183000"));
        assert_eq!(events[1].location.as_deref(), Some("City Hall"));
    }

    #[test]
    fn test_summary_from_date_line() {
        let events = TextExtractor.extract("<p>10/06/2025 - Pipe Inspection Walkthrough</p>");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].summary.as_deref(), Some("Pipe Inspection Walkthrough"));
        assert_eq!(events[0].dtstart.as_deref(), Some("20251006"));
        assert_eq!(events[0].dtend, None);
    }

    #[test]
    fn test_no_dates_no_events() {
        assert!(TextExtractor
            .extract("<p>Road closures are posted weekly.</p>")
            .is_empty());
    }
}
