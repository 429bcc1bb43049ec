//! Normalizers that turn loosely written values into iCalendar forms.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use infracal_store::Attendee;

/// Longest physical line, in octets, before folding.
pub const FOLD_WIDTH: usize = 75;

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").unwrap());
static NAMED_EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(.*?)\s*<\s*([^<>\s]+@[^<>\s]+)\s*>\s*$").unwrap());
static DURATION_PART_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*(?:(\d+)\s*d(?:ays?)?)?\s*(?:(\d+)\s*h(?:(?:ou)?rs?)?)?\s*(?:(\d+)\s*m(?:in(?:ute)?s?)?)?\s*(?:(\d+)\s*s(?:ec(?:ond)?s?)?)?\s*$").unwrap()
});

/// Escape a TEXT value: backslash, newline, comma and semicolon.
pub fn escape_text(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => {}
            ',' => out.push_str("\\,"),
            ';' => out.push_str("\\;"),
            other => out.push(other),
        }
    }
    out
}

/// Reverse of [`escape_text`]. Unknown escapes keep the escaped character.
pub fn unescape_text(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') | Some('N') => out.push('\n'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

/// Split a multi-valued TEXT property on commas that are not escaped.
pub fn split_text_list(value: &str) -> Vec<String> {
    let mut items = Vec::new();
    let mut current = String::new();
    let mut escaped = false;
    for c in value.chars() {
        if escaped {
            current.push('\\');
            current.push(c);
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == ',' {
            items.push(std::mem::take(&mut current));
        } else {
            current.push(c);
        }
    }
    if escaped {
        current.push('\\');
    }
    items.push(current);
    items
        .into_iter()
        .map(|s| unescape_text(s.trim()))
        .filter(|s| !s.is_empty())
        .collect()
}

/// Fold a content line at [`FOLD_WIDTH`] octets with CRLF + space,
/// never splitting a UTF-8 sequence.
pub fn fold_line(line: &str) -> String {
    if line.len() <= FOLD_WIDTH {
        return line.to_string();
    }
    let mut out = String::with_capacity(line.len() + line.len() / FOLD_WIDTH * 3);
    let mut width = 0;
    for c in line.chars() {
        let len = c.len_utf8();
        if width + len > FOLD_WIDTH {
            out.push_str("\r\n ");
            // The leading space counts toward the limit.
            width = 1;
        }
        out.push(c);
        width += len;
    }
    out
}

/// `"37.4,-122.0"`, `"37.4;-122.0"` or `"37.4 -122.0"` → `"37.4;-122"`.
pub fn normalize_geo(value: &str) -> Option<String> {
    let parts: Vec<&str> = value
        .split(|c: char| c == ',' || c == ';' || c.is_whitespace())
        .filter(|p| !p.is_empty())
        .collect();
    if parts.len() < 2 {
        return None;
    }
    let lat: f64 = parts[0].parse().ok()?;
    let lon: f64 = parts[1].parse().ok()?;
    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
        return None;
    }
    Some(format!("{};{}", lat, lon))
}

/// Split a free-form category string on commas and semicolons.
pub fn normalize_categories(value: &str) -> Vec<String> {
    value
        .split([',', ';'])
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .collect()
}

/// Turn a bare address or `Name <address>` into an attendee with a
/// `mailto:` cal-address. Anything else is kept verbatim as the address.
pub fn normalize_attendee(value: &str) -> Option<Attendee> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if let Some(caps) = NAMED_EMAIL_RE.captures(value) {
        let name = caps[1].trim_matches(|c: char| c == '"' || c.is_whitespace());
        return Some(Attendee {
            address: format!("mailto:{}", &caps[2]),
            common_name: (!name.is_empty()).then(|| name.to_string()),
            ..Default::default()
        });
    }
    Some(Attendee {
        address: normalize_cal_address(value),
        ..Default::default()
    })
}

/// Prefix bare e-mail addresses with `mailto:`.
pub fn normalize_cal_address(value: &str) -> String {
    let value = value.trim();
    if EMAIL_RE.is_match(value) {
        format!("mailto:{}", value)
    } else {
        value.to_string()
    }
}

/// Normalize to an RFC 5545 DURATION.
///
/// Accepts whole seconds (`"3600"`), short forms (`"1h 30m"`, `"90m"`,
/// `"2 days"`) and values that already look like `P…`.
pub fn normalize_duration(value: &str) -> Option<String> {
    let v = value.trim();
    if v.is_empty() {
        return None;
    }
    if v.starts_with(['P', 'p', '+', '-']) {
        return Some(v.to_uppercase());
    }
    if let Ok(secs) = v.parse::<u64>() {
        return duration_from_secs(secs);
    }
    let caps = DURATION_PART_RE.captures(v)?;
    let part = |i: usize| -> u64 {
        caps.get(i)
            .and_then(|m| m.as_str().parse().ok())
            .unwrap_or(0)
    };
    duration_from_secs(part(1) * 86_400 + part(2) * 3_600 + part(3) * 60 + part(4))
}

fn duration_from_secs(secs: u64) -> Option<String> {
    if secs == 0 {
        return None;
    }
    let (days, rem) = (secs / 86_400, secs % 86_400);
    let (hours, rem) = (rem / 3_600, rem % 3_600);
    let (minutes, seconds) = (rem / 60, rem % 60);

    let mut out = String::from("P");
    if days > 0 {
        out.push_str(&format!("{}D", days));
    }
    if hours > 0 || minutes > 0 || seconds > 0 {
        out.push('T');
        if hours > 0 {
            out.push_str(&format!("{}H", hours));
        }
        if minutes > 0 {
            out.push_str(&format!("{}M", minutes));
        }
        if seconds > 0 {
            out.push_str(&format!("{}S", seconds));
        }
    }
    Some(out)
}

// ---------------------------------------------------------------
// Dates
// ---------------------------------------------------------------

/// A date or date-time found in free text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedDateTime {
    /// iCalendar value: `YYYYMMDD` or `YYYYMMDDTHHMMSS`.
    pub ical: String,
    pub is_date: bool,
    pub at: NaiveDateTime,
    /// Byte range of the match within the searched text.
    pub span: (usize, usize),
}

const TIME_SUFFIX: &str =
    r"(?:\s*(?:,|at|@|from|-|–)?\s*(\d{1,2})(?:[:.](\d{2}))?\s*([AaPp])\.?\s*[Mm]\.?|\s*(?:,|at|@|T)?\s*(\d{1,2}):(\d{2})(?::\d{2})?)?";

static MONTH_NAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?i)\b(?:(?:mon|tue|tues|wed|thu|thur|thurs|fri|sat|sun)[a-z]*\.?,?\s+)?(jan|feb|mar|apr|may|jun|jul|aug|sep|sept|oct|nov|dec)[a-z]*\.?\s+(\d{{1,2}})(?:st|nd|rd|th)?,?\s+(\d{{4}})\b{}",
        TIME_SUFFIX
    ))
    .unwrap()
});
static DAY_MONTH_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?i)\b(\d{{1,2}})(?:st|nd|rd|th)?\s+(jan|feb|mar|apr|may|jun|jul|aug|sep|sept|oct|nov|dec)[a-z]*\.?,?\s+(\d{{4}})\b{}",
        TIME_SUFFIX
    ))
    .unwrap()
});
static ISO_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(\d{4})-(\d{2})-(\d{2})(?:[T ](\d{2}):(\d{2})(?::(\d{2}))?)?").unwrap()
});
static NUMERIC_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"\b(\d{{1,2}})/(\d{{1,2}})/(\d{{4}}|\d{{2}})\b{}",
        TIME_SUFFIX
    ))
    .unwrap()
});

fn month_number(name: &str) -> Option<u32> {
    let m = match name.get(..3)?.to_ascii_lowercase().as_str() {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => return None,
    };
    Some(m)
}

fn cap_u32(caps: &Captures<'_>, i: usize) -> Option<u32> {
    caps.get(i).and_then(|m| m.as_str().parse().ok())
}

/// Time from the shared suffix groups starting at `base`:
/// `hour, minute, meridiem` then `hour24, minute24`. An impossible time
/// reads as no time, so the date still stands.
fn suffix_time(caps: &Captures<'_>, base: usize) -> Option<NaiveTime> {
    if let Some(hour) = cap_u32(caps, base) {
        let minute = cap_u32(caps, base + 1).unwrap_or(0);
        let pm = caps
            .get(base + 2)
            .map(|m| m.as_str().eq_ignore_ascii_case("p"))
            .unwrap_or(false);
        if !(1..=12).contains(&hour) {
            return None;
        }
        let hour = match (hour, pm) {
            (12, false) => 0,
            (12, true) => 12,
            (h, true) => h + 12,
            (h, false) => h,
        };
        return NaiveTime::from_hms_opt(hour, minute, 0);
    }
    let hour = cap_u32(caps, base + 3)?;
    let minute = cap_u32(caps, base + 4).unwrap_or(0);
    NaiveTime::from_hms_opt(hour, minute, 0)
}

fn build(date: NaiveDate, time: Option<NaiveTime>, span: (usize, usize)) -> ParsedDateTime {
    match time {
        Some(t) => {
            let at = date.and_time(t);
            ParsedDateTime {
                ical: at.format("%Y%m%dT%H%M%S").to_string(),
                is_date: false,
                at,
                span,
            }
        }
        None => ParsedDateTime {
            ical: date.format("%Y%m%d").to_string(),
            is_date: true,
            at: date.and_time(NaiveTime::MIN),
            span,
        },
    }
}

fn from_month_name(caps: &Captures<'_>, month: usize, day: usize, year: usize) -> Option<ParsedDateTime> {
    let whole = caps.get(0)?;
    let date = NaiveDate::from_ymd_opt(
        cap_u32(caps, year)? as i32,
        month_number(caps.get(month)?.as_str())?,
        cap_u32(caps, day)?,
    )?;
    Some(build(date, suffix_time(caps, 4), (whole.start(), whole.end())))
}

fn from_iso(caps: &Captures<'_>) -> Option<ParsedDateTime> {
    let whole = caps.get(0)?;
    let date = NaiveDate::from_ymd_opt(
        cap_u32(caps, 1)? as i32,
        cap_u32(caps, 2)?,
        cap_u32(caps, 3)?,
    )?;
    let time = cap_u32(caps, 4).and_then(|h| {
        NaiveTime::from_hms_opt(h, cap_u32(caps, 5)?, cap_u32(caps, 6).unwrap_or(0))
    });
    Some(build(date, time, (whole.start(), whole.end())))
}

fn from_numeric(caps: &Captures<'_>) -> Option<ParsedDateTime> {
    let whole = caps.get(0)?;
    let year_raw = caps.get(3)?.as_str();
    let mut year: i32 = year_raw.parse().ok()?;
    if year_raw.len() == 2 {
        year += 2000;
    }
    // Month first, as in US-style listings.
    let date = NaiveDate::from_ymd_opt(year, cap_u32(caps, 1)?, cap_u32(caps, 2)?)?;
    Some(build(date, suffix_time(caps, 4), (whole.start(), whole.end())))
}

/// Find the first date (with optional time) in `text`.
///
/// Month-name, day-month, ISO and numeric `M/D/Y` forms are recognised.
/// Impossible calendar dates are skipped rather than guessed.
pub fn parse_datetime(text: &str) -> Option<ParsedDateTime> {
    let mut found: Vec<ParsedDateTime> = Vec::new();
    found.extend(
        MONTH_NAME_RE
            .captures_iter(text)
            .filter_map(|c| from_month_name(&c, 1, 2, 3))
            .take(1),
    );
    found.extend(
        DAY_MONTH_RE
            .captures_iter(text)
            .filter_map(|c| from_month_name(&c, 2, 1, 3))
            .take(1),
    );
    found.extend(ISO_RE.captures_iter(text).filter_map(|c| from_iso(&c)).take(1));
    found.extend(
        NUMERIC_RE
            .captures_iter(text)
            .filter_map(|c| from_numeric(&c))
            .take(1),
    );
    found.into_iter().min_by_key(|p| p.span.0)
}

/// Coerce a stored date value into iCalendar form.
///
/// `2025-03-01 10:00:00` → `20250301T100000`; values already in basic form
/// pass through; free text goes through [`parse_datetime`].
pub fn to_ical_datetime(value: &str) -> Option<String> {
    let v = value.trim();
    if v.is_empty() {
        return None;
    }
    let basic: String = v
        .chars()
        .filter(|c| *c != '-' && *c != ':')
        .map(|c| if c == ' ' { 'T' } else { c })
        .collect();
    let all_digits = |range: std::ops::Range<usize>| {
        basic
            .get(range)
            .map_or(false, |s| s.chars().all(|c| c.is_ascii_digit()))
    };
    if basic.len() == 8 && all_digits(0..8) {
        return Some(basic);
    }
    if basic.len() >= 15 && all_digits(0..8) && basic.get(8..9) == Some("T") && all_digits(9..15) {
        let end = if basic.get(15..16) == Some("Z") { 16 } else { 15 };
        return basic.get(..end).map(str::to_string);
    }
    parse_datetime(v).map(|p| p.ical)
}
