//! `vevent-1`: events from embedded `BEGIN:VEVENT … END:VEVENT` blocks.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::extractor::Extractor;
use crate::normalize::{
    normalize_cal_address, normalize_duration, normalize_geo, split_text_list, unescape_text,
};
use infracal_store::text::remove_tags;
use infracal_store::{Alarm, Attendee, EventCandidate};

pub const VERSION: &str = "vevent-1";

static MARKUP_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)</?(?:html|body|head|pre|div|p|span|br|code|section)\b").unwrap());
static VEVENT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?im)^[ \t]*BEGIN:VEVENT[ \t]*$").unwrap());

/// One parsed content line: `NAME;PARAM=VAL:VALUE`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentLine {
    pub name: String,
    pub params: Vec<(String, String)>,
    pub value: String,
}

impl ContentLine {
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }
}

/// Whether `content` carries at least one VEVENT block.
pub fn has_vevent(content: &str) -> bool {
    VEVENT_RE.is_match(&prepare(content))
}

/// Strip surrounding markup when present and normalize line endings.
fn prepare(content: &str) -> String {
    if MARKUP_RE.is_match(content) {
        dedent_blocks(&normalize_newlines(&remove_tags(content)))
    } else {
        normalize_newlines(content)
    }
}

fn normalize_newlines(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}

/// Remove the page's indentation from text pulled out of markup.
///
/// Inside a VEVENT block the indentation of its `BEGIN:VEVENT` line is
/// stripped from every line, so only deeper indentation reads as folding.
/// Lines outside any block are left-trimmed.
fn dedent_blocks(text: &str) -> String {
    let mut out = Vec::new();
    let mut indent: Option<&str> = None;
    for line in text.split('\n') {
        let trimmed = line.trim_start_matches([' ', '\t']);
        match indent {
            None => {
                if VEVENT_RE.is_match(line) {
                    indent = Some(&line[..line.len() - trimmed.len()]);
                }
                out.push(trimmed);
            }
            Some(prefix) => {
                out.push(line.strip_prefix(prefix).unwrap_or(trimmed));
                if trimmed.trim_end().eq_ignore_ascii_case("END:VEVENT") {
                    indent = None;
                }
            }
        }
    }
    out.join("\n")
}

/// Join continuation lines (leading space or tab) onto their predecessor.
pub fn unfold(text: &str) -> Vec<String> {
    let mut lines: Vec<String> = Vec::new();
    for line in text.split('\n') {
        if let Some(rest) = line.strip_prefix([' ', '\t']) {
            if let Some(last) = lines.last_mut() {
                last.push_str(rest);
                continue;
            }
        }
        lines.push(line.to_string());
    }
    lines
}

/// Parse one unfolded line. Returns `None` for lines with no `:` separator.
pub fn parse_content_line(line: &str) -> Option<ContentLine> {
    let line = line.trim_end();
    let mut in_quotes = false;
    let mut colon = None;
    for (i, c) in line.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            ':' if !in_quotes => {
                colon = Some(i);
                break;
            }
            _ => {}
        }
    }
    let colon = colon?;
    let (head, value) = (line[..colon].trim_start(), &line[colon + 1..]);

    let mut segments = split_unquoted(head, ';').into_iter();
    let name = segments.next()?.trim().to_ascii_uppercase();
    if name.is_empty() {
        return None;
    }
    let params = segments
        .filter_map(|seg| {
            let (k, v) = seg.split_once('=')?;
            Some((k.trim().to_ascii_uppercase(), v.trim().trim_matches('"').to_string()))
        })
        .collect();

    Some(ContentLine {
        name,
        params,
        value: value.to_string(),
    })
}

fn split_unquoted(s: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut in_quotes = false;
    let mut start = 0;
    for (i, c) in s.char_indices() {
        if c == '"' {
            in_quotes = !in_quotes;
        } else if c == sep && !in_quotes {
            parts.push(&s[start..i]);
            start = i + c.len_utf8();
        }
    }
    parts.push(&s[start..]);
    parts
}

fn text_value(value: &str) -> Option<String> {
    let v = unescape_text(value.trim());
    let v = v.trim();
    (!v.is_empty()).then(|| v.to_string())
}

fn plain_value(value: &str) -> Option<String> {
    let v = value.trim();
    (!v.is_empty()).then(|| v.to_string())
}

fn int_value(value: &str) -> Option<i64> {
    value.trim().parse().ok()
}

fn list_values(value: &str) -> impl Iterator<Item = String> + '_ {
    value
        .split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn apply_alarm_property(alarm: &mut Alarm, line: &ContentLine) {
    match line.name.as_str() {
        "ACTION" => alarm.action = plain_value(&line.value).map(|v| v.to_ascii_uppercase()),
        "TRIGGER" => alarm.trigger = plain_value(&line.value),
        "DESCRIPTION" => alarm.description = text_value(&line.value),
        "SUMMARY" => alarm.summary = text_value(&line.value),
        "DURATION" => alarm.duration = plain_value(&line.value),
        "REPEAT" => alarm.repeat = int_value(&line.value),
        _ => {}
    }
}

fn apply_event_property(event: &mut EventCandidate, line: &ContentLine) {
    let v = line.value.as_str();
    match line.name.as_str() {
        "UID" => event.uid = plain_value(v),
        "DTSTAMP" => event.dtstamp = plain_value(v),
        "DTSTART" => {
            event.dtstart = plain_value(v);
            if let Some(tzid) = line.param("TZID") {
                event.tzid = plain_value(tzid);
            }
        }
        "DTEND" => {
            event.dtend = plain_value(v);
            if event.tzid.is_none() {
                event.tzid = line.param("TZID").and_then(plain_value);
            }
        }
        "DURATION" => event.duration = normalize_duration(v),
        "SUMMARY" => event.summary = text_value(v),
        "DESCRIPTION" => event.description = text_value(v),
        "LOCATION" => event.location = text_value(v),
        "URL" => event.url = plain_value(v),
        "GEO" => event.geo = normalize_geo(v),
        "CATEGORIES" => event.categories.extend(split_text_list(v)),
        "STATUS" => event.status = plain_value(v).map(|s| s.to_ascii_uppercase()),
        "TRANSP" => event.transp = plain_value(v).map(|s| s.to_ascii_uppercase()),
        "SEQUENCE" => event.sequence = int_value(v),
        "CREATED" => event.created = plain_value(v),
        "LAST-MODIFIED" => event.last_modified = plain_value(v),
        "ORGANIZER" => event.organizer = plain_value(v).map(|a| normalize_cal_address(&a)),
        "ATTENDEE" => {
            if let Some(address) = plain_value(v) {
                event.attendees.push(Attendee {
                    address: normalize_cal_address(&address),
                    common_name: line.param("CN").and_then(plain_value),
                    role: line.param("ROLE").and_then(plain_value),
                    partstat: line.param("PARTSTAT").and_then(plain_value),
                    rsvp: line.param("RSVP").and_then(|r| match r.trim().to_ascii_uppercase().as_str() {
                        "TRUE" => Some(true),
                        "FALSE" => Some(false),
                        _ => None,
                    }),
                });
            }
        }
        "ATTACH" => {
            if let Some(uri) = plain_value(v) {
                event.attach.push(uri);
            }
        }
        "CLASS" => event.classification = plain_value(v).map(|s| s.to_ascii_uppercase()),
        "PRIORITY" => event.priority = int_value(v),
        "RRULE" => event.rrule = plain_value(v),
        "RDATE" => event.rdate.extend(list_values(v)),
        "EXDATE" => event.exdate.extend(list_values(v)),
        "RECURRENCE-ID" => event.recurrence_id = plain_value(v),
        _ => {}
    }
}

/// Parse every VEVENT in `content`. Unterminated blocks at end of input
/// are kept; properties outside a VEVENT are ignored.
pub fn parse_vevents(content: &str) -> Vec<EventCandidate> {
    let text = prepare(content);
    let mut events = Vec::new();

    let mut current: Option<(EventCandidate, Vec<String>)> = None;
    let mut alarm: Option<Alarm> = None;
    // Depth of components nested inside the VEVENT other than VALARM.
    let mut skip_depth = 0usize;

    for raw_line in unfold(&text) {
        if raw_line.trim().is_empty() {
            continue;
        }
        let Some(line) = parse_content_line(&raw_line) else {
            continue;
        };
        let component = line.value.trim().to_ascii_uppercase();
        let mut closed = false;

        match (line.name.as_str(), current.as_mut()) {
            ("BEGIN", None) if component == "VEVENT" => {
                current = Some((EventCandidate::default(), vec![raw_line.trim().to_string()]));
            }
            (_, None) => {}
            (name, Some((event, raw))) => {
                raw.push(raw_line.trim_end().to_string());
                match name {
                    "BEGIN" if component == "VALARM" && skip_depth == 0 && alarm.is_none() => {
                        alarm = Some(Alarm::default());
                    }
                    "BEGIN" => skip_depth += 1,
                    "END" if component == "VALARM" && skip_depth == 0 => {
                        if let Some(done) = alarm.take() {
                            event.alarms.push(done);
                        }
                    }
                    "END" if component == "VEVENT" && skip_depth == 0 => closed = true,
                    "END" => skip_depth = skip_depth.saturating_sub(1),
                    _ if skip_depth > 0 => {}
                    _ => match alarm.as_mut() {
                        Some(a) => apply_alarm_property(a, &line),
                        None => apply_event_property(event, &line),
                    },
                }
            }
        }

        if closed {
            if let Some((mut finished, raw)) = current.take() {
                finished.raw = Some(raw.join("\r\n"));
                events.push(finished);
            }
            alarm = None;
        }
    }

    if let Some((mut unterminated, raw)) = current.take() {
        debug!("VEVENT block not terminated; keeping parsed fields");
        if let Some(a) = alarm.take() {
            unterminated.alarms.push(a);
        }
        unterminated.raw = Some(raw.join("\r\n"));
        events.push(unterminated);
    }

    events
}

/// Extractor for pages that embed iCalendar data.
#[derive(Debug, Default, Clone, Copy)]
pub struct VeventExtractor;

impl Extractor for VeventExtractor {
    fn version(&self) -> &'static str {
        VERSION
    }

    fn extract(&self, content: &str) -> Vec<EventCandidate> {
        parse_vevents(content)
            .into_iter()
            .map(|mut c| {
                c.extraction_version = VERSION.to_string();
                c
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INDENTED_HTML: &str = "<html>\n  <body>\n    <pre>\n    BEGIN:VEVENT\n    UID:abc123\n    \
                                 DTSTART:20240101T090000Z\n    SUMMARY:Kickoff\n    DESCRIPTION:Agenda and \n     \
                                 introductions\n    END:VEVENT\n    </pre>\n  </body>\n</html>";

    #[test]
    fn test_indented_block_in_html() {
        let events = parse_vevents(INDENTED_HTML);
        assert_eq!(events.len(), 1);
        let e = &events[0];
        assert_eq!(e.uid.as_deref(), Some("abc123"));
        assert_eq!(e.summary.as_deref(), Some("Kickoff"));
        assert_eq!(e.description.as_deref(), Some("Agenda and introductions"));
        assert!(e.dtstart.is_some());
    }

    const SAMPLE: &str = "BEGIN:VCALENDAR\r\n\
VERSION:2.0\r\n\
BEGIN:VEVENT\r\n\
UID:1234@example.com\r\n\
DTSTAMP:20250101T120000Z\r\n\
DTSTART;TZID=America/Los_Angeles:20250110T100000\r\n\
DTEND;TZID=America/Los_Angeles:20250110T120000\r\n\
SUMMARY:Test Event\r\n\
LOCATION:Test Park\\, North Gate\r\n\
DESCRIPTION:Bring water\\nand snacks. This line is long enough that \r\n \
 it was folded by the producer.\r\n\
CATEGORIES:Parks,Volunteering\r\n\
CATEGORIES:Outdoors\r\n\
ATTENDEE;CN=\"Doe, Jane\";ROLE=REQ-PARTICIPANT;RSVP=TRUE:mailto:jane@example.com\r\n\
ATTENDEE:bob@example.com\r\n\
GEO:37.4,-122.0\r\n\
SEQUENCE:2\r\n\
PRIORITY:high\r\n\
EXDATE:20250117T100000,20250124T100000\r\n\
BEGIN:VALARM\r\n\
ACTION:DISPLAY\r\n\
TRIGGER:-PT15M\r\n\
DESCRIPTION:Reminder\r\n\
END:VALARM\r\n\
END:VEVENT\r\n\
END:VCALENDAR\r\n";

    #[test]
    fn test_parse_sample_event() {
        let events = VeventExtractor.extract(SAMPLE);
        assert_eq!(events.len(), 1);
        let e = &events[0];

        assert_eq!(e.uid.as_deref(), Some("1234@example.com"));
        assert_eq!(e.summary.as_deref(), Some("Test Event"));
        assert_eq!(e.location.as_deref(), Some("Test Park, North Gate"));
        assert_eq!(e.dtstart.as_deref(), Some("20250110T100000"));
        assert_eq!(e.tzid.as_deref(), Some("America/Los_Angeles"));
        assert_eq!(
            e.description.as_deref(),
            Some("Bring water\nand snacks. This line is long enough that it was folded by the producer.")
        );
        assert_eq!(e.categories, vec!["Parks", "Volunteering", "Outdoors"]);
        assert_eq!(e.geo.as_deref(), Some("37.4;-122"));
        assert_eq!(e.sequence, Some(2));
        assert_eq!(e.priority, None);
        assert_eq!(e.exdate.len(), 2);
        assert_eq!(e.extraction_version, VERSION);

        assert_eq!(e.attendees.len(), 2);
        assert_eq!(e.attendees[0].common_name.as_deref(), Some("Doe, Jane"));
        assert_eq!(e.attendees[0].rsvp, Some(true));
        assert_eq!(e.attendees[1].address, "mailto:bob@example.com");

        assert_eq!(e.alarms.len(), 1);
        assert_eq!(e.alarms[0].trigger.as_deref(), Some("-PT15M"));
        assert_eq!(e.alarms[0].description.as_deref(), Some("Reminder"));
        assert!(e.raw.as_deref().unwrap().starts_with("BEGIN:VEVENT"));
    }

    #[test]
    fn test_vevent_inside_html() {
        let html = "<html><body><pre>BEGIN:VEVENT\nUID:a@b\nSUMMARY:Board &amp; Budget\n\
                    DTSTART:20250301\nEND:VEVENT</pre></body></html>";
        assert!(has_vevent(html));
        let events = VeventExtractor.extract(html);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].summary.as_deref(), Some("Board & Budget"));
        assert_eq!(events[0].dtstart.as_deref(), Some("20250301"));
    }

    #[test]
    fn test_multiple_and_unterminated_blocks() {
        let src = "BEGIN:VEVENT\nUID:one\nSUMMARY:One\nEND:VEVENT\n\
                   garbage line without separator\n\
                   BEGIN:VEVENT\nUID:two\nSUMMARY:Two\n";
        let events = parse_vevents(src);
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].uid.as_deref(), Some("two"));
    }

    #[test]
    fn test_unknown_nested_component_ignored() {
        let src = "BEGIN:VEVENT\nUID:x\nBEGIN:X-THING\nSUMMARY:Inner\nEND:X-THING\nSUMMARY:Outer\nEND:VEVENT";
        let events = parse_vevents(src);
        assert_eq!(events[0].summary.as_deref(), Some("Outer"));
    }

    #[test]
    fn test_parse_content_line() {
        let line = parse_content_line("attendee;cn=\"A: B\";rsvp=TRUE:mailto:a@b.org").unwrap();
        assert_eq!(line.name, "ATTENDEE");
        assert_eq!(line.param("CN"), Some("A: B"));
        assert_eq!(line.value, "mailto:a@b.org");
        assert!(parse_content_line("no separator here").is_none());
    }

    #[test]
    fn test_no_vevent() {
        assert!(!has_vevent("<p>Fun Hike on January 10, 2026</p>"));
        assert!(VeventExtractor.extract("plain text").is_empty());
    }
}
