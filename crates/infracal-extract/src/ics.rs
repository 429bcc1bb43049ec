//! Calendar export: stored events → an RFC 5545 `VCALENDAR` document.

use infracal_store::{Alarm, Attendee, Event};

use crate::normalize::{escape_text, fold_line, to_ical_datetime};

pub const PRODID: &str = "-//InfraCalendar//EN";
pub const UID_DOMAIN: &str = "infracalendar.local";

/// Quote a parameter value when it carries `:`, `;` or `,`.
fn param_value(value: &str) -> String {
    let clean = value.replace('"', "");
    if clean.contains([':', ';', ',']) {
        format!("\"{}\"", clean)
    } else {
        clean
    }
}

fn text_prop(lines: &mut Vec<String>, name: &str, value: Option<&str>) {
    if let Some(v) = value.map(str::trim).filter(|v| !v.is_empty()) {
        lines.push(format!("{}:{}", name, escape_text(v)));
    }
}

fn raw_prop(lines: &mut Vec<String>, name: &str, value: Option<&str>) {
    if let Some(v) = value.map(str::trim).filter(|v| !v.is_empty()) {
        lines.push(format!("{}:{}", name, v));
    }
}

fn date_prop(lines: &mut Vec<String>, name: &str, value: Option<&str>, tzid: Option<&str>) {
    let Some(v) = value.and_then(to_ical_datetime) else {
        return;
    };
    let line = if !v.contains('T') {
        format!("{};VALUE=DATE:{}", name, v)
    } else {
        match tzid.map(str::trim).filter(|t| !t.is_empty()) {
            Some(tz) if !v.ends_with('Z') => format!("{};TZID={}:{}", name, param_value(tz), v),
            _ => format!("{}:{}", name, v),
        }
    };
    lines.push(line);
}

fn attendee_line(attendee: &Attendee) -> String {
    let mut line = String::from("ATTENDEE");
    if let Some(cn) = &attendee.common_name {
        line.push_str(&format!(";CN={}", param_value(cn)));
    }
    if let Some(role) = &attendee.role {
        line.push_str(&format!(";ROLE={}", param_value(role)));
    }
    if let Some(partstat) = &attendee.partstat {
        line.push_str(&format!(";PARTSTAT={}", param_value(partstat)));
    }
    if let Some(rsvp) = attendee.rsvp {
        line.push_str(if rsvp { ";RSVP=TRUE" } else { ";RSVP=FALSE" });
    }
    line.push(':');
    line.push_str(&attendee.address);
    line
}

fn alarm_lines(lines: &mut Vec<String>, alarm: &Alarm) {
    lines.push("BEGIN:VALARM".to_string());
    raw_prop(lines, "ACTION", Some(alarm.action.as_deref().unwrap_or("DISPLAY")));
    raw_prop(lines, "TRIGGER", alarm.trigger.as_deref());
    text_prop(lines, "DESCRIPTION", alarm.description.as_deref());
    text_prop(lines, "SUMMARY", alarm.summary.as_deref());
    raw_prop(lines, "DURATION", alarm.duration.as_deref());
    if let Some(repeat) = alarm.repeat {
        lines.push(format!("REPEAT:{}", repeat));
    }
    lines.push("END:VALARM".to_string());
}

fn event_lines(lines: &mut Vec<String>, event: &Event) {
    let f = &event.fields;
    lines.push("BEGIN:VEVENT".to_string());

    // Several events can share a page URL, so a missing UID is derived from the row id.
    let uid = f
        .uid
        .as_deref()
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .map_or_else(|| format!("event-{}@{}", event.event_id, UID_DOMAIN), str::to_string);
    raw_prop(lines, "UID", Some(&uid));
    let dtstamp = f
        .dtstamp
        .as_deref()
        .and_then(to_ical_datetime)
        .unwrap_or_else(|| event.updated_at.format("%Y%m%dT%H%M%SZ").to_string());
    raw_prop(lines, "DTSTAMP", Some(&dtstamp));

    let tzid = f.tzid.as_deref();
    date_prop(lines, "DTSTART", f.dtstart.as_deref().or(f.start.as_deref()), tzid);
    date_prop(lines, "DTEND", f.dtend.as_deref(), tzid);
    if f.dtend.is_none() {
        raw_prop(lines, "DURATION", f.duration.as_deref());
    }

    text_prop(lines, "SUMMARY", f.summary.as_deref().or(f.title.as_deref()));
    text_prop(lines, "DESCRIPTION", f.description.as_deref());
    text_prop(lines, "LOCATION", f.location.as_deref());
    raw_prop(lines, "URL", f.url.as_deref());
    raw_prop(lines, "GEO", f.geo.as_deref());
    if !f.categories.is_empty() {
        let joined: Vec<String> = f.categories.iter().map(|c| escape_text(c)).collect();
        lines.push(format!("CATEGORIES:{}", joined.join(",")));
    }
    raw_prop(lines, "STATUS", f.status.as_deref());
    raw_prop(lines, "TRANSP", f.transp.as_deref());
    if let Some(sequence) = f.sequence {
        lines.push(format!("SEQUENCE:{}", sequence));
    }
    raw_prop(lines, "CREATED", f.created.as_deref());
    raw_prop(lines, "LAST-MODIFIED", f.last_modified.as_deref());
    raw_prop(lines, "ORGANIZER", f.organizer.as_deref());
    lines.extend(f.attendees.iter().map(attendee_line));
    for attach in &f.attach {
        raw_prop(lines, "ATTACH", Some(attach));
    }
    raw_prop(lines, "CLASS", f.classification.as_deref());
    if let Some(priority) = f.priority {
        lines.push(format!("PRIORITY:{}", priority));
    }
    raw_prop(lines, "RRULE", f.rrule.as_deref());
    if !f.rdate.is_empty() {
        lines.push(format!("RDATE:{}", f.rdate.join(",")));
    }
    if !f.exdate.is_empty() {
        lines.push(format!("EXDATE:{}", f.exdate.join(",")));
    }
    raw_prop(lines, "RECURRENCE-ID", f.recurrence_id.as_deref());
    for alarm in &f.alarms {
        alarm_lines(lines, alarm);
    }

    lines.push("END:VEVENT".to_string());
}

/// Render `events` as one calendar named `calendar_name`.
///
/// Lines are folded at 75 octets and terminated with CRLF, including the last.
pub fn format_ical(events: &[Event], calendar_name: &str) -> String {
    let mut lines = vec![
        "BEGIN:VCALENDAR".to_string(),
        "VERSION:2.0".to_string(),
        format!("PRODID:{}", PRODID),
    ];
    text_prop(&mut lines, "X-WR-CALNAME", Some(calendar_name));
    lines.push("CALSCALE:GREGORIAN".to_string());
    lines.push("METHOD:PUBLISH".to_string());

    for event in events {
        event_lines(&mut lines, event);
    }
    lines.push("END:VCALENDAR".to_string());

    let mut out = String::new();
    for line in &lines {
        out.push_str(&fold_line(line));
        out.push_str("\r\n");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use infracal_store::EventCandidate;

    fn event(id: i64, fields: EventCandidate) -> Event {
        let ts = Utc.with_ymd_and_hms(2025, 2, 1, 8, 30, 0).unwrap();
        Event {
            event_id: id,
            page_id: 1,
            fields,
            extracted_at: ts,
            created_at: ts,
            updated_at: ts,
            is_valid: true,
            content_hash: None,
        }
    }

    #[test]
    fn test_calendar_envelope() {
        let ics = format_ical(&[], "Parks; Rec");
        assert!(ics.starts_with("BEGIN:VCALENDAR\r\nVERSION:2.0\r\nPRODID:-//InfraCalendar//EN\r\n"));
        assert!(ics.contains("X-WR-CALNAME:Parks\\; Rec\r\n"));
        assert!(ics.contains("CALSCALE:GREGORIAN\r\nMETHOD:PUBLISH\r\n"));
        assert!(ics.ends_with("END:VCALENDAR\r\n"));
    }

    #[test]
    fn test_event_fallbacks() {
        let ics = format_ical(
            &[event(
                7,
                EventCandidate {
                    title: Some("Fun Hike".into()),
                    start: Some("2026-01-10 10:00:00".into()),
                    ..Default::default()
                },
            )],
            "Trails",
        );
        assert!(ics.contains("UID:event-7@infracalendar.local\r\n"));
        assert!(ics.contains("DTSTAMP:20250201T083000Z\r\n"));
        assert!(ics.contains("DTSTART:20260110T100000\r\n"));
        assert!(ics.contains("SUMMARY:Fun Hike\r\n"));
    }

    #[test]
    fn test_uidless_events_sharing_url_get_distinct_uids() {
        let listing = |title: &str| EventCandidate {
            title: Some(title.into()),
            start: Some("2025-03-08 09:00:00".into()),
            url: Some("https://city.example/meetings".into()),
            ..Default::default()
        };
        let ics = format_ical(
            &[event(3, listing("Board Meeting")), event(4, listing("Budget Hearing"))],
            "City",
        );
        assert!(ics.contains("UID:event-3@infracalendar.local\r\n"));
        assert!(ics.contains("UID:event-4@infracalendar.local\r\n"));
        assert!(ics.contains("URL:https://city.example/meetings\r\n"));
        assert!(!ics.contains("UID:https://"));
    }

    #[test]
    fn test_event_properties() {
        let fields = EventCandidate {
            uid: Some("1234@example.com".into()),
            dtstart: Some("20250110T100000".into()),
            dtend: Some("2025-01-10".into()),
            tzid: Some("America/Los_Angeles".into()),
            summary: Some("Test Event".into()),
            location: Some("Test Park, North Gate".into()),
            categories: vec!["Parks".into(), "Volunteering".into()],
            attendees: vec![Attendee {
                address: "mailto:jane@example.com".into(),
                common_name: Some("Doe, Jane".into()),
                rsvp: Some(true),
                ..Default::default()
            }],
            alarms: vec![Alarm {
                trigger: Some("-PT15M".into()),
                ..Default::default()
            }],
            ..Default::default()
        };
        let ics = format_ical(&[event(1, fields)], "City");
        assert!(ics.contains("DTSTART;TZID=America/Los_Angeles:20250110T100000\r\n"));
        assert!(ics.contains("DTEND;VALUE=DATE:20250110\r\n"));
        assert!(ics.contains("LOCATION:Test Park\\, North Gate\r\n"));
        assert!(ics.contains("CATEGORIES:Parks,Volunteering\r\n"));
        assert!(ics.contains("ATTENDEE;CN=\"Doe, Jane\";RSVP=TRUE:mailto:jane@example.com\r\n"));
        assert!(ics.contains("BEGIN:VALARM\r\nACTION:DISPLAY\r\nTRIGGER:-PT15M\r\nEND:VALARM\r\n"));
    }

    #[test]
    fn test_long_lines_fold() {
        let fields = EventCandidate {
            uid: Some("long@example.com".into()),
            description: Some("Resurfacing ".repeat(20)),
            ..Default::default()
        };
        let ics = format_ical(&[event(2, fields)], "City");
        for line in ics.split("\r\n") {
            assert!(line.len() <= 75, "line over 75 octets: {line:?}");
        }
        let unfolded = ics.replace("\r\n ", "");
        let expected = format!("DESCRIPTION:{}\r\n", "Resurfacing ".repeat(20).trim());
        assert!(unfolded.contains(&expected));
    }
}
