#![forbid(unsafe_code)]

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use ticket_defense_contracts::ticket::ParsedTicket;
use url::Url;

const GOOGLE_CALENDAR_RENDER: &str = "https://calendar.google.com/calendar/render";
const COMPACT_FORMAT: &str = "%Y%m%dT%H%M%S";

pub fn default_court_time() -> NaiveTime {
    NaiveTime::from_hms_opt(9, 0, 0).unwrap_or_default()
}

/// Parses the date shapes printed on citations. Two-digit years are read as
/// 20YY.
pub fn parse_court_date(raw: &str) -> Option<NaiveDate> {
    let cleaned = raw.trim().replace('.', "");
    if cleaned.is_empty() {
        return None;
    }
    if cleaned.starts_with(|c: char| c.is_ascii_alphabetic()) {
        let words: Vec<&str> = cleaned
            .split_whitespace()
            .map(|w| if w.eq_ignore_ascii_case("sept") { "Sep" } else { w })
            .collect();
        let cleaned = words.join(" ");
        return ["%B %d, %Y", "%B %d %Y"]
            .iter()
            .find_map(|fmt| NaiveDate::parse_from_str(&cleaned, fmt).ok());
    }
    let parts: Vec<&str> = cleaned.split(['/', '-']).collect();
    let [first, second, third] = parts.as_slice() else {
        return None;
    };
    // Only a four-digit lead is an ISO year; otherwise month/day/year.
    let (year, month, day) = if first.len() == 4 {
        (first.parse::<i32>().ok()?, *second, *third)
    } else {
        let year = match third.len() {
            2 => 2000 + third.parse::<i32>().ok()?,
            4 => third.parse().ok()?,
            _ => return None,
        };
        (year, *first, *second)
    };
    NaiveDate::from_ymd_opt(year, month.parse().ok()?, day.parse().ok()?)
}

pub fn parse_court_time(raw: &str) -> Option<NaiveTime> {
    let compact: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '.')
        .collect::<String>()
        .to_ascii_uppercase();
    if compact.is_empty() {
        return None;
    }
    if compact.ends_with("AM") || compact.ends_with("PM") {
        return NaiveTime::parse_from_str(&compact, "%I:%M%p").ok();
    }
    NaiveTime::parse_from_str(&compact, "%H:%M").ok()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CourtEvent {
    pub title: String,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub location: String,
    pub details: String,
    uid: String,
}

impl CourtEvent {
    /// `None` when the ticket has no parseable court date. A missing or
    /// unparseable time defaults to 09:00; events last one hour.
    pub fn from_ticket(ticket: &ParsedTicket) -> Option<Self> {
        let date = parse_court_date(&ticket.court.date)?;
        let time = parse_court_time(&ticket.court.time).unwrap_or_else(default_court_time);
        let start = date.and_time(time);

        let court_name = ticket.court.name.trim();
        let title = if court_name.is_empty() {
            "Traffic court appearance".to_string()
        } else {
            format!("Traffic court appearance: {court_name}")
        };
        let location = [ticket.court.address.trim(), court_name]
            .into_iter()
            .find(|v| !v.is_empty())
            .unwrap_or_default()
            .to_string();

        let citation = ticket.citation_number.trim();
        let mut details = String::new();
        if !citation.is_empty() {
            details.push_str(&format!("Citation {citation}. "));
        }
        let description = ticket.violation.description.trim();
        if !description.is_empty() {
            details.push_str(&format!("{description}. "));
        }
        details.push_str("Bring the original ticket and any evidence. Confirm the date with the court clerk.");

        let uid_key = if citation.is_empty() {
            start.format(COMPACT_FORMAT).to_string()
        } else {
            citation.to_ascii_lowercase()
        };
        Some(Self {
            title,
            start,
            end: start + Duration::hours(1),
            location,
            details,
            uid: format!("court-{uid_key}@ticket-defense"),
        })
    }

    pub fn google_calendar_url(&self) -> String {
        let dates = format!(
            "{}/{}",
            self.start.format(COMPACT_FORMAT),
            self.end.format(COMPACT_FORMAT)
        );
        let mut params = vec![
            ("action", "TEMPLATE"),
            ("text", self.title.as_str()),
            ("dates", dates.as_str()),
            ("details", self.details.as_str()),
        ];
        if !self.location.is_empty() {
            params.push(("location", self.location.as_str()));
        }
        match Url::parse_with_params(GOOGLE_CALENDAR_RENDER, &params) {
            Ok(url) => url.to_string(),
            Err(_) => GOOGLE_CALENDAR_RENDER.to_string(),
        }
    }

    /// RFC 5545 calendar with a single floating-time event.
    pub fn to_ics(&self, stamp: DateTime<Utc>) -> String {
        let mut lines = vec![
            "BEGIN:VCALENDAR".to_string(),
            "VERSION:2.0".to_string(),
            "PRODID:-//Ticket Defense//Court Date//EN".to_string(),
            "CALSCALE:GREGORIAN".to_string(),
            "BEGIN:VEVENT".to_string(),
            format!("UID:{}", self.uid),
            format!("DTSTAMP:{}Z", stamp.format(COMPACT_FORMAT)),
            format!("DTSTART:{}", self.start.format(COMPACT_FORMAT)),
            format!("DTEND:{}", self.end.format(COMPACT_FORMAT)),
            format!("SUMMARY:{}", escape_ics_text(&self.title)),
            format!("DESCRIPTION:{}", escape_ics_text(&self.details)),
        ];
        if !self.location.is_empty() {
            lines.push(format!("LOCATION:{}", escape_ics_text(&self.location)));
        }
        lines.extend(
            [
                "BEGIN:VALARM",
                "TRIGGER:-P1D",
                "ACTION:DISPLAY",
                "DESCRIPTION:Traffic court tomorrow",
                "END:VALARM",
                "END:VEVENT",
                "END:VCALENDAR",
            ]
            .map(str::to_string),
        );
        let mut out = String::new();
        for line in lines {
            out.push_str(&fold_ics_line(&line));
            out.push_str("\r\n");
        }
        out
    }
}

fn escape_ics_text(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace(';', "\\;")
        .replace(',', "\\,")
        .replace("\r\n", "\\n")
        .replace('\n', "\\n")
}

/// Folds content lines longer than 75 octets, never splitting a UTF-8 char.
fn fold_ics_line(line: &str) -> String {
    if line.len() <= 75 {
        return line.to_string();
    }
    let mut out = String::with_capacity(line.len() + line.len() / 70 * 3);
    let mut width = 0;
    for ch in line.chars() {
        let len = ch.len_utf8();
        if width + len > 75 {
            out.push_str("\r\n ");
            width = 1;
        }
        out.push(ch);
        width += len;
    }
    out
}
