#![forbid(unsafe_code)]

use std::fmt;

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, ObjectId, Stream};
use ticket_defense_contracts::strategy::DefenseStrategy;
use ticket_defense_contracts::ticket::ParsedTicket;

const PAGE_WIDTH: i64 = 612;
const PAGE_HEIGHT: i64 = 792;
const MARGIN: i64 = 54;
const WRAP_COLUMNS: usize = 92;

#[derive(Debug)]
pub struct CasePdfError(String);

impl fmt::Display for CasePdfError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "case summary pdf: {}", self.0)
    }
}

impl std::error::Error for CasePdfError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Style {
    Title,
    Heading,
    Body,
}

impl Style {
    fn font(self) -> (&'static str, i64, i64) {
        // (font resource, size, leading)
        match self {
            Self::Title => ("F2", 16, 24),
            Self::Heading => ("F2", 12, 18),
            Self::Body => ("F1", 10, 13),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Line {
    style: Style,
    indent: i64,
    text: String,
}

/// Renders a printable summary of the parsed ticket and its strategy.
pub fn render_case_summary_pdf(
    ticket: &ParsedTicket,
    strategy: &DefenseStrategy,
    tracking_code: Option<&str>,
) -> Result<Vec<u8>, CasePdfError> {
    let lines = layout(ticket, strategy, tracking_code);
    let pages = paginate(&lines);

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let regular = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });
    let bold = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica-Bold",
        "Encoding" => "WinAnsiEncoding",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => regular, "F2" => bold },
    });

    let mut kids: Vec<Object> = Vec::with_capacity(pages.len());
    for page_lines in &pages {
        let content = Content {
            operations: page_operations(page_lines),
        };
        let encoded = content
            .encode()
            .map_err(|err| CasePdfError(err.to_string()))?;
        let content_id = doc.add_object(Stream::new(dictionary! {}, encoded));
        let page_id: ObjectId = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), PAGE_WIDTH.into(), PAGE_HEIGHT.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.compress();

    let mut out = Vec::new();
    doc.save_to(&mut out)
        .map_err(|err| CasePdfError(err.to_string()))?;
    Ok(out)
}

fn layout(ticket: &ParsedTicket, strategy: &DefenseStrategy, tracking_code: Option<&str>) -> Vec<Line> {
    let mut lines = Vec::new();
    push(&mut lines, Style::Title, 0, "Traffic Ticket Case Summary");
    if let Some(code) = tracking_code.filter(|c| !c.trim().is_empty()) {
        push(&mut lines, Style::Body, 0, &format!("Tracking code: {code}"));
    }

    push(&mut lines, Style::Heading, 0, "Ticket details");
    let vehicle = vehicle_line(ticket);
    let speed = speed_line(ticket);
    let violation_when = join_non_empty(&[&ticket.violation.date, &ticket.violation.time], " ");
    let court_when = join_non_empty(&[&ticket.court.date, &ticket.court.time], " at ");
    let fields: [(&str, &str); 13] = [
        ("Citation", ticket.citation_number.as_str()),
        ("Driver", ticket.driver.name.as_str()),
        ("Address", ticket.driver.address.as_str()),
        ("License", ticket.driver.license_number.as_str()),
        ("Vehicle", vehicle.as_str()),
        ("Violation", ticket.violation.description.as_str()),
        ("Statute", ticket.violation.statute.as_str()),
        ("Speed", speed.as_str()),
        ("Date / time", violation_when.as_str()),
        ("Location", ticket.violation.location.as_str()),
        ("Court", ticket.court.name.as_str()),
        ("Court date", court_when.as_str()),
        ("Court address", ticket.court.address.as_str()),
    ];
    let mut any_field = false;
    for (label, value) in fields {
        if !value.trim().is_empty() {
            any_field = true;
            push_wrapped(&mut lines, Style::Body, 12, &format!("{label}: {}", value.trim()));
        }
    }
    if !any_field {
        push(&mut lines, Style::Body, 12, "No fields could be read from the ticket.");
    }

    push(
        &mut lines,
        Style::Heading,
        0,
        &format!("Defense strategy (extraction confidence {}%)", strategy.confidence),
    );
    push_wrapped(&mut lines, Style::Body, 12, &strategy.summary);
    for (idx, item) in strategy.strategies.iter().enumerate() {
        push_wrapped(&mut lines, Style::Body, 12, &format!("{}. {}", idx + 1, item.title));
        if !item.detail.trim().is_empty() {
            push_wrapped(&mut lines, Style::Body, 28, &item.detail);
        }
    }
    if !strategy.flags.is_empty() {
        push_wrapped(
            &mut lines,
            Style::Body,
            12,
            &format!("Flags: {}", strategy.flags.join(", ")),
        );
    }

    push(&mut lines, Style::Heading, 0, "Important");
    push_wrapped(
        &mut lines,
        Style::Body,
        12,
        "This summary is generated from an automated reading of your ticket and is not legal \
         advice. Verify every detail against the original citation.",
    );
    lines
}

fn push(lines: &mut Vec<Line>, style: Style, indent: i64, text: &str) {
    lines.push(Line {
        style,
        indent,
        text: text.to_string(),
    });
}

fn push_wrapped(lines: &mut Vec<Line>, style: Style, indent: i64, text: &str) {
    let columns = WRAP_COLUMNS.saturating_sub(usize::try_from(indent / 5).unwrap_or(0)).max(20);
    for row in wrap_text(text, columns) {
        push(lines, style, indent, &row);
    }
}

fn wrap_text(text: &str, columns: usize) -> Vec<String> {
    let mut rows = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        let needed = if current.is_empty() {
            word.chars().count()
        } else {
            current.chars().count() + 1 + word.chars().count()
        };
        if needed > columns && !current.is_empty() {
            rows.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        rows.push(current);
    }
    rows
}

fn paginate(lines: &[Line]) -> Vec<Vec<Line>> {
    let usable = PAGE_HEIGHT - 2 * MARGIN;
    let mut pages: Vec<Vec<Line>> = vec![Vec::new()];
    let mut used = 0;
    for line in lines {
        let (_, _, leading) = line.style.font();
        if used + leading > usable {
            pages.push(Vec::new());
            used = 0;
        }
        used += leading;
        if let Some(page) = pages.last_mut() {
            page.push(line.clone());
        }
    }
    pages
}

fn page_operations(lines: &[Line]) -> Vec<Operation> {
    let mut ops = Vec::with_capacity(lines.len() * 5);
    let mut y = PAGE_HEIGHT - MARGIN;
    for line in lines {
        let (font, size, leading) = line.style.font();
        y -= leading;
        ops.push(Operation::new("BT", vec![]));
        ops.push(Operation::new("Tf", vec![font.into(), size.into()]));
        ops.push(Operation::new("Td", vec![(MARGIN + line.indent).into(), y.into()]));
        ops.push(Operation::new(
            "Tj",
            vec![Object::string_literal(win_ansi_bytes(&line.text))],
        ));
        ops.push(Operation::new("ET", vec![]));
    }
    ops
}

/// Helvetica with WinAnsiEncoding covers Latin-1; everything else becomes '?'.
fn win_ansi_bytes(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match c {
            '•' => 0x95,
            '–' => 0x96,
            '—' => 0x97,
            '‘' => 0x91,
            '’' => 0x92,
            '“' => 0x93,
            '”' => 0x94,
            c if (c as u32) < 0x80 || (0xA0..=0xFF).contains(&(c as u32)) => c as u32 as u8,
            _ => b'?',
        })
        .collect()
}

fn vehicle_line(ticket: &ParsedTicket) -> String {
    let v = &ticket.vehicle;
    let mut line = join_non_empty(&[&v.year, &v.color, &v.make, &v.model], " ");
    let plate = join_non_empty(&[&v.plate, &v.plate_state], " ");
    if !plate.is_empty() {
        if !line.is_empty() {
            line.push_str(", ");
        }
        line.push_str(&format!("plate {plate}"));
    }
    line
}

fn speed_line(ticket: &ParsedTicket) -> String {
    match (ticket.speed_mph(), ticket.speed_limit_mph()) {
        (Some(speed), Some(limit)) => format!("{speed} mph in a {limit} mph zone"),
        (Some(speed), None) => format!("{speed} mph"),
        _ => String::new(),
    }
}

fn join_non_empty(parts: &[&String], sep: &str) -> String {
    parts
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(sep)
}
