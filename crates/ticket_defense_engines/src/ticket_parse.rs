#![forbid(unsafe_code)]

//! Regex cascade over OCR text.
//!
//! Each ticket field owns an ordered list of `(pattern, extractor)` pairs. The
//! first capture that its extractor accepts wins; later patterns are only
//! consulted when earlier ones produce nothing usable. Fields never depend on
//! each other, so adding a pattern cannot change another field's result.

use once_cell::sync::Lazy;
use regex::Regex;
use ticket_defense_contracts::ticket::ParsedTicket;
use unicode_normalization::UnicodeNormalization;

type Extractor = fn(&str) -> Option<String>;

const DATE: &str = r"(?:\d{1,2}[/-]\d{1,2}[/-]\d{2,4}|\d{4}-\d{2}-\d{2}|(?:jan|feb|mar|apr|may|jun|jul|aug|sep|sept|oct|nov|dec)[a-z]*\.?\s+\d{1,2},?\s+\d{4})";
const TIME: &str = r"(?:\d{1,2}:\d{2}\s*(?:[ap]\.?\s?m\.?)?)";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TicketField {
    CitationNumber,
    DriverName,
    DriverAddress,
    DriverLicenseNumber,
    DriverDateOfBirth,
    VehiclePlate,
    VehiclePlateState,
    VehicleMake,
    VehicleModel,
    VehicleYear,
    VehicleColor,
    ViolationStatute,
    ViolationDescription,
    ViolationSpeed,
    ViolationSpeedLimit,
    ViolationDate,
    ViolationTime,
    ViolationLocation,
    CourtName,
    CourtDate,
    CourtTime,
    CourtAddress,
}

impl TicketField {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CitationNumber => "citationNumber",
            Self::DriverName => "driver.name",
            Self::DriverAddress => "driver.address",
            Self::DriverLicenseNumber => "driver.licenseNumber",
            Self::DriverDateOfBirth => "driver.dateOfBirth",
            Self::VehiclePlate => "vehicle.plate",
            Self::VehiclePlateState => "vehicle.plateState",
            Self::VehicleMake => "vehicle.make",
            Self::VehicleModel => "vehicle.model",
            Self::VehicleYear => "vehicle.year",
            Self::VehicleColor => "vehicle.color",
            Self::ViolationStatute => "violation.statute",
            Self::ViolationDescription => "violation.description",
            Self::ViolationSpeed => "violation.speed",
            Self::ViolationSpeedLimit => "violation.speedLimit",
            Self::ViolationDate => "violation.date",
            Self::ViolationTime => "violation.time",
            Self::ViolationLocation => "violation.location",
            Self::CourtName => "court.name",
            Self::CourtDate => "court.date",
            Self::CourtTime => "court.time",
            Self::CourtAddress => "court.address",
        }
    }

    fn slot(self, parsed: &mut ParsedTicket) -> &mut String {
        match self {
            Self::CitationNumber => &mut parsed.citation_number,
            Self::DriverName => &mut parsed.driver.name,
            Self::DriverAddress => &mut parsed.driver.address,
            Self::DriverLicenseNumber => &mut parsed.driver.license_number,
            Self::DriverDateOfBirth => &mut parsed.driver.date_of_birth,
            Self::VehiclePlate => &mut parsed.vehicle.plate,
            Self::VehiclePlateState => &mut parsed.vehicle.plate_state,
            Self::VehicleMake => &mut parsed.vehicle.make,
            Self::VehicleModel => &mut parsed.vehicle.model,
            Self::VehicleYear => &mut parsed.vehicle.year,
            Self::VehicleColor => &mut parsed.vehicle.color,
            Self::ViolationStatute => &mut parsed.violation.statute,
            Self::ViolationDescription => &mut parsed.violation.description,
            Self::ViolationSpeed => &mut parsed.violation.speed,
            Self::ViolationSpeedLimit => &mut parsed.violation.speed_limit,
            Self::ViolationDate => &mut parsed.violation.date,
            Self::ViolationTime => &mut parsed.violation.time,
            Self::ViolationLocation => &mut parsed.violation.location,
            Self::CourtName => &mut parsed.court.name,
            Self::CourtDate => &mut parsed.court.date,
            Self::CourtTime => &mut parsed.court.time,
            Self::CourtAddress => &mut parsed.court.address,
        }
    }
}

struct FieldRule {
    field: TicketField,
    matchers: &'static [(&'static str, Extractor)],
}

// Patterns are compiled with `(?im)`; `{DATE}` and `{TIME}` expand to the
// shared fragments above. Capture group 1 is handed to the extractor.
static FIELD_RULES: &[FieldRule] = &[
    FieldRule {
        field: TicketField::CitationNumber,
        matchers: &[(
            r"\b(?:uniform\s+)?(?:citation|ticket|summons)\s*(?:no\.?|number|num|#)\s*[:#]?\s*([A-Z0-9][A-Z0-9-]{4,19})\b",
            token_with_digit,
        )],
    },
    FieldRule {
        field: TicketField::DriverName,
        matchers: &[
            (
                r"^(?:driver(?:['’]?s)?\s+name|name\s+of\s+(?:driver|defendant)|defendant(?:['’]?s)?\s+name|defendant|driver|name)\s*[:\-]\s*(.+)$",
                person_name,
            ),
            (r"^name\s*\(\s*last\s*,\s*first[^)]*\)\s*[:\-]?\s*(.+)$", person_name),
        ],
    },
    FieldRule {
        field: TicketField::DriverAddress,
        matchers: &[
            (
                r"^(?:address|addr\.?|street\s+address|residence(?:\s+address)?)\s*[:\-]\s*(.+\n[A-Z .'\-]+,\s*[A-Z]{2}\s+\d{5}(?:-\d{4})?)$",
                street_address,
            ),
            (
                r"^(?:address|addr\.?|street\s+address|residence(?:\s+address)?)\s*[:\-]\s*(.+)$",
                street_address,
            ),
            (
                r"^(\d{1,6}\s+[A-Z0-9.'\- ]+?\s(?:st|street|ave|avenue|rd|road|dr|drive|ln|lane|blvd|boulevard|ct|way|pkwy|parkway|hwy|highway|cir|circle|pl|place|trl|trail|ter|terrace)\b\.?(?:[ ,]+[A-Z .'\-]+?)?(?:,?\s*[A-Z]{2}\s+\d{5}(?:-\d{4})?)?)$",
                street_address,
            ),
        ],
    },
    FieldRule {
        field: TicketField::DriverLicenseNumber,
        matchers: &[(
            r"\b(?:driver['’]?s?\s+license|drivers?\s+lic\.?|d\.?l\.?|lic(?:ense)?)\s*(?:no\.?|number|num|#)\s*[:#]?\s*([A-Z0-9][A-Z0-9-]{4,19})\b",
            token_with_digit,
        )],
    },
    FieldRule {
        field: TicketField::DriverDateOfBirth,
        matchers: &[(
            r"\b(?:dob|d\.o\.b\.?|date\s+of\s+birth|birth\s*date)\s*[:\-]?\s*(\d{1,2}[/-]\d{1,2}[/-]\d{2,4})",
            clean_text,
        )],
    },
    FieldRule {
        field: TicketField::VehiclePlate,
        matchers: &[(
            r"\b(?:license\s+plate|lic\.?\s*plate|plate|tag)\s*(?:no\.?|number|num|#)?\s*[:#\-]?\s*([A-Z0-9]{2,8}(?:-[A-Z0-9]{1,4})?)\b",
            token_with_digit,
        )],
    },
    FieldRule {
        field: TicketField::VehiclePlateState,
        matchers: &[(r"\b(?:tag|plate)\s+state\s*[:\-]?\s*([A-Z]{2})\b", state_code)],
    },
    FieldRule {
        field: TicketField::VehicleMake,
        matchers: &[
            (
                r"\b(?:veh(?:icle)?\.?\s+)?make\s*[:\-]?\s*([A-Z][A-Z-]{1,19})\b",
                vehicle_word,
            ),
            (
                r"^veh(?:icle)?\.?\s*(?:desc(?:ription)?)?\s*[:\-]\s*(?:(?:19|20)\d{2}\s+)?([A-Z][A-Z-]{1,19})\b",
                vehicle_word,
            ),
        ],
    },
    FieldRule {
        field: TicketField::VehicleModel,
        matchers: &[
            (r"\bmodel\s*[:\-]?\s*([A-Z0-9][A-Z0-9-]{0,19})\b", vehicle_word),
            (
                r"^veh(?:icle)?\.?\s*(?:desc(?:ription)?)?\s*[:\-]\s*(?:(?:19|20)\d{2}\s+)?[A-Z][A-Z-]{1,19}\s+([A-Z0-9][A-Z0-9-]{0,19})\b",
                vehicle_word,
            ),
        ],
    },
    FieldRule {
        field: TicketField::VehicleYear,
        matchers: &[
            (
                r"\b(?:veh(?:icle)?\.?\s+)?(?:year|yr)\s*[:\-]?\s*((?:19|20)\d{2})\b",
                clean_text,
            ),
            (
                r"^veh(?:icle)?\.?\s*(?:desc(?:ription)?)?\s*[:\-]\s*((?:19|20)\d{2})\b",
                clean_text,
            ),
        ],
    },
    FieldRule {
        field: TicketField::VehicleColor,
        matchers: &[(r"\b(?:colou?r|clr)\s*[:\-]?\s*([A-Z]{3,12})\b", vehicle_word)],
    },
    FieldRule {
        field: TicketField::ViolationStatute,
        matchers: &[
            (
                r"\bo\.?\s?c\.?\s?g\.?\s?a\.?\s*(?:§+\s*)?(\d{1,3}-\d{1,3}-\d{1,4}(?:\.\d+)?(?:\s?\([a-z0-9]{1,3}\))*)",
                ocga_statute,
            ),
            (
                r"\b(?:statute|code\s+section|section|sec\.|ordinance|viol(?:ation)?\.?\s+code)\s*(?:§+|no\.?|number|#)?\s*[:\-]?\s*(?:§+\s*)?(\d{1,4}(?:[-.]\d{1,4}){1,3}(?:\s?\([a-z0-9]{1,3}\))*)",
                statute,
            ),
            (
                r"§+\s*(\d{1,4}(?:[-.]\d{1,4}){1,3}(?:\s?\([a-z0-9]{1,3}\))*)",
                statute,
            ),
        ],
    },
    FieldRule {
        field: TicketField::ViolationDescription,
        matchers: &[
            (
                r"^(?:violation|offense|offence|charge|description|nature\s+of\s+(?:violation|offense|offence))\s*(?:description)?\s*[:\-]\s*(.+)$",
                description,
            ),
            (r"\b(speeding\b[^\n]{0,80})", description),
            (
                r"\b((?:too\s+fast\s+for\s+conditions|failure\s+to\s+(?:yield|stop|maintain\s+lane|obey)|reckless\s+driving|red\s+light|stop\s+sign|improper\s+lane\s+change|following\s+too\s+closely|distracted\s+driving|hands[-\s]free|no\s+insurance|suspended\s+license|expired\s+(?:tag|registration))[^\n]{0,60})",
                description,
            ),
        ],
    },
    FieldRule {
        field: TicketField::ViolationSpeed,
        matchers: &[
            (
                r"\b(\d{2,3})\s*(?:mph|m\.p\.h\.?)?\s*(?:in\s+an?|in|on\s+an?)\s*\d{2,3}\s*(?:mph|m\.p\.h\.?|zone)?\b",
                mph,
            ),
            (
                r"\b(?:actual|alleged|recorded|clocked|measured|radar|laser|lidar)\s*(?:speed)?\s*[:\-]?\s*(?:at\s+)?(\d{2,3})\b",
                mph,
            ),
            (
                r"\bspeed\s*(?:[:\-]|of|at)?\s*(\d{2,3})\s*(?:mph|m\.p\.h\.?)",
                mph,
            ),
            (r"^speed\s*[:\-]\s*(\d{2,3})\b", mph),
            (
                r"\b(?:traveling|travelling|driving|going)\s+(?:at\s+)?(\d{2,3})\s*(?:mph|m\.p\.h\.?)",
                mph,
            ),
        ],
    },
    FieldRule {
        field: TicketField::ViolationSpeedLimit,
        matchers: &[
            (
                r"\b\d{2,3}\s*(?:mph|m\.p\.h\.?)?\s*(?:in\s+an?|in|on\s+an?)\s*(\d{2,3})\s*(?:mph|m\.p\.h\.?|zone)?\b",
                mph,
            ),
            (
                r"\b(?:speed\s+limit|posted\s+(?:speed|limit)(?:\s+limit)?|posted|limit|zone)\s*[:\-]?\s*(\d{2,3})\b",
                mph,
            ),
            (r"\b(\d{2,3})\s*(?:mph\s+)?zone\b", mph),
        ],
    },
    FieldRule {
        field: TicketField::ViolationDate,
        matchers: &[
            (
                r"\b(?:date\s+of\s+(?:violation|offense|offence|incident)|violation\s+date|offen[sc]e\s+date|issued?\s+(?:on|date))\s*[:\-]?\s*({DATE})",
                clean_text,
            ),
            (r"^date\s*[:\-]?\s*({DATE})", clean_text),
        ],
    },
    FieldRule {
        field: TicketField::ViolationTime,
        matchers: &[
            (
                r"\b(?:time\s+of\s+(?:violation|offense|offence|incident)|violation\s+time|offen[sc]e\s+time)\s*[:\-]?\s*({TIME})",
                clean_time,
            ),
            (r"^time\s*[:\-]?\s*({TIME})", clean_time),
        ],
    },
    FieldRule {
        field: TicketField::ViolationLocation,
        matchers: &[(
            r"^(?:location|place\s+of\s+(?:violation|offense|offence)|violation\s+location|loc\.?)\s*[:\-]\s*(.+)$",
            clean_text,
        )],
    },
    FieldRule {
        field: TicketField::CourtName,
        matchers: &[
            (
                r"^(?:court(?:\s+name)?|name\s+of\s+court|court\s+of\s+jurisdiction)\s*[:\-]\s*(.+)$",
                court_label,
            ),
            (
                r"\b((?:[A-Z][A-Za-z.'&]*\s+){0,5}(?:municipal|magistrate|state|probate|recorder['’]?s|traffic|county|city|superior|district|justice)\s+court\b(?:\s+of\s+[A-Z][A-Za-z.' ]{2,40})?)",
                court_phrase,
            ),
        ],
    },
    FieldRule {
        field: TicketField::CourtDate,
        matchers: &[
            (
                r"\b(?:court|appearance|hearing|arraignment|trial)\s+date\s*[:\-]?\s*({DATE})",
                clean_text,
            ),
            (
                r"\b(?:appear|appearance|court)\b[^\n]{0,60}?\bon\s+(?:or\s+before\s+)?({DATE})",
                clean_text,
            ),
            (r"^(?:court|appearance)\s*[:\-]\s*({DATE})", clean_text),
        ],
    },
    FieldRule {
        field: TicketField::CourtTime,
        matchers: &[
            (
                r"\b(?:court|appearance|hearing|arraignment|trial)\s+time\s*[:\-]?\s*({TIME})",
                clean_time,
            ),
            (
                r"\b(?:court|appearance|hearing|arraignment|trial)\s+date\s*[:\-]?\s*{DATE}\s*(?:at|@|,)?\s*({TIME})",
                clean_time,
            ),
            (
                r"\b(?:appear|appearance)\b[^\n]{0,60}?\bon\s+(?:or\s+before\s+)?{DATE}\s*(?:at|@|,)?\s*({TIME})",
                clean_time,
            ),
        ],
    },
    FieldRule {
        field: TicketField::CourtAddress,
        matchers: &[(
            r"^(?:court\s+address|court\s+location|address\s+of\s+court)\s*[:\-]\s*(.+)$",
            street_address,
        )],
    },
];

struct CompiledRule {
    field: TicketField,
    matchers: Vec<(Regex, Extractor)>,
}

static COMPILED_RULES: Lazy<Vec<CompiledRule>> = Lazy::new(|| {
    FIELD_RULES
        .iter()
        .map(|rule| CompiledRule {
            field: rule.field,
            matchers: rule
                .matchers
                .iter()
                .map(|(pattern, extract)| {
                    let expanded = pattern.replace("{DATE}", DATE).replace("{TIME}", TIME);
                    let regex = Regex::new(&format!("(?im){expanded}")).unwrap_or_else(|err| {
                        panic!("invalid ticket pattern for {}: {err}", rule.field.as_str())
                    });
                    (regex, *extract)
                })
                .collect(),
        })
        .collect()
});

static TRAILING_LABELS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\s+(?:dob|d\.o\.b\.?|date\s+of\s+birth|sex|race|height|hgt|weight|wgt|lic(?:ense)?|dl|address|addr|phone|tel)\b.*$")
        .expect("Invalid trailing label regex")
});

static COURT_LEAD_IN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^.*\b(?:in|at|before|to)\s+(?:the\s+)?").expect("Invalid court lead-in regex")
});

const US_STATE_CODES: &[&str] = &[
    "AL", "AK", "AZ", "AR", "CA", "CO", "CT", "DE", "DC", "FL", "GA", "HI", "ID", "IL", "IN",
    "IA", "KS", "KY", "LA", "ME", "MD", "MA", "MI", "MN", "MS", "MO", "MT", "NE", "NV", "NH",
    "NJ", "NM", "NY", "NC", "ND", "OH", "OK", "OR", "PA", "RI", "SC", "SD", "TN", "TX", "UT",
    "VT", "VA", "WA", "WV", "WI", "WY",
];

const VEHICLE_STOP_WORDS: &[&str] = &[
    "MAKE", "MODEL", "YEAR", "COLOR", "COLOUR", "TAG", "PLATE", "STATE", "VIN", "TYPE", "STYLE",
    "NO", "NUMBER",
];

/// NFKC-normalizes, unifies line endings, collapses runs of whitespace inside
/// each line and drops blank lines.
pub fn normalize_ocr_text(raw: &str) -> String {
    let nfkc: String = raw.nfkc().collect();
    nfkc.replace("\r\n", "\n")
        .replace('\r', "\n")
        .lines()
        .map(collapse_ws)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Extracts every known field from raw OCR text. Unmatched fields stay empty.
pub fn parse_ticket_text(raw: &str) -> ParsedTicket {
    let text = normalize_ocr_text(raw);
    let mut parsed = ParsedTicket::default();
    for rule in COMPILED_RULES.iter() {
        if let Some(value) = first_accepted_capture(rule, &text) {
            *rule.field.slot(&mut parsed) = value;
        }
    }
    parsed.raw_text = text;
    parsed
}

fn first_accepted_capture(rule: &CompiledRule, text: &str) -> Option<String> {
    rule.matchers.iter().find_map(|(regex, extract)| {
        regex
            .captures_iter(text)
            .filter_map(|caps| caps.get(1))
            .find_map(|m| extract(m.as_str()))
    })
}

fn collapse_ws(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn clean_text(raw: &str) -> Option<String> {
    let compact = collapse_ws(raw);
    let trimmed = compact.trim_matches(|c: char| c.is_whitespace() || matches!(c, ',' | ';' | ':' | '-'));
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn token_with_digit(raw: &str) -> Option<String> {
    let token = clean_text(raw)?.to_ascii_uppercase();
    if token.len() < 2 || token.len() > 20 || !token.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }
    Some(token)
}

fn person_name(raw: &str) -> Option<String> {
    let without_labels = TRAILING_LABELS.replace(raw, "");
    let name = clean_text(&without_labels)?;
    let letters = name.chars().filter(|c| c.is_alphabetic()).count();
    if letters < 2 || name.len() > 80 || name.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }
    Some(name)
}

fn street_address(raw: &str) -> Option<String> {
    let joined = raw.replace('\n', ", ");
    let address = clean_text(&joined)?;
    let has_digit = address.chars().any(|c| c.is_ascii_digit());
    let has_letter = address.chars().any(|c| c.is_alphabetic());
    if address.len() < 6 || !has_digit || !has_letter {
        return None;
    }
    Some(address)
}

fn statute(raw: &str) -> Option<String> {
    let value = clean_text(raw)?.replace(" (", "(");
    let value = value.trim_end_matches('.').to_string();
    if !value.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }
    Some(value)
}

fn ocga_statute(raw: &str) -> Option<String> {
    statute(raw).map(|section| format!("O.C.G.A. § {section}"))
}

fn mph(raw: &str) -> Option<String> {
    let value: u16 = raw.trim().parse().ok()?;
    if (5..=250).contains(&value) {
        Some(value.to_string())
    } else {
        None
    }
}

fn state_code(raw: &str) -> Option<String> {
    let code = raw.trim().to_ascii_uppercase();
    US_STATE_CODES.contains(&code.as_str()).then_some(code)
}

fn vehicle_word(raw: &str) -> Option<String> {
    let word = clean_text(raw)?;
    if word.len() < 2 || VEHICLE_STOP_WORDS.contains(&word.to_ascii_uppercase().as_str()) {
        return None;
    }
    Some(word)
}

fn description(raw: &str) -> Option<String> {
    let text = clean_text(raw)?;
    if text.chars().count() < 3 {
        return None;
    }
    Some(text.chars().take(160).collect::<String>().trim_end().to_string())
}

fn clean_time(raw: &str) -> Option<String> {
    let compact = collapse_ws(raw);
    let clock: String = compact
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == ':')
        .collect();
    if !clock.contains(':') {
        return None;
    }
    let meridiem = compact[clock.len()..]
        .chars()
        .filter(|c| c.is_ascii_alphabetic())
        .collect::<String>()
        .to_ascii_uppercase();
    match meridiem.as_str() {
        "AM" | "PM" => Some(format!("{clock} {meridiem}")),
        _ => Some(clock),
    }
}

fn court_label(raw: &str) -> Option<String> {
    let name = clean_text(raw)?;
    if name.len() < 3 || name.starts_with(|c: char| c.is_ascii_digit()) {
        return None;
    }
    Some(name)
}

fn court_phrase(raw: &str) -> Option<String> {
    let phrase = clean_text(raw)?;
    let stripped = COURT_LEAD_IN.replace(&phrase, "").to_string();
    let candidate = if stripped.to_ascii_lowercase().contains("court") {
        stripped
    } else {
        phrase
    };
    court_label(&candidate)
}
