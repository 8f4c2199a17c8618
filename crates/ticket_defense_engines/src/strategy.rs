#![forbid(unsafe_code)]

use std::collections::BTreeSet;

use ticket_defense_contracts::strategy::{
    flags, DefenseStrategy, StrategyItem, StrategySource, MAX_STRATEGY_ITEMS,
};
use ticket_defense_contracts::ticket::{ParsedTicket, KEY_FIELD_COUNT};

pub const HIGH_SPEED_DELTA_MPH: u16 = 15;
pub const SUPER_SPEEDER_MPH: u16 = 85;
pub const SUPER_SPEEDER_TWO_LANE_MPH: u16 = 75;
/// Posted limits at or below this are treated as two-lane roads.
pub const TWO_LANE_LIMIT_MPH: u16 = 55;
pub const LOW_CONFIDENCE_THRESHOLD: u8 = 60;

/// Percentage of the key fields that were extracted, rounded.
pub fn confidence_score(ticket: &ParsedTicket) -> u8 {
    let populated = ticket.populated_key_field_count().min(KEY_FIELD_COUNT);
    ((populated as f64 / KEY_FIELD_COUNT as f64) * 100.0).round() as u8
}

pub fn is_super_speeder(speed: u16, limit: Option<u16>) -> bool {
    if speed >= SUPER_SPEEDER_MPH {
        return true;
    }
    matches!(limit, Some(limit) if limit <= TWO_LANE_LIMIT_MPH && speed >= SUPER_SPEEDER_TWO_LANE_MPH)
}

/// Deterministic strategy derived only from the parsed ticket.
pub fn build_local_strategy(ticket: &ParsedTicket) -> DefenseStrategy {
    let confidence = confidence_score(ticket);
    let speed = ticket.speed_mph();
    let limit = ticket.speed_limit_mph();
    let over = match (speed, limit) {
        (Some(speed), Some(limit)) if speed > limit => Some(speed - limit),
        _ => None,
    };

    let mut items = vec![StrategyItem::new(
        "Don't pay the fine yet",
        "Paying a traffic ticket is treated as a guilty plea in most courts. The conviction is \
         reported to your driving record and can add points and raise insurance rates, so keep \
         your options open until you have reviewed a defense.",
    )];
    items.push(court_date_item(ticket));

    if let Some(speed) = speed {
        items.push(speed_measurement_item(ticket, speed, limit, over));
        if is_super_speeder(speed, limit) {
            items.push(StrategyItem::new(
                "Watch for super speeder fees",
                format!(
                    "At {speed} mph this citation may trigger Georgia's super speeder fee, a $200 \
                     state fee charged on top of the local fine. Negotiating the speed below the \
                     threshold avoids it."
                ),
            ));
        }
    }

    let statute = ticket.violation.statute.trim();
    if !statute.is_empty() {
        items.push(StrategyItem::new(
            format!("Review the elements of {statute}"),
            "Every element of the cited statute has to be proven. Compare the officer's notes \
             against each element and write down anything missing or inconsistent.",
        ));
    }

    let missing: Vec<&str> = ticket
        .key_fields()
        .iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| *name)
        .collect();
    if !missing.is_empty() {
        items.push(StrategyItem::new(
            "Verify the ticket details",
            format!(
                "Some details could not be read from the ticket ({}). Errors or omissions on the \
                 citation itself can support a motion to dismiss, so check them against the \
                 original.",
                missing.join(", ")
            ),
        ));
    }

    items.push(StrategyItem::new(
        "Request discovery",
        "Ask the prosecutor for the officer's notes, dash or body camera footage and any device \
         records before your hearing.",
    ));
    items.push(StrategyItem::new(
        "Talk to a traffic attorney",
        "An attorney can often negotiate a reduced charge or a non-reporting disposition that \
         keeps points off your record.",
    ));
    items.truncate(MAX_STRATEGY_ITEMS);

    let mut flag_set = BTreeSet::new();
    if over.is_some_and(|over| over >= HIGH_SPEED_DELTA_MPH) {
        flag_set.insert(flags::HIGH_SPEED_OVER_LIMIT);
    }
    if speed.is_some_and(|speed| is_super_speeder(speed, limit)) {
        flag_set.insert(flags::SUPER_SPEEDER_RISK);
    }
    if ticket.court.date.trim().is_empty() {
        flag_set.insert(flags::COURT_DATE_MISSING);
    }
    if statute.is_empty() {
        flag_set.insert(flags::STATUTE_MISSING);
    }
    if confidence < LOW_CONFIDENCE_THRESHOLD {
        flag_set.insert(flags::LOW_EXTRACTION_CONFIDENCE);
    }

    DefenseStrategy {
        summary: local_summary(ticket, speed, limit),
        strategies: items,
        flags: flag_set.into_iter().map(str::to_string).collect(),
        confidence,
        source: StrategySource::Local,
    }
}

fn court_date_item(ticket: &ParsedTicket) -> StrategyItem {
    let date = ticket.court.date.trim();
    if date.is_empty() {
        return StrategyItem::new(
            "Find your court date",
            "No court date could be read from the ticket. Check the citation or call the court \
             clerk. Missing the date can lead to a license suspension or a bench warrant.",
        );
    }
    let mut when = date.to_string();
    let time = ticket.court.time.trim();
    if !time.is_empty() {
        when.push_str(&format!(" at {time}"));
    }
    let court = ticket.court.name.trim();
    if !court.is_empty() {
        when.push_str(&format!(", {court}"));
    }
    StrategyItem::new(
        "Put your court date on the calendar",
        format!(
            "Your court date appears to be {when}. Missing it can lead to a license suspension or \
             a bench warrant, so add it to your calendar now."
        ),
    )
}

fn speed_measurement_item(
    ticket: &ParsedTicket,
    speed: u16,
    limit: Option<u16>,
    over: Option<u16>,
) -> StrategyItem {
    let alleged = match (limit, over) {
        (Some(limit), Some(over)) => {
            format!("The ticket alleges {speed} mph in a {limit} mph zone ({over} mph over).")
        }
        (Some(limit), None) => format!("The ticket alleges {speed} mph in a {limit} mph zone."),
        (None, _) => {
            let location = ticket.violation.location.trim();
            let place = if location.is_empty() { "the stop location" } else { location };
            format!(
                "The ticket alleges {speed} mph but the posted limit was not readable. Confirm \
                 the posted limit at {place}."
            )
        }
    };
    StrategyItem::new(
        "Challenge the speed measurement",
        format!(
            "{alleged} Request the radar or laser calibration and maintenance logs and the \
             officer's certification. Measurement problems are a common ground for a reduction \
             or dismissal."
        ),
    )
}

fn local_summary(ticket: &ParsedTicket, speed: Option<u16>, limit: Option<u16>) -> String {
    if ticket.populated_key_field_count() == 0 && ticket.violation.description.trim().is_empty() {
        return "Not enough of the ticket could be read to summarize it. Upload a clearer photo \
                or enter the details manually."
            .to_string();
    }
    let description = ticket.violation.description.trim();
    let mut summary = if description.is_empty() {
        "Traffic citation".to_string()
    } else {
        description.to_string()
    };
    if let (Some(speed), Some(limit)) = (speed, limit) {
        if !summary.contains(&format!("{speed}")) {
            summary.push_str(&format!(", {speed} mph in a {limit} mph zone"));
        }
    }
    let statute = ticket.violation.statute.trim();
    if !statute.is_empty() {
        summary.push_str(&format!(" under {statute}"));
    }
    summary.push('.');
    let court_date = ticket.court.date.trim();
    if court_date.is_empty() {
        summary.push_str(" No court date was found on the ticket.");
    } else {
        summary.push_str(&format!(" Court date: {court_date}."));
    }
    summary
}
