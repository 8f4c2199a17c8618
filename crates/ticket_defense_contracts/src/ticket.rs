#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

/// Number of fields that drive the extraction confidence score.
pub const KEY_FIELD_COUNT: usize = 5;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverFields {
    pub name: String,
    pub address: String,
    pub license_number: String,
    pub date_of_birth: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VehicleFields {
    pub plate: String,
    pub plate_state: String,
    pub make: String,
    pub model: String,
    pub year: String,
    pub color: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViolationFields {
    pub statute: String,
    pub description: String,
    pub speed: String,
    pub speed_limit: String,
    pub date: String,
    pub time: String,
    pub location: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourtFields {
    pub name: String,
    pub date: String,
    pub time: String,
    pub address: String,
}

/// Best-effort extraction result. Every field is an empty string when the
/// text did not yield a value; empty means unknown, never an error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedTicket {
    pub citation_number: String,
    pub driver: DriverFields,
    pub vehicle: VehicleFields,
    pub violation: ViolationFields,
    pub court: CourtFields,
    pub raw_text: String,
}

impl ParsedTicket {
    /// The five fields scored by the strategy builder, in a fixed order.
    pub fn key_fields(&self) -> [(&'static str, &str); KEY_FIELD_COUNT] {
        [
            ("driver.name", self.driver.name.as_str()),
            ("driver.address", self.driver.address.as_str()),
            ("violation.statute", self.violation.statute.as_str()),
            ("violation.speed", self.violation.speed.as_str()),
            ("court.date", self.court.date.as_str()),
        ]
    }

    pub fn populated_key_field_count(&self) -> usize {
        self.key_fields()
            .iter()
            .filter(|(_, value)| !value.trim().is_empty())
            .count()
    }

    pub fn speed_mph(&self) -> Option<u16> {
        parse_mph(&self.violation.speed)
    }

    pub fn speed_limit_mph(&self) -> Option<u16> {
        parse_mph(&self.violation.speed_limit)
    }
}

fn parse_mph(raw: &str) -> Option<u16> {
    let digits: String = raw.chars().take_while(char::is_ascii_digit).collect();
    digits.parse::<u16>().ok().filter(|v| *v > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn at_ticket_01_wire_shape_is_camel_case_and_nested() {
        let mut parsed = ParsedTicket::default();
        parsed.violation.speed_limit = "55".to_string();
        parsed.driver.license_number = "123456789".to_string();
        let json = serde_json::to_value(&parsed).unwrap();
        assert_eq!(json["violation"]["speedLimit"], "55");
        assert_eq!(json["driver"]["licenseNumber"], "123456789");
        assert_eq!(json["court"]["date"], "");
        assert_eq!(json["citationNumber"], "");
    }

    #[test]
    fn at_ticket_02_populated_count_ignores_blank_values() {
        let mut parsed = ParsedTicket::default();
        assert_eq!(parsed.populated_key_field_count(), 0);
        parsed.driver.name = "JOHN DOE".to_string();
        parsed.court.date = "   ".to_string();
        parsed.violation.speed = "78".to_string();
        assert_eq!(parsed.populated_key_field_count(), 2);
    }

    #[test]
    fn at_ticket_03_speed_parsing_tolerates_units() {
        let mut parsed = ParsedTicket::default();
        parsed.violation.speed = "78 mph".to_string();
        parsed.violation.speed_limit = "0".to_string();
        assert_eq!(parsed.speed_mph(), Some(78));
        assert_eq!(parsed.speed_limit_mph(), None);
    }
}
