#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

use crate::{ContractViolation, Validate};

pub const MAX_STRATEGY_ITEMS: usize = 10;

pub mod flags {
    pub const HIGH_SPEED_OVER_LIMIT: &str = "HIGH_SPEED_OVER_LIMIT";
    pub const SUPER_SPEEDER_RISK: &str = "SUPER_SPEEDER_RISK";
    pub const COURT_DATE_MISSING: &str = "COURT_DATE_MISSING";
    pub const STATUTE_MISSING: &str = "STATUTE_MISSING";
    pub const LOW_EXTRACTION_CONFIDENCE: &str = "LOW_EXTRACTION_CONFIDENCE";
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyItem {
    pub title: String,
    pub detail: String,
}

impl StrategyItem {
    pub fn new(title: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            detail: detail.into(),
        }
    }
}

impl Validate for StrategyItem {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.title.trim().is_empty() {
            return Err(ContractViolation::InvalidValue {
                field: "strategy_item.title",
                reason: "must not be empty",
            });
        }
        if self.title.len() > 200 {
            return Err(ContractViolation::InvalidValue {
                field: "strategy_item.title",
                reason: "must be <= 200 chars",
            });
        }
        if self.detail.len() > 2_000 {
            return Err(ContractViolation::InvalidValue {
                field: "strategy_item.detail",
                reason: "must be <= 2000 chars",
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategySource {
    Local,
    Ai,
    Merged,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DefenseStrategy {
    pub summary: String,
    pub strategies: Vec<StrategyItem>,
    pub flags: Vec<String>,
    /// Percentage of key ticket fields that were extracted, 0..=100.
    pub confidence: u8,
    pub source: StrategySource,
}

impl Validate for DefenseStrategy {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.confidence > 100 {
            return Err(ContractViolation::InvalidRange {
                field: "defense_strategy.confidence",
                min: 0.0,
                max: 100.0,
                got: f64::from(self.confidence),
            });
        }
        if self.strategies.len() > MAX_STRATEGY_ITEMS {
            return Err(ContractViolation::InvalidValue {
                field: "defense_strategy.strategies",
                reason: "must contain <= 10 items",
            });
        }
        for item in &self.strategies {
            item.validate()?;
        }
        Ok(())
    }
}
