#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

use crate::strategy::DefenseStrategy;
use crate::ticket::ParsedTicket;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AiSourceRef {
    pub title: String,
    pub url: String,
}

/// How the `ai` block of an analysis was produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiMeta {
    pub requested: bool,
    pub used: bool,
    pub provider: String,
    pub model: String,
    pub web_sources: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<String>,
    pub sources: Vec<AiSourceRef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TicketImageInfo {
    Url {
        url: String,
    },
    #[serde(rename_all = "camelCase")]
    Inline {
        mime_type: String,
        byte_len: usize,
    },
    None,
}

fn default_true() -> bool {
    true
}

/// Body of `POST /api/ticket-analysis`. Exactly one input is used, in the
/// order `rawText`, `imageBase64`, `imageUrl`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketAnalysisRequest {
    #[serde(default)]
    pub raw_text: Option<String>,
    #[serde(default)]
    pub image_base64: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default = "default_true")]
    pub use_ai: bool,
    #[serde(default)]
    pub use_web_sources: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketAnalysis {
    pub parsed: ParsedTicket,
    pub ai: DefenseStrategy,
    pub ai_meta: AiMeta,
    pub ticket_image: TicketImageInfo,
}
