#![forbid(unsafe_code)]

//! Ticket analysis pipeline: input selection, OCR, parse, local strategy,
//! optional Gemini enrichment and merge.

use std::collections::BTreeSet;
use std::fmt;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use ticket_defense_contracts::analysis::{
    AiMeta, TicketAnalysis, TicketAnalysisRequest, TicketImageInfo,
};
use ticket_defense_contracts::strategy::{DefenseStrategy, StrategySource, MAX_STRATEGY_ITEMS};
use url::Url;

use crate::gemini::{self, GeminiClient, GeminiStrategy};
use crate::provider_http::ProviderCallError;
use crate::strategy::build_local_strategy;
use crate::ticket_parse::parse_ticket_text;
use crate::vision::{OcrImage, VisionClient};

pub const DEFAULT_MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;
pub const MAX_RAW_TEXT_BYTES: usize = 50_000;
pub const MIN_OCR_ALNUM_CHARS: usize = 12;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalysisError {
    MissingInput,
    InvalidInput(&'static str),
    PayloadTooLarge { what: &'static str, limit: usize },
    UnreadableText,
    OcrUnavailable(ProviderCallError),
}

impl fmt::Display for AnalysisError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingInput => f.write_str("one of rawText, imageBase64 or imageUrl is required"),
            Self::InvalidInput(reason) => f.write_str(reason),
            Self::PayloadTooLarge { what, limit } => {
                write!(f, "{what} exceeds the {limit} byte limit")
            }
            Self::UnreadableText => {
                f.write_str("no readable text was found on the ticket image; try a sharper photo")
            }
            Self::OcrUnavailable(_) => f.write_str("text recognition is unavailable"),
        }
    }
}

impl std::error::Error for AnalysisError {}

#[derive(Debug, Clone, PartialEq, Eq)]
enum AnalysisInput {
    Text(String),
    Inline { mime_type: String, bytes: Vec<u8> },
    Url(String),
}

#[derive(Debug, Clone)]
pub struct TicketAnalysisRuntime {
    vision: VisionClient,
    gemini: GeminiClient,
    max_image_bytes: usize,
}

impl TicketAnalysisRuntime {
    pub fn new(vision: VisionClient, gemini: GeminiClient, max_image_bytes: usize) -> Self {
        Self {
            vision,
            gemini,
            max_image_bytes,
        }
    }

    pub fn ocr_configured(&self) -> bool {
        self.vision.is_configured()
    }

    pub fn ai_configured(&self) -> bool {
        self.gemini.is_configured()
    }

    pub fn analyze(&self, req: &TicketAnalysisRequest) -> Result<TicketAnalysis, AnalysisError> {
        let input = select_input(req, self.max_image_bytes)?;
        let (text, ticket_image) = match input {
            AnalysisInput::Text(text) => (text, TicketImageInfo::None),
            AnalysisInput::Inline { mime_type, bytes } => {
                let text = self.ocr(OcrImage::Inline(&bytes))?;
                let info = TicketImageInfo::Inline {
                    mime_type,
                    byte_len: bytes.len(),
                };
                (text, info)
            }
            AnalysisInput::Url(url) => {
                let text = self.ocr(OcrImage::Url(&url))?;
                (text, TicketImageInfo::Url { url })
            }
        };

        let parsed = parse_ticket_text(&text);
        let local = build_local_strategy(&parsed);
        let mut ai_meta = AiMeta {
            requested: req.use_ai,
            used: false,
            provider: gemini::PROVIDER.to_string(),
            model: self.gemini.model().to_string(),
            web_sources: req.use_web_sources,
            fallback_reason: None,
            sources: Vec::new(),
        };

        let ai = if req.use_ai {
            match self.gemini.generate_strategy(&parsed, req.use_web_sources) {
                Ok(remote) => {
                    ai_meta.used = true;
                    ai_meta.sources = remote.sources.clone();
                    merge_strategies(&local, &remote)
                }
                Err(err) => {
                    tracing::warn!(error = %err, "ai strategy unavailable, using local strategy");
                    ai_meta.fallback_reason = Some(err.safe_detail());
                    local
                }
            }
        } else {
            local
        };

        tracing::debug!(
            confidence = ai.confidence,
            items = ai.strategies.len(),
            ai_used = ai_meta.used,
            "ticket analyzed"
        );
        Ok(TicketAnalysis {
            parsed,
            ai,
            ai_meta,
            ticket_image,
        })
    }

    fn ocr(&self, image: OcrImage<'_>) -> Result<String, AnalysisError> {
        let text = self.vision.detect_text(image).map_err(|err| {
            tracing::error!(error = %err, "ocr failed");
            AnalysisError::OcrUnavailable(err)
        })?;
        if alphanumeric_count(&text) < MIN_OCR_ALNUM_CHARS {
            return Err(AnalysisError::UnreadableText);
        }
        Ok(text)
    }
}

fn select_input(
    req: &TicketAnalysisRequest,
    max_image_bytes: usize,
) -> Result<AnalysisInput, AnalysisError> {
    if let Some(text) = non_blank(req.raw_text.as_deref()) {
        if text.len() > MAX_RAW_TEXT_BYTES {
            return Err(AnalysisError::PayloadTooLarge {
                what: "rawText",
                limit: MAX_RAW_TEXT_BYTES,
            });
        }
        return Ok(AnalysisInput::Text(text.to_string()));
    }
    if let Some(encoded) = non_blank(req.image_base64.as_deref()) {
        let (mime_type, bytes) = decode_image_base64(encoded, max_image_bytes)?;
        return Ok(AnalysisInput::Inline { mime_type, bytes });
    }
    if let Some(raw_url) = non_blank(req.image_url.as_deref()) {
        return Ok(AnalysisInput::Url(validate_image_url(raw_url)?));
    }
    Err(AnalysisError::MissingInput)
}

/// Accepts bare base64 or a `data:<mime>;base64,` URL. The mime type falls
/// back to sniffing the decoded bytes.
pub fn decode_image_base64(
    raw: &str,
    max_bytes: usize,
) -> Result<(String, Vec<u8>), AnalysisError> {
    let trimmed = raw.trim();
    let (declared_mime, payload) = match trimmed.strip_prefix("data:") {
        Some(rest) => {
            let (header, data) = rest
                .split_once(',')
                .ok_or(AnalysisError::InvalidInput("imageBase64 data URL has no payload"))?;
            let Some(mime) = header.strip_suffix(";base64") else {
                return Err(AnalysisError::InvalidInput("imageBase64 data URL must be base64"));
            };
            (Some(mime.trim().to_ascii_lowercase()).filter(|m| !m.is_empty()), data)
        }
        None => (None, trimmed),
    };
    let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.len() / 4 * 3 > max_bytes + 3 {
        return Err(AnalysisError::PayloadTooLarge {
            what: "image",
            limit: max_bytes,
        });
    }
    let bytes = BASE64
        .decode(compact.as_bytes())
        .map_err(|_| AnalysisError::InvalidInput("imageBase64 is not valid base64"))?;
    if bytes.is_empty() {
        return Err(AnalysisError::InvalidInput("imageBase64 is empty"));
    }
    if bytes.len() > max_bytes {
        return Err(AnalysisError::PayloadTooLarge {
            what: "image",
            limit: max_bytes,
        });
    }
    let mime = declared_mime.unwrap_or_else(|| sniff_image_mime(&bytes).to_string());
    Ok((mime, bytes))
}

pub fn validate_image_url(raw: &str) -> Result<String, AnalysisError> {
    let url = Url::parse(raw.trim())
        .map_err(|_| AnalysisError::InvalidInput("imageUrl must be an http(s) URL"))?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(AnalysisError::InvalidInput("imageUrl must be an http(s) URL"));
    }
    Ok(url.to_string())
}

fn sniff_image_mime(bytes: &[u8]) -> &'static str {
    match bytes {
        [0xFF, 0xD8, 0xFF, ..] => "image/jpeg",
        [0x89, b'P', b'N', b'G', ..] => "image/png",
        [b'G', b'I', b'F', b'8', ..] => "image/gif",
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => "image/webp",
        [b'%', b'P', b'D', b'F', ..] => "application/pdf",
        _ => "application/octet-stream",
    }
}

/// AI summary when present; AI items first, then local items with unseen
/// titles; sorted flag union; the local extraction confidence.
pub fn merge_strategies(local: &DefenseStrategy, ai: &GeminiStrategy) -> DefenseStrategy {
    let summary = if ai.summary.trim().is_empty() {
        local.summary.clone()
    } else {
        ai.summary.trim().to_string()
    };

    let mut seen = BTreeSet::new();
    let mut strategies = Vec::with_capacity(MAX_STRATEGY_ITEMS);
    for item in ai.strategies.iter().chain(local.strategies.iter()) {
        if strategies.len() == MAX_STRATEGY_ITEMS {
            break;
        }
        if seen.insert(item.title.trim().to_lowercase()) {
            strategies.push(item.clone());
        }
    }

    let flags: BTreeSet<&str> = local
        .flags
        .iter()
        .chain(ai.flags.iter())
        .map(String::as_str)
        .collect();

    DefenseStrategy {
        summary,
        strategies,
        flags: flags.into_iter().map(str::to_string).collect(),
        confidence: local.confidence,
        source: StrategySource::Merged,
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

fn alphanumeric_count(text: &str) -> usize {
    text.chars().filter(|c| c.is_alphanumeric()).count()
}
