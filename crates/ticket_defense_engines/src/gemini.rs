#![forbid(unsafe_code)]

use std::time::Duration;

use serde::Deserialize;
use serde_json::{json, Value};
use ticket_defense_contracts::analysis::AiSourceRef;
use ticket_defense_contracts::strategy::{StrategyItem, MAX_STRATEGY_ITEMS};
use ticket_defense_contracts::ticket::ParsedTicket;

use crate::provider_http::{build_http_agent, post_json, ProviderCallError, ProxyConfig, DEFAULT_USER_AGENT};

pub const PROVIDER: &str = "gemini";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const GEMINI_TIMEOUT: Duration = Duration::from_secs(25);

const PROMPT_RAW_TEXT_CHARS: usize = 4_000;
const MAX_TITLE_CHARS: usize = 200;
const MAX_DETAIL_CHARS: usize = 2_000;
const MAX_FLAG_CHARS: usize = 48;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeminiConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub api_base: String,
    pub timeout: Duration,
    pub user_agent: String,
    pub proxy: ProxyConfig,
    /// Canned `generateContent` response used instead of the network.
    pub fixture_json: Option<String>,
}

impl GeminiConfig {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            api_key,
            model: DEFAULT_GEMINI_MODEL.to_string(),
            api_base: DEFAULT_GEMINI_API_BASE.to_string(),
            timeout: GEMINI_TIMEOUT,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            proxy: ProxyConfig::off(),
            fixture_json: None,
        }
    }

    pub fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.api_base.trim_end_matches('/'),
            self.model
        )
    }
}

/// Strategy as proposed by the model, already sanitized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeminiStrategy {
    pub summary: String,
    pub strategies: Vec<StrategyItem>,
    pub flags: Vec<String>,
    pub sources: Vec<AiSourceRef>,
}

#[derive(Debug, Clone)]
pub struct GeminiClient {
    config: GeminiConfig,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig) -> Self {
        Self { config }
    }

    pub fn is_configured(&self) -> bool {
        self.config.api_key.is_some()
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    pub fn generate_strategy(
        &self,
        ticket: &ParsedTicket,
        use_web_sources: bool,
    ) -> Result<GeminiStrategy, ProviderCallError> {
        let Some(api_key) = self.config.api_key.as_deref() else {
            return Err(ProviderCallError::new(PROVIDER, "missing_api_key", None));
        };
        let body = match self.config.fixture_json.as_deref() {
            Some(fixture) => serde_json::from_str(fixture)
                .map_err(|_| ProviderCallError::new(PROVIDER, "json_parse", None))?,
            None => {
                let agent = build_http_agent(
                    PROVIDER,
                    self.config.timeout,
                    &self.config.user_agent,
                    &self.config.proxy,
                )?;
                let request = generate_content_request(&build_prompt(ticket), use_web_sources);
                post_json(
                    &agent,
                    PROVIDER,
                    &self.config.endpoint(),
                    &[("x-goog-api-key", api_key)],
                    &request,
                )?
            }
        };
        parse_generate_content(&body)
    }
}

pub fn build_prompt(ticket: &ParsedTicket) -> String {
    let mut fields = ticket.clone();
    fields.raw_text.clear();
    let fields_json = serde_json::to_string_pretty(&fields).unwrap_or_default();
    let raw_excerpt: String = ticket.raw_text.chars().take(PROMPT_RAW_TEXT_CHARS).collect();
    format!(
        "You help drivers understand their options after receiving a traffic ticket. \
You are not a lawyer and must not promise outcomes.\n\n\
Extracted ticket fields (empty strings are unknown):\n{fields_json}\n\n\
OCR text:\n\"\"\"\n{raw_excerpt}\n\"\"\"\n\n\
Reply with only a JSON object of the form \
{{\"summary\": string, \"strategies\": [{{\"title\": string, \"detail\": string}}], \"flags\": [string]}}. \
Give at most {MAX_STRATEGY_ITEMS} strategies, most important first. \
Flags are short UPPER_SNAKE_CASE risk codes."
    )
}

pub fn generate_content_request(prompt: &str, use_web_sources: bool) -> Value {
    let mut request = json!({
        "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
        "generationConfig": { "temperature": 0.2 }
    });
    if use_web_sources {
        // Grounding does not combine with a JSON response mime type.
        request["tools"] = json!([{ "google_search": {} }]);
    } else {
        request["generationConfig"]["responseMimeType"] = json!("application/json");
    }
    request
}

#[derive(Debug, Deserialize)]
struct RawStrategy {
    #[serde(default)]
    summary: String,
    #[serde(default)]
    strategies: Vec<RawItem>,
    #[serde(default)]
    flags: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawItem {
    #[serde(default)]
    title: String,
    #[serde(default, alias = "description")]
    detail: String,
}

pub fn parse_generate_content(body: &Value) -> Result<GeminiStrategy, ProviderCallError> {
    let Some(candidate) = body.pointer("/candidates/0") else {
        return Err(ProviderCallError::new(PROVIDER, "no_candidates", None));
    };
    let text: String = candidate
        .pointer("/content/parts")
        .and_then(Value::as_array)
        .map(|parts| {
            parts
                .iter()
                .filter_map(|part| part.get("text").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default();
    let json_text = extract_json_object(&text)
        .ok_or_else(|| ProviderCallError::new(PROVIDER, "json_parse", None))?;
    let raw: RawStrategy = serde_json::from_str(json_text)
        .map_err(|_| ProviderCallError::new(PROVIDER, "json_parse", None))?;

    let strategies: Vec<StrategyItem> = raw
        .strategies
        .into_iter()
        .filter_map(|item| {
            let title = truncate_chars(item.title.trim(), MAX_TITLE_CHARS);
            if title.is_empty() {
                return None;
            }
            Some(StrategyItem::new(
                title,
                truncate_chars(item.detail.trim(), MAX_DETAIL_CHARS),
            ))
        })
        .take(MAX_STRATEGY_ITEMS)
        .collect();
    let summary = raw.summary.trim().to_string();
    if summary.is_empty() && strategies.is_empty() {
        return Err(ProviderCallError::new(PROVIDER, "empty_response", None));
    }
    let mut flags: Vec<String> = raw.flags.iter().filter_map(|f| normalize_flag(f)).collect();
    flags.sort();
    flags.dedup();

    Ok(GeminiStrategy {
        summary,
        strategies,
        flags,
        sources: grounding_sources(candidate),
    })
}

/// Grounding chunks with a usable web URI, de-duplicated by URL.
fn grounding_sources(candidate: &Value) -> Vec<AiSourceRef> {
    let mut out: Vec<AiSourceRef> = Vec::new();
    let chunks = candidate
        .pointer("/groundingMetadata/groundingChunks")
        .and_then(Value::as_array);
    for web in chunks.into_iter().flatten().filter_map(|c| c.get("web")) {
        let Some(url) = web.get("uri").and_then(Value::as_str).map(str::trim) else {
            continue;
        };
        if url.is_empty() || out.iter().any(|s| s.url == url) {
            continue;
        }
        let title = web
            .get("title")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(url);
        out.push(AiSourceRef {
            title: title.to_string(),
            url: url.to_string(),
        });
    }
    out
}

/// The model sometimes wraps JSON in markdown fences or prose.
fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

fn normalize_flag(raw: &str) -> Option<String> {
    let flag: String = raw
        .trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
        .collect();
    let flag = flag.trim_matches('_');
    if flag.is_empty() {
        return None;
    }
    Some(truncate_chars(flag, MAX_FLAG_CHARS))
}

fn truncate_chars(value: &str, max: usize) -> String {
    value.chars().take(max).collect()
}
