#![forbid(unsafe_code)]

use std::fs;
use std::path::Path;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use ticket_defense_contracts::analysis::{TicketAnalysis, TicketAnalysisRequest};
use ticket_defense_contracts::case::TrackingCode;
use ticket_defense_contracts::provider_secrets::ProviderSecretId;
use ticket_defense_engines::analysis::{TicketAnalysisRuntime, DEFAULT_MAX_IMAGE_BYTES};
use ticket_defense_engines::calendar::CourtEvent;
use ticket_defense_engines::case_pdf::render_case_summary_pdf;
use ticket_defense_engines::device_vault::{resolve_provider_secret, SecretStore};
use ticket_defense_engines::gemini::{GeminiClient, GeminiConfig};
use ticket_defense_engines::provider_http::ProxyConfig;
use ticket_defense_engines::vision::{VisionClient, VisionConfig};

use crate::AnalyzeArgs;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp", "pdf"];
const EVENT_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Provider clients wired the same way the HTTP adapter wires them.
pub fn runtime_from_lookup(
    lookup: &dyn Fn(&str) -> Option<String>,
    vault: Option<&dyn SecretStore>,
) -> TicketAnalysisRuntime {
    let get = |key: &str| {
        lookup(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };
    let proxy = ProxyConfig::from_lookup(lookup);

    let mut vision = VisionConfig::new(resolve_provider_secret(
        ProviderSecretId::GoogleVisionApiKey,
        lookup,
        vault,
    ));
    if let Some(endpoint) = get("GOOGLE_VISION_ENDPOINT") {
        vision.endpoint = endpoint;
    }
    vision.proxy = proxy.clone();

    let mut gemini = GeminiConfig::new(resolve_provider_secret(
        ProviderSecretId::GeminiApiKey,
        lookup,
        vault,
    ));
    if let Some(model) = get("GEMINI_MODEL") {
        gemini.model = model;
    }
    if let Some(api_base) = get("GEMINI_API_BASE") {
        gemini.api_base = api_base;
    }
    gemini.proxy = proxy;

    TicketAnalysisRuntime::new(
        VisionClient::new(vision),
        GeminiClient::new(gemini),
        DEFAULT_MAX_IMAGE_BYTES,
    )
}

pub fn is_image_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
}

pub fn build_request(args: &AnalyzeArgs) -> Result<TicketAnalysisRequest, String> {
    let mut request = TicketAnalysisRequest {
        use_ai: !args.no_ai,
        use_web_sources: args.web_sources,
        ..TicketAnalysisRequest::default()
    };
    let shown = args.input.display();
    if args.image || is_image_path(&args.input) {
        let bytes = fs::read(&args.input).map_err(|e| format!("failed to read {shown}: {e}"))?;
        request.image_base64 = Some(BASE64.encode(bytes));
    } else {
        let text = fs::read_to_string(&args.input)
            .map_err(|e| format!("failed to read {shown}: {e}"))?;
        request.raw_text = Some(text);
    }
    Ok(request)
}

/// Analyzes the ticket, writes any requested artifacts, and returns the
/// report printed by the CLI.
pub fn run_analyze(
    args: &AnalyzeArgs,
    runtime: &TicketAnalysisRuntime,
    now: DateTime<Utc>,
) -> Result<Value, String> {
    let tracking_code = match args.tracking_code.as_deref() {
        Some(raw) => Some(
            TrackingCode::parse_user_input(raw)
                .ok_or_else(|| format!("invalid tracking code '{raw}'"))?,
        ),
        None => None,
    };

    let request = build_request(args)?;
    let analysis = runtime.analyze(&request).map_err(|e| e.to_string())?;
    let event = CourtEvent::from_ticket(&analysis.parsed);

    let mut artifacts = json!({ "pdf": null, "ics": null });
    if let Some(path) = &args.pdf {
        write_pdf(path, &analysis, tracking_code.as_ref())?;
        artifacts["pdf"] = json!(path.display().to_string());
    }
    if let Some(path) = &args.ics {
        match &event {
            Some(event) => {
                fs::write(path, event.to_ics(now))
                    .map_err(|e| format!("failed to write {}: {e}", path.display()))?;
                tracing::info!(path = %path.display(), "court date calendar written");
                artifacts["ics"] = json!(path.display().to_string());
            }
            None => tracing::warn!("ticket has no court date; calendar file skipped"),
        }
    }

    Ok(json!({
        "analysis": analysis,
        "calendar": event.as_ref().map(|event| json!({
            "title": event.title,
            "start": event.start.format(EVENT_TIME_FORMAT).to_string(),
            "end": event.end.format(EVENT_TIME_FORMAT).to_string(),
            "location": event.location,
            "googleCalendarUrl": event.google_calendar_url(),
        })),
        "artifacts": artifacts,
    }))
}

fn write_pdf(
    path: &Path,
    analysis: &TicketAnalysis,
    tracking_code: Option<&TrackingCode>,
) -> Result<(), String> {
    let bytes = render_case_summary_pdf(
        &analysis.parsed,
        &analysis.ai,
        tracking_code.map(TrackingCode::as_str),
    )
    .map_err(|e| e.to_string())?;
    let len = bytes.len();
    fs::write(path, bytes).map_err(|e| format!("failed to write {}: {e}", path.display()))?;
    tracing::info!(path = %path.display(), bytes = len, "case summary pdf written");
    Ok(())
}
