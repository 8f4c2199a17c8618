#![forbid(unsafe_code)]

use std::sync::Arc;

use serde_json::Value;
use ticket_defense_contracts::analysis::{TicketAnalysis, TicketAnalysisRequest};
use ticket_defense_contracts::case::{
    looks_like_email, CaseDraft, CasePublicView, TenantId, TrackingCode, TrackingReceipt,
    CASE_STAGE_INTAKE, CASE_STATUS_NEW, VERIFIER_TYPE_PHONE_LAST4,
};
use ticket_defense_contracts::Validate;
use ticket_defense_engines::analysis::TicketAnalysisRuntime;
use ticket_defense_engines::gemini::GeminiClient;
use ticket_defense_engines::provider_http::{build_http_agent, DEFAULT_USER_AGENT};
use ticket_defense_engines::tracking::{
    hash_verifier, mint_with_unique_tracking_code, normalize_last4, verifier_hint,
    RandomTrackingCodes, TrackingCodeSource,
};
use ticket_defense_engines::vision::VisionClient;
use ticket_defense_storage::cases::{CaseStore, StorageError};
use ticket_defense_storage::repo::CaseRepo;
use ticket_defense_storage::supabase::{SupabaseCaseRepo, SUPABASE_TIMEOUT};

pub mod config;
pub mod error;
pub mod logging;
pub mod routes;

use config::AdapterConfig;
use error::ApiError;

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCaseRequest {
    #[serde(default)]
    pub tenant_id: Option<String>,
    #[serde(default)]
    pub ticket_id: Option<String>,
    #[serde(default)]
    pub firm_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub contact_name: Option<String>,
    #[serde(default)]
    pub contact_email: Option<String>,
    #[serde(default)]
    pub contact_phone: Option<String>,
    #[serde(default)]
    pub locale: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub next_steps: Option<String>,
    #[serde(default)]
    pub extra: Option<Value>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CreateCaseResponse {
    pub case: CasePublicView,
    pub tracking: TrackingReceipt,
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackCaseRequest {
    #[serde(default)]
    pub tracking_code: Option<String>,
    #[serde(default)]
    pub phone_last4: Option<String>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TrackCaseResponse {
    pub case: CasePublicView,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdapterHealthResponse {
    pub status: String,
    pub store: String,
    pub ocr_configured: bool,
    pub ai_configured: bool,
    pub verifier_configured: bool,
}

/// Request-scoped operations behind the HTTP routes. Every method blocks on
/// the store or a provider; routes call them from a blocking task.
pub struct AdapterRuntime {
    repo: Arc<dyn CaseRepo>,
    tracking_codes: Arc<dyn TrackingCodeSource>,
    analysis: TicketAnalysisRuntime,
    verifier_pepper: Option<String>,
    default_tenant_id: Option<String>,
    max_image_bytes: usize,
}

impl AdapterRuntime {
    pub fn new(repo: Arc<dyn CaseRepo>, analysis: TicketAnalysisRuntime, max_image_bytes: usize) -> Self {
        Self {
            repo,
            tracking_codes: Arc::new(RandomTrackingCodes),
            analysis,
            verifier_pepper: None,
            default_tenant_id: None,
            max_image_bytes,
        }
    }

    pub fn with_verifier_pepper(mut self, pepper: impl Into<String>) -> Self {
        self.verifier_pepper = Some(pepper.into()).filter(|p: &String| !p.trim().is_empty());
        self
    }

    pub fn with_default_tenant_id(mut self, tenant_id: impl Into<String>) -> Self {
        self.default_tenant_id = non_blank(Some(tenant_id.into()));
        self
    }

    pub fn with_tracking_codes(mut self, codes: Arc<dyn TrackingCodeSource>) -> Self {
        self.tracking_codes = codes;
        self
    }

    pub fn from_config(config: &AdapterConfig) -> Result<Self, String> {
        let repo: Arc<dyn CaseRepo> = match config.supabase.clone() {
            Some(supabase) => {
                let agent = build_http_agent(
                    "supabase",
                    SUPABASE_TIMEOUT,
                    DEFAULT_USER_AGENT,
                    &config.proxy,
                )
                .map_err(|err| err.safe_detail())?;
                Arc::new(SupabaseCaseRepo::new(supabase, agent).map_err(|err| err.to_string())?)
            }
            None => {
                tracing::warn!("SUPABASE_URL is not set; cases are kept in memory and lost on restart");
                Arc::new(CaseStore::new_in_memory())
            }
        };
        if config.tracking_verifier_pepper.is_none() {
            tracing::warn!("tracking_verifier_pepper is not configured; case routes will return 500");
        }
        let analysis = TicketAnalysisRuntime::new(
            VisionClient::new(config.vision.clone()),
            GeminiClient::new(config.gemini.clone()),
            config.max_image_bytes,
        );
        let mut runtime = Self::new(repo, analysis, config.max_image_bytes);
        runtime.verifier_pepper = config.tracking_verifier_pepper.clone();
        runtime.default_tenant_id = config.default_tenant_id.clone();
        Ok(runtime)
    }

    pub fn max_image_bytes(&self) -> usize {
        self.max_image_bytes
    }

    pub fn health_report(&self) -> AdapterHealthResponse {
        AdapterHealthResponse {
            status: "ok".to_string(),
            store: self.repo.backend_name().to_string(),
            ocr_configured: self.analysis.ocr_configured(),
            ai_configured: self.analysis.ai_configured(),
            verifier_configured: self.verifier_pepper.is_some(),
        }
    }

    fn pepper(&self) -> Result<&str, ApiError> {
        self.verifier_pepper
            .as_deref()
            .ok_or_else(|| ApiError::internal("tracking verifier is not configured"))
    }

    pub fn create_case(&self, request: CreateCaseRequest) -> Result<CreateCaseResponse, ApiError> {
        let phone = non_blank(request.contact_phone)
            .ok_or_else(|| ApiError::bad_request("contactPhone is required"))?;
        let last4 = normalize_last4(&phone);
        if last4.is_empty() {
            return Err(ApiError::bad_request(
                "contactPhone must contain at least 4 digits",
            ));
        }
        let tenant_raw = non_blank(request.tenant_id)
            .or_else(|| self.default_tenant_id.clone())
            .ok_or_else(|| ApiError::bad_request("tenantId is required"))?;
        let tenant_id = TenantId::new(tenant_raw)?;
        let contact_email = non_blank(request.contact_email);
        if contact_email.as_deref().is_some_and(|e| !looks_like_email(e)) {
            return Err(ApiError::bad_request("contactEmail is not a valid email address"));
        }
        let pepper = self.pepper()?;

        let draft = CaseDraft {
            tenant_id,
            ticket_id: non_blank(request.ticket_id),
            firm_id: non_blank(request.firm_id),
            user_id: non_blank(request.user_id),
            contact_name: non_blank(request.contact_name),
            contact_email,
            contact_phone: phone,
            locale: non_blank(request.locale),
            language: non_blank(request.language),
            summary: non_blank(request.summary),
            next_steps: non_blank(request.next_steps),
            extra: request.extra.filter(|v| !v.is_null()),
            status: CASE_STATUS_NEW.to_string(),
            status_stage: CASE_STAGE_INTAKE.to_string(),
            tracking_code: self.tracking_codes.next_code(),
            tracking_verifier_type: VERIFIER_TYPE_PHONE_LAST4.to_string(),
            tracking_verifier_hash: hash_verifier(&last4, pepper),
            tracking_verifier_hint: verifier_hint(&last4),
        };
        draft.validate()?;

        let repo = self.repo.as_ref();
        let minted = mint_with_unique_tracking_code(
            &draft,
            self.tracking_codes.as_ref(),
            |candidate| repo.insert_case_row(candidate),
            StorageError::is_unique_violation,
        )?;
        let row = minted.row;
        tracing::info!(
            case_id = %row.id,
            tenant_id = row.tenant_id.as_str(),
            attempts = minted.attempts,
            store = repo.backend_name(),
            "case created"
        );

        if let Some(ticket_id) = row.ticket_id.as_deref() {
            if let Err(err) = repo.link_ticket_to_case(ticket_id, &row.id) {
                tracing::warn!(
                    case_id = %row.id,
                    ticket_id,
                    error = %err,
                    "could not link ticket to case; case kept"
                );
            }
        }

        Ok(CreateCaseResponse {
            tracking: TrackingReceipt {
                tracking_code: row.tracking_code.as_str().to_string(),
                verifier_type: row.tracking_verifier_type.clone(),
                verifier_hint: row.tracking_verifier_hint.clone(),
            },
            case: row.public_view(),
        })
    }

    pub fn track_case(&self, request: TrackCaseRequest) -> Result<TrackCaseResponse, ApiError> {
        let raw_code = non_blank(request.tracking_code)
            .ok_or_else(|| ApiError::bad_request("trackingCode is required"))?;
        let raw_last4 = non_blank(request.phone_last4)
            .ok_or_else(|| ApiError::bad_request("phoneLast4 is required"))?;
        let last4 = normalize_last4(&raw_last4);
        if last4.is_empty() {
            return Err(ApiError::bad_request(
                "phoneLast4 must contain at least 4 digits",
            ));
        }
        let pepper = self.pepper()?;
        let not_found = || ApiError::NotFound("case not found".to_string());
        let Some(tracking_code) = TrackingCode::parse_user_input(&raw_code) else {
            return Err(not_found());
        };
        let hash = hash_verifier(&last4, pepper);
        match self.repo.find_case_by_tracking(&tracking_code, &hash)? {
            Some(row) => {
                tracing::debug!(case_id = %row.id, "case tracked");
                Ok(TrackCaseResponse {
                    case: row.public_view(),
                })
            }
            None => Err(not_found()),
        }
    }

    pub fn analyze_ticket(&self, request: &TicketAnalysisRequest) -> Result<TicketAnalysis, ApiError> {
        Ok(self.analysis.analyze(request)?)
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use ticket_defense_engines::analysis::DEFAULT_MAX_IMAGE_BYTES;
    use ticket_defense_engines::gemini::GeminiConfig;
    use ticket_defense_engines::vision::VisionConfig;

    /// Hands out codes in order and repeats the last one; counts every draw.
    struct ScriptedCodes {
        codes: Mutex<Vec<&'static str>>,
        draws: AtomicUsize,
    }

    impl TrackingCodeSource for ScriptedCodes {
        fn next_code(&self) -> TrackingCode {
            self.draws.fetch_add(1, Ordering::SeqCst);
            let mut codes = self.codes.lock().unwrap();
            let next = if codes.len() > 1 { codes.remove(0) } else { codes[0] };
            TrackingCode::new(next).unwrap()
        }
    }

    fn scripted(codes: &[&'static str]) -> Arc<ScriptedCodes> {
        Arc::new(ScriptedCodes {
            codes: Mutex::new(codes.to_vec()),
            draws: AtomicUsize::new(0),
        })
    }

    fn runtime_with(store: Arc<CaseStore>) -> AdapterRuntime {
        let analysis = TicketAnalysisRuntime::new(
            VisionClient::new(VisionConfig::new(None)),
            GeminiClient::new(GeminiConfig::new(None)),
            DEFAULT_MAX_IMAGE_BYTES,
        );
        AdapterRuntime::new(store, analysis, DEFAULT_MAX_IMAGE_BYTES).with_verifier_pepper("pepper")
    }

    fn create_request(phone: &str) -> CreateCaseRequest {
        CreateCaseRequest {
            tenant_id: Some("t1".to_string()),
            contact_phone: Some(phone.to_string()),
            ..CreateCaseRequest::default()
        }
    }

    #[test]
    fn at_adapter_01_create_then_track() {
        let rt = runtime_with(Arc::new(CaseStore::new_in_memory()));
        let created = rt.create_case(create_request("404-555-0199")).unwrap();
        assert_eq!(created.tracking.tracking_code.len(), 8);
        assert_eq!(created.tracking.verifier_type, "phone_last4");
        assert_eq!(created.tracking.verifier_hint, "••••0199");

        let tracked = rt
            .track_case(TrackCaseRequest {
                tracking_code: Some(created.tracking.tracking_code.to_ascii_lowercase()),
                phone_last4: Some("0199".to_string()),
            })
            .unwrap();
        assert_eq!(tracked.case, created.case);

        let err = rt
            .track_case(TrackCaseRequest {
                tracking_code: Some(created.tracking.tracking_code.clone()),
                phone_last4: Some("0198".to_string()),
            })
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[test]
    fn at_adapter_02_collision_retries_with_fresh_code() {
        let store = Arc::new(CaseStore::new_in_memory());
        let codes = scripted(&["AAAA2222", "AAAA2222", "BBBB3333"]);
        let rt = runtime_with(store.clone()).with_tracking_codes(codes.clone());
        let first = rt.create_case(create_request("4045550199")).unwrap();
        assert_eq!(first.tracking.tracking_code, "AAAA2222");
        let second = rt.create_case(create_request("4045550100")).unwrap();
        assert_eq!(second.tracking.tracking_code, "BBBB3333");
        assert_eq!(store.case_count(), 2);
        // One draw per insert attempt: 1 for the first case, 2 for the second.
        assert_eq!(codes.draws.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn at_adapter_03_exhausted_codes_surface_internal_error() {
        let store = Arc::new(CaseStore::new_in_memory());
        let codes = scripted(&["CCCC4444"]);
        let rt = runtime_with(store.clone()).with_tracking_codes(codes.clone());
        rt.create_case(create_request("4045550199")).unwrap();
        let err = rt.create_case(create_request("4045550100")).unwrap_err();
        assert!(matches!(err, ApiError::Internal(_)));
        assert_eq!(store.case_count(), 1);
        assert_eq!(codes.draws.load(Ordering::SeqCst), 6);
    }

    #[test]
    fn at_adapter_04_create_validation() {
        let rt = runtime_with(Arc::new(CaseStore::new_in_memory()));
        for request in [
            CreateCaseRequest::default(),
            create_request("12-3"),
            CreateCaseRequest {
                tenant_id: None,
                ..create_request("4045550199")
            },
            CreateCaseRequest {
                contact_email: Some("nope".to_string()),
                ..create_request("4045550199")
            },
        ] {
            assert!(matches!(
                rt.create_case(request),
                Err(ApiError::BadRequest(_))
            ));
        }

        let rt = rt.with_default_tenant_id("fallback_tenant");
        let created = rt
            .create_case(CreateCaseRequest {
                tenant_id: Some("  ".to_string()),
                ..create_request("4045550199")
            })
            .unwrap();
        assert_eq!(created.case.tenant_id, "fallback_tenant");
    }

    #[test]
    fn at_adapter_05_ticket_link_is_best_effort() {
        let store = Arc::new(CaseStore::new_in_memory());
        let rt = runtime_with(store.clone());
        let created = rt
            .create_case(CreateCaseRequest {
                ticket_id: Some("tk_42".to_string()),
                ..create_request("4045550199")
            })
            .unwrap();
        assert_eq!(store.case_id_for_ticket("tk_42"), Some(created.case.id));
    }

    #[test]
    fn at_adapter_06_missing_pepper_is_internal() {
        let analysis = TicketAnalysisRuntime::new(
            VisionClient::new(VisionConfig::new(None)),
            GeminiClient::new(GeminiConfig::new(None)),
            DEFAULT_MAX_IMAGE_BYTES,
        );
        let rt = AdapterRuntime::new(
            Arc::new(CaseStore::new_in_memory()),
            analysis,
            DEFAULT_MAX_IMAGE_BYTES,
        );
        assert!(!rt.health_report().verifier_configured);
        assert!(matches!(
            rt.create_case(create_request("4045550199")),
            Err(ApiError::Internal(_))
        ));
        assert!(matches!(
            rt.track_case(TrackCaseRequest {
                tracking_code: Some("ABCD2345".to_string()),
                phone_last4: Some("0199".to_string()),
            }),
            Err(ApiError::Internal(_))
        ));
    }
}
