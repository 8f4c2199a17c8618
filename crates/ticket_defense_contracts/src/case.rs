#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::common::validate_id_text;
use crate::{ContractViolation, Validate};

pub const TRACKING_CODE_LEN: usize = 8;
/// Base32-like alphabet: no `0`, `O` or `I`, so codes survive being read aloud.
pub const TRACKING_CODE_ALPHABET: &[u8; 33] = b"ABCDEFGHJKLMNPQRSTUVWXYZ123456789";
pub const MAX_TRACKING_CODE_ATTEMPTS: usize = 5;

pub const VERIFIER_TYPE_PHONE_LAST4: &str = "phone_last4";
pub const CASE_STATUS_NEW: &str = "new";
pub const CASE_STAGE_INTAKE: &str = "intake";

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(String);

impl TenantId {
    pub fn new(id: impl Into<String>) -> Result<Self, ContractViolation> {
        let id = id.into().trim().to_string();
        validate_id_text("tenant_id", &id)?;
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Validate for TenantId {
    fn validate(&self) -> Result<(), ContractViolation> {
        validate_id_text("tenant_id", &self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackingCode(String);

impl TrackingCode {
    pub fn new(code: impl Into<String>) -> Result<Self, ContractViolation> {
        let code = Self(code.into());
        code.validate()?;
        Ok(code)
    }

    /// Accepts user-typed input ("abcd-2345 ") and returns the canonical form,
    /// or `None` when the result is not a well-formed code.
    pub fn parse_user_input(raw: &str) -> Option<Self> {
        let normalized: String = raw
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '-')
            .map(|c| c.to_ascii_uppercase())
            .collect();
        Self::new(normalized).ok()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Validate for TrackingCode {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.0.len() != TRACKING_CODE_LEN {
            return Err(ContractViolation::InvalidValue {
                field: "tracking_code",
                reason: "must be exactly 8 chars",
            });
        }
        if !self.0.bytes().all(|b| TRACKING_CODE_ALPHABET.contains(&b)) {
            return Err(ContractViolation::InvalidValue {
                field: "tracking_code",
                reason: "must only use the tracking code alphabet",
            });
        }
        Ok(())
    }
}

/// Hex-encoded HMAC-SHA256 digest of the phone verifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VerifierHash(String);

impl VerifierHash {
    pub fn new(hex: impl Into<String>) -> Result<Self, ContractViolation> {
        let hash = Self(hex.into());
        hash.validate()?;
        Ok(hash)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Validate for VerifierHash {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.0.len() != 64 || !self.0.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(ContractViolation::InvalidValue {
                field: "tracking_verifier_hash",
                reason: "must be 64 hex chars",
            });
        }
        Ok(())
    }
}

/// Everything the create-case flow writes; the store assigns `id` and timestamps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseDraft {
    pub tenant_id: TenantId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ticket_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub firm_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact_email: Option<String>,
    pub contact_phone: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_steps: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra: Option<Value>,
    pub status: String,
    pub status_stage: String,
    pub tracking_code: TrackingCode,
    pub tracking_verifier_type: String,
    pub tracking_verifier_hash: VerifierHash,
    pub tracking_verifier_hint: String,
}

impl CaseDraft {
    /// Same draft with a freshly minted tracking code, used by the collision retry loop.
    pub fn with_tracking_code(&self, tracking_code: TrackingCode) -> Self {
        Self {
            tracking_code,
            ..self.clone()
        }
    }
}

impl Validate for CaseDraft {
    fn validate(&self) -> Result<(), ContractViolation> {
        self.tenant_id.validate()?;
        self.tracking_code.validate()?;
        self.tracking_verifier_hash.validate()?;
        for (field, value) in [
            ("case.ticket_id", self.ticket_id.as_deref()),
            ("case.firm_id", self.firm_id.as_deref()),
            ("case.user_id", self.user_id.as_deref()),
        ] {
            if let Some(value) = value {
                validate_id_text(field, value)?;
            }
        }
        if self.contact_phone.chars().filter(char::is_ascii_digit).count() < 4 {
            return Err(ContractViolation::InvalidValue {
                field: "case.contact_phone",
                reason: "must contain at least 4 digits",
            });
        }
        if let Some(email) = self.contact_email.as_deref() {
            if !looks_like_email(email) {
                return Err(ContractViolation::InvalidValue {
                    field: "case.contact_email",
                    reason: "must be an email address",
                });
            }
        }
        if self.tracking_verifier_hint.trim().is_empty() {
            return Err(ContractViolation::InvalidValue {
                field: "case.tracking_verifier_hint",
                reason: "must not be empty",
            });
        }
        Ok(())
    }
}

pub fn looks_like_email(raw: &str) -> bool {
    let raw = raw.trim();
    match raw.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !raw.chars().any(char::is_whitespace)
        }
        None => false,
    }
}

/// A persisted case row, column-for-column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseRecord {
    pub id: String,
    pub tenant_id: TenantId,
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
    pub status: String,
    pub status_stage: String,
    pub tracking_code: TrackingCode,
    pub tracking_verifier_type: String,
    pub tracking_verifier_hash: VerifierHash,
    pub tracking_verifier_hint: String,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

impl CaseRecord {
    pub fn from_draft(id: String, draft: CaseDraft, now_rfc3339: String) -> Self {
        Self {
            id,
            tenant_id: draft.tenant_id,
            ticket_id: draft.ticket_id,
            firm_id: draft.firm_id,
            user_id: draft.user_id,
            contact_name: draft.contact_name,
            contact_email: draft.contact_email,
            contact_phone: Some(draft.contact_phone),
            locale: draft.locale,
            language: draft.language,
            summary: draft.summary,
            next_steps: draft.next_steps,
            extra: draft.extra,
            status: draft.status,
            status_stage: draft.status_stage,
            tracking_code: draft.tracking_code,
            tracking_verifier_type: draft.tracking_verifier_type,
            tracking_verifier_hash: draft.tracking_verifier_hash,
            tracking_verifier_hint: draft.tracking_verifier_hint,
            created_at: Some(now_rfc3339.clone()),
            updated_at: Some(now_rfc3339),
        }
    }

    pub fn public_view(&self) -> CasePublicView {
        CasePublicView {
            id: self.id.clone(),
            tenant_id: self.tenant_id.as_str().to_string(),
            ticket_id: self.ticket_id.clone(),
            firm_id: self.firm_id.clone(),
            user_id: self.user_id.clone(),
            contact_name: self.contact_name.clone(),
            contact_email: self.contact_email.clone(),
            locale: self.locale.clone(),
            language: self.language.clone(),
            summary: self.summary.clone(),
            next_steps: self.next_steps.clone(),
            extra: self.extra.clone(),
            status: self.status.clone(),
            status_stage: self.status_stage.clone(),
            tracking_code: self.tracking_code.as_str().to_string(),
            tracking_verifier_hint: self.tracking_verifier_hint.clone(),
            created_at: self.created_at.clone(),
            updated_at: self.updated_at.clone(),
        }
    }
}

/// Case row as returned to callers: no verifier hash, no raw phone number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CasePublicView {
    pub id: String,
    pub tenant_id: String,
    pub ticket_id: Option<String>,
    pub firm_id: Option<String>,
    pub user_id: Option<String>,
    pub contact_name: Option<String>,
    pub contact_email: Option<String>,
    pub locale: Option<String>,
    pub language: Option<String>,
    pub summary: Option<String>,
    pub next_steps: Option<String>,
    pub extra: Option<Value>,
    pub status: String,
    pub status_stage: String,
    pub tracking_code: String,
    pub tracking_verifier_hint: String,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingReceipt {
    pub tracking_code: String,
    pub verifier_type: String,
    pub verifier_hint: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft() -> CaseDraft {
        CaseDraft {
            tenant_id: TenantId::new("t1").unwrap(),
            ticket_id: None,
            firm_id: None,
            user_id: None,
            contact_name: Some("Dana Reyes".to_string()),
            contact_email: Some("dana@example.com".to_string()),
            contact_phone: "404-555-0199".to_string(),
            locale: None,
            language: None,
            summary: None,
            next_steps: None,
            extra: None,
            status: CASE_STATUS_NEW.to_string(),
            status_stage: CASE_STAGE_INTAKE.to_string(),
            tracking_code: TrackingCode::new("ABCD2345").unwrap(),
            tracking_verifier_type: VERIFIER_TYPE_PHONE_LAST4.to_string(),
            tracking_verifier_hash: VerifierHash::new("a".repeat(64)).unwrap(),
            tracking_verifier_hint: "••••0199".to_string(),
        }
    }

    #[test]
    fn at_case_01_alphabet_has_33_unique_symbols() {
        let mut seen = std::collections::BTreeSet::new();
        for b in TRACKING_CODE_ALPHABET.iter() {
            assert!(seen.insert(*b));
        }
        assert_eq!(seen.len(), 33);
        assert!(!seen.contains(&b'0'));
        assert!(!seen.contains(&b'O'));
        assert!(!seen.contains(&b'I'));
    }

    #[test]
    fn at_case_02_tracking_code_shape_is_enforced() {
        assert!(TrackingCode::new("ABCD2345").is_ok());
        assert!(TrackingCode::new("ABCD234").is_err());
        assert!(TrackingCode::new("ABCD2340").is_err());
        assert!(TrackingCode::new("abcd2345").is_err());
    }

    #[test]
    fn at_case_03_user_input_is_normalized() {
        let code = TrackingCode::parse_user_input(" abcd-2345 ").unwrap();
        assert_eq!(code.as_str(), "ABCD2345");
        assert!(TrackingCode::parse_user_input("nope").is_none());
    }

    #[test]
    fn at_case_04_draft_validation_rejects_short_phone_and_bad_email() {
        assert!(draft().validate().is_ok());

        let mut d = draft();
        d.contact_phone = "55-1".to_string();
        assert!(d.validate().is_err());

        let mut d = draft();
        d.contact_email = Some("not-an-email".to_string());
        assert!(d.validate().is_err());
    }

    #[test]
    fn at_case_05_public_view_hides_hash_and_phone() {
        let record = CaseRecord::from_draft(
            "case_000001".to_string(),
            draft(),
            "2026-01-01T00:00:00Z".to_string(),
        );
        let json = serde_json::to_value(record.public_view()).unwrap();
        assert!(json.get("tracking_verifier_hash").is_none());
        assert!(json.get("contact_phone").is_none());
        assert_eq!(json["tracking_code"], "ABCD2345");
        assert_eq!(json["tracking_verifier_hint"], "••••0199");
    }

    #[test]
    fn at_case_06_draft_serialization_skips_absent_optionals() {
        let json = serde_json::to_value(draft()).unwrap();
        assert!(json.get("ticket_id").is_none());
        assert_eq!(json["tenant_id"], "t1");
        assert_eq!(json["status"], "new");
    }
}
