#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{SecondsFormat, Utc};
use ticket_defense_contracts::case::{CaseDraft, CaseRecord, TrackingCode, VerifierHash};
use ticket_defense_contracts::{ContractViolation, Validate};

/// Postgres SQLSTATE for `unique_violation`.
pub const UNIQUE_VIOLATION_CODE: &str = "23505";
/// Postgres SQLSTATE for `foreign_key_violation`.
pub const FOREIGN_KEY_VIOLATION_CODE: &str = "23503";

#[derive(Debug, Clone, PartialEq)]
pub enum StorageError {
    ForeignKeyViolation { table: &'static str, key: String },
    DuplicateKey { table: &'static str, key: String },
    NotFound { table: &'static str, key: String },
    /// Non-2xx answer from the remote store that maps to no narrower variant.
    Upstream {
        status: u16,
        code: Option<String>,
        message: String,
    },
    /// The request never produced an HTTP status (timeout, DNS, TLS, ...).
    Transport(String),
    ContractViolation(ContractViolation),
}

impl StorageError {
    pub fn is_unique_violation(&self) -> bool {
        match self {
            StorageError::DuplicateKey { .. } => true,
            StorageError::Upstream { code, .. } => code.as_deref() == Some(UNIQUE_VIOLATION_CODE),
            _ => false,
        }
    }

    /// SQLSTATE-style code, when one applies.
    pub fn code(&self) -> Option<&str> {
        match self {
            StorageError::DuplicateKey { .. } => Some(UNIQUE_VIOLATION_CODE),
            StorageError::ForeignKeyViolation { .. } => Some(FOREIGN_KEY_VIOLATION_CODE),
            StorageError::Upstream { code, .. } => code.as_deref(),
            _ => None,
        }
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::ForeignKeyViolation { table, key } => {
                write!(f, "{table}: foreign key violation for {key}")
            }
            StorageError::DuplicateKey { table, key } => {
                write!(f, "{table}: duplicate key {key} ({UNIQUE_VIOLATION_CODE})")
            }
            StorageError::NotFound { table, key } => write!(f, "{table}: no row for {key}"),
            StorageError::Upstream {
                status,
                code,
                message,
            } => match code {
                Some(code) => write!(f, "store returned {status} ({code}): {message}"),
                None => write!(f, "store returned {status}: {message}"),
            },
            StorageError::Transport(kind) => write!(f, "store transport failure: {kind}"),
            StorageError::ContractViolation(v) => write!(f, "contract violation: {v}"),
        }
    }
}

impl std::error::Error for StorageError {}

impl From<ContractViolation> for StorageError {
    fn from(v: ContractViolation) -> Self {
        StorageError::ContractViolation(v)
    }
}

#[derive(Debug, Default)]
struct CaseTables {
    next_case_seq: u64,
    cases: BTreeMap<String, CaseRecord>,
    // Unique on `tracking_code` across all tenants, stricter than per-tenant.
    // Track-case looks codes up without a tenant, so a code must name one case.
    case_id_by_tracking_code: BTreeMap<TrackingCode, String>,
    ticket_case_links: BTreeMap<String, String>,
}

/// In-process case store with the same constraints as the hosted `cases`
/// table. Used for local development and tests.
#[derive(Debug, Default)]
pub struct CaseStore {
    tables: Mutex<CaseTables>,
}

impl CaseStore {
    pub fn new_in_memory() -> Self {
        Self::default()
    }

    fn tables(&self) -> MutexGuard<'_, CaseTables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn insert_case(&self, draft: &CaseDraft) -> Result<CaseRecord, StorageError> {
        draft.validate()?;
        let mut t = self.tables();
        if t.case_id_by_tracking_code.contains_key(&draft.tracking_code) {
            return Err(StorageError::DuplicateKey {
                table: "cases.tracking_code",
                key: draft.tracking_code.as_str().to_string(),
            });
        }
        t.next_case_seq += 1;
        let id = format!("case_{:06}", t.next_case_seq);
        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        let record = CaseRecord::from_draft(id.clone(), draft.clone(), now);
        t.case_id_by_tracking_code
            .insert(record.tracking_code.clone(), id.clone());
        t.cases.insert(id, record.clone());
        Ok(record)
    }

    /// Both the code and the verifier hash must match; a code alone finds nothing.
    pub fn find_case_by_tracking(
        &self,
        tracking_code: &TrackingCode,
        verifier_hash: &VerifierHash,
    ) -> Option<CaseRecord> {
        let t = self.tables();
        t.case_id_by_tracking_code
            .get(tracking_code)
            .and_then(|id| t.cases.get(id))
            .filter(|row| &row.tracking_verifier_hash == verifier_hash)
            .cloned()
    }

    pub fn case_row(&self, case_id: &str) -> Option<CaseRecord> {
        self.tables().cases.get(case_id).cloned()
    }

    pub fn case_count(&self) -> usize {
        self.tables().cases.len()
    }

    pub fn link_ticket_to_case(&self, ticket_id: &str, case_id: &str) -> Result<(), StorageError> {
        let ticket_id = ticket_id.trim();
        if ticket_id.is_empty() {
            return Err(StorageError::ContractViolation(
                ContractViolation::InvalidValue {
                    field: "tickets.id",
                    reason: "must not be empty",
                },
            ));
        }
        let mut t = self.tables();
        if !t.cases.contains_key(case_id) {
            return Err(StorageError::ForeignKeyViolation {
                table: "tickets.case_id",
                key: case_id.to_string(),
            });
        }
        t.ticket_case_links
            .insert(ticket_id.to_string(), case_id.to_string());
        Ok(())
    }

    pub fn case_id_for_ticket(&self, ticket_id: &str) -> Option<String> {
        self.tables().ticket_case_links.get(ticket_id).cloned()
    }
}
