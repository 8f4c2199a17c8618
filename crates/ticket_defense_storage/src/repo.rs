#![forbid(unsafe_code)]

use ticket_defense_contracts::case::{CaseDraft, CaseRecord, TrackingCode, VerifierHash};

use crate::cases::{CaseStore, StorageError};

/// Typed repository interface for the `cases` table and the `tickets.case_id` link.
///
/// Implementations block; async callers run them on a blocking thread.
pub trait CaseRepo: Send + Sync {
    /// Short backend label for health output and logs.
    fn backend_name(&self) -> &'static str;

    fn insert_case_row(&self, draft: &CaseDraft) -> Result<CaseRecord, StorageError>;

    fn find_case_by_tracking(
        &self,
        tracking_code: &TrackingCode,
        verifier_hash: &VerifierHash,
    ) -> Result<Option<CaseRecord>, StorageError>;

    fn link_ticket_to_case(&self, ticket_id: &str, case_id: &str) -> Result<(), StorageError>;
}

impl CaseRepo for CaseStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    fn insert_case_row(&self, draft: &CaseDraft) -> Result<CaseRecord, StorageError> {
        self.insert_case(draft)
    }

    fn find_case_by_tracking(
        &self,
        tracking_code: &TrackingCode,
        verifier_hash: &VerifierHash,
    ) -> Result<Option<CaseRecord>, StorageError> {
        Ok(CaseStore::find_case_by_tracking(
            self,
            tracking_code,
            verifier_hash,
        ))
    }

    fn link_ticket_to_case(&self, ticket_id: &str, case_id: &str) -> Result<(), StorageError> {
        CaseStore::link_ticket_to_case(self, ticket_id, case_id)
    }
}
