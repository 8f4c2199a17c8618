#![forbid(unsafe_code)]

use serde_json::json;
use ticket_defense_contracts::case::{
    CaseDraft, TenantId, TrackingCode, VerifierHash, CASE_STAGE_INTAKE, CASE_STATUS_NEW,
    VERIFIER_TYPE_PHONE_LAST4,
};
use ticket_defense_storage::cases::{CaseStore, StorageError};
use ticket_defense_storage::repo::CaseRepo;

fn hash(fill: char) -> VerifierHash {
    VerifierHash::new(fill.to_string().repeat(64)).unwrap()
}

fn draft(code: &str) -> CaseDraft {
    CaseDraft {
        tenant_id: TenantId::new("t1").unwrap(),
        ticket_id: None,
        firm_id: None,
        user_id: None,
        contact_name: Some("Jordan Reyes".to_string()),
        contact_email: Some("jordan@example.com".to_string()),
        contact_phone: "404-555-0199".to_string(),
        locale: Some("en-US".to_string()),
        language: None,
        summary: None,
        next_steps: None,
        extra: Some(json!({"source": "intake_form"})),
        status: CASE_STATUS_NEW.to_string(),
        status_stage: CASE_STAGE_INTAKE.to_string(),
        tracking_code: TrackingCode::new(code).unwrap(),
        tracking_verifier_type: VERIFIER_TYPE_PHONE_LAST4.to_string(),
        tracking_verifier_hash: hash('a'),
        tracking_verifier_hint: "••••0199".to_string(),
    }
}

#[test]
fn at_cases_db_01_insert_assigns_id_and_timestamps() {
    let s = CaseStore::new_in_memory();
    let row = s.insert_case(&draft("ABCD2345")).unwrap();
    assert_eq!(row.id, "case_000001");
    assert_eq!(row.status, "new");
    assert_eq!(row.status_stage, "intake");
    assert_eq!(row.contact_phone.as_deref(), Some("404-555-0199"));
    assert!(row.created_at.is_some());
    assert_eq!(row.created_at, row.updated_at);
    assert_eq!(s.case_count(), 1);
    assert_eq!(s.case_row("case_000001"), Some(row));
}

#[test]
fn at_cases_db_02_tracking_code_is_unique() {
    let s = CaseStore::new_in_memory();
    s.insert_case(&draft("ABCD2345")).unwrap();
    let err = s.insert_case(&draft("ABCD2345")).unwrap_err();
    assert!(matches!(err, StorageError::DuplicateKey { .. }));
    assert!(err.is_unique_violation());
    assert_eq!(err.code(), Some("23505"));
    assert_eq!(s.case_count(), 1);

    s.insert_case(&draft("ABCD2346")).unwrap();
    assert_eq!(s.case_count(), 2);
}

#[test]
fn at_cases_db_07_tracking_code_is_unique_across_tenants() {
    let s = CaseStore::new_in_memory();
    s.insert_case(&draft("ABCD2345")).unwrap();
    let mut other_tenant = draft("ABCD2345");
    other_tenant.tenant_id = TenantId::new("t2").unwrap();
    let err = s.insert_case(&other_tenant).unwrap_err();
    assert!(err.is_unique_violation());
    assert_eq!(s.case_count(), 1);
}

#[test]
fn at_cases_db_03_lookup_requires_code_and_verifier() {
    let s = CaseStore::new_in_memory();
    let row = s.insert_case(&draft("ABCD2345")).unwrap();
    let code = TrackingCode::new("ABCD2345").unwrap();

    assert_eq!(s.find_case_by_tracking(&code, &hash('a')), Some(row));
    assert_eq!(s.find_case_by_tracking(&code, &hash('b')), None);
    assert_eq!(
        s.find_case_by_tracking(&TrackingCode::new("ZZZZ9999").unwrap(), &hash('a')),
        None
    );
}

#[test]
fn at_cases_db_04_invalid_draft_is_rejected_before_write() {
    let s = CaseStore::new_in_memory();
    let mut bad = draft("ABCD2345");
    bad.contact_phone = "12".to_string();
    assert!(matches!(
        s.insert_case(&bad),
        Err(StorageError::ContractViolation(_))
    ));

    let mut bad = draft("ABCD2345");
    bad.contact_email = Some("not-an-email".to_string());
    assert!(matches!(
        s.insert_case(&bad),
        Err(StorageError::ContractViolation(_))
    ));
    assert_eq!(s.case_count(), 0);
}

#[test]
fn at_cases_db_05_ticket_link_requires_existing_case() {
    let s = CaseStore::new_in_memory();
    let row = s.insert_case(&draft("ABCD2345")).unwrap();

    s.link_ticket_to_case("tk_1", &row.id).unwrap();
    assert_eq!(s.case_id_for_ticket("tk_1"), Some(row.id.clone()));

    let err = s.link_ticket_to_case("tk_2", "case_missing").unwrap_err();
    assert!(matches!(err, StorageError::ForeignKeyViolation { .. }));
    assert!(!err.is_unique_violation());
    assert_eq!(s.case_id_for_ticket("tk_2"), None);

    assert!(s.link_ticket_to_case("  ", &row.id).is_err());
}

#[test]
fn at_cases_db_06_repo_trait_object_wiring() {
    let store = CaseStore::new_in_memory();
    let repo: &dyn CaseRepo = &store;
    assert_eq!(repo.backend_name(), "memory");

    let row = repo.insert_case_row(&draft("QRST7788")).unwrap();
    let found = repo
        .find_case_by_tracking(&TrackingCode::new("QRST7788").unwrap(), &hash('a'))
        .unwrap();
    assert_eq!(found.map(|r| r.id), Some(row.id.clone()));
    assert!(repo
        .insert_case_row(&draft("QRST7788"))
        .unwrap_err()
        .is_unique_violation());
    repo.link_ticket_to_case("tk_7", &row.id).unwrap();
}
