#![forbid(unsafe_code)]

use std::fmt;
use std::time::Duration;

use serde::Deserialize;
use serde_json::{json, Value};
use ticket_defense_contracts::case::{CaseDraft, CaseRecord, TrackingCode, VerifierHash};
use ticket_defense_contracts::{ContractViolation, Validate};
use url::Url;

use crate::cases::{StorageError, FOREIGN_KEY_VIOLATION_CODE, UNIQUE_VIOLATION_CODE};
use crate::repo::CaseRepo;

pub const SUPABASE_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_CASES_TABLE: &str = "cases";
pub const DEFAULT_TICKETS_TABLE: &str = "tickets";

#[derive(Clone)]
pub struct SupabaseConfig {
    pub base_url: String,
    pub service_role_key: String,
    pub cases_table: String,
    pub tickets_table: String,
}

impl SupabaseConfig {
    pub fn new(base_url: impl Into<String>, service_role_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            service_role_key: service_role_key.into(),
            cases_table: DEFAULT_CASES_TABLE.to_string(),
            tickets_table: DEFAULT_TICKETS_TABLE.to_string(),
        }
    }

    fn table_url(&self, table: &str) -> Result<Url, StorageError> {
        let base = self.base_url.trim().trim_end_matches('/');
        let url = Url::parse(&format!("{base}/rest/v1/{table}")).map_err(|_| {
            StorageError::ContractViolation(ContractViolation::InvalidValue {
                field: "supabase_url",
                reason: "must be an absolute http(s) URL",
            })
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(StorageError::ContractViolation(
                ContractViolation::InvalidValue {
                    field: "supabase_url",
                    reason: "must be an absolute http(s) URL",
                },
            ));
        }
        Ok(url)
    }

    pub fn cases_insert_url(&self) -> Result<Url, StorageError> {
        self.table_url(&self.cases_table)
    }

    pub fn tracking_lookup_url(
        &self,
        tracking_code: &TrackingCode,
        verifier_hash: &VerifierHash,
    ) -> Result<Url, StorageError> {
        let mut url = self.table_url(&self.cases_table)?;
        url.query_pairs_mut()
            .append_pair("select", "*")
            .append_pair("tracking_code", &format!("eq.{}", tracking_code.as_str()))
            .append_pair(
                "tracking_verifier_hash",
                &format!("eq.{}", verifier_hash.as_str()),
            )
            .append_pair("limit", "1");
        Ok(url)
    }

    pub fn ticket_link_url(&self, ticket_id: &str) -> Result<Url, StorageError> {
        let mut url = self.table_url(&self.tickets_table)?;
        url.query_pairs_mut()
            .append_pair("id", &format!("eq.{ticket_id}"));
        Ok(url)
    }
}

impl fmt::Debug for SupabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SupabaseConfig")
            .field("base_url", &self.base_url)
            .field("service_role_key", &"<redacted>")
            .field("cases_table", &self.cases_table)
            .field("tickets_table", &self.tickets_table)
            .finish()
    }
}

/// PostgREST error body: `{"code":"23505","message":"...","details":"...","hint":null}`.
#[derive(Debug, Default, Deserialize)]
struct PostgrestErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Maps a non-2xx PostgREST answer onto the storage error vocabulary.
pub fn storage_error_from_postgrest(table: &'static str, status: u16, body: &str) -> StorageError {
    let parsed: PostgrestErrorBody = serde_json::from_str(body).unwrap_or_default();
    let message = parsed
        .message
        .map(|m| m.trim().to_string())
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| format!("http {status}"));
    match parsed.code.as_deref() {
        Some(UNIQUE_VIOLATION_CODE) => StorageError::DuplicateKey {
            table,
            key: message,
        },
        Some(FOREIGN_KEY_VIOLATION_CODE) => StorageError::ForeignKeyViolation {
            table,
            key: message,
        },
        _ => StorageError::Upstream {
            status,
            code: parsed.code,
            message,
        },
    }
}

fn storage_error_from_ureq(table: &'static str, err: ureq::Error) -> StorageError {
    match err {
        ureq::Error::Status(status, response) => {
            let body = response.into_string().unwrap_or_default();
            tracing::debug!(table, status, "postgrest request rejected");
            storage_error_from_postgrest(table, status, &body)
        }
        ureq::Error::Transport(transport) => {
            tracing::debug!(table, kind = ?transport.kind(), "postgrest transport failure");
            StorageError::Transport(format!("{:?}", transport.kind()))
        }
    }
}

/// Takes the first row of a `return=representation` array response.
pub fn first_case_row(rows: Value) -> Result<Option<CaseRecord>, StorageError> {
    let rows = match rows {
        Value::Array(rows) => rows,
        row @ Value::Object(_) => vec![row],
        _ => {
            return Err(StorageError::Upstream {
                status: 200,
                code: None,
                message: "expected a JSON array of rows".to_string(),
            })
        }
    };
    let Some(row) = rows.into_iter().next() else {
        return Ok(None);
    };
    let record: CaseRecord = serde_json::from_value(row).map_err(|err| StorageError::Upstream {
        status: 200,
        code: None,
        message: format!("case row did not decode: {err}"),
    })?;
    record.tenant_id.validate()?;
    Ok(Some(record))
}

/// `cases` repository over the Supabase PostgREST API, authenticated with the
/// service-role key.
pub struct SupabaseCaseRepo {
    config: SupabaseConfig,
    agent: ureq::Agent,
}

impl SupabaseCaseRepo {
    pub fn new(config: SupabaseConfig, agent: ureq::Agent) -> Result<Self, StorageError> {
        config.cases_insert_url()?;
        if config.service_role_key.trim().is_empty() {
            return Err(StorageError::ContractViolation(
                ContractViolation::InvalidValue {
                    field: "supabase_service_role_key",
                    reason: "must not be empty",
                },
            ));
        }
        Ok(Self { config, agent })
    }

    pub fn config(&self) -> &SupabaseConfig {
        &self.config
    }

    fn request(&self, method: &str, url: &Url) -> ureq::Request {
        let key = self.config.service_role_key.trim();
        self.agent
            .request(method, url.as_str())
            .set("apikey", key)
            .set("Authorization", &format!("Bearer {key}"))
            .set("Accept", "application/json")
    }

    fn read_rows(table: &'static str, response: ureq::Response) -> Result<Value, StorageError> {
        serde_json::from_reader(response.into_reader()).map_err(|_| StorageError::Upstream {
            status: 200,
            code: None,
            message: format!("{table}: response body was not JSON"),
        })
    }
}

impl CaseRepo for SupabaseCaseRepo {
    fn backend_name(&self) -> &'static str {
        "supabase"
    }

    fn insert_case_row(&self, draft: &CaseDraft) -> Result<CaseRecord, StorageError> {
        draft.validate()?;
        let url = self.config.cases_insert_url()?;
        let body = serde_json::to_value(draft).map_err(|err| StorageError::Upstream {
            status: 0,
            code: None,
            message: format!("case draft did not encode: {err}"),
        })?;
        let response = self
            .request("POST", &url)
            .set("Content-Type", "application/json")
            .set("Prefer", "return=representation")
            .send_json(body)
            .map_err(|err| storage_error_from_ureq("cases", err))?;
        let rows = Self::read_rows("cases", response)?;
        first_case_row(rows)?.ok_or_else(|| StorageError::Upstream {
            status: 201,
            code: None,
            message: "insert returned no row".to_string(),
        })
    }

    fn find_case_by_tracking(
        &self,
        tracking_code: &TrackingCode,
        verifier_hash: &VerifierHash,
    ) -> Result<Option<CaseRecord>, StorageError> {
        let url = self
            .config
            .tracking_lookup_url(tracking_code, verifier_hash)?;
        let response = self
            .request("GET", &url)
            .call()
            .map_err(|err| storage_error_from_ureq("cases", err))?;
        first_case_row(Self::read_rows("cases", response)?)
    }

    fn link_ticket_to_case(&self, ticket_id: &str, case_id: &str) -> Result<(), StorageError> {
        let url = self.config.ticket_link_url(ticket_id.trim())?;
        let response = self
            .request("PATCH", &url)
            .set("Content-Type", "application/json")
            .set("Prefer", "return=representation")
            .send_json(json!({ "case_id": case_id }))
            .map_err(|err| storage_error_from_ureq("tickets", err))?;
        match Self::read_rows("tickets", response)? {
            Value::Array(rows) if rows.is_empty() => Err(StorageError::NotFound {
                table: "tickets",
                key: ticket_id.to_string(),
            }),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> SupabaseConfig {
        SupabaseConfig::new("https://proj.supabase.co/", "service-role")
    }

    fn case_row_json() -> Value {
        json!({
            "id": "5f0c2c1e-0000-4000-8000-000000000001",
            "tenant_id": "t1",
            "ticket_id": null,
            "contact_phone": "404-555-0199",
            "status": "new",
            "status_stage": "intake",
            "tracking_code": "ABCD2345",
            "tracking_verifier_type": "phone_last4",
            "tracking_verifier_hash": "a".repeat(64),
            "tracking_verifier_hint": "••••0199",
            "extra": null,
            "created_at": "2025-03-15T12:00:00.000+00:00"
        })
    }

    #[test]
    fn at_supabase_01_urls_target_rest_v1_with_eq_filters() {
        let cfg = config();
        assert_eq!(
            cfg.cases_insert_url().unwrap().as_str(),
            "https://proj.supabase.co/rest/v1/cases"
        );
        let code = TrackingCode::new("ABCD2345").unwrap();
        let hash = VerifierHash::new("b".repeat(64)).unwrap();
        let url = cfg.tracking_lookup_url(&code, &hash).unwrap();
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("tracking_code".to_string(), "eq.ABCD2345".to_string())));
        assert!(pairs.contains(&(
            "tracking_verifier_hash".to_string(),
            format!("eq.{}", "b".repeat(64))
        )));
        assert!(pairs.contains(&("limit".to_string(), "1".to_string())));

        let link = cfg.ticket_link_url("tk_9").unwrap();
        assert_eq!(link.path(), "/rest/v1/tickets");
        assert_eq!(link.query(), Some("id=eq.tk_9"));
    }

    #[test]
    fn at_supabase_02_unique_violation_maps_to_duplicate_key() {
        let err = storage_error_from_postgrest(
            "cases",
            409,
            r#"{"code":"23505","message":"duplicate key value violates unique constraint \"cases_tracking_code_key\"","details":null,"hint":null}"#,
        );
        assert!(matches!(err, StorageError::DuplicateKey { table: "cases", .. }));
        assert!(err.is_unique_violation());
        assert_eq!(err.code(), Some("23505"));
    }

    #[test]
    fn at_supabase_03_other_errors_stay_upstream() {
        let err = storage_error_from_postgrest("cases", 401, r#"{"message":"Invalid API key"}"#);
        assert_eq!(
            err,
            StorageError::Upstream {
                status: 401,
                code: None,
                message: "Invalid API key".to_string()
            }
        );
        assert!(!err.is_unique_violation());

        let err = storage_error_from_postgrest("tickets", 409, r#"{"code":"23503","message":"fk"}"#);
        assert!(matches!(err, StorageError::ForeignKeyViolation { .. }));

        let err = storage_error_from_postgrest("cases", 502, "<html>bad gateway</html>");
        assert_eq!(
            err,
            StorageError::Upstream {
                status: 502,
                code: None,
                message: "http 502".to_string()
            }
        );
    }

    #[test]
    fn at_supabase_04_first_row_decodes_case_record() {
        let row = first_case_row(json!([case_row_json()])).unwrap().unwrap();
        assert_eq!(row.tracking_code.as_str(), "ABCD2345");
        assert_eq!(row.contact_phone.as_deref(), Some("404-555-0199"));
        assert!(row.extra.is_none());
        assert_eq!(first_case_row(json!([])).unwrap(), None);
        assert!(first_case_row(json!("nope")).is_err());
    }

    #[test]
    fn at_supabase_05_repo_rejects_bad_config_and_redacts_key() {
        let agent = ureq::AgentBuilder::new().build();
        assert!(SupabaseCaseRepo::new(SupabaseConfig::new("not a url", "k"), agent.clone()).is_err());
        assert!(SupabaseCaseRepo::new(SupabaseConfig::new("ftp://x.y", "k"), agent.clone()).is_err());
        assert!(SupabaseCaseRepo::new(SupabaseConfig::new("https://x.y", " "), agent.clone()).is_err());
        let repo = SupabaseCaseRepo::new(config(), agent).unwrap();
        assert_eq!(repo.backend_name(), "supabase");
        assert!(!format!("{:?}", repo.config()).contains("service-role"));
    }
}
