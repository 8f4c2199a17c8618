#![forbid(unsafe_code)]

use std::env;
use std::fmt;
use std::net::SocketAddr;

use ticket_defense_contracts::provider_secrets::ProviderSecretId;
use ticket_defense_engines::analysis::DEFAULT_MAX_IMAGE_BYTES;
use ticket_defense_engines::device_vault::{resolve_provider_secret, DeviceVault, SecretStore};
use ticket_defense_engines::gemini::GeminiConfig;
use ticket_defense_engines::provider_http::ProxyConfig;
use ticket_defense_engines::vision::VisionConfig;
use ticket_defense_storage::supabase::SupabaseConfig;

pub const DEFAULT_HTTP_BIND: &str = "127.0.0.1:8080";
const MIN_IMAGE_BYTES: usize = 1024;
const MAX_IMAGE_BYTES_CEILING: usize = 20 * 1024 * 1024;

#[derive(Clone)]
pub struct AdapterConfig {
    pub bind: SocketAddr,
    pub log_json: bool,
    pub max_image_bytes: usize,
    pub default_tenant_id: Option<String>,
    pub tracking_verifier_pepper: Option<String>,
    /// `None` runs the adapter on the in-memory case store.
    pub supabase: Option<SupabaseConfig>,
    pub proxy: ProxyConfig,
    pub vision: VisionConfig,
    pub gemini: GeminiConfig,
}

impl AdapterConfig {
    pub fn from_env() -> Result<Self, String> {
        let vault = DeviceVault::default_local();
        let vault: &dyn SecretStore = &vault;
        Self::from_lookup(&|key: &str| env::var(key).ok(), Some(vault))
    }

    /// Builds the config from any key lookup. Provider secrets resolve from
    /// the lookup first, then from `vault`.
    pub fn from_lookup(
        lookup: &dyn Fn(&str) -> Option<String>,
        vault: Option<&dyn SecretStore>,
    ) -> Result<Self, String> {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let secret = |id: ProviderSecretId| resolve_provider_secret(id, lookup, vault);

        let bind_raw = get("TICKET_DEFENSE_HTTP_BIND").unwrap_or_else(|| DEFAULT_HTTP_BIND.to_string());
        let bind: SocketAddr = bind_raw
            .parse()
            .map_err(|_| format!("TICKET_DEFENSE_HTTP_BIND is not a socket address: {bind_raw}"))?;

        let max_image_bytes = match get("TICKET_DEFENSE_MAX_IMAGE_BYTES") {
            Some(raw) => raw
                .parse::<usize>()
                .ok()
                .filter(|v| (MIN_IMAGE_BYTES..=MAX_IMAGE_BYTES_CEILING).contains(v))
                .ok_or_else(|| {
                    format!(
                        "TICKET_DEFENSE_MAX_IMAGE_BYTES must be a byte count in \
                         {MIN_IMAGE_BYTES}..={MAX_IMAGE_BYTES_CEILING}: {raw}"
                    )
                })?,
            None => DEFAULT_MAX_IMAGE_BYTES,
        };

        let proxy = ProxyConfig::from_lookup(lookup);

        let supabase = match get("SUPABASE_URL").or_else(|| get("VITE_SUPABASE_URL")) {
            Some(url) => {
                let Some(key) = secret(ProviderSecretId::SupabaseServiceRoleKey) else {
                    return Err(
                        "SUPABASE_URL is set but supabase_service_role_key is not configured"
                            .to_string(),
                    );
                };
                let mut cfg = SupabaseConfig::new(url, key);
                if let Some(table) = get("SUPABASE_CASES_TABLE") {
                    cfg.cases_table = table;
                }
                if let Some(table) = get("SUPABASE_TICKETS_TABLE") {
                    cfg.tickets_table = table;
                }
                Some(cfg)
            }
            None => None,
        };

        let mut vision = VisionConfig::new(secret(ProviderSecretId::GoogleVisionApiKey));
        if let Some(endpoint) = get("GOOGLE_VISION_ENDPOINT") {
            vision.endpoint = endpoint;
        }
        vision.proxy = proxy.clone();

        let mut gemini = GeminiConfig::new(secret(ProviderSecretId::GeminiApiKey));
        if let Some(model) = get("GEMINI_MODEL") {
            gemini.model = model;
        }
        if let Some(api_base) = get("GEMINI_API_BASE") {
            gemini.api_base = api_base;
        }
        gemini.proxy = proxy.clone();

        Ok(Self {
            bind,
            log_json: get("TICKET_DEFENSE_LOG_JSON").is_some_and(|v| parse_flag(&v)),
            max_image_bytes,
            default_tenant_id: get("DEFAULT_TENANT_ID"),
            tracking_verifier_pepper: secret(ProviderSecretId::TrackingVerifierPepper),
            supabase,
            proxy,
            vision,
            gemini,
        })
    }
}

impl fmt::Debug for AdapterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdapterConfig")
            .field("bind", &self.bind)
            .field("log_json", &self.log_json)
            .field("max_image_bytes", &self.max_image_bytes)
            .field("default_tenant_id", &self.default_tenant_id)
            .field("verifier_configured", &self.tracking_verifier_pepper.is_some())
            .field("supabase", &self.supabase)
            .field("proxy_mode", &self.proxy.mode.as_str())
            .field("ocr_configured", &self.vision.api_key.is_some())
            .field("ai_configured", &self.gemini.api_key.is_some())
            .field("gemini_model", &self.gemini.model)
            .finish()
    }
}

fn parse_flag(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "on" | "yes"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use ticket_defense_engines::device_vault::VaultError;
    use ticket_defense_engines::provider_http::ProxyMode;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: BTreeMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    struct FixedVault(BTreeMap<&'static str, &'static str>);

    impl SecretStore for FixedVault {
        fn lookup(&self, id: ProviderSecretId) -> Result<Option<String>, VaultError> {
            Ok(self.0.get(id.as_str()).map(|v| v.to_string()))
        }
    }

    #[test]
    fn at_config_01_defaults_run_in_memory_without_providers() {
        let cfg = AdapterConfig::from_lookup(&lookup_from(&[]), None).unwrap();
        assert_eq!(cfg.bind.to_string(), DEFAULT_HTTP_BIND);
        assert!(!cfg.log_json);
        assert_eq!(cfg.max_image_bytes, DEFAULT_MAX_IMAGE_BYTES);
        assert!(cfg.supabase.is_none());
        assert!(cfg.tracking_verifier_pepper.is_none());
        assert!(cfg.vision.api_key.is_none());
        assert!(cfg.gemini.api_key.is_none());
        assert_eq!(cfg.gemini.model, "gemini-2.0-flash");
        assert_eq!(cfg.proxy.mode, ProxyMode::Env);
    }

    #[test]
    fn at_config_02_env_overrides_and_vite_fallbacks() {
        let lookup = lookup_from(&[
            ("TICKET_DEFENSE_HTTP_BIND", "0.0.0.0:9000"),
            ("TICKET_DEFENSE_LOG_JSON", "true"),
            ("TICKET_DEFENSE_MAX_IMAGE_BYTES", "2097152"),
            ("VITE_SUPABASE_URL", "https://proj.supabase.co"),
            ("SUPABASE_SERVICE_ROLE_KEY", "srk"),
            ("SUPABASE_CASES_TABLE", "intake_cases"),
            ("VITE_GEMINI_API_KEY", "gem"),
            ("GEMINI_MODEL", "gemini-1.5-pro"),
            ("TRACKING_VERIFIER_PEPPER", "pep"),
            ("DEFAULT_TENANT_ID", "tenant_default"),
            ("TICKET_DEFENSE_PROXY_MODE", "off"),
        ]);
        let cfg = AdapterConfig::from_lookup(&lookup, None).unwrap();
        assert_eq!(cfg.bind.port(), 9000);
        assert!(cfg.log_json);
        assert_eq!(cfg.max_image_bytes, 2_097_152);
        let supabase = cfg.supabase.as_ref().unwrap();
        assert_eq!(supabase.base_url, "https://proj.supabase.co");
        assert_eq!(supabase.cases_table, "intake_cases");
        assert_eq!(supabase.tickets_table, "tickets");
        assert_eq!(cfg.gemini.api_key.as_deref(), Some("gem"));
        assert_eq!(cfg.gemini.model, "gemini-1.5-pro");
        assert_eq!(cfg.gemini.proxy.mode, ProxyMode::Off);
        assert_eq!(cfg.tracking_verifier_pepper.as_deref(), Some("pep"));
        assert_eq!(cfg.default_tenant_id.as_deref(), Some("tenant_default"));

        let debug = format!("{cfg:?}");
        assert!(!debug.contains("srk"));
        assert!(!debug.contains("pep\""));
        assert!(!debug.contains("gem\""));
    }

    #[test]
    fn at_config_03_secrets_fall_back_to_vault() {
        let vault = FixedVault(BTreeMap::from([
            ("tracking_verifier_pepper", "vault-pepper"),
            ("google_vision_api_key", "vault-vision"),
        ]));
        let lookup = lookup_from(&[("GOOGLE_VISION_API_KEY", "env-vision")]);
        let vault: &dyn SecretStore = &vault;
        let cfg = AdapterConfig::from_lookup(&lookup, Some(vault)).unwrap();
        assert_eq!(cfg.tracking_verifier_pepper.as_deref(), Some("vault-pepper"));
        assert_eq!(cfg.vision.api_key.as_deref(), Some("env-vision"));
    }

    #[test]
    fn at_config_04_invalid_values() {
        let err = AdapterConfig::from_lookup(
            &lookup_from(&[("TICKET_DEFENSE_HTTP_BIND", "localhost")]),
            None,
        )
        .unwrap_err();
        assert!(err.contains("TICKET_DEFENSE_HTTP_BIND"));

        let err = AdapterConfig::from_lookup(
            &lookup_from(&[("SUPABASE_URL", "https://proj.supabase.co")]),
            None,
        )
        .unwrap_err();
        assert!(err.contains("supabase_service_role_key"));

        for raw in ["12", "lots", "999999999"] {
            let err = AdapterConfig::from_lookup(
                &lookup_from(&[("TICKET_DEFENSE_MAX_IMAGE_BYTES", raw)]),
                None,
            )
            .unwrap_err();
            assert!(err.contains("TICKET_DEFENSE_MAX_IMAGE_BYTES"), "{raw}: {err}");
        }

        let cfg = AdapterConfig::from_lookup(
            &lookup_from(&[("TICKET_DEFENSE_MAX_IMAGE_BYTES", "2048")]),
            None,
        )
        .unwrap();
        assert_eq!(cfg.max_image_bytes, 2048);
    }
}
