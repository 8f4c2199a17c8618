#![forbid(unsafe_code)]

use std::fmt;
use std::time::Duration;

use serde_json::Value;

pub const DEFAULT_USER_AGENT: &str = "ticket-defense/0.1";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyMode {
    Off,
    Env,
    Explicit,
}

impl ProxyMode {
    pub fn from_env_value(raw: Option<&str>) -> Self {
        match raw
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_ascii_lowercase)
            .as_deref()
        {
            Some("off") => Self::Off,
            Some("explicit") => Self::Explicit,
            _ => Self::Env,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::Env => "env",
            Self::Explicit => "explicit",
        }
    }
}

/// Outbound proxy settings. `env_proxy_url` is what `HTTPS_PROXY`/`HTTP_PROXY`
/// held when the config was built; `explicit_proxy_url` comes from
/// `TICKET_DEFENSE_HTTPS_PROXY_URL`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyConfig {
    pub mode: ProxyMode,
    pub explicit_proxy_url: Option<String>,
    pub env_proxy_url: Option<String>,
}

impl ProxyConfig {
    pub fn off() -> Self {
        Self {
            mode: ProxyMode::Off,
            explicit_proxy_url: None,
            env_proxy_url: None,
        }
    }

    pub fn from_lookup(lookup: &dyn Fn(&str) -> Option<String>) -> Self {
        Self {
            mode: ProxyMode::from_env_value(lookup("TICKET_DEFENSE_PROXY_MODE").as_deref()),
            explicit_proxy_url: lookup("TICKET_DEFENSE_HTTPS_PROXY_URL").and_then(trim_non_empty),
            env_proxy_url: lookup("HTTPS_PROXY")
                .and_then(trim_non_empty)
                .or_else(|| lookup("HTTP_PROXY").and_then(trim_non_empty)),
        }
    }

    pub fn effective_proxy_url(&self) -> Result<Option<&str>, String> {
        match self.mode {
            ProxyMode::Off => Ok(None),
            ProxyMode::Env => Ok(self.env_proxy_url.as_deref()),
            ProxyMode::Explicit => self
                .explicit_proxy_url
                .as_deref()
                .map(Some)
                .ok_or_else(|| {
                    "explicit proxy mode requires TICKET_DEFENSE_HTTPS_PROXY_URL".to_string()
                }),
        }
    }

    /// `host:port` of the active proxy with any credentials stripped, for logs.
    pub fn safe_proxy_host_port(&self) -> Option<String> {
        self.effective_proxy_url()
            .ok()
            .flatten()
            .and_then(proxy_host_port_hint)
    }
}

/// Failure talking to an outbound provider. Never carries response bodies or
/// credentials, so it is safe to log and to surface in `aiMeta`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderCallError {
    pub provider: &'static str,
    pub error_kind: &'static str,
    pub http_status: Option<u16>,
}

impl ProviderCallError {
    pub fn new(provider: &'static str, error_kind: &'static str, http_status: Option<u16>) -> Self {
        Self {
            provider,
            error_kind,
            http_status,
        }
    }

    pub fn safe_detail(&self) -> String {
        match self.http_status {
            Some(status) => format!(
                "provider={} error={} status={}",
                self.provider, self.error_kind, status
            ),
            None => format!("provider={} error={}", self.provider, self.error_kind),
        }
    }
}

impl fmt::Display for ProviderCallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.safe_detail())
    }
}

impl std::error::Error for ProviderCallError {}

pub fn build_http_agent(
    provider: &'static str,
    timeout: Duration,
    user_agent: &str,
    proxy: &ProxyConfig,
) -> Result<ureq::Agent, ProviderCallError> {
    if timeout.is_zero() {
        return Err(ProviderCallError::new(provider, "config_invalid", None));
    }
    let timeout = timeout.max(Duration::from_millis(100));
    let mut builder = ureq::AgentBuilder::new()
        .timeout_connect(timeout)
        .timeout_read(timeout)
        .timeout_write(timeout)
        .user_agent(user_agent)
        .try_proxy_from_env(false);
    let proxy_url = proxy.effective_proxy_url().map_err(|reason| {
        tracing::warn!(provider, proxy_mode = proxy.mode.as_str(), %reason, "proxy config invalid");
        ProviderCallError::new(provider, "config_invalid", None)
    })?;
    if let Some(proxy_url) = proxy_url {
        let proxy = ureq::Proxy::new(proxy_url)
            .map_err(|_| ProviderCallError::new(provider, "config_invalid", None))?;
        builder = builder.proxy(proxy);
    }
    Ok(builder.build())
}

/// POSTs `payload` as JSON and parses a JSON response body.
pub fn post_json(
    agent: &ureq::Agent,
    provider: &'static str,
    url: &str,
    headers: &[(&str, &str)],
    payload: &Value,
) -> Result<Value, ProviderCallError> {
    let mut request = agent
        .post(url)
        .set("Content-Type", "application/json")
        .set("Accept", "application/json");
    for (name, value) in headers {
        request = request.set(name, value);
    }
    let response = request
        .send_json(payload.clone())
        .map_err(|err| provider_error_from_ureq(provider, err))?;
    serde_json::from_reader(response.into_reader())
        .map_err(|_| ProviderCallError::new(provider, "json_parse", None))
}

pub fn provider_error_from_ureq(provider: &'static str, err: ureq::Error) -> ProviderCallError {
    match err {
        ureq::Error::Status(status, _) => {
            ProviderCallError::new(provider, "http_non_200", Some(status))
        }
        ureq::Error::Transport(transport) => {
            let combined = format!("{:?} {}", transport.kind(), transport);
            ProviderCallError::new(provider, classify_transport_error_kind(&combined), None)
        }
    }
}

fn classify_transport_error_kind(raw: &str) -> &'static str {
    let lower = raw.to_ascii_lowercase();
    if lower.contains("timeout") || lower.contains("timed out") {
        "timeout"
    } else if lower.contains("tls") || lower.contains("ssl") {
        "tls"
    } else if lower.contains("dns") {
        "dns"
    } else if lower.contains("connection") || lower.contains("connect") {
        "connection"
    } else {
        "transport"
    }
}

pub fn proxy_host_port_hint(raw_proxy_url: &str) -> Option<String> {
    let trimmed = raw_proxy_url.trim();
    let without_scheme = trimmed
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(trimmed);
    let without_auth = without_scheme
        .rsplit_once('@')
        .map(|(_, rest)| rest)
        .unwrap_or(without_scheme);
    without_auth
        .split(['/', '?', '#'])
        .next()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

pub(crate) fn trim_non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
