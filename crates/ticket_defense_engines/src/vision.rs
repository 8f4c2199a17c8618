#![forbid(unsafe_code)]

use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde_json::{json, Value};
use url::Url;

use crate::provider_http::{build_http_agent, post_json, ProviderCallError, ProxyConfig, DEFAULT_USER_AGENT};

pub const PROVIDER: &str = "google_vision";
pub const DEFAULT_VISION_ENDPOINT: &str = "https://vision.googleapis.com/v1/images:annotate";
pub const VISION_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OcrImage<'a> {
    Inline(&'a [u8]),
    Url(&'a str),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisionConfig {
    pub api_key: Option<String>,
    pub endpoint: String,
    pub timeout: Duration,
    pub user_agent: String,
    pub proxy: ProxyConfig,
    /// Canned `images:annotate` response used instead of the network.
    pub fixture_json: Option<String>,
}

impl VisionConfig {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            api_key,
            endpoint: DEFAULT_VISION_ENDPOINT.to_string(),
            timeout: VISION_TIMEOUT,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            proxy: ProxyConfig::off(),
            fixture_json: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct VisionClient {
    config: VisionConfig,
}

impl VisionClient {
    pub fn new(config: VisionConfig) -> Self {
        Self { config }
    }

    pub fn is_configured(&self) -> bool {
        self.config.api_key.is_some()
    }

    /// Runs `DOCUMENT_TEXT_DETECTION` and returns the full detected text,
    /// which may be empty.
    pub fn detect_text(&self, image: OcrImage<'_>) -> Result<String, ProviderCallError> {
        let Some(api_key) = self.config.api_key.as_deref() else {
            return Err(ProviderCallError::new(PROVIDER, "missing_api_key", None));
        };
        let body = match self.config.fixture_json.as_deref() {
            Some(fixture) => serde_json::from_str(fixture)
                .map_err(|_| ProviderCallError::new(PROVIDER, "json_parse", None))?,
            None => {
                let url = Url::parse_with_params(&self.config.endpoint, &[("key", api_key)])
                    .map_err(|_| ProviderCallError::new(PROVIDER, "config_invalid", None))?;
                let agent = build_http_agent(
                    PROVIDER,
                    self.config.timeout,
                    &self.config.user_agent,
                    &self.config.proxy,
                )?;
                post_json(&agent, PROVIDER, url.as_str(), &[], &annotate_request(image))?
            }
        };
        extract_ocr_text(&body)
    }
}

pub fn annotate_request(image: OcrImage<'_>) -> Value {
    let image = match image {
        OcrImage::Inline(bytes) => json!({ "content": BASE64.encode(bytes) }),
        OcrImage::Url(url) => json!({ "source": { "imageUri": url } }),
    };
    json!({
        "requests": [{
            "image": image,
            "features": [{ "type": "DOCUMENT_TEXT_DETECTION" }]
        }]
    })
}

/// Prefers `fullTextAnnotation.text`, falling back to the first
/// `textAnnotations` entry. A per-image `error` object is a provider failure.
pub fn extract_ocr_text(body: &Value) -> Result<String, ProviderCallError> {
    let Some(first) = body.pointer("/responses/0") else {
        return Err(ProviderCallError::new(PROVIDER, "response_shape", None));
    };
    if first.get("error").is_some_and(|e| !e.is_null()) {
        let code = first
            .pointer("/error/code")
            .and_then(Value::as_u64)
            .and_then(|c| u16::try_from(c).ok());
        return Err(ProviderCallError::new(PROVIDER, "image_error", code));
    }
    let text = first
        .pointer("/fullTextAnnotation/text")
        .and_then(Value::as_str)
        .or_else(|| {
            first
                .pointer("/textAnnotations/0/description")
                .and_then(Value::as_str)
        })
        .unwrap_or_default();
    Ok(text.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn at_vision_01_request_shape_for_inline_and_url_images() {
        let inline = annotate_request(OcrImage::Inline(b"abc"));
        assert_eq!(inline["requests"][0]["image"]["content"], "YWJj");
        assert_eq!(
            inline["requests"][0]["features"][0]["type"],
            "DOCUMENT_TEXT_DETECTION"
        );
        let url = annotate_request(OcrImage::Url("https://example.com/t.jpg"));
        assert_eq!(
            url["requests"][0]["image"]["source"]["imageUri"],
            "https://example.com/t.jpg"
        );
    }

    #[test]
    fn at_vision_02_text_extraction_prefers_full_text() {
        let body = json!({"responses": [{
            "fullTextAnnotation": {"text": "SPEED 78 MPH"},
            "textAnnotations": [{"description": "other"}]
        }]});
        assert_eq!(extract_ocr_text(&body).unwrap(), "SPEED 78 MPH");

        let fallback = json!({"responses": [{"textAnnotations": [{"description": "COURT DATE"}]}]});
        assert_eq!(extract_ocr_text(&fallback).unwrap(), "COURT DATE");

        let empty = json!({"responses": [{}]});
        assert_eq!(extract_ocr_text(&empty).unwrap(), "");
    }

    #[test]
    fn at_vision_03_image_errors_and_bad_shapes_fail() {
        let body = json!({"responses": [{"error": {"code": 3, "message": "Bad image data."}}]});
        let err = extract_ocr_text(&body).unwrap_err();
        assert_eq!(err.error_kind, "image_error");
        assert_eq!(err.http_status, Some(3));
        assert_eq!(
            extract_ocr_text(&json!({})).unwrap_err().error_kind,
            "response_shape"
        );
    }

    #[test]
    fn at_vision_04_client_requires_key_and_honors_fixture() {
        let client = VisionClient::new(VisionConfig::new(None));
        assert!(!client.is_configured());
        let err = client.detect_text(OcrImage::Inline(b"x")).unwrap_err();
        assert_eq!(err.error_kind, "missing_api_key");

        let mut config = VisionConfig::new(Some("test-key".to_string()));
        config.fixture_json =
            Some(r#"{"responses":[{"fullTextAnnotation":{"text":"CITATION NO: A12345"}}]}"#.to_string());
        let client = VisionClient::new(config);
        assert_eq!(
            client.detect_text(OcrImage::Url("https://example.com/t.jpg")).unwrap(),
            "CITATION NO: A12345"
        );
    }
}
