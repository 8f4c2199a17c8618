#![forbid(unsafe_code)]

use std::sync::Arc;

use axum::http::{HeaderName, HeaderValue, Method, StatusCode};
use axum_test::TestServer;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde_json::{json, Value};
use ticket_defense_adapter::routes::build_router;
use ticket_defense_adapter::AdapterRuntime;
use ticket_defense_engines::analysis::{TicketAnalysisRuntime, DEFAULT_MAX_IMAGE_BYTES};
use ticket_defense_engines::gemini::{GeminiClient, GeminiConfig};
use ticket_defense_engines::vision::{VisionClient, VisionConfig};
use ticket_defense_storage::cases::CaseStore;

const TICKET_TEXT: &str = "CITATION NO: GA4471902\n\
DRIVER: JANE ROE\n\
ADDRESS: 12 OAK AVE, DECATUR, GA 30030\n\
SPEEDING 78 MPH IN A 55 MPH ZONE\n\
O.C.G.A. 40-6-181\n\
COURT DATE: 04/21/2025";

fn vision_fixture(text: &str) -> VisionClient {
    let mut config = VisionConfig::new(Some("vision-key".to_string()));
    config.fixture_json =
        Some(json!({"responses": [{"fullTextAnnotation": {"text": text}}]}).to_string());
    VisionClient::new(config)
}

fn gemini_fixture(payload: &str) -> GeminiClient {
    let mut config = GeminiConfig::new(Some("gemini-key".to_string()));
    config.fixture_json = Some(
        json!({
            "candidates": [{
                "content": {"parts": [{"text": payload}]},
                "groundingMetadata": {"groundingChunks": [
                    {"web": {"uri": "https://dds.georgia.gov/super-speeder", "title": "Super Speeder"}}
                ]}
            }]
        })
        .to_string(),
    );
    GeminiClient::new(config)
}

fn runtime_with(vision: VisionClient, gemini: GeminiClient, max_image_bytes: usize) -> AdapterRuntime {
    AdapterRuntime::new(
        Arc::new(CaseStore::new_in_memory()),
        TicketAnalysisRuntime::new(vision, gemini, max_image_bytes),
        max_image_bytes,
    )
    .with_verifier_pepper("test-pepper")
}

fn default_runtime() -> AdapterRuntime {
    runtime_with(
        VisionClient::new(VisionConfig::new(None)),
        GeminiClient::new(GeminiConfig::new(None)),
        DEFAULT_MAX_IMAGE_BYTES,
    )
}

fn server(runtime: AdapterRuntime) -> TestServer {
    TestServer::new(build_router(Arc::new(runtime))).unwrap()
}

#[tokio::test]
async fn at_http_01_create_then_track_end_to_end() {
    let server = server(default_runtime());

    let created = server
        .post("/api/create-case")
        .json(&json!({"contactPhone": "404-555-0199", "tenantId": "t1"}))
        .await;
    assert_eq!(created.status_code(), StatusCode::OK);
    let created: Value = created.json();
    let code = created["tracking"]["tracking_code"].as_str().unwrap().to_string();
    assert_eq!(code.len(), 8);
    assert_eq!(created["tracking"]["verifier_type"], "phone_last4");
    assert_eq!(created["tracking"]["verifier_hint"], "••••0199");
    assert_eq!(created["case"]["tenant_id"], "t1");
    assert_eq!(created["case"]["status"], "new");
    assert!(created["case"].get("tracking_verifier_hash").is_none());
    assert!(created["case"].get("contact_phone").is_none());

    let tracked = server
        .post("/api/track-case")
        .json(&json!({"trackingCode": code, "phoneLast4": "0199"}))
        .await;
    assert_eq!(tracked.status_code(), StatusCode::OK);
    let tracked: Value = tracked.json();
    assert_eq!(tracked["case"], created["case"]);

    let wrong = server
        .post("/api/track-case")
        .json(&json!({"trackingCode": code, "phoneLast4": "0198"}))
        .await;
    assert_eq!(wrong.status_code(), StatusCode::NOT_FOUND);
    assert_eq!(wrong.json::<Value>()["error"], "case not found");
}

#[tokio::test]
async fn at_http_02_tracking_code_input_is_normalized() {
    let server = server(default_runtime());
    let created: Value = server
        .post("/api/create-case")
        .json(&json!({"contactPhone": "(404) 555-0199", "tenantId": "t1"}))
        .await
        .json();
    let code = created["tracking"]["tracking_code"].as_str().unwrap();
    let typed = format!(" {}-{} ", &code[..4].to_ascii_lowercase(), &code[4..]);

    let tracked = server
        .post("/api/track-case")
        .json(&json!({"trackingCode": typed, "phoneLast4": "0199"}))
        .await;
    assert_eq!(tracked.status_code(), StatusCode::OK);
}

#[tokio::test]
async fn at_http_03_case_routes_reject_bad_input() {
    let server = server(default_runtime());

    for body in [
        json!({"tenantId": "t1"}),
        json!({"tenantId": "t1", "contactPhone": "55-1"}),
        json!({"contactPhone": "404-555-0199"}),
        json!({"tenantId": "t1", "contactPhone": "404-555-0199", "contactEmail": "jane@"}),
    ] {
        let response = server.post("/api/create-case").json(&body).await;
        assert_eq!(response.status_code(), StatusCode::BAD_REQUEST, "{body}");
        assert!(response.json::<Value>()["error"].is_string());
    }

    for body in [
        json!({"phoneLast4": "0199"}),
        json!({"trackingCode": "ABCD2345"}),
        json!({"trackingCode": "ABCD2345", "phoneLast4": "19"}),
    ] {
        let response = server.post("/api/track-case").json(&body).await;
        assert_eq!(response.status_code(), StatusCode::BAD_REQUEST, "{body}");
    }

    let malformed = server.post("/api/create-case").text("{oops").await;
    assert_eq!(malformed.status_code(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn at_http_04_non_post_methods_are_405_with_error_body() {
    let server = server(default_runtime());
    for path in ["/api/create-case", "/api/track-case", "/api/ticket-analysis"] {
        let response = server.get(path).await;
        assert_eq!(response.status_code(), StatusCode::METHOD_NOT_ALLOWED, "{path}");
        assert_eq!(response.json::<Value>()["error"], "method not allowed");
    }
    let response = server.put("/api/create-case").json(&json!({})).await;
    assert_eq!(response.status_code(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn at_http_05_healthz_reports_configuration() {
    let server = server(runtime_with(
        vision_fixture(TICKET_TEXT),
        GeminiClient::new(GeminiConfig::new(None)),
        DEFAULT_MAX_IMAGE_BYTES,
    ));
    let health: Value = server.get("/healthz").await.json();
    assert_eq!(
        health,
        json!({
            "status": "ok",
            "store": "memory",
            "ocrConfigured": true,
            "aiConfigured": false,
            "verifierConfigured": true
        })
    );
}

#[tokio::test]
async fn at_http_06_analysis_from_raw_text_falls_back_without_ai_key() {
    let server = server(default_runtime());
    let response = server
        .post("/api/ticket-analysis")
        .json(&json!({"rawText": TICKET_TEXT}))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["parsed"]["driver"]["name"], "JANE ROE");
    assert_eq!(body["parsed"]["violation"]["speed"], "78");
    assert_eq!(body["ai"]["source"], "local");
    assert_eq!(body["ai"]["confidence"], 100);
    assert_eq!(body["aiMeta"]["requested"], true);
    assert_eq!(body["aiMeta"]["used"], false);
    assert_eq!(
        body["aiMeta"]["fallbackReason"],
        "provider=gemini error=missing_api_key"
    );
    assert_eq!(body["ticketImage"]["kind"], "none");
}

#[tokio::test]
async fn at_http_07_analysis_from_image_with_ai_and_web_sources() {
    let server = server(runtime_with(
        vision_fixture(TICKET_TEXT),
        gemini_fixture(
            r#"```json
{"summary":"Contest the radar reading.","strategies":[{"title":"Ask for the radar calibration log","detail":"Request it in discovery."}],"flags":["radar check"]}
```"#,
        ),
        DEFAULT_MAX_IMAGE_BYTES,
    ));
    let jpeg = [0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F'];
    let response = server
        .post("/api/ticket-analysis")
        .json(&json!({
            "imageBase64": format!("data:image/jpeg;base64,{}", BASE64.encode(jpeg)),
            "useWebSources": true
        }))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["ticketImage"]["kind"], "inline");
    assert_eq!(body["ticketImage"]["mimeType"], "image/jpeg");
    assert_eq!(body["ticketImage"]["byteLen"], 10);
    assert_eq!(body["ai"]["source"], "merged");
    assert_eq!(body["ai"]["summary"], "Contest the radar reading.");
    assert_eq!(
        body["ai"]["strategies"][0]["title"],
        "Ask for the radar calibration log"
    );
    assert_eq!(body["aiMeta"]["used"], true);
    assert_eq!(body["aiMeta"]["webSources"], true);
    assert_eq!(
        body["aiMeta"]["sources"][0]["url"],
        "https://dds.georgia.gov/super-speeder"
    );
    let flags: Vec<&str> = body["ai"]["flags"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(Value::as_str)
        .collect();
    assert!(flags.contains(&"RADAR_CHECK"));
    assert!(flags.contains(&"HIGH_SPEED_OVER_LIMIT"));
}

#[tokio::test]
async fn at_http_08_analysis_error_statuses() {
    let server = server(runtime_with(
        vision_fixture("blurry"),
        GeminiClient::new(GeminiConfig::new(None)),
        1024,
    ));

    let missing = server.post("/api/ticket-analysis").json(&json!({})).await;
    assert_eq!(missing.status_code(), StatusCode::BAD_REQUEST);

    let bad_url = server
        .post("/api/ticket-analysis")
        .json(&json!({"imageUrl": "file:///etc/passwd"}))
        .await;
    assert_eq!(bad_url.status_code(), StatusCode::BAD_REQUEST);

    let unreadable = server
        .post("/api/ticket-analysis")
        .json(&json!({"imageUrl": "https://example.com/ticket.jpg"}))
        .await;
    assert_eq!(unreadable.status_code(), StatusCode::UNPROCESSABLE_ENTITY);

    let big_image = server
        .post("/api/ticket-analysis")
        .json(&json!({"imageBase64": BASE64.encode(vec![0u8; 4096])}))
        .await;
    assert_eq!(big_image.status_code(), StatusCode::PAYLOAD_TOO_LARGE);

    let oversized_body = server
        .post("/api/ticket-analysis")
        .json(&json!({"rawText": "A".repeat(80_000)}))
        .await;
    assert_eq!(oversized_body.status_code(), StatusCode::PAYLOAD_TOO_LARGE);
    assert!(oversized_body.json::<Value>()["error"].is_string());
}

#[tokio::test]
async fn at_http_09_ocr_without_key_is_500() {
    let server = server(default_runtime());
    let response = server
        .post("/api/ticket-analysis")
        .json(&json!({"imageUrl": "https://example.com/ticket.jpg"}))
        .await;
    assert_eq!(response.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        response.json::<Value>()["error"],
        "text recognition is unavailable"
    );
}

#[tokio::test]
async fn at_http_10_cors_only_on_ticket_analysis() {
    let server = server(default_runtime());
    let preflight = server
        .method(Method::OPTIONS, "/api/ticket-analysis")
        .add_header(
            HeaderName::from_static("origin"),
            HeaderValue::from_static("https://app.example.com"),
        )
        .add_header(
            HeaderName::from_static("access-control-request-method"),
            HeaderValue::from_static("POST"),
        )
        .await;
    assert_eq!(preflight.status_code(), StatusCode::OK);
    assert_eq!(
        preflight.headers().get("access-control-allow-origin"),
        Some(&HeaderValue::from_static("*"))
    );

    let analysis = server
        .post("/api/ticket-analysis")
        .add_header(
            HeaderName::from_static("origin"),
            HeaderValue::from_static("https://app.example.com"),
        )
        .json(&json!({"rawText": TICKET_TEXT, "useAi": false}))
        .await;
    assert!(analysis.headers().get("access-control-allow-origin").is_some());

    let create = server
        .post("/api/create-case")
        .add_header(
            HeaderName::from_static("origin"),
            HeaderValue::from_static("https://app.example.com"),
        )
        .json(&json!({"contactPhone": "404-555-0199", "tenantId": "t1"}))
        .await;
    assert_eq!(create.status_code(), StatusCode::OK);
    assert!(create.headers().get("access-control-allow-origin").is_none());
}
