//! 点击与事件摄入接口测试
//!
//! 通过完整的路由配置驱动 /click 与 /event，存储使用临时 SQLite。

use std::sync::{Arc, Mutex, Once};

use actix_web::http::StatusCode;
use actix_web::test::{self, TestRequest};
use actix_web::{App, web};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tempfile::TempDir;

use clicktrail::api::configure_routes;
use clicktrail::config::{DatabaseConfig, StaticConfig, init_config};
use clicktrail::postback::{
    PostbackRequest, PostbackTransport, TransportResponse, TransportResult,
};
use clicktrail::runtime::lifetime::{AppContext, Collaborators};
use clicktrail::services::{GeoResolver, UserAgentParser};
use clicktrail::storage::models::{Click, DeviceInfo, EventType, GeoInfo, Offer};
use clicktrail::storage::{AttributionStore, SeaOrmStorage};

// =============================================================================
// Test Setup
// =============================================================================

static INIT: Once = Once::new();

fn init_static_config() {
    INIT.call_once(|| {
        init_config();
    });
}

struct FixedGeo;

#[async_trait]
impl GeoResolver for FixedGeo {
    async fn lookup(&self, _ip: &str) -> Option<GeoInfo> {
        Some(GeoInfo {
            country_iso: Some("DE".to_string()),
            ..Default::default()
        })
    }

    fn name(&self) -> &'static str {
        "fixed"
    }
}

struct FixedUserAgent;

impl UserAgentParser for FixedUserAgent {
    fn parse(&self, _user_agent: &str) -> DeviceInfo {
        DeviceInfo {
            browser_name: Some("Chrome".to_string()),
            device_type: Some("pc".to_string()),
            ..Default::default()
        }
    }
}

#[derive(Default)]
struct RecordingTransport {
    requests: Mutex<Vec<PostbackRequest>>,
}

#[async_trait]
impl PostbackTransport for RecordingTransport {
    async fn send(&self, request: &PostbackRequest) -> TransportResult {
        self.requests.lock().unwrap().push(request.clone());
        Ok(TransportResponse {
            status: 200,
            body: "OK".to_string(),
        })
    }
}

struct TestEnv {
    _dir: TempDir,
    context: AppContext,
}

async fn setup() -> TestEnv {
    init_static_config();

    let dir = TempDir::new().expect("Failed to create temp dir");
    let db_path = dir.path().join("tracking_test.db");
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let storage = Arc::new(
        SeaOrmStorage::with_config(&db_url, "sqlite", &DatabaseConfig::default())
            .await
            .expect("Failed to create storage"),
    );

    storage
        .upsert_offer(&Offer {
            id: "42".to_string(),
            name: "Offer 42".to_string(),
            landing_url: "https://lp.example.com/offer".to_string(),
            enabled: true,
            created_at: Utc::now(),
        })
        .await
        .expect("Failed to insert offer");

    let collaborators = Collaborators {
        transport: Arc::new(RecordingTransport::default()),
        geo: Arc::new(FixedGeo),
        user_agents: Arc::new(FixedUserAgent),
    };
    let context = AppContext::build(storage, collaborators, &StaticConfig::default());

    TestEnv { _dir: dir, context }
}

macro_rules! app {
    ($ctx:expr) => {{
        let api = StaticConfig::default().api;
        test::init_service(
            App::new()
                .app_data(web::Data::new($ctx.storage.clone()))
                .app_data(web::Data::new($ctx.click_service.clone()))
                .app_data(web::Data::new($ctx.event_service.clone()))
                .app_data(web::Data::new($ctx.delivery_service.clone()))
                .configure(move |cfg| configure_routes(cfg, &api)),
        )
        .await
    }};
}

fn location(resp: &actix_web::dev::ServiceResponse) -> String {
    resp.headers()
        .get("location")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

fn query_value(url: &str, key: &str) -> Option<String> {
    url::Url::parse(url)
        .ok()?
        .query_pairs()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
}

// =============================================================================
// /click
// =============================================================================

#[actix_rt::test]
async fn test_click_redirects_to_offer_landing() {
    let env = setup().await;
    let app = app!(env.context);

    let req = TestRequest::get()
        .uri("/click?offer_id=42&sub1=aff7&sub2=gclid-abc%7Cadset-a1%7Cunknown-x&utm_source=fb")
        .insert_header(("User-Agent", "Mozilla/5.0"))
        .peer_addr("8.8.4.4:40000".parse().unwrap())
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::FOUND);
    assert_eq!(
        resp.headers()
            .get("cache-control")
            .and_then(|v| v.to_str().ok()),
        Some("no-store")
    );

    let location = location(&resp);
    assert!(location.starts_with("https://lp.example.com/offer?"));
    assert_eq!(query_value(&location, "sub1").as_deref(), Some("aff7"));

    let click_id = query_value(&location, "clickid").expect("clickid missing");
    assert_eq!(click_id.len(), 24);

    let stored = env
        .context
        .storage
        .find_click(&click_id)
        .await
        .unwrap()
        .expect("click not persisted");
    assert_eq!(stored.offer_id.as_deref(), Some("42"));
    assert_eq!(stored.utm.source.as_deref(), Some("fb"));
    assert_eq!(stored.sub2_params.len(), 2);
    assert_eq!(stored.sub2_params.get("adset").map(String::as_str), Some("a1"));
    assert_eq!(stored.ip.as_deref(), Some("8.8.4.4"));
    assert_eq!(stored.geo.country_iso.as_deref(), Some("DE"));
    assert_eq!(stored.device.browser_name.as_deref(), Some("Chrome"));
    assert_eq!(
        stored.landing_url.as_deref(),
        Some("https://lp.example.com/offer")
    );
}

#[actix_rt::test]
async fn test_click_reuses_explicit_clickid() {
    let env = setup().await;
    let app = app!(env.context);

    for _ in 0..2 {
        let req = TestRequest::get()
            .uri("/click?offer_id=42&clickid=fixed-123&sub1=first")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FOUND);
        assert_eq!(
            query_value(&location(&resp), "clickid").as_deref(),
            Some("fixed-123")
        );
    }

    // 第二次请求不会覆盖已有点击
    let req = TestRequest::get()
        .uri("/click?offer_id=42&clickid=fixed-123&sub1=second")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(query_value(&location(&resp), "sub1").as_deref(), Some("first"));
}

#[actix_rt::test]
async fn test_click_without_reference_is_rejected() {
    let env = setup().await;
    let app = app!(env.context);

    let req = TestRequest::get()
        .uri("/click?clickid=orphan-1&sub1=x")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["code"], "E005");

    assert!(
        env.context
            .storage
            .find_click("orphan-1")
            .await
            .unwrap()
            .is_none()
    );
}

#[actix_rt::test]
async fn test_click_unknown_offer_is_recorded_without_redirect() {
    let env = setup().await;
    let app = app!(env.context);

    let req = TestRequest::get()
        .uri("/click?offer_id=999&campaign_id=c1")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["status"], "recorded");
    let click_id = body["clickid"].as_str().unwrap().to_string();
    assert!(
        env.context
            .storage
            .find_click(&click_id)
            .await
            .unwrap()
            .is_some()
    );
}

#[actix_rt::test]
async fn test_click_invalid_explicit_clickid() {
    let env = setup().await;
    let app = app!(env.context);

    let req = TestRequest::get()
        .uri("/click?offer_id=42&clickid=bad%20id")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

// =============================================================================
// /event
// =============================================================================

async fn create_click(context: &AppContext) -> String {
    let click = Click {
        click_id: "evt-click-1".to_string(),
        offer_id: Some("42".to_string()),
        created_at: Utc::now(),
        ..Default::default()
    };
    context
        .storage
        .insert_click(click)
        .await
        .expect("Failed to insert click");
    "evt-click-1".to_string()
}

#[actix_rt::test]
async fn test_event_success_then_duplicate() {
    let env = setup().await;
    let app = app!(env.context);
    let click_id = create_click(&env.context).await;

    let payload = serde_json::json!({
        "clickid": click_id,
        "type": "deposit",
        "revenue": 50.0,
        "currency": "usd",
    });

    let req = TestRequest::post()
        .uri("/event")
        .set_json(&payload)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let first: Value = test::read_body_json(resp).await;
    assert_eq!(first["status"], "success");
    assert_eq!(first["type"], "deposit");
    assert_eq!(first["clickid"], "evt-click-1");

    let req = TestRequest::post()
        .uri("/event")
        .set_json(&payload)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let second: Value = test::read_body_json(resp).await;
    assert_eq!(second["status"], "duplicate");
    assert_eq!(second["event_id"], first["event_id"]);

    let event_id = first["event_id"].as_str().unwrap();
    let stored = env
        .context
        .storage
        .find_event(event_id)
        .await
        .unwrap()
        .expect("event not persisted");
    assert_eq!(stored.event_type, EventType::Deposit);
    assert_eq!(stored.currency.as_deref(), Some("USD"));
    assert_eq!(stored.revenue, Some(50.0));
}

#[actix_rt::test]
async fn test_event_distinct_txid_is_new_event() {
    let env = setup().await;
    let app = app!(env.context);
    let click_id = create_click(&env.context).await;

    let mut ids = Vec::new();
    for txid in ["tx-1", "tx-2"] {
        let req = TestRequest::post()
            .uri("/event")
            .set_json(serde_json::json!({
                "clickid": click_id,
                "type": "sale",
                "txid": txid,
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["status"], "success");
        ids.push(body["event_id"].as_str().unwrap().to_string());
    }
    assert_ne!(ids[0], ids[1]);
}

#[actix_rt::test]
async fn test_event_via_query_string() {
    let env = setup().await;
    let app = app!(env.context);
    let click_id = create_click(&env.context).await;

    let req = TestRequest::get()
        .uri(&format!("/event?click_id={}&type=reg", click_id))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["status"], "success");
    assert_eq!(body["type"], "reg");
}

#[actix_rt::test]
async fn test_event_unknown_click_is_not_found() {
    let env = setup().await;
    let app = app!(env.context);

    let req = TestRequest::post()
        .uri("/event")
        .set_json(serde_json::json!({"clickid": "nope123", "type": "lead"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["code"], "E006");
}

#[actix_rt::test]
async fn test_event_validation_errors() {
    let env = setup().await;
    let app = app!(env.context);
    let click_id = create_click(&env.context).await;

    let cases = [
        serde_json::json!({"clickid": click_id, "type": "refund"}),
        serde_json::json!({"clickid": click_id, "type": "sale", "currency": "dollars"}),
        serde_json::json!({"clickid": click_id, "type": "lp_leave", "time_on_page_ms": -5}),
        serde_json::json!({"type": "sale"}),
    ];

    for payload in cases {
        let req = TestRequest::post()
            .uri("/event")
            .set_json(&payload)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(
            resp.status(),
            StatusCode::BAD_REQUEST,
            "payload should be rejected: {}",
            payload
        );
    }
}

#[actix_rt::test]
async fn test_event_malformed_json() {
    let env = setup().await;
    let app = app!(env.context);

    let req = TestRequest::post()
        .uri("/event")
        .insert_header(("Content-Type", "application/json"))
        .set_payload("{not json")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

// =============================================================================
// /health
// =============================================================================

#[actix_rt::test]
async fn test_health_reports_storage_and_queue() {
    let env = setup().await;
    let app = app!(env.context);

    let req = TestRequest::get().uri("/health").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["storage"]["backend"], "sqlite");
    assert_eq!(body["retry_queue"]["pending"], 0);

    let req = TestRequest::get().uri("/health/live").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
}
