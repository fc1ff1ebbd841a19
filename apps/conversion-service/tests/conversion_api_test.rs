//! コンバージョン API 統合テスト
//!
//! インメモリの永続化と標準の 6 ステップで Router を組み立て、
//! HTTP 経由でコンバージョンのライフサイクル全体を検証する。
//!
//! ## テストケース
//!
//! - 全ステップ成功で顧客 ID が確定する
//! - テリトリーのない地域のリードは assign-territory で失敗する
//! - 顧客作成後のステップで失敗しても、リトライで完了まで進められる
//! - 失敗したレコードのリトライで未開始に戻る
//! - ステータスで絞り込んだ一覧
//! - 同じリードの二重作成、実行中の二重実行、終端状態の実行が拒否される
//! - キャンセルしたレコードを再開できる
//! - 実行中の進捗を SSE で購読できる

use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode},
};
use chrono::{DateTime, Utc};
use leadconv_conversion_service::{
    config::ExecutionConfig,
    handler::{ConversionAppState, LeadAppState, router},
    usecase::{
        ConversionUseCaseImpl,
        LeadUseCaseImpl,
        NotificationService,
        StepDependencies,
        StepPipeline,
        TemplateRenderer,
    },
};
use leadconv_domain::{
    clock::FixedClock,
    conversion::ConversionId,
    lead::{Lead, LeadId, LeadStatus, NewLead},
    notification::{EmailMessage, NotificationError},
    value_objects::TerritoryManagerId,
};
use leadconv_infra::{
    InMemoryOnboardingInitializer,
    InMemoryTerritoryDirectory,
    NoopNotificationSender,
    NotificationSender,
    repository::{InMemoryConversionRepository, InMemoryCustomerRepository, InMemoryLeadRepository},
};
use pretty_assertions::assert_eq;
use serde_json::{Value as JsonValue, json};
use tower::ServiceExt;
use uuid::Uuid;

// --- テストヘルパー ---

fn fixed_now() -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000, 0).unwrap()
}

fn lead(id: &str, company: &str, region: &str, assigned_to: &str) -> Lead {
    Lead::new(NewLead {
        id: LeadId::new(id).unwrap(),
        company_name: company.to_string(),
        contact_name: "Dana Whitfield".to_string(),
        email: format!("contact@{}.example.com", id.to_lowercase()),
        phone: None,
        region: region.to_string(),
        status: LeadStatus::Qualified,
        assigned_to: TerritoryManagerId::new(assigned_to).unwrap(),
        created_at: fixed_now(),
    })
}

/// テスト用のリード
///
/// - L1, L2, L3: 全ステップ成功
/// - LZ: テリトリーのない地域（assign-territory で失敗）
fn seed_leads() -> Vec<Lead> {
    vec![
        lead("L1", "Arctic Air Mechanical", "TX", "tm-001"),
        lead("L2", "Pacific Climate Systems", "CA", "tm-003"),
        lead("L3", "Great Lakes Heating", "OH", "tm-005"),
        lead("LZ", "Yukon Ventilation", "ZZ", "tm-001"),
    ]
}

struct TestApp {
    router:     Router,
    conversion: Arc<ConversionAppState>,
}

/// 最初の `failures` 回だけ送信に失敗する送信者
struct FlakySender {
    failures: usize,
    attempts: AtomicUsize,
}

#[async_trait]
impl NotificationSender for FlakySender {
    async fn send_email(&self, _email: &EmailMessage) -> Result<(), NotificationError> {
        if self.attempts.fetch_add(1, Ordering::SeqCst) < self.failures {
            return Err(NotificationError::SendFailed("smtp down".to_string()));
        }
        Ok(())
    }
}

fn create_test_app(settings: ExecutionConfig) -> TestApp {
    create_test_app_with_sender(settings, Arc::new(NoopNotificationSender))
}

fn create_test_app_with_sender(
    settings: ExecutionConfig,
    sender: Arc<dyn NotificationSender>,
) -> TestApp {
    let clock = Arc::new(FixedClock::new(fixed_now()));
    let leads = Arc::new(InMemoryLeadRepository::with_leads(seed_leads()));
    let notifications = Arc::new(NotificationService::new(
        sender,
        TemplateRenderer::new().unwrap(),
        "http://localhost:5173".to_string(),
        "sales-team@example.com".to_string(),
    ));
    let pipeline = StepPipeline::standard(StepDependencies {
        customers: Arc::new(InMemoryCustomerRepository::new()),
        territories: Arc::new(InMemoryTerritoryDirectory::seeded().unwrap()),
        onboarding: Arc::new(InMemoryOnboardingInitializer::new()),
        notifications,
        clock: clock.clone(),
    });

    let conversion = Arc::new(ConversionAppState {
        usecase: ConversionUseCaseImpl::new(
            Arc::new(InMemoryConversionRepository::new()),
            leads.clone(),
            pipeline,
            clock.clone(),
            settings,
        ),
    });
    let lead_state = Arc::new(LeadAppState {
        usecase: LeadUseCaseImpl::new(leads, clock),
    });

    TestApp {
        router: router(conversion.clone(), lead_state),
        conversion,
    }
}

/// レスポンスボディを JSON として解析する
async fn parse_body(response: axum::http::Response<Body>) -> JsonValue {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

async fn send(app: &TestApp, method: Method, uri: &str, body: Option<JsonValue>) -> (StatusCode, JsonValue) {
    let request = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => request
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = app.router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    (status, parse_body(response).await)
}

fn conversion_id(data: &JsonValue) -> ConversionId {
    ConversionId::from_uuid(Uuid::parse_str(data["id"].as_str().unwrap()).unwrap())
}

/// バックグラウンド実行の終了を待つ
async fn wait_until_idle(app: &TestApp, id: &ConversionId) {
    for _ in 0..500 {
        if !app.conversion.usecase.is_running(id) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("コンバージョン {id} の実行が終わらない");
}

/// コンバージョンを作成して実行の終了を待ち、最新のレコードを返す
async fn convert(app: &TestApp, lead_id: &str) -> JsonValue {
    let (status, body) = send(
        app,
        Method::POST,
        "/conversions",
        Some(json!({ "leadId": lead_id })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");

    let id = conversion_id(&body["data"]);
    wait_until_idle(app, &id).await;
    get_record(app, &id).await
}

async fn get_record(app: &TestApp, id: &ConversionId) -> JsonValue {
    let (status, body) = send(app, Method::GET, &format!("/conversions/{id}"), None).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_index_matches_completed_steps(&body["data"]);
    body["data"].clone()
}

fn step_statuses(record: &JsonValue) -> Vec<String> {
    record["steps"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["status"].as_str().unwrap().to_string())
        .collect()
}

fn assert_index_matches_completed_steps(record: &JsonValue) {
    let completed = step_statuses(record)
        .iter()
        .filter(|s| *s == "completed")
        .count();
    assert_eq!(record["currentStepIndex"], json!(completed));
}

// --- テストケース ---

#[tokio::test]
async fn test_作成直後のレコードは未開始で全ステップ未着手() {
    let app = create_test_app(ExecutionConfig::default());

    let (status, body) = send(
        &app,
        Method::POST,
        "/conversions",
        Some(json!({ "leadId": "L1" })),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    let data = &body["data"];
    assert_eq!(data["leadId"], "L1");
    assert_eq!(data["status"], "not_started");
    assert_eq!(data["currentStepIndex"], 0);
    assert_eq!(data["totalSteps"], 6);
    assert_eq!(data["assignedTo"], "tm-001");
    assert_eq!(data["validationErrors"], json!([]));
    assert_eq!(step_statuses(data), vec!["pending"; 6]);
}

#[tokio::test]
async fn test_全ステップ成功で完了し顧客idが確定する() {
    let app = create_test_app(ExecutionConfig::default());

    let record = convert(&app, "L1").await;

    assert_eq!(record["status"], "completed");
    assert_eq!(record["currentStepIndex"], 6);
    assert_eq!(record["customerId"], "customer-L1");
    assert_eq!(record["completedAt"], json!(fixed_now()));
    assert_eq!(record["validationErrors"], json!([]));
    assert_eq!(step_statuses(&record), vec!["completed"; 6]);
}

#[tokio::test]
async fn test_テリトリーのない地域はassign_territoryで失敗する() {
    let app = create_test_app(ExecutionConfig::default());

    let record = convert(&app, "LZ").await;

    assert_eq!(record["status"], "failed");
    assert_eq!(record["currentStepIndex"], 2);
    assert_eq!(record["validationErrors"], json!(["No territory found"]));
    assert_eq!(record["customerId"], JsonValue::Null);
    assert_eq!(record["completedAt"], JsonValue::Null);
    assert_eq!(
        step_statuses(&record),
        vec!["completed", "completed", "failed", "pending", "pending", "pending"]
    );
    assert_eq!(record["steps"][2]["stepId"], "assign-territory");
    assert_eq!(record["steps"][2]["errorMessage"], "No territory found");
}

#[tokio::test]
async fn test_失敗したレコードのリトライで未開始に戻る() {
    let app = create_test_app(ExecutionConfig::default());
    let failed = convert(&app, "LZ").await;
    let id = conversion_id(&failed);

    let (status, body) = send(&app, Method::POST, &format!("/conversions/{id}/retry"), None).await;

    assert_eq!(status, StatusCode::OK);
    let data = &body["data"];
    assert_eq!(data["id"], failed["id"]);
    assert_eq!(data["status"], "not_started");
    assert_eq!(data["currentStepIndex"], 0);
    assert_eq!(data["validationErrors"], json!([]));
    assert_eq!(data["startedAt"], JsonValue::Null);
    assert_eq!(data["completedAt"], JsonValue::Null);
    assert_eq!(step_statuses(data), vec!["pending"; 6]);
    assert!(
        data["steps"]
            .as_array()
            .unwrap()
            .iter()
            .all(|s| s["errorMessage"].is_null())
    );
}

#[tokio::test]
async fn test_失敗以外のリトライは409でレコードは変わらない() {
    let app = create_test_app(ExecutionConfig::default());
    let completed = convert(&app, "L1").await;
    let id = conversion_id(&completed);

    let (status, body) = send(&app, Method::POST, &format!("/conversions/{id}/retry"), None).await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["status"], 409);
    assert_eq!(get_record(&app, &id).await, completed);
}

#[tokio::test]
async fn test_リトライ後に再実行できる() {
    let app = create_test_app(ExecutionConfig::default());
    let failed = convert(&app, "LZ").await;
    let id = conversion_id(&failed);
    send(&app, Method::POST, &format!("/conversions/{id}/retry"), None).await;

    let (status, body) = send(&app, Method::POST, &format!("/conversions/{id}/execute"), None).await;
    wait_until_idle(&app, &id).await;

    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["data"]["status"], "not_started");
    let record = get_record(&app, &id).await;
    assert_eq!(record["status"], "failed");
    assert_eq!(record["validationErrors"], json!(["No territory found"]));
}

#[tokio::test]
async fn test_顧客作成後に失敗したレコードもリトライで完了できる() {
    let app = create_test_app_with_sender(
        ExecutionConfig::default(),
        Arc::new(FlakySender {
            failures: 1,
            attempts: AtomicUsize::new(0),
        }),
    );
    let failed = convert(&app, "L1").await;
    assert_eq!(failed["status"], "failed");
    assert_eq!(failed["currentStepIndex"], 5);
    assert_eq!(
        failed["validationErrors"],
        json!(["Failed to send email: smtp down"])
    );
    let id = conversion_id(&failed);

    let (retry, _) = send(&app, Method::POST, &format!("/conversions/{id}/retry"), None).await;
    let (execute, _) = send(&app, Method::POST, &format!("/conversions/{id}/execute"), None).await;
    wait_until_idle(&app, &id).await;

    assert_eq!(retry, StatusCode::OK);
    assert_eq!(execute, StatusCode::ACCEPTED);
    let record = get_record(&app, &id).await;
    assert_eq!(record["status"], "completed");
    assert_eq!(record["customerId"], "customer-L1");
    assert_eq!(record["validationErrors"], json!([]));
    assert_eq!(step_statuses(&record), vec!["completed"; 6]);
}

#[tokio::test]
async fn test_ステータスで絞り込むと失敗したレコードだけが返る() {
    let app = create_test_app(ExecutionConfig::default());
    convert(&app, "L1").await;
    let failed = convert(&app, "LZ").await;
    convert(&app, "L2").await;

    let (status, body) = send(&app, Method::GET, "/conversions?status=failed", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], json!([failed]));

    let (_, all) = send(&app, Method::GET, "/conversions", None).await;
    let lead_ids: Vec<_> = all["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["leadId"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(lead_ids, vec!["L1", "LZ", "L2"]);
}

#[tokio::test]
async fn test_不明なステータスでの絞り込みは400() {
    let app = create_test_app(ExecutionConfig::default());

    let (status, body) = send(&app, Method::GET, "/conversions?status=archived", None).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["type"], "https://leadconv.example.com/errors/bad-request");
}

#[tokio::test]
async fn test_同じリードの二重作成は409() {
    let app = create_test_app(ExecutionConfig::default());
    convert(&app, "L1").await;

    let (status, _) = send(
        &app,
        Method::POST,
        "/conversions",
        Some(json!({ "leadId": "L1" })),
    )
    .await;

    assert_eq!(status, StatusCode::CONFLICT);
    let (_, all) = send(&app, Method::GET, "/conversions", None).await;
    assert_eq!(all["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_存在しないリードとレコードは404() {
    let app = create_test_app(ExecutionConfig::default());

    let (lead_status, _) = send(
        &app,
        Method::POST,
        "/conversions",
        Some(json!({ "leadId": "L404" })),
    )
    .await;
    let (record_status, body) = send(
        &app,
        Method::GET,
        &format!("/conversions/{}", Uuid::now_v7()),
        None,
    )
    .await;

    assert_eq!(lead_status, StatusCode::NOT_FOUND);
    assert_eq!(record_status, StatusCode::NOT_FOUND);
    assert_eq!(body["title"], "Not Found");
}

#[tokio::test]
async fn test_完了したレコードの実行は409() {
    let app = create_test_app(ExecutionConfig::default());
    let completed = convert(&app, "L1").await;
    let id = conversion_id(&completed);

    let (status, _) = send(&app, Method::POST, &format!("/conversions/{id}/execute"), None).await;

    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_実行中でないレコードのキャンセルは409() {
    let app = create_test_app(ExecutionConfig::default());
    let completed = convert(&app, "L1").await;
    let id = conversion_id(&completed);

    let (status, _) = send(&app, Method::POST, &format!("/conversions/{id}/cancel"), None).await;

    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_実行中の二重実行は拒否されキャンセル後に再開できる() {
    let app = create_test_app(ExecutionConfig {
        step_delay:   Duration::from_millis(100),
        step_timeout: None,
    });
    let (status, body) = send(
        &app,
        Method::POST,
        "/conversions",
        Some(json!({ "leadId": "L3" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = conversion_id(&body["data"]);

    let (second, _) = send(&app, Method::POST, &format!("/conversions/{id}/execute"), None).await;
    let (cancel, _) = send(&app, Method::POST, &format!("/conversions/{id}/cancel"), None).await;
    wait_until_idle(&app, &id).await;

    assert_eq!(second, StatusCode::CONFLICT);
    assert_eq!(cancel, StatusCode::ACCEPTED);
    let paused = get_record(&app, &id).await;
    assert_eq!(paused["status"], "in_progress");
    assert!(paused["currentStepIndex"].as_u64().unwrap() < 6);
    assert_ne!(paused["startedAt"], JsonValue::Null);

    let (resume, _) = send(&app, Method::POST, &format!("/conversions/{id}/execute"), None).await;
    wait_until_idle(&app, &id).await;

    assert_eq!(resume, StatusCode::ACCEPTED);
    let record = get_record(&app, &id).await;
    assert_eq!(record["status"], "completed");
    assert_eq!(record["customerId"], "customer-L3");
}

#[tokio::test]
async fn test_実行中のコンバージョンの進捗をsseで購読できる() {
    let app = create_test_app(ExecutionConfig {
        step_delay:   Duration::from_millis(50),
        step_timeout: None,
    });
    let (_, body) = send(
        &app,
        Method::POST,
        "/conversions",
        Some(json!({ "leadId": "L2" })),
    )
    .await;
    let id = conversion_id(&body["data"]);

    let request = Request::builder()
        .uri(format!("/conversions/{id}/events"))
        .body(Body::empty())
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()["content-type"].to_str().unwrap(),
        "text/event-stream"
    );
    // 実行が終わるとストリームも閉じる
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    let names: Vec<_> = text
        .lines()
        .filter_map(|line| line.strip_prefix("event: "))
        .collect();
    assert_eq!(
        names.iter().filter(|n| **n == "step_completed").count(),
        6
    );
    assert_eq!(names.last(), Some(&"completed"));
    assert!(text.contains("\"customer_id\":\"customer-L2\""));

    wait_until_idle(&app, &id).await;
    let (status, _) = send(&app, Method::GET, &format!("/conversions/{id}/events"), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_ステップカタログはカタログ順に返る() {
    let app = create_test_app(ExecutionConfig::default());

    let (status, body) = send(&app, Method::GET, "/conversion-steps", None).await;

    assert_eq!(status, StatusCode::OK);
    let ids: Vec<_> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["id"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(
        ids,
        vec![
            "validate-lead",
            "check-duplicates",
            "assign-territory",
            "create-customer",
            "setup-onboarding",
            "notify-team",
        ]
    );
    assert_eq!(body["data"][4]["required"], false);
    assert_eq!(body["data"][0]["estimatedDurationMinutes"], 2);
}

#[tokio::test]
async fn test_リードを登録し対象のリードだけを一覧できる() {
    let app = create_test_app(ExecutionConfig::default());

    let (status, body) = send(
        &app,
        Method::POST,
        "/leads",
        Some(json!({
            "id": "L9",
            "companyName": "Summit Air",
            "contactName": "Jo Park",
            "email": "jo@summitair.example.com",
            "region": "NY",
            "status": "new",
            "assignedTo": "tm-004"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["eligible"], false);

    let (_, eligible) = send(&app, Method::GET, "/leads?eligible=true", None).await;
    let (_, all) = send(&app, Method::GET, "/leads", None).await;

    assert_eq!(eligible["data"].as_array().unwrap().len(), 4);
    assert_eq!(all["data"].as_array().unwrap().len(), 5);
}

#[tokio::test]
async fn test_不正なリードステータスは400() {
    let app = create_test_app(ExecutionConfig::default());

    let (status, _) = send(
        &app,
        Method::POST,
        "/leads",
        Some(json!({
            "id": "L9",
            "companyName": "Summit Air",
            "contactName": "Jo Park",
            "email": "jo@summitair.example.com",
            "region": "NY",
            "status": "archived",
            "assignedTo": "tm-004"
        })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_ヘルスチェック() {
    let app = create_test_app(ExecutionConfig::default());

    let (status, body) = send(&app, Method::GET, "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}
