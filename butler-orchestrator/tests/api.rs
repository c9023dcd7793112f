use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use butler_core::domain::file::NewFile;
use butler_core::domain::run::Owner;
use butler_engine::config::{EngineConfig, StorageLayout};
use butler_engine::db;
use butler_engine::repository::file_repository;
use butler_orchestrator::{AppState, api};
use serde_json::{Value, json};
use tempfile::TempDir;
use tower::ServiceExt;

struct TestApp {
    _dir: TempDir,
    router: Router,
    file_id: i64,
}

async fn setup() -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let config = EngineConfig {
        database_url: format!("sqlite://{}", dir.path().join("catalog.db").display()),
        layout: StorageLayout::rooted_at(dir.path()),
        ..EngineConfig::default()
    };

    let pipeline_dir = config.layout.pipelines_folder.join("align");
    std::fs::create_dir_all(&pipeline_dir).unwrap();
    std::fs::write(
        pipeline_dir.join("align.json"),
        serde_json::to_vec(&json!({
            "uid": "align",
            "filename": "align.sh",
            "name": "Align reads",
            "executor": "sh",
            "command": "$input $output",
            "inputs": [{"name": "input", "type": "file", "required": true}],
            "outputs": [{"name": "output", "value": "result.txt"}]
        }))
        .unwrap(),
    )
    .unwrap();
    std::fs::create_dir_all(&config.layout.plots_folder).unwrap();

    let pool = db::create_pool(&config.database_url).await.unwrap();
    db::run_migrations(&pool).await.unwrap();

    let mut conn = pool.acquire().await.unwrap();
    let file = file_repository::insert(
        &mut conn,
        &NewFile {
            owner: Owner::user(1, "alice"),
            name: "a.txt".to_string(),
            path: "a.txt".to_string(),
            size_in_bytes: 4,
            mime_type: "text/plain".to_string(),
            file_format: "txt".to_string(),
            file_format_full: "ASCII text".to_string(),
            is_upload: true,
        },
    )
    .await
    .unwrap();
    drop(conn);

    TestApp {
        router: api::create_router(AppState::new(pool, &config)),
        file_id: file.id,
        _dir: dir,
    }
}

async fn send(app: &TestApp, request: Request<Body>) -> (StatusCode, Option<String>, Value) {
    let response = app.router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let location = response
        .headers()
        .get(header::LOCATION)
        .map(|v| v.to_str().unwrap().to_string());
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, location, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn submission(file_id: &str) -> Value {
    json!({
        "owner": {"kind": "user", "id": 1, "storage_key": "alice"},
        "pipeline_uid": "align",
        "parameters": [{"name": "input", "value": file_id}]
    })
}

#[tokio::test]
async fn test_health_check() {
    let app = setup().await;
    let response = app.router.clone().oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_definition_endpoints() {
    let app = setup().await;

    let (status, _, body) = send(&app, get("/pipelines")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["uid"], "align");

    let (status, _, body) = send(&app, get("/pipelines/align")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["kind"], "pipeline");
    assert_eq!(body["checksum"].as_str().unwrap().len(), 64);

    let (status, _, body) = send(&app, get("/pipelines/nope")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("nope"));

    let (status, _, body) = send(&app, get("/plots")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));
}

#[tokio::test]
async fn test_submit_and_poll_analysis() {
    let app = setup().await;

    let (status, location, run) = send(
        &app,
        post_json("/analyses", submission(&app.file_id.to_string())),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(run["state"], "PENDING");
    assert_eq!(run["kind"], "analysis");

    let location = location.unwrap();
    assert!(location.starts_with("/taskstatus/"));
    let (status, _, task) = send(&app, get(&location)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(task["state"], "QUEUED");

    let run_id = run["id"].as_i64().unwrap();
    let (status, _, body) = send(&app, get(&format!("/runs/{run_id}/status"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"run_id": run_id, "state": "PENDING"}));

    let (_, _, inputs) = send(&app, get(&format!("/runs/{run_id}/input_files"))).await;
    assert_eq!(inputs[0]["field_name"], "input");
    assert_eq!(inputs[0]["path"], "a.txt");

    let (_, _, outputs) = send(&app, get(&format!("/runs/{run_id}/output_files"))).await;
    assert_eq!(outputs, json!([]));

    let (status, _, runs) = send(&app, get("/runs?owner_kind=user&owner_id=1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(runs.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_rejected_submission_is_bad_request() {
    let app = setup().await;

    let (status, location, body) = send(&app, post_json("/analyses", submission("12345"))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(location.is_none());
    assert!(body["error"].as_str().unwrap().contains("12345"));

    let (status, _, _) = send(&app, post_json("/visualizations", submission("1"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _, _) = send(&app, get("/runs?owner_kind=robot&owner_id=1")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_delete_run() {
    let app = setup().await;
    let (_, _, run) = send(
        &app,
        post_json("/analyses", submission(&app.file_id.to_string())),
    )
    .await;
    let run_id = run["id"].as_i64().unwrap();

    let request = Request::builder()
        .method("DELETE")
        .uri(format!("/runs/{run_id}"))
        .body(Body::empty())
        .unwrap();
    let (status, _, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _, _) = send(&app, get(&format!("/runs/{run_id}"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
