//! Integration tests for psv-server API endpoints
//!
//! Tests cover:
//! - Health and survey description endpoints
//! - Full single-image flow: view, submit, summary, export
//! - Rejected submissions report the unchanged view
//! - Stimulus delivery by screen slot
//! - Pair blinding: no file names or ground-truth side in JSON
//! - Reset
//! - Out-of-range indices and malformed bodies

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use psv_common::config::{CatalogMode, JudgmentKindName};
use psv_common::{open_store, Catalog, MatchReference, SurveyConfig, SurveyController};
use psv_server::{build_router, AppState};
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;
use tower::util::ServiceExt; // for `oneshot` method

/// Test helper: Build an app over the given config, rooted in `dir`
async fn setup_app(dir: &TempDir, mut config: SurveyConfig) -> Router {
    config.catalog.image_dir = dir.path().join("images");
    config.store.path = dir.path().join("ratings.csv");
    config.pairing.seed = Some(7);
    config.validate().unwrap();

    let catalog = Catalog::load(&config.catalog).unwrap();
    let store = open_store(&config.store, config.judgment.judgment_kind())
        .await
        .unwrap();
    let controller = SurveyController::from_config(&config, Arc::new(catalog), store);
    build_router(AppState::new(&config, controller))
}

/// Test helper: Single-image survey over a.png, b.png, c.jpg
async fn single_app() -> (TempDir, Router) {
    let dir = TempDir::new().unwrap();
    let images = dir.path().join("images");
    std::fs::create_dir(&images).unwrap();
    std::fs::write(images.join("a.png"), b"image-a").unwrap();
    std::fs::write(images.join("b.png"), b"image-b").unwrap();
    std::fs::write(images.join("c.jpg"), b"image-c").unwrap();

    let app = setup_app(&dir, SurveyConfig::default()).await;
    (dir, app)
}

/// Test helper: Forced-choice survey over two ground-truth/candidate pairs
async fn pair_app() -> (TempDir, Router) {
    let dir = TempDir::new().unwrap();
    let images = dir.path().join("images");
    std::fs::create_dir(&images).unwrap();
    for base in ["scene1", "scene2"] {
        std::fs::write(images.join(format!("{base}_gt.png")), format!("truth-{base}")).unwrap();
        std::fs::write(images.join(format!("{base}_result.png")), format!("cand-{base}"))
            .unwrap();
    }

    let mut config = SurveyConfig::default();
    config.catalog.mode = CatalogMode::Pair;
    config.judgment.kind = JudgmentKindName::ForcedChoice;
    config.scoring.reference = MatchReference::GroundTruth;

    let app = setup_app(&dir, config).await;
    (dir, app)
}

/// Test helper: Create request with optional JSON body
fn test_request(method: &str, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder().method(method).uri(uri);
    match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn extract_bytes(body: Body) -> Vec<u8> {
    axum::body::to_bytes(body, usize::MAX)
        .await
        .expect("Should read body")
        .to_vec()
}

/// Test helper: Extract JSON body from response
async fn extract_json(body: Body) -> Value {
    serde_json::from_slice(&extract_bytes(body).await).expect("Should parse JSON")
}

/// Test helper: Send a request and return status plus JSON body
async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(test_request(method, uri, body))
        .await
        .unwrap();
    let status = response.status();
    (status, extract_json(response.into_body()).await)
}

async fn fetch_bytes(app: &Router, uri: &str) -> (StatusCode, Vec<u8>) {
    let response = app
        .clone()
        .oneshot(test_request("GET", uri, None))
        .await
        .unwrap();
    let status = response.status();
    (status, extract_bytes(response.into_body()).await)
}

// =============================================================================
// Health and survey description
// =============================================================================

#[tokio::test]
async fn test_health_endpoint() {
    let (_dir, app) = single_app().await;

    let (status, body) = call(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "psv-server");
    assert!(body["version"].is_string());
    assert_eq!(body["items"], 3);
    assert_eq!(body["sessions"], 0);
}

#[tokio::test]
async fn test_survey_description() {
    let (_dir, app) = single_app().await;

    let (status, body) = call(&app, "GET", "/api/survey", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["title"], "Image Quality Survey");
    assert_eq!(body["judgment"]["kind"], "score");
    assert_eq!(body["judgment"]["min"], 0);
    assert_eq!(body["judgment"]["max"], 100);
    assert_eq!(body["judgment"]["default"], 50);
    assert_eq!(body["total_items"], 3);
}

#[tokio::test]
async fn test_page_and_script_served() {
    let (_dir, app) = single_app().await;

    let response = app
        .clone()
        .oneshot(test_request("GET", "/", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let html = String::from_utf8(extract_bytes(response.into_body()).await).unwrap();
    assert!(html.contains("/static/app.js"));

    let response = app
        .oneshot(test_request("GET", "/static/app.js", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "application/javascript"
    );
}

// =============================================================================
// Survey flow
// =============================================================================

#[tokio::test]
async fn test_blank_identity_rejected() {
    let (_dir, app) = single_app().await;

    let (status, body) = call(&app, "GET", "/api/participants/%20%20/view", None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["kind"], "invalid_action");
    assert!(body["view"].is_null());
}

#[tokio::test]
async fn test_single_image_flow_to_export() {
    let (_dir, app) = single_app().await;

    let (status, view) = call(&app, "GET", "/api/participants/alice/view", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["state"], "in_progress");
    assert_eq!(view["index"], 0);
    assert_eq!(view["item_id"], "a.png");
    assert_eq!(view["kind"], "single");
    assert_eq!(view["slots"], json!(["image"]));
    assert_eq!(view["progress"], json!({"current": 0, "total": 3}));

    for (index, score) in [(0, 70), (1, 40), (2, 90)] {
        let (status, view) = call(
            &app,
            "POST",
            "/api/participants/alice/submit",
            Some(json!({"index": index, "score": score})),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "submit {index}");
        assert_eq!(view["progress"]["current"], index + 1);
    }

    let (_, view) = call(&app, "GET", "/api/participants/alice/view", None).await;
    assert_eq!(view["state"], "complete");
    assert_eq!(view["progress"], json!({"current": 3, "total": 3}));

    let (status, summary) = call(&app, "GET", "/api/participants/alice/summary", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(summary["total_responses"], 3);
    assert_eq!(summary["matches"], 2);
    assert_eq!(summary["match_percent"], 66.7);
    assert_eq!(summary["reference"], json!({"score_at_least": 50}));

    let response = app
        .clone()
        .oneshot(test_request("GET", "/api/participants/alice/export", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers()[header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("text/csv"));
    assert!(response.headers()[header::CONTENT_DISPOSITION]
        .to_str()
        .unwrap()
        .contains("responses.csv"));

    let csv = String::from_utf8(extract_bytes(response.into_body()).await).unwrap();
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines.len(), 4);
    assert_eq!(lines[0], "user,item,score,recorded_at");
    assert!(lines[1].starts_with("alice,a.png,70,"));
    assert!(lines[3].starts_with("alice,c.jpg,90,"));
}

#[tokio::test]
async fn test_invalid_score_reports_unchanged_view() {
    let (_dir, app) = single_app().await;
    call(&app, "GET", "/api/participants/alice/view", None).await;

    let (status, body) = call(
        &app,
        "POST",
        "/api/participants/alice/submit",
        Some(json!({"index": 0, "score": 150})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["kind"], "validation");
    assert_eq!(body["view"]["state"], "in_progress");
    assert_eq!(body["view"]["index"], 0);

    let (status, body) = call(
        &app,
        "POST",
        "/api/participants/alice/submit",
        Some(json!({"index": 0})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["view"]["index"], 0);
}

#[tokio::test]
async fn test_duplicate_submit_rejected() {
    let (_dir, app) = single_app().await;
    call(&app, "GET", "/api/participants/alice/view", None).await;

    let submission = json!({"index": 0, "score": 60});
    let (status, _) = call(
        &app,
        "POST",
        "/api/participants/alice/submit",
        Some(submission.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = call(
        &app,
        "POST",
        "/api/participants/alice/submit",
        Some(submission),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["kind"], "invalid_action");
    assert_eq!(body["view"]["index"], 1);
}

#[tokio::test]
async fn test_submit_without_session_rejected() {
    let (_dir, app) = single_app().await;

    let (status, body) = call(
        &app,
        "POST",
        "/api/participants/nobody/submit",
        Some(json!({"index": 0, "score": 60})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["view"].is_null());
}

#[tokio::test]
async fn test_export_requires_completion() {
    let (_dir, app) = single_app().await;
    call(&app, "GET", "/api/participants/alice/view", None).await;

    let (status, body) = call(&app, "GET", "/api/participants/alice/export", None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["view"]["state"], "in_progress");
}

#[tokio::test]
async fn test_reset_returns_to_first_item() {
    let (_dir, app) = single_app().await;

    let (status, _) = call(&app, "POST", "/api/participants/alice/reset", None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    call(&app, "GET", "/api/participants/alice/view", None).await;
    call(
        &app,
        "POST",
        "/api/participants/alice/submit",
        Some(json!({"index": 0, "score": 10})),
    )
    .await;

    let (status, view) = call(&app, "POST", "/api/participants/alice/reset", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["index"], 0);
    assert_eq!(view["item_id"], "a.png");

    // Responses from the first pass are kept
    let (_, summary) = call(&app, "GET", "/api/participants/alice/summary", None).await;
    assert_eq!(summary["total_responses"], 1);
}

// =============================================================================
// Stimulus delivery
// =============================================================================

#[tokio::test]
async fn test_image_served_for_item_on_screen() {
    let (_dir, app) = single_app().await;
    call(&app, "GET", "/api/participants/alice/view", None).await;

    let response = app
        .clone()
        .oneshot(test_request(
            "GET",
            "/api/participants/alice/items/0/image",
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
    assert_eq!(extract_bytes(response.into_body()).await, b"image-a");

    // Only the item on screen is reachable
    let (status, _) = fetch_bytes(&app, "/api/participants/alice/items/1/image").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = fetch_bytes(&app, "/api/participants/alice/items/0/left").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = fetch_bytes(&app, "/api/participants/alice/items/0/thumbnail").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_pair_view_is_blinded() {
    let (_dir, app) = pair_app().await;

    let response = app
        .clone()
        .oneshot(test_request("GET", "/api/participants/bob/view", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let raw = String::from_utf8(extract_bytes(response.into_body()).await).unwrap();
    assert!(!raw.contains("_gt"));
    assert!(!raw.contains("_result"));
    assert!(!raw.contains("ground_truth"));

    let view: Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(view["item_id"], "scene1");
    assert_eq!(view["kind"], "pair");
    assert_eq!(view["slots"], json!(["left", "right"]));
}

#[tokio::test]
async fn test_pair_flow_scores_ground_truth_picks() {
    let (_dir, app) = pair_app().await;
    call(&app, "GET", "/api/participants/bob/view", None).await;

    // Pick the ground truth for scene1, the candidate for scene2
    for (index, base, pick_truth) in [(0, "scene1", true), (1, "scene2", false)] {
        let (status, left) =
            fetch_bytes(&app, &format!("/api/participants/bob/items/{index}/left")).await;
        assert_eq!(status, StatusCode::OK);
        let (_, right) =
            fetch_bytes(&app, &format!("/api/participants/bob/items/{index}/right")).await;
        assert_ne!(left, right);

        let truth = format!("truth-{base}").into_bytes();
        assert!(left == truth || right == truth);
        let truth_side = if left == truth { "left" } else { "right" };
        let other_side = if truth_side == "left" { "right" } else { "left" };
        let choice = if pick_truth { truth_side } else { other_side };

        // A re-render keeps the same placement
        let (_, again) =
            fetch_bytes(&app, &format!("/api/participants/bob/items/{index}/left")).await;
        assert_eq!(again, left);

        let (status, _) = call(
            &app,
            "POST",
            "/api/participants/bob/submit",
            Some(json!({"index": index, "choice": choice})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    let (_, summary) = call(&app, "GET", "/api/participants/bob/summary", None).await;
    assert_eq!(summary["total_responses"], 2);
    assert_eq!(summary["matches"], 1);
    assert_eq!(summary["match_percent"], 50.0);

    let (status, bytes) = fetch_bytes(&app, "/api/participants/bob/export").await;
    assert_eq!(status, StatusCode::OK);
    let csv = String::from_utf8(bytes).unwrap();
    assert!(csv.starts_with("user,item,gt_side,choice_side,picked_gt,recorded_at\n"));
    assert_eq!(csv.lines().count(), 3);
}

#[tokio::test]
async fn test_missing_choice_rejected() {
    let (_dir, app) = pair_app().await;
    call(&app, "GET", "/api/participants/bob/view", None).await;

    let (status, body) = call(
        &app,
        "POST",
        "/api/participants/bob/submit",
        Some(json!({"index": 0})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["view"]["index"], 0);
}

#[tokio::test]
async fn test_pair_slot_headers_match_across_extension_spellings() {
    let dir = TempDir::new().unwrap();
    let images = dir.path().join("images");
    std::fs::create_dir(&images).unwrap();
    std::fs::write(images.join("s_gt.jpg"), b"truth").unwrap();
    std::fs::write(images.join("s_result.JPEG"), b"cand").unwrap();
    // Different formats would give the sides away, so this pair is dropped
    std::fs::write(images.join("t_gt.png"), b"truth").unwrap();
    std::fs::write(images.join("t_result.jpg"), b"cand").unwrap();

    let mut config = SurveyConfig::default();
    config.catalog.mode = CatalogMode::Pair;
    config.judgment.kind = JudgmentKindName::ForcedChoice;
    config.scoring.reference = MatchReference::GroundTruth;
    let app = setup_app(&dir, config).await;

    let (_, health) = call(&app, "GET", "/health", None).await;
    assert_eq!(health["items"], 1);

    call(&app, "GET", "/api/participants/bob/view", None).await;
    let mut headers = Vec::new();
    for slot in ["left", "right"] {
        let response = app
            .clone()
            .oneshot(test_request(
                "GET",
                &format!("/api/participants/bob/items/0/{slot}"),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        headers.push(response.headers()[header::CONTENT_TYPE].clone());
    }
    assert_eq!(headers[0], headers[1]);
    assert_eq!(headers[0], "image/jpeg");
}

// =============================================================================
// Hostile input
// =============================================================================

#[tokio::test]
async fn test_huge_index_is_rejected_without_panic() {
    let (_dir, app) = single_app().await;
    call(&app, "GET", "/api/participants/alice/view", None).await;

    let (status, body) = call(
        &app,
        "POST",
        "/api/participants/alice/submit",
        Some(json!({"index": u64::MAX, "score": 10})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["view"]["index"], 0);

    let (status, _) = fetch_bytes(
        &app,
        &format!("/api/participants/alice/items/{}/image", u64::MAX),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // The session still accepts the item on screen
    let (status, _) = call(
        &app,
        "POST",
        "/api/participants/alice/submit",
        Some(json!({"index": 0, "score": 10})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_malformed_submission_body_reports_view() {
    let (_dir, app) = single_app().await;
    call(&app, "GET", "/api/participants/alice/view", None).await;

    for body in [
        json!({"index": 0, "score": "abc"}),
        json!({"index": 0, "score": 2.5}),
        json!({"score": 10}),
    ] {
        let (status, reply) = call(
            &app,
            "POST",
            "/api/participants/alice/submit",
            Some(body.clone()),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY, "{body}");
        assert_eq!(reply["kind"], "validation");
        assert!(reply["error"].is_string());
        assert_eq!(reply["view"]["index"], 0);
    }

    // Not JSON at all
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/participants/alice/submit")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let reply = extract_json(response.into_body()).await;
    assert_eq!(reply["view"]["state"], "in_progress");
}
