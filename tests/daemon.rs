use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tempfile::{tempdir, TempDir};
use tower::ServiceExt;

use projecthub::daemon::{build_router, AppState};
use projecthub::db::Database;

const TOKEN: &str = "test-token";

async fn make_app(token: Option<&str>) -> (TempDir, Router) {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("hub.db");
    let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
    (dir, build_router(AppState::new(db, token)))
}

fn request(method: &str, uri: &str, actor: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("authorization", format!("Bearer {TOKEN}"));
    if let Some(actor) = actor {
        builder = builder.header("x-user-id", actor);
    }
    match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn create_project(app: &Router, owner: &str, name: &str) -> String {
    let (status, body) = send(
        app,
        request("POST", "/projects", Some(owner), Some(json!({"name": name}))),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    body["data"]["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn daemon_health_and_auth() {
    let (_dir, app) = make_app(Some(TOKEN)).await;

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["data"]["status"], "ok");

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/projects")
                .header("x-user-id", "owner")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let (status, body) = send(&app, request("GET", "/projects", None, None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["message"].is_string());

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/projects")
                .header("x-api-key", TOKEN)
                .header("x-user-id", "owner")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn token_is_optional_when_unconfigured() {
    let (_dir, app) = make_app(None).await;
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/projects")
                .header("x-user-id", "owner")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn project_crud_and_permissions() {
    let (_dir, app) = make_app(Some(TOKEN)).await;
    let project_id = create_project(&app, "owner", "Clinic annex").await;

    let (status, body) = send(&app, request("GET", "/projects", Some("owner"), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let (status, body) = send(
        &app,
        request(
            "PATCH",
            &format!("/projects/{project_id}"),
            Some("owner"),
            Some(json!({"progress": 150})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("progress"));

    let (status, body) = send(
        &app,
        request(
            "PATCH",
            &format!("/projects/{project_id}"),
            Some("owner"),
            Some(json!({"status": "In Progress", "stageDeadlines": {"planning": "2026-11-02"}})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "In Progress");
    assert_eq!(body["data"]["stage_deadlines"]["planning"], "2026-11-02");

    let (status, _) = send(
        &app,
        request(
            "POST",
            &format!("/projects/{project_id}/members"),
            Some("owner"),
            Some(json!({"userId": "mia"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = send(
        &app,
        request(
            "DELETE",
            &format!("/projects/{project_id}/members/owner"),
            Some("owner"),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        request("DELETE", &format!("/projects/{project_id}"), Some("mia"), None),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(
        &app,
        request("DELETE", &format!("/projects/{project_id}"), Some("owner"), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["deleted"], true);

    let (status, _) = send(
        &app,
        request("GET", &format!("/projects/{project_id}"), Some("owner"), None),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn stage_approval_endpoints() {
    let (_dir, app) = make_app(Some(TOKEN)).await;
    let project_id = create_project(&app, "owner", "Depot").await;

    let (status, _) = send(
        &app,
        request("GET", "/project-stage-approvals", Some("owner"), None),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        request(
            "POST",
            "/project-stage-approvals",
            Some("owner"),
            Some(json!({"projectId": project_id, "stageId": "handover"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    for stage in ["initiation", "planning", "execution", "monitoring", "closure"] {
        let (status, body) = send(
            &app,
            request(
                "PATCH",
                &format!("/project-stage-approvals/{stage}"),
                Some("owner"),
                Some(json!({"projectId": project_id, "status": "Approved"})),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["approval"]["stage_id"], stage);
    }

    let (status, body) = send(
        &app,
        request(
            "GET",
            &format!("/project-stage-approvals?projectId={project_id}"),
            Some("owner"),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["completed"], true);

    let (_, body) = send(
        &app,
        request("GET", &format!("/projects/{project_id}"), Some("owner"), None),
    )
    .await;
    assert_eq!(body["data"]["status"], "Completed");
    assert_eq!(body["data"]["progress"], 100);
}

#[tokio::test]
async fn blocker_endpoints_and_notifications() {
    let (_dir, app) = make_app(Some(TOKEN)).await;
    let project_id = create_project(&app, "owner", "Warehouse").await;

    let (status, body) = send(
        &app,
        request(
            "POST",
            "/tasks",
            Some("owner"),
            Some(json!({"projectId": project_id, "title": "Pour slab", "priority": "high"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["priority"], "High");
    let task_id = body["data"]["id"].as_str().unwrap().to_string();

    let (status, body) = send(
        &app,
        request(
            "POST",
            "/blockers",
            Some("rita"),
            Some(json!({"taskId": task_id, "reason": "rain"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let blocker_id = body["data"]["id"].as_str().unwrap().to_string();

    let (status, body) = send(
        &app,
        request(
            "PATCH",
            &format!("/blockers/{blocker_id}"),
            Some("owner"),
            Some(json!({"status": "Closed"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "Closed");

    let (status, body) = send(
        &app,
        request(
            "PATCH",
            &format!("/blockers/{blocker_id}"),
            Some("owner"),
            Some(json!({"status": "Resolved"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["message"].is_string());

    let (status, body) = send(
        &app,
        request("GET", "/notifications?unreadOnly=true", Some("rita"), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["unread_count"], 1);
    let notifications = body["data"]["notifications"].as_array().unwrap();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0]["type"], "blocker_closed");
    let notification_id = notifications[0]["id"].as_str().unwrap().to_string();

    let (status, _) = send(
        &app,
        request(
            "POST",
            &format!("/notifications/{notification_id}/read"),
            Some("someone-else"),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        &app,
        request(
            "POST",
            &format!("/notifications/{notification_id}/read"),
            Some("rita"),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = send(
        &app,
        request("GET", "/notifications?unreadOnly=true", Some("rita"), None),
    )
    .await;
    assert_eq!(body["data"]["unread_count"], 0);
}

#[tokio::test]
async fn profile_upsert_and_me() {
    let (_dir, app) = make_app(Some(TOKEN)).await;

    let (status, _) = send(
        &app,
        request(
            "PUT",
            "/profiles/ana",
            Some("bob"),
            Some(json!({"fullName": "Ana"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(
        &app,
        request(
            "PUT",
            "/profiles/ana",
            Some("ana"),
            Some(json!({"fullName": "Ana Lima", "role": "engineer"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["full_name"], "Ana Lima");

    let (status, body) = send(&app, request("GET", "/profiles/me", Some("ana"), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["role"], "engineer");

    let (status, _) = send(&app, request("GET", "/profiles/nobody", Some("ana"), None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn malformed_input_uses_message_envelope() {
    let (_dir, app) = make_app(Some(TOKEN)).await;

    let (status, body) = send(
        &app,
        request(
            "PATCH",
            "/project-stage-approvals/planning",
            Some("owner"),
            Some(json!({"status": "Approved"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let message = body["message"].as_str().unwrap();
    assert!(message.contains("projectId"), "{message}");

    let (status, body) = send(
        &app,
        request("GET", "/notifications?limit=lots", Some("owner"), None),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].is_string());

    let (status, body) = send(
        &app,
        request("POST", "/projects", Some("owner"), None),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].is_string());
}
