use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode},
};
use serde_json::{Value, json};
use std::collections::BTreeSet;
use tower::ServiceExt;

use credtrack::db::Storage;
use credtrack::domain::validation::UserInput;
use credtrack::server::{AppState, app_router};
use credtrack::service::UserService;

struct TestApp {
    app: Router,
    admin_id: i64,
    admin_token: String,
    viewer_token: String,
    holder_id: i64,
}

async fn create_user(users: &UserService, name: &str, roles: &[&str]) -> (i64, String) {
    let input = UserInput {
        name: Some(name.to_string()),
        full_name: Some(format!("{name} Full Name")),
        email: Some(format!("{name}@example.org")),
        rank_id: None,
        office_id: None,
    };
    let roles: BTreeSet<String> = roles.iter().map(|r| r.to_string()).collect();
    let created = users
        .create(input, &roles)
        .await
        .expect("failed to create user");
    (created.user.id, created.token)
}

async fn setup() -> TestApp {
    let storage = Storage::connect("sqlite::memory:")
        .await
        .expect("failed to open in-memory database");
    let users = UserService::new(storage.clone());
    let (admin_id, admin_token) = create_user(&users, "admin", &["super_admin"]).await;
    let (_, viewer_token) = create_user(&users, "viewer", &["viewer"]).await;
    let (holder_id, _) = create_user(&users, "holder", &[]).await;

    TestApp {
        app: app_router(AppState::new(storage)),
        admin_id,
        admin_token,
        viewer_token,
        holder_id,
    }
}

async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    let body = match body {
        Some(v) => {
            builder = builder.header("content-type", "application/json");
            Body::from(v.to_string())
        }
        None => Body::empty(),
    };

    let resp = app
        .clone()
        .oneshot(builder.body(body).expect("failed to build request"))
        .await
        .expect("request failed");
    let status = resp.status();
    let bytes = to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("failed to read response body");
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("response body was not json")
    };
    (status, json)
}

#[tokio::test]
async fn health_is_public() {
    let t = setup().await;
    let (status, body) = send(&t.app, "GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "ok"}));
}

#[tokio::test]
async fn requests_without_valid_token_are_rejected() {
    let t = setup().await;

    let (status, body) = send(&t.app, "GET", "/api/credentials", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");

    let forged = format!("{}|not-the-secret", t.admin_id);
    let (status, _) = send(&t.app, "GET", "/api/credentials", Some(&forged), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&t.app, "GET", "/api/credentials", Some("garbage"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn me_reports_roles() {
    let t = setup().await;
    let (status, body) = send(&t.app, "GET", "/api/me", Some(&t.viewer_token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "viewer");
    assert_eq!(body["roles"], json!(["viewer"]));
}

#[tokio::test]
async fn viewer_can_read_but_not_write() {
    let t = setup().await;

    let (status, _) = send(&t.app, "GET", "/api/credentials", Some(&t.viewer_token), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(
        &t.app,
        "POST",
        "/api/credentials",
        Some(&t.viewer_token),
        Some(json!({"user_id": t.holder_id, "type": "CRED", "secrecy": "R"})),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "FORBIDDEN");
}

#[tokio::test]
async fn create_computes_validity_and_status() {
    let t = setup().await;

    let (status, body) = send(
        &t.app,
        "POST",
        "/api/credentials",
        Some(&t.admin_token),
        Some(json!({
            "user_id": t.holder_id,
            "fscs": "12345",
            "type": "CRED",
            "secrecy": "S",
            "concession": "2020-01-15",
            // client-supplied validity is ignored
            "validity": "2099-01-01"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["validity"], "2022-01-15");
    assert_eq!(body["status"], "Vencida");
    assert_eq!(body["status_color"], "danger");

    let (status, body) = send(
        &t.app,
        "POST",
        "/api/credentials",
        Some(&t.admin_token),
        Some(json!({
            "user_id": t.holder_id,
            "type": "TCMS",
            "secrecy": "R",
            "credential": "TCMS-42",
            "concession": "2020-06-10"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["validity"], "2020-12-31");
}

#[tokio::test]
async fn invalid_input_returns_field_errors() {
    let t = setup().await;

    let (status, body) = send(
        &t.app,
        "POST",
        "/api/credentials",
        Some(&t.admin_token),
        Some(json!({"user_id": 9999, "type": "XYZ"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "VALIDATION_FAILED");
    let fields = body["fields"].as_object().expect("fields missing");
    assert!(fields.contains_key("type"));
    assert!(fields.contains_key("secrecy"));

    let (status, body) = send(
        &t.app,
        "POST",
        "/api/credentials",
        Some(&t.admin_token),
        Some(json!({"user_id": 9999, "type": "CRED", "secrecy": "R"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["fields"]["user_id"].is_array());

    let (status, body) = send(
        &t.app,
        "POST",
        "/api/credentials",
        Some(&t.admin_token),
        Some(json!({
            "user_id": t.holder_id,
            "type": "CRED",
            "secrecy": "R",
            "concession": "2999-01-01"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["fields"]["concession"].is_array());
}

async fn post_raw(app: &Router, uri: &str, token: &str, body: &str) -> (StatusCode, String, Value) {
    let req = Request::builder()
        .method("POST")
        .uri(uri)
        .header("authorization", format!("Bearer {token}"))
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("failed to build request");
    let resp = app.clone().oneshot(req).await.expect("request failed");
    let status = resp.status();
    let content_type = resp
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let bytes = to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("failed to read response body");
    let json = serde_json::from_slice(&bytes).expect("response body was not json");
    (status, content_type, json)
}

#[tokio::test]
async fn undecodable_fields_are_reported_like_validation_errors() {
    let t = setup().await;

    let (status, body) = send(
        &t.app,
        "POST",
        "/api/credentials",
        Some(&t.admin_token),
        Some(json!({
            "user_id": t.holder_id,
            "type": "CRED",
            "secrecy": "R",
            "concession": "15/01/2025"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "VALIDATION_FAILED");
    assert!(body["fields"]["concession"].is_array());

    let (status, body) = send(
        &t.app,
        "POST",
        "/api/ranks",
        Some(&t.admin_token),
        Some(json!({"name": "Major", "sort_order": "first"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["fields"]["sort_order"].is_array());
}

#[tokio::test]
async fn malformed_json_is_a_json_bad_request() {
    let t = setup().await;
    let (status, content_type, body) =
        post_raw(&t.app, "/api/credentials", &t.admin_token, "{\"user_id\": ").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(content_type.starts_with("application/json"));
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn fscs_is_unique_except_denied_sentinel() {
    let t = setup().await;
    let body = |fscs: &str| {
        json!({"user_id": t.holder_id, "fscs": fscs, "type": "CRED", "secrecy": "R"})
    };

    let (status, _) = send(&t.app, "POST", "/api/credentials", Some(&t.admin_token), Some(body("55555"))).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, resp) = send(&t.app, "POST", "/api/credentials", Some(&t.admin_token), Some(body("55555"))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(resp["fields"]["fscs"].is_array());

    for _ in 0..2 {
        let (status, resp) = send(&t.app, "POST", "/api/credentials", Some(&t.admin_token), Some(body("00000"))).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(resp["status"], "Negada");
    }
}

#[tokio::test]
async fn update_recomputes_validity_and_logs_dirty_fields() {
    let t = setup().await;

    let (_, created) = send(
        &t.app,
        "POST",
        "/api/credentials",
        Some(&t.admin_token),
        Some(json!({"user_id": t.holder_id, "type": "CRED", "secrecy": "R"})),
    )
    .await;
    let id = created["id"].as_i64().expect("id missing");
    assert_eq!(created["status"], "Pendente");
    assert_eq!(created["validity"], Value::Null);

    let (status, updated) = send(
        &t.app,
        "PUT",
        &format!("/api/credentials/{id}"),
        Some(&t.admin_token),
        Some(json!({
            "user_id": t.holder_id,
            "type": "CRED",
            "secrecy": "R",
            "concession": "2021-03-01"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["validity"], "2023-03-01");

    let (status, log) = send(
        &t.app,
        "GET",
        &format!("/api/credentials/{id}/activity"),
        Some(&t.admin_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let entries = log.as_array().expect("activity should be a list");
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["event"], "updated");
    assert_eq!(entries[0]["causer_id"], t.admin_id);
    let attributes = entries[0]["properties"]["attributes"]
        .as_object()
        .expect("attributes missing");
    assert!(attributes.contains_key("concession"));
    assert!(attributes.contains_key("validity"));
    assert!(!attributes.contains_key("secrecy"));
    assert_eq!(entries[1]["event"], "created");
}

#[tokio::test]
async fn soft_deleted_credentials_leave_active_lists() {
    let t = setup().await;

    let (_, created) = send(
        &t.app,
        "POST",
        "/api/credentials",
        Some(&t.admin_token),
        Some(json!({"user_id": t.holder_id, "type": "CRED", "secrecy": "AR"})),
    )
    .await;
    let id = created["id"].as_i64().expect("id missing");

    let (status, _) = send(&t.app, "DELETE", &format!("/api/credentials/{id}"), Some(&t.admin_token), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, detail) = send(&t.app, "GET", &format!("/api/users/{}", t.holder_id), Some(&t.admin_token), None).await;
    assert_eq!(detail["credentials"], json!([]));

    let (_, active) = send(&t.app, "GET", "/api/credentials", Some(&t.admin_token), None).await;
    assert_eq!(active, json!([]));

    let (_, with) = send(&t.app, "GET", "/api/credentials?trashed=with", Some(&t.admin_token), None).await;
    assert_eq!(with.as_array().map(Vec::len), Some(1));

    let (_, only) = send(&t.app, "GET", "/api/credentials?trashed=only", Some(&t.admin_token), None).await;
    assert_eq!(only[0]["id"], id);

    let (status, restored) = send(
        &t.app,
        "POST",
        &format!("/api/credentials/{id}/restore"),
        Some(&t.admin_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(restored["deleted_at"], Value::Null);

    let (_, log) = send(&t.app, "GET", "/api/activity", Some(&t.admin_token), None).await;
    let events: Vec<&str> = log
        .as_array()
        .expect("activity should be a list")
        .iter()
        .filter_map(|e| e["event"].as_str())
        .collect();
    assert_eq!(events, vec!["restored", "deleted", "created"]);

    let (status, _) = send(&t.app, "DELETE", &format!("/api/credentials/{id}/force"), Some(&t.admin_token), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = send(&t.app, "GET", &format!("/api/credentials/{id}"), Some(&t.admin_token), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn credentials_of_trashed_holders_leave_active_lists() {
    let t = setup().await;
    let (status, created) = send(
        &t.app,
        "POST",
        "/api/credentials",
        Some(&t.admin_token),
        Some(json!({"user_id": t.holder_id, "type": "CRED", "secrecy": "S"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = created["id"].as_i64().expect("id missing");

    let holder = format!("/api/users/{}", t.holder_id);
    let (status, _) = send(&t.app, "DELETE", &holder, Some(&t.admin_token), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, active) = send(&t.app, "GET", "/api/credentials", Some(&t.admin_token), None).await;
    assert_eq!(active, json!([]));
    let (_, only) = send(&t.app, "GET", "/api/credentials?trashed=only", Some(&t.admin_token), None).await;
    assert_eq!(only.as_array().map(Vec::len), Some(1));
    assert_eq!(only[0]["id"], id);
    assert_eq!(only[0]["deleted_at"], Value::Null);

    let (status, _) = send(&t.app, "POST", &format!("{holder}/restore"), Some(&t.admin_token), None).await;
    assert_eq!(status, StatusCode::OK);
    let (_, active) = send(&t.app, "GET", "/api/credentials", Some(&t.admin_token), None).await;
    assert_eq!(active[0]["id"], id);
}

#[tokio::test]
async fn list_filters_by_status_and_user() {
    let t = setup().await;
    for concession in [Some("2019-05-01"), None] {
        let (status, _) = send(
            &t.app,
            "POST",
            "/api/credentials",
            Some(&t.admin_token),
            Some(json!({
                "user_id": t.holder_id,
                "type": "CRED",
                "secrecy": "R",
                "concession": concession
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (_, pending) = send(&t.app, "GET", "/api/credentials?status=pendente", Some(&t.admin_token), None).await;
    assert_eq!(pending.as_array().map(Vec::len), Some(1));
    assert_eq!(pending[0]["status"], "Pendente");

    let uri = format!("/api/credentials?user_id={}", t.admin_id);
    let (_, none) = send(&t.app, "GET", &uri, Some(&t.admin_token), None).await;
    assert_eq!(none, json!([]));

    // VÁLIDA
    let (status, valid) = send(&t.app, "GET", "/api/credentials?status=V%C3%81LIDA", Some(&t.admin_token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(valid, json!([]));

    let (status, _) = send(&t.app, "GET", "/api/credentials?status=bogus", Some(&t.admin_token), None).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn legacy_routes_mirror_api() {
    let t = setup().await;
    let (status, created) = send(
        &t.app,
        "POST",
        "/credentials",
        Some(&t.admin_token),
        Some(json!({"user_id": t.holder_id, "type": "TCMS", "secrecy": "S"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["status"], "Pane - Verificar");

    let id = created["id"].as_i64().expect("id missing");
    let (status, shown) = send(&t.app, "GET", &format!("/credentials/{id}"), Some(&t.admin_token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(shown["status_color"], "gray");
}

#[tokio::test]
async fn nobody_deletes_their_own_account() {
    let t = setup().await;

    let uri = format!("/api/users/{}", t.admin_id);
    let (status, _) = send(&t.app, "DELETE", &uri, Some(&t.admin_token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = send(&t.app, "DELETE", &format!("{uri}/force"), Some(&t.admin_token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let uri = format!("/api/users/{}", t.holder_id);
    let (status, _) = send(&t.app, "DELETE", &uri, Some(&t.admin_token), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (_, trashed) = send(&t.app, "GET", "/api/users?trashed=only", Some(&t.admin_token), None).await;
    assert_eq!(trashed[0]["id"], t.holder_id);
}

#[tokio::test]
async fn force_deleting_a_user_audits_their_credentials() {
    let t = setup().await;
    let (_, created) = send(
        &t.app,
        "POST",
        "/api/credentials",
        Some(&t.admin_token),
        Some(json!({"user_id": t.holder_id, "fscs": "24680", "type": "CRED", "secrecy": "R"})),
    )
    .await;
    let id = created["id"].as_i64().expect("id missing");

    let uri = format!("/api/users/{}/force", t.holder_id);
    let (status, _) = send(&t.app, "DELETE", &uri, Some(&t.admin_token), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(&t.app, "GET", &format!("/api/credentials/{id}"), Some(&t.admin_token), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, log) = send(
        &t.app,
        "GET",
        &format!("/api/credentials/{id}/activity"),
        Some(&t.admin_token),
        None,
    )
    .await;
    assert_eq!(log[0]["event"], "deleted");
    assert_eq!(log[0]["causer_id"], t.admin_id);
    assert_eq!(log[0]["properties"]["force"], true);
    assert_eq!(log[0]["properties"]["old"]["fscs"], "24680");
    assert_eq!(log[1]["event"], "created");
}

#[tokio::test]
async fn user_management_flow() {
    let t = setup().await;

    let (status, rank) = send(
        &t.app,
        "POST",
        "/api/ranks",
        Some(&t.admin_token),
        Some(json!({"name": "Capitão", "short_name": "Cap", "sort_order": 3})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, created) = send(
        &t.app,
        "POST",
        "/api/users",
        Some(&t.admin_token),
        Some(json!({
            "name": "operator1",
            "full_name": "Operator One",
            "email": "Operator1@Example.org",
            "rank_id": rank["id"],
            "roles": ["operator"]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["email"], "operator1@example.org");
    assert!(created.get("api_token_hash").is_none());
    let token = created["token"].as_str().expect("token missing").to_string();
    let id = created["id"].as_i64().expect("id missing");

    let (status, _) = send(
        &t.app,
        "POST",
        "/api/credentials",
        Some(&token),
        Some(json!({"user_id": t.holder_id, "type": "CRED", "secrecy": "R"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, dup) = send(
        &t.app,
        "POST",
        "/api/users",
        Some(&t.admin_token),
        Some(json!({"name": "operator1", "full_name": "Again", "email": "x@example.org"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(dup["fields"]["name"].is_array());

    let (status, rotated) = send(&t.app, "POST", &format!("/api/users/{id}/token"), Some(&t.admin_token), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&t.app, "GET", "/api/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let new_token = rotated["token"].as_str().expect("token missing");
    let (status, _) = send(&t.app, "GET", "/api/me", Some(new_token), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, roles) = send(
        &t.app,
        "PUT",
        &format!("/api/users/{id}/roles"),
        Some(&t.admin_token),
        Some(json!({"roles": ["viewer"]})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(roles["roles"], json!(["viewer"]));
    let (status, _) = send(
        &t.app,
        "POST",
        "/api/credentials",
        Some(new_token),
        Some(json!({"user_id": t.holder_id, "type": "CRED", "secrecy": "R"})),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}
