//! HTTP-level integration tests for AI-model settings, selection and
//! suggestions.

mod common;

use axum::http::StatusCode;
use axum::Router;
use common::{body_json, delete_auth, get_auth, post_json_auth, put_json_auth, signed_in_user};
use serde_json::{json, Value};
use sqlx::PgPool;

const API_KEY: &str = "sk-test-0123456789abcdef";

async fn add_model(app: Router, token: &str, body: Value) -> Value {
    let response = post_json_auth(app, "/api/v1/ai-models", body, token).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    body_json(response).await["data"].clone()
}

fn openai(model_name: &str) -> Value {
    json!({
        "provider_name": "openai",
        "model_name": model_name,
        "api_key": API_KEY
    })
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn create_masks_the_api_key(pool: PgPool) {
    let app = common::build_test_app(pool.clone());
    let (_user, token) = signed_in_user(&pool, app.clone(), "models@example.com").await;

    let model = add_model(app.clone(), &token, openai("gpt-4o-mini")).await;
    assert_eq!(model["provider_name"], "openai");
    assert_eq!(model["temperature"], 0.7);
    assert_eq!(model["max_tokens"], 1000);
    assert_eq!(model["enabled"], true);

    let masked = model["api_key_masked"].as_str().unwrap();
    assert!(masked.starts_with("sk-t"));
    assert!(masked.ends_with("cdef"));
    assert_ne!(masked, API_KEY);
    assert!(model.get("api_key").is_none());
    assert!(model.get("api_key_encrypted").is_none());

    let stored: String =
        sqlx::query_scalar("SELECT api_key_encrypted FROM ai_model_settings WHERE id = $1")
            .bind(model["id"].as_i64().unwrap())
            .fetch_one(&pool)
            .await
            .unwrap();
    assert!(!stored.contains(API_KEY));

    let response = get_auth(app, "/api/v1/ai-models", &token).await;
    let raw = String::from_utf8(common::body_bytes(response).await).unwrap();
    assert!(!raw.contains(API_KEY));
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn create_validates_settings(pool: PgPool) {
    let app = common::build_test_app(pool.clone());
    let (_user, token) = signed_in_user(&pool, app.clone(), "invalid@example.com").await;

    let cases = [
        json!({ "provider_name": "acme", "model_name": "m", "api_key": API_KEY }),
        json!({ "provider_name": "openai", "model_name": "m", "api_key": "  " }),
        json!({ "provider_name": "custom", "model_name": "m", "api_key": API_KEY }),
        json!({ "provider_name": "openai", "model_name": "m", "api_key": API_KEY, "temperature": 2.5 }),
        json!({ "provider_name": "openai", "model_name": "m", "api_key": API_KEY, "max_tokens": 50 }),
    ];
    for body in cases {
        let response = post_json_auth(app.clone(), "/api/v1/ai-models", body.clone(), &token).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{body}");
    }
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn list_reports_active_model(pool: PgPool) {
    let app = common::build_test_app(pool.clone());
    let (_user, token) = signed_in_user(&pool, app.clone(), "active@example.com").await;

    let response = get_auth(app.clone(), "/api/v1/ai-models", &token).await;
    let json = body_json(response).await;
    assert_eq!(json["data"]["models"].as_array().unwrap().len(), 0);
    assert!(json["data"]["active_model"].is_null());

    let first = add_model(app.clone(), &token, openai("gpt-4o-mini")).await;
    let second = add_model(app.clone(), &token, openai("gpt-4o")).await;

    // Without a selection the oldest enabled model is active.
    let json = body_json(get_auth(app.clone(), "/api/v1/ai-models", &token).await).await;
    assert_eq!(json["data"]["models"].as_array().unwrap().len(), 2);
    assert_eq!(json["data"]["active_model"]["id"], first["id"]);

    let response = post_json_auth(
        app.clone(),
        "/api/v1/ai-models/select",
        json!({ "model_id": second["id"] }),
        &token,
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(get_auth(app.clone(), "/api/v1/ai-models", &token).await).await;
    assert_eq!(json["data"]["active_model"]["id"], second["id"]);

    // Disabling the selected model falls back to the next enabled one.
    let response = put_json_auth(
        app.clone(),
        &format!("/api/v1/ai-models/{}", second["id"]),
        json!({ "enabled": false }),
        &token,
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(get_auth(app, "/api/v1/ai-models", &token).await).await;
    assert_eq!(json["data"]["active_model"]["id"], first["id"]);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn selecting_disabled_model_is_rejected(pool: PgPool) {
    let app = common::build_test_app(pool.clone());
    let (_user, token) = signed_in_user(&pool, app.clone(), "disabled@example.com").await;

    let mut body = openai("gpt-4o");
    body["enabled"] = json!(false);
    let model = add_model(app.clone(), &token, body).await;

    let response = post_json_auth(
        app.clone(),
        "/api/v1/ai-models/select",
        json!({ "model_id": model["id"] }),
        &token,
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = post_json_auth(
        app,
        "/api/v1/ai-models/select",
        json!({ "model_id": 424242 }),
        &token,
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn update_and_delete(pool: PgPool) {
    let app = common::build_test_app(pool.clone());
    let (_user, token) = signed_in_user(&pool, app.clone(), "edit@example.com").await;
    let (_other, other_token) = signed_in_user(&pool, app.clone(), "nosy@example.com").await;
    let model = add_model(app.clone(), &token, openai("gpt-4o-mini")).await;
    let uri = format!("/api/v1/ai-models/{}", model["id"]);

    let response = put_json_auth(
        app.clone(),
        &uri,
        json!({ "model_name": "gpt-4o", "temperature": 0.2, "api_key": "" }),
        &token,
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let updated = body_json(response).await["data"].clone();
    assert_eq!(updated["model_name"], "gpt-4o");
    assert_eq!(updated["temperature"], 0.2);
    // An empty key leaves the stored one in place.
    assert_eq!(updated["api_key_masked"], model["api_key_masked"]);

    let response = put_json_auth(app.clone(), &uri, json!({ "max_tokens": 9000 }), &token).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = delete_auth(app.clone(), &uri, &other_token).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = delete_auth(app.clone(), &uri, &token).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    let response = delete_auth(app, &uri, &token).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn templates_cover_known_providers(pool: PgPool) {
    let app = common::build_test_app(pool.clone());
    let (_user, token) = signed_in_user(&pool, app.clone(), "templates@example.com").await;

    let response = get_auth(app, "/api/v1/ai-models/templates", &token).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    let templates = json["data"].as_array().unwrap();
    assert!(!templates.is_empty());
    assert!(templates.iter().any(|t| t["provider_name"] == "openai"));
    assert!(templates.iter().all(|t| t["model_name"].is_string()));
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn suggestions_without_model_are_unavailable(pool: PgPool) {
    let app = common::build_test_app(pool.clone());
    let (_user, token) = signed_in_user(&pool, app.clone(), "suggest@example.com").await;

    let body = json!({
        "patient_info": { "first_name": "Asha", "last_name": "Rao", "age": 54 },
        "results": [{ "class_name": "Moderate", "confidence_percent": 82.5 }]
    });
    let response = post_json_auth(app, "/api/v1/ai-models/suggestions", body, &token).await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body_json(response).await["code"], "UNAVAILABLE");
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn suggestions_report_unreachable_provider(pool: PgPool) {
    let app = common::build_test_app(pool.clone());
    let (_user, token) = signed_in_user(&pool, app.clone(), "gateway@example.com").await;
    add_model(
        app.clone(),
        &token,
        json!({
            "provider_name": "custom",
            "base_url": "http://127.0.0.1:9/v1",
            "model_name": "local",
            "api_key": API_KEY
        }),
    )
    .await;

    let body = json!({
        "patient_info": { "first_name": "Asha", "last_name": "Rao" },
        "results": [{ "class_name": "Severe", "confidence_percent": 91.0 }]
    });
    let response =
        post_json_auth(app.clone(), "/api/v1/ai-models/suggestions", body, &token).await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(body_json(response).await["code"], "PROVIDER_ERROR");

    let response = post_json_auth(
        app,
        "/api/v1/ai-models/suggestions",
        json!({ "results": [] }),
        &token,
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
