#![allow(dead_code)]

use std::io::Cursor;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{Request, Response, StatusCode};
use axum::Router;
use chrono::Utc;
use http_body_util::BodyExt;
use image::{ImageFormat, Rgb, RgbImage};
use retina_api::auth::jwt::JwtConfig;
use retina_api::auth::password::hash_password;
use retina_api::config::ServerConfig;
use retina_api::router::build_app_router;
use retina_api::state::AppState;
use retina_core::otp::{self, OtpPurpose};
use retina_core::secrets::SecretBox;
use retina_db::models::user::{CreateUser, User};
use retina_db::repositories::UserRepo;
use retina_events::{EmailError, OtpMailer, OtpMessage};
use retina_inference::{InferenceAdapter, InferenceError, Normalization, ScoreModel, Tensor};
use sqlx::PgPool;
use tower::ServiceExt;
use uuid::Uuid;

pub const TEST_PASSWORD: &str = "test_password_123!";

/// Scores the stub classifier returns: `Moderate` at 70%.
pub const STUB_SCORES: [f32; 5] = [0.05, 0.1, 0.7, 0.1, 0.05];

// ---------------------------------------------------------------------------
// App construction
// ---------------------------------------------------------------------------

/// Build a test `ServerConfig` with safe defaults and a fresh upload dir.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 30,
        jwt: JwtConfig {
            secret: "test-jwt-secret".to_string(),
            access_token_expiry_mins: 15,
            refresh_token_expiry_days: 7,
        },
        secret_key: "test-secret-key".to_string(),
        upload_dir: std::env::temp_dir().join(format!("retina-uploads-{}", Uuid::new_v4())),
        max_upload_bytes: 10 * 1024 * 1024,
    }
}

/// Records every code instead of sending it.
#[derive(Debug, Default)]
pub struct CapturingMailer {
    pub sent: Mutex<Vec<OtpMessage>>,
}

impl CapturingMailer {
    /// The most recent code sent to `to`.
    pub fn last_code_for(&self, to: &str) -> Option<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|m| m.to == to)
            .map(|m| m.code.clone())
    }

    pub fn count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl OtpMailer for CapturingMailer {
    async fn send_code(&self, message: &OtpMessage) -> Result<(), EmailError> {
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}

/// Classifier stand-in returning fixed scores.
pub struct FixedScores(pub Vec<f32>);

#[async_trait]
impl ScoreModel for FixedScores {
    async fn score(&self, _input: &Tensor) -> Result<Vec<f32>, InferenceError> {
        Ok(self.0.clone())
    }
}

pub struct TestApp {
    pub router: Router,
    pub mailer: Arc<CapturingMailer>,
    pub upload_dir: PathBuf,
}

impl TestApp {
    pub fn new(pool: PgPool) -> Self {
        Self::build(pool, Some(STUB_SCORES.to_vec()))
    }

    /// An app with no classifier configured.
    pub fn without_classifier(pool: PgPool) -> Self {
        Self::build(pool, None)
    }

    fn build(pool: PgPool, scores: Option<Vec<f32>>) -> Self {
        let config = test_config();
        let mailer = Arc::new(CapturingMailer::default());
        let classifier = scores.map(|s| {
            InferenceAdapter::new(Arc::new(FixedScores(s)), 16, Normalization::Passthrough)
        });

        let state = AppState {
            pool,
            config: Arc::new(config.clone()),
            mailer: mailer.clone(),
            classifier,
            secrets: SecretBox::new(&config.secret_key),
            suggestions: Default::default(),
        };

        Self {
            router: build_app_router(state, &config),
            mailer,
            upload_dir: config.upload_dir,
        }
    }

    pub fn app(&self) -> Router {
        self.router.clone()
    }

    /// Names of the images written so far; empty if nothing was stored.
    pub fn stored_images(&self) -> Vec<String> {
        let Ok(entries) = std::fs::read_dir(&self.upload_dir) else {
            return Vec::new();
        };
        let mut names: Vec<String> = entries
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }
}

/// Build the full application router with all middleware layers, using the
/// given database pool.
pub fn build_test_app(pool: PgPool) -> Router {
    TestApp::new(pool).router
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// Create a verified, active physician directly in the database.
pub async fn create_verified_user(pool: &PgPool, email: &str) -> User {
    let input = CreateUser {
        email: email.to_string(),
        password_hash: hash_password(TEST_PASSWORD).expect("hashing should succeed"),
        first_name: "Asha".to_string(),
        last_name: "Rao".to_string(),
        designation: "Ophthalmologist".to_string(),
        custom_designation: None,
        hospital_name: Some("City Eye Clinic".to_string()),
    };
    let code = otp::issue(OtpPurpose::Signup, Utc::now());
    let user = UserRepo::create_pending(pool, &input, &code)
        .await
        .expect("user creation should succeed");
    UserRepo::verify_signup(pool, user.id, &code.code_hash)
        .await
        .expect("verify should succeed")
        .expect("code should match")
}

/// Log in through the API and return the full JSON response.
pub async fn login(app: Router, email: &str, password: &str) -> serde_json::Value {
    let body = serde_json::json!({ "email": email, "password": password });
    let response = post_json(app, "/api/v1/auth/login", body).await;
    assert_eq!(response.status(), StatusCode::OK);
    body_json(response).await
}

/// Create a verified user and return `(user, access_token)`.
pub async fn signed_in_user(pool: &PgPool, app: Router, email: &str) -> (User, String) {
    let user = create_verified_user(pool, email).await;
    let json = login(app, email, TEST_PASSWORD).await;
    let token = json["access_token"].as_str().unwrap().to_string();
    (user, token)
}

/// A small encoded PNG.
pub fn png_bytes() -> Vec<u8> {
    png_filled([180, 60, 40])
}

/// A small PNG of one colour; different colours give different digests.
pub fn png_filled(rgb: [u8; 3]) -> Vec<u8> {
    let img = RgbImage::from_pixel(24, 24, Rgb(rgb));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png).unwrap();
    out.into_inner()
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

pub async fn send(app: Router, request: Request<Body>) -> Response<Body> {
    app.oneshot(request).await.unwrap()
}

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    let request = Request::get(uri).body(Body::empty()).unwrap();
    send(app, request).await
}

pub async fn get_auth(app: Router, uri: &str, token: &str) -> Response<Body> {
    let request = Request::get(uri)
        .header(AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();
    send(app, request).await
}

pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    let request = Request::post(uri)
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    send(app, request).await
}

pub async fn post_json_auth(
    app: Router,
    uri: &str,
    body: serde_json::Value,
    token: &str,
) -> Response<Body> {
    json_auth("POST", app, uri, body, token).await
}

pub async fn put_json_auth(
    app: Router,
    uri: &str,
    body: serde_json::Value,
    token: &str,
) -> Response<Body> {
    json_auth("PUT", app, uri, body, token).await
}

pub async fn delete_auth(app: Router, uri: &str, token: &str) -> Response<Body> {
    let request = Request::delete(uri)
        .header(AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();
    send(app, request).await
}

pub async fn delete_json_auth(
    app: Router,
    uri: &str,
    body: serde_json::Value,
    token: &str,
) -> Response<Body> {
    json_auth("DELETE", app, uri, body, token).await
}

async fn json_auth(
    method: &str,
    app: Router,
    uri: &str,
    body: serde_json::Value,
    token: &str,
) -> Response<Body> {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header(CONTENT_TYPE, "application/json")
        .header(AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::from(body.to_string()))
        .unwrap();
    send(app, request).await
}

/// A file part of a multipart form.
pub struct FilePart<'a> {
    pub field: &'a str,
    pub filename: &'a str,
    pub bytes: Vec<u8>,
}

/// Post `multipart/form-data` with text fields and file parts.
pub async fn post_multipart_auth(
    app: Router,
    uri: &str,
    fields: &[(&str, &str)],
    files: Vec<FilePart<'_>>,
    token: &str,
) -> Response<Body> {
    let boundary = "retina-test-boundary";
    let mut body: Vec<u8> = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{boundary}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    for file in files {
        body.extend_from_slice(
            format!(
                "--{boundary}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
                file.field, file.filename
            )
            .as_bytes(),
        );
        body.extend_from_slice(&file.bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());

    let request = Request::post(uri)
        .header(
            CONTENT_TYPE,
            format!("multipart/form-data; boundary={boundary}"),
        )
        .header(AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::from(body))
        .unwrap();
    send(app, request).await
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = body_bytes(response).await;
    serde_json::from_slice(&bytes).unwrap()
}
