//! Shared harness: a full router over a temp-file database, with in-memory
//! stand-ins for the media host and the OTP providers.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use ardu::auth::{bootstrap, JwtKeys};
use ardu::config::Config;
use ardu::db;
use ardu::db::models::MediaType;
use ardu::media::{MediaError, MediaHost, UploadRequest, UploadedMedia};
use ardu::otp::{Channel, DispatchError, OtpSender};
use ardu::routes;
use ardu::state::AppState;
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

pub const MAIN_ADMIN_EMAIL: &str = "mainadmin@example.com";
pub const MAIN_ADMIN_PASSWORD: &str = "main-admin-pass";
pub const BOUNDARY: &str = "ardu-test-boundary";

#[derive(Default)]
pub struct FakeMedia {
    pub uploaded: Mutex<Vec<String>>,
    pub deleted: Mutex<Vec<String>>,
}

#[async_trait]
impl MediaHost for FakeMedia {
    async fn upload(&self, req: UploadRequest) -> Result<UploadedMedia, MediaError> {
        let media_type = MediaType::from_mime(&req.content_type)
            .ok_or_else(|| MediaError::Rejected(req.content_type.clone()))?;
        let public_id = format!("{}/{}", req.folder, uuid::Uuid::now_v7());
        self.uploaded.lock().unwrap().push(public_id.clone());
        Ok(UploadedMedia {
            url: format!("https://media.test/{}", public_id),
            public_id,
            media_type,
        })
    }

    async fn delete(&self, public_id: &str, _media_type: MediaType) -> Result<(), MediaError> {
        self.deleted.lock().unwrap().push(public_id.to_string());
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeOtp {
    pub sent: Mutex<Vec<(Channel, String, String)>>,
}

impl FakeOtp {
    pub fn last_code(&self) -> Option<String> {
        self.sent.lock().unwrap().last().map(|(_, _, code)| code.clone())
    }
}

#[async_trait]
impl OtpSender for FakeOtp {
    async fn send(&self, channel: Channel, recipient: &str, code: &str) -> Result<(), DispatchError> {
        self.sent
            .lock()
            .unwrap()
            .push((channel, recipient.to_string(), code.to_string()));
        Ok(())
    }
}

pub struct TestApp {
    _dir: TempDir,
    pub state: AppState,
    pub router: Router,
    pub media: Arc<FakeMedia>,
    pub otp: Arc<FakeOtp>,
}

pub struct TestResponse {
    pub status: StatusCode,
    pub set_cookie: Option<String>,
    pub body: String,
}

impl TestResponse {
    pub fn json(&self) -> Value {
        serde_json::from_str(&self.body)
            .unwrap_or_else(|e| panic!("not JSON ({}): {}", e, self.body))
    }
}

impl TestApp {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let pool = db::create_pool(&dir.path().join("test.db")).unwrap();
        db::run_migrations(&pool).unwrap();

        let mut config = Config::default();
        config.bootstrap.main_admin_email = MAIN_ADMIN_EMAIL.to_string();
        config.bootstrap.main_admin_password = Some(MAIN_ADMIN_PASSWORD.to_string());
        bootstrap::ensure_main_admin(&pool, &config.bootstrap).unwrap();

        let media = Arc::new(FakeMedia::default());
        let otp = Arc::new(FakeOtp::default());
        let state = AppState {
            db: pool,
            jwt: Arc::new(JwtKeys::new(b"test-secret", config.auth.jwt_expiration_secs)),
            config,
            media: media.clone(),
            otp: otp.clone(),
        };

        TestApp {
            _dir: dir,
            router: routes::app(state.clone()),
            state,
            media,
            otp,
        }
    }

    pub async fn send(&self, req: Request<Body>) -> TestResponse {
        let response = self.router.clone().oneshot(req).await.unwrap();
        let status = response.status();
        let set_cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        TestResponse {
            status,
            set_cookie,
            body: String::from_utf8_lossy(&bytes).into_owned(),
        }
    }

    pub async fn call(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let req = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string())),
            None => builder.body(Body::empty()),
        };
        self.send(req.unwrap()).await
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> TestResponse {
        self.call(Method::GET, uri, token, None).await
    }

    pub async fn upload(
        &self,
        uri: &str,
        token: &str,
        file: Option<(&str, &str, &[u8])>,
        story: Option<bool>,
    ) -> TestResponse {
        let mut body = Vec::new();
        if let Some((filename, content_type, bytes)) = file {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\nContent-Type: {content_type}\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(bytes);
            body.extend_from_slice(b"\r\n");
        }
        if let Some(story) = story {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"story\"\r\n\r\n{story}\r\n"
                )
                .as_bytes(),
            );
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

        let req = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap();
        self.send(req).await
    }

    pub async fn login(&self, path: &str, email: &str, password: &str) -> TestResponse {
        self.call(
            Method::POST,
            path,
            None,
            Some(serde_json::json!({ "email": email, "password": password })),
        )
        .await
    }

    pub async fn main_admin_token(&self) -> String {
        let res = self
            .login("/api/auth/admin/login", MAIN_ADMIN_EMAIL, MAIN_ADMIN_PASSWORD)
            .await;
        assert_eq!(res.status, StatusCode::OK, "{}", res.body);
        res.json()["jwt"]["token"].as_str().unwrap().to_string()
    }

    pub async fn register(&self, name: &str, email: &str, mobile: &str) -> TestResponse {
        self.call(
            Method::POST,
            "/api/users/register",
            None,
            Some(serde_json::json!({
                "name": name,
                "email": email,
                "mobileNumber": mobile,
                "password": "user-pass",
                "whatsappNumber": mobile,
            })),
        )
        .await
    }

    /// Register, approve with the main admin, and log in. Returns (id, token).
    pub async fn approved_user(&self, name: &str, email: &str, mobile: &str) -> (String, String) {
        let res = self.register(name, email, mobile).await;
        assert_eq!(res.status, StatusCode::OK, "{}", res.body);
        let id = res.json()["id"].as_str().unwrap().to_string();

        let admin = self.main_admin_token().await;
        let res = self
            .call(
                Method::POST,
                &format!("/api/admin/users/{}/approve", id),
                Some(&admin),
                None,
            )
            .await;
        assert_eq!(res.status, StatusCode::OK, "{}", res.body);

        let res = self.login("/api/auth/login", email, "user-pass").await;
        assert_eq!(res.status, StatusCode::OK, "{}", res.body);
        (id, res.json()["jwt"]["token"].as_str().unwrap().to_string())
    }

    /// Create an ordinary admin through the API and log in as them.
    pub async fn ordinary_admin(&self, email: &str) -> (String, String) {
        let main = self.main_admin_token().await;
        let res = self
            .call(
                Method::POST,
                "/api/admin/create",
                Some(&main),
                Some(serde_json::json!({
                    "name": "Helper",
                    "email": email,
                    "mobileNumber": "8000000000",
                    "password": "admin-pass",
                })),
            )
            .await;
        assert_eq!(res.status, StatusCode::OK, "{}", res.body);
        let id = res.json()["id"].as_str().unwrap().to_string();

        let res = self.login("/api/auth/admin/login", email, "admin-pass").await;
        assert_eq!(res.status, StatusCode::OK, "{}", res.body);
        (id, res.json()["jwt"]["token"].as_str().unwrap().to_string())
    }
}
