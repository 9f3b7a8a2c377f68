#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use chrono::{TimeZone, Utc};
use http_body_util::BodyExt;
use jsonwebtoken::{encode, EncodingKey, Header};
use savesync_core::clock::ManualClock;
use savesync_core::types::UserId;
use savesync_dispatch::{Coordinator, DispatchConfig};
use tower::ServiceExt;

use savesync_api::auth::jwt::{Claims, JwtConfig};
use savesync_api::config::ServerConfig;
use savesync_api::router::build_app_router;
use savesync_api::state::AppState;
use savesync_api::ws::WsManager;

pub const ALICE: UserId = 1;
pub const BOB: UserId = 2;
pub const ADMIN: UserId = 99;

/// Build a test `ServerConfig` with safe defaults and a fixed JWT secret.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 5,
        database_url: None,
        jwt: JwtConfig {
            secret: "integration-test-secret".to_string(),
        },
        dispatch: DispatchConfig::default(),
    }
}

/// The real router over an in-memory coordinator driven by a manual clock.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub clock: Arc<ManualClock>,
}

impl TestApp {
    pub fn coordinator(&self) -> &Coordinator {
        &self.state.coordinator
    }

    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<serde_json::Value>,
    ) -> Response<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        self.router.clone().oneshot(request).await.unwrap()
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> Response<Body> {
        self.send(Method::GET, uri, token, None).await
    }

    pub async fn post(
        &self,
        uri: &str,
        token: Option<&str>,
        body: serde_json::Value,
    ) -> Response<Body> {
        self.send(Method::POST, uri, token, Some(body)).await
    }

    /// Heartbeat `client_id` through the worker endpoint.
    pub async fn heartbeat(&self, client_id: &str) {
        let response = self
            .post(
                "/api/v1/worker/heartbeat",
                None,
                serde_json::json!({ "client_id": client_id }),
            )
            .await;
        assert_eq!(response.status(), 200);
    }

    /// Heartbeat `client_id` and claim it for `user`.
    pub async fn claimed_worker(&self, client_id: &str, user: UserId) {
        self.heartbeat(client_id).await;
        let response = self
            .post(
                "/api/v1/worker/claim",
                Some(&token(user, "user")),
                serde_json::json!({ "client_id": client_id }),
            )
            .await;
        assert_eq!(response.status(), 200);
    }
}

pub fn t0() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
}

pub fn build_test_app() -> TestApp {
    let config = test_config();
    let clock = Arc::new(ManualClock::new(t0()));
    let coordinator = Arc::new(Coordinator::in_memory(
        config.dispatch.clone(),
        clock.clone(),
    ));

    let state = AppState {
        config: Arc::new(config.clone()),
        coordinator,
        ws_manager: Arc::new(WsManager::new()),
    };
    let router = build_app_router(state.clone(), &config);

    TestApp {
        router,
        state,
        clock,
    }
}

/// Sign a token the way the auth service does, with the test secret.
pub fn token(user_id: UserId, role: &str) -> String {
    let now = Utc::now().timestamp();
    let claims = Claims {
        sub: user_id,
        role: role.to_string(),
        exp: now + 15 * 60,
        iat: now,
        jti: uuid::Uuid::new_v4().to_string(),
    };
    let secret = test_config().jwt.secret;
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .unwrap()
}

pub fn admin_token() -> String {
    token(ADMIN, "admin")
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
