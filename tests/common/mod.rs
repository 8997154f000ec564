//! Shared harness: each test gets its own temp data directory, database and
//! router, and drives it in-process with `tower::ServiceExt::oneshot`.

#![allow(dead_code)]

use axum::body::{to_bytes, Body};
use axum::http::{header, HeaderMap, Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use fitcheck::config::{Config, Service};
use fitcheck::db;
use fitcheck::state::AppState;

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    // Dropped last so the database outlives the pool.
    pub dir: TempDir,
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl TestApp {
    pub fn new(service: Service) -> Self {
        let dir = TempDir::new().unwrap();
        let mut config = Config::rooted_at(dir.path(), service);
        // Cheapest bcrypt cost keeps signup-heavy tests fast
        config.auth.bcrypt_cost = 4;
        let pool = db::create_pool(&config.db_path()).expect("Failed to create test database");
        db::run_migrations(&pool, service).expect("Failed to run migrations");

        let state = AppState::new(service, pool, config);
        let router = fitcheck::app(state.clone());
        TestApp { router, state, dir }
    }

    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&bytes).into_owned())
            })
        };
        TestResponse {
            status,
            headers,
            body,
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
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        self.send(request).await
    }

    pub async fn get(&self, uri: &str) -> TestResponse {
        self.call(Method::GET, uri, None, None).await
    }

    /// Create a native wardrobe account and return `(token, user_id)`.
    pub async fn signup(&self, username: &str) -> (String, String) {
        let res = self
            .call(
                Method::POST,
                "/api/users",
                None,
                Some(json!({ "username": username, "password": "correct horse" })),
            )
            .await;
        assert_eq!(res.status, StatusCode::CREATED, "signup failed: {}", res.body);
        (
            res.body["token"].as_str().unwrap().to_string(),
            res.body["user"]["id"].as_str().unwrap().to_string(),
        )
    }
}
