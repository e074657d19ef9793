#![allow(dead_code)]

use anyhow::{Context, Result};
use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use w3st_api::config::AppConfig;
use w3st_api::database::MemoryDatabase;
use w3st_api::{app, AppState};

pub const SECRET: &str = "integration-test-secret-0123456789abcdef";

/// The router wired to an in-memory database, driven without a socket
pub struct TestApp {
    pub router: Router,
    pub db: MemoryDatabase,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_vars(&[])
    }

    pub fn with_vars(vars: &[(&str, &str)]) -> Self {
        let vars: Vec<(String, String)> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let config = AppConfig::from_lookup(SECRET, move |name| {
            vars.iter().find(|(k, _)| k == name).map(|(_, v)| v.clone())
        })
        .expect("test configuration");

        let db = MemoryDatabase::new();
        let state = AppState::in_memory(&config, db.clone());
        Self {
            router: app(state),
            db,
        }
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        headers: &[(&str, &str)],
        body: Option<Value>,
    ) -> Result<(StatusCode, Value)> {
        let mut builder = Request::builder().method(method).uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }

        let body = match body {
            Some(value) => {
                builder = builder.header("content-type", "application/json");
                Body::from(serde_json::to_vec(&value)?)
            }
            None => Body::empty(),
        };

        let response = self.router.clone().oneshot(builder.body(body)?).await?;
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        Ok((status, json))
    }

    pub async fn get(&self, uri: &str, headers: &[(&str, &str)]) -> Result<(StatusCode, Value)> {
        self.request(Method::GET, uri, headers, None).await
    }

    pub async fn post(&self, uri: &str, headers: &[(&str, &str)], body: Value) -> Result<(StatusCode, Value)> {
        self.request(Method::POST, uri, headers, Some(body)).await
    }

    /// Sign up and return the session token
    pub async fn signup(&self, email: &str) -> Result<String> {
        let (status, body) = self
            .post("/auth/signup", &[], json!({ "email": email, "name": "Test User" }))
            .await?;
        anyhow::ensure!(status == StatusCode::CREATED, "signup failed: {} {}", status, body);
        token_from(&body)
    }

    /// Create an API key for `project_id` and return its plaintext secret
    pub async fn create_key(&self, session: &str, project_id: i64, collections: &[i64]) -> Result<String> {
        let bearer = format!("Bearer {}", session);
        let (status, body) = self
            .post(
                &format!("/api/projects/{}/keys", project_id),
                &[("authorization", bearer.as_str())],
                json!({ "name": "test key", "collection_ids": collections }),
            )
            .await?;
        anyhow::ensure!(status == StatusCode::CREATED, "key creation failed: {} {}", status, body);
        body["data"]["key"]
            .as_str()
            .map(str::to_string)
            .context("response has no key")
    }
}

pub fn token_from(body: &Value) -> Result<String> {
    body["data"]["token"]
        .as_str()
        .map(str::to_string)
        .context("response has no token")
}
