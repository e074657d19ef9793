mod common;

use anyhow::Result;
use axum::http::StatusCode;
use serde_json::json;

use common::{token_from, TestApp};

#[tokio::test]
async fn health_endpoint_responds() -> Result<()> {
    let app = TestApp::new();
    let (status, body) = app.get("/health", &[]).await?;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "ok");
    Ok(())
}

#[tokio::test]
async fn signup_token_authenticates_whoami() -> Result<()> {
    let app = TestApp::new();
    let (status, body) = app
        .post("/auth/signup", &[], json!({ "email": "ada@example.com", "name": "Ada" }))
        .await?;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["expires_in"], 24 * 3600);

    let token = token_from(&body)?;
    let bearer = format!("Bearer {}", token);
    let (status, whoami) = app.get("/api/auth/whoami", &[("authorization", bearer.as_str())]).await?;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(whoami["data"]["principal"], body["data"]["user_id"]);
    Ok(())
}

#[tokio::test]
async fn login_issues_token_for_existing_account() -> Result<()> {
    let app = TestApp::new();
    app.signup("grace@example.com").await?;

    let (status, body) = app.post("/auth/login", &[], json!({ "email": "grace@example.com" })).await?;
    assert_eq!(status, StatusCode::OK);
    assert!(token_from(&body).is_ok());

    let (status, body) = app.post("/auth/login", &[], json!({ "email": "nobody@example.com" })).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "user not found");
    Ok(())
}

#[tokio::test]
async fn duplicate_signup_is_conflict() -> Result<()> {
    let app = TestApp::new();
    app.signup("dup@example.com").await?;

    let (status, body) = app
        .post("/auth/signup", &[], json!({ "email": "DUP@example.com", "name": "Again" }))
        .await?;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "CONFLICT");
    Ok(())
}

#[tokio::test]
async fn invalid_signup_is_bad_request() -> Result<()> {
    let app = TestApp::new();
    let (status, _) = app
        .post("/auth/signup", &[], json!({ "email": "no-at-sign", "name": "X" }))
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn protected_routes_require_a_valid_bearer_token() -> Result<()> {
    let app = TestApp::new();

    let (status, body) = app.get("/api/auth/whoami", &[]).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "UNAUTHORIZED");

    let cases = ["Bearer not-a-token", "Basic dXNlcjpwYXNz", "Bearer "];
    for header in cases {
        let (status, _) = app.get("/api/auth/whoami", &[("authorization", header)]).await?;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "header {:?}", header);
    }
    Ok(())
}

#[tokio::test]
async fn api_key_is_not_accepted_on_session_routes() -> Result<()> {
    let app = TestApp::new();
    let session = app.signup("mixed@example.com").await?;
    let secret = app.create_key(&session, 1, &[]).await?;

    let (status, _) = app.get("/api/auth/whoami", &[("x-api-key", secret.as_str())]).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    Ok(())
}
