mod common;

use anyhow::Result;
use axum::http::{Method, StatusCode};
use serde_json::json;

use common::TestApp;

#[tokio::test]
async fn api_key_grants_scoped_sdk_access() -> Result<()> {
    let app = TestApp::new();
    let session = app.signup("owner@example.com").await?;
    let secret = app.create_key(&session, 42, &[3, 5]).await?;
    assert_eq!(secret.len(), 64);

    let (status, body) = app.get("/sdk/scope", &[("x-api-key", secret.as_str())]).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["project_id"], 42);
    assert_eq!(body["data"]["collection_ids"], json!([3, 5]));
    assert_eq!(body["data"]["usage"]["count"], 1);

    let (status, _) = app.get("/sdk/collections/5", &[("x-api-key", secret.as_str())]).await?;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app.get("/sdk/collections/9", &[("x-api-key", secret.as_str())]).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "FORBIDDEN");
    Ok(())
}

#[tokio::test]
async fn sdk_routes_require_an_api_key() -> Result<()> {
    let app = TestApp::new();
    let session = app.signup("bearer-only@example.com").await?;
    let bearer = format!("Bearer {}", session);

    let (status, body) = app.get("/sdk/scope", &[]).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "X-Api-Key header is required");

    let (status, _) = app.get("/sdk/scope", &[("authorization", bearer.as_str())]).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app.get("/sdk/scope", &[("x-api-key", "deadbeef")]).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn revoked_and_deleted_keys_stop_working() -> Result<()> {
    let app = TestApp::new();
    let session = app.signup("revoker@example.com").await?;
    let bearer = format!("Bearer {}", session);
    let auth = [("authorization", bearer.as_str())];

    let revoked = app.create_key(&session, 7, &[]).await?;
    let deleted = app.create_key(&session, 7, &[]).await?;

    let (status, keys) = app.get("/api/projects/7/keys", &auth).await?;
    assert_eq!(status, StatusCode::OK);
    let keys = keys["data"].as_array().cloned().unwrap_or_default();
    assert_eq!(keys.len(), 2);
    assert!(keys.iter().all(|k| k.get("secret_hash").is_none()));

    // Creation order is the id order in the in-memory store
    let mut ids: Vec<i64> = keys.iter().filter_map(|k| k["id"].as_i64()).collect();
    ids.sort();
    let (revoked_id, deleted_id) = (ids[0], ids[1]);

    let (status, body) = app
        .post(&format!("/api/keys/{}/revoke", revoked_id), &auth, json!({}))
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["revoked"], true);

    let (status, _) = app
        .request(Method::DELETE, &format!("/api/keys/{}", deleted_id), &auth, None)
        .await?;
    assert_eq!(status, StatusCode::NO_CONTENT);

    for secret in [&revoked, &deleted] {
        let (status, _) = app.get("/sdk/scope", &[("x-api-key", secret.as_str())]).await?;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
    Ok(())
}

#[tokio::test]
async fn only_the_owner_can_revoke() -> Result<()> {
    let app = TestApp::new();
    let owner = app.signup("first@example.com").await?;
    let intruder = app.signup("second@example.com").await?;
    let secret = app.create_key(&owner, 1, &[]).await?;

    let owner_bearer = format!("Bearer {}", owner);
    let (_, keys) = app.get("/api/projects/1/keys", &[("authorization", owner_bearer.as_str())]).await?;
    let id = keys["data"][0]["id"].as_i64().unwrap_or_default();

    let intruder_bearer = format!("Bearer {}", intruder);
    let (status, _) = app
        .post(
            &format!("/api/keys/{}/revoke", id),
            &[("authorization", intruder_bearer.as_str())],
            json!({}),
        )
        .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app.get("/sdk/scope", &[("x-api-key", secret.as_str())]).await?;
    assert_eq!(status, StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn validate_endpoint_returns_scoped_token() -> Result<()> {
    let app = TestApp::new();
    let session = app.signup("exchange@example.com").await?;
    let secret = app.create_key(&session, 9, &[1]).await?;

    let (status, body) = app.get(&format!("/auth/keys/validate?key={}", secret), &[]).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["project_id"], 9);
    assert_eq!(body["data"]["collection_ids"], json!([1]));

    let token = body["data"]["token"].as_str().unwrap_or_default();
    assert_eq!(token.split('.').count(), 3);

    let (status, _) = app.get("/auth/keys/validate?key=unknown", &[]).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn expired_keys_are_forbidden() -> Result<()> {
    let app = TestApp::new();
    let session = app.signup("stale@example.com").await?;
    let secret = app.create_key(&session, 1, &[]).await?;
    app.db.expire_keys().await;

    let (status, _) = app.get("/sdk/scope", &[("x-api-key", secret.as_str())]).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    Ok(())
}

#[tokio::test]
async fn blank_key_name_is_bad_request() -> Result<()> {
    let app = TestApp::new();
    let session = app.signup("blank@example.com").await?;
    let bearer = format!("Bearer {}", session);

    let (status, _) = app
        .post(
            "/api/projects/1/keys",
            &[("authorization", bearer.as_str())],
            json!({ "name": "   " }),
        )
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn keys_cannot_be_minted_for_another_accounts_project() -> Result<()> {
    let app = TestApp::new();
    let owner = app.signup("project-owner@example.com").await?;
    let intruder = app.signup("project-squatter@example.com").await?;
    app.create_key(&owner, 77, &[]).await?;

    let bearer = format!("Bearer {}", intruder);
    let (status, body) = app
        .post(
            "/api/projects/77/keys",
            &[("authorization", bearer.as_str())],
            json!({ "name": "borrowed budget" }),
        )
        .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "project belongs to another account");

    // A fresh project is claimed by whoever mints its first key
    assert!(app.create_key(&intruder, 78, &[]).await.is_ok());
    Ok(())
}
