mod common;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::http::StatusCode;
use chrono::{DateTime, Timelike};

use common::TestApp;

#[tokio::test]
async fn requests_past_the_project_limit_are_rejected() -> Result<()> {
    let app = TestApp::new();
    app.db.set_project_limit(11, 2).await;
    let session = app.signup("limited@example.com").await?;
    let secret = app.create_key(&session, 11, &[]).await?;
    let key = [("x-api-key", secret.as_str())];

    for _ in 0..2 {
        let (status, _) = app.get("/sdk/scope", &key).await?;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, body) = app.get("/sdk/scope", &key).await?;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["error"], "Rate limit exceeded for this project");
    assert_eq!(body["limit"], 2);

    let reset = DateTime::parse_from_rfc3339(body["reset"].as_str().unwrap_or_default())?;
    assert_eq!((reset.minute(), reset.second()), (0, 0));
    assert!(reset > chrono::Utc::now());
    Ok(())
}

#[tokio::test]
async fn projects_without_a_configured_limit_use_the_default() -> Result<()> {
    let app = TestApp::with_vars(&[("RATE_LIMIT_DEFAULT_PER_HOUR", "1")]);
    let session = app.signup("default@example.com").await?;
    let secret = app.create_key(&session, 12, &[]).await?;
    let key = [("x-api-key", secret.as_str())];

    assert_eq!(app.get("/sdk/scope", &key).await?.0, StatusCode::OK);
    let (status, body) = app.get("/sdk/scope", &key).await?;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["limit"], 1);
    Ok(())
}

#[tokio::test]
async fn limits_are_counted_per_project() -> Result<()> {
    let app = TestApp::new();
    app.db.set_project_limit(1, 1).await;
    app.db.set_project_limit(2, 1).await;
    let session = app.signup("two-projects@example.com").await?;
    let first = app.create_key(&session, 1, &[]).await?;
    let second = app.create_key(&session, 2, &[]).await?;

    assert_eq!(app.get("/sdk/scope", &[("x-api-key", first.as_str())]).await?.0, StatusCode::OK);
    assert_eq!(
        app.get("/sdk/scope", &[("x-api-key", first.as_str())]).await?.0,
        StatusCode::TOO_MANY_REQUESTS
    );
    assert_eq!(app.get("/sdk/scope", &[("x-api-key", second.as_str())]).await?.0, StatusCode::OK);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_requests_admit_exactly_the_limit() -> Result<()> {
    let app = Arc::new(TestApp::new());
    app.db.set_project_limit(21, 10).await;
    let session = app.signup("burst@example.com").await?;
    let secret = Arc::new(app.create_key(&session, 21, &[]).await?);

    let handles: Vec<_> = (0..50)
        .map(|_| {
            let app = app.clone();
            let secret = secret.clone();
            tokio::spawn(async move { app.get("/sdk/scope", &[("x-api-key", secret.as_str())]).await })
        })
        .collect();

    let mut admitted = 0;
    let mut rejected = 0;
    for handle in handles {
        match handle.await??.0 {
            StatusCode::OK => admitted += 1,
            StatusCode::TOO_MANY_REQUESTS => rejected += 1,
            other => anyhow::bail!("unexpected status {}", other),
        }
    }
    assert_eq!((admitted, rejected), (10, 40));
    Ok(())
}

#[tokio::test]
async fn reaching_the_limit_records_one_critical_alert() -> Result<()> {
    let app = TestApp::new();
    app.db.set_project_limit(31, 100).await;
    let session = app.signup("alerts@example.com").await?;
    let secret = app.create_key(&session, 31, &[]).await?;
    let key = [("x-api-key", secret.as_str())];

    for _ in 0..100 {
        assert_eq!(app.get("/sdk/scope", &key).await?.0, StatusCode::OK);
    }
    for _ in 0..5 {
        assert_eq!(app.get("/sdk/scope", &key).await?.0, StatusCode::TOO_MANY_REQUESTS);
    }

    // Alerts are recorded off the request path
    let mut alerts = Vec::new();
    for _ in 0..50 {
        alerts = app.db.alerts().await;
        if !alerts.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].project_id, 31);
    assert_eq!(alerts[0].severity.as_str(), "critical");
    assert_eq!(alerts[0].alert_type, "api_limit");
    assert_eq!(alerts[0].request_count, 100);
    Ok(())
}

#[tokio::test]
async fn session_routes_are_not_rate_limited() -> Result<()> {
    let app = TestApp::with_vars(&[("RATE_LIMIT_DEFAULT_PER_HOUR", "1")]);
    let session = app.signup("unlimited@example.com").await?;
    let bearer = format!("Bearer {}", session);

    for _ in 0..5 {
        let (status, _) = app.get("/api/auth/whoami", &[("authorization", bearer.as_str())]).await?;
        assert_eq!(status, StatusCode::OK);
    }
    Ok(())
}
