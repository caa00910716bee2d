//! End-to-end PIN gate tests through the full router: verification, lockout, cookie
//! issuance and gateway admission for API and browser callers.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::body::Body;
use axum::http::{header, HeaderMap, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use dumbdo::config::Config;
use dumbdo::identity::{IdentityGate, ManualClock, LOCKOUT_TIME};
use dumbdo::server::{router, AppState};

struct Harness {
    app: Router,
    clock: Arc<ManualClock>,
    _dirs: (TempDir, TempDir),
}

async fn harness(pin: Option<&str>) -> Result<Harness> {
    let data = tempfile::tempdir()?;
    let public = tempfile::tempdir()?;
    std::fs::write(public.path().join("index.html"), "<h1>lists</h1>")?;
    std::fs::write(public.path().join("login.html"), "<h1>login</h1>")?;
    std::fs::write(public.path().join("login.js"), "// login")?;

    let config = Config {
        pin: pin.map(str::to_string),
        data_dir: data.path().to_path_buf(),
        public_dir: public.path().to_path_buf(),
        ..Default::default()
    };
    let clock = Arc::new(ManualClock::new());
    let state = AppState::new(config, IdentityGate::Disabled, clock.clone());
    state.items.init().await?;
    Ok(Harness { app: router(state), clock, _dirs: (data, public) })
}

struct Reply {
    status: StatusCode,
    headers: HeaderMap,
    body: Vec<u8>,
}

impl Reply {
    fn json(&self) -> Value { serde_json::from_slice(&self.body).unwrap_or(Value::Null) }

    fn location(&self) -> Option<&str> { self.headers.get(header::LOCATION).and_then(|v| v.to_str().ok()) }

    fn set_cookies(&self) -> Vec<String> {
        self.headers.get_all(header::SET_COOKIE).iter().filter_map(|v| v.to_str().ok()).map(str::to_string).collect()
    }
}

async fn send(app: &Router, req: Request<Body>) -> Result<Reply> {
    let resp = app.clone().oneshot(req).await?;
    let status = resp.status();
    let headers = resp.headers().clone();
    let body = resp.into_body().collect().await?.to_bytes().to_vec();
    Ok(Reply { status, headers, body })
}

fn get(path: &str, client: &str) -> axum::http::request::Builder {
    Request::builder().method("GET").uri(path).header("x-forwarded-for", client)
}

fn verify(client: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/verify-pin")
        .header("x-forwarded-for", client)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn pin_requirement_reports_length_and_attempts() -> Result<()> {
    let h = harness(Some("1234")).await?;
    let r = send(&h.app, get("/api/pin-required", "10.0.0.1").body(Body::empty())?).await?;
    assert_eq!(r.status, StatusCode::OK);
    assert_eq!(r.json(), json!({ "required": true, "length": 4, "locked": false, "attemptsLeft": 5, "lockoutMinutes": 0 }));
    Ok(())
}

#[tokio::test]
async fn lockout_after_five_failures_then_recovery() -> Result<()> {
    let h = harness(Some("1234")).await?;
    let client = "10.0.0.2";

    for expected_left in (0..5).rev() {
        let r = send(&h.app, verify(client, json!({ "pin": "0000" }))).await?;
        assert_eq!(r.status, StatusCode::UNAUTHORIZED);
        let body = r.json();
        assert_eq!(body["valid"], false);
        assert_eq!(body["attemptsLeft"], expected_left);
    }

    // locked: even the right PIN is refused
    let r = send(&h.app, verify(client, json!({ "pin": "1234" }))).await?;
    assert_eq!(r.status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(r.json()["locked"], true);
    assert_eq!(r.json()["lockoutMinutes"], 15);

    // another client is unaffected
    let r = send(&h.app, verify("10.0.0.3", json!({ "pin": "1234" }))).await?;
    assert_eq!(r.status, StatusCode::OK);

    let r = send(&h.app, get("/api/pin-required", client).body(Body::empty())?).await?;
    assert_eq!(r.json()["locked"], true);

    h.clock.advance(LOCKOUT_TIME + Duration::from_secs(1));
    let r = send(&h.app, verify(client, json!({ "pin": "1234" }))).await?;
    assert_eq!(r.status, StatusCode::OK);
    assert_eq!(r.json(), json!({ "valid": true }));
    let cookies = r.set_cookies();
    assert_eq!(cookies.len(), 1);
    assert!(cookies[0].starts_with("DUMBDO_PIN=1234;"));
    assert!(cookies[0].contains("HttpOnly"));
    assert!(cookies[0].contains("SameSite=Strict"));
    assert!(!cookies[0].contains("Secure"));
    Ok(())
}

#[tokio::test]
async fn malformed_submissions_count_as_attempts() -> Result<()> {
    let h = harness(Some("1234")).await?;
    let client = "10.0.0.4";

    let r = send(&h.app, verify(client, json!({ "pin": "12" }))).await?;
    assert_eq!(r.status, StatusCode::UNAUTHORIZED);
    assert_eq!(r.json()["error"], "PIN must be between 4 and 10 digits");
    assert_eq!(r.json()["attemptsLeft"], 4);

    let r = send(&h.app, verify(client, json!({ "pin": 1234 }))).await?;
    assert_eq!(r.status, StatusCode::UNAUTHORIZED);
    assert_eq!(r.json()["attemptsLeft"], 3);

    // success clears the record entirely
    let r = send(&h.app, verify(client, json!({ "pin": "1234" }))).await?;
    assert_eq!(r.status, StatusCode::OK);
    let r = send(&h.app, get("/api/pin-required", client).body(Body::empty())?).await?;
    assert_eq!(r.json()["attemptsLeft"], 5);
    Ok(())
}

#[tokio::test]
async fn gateway_rejects_api_and_redirects_pages() -> Result<()> {
    let h = harness(Some("1234")).await?;

    let r = send(&h.app, get("/api/items", "10.0.1.1").body(Body::empty())?).await?;
    assert_eq!(r.status, StatusCode::UNAUTHORIZED);
    assert_eq!(r.json(), json!({ "error": "Authentication required", "loginUrl": "/login" }));

    let r = send(&h.app, get("/", "10.0.1.1").header(header::ACCEPT, "text/html").body(Body::empty())?).await?;
    assert_eq!(r.status, StatusCode::FOUND);
    assert_eq!(r.location(), Some("/login"));

    let r = send(&h.app, get("/index.html", "10.0.1.1").header("x-requested-with", "XMLHttpRequest").body(Body::empty())?).await?;
    assert_eq!(r.status, StatusCode::UNAUTHORIZED);

    let r = send(&h.app, get("/login", "10.0.1.1").body(Body::empty())?).await?;
    assert_eq!(r.status, StatusCode::OK);
    assert_eq!(r.body, b"<h1>login</h1>");

    // login assets and the site title are public
    let r = send(&h.app, get("/login.js", "10.0.1.1").body(Body::empty())?).await?;
    assert_eq!(r.status, StatusCode::OK);
    let r = send(&h.app, get("/api/config", "10.0.1.1").body(Body::empty())?).await?;
    assert_eq!(r.status, StatusCode::OK);
    assert_eq!(r.json(), json!({ "siteTitle": "DumbDo" }));
    Ok(())
}

#[tokio::test]
async fn credential_admits_by_cookie_or_header() -> Result<()> {
    let h = harness(Some("1234")).await?;

    let r = send(&h.app, get("/api/items", "10.0.2.1").header(header::COOKIE, "DUMBDO_PIN=1234").body(Body::empty())?).await?;
    assert_eq!(r.status, StatusCode::OK);
    assert_eq!(r.json(), json!({}));

    let r = send(&h.app, get("/api/items", "10.0.2.1").header("x-pin", "1234").body(Body::empty())?).await?;
    assert_eq!(r.status, StatusCode::OK);

    // an empty cookie does not shadow the header
    let r = send(&h.app, get("/api/items", "10.0.2.1").header(header::COOKIE, "DUMBDO_PIN=").header("x-pin", "1234").body(Body::empty())?).await?;
    assert_eq!(r.status, StatusCode::OK);

    let r = send(&h.app, get("/api/items", "10.0.2.1").header(header::COOKIE, "DUMBDO_PIN=4321").body(Body::empty())?).await?;
    assert_eq!(r.status, StatusCode::UNAUTHORIZED);

    let r = send(&h.app, get("/", "10.0.2.1").header(header::COOKIE, "DUMBDO_PIN=1234").body(Body::empty())?).await?;
    assert_eq!(r.status, StatusCode::OK);
    assert_eq!(r.body, b"<h1>lists</h1>");

    // an authorized visit to the login page goes home
    let r = send(&h.app, get("/login", "10.0.2.1").header(header::COOKIE, "DUMBDO_PIN=1234").body(Body::empty())?).await?;
    assert_eq!(r.status, StatusCode::FOUND);
    assert_eq!(r.location(), Some("/"));
    Ok(())
}

#[tokio::test]
async fn issued_cookie_survives_later_lockout() -> Result<()> {
    let h = harness(Some("1234")).await?;
    let client = "10.0.3.1";
    let r = send(&h.app, verify(client, json!({ "pin": "1234" }))).await?;
    assert_eq!(r.status, StatusCode::OK);
    for _ in 0..5 {
        send(&h.app, verify(client, json!({ "pin": "9999" }))).await?;
    }
    let r = send(&h.app, verify(client, json!({ "pin": "1234" }))).await?;
    assert_eq!(r.status, StatusCode::TOO_MANY_REQUESTS);

    let r = send(&h.app, get("/api/items", client).header(header::COOKIE, "DUMBDO_PIN=1234").body(Body::empty())?).await?;
    assert_eq!(r.status, StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn no_pin_configured_admits_everything() -> Result<()> {
    let h = harness(None).await?;
    let r = send(&h.app, get("/api/pin-required", "10.0.4.1").body(Body::empty())?).await?;
    assert_eq!(r.json()["required"], false);

    let r = send(&h.app, get("/api/items", "10.0.4.1").body(Body::empty())?).await?;
    assert_eq!(r.status, StatusCode::OK);

    let r = send(&h.app, verify("10.0.4.1", json!({}))).await?;
    assert_eq!(r.status, StatusCode::OK);
    assert_eq!(r.json()["valid"], true);
    Ok(())
}

#[tokio::test]
async fn items_api_round_trip_and_sharing() -> Result<()> {
    let h = harness(Some("1234")).await?;
    let save = Request::builder()
        .method("POST")
        .uri("/api/items")
        .header("x-pin", "1234")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json!({ "Todo": [{ "text": "share me", "shared": true, "completed": true }] }).to_string()))?;
    let r = send(&h.app, save).await?;
    assert_eq!(r.json(), json!({ "success": true }));

    let r = send(&h.app, get("/api/items", "10.0.5.1").header("x-pin", "1234").body(Body::empty())?).await?;
    let item = r.json()["Todo"][0].clone();
    assert!(item.get("completed").is_none());
    let id = item["id"].as_str().unwrap_or_default().to_string();
    assert!(!id.is_empty());

    let r = send(&h.app, get(&format!("/api/shared/{}", id), "10.0.5.1").header("x-pin", "1234").body(Body::empty())?).await?;
    assert_eq!(r.json(), json!({ "text": "share me" }));

    let r = send(&h.app, get("/api/shared/nope", "10.0.5.1").header("x-pin", "1234").body(Body::empty())?).await?;
    assert_eq!(r.status, StatusCode::NOT_FOUND);

    let r = send(&h.app, get("/api/status", "10.0.5.1").header("x-pin", "1234").body(Body::empty())?).await?;
    assert_eq!(r.json()["status"], "ok");
    let r = send(&h.app, get("/api/config", "10.0.5.1").header("x-pin", "1234").body(Body::empty())?).await?;
    assert_eq!(r.json(), json!({ "siteTitle": "DumbDo" }));
    Ok(())
}

#[tokio::test]
async fn logout_clears_pin_cookie() -> Result<()> {
    let h = harness(Some("1234")).await?;
    let r = send(&h.app, get("/logout", "10.0.6.1").header(header::COOKIE, "DUMBDO_PIN=1234").body(Body::empty())?).await?;
    assert_eq!(r.status, StatusCode::FOUND);
    assert_eq!(r.location(), Some("/login"));
    let cookies = r.set_cookies();
    assert_eq!(cookies.len(), 1);
    assert!(cookies[0].starts_with("DUMBDO_PIN=deleted;"));
    assert!(cookies[0].contains("Max-Age=0"));
    Ok(())
}
