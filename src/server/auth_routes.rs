use axum::extract::{Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use crate::error::AppError;
use crate::identity::{PinRequirement, RequestContext, LOGIN_PAGE};

use super::{found, static_files, AppState};

pub async fn pin_required(State(state): State<AppState>, ctx: RequestContext) -> Json<PinRequirement> {
    Json(state.pin.requirement(&ctx.client_ip))
}

pub async fn verify_pin(State(state): State<AppState>, ctx: RequestContext, Json(body): Json<serde_json::Value>) -> Response {
    let provided = body.get("pin").and_then(|v| v.as_str());
    match state.pin.verify(provided, &ctx.client_ip).await {
        Ok(()) => {
            info!(client = %ctx.client_ip, "pin verified");
            let mut resp = Json(json!({ "valid": true })).into_response();
            if let Some(cookie) = state.pin_cookie().set(provided.unwrap_or_default()) {
                resp.headers_mut().insert(header::SET_COOKIE, cookie);
            }
            resp
        }
        Err(e) => e.into_response(),
    }
}

pub async fn auth_status(State(state): State<AppState>, ctx: RequestContext) -> Json<serde_json::Value> {
    let user = state.identity.current_user(&ctx);
    Json(json!({
        "isAuthenticated": user.is_some(),
        "user": user,
        "pinEnabled": state.pin.is_enabled(),
    }))
}

/// Already-authorized callers go home; everyone else gets the login page.
pub async fn login_page(State(state): State<AppState>, ctx: RequestContext) -> Response {
    if state.identity.is_authenticated(&ctx) || state.pin.check_credential(ctx.pin.as_deref()) {
        return found("/");
    }
    static_files::serve(&state.config.public_dir, "login.html").await
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginQuery {
    #[serde(default)]
    prompt: Option<String>,
    #[serde(default)]
    return_to: Option<String>,
}

pub async fn auth_login(State(state): State<AppState>, Query(q): Query<LoginQuery>) -> Response {
    let force = q.prompt.as_deref() == Some("login");
    found(&state.identity.login(force, q.return_to.as_deref()))
}

#[derive(Debug, Default, Deserialize)]
pub struct CallbackQuery {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

/// Provider errors never surface to the browser as failures: they are logged and the user
/// lands on the PIN login page.
pub async fn auth_callback(State(state): State<AppState>, Query(q): Query<CallbackQuery>) -> Response {
    if let Some(err) = &q.error {
        warn!(error = %err, description = ?q.error_description, "identity provider returned an error");
        return found(LOGIN_PAGE);
    }
    let (Some(code), Some(login_state)) = (q.code.as_deref(), q.state.as_deref()) else {
        return found(LOGIN_PAGE);
    };
    match state.identity.callback(code, login_state).await {
        Ok((token, return_to)) => {
            let mut resp = found(&return_to);
            if let Some(cookie) = state.session_cookie().set(&token) {
                resp.headers_mut().insert(header::SET_COOKIE, cookie);
            }
            resp
        }
        Err(AppError::IdentityProviderUnavailable(_)) => found(LOGIN_PAGE),
        Err(e) => e.into_response(),
    }
}

/// Clears the PIN credential and any identity session, then follows the provider's
/// post-logout location.
pub async fn logout(State(state): State<AppState>, ctx: RequestContext) -> Response {
    let outcome = state.identity.logout(&ctx);
    let mut resp = found(&outcome.location);
    if let Some(c) = state.pin_cookie().clear() {
        resp.headers_mut().append(header::SET_COOKIE, c);
    }
    if outcome.clear_session {
        if let Some(c) = state.session_cookie().clear() {
            resp.headers_mut().append(header::SET_COOKIE, c);
        }
    }
    resp
}
