//! Access gateway: the admission decision made once per request before any protected
//! handler runs.
//!
//! Order matters. An identity-provider session admits outright; with no PIN configured
//! everything is admitted; otherwise the request must carry the PIN (cookie or `x-pin`)
//! and it is compared against the secret directly. Attempt lockout is never consulted
//! here, so a previously issued cookie keeps working while new guesses are locked out.

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::debug;

use crate::error::AppError;
use crate::identity::{IdentityGate, PinAuthenticator, RequestContext, LOGIN_PAGE};

use super::{found, AppState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admit,
    /// 401 JSON for API / XHR callers.
    Reject,
    RedirectToLogin,
}

pub fn decide(identity: &IdentityGate, pin: &PinAuthenticator, ctx: &RequestContext) -> Admission {
    if identity.is_authenticated(ctx) {
        return Admission::Admit;
    }
    if pin.check_credential(ctx.pin.as_deref()) {
        return Admission::Admit;
    }
    if ctx.is_api() || ctx.wants_json {
        return Admission::Reject;
    }
    if ctx.path != LOGIN_PAGE && !identity.is_auth_flow_path(&ctx.path) {
        return Admission::RedirectToLogin;
    }
    // the login page itself must be reachable without a credential
    Admission::Admit
}

pub async fn access_gateway(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let (parts, body) = req.into_parts();
    let ctx = state.request_context(&parts);
    match decide(&state.identity, &state.pin, &ctx) {
        Admission::Admit => next.run(Request::from_parts(parts, body)).await,
        Admission::Reject => {
            debug!(client = %ctx.client_ip, path = %ctx.path, "rejected unauthenticated api request");
            AppError::Unauthenticated.into_response()
        }
        Admission::RedirectToLogin => {
            debug!(client = %ctx.client_ip, path = %ctx.path, "redirecting to login");
            found(LOGIN_PAGE)
        }
    }
}
