use std::sync::Arc;

use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::{AppError, AppResult};

use super::oidc::{OidcClient, CALLBACK_PATH};
use super::principal::UserProfile;
use super::request_context::RequestContext;

pub const LOGIN_PAGE: &str = "/login";
pub const AUTH_LOGIN_PATH: &str = "/auth/login";
pub const LOGOUT_PATH: &str = "/logout";

/// Identity provider capability, chosen once at startup.
///
/// `Disabled` is the stub used when OIDC is not configured or discovery failed: nobody is
/// ever authenticated through it and its login sends the browser to the PIN page.
#[derive(Clone)]
pub enum IdentityGate {
    Disabled,
    Oidc(Arc<OidcClient>),
}

/// Result of a logout: where to go next and whether an identity session cookie should be
/// cleared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogoutOutcome {
    pub location: String,
    pub clear_session: bool,
}

impl IdentityGate {
    /// Build from configuration. Missing settings or a failed discovery degrade to
    /// `Disabled`; startup never fails here.
    pub async fn from_config(cfg: &Config) -> Self {
        let Some(oidc) = &cfg.oidc else {
            info!("OIDC not configured; PIN authentication only");
            return IdentityGate::Disabled;
        };
        match OidcClient::discover(oidc, &cfg.base_url).await {
            Ok(client) => IdentityGate::Oidc(Arc::new(client)),
            Err(e) => {
                let err = AppError::IdentityProviderUnavailable(format!("{:#}", e));
                error!(error = %err, "OIDC disabled; falling back to PIN authentication");
                IdentityGate::Disabled
            }
        }
    }

    pub fn is_enabled(&self) -> bool { matches!(self, IdentityGate::Oidc(_)) }

    pub fn is_authenticated(&self, ctx: &RequestContext) -> bool { self.current_user(ctx).is_some() }

    pub fn current_user(&self, ctx: &RequestContext) -> Option<UserProfile> {
        match self {
            IdentityGate::Disabled => None,
            IdentityGate::Oidc(c) => c.sessions.validate(ctx.session_token.as_deref()?),
        }
    }

    /// Location to redirect to in order to start a login.
    pub fn login(&self, force_prompt: bool, return_to: Option<&str>) -> String {
        match self {
            IdentityGate::Disabled => LOGIN_PAGE.to_string(),
            IdentityGate::Oidc(c) => c.authorization_url(force_prompt, return_to),
        }
    }

    /// Complete a provider callback. Returns the new session token and landing path.
    pub async fn callback(&self, code: &str, state: &str) -> AppResult<(String, String)> {
        match self {
            IdentityGate::Disabled => Err(AppError::IdentityProviderUnavailable("OIDC is not configured".into())),
            IdentityGate::Oidc(c) => c.complete(code, state).await.map_err(|e| {
                warn!(error = %format!("{:#}", e), "OIDC callback failed");
                AppError::IdentityProviderUnavailable(e.to_string())
            }),
        }
    }

    pub fn logout(&self, ctx: &RequestContext) -> LogoutOutcome {
        match self {
            IdentityGate::Disabled => LogoutOutcome { location: LOGIN_PAGE.to_string(), clear_session: false },
            IdentityGate::Oidc(c) => {
                if let Some(t) = ctx.session_token.as_deref() {
                    c.sessions.logout(t);
                }
                LogoutOutcome { location: c.logout_url(), clear_session: true }
            }
        }
    }

    /// Paths owned by the identity flow, reachable without a credential.
    pub fn is_auth_flow_path(&self, path: &str) -> bool {
        self.is_enabled() && (path == AUTH_LOGIN_PATH || path == CALLBACK_PATH || path == LOGOUT_PATH)
    }

    pub fn sweep(&self) -> usize {
        match self {
            IdentityGate::Disabled => 0,
            IdentityGate::Oidc(c) => c.sweep(),
        }
    }
}
