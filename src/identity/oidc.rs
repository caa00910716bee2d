//! OpenID Connect authorization-code login, built on the `openidconnect` crate.
//!
//! Discovery (provider metadata plus JWKS) runs once at startup. Each login parks
//! `{state -> nonce, PKCE verifier, return_to}` for ten minutes; the callback exchanges the
//! code, has the library verify the ID token (signature, issuer, audience, expiry, nonce),
//! merges userinfo when the provider offers it and opens a server-side session.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Context, Result};
use openidconnect::core::{
    CoreAuthDisplay, CoreAuthPrompt, CoreAuthenticationFlow, CoreClaimName, CoreClaimType, CoreClient,
    CoreClientAuthMethod, CoreGrantType, CoreJsonWebKey, CoreJweContentEncryptionAlgorithm,
    CoreJweKeyManagementAlgorithm, CoreResponseMode, CoreResponseType, CoreSubjectIdentifierType, CoreUserInfoClaims,
};
use openidconnect::{
    AdditionalProviderMetadata, Audience, AuthorizationCode, ClientId, ClientSecret, CsrfToken, EndSessionUrl,
    EndpointMaybeSet, EndpointNotSet, EndpointSet, IssuerUrl, LogoutRequest, Nonce, OAuth2TokenResponse,
    PkceCodeChallenge, PkceCodeVerifier, PostLogoutRedirectUrl, ProviderMetadata, RedirectUrl, Scope, TokenResponse,
    UserInfoError,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::OidcConfig;

use super::clock::{Clock, SystemClock};
use super::principal::UserProfile;
use super::session::SessionStore;

pub const CALLBACK_PATH: &str = "/auth/callback";
/// Requested on top of `openid`, which the library always adds.
pub const EXTRA_SCOPES: [&str; 2] = ["profile", "email"];
const PENDING_TTL: Duration = Duration::from_secs(10 * 60);

/// RP-initiated logout endpoint, which core discovery metadata does not model.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SessionEndpoints {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_session_endpoint: Option<EndSessionUrl>,
}

impl AdditionalProviderMetadata for SessionEndpoints {}

pub type OidcProviderMetadata = ProviderMetadata<
    SessionEndpoints,
    CoreAuthDisplay,
    CoreClientAuthMethod,
    CoreClaimName,
    CoreClaimType,
    CoreGrantType,
    CoreJweContentEncryptionAlgorithm,
    CoreJweKeyManagementAlgorithm,
    CoreJsonWebKey,
    CoreResponseMode,
    CoreResponseType,
    CoreSubjectIdentifierType,
>;

type DiscoveredClient =
    CoreClient<EndpointSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointMaybeSet, EndpointMaybeSet>;

#[derive(Debug)]
struct PendingLogin {
    nonce: Nonce,
    pkce_verifier: PkceCodeVerifier,
    return_to: String,
    created_at: Instant,
}

pub struct OidcClient {
    client: DiscoveredClient,
    client_id: ClientId,
    audience: Option<String>,
    end_session: Option<EndSessionUrl>,
    post_logout_uri: PostLogoutRedirectUrl,
    http: reqwest::Client,
    pending: Mutex<HashMap<String, PendingLogin>>,
    clock: Arc<dyn Clock>,
    pub sessions: SessionStore,
}

/// Flatten a library error and its sources into one message.
fn describe(what: &str, err: impl std::error::Error) -> anyhow::Error {
    let mut msg = format!("{}: {}", what, err);
    let mut source = err.source();
    while let Some(s) = source {
        msg.push_str(&format!(": {}", s));
        source = s.source();
    }
    anyhow!(msg)
}

macro_rules! profile_from {
    ($claims:expr) => {{
        let c = $claims;
        UserProfile {
            sub: c.subject().as_str().to_string(),
            email: c.email().map(|e| e.as_str().to_string()),
            name: c.name().and_then(|n| n.get(None)).map(|n| n.as_str().to_string()),
            picture: c.picture().and_then(|p| p.get(None)).map(|p| p.as_str().to_string()),
        }
    }};
}

impl OidcClient {
    /// Fetch `/.well-known/openid-configuration` and the provider's JWKS, then build the
    /// client.
    pub async fn discover(cfg: &OidcConfig, base_url: &str) -> Result<Self> {
        // no redirects: discovery and token calls must hit the advertised endpoints
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(Duration::from_secs(10))
            .build()
            .context("building http client")?;
        let issuer = IssuerUrl::new(cfg.issuer_url.clone()).context("OIDC_ISSUER_URL")?;
        let meta = OidcProviderMetadata::discover_async(issuer, &http)
            .await
            .map_err(|e| describe("OIDC discovery", e))?;
        info!(issuer = %meta.issuer().as_str(), "OIDC provider discovered");
        Self::from_metadata(cfg.clone(), meta, base_url, http, Arc::new(SystemClock))
    }

    pub fn from_metadata(
        cfg: OidcConfig,
        meta: OidcProviderMetadata,
        base_url: &str,
        http: reqwest::Client,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let base = base_url.trim_end_matches('/');
        let redirect = RedirectUrl::new(format!("{}{}", base, CALLBACK_PATH)).context("BASE_URL")?;
        let post_logout_uri = PostLogoutRedirectUrl::new(format!("{}/", base)).context("BASE_URL")?;
        let end_session = meta.additional_metadata().end_session_endpoint.clone();
        let client_id = ClientId::new(cfg.client_id.clone());
        let client = CoreClient::from_provider_metadata(meta, client_id.clone(), cfg.client_secret.clone().map(ClientSecret::new))
            .set_redirect_uri(redirect);
        Ok(Self {
            client,
            client_id,
            audience: cfg.audience.clone(),
            end_session,
            post_logout_uri,
            http,
            pending: Mutex::new(HashMap::new()),
            sessions: SessionStore::with_clock(cfg.session_secret, clock.clone()),
            clock,
        })
    }

    /// Authorization endpoint URL for a new login; remembers state, nonce and the PKCE
    /// verifier until the callback.
    pub fn authorization_url(&self, force_prompt: bool, return_to: Option<&str>) -> String {
        let (challenge, verifier) = PkceCodeChallenge::new_random_sha256();
        let mut req = self
            .client
            .authorize_url(CoreAuthenticationFlow::AuthorizationCode, CsrfToken::new_random, Nonce::new_random)
            .set_pkce_challenge(challenge);
        for scope in EXTRA_SCOPES {
            req = req.add_scope(Scope::new(scope.to_string()));
        }
        if let Some(aud) = &self.audience {
            req = req.add_extra_param("audience", aud.clone());
        }
        if force_prompt {
            req = req.add_prompt(CoreAuthPrompt::Login);
        }
        let (url, state, nonce) = req.url();

        let return_to = return_to.filter(|r| is_local_path(r)).unwrap_or("/").to_string();
        let pending = PendingLogin { nonce, pkce_verifier: verifier, return_to, created_at: self.clock.now() };
        self.pending.lock().insert(state.secret().clone(), pending);
        url.to_string()
    }

    /// Finish a login. Returns the session token and the local path to land on.
    pub async fn complete(&self, code: &str, state: &str) -> Result<(String, String)> {
        let pending = self.take_pending(state).ok_or_else(|| anyhow!("unknown or expired login state"))?;

        let tokens = self
            .client
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .map_err(|e| describe("token endpoint", e))?
            .set_pkce_verifier(pending.pkce_verifier)
            .request_async(&self.http)
            .await
            .map_err(|e| describe("token request", e))?;
        let id_token = tokens.id_token().ok_or_else(|| anyhow!("token response carried no id_token"))?;

        let (mut profile, subject) = {
            let audience = self.audience.clone();
            let verifier = self
                .client
                .id_token_verifier()
                .set_other_audience_verifier_fn(move |aud: &Audience| audience.as_deref() == Some(aud.as_str()));
            let claims = id_token.claims(&verifier, &pending.nonce).map_err(|e| describe("id token rejected", e))?;
            (profile_from!(claims), claims.subject().clone())
        };

        match self.client.user_info(tokens.access_token().clone(), Some(subject)) {
            Ok(req) => {
                let info: Result<CoreUserInfoClaims, _> = req.request_async(&self.http).await;
                match info {
                    Ok(info) => profile.merge(profile_from!(&info)),
                    Err(UserInfoError::ClaimsVerification(e)) => bail!("userinfo rejected: {}", e),
                    Err(e) => debug!(error = %e, "userinfo unavailable; using ID token claims"),
                }
            }
            Err(_) => debug!("provider has no userinfo endpoint"),
        }

        let token = self.sessions.issue(profile)?;
        Ok((token, pending.return_to))
    }

    fn take_pending(&self, state: &str) -> Option<PendingLogin> {
        let p = self.pending.lock().remove(state)?;
        (self.clock.now().saturating_duration_since(p.created_at) < PENDING_TTL).then_some(p)
    }

    /// Where to send the browser after a local logout.
    pub fn logout_url(&self) -> String {
        match &self.end_session {
            Some(end) => LogoutRequest::from(end.clone())
                .set_client_id(self.client_id.clone())
                .set_post_logout_redirect_uri(self.post_logout_uri.clone())
                .http_get_url()
                .to_string(),
            None => "/".to_string(),
        }
    }

    /// Drop expired pending logins and sessions.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let mut p = self.pending.lock();
        let before = p.len();
        p.retain(|_, v| now.saturating_duration_since(v.created_at) < PENDING_TTL);
        (before - p.len()) + self.sessions.sweep()
    }
}

/// Only same-origin absolute paths are accepted as post-login targets.
fn is_local_path(p: &str) -> bool { p.starts_with('/') && !p.starts_with("//") && !p.contains('\\') }

/// Metadata for a provider at `issuer` with the usual endpoint layout and no keys, for
/// building clients without a network round trip.
#[cfg(test)]
pub(crate) fn static_metadata(issuer: &str, end_session: Option<&str>) -> Result<OidcProviderMetadata> {
    use openidconnect::core::{CoreJwsSigningAlgorithm, CoreResponseType};
    use openidconnect::{AuthUrl, JsonWebKeySetUrl, ResponseTypes, TokenUrl};

    let end_session_endpoint = end_session.map(|u| EndSessionUrl::new(u.to_string())).transpose()?;
    Ok(OidcProviderMetadata::new(
        IssuerUrl::new(issuer.to_string())?,
        AuthUrl::new(format!("{}/authorize", issuer))?,
        JsonWebKeySetUrl::new(format!("{}/jwks", issuer))?,
        vec![ResponseTypes::new(vec![CoreResponseType::Code])],
        vec![CoreSubjectIdentifierType::Public],
        vec![CoreJwsSigningAlgorithm::RsaSsaPkcs1V15Sha256],
        SessionEndpoints { end_session_endpoint },
    )
    .set_token_endpoint(Some(TokenUrl::new(format!("{}/token", issuer))?)))
}

/// Client for a provider that is never contacted.
#[cfg(test)]
pub(crate) fn offline_client(cfg: OidcConfig, end_session: Option<&str>, clock: Arc<dyn Clock>) -> Result<OidcClient> {
    let meta = static_metadata(&cfg.issuer_url, end_session)?;
    OidcClient::from_metadata(cfg, meta, "https://todo.example.com/", reqwest::Client::new(), clock)
}

#[cfg(test)]
#[path = "oidc_tests.rs"]
mod tests;
