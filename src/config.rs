//! Process configuration, loaded once from environment variables at startup.

use std::path::PathBuf;

use anyhow::{bail, Result};

use crate::security::{MAX_PIN_LENGTH, MIN_PIN_LENGTH};

pub const DEFAULT_COOKIE_NAME: &str = "DUMBDO_PIN";

/// OpenID Connect settings. Only constructed when issuer, client id and session secret
/// are all present.
#[derive(Debug, Clone)]
pub struct OidcConfig {
    pub issuer_url: String,
    pub client_id: String,
    pub client_secret: Option<String>,
    pub audience: Option<String>,
    pub session_secret: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// PIN secret; `None` disables the PIN gate entirely.
    pub pin: Option<String>,
    pub site_title: String,
    pub cookie_name: String,
    pub data_dir: PathBuf,
    pub public_dir: PathBuf,
    /// Production turns on `Secure` cookies.
    pub production: bool,
    /// Take the client address from the nearest `X-Forwarded-For` hop. Only safe behind a
    /// reverse proxy that sets that header: exposed directly, a client can pick a fresh
    /// address per request and sidestep the PIN lockout. Set `TRUST_PROXY=false` then.
    pub trust_proxy: bool,
    pub base_url: String,
    pub oidc: Option<OidcConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3000,
            pin: None,
            site_title: "DumbDo".to_string(),
            cookie_name: DEFAULT_COOKIE_NAME.to_string(),
            data_dir: PathBuf::from("data"),
            public_dir: PathBuf::from("public"),
            production: false,
            trust_proxy: true,
            base_url: "http://localhost:3000".to_string(),
            oidc: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// Build from an arbitrary key lookup so tests need not touch the process environment.
    pub fn from_lookup<F>(get: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |k: &str| get(k).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let port = non_empty("PORT").and_then(|v| v.parse::<u16>().ok()).unwrap_or(3000);
        let pin = non_empty("DUMBDO_PIN");
        if let Some(p) = &pin {
            let n = p.chars().count();
            if !(MIN_PIN_LENGTH..=MAX_PIN_LENGTH).contains(&n) {
                bail!("DUMBDO_PIN must be between {} and {} characters (got {})", MIN_PIN_LENGTH, MAX_PIN_LENGTH, n);
            }
        }
        let env_name = non_empty("DUMBDO_ENV").or_else(|| non_empty("NODE_ENV")).unwrap_or_else(|| "development".into());
        let base_url = non_empty("BASE_URL").unwrap_or_else(|| format!("http://localhost:{}", port));

        let issuer = non_empty("OIDC_ISSUER_URL");
        let client_id = non_empty("OIDC_CLIENT_ID");
        let session_secret = non_empty("SESSION_SECRET");
        let oidc = match (issuer, client_id, session_secret) {
            (Some(issuer_url), Some(client_id), Some(session_secret)) => Some(OidcConfig {
                issuer_url,
                client_id,
                client_secret: non_empty("OIDC_CLIENT_SECRET"),
                audience: non_empty("OIDC_AUDIENCE"),
                session_secret,
            }),
            (i, c, s) => {
                let missing: Vec<&str> = [("OIDC_ISSUER_URL", i.is_none()), ("OIDC_CLIENT_ID", c.is_none()), ("SESSION_SECRET", s.is_none())]
                    .into_iter()
                    .filter_map(|(k, m)| m.then_some(k))
                    .collect();
                if missing.len() < 3 {
                    tracing::warn!(missing = ?missing, "OIDC partially configured; only PIN authentication will work");
                }
                None
            }
        };

        Ok(Self {
            port,
            pin,
            site_title: non_empty("DUMBDO_SITE_TITLE").unwrap_or_else(|| "DumbDo".into()),
            cookie_name: non_empty("DUMBDO_COOKIE_NAME").unwrap_or_else(|| DEFAULT_COOKIE_NAME.into()),
            data_dir: non_empty("DUMBDO_DATA_DIR").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("data")),
            public_dir: non_empty("DUMBDO_PUBLIC_DIR").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("public")),
            production: env_name.eq_ignore_ascii_case("production"),
            trust_proxy: non_empty("TRUST_PROXY").and_then(|v| parse_bool(&v)).unwrap_or(true),
            base_url: base_url.trim_end_matches('/').to_string(),
            oidc,
        })
    }

    /// Host part of `BASE_URL`, used as the OIDC session cookie domain in production.
    pub fn cookie_domain(&self) -> Option<String> {
        if !self.production { return None; }
        let rest = self.base_url.split("://").nth(1)?;
        let host = rest.split(['/', ':']).next()?;
        if host.is_empty() { None } else { Some(host.to_string()) }
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
