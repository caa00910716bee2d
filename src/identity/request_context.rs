//! One normalization step from raw request parts to everything the auth policy needs:
//! client address, PIN credential (cookie or `x-pin`), identity session token and whether
//! the caller wants JSON rather than a page.

use std::net::SocketAddr;

use axum::http::{header, HeaderMap, HeaderValue, Uri};

pub const SESSION_COOKIE: &str = "dumbdo_session";
pub const PIN_HEADER: &str = "x-pin";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    pub client_ip: String,
    pub path: String,
    pub pin: Option<String>,
    pub session_token: Option<String>,
    pub wants_json: bool,
}

impl RequestContext {
    pub fn from_parts(headers: &HeaderMap, uri: &Uri, peer: Option<SocketAddr>, pin_cookie: &str, trust_proxy: bool) -> Self {
        let pin = parse_cookie(headers, pin_cookie).filter(|p| !p.is_empty()).or_else(|| {
            headers.get(PIN_HEADER).and_then(|v| v.to_str().ok()).map(str::to_string).filter(|p| !p.is_empty())
        });
        Self {
            client_ip: client_ip(headers, peer, trust_proxy),
            path: uri.path().to_string(),
            pin,
            session_token: parse_cookie(headers, SESSION_COOKIE).filter(|t| !t.is_empty()),
            wants_json: wants_json(headers),
        }
    }

    pub fn is_api(&self) -> bool { self.path.starts_with("/api/") }
}

/// Read a cookie by name; values are percent-decoded.
pub fn parse_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    for cookie in headers.get_all(header::COOKIE) {
        let Ok(s) = cookie.to_str() else { continue };
        for part in s.split(';') {
            let p = part.trim();
            if let Some((k, v)) = p.split_once('=') {
                if k == name {
                    let v = v.trim_matches('"');
                    return Some(urlencoding::decode(v).map(|c| c.into_owned()).unwrap_or_else(|_| v.to_string()));
                }
            }
        }
    }
    None
}

/// With one trusted proxy the client is the right-most `X-Forwarded-For` entry; otherwise
/// the socket peer.
fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>, trust_proxy: bool) -> String {
    if trust_proxy {
        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.rsplit(',').map(str::trim).find(|p| !p.is_empty()));
        if let Some(ip) = forwarded {
            return ip.to_string();
        }
    }
    peer.map(|p| p.ip().to_string()).unwrap_or_else(|| "unknown".to_string())
}

fn wants_json(headers: &HeaderMap) -> bool {
    let xhr = headers
        .get("x-requested-with")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case("XMLHttpRequest"))
        .unwrap_or(false);
    if xhr { return true; }
    let accept = headers.get(header::ACCEPT).and_then(|v| v.to_str().ok()).unwrap_or("");
    accept.contains("application/json") && !accept.contains("text/html")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SameSite { Strict, Lax }

/// Attributes for a `Set-Cookie` header.
#[derive(Debug, Clone)]
pub struct CookieSpec<'a> {
    pub name: &'a str,
    pub same_site: SameSite,
    pub secure: bool,
    pub domain: Option<&'a str>,
    pub max_age_secs: Option<u64>,
}

impl CookieSpec<'_> {
    fn attrs(&self) -> String {
        let mut s = String::from("; HttpOnly; Path=/");
        s.push_str(match self.same_site { SameSite::Strict => "; SameSite=Strict", SameSite::Lax => "; SameSite=Lax" });
        if self.secure { s.push_str("; Secure"); }
        if let Some(d) = self.domain { s.push_str("; Domain="); s.push_str(d); }
        s
    }

    pub fn set(&self, value: &str) -> Option<HeaderValue> {
        let mut s = format!("{}={}{}", self.name, urlencoding::encode(value), self.attrs());
        if let Some(age) = self.max_age_secs { s.push_str(&format!("; Max-Age={}", age)); }
        HeaderValue::from_str(&s).ok()
    }

    pub fn clear(&self) -> Option<HeaderValue> {
        HeaderValue::from_str(&format!("{}=deleted; Expires=Thu, 01 Jan 1970 00:00:00 GMT; Max-Age=0{}", self.name, self.attrs())).ok()
    }
}
