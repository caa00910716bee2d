use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use base64::Engine;
use parking_lot::RwLock;
use sha2::{Digest, Sha256};

use super::clock::{Clock, SystemClock};
use super::principal::UserProfile;

pub const SESSION_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// 256-bit random token, base64url without padding. Fails rather than hand out a token
/// from an unfilled buffer when the OS RNG is unavailable.
pub fn gen_id() -> Result<String> {
    let mut buf = [0u8; 32];
    getrandom::getrandom(&mut buf).map_err(|e| anyhow!("os rng unavailable: {}", e))?;
    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(buf))
}

#[derive(Debug, Clone)]
pub struct IdentitySession {
    pub profile: UserProfile,
    pub issued_at: Instant,
    pub expires_at: Instant,
}

/// Server-side OIDC sessions. The cookie carries the raw token; the map is keyed by a
/// SHA-256 of the token peppered with the session secret.
pub struct SessionStore {
    ttl: Duration,
    pepper: String,
    sessions: RwLock<HashMap<String, IdentitySession>>,
    clock: Arc<dyn Clock>,
}

impl SessionStore {
    pub fn new(pepper: impl Into<String>) -> Self { Self::with_clock(pepper, Arc::new(SystemClock)) }

    pub fn with_clock(pepper: impl Into<String>, clock: Arc<dyn Clock>) -> Self {
        Self { ttl: SESSION_TTL, pepper: pepper.into(), sessions: RwLock::new(HashMap::new()), clock }
    }

    fn key(&self, token: &str) -> String {
        let mut h = Sha256::new();
        h.update(self.pepper.as_bytes());
        h.update(b":");
        h.update(token.as_bytes());
        base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(h.finalize())
    }

    /// Create a session and return the token to hand to the browser.
    pub fn issue(&self, profile: UserProfile) -> Result<String> {
        let token = gen_id()?;
        let now = self.clock.now();
        let sess = IdentitySession { profile, issued_at: now, expires_at: now + self.ttl };
        self.sessions.write().insert(self.key(&token), sess);
        Ok(token)
    }

    pub fn validate(&self, token: &str) -> Option<UserProfile> {
        let key = self.key(token);
        let now = self.clock.now();
        let expired = {
            let map = self.sessions.read();
            match map.get(&key) {
                Some(s) if s.expires_at > now => return Some(s.profile.clone()),
                Some(_) => true,
                None => false,
            }
        };
        if expired {
            self.sessions.write().remove(&key);
        }
        None
    }

    pub fn logout(&self, token: &str) -> bool { self.sessions.write().remove(&self.key(token)).is_some() }

    /// Remove expired sessions. Returns number removed.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let mut w = self.sessions.write();
        let before = w.len();
        w.retain(|_, s| s.expires_at > now);
        before - w.len()
    }

    pub fn len(&self) -> usize { self.sessions.read().len() }

    pub fn is_empty(&self) -> bool { self.len() == 0 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::clock::ManualClock;

    fn profile() -> UserProfile {
        UserProfile { sub: "u1".into(), email: Some("a@example.com".into()), ..Default::default() }
    }

    #[test]
    fn issued_token_validates() {
        let s = SessionStore::new("pepper");
        let t = s.issue(profile()).unwrap();
        assert_eq!(s.validate(&t).unwrap().email.as_deref(), Some("a@example.com"));
        assert!(s.validate("forged").is_none());
    }

    #[test]
    fn token_is_not_stored_raw() {
        let s = SessionStore::new("pepper");
        let t = s.issue(profile()).unwrap();
        assert!(!s.sessions.read().contains_key(&t));
    }

    #[test]
    fn different_pepper_does_not_validate() {
        let a = SessionStore::new("one");
        let t = a.issue(profile()).unwrap();
        let b = SessionStore::new("two");
        assert!(b.validate(&t).is_none());
    }

    #[test]
    fn sessions_expire_and_sweep() {
        let clock = Arc::new(ManualClock::new());
        let s = SessionStore::with_clock("p", clock.clone());
        let t = s.issue(profile()).unwrap();
        clock.advance(SESSION_TTL);
        assert!(s.validate(&t).is_none());
        assert!(s.is_empty());

        s.issue(profile()).unwrap();
        clock.advance(SESSION_TTL + Duration::from_secs(1));
        assert_eq!(s.sweep(), 1);
    }

    #[test]
    fn logout_removes_session() {
        let s = SessionStore::new("p");
        let t = s.issue(profile()).unwrap();
        assert!(s.logout(&t));
        assert!(!s.logout(&t));
        assert!(s.validate(&t).is_none());
    }

    #[test]
    fn ids_are_unique() {
        let a = gen_id().unwrap();
        assert_ne!(a, gen_id().unwrap());
        assert_eq!(a.len(), 43);
        assert_ne!(a, "A".repeat(43));
    }
}
