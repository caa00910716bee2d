//! Authentication for the list server: shared-secret PIN with brute-force lockout, and an
//! optional OpenID Connect identity provider that takes precedence over it.
//! Keep the public surface thin and split implementation across sub-modules.

mod attempts;
mod clock;
mod oidc;
mod pin;
mod principal;
mod provider;
mod request_context;
mod session;

pub use attempts::{lockout_minutes, AttemptStatus, AttemptTracker, LOCKOUT_TIME, MAX_ATTEMPTS, SWEEP_INTERVAL};
pub use clock::{Clock, ManualClock, SystemClock};
pub use oidc::{OidcClient, OidcProviderMetadata, SessionEndpoints, CALLBACK_PATH, EXTRA_SCOPES};
#[cfg(test)]
pub(crate) use oidc::offline_client;
pub use pin::{PinAuthenticator, PinRequirement, VERIFY_DELAY_MS};
pub use principal::UserProfile;
pub use provider::{IdentityGate, LogoutOutcome, AUTH_LOGIN_PATH, LOGIN_PAGE, LOGOUT_PATH};
pub use request_context::{parse_cookie, CookieSpec, RequestContext, SameSite, PIN_HEADER, SESSION_COOKIE};
pub use session::{gen_id, IdentitySession, SessionStore, SESSION_TTL};
