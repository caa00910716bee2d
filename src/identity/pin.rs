//! PIN verification.
//!
//! [`PinAuthenticator::verify`] is the attempt-limited path behind `POST /api/verify-pin`.
//! [`PinAuthenticator::check_credential`] is the plain equality check the gateway runs for
//! every request carrying a PIN cookie or `x-pin` header; it never touches attempt state.

use std::ops::RangeInclusive;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tracing::{info, warn};

use crate::error::{AppError, AppResult};
use crate::security::{pin_length_ok, secure_compare_opt, MAX_PIN_LENGTH, MIN_PIN_LENGTH};

use super::attempts::{lockout_minutes, AttemptTracker, MAX_ATTEMPTS};

/// Bounds of the random pause before comparing, in milliseconds.
pub const VERIFY_DELAY_MS: RangeInclusive<u64> = 50..=150;

/// Body of `GET /api/pin-required`.
#[derive(Debug, Clone, serde::Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PinRequirement {
    pub required: bool,
    pub length: usize,
    pub locked: bool,
    pub attempts_left: u32,
    pub lockout_minutes: u64,
}

pub struct PinAuthenticator {
    secret: Option<String>,
    attempts: Arc<AttemptTracker>,
    delay_ms: RangeInclusive<u64>,
}

impl PinAuthenticator {
    pub fn new(secret: Option<String>, attempts: Arc<AttemptTracker>) -> Self {
        Self { secret: secret.filter(|s| !s.is_empty()), attempts, delay_ms: VERIFY_DELAY_MS }
    }

    pub fn is_enabled(&self) -> bool { self.secret.is_some() }

    pub fn attempts(&self) -> &AttemptTracker { &self.attempts }

    /// Gateway check: true when no secret is configured or the credential equals it.
    pub fn check_credential(&self, provided: Option<&str>) -> bool {
        match &self.secret {
            None => true,
            Some(secret) => secure_compare_opt(provided, secret),
        }
    }

    pub fn requirement(&self, client_id: &str) -> PinRequirement {
        let status = self.attempts.status(client_id);
        PinRequirement {
            required: self.is_enabled(),
            length: self.secret.as_ref().map(|s| s.chars().count()).unwrap_or(MIN_PIN_LENGTH),
            locked: status.locked,
            attempts_left: status.attempts_left,
            lockout_minutes: status.lockout_minutes,
        }
    }

    /// Run the full verify flow for one submission. `provided` is `None` when the request
    /// body did not carry a string PIN.
    ///
    /// The attempt is reserved against the client's budget before the delay, so a burst of
    /// concurrent submissions can never be compared more than [`MAX_ATTEMPTS`] times.
    /// Ok means the caller should issue the session credential.
    pub async fn verify(&self, provided: Option<&str>, client_id: &str) -> AppResult<()> {
        let Some(secret) = &self.secret else {
            if let Some(remaining) = self.attempts.locked_for(client_id) {
                return Err(self.locked_out(client_id, remaining));
            }
            self.pause().await;
            self.attempts.reset_attempts(client_id);
            return Ok(());
        };

        let count = match self.attempts.begin_attempt(client_id) {
            Ok(count) => count,
            Err(remaining) => return Err(self.locked_out(client_id, remaining)),
        };
        let attempts_left = MAX_ATTEMPTS.saturating_sub(count);

        if provided.is_some_and(|pin| !pin_length_ok(pin)) {
            return Err(AppError::InvalidCredential {
                message: format!("PIN must be between {} and {} digits", MIN_PIN_LENGTH, MAX_PIN_LENGTH),
                attempts_left,
            });
        }

        self.pause().await;

        if secure_compare_opt(provided, secret) {
            self.attempts.reset_attempts(client_id);
            return Ok(());
        }

        warn!(client = client_id, attempts_left, "invalid pin submitted");
        Err(AppError::InvalidCredential {
            message: format!("Invalid PIN. {} attempts remaining before lockout.", attempts_left),
            attempts_left,
        })
    }

    fn locked_out(&self, client_id: &str, remaining: Duration) -> AppError {
        let minutes = lockout_minutes(remaining);
        info!(client = client_id, minutes, "pin verification refused: locked out");
        AppError::LockedOut { minutes }
    }

    async fn pause(&self) {
        let delay = rand::thread_rng().gen_range(self.delay_ms.clone());
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }
}
