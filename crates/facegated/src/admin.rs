//! PIN-gated admin sessions.
//!
//! Each successful login opens a session keyed by an opaque token. A session
//! expires a fixed time after login; activity does not extend it. Expiry is
//! checked lazily whenever the token is presented.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use thiserror::Error;
use uuid::Uuid;

const PIN_MIN_LEN: usize = 4;
const PIN_MAX_LEN: usize = 6;

#[derive(Error, Debug)]
pub enum AdminError {
    #[error("invalid PIN")]
    InvalidPin,
    #[error("admin session missing or expired")]
    NotAuthenticated,
    #[error("PIN must be 4-6 digits")]
    WeakPin,
    #[error("PIN hashing failed: {0}")]
    Hash(#[from] bcrypt::BcryptError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    LoggedOut,
    Authenticated {
        login_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    },
}

/// Admin gate: the current PIN hash plus the open sessions.
///
/// The PIN hash lives only in process memory; a restart resets it to the
/// configured default.
pub struct AdminGate {
    pin_hash: String,
    cost: u32,
    timeout: Duration,
    sessions: HashMap<String, DateTime<Utc>>,
}

pub fn validate_pin(pin: &str) -> Result<(), AdminError> {
    let len_ok = (PIN_MIN_LEN..=PIN_MAX_LEN).contains(&pin.len());
    if !len_ok || !pin.bytes().all(|b| b.is_ascii_digit()) {
        return Err(AdminError::WeakPin);
    }
    Ok(())
}

/// Snapshot of the current PIN hash. bcrypt work runs against this without
/// holding the gate.
#[derive(Debug, Clone)]
pub struct PinCheck {
    hash: String,
    cost: u32,
}

/// A PIN that matched a particular hash.
#[derive(Debug)]
pub struct VerifiedPin {
    hash: String,
}

/// A replacement PIN that passed the policy, already hashed.
#[derive(Debug)]
pub struct NewPin {
    hash: String,
}

impl PinCheck {
    pub fn verify(&self, pin: &str) -> Result<VerifiedPin, AdminError> {
        if bcrypt::verify(pin, &self.hash).unwrap_or(false) {
            Ok(VerifiedPin {
                hash: self.hash.clone(),
            })
        } else {
            tracing::warn!("admin PIN rejected");
            Err(AdminError::InvalidPin)
        }
    }

    pub fn hash_new(&self, pin: &str) -> Result<NewPin, AdminError> {
        validate_pin(pin)?;
        Ok(NewPin {
            hash: bcrypt::hash(pin, self.cost)?,
        })
    }
}

impl AdminGate {
    pub fn new(default_pin: &str, cost: u32, timeout: Duration) -> Result<Self, AdminError> {
        Ok(Self {
            pin_hash: bcrypt::hash(default_pin, cost)?,
            cost,
            timeout,
            sessions: HashMap::new(),
        })
    }

    pub fn pin_check(&self) -> PinCheck {
        PinCheck {
            hash: self.pin_hash.clone(),
            cost: self.cost,
        }
    }

    /// Open a session for a PIN verified off the gate. Fails if the PIN
    /// changed since the check was taken.
    pub fn open_session(&mut self, verified: VerifiedPin, now: DateTime<Utc>) -> Result<String, AdminError> {
        if verified.hash != self.pin_hash {
            return Err(AdminError::InvalidPin);
        }
        let timeout = self.timeout;
        self.sessions.retain(|_, login_at| now - *login_at <= timeout);

        let token = Uuid::new_v4().to_string();
        self.sessions.insert(token.clone(), now);
        tracing::info!(sessions = self.sessions.len(), "admin logged in");
        Ok(token)
    }

    /// Current state of `token`. An expired session is dropped, leaving it
    /// exactly as if it had never logged in.
    pub fn state(&mut self, token: &str, now: DateTime<Utc>) -> SessionState {
        let Some(&login_at) = self.sessions.get(token) else {
            return SessionState::LoggedOut;
        };
        if now - login_at > self.timeout {
            self.sessions.remove(token);
            tracing::info!("admin session expired");
            return SessionState::LoggedOut;
        }
        SessionState::Authenticated {
            login_at,
            expires_at: login_at + self.timeout,
        }
    }

    pub fn is_authenticated(&mut self, token: &str, now: DateTime<Utc>) -> bool {
        matches!(self.state(token, now), SessionState::Authenticated { .. })
    }

    pub fn require(&mut self, token: &str, now: DateTime<Utc>) -> Result<(), AdminError> {
        if self.is_authenticated(token, now) {
            Ok(())
        } else {
            Err(AdminError::NotAuthenticated)
        }
    }

    /// Close a session. Unknown tokens are ignored.
    pub fn logout(&mut self, token: &str) -> bool {
        let existed = self.sessions.remove(token).is_some();
        if existed {
            tracing::info!("admin logged out");
        }
        existed
    }

    /// Install a PIN prepared off the gate. The session and the old-PIN
    /// proof are checked again against the current state.
    pub fn commit_pin(
        &mut self,
        token: &str,
        verified: VerifiedPin,
        new_pin: NewPin,
        now: DateTime<Utc>,
    ) -> Result<(), AdminError> {
        self.require(token, now)?;
        if verified.hash != self.pin_hash {
            return Err(AdminError::InvalidPin);
        }
        self.pin_hash = new_pin.hash;
        tracing::info!("admin PIN changed");
        Ok(())
    }
}
