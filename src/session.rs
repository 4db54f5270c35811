//! Session context threaded through every engine call.
//!
//! Holds the current game, API key, auth token, and rate-limit window. The
//! engine reads it in every guard predicate but never owns the policy for
//! filling it: authentication is performed by the caller, which hands the
//! token in via [`SessionContext::authenticate`].

use chrono::{DateTime, Utc};
use std::time::{Duration, Instant};

use crate::id::GameId;

/// A bearer token with a server-issued expiry.
#[derive(Debug, Clone)]
pub struct AuthToken {
    pub value: String,
    pub expires_at: DateTime<Utc>,
}

impl AuthToken {
    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }
}

#[derive(Debug)]
pub struct SessionContext {
    game_id: GameId,
    api_key: String,
    token: Option<AuthToken>,
    rate_limited_until: Option<Instant>,
    initialized: bool,
}

impl SessionContext {
    pub fn new(game_id: GameId, api_key: impl Into<String>) -> Self {
        SessionContext {
            game_id,
            api_key: api_key.into(),
            token: None,
            rate_limited_until: None,
            initialized: true,
        }
    }

    pub fn game_id(&self) -> GameId {
        self.game_id
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Marks the session closed; every subsequent guard check fails with
    /// the not-initialized precondition.
    pub fn close(&mut self) {
        self.initialized = false;
    }

    pub fn authenticate(&mut self, token: impl Into<String>, expires_at: DateTime<Utc>) {
        self.token = Some(AuthToken {
            value: token.into(),
            expires_at,
        });
    }

    /// Drops the cached token. Called by the engine when the server reports
    /// the token expired, so the caller re-authenticates instead of retrying
    /// with a dead credential.
    pub fn invalidate_token(&mut self) {
        self.token = None;
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.as_ref().is_some_and(|t| !t.is_expired())
    }

    pub fn token(&self) -> Option<&AuthToken> {
        self.token.as_ref().filter(|t| !t.is_expired())
    }

    /// Records a server-imposed rate limit window.
    pub fn note_rate_limit(&mut self, retry_after: Duration) {
        self.rate_limited_until = Some(Instant::now() + retry_after);
    }

    /// Remaining rate-limit window, if one is active. Expired windows clear
    /// themselves on read.
    pub fn rate_limit_remaining(&mut self) -> Option<Duration> {
        match self.rate_limited_until {
            Some(until) => {
                let now = Instant::now();
                if until <= now {
                    self.rate_limited_until = None;
                    None
                } else {
                    Some(until - now)
                }
            }
            None => None,
        }
    }
}
