//! Bearer-token session lifecycle.
//!
//! The token is issued by an external identity provider and only decoded
//! here, never verified -- authenticity is the server's concern on each
//! request. Expiry is checked locally so the client can treat a dead token
//! as anonymous without a round trip.

mod store;

pub use store::{FileTokenStore, MemoryTokenStore, TokenStore, TokenStoreError};

use std::sync::Arc;

use base64::Engine;
use chrono::{DateTime, Utc};
use serde::Deserialize;

/// The decoded payload of a bearer token.
///
/// Produced only by [`SessionState::decode`]; no component may assume a
/// token is authentic just because it decoded.
#[derive(Debug, Clone, Deserialize)]
pub struct Claims {
    pub sub: String,
    #[serde(default)]
    pub email: Option<String>,
    /// Expiry as epoch seconds. Tokens without one never expire locally.
    #[serde(default)]
    pub exp: Option<i64>,
}

/// Owns the current bearer token, if any, on top of an injected store.
pub struct SessionState {
    store: Arc<dyn TokenStore>,
}

impl SessionState {
    pub fn new(store: Arc<dyn TokenStore>) -> Self {
        Self { store }
    }

    /// Parse the claims out of a compact JWT without verifying it.
    /// Returns `None` for anything that is not well-formed.
    pub fn decode(token: &str) -> Option<Claims> {
        let payload = token.split('.').nth(1)?;
        let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(payload)
            .ok()?;
        serde_json::from_slice(&bytes).ok()
    }

    /// True iff the claims carry an expiry and it is in the past.
    pub fn is_expired(claims: &Claims, now: DateTime<Utc>) -> bool {
        claims.exp.is_some_and(|exp| exp < now.timestamp())
    }

    /// The persisted token, if it is still usable.
    ///
    /// Checking liveness is itself a cleanup operation: a token that fails
    /// to decode is treated as corrupt and discarded, and an expired token
    /// is discarded the same way. Either case yields `None` and the next
    /// read starts from an empty store.
    pub async fn current_token(&self) -> Result<Option<String>, TokenStoreError> {
        let Some(token) = self.store.get().await? else {
            return Ok(None);
        };

        let Some(claims) = Self::decode(&token) else {
            tracing::debug!("stored token failed to decode, discarding");
            self.store.clear().await?;
            return Ok(None);
        };

        if Self::is_expired(&claims, Utc::now()) {
            tracing::debug!(sub = %claims.sub, "stored token expired, discarding");
            self.store.clear().await?;
            return Ok(None);
        }

        Ok(Some(token))
    }

    /// Claims of the current live token, if any. Same self-healing behavior
    /// as [`current_token`](Self::current_token).
    pub async fn current_claims(&self) -> Result<Option<Claims>, TokenStoreError> {
        let token = self.current_token().await?;
        Ok(token.as_deref().and_then(Self::decode))
    }

    /// Persist a newly issued token. No refresh mechanism exists -- once it
    /// expires the user has to authenticate again.
    pub async fn log_in(&self, token: &str) -> Result<(), TokenStoreError> {
        self.store.set(token).await
    }

    pub async fn log_out(&self) -> Result<(), TokenStoreError> {
        self.store.clear().await
    }
}
