//! The retrieval gate: short code plus optional password in, one-shot
//! download redirect out.

use thiserror::Error;
use tokio::sync::Mutex;
use url::Url;

use crate::client::{ApiClient, LinkMetadata};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExchangeError {
    #[error("This link has expired.")]
    Expired,
    #[error("A download exchange is already in progress.")]
    ExchangeInFlight,
    /// Wrong password, expiry between resolve and exchange, and transport
    /// failure all collapse here -- one message, so nothing about which
    /// guess was closer leaks to the caller.
    #[error("Incorrect password or download failed.")]
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatePhase {
    /// The resolved metadata said the link is expired; no exchange will
    /// ever be attempted from here.
    Blocked,
    Ready,
    Exchanging,
    Granted,
    /// Re-enterable: the caller may retry the exchange indefinitely.
    Rejected,
}

/// A one-shot artifact of a successful exchange. The URL is single-use:
/// navigate to it immediately, never store or reuse it.
#[derive(Debug, Clone)]
pub struct DownloadGrant {
    pub download_url: Url,
}

/// Gate between resolved link metadata and the actual download redirect.
pub struct DownloadGate {
    client: ApiClient,
    short_code: String,
    password_protected: bool,
    phase: Mutex<GatePhase>,
}

impl DownloadGate {
    /// Build the gate from freshly resolved metadata. An expired link
    /// starts (and stays) `Blocked`; anything else starts `Ready`.
    pub fn new(client: ApiClient, short_code: impl Into<String>, metadata: &LinkMetadata) -> Self {
        let phase = if metadata.expired {
            GatePhase::Blocked
        } else {
            GatePhase::Ready
        };

        Self {
            client,
            short_code: short_code.into(),
            password_protected: metadata.password_protected,
            phase: Mutex::new(phase),
        }
    }

    pub async fn phase(&self) -> GatePhase {
        *self.phase.lock().await
    }

    pub fn password_protected(&self) -> bool {
        self.password_protected
    }

    /// Attempt the exchange. For an unprotected link the credential is
    /// dropped and the exchange goes out empty; for a protected one the
    /// password field is sent only when the caller supplied something.
    pub async fn exchange(&self, password: Option<&str>) -> Result<DownloadGrant, ExchangeError> {
        {
            let mut phase = self.phase.lock().await;
            match *phase {
                GatePhase::Blocked => return Err(ExchangeError::Expired),
                GatePhase::Exchanging => return Err(ExchangeError::ExchangeInFlight),
                _ => {}
            }
            *phase = GatePhase::Exchanging;
        }

        let password = if self.password_protected {
            password.filter(|p| !p.is_empty())
        } else {
            None
        };

        let result = self
            .client
            .request_download(&self.short_code, password)
            .await;

        let mut phase = self.phase.lock().await;
        match result {
            Ok(response) => match Url::parse(&response.download_url) {
                Ok(download_url) => {
                    *phase = GatePhase::Granted;
                    Ok(DownloadGrant { download_url })
                }
                Err(e) => {
                    tracing::debug!(error = %e, short_code = %self.short_code, "grant URL did not parse");
                    *phase = GatePhase::Rejected;
                    Err(ExchangeError::Rejected)
                }
            },
            Err(e) => {
                tracing::debug!(error = %e, short_code = %self.short_code, "download exchange failed");
                *phase = GatePhase::Rejected;
                Err(ExchangeError::Rejected)
            }
        }
    }
}
