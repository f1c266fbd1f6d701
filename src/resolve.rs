use thiserror::Error;
use url::Url;

use crate::client::{ApiClient, ApiError};

pub use crate::client::LinkMetadata;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResolveError {
    /// Covers both "never existed" and "already expired and purged". The
    /// server does not distinguish these and neither does the client.
    #[error("Invalid or expired link.")]
    LinkNotFound,
}

/// Resolves a short code to its public metadata.
pub struct LinkResolver {
    client: ApiClient,
}

impl LinkResolver {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    /// Fetch metadata for a short code. Always a fresh fetch -- metadata is
    /// never cached across visits or short codes.
    ///
    /// Even when this succeeds, `metadata.expired` is authoritative: an
    /// expired link gets no download or scannable-code affordance, whatever
    /// `expires_in_hours` still claims.
    pub async fn resolve(&self, short_code: &str) -> Result<LinkMetadata, ResolveError> {
        match self.client.link_info(short_code).await {
            Ok(metadata) => Ok(metadata),
            Err(ApiError::Transport(e)) => {
                tracing::debug!(error = %e, short_code, "link info fetch failed");
                Err(ResolveError::LinkNotFound)
            }
            Err(e) => {
                tracing::debug!(error = %e, short_code, "link info unavailable");
                Err(ResolveError::LinkNotFound)
            }
        }
    }

    /// The scannable-code URL for a short link. Only meaningful while the
    /// link is unexpired; callers gate on `metadata.expired` first.
    pub fn qr_url(&self, short_code: &str) -> Url {
        self.client.qr_url(short_code)
    }
}
