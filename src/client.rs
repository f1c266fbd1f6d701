use reqwest::multipart::Form;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Coarse classification of backend failures. Components fold these into
/// their own user-facing categories; the detailed cause only ever reaches
/// the debug log.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("authentication required")]
    Auth(StatusCode),
    #[error("server rejected the request ({0})")]
    Rejected(StatusCode),
    #[error("malformed response from server")]
    MalformedResponse,
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub short_link: String,
}

/// Public metadata for one share link, as served by `GET /info/{shortCode}`.
///
/// Fetched fresh on every retrieval visit and never cached across short
/// codes. The server-computed `expired` flag is authoritative;
/// `expires_in_hours` is descriptive only and must not be used to compute
/// expiry locally (client and server clocks are not comparable).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkMetadata {
    pub file_names: Vec<String>,
    pub file_sizes: Vec<u64>,
    #[serde(default)]
    pub total_size: u64,
    pub download_count: u64,
    pub password_protected: bool,
    pub expires_in_hours: i64,
    pub expired: bool,
    /// Epoch milliseconds, as stored server-side.
    #[serde(default)]
    pub created_at: Option<i64>,
    #[serde(default)]
    pub expires_at: Option<i64>,
}

/// One row of the authenticated upload-history listing.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadSummary {
    pub short_code: String,
    pub file_names: Vec<String>,
    #[serde(default)]
    pub file_sizes: Vec<u64>,
    pub total_size: u64,
    pub created_at: i64,
    pub expires_at: i64,
    pub download_count: u64,
    pub expired: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadResponse {
    pub download_url: String,
}

#[derive(Debug, Serialize)]
struct DownloadRequest<'a> {
    /// Omitted entirely when absent -- an empty JSON body is how an
    /// unprotected exchange looks on the wire.
    #[serde(skip_serializing_if = "Option::is_none")]
    password: Option<&'a str>,
}

// ============================================================================
// Client
// ============================================================================

/// HTTP plumbing for the ShareLink backend contract.
#[derive(Clone)]
pub struct ApiClient {
    api_base: Url,
    client: Client,
}

impl ApiClient {
    pub fn new(api_base: Url) -> Result<Self, ApiError> {
        let client = Client::builder().build()?;
        Ok(Self { api_base, client })
    }

    /// Join a path onto the API base. A base with an empty path serializes
    /// with a trailing slash, so join on the trimmed form.
    fn endpoint(&self, path: &str) -> String {
        format!("{}/{path}", self.api_base.as_str().trim_end_matches('/'))
    }

    fn upload_url(&self) -> String {
        self.endpoint("upload")
    }

    fn info_url(&self, short_code: &str) -> String {
        self.endpoint(&format!("info/{short_code}"))
    }

    fn download_url(&self, short_code: &str) -> String {
        self.endpoint(&format!("{short_code}/download"))
    }

    fn my_uploads_url(&self) -> String {
        self.endpoint("my-uploads")
    }

    fn link_url(&self, short_code: &str) -> String {
        self.endpoint(&format!("link/{short_code}"))
    }

    /// URL of the scannable code for a short link. The image behind it is
    /// an opaque static asset; the client never fetches or inspects it.
    pub fn qr_url(&self, short_code: &str) -> Url {
        let mut url = self.api_base.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push(short_code).push("qr");
        }
        url
    }

    /// POST the multipart upload body. The bearer credential is attached
    /// when present but uploads are allowed anonymously.
    pub async fn send_upload(
        &self,
        form: Form,
        bearer: Option<&str>,
    ) -> Result<UploadResponse, ApiError> {
        let mut request = self.client.post(self.upload_url()).multipart(form);
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }

        let resp = request.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            tracing::debug!(%status, %body, "upload rejected");
            return Err(reject(status));
        }

        resp.json().await.map_err(|e| {
            tracing::debug!(error = %e, "upload response did not parse");
            ApiError::MalformedResponse
        })
    }

    pub async fn link_info(&self, short_code: &str) -> Result<LinkMetadata, ApiError> {
        let resp = self.client.get(self.info_url(short_code)).send().await?;

        let status = resp.status();
        if !status.is_success() {
            tracing::debug!(%status, short_code, "link info rejected");
            return Err(reject(status));
        }

        resp.json().await.map_err(|e| {
            tracing::debug!(error = %e, "link info did not parse");
            ApiError::MalformedResponse
        })
    }

    /// Exchange a short code plus optional password for a download redirect.
    pub async fn request_download(
        &self,
        short_code: &str,
        password: Option<&str>,
    ) -> Result<DownloadResponse, ApiError> {
        let resp = self
            .client
            .post(self.download_url(short_code))
            .json(&DownloadRequest { password })
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            tracing::debug!(%status, short_code, "download exchange rejected");
            return Err(reject(status));
        }

        resp.json().await.map_err(|e| {
            tracing::debug!(error = %e, "download exchange response did not parse");
            ApiError::MalformedResponse
        })
    }

    pub async fn my_uploads(&self, bearer: &str) -> Result<Vec<UploadSummary>, ApiError> {
        let resp = self
            .client
            .get(self.my_uploads_url())
            .bearer_auth(bearer)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            tracing::debug!(%status, "upload listing rejected");
            return Err(reject(status));
        }

        resp.json().await.map_err(|e| {
            tracing::debug!(error = %e, "upload listing did not parse");
            ApiError::MalformedResponse
        })
    }

    pub async fn delete_link(&self, short_code: &str, bearer: &str) -> Result<(), ApiError> {
        let resp = self
            .client
            .delete(self.link_url(short_code))
            .bearer_auth(bearer)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            tracing::debug!(%status, %body, short_code, "link delete rejected");
            return Err(reject(status));
        }

        Ok(())
    }
}

fn reject(status: StatusCode) -> ApiError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ApiError::Auth(status),
        _ => ApiError::Rejected(status),
    }
}
