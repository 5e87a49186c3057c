//! HTTP client for the testimonial backend
//!
//! Thin reqwest wrapper covering the four contracts the recording flow
//! needs: public collection lookup, upload-ticket issuance, the clip
//! transfer itself, and video registration.

use crate::collection::{CollectionConfig, UploadTicket, VideoRecord};
use crate::recorder::controller::FinishedClip;
use bytes::Bytes;
use reqwest::StatusCode;
use serde::Serialize;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Transfer chunk size for the streamed upload body.
const UPLOAD_CHUNK: usize = 64 * 1024;

/// Backend API failures.
#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("collection not found or inactive")]
    CollectionUnavailable,

    #[error("unexpected status {status}: {body}")]
    Status { status: StatusCode, body: String },
}

/// Metadata registered with the backend after a clip is transferred.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterVideoRequest {
    pub collection_id: Uuid,
    pub client_name: String,
    pub client_email: Option<String>,
    pub client_company: Option<String>,
    pub upload_id: String,
}

/// HTTP client for the testimonial backend.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Turn a non-success response into an [`ApiError::Status`].
    async fn check(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(ApiError::Status { status, body })
    }

    /// Fetch a collection by its public slug.
    ///
    /// Absence and inactivity are indistinguishable to the caller; both
    /// come back as [`ApiError::CollectionUnavailable`].
    pub async fn fetch_collection(&self, slug: &str) -> Result<CollectionConfig, ApiError> {
        let url = self.url(&format!(
            "/api/collections/public/{}",
            urlencoding::encode(slug)
        ));
        let response = self.client.get(&url).send().await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND || status == StatusCode::GONE {
            return Err(ApiError::CollectionUnavailable);
        }

        let config: CollectionConfig = Self::check(response).await?.json().await?;
        if !config.is_active {
            return Err(ApiError::CollectionUnavailable);
        }
        Ok(config)
    }

    /// Request a one-time upload destination for the given collection.
    pub async fn create_upload(&self, collection_id: Uuid) -> Result<UploadTicket, ApiError> {
        let response = self
            .client
            .post(self.url("/api/upload"))
            .json(&serde_json::json!({ "collectionId": collection_id }))
            .send()
            .await?;

        Ok(Self::check(response).await?.json().await?)
    }

    /// PUT the clip body to the ticket's destination.
    ///
    /// `progress` observes the transfer as integer percentages, strictly
    /// non-decreasing and ending at 100 on success.
    pub async fn upload_clip<F>(
        &self,
        upload_url: &str,
        clip: &FinishedClip,
        progress: F,
    ) -> Result<(), ApiError>
    where
        F: Fn(u8) + Send + Sync + 'static,
    {
        let total = clip.data.len();
        let mut pieces = Vec::with_capacity(total / UPLOAD_CHUNK + 1);
        let mut offset = 0;
        while offset < total {
            let end = (offset + UPLOAD_CHUNK).min(total);
            pieces.push(clip.data.slice(offset..end));
            offset = end;
        }

        let progress = Arc::new(progress);
        let sent = Arc::new(AtomicUsize::new(0));
        let last_pct = Arc::new(AtomicU8::new(0));

        let stream = futures_util::stream::iter(pieces.into_iter().map({
            let progress = progress.clone();
            let sent = sent.clone();
            let last_pct = last_pct.clone();
            move |piece: Bytes| {
                let done = sent.fetch_add(piece.len(), Ordering::SeqCst) + piece.len();
                let pct = ((done as u64 * 100) / total.max(1) as u64) as u8;
                let prev = last_pct.fetch_max(pct, Ordering::SeqCst);
                if pct > prev {
                    progress(pct);
                }
                Ok::<Bytes, std::io::Error>(piece)
            }
        }));

        let response = self
            .client
            .put(upload_url)
            .header(reqwest::header::CONTENT_TYPE, clip.format.mime_type())
            .header(reqwest::header::CONTENT_LENGTH, total as u64)
            .body(reqwest::Body::wrap_stream(stream))
            .send()
            .await?;

        Self::check(response).await?;

        if last_pct.load(Ordering::SeqCst) < 100 {
            progress(100);
        }
        Ok(())
    }

    /// Register a transferred clip with the backend.
    pub async fn register_video(
        &self,
        request: &RegisterVideoRequest,
    ) -> Result<VideoRecord, ApiError> {
        let response = self
            .client
            .post(self.url("/api/videos"))
            .json(request)
            .send()
            .await?;

        Ok(Self::check(response).await?.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_is_normalized() {
        let client = ApiClient::new("http://localhost:3000/").unwrap();
        assert_eq!(client.base_url(), "http://localhost:3000");
        assert_eq!(client.url("/api/upload"), "http://localhost:3000/api/upload");
    }

    #[test]
    fn test_collection_path_encodes_the_slug() {
        let client = ApiClient::new("http://localhost:3000").unwrap();
        let url = client.url(&format!(
            "/api/collections/public/{}",
            urlencoding::encode("my collection")
        ));
        assert_eq!(
            url,
            "http://localhost:3000/api/collections/public/my%20collection"
        );
    }
}
