//! Submission pipeline
//!
//! Runs the three sequential steps that turn a finished clip into a
//! stored testimonial: ticket acquisition, binary transfer, and metadata
//! registration. Steps never overlap and each failure is tagged with the
//! step that produced it, even though the flow collapses them all into
//! one user-visible error state.

use super::client::{ApiClient, ApiError, RegisterVideoRequest};
use crate::collection::{ClientIdentity, CollectionConfig, VideoRecord};
use crate::recorder::controller::FinishedClip;
use std::fmt;
use thiserror::Error;

/// Which pipeline step failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitStep {
    Ticket,
    Transfer,
    Register,
}

impl fmt::Display for SubmitStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SubmitStep::Ticket => "ticket",
            SubmitStep::Transfer => "transfer",
            SubmitStep::Register => "register",
        };
        f.write_str(name)
    }
}

/// Step-tagged submission failures.
#[derive(Error, Debug)]
pub enum SubmitError {
    #[error("upload ticket request failed: {0}")]
    Ticket(#[source] ApiError),

    #[error("clip transfer failed: {0}")]
    Transfer(#[source] ApiError),

    #[error("video registration failed: {0}")]
    Register(#[source] ApiError),
}

impl SubmitError {
    /// The step that failed.
    pub fn step(&self) -> SubmitStep {
        match self {
            SubmitError::Ticket(_) => SubmitStep::Ticket,
            SubmitError::Transfer(_) => SubmitStep::Transfer,
            SubmitError::Register(_) => SubmitStep::Register,
        }
    }
}

/// One-shot submission of a finished clip.
pub struct SubmissionPipeline<'a> {
    api: &'a ApiClient,
}

impl<'a> SubmissionPipeline<'a> {
    pub fn new(api: &'a ApiClient) -> Self {
        Self { api }
    }

    /// Run ticket acquisition, transfer, and registration in order.
    ///
    /// A fresh ticket is requested on every call; tickets are single use
    /// and never shared between attempts. No step is retried and partial
    /// success is not rolled back.
    pub async fn submit<F>(
        &self,
        collection: &CollectionConfig,
        identity: &ClientIdentity,
        clip: &FinishedClip,
        progress: F,
    ) -> Result<VideoRecord, SubmitError>
    where
        F: Fn(u8) + Send + Sync + 'static,
    {
        tracing::info!(
            "submitting testimonial: collection {}, {} bytes ({:?})",
            collection.id,
            clip.len(),
            clip.format
        );

        let ticket = self
            .api
            .create_upload(collection.id)
            .await
            .map_err(SubmitError::Ticket)?;
        tracing::debug!(upload_id = %ticket.upload_id, "upload ticket issued");

        self.api
            .upload_clip(&ticket.upload_url, clip, progress)
            .await
            .map_err(SubmitError::Transfer)?;
        tracing::debug!(upload_id = %ticket.upload_id, "clip transferred");

        let request = RegisterVideoRequest {
            collection_id: collection.id,
            client_name: identity.name.clone(),
            client_email: identity.email.clone(),
            client_company: identity.company.clone(),
            upload_id: ticket.upload_id.clone(),
        };

        match self.api.register_video(&request).await {
            Ok(record) => {
                tracing::info!("video registered: {} ({:?})", record.id, record.status);
                Ok(record)
            }
            Err(e) => {
                // The host already holds the clip at this point; log the
                // upload id so backend reconciliation has a key to sweep.
                tracing::error!(
                    upload_id = %ticket.upload_id,
                    "registration failed after completed transfer: {}",
                    e
                );
                Err(SubmitError::Register(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_errors_are_step_tagged() {
        let ticket = SubmitError::Ticket(ApiError::CollectionUnavailable);
        let transfer = SubmitError::Transfer(ApiError::CollectionUnavailable);
        let register = SubmitError::Register(ApiError::CollectionUnavailable);

        assert_eq!(ticket.step(), SubmitStep::Ticket);
        assert_eq!(transfer.step(), SubmitStep::Transfer);
        assert_eq!(register.step(), SubmitStep::Register);
        assert_eq!(register.step().to_string(), "register");
    }
}
