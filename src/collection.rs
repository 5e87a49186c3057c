//! Collection and submission data types
//!
//! Types exchanged with the testimonial backend: the collection a client
//! records for, the client's own details, upload tickets, and the stored
//! video record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// A testimonial collection as served by the backend's public endpoint.
///
/// Read-only input to the recording flow. An inactive collection is never
/// handed to the flow; the fetch layer reports it as unavailable instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionConfig {
    /// Collection ID
    pub id: Uuid,

    /// Display name shown to the client
    pub name: String,

    /// Public URL slug
    pub slug: String,

    /// Optional welcome message shown before recording
    pub welcome_message: Option<String>,

    /// Ordered prompt questions to guide the testimonial
    #[serde(default)]
    pub prompt_questions: Vec<String>,

    /// Optional logo reference
    pub logo_url: Option<String>,

    /// Brand accent color (passed through, never parsed)
    pub brand_color: String,

    /// Maximum recording duration in whole seconds
    pub max_duration: u32,

    /// Whether the collection accepts new testimonials
    pub is_active: bool,
}

/// Details the client enters before recording.
///
/// Immutable once recording begins; the flow only hands it to the
/// submission pipeline, it is never persisted locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientIdentity {
    /// Client name (required)
    pub name: String,

    /// Contact email (optional)
    pub email: Option<String>,

    /// Company name (optional)
    pub company: Option<String>,
}

/// Validation failures for [`ClientIdentity`]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdentityError {
    #[error("name is required")]
    EmptyName,

    #[error("email address is invalid")]
    InvalidEmail,
}

impl ClientIdentity {
    /// Create an identity, trimming the name and dropping empty optionals.
    pub fn new(name: &str, email: Option<&str>, company: Option<&str>) -> Self {
        let clean = |v: Option<&str>| {
            v.map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        Self {
            name: name.trim().to_string(),
            email: clean(email),
            company: clean(company),
        }
    }

    /// Check the advance guard for the info step: the name must be
    /// non-empty and an email, when present, must contain an "@".
    pub fn validate(&self) -> Result<(), IdentityError> {
        if self.name.trim().is_empty() {
            return Err(IdentityError::EmptyName);
        }
        if let Some(email) = &self.email {
            if !email.contains('@') {
                return Err(IdentityError::InvalidEmail);
            }
        }
        Ok(())
    }
}

/// One-time upload destination issued by the backend.
///
/// Single use: one ticket covers exactly one transfer attempt. A retried
/// upload must request a fresh ticket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadTicket {
    /// Destination for the clip body (PUT)
    pub upload_url: String,

    /// Opaque upload identifier, echoed back during registration
    pub upload_id: String,
}

/// Processing status of a stored video record.
///
/// The client only ever observes the initial `Uploading`; later states are
/// driven by the video host's processing webhook on the backend side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProcessingStatus {
    Uploading,
    Processing,
    Ready,
    Errored,
}

/// A submitted video as stored by the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoRecord {
    /// Record ID
    pub id: Uuid,

    /// Collection the video belongs to
    pub collection_id: Uuid,

    /// Client name as entered
    pub client_name: String,

    /// Client email, if given
    pub client_email: Option<String>,

    /// Client company, if given
    pub client_company: Option<String>,

    /// Upload identifier from the ticket used to transfer the clip
    pub upload_id: String,

    /// Current processing status
    pub status: ProcessingStatus,

    /// Playback identifier, set once processing completes
    pub playback_id: Option<String>,

    /// Duration in seconds, set once processing completes
    pub duration: Option<f64>,

    /// Thumbnail URL, set once processing completes
    pub thumbnail_url: Option<String>,

    /// When the record was created
    pub created_at: DateTime<Utc>,
}
