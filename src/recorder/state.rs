//! Recording flow state and events
//!
//! Defines the tagged state machine the recording flow moves through and
//! the events it broadcasts to observers.

use serde::{Deserialize, Serialize};

/// State of one testimonial recording flow.
///
/// One variant per step, in order:
/// info, permission, ready, recording, review, uploading, done, with
/// error reachable from uploading. Illegal transitions are rejected by
/// the flow's methods, never performed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "step")]
pub enum FlowState {
    /// Collecting the client's details
    Info,

    /// Waiting for (or retrying) device access
    Permission {
        /// Classified message from the last failed acquisition
        error: Option<String>,
    },

    /// Live preview, armed but not recording
    Ready,

    /// Capture in progress
    Recording,

    /// Finished clip available for playback, retake, or submit
    Review,

    /// Submission pipeline running
    Uploading,

    /// Testimonial submitted
    Done,

    /// Submission failed; retake returns to ready
    Error { message: String },
}

impl FlowState {
    /// Step name for logs and error messages.
    pub fn name(&self) -> &'static str {
        match self {
            FlowState::Info => "info",
            FlowState::Permission { .. } => "permission",
            FlowState::Ready => "ready",
            FlowState::Recording => "recording",
            FlowState::Review => "review",
            FlowState::Uploading => "uploading",
            FlowState::Done => "done",
            FlowState::Error { .. } => "error",
        }
    }
}

impl Default for FlowState {
    fn default() -> Self {
        Self::Info
    }
}

/// Events emitted while a flow runs.
#[derive(Debug, Clone)]
pub enum FlowEvent {
    /// The flow moved to a new state
    StateChanged(FlowState),

    /// One second of recording elapsed
    Tick { elapsed_secs: u32, max_secs: u32 },

    /// Upload progress, 0 to 100
    UploadProgress(u8),
}
