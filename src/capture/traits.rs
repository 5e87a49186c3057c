//! Capture trait definitions
//!
//! Backend-agnostic traits for acquiring a camera+microphone stream and
//! recording it to a clip. The real system backend and the synthetic test
//! backend both implement these, so the recording flow never touches
//! device APIs directly.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Preferred camera orientation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraFacing {
    /// Camera facing the person recording
    Front,
    /// Camera facing away
    Back,
}

/// Video constraints for stream acquisition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoConstraints {
    /// Preferred width in pixels
    pub ideal_width: u32,

    /// Preferred height in pixels
    pub ideal_height: u32,

    /// Hard width cap
    pub max_width: u32,

    /// Hard height cap
    pub max_height: u32,

    /// Preferred camera orientation
    pub facing: CameraFacing,
}

/// Audio constraints for stream acquisition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioConstraints {
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
}

/// Combined audio+video constraints for one acquisition request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamConstraints {
    pub video: VideoConstraints,
    pub audio: AudioConstraints,
}

impl Default for StreamConstraints {
    fn default() -> Self {
        Self {
            video: VideoConstraints {
                ideal_width: 1280,
                ideal_height: 720,
                max_width: 1920,
                max_height: 1080,
                facing: CameraFacing::Front,
            },
            audio: AudioConstraints {
                echo_cancellation: true,
                noise_suppression: true,
            },
        }
    }
}

/// Recording container/codec combinations.
///
/// The controller picks the first supported entry of its preference list,
/// falling back to the stream's own default when none match. Downstream
/// playback and the ingestion endpoint expect one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClipFormat {
    /// H.264/AAC in MP4
    Mp4,
    /// VP9/Opus in WebM
    WebmVp9,
    /// VP8/Opus in WebM
    Webm,
}

impl ClipFormat {
    /// MIME type sent with the uploaded clip
    pub fn mime_type(&self) -> &'static str {
        match self {
            ClipFormat::Mp4 => "video/mp4",
            ClipFormat::WebmVp9 => "video/webm;codecs=vp9",
            ClipFormat::Webm => "video/webm",
        }
    }

    /// File extension for local copies
    pub fn extension(&self) -> &'static str {
        match self {
            ClipFormat::Mp4 => "mp4",
            ClipFormat::WebmVp9 | ClipFormat::Webm => "webm",
        }
    }
}

/// Stream acquisition failures, classified for user-facing copy.
///
/// This classification is the error taxonomy for the entry point of the
/// whole flow; each kind maps to distinct copy via
/// [`user_message`](DeviceError::user_message).
#[derive(Error, Debug, Clone)]
pub enum DeviceError {
    #[error("camera or microphone access was denied")]
    PermissionDenied,

    #[error("no camera or microphone was found")]
    NotFound,

    #[error("failed to access capture devices: {0}")]
    Other(String),
}

impl DeviceError {
    /// Copy shown to the person recording.
    pub fn user_message(&self) -> &'static str {
        match self {
            DeviceError::PermissionDenied => {
                "Camera access was denied. Please allow camera and microphone \
                 access in your system settings and try again."
            }
            DeviceError::NotFound => {
                "No camera or microphone found. Please connect a camera and \
                 try again."
            }
            DeviceError::Other(_) => {
                "Unable to access camera. Please make sure your device \
                 supports video recording and try again."
            }
        }
    }
}

/// Capture and recorder failures.
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("recording already in progress")]
    AlreadyRecording,

    #[error("no recording in progress")]
    NotRecording,

    #[error("failed to start recorder: {0}")]
    RecorderStart(String),

    #[error("recorder produced no data")]
    EmptyCapture,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Entry point to a capture backend: yields live streams.
#[async_trait]
pub trait MediaDevices: Send + Sync {
    /// Acquire a combined audio+video stream satisfying `constraints`.
    ///
    /// Triggers whatever permission prompt the platform requires. Failure
    /// is classified into the [`DeviceError`] taxonomy.
    async fn acquire(
        &self,
        constraints: &StreamConstraints,
    ) -> Result<Box<dyn LiveStream>, DeviceError>;
}

/// An acquired, live camera+microphone stream.
///
/// The stream outlives individual recording attempts: a retake starts a
/// fresh recorder on the same stream without re-acquiring the devices.
pub trait LiveStream: Send + Sync {
    /// Human-readable device description for logs
    fn label(&self) -> String;

    /// Formats this stream can record
    fn supported_formats(&self) -> Vec<ClipFormat>;

    /// Format used when no preferred format is supported
    fn default_format(&self) -> ClipFormat;

    /// Start a recorder for one attempt.
    ///
    /// At most one recorder may be active per stream; the previous
    /// recorder must be finished before starting another.
    fn start_recorder(&self, format: ClipFormat) -> Result<Box<dyn ClipRecorder>, CaptureError>;

    /// Release the underlying devices. Idempotent.
    fn close(&mut self);
}

/// An in-progress recording on a live stream.
///
/// Data arrives incrementally; the controller polls once per second and
/// concatenates the chunks in arrival order when the attempt stops.
#[async_trait]
pub trait ClipRecorder: Send {
    /// Data captured since the last poll, if any.
    fn poll_chunk(&mut self) -> Option<Bytes>;

    /// Stop capturing and drain any remaining buffered data.
    async fn finish(&mut self) -> Result<Vec<Bytes>, CaptureError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_constraints() {
        let constraints = StreamConstraints::default();
        assert_eq!(constraints.video.ideal_width, 1280);
        assert_eq!(constraints.video.max_height, 1080);
        assert_eq!(constraints.video.facing, CameraFacing::Front);
        assert!(constraints.audio.echo_cancellation);
        assert!(constraints.audio.noise_suppression);
    }

    #[test]
    fn test_clip_format_metadata() {
        assert_eq!(ClipFormat::Mp4.mime_type(), "video/mp4");
        assert_eq!(ClipFormat::WebmVp9.mime_type(), "video/webm;codecs=vp9");
        assert_eq!(ClipFormat::Webm.extension(), "webm");
    }

    #[test]
    fn test_device_error_copy_is_distinct() {
        let messages = [
            DeviceError::PermissionDenied.user_message(),
            DeviceError::NotFound.user_message(),
            DeviceError::Other("busy".into()).user_message(),
        ];
        assert_ne!(messages[0], messages[1]);
        assert_ne!(messages[1], messages[2]);
        assert_ne!(messages[0], messages[2]);
    }
}
