//! Recording flow engine
//!
//! This module implements the testimonial recording state machine:
//! - FlowState/FlowEvent describe the steps and their notifications
//! - CaptureController drives one bounded attempt
//! - RecordingFlow sequences details, permission, capture, and submission

pub mod controller;
pub mod flow;
pub mod state;

pub use controller::{negotiate_format, ActiveCapture, FinishedClip, PREFERRED_FORMATS};
pub use flow::{FlowError, RecordingFlow};
pub use state::{FlowEvent, FlowState};
