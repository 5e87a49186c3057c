//! Clip submission
//!
//! The backend API client and the three-step pipeline that delivers a
//! finished clip: upload ticket, binary transfer, metadata registration.

pub mod client;
pub mod pipeline;

pub use client::{ApiClient, ApiError, RegisterVideoRequest};
pub use pipeline::{SubmissionPipeline, SubmitError, SubmitStep};
