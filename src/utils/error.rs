//! Error types and handling
//!
//! Umbrella error for callers driving the whole flow, such as the CLI.

use crate::capture::traits::{CaptureError, DeviceError};
use crate::recorder::flow::FlowError;
use crate::submit::client::ApiError;
use crate::submit::pipeline::SubmitError;
use thiserror::Error;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("device error: {0}")]
    Device(#[from] DeviceError),

    #[error("capture error: {0}")]
    Capture(#[from] CaptureError),

    #[error("flow error: {0}")]
    Flow(#[from] FlowError),

    #[error("API error: {0}")]
    Api(#[from] ApiError),

    #[error("submission error: {0}")]
    Submit(#[from] SubmitError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;
