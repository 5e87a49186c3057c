//! Device acquisition and clip capture
//!
//! This module provides the capture capability interface and its two
//! backends: the real system devices and a synthetic double for tests
//! and camera-less machines.

pub mod session;
pub mod synthetic;
pub mod system;
pub mod traits;

pub use session::DeviceSession;
pub use synthetic::SyntheticDevices;
pub use system::SystemDevices;
pub use traits::{
    CaptureError, ClipFormat, ClipRecorder, DeviceError, LiveStream, MediaDevices,
    StreamConstraints,
};
