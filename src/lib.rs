//! Vouchbooth - video testimonials, recorded and delivered.
//!
//! This is the main library crate for the Vouchbooth client. It drives
//! the full testimonial flow: collecting the client's details, acquiring
//! the camera and microphone, recording a bounded clip, and submitting it
//! to the collection backend.

pub mod capture;
pub mod collection;
pub mod recorder;
pub mod submit;
pub mod utils;

pub use capture::{DeviceSession, SyntheticDevices, SystemDevices};
pub use collection::{ClientIdentity, CollectionConfig};
pub use recorder::{FlowEvent, FlowState, RecordingFlow};
pub use submit::ApiClient;
