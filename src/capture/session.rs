//! Device session lifecycle
//!
//! Owns the acquired camera+microphone stream for one recording flow.
//! The stream is acquired at most once per flow and survives retakes;
//! release is idempotent and safe on a session that never acquired.

use super::traits::{DeviceError, LiveStream, MediaDevices, StreamConstraints};

/// Single owner of an acquired live stream.
#[derive(Default)]
pub struct DeviceSession {
    stream: Option<Box<dyn LiveStream>>,
}

impl DeviceSession {
    /// Create an empty session; nothing is acquired yet.
    pub fn new() -> Self {
        Self { stream: None }
    }

    /// Acquire a stream from `devices`.
    ///
    /// If a stream is already held it is reused; the devices are never
    /// acquired twice by the same session.
    pub async fn acquire(
        &mut self,
        devices: &dyn MediaDevices,
        constraints: &StreamConstraints,
    ) -> Result<(), DeviceError> {
        if self.stream.is_some() {
            tracing::debug!("device session already active, reusing stream");
            return Ok(());
        }

        let stream = devices.acquire(constraints).await?;
        tracing::info!("acquired device stream: {}", stream.label());
        self.stream = Some(stream);
        Ok(())
    }

    /// Whether a live stream is currently held.
    pub fn is_active(&self) -> bool {
        self.stream.is_some()
    }

    /// The held stream, if any.
    pub fn stream(&self) -> Option<&dyn LiveStream> {
        self.stream.as_deref()
    }

    /// Release the held stream. Safe to call repeatedly or without a
    /// prior acquire; only the first call after an acquire has effect.
    pub fn release(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            tracing::info!("releasing device stream: {}", stream.label());
            stream.close();
        }
    }
}

impl Drop for DeviceSession {
    fn drop(&mut self) {
        self.release();
    }
}
