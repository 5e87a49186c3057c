//! Synthetic capture backend
//!
//! Produces deterministic chunks without touching real hardware. Used by
//! the test suite and by the CLI's `--synthetic` mode so the flow can run
//! on machines with no camera.

use super::traits::{
    CaptureError, ClipFormat, ClipRecorder, DeviceError, LiveStream, MediaDevices,
    StreamConstraints,
};
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Bytes emitted per recorder chunk.
const CHUNK_LEN: usize = 1024;

#[derive(Debug, Default)]
struct Counters {
    acquires: AtomicUsize,
    closes: AtomicUsize,
    recorders: AtomicUsize,
}

/// Deterministic [`MediaDevices`] implementation.
///
/// Every recorder started on a synthetic stream fills its chunks with a
/// distinct tag byte (1 for the first recorder, 2 for the second, ...),
/// so a test can tell which attempt produced which bytes.
pub struct SyntheticDevices {
    fail_with: Option<DeviceError>,
    supported_formats: Vec<ClipFormat>,
    default_format: ClipFormat,
    counters: Arc<Counters>,
}

impl SyntheticDevices {
    /// Backend that acquires successfully and supports every format.
    pub fn new() -> Self {
        Self {
            fail_with: None,
            supported_formats: vec![ClipFormat::Mp4, ClipFormat::WebmVp9, ClipFormat::Webm],
            default_format: ClipFormat::Mp4,
            counters: Arc::new(Counters::default()),
        }
    }

    /// Backend whose every acquisition fails with `error`.
    pub fn failing(error: DeviceError) -> Self {
        Self {
            fail_with: Some(error),
            ..Self::new()
        }
    }

    /// Restrict the formats streams claim to support.
    pub fn with_formats(mut self, formats: Vec<ClipFormat>, default: ClipFormat) -> Self {
        self.supported_formats = formats;
        self.default_format = default;
        self
    }

    /// How many times a stream was successfully acquired.
    pub fn acquire_count(&self) -> usize {
        self.counters.acquires.load(Ordering::SeqCst)
    }

    /// How many acquired streams were closed.
    pub fn close_count(&self) -> usize {
        self.counters.closes.load(Ordering::SeqCst)
    }
}

impl Default for SyntheticDevices {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MediaDevices for SyntheticDevices {
    async fn acquire(
        &self,
        constraints: &StreamConstraints,
    ) -> Result<Box<dyn LiveStream>, DeviceError> {
        if let Some(error) = &self.fail_with {
            return Err(error.clone());
        }

        self.counters.acquires.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(SyntheticStream {
            width: constraints
                .video
                .ideal_width
                .min(constraints.video.max_width),
            height: constraints
                .video
                .ideal_height
                .min(constraints.video.max_height),
            supported_formats: self.supported_formats.clone(),
            default_format: self.default_format,
            counters: self.counters.clone(),
            closed: false,
        }))
    }
}

struct SyntheticStream {
    width: u32,
    height: u32,
    supported_formats: Vec<ClipFormat>,
    default_format: ClipFormat,
    counters: Arc<Counters>,
    closed: bool,
}

impl LiveStream for SyntheticStream {
    fn label(&self) -> String {
        format!("synthetic camera ({}x{})", self.width, self.height)
    }

    fn supported_formats(&self) -> Vec<ClipFormat> {
        self.supported_formats.clone()
    }

    fn default_format(&self) -> ClipFormat {
        self.default_format
    }

    fn start_recorder(&self, format: ClipFormat) -> Result<Box<dyn ClipRecorder>, CaptureError> {
        let tag = self.counters.recorders.fetch_add(1, Ordering::SeqCst) as u8 + 1;
        tracing::debug!("synthetic recorder {} started ({:?})", tag, format);
        Ok(Box::new(SyntheticRecorder { tag }))
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.counters.closes.fetch_add(1, Ordering::SeqCst);
        }
    }
}

struct SyntheticRecorder {
    tag: u8,
}

impl SyntheticRecorder {
    fn chunk(&self) -> Bytes {
        Bytes::from(vec![self.tag; CHUNK_LEN])
    }
}

#[async_trait]
impl ClipRecorder for SyntheticRecorder {
    fn poll_chunk(&mut self) -> Option<Bytes> {
        Some(self.chunk())
    }

    async fn finish(&mut self) -> Result<Vec<Bytes>, CaptureError> {
        // One trailing chunk, like a real recorder flushing on stop.
        Ok(vec![self.chunk()])
    }
}
