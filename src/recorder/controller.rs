//! Capture controller
//!
//! Drives one recording attempt: negotiates the recording format, runs
//! the one-second tick that enforces the duration cap, buffers incoming
//! chunks, and assembles the finished clip when the attempt stops.
//!
//! Manual stop and the automatic cap both funnel into a single drive
//! task, so exactly one stop ever happens per attempt; whichever signal
//! arrives first wins and the other is a no-op.

use crate::capture::traits::{CaptureError, ClipFormat, ClipRecorder};
use crate::recorder::state::FlowEvent;
use crate::utils::clock::Clock;
use bytes::{Bytes, BytesMut};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, watch};

/// Format preference order, most compatible first.
pub const PREFERRED_FORMATS: [ClipFormat; 3] =
    [ClipFormat::Mp4, ClipFormat::WebmVp9, ClipFormat::Webm];

/// Pick the first preferred format the stream supports, or its own
/// default when none of the preferred options are available.
pub fn negotiate_format(supported: &[ClipFormat], fallback: ClipFormat) -> ClipFormat {
    PREFERRED_FORMATS
        .iter()
        .copied()
        .find(|format| supported.contains(format))
        .unwrap_or(fallback)
}

/// A completed recording: all chunks concatenated in arrival order.
#[derive(Debug, Clone)]
pub struct FinishedClip {
    /// Clip body
    pub data: Bytes,

    /// Format the clip was recorded in
    pub format: ClipFormat,
}

impl FinishedClip {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Callback invoked exactly once when the attempt stops.
pub type FinishFn = Box<dyn FnOnce(Result<FinishedClip, CaptureError>) + Send>;

/// Handle to an in-flight recording attempt.
///
/// Dropping the handle signals the drive task to stop and clean up in
/// the background; the recorder is always finished, never abandoned.
pub struct ActiveCapture {
    stop_tx: watch::Sender<bool>,
    done_rx: watch::Receiver<bool>,
}

impl ActiveCapture {
    /// Start the drive task for one attempt.
    ///
    /// Each tick of `clock` increments `elapsed`, polls the recorder for
    /// the chunk produced in that second, and forces a stop once
    /// `max_secs` is reached. `on_finish` receives the assembled clip
    /// (or the capture error) exactly once.
    pub fn begin(
        recorder: Box<dyn ClipRecorder>,
        format: ClipFormat,
        max_secs: u32,
        clock: Arc<dyn Clock>,
        elapsed: Arc<AtomicU32>,
        events: broadcast::Sender<FlowEvent>,
        on_finish: FinishFn,
    ) -> Self {
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let (done_tx, done_rx) = watch::channel(false);

        elapsed.store(0, Ordering::SeqCst);

        tokio::spawn(async move {
            let mut recorder = recorder;
            let mut chunks: Vec<Bytes> = Vec::new();

            loop {
                tokio::select! {
                    changed = stop_rx.changed() => {
                        if changed.is_ok() {
                            tracing::debug!("manual stop requested");
                        } else {
                            tracing::debug!("capture handle dropped, stopping");
                        }
                        break;
                    }
                    _ = clock.tick() => {
                        if let Some(chunk) = recorder.poll_chunk() {
                            if !chunk.is_empty() {
                                chunks.push(chunk);
                            }
                        }

                        let secs = elapsed.fetch_add(1, Ordering::SeqCst) + 1;
                        let _ = events.send(FlowEvent::Tick {
                            elapsed_secs: secs,
                            max_secs,
                        });

                        if secs >= max_secs {
                            tracing::debug!("duration cap reached at {}s", secs);
                            break;
                        }
                    }
                }
            }

            let result = assemble_clip(recorder, chunks, format).await;
            match &result {
                Ok(clip) => tracing::info!("capture finished: {} bytes ({:?})", clip.len(), format),
                Err(e) => tracing::error!("capture failed: {}", e),
            }
            on_finish(result);
            let _ = done_tx.send(true);
        });

        Self { stop_tx, done_rx }
    }

    /// Request a manual stop. No-op if the attempt already stopped.
    pub fn request_stop(&self) {
        let _ = self.stop_tx.send(true);
    }

    /// Whether the drive task has delivered its result.
    pub fn is_finished(&self) -> bool {
        *self.done_rx.borrow()
    }

    /// Wait until the drive task has delivered its result.
    pub async fn wait_done(&mut self) {
        if *self.done_rx.borrow() {
            return;
        }
        let _ = self.done_rx.changed().await;
    }
}

/// Finish the recorder, drain remaining chunks, and concatenate
/// everything in arrival order. Empty fragments are discarded.
async fn assemble_clip(
    mut recorder: Box<dyn ClipRecorder>,
    mut chunks: Vec<Bytes>,
    format: ClipFormat,
) -> Result<FinishedClip, CaptureError> {
    let rest = recorder.finish().await?;
    chunks.extend(rest.into_iter().filter(|chunk| !chunk.is_empty()));

    let total: usize = chunks.iter().map(Bytes::len).sum();
    if total == 0 {
        return Err(CaptureError::EmptyCapture);
    }

    let mut data = BytesMut::with_capacity(total);
    for chunk in &chunks {
        data.extend_from_slice(chunk);
    }

    Ok(FinishedClip {
        data: data.freeze(),
        format,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::clock::ManualClock;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    /// Recorder emitting a scripted sequence of chunks.
    struct ScriptedRecorder {
        script: Vec<Bytes>,
        position: usize,
        trailing: Vec<Bytes>,
    }

    impl ScriptedRecorder {
        fn repeating(byte: u8) -> Self {
            Self {
                script: vec![Bytes::from(vec![byte; 8]); 64],
                position: 0,
                // Flush one chunk on stop, like a real recorder.
                trailing: vec![Bytes::from(vec![byte; 8])],
            }
        }

        fn with_script(script: Vec<&'static [u8]>, trailing: Vec<&'static [u8]>) -> Self {
            Self {
                script: script.into_iter().map(Bytes::from_static).collect(),
                position: 0,
                trailing: trailing.into_iter().map(Bytes::from_static).collect(),
            }
        }
    }

    #[async_trait]
    impl ClipRecorder for ScriptedRecorder {
        fn poll_chunk(&mut self) -> Option<Bytes> {
            let chunk = self.script.get(self.position).cloned();
            self.position += 1;
            chunk
        }

        async fn finish(&mut self) -> Result<Vec<Bytes>, CaptureError> {
            Ok(std::mem::take(&mut self.trailing))
        }
    }

    struct Harness {
        capture: ActiveCapture,
        elapsed: Arc<AtomicU32>,
        clock: Arc<ManualClock>,
        result: Arc<Mutex<Option<Result<FinishedClip, CaptureError>>>>,
        finish_calls: Arc<AtomicUsize>,
    }

    fn start(recorder: Box<dyn ClipRecorder>, max_secs: u32) -> Harness {
        let clock = Arc::new(ManualClock::new());
        let elapsed = Arc::new(AtomicU32::new(0));
        let (events, _) = broadcast::channel(64);
        let result = Arc::new(Mutex::new(None));
        let finish_calls = Arc::new(AtomicUsize::new(0));

        let slot = result.clone();
        let calls = finish_calls.clone();
        let capture = ActiveCapture::begin(
            recorder,
            ClipFormat::Mp4,
            max_secs,
            clock.clone(),
            elapsed.clone(),
            events,
            Box::new(move |outcome| {
                calls.fetch_add(1, Ordering::SeqCst);
                *slot.lock() = Some(outcome);
            }),
        );

        Harness {
            capture,
            elapsed,
            clock,
            result,
            finish_calls,
        }
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        for _ in 0..2000 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        panic!("condition not reached in time");
    }

    #[tokio::test]
    async fn test_cap_stops_at_exactly_max_duration() {
        let mut harness = start(Box::new(ScriptedRecorder::repeating(7)), 30);

        harness.clock.advance(29);
        let elapsed = harness.elapsed.clone();
        wait_until(move || elapsed.load(Ordering::SeqCst) == 29).await;
        assert!(!harness.capture.is_finished());

        harness.clock.advance(1);
        harness.capture.wait_done().await;
        assert_eq!(harness.elapsed.load(Ordering::SeqCst), 30);
        assert!(harness.result.lock().as_ref().unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_manual_and_cap_stop_produce_one_finish() {
        let mut harness = start(Box::new(ScriptedRecorder::repeating(7)), 5);

        // Fire the cap and the manual stop together; only one may win.
        harness.clock.advance(5);
        harness.capture.request_stop();
        harness.capture.wait_done().await;

        // Extra stop requests after the fact change nothing.
        harness.capture.request_stop();
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(harness.finish_calls.load(Ordering::SeqCst), 1);
        assert!(harness.result.lock().as_ref().unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_manual_stop_before_cap() {
        let mut harness = start(Box::new(ScriptedRecorder::repeating(7)), 60);

        harness.clock.advance(2);
        let elapsed = harness.elapsed.clone();
        wait_until(move || elapsed.load(Ordering::SeqCst) == 2).await;

        harness.capture.request_stop();
        harness.capture.wait_done().await;

        assert_eq!(harness.finish_calls.load(Ordering::SeqCst), 1);
        assert!(harness.elapsed.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_chunks_concatenate_in_order_and_empties_are_dropped() {
        let recorder =
            ScriptedRecorder::with_script(vec![b"aa", b"", b"bb"], vec![b"", b"cc"]);
        let mut harness = start(Box::new(recorder), 3);

        harness.clock.advance(3);
        harness.capture.wait_done().await;

        let guard = harness.result.lock();
        let clip = guard.as_ref().unwrap().as_ref().unwrap();
        assert_eq!(&clip.data[..], b"aabbcc");
        assert_eq!(clip.format, ClipFormat::Mp4);
    }

    #[tokio::test]
    async fn test_all_empty_capture_is_an_error() {
        let recorder = ScriptedRecorder::with_script(vec![b"", b""], vec![]);
        let mut harness = start(Box::new(recorder), 2);

        harness.clock.advance(2);
        harness.capture.wait_done().await;

        let guard = harness.result.lock();
        assert!(matches!(
            guard.as_ref().unwrap(),
            Err(CaptureError::EmptyCapture)
        ));
    }

    #[test]
    fn test_format_negotiation_prefers_most_compatible() {
        let all = [ClipFormat::Mp4, ClipFormat::WebmVp9, ClipFormat::Webm];
        assert_eq!(negotiate_format(&all, ClipFormat::Webm), ClipFormat::Mp4);

        let no_mp4 = [ClipFormat::WebmVp9, ClipFormat::Webm];
        assert_eq!(negotiate_format(&no_mp4, ClipFormat::Webm), ClipFormat::WebmVp9);

        // Only the least-preferred format available: still selected.
        let last_only = [ClipFormat::Webm];
        assert_eq!(negotiate_format(&last_only, ClipFormat::Mp4), ClipFormat::Webm);

        // Nothing supported: the stream's own default wins.
        assert_eq!(negotiate_format(&[], ClipFormat::WebmVp9), ClipFormat::WebmVp9);
    }
}
