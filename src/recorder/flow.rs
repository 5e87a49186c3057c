//! Recording flow
//!
//! The top-level state machine for one testimonial: collects the
//! client's details, acquires the capture devices, runs the bounded
//! recording attempt, and hands the finished clip to the submission
//! pipeline. Illegal transitions are rejected; environmental failures
//! are absorbed into the state so the client always lands somewhere
//! actionable.

use super::controller::{negotiate_format, ActiveCapture, FinishFn, FinishedClip};
use super::state::{FlowEvent, FlowState};
use crate::capture::session::DeviceSession;
use crate::capture::traits::{MediaDevices, StreamConstraints};
use crate::collection::{ClientIdentity, CollectionConfig, IdentityError};
use crate::submit::{ApiClient, SubmissionPipeline};
use crate::utils::clock::Clock;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;

/// Copy shown when the submission pipeline fails, whatever the step.
const UPLOAD_FAILED_MESSAGE: &str = "We couldn't upload your video. Please try again.";

/// Copy shown when the recording attempt itself fails.
const CAPTURE_FAILED_MESSAGE: &str = "We couldn't capture your video. Please try again.";

/// Flow-level failures.
#[derive(Error, Debug)]
pub enum FlowError {
    #[error("collection is not accepting testimonials")]
    InactiveCollection,

    #[error("{action} is not allowed in the {state} state")]
    InvalidAction {
        action: &'static str,
        state: &'static str,
    },

    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error("device session is no longer available")]
    SessionLost,

    #[error("client details are missing")]
    MissingDetails,

    #[error("no finished clip available")]
    MissingClip,
}

fn invalid(action: &'static str, state: &FlowState) -> FlowError {
    FlowError::InvalidAction {
        action,
        state: state.name(),
    }
}

/// State shared with the capture drive task.
struct FlowShared {
    state: RwLock<FlowState>,
    clip: Mutex<Option<FinishedClip>>,
    elapsed: Arc<AtomicU32>,
}

fn set_shared_state(
    shared: &FlowShared,
    events: &broadcast::Sender<FlowEvent>,
    next: FlowState,
) {
    tracing::info!("flow state -> {}", next.name());
    *shared.state.write() = next.clone();
    let _ = events.send(FlowEvent::StateChanged(next));
}

/// One testimonial recording flow.
///
/// Owns the device session for its whole life; the session is acquired
/// at most once and released only on successful submission or drop.
pub struct RecordingFlow {
    collection: CollectionConfig,
    constraints: StreamConstraints,
    identity: Option<ClientIdentity>,
    devices: Arc<dyn MediaDevices>,
    clock: Arc<dyn Clock>,
    api: ApiClient,
    session: DeviceSession,
    capture: Option<ActiveCapture>,
    shared: Arc<FlowShared>,
    event_tx: broadcast::Sender<FlowEvent>,
}

impl RecordingFlow {
    /// Create a flow for an active collection.
    pub fn new(
        collection: CollectionConfig,
        devices: Arc<dyn MediaDevices>,
        clock: Arc<dyn Clock>,
        api: ApiClient,
    ) -> Result<Self, FlowError> {
        if !collection.is_active {
            return Err(FlowError::InactiveCollection);
        }

        let (event_tx, _) = broadcast::channel(100);
        Ok(Self {
            collection,
            constraints: StreamConstraints::default(),
            identity: None,
            devices,
            clock,
            api,
            session: DeviceSession::new(),
            capture: None,
            shared: Arc::new(FlowShared {
                state: RwLock::new(FlowState::Info),
                clip: Mutex::new(None),
                elapsed: Arc::new(AtomicU32::new(0)),
            }),
            event_tx,
        })
    }

    /// The collection this flow records for.
    pub fn collection(&self) -> &CollectionConfig {
        &self.collection
    }

    /// Current state.
    pub fn state(&self) -> FlowState {
        self.shared.state.read().clone()
    }

    /// Subscribe to flow events.
    pub fn subscribe(&self) -> broadcast::Receiver<FlowEvent> {
        self.event_tx.subscribe()
    }

    /// Seconds recorded in the current attempt.
    pub fn elapsed_secs(&self) -> u32 {
        self.shared.elapsed.load(Ordering::SeqCst)
    }

    /// The finished clip awaiting review, if any.
    pub fn finished_clip(&self) -> Option<FinishedClip> {
        self.shared.clip.lock().clone()
    }

    fn set_state(&self, next: FlowState) {
        set_shared_state(&self.shared, &self.event_tx, next);
    }

    /// Store the client's details and advance to the permission step.
    ///
    /// The details are validated here; once recording begins they are
    /// immutable.
    pub fn submit_details(&mut self, identity: ClientIdentity) -> Result<(), FlowError> {
        let state = self.state();
        if state != FlowState::Info {
            return Err(invalid("submit_details", &state));
        }

        identity.validate()?;
        tracing::info!("client details accepted for '{}'", identity.name);
        self.identity = Some(identity);
        self.set_state(FlowState::Permission { error: None });
        Ok(())
    }

    /// Acquire the capture devices.
    ///
    /// On failure the flow stays in the permission step with the
    /// classified message stored, ready for a manual retry; on success
    /// it advances to ready.
    pub async fn request_access(&mut self) -> Result<(), FlowError> {
        let state = self.state();
        if !matches!(state, FlowState::Permission { .. }) {
            return Err(invalid("request_access", &state));
        }

        match self
            .session
            .acquire(self.devices.as_ref(), &self.constraints)
            .await
        {
            Ok(()) => self.set_state(FlowState::Ready),
            Err(e) => {
                tracing::warn!("device acquisition failed: {}", e);
                self.set_state(FlowState::Permission {
                    error: Some(e.user_message().to_string()),
                });
            }
        }
        Ok(())
    }

    /// Start a recording attempt on the live stream.
    pub fn start_recording(&mut self) -> Result<(), FlowError> {
        let state = self.state();
        if state != FlowState::Ready {
            return Err(invalid("start_recording", &state));
        }

        let stream = self.session.stream().ok_or(FlowError::SessionLost)?;
        let format = negotiate_format(&stream.supported_formats(), stream.default_format());
        tracing::info!("negotiated recording format: {:?}", format);

        let recorder = match stream.start_recorder(format) {
            Ok(recorder) => recorder,
            Err(e) => {
                // A stream that cannot record is as good as lost; send the
                // client back through the permission step.
                tracing::warn!("failed to start recorder: {}", e);
                self.session.release();
                self.set_state(FlowState::Permission {
                    error: Some(
                        crate::capture::traits::DeviceError::Other(e.to_string())
                            .user_message()
                            .to_string(),
                    ),
                });
                return Ok(());
            }
        };

        self.shared.clip.lock().take();
        self.set_state(FlowState::Recording);

        let shared = self.shared.clone();
        let events = self.event_tx.clone();
        let on_finish: FinishFn = Box::new(move |outcome| match outcome {
            Ok(clip) => {
                *shared.clip.lock() = Some(clip);
                set_shared_state(&shared, &events, FlowState::Review);
            }
            Err(e) => {
                tracing::error!("recording attempt failed: {}", e);
                set_shared_state(
                    &shared,
                    &events,
                    FlowState::Error {
                        message: CAPTURE_FAILED_MESSAGE.to_string(),
                    },
                );
            }
        });

        self.capture = Some(ActiveCapture::begin(
            recorder,
            format,
            self.collection.max_duration,
            self.clock.clone(),
            self.shared.elapsed.clone(),
            self.event_tx.clone(),
            on_finish,
        ));
        Ok(())
    }

    /// Stop the current attempt and wait for the clip.
    ///
    /// A no-op when the duration cap already stopped the attempt: the
    /// earlier stop wins and this call simply returns.
    pub async fn stop_recording(&mut self) -> Result<(), FlowError> {
        let state = self.state();
        match state {
            FlowState::Recording => {
                if let Some(capture) = self.capture.as_mut() {
                    capture.request_stop();
                    capture.wait_done().await;
                }
                Ok(())
            }
            FlowState::Review | FlowState::Error { .. } => Ok(()),
            other => Err(invalid("stop_recording", &other)),
        }
    }

    /// Discard the reviewed clip (or clear a submission failure) and
    /// return to ready for a fresh attempt.
    ///
    /// The live device session is reused, not re-acquired; only if the
    /// session was lost does the flow route back through permission.
    pub fn retake(&mut self) -> Result<(), FlowError> {
        let state = self.state();
        if !matches!(state, FlowState::Review | FlowState::Error { .. }) {
            return Err(invalid("retake", &state));
        }

        self.capture = None;
        self.shared.clip.lock().take();
        self.shared.elapsed.store(0, Ordering::SeqCst);

        if self.session.is_active() {
            self.set_state(FlowState::Ready);
        } else {
            tracing::debug!("device session lost, returning to permission step");
            self.set_state(FlowState::Permission { error: None });
        }
        Ok(())
    }

    /// Submit the reviewed clip through the pipeline.
    ///
    /// On success the device session is released and the flow is done;
    /// on any pipeline failure the flow lands in the error state, clip
    /// discarded, session still held for the retry.
    pub async fn submit(&mut self) -> Result<(), FlowError> {
        let state = self.state();
        if state != FlowState::Review {
            return Err(invalid("submit", &state));
        }

        let identity = self.identity.clone().ok_or(FlowError::MissingDetails)?;
        let clip = self.shared.clip.lock().take().ok_or(FlowError::MissingClip)?;

        self.set_state(FlowState::Uploading);

        let events = self.event_tx.clone();
        let progress = move |pct: u8| {
            let _ = events.send(FlowEvent::UploadProgress(pct));
        };

        let pipeline = SubmissionPipeline::new(&self.api);
        match pipeline
            .submit(&self.collection, &identity, &clip, progress)
            .await
        {
            Ok(record) => {
                tracing::info!("testimonial submitted: video {}", record.id);
                self.session.release();
                self.set_state(FlowState::Done);
            }
            Err(e) => {
                tracing::error!(step = %e.step(), "submission failed: {}", e);
                self.set_state(FlowState::Error {
                    message: UPLOAD_FAILED_MESSAGE.to_string(),
                });
            }
        }
        Ok(())
    }
}
