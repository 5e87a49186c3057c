//! System capture backend
//!
//! Real camera+microphone capture. Devices are enumerated and probed with
//! nokhwa (camera) and cpal (microphone) so acquisition failures can be
//! classified before recording starts; the actual capture and muxing is
//! done by an FFmpeg subprocess reading the OS capture devices and
//! writing a fragmented stream to stdout, which a reader thread slices
//! into chunks for the controller.

use super::traits::{
    CameraFacing, CaptureError, ClipFormat, ClipRecorder, DeviceError, LiveStream, MediaDevices,
    StreamConstraints,
};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use nokhwa::pixel_format::RgbAFormat;
use nokhwa::utils::{ApiBackend, CameraIndex, RequestedFormat, RequestedFormatType};
use nokhwa::Camera;
use std::io::{Read, Write};
use std::process::{Child, Command, Stdio};
use std::sync::mpsc;
use std::time::Duration;

/// Capture frame rate requested from FFmpeg.
const CAPTURE_FPS: u32 = 30;

/// A camera visible to the system backend.
#[derive(Debug, Clone)]
pub struct CameraDescriptor {
    pub index: CameraIndex,
    pub name: String,
}

/// Enumerate available cameras.
pub fn list_cameras() -> Vec<CameraDescriptor> {
    match nokhwa::query(ApiBackend::Auto) {
        Ok(cameras) => cameras
            .into_iter()
            .map(|info| CameraDescriptor {
                index: info.index().clone(),
                name: info.human_name().to_string(),
            })
            .collect(),
        Err(e) => {
            tracing::warn!("Failed to enumerate cameras: {:?}", e);
            Vec::new()
        }
    }
}

/// Classify a nokhwa failure into the device error taxonomy.
fn classify_camera_error(message: String) -> DeviceError {
    let lower = message.to_lowercase();
    if lower.contains("denied") || lower.contains("permission") || lower.contains("authoriz") {
        DeviceError::PermissionDenied
    } else if lower.contains("not found") || lower.contains("no device") {
        DeviceError::NotFound
    } else {
        DeviceError::Other(message)
    }
}

/// Which encoders the local FFmpeg build carries, mapped to clip formats.
fn detect_supported_formats() -> Result<Vec<ClipFormat>, DeviceError> {
    let output = Command::new("ffmpeg")
        .args(["-hide_banner", "-encoders"])
        .output()
        .map_err(|_| {
            DeviceError::Other("FFmpeg not found. Please install FFmpeg and try again.".to_string())
        })?;

    let encoders = String::from_utf8_lossy(&output.stdout);
    let mut formats = Vec::new();
    if encoders.contains("libx264") {
        formats.push(ClipFormat::Mp4);
    }
    if encoders.contains("libvpx-vp9") && encoders.contains("libopus") {
        formats.push(ClipFormat::WebmVp9);
    }
    if encoders.contains("libvpx ") && encoders.contains("libopus") {
        formats.push(ClipFormat::Webm);
    }
    Ok(formats)
}

/// Real [`MediaDevices`] implementation.
#[derive(Debug, Default)]
pub struct SystemDevices;

impl SystemDevices {
    pub fn new() -> Self {
        Self
    }

    /// Pick a camera matching the facing preference, defaulting to the
    /// first enumerated device.
    fn select_camera(
        cameras: &[CameraDescriptor],
        facing: CameraFacing,
    ) -> Option<CameraDescriptor> {
        let preferred = cameras.iter().find(|c| {
            let name = c.name.to_lowercase();
            match facing {
                CameraFacing::Front => {
                    name.contains("front") || name.contains("facetime") || name.contains("integrated")
                }
                CameraFacing::Back => name.contains("back") || name.contains("rear"),
            }
        });
        preferred.or_else(|| cameras.first()).cloned()
    }
}

#[async_trait]
impl MediaDevices for SystemDevices {
    async fn acquire(
        &self,
        constraints: &StreamConstraints,
    ) -> Result<Box<dyn LiveStream>, DeviceError> {
        let facing = constraints.video.facing;
        let width = constraints.video.ideal_width.min(constraints.video.max_width);
        let height = constraints
            .video
            .ideal_height
            .min(constraints.video.max_height);

        // Device enumeration and the open-probe block on OS calls.
        let (camera, mic_name, formats) = tokio::task::spawn_blocking(move || {
            let cameras = list_cameras();
            if cameras.is_empty() {
                return Err(DeviceError::NotFound);
            }

            let mic_name = default_microphone().ok_or(DeviceError::NotFound)?;

            let camera = Self::select_camera(&cameras, facing).ok_or(DeviceError::NotFound)?;

            // Open the camera once to trigger the OS permission prompt and
            // surface denial before the flow reaches the ready state.
            let requested =
                RequestedFormat::new::<RgbAFormat>(RequestedFormatType::AbsoluteHighestResolution);
            match Camera::new(camera.index.clone(), requested) {
                Ok(probe) => drop(probe),
                Err(e) => return Err(classify_camera_error(e.to_string())),
            }

            let formats = detect_supported_formats()?;
            Ok((camera, mic_name, formats))
        })
        .await
        .map_err(|e| DeviceError::Other(format!("device probe task failed: {e}")))??;

        tracing::info!(
            "System stream ready: camera '{}', microphone '{}', {}x{}",
            camera.name,
            mic_name,
            width,
            height
        );

        Ok(Box::new(SystemStream {
            camera,
            mic_name,
            width,
            height,
            supported_formats: formats,
            closed: false,
        }))
    }
}

/// Name of the default input device, if one exists.
fn default_microphone() -> Option<String> {
    use cpal::traits::{DeviceTrait, HostTrait};

    let device = cpal::default_host().default_input_device()?;
    Some(device.name().unwrap_or_else(|_| "default".to_string()))
}

struct SystemStream {
    camera: CameraDescriptor,
    mic_name: String,
    width: u32,
    height: u32,
    supported_formats: Vec<ClipFormat>,
    closed: bool,
}

impl SystemStream {
    /// FFmpeg arguments selecting the platform capture devices.
    fn input_args(&self) -> Vec<String> {
        let camera_index = match &self.camera.index {
            CameraIndex::Index(i) => i.to_string(),
            CameraIndex::String(s) => s.clone(),
        };

        #[cfg(target_os = "macos")]
        {
            vec![
                "-f".into(),
                "avfoundation".into(),
                "-framerate".into(),
                CAPTURE_FPS.to_string(),
                "-video_size".into(),
                format!("{}x{}", self.width, self.height),
                "-i".into(),
                format!("{camera_index}:0"),
            ]
        }

        #[cfg(target_os = "linux")]
        {
            vec![
                "-f".into(),
                "v4l2".into(),
                "-framerate".into(),
                CAPTURE_FPS.to_string(),
                "-video_size".into(),
                format!("{}x{}", self.width, self.height),
                "-i".into(),
                format!("/dev/video{camera_index}"),
                "-f".into(),
                "pulse".into(),
                "-i".into(),
                "default".into(),
            ]
        }

        #[cfg(target_os = "windows")]
        {
            vec![
                "-f".into(),
                "dshow".into(),
                "-framerate".into(),
                CAPTURE_FPS.to_string(),
                "-video_size".into(),
                format!("{}x{}", self.width, self.height),
                "-i".into(),
                format!("video={}:audio={}", self.camera.name, self.mic_name),
            ]
        }

        #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
        {
            let _ = camera_index;
            Vec::new()
        }
    }

    /// FFmpeg arguments encoding to the negotiated format on stdout.
    fn encode_args(format: ClipFormat) -> Vec<String> {
        match format {
            ClipFormat::Mp4 => vec![
                "-c:v".into(),
                "libx264".into(),
                "-preset".into(),
                "veryfast".into(),
                "-pix_fmt".into(),
                "yuv420p".into(),
                "-crf".into(),
                "23".into(),
                "-g".into(),
                (CAPTURE_FPS * 2).to_string(),
                "-c:a".into(),
                "aac".into(),
                "-b:a".into(),
                "128k".into(),
                "-movflags".into(),
                "frag_keyframe+empty_moov+default_base_moof".into(),
                "-f".into(),
                "mp4".into(),
                "pipe:1".into(),
            ],
            ClipFormat::WebmVp9 => vec![
                "-c:v".into(),
                "libvpx-vp9".into(),
                "-deadline".into(),
                "realtime".into(),
                "-cpu-used".into(),
                "8".into(),
                "-c:a".into(),
                "libopus".into(),
                "-f".into(),
                "webm".into(),
                "pipe:1".into(),
            ],
            ClipFormat::Webm => vec![
                "-c:v".into(),
                "libvpx".into(),
                "-deadline".into(),
                "realtime".into(),
                "-c:a".into(),
                "libopus".into(),
                "-f".into(),
                "webm".into(),
                "pipe:1".into(),
            ],
        }
    }
}

impl LiveStream for SystemStream {
    fn label(&self) -> String {
        format!(
            "{} + {} ({}x{})",
            self.camera.name, self.mic_name, self.width, self.height
        )
    }

    fn supported_formats(&self) -> Vec<ClipFormat> {
        self.supported_formats.clone()
    }

    fn default_format(&self) -> ClipFormat {
        ClipFormat::Mp4
    }

    fn start_recorder(&self, format: ClipFormat) -> Result<Box<dyn ClipRecorder>, CaptureError> {
        if self.closed {
            return Err(CaptureError::RecorderStart(
                "stream has been released".to_string(),
            ));
        }

        let mut args = self.input_args();
        if args.is_empty() {
            return Err(CaptureError::RecorderStart(
                "capture is not supported on this platform".to_string(),
            ));
        }
        args.extend(Self::encode_args(format));

        let mut child = Command::new("ffmpeg")
            .arg("-y")
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| CaptureError::RecorderStart(format!("failed to spawn ffmpeg: {e}")))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| CaptureError::RecorderStart("ffmpeg stdout unavailable".to_string()))?;

        let (tx, rx) = mpsc::channel::<Vec<u8>>();
        let reader = std::thread::spawn(move || {
            let mut stdout = stdout;
            let mut buf = [0u8; 32 * 1024];
            loop {
                match stdout.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        if tx.send(buf[..n].to_vec()).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::debug!("ffmpeg stdout read ended: {e}");
                        break;
                    }
                }
            }
        });

        tracing::info!(
            "FFmpeg recorder started: {:?} at {}fps, {}x{}",
            format,
            CAPTURE_FPS,
            self.width,
            self.height
        );

        Ok(Box::new(SystemRecorder {
            child: Some(child),
            rx,
            reader: Some(reader),
        }))
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            tracing::debug!("system stream closed: {}", self.camera.name);
        }
    }
}

struct SystemRecorder {
    child: Option<Child>,
    rx: mpsc::Receiver<Vec<u8>>,
    reader: Option<std::thread::JoinHandle<()>>,
}

impl SystemRecorder {
    fn drain(&mut self) -> Option<Bytes> {
        let mut buf = BytesMut::new();
        while let Ok(piece) = self.rx.try_recv() {
            buf.extend_from_slice(&piece);
        }
        if buf.is_empty() {
            None
        } else {
            Some(buf.freeze())
        }
    }
}

#[async_trait]
impl ClipRecorder for SystemRecorder {
    fn poll_chunk(&mut self) -> Option<Bytes> {
        self.drain()
    }

    async fn finish(&mut self) -> Result<Vec<Bytes>, CaptureError> {
        let Some(mut child) = self.child.take() else {
            return Err(CaptureError::NotRecording);
        };

        // Ask FFmpeg to stop gracefully, then wait with a kill fallback so
        // a wedged encoder cannot hang the flow.
        tokio::task::spawn_blocking(move || {
            if let Some(mut stdin) = child.stdin.take() {
                let _ = stdin.write_all(b"q");
            }

            for _ in 0..30 {
                match child.try_wait() {
                    Ok(Some(status)) => {
                        if !status.success() {
                            tracing::warn!("ffmpeg exited with status {}", status);
                        }
                        return;
                    }
                    Ok(None) => std::thread::sleep(Duration::from_millis(100)),
                    Err(e) => {
                        tracing::warn!("failed to wait for ffmpeg: {e}");
                        break;
                    }
                }
            }

            tracing::warn!("ffmpeg did not stop in time, killing");
            let _ = child.kill();
            let _ = child.wait();
        })
        .await
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;

        if let Some(reader) = self.reader.take() {
            let _ = reader.join();
        }

        let mut chunks = Vec::new();
        if let Some(rest) = self.drain() {
            chunks.push(rest);
        }
        Ok(chunks)
    }
}
