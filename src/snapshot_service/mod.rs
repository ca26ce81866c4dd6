//! SnapshotService - Frame Capture Source
//!
//! ## Responsibilities
//!
//! - Own the camera device (nothing else touches the live stream)
//! - Track sensor status: OFFLINE -> INITIALIZING -> ACTIVE, or DENIED
//! - Produce JPEG stills on demand at a fixed quality factor
//!
//! Two devices are provided: a local camera read through ffmpeg and an HTTP
//! snapshot URL (IP cameras).

use crate::error::{Error, Result};
use crate::models::CapturedFrame;
use async_trait::async_trait;
use image::codecs::jpeg::JpegEncoder;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tokio::sync::RwLock;

/// Default JPEG quality (percent)
pub const DEFAULT_JPEG_QUALITY: u8 = 80;

/// Used when the device reports zero dimensions
pub const FALLBACK_DIMENSIONS: FrameDimensions = FrameDimensions {
    width: 1280,
    height: 720,
};

/// Camera sensor status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SensorStatus {
    Offline,
    Initializing,
    Active,
    /// Acquisition failed; stays here until the user retries
    Denied,
}

/// Frame size in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameDimensions {
    pub width: u32,
    pub height: u32,
}

impl FrameDimensions {
    fn or_fallback(self) -> Self {
        if self.width == 0 || self.height == 0 {
            FALLBACK_DIMENSIONS
        } else {
            self
        }
    }
}

/// A camera the capture source can read stills from
#[async_trait]
pub trait CameraDevice: Send + Sync {
    /// Acquire the device. `Error::PermissionDenied` when access is refused.
    async fn open(&self) -> Result<FrameDimensions>;

    /// Grab one encoded still (any format `image` can decode)
    async fn grab_frame(&self) -> Result<Vec<u8>>;

    /// Release the device
    async fn close(&self);
}

/// Local camera read through ffmpeg (v4l2, avfoundation, dshow...)
pub struct FfmpegCamera {
    input: String,
    format: String,
    timeout: Duration,
}

impl FfmpegCamera {
    pub fn new(input: impl Into<String>, format: impl Into<String>, timeout: Duration) -> Self {
        Self {
            input: input.into(),
            format: format.into(),
            timeout,
        }
    }

    /// Capture a single MJPEG frame
    ///
    /// `kill_on_drop` makes the timeout reap the ffmpeg child.
    async fn capture(&self) -> Result<Vec<u8>> {
        use std::process::Stdio;

        let child = Command::new("ffmpeg")
            .args([
                "-f", self.format.as_str(),
                "-i", self.input.as_str(),
                "-frames:v", "1",
                "-f", "image2pipe",
                "-vcodec", "mjpeg",
                "-loglevel", "error",
                "-y",
                "-",
            ])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Camera(format!("ffmpeg spawn failed: {}", e)))?;

        match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => {
                if !output.status.success() {
                    let stderr = String::from_utf8_lossy(&output.stderr);
                    return Err(classify_ffmpeg_failure(&self.input, stderr.trim()));
                }

                if output.stdout.is_empty() {
                    return Err(Error::Camera("ffmpeg returned empty output".to_string()));
                }

                Ok(output.stdout)
            }
            Ok(Err(e)) => Err(Error::Camera(format!("ffmpeg execution failed: {}", e))),
            Err(_) => {
                tracing::warn!(
                    timeout_ms = self.timeout.as_millis() as u64,
                    input = %self.input,
                    "ffmpeg timeout, process killed via kill_on_drop"
                );
                Err(Error::Camera(format!(
                    "ffmpeg timeout ({}ms)",
                    self.timeout.as_millis()
                )))
            }
        }
    }
}

fn classify_ffmpeg_failure(input: &str, stderr: &str) -> Error {
    let lower = stderr.to_ascii_lowercase();
    if lower.contains("permission denied") || lower.contains("not authorized") {
        Error::PermissionDenied(format!("{}: {}", input, stderr))
    } else {
        Error::Camera(format!("ffmpeg failed: {}", stderr))
    }
}

#[async_trait]
impl CameraDevice for FfmpegCamera {
    async fn open(&self) -> Result<FrameDimensions> {
        let probe = self.capture().await?;
        let (width, height) = image::load_from_memory(&probe)
            .map(|img| (img.width(), img.height()))
            .unwrap_or((0, 0));
        Ok(FrameDimensions { width, height })
    }

    async fn grab_frame(&self) -> Result<Vec<u8>> {
        self.capture().await
    }

    async fn close(&self) {}
}

/// IP camera exposing a still-image URL
pub struct HttpSnapshotCamera {
    client: reqwest::Client,
    url: String,
}

impl HttpSnapshotCamera {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl CameraDevice for HttpSnapshotCamera {
    async fn open(&self) -> Result<FrameDimensions> {
        let probe = self.grab_frame().await?;
        let img = image::load_from_memory(&probe)?;
        Ok(FrameDimensions {
            width: img.width(),
            height: img.height(),
        })
    }

    async fn grab_frame(&self) -> Result<Vec<u8>> {
        let resp = self.client.get(&self.url).send().await?;
        let status = resp.status();

        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(Error::PermissionDenied(format!("Snapshot URL returned {}", status)));
        }
        if !status.is_success() {
            return Err(Error::Camera(format!("Snapshot HTTP error: {}", status)));
        }

        Ok(resp.bytes().await?.to_vec())
    }

    async fn close(&self) {}
}

/// Frame capture source: camera ownership + sensor state machine
pub struct FrameCaptureSource {
    device: Arc<dyn CameraDevice>,
    status: RwLock<SensorStatus>,
    dimensions: RwLock<Option<FrameDimensions>>,
    jpeg_quality: u8,
}

impl FrameCaptureSource {
    /// Create new capture source (starts OFFLINE)
    pub fn new(device: Arc<dyn CameraDevice>, jpeg_quality: u8) -> Self {
        Self {
            device,
            status: RwLock::new(SensorStatus::Offline),
            dimensions: RwLock::new(None),
            jpeg_quality: jpeg_quality.clamp(1, 100),
        }
    }

    pub async fn status(&self) -> SensorStatus {
        *self.status.read().await
    }

    pub async fn is_active(&self) -> bool {
        self.status().await == SensorStatus::Active
    }

    pub async fn dimensions(&self) -> Option<FrameDimensions> {
        *self.dimensions.read().await
    }

    /// Acquire the camera
    ///
    /// No-op while INITIALIZING or ACTIVE. From OFFLINE or DENIED it moves to
    /// INITIALIZING, then ACTIVE on success or DENIED on any failure.
    pub async fn start(&self) -> Result<SensorStatus> {
        {
            let mut status = self.status.write().await;
            match *status {
                SensorStatus::Initializing | SensorStatus::Active => return Ok(*status),
                SensorStatus::Offline | SensorStatus::Denied => {
                    *status = SensorStatus::Initializing;
                }
            }
        }
        tracing::info!("Camera initializing");

        match self.device.open().await {
            Ok(dims) => {
                let dims = dims.or_fallback();
                *self.dimensions.write().await = Some(dims);
                *self.status.write().await = SensorStatus::Active;
                tracing::info!(width = dims.width, height = dims.height, "Camera active");
                Ok(SensorStatus::Active)
            }
            Err(e) => {
                *self.status.write().await = SensorStatus::Denied;
                tracing::error!(error = %e, code = e.code(), "Camera acquisition failed");
                Err(e)
            }
        }
    }

    /// Release the camera and go OFFLINE
    pub async fn stop(&self) {
        self.device.close().await;
        *self.status.write().await = SensorStatus::Offline;
        *self.dimensions.write().await = None;
        tracing::info!("Camera offline");
    }

    /// Take one still, re-encoded as JPEG at the configured quality
    pub async fn snapshot(&self) -> Result<CapturedFrame> {
        if !self.is_active().await {
            return Err(Error::Camera("Sensor is not active".to_string()));
        }

        let raw = self.device.grab_frame().await?;
        let quality = self.jpeg_quality;
        let (bytes, dims) = tokio::task::spawn_blocking(move || encode_jpeg(&raw, quality))
            .await
            .map_err(|e| Error::Internal(format!("JPEG encode task failed: {}", e)))??;

        *self.dimensions.write().await = Some(dims);

        tracing::debug!(
            width = dims.width,
            height = dims.height,
            size = bytes.len(),
            "Snapshot captured"
        );

        Ok(CapturedFrame::new(bytes, dims.width, dims.height))
    }
}

/// Decode any supported image and re-encode it as JPEG
pub fn encode_jpeg(raw: &[u8], quality: u8) -> Result<(Vec<u8>, FrameDimensions)> {
    let img = image::load_from_memory(raw)?;
    let rgb = img.to_rgb8();
    let dims = FrameDimensions {
        width: rgb.width(),
        height: rgb.height(),
    };

    let mut bytes = Vec::new();
    rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut bytes, quality))?;

    Ok((bytes, dims))
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::io::Cursor;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbaImage::from_pixel(width, height, image::Rgba([20, 120, 200, 255]));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, image::ImageFormat::Png).unwrap();
        out.into_inner()
    }

    struct FakeCamera {
        open_result: Mutex<Option<Error>>,
        frame: Vec<u8>,
    }

    #[async_trait]
    impl CameraDevice for FakeCamera {
        async fn open(&self) -> Result<FrameDimensions> {
            match self.open_result.lock().take() {
                Some(e) => Err(e),
                None => Ok(FrameDimensions { width: 0, height: 0 }),
            }
        }

        async fn grab_frame(&self) -> Result<Vec<u8>> {
            Ok(self.frame.clone())
        }

        async fn close(&self) {}
    }

    #[test]
    fn test_encode_jpeg_from_png() {
        let (jpeg, dims) = encode_jpeg(&png_bytes(32, 16), DEFAULT_JPEG_QUALITY).unwrap();
        assert_eq!(dims, FrameDimensions { width: 32, height: 16 });
        assert_eq!(&jpeg[..2], &[0xff, 0xd8]);
    }

    #[test]
    fn test_encode_jpeg_rejects_garbage() {
        assert!(encode_jpeg(b"not an image", 80).is_err());
    }

    #[test]
    fn test_classify_ffmpeg_failure() {
        let err = classify_ffmpeg_failure("/dev/video0", "/dev/video0: Permission denied");
        assert!(err.is_permission_denied());
        let err = classify_ffmpeg_failure("/dev/video0", "No such file or directory");
        assert!(!err.is_permission_denied());
    }

    #[tokio::test]
    async fn test_start_denied_then_retry() {
        let camera = Arc::new(FakeCamera {
            open_result: Mutex::new(Some(Error::PermissionDenied("refused".into()))),
            frame: png_bytes(8, 8),
        });
        let source = FrameCaptureSource::new(camera, DEFAULT_JPEG_QUALITY);
        assert_eq!(source.status().await, SensorStatus::Offline);

        assert!(source.start().await.is_err());
        assert_eq!(source.status().await, SensorStatus::Denied);
        assert!(source.snapshot().await.is_err());

        assert_eq!(source.start().await.unwrap(), SensorStatus::Active);
        assert_eq!(source.dimensions().await, Some(FALLBACK_DIMENSIONS));
    }

    #[tokio::test]
    async fn test_snapshot_and_stop() {
        let camera = Arc::new(FakeCamera {
            open_result: Mutex::new(None),
            frame: png_bytes(40, 30),
        });
        let source = FrameCaptureSource::new(camera, DEFAULT_JPEG_QUALITY);
        source.start().await.unwrap();

        let frame = source.snapshot().await.unwrap();
        assert_eq!((frame.width, frame.height), (40, 30));
        assert_eq!(source.dimensions().await, Some(FrameDimensions { width: 40, height: 30 }));

        source.stop().await;
        assert_eq!(source.status().await, SensorStatus::Offline);
        assert!(source.snapshot().await.is_err());
    }
}
