use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use image::RgbImage;
use tokio::time::{sleep, Duration};

use crate::camera::{CameraSource, CaptureSession, FacingMode};
use crate::config::CameraConfig;
use crate::error::AppError;

static SESSION_COUNTER: AtomicU32 = AtomicU32::new(0);

/// Raspberry Pi camera via `rpicam-still` running in timelapse mode.
///
/// The child process keeps overwriting a preview JPEG; frames are read back from
/// that file. The session ends when the process is killed.
pub struct LibcameraSource {
    binary: String,
    rear_index: u32,
    front_index: u32,
    width: u32,
    height: u32,
    quality: u8,
    frame_interval_ms: u64,
}

impl LibcameraSource {
    pub fn new(config: &CameraConfig) -> Self {
        Self {
            binary: config.binary.clone(),
            rear_index: config.rear_index,
            front_index: config.front_index,
            width: config.preview_width,
            height: config.preview_height,
            quality: config.preview_quality,
            frame_interval_ms: config.preview_interval_ms.max(1),
        }
    }

    fn camera_index(&self, facing: FacingMode) -> u32 {
        match facing {
            FacingMode::Environment => self.rear_index,
            FacingMode::User => self.front_index,
        }
    }

    fn preview_path() -> PathBuf {
        let session = SESSION_COUNTER.fetch_add(1, Ordering::Relaxed);
        std::env::temp_dir().join(format!(
            "food_lens_preview_{}_{}.jpg",
            std::process::id(),
            session
        ))
    }

    fn spawn_preview(&self, facing: FacingMode, path: &Path) -> Result<Child, AppError> {
        let args = [
            "-o".to_string(),
            path.display().to_string(),
            "--camera".to_string(),
            self.camera_index(facing).to_string(),
            "--width".to_string(),
            self.width.to_string(),
            "--height".to_string(),
            self.height.to_string(),
            "--quality".to_string(),
            self.quality.to_string(),
            "--timeout".to_string(),
            "0".to_string(),
            "--timelapse".to_string(),
            self.frame_interval_ms.to_string(),
            "--nopreview".to_string(),
        ];
        log::info!("Preview command: {} {}", self.binary, args.join(" "));

        Command::new(&self.binary)
            .args(&args)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| match e.kind() {
                ErrorKind::PermissionDenied => AppError::PermissionDenied,
                ErrorKind::NotFound => {
                    AppError::DeviceUnavailable(format!("{} not found", self.binary))
                }
                _ => AppError::DeviceUnavailable(format!("failed to start {}: {}", self.binary, e)),
            })
    }
}

#[async_trait]
impl CameraSource for LibcameraSource {
    fn display_name(&self) -> &'static str {
        "Raspberry Pi camera (rpicam-still)"
    }

    async fn open(&self, facing: FacingMode) -> Result<Box<dyn CaptureSession>, AppError> {
        let preview_path = Self::preview_path();
        if preview_path.exists() {
            let _ = tokio::fs::remove_file(&preview_path).await;
        }

        let child = self.spawn_preview(facing, &preview_path)?;
        let mut session = LibcameraSession {
            child: Some(child),
            preview_path,
            native_size: (0, 0),
            last_frame: None,
        };

        // No deadline: wait until the first frame lands or the process gives up
        loop {
            if let Some(status) = session.exit_status() {
                session.stop();
                return Err(AppError::DeviceUnavailable(format!(
                    "{} exited with {}",
                    self.binary, status
                )));
            }
            if let Ok(img) = image::open(&session.preview_path) {
                let frame = img.to_rgb8();
                session.native_size = frame.dimensions();
                session.last_frame = Some(frame);
                break;
            }
            sleep(Duration::from_millis(self.frame_interval_ms)).await;
        }

        log::info!(
            "Camera {} ready at {}x{}",
            self.camera_index(facing),
            session.native_size.0,
            session.native_size.1
        );
        Ok(Box::new(session))
    }
}

pub struct LibcameraSession {
    child: Option<Child>,
    preview_path: PathBuf,
    native_size: (u32, u32),
    last_frame: Option<RgbImage>,
}

impl LibcameraSession {
    fn exit_status(&mut self) -> Option<std::process::ExitStatus> {
        self.child
            .as_mut()
            .and_then(|child| child.try_wait().ok().flatten())
    }
}

impl CaptureSession for LibcameraSession {
    fn native_size(&self) -> (u32, u32) {
        self.native_size
    }

    fn grab_frame(&mut self) -> Result<RgbImage, AppError> {
        if self.child.is_none() {
            return Err(AppError::CaptureFailed("camera already stopped".to_string()));
        }
        if let Some(status) = self.exit_status() {
            return Err(AppError::CaptureFailed(format!("camera process exited with {}", status)));
        }

        match image::open(&self.preview_path) {
            Ok(img) => {
                let frame = img.to_rgb8();
                log::debug!("Preview frame {}x{}", frame.width(), frame.height());
                self.last_frame = Some(frame.clone());
                Ok(frame)
            }
            // The process may be halfway through rewriting the file
            Err(e) => self.last_frame.clone().ok_or_else(|| {
                AppError::CaptureFailed(format!("no preview frame available: {}", e))
            }),
        }
    }

    fn stop(&mut self) {
        if let Some(mut process) = self.child.take() {
            let _ = process.kill();
            let _ = process.wait();
            if self.preview_path.exists() {
                let _ = std::fs::remove_file(&self.preview_path);
            }
            log::info!("Camera preview stopped");
        }
    }

    fn is_live(&self) -> bool {
        self.child.is_some()
    }
}

impl Drop for LibcameraSession {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn test_camera_index_follows_facing_mode() {
        let mut config = Config::default().camera;
        config.rear_index = 0;
        config.front_index = 1;
        let source = LibcameraSource::new(&config);
        assert_eq!(source.camera_index(FacingMode::Environment), 0);
        assert_eq!(source.camera_index(FacingMode::User), 1);
    }

    #[test]
    fn test_preview_paths_are_unique() {
        assert_ne!(LibcameraSource::preview_path(), LibcameraSource::preview_path());
    }

    #[tokio::test]
    async fn test_missing_binary_is_unavailable() {
        let mut config = Config::default().camera;
        config.binary = "food-lens-no-such-camera-binary".to_string();
        let source = LibcameraSource::new(&config);

        let result = source.open(FacingMode::Environment).await;
        assert!(matches!(result, Err(AppError::DeviceUnavailable(_))));
    }
}
