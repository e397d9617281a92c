use std::time::Instant;

use async_trait::async_trait;
use image::{ImageBuffer, RgbImage};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Which way the requested camera should point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FacingMode {
    /// Rear camera, pointing away from the user.
    Environment,
    User,
}

impl FacingMode {
    pub fn name(&self) -> &'static str {
        match self {
            FacingMode::Environment => "environment",
            FacingMode::User => "user",
        }
    }
}

/// A live camera stream. Owned by whoever opened it; must be stopped to free the device.
pub trait CaptureSession: Send {
    /// Resolution the device reported when the stream came up.
    fn native_size(&self) -> (u32, u32);

    fn grab_frame(&mut self) -> Result<RgbImage, AppError>;

    /// Stop every underlying track. Calling it again is a no-op.
    fn stop(&mut self);

    fn is_live(&self) -> bool;
}

#[async_trait]
pub trait CameraSource: Send + Sync {
    fn display_name(&self) -> &'static str;

    /// Resolves once the stream is up and its native resolution is known.
    async fn open(&self, facing: FacingMode) -> Result<Box<dyn CaptureSession>, AppError>;
}

/// Animated gradient frames for machines without a camera.
pub struct TestPatternSource {
    width: u32,
    height: u32,
}

impl TestPatternSource {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

#[async_trait]
impl CameraSource for TestPatternSource {
    fn display_name(&self) -> &'static str {
        "Test pattern (simulated)"
    }

    async fn open(&self, facing: FacingMode) -> Result<Box<dyn CaptureSession>, AppError> {
        if self.width == 0 || self.height == 0 {
            return Err(AppError::DeviceUnavailable(format!(
                "invalid test pattern size {}x{}",
                self.width, self.height
            )));
        }
        log::info!(
            "Opening simulated {} camera at {}x{}",
            facing.name(),
            self.width,
            self.height
        );
        Ok(Box::new(TestPatternSession {
            width: self.width,
            height: self.height,
            started: Instant::now(),
            live: true,
        }))
    }
}

pub struct TestPatternSession {
    width: u32,
    height: u32,
    started: Instant,
    live: bool,
}

impl CaptureSession for TestPatternSession {
    fn native_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn grab_frame(&mut self) -> Result<RgbImage, AppError> {
        if !self.live {
            return Err(AppError::CaptureFailed("session already stopped".to_string()));
        }
        let time = self.started.elapsed().as_secs_f32();
        let (width, height) = (self.width as f32, self.height as f32);

        Ok(ImageBuffer::from_fn(self.width, self.height, |x, y| {
            let r = (x as f32 / width * 255.0) + (time * 1.5).sin() * 50.0;
            let g = (y as f32 / height * 255.0) + (time * 0.9).cos() * 50.0;
            let b = ((x + y) as f32 / (width + height) * 255.0) + (time * 2.1).sin() * 50.0;
            image::Rgb([
                r.clamp(0.0, 255.0) as u8,
                g.clamp(0.0, 255.0) as u8,
                b.clamp(0.0, 255.0) as u8,
            ])
        }))
    }

    fn stop(&mut self) {
        if self.live {
            self.live = false;
            log::info!("Simulated camera stopped");
        }
    }

    fn is_live(&self) -> bool {
        self.live
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pattern_session_lifecycle() {
        let source = TestPatternSource::new(64, 48);
        let mut session = source.open(FacingMode::Environment).await.unwrap();

        assert_eq!(session.native_size(), (64, 48));
        assert!(session.is_live());
        assert_eq!(session.grab_frame().unwrap().dimensions(), (64, 48));

        session.stop();
        session.stop();
        assert!(!session.is_live());
        assert!(session.grab_frame().is_err());
    }

    #[tokio::test]
    async fn test_pattern_rejects_empty_size() {
        let source = TestPatternSource::new(0, 48);
        assert!(matches!(
            source.open(FacingMode::User).await,
            Err(AppError::DeviceUnavailable(_))
        ));
    }

    #[test]
    fn test_facing_mode_serde() {
        let json = serde_json::to_string(&FacingMode::Environment).unwrap();
        assert_eq!(json, "\"environment\"");
        let parsed: FacingMode = serde_json::from_str("\"user\"").unwrap();
        assert_eq!(parsed, FacingMode::User);
    }
}
