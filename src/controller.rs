//! Capture/analyze state machine.
//!
//! Every user action goes through [`CaptureController`]. Operations that wait on
//! the outside world (camera, inference) come in two halves so the GUI can run the
//! wait on the runtime and apply the outcome on its own thread: `request_camera` /
//! `finish_start_camera` and `prepare_analysis` / `complete_analysis`. Each
//! analysis carries a ticket so a completion that outlived a reset is dropped.

use std::time::{Duration, Instant};

use image::RgbImage;
use serde_json::Value;

use crate::camera::{CaptureSession, FacingMode};
use crate::config::Config;
use crate::error::{Action, AppError};
use crate::inference::GenerateContentRequest;
use crate::notice::Notice;
use crate::nutrition::{parse_generate_response, ResultPanel};
use crate::payload::{is_image_media_type, ImagePayload, SelectedFile};
use crate::surface::{DisplaySurface, PlaceholderStyle, SurfaceBounds};

pub const CAMERA_READY_CAPTION: &str = "Camera Ready! Take a picture.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiMode {
    Idle,
    CameraActive,
    ImageReady,
    Analyzing,
}

impl UiMode {
    pub fn label(&self) -> &'static str {
        match self {
            UiMode::Idle => "Idle",
            UiMode::CameraActive => "Camera active",
            UiMode::ImageReady => "Image ready",
            UiMode::Analyzing => "Analyzing",
        }
    }
}

/// Enabled flags for the five action buttons.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Controls {
    pub start_camera: bool,
    pub take_picture: bool,
    pub upload: bool,
    pub analyze: bool,
    pub reset: bool,
}

impl Controls {
    pub fn idle() -> Self {
        Self {
            start_camera: true,
            take_picture: false,
            upload: true,
            analyze: false,
            reset: false,
        }
    }

    pub fn all_disabled() -> Self {
        Self {
            start_camera: false,
            take_picture: false,
            upload: false,
            analyze: false,
            reset: false,
        }
    }

    pub fn is_enabled(&self, action: Action) -> bool {
        match action {
            Action::StartCamera => self.start_camera,
            Action::TakePicture => self.take_picture,
            Action::UploadImage => self.upload,
            Action::Analyze => self.analyze,
            Action::Reset => self.reset,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ControllerSettings {
    pub facing: FacingMode,
    pub capture_quality: u8,
    pub placeholder: PlaceholderStyle,
    pub notice_lifetime: Duration,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for ControllerSettings {
    fn from(config: &Config) -> Self {
        Self {
            facing: config.camera.facing,
            capture_quality: config.camera.capture_quality,
            placeholder: config.placeholder_style(),
            notice_lifetime: Duration::from_secs(config.ui.notice_secs),
        }
    }
}

/// An analysis handed to the GUI: send `request`, then pass `ticket` back with the outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisJob {
    pub ticket: u64,
    pub request: GenerateContentRequest,
}

pub struct CaptureController {
    settings: ControllerSettings,
    mode: UiMode,
    controls: Controls,
    active_session: Option<Box<dyn CaptureSession>>,
    pending_image: Option<ImagePayload>,
    surface: DisplaySurface,
    results: ResultPanel,
    analysis_in_flight: Option<u64>,
    next_ticket: u64,
    notice: Option<Notice>,
}

impl CaptureController {
    pub fn new(settings: ControllerSettings, bounds: SurfaceBounds) -> Self {
        let surface = DisplaySurface::new(bounds, settings.placeholder);
        Self {
            settings,
            mode: UiMode::Idle,
            controls: Controls::idle(),
            active_session: None,
            pending_image: None,
            surface,
            results: ResultPanel::default(),
            analysis_in_flight: None,
            next_ticket: 0,
            notice: None,
        }
    }

    pub fn mode(&self) -> UiMode {
        self.mode
    }

    pub fn controls(&self) -> Controls {
        self.controls
    }

    pub fn pending_image(&self) -> Option<&ImagePayload> {
        self.pending_image.as_ref()
    }

    pub fn has_active_session(&self) -> bool {
        self.active_session.is_some()
    }

    pub fn surface(&self) -> &DisplaySurface {
        &self.surface
    }

    pub fn results(&self) -> &ResultPanel {
        &self.results
    }

    pub fn is_busy(&self) -> bool {
        self.analysis_in_flight.is_some()
    }

    /// The current notice, unless it has timed out by `now`.
    pub fn notice_at(&self, now: Instant) -> Option<&Notice> {
        self.notice
            .as_ref()
            .filter(|n| !n.is_expired(now, self.settings.notice_lifetime))
    }

    #[cfg(test)]
    pub fn last_notice(&self) -> Option<&Notice> {
        self.notice.as_ref()
    }

    /// Surface an error from outside the controller, e.g. a failed file read.
    pub fn report_error(&mut self, err: AppError) {
        self.post_error(&err);
    }

    fn post_error(&mut self, err: &AppError) {
        log::warn!("{}", err);
        self.notice = Some(Notice::error(err.user_message()));
    }

    fn fail<T>(&mut self, err: AppError) -> Result<T, AppError> {
        self.post_error(&err);
        Err(err)
    }

    fn succeed(&mut self, text: &str) {
        self.notice = Some(Notice::success(text));
    }

    fn ensure_enabled(&mut self, action: Action) -> Result<(), AppError> {
        if self.controls.is_enabled(action) {
            Ok(())
        } else {
            self.fail(AppError::ActionUnavailable(action))
        }
    }

    fn release_session(&mut self) -> bool {
        match self.active_session.take() {
            Some(mut session) => {
                session.stop();
                log::info!("Capture session released");
                true
            }
            None => false,
        }
    }

    // ---- start camera ----

    /// Check that a camera may be started; returns the facing mode to request.
    pub fn request_camera(&mut self) -> Result<FacingMode, AppError> {
        self.ensure_enabled(Action::StartCamera)?;
        Ok(self.settings.facing)
    }

    pub fn finish_start_camera(
        &mut self,
        result: Result<Box<dyn CaptureSession>, AppError>,
    ) -> Result<(), AppError> {
        let mut session = match result {
            Ok(session) => session,
            Err(err) => {
                log::error!("Error accessing camera: {}", err);
                return self.fail(err);
            }
        };

        // Controls stay locked while an analysis runs
        if self.is_busy() {
            session.stop();
            log::warn!("Camera became ready during analysis, releasing it");
            return self.fail(AppError::ActionUnavailable(Action::StartCamera));
        }

        // At most one session at a time
        self.release_session();

        let frame = session.grab_frame().unwrap_or_else(|e| {
            log::warn!("No first frame from camera: {}", e);
            let (width, height) = session.native_size();
            RgbImage::new(width.max(1), height.max(1))
        });
        self.surface
            .draw_source(&frame, Some(CAMERA_READY_CAPTION.to_string()));

        if let Some(discarded) = self.pending_image.take() {
            log::warn!(
                "Starting the camera discards the pending {} image",
                discarded.mime_type()
            );
        }

        let (width, height) = session.native_size();
        log::info!("Camera started at {}x{}", width, height);
        self.active_session = Some(session);
        self.mode = UiMode::CameraActive;
        self.controls = Controls {
            start_camera: false,
            take_picture: true,
            upload: false,
            analyze: false,
            reset: true,
        };
        self.succeed("Camera started successfully!");
        Ok(())
    }

    #[cfg(test)]
    pub async fn start_camera(
        &mut self,
        source: &dyn crate::camera::CameraSource,
    ) -> Result<(), AppError> {
        let facing = self.request_camera()?;
        let result = source.open(facing).await;
        self.finish_start_camera(result)
    }

    /// Redraw the live preview from the newest camera frame.
    pub fn refresh_preview(&mut self) {
        if let Some(session) = self.active_session.as_mut().filter(|s| s.is_live()) {
            match session.grab_frame() {
                Ok(frame) => self
                    .surface
                    .draw_source(&frame, Some(CAMERA_READY_CAPTION.to_string())),
                Err(e) => log::debug!("Preview frame unavailable: {}", e),
            }
        }
    }

    // ---- take picture ----

    pub fn take_picture(&mut self) -> Result<(), AppError> {
        let Some(mut session) = self.active_session.take() else {
            return self.fail(AppError::NoActiveCapture);
        };

        let frame = session.grab_frame();
        session.stop();
        drop(session);
        log::info!("Capture session released");

        let captured = frame.and_then(|frame| {
            self.surface.draw_source(&frame, None);
            match self.surface.pixels() {
                Some(pixels) => ImagePayload::encode_jpeg(pixels, self.settings.capture_quality),
                None => Err(AppError::CaptureFailed("surface has no frame".to_string())),
            }
        });

        match captured {
            Ok(payload) => {
                log::info!(
                    "Picture taken: {}x{} JPEG",
                    self.surface.raster_size().0,
                    self.surface.raster_size().1
                );
                self.pending_image = Some(payload);
                self.mode = UiMode::ImageReady;
                self.controls = Controls {
                    start_camera: true,
                    take_picture: false,
                    upload: true,
                    analyze: true,
                    reset: true,
                };
                self.succeed("Picture taken!");
                Ok(())
            }
            Err(err) => {
                self.pending_image = None;
                self.surface.draw_placeholder();
                self.mode = UiMode::Idle;
                self.controls = Controls::idle();
                self.fail(err)
            }
        }
    }

    // ---- upload ----

    /// Validate a declared media type before the file is read.
    pub fn check_upload(&mut self, media_type: &str) -> Result<(), AppError> {
        self.ensure_enabled(Action::UploadImage)?;
        if !is_image_media_type(media_type) {
            return self.fail(AppError::InvalidFileType(media_type.to_string()));
        }
        Ok(())
    }

    pub fn upload_image(&mut self, file: SelectedFile) -> Result<(), AppError> {
        self.check_upload(&file.media_type)?;

        let decoded = match image::load_from_memory(&file.bytes) {
            Ok(img) => img.to_rgb8(),
            Err(e) => return self.fail(AppError::from(e)),
        };
        let payload = match ImagePayload::from_bytes(file.media_type.clone(), &file.bytes) {
            Ok(payload) => payload,
            Err(e) => return self.fail(e),
        };

        self.surface.draw_source(&decoded, None);
        log::info!(
            "Uploaded {} ({}, {}x{})",
            file.path.display(),
            file.media_type,
            decoded.width(),
            decoded.height()
        );

        self.pending_image = Some(payload);
        self.mode = UiMode::ImageReady;
        self.controls = Controls {
            start_camera: true,
            take_picture: false,
            upload: false,
            analyze: true,
            reset: true,
        };
        self.succeed("Image uploaded successfully!");
        Ok(())
    }

    // ---- analyze ----

    /// Build the inference request and lock the controls until the answer arrives.
    pub fn prepare_analysis(&mut self) -> Result<AnalysisJob, AppError> {
        let request = match self.pending_image.as_ref().map(GenerateContentRequest::nutrition) {
            Some(request) => request,
            None => return self.fail(AppError::NoPendingImage),
        };
        if self.is_busy() {
            return self.fail(AppError::ActionUnavailable(Action::Analyze));
        }

        let ticket = self.next_ticket;
        self.next_ticket += 1;
        self.analysis_in_flight = Some(ticket);
        self.mode = UiMode::Analyzing;
        self.controls = Controls::all_disabled();
        self.results.visible = false;
        log::info!("Analyzing pending image (ticket {})", ticket);
        Ok(AnalysisJob { ticket, request })
    }

    pub fn complete_analysis(
        &mut self,
        ticket: u64,
        outcome: Result<Value, AppError>,
    ) -> Result<(), AppError> {
        if self.analysis_in_flight != Some(ticket) {
            log::warn!("Ignoring result of analysis {} that is no longer in flight", ticket);
            return Ok(());
        }

        self.analysis_in_flight = None;
        self.mode = UiMode::ImageReady;
        self.controls = Controls {
            start_camera: true,
            take_picture: false,
            upload: true,
            analyze: self.pending_image.is_some(),
            reset: true,
        };

        match outcome.and_then(|response| parse_generate_response(&response)) {
            Ok(estimate) => {
                log::info!(
                    "Analysis complete: calories={:?} carbohydrates={:?} proteins={:?}",
                    estimate.calories,
                    estimate.carbohydrates,
                    estimate.proteins
                );
                self.results.show_estimate(&estimate);
                self.succeed("Analysis complete!");
                Ok(())
            }
            Err(err) => {
                log::error!("Error analyzing food: {}", err);
                self.results.show_unavailable();
                self.fail(err)
            }
        }
    }

    #[cfg(test)]
    pub async fn analyze(
        &mut self,
        service: &dyn crate::inference::InferenceService,
    ) -> Result<(), AppError> {
        let job = self.prepare_analysis()?;
        let outcome = service.generate(&job.request).await;
        self.complete_analysis(job.ticket, outcome)
    }

    // ---- reset / resize ----

    pub fn reset(&mut self) -> Result<(), AppError> {
        if let Some(ticket) = self.analysis_in_flight.take() {
            log::info!("Reset abandons analysis {}", ticket);
        }

        self.release_session();
        self.pending_image = None;
        self.surface.draw_placeholder();
        self.mode = UiMode::Idle;
        self.controls = Controls::idle();
        self.results.clear();
        log::info!("Controller reset");
        self.succeed("App reset. Ready to start again.");
        Ok(())
    }

    /// Reflow the surface after the window changed size.
    pub fn resize(&mut self, bounds: SurfaceBounds) {
        self.surface.set_bounds(bounds);

        if let Some(session) = self.active_session.as_mut() {
            let frame = session.grab_frame().unwrap_or_else(|e| {
                log::debug!("Preview frame unavailable during resize: {}", e);
                let (width, height) = session.native_size();
                RgbImage::new(width.max(1), height.max(1))
            });
            self.surface
                .draw_source(&frame, Some(CAMERA_READY_CAPTION.to_string()));
        } else if let Some(payload) = &self.pending_image {
            match payload.decode_image() {
                Ok(image) => self.surface.draw_source(&image, None),
                Err(e) => {
                    log::warn!("Pending image could not be redrawn: {}", e);
                    self.surface.draw_placeholder();
                }
            }
        } else {
            self.surface.draw_placeholder();
        }
    }
}

impl Drop for CaptureController {
    fn drop(&mut self) {
        self.release_session();
    }
}
