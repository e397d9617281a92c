use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam::channel::{unbounded, Receiver, Sender};
use eframe::egui;
use serde_json::Value;
use tokio::runtime::Handle;

use crate::camera::{CameraSource, CaptureSession};
use crate::controller::{CaptureController, ControllerSettings};
use crate::error::AppError;
use crate::inference::InferenceService;
use crate::notice::NoticeKind;
use crate::payload::{media_type_for_path, SelectedFile};
use crate::surface::{SurfaceBounds, SurfaceContent, PLACEHOLDER_BACKGROUND, PLACEHOLDER_TEXT};

// ============================================================================
// CONSTANTS FOR UI LAYOUT
// ============================================================================
const UI_PADDING: f32 = 20.0;
/// Vertical space kept free below the surface for the buttons and results.
const CONTROLS_RESERVE: f32 = 240.0;
const NOTICE_REPAINT: Duration = Duration::from_millis(250);
const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "bmp", "webp", "tif", "tiff", "ico"];

/// Results of work done on the runtime, applied on the UI thread.
pub enum TaskOutcome {
    CameraOpened(Result<Box<dyn CaptureSession>, AppError>),
    FileRead(Result<SelectedFile, AppError>),
    Analysis {
        ticket: u64,
        outcome: Result<Value, AppError>,
    },
}

// ============================================================================
// MAIN APP STRUCT
// ============================================================================

pub struct FoodLensApp {
    pub(crate) controller: CaptureController,
    pub(crate) surface_texture: Option<egui::TextureHandle>,
    pub(crate) texture_revision: Option<u64>,

    camera: Arc<dyn CameraSource>,
    inference: Arc<dyn InferenceService>,
    runtime: Handle,
    outcome_tx: Sender<TaskOutcome>,
    outcome_rx: Receiver<TaskOutcome>,

    // Start clicks are ignored while a camera request is in flight
    camera_pending: bool,
    last_preview_update: Option<Instant>,
    preview_interval: Duration,
    last_bounds: Option<SurfaceBounds>,
}

impl FoodLensApp {
    pub fn new(
        settings: ControllerSettings,
        initial_bounds: SurfaceBounds,
        camera: Arc<dyn CameraSource>,
        inference: Arc<dyn InferenceService>,
        runtime: Handle,
        preview_interval: Duration,
    ) -> Self {
        let (outcome_tx, outcome_rx) = unbounded();

        Self {
            controller: CaptureController::new(settings, initial_bounds),
            surface_texture: None,
            texture_revision: None,
            camera,
            inference,
            runtime,
            outcome_tx,
            outcome_rx,
            camera_pending: false,
            last_preview_update: None,
            preview_interval,
            last_bounds: None,
        }
    }
}

// ============================================================================
// MAIN UPDATE LOOP
// ============================================================================

impl eframe::App for FoodLensApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.drain_outcomes();

        if self.controller.has_active_session() {
            self.update_camera_preview();
            ctx.request_repaint_after(self.preview_interval);
        }

        self.render_ui(ctx);
        self.render_notice(ctx);
    }
}

impl FoodLensApp {
    fn drain_outcomes(&mut self) {
        // Failures are posted as notices by the controller itself
        while let Ok(outcome) = self.outcome_rx.try_recv() {
            match outcome {
                TaskOutcome::CameraOpened(result) => {
                    self.camera_pending = false;
                    let _ = self.controller.finish_start_camera(result);
                }
                TaskOutcome::FileRead(Ok(file)) => {
                    let _ = self.controller.upload_image(file);
                }
                TaskOutcome::FileRead(Err(e)) => self.controller.report_error(e),
                TaskOutcome::Analysis { ticket, outcome } => {
                    let _ = self.controller.complete_analysis(ticket, outcome);
                }
            }
        }
    }

    fn update_camera_preview(&mut self) {
        let now = Instant::now();
        let should_update = match self.last_preview_update {
            None => true,
            Some(last) => now.duration_since(last) >= self.preview_interval,
        };

        if should_update {
            self.controller.refresh_preview();
            self.last_preview_update = Some(now);
        }
    }
}

// ============================================================================
// ACTIONS
// ============================================================================

impl FoodLensApp {
    fn start_camera(&mut self, ctx: &egui::Context) {
        if self.camera_pending {
            return;
        }
        let Ok(facing) = self.controller.request_camera() else {
            return;
        };
        self.camera_pending = true;
        log::info!(
            "Requesting {} camera from {}",
            facing.name(),
            self.camera.display_name()
        );

        let camera = Arc::clone(&self.camera);
        let tx = self.outcome_tx.clone();
        let ctx = ctx.clone();
        self.runtime.spawn(async move {
            let result = camera.open(facing).await;
            let _ = tx.send(TaskOutcome::CameraOpened(result));
            ctx.request_repaint();
        });
    }

    fn take_picture(&mut self) {
        let _ = self.controller.take_picture();
        self.last_preview_update = None;
    }

    fn upload_image(&mut self, ctx: &egui::Context) {
        let Some(path) = rfd::FileDialog::new()
            .add_filter("Image Files", IMAGE_EXTENSIONS)
            .add_filter("All Files", &["*"])
            .pick_file()
        else {
            self.controller.report_error(AppError::NoFileSelected);
            return;
        };

        // Reject by declared type before touching the file
        if self.controller.check_upload(media_type_for_path(&path)).is_err() {
            return;
        }

        let tx = self.outcome_tx.clone();
        let ctx = ctx.clone();
        self.runtime.spawn(async move {
            let result = SelectedFile::read(path).await;
            let _ = tx.send(TaskOutcome::FileRead(result));
            ctx.request_repaint();
        });
    }

    fn analyze(&mut self, ctx: &egui::Context) {
        let Ok(job) = self.controller.prepare_analysis() else {
            return;
        };
        log::info!("Sending image to {}", self.inference.display_name());

        let inference = Arc::clone(&self.inference);
        let tx = self.outcome_tx.clone();
        let ctx = ctx.clone();
        self.runtime.spawn(async move {
            let outcome = inference.generate(&job.request).await;
            let _ = tx.send(TaskOutcome::Analysis {
                ticket: job.ticket,
                outcome,
            });
            ctx.request_repaint();
        });
    }

    fn reset(&mut self) {
        let _ = self.controller.reset();
    }
}

// ============================================================================
// RENDERING
// ============================================================================

impl FoodLensApp {
    fn render_ui(&mut self, ctx: &egui::Context) {
        egui::CentralPanel::default().show(ctx, |ui| {
            ui.vertical_centered(|ui| {
                ui.heading("Food Lens");
                ui.label("Snap or upload a photo of your meal to estimate its nutrition.");
                ui.add_space(UI_PADDING / 2.0);

                let bounds = SurfaceBounds::new(
                    ui.available_width(),
                    (ui.available_height() - CONTROLS_RESERVE).max(0.0),
                    ctx.screen_rect().height(),
                );
                if self.last_bounds != Some(bounds) {
                    self.controller.resize(bounds);
                    self.last_bounds = Some(bounds);
                }

                self.sync_surface_texture(ctx);
                self.render_surface(ui);
                ui.add_space(UI_PADDING / 2.0);

                self.render_controls(ui, ctx);

                if self.controller.is_busy() {
                    ui.add_space(UI_PADDING / 2.0);
                    ui.horizontal(|ui| {
                        ui.spinner();
                        ui.label("Analyzing...");
                    });
                }

                self.render_results(ui);

                ui.add_space(UI_PADDING / 2.0);
                ui.weak(self.controller.mode().label());
            });
        });
    }

    fn render_surface(&self, ui: &mut egui::Ui) {
        let surface = self.controller.surface();
        let (width, height) = surface.size();
        let (rect, _response) =
            ui.allocate_exact_size(egui::vec2(width, height), egui::Sense::hover());
        if !ui.is_rect_visible(rect) {
            return;
        }

        let painter = ui.painter();
        let font_id = egui::FontId::proportional(surface.font_size());

        match surface.content() {
            SurfaceContent::Placeholder { message } => {
                painter.rect_filled(rect, 8.0, rgb(PLACEHOLDER_BACKGROUND));
                let galley = painter.layout(
                    message.to_string(),
                    font_id,
                    rgb(PLACEHOLDER_TEXT),
                    (rect.width() - UI_PADDING * 2.0).max(1.0),
                );
                painter.galley(rect.center() - galley.size() / 2.0, galley);
            }
            SurfaceContent::Frame { caption } => {
                match &self.surface_texture {
                    Some(texture) => painter.image(
                        texture.id(),
                        rect,
                        egui::Rect::from_min_max(egui::pos2(0.0, 0.0), egui::pos2(1.0, 1.0)),
                        egui::Color32::WHITE,
                    ),
                    None => painter.rect_filled(rect, 0.0, egui::Color32::BLACK),
                };

                if let Some(caption) = caption {
                    let anchor = egui::pos2(rect.center().x, rect.min.y + UI_PADDING * 2.0);
                    painter.text(
                        anchor + egui::vec2(2.0, 2.0),
                        egui::Align2::CENTER_CENTER,
                        caption,
                        font_id.clone(),
                        egui::Color32::from_black_alpha(160),
                    );
                    painter.text(
                        anchor,
                        egui::Align2::CENTER_CENTER,
                        caption,
                        font_id,
                        egui::Color32::WHITE,
                    );
                }
            }
        }
    }

    fn render_controls(&mut self, ui: &mut egui::Ui, ctx: &egui::Context) {
        let controls = self.controller.controls();

        ui.horizontal_wrapped(|ui| {
            if ui
                .add_enabled(
                    controls.start_camera && !self.camera_pending,
                    egui::Button::new("Start Camera"),
                )
                .clicked()
            {
                self.start_camera(ctx);
            }
            if ui
                .add_enabled(controls.take_picture, egui::Button::new("Take Picture"))
                .clicked()
            {
                self.take_picture();
            }
            if ui
                .add_enabled(controls.upload, egui::Button::new("Upload Image"))
                .clicked()
            {
                self.upload_image(ctx);
            }
            if ui
                .add_enabled(
                    controls.analyze && !self.camera_pending,
                    egui::Button::new("Analyze Food"),
                )
                .clicked()
            {
                self.analyze(ctx);
            }
            if ui
                .add_enabled(controls.reset, egui::Button::new("Reset"))
                .clicked()
            {
                self.reset();
            }
        });
    }

    fn render_results(&self, ui: &mut egui::Ui) {
        let results = self.controller.results();
        if !results.visible {
            return;
        }

        ui.add_space(UI_PADDING / 2.0);
        ui.group(|ui| {
            ui.heading("Nutrition Estimate");
            egui::Grid::new("nutrition_grid")
                .num_columns(2)
                .spacing([UI_PADDING, 6.0])
                .show(ui, |ui| {
                    ui.label("Calories:");
                    ui.strong(results.calories_text());
                    ui.end_row();

                    ui.label("Carbohydrates:");
                    ui.strong(results.carbohydrates_text());
                    ui.end_row();

                    ui.label("Proteins:");
                    ui.strong(results.proteins_text());
                    ui.end_row();
                });
        });
    }

    fn render_notice(&self, ctx: &egui::Context) {
        let Some(notice) = self.controller.notice_at(Instant::now()) else {
            return;
        };
        // Keep repainting so the notice disappears on time
        ctx.request_repaint_after(NOTICE_REPAINT);

        egui::Area::new("notice")
            .anchor(egui::Align2::CENTER_TOP, egui::vec2(0.0, UI_PADDING))
            .order(egui::Order::Tooltip)
            .show(ctx, |ui| {
                egui::Frame::none()
                    .fill(match notice.kind {
                        NoticeKind::Success => egui::Color32::from_rgb(40, 120, 40),
                        NoticeKind::Error => egui::Color32::from_rgb(180, 40, 40),
                    })
                    .rounding(8.0)
                    .inner_margin(egui::Margin::symmetric(20.0, 15.0))
                    .show(ui, |ui| {
                        ui.label(
                            egui::RichText::new(&notice.text)
                                .color(egui::Color32::WHITE)
                                .size(18.0),
                        );
                    });
            });
    }
}

fn rgb(color: [u8; 3]) -> egui::Color32 {
    egui::Color32::from_rgb(color[0], color[1], color[2])
}
