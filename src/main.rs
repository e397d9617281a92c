use anyhow::{Context, Result};
use eframe::egui;
use log::info;
use std::sync::Arc;
use std::time::Duration;

mod camera;
mod config;
mod controller;
mod error;
mod inference;
mod libcamera;
mod notice;
mod nutrition;
mod payload;
mod surface;
mod texture;
mod ui;

use crate::camera::{CameraSource, TestPatternSource};
use crate::config::Config;
use crate::controller::ControllerSettings;
use crate::inference::{GeminiClient, InferenceService};
use crate::libcamera::LibcameraSource;
use crate::surface::SurfaceBounds;
use crate::ui::FoodLensApp;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    info!("Starting Food Lens");

    let config = Config::load()?;
    config.validate().context("Invalid configuration")?;
    info!(
        "Configuration loaded: {}x{} window, model {}",
        config.display.window_width, config.display.window_height, config.inference.model
    );

    let camera: Arc<dyn CameraSource> = if config.camera.simulate {
        Arc::new(TestPatternSource::new(
            config.camera.preview_width,
            config.camera.preview_height,
        ))
    } else {
        Arc::new(LibcameraSource::new(&config.camera))
    };
    info!("Camera source: {}", camera.display_name());

    let gemini = GeminiClient::new(&config.inference).context("Failed to build inference client")?;
    if config.inference.resolved_api_key().trim().is_empty() {
        log::warn!(
            "No API key configured. Set {} or inference.api_key; analysis will fail until then.",
            config.inference.api_key_env
        );
    }
    let inference: Arc<dyn InferenceService> = Arc::new(gemini);

    let window_size = [config.display.window_width, config.display.window_height];
    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size(window_size)
            .with_min_inner_size([360.0, 480.0])
            .with_title("Food Lens"),
        ..Default::default()
    };

    let settings = ControllerSettings::from(&config);
    let initial_bounds = SurfaceBounds::new(
        config.display.window_width,
        config.display.window_height,
        config.display.window_height,
    );
    let preview_interval = Duration::from_millis(config.camera.preview_interval_ms.max(1));
    let runtime = tokio::runtime::Handle::current();

    info!("Launching GUI application...");

    eframe::run_native(
        "Food Lens",
        options,
        Box::new(move |cc| {
            setup_style(&cc.egui_ctx);

            Box::new(FoodLensApp::new(
                settings,
                initial_bounds,
                camera,
                inference,
                runtime,
                preview_interval,
            ))
        }),
    )
    .map_err(|e| anyhow::anyhow!("Failed to run application: {}", e))?;

    info!("Application shut down gracefully");
    Ok(())
}

fn setup_style(ctx: &egui::Context) {
    let mut style = (*ctx.style()).clone();

    style.spacing.button_padding = egui::vec2(14.0, 10.0);
    style.spacing.item_spacing = egui::vec2(12.0, 8.0);

    style.text_styles.insert(
        egui::TextStyle::Button,
        egui::FontId::new(18.0, egui::FontFamily::Proportional),
    );
    style.text_styles.insert(
        egui::TextStyle::Body,
        egui::FontId::new(16.0, egui::FontFamily::Proportional),
    );
    style.text_styles.insert(
        egui::TextStyle::Heading,
        egui::FontId::new(26.0, egui::FontFamily::Proportional),
    );

    ctx.set_style(style);
}
