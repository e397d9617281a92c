use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::camera::FacingMode;
use crate::surface::PlaceholderStyle;

pub const DEFAULT_CONFIG_FILE: &str = "food_lens_config.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub display: DisplayConfig,
    pub camera: CameraConfig,
    pub inference: InferenceConfig,
    pub ui: UiConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayConfig {
    pub window_width: f32,
    pub window_height: f32,
    pub placeholder_aspect_width: f32,
    pub placeholder_aspect_height: f32,
    /// Largest share of the window height the surface may take.
    pub max_viewport_fraction: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraConfig {
    pub simulate: bool,
    pub binary: String,
    pub facing: FacingMode,
    pub rear_index: u32,
    pub front_index: u32,
    pub preview_width: u32,
    pub preview_height: u32,
    pub preview_quality: u8,
    pub preview_interval_ms: u64,
    /// JPEG quality for captured pictures.
    pub capture_quality: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceConfig {
    pub endpoint: String,
    pub model: String,
    pub api_key: String,
    /// Environment variable that overrides `api_key` when set.
    pub api_key_env: String,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UiConfig {
    pub notice_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            display: DisplayConfig {
                window_width: 900.0,
                window_height: 820.0,
                placeholder_aspect_width: 4.0,
                placeholder_aspect_height: 3.0,
                max_viewport_fraction: 0.6,
            },
            camera: CameraConfig {
                simulate: false,
                binary: "rpicam-still".to_string(),
                facing: FacingMode::Environment,
                rear_index: 0,
                front_index: 1,
                preview_width: 800,
                preview_height: 600,
                preview_quality: 70,
                preview_interval_ms: 33,
                capture_quality: 90,
            },
            inference: InferenceConfig {
                endpoint: "https://generativelanguage.googleapis.com/v1beta/models".to_string(),
                model: "gemini-2.0-flash".to_string(),
                api_key: String::new(),
                api_key_env: "GEMINI_API_KEY".to_string(),
                timeout_secs: None,
            },
            ui: UiConfig { notice_secs: 3 },
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = PathBuf::from(DEFAULT_CONFIG_FILE);

        if config_path.exists() {
            Self::load_from_file(&config_path)
        } else {
            log::info!("Config file not found, creating default configuration");
            let default_config = Self::default();
            default_config.save()?;
            Ok(default_config)
        }
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Self = toml::from_str(&contents)
            .with_context(|| "Failed to parse configuration file")?;

        log::info!("Configuration loaded from {}", path.as_ref().display());
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to_file(DEFAULT_CONFIG_FILE)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = toml::to_string_pretty(self)
            .context("Failed to serialize configuration")?;

        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create config directory: {}", parent.display()))?;
            }
        }

        std::fs::write(path.as_ref(), contents)
            .with_context(|| format!("Failed to write config file: {}", path.as_ref().display()))?;

        log::info!("Configuration saved to {}", path.as_ref().display());
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.display.window_width <= 0.0 || self.display.window_height <= 0.0 {
            return Err(anyhow::anyhow!("Invalid window dimensions"));
        }

        if self.display.placeholder_aspect_width <= 0.0 || self.display.placeholder_aspect_height <= 0.0 {
            return Err(anyhow::anyhow!("Invalid placeholder aspect ratio"));
        }

        if !(self.display.max_viewport_fraction > 0.0 && self.display.max_viewport_fraction <= 1.0) {
            return Err(anyhow::anyhow!(
                "Viewport fraction must be in (0, 1], got {}",
                self.display.max_viewport_fraction
            ));
        }

        if self.camera.preview_width == 0 || self.camera.preview_height == 0 {
            return Err(anyhow::anyhow!("Invalid camera preview dimensions"));
        }

        for (name, quality) in [
            ("capture", self.camera.capture_quality),
            ("preview", self.camera.preview_quality),
        ] {
            if quality == 0 || quality > 100 {
                return Err(anyhow::anyhow!("Invalid {} JPEG quality: {}", name, quality));
            }
        }

        if !self.inference.endpoint.starts_with("http://") && !self.inference.endpoint.starts_with("https://") {
            return Err(anyhow::anyhow!("Inference endpoint must be an http(s) URL"));
        }

        if self.inference.model.trim().is_empty() {
            return Err(anyhow::anyhow!("Inference model name is empty"));
        }

        if self.ui.notice_secs == 0 {
            return Err(anyhow::anyhow!("Notice duration must be at least one second"));
        }

        Ok(())
    }

    pub fn placeholder_style(&self) -> PlaceholderStyle {
        PlaceholderStyle {
            aspect_width: self.display.placeholder_aspect_width,
            aspect_height: self.display.placeholder_aspect_height,
            max_viewport_fraction: self.display.max_viewport_fraction,
        }
    }
}

impl InferenceConfig {
    /// Key from the environment when present, otherwise the one in the file.
    pub fn resolved_api_key(&self) -> String {
        self.resolve_api_key_with(|name| std::env::var(name).ok())
    }

    fn resolve_api_key_with<F>(&self, lookup: F) -> String
    where
        F: Fn(&str) -> Option<String>,
    {
        if !self.api_key_env.is_empty() {
            if let Some(key) = lookup(&self.api_key_env).filter(|k| !k.trim().is_empty()) {
                return key;
            }
        }
        self.api_key.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.camera.capture_quality, 90);
        assert_eq!(config.camera.facing, FacingMode::Environment);
        assert_eq!(config.ui.notice_secs, 3);
        assert!(config.inference.timeout_secs.is_none());
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();

        config.camera.capture_quality = 0;
        assert!(config.validate().is_err());

        config.camera.capture_quality = 90;
        config.display.max_viewport_fraction = 1.5;
        assert!(config.validate().is_err());

        config.display.max_viewport_fraction = 0.6;
        config.inference.endpoint = "ftp://example.com".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_save_load() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test_config.toml");

        let mut original_config = Config::default();
        original_config.display.window_width = 800.0;
        original_config.display.window_height = 480.0;
        original_config.camera.facing = FacingMode::User;
        original_config.inference.timeout_secs = Some(30);
        original_config.save_to_file(&config_path).unwrap();

        let loaded_config = Config::load_from_file(&config_path).unwrap();

        assert_eq!(original_config.display.window_width, loaded_config.display.window_width);
        assert_eq!(original_config.camera.binary, loaded_config.camera.binary);
        assert_eq!(original_config.inference.model, loaded_config.inference.model);
        assert_eq!(loaded_config.camera.facing, FacingMode::User);
        assert_eq!(loaded_config.inference.timeout_secs, Some(30));
    }

    #[test]
    fn test_missing_timeout_defaults_to_none() {
        let mut value = toml::Value::try_from(Config::default()).unwrap();
        value["inference"].as_table_mut().unwrap().remove("timeout_secs");
        let config: Config = value.try_into().unwrap();
        assert_eq!(config.inference.timeout_secs, None);
    }

    #[test]
    fn test_api_key_resolution() {
        let mut inference = Config::default().inference;
        inference.api_key = "from-file".to_string();

        let from_env = inference.resolve_api_key_with(|_| Some("from-env".to_string()));
        assert_eq!(from_env, "from-env");

        let blank_env = inference.resolve_api_key_with(|_| Some("  ".to_string()));
        assert_eq!(blank_env, "from-file");

        let no_env = inference.resolve_api_key_with(|_| None);
        assert_eq!(no_env, "from-file");
    }
}
