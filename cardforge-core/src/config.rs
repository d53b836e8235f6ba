//! Settings - Proxy Endpoint, Design Sizes, Export Presets

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::schema::Orientation;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read settings: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid settings file: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default = "default_proxy_url")]
    pub proxy_url: String,
    #[serde(default)]
    pub design: DesignSettings,
    #[serde(default)]
    pub export: ExportSettings,
}

fn default_proxy_url() -> String {
    "http://localhost:8080/proxy.php".to_string()
}

/// Text sizes in percent of the canvas width, so they follow the
/// container rather than the viewport.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextSizes {
    pub title_size: f32,
    pub genre_size: f32,
    pub synopsis_size: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DesignSettings {
    #[serde(default = "default_horizontal_sizes")]
    pub horizontal: TextSizes,
    #[serde(default = "default_vertical_sizes")]
    pub vertical: TextSizes,
}

fn default_horizontal_sizes() -> TextSizes {
    TextSizes {
        title_size: 10.0,
        genre_size: 5.0,
        synopsis_size: 4.0,
    }
}

/// Vertical cards are narrower, so genre and synopsis run half a point larger.
fn default_vertical_sizes() -> TextSizes {
    TextSizes {
        title_size: 10.0,
        genre_size: 5.5,
        synopsis_size: 4.5,
    }
}

impl DesignSettings {
    pub fn sizes(&self, orientation: Orientation) -> TextSizes {
        match orientation {
            Orientation::Horizontal => self.horizontal,
            Orientation::Vertical => self.vertical,
        }
    }
}

impl Default for DesignSettings {
    fn default() -> Self {
        Self {
            horizontal: default_horizontal_sizes(),
            vertical: default_vertical_sizes(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportSettings {
    #[serde(default = "default_horizontal_width")]
    pub horizontal_width: u32,
    #[serde(default = "default_vertical_width")]
    pub vertical_width: u32,
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
    #[serde(default = "default_filename_prefix")]
    pub filename_prefix: String,
}

fn default_horizontal_width() -> u32 {
    1920
}

fn default_vertical_width() -> u32 {
    1200
}

fn default_settle_delay_ms() -> u64 {
    100
}

fn default_filename_prefix() -> String {
    "CCCC".to_string()
}

impl ExportSettings {
    pub fn target_width(&self, orientation: Orientation) -> u32 {
        match orientation {
            Orientation::Horizontal => self.horizontal_width,
            Orientation::Vertical => self.vertical_width,
        }
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            horizontal_width: default_horizontal_width(),
            vertical_width: default_vertical_width(),
            settle_delay_ms: default_settle_delay_ms(),
            filename_prefix: default_filename_prefix(),
        }
    }
}

impl Settings {
    /// Load settings from a JSON file. A missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no settings file, using defaults");
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            proxy_url: default_proxy_url(),
            design: DesignSettings::default(),
            export: ExportSettings::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_missing_file_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load(&dir.path().join("absent.json")).unwrap();
        assert_eq!(settings.export.target_width(Orientation::Horizontal), 1920);
        assert_eq!(settings.export.target_width(Orientation::Vertical), 1200);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"proxyUrl": "https://cards.example/proxy.php", "export": {{"settleDelayMs": 0}}}}"#).unwrap();

        let settings = Settings::load(file.path()).unwrap();
        assert_eq!(settings.proxy_url, "https://cards.example/proxy.php");
        assert_eq!(settings.export.settle_delay(), Duration::ZERO);
        assert_eq!(settings.export.filename_prefix, "CCCC");
        assert_eq!(settings.design.sizes(Orientation::Horizontal).synopsis_size, 4.0);
    }

    #[test]
    fn test_vertical_text_sizes() {
        let sizes = DesignSettings::default().sizes(Orientation::Vertical);
        assert_eq!(sizes.title_size, 10.0);
        assert_eq!(sizes.genre_size, 5.5);
        assert_eq!(sizes.synopsis_size, 4.5);
    }

    #[test]
    fn test_malformed_file_errors() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert!(matches!(Settings::load(file.path()), Err(ConfigError::Parse(_))));
    }
}
