use crate::kml::ParserOptions;
use crate::pipeline::ConversionRequest;
use crate::types::{Canvas, MarkerStyle};
use crate::viewport::DEFAULT_ZOOM;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub input: InputConfig,
    pub parser: ParserOptions,
    pub view: ViewConfig,
    pub canvas: CanvasConfig,
    pub marker: MarkerConfig,
    pub output: OutputConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct InputConfig {
    pub source: Option<String>, // Path, URL or Google My Maps link
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ViewConfig {
    pub zoom: i32,
    pub pan_lat: Option<f64>,
    pub pan_lon: Option<f64>,
    pub selected_folders: Option<Vec<String>>,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            zoom: DEFAULT_ZOOM,
            pan_lat: None,
            pan_lon: None,
            selected_folders: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct CanvasConfig {
    pub width: u32,
    pub height: u32,
}

impl Default for CanvasConfig {
    fn default() -> Self {
        let canvas = Canvas::default();
        Self {
            width: canvas.width,
            height: canvas.height,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct MarkerConfig {
    pub radius: f64,
    pub fill: String,
}

impl Default for MarkerConfig {
    fn default() -> Self {
        let style = MarkerStyle::default();
        Self {
            radius: style.radius,
            fill: style.fill,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct OutputConfig {
    pub archive: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            archive: PathBuf::from("svg_layers_export.zip"),
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 3000 }
    }
}

impl AppConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config: AppConfig = toml::from_str(&content)
            .with_context(|| "Failed to parse TOML configuration")?;
        Ok(config)
    }

    /// Loads `path` if given, otherwise starts from defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from_file(path),
            None => Ok(Self::default()),
        }
    }

    pub fn request(&self) -> ConversionRequest {
        ConversionRequest {
            zoom: self.view.zoom,
            pan_lon: self.view.pan_lon,
            pan_lat: self.view.pan_lat,
            selected_folders: self.view.selected_folders.clone(),
            canvas: Canvas {
                width: self.canvas.width,
                height: self.canvas.height,
            },
            marker: MarkerStyle {
                radius: self.marker.radius,
                fill: self.marker.fill.clone(),
            },
        }
    }
}
