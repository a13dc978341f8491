//! One conversion pass: select folders, compute the viewport, project, render.
//!
//! Every step is fail-fast. Nothing is written to an [`OutputBuffer`] until
//! the viewport and projector have been validated, so an error never leaves
//! a partial archive behind.

use crate::error::{ConvertError, Result};
use crate::export::{package_archive, OutputBuffer};
use crate::projection::Projector;
use crate::render::{layer_file_names, render_layer, render_preview};
use crate::types::{Canvas, Folder, LayerDocument, MarkerStyle, ParsedDocument};
use crate::viewport::{degree_linear_viewport, DEFAULT_ZOOM};
use geo::Point;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct ConversionRequest {
    pub zoom: i32,
    /// Pan centre longitude; each axis defaults to the centre of the bounds.
    pub pan_lon: Option<f64>,
    pub pan_lat: Option<f64>,
    /// Folder names to include, in output order. `None` means every folder.
    pub selected_folders: Option<Vec<String>>,
    pub canvas: Canvas,
    pub marker: MarkerStyle,
}

impl Default for ConversionRequest {
    fn default() -> Self {
        Self {
            zoom: DEFAULT_ZOOM,
            pan_lon: None,
            pan_lat: None,
            selected_folders: None,
            canvas: Canvas::default(),
            marker: MarkerStyle::default(),
        }
    }
}

fn select_folders<'a>(
    document: &'a ParsedDocument,
    selection: Option<&[String]>,
) -> Result<Vec<&'a Folder>> {
    let Some(names) = selection else {
        return Ok(document.folders().iter().collect());
    };

    let mut selected: Vec<&Folder> = Vec::with_capacity(names.len());
    for name in names {
        let folder = document.folder(name).ok_or_else(|| {
            let known: Vec<_> = document.folder_names().collect();
            ConvertError::InvalidParameter(format!(
                "unknown folder '{name}', expected one of: {}",
                known.join(", ")
            ))
        })?;
        if !selected.iter().any(|f| f.name == folder.name) {
            selected.push(folder);
        }
    }
    Ok(selected)
}

/// Visible, projected points for each selected folder, in selection order.
/// Folders with nothing in view are kept with an empty point list.
pub fn build_layers(document: &ParsedDocument, request: &ConversionRequest) -> Result<Vec<LayerDocument>> {
    let radius = request.marker.radius;
    if !radius.is_finite() || radius <= 0.0 {
        return Err(ConvertError::InvalidParameter(format!(
            "marker radius must be a positive number, got {radius}"
        )));
    }
    let folders = select_folders(document, request.selected_folders.as_deref())?;
    let bounds = document.bounds();
    let center = bounds.center();
    let pan = Point::new(
        request.pan_lon.unwrap_or(center.x()),
        request.pan_lat.unwrap_or(center.y()),
    );
    let viewport = degree_linear_viewport(&bounds, request.zoom, Some(pan))?;
    let projector = Projector::new(viewport, request.canvas)?;

    Ok(folders
        .into_iter()
        .map(|folder| LayerDocument {
            name: folder.name.clone(),
            points: projector.project_visible(&folder.points).collect(),
        })
        .collect())
}

/// Renders one SVG per selected folder into a fresh buffer.
pub fn render_layers(document: &ParsedDocument, request: &ConversionRequest) -> Result<OutputBuffer> {
    let layers = build_layers(document, request)?;
    let file_names = layer_file_names(layers.iter().map(|l| l.name.as_str()));

    let mut buffer = OutputBuffer::new();
    for (layer, file_name) in layers.iter().zip(file_names) {
        info!("Rendered layer '{}' with {} markers", layer.name, layer.points.len());
        buffer.insert(file_name, render_layer(layer, request.canvas, &request.marker)?);
    }
    Ok(buffer)
}

pub fn export_archive(document: &ParsedDocument, request: &ConversionRequest) -> Result<Vec<u8>> {
    let buffer = render_layers(document, request)?;
    if buffer.is_empty() {
        warn!("No layers selected, the archive will be empty");
    }
    let archive = package_archive(&buffer)?;
    info!("Packaged {} layers into {} bytes", buffer.len(), archive.len());
    Ok(archive)
}

pub fn preview(document: &ParsedDocument, request: &ConversionRequest) -> Result<Vec<u8>> {
    let layers = build_layers(document, request)?;
    render_preview(&layers, request.canvas, &request.marker)
}
