use crate::error::Result;
use crate::types::{Canvas, LayerDocument, MarkerStyle, ProjectedPoint};
use std::collections::HashSet;
use std::io;
use svg::node::element::{Circle, Group, Text};
use svg::Document;

/// Matplotlib's tab10 cycle, used to tell folders apart in the preview.
const PREVIEW_PALETTE: [&str; 10] = [
    "#1f77b4", "#ff7f0e", "#2ca02c", "#d62728", "#9467bd", "#8c564b", "#e377c2", "#7f7f7f",
    "#bcbd22", "#17becf",
];

const LEGEND_X: u32 = 10;
const LEGEND_TOP: u32 = 20;
const LEGEND_LINE_HEIGHT: u32 = 18;

fn canvas_document(canvas: Canvas) -> Document {
    Document::new()
        .set("width", canvas.width)
        .set("height", canvas.height)
        .set("viewBox", (0, 0, canvas.width, canvas.height))
}

fn marker(point: &ProjectedPoint, radius: f64) -> Circle {
    Circle::new()
        .set("cx", point.x)
        .set("cy", point.y)
        .set("r", radius)
}

fn legend_entry(index: usize, name: &str, colour: &str) -> Text {
    Text::new(name)
        .set("x", LEGEND_X)
        .set("y", LEGEND_TOP + LEGEND_LINE_HEIGHT * index as u32)
        .set("fill", colour)
}

fn to_bytes(document: &Document) -> io::Result<Vec<u8>> {
    let mut out = Vec::new();
    svg::write(&mut out, document)?;
    Ok(out)
}

/// One standalone SVG per folder. A layer with no points still yields a
/// valid, empty canvas.
pub fn render_layer(layer: &LayerDocument, canvas: Canvas, style: &MarkerStyle) -> Result<Vec<u8>> {
    let document = layer
        .points
        .iter()
        .fold(canvas_document(canvas), |doc, point| {
            doc.add(marker(point, style.radius).set("fill", style.fill.clone()))
        });
    Ok(to_bytes(&document)?)
}

/// All layers on one canvas, one coloured group per folder, followed by a
/// legend line per folder in the same colour.
pub fn render_preview(layers: &[LayerDocument], canvas: Canvas, style: &MarkerStyle) -> Result<Vec<u8>> {
    let colour = |i: usize| PREVIEW_PALETTE[i % PREVIEW_PALETTE.len()];
    let document = layers
        .iter()
        .enumerate()
        .fold(canvas_document(canvas), |doc, (i, layer)| {
            let group = layer.points.iter().fold(
                Group::new()
                    .set("id", sanitize_name(&layer.name))
                    .set("fill", colour(i)),
                |group, point| group.add(marker(point, style.radius)),
            );
            doc.add(group)
        });
    let document = layers
        .iter()
        .enumerate()
        .fold(document, |doc, (i, layer)| doc.add(legend_entry(i, &layer.name, colour(i))));
    Ok(to_bytes(&document)?)
}

/// Replaces everything outside `[A-Za-z0-9_-]` with `_`.
pub fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Archive entry names for folders in output order.
///
/// When two names sanitise to the same stem, the later one is suffixed with
/// `_<n>`, `n` being its 1-based position in `names`.
pub fn layer_file_names<'a>(names: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut taken = HashSet::new();
    names
        .into_iter()
        .enumerate()
        .map(|(i, name)| {
            let mut stem = sanitize_name(name);
            while taken.contains(&stem) {
                stem = format!("{stem}_{}", i + 1);
            }
            taken.insert(stem.clone());
            format!("{stem}.svg")
        })
        .collect()
}
