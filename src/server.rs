use crate::config::AppConfig;
use crate::error::ConvertError;
use crate::pipeline::{self, ConversionRequest};
use crate::types::{Bounds, ParsedDocument};
use anyhow::Result;
use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::Serialize;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;

const INDEX_HTML: &str = r#"<!doctype html>
<html>
<head><meta charset="utf-8"><title>KML layer preview</title></head>
<body>
<form id="view">
  <label>Zoom <input type="range" name="zoom" min="1" max="20" value="5"></label>
  <label>Longitude <input type="number" step="any" name="pan_lon"></label>
  <label>Latitude <input type="number" step="any" name="pan_lat"></label>
  <fieldset id="folders"><legend>Folders (none checked = all)</legend></fieldset>
</form>
<p><a id="export" href="/api/export">Download SVG ZIP</a></p>
<img id="preview" src="/api/preview" width="600" height="600" style="border:1px solid #ccc">
<script>
const form = document.getElementById('view');
fetch('/api/folders').then(r => r.json()).then(listing => {
  for (const f of listing.folders) {
    const label = document.createElement('label');
    const box = document.createElement('input');
    box.type = 'checkbox';
    box.name = 'folder';
    box.value = f.name;
    label.append(box, ` ${f.name} (${f.points}) `);
    document.getElementById('folders').append(label);
  }
});
form.addEventListener('input', () => {
  const params = new URLSearchParams();
  for (const [k, v] of new FormData(form)) { if (v !== '') params.append(k, v); }
  document.getElementById('preview').src = '/api/preview?' + params;
  document.getElementById('export').href = '/api/export?' + params;
});
</script>
</body>
</html>
"#;

pub struct AppState {
    pub document: ParsedDocument,
    pub config: AppConfig,
}

/// Per-request view overrides; anything missing comes from the config.
#[derive(Debug, Default, PartialEq)]
pub struct ViewParams {
    zoom: Option<i32>,
    pan_lat: Option<f64>,
    pan_lon: Option<f64>,
    /// One entry per repeated `folder=` parameter, so names may contain commas.
    folders: Vec<String>,
}

fn parse_param<T: FromStr>(key: &str, value: &str) -> Result<T, ConvertError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConvertError::InvalidParameter(format!("{key}: cannot parse `{value}`")))
}

impl ViewParams {
    /// Builds overrides from raw query pairs. Empty values count as absent and
    /// unknown keys are ignored.
    fn from_pairs(pairs: Vec<(String, String)>) -> Result<Self, ConvertError> {
        let mut params = Self::default();
        for (key, value) in pairs {
            if value.trim().is_empty() {
                continue;
            }
            match key.as_str() {
                "zoom" => params.zoom = Some(parse_param(&key, &value)?),
                "pan_lat" => params.pan_lat = Some(parse_param(&key, &value)?),
                "pan_lon" => params.pan_lon = Some(parse_param(&key, &value)?),
                "folder" => params.folders.push(value),
                _ => {}
            }
        }
        Ok(params)
    }

    fn request(&self, config: &AppConfig) -> ConversionRequest {
        let mut request = config.request();
        if let Some(zoom) = self.zoom {
            request.zoom = zoom;
        }
        if self.pan_lat.is_some() {
            request.pan_lat = self.pan_lat;
        }
        if self.pan_lon.is_some() {
            request.pan_lon = self.pan_lon;
        }
        if !self.folders.is_empty() {
            request.selected_folders = Some(self.folders.clone());
        }
        request
    }
}

#[derive(Serialize)]
pub struct FolderSummary {
    name: String,
    points: usize,
}

#[derive(Serialize)]
pub struct FolderListing {
    bounds: Bounds,
    folders: Vec<FolderSummary>,
}

pub struct ApiError(ConvertError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (StatusCode::BAD_REQUEST, self.0.to_string()).into_response()
    }
}

impl From<ConvertError> for ApiError {
    fn from(err: ConvertError) -> Self {
        Self(err)
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/api/folders", get(folders_handler))
        .route("/api/preview", get(preview_handler))
        .route("/api/export", get(export_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn start_server(config: AppConfig, document: ParsedDocument) -> Result<()> {
    let port = config.server.port;
    let state = Arc::new(AppState { document, config });

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    info!("Starting preview server on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn index_handler() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn folders_handler(State(state): State<Arc<AppState>>) -> Json<FolderListing> {
    Json(FolderListing {
        bounds: state.document.bounds(),
        folders: state
            .document
            .folders()
            .iter()
            .map(|f| FolderSummary {
                name: f.name.clone(),
                points: f.points.len(),
            })
            .collect(),
    })
}

async fn preview_handler(
    State(state): State<Arc<AppState>>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Result<impl IntoResponse, ApiError> {
    let params = ViewParams::from_pairs(pairs)?;
    let svg = pipeline::preview(&state.document, &params.request(&state.config))?;
    Ok(([(header::CONTENT_TYPE, "image/svg+xml")], svg))
}

async fn export_handler(
    State(state): State<Arc<AppState>>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Result<impl IntoResponse, ApiError> {
    let params = ViewParams::from_pairs(pairs)?;
    let archive = pipeline::export_archive(&state.document, &params.request(&state.config))?;
    Ok((
        [
            (header::CONTENT_TYPE, "application/zip"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"svg_layers_export.zip\"",
            ),
        ],
        archive,
    ))
}
