use crate::error::{ConvertError, Result};
use crate::types::{Canvas, GeoPoint, ProjectedPoint, Viewport};

/// Linear mapping from a viewport onto a canvas, north up.
#[derive(Debug, Clone, Copy)]
pub struct Projector {
    viewport: Viewport,
    width: f64,
    height: f64,
}

impl Projector {
    pub fn new(viewport: Viewport, canvas: Canvas) -> Result<Self> {
        let lon_span = viewport.max_lon - viewport.min_lon;
        let lat_span = viewport.max_lat - viewport.min_lat;
        if lon_span == 0.0 || !lon_span.is_finite() {
            return Err(ConvertError::DegenerateViewport { axis: "longitude" });
        }
        if lat_span == 0.0 || !lat_span.is_finite() {
            return Err(ConvertError::DegenerateViewport { axis: "latitude" });
        }
        if canvas.width == 0 || canvas.height == 0 {
            return Err(ConvertError::InvalidParameter(format!(
                "canvas must be non-empty, got {}x{}",
                canvas.width, canvas.height
            )));
        }

        Ok(Self {
            viewport,
            width: canvas.width as f64,
            height: canvas.height as f64,
        })
    }

    pub fn project(&self, point: &GeoPoint) -> ProjectedPoint {
        let vp = &self.viewport;
        ProjectedPoint {
            x: (point.x() - vp.min_lon) / (vp.max_lon - vp.min_lon) * self.width,
            y: self.height - (point.y() - vp.min_lat) / (vp.max_lat - vp.min_lat) * self.height,
        }
    }

    /// Drops points not strictly inside the viewport, then projects the rest.
    pub fn project_visible<'a>(
        &'a self,
        points: impl IntoIterator<Item = &'a GeoPoint> + 'a,
    ) -> impl Iterator<Item = ProjectedPoint> + 'a {
        points
            .into_iter()
            .filter(move |p| self.viewport.contains(p))
            .map(move |p| self.project(p))
    }
}
