//! Viewport selection from zoom and pan.
//!
//! The zoom model is degree-linear: a zoom level `z` gives a square window of
//! half-extent `1/z` degrees on both axes, centred on the pan point. It is not
//! a web-map tile zoom and makes no attempt at geodetic accuracy.

use crate::error::{ConvertError, Result};
use crate::types::{Bounds, GeoPoint, Viewport};
use tracing::debug;

pub const MIN_ZOOM: i32 = 1;
pub const MAX_ZOOM: i32 = 20;
pub const DEFAULT_ZOOM: i32 = 5;

/// Half of the viewport's side length, in degrees, for a zoom level.
pub fn degree_half_extent(zoom: i32) -> Result<f64> {
    if !(MIN_ZOOM..=MAX_ZOOM).contains(&zoom) {
        return Err(ConvertError::InvalidParameter(format!(
            "zoom must be between {MIN_ZOOM} and {MAX_ZOOM}, got {zoom}"
        )));
    }
    Ok(1.0 / zoom as f64)
}

/// Builds the degree-linear viewport; `pan` defaults to the centre of `bounds`.
pub fn degree_linear_viewport(bounds: &Bounds, zoom: i32, pan: Option<GeoPoint>) -> Result<Viewport> {
    let half = degree_half_extent(zoom)?;
    let pan = pan.unwrap_or_else(|| bounds.center());
    if !bounds.contains(&pan) {
        debug!("Pan centre ({}, {}) lies outside the data bounds", pan.x(), pan.y());
    }

    Ok(Viewport {
        min_lon: pan.x() - half,
        max_lon: pan.x() + half,
        min_lat: pan.y() - half,
        max_lat: pan.y() + half,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::Point;

    fn bounds() -> Bounds {
        Bounds {
            min_lon: 9.5,
            max_lon: 10.5,
            min_lat: 19.5,
            max_lat: 20.5,
        }
    }

    #[test]
    fn test_zoom_one_at_center_has_unit_half_extent() {
        let vp = degree_linear_viewport(&bounds(), 1, None).unwrap();
        assert_eq!(vp.max_lon - 10.0, 1.0);
        assert_eq!(10.0 - vp.min_lon, 1.0);
        assert_eq!(vp.max_lat - 20.0, 1.0);
        assert_eq!(20.0 - vp.min_lat, 1.0);
    }

    #[test]
    fn test_explicit_pan() {
        let vp = degree_linear_viewport(&bounds(), 2, Some(Point::new(10.0, 20.0))).unwrap();
        assert_eq!(
            vp,
            Viewport {
                min_lon: 9.5,
                max_lon: 10.5,
                min_lat: 19.5,
                max_lat: 20.5,
            }
        );
    }

    #[test]
    fn test_pan_outside_bounds_is_allowed() {
        let vp = degree_linear_viewport(&bounds(), 4, Some(Point::new(100.0, -40.0))).unwrap();
        assert_eq!(vp.center(), Point::new(100.0, -40.0));
    }

    #[test]
    fn test_zoom_out_of_range_rejected() {
        for zoom in [0, -1, 21] {
            assert!(matches!(
                degree_linear_viewport(&bounds(), zoom, None),
                Err(ConvertError::InvalidParameter(_))
            ));
        }
    }

    #[test]
    fn test_higher_zoom_is_smaller() {
        let wide = degree_linear_viewport(&bounds(), 2, None).unwrap();
        let narrow = degree_linear_viewport(&bounds(), 10, None).unwrap();
        assert!(narrow.max_lon - narrow.min_lon < wide.max_lon - wide.min_lon);
    }
}
