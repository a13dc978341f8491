use geo::{BoundingRect, MultiPoint, Point, Rect};
use serde::Serialize;

/// A geographic coordinate: `x` is longitude, `y` is latitude, both in degrees.
pub type GeoPoint = Point<f64>;

#[derive(Debug, Clone, PartialEq)]
pub struct Folder {
    pub name: String,
    pub points: Vec<GeoPoint>,
}

/// Folders in document order. Every folder holds at least one point.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedDocument {
    folders: Vec<Folder>,
}

impl ParsedDocument {
    /// Only the KML parser builds documents, and it has already dropped empty
    /// folders and checked that something is left.
    pub(crate) fn new(folders: Vec<Folder>) -> Self {
        Self { folders }
    }

    pub fn folders(&self) -> &[Folder] {
        &self.folders
    }

    pub fn folder(&self, name: &str) -> Option<&Folder> {
        self.folders.iter().find(|f| f.name == name)
    }

    pub fn folder_names(&self) -> impl Iterator<Item = &str> {
        self.folders.iter().map(|f| f.name.as_str())
    }

    pub fn total_points(&self) -> usize {
        self.folders.iter().map(|f| f.points.len()).sum()
    }

    /// Tight bounding box over every point of every folder.
    pub fn bounds(&self) -> Bounds {
        let points: MultiPoint<f64> = self
            .folders
            .iter()
            .flat_map(|f| f.points.iter().copied())
            .collect();
        points.bounding_rect().map(Bounds::from).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Bounds {
    pub min_lon: f64,
    pub max_lon: f64,
    pub min_lat: f64,
    pub max_lat: f64,
}

impl Bounds {
    pub fn center(&self) -> GeoPoint {
        Point::new(
            (self.min_lon + self.max_lon) / 2.0,
            (self.min_lat + self.max_lat) / 2.0,
        )
    }

    /// Closed-interval containment, used to sanity check pan centres.
    pub fn contains(&self, point: &GeoPoint) -> bool {
        (self.min_lon..=self.max_lon).contains(&point.x())
            && (self.min_lat..=self.max_lat).contains(&point.y())
    }
}

impl From<Rect<f64>> for Bounds {
    fn from(rect: Rect<f64>) -> Self {
        Self {
            min_lon: rect.min().x,
            max_lon: rect.max().x,
            min_lat: rect.min().y,
            max_lat: rect.max().y,
        }
    }
}

/// Rectangular geographic window being rendered, in plain degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub min_lon: f64,
    pub max_lon: f64,
    pub min_lat: f64,
    pub max_lat: f64,
}

impl Viewport {
    /// Open-rectangle test: points on an edge are outside.
    pub fn contains(&self, point: &GeoPoint) -> bool {
        self.min_lon < point.x()
            && point.x() < self.max_lon
            && self.min_lat < point.y()
            && point.y() < self.max_lat
    }

    #[cfg(test)]
    pub fn center(&self) -> GeoPoint {
        Point::new(
            (self.min_lon + self.max_lon) / 2.0,
            (self.min_lat + self.max_lat) / 2.0,
        )
    }
}

/// Canvas coordinates: origin top-left, `y` grows downward.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProjectedPoint {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Canvas {
    pub width: u32,
    pub height: u32,
}

impl Default for Canvas {
    fn default() -> Self {
        Self {
            width: 1000,
            height: 1000,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MarkerStyle {
    pub radius: f64,
    pub fill: String,
}

impl Default for MarkerStyle {
    fn default() -> Self {
        Self {
            radius: 5.0,
            fill: "red".to_string(),
        }
    }
}

/// One folder's visible points, already in canvas space.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerDocument {
    pub name: String,
    pub points: Vec<ProjectedPoint>,
}
