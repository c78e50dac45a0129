mod geometry;
mod raster;
mod slot;

pub use geometry::{ParseGravityError, PreviewGeometry, VideoGravity};
pub use raster::draw_markers;
pub use slot::LatestSlot;

use crate::types::Point;

/// One rendered keypoint marker in view space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Marker {
    pub center: Point,
    pub radius: f32,
    pub color: u32,
}

/// The drawable overlay above the preview. Only touched on the UI thread.
#[derive(Clone, Debug, Default)]
pub struct OverlayState {
    markers: Vec<Marker>,
    redraws: u64,
}

impl OverlayState {
    pub fn markers(&self) -> &[Marker] {
        &self.markers
    }

    pub fn redraws(&self) -> u64 {
        self.redraws
    }

    /// Converts device points into view space and replaces every marker.
    /// An empty `points` list clears the overlay.
    pub fn show_points(&mut self, points: &[Point], geometry: &PreviewGeometry, style: MarkerStyle) {
        self.markers.clear();
        self.markers.extend(points.iter().map(|&p| Marker {
            center: geometry.layer_point(p),
            radius: style.radius,
            color: style.color,
        }));
        self.redraws += 1;
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MarkerStyle {
    pub radius: f32,
    pub color: u32,
}
