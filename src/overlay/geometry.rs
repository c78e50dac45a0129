use std::{fmt, str::FromStr};

use thiserror::Error;

use crate::types::Point;

/// How the camera image is laid out inside the preview view.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum VideoGravity {
    /// Preserve aspect ratio and fill the view, cropping the overflow.
    #[default]
    ResizeAspectFill,
    /// Preserve aspect ratio and fit inside the view, letterboxing.
    ResizeAspect,
    /// Stretch to the view bounds.
    Resize,
}

#[derive(Debug, Error)]
#[error("unknown video gravity {0:?}, expected fill, fit or stretch")]
pub struct ParseGravityError(String);

impl FromStr for VideoGravity {
    type Err = ParseGravityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fill" | "aspect-fill" => Ok(VideoGravity::ResizeAspectFill),
            "fit" | "aspect" => Ok(VideoGravity::ResizeAspect),
            "stretch" | "resize" => Ok(VideoGravity::Resize),
            _ => Err(ParseGravityError(s.to_string())),
        }
    }
}

impl fmt::Display for VideoGravity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            VideoGravity::ResizeAspectFill => "fill",
            VideoGravity::ResizeAspect => "fit",
            VideoGravity::Resize => "stretch",
        };
        f.write_str(label)
    }
}

/// Maps normalized capture-device points (origin top-left, `[0, 1]` on both
/// axes) into preview-view coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PreviewGeometry {
    pub view_width: f32,
    pub view_height: f32,
    pub frame_width: u32,
    pub frame_height: u32,
    pub gravity: VideoGravity,
}

impl PreviewGeometry {
    pub fn layer_point(&self, device: Point) -> Point {
        let (scale_x, scale_y, offset_x, offset_y) = self.placement();
        Point::new(
            device.x * scale_x + offset_x,
            device.y * scale_y + offset_y,
        )
    }

    /// Displayed image size and its offset inside the view.
    fn placement(&self) -> (f32, f32, f32, f32) {
        if self.frame_width == 0 || self.frame_height == 0 {
            return (self.view_width, self.view_height, 0.0, 0.0);
        }

        let fw = self.frame_width as f32;
        let fh = self.frame_height as f32;
        let sx = self.view_width / fw;
        let sy = self.view_height / fh;
        let scale = match self.gravity {
            VideoGravity::Resize => return (self.view_width, self.view_height, 0.0, 0.0),
            VideoGravity::ResizeAspect => sx.min(sy),
            VideoGravity::ResizeAspectFill => sx.max(sy),
        };

        let shown_w = fw * scale;
        let shown_h = fh * scale;
        (
            shown_w,
            shown_h,
            (self.view_width - shown_w) * 0.5,
            (self.view_height - shown_h) * 0.5,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geometry(gravity: VideoGravity) -> PreviewGeometry {
        PreviewGeometry {
            view_width: 400.0,
            view_height: 400.0,
            frame_width: 1280,
            frame_height: 720,
            gravity,
        }
    }

    fn assert_close(a: Point, b: Point) {
        assert!(
            (a.x - b.x).abs() < 1e-3 && (a.y - b.y).abs() < 1e-3,
            "{a:?} != {b:?}"
        );
    }

    #[test]
    fn aspect_fill_crops_wide_frame_horizontally() {
        let g = geometry(VideoGravity::ResizeAspectFill);
        // 1280x720 scaled by 400/720 -> 711.1 x 400, overflowing by 155.5 on each side.
        assert_close(g.layer_point(Point::new(0.5, 0.5)), Point::new(200.0, 200.0));
        assert_close(g.layer_point(Point::new(0.0, 0.0)), Point::new(-155.555, 0.0));
        assert_close(g.layer_point(Point::new(1.0, 1.0)), Point::new(555.555, 400.0));
    }

    #[test]
    fn aspect_fit_letterboxes_vertically() {
        let g = geometry(VideoGravity::ResizeAspect);
        assert_close(g.layer_point(Point::new(0.0, 0.0)), Point::new(0.0, 87.5));
        assert_close(g.layer_point(Point::new(1.0, 1.0)), Point::new(400.0, 312.5));
    }

    #[test]
    fn stretch_and_unknown_frame_map_to_view_bounds() {
        let g = geometry(VideoGravity::Resize);
        assert_close(g.layer_point(Point::new(0.25, 0.75)), Point::new(100.0, 300.0));

        let unknown = PreviewGeometry {
            frame_width: 0,
            ..geometry(VideoGravity::ResizeAspectFill)
        };
        assert_close(unknown.layer_point(Point::new(1.0, 0.5)), Point::new(400.0, 200.0));
    }

    #[test]
    fn parses_gravity_names() {
        assert_eq!("Fill".parse::<VideoGravity>().unwrap(), VideoGravity::ResizeAspectFill);
        assert_eq!("stretch".parse::<VideoGravity>().unwrap(), VideoGravity::Resize);
        assert!("zoom".parse::<VideoGravity>().is_err());
    }
}
