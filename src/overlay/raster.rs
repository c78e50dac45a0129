use crate::types::Point;

/// Stamps filled circles for normalized top-left-origin `points` into an RGBA8
/// buffer. Used where there is no view layer, e.g. when writing images to disk.
pub fn draw_markers(
    buffer: &mut [u8],
    width: u32,
    height: u32,
    points: &[Point],
    radius: i32,
    color: [u8; 4],
) {
    for p in points {
        let cx = (p.x * width as f32).round() as i32;
        let cy = (p.y * height as f32).round() as i32;
        fill_circle(buffer, width, height, (cx, cy), radius, color);
    }
}

fn fill_circle(
    buffer: &mut [u8],
    width: u32,
    height: u32,
    center: (i32, i32),
    radius: i32,
    color: [u8; 4],
) {
    let (cx, cy) = center;
    let r2 = radius * radius;
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            if dx * dx + dy * dy <= r2 {
                put_pixel(buffer, width, height, cx + dx, cy + dy, color);
            }
        }
    }
}

fn put_pixel(buffer: &mut [u8], width: u32, height: u32, x: i32, y: i32, color: [u8; 4]) {
    if x < 0 || y < 0 || x as u32 >= width || y as u32 >= height {
        return;
    }
    let idx = (y as usize * width as usize + x as usize) * 4;
    if let Some(px) = buffer.get_mut(idx..idx + 4) {
        px.copy_from_slice(&color);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marks_pixels_and_clips_at_edges() {
        let (w, h) = (8u32, 8u32);
        let mut buf = vec![0u8; (w * h * 4) as usize];
        let orange = [255, 149, 0, 255];
        draw_markers(
            &mut buf,
            w,
            h,
            &[Point::new(0.5, 0.5), Point::new(0.875, 0.875), Point::new(1.0, 1.0)],
            1,
            orange,
        );

        let at = |x: usize, y: usize| &buf[(y * w as usize + x) * 4..(y * w as usize + x) * 4 + 4];
        assert_eq!(at(4, 4), &orange);
        assert_eq!(at(3, 4), &orange);
        assert_eq!(at(7, 7), &orange);
        assert_eq!(at(0, 0), &[0, 0, 0, 0]);
    }
}
