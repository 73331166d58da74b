/// Placeholder bitmaps
///
/// Drawn straight into pixel buffers so a placeholder never depends on any
/// file or decoder being available.
use image::{Rgba, RgbaImage};

const BACKGROUND: Rgba<u8> = Rgba([48, 48, 52, 255]);
const GLYPH: Rgba<u8> = Rgba([220, 220, 225, 255]);

/// Dark tile with a "play" triangle, used when no video frame can be produced
pub fn video_placeholder(size: u32) -> RgbaImage {
    let size = size.max(8);
    let mut img = RgbaImage::from_pixel(size, size, BACKGROUND);

    // Right-pointing triangle centered in the tile, a third of its height
    let s = size as f32;
    let (left, right) = (s * 0.40, s * 0.65);
    let (top, bottom) = (s / 3.0, s * 2.0 / 3.0);
    let mid = s / 2.0;

    for y in top as u32..bottom as u32 {
        let fy = y as f32 + 0.5;
        // half-height of the triangle at this x shrinks linearly to the tip
        for x in left as u32..right as u32 {
            let fx = x as f32 + 0.5;
            let half = (bottom - top) / 2.0 * (1.0 - (fx - left) / (right - left));
            if (fy - mid).abs() <= half {
                img.put_pixel(x, y, GLYPH);
            }
        }
    }
    img
}

/// Dark tile with a diagonal cross, used when a photo cannot be decoded
pub fn photo_placeholder(size: u32) -> RgbaImage {
    let size = size.max(8);
    let mut img = RgbaImage::from_pixel(size, size, BACKGROUND);

    let (start, end) = (size / 3, size * 2 / 3);
    let thickness = (size / 40).max(1) as i64;
    for y in start..end {
        for x in start..end {
            let (dx, dy) = ((x - start) as i64, (y - start) as i64);
            let span = (end - start - 1) as i64;
            if (dx - dy).abs() <= thickness || (dx + dy - span).abs() <= thickness {
                img.put_pixel(x, y, GLYPH);
            }
        }
    }
    img
}
