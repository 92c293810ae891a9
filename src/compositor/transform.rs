//! Geometric and alpha operations applied per layer per frame.

use image::{Rgba, RgbaImage};

use crate::geometry::Roi;
use crate::source::Frame;

/// Rotate a frame about its center with transparent fill, growing the
/// canvas to the rotated bounding box so no content is cut off.
///
/// Returns the rotated frame together with the origin shift the caller must
/// subtract from the placement position to keep the content centered:
/// `(new_w - w) / 2` and `(new_h - h) / 2`.
pub fn rotate_with_bounds(frame: &Frame, degrees: f64) -> (Frame, i64, i64) {
    let (w, h) = (frame.width(), frame.height());
    let theta = degrees.to_radians();
    let (sin_abs, cos_abs) = (theta.sin().abs(), theta.cos().abs());

    // Guard against float noise promoting an exact multiple of 90 degrees
    // to one extra pixel
    let new_w = (h as f64 * sin_abs + w as f64 * cos_abs - 1e-6).ceil() as u32;
    let new_h = (h as f64 * cos_abs + w as f64 * sin_abs - 1e-6).ceil() as u32;

    let (sin, cos) = (theta.sin(), theta.cos());
    let (src_cx, src_cy) = (w as f64 / 2.0, h as f64 / 2.0);
    let (dst_cx, dst_cy) = (new_w as f64 / 2.0, new_h as f64 / 2.0);

    let mut out = RgbaImage::new(new_w, new_h);
    for y in 0..new_h {
        for x in 0..new_w {
            // Inverse-map the destination pixel into the source
            let dx = x as f64 + 0.5 - dst_cx;
            let dy = y as f64 + 0.5 - dst_cy;
            let sx = cos * dx + sin * dy + src_cx - 0.5;
            let sy = -sin * dx + cos * dy + src_cy - 0.5;
            let (sx, sy) = (sx.round() as i64, sy.round() as i64);
            if sx >= 0 && sx < w as i64 && sy >= 0 && sy < h as i64 {
                out.put_pixel(x, y, *frame.image().get_pixel(sx as u32, sy as u32));
            }
        }
    }

    let shift_x = (new_w as i64 - w as i64) / 2;
    let shift_y = (new_h as i64 - h as i64) / 2;
    (Frame::new(out), shift_x, shift_y)
}

/// Zero the alpha channel outside a rounded-rectangle outline with the
/// given corner radius.
pub fn round_corners(frame: &mut Frame, radius: u32) {
    if radius == 0 {
        return;
    }
    let (w, h) = (frame.width(), frame.height());
    let r = radius.min(w / 2).min(h / 2) as i64;
    if r == 0 {
        return;
    }

    let image = frame.image_mut();
    let corners = [
        (r - 1, r - 1),
        (w as i64 - r, r - 1),
        (r - 1, h as i64 - r),
        (w as i64 - r, h as i64 - r),
    ];

    for y in 0..h as i64 {
        for x in 0..w as i64 {
            let in_corner_band = (x < r || x >= w as i64 - r) && (y < r || y >= h as i64 - r);
            if !in_corner_band {
                continue;
            }
            let inside = corners.iter().any(|&(cx, cy)| {
                let (dx, dy) = (x - cx, y - cy);
                dx * dx + dy * dy <= r * r
            });
            if !inside {
                image.get_pixel_mut(x as u32, y as u32).0[3] = 0;
            }
        }
    }
}

/// Scale the alpha channel by an opacity factor in `[0, 1]`.
pub fn apply_opacity(frame: &mut Frame, opacity: f64) {
    if opacity >= 1.0 {
        return;
    }
    let opacity = opacity.max(0.0);
    for pixel in frame.image_mut().pixels_mut() {
        pixel.0[3] = (pixel.0[3] as f64 * opacity).round() as u8;
    }
}

/// Extract the frame sub-region named by the ROI.
pub fn crop_to_roi(frame: &Frame, roi: &Roi) -> Frame {
    let cropped = image::imageops::crop_imm(
        frame.image(),
        roi.fx1,
        roi.fy1,
        roi.fx2 - roi.fx1,
        roi.fy2 - roi.fy1,
    )
    .to_image();
    Frame::new(cropped)
}

/// Alpha-composite `src` over the canvas region named by the ROI:
/// `out = src * a + dst * (1 - a)` per channel.
///
/// Fully opaque pixels are copied byte-exact; fully transparent pixels
/// leave the canvas untouched.
pub fn blend_onto(canvas: &mut Frame, src: &Frame, roi: &Roi) {
    let canvas = canvas.image_mut();
    for (row, y) in (roi.y1..roi.y2).enumerate() {
        for (col, x) in (roi.x1..roi.x2).enumerate() {
            let s = *src.image().get_pixel(col as u32, row as u32);
            match s.0[3] {
                255 => {
                    canvas.put_pixel(x, y, Rgba([s.0[0], s.0[1], s.0[2], 255]));
                }
                0 => {}
                alpha => {
                    let a = alpha as f64 / 255.0;
                    let d = canvas.get_pixel_mut(x, y);
                    for c in 0..3 {
                        d.0[c] =
                            (s.0[c] as f64 * a + d.0[c] as f64 * (1.0 - a)).round() as u8;
                    }
                    d.0[3] = 255;
                }
            }
        }
    }
}
