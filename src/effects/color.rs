//! Recolor and color-grade masked regions.
//!
//! Everything here operates only on pixels whose binarized mask value
//! equals the configured detection value; the rest of the frame is never
//! touched. Channel math runs in f64 and clamps back to `[0, 255]` after
//! each stage.

use std::f64::consts::PI;

use image::imageops;

use crate::effects::config::{parse_hex_color, ColorSettings};
use crate::error::Result;
use crate::mask::Mask;
use crate::source::Frame;

/// Apply the configured blur, solid-color mix and grading chain to the
/// pixels selected by the mask.
pub fn change_color(frame: &mut Frame, mask: &Mask, settings: &ColorSettings) -> Result<()> {
    let mask = mask.resized(frame.width(), frame.height()).binarized();

    if let Some(radius) = settings.blur {
        if radius > 0 {
            apply_blur(frame, &mask, settings.detection, radius);
        }
    }

    if let Some(hex) = &settings.color {
        let color = parse_hex_color(hex)?;
        apply_solid_color(frame, &mask, settings.detection, color, settings.factor);
    }

    if settings.has_grading() {
        apply_grading(frame, &mask, settings);
    }

    Ok(())
}

/// Gaussian blur the frame and copy the blurred pixels back into the
/// masked region, preserving alpha.
fn apply_blur(frame: &mut Frame, mask: &Mask, detection: u8, radius: u32) {
    let sigma = (radius as f32 / 2.0).max(0.1);
    let blurred = imageops::blur(frame.image(), sigma);

    let image = frame.image_mut();
    for (x, y, pixel) in image.enumerate_pixels_mut() {
        if mask.get(x, y) == detection {
            let b = blurred.get_pixel(x, y);
            pixel.0[0] = b.0[0];
            pixel.0[1] = b.0[1];
            pixel.0[2] = b.0[2];
        }
    }
}

/// Mix the masked pixels toward a flat solid color.
///
/// Intensity preserves the original shading: `base = color * mean(R,G,B) /
/// 255`. With `factor = 1` the result is exactly `base`; `factor = 2` is
/// the flat color.
fn apply_solid_color(frame: &mut Frame, mask: &Mask, detection: u8, color: [u8; 3], factor: f64) {
    let image = frame.image_mut();
    for (x, y, pixel) in image.enumerate_pixels_mut() {
        if mask.get(x, y) != detection {
            continue;
        }
        let intensity =
            (pixel.0[0] as f64 + pixel.0[1] as f64 + pixel.0[2] as f64) / 3.0 / 255.0;
        for c in 0..3 {
            let base = color[c] as f64 * intensity;
            let mixed = base * (2.0 - factor) + color[c] as f64 * (factor - 1.0);
            pixel.0[c] = mixed.clamp(0.0, 255.0).round() as u8;
        }
    }
}

/// The secondary grading chain, applied in fixed order: exposure,
/// brightness, contrast, hue, saturation, sharpen, noise, vignette.
fn apply_grading(frame: &mut Frame, mask: &Mask, settings: &ColorSettings) {
    let vignette_geometry = if settings.vignette != 0.0 {
        masked_region_geometry(mask, settings.detection)
    } else {
        None
    };

    let image = frame.image_mut();
    for (x, y, pixel) in image.enumerate_pixels_mut() {
        if mask.get(x, y) != settings.detection {
            continue;
        }
        let mut rgb = [pixel.0[0] as f64, pixel.0[1] as f64, pixel.0[2] as f64];

        if settings.exposure != 0.0 {
            let gain = 2f64.powf(settings.exposure);
            for c in &mut rgb {
                *c = (*c * gain).clamp(0.0, 255.0);
            }
        }

        if settings.brightness != 0.0 {
            let (h, s, l) = rgb_to_hsl(rgb);
            let l = if settings.brightness > 0.0 {
                l + (1.0 - l) * settings.brightness
            } else {
                l * (1.0 + settings.brightness)
            };
            rgb = hsl_to_rgb(h, s, l.clamp(0.0, 1.0));
        }

        if settings.contrast != 0.0 {
            for c in &mut rgb {
                let v = *c / 255.0;
                *c = (((v - 0.5) * (settings.contrast + 1.0) + 0.5) * 255.0).clamp(0.0, 255.0);
            }
        }

        if settings.hue != 0.0 {
            let (h, s, v) = rgb_to_hsv(rgb);
            rgb = hsv_to_rgb((h + settings.hue).rem_euclid(360.0), s, v);
        }

        if settings.saturation != 1.0 {
            let (h, s, l) = rgb_to_hsl(rgb);
            let s = (s * 2f64.powf(settings.saturation - 1.0)).clamp(0.0, 1.0);
            rgb = hsl_to_rgb(h, s, l);
        }

        if settings.sharpen != 0.0 {
            let lum = luminance(rgb);
            let amount = settings.sharpen * 0.3;
            let factor = 1.0 + amount * (1.0 + (amount * PI).sin());
            let weight = 0.5 + (128.0 - lum).abs() / 256.0;
            for c in &mut rgb {
                *c = (lum + (*c - lum) * factor * weight).clamp(0.0, 255.0);
            }
        }

        if settings.noise != 0.0 {
            let lum = luminance(rgb);
            let seed = ((x as u64).wrapping_mul(12345).wrapping_add(y as u64))
                ^ settings.noise_seed as u64;
            let s = seed as f64;
            let rnd = ((s * 12.9898 + s * 78.233).sin() * 43758.5453).abs().fract();
            let vals = (rnd - 0.5) * 2.0 * (settings.noise.powf(1.5) * 0.5) * 255.0;
            let factor = 1.0 + vals / (lum + 50.0);
            for c in &mut rgb {
                *c = (*c * factor).clamp(0.0, 255.0);
            }
        }

        if let Some((cx, cy, max_dist)) = vignette_geometry {
            let dx = x as f64 - cx;
            let dy = y as f64 - cy;
            let d = (dx * dx + dy * dy).sqrt() / max_dist;
            let strength = d.powf(1.5) * settings.vignette;
            let factor = (1.0 - strength).clamp(0.2, 1.0);
            for c in &mut rgb {
                *c = (*c * factor).clamp(0.0, 255.0);
            }
        }

        pixel.0[0] = rgb[0].round() as u8;
        pixel.0[1] = rgb[1].round() as u8;
        pixel.0[2] = rgb[2].round() as u8;
    }
}

/// Centroid of the selected region and the distance from it to the
/// farthest corner of the region's bounding box. The vignette darkens
/// radially from the region's own center, not the frame's.
fn masked_region_geometry(mask: &Mask, detection: u8) -> Option<(f64, f64, f64)> {
    let mut min_x = u32::MAX;
    let mut min_y = u32::MAX;
    let mut max_x = 0u32;
    let mut max_y = 0u32;
    let mut sum_x = 0.0f64;
    let mut sum_y = 0.0f64;
    let mut count = 0u64;

    for (x, y, pixel) in mask.image().enumerate_pixels() {
        if pixel.0[0] == detection {
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);
            sum_x += x as f64;
            sum_y += y as f64;
            count += 1;
        }
    }
    if count == 0 {
        return None;
    }

    let cx = sum_x / count as f64;
    let cy = sum_y / count as f64;
    let corners = [
        (min_x as f64, min_y as f64),
        (max_x as f64, min_y as f64),
        (min_x as f64, max_y as f64),
        (max_x as f64, max_y as f64),
    ];
    let max_dist = corners
        .iter()
        .map(|&(x, y)| ((x - cx).powi(2) + (y - cy).powi(2)).sqrt())
        .fold(1.0f64, f64::max);
    Some((cx, cy, max_dist))
}

fn luminance(rgb: [f64; 3]) -> f64 {
    0.299 * rgb[0] + 0.587 * rgb[1] + 0.114 * rgb[2]
}

fn rgb_to_hsl(rgb: [f64; 3]) -> (f64, f64, f64) {
    let r = rgb[0] / 255.0;
    let g = rgb[1] / 255.0;
    let b = rgb[2] / 255.0;
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let l = (max + min) / 2.0;

    if max == min {
        return (0.0, 0.0, l);
    }
    let d = max - min;
    let s = if l > 0.5 {
        d / (2.0 - max - min)
    } else {
        d / (max + min)
    };
    let h = hue_from_channels(r, g, b, max, d);
    (h, s, l)
}

fn hsl_to_rgb(h: f64, s: f64, l: f64) -> [f64; 3] {
    if s == 0.0 {
        return [l * 255.0; 3];
    }
    let q = if l < 0.5 { l * (1.0 + s) } else { l + s - l * s };
    let p = 2.0 * l - q;
    let h = h / 360.0;
    [
        hue_to_channel(p, q, h + 1.0 / 3.0) * 255.0,
        hue_to_channel(p, q, h) * 255.0,
        hue_to_channel(p, q, h - 1.0 / 3.0) * 255.0,
    ]
}

fn hue_to_channel(p: f64, q: f64, t: f64) -> f64 {
    let t = t.rem_euclid(1.0);
    if t < 1.0 / 6.0 {
        p + (q - p) * 6.0 * t
    } else if t < 0.5 {
        q
    } else if t < 2.0 / 3.0 {
        p + (q - p) * (2.0 / 3.0 - t) * 6.0
    } else {
        p
    }
}

fn rgb_to_hsv(rgb: [f64; 3]) -> (f64, f64, f64) {
    let r = rgb[0] / 255.0;
    let g = rgb[1] / 255.0;
    let b = rgb[2] / 255.0;
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let d = max - min;

    let h = if d == 0.0 {
        0.0
    } else {
        hue_from_channels(r, g, b, max, d)
    };
    let s = if max == 0.0 { 0.0 } else { d / max };
    (h, s, max)
}

fn hsv_to_rgb(h: f64, s: f64, v: f64) -> [f64; 3] {
    let c = v * s;
    let x = c * (1.0 - ((h / 60.0).rem_euclid(2.0) - 1.0).abs());
    let m = v - c;
    let (r, g, b) = match h {
        h if h < 60.0 => (c, x, 0.0),
        h if h < 120.0 => (x, c, 0.0),
        h if h < 180.0 => (0.0, c, x),
        h if h < 240.0 => (0.0, x, c),
        h if h < 300.0 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };
    [(r + m) * 255.0, (g + m) * 255.0, (b + m) * 255.0]
}

fn hue_from_channels(r: f64, g: f64, b: f64, max: f64, d: f64) -> f64 {
    let h = if max == r {
        (g - b) / d + if g < b { 6.0 } else { 0.0 }
    } else if max == g {
        (b - r) / d + 2.0
    } else {
        (r - g) / d + 4.0
    };
    h * 60.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma, Rgba, RgbaImage};

    fn full_mask(w: u32, h: u32) -> Mask {
        Mask::new(GrayImage::from_pixel(w, h, Luma([255])))
    }

    fn half_mask(w: u32, h: u32) -> Mask {
        let mut image = GrayImage::new(w, h);
        for y in 0..h {
            for x in 0..w / 2 {
                image.put_pixel(x, y, Luma([255]));
            }
        }
        Mask::new(image)
    }

    #[test]
    fn test_factor_one_reproduces_shaded_color() {
        let mut frame = Frame::new(RgbaImage::from_pixel(2, 2, Rgba([120, 120, 120, 255])));
        let settings = ColorSettings {
            color: Some("#ff0000".to_string()),
            factor: 1.0,
            ..Default::default()
        };
        change_color(&mut frame, &full_mask(2, 2), &settings).unwrap();

        // intensity = 120/255, base = 255 * intensity = 120
        assert_eq!(frame.image().get_pixel(0, 0).0, [120, 0, 0, 255]);
    }

    #[test]
    fn test_factor_two_is_flat_color() {
        let mut frame = Frame::new(RgbaImage::from_pixel(2, 2, Rgba([3, 77, 200, 255])));
        let settings = ColorSettings {
            color: Some("#336699".to_string()),
            factor: 2.0,
            ..Default::default()
        };
        change_color(&mut frame, &full_mask(2, 2), &settings).unwrap();

        assert_eq!(frame.image().get_pixel(1, 1).0, [0x33, 0x66, 0x99, 255]);
    }

    #[test]
    fn test_unmasked_pixels_untouched() {
        let mut frame = Frame::new(RgbaImage::from_pixel(4, 2, Rgba([50, 60, 70, 255])));
        let settings = ColorSettings {
            color: Some("#ffffff".to_string()),
            factor: 2.0,
            ..Default::default()
        };
        change_color(&mut frame, &half_mask(4, 2), &settings).unwrap();

        assert_eq!(frame.image().get_pixel(0, 0).0, [255, 255, 255, 255]);
        assert_eq!(frame.image().get_pixel(3, 0).0, [50, 60, 70, 255]);
    }

    #[test]
    fn test_exposure_doubles_channels() {
        let mut frame = Frame::new(RgbaImage::from_pixel(2, 2, Rgba([40, 80, 200, 255])));
        let settings = ColorSettings {
            exposure: 1.0,
            ..Default::default()
        };
        change_color(&mut frame, &full_mask(2, 2), &settings).unwrap();

        assert_eq!(frame.image().get_pixel(0, 0).0, [80, 160, 255, 255]);
    }

    #[test]
    fn test_contrast_pushes_away_from_midgray() {
        let mut frame = Frame::new(RgbaImage::from_pixel(2, 2, Rgba([100, 100, 100, 255])));
        let settings = ColorSettings {
            contrast: 1.0,
            ..Default::default()
        };
        change_color(&mut frame, &full_mask(2, 2), &settings).unwrap();

        // (100/255 - 0.5) * 2 + 0.5 = 0.2843 -> 72 or 73 after rounding
        let v = frame.image().get_pixel(0, 0).0[0];
        assert!((72..=73).contains(&v), "got {}", v);
    }

    #[test]
    fn test_hue_rotation_180_swaps_red_to_cyan() {
        let mut frame = Frame::new(RgbaImage::from_pixel(1, 1, Rgba([255, 0, 0, 255])));
        let settings = ColorSettings {
            hue: 180.0,
            ..Default::default()
        };
        change_color(&mut frame, &full_mask(1, 1), &settings).unwrap();

        let p = frame.image().get_pixel(0, 0).0;
        assert_eq!(p[0], 0);
        assert_eq!(p[1], 255);
        assert_eq!(p[2], 255);
    }

    #[test]
    fn test_noise_is_deterministic() {
        let make = || {
            let mut frame = Frame::new(RgbaImage::from_pixel(4, 4, Rgba([128, 128, 128, 255])));
            let settings = ColorSettings {
                noise: 0.8,
                noise_seed: 42,
                ..Default::default()
            };
            change_color(&mut frame, &full_mask(4, 4), &settings).unwrap();
            frame
        };
        assert_eq!(make(), make());
    }

    #[test]
    fn test_vignette_darkens_edges_more_than_center() {
        let mut frame = Frame::new(RgbaImage::from_pixel(16, 16, Rgba([200, 200, 200, 255])));
        let settings = ColorSettings {
            vignette: 1.0,
            ..Default::default()
        };
        change_color(&mut frame, &full_mask(16, 16), &settings).unwrap();

        let center = frame.image().get_pixel(8, 8).0[0];
        let corner = frame.image().get_pixel(0, 0).0[0];
        assert!(corner < center);
        // Floor keeps the corner from going fully black
        assert!(corner >= (200.0 * 0.2) as u8);
    }

    #[test]
    fn test_hsl_round_trip() {
        for rgb in [[255.0, 0.0, 0.0], [12.0, 200.0, 33.0], [128.0, 128.0, 128.0]] {
            let (h, s, l) = rgb_to_hsl(rgb);
            let back = hsl_to_rgb(h, s, l);
            for c in 0..3 {
                assert!((back[c] - rgb[c]).abs() < 0.5, "{:?} -> {:?}", rgb, back);
            }
        }
    }
}
