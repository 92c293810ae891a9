//! Object masks.
//!
//! A [`Mask`] is a single-channel image where a pixel value marks membership
//! of a tracked object. Masks arrive per frame per object id and are always
//! resized to the working frame size immediately before being combined with
//! pixels; a dimension mismatch is never an error.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use image::imageops::{self, FilterType};
use image::GrayImage;
use tracing::{debug, warn};

use crate::error::{ConfigError, Result};

/// Threshold used to binarize resized masks. Interpolation smears edge
/// values; only near-white pixels count as foreground.
pub const BINARY_THRESHOLD: u8 = 254;

/// Mask map for one layer: frame index to object id to mask.
///
/// Object ids are ordered so per-object effect application is deterministic.
pub type MaskMap = HashMap<u64, BTreeMap<i64, Mask>>;

/// Single-channel object mask.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mask {
    image: GrayImage,
}

impl Mask {
    pub fn new(image: GrayImage) -> Self {
        Self { image }
    }

    /// All-zero mask of the given size.
    pub fn empty(width: u32, height: u32) -> Self {
        Self {
            image: GrayImage::new(width, height),
        }
    }

    /// All-white mask of the given size.
    pub fn full(width: u32, height: u32) -> Self {
        Self {
            image: GrayImage::from_pixel(width, height, image::Luma([255])),
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn image(&self) -> &GrayImage {
        &self.image
    }

    /// Raw value at (x, y).
    pub fn get(&self, x: u32, y: u32) -> u8 {
        self.image.get_pixel(x, y).0[0]
    }

    /// True if the pixel survives binarization.
    pub fn is_set(&self, x: u32, y: u32) -> bool {
        self.get(x, y) > BINARY_THRESHOLD
    }

    /// Resize to the given dimensions with nearest-neighbor sampling, which
    /// keeps mask values near 0/255.
    pub fn resized(&self, width: u32, height: u32) -> Self {
        if self.width() == width && self.height() == height {
            return self.clone();
        }
        Self {
            image: imageops::resize(&self.image, width, height, FilterType::Nearest),
        }
    }

    /// Horizontal mirror, matching a flipped layer frame.
    pub fn flipped_horizontal(&self) -> Self {
        Self {
            image: imageops::flip_horizontal(&self.image),
        }
    }

    /// Clamp every pixel to exactly 0 or 255 at the binarization threshold.
    pub fn binarized(&self) -> Self {
        let mut image = self.image.clone();
        for pixel in image.pixels_mut() {
            pixel.0[0] = if pixel.0[0] > BINARY_THRESHOLD { 255 } else { 0 };
        }
        Self { image }
    }

    /// Invert: 255 becomes 0 and vice versa.
    pub fn inverted(&self) -> Self {
        let mut image = self.image.clone();
        for pixel in image.pixels_mut() {
            pixel.0[0] = 255 - pixel.0[0];
        }
        Self { image }
    }

    /// Pixelwise maximum of two masks. The other mask is resized to this
    /// mask's dimensions first.
    pub fn union(&self, other: &Mask) -> Self {
        let other = other.resized(self.width(), self.height());
        let mut image = self.image.clone();
        for (dst, src) in image.pixels_mut().zip(other.image.pixels()) {
            dst.0[0] = dst.0[0].max(src.0[0]);
        }
        Self { image }
    }

    /// Morphological dilation with a disk structuring element.
    ///
    /// Grows the foreground to absorb edge bleed before background
    /// replacement.
    pub fn dilated(&self, radius: u32) -> Self {
        if radius == 0 {
            return self.clone();
        }
        let (w, h) = (self.width() as i64, self.height() as i64);
        let r = radius as i64;

        // Precompute disk offsets once
        let mut offsets = Vec::new();
        for dy in -r..=r {
            for dx in -r..=r {
                if dx * dx + dy * dy <= r * r {
                    offsets.push((dx, dy));
                }
            }
        }

        let mut out = GrayImage::new(self.width(), self.height());
        for y in 0..h {
            for x in 0..w {
                let mut max = 0u8;
                for &(dx, dy) in &offsets {
                    let (sx, sy) = (x + dx, y + dy);
                    if sx >= 0 && sx < w && sy >= 0 && sy < h {
                        max = max.max(self.image.get_pixel(sx as u32, sy as u32).0[0]);
                        if max == 255 {
                            break;
                        }
                    }
                }
                out.put_pixel(x as u32, y as u32, image::Luma([max]));
            }
        }
        Self { image: out }
    }

    /// True if any pixel is foreground in both masks after binarization.
    /// The other mask is resized to match first.
    pub fn overlaps(&self, other: &Mask) -> bool {
        let other = other.resized(self.width(), self.height());
        self.image
            .pixels()
            .zip(other.image.pixels())
            .any(|(a, b)| a.0[0] > BINARY_THRESHOLD && b.0[0] > BINARY_THRESHOLD)
    }

    /// Centroid of the binarized foreground, or `None` for an empty mask.
    pub fn centroid(&self) -> Option<(f64, f64)> {
        let mut sum_x = 0.0f64;
        let mut sum_y = 0.0f64;
        let mut count = 0u64;
        for (x, y, pixel) in self.image.enumerate_pixels() {
            if pixel.0[0] > BINARY_THRESHOLD {
                sum_x += x as f64;
                sum_y += y as f64;
                count += 1;
            }
        }
        if count == 0 {
            None
        } else {
            Some((sum_x / count as f64, sum_y / count as f64))
        }
    }

    /// Rotate about the center by `degrees`, keeping the original dimensions
    /// and filling uncovered pixels with zero.
    ///
    /// Used by the back-occlusion punch, where the mask must stay aligned
    /// with the reference layer's unrotated rectangle.
    pub fn rotated(&self, degrees: f64) -> Self {
        if degrees == 0.0 {
            return self.clone();
        }
        let (w, h) = (self.width(), self.height());
        let (cx, cy) = (w as f64 / 2.0, h as f64 / 2.0);
        let theta = degrees.to_radians();
        let (sin, cos) = (theta.sin(), theta.cos());

        let mut out = GrayImage::new(w, h);
        for y in 0..h {
            for x in 0..w {
                // Inverse-map the destination pixel into the source
                let dx = x as f64 + 0.5 - cx;
                let dy = y as f64 + 0.5 - cy;
                let sx = cos * dx + sin * dy + cx - 0.5;
                let sy = -sin * dx + cos * dy + cy - 0.5;
                let (sx, sy) = (sx.round() as i64, sy.round() as i64);
                if sx >= 0 && sx < w as i64 && sy >= 0 && sy < h as i64 {
                    out.put_pixel(x, y, *self.image.get_pixel(sx as u32, sy as u32));
                }
            }
        }
        Self { image: out }
    }
}

/// Load a layer's whole mask map from a directory of single-channel PNGs
/// named `frame_{index}_obj_{id}.png`.
///
/// Files that do not match the naming pattern are ignored with a warning.
pub fn load_mask_map<P: AsRef<Path>>(dir: P) -> Result<MaskMap> {
    let dir = dir.as_ref();
    let mut map = MaskMap::new();

    let entries = std::fs::read_dir(dir).map_err(|_| ConfigError::FileNotFound {
        path: dir.display().to_string(),
    })?;

    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        if path.extension().and_then(|e| e.to_str()) != Some("png") {
            continue;
        }

        let Some((frame_index, object_id)) = parse_mask_name(name) else {
            warn!("Ignoring unrecognized mask file: {}", path.display());
            continue;
        };

        let image = image::open(&path)
            .map_err(|e| {
                ConfigError::ParseFailed {
                    path: format!("{}: {}", path.display(), e),
                }
            })?
            .to_luma8();

        map.entry(frame_index)
            .or_default()
            .insert(object_id, Mask::new(image));
    }

    debug!("Loaded masks for {} frames from {}", map.len(), dir.display());
    Ok(map)
}

fn parse_mask_name(stem: &str) -> Option<(u64, i64)> {
    let rest = stem.strip_prefix("frame_")?;
    let (frame, obj) = rest.split_once("_obj_")?;
    Some((frame.parse().ok()?, obj.parse().ok()?))
}
