use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{EffectError, Result};

/// What an effect set is attached to.
///
/// The configuration format mixes reserved sentinel keys with real object
/// ids in one mapping; they are resolved into this tagged form once, when
/// the configuration is parsed, and never compared as raw integers again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EffectTarget {
    /// Everything not covered by any tracked object mask (key `-1`).
    Background,
    /// Second effect slot over the same background mask (key `-3`).
    SecondaryBackground,
    /// The single cross-layer occlusion record (key `-2`).
    Occlusion,
    /// One tracked object.
    Object(i64),
}

impl EffectTarget {
    /// Resolve a raw configuration key.
    pub fn parse(key: &str) -> Result<Self> {
        match key.parse::<i64>() {
            Ok(-1) => Ok(Self::Background),
            Ok(-2) => Ok(Self::Occlusion),
            Ok(-3) => Ok(Self::SecondaryBackground),
            Ok(id) if id >= 0 => Ok(Self::Object(id)),
            _ => Err(EffectError::InvalidTarget {
                key: key.to_string(),
            }
            .into()),
        }
    }
}

/// Effects configured for one target on one layer.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EffectSet {
    pub cut_object_effect: Option<CutObjectSettings>,
    pub color_effect: Option<ColorSettings>,
    pub blend_effect: Option<BlendSettings>,
    pub background_remove_effect: Option<BackgroundRemoveSettings>,
    pub overlap_video: Option<OverlapSettings>,
}

/// Per-layer effect configuration: target to effect set.
pub type EffectConfig = HashMap<EffectTarget, EffectSet>;

/// Zero alpha where the mask matches the detection polarity.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CutObjectSettings {
    /// 255 cuts the masked region; 0 cuts everything else.
    pub detection: u8,
}

impl Default for CutObjectSettings {
    fn default() -> Self {
        Self { detection: 255 }
    }
}

/// Recolor and color-grade the masked region.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ColorSettings {
    /// Solid color as `#RRGGBB`; absent means grade only.
    pub color: Option<String>,
    /// Solid-color mix factor in `[0, 2]`: 1 keeps shading, 2 goes flat.
    pub factor: f64,
    /// Gaussian blur radius; kernel size is `2 * radius + 1`.
    pub blur: Option<u32>,
    /// Mask value that selects pixels to touch.
    pub detection: u8,
    pub exposure: f64,
    pub brightness: f64,
    pub contrast: f64,
    /// Hue rotation in degrees.
    pub hue: f64,
    /// Saturation multiplier exponent; 1 is a no-op.
    pub saturation: f64,
    pub sharpen: f64,
    pub noise: f64,
    pub noise_seed: u32,
    pub vignette: f64,
}

impl Default for ColorSettings {
    fn default() -> Self {
        Self {
            color: None,
            factor: 1.0,
            blur: None,
            detection: 255,
            exposure: 0.0,
            brightness: 0.0,
            contrast: 0.0,
            hue: 0.0,
            saturation: 1.0,
            sharpen: 0.0,
            noise: 0.0,
            noise_seed: 0,
            vignette: 0.0,
        }
    }
}

impl ColorSettings {
    /// True when the secondary grading chain has anything to do.
    pub fn has_grading(&self) -> bool {
        self.exposure != 0.0
            || self.brightness != 0.0
            || self.contrast != 0.0
            || self.hue != 0.0
            || self.saturation != 1.0
            || self.sharpen != 0.0
            || self.noise != 0.0
            || self.vignette != 0.0
    }
}

/// Copy pixels from a reference layer's frame where the mask matches.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BlendSettings {
    /// Stable index of the reference layer.
    pub layer: i64,
    /// Mask value that selects pixels to copy.
    #[serde(default = "default_detection")]
    pub detection: u8,
}

/// Erase the object by temporal background replacement.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BackgroundRemoveSettings {
    /// Dilation radius absorbing mask edge bleed.
    pub radius: u32,
}

impl Default for BackgroundRemoveSettings {
    fn default() -> Self {
        Self { radius: 15 }
    }
}

/// Track a reference layer's masked object, and optionally pass behind it.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OverlapSettings {
    /// Stable index of the layer whose mask is followed.
    pub layer: i64,
    /// Tracked object id in the reference layer's mask map.
    pub object: i64,
    #[serde(rename = "type", default)]
    pub kind: OverlapKind,
}

/// Whether the overlay rides in front of the tracked object or is occluded
/// by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OverlapKind {
    #[default]
    Front,
    Back,
}

/// Chroma key configuration for a layer.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChromaKeySettings {
    /// Fixed target color as `#RRGGBB`; takes precedence over `position`.
    #[serde(default)]
    pub color: Option<String>,
    /// Sample the target color from this pixel of the current frame.
    #[serde(default)]
    pub position: Option<PixelPosition>,
    /// Color distance below which a pixel turns transparent.
    pub tolerance: f64,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct PixelPosition {
    pub x: i64,
    pub y: i64,
}

/// One animation attached to a layer.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "name", rename_all = "camelCase")]
pub enum AnimationSpec {
    FadeIn {
        #[serde(default)]
        start: Option<f64>,
        duration: f64,
    },
    FadeOut {
        #[serde(default)]
        start: Option<f64>,
        duration: f64,
    },
    Motion { points: Vec<MotionPoint> },
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct MotionPoint {
    pub x: i64,
    pub y: i64,
    pub time: f64,
}

fn default_detection() -> u8 {
    255
}

/// Parse a `#RRGGBB` (or `RRGGBB`) hex color.
pub fn parse_hex_color(value: &str) -> Result<[u8; 3]> {
    let hex = value.strip_prefix('#').unwrap_or(value);
    if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(EffectError::InvalidColor {
            value: value.to_string(),
        }
        .into());
    }
    let parse = |s: &str| u8::from_str_radix(s, 16);
    match (parse(&hex[0..2]), parse(&hex[2..4]), parse(&hex[4..6])) {
        (Ok(r), Ok(g), Ok(b)) => Ok([r, g, b]),
        _ => Err(EffectError::InvalidColor {
            value: value.to_string(),
        }
        .into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_parsing() {
        assert_eq!(EffectTarget::parse("-1").unwrap(), EffectTarget::Background);
        assert_eq!(EffectTarget::parse("-2").unwrap(), EffectTarget::Occlusion);
        assert_eq!(
            EffectTarget::parse("-3").unwrap(),
            EffectTarget::SecondaryBackground
        );
        assert_eq!(EffectTarget::parse("7").unwrap(), EffectTarget::Object(7));
        assert!(EffectTarget::parse("-9").is_err());
        assert!(EffectTarget::parse("cat").is_err());
    }

    #[test]
    fn test_hex_color_parsing() {
        assert_eq!(parse_hex_color("#ff8000").unwrap(), [255, 128, 0]);
        assert_eq!(parse_hex_color("00FF00").unwrap(), [0, 255, 0]);
        assert!(parse_hex_color("#12345").is_err());
        assert!(parse_hex_color("#zzzzzz").is_err());
    }

    #[test]
    fn test_effect_set_json_names() {
        let json = r##"{
            "cutObjectEffect": { "detection": 0 },
            "colorEffect": { "color": "#102030", "factor": 2.0 },
            "overlapVideo": { "layer": 3, "object": 1, "type": "back" }
        }"##;
        let set: EffectSet = serde_json::from_str(json).unwrap();

        assert_eq!(set.cut_object_effect.unwrap().detection, 0);
        let color = set.color_effect.unwrap();
        assert_eq!(color.color.as_deref(), Some("#102030"));
        assert!((color.factor - 2.0).abs() < 1e-9);
        assert_eq!(set.overlap_video.unwrap().kind, OverlapKind::Back);
        assert!(set.blend_effect.is_none());
    }

    #[test]
    fn test_animation_spec_json() {
        let json = r#"[
            { "name": "fadeIn", "duration": 1.0 },
            { "name": "fadeOut", "start": 4.0, "duration": 0.5 },
            { "name": "motion", "points": [ { "x": 0, "y": 0, "time": 0.0 } ] }
        ]"#;
        let specs: Vec<AnimationSpec> = serde_json::from_str(json).unwrap();
        assert_eq!(specs.len(), 3);
        assert!(matches!(specs[0], AnimationSpec::FadeIn { start: None, .. }));
    }
}
