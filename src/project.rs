//! Render-job model.
//!
//! A project is a JSON document describing the output canvas and every
//! layer with its timing, placement, masks, effects and animations. The CLI
//! loads one and builds the compositor and effects pipeline from it.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{info, warn};

use crate::compositor::{Compositor, Layer, LayerSource, OutputParams};
use crate::effects::config::{AnimationSpec, ChromaKeySettings, EffectConfig, EffectSet, EffectTarget};
use crate::effects::EffectsPipeline;
use crate::error::{ConfigError, Result};
use crate::geometry::Rect;
use crate::mask::load_mask_map;

#[derive(Debug, Deserialize)]
pub struct Project {
    pub output: ProjectOutput,
    pub layers: Vec<ProjectLayer>,
}

#[derive(Debug, Deserialize)]
pub struct ProjectOutput {
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub fps: Option<f64>,
}

/// One layer as described in the project document.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProjectLayer {
    /// Path to a video file; exactly one of `video` / `image` must be set.
    #[serde(default)]
    pub video: Option<PathBuf>,
    #[serde(default)]
    pub image: Option<ImageInput>,

    pub index: i64,
    pub x: i64,
    pub y: i64,
    pub width: u32,
    pub height: u32,

    #[serde(default)]
    pub start_offset: f64,
    #[serde(default)]
    pub trim_start: f64,
    #[serde(default)]
    pub trim_end: Option<f64>,
    #[serde(default)]
    pub rotation: f64,
    #[serde(default = "default_speed")]
    pub speed: f64,
    #[serde(default)]
    pub flipped: bool,
    #[serde(default = "default_true")]
    pub draw: bool,
    #[serde(default = "default_opacity")]
    pub opacity: f64,
    #[serde(default)]
    pub corner_radius: u32,

    /// Directory of `frame_{index}_obj_{id}.png` mask files.
    #[serde(default)]
    pub masks: Option<PathBuf>,
    #[serde(default)]
    pub chroma_key: Option<ChromaKeySettings>,
    /// Raw effect configuration keyed by object id or reserved sentinel.
    #[serde(default)]
    pub effects: Option<HashMap<String, EffectSet>>,
    #[serde(default)]
    pub animations: Vec<AnimationSpec>,
}

#[derive(Debug, Deserialize)]
pub struct ImageInput {
    pub path: PathBuf,
    pub duration: f64,
}

fn default_speed() -> f64 {
    1.0
}

fn default_true() -> bool {
    true
}

fn default_opacity() -> f64 {
    1.0
}

impl Project {
    /// Load and validate a project document.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
            path: path.display().to_string(),
        })?;
        let project: Project =
            serde_json::from_str(&content).map_err(|e| ConfigError::ProjectParseFailed {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
        project.validate()?;
        Ok(project)
    }

    pub fn validate(&self) -> Result<()> {
        if self.output.width == 0 || self.output.height == 0 {
            return Err(ConfigError::InvalidValue {
                key: "output".to_string(),
                value: format!("{}x{}", self.output.width, self.output.height),
            }
            .into());
        }
        if self.layers.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "layers".to_string(),
                value: "empty".to_string(),
            }
            .into());
        }
        for layer in &self.layers {
            if layer.video.is_some() == layer.image.is_some() {
                return Err(ConfigError::InvalidValue {
                    key: format!("layers[{}]", layer.index),
                    value: "exactly one of video or image required".to_string(),
                }
                .into());
            }
            if layer.speed <= 0.0 {
                return Err(ConfigError::InvalidValue {
                    key: format!("layers[{}].speed", layer.index),
                    value: layer.speed.to_string(),
                }
                .into());
            }
        }
        Ok(())
    }

    /// Build the compositor and effects pipeline described by this project.
    pub fn build(&self, enable_transparency: bool) -> Result<(Compositor, EffectsPipeline)> {
        let params = OutputParams::new(self.output.width, self.output.height, self.output.fps);
        let mut compositor = Compositor::new(params);
        let mut pipeline = EffectsPipeline::new(enable_transparency);

        for spec in &self.layers {
            let source = match (&spec.video, &spec.image) {
                (Some(path), None) => LayerSource::Video(path.clone()),
                (None, Some(image)) => LayerSource::Image {
                    path: image.path.clone(),
                    duration: image.duration,
                },
                _ => {
                    return Err(ConfigError::InvalidValue {
                        key: format!("layers[{}]", spec.index),
                        value: "exactly one of video or image required".to_string(),
                    }
                    .into())
                }
            };

            let mut layer = Layer::new(
                source,
                Rect::new(spec.x, spec.y, spec.width, spec.height),
                spec.index,
            );
            layer.start_offset = spec.start_offset;
            layer.trim_start = spec.trim_start;
            layer.trim_end = spec.trim_end;
            layer.rotation_degrees = spec.rotation;
            layer.speed = spec.speed;
            layer.flipped = spec.flipped;
            layer.draw = spec.draw;
            layer.opacity = spec.opacity;
            layer.corner_radius = spec.corner_radius;
            compositor.add_layer(layer);

            if let Some(chroma) = &spec.chroma_key {
                pipeline.set_chroma_key(spec.index, chroma.clone());
            }
            if let Some(raw) = &spec.effects {
                pipeline.set_effects(spec.index, parse_effect_config(raw, spec.index)?);
            }
            if !spec.animations.is_empty() {
                pipeline.set_animations(spec.index, spec.animations.clone());
            }
            if let Some(dir) = &spec.masks {
                pipeline.set_mask_map(spec.index, load_mask_map(dir)?);
            }
        }

        info!(
            "Project: {} layers, {}x{} output",
            self.layers.len(),
            self.output.width,
            self.output.height
        );
        Ok((compositor, pipeline))
    }
}

/// Resolve raw string keys into effect targets once, at parse time.
fn parse_effect_config(raw: &HashMap<String, EffectSet>, layer_index: i64) -> Result<EffectConfig> {
    let mut config = EffectConfig::new();
    for (key, set) in raw {
        match EffectTarget::parse(key) {
            Ok(target) => {
                config.insert(target, set.clone());
            }
            Err(e) => {
                // A bad key disables that entry, not the render
                warn!("Layer {}: {}; entry ignored", layer_index, e);
            }
        }
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_json() -> String {
        r#"{
            "output": { "width": 1280, "height": 720, "fps": 30.0 },
            "layers": [
                {
                    "video": "clip.mp4",
                    "index": 0,
                    "x": 0, "y": 0, "width": 1280, "height": 720
                }
            ]
        }"#
        .to_string()
    }

    #[test]
    fn test_minimal_project_parses_with_defaults() {
        let project: Project = serde_json::from_str(&minimal_json()).unwrap();
        project.validate().unwrap();

        let layer = &project.layers[0];
        assert!((layer.speed - 1.0).abs() < 1e-9);
        assert!((layer.opacity - 1.0).abs() < 1e-9);
        assert!(layer.draw);
        assert!(!layer.flipped);
        assert!(layer.trim_end.is_none());
    }

    #[test]
    fn test_layer_needs_exactly_one_source() {
        let json = r#"{
            "output": { "width": 100, "height": 100 },
            "layers": [
                { "index": 0, "x": 0, "y": 0, "width": 100, "height": 100 }
            ]
        }"#;
        let project: Project = serde_json::from_str(json).unwrap();
        assert!(project.validate().is_err());
    }

    #[test]
    fn test_full_layer_with_effects_and_animations() {
        let json = r##"{
            "output": { "width": 640, "height": 360 },
            "layers": [
                {
                    "video": "a.mp4",
                    "index": 2,
                    "x": 10, "y": 20, "width": 320, "height": 180,
                    "start_offset": 1.5,
                    "trim_start": 0.5,
                    "trim_end": 4.0,
                    "speed": 2.0,
                    "flipped": true,
                    "chroma_key": { "color": "#00ff00", "tolerance": 30.0 },
                    "effects": {
                        "-1": { "colorEffect": { "color": "#333333", "factor": 1.5 } },
                        "1": { "cutObjectEffect": { "detection": 255 } }
                    },
                    "animations": [ { "name": "fadeIn", "duration": 1.0 } ]
                }
            ]
        }"##;
        let project: Project = serde_json::from_str(json).unwrap();
        project.validate().unwrap();

        let raw = project.layers[0].effects.as_ref().unwrap();
        let config = parse_effect_config(raw, 2).unwrap();
        assert!(config.contains_key(&EffectTarget::Background));
        assert!(config.contains_key(&EffectTarget::Object(1)));
    }

    #[test]
    fn test_bad_effect_key_is_ignored_not_fatal() {
        let mut raw = HashMap::new();
        raw.insert("banana".to_string(), EffectSet::default());
        raw.insert("3".to_string(), EffectSet::default());

        let config = parse_effect_config(&raw, 0).unwrap();
        assert_eq!(config.len(), 1);
        assert!(config.contains_key(&EffectTarget::Object(3)));
    }

    #[test]
    fn test_from_file_reports_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("project.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = Project::from_file(&path).unwrap_err();
        assert!(err.to_string().contains("parse project file"));
    }
}
