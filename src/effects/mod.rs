//! Mask-indexed effects applied through the render loop's hook stages.
//!
//! Pre-transform order per layer per frame: chroma key, background slots
//! (cut / color / blend over the inverted union of object masks), each
//! tracked object (background replacement, cut, color, blend), occlusion
//! tracking, then animations. Post-transform handles back-type occlusion
//! only.

pub mod chroma;
pub mod color;
pub mod config;
pub mod overlap;
pub mod pipeline;
pub mod replace;

pub use config::{
    AnimationSpec, BackgroundRemoveSettings, BlendSettings, ChromaKeySettings, ColorSettings,
    CutObjectSettings, EffectConfig, EffectSet, EffectTarget, MotionPoint, OverlapKind,
    OverlapSettings, PixelPosition,
};
pub use pipeline::EffectsPipeline;
