//! # Mask-Compositor
//!
//! Frame-accurate multi-layer video compositing with mask-driven effects.
//!
//! This library composites multiple timed visual layers (decoded video or
//! in-memory frame sequences) into a single output video, applying per-layer
//! geometric transforms, mask-indexed effects (cut-outs, recoloring, chroma
//! key, background replacement, cross-layer occlusion) and opacity/position
//! animation, frame by frame with exact timing semantics.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use mask_compositor::{
//!     compositor::{Compositor, Layer, LayerSource, OutputParams},
//!     effects::EffectsPipeline,
//!     geometry::Rect,
//! };
//!
//! # fn main() -> anyhow::Result<()> {
//! let mut compositor = Compositor::new(OutputParams::new(1280, 720, Some(30.0)));
//! compositor.add_layer(Layer::new(
//!     LayerSource::Video("clip.mp4".into()),
//!     Rect::new(0, 0, 1280, 720),
//!     0,
//! ));
//!
//! let mut effects = EffectsPipeline::new(true);
//! compositor.render_to_file("output.mp4", &mut effects, None)?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`source`] - Frame sources (decoded video, in-memory sequences)
//! - [`compositor`] - Layer model and the frame-synchronous render loop
//! - [`effects`] - Mask-indexed effects pipeline hooked into the loop
//! - [`animation`] - Opacity fades and keyframe motion
//! - [`project`] - JSON render-job model consumed by the CLI
//!
//! ## Hooking into the render loop
//!
//! The compositor itself knows nothing about effects. It exposes two hook
//! points per layer per frame through the [`FrameHook`](compositor::FrameHook)
//! trait: one before the geometric transform (pixels and layer rectangle may
//! still be rewritten) and one after clipping (final canvas placement is
//! known). [`EffectsPipeline`](effects::EffectsPipeline) is the stock
//! implementation; custom hooks only need the trait.

pub mod animation;
pub mod compositor;
pub mod config;
pub mod effects;
pub mod error;
pub mod geometry;
pub mod mask;
pub mod project;
pub mod source;
pub mod stage;

// Re-export commonly used types for convenience
pub use crate::{
    compositor::{Compositor, FrameHook, Layer, LayerSource, OutputParams},
    config::Config,
    effects::EffectsPipeline,
    error::{CompositorError, Result},
    geometry::{Rect, Roi},
    mask::Mask,
    source::{Frame, FrameSource},
};
