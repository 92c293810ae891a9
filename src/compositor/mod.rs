//! Layer model and the frame-synchronous render loop.

pub mod engine;
pub mod layer;
pub mod transform;
pub mod writer;

pub use engine::{Compositor, OutputParams};
pub use layer::{Layer, LayerScratch, LayerSource, OpacityOrigin, RenderState};
pub use writer::FfmpegWriter;

use crate::error::Result;
use crate::geometry::Roi;
use crate::source::Frame;

/// Per-layer, per-frame context handed to hooks.
#[derive(Debug, Clone, Copy)]
pub struct FrameContext {
    /// Position of the current layer in the render-state slice.
    pub layer_index: usize,
    /// Resolved source frame index for the current layer.
    pub frame_index: u64,
    /// Global output time in seconds.
    pub global_time: f64,
    /// The current layer's local time in seconds.
    pub local_time: f64,
    /// Output frame rate.
    pub output_fps: f64,
    pub canvas_width: u32,
    pub canvas_height: u32,
    /// Clipped placement, available in the post-transform stage only.
    pub roi: Option<Roi>,
}

/// Two-stage hook contract for the render loop.
///
/// The compositor knows nothing about effects. For every visible layer of
/// every output frame it calls `pre_transform` with the freshly cached frame
/// (pixels and the layer rectangle may still be rewritten) and, after
/// rotation and clipping, `post_transform` with the clipped sub-frame.
/// Returning `Ok(false)` from either stage aborts the layer for this frame.
///
/// Hooks receive the whole render-state slice so cross-layer effects can
/// read a reference layer's frames and masks.
pub trait FrameHook {
    fn pre_transform(
        &mut self,
        frame: &mut Frame,
        ctx: &FrameContext,
        states: &mut [RenderState],
    ) -> Result<bool>;

    fn post_transform(
        &mut self,
        frame: &mut Frame,
        ctx: &FrameContext,
        states: &mut [RenderState],
    ) -> Result<bool>;
}

/// Hook that leaves every frame untouched.
pub struct NoopHook;

impl FrameHook for NoopHook {
    fn pre_transform(
        &mut self,
        _frame: &mut Frame,
        _ctx: &FrameContext,
        _states: &mut [RenderState],
    ) -> Result<bool> {
        Ok(true)
    }

    fn post_transform(
        &mut self,
        _frame: &mut Frame,
        _ctx: &FrameContext,
        _states: &mut [RenderState],
    ) -> Result<bool> {
        Ok(true)
    }
}

/// Destination for composed frames, written strictly in submission order.
pub trait FrameSink {
    /// Called once before the first frame, with the resolved output
    /// parameters.
    fn start(&mut self, _width: u32, _height: u32, _fps: f64) -> Result<()> {
        Ok(())
    }

    fn write_frame(&mut self, frame: &Frame) -> Result<()>;

    /// Flush and close the destination.
    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

/// In-memory sink collecting every composed frame. Used by tests and by
/// callers that post-process frames themselves.
#[derive(Default)]
pub struct FrameBuffer {
    pub frames: Vec<Frame>,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FrameSink for FrameBuffer {
    fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        self.frames.push(frame.clone());
        Ok(())
    }
}
