use std::path::Path;

use tracing::{debug, info, warn};

use crate::compositor::layer::{Layer, RenderState};
use crate::compositor::transform::{
    apply_opacity, blend_onto, crop_to_roi, rotate_with_bounds, round_corners,
};
use crate::compositor::writer::FfmpegWriter;
use crate::compositor::{FrameContext, FrameHook, FrameSink};
use crate::error::{RenderError, Result};
use crate::geometry::Rect;
use crate::source::Frame;

/// Fixed output canvas parameters.
#[derive(Debug, Clone, Copy)]
pub struct OutputParams {
    pub width: u32,
    pub height: u32,
    /// Output frame rate; defaults to the maximum source frame rate among
    /// drawable layers when absent.
    pub fps: Option<f64>,
    /// How many frames between progress callbacks.
    pub progress_interval: u64,
}

impl OutputParams {
    pub fn new(width: u32, height: u32, fps: Option<f64>) -> Self {
        Self {
            width,
            height,
            fps,
            progress_interval: 30,
        }
    }
}

/// The compositing engine: walks output frame indices in order, resolves
/// each layer's local frame, applies transforms and hooks, and alpha-blends
/// layers onto a shared canvas in ascending layer-index order.
pub struct Compositor {
    params: OutputParams,
    layers: Vec<Layer>,
}

impl Compositor {
    pub fn new(params: OutputParams) -> Self {
        Self {
            params,
            layers: Vec::new(),
        }
    }

    pub fn add_layer(&mut self, layer: Layer) {
        self.layers.push(layer);
    }

    /// Render every output frame into the sink. Consumes the compositor;
    /// source handles are released when the render states drop, whether the
    /// render finishes or fails.
    pub fn render(
        self,
        sink: &mut dyn FrameSink,
        hook: &mut dyn FrameHook,
        mut progress: Option<&mut dyn FnMut(f64)>,
    ) -> Result<()> {
        let params = self.params;
        let mut layers = self.layers;
        layers.sort_by_key(|l| l.index);

        if !layers.iter().any(|l| l.draw) {
            return Err(RenderError::NoDrawableLayers.into());
        }

        let fallback_fps = params.fps.unwrap_or(30.0);
        let mut states = Vec::with_capacity(layers.len());
        for layer in layers {
            // Drops already-opened sources if any later open fails
            states.push(RenderState::open(layer, fallback_fps)?);
        }

        let fps = params.fps.unwrap_or_else(|| {
            let max_source = states
                .iter()
                .filter(|s| s.layer.draw)
                .map(|s| s.source.frame_rate())
                .fold(0.0f64, f64::max);
            if max_source > 0.0 {
                max_source
            } else {
                30.0
            }
        });

        let max_duration = states
            .iter()
            .filter(|s| s.layer.draw)
            .map(|s| s.layer.effective_duration(s.source.duration()))
            .fold(0.0f64, f64::max);
        // Same float-noise guard as the per-frame index math: a duration
        // that is an exact frame count must not lose its last frame
        let total_frames = (max_duration * fps + 1e-6) as u64;

        if total_frames == 0 {
            return Err(RenderError::InvalidParameters {
                details: "composition has zero duration".to_string(),
            }
            .into());
        }

        info!(
            "Rendering {} frames at {}x{} @ {:.2} fps ({} layers)",
            total_frames,
            params.width,
            params.height,
            fps,
            states.len()
        );
        sink.start(params.width, params.height, fps)?;

        for frame_number in 0..total_frames {
            let global_time = frame_number as f64 / fps;
            let mut canvas = Frame::black(params.width, params.height);

            for i in 0..states.len() {
                apply_layer(&mut canvas, i, &mut states, hook, global_time, fps, &params)?;
            }

            sink.write_frame(&canvas)?;

            if let Some(cb) = progress.as_deref_mut() {
                if frame_number % params.progress_interval.max(1) == 0
                    || frame_number + 1 == total_frames
                {
                    cb(((frame_number + 1) as f64 / total_frames as f64) * 100.0);
                }
            }
        }

        sink.finish()?;
        info!("Render complete: {} frames", total_frames);
        Ok(())
    }

    /// Override how many frames pass between progress callbacks.
    pub fn set_progress_interval(&mut self, frames: u64) {
        self.params.progress_interval = frames.max(1);
    }

    /// Render to a video file, encoding through ffmpeg.
    pub fn render_to_file<P: AsRef<Path>>(
        self,
        path: P,
        hook: &mut dyn FrameHook,
        progress: Option<&mut dyn FnMut(f64)>,
    ) -> Result<()> {
        let mut writer = FfmpegWriter::new(path.as_ref());
        self.render(&mut writer, hook, progress)
    }
}

/// Resolve, transform and blend one layer into the canvas for one frame.
fn apply_layer(
    canvas: &mut Frame,
    i: usize,
    states: &mut [RenderState],
    hook: &mut dyn FrameHook,
    global_time: f64,
    fps: f64,
    params: &OutputParams,
) -> Result<()> {
    let (frame_index, local_time) = {
        let state = &states[i];
        let duration = state.source.duration();
        if !state.layer.is_visible_at(global_time, duration) {
            return Ok(());
        }
        let local_time = state.layer.local_time(global_time);
        // Small epsilon keeps float noise from knocking an exact frame
        // boundary down by one
        let frame_index = (local_time * state.source.frame_rate() + 1e-6).max(0.0) as u64;
        (frame_index, local_time)
    };

    let mut frame = match states[i].frame_at(frame_index) {
        Ok(Some(frame)) => frame,
        Ok(None) => return Ok(()),
        Err(e) => {
            // A short or damaged source mid-range means the layer is just
            // not visible this frame
            warn!("Layer {} frame {} fetch failed: {}", i, frame_index, e);
            return Ok(());
        }
    };

    let mut ctx = FrameContext {
        layer_index: i,
        frame_index,
        global_time,
        local_time,
        output_fps: fps,
        canvas_width: params.width,
        canvas_height: params.height,
        roi: None,
    };

    if !hook.pre_transform(&mut frame, &ctx, states)? {
        debug!("Layer {} aborted by pre-transform hook", i);
        return Ok(());
    }

    // The hook may have rewritten the rectangle; read placement now
    let (mut draw_x, mut draw_y, corner_radius, rotation) = {
        let layer = &states[i].layer;
        (
            layer.rect.x,
            layer.rect.y,
            layer.corner_radius,
            layer.rotation_degrees,
        )
    };

    round_corners(&mut frame, corner_radius);

    if rotation != 0.0 {
        let (rotated, shift_x, shift_y) = rotate_with_bounds(&frame, rotation);
        frame = rotated;
        draw_x -= shift_x;
        draw_y -= shift_y;
    }

    let placement = Rect::new(draw_x, draw_y, frame.width(), frame.height());
    let Some(roi) = placement.clip_to_canvas(params.width, params.height) else {
        return Ok(());
    };

    let mut sub_frame = crop_to_roi(&frame, &roi);
    ctx.roi = Some(roi);

    if !hook.post_transform(&mut sub_frame, &ctx, states)? {
        debug!("Layer {} aborted by post-transform hook", i);
        return Ok(());
    }

    apply_opacity(&mut sub_frame, states[i].effective_opacity());
    blend_onto(canvas, &sub_frame, &roi);
    Ok(())
}
