use std::path::PathBuf;

use image::imageops::{self, FilterType};

use crate::error::Result;
use crate::geometry::Rect;
use crate::source::{ArraySource, Frame, FrameSource, VideoSource};

/// Content behind a layer: a video file on disk, a still image replicated
/// for a duration, or an in-memory frame sequence.
pub enum LayerSource {
    Video(PathBuf),
    Image { path: PathBuf, duration: f64 },
    Frames { frames: Vec<Frame>, frame_rate: f64 },
}

impl LayerSource {
    fn open(&self, fallback_fps: f64) -> Result<Box<dyn FrameSource>> {
        match self {
            Self::Video(path) => Ok(Box::new(VideoSource::open(path)?)),
            Self::Image { path, duration } => Ok(Box::new(ArraySource::from_image_file(
                path,
                fallback_fps,
                *duration,
            )?)),
            Self::Frames { frames, frame_rate } => {
                Ok(Box::new(ArraySource::new(frames.clone(), *frame_rate)?))
            }
        }
    }
}

/// One timed, positioned visual element in the composition.
///
/// Immutable during a render except for `rect`, which animation and
/// occlusion tracking rewrite per frame.
pub struct Layer {
    pub source: LayerSource,
    pub rect: Rect,
    /// Stable paint-order index; layers draw in ascending order.
    pub index: i64,
    /// Seconds of global time before which the layer is invisible.
    pub start_offset: f64,
    /// Local time at which the content starts.
    pub trim_start: f64,
    /// Local time at which the content ends; defaults to source duration.
    pub trim_end: Option<f64>,
    pub rotation_degrees: f64,
    pub speed: f64,
    pub flipped: bool,
    pub draw: bool,
    pub opacity: f64,
    pub corner_radius: u32,
}

impl Layer {
    pub fn new(source: LayerSource, rect: Rect, index: i64) -> Self {
        Self {
            source,
            rect,
            index,
            start_offset: 0.0,
            trim_start: 0.0,
            trim_end: None,
            rotation_degrees: 0.0,
            speed: 1.0,
            flipped: false,
            draw: true,
            opacity: 1.0,
            corner_radius: 0,
        }
    }

    /// Local content time at global time `t`.
    pub fn local_time(&self, t: f64) -> f64 {
        self.trim_start + (t - self.start_offset) * self.speed
    }

    /// Effective end of the trim window given the source duration.
    pub fn trim_end_or(&self, source_duration: f64) -> f64 {
        self.trim_end.unwrap_or(source_duration)
    }

    /// Whether the layer contributes pixels at global time `t`.
    pub fn is_visible_at(&self, t: f64, source_duration: f64) -> bool {
        if !self.draw || t < self.start_offset {
            return false;
        }
        let local = self.local_time(t);
        local >= self.trim_start && local < self.trim_end_or(source_duration)
    }

    /// Total seconds of global time this layer occupies, including its
    /// start offset.
    pub fn effective_duration(&self, source_duration: f64) -> f64 {
        (self.trim_end_or(source_duration) - self.trim_start) / self.speed + self.start_offset
    }

    /// Seconds of visible content, excluding the start offset. The fade-out
    /// default start position is measured against this.
    pub fn content_duration(&self, source_duration: f64) -> f64 {
        (self.trim_end_or(source_duration) - self.trim_start) / self.speed
    }
}

/// Who last set the animated opacity, for conflict resolution between an
/// in-progress ramp and another animation's settled limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpacityOrigin {
    /// Mid-ramp value from an active fade.
    Animation,
    /// Settled value outside a fade's window.
    Limit,
}

/// Per-layer state carried across frames, written only by effects and
/// animation within the single render thread.
#[derive(Default)]
pub struct LayerScratch {
    /// Reference mask centroid from the previous frame, for occlusion
    /// tracking deltas.
    pub prev_centroid: Option<(f64, f64)>,
    /// Opacity authority: which animation last wrote, and how.
    pub opacity_authority: Option<(OpacityOrigin, String)>,
    /// Opacity written by the animation engine; overrides the layer's
    /// static opacity when present.
    pub animated_opacity: Option<f64>,
}

/// Per-layer mutable state for the lifetime of one render: the open source
/// handle and a single-frame decode cache keyed by target frame index.
pub struct RenderState {
    pub layer: Layer,
    pub source: Box<dyn FrameSource>,
    pub scratch: LayerScratch,
    cached_frame: Option<Frame>,
    cached_frame_index: Option<u64>,
}

impl RenderState {
    /// Open the layer's source. Dropping the state releases it.
    pub fn open(layer: Layer, fallback_fps: f64) -> Result<Self> {
        let source = layer.source.open(fallback_fps)?;
        Ok(Self {
            layer,
            source,
            scratch: LayerScratch::default(),
            cached_frame: None,
            cached_frame_index: None,
        })
    }

    /// Fetch the frame at `frame_index`, resized to the layer rectangle and
    /// flipped if the layer is flipped, through the single-frame cache.
    ///
    /// Under slow motion many output frames map to the same source frame;
    /// the cache avoids re-decoding them. Returns `None` when the source is
    /// exhausted.
    pub fn frame_at(&mut self, frame_index: u64) -> Result<Option<Frame>> {
        if self.cached_frame_index != Some(frame_index) {
            self.source.seek(frame_index)?;
            let decoded = match self.source.read()? {
                Some(frame) => frame,
                None => return Ok(None),
            };

            let mut image = if decoded.width() != self.layer.rect.width
                || decoded.height() != self.layer.rect.height
            {
                imageops::resize(
                    decoded.image(),
                    self.layer.rect.width,
                    self.layer.rect.height,
                    FilterType::Lanczos3,
                )
            } else {
                decoded.into_image()
            };
            if self.layer.flipped {
                image = imageops::flip_horizontal(&image);
            }

            self.cached_frame = Some(Frame::new(image));
            self.cached_frame_index = Some(frame_index);
        }
        Ok(self.cached_frame.clone())
    }

    /// Opacity to apply this frame.
    pub fn effective_opacity(&self) -> f64 {
        self.scratch
            .animated_opacity
            .unwrap_or(self.layer.opacity)
            .clamp(0.0, 1.0)
    }
}
