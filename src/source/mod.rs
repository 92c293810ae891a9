//! Frame sources.
//!
//! Every layer reads frames through the [`FrameSource`] trait, whether the
//! content comes from a decoded video file or an in-memory sequence of
//! pre-rendered frames. The compositor never branches on which variant it
//! holds.

pub mod array;
pub mod types;
pub mod video;

pub use array::ArraySource;
pub use types::Frame;
pub use video::VideoSource;

use crate::error::Result;

/// Uniform capability set over anything that can supply timed frames.
pub trait FrameSource {
    /// Native frame rate of the content.
    fn frame_rate(&self) -> f64;

    /// Frame width in pixels.
    fn width(&self) -> u32;

    /// Frame height in pixels.
    fn height(&self) -> u32;

    /// Total number of frames.
    fn frame_count(&self) -> u64;

    /// Content duration in seconds.
    fn duration(&self) -> f64 {
        self.frame_count() as f64 / self.frame_rate().max(1.0)
    }

    /// Position the read cursor at the given frame index.
    fn seek(&mut self, frame_index: u64) -> Result<()>;

    /// Read the frame at the current cursor and advance it.
    ///
    /// Returns `Ok(None)` past the end of the content; a short read is not
    /// an error.
    fn read(&mut self) -> Result<Option<Frame>>;
}
