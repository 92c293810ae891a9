use std::path::Path;

use tracing::debug;

use crate::error::{Result, SourceError};
use crate::source::{Frame, FrameSource};

/// In-memory frame sequence behind the [`FrameSource`] contract.
///
/// Used for synthetic content (rendered text, still images replicated for a
/// duration) and for tests. `seek` repositions a cursor; `read` returns
/// `None` past the end.
pub struct ArraySource {
    frames: Vec<Frame>,
    frame_rate: f64,
    cursor: usize,
}

impl ArraySource {
    /// Wrap an ordered frame sequence. All frames must share the first
    /// frame's dimensions.
    pub fn new(frames: Vec<Frame>, frame_rate: f64) -> Result<Self> {
        if frames.is_empty() {
            return Err(SourceError::InvalidParameters {
                details: "frame sequence is empty".to_string(),
            }
            .into());
        }
        let (w, h) = (frames[0].width(), frames[0].height());
        if frames.iter().any(|f| f.width() != w || f.height() != h) {
            return Err(SourceError::InvalidParameters {
                details: "frames in a sequence must share dimensions".to_string(),
            }
            .into());
        }
        if frame_rate <= 0.0 {
            return Err(SourceError::InvalidParameters {
                details: format!("invalid frame rate: {}", frame_rate),
            }
            .into());
        }

        debug!(
            "Array source: {} frames, {}x{} @ {:.2} fps",
            frames.len(),
            w,
            h,
            frame_rate
        );

        Ok(Self {
            frames,
            frame_rate,
            cursor: 0,
        })
    }

    /// Replicate a single frame for `duration` seconds at `frame_rate`.
    pub fn from_still(frame: Frame, frame_rate: f64, duration: f64) -> Result<Self> {
        if duration <= 0.0 || frame_rate <= 0.0 {
            return Err(SourceError::InvalidParameters {
                details: format!(
                    "invalid still parameters: duration={} fps={}",
                    duration, frame_rate
                ),
            }
            .into());
        }
        let count = ((duration * frame_rate).round() as usize).max(1);
        Self::new(vec![frame; count], frame_rate)
    }

    /// Load a still image file and replicate it for `duration` seconds.
    pub fn from_image_file<P: AsRef<Path>>(
        path: P,
        frame_rate: f64,
        duration: f64,
    ) -> Result<Self> {
        let path = path.as_ref();
        let image = image::open(path)
            .map_err(|_| SourceError::OpenFailed {
                path: path.display().to_string(),
            })?
            .to_rgba8();
        Self::from_still(Frame::new(image), frame_rate, duration)
    }
}

impl FrameSource for ArraySource {
    fn frame_rate(&self) -> f64 {
        self.frame_rate
    }

    fn width(&self) -> u32 {
        self.frames[0].width()
    }

    fn height(&self) -> u32 {
        self.frames[0].height()
    }

    fn frame_count(&self) -> u64 {
        self.frames.len() as u64
    }

    fn seek(&mut self, frame_index: u64) -> Result<()> {
        self.cursor = frame_index.min(self.frames.len() as u64) as usize;
        Ok(())
    }

    fn read(&mut self) -> Result<Option<Frame>> {
        let frame = self.frames.get(self.cursor).cloned();
        if frame.is_some() {
            self.cursor += 1;
        }
        Ok(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frames(n: usize) -> Vec<Frame> {
        (0..n).map(|_| Frame::black(4, 4)).collect()
    }

    #[test]
    fn test_seek_and_read() {
        let mut source = ArraySource::new(frames(5), 30.0).unwrap();
        source.seek(3).unwrap();
        assert!(source.read().unwrap().is_some());
        assert!(source.read().unwrap().is_some());
        assert!(source.read().unwrap().is_none());
    }

    #[test]
    fn test_read_past_end_is_not_an_error() {
        let mut source = ArraySource::new(frames(1), 30.0).unwrap();
        source.seek(100).unwrap();
        assert!(source.read().unwrap().is_none());
    }

    #[test]
    fn test_duration() {
        let source = ArraySource::new(frames(60), 30.0).unwrap();
        assert!((source.duration() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_from_still_replicates() {
        let source = ArraySource::from_still(Frame::black(2, 2), 30.0, 1.5).unwrap();
        assert_eq!(source.frame_count(), 45);
    }

    #[test]
    fn test_empty_sequence_rejected() {
        assert!(ArraySource::new(vec![], 30.0).is_err());
    }
}
