use std::path::{Path, PathBuf};
use std::process::Command;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{Result, SourceError};
use crate::source::{Frame, FrameSource};

/// Video-file-backed frame source.
///
/// Metadata comes from `ffprobe`; individual frames are decoded on demand by
/// spawning `ffmpeg` with a seek and reading one rawvideo frame from its
/// stdout. Frames are decoded at native resolution; the compositor resizes
/// to the layer rectangle afterwards.
#[derive(Debug)]
pub struct VideoSource {
    path: PathBuf,
    width: u32,
    height: u32,
    frame_rate: f64,
    frame_count: u64,
    cursor: u64,
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    nb_frames: Option<String>,
    duration: Option<String>,
}

impl VideoSource {
    /// Open a video file and probe its metadata.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(SourceError::OpenFailed {
                path: path.display().to_string(),
            }
            .into());
        }

        let output = Command::new("ffprobe")
            .args([
                "-v",
                "error",
                "-select_streams",
                "v:0",
                "-show_entries",
                "stream=width,height,r_frame_rate,nb_frames,duration",
                "-of",
                "json",
            ])
            .arg(path)
            .output()
            .map_err(|e| SourceError::ProbeFailed {
                path: path.display().to_string(),
                reason: format!("failed to run ffprobe: {}", e),
            })?;

        if !output.status.success() {
            return Err(SourceError::ProbeFailed {
                path: path.display().to_string(),
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }
            .into());
        }

        let probe: ProbeOutput =
            serde_json::from_slice(&output.stdout).map_err(|e| SourceError::ProbeFailed {
                path: path.display().to_string(),
                reason: format!("unparseable ffprobe output: {}", e),
            })?;

        let stream = probe
            .streams
            .into_iter()
            .next()
            .ok_or_else(|| SourceError::UnsupportedFormat {
                path: path.display().to_string(),
            })?;

        let width = stream.width.unwrap_or(0);
        let height = stream.height.unwrap_or(0);
        if width == 0 || height == 0 {
            return Err(SourceError::UnsupportedFormat {
                path: path.display().to_string(),
            }
            .into());
        }

        let frame_rate = stream
            .r_frame_rate
            .as_deref()
            .and_then(parse_rational)
            .unwrap_or(30.0);

        let frame_count = match stream.nb_frames.as_deref().and_then(|s| s.parse::<u64>().ok()) {
            Some(n) if n > 0 => n,
            _ => {
                // Some containers omit nb_frames; fall back to duration * fps
                let duration = stream
                    .duration
                    .as_deref()
                    .and_then(|s| s.parse::<f64>().ok())
                    .unwrap_or(0.0);
                (duration * frame_rate).round() as u64
            }
        };

        debug!(
            "Opened video source {}: {}x{} @ {:.3} fps, {} frames",
            path.display(),
            width,
            height,
            frame_rate,
            frame_count
        );

        Ok(Self {
            path: path.to_path_buf(),
            width,
            height,
            frame_rate,
            frame_count,
            cursor: 0,
        })
    }

    fn decode_frame(&self, frame_index: u64) -> Result<Option<Frame>> {
        let timestamp = frame_index as f64 / self.frame_rate.max(1.0);

        let output = Command::new("ffmpeg")
            .args(["-v", "error", "-ss", &format!("{:.6}", timestamp), "-i"])
            .arg(&self.path)
            .args([
                "-frames:v",
                "1",
                "-f",
                "rawvideo",
                "-pix_fmt",
                "rgb24",
                "pipe:1",
            ])
            .output()
            .map_err(|e| SourceError::DecodeFailed {
                index: frame_index as i64,
                reason: format!("failed to run ffmpeg: {}", e),
            })?;

        if output.stdout.is_empty() {
            // Seek landed past the end of the stream; short content is
            // handled by the caller, not treated as a decode error
            warn!(
                "No frame at index {} in {}",
                frame_index,
                self.path.display()
            );
            return Ok(None);
        }

        let expected = (self.width as usize) * (self.height as usize) * 3;
        let frame = Frame::from_rgb24(&output.stdout[..output.stdout.len().min(expected)], self.width, self.height)
            .ok_or_else(|| SourceError::DecodeFailed {
                index: frame_index as i64,
                reason: format!(
                    "short rawvideo frame: got {} bytes, expected {}",
                    output.stdout.len(),
                    expected
                ),
            })?;

        Ok(Some(frame))
    }
}

impl FrameSource for VideoSource {
    fn frame_rate(&self) -> f64 {
        self.frame_rate
    }

    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn frame_count(&self) -> u64 {
        self.frame_count
    }

    fn seek(&mut self, frame_index: u64) -> Result<()> {
        self.cursor = frame_index;
        Ok(())
    }

    fn read(&mut self) -> Result<Option<Frame>> {
        if self.cursor >= self.frame_count {
            return Ok(None);
        }
        let frame = self.decode_frame(self.cursor)?;
        if frame.is_some() {
            self.cursor += 1;
        }
        Ok(frame)
    }
}

/// Parse an ffprobe rational like "30000/1001" (or a plain number).
fn parse_rational(s: &str) -> Option<f64> {
    match s.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.parse().ok()?;
            let den: f64 = den.parse().ok()?;
            if den == 0.0 {
                None
            } else {
                Some(num / den)
            }
        }
        None => s.parse().ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rational() {
        assert_eq!(parse_rational("30/1"), Some(30.0));
        assert!((parse_rational("30000/1001").unwrap() - 29.97).abs() < 0.01);
        assert_eq!(parse_rational("25"), Some(25.0));
        assert_eq!(parse_rational("30/0"), None);
        assert_eq!(parse_rational("abc"), None);
    }

    #[test]
    fn test_open_missing_file() {
        let err = VideoSource::open("/nonexistent/clip.mp4").unwrap_err();
        assert!(err.to_string().contains("Failed to open source"));
    }
}
