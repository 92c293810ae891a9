use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};

use tracing::{debug, info};

use crate::compositor::FrameSink;
use crate::error::{RenderError, Result};
use crate::source::Frame;

/// Encodes composed frames by piping rawvideo into an ffmpeg process.
///
/// The process is spawned lazily from [`FrameSink::start`], once the render
/// loop has resolved the output frame rate.
pub struct FfmpegWriter {
    path: PathBuf,
    codec: String,
    crf: u8,
    encoder: Option<Encoder>,
    frames_written: u64,
}

struct Encoder {
    child: Child,
    stdin: Option<ChildStdin>,
    width: u32,
    height: u32,
}

impl FfmpegWriter {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self::with_options(path, "libx264", 23)
    }

    /// Choose the codec and x264 CRF quality explicitly.
    pub fn with_options<P: AsRef<Path>>(path: P, codec: &str, crf: u8) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            codec: codec.to_string(),
            crf,
            encoder: None,
            frames_written: 0,
        }
    }
}

impl FrameSink for FfmpegWriter {
    fn start(&mut self, width: u32, height: u32, fps: f64) -> Result<()> {
        debug!(
            "Starting ffmpeg encoder: {} {}x{} @ {:.2} fps, {} crf {}",
            self.path.display(),
            width,
            height,
            fps,
            self.codec,
            self.crf
        );

        let mut child = Command::new("ffmpeg")
            .args([
                "-y",
                "-v",
                "error",
                "-f",
                "rawvideo",
                "-pix_fmt",
                "rgb24",
                "-s",
                &format!("{}x{}", width, height),
                "-r",
                &format!("{:.6}", fps),
                "-i",
                "pipe:0",
                "-c:v",
                &self.codec,
                "-preset",
                "medium",
                "-crf",
                &self.crf.to_string(),
                "-pix_fmt",
                "yuv420p",
            ])
            .arg(&self.path)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| RenderError::EncodingFailed {
                reason: format!("failed to start ffmpeg: {}", e),
            })?;

        let stdin = child.stdin.take().ok_or_else(|| RenderError::EncodingFailed {
            reason: "ffmpeg stdin unavailable".to_string(),
        })?;

        self.encoder = Some(Encoder {
            child,
            stdin: Some(stdin),
            width,
            height,
        });
        Ok(())
    }

    fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        let encoder = self.encoder.as_mut().ok_or_else(|| RenderError::EncodingFailed {
            reason: "encoder not started".to_string(),
        })?;

        if frame.width() != encoder.width || frame.height() != encoder.height {
            return Err(RenderError::EncodingFailed {
                reason: format!(
                    "frame size {}x{} does not match encoder size {}x{}",
                    frame.width(),
                    frame.height(),
                    encoder.width,
                    encoder.height
                ),
            }
            .into());
        }

        let stdin = encoder
            .stdin
            .as_mut()
            .ok_or_else(|| RenderError::EncodingFailed {
                reason: "encoder already finished".to_string(),
            })?;
        stdin
            .write_all(&frame.to_rgb24())
            .map_err(|e| RenderError::EncodingFailed {
                reason: format!("pipe write failed: {}", e),
            })?;

        self.frames_written += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        let Some(mut encoder) = self.encoder.take() else {
            return Ok(());
        };

        // Closing stdin signals end of stream
        drop(encoder.stdin.take());

        let status = encoder.child.wait().map_err(|e| RenderError::EncodingFailed {
            reason: format!("ffmpeg wait failed: {}", e),
        })?;

        if !status.success() {
            let mut stderr = String::new();
            if let Some(mut pipe) = encoder.child.stderr.take() {
                use std::io::Read;
                let _ = pipe.read_to_string(&mut stderr);
            }
            return Err(RenderError::EncodingFailed {
                reason: format!("ffmpeg exited with {}: {}", status, stderr.trim()),
            }
            .into());
        }

        info!("Encoded {} frames to {}", self.frames_written, self.path.display());
        Ok(())
    }
}

impl Drop for FfmpegWriter {
    fn drop(&mut self) {
        if let Some(mut encoder) = self.encoder.take() {
            drop(encoder.stdin.take());
            let _ = encoder.child.wait();
        }
    }
}
