use tracing::warn;

use crate::effects::config::{parse_hex_color, ChromaKeySettings};
use crate::error::Result;
use crate::source::Frame;

/// Key out a color: alpha goes to 0 where the squared RGB distance to the
/// target color is within the squared tolerance, 255 everywhere else.
pub fn apply_chroma_key(frame: &mut Frame, settings: &ChromaKeySettings) -> Result<()> {
    let target = match resolve_target(frame, settings) {
        Some(color) => color,
        None => {
            warn!("Chroma key has neither color nor position; skipping");
            return Ok(());
        }
    };

    let tolerance_sq = settings.tolerance * settings.tolerance;
    for pixel in frame.image_mut().pixels_mut() {
        let dr = pixel.0[0] as f64 - target[0] as f64;
        let dg = pixel.0[1] as f64 - target[1] as f64;
        let db = pixel.0[2] as f64 - target[2] as f64;
        let dist_sq = dr * dr + dg * dg + db * db;
        pixel.0[3] = if dist_sq <= tolerance_sq { 0 } else { 255 };
    }
    Ok(())
}

/// A fixed hex color wins; otherwise sample the configured pixel position,
/// clamped into the frame.
fn resolve_target(frame: &Frame, settings: &ChromaKeySettings) -> Option<[u8; 3]> {
    if let Some(hex) = &settings.color {
        match parse_hex_color(hex) {
            Ok(color) => return Some(color),
            Err(e) => {
                warn!("Invalid chroma key color {}: {}", hex, e);
                return None;
            }
        }
    }
    let pos = settings.position?;
    let x = pos.x.clamp(0, frame.width() as i64 - 1) as u32;
    let y = pos.y.clamp(0, frame.height() as i64 - 1) as u32;
    let p = frame.image().get_pixel(x, y);
    Some([p.0[0], p.0[1], p.0[2]])
}
