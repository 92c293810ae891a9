//! Cross-layer occlusion ("overlap") tracking.
//!
//! An overlay layer follows a tracked object in a reference layer by
//! translating its own rectangle with the object mask's centroid motion.
//! With the `back` type, the post-transform stage additionally punches
//! transparency into the overlay wherever the object mask covers it, so
//! the overlay appears to pass behind the object.

use std::collections::HashMap;

use tracing::warn;

use crate::compositor::{FrameContext, RenderState};
use crate::effects::config::OverlapSettings;
use crate::error::Result;
use crate::mask::{Mask, MaskMap};
use crate::source::Frame;

/// Resolve the reference layer's mask for the current global time.
///
/// The mask's frame index comes from the reference layer's own timing and
/// source frame rate, and the mask is prepared to the reference rectangle's
/// size and flip state. Returns the reference state's position alongside
/// the mask.
fn reference_mask(
    global_time: f64,
    states: &[RenderState],
    settings: &OverlapSettings,
    mask_maps: &HashMap<i64, MaskMap>,
) -> Option<(usize, Mask)> {
    let ref_pos = states
        .iter()
        .position(|s| s.layer.index == settings.layer)?;
    let ref_state = &states[ref_pos];

    let local_time = ref_state.layer.local_time(global_time);
    let frame_index = (local_time * ref_state.source.frame_rate() + 1e-6).max(0.0) as u64;

    let mask = mask_maps
        .get(&settings.layer)?
        .get(&frame_index)?
        .get(&settings.object)?;

    let mut mask = mask.resized(ref_state.layer.rect.width, ref_state.layer.rect.height);
    if ref_state.layer.flipped {
        mask = mask.flipped_horizontal();
    }
    Some((ref_pos, mask.binarized()))
}

/// Pre-transform stage: move the current layer's rectangle with the
/// reference mask's centroid.
///
/// The first frame anchors the rectangle: the configured x/y act as offsets
/// added to the centroid. Every later frame translates by the centroid's
/// frame-to-frame delta, carried in the layer scratch. A missing reference
/// layer or mask skips the effect for this frame.
pub fn follow_reference(
    ctx: &FrameContext,
    states: &mut [RenderState],
    settings: &OverlapSettings,
    mask_maps: &HashMap<i64, MaskMap>,
) -> Result<()> {
    let Some((_, mask)) = reference_mask(ctx.global_time, states, settings, mask_maps) else {
        warn!(
            "Overlap reference layer {} object {} unavailable; skipping",
            settings.layer, settings.object
        );
        return Ok(());
    };
    let Some((cx, cy)) = mask.centroid() else {
        return Ok(());
    };

    let state = &mut states[ctx.layer_index];
    match state.scratch.prev_centroid {
        None => {
            state.layer.rect.x += cx.round() as i64;
            state.layer.rect.y += cy.round() as i64;
        }
        Some((px, py)) => {
            state.layer.rect.x += (cx - px).round() as i64;
            state.layer.rect.y += (cy - py).round() as i64;
        }
    }
    state.scratch.prev_centroid = Some((cx, cy));
    Ok(())
}

/// Post-transform stage, `back` type only: zero the clipped overlay's alpha
/// wherever the reference mask is white at the same canvas coordinates.
///
/// The mask is rotated by the reference layer's rotation (same dimensions,
/// zero fill) and placed at the reference rectangle's position.
pub fn punch_back(
    sub_frame: &mut Frame,
    ctx: &FrameContext,
    states: &[RenderState],
    settings: &OverlapSettings,
    mask_maps: &HashMap<i64, MaskMap>,
) -> Result<()> {
    let Some(roi) = ctx.roi else {
        return Ok(());
    };
    let Some((ref_pos, mask)) = reference_mask(ctx.global_time, states, settings, mask_maps)
    else {
        return Ok(());
    };
    let ref_layer = &states[ref_pos].layer;
    let mask = mask.rotated(ref_layer.rotation_degrees);

    let image = sub_frame.image_mut();
    for (col, row, pixel) in image.enumerate_pixels_mut() {
        let canvas_x = (roi.x1 + col) as i64;
        let canvas_y = (roi.y1 + row) as i64;
        let mx = canvas_x - ref_layer.rect.x;
        let my = canvas_y - ref_layer.rect.y;
        if mx >= 0 && my >= 0 && (mx as u32) < mask.width() && (my as u32) < mask.height() {
            if mask.get(mx as u32, my as u32) == 255 {
                pixel.0[3] = 0;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compositor::{Layer, LayerSource};
    use crate::geometry::Rect;
    use image::{GrayImage, Luma, Rgba, RgbaImage};
    use std::collections::BTreeMap;

    fn mask_square(w: u32, h: u32, x0: u32, y0: u32, size: u32) -> Mask {
        let mut image = GrayImage::new(w, h);
        for y in y0..(y0 + size).min(h) {
            for x in x0..(x0 + size).min(w) {
                image.put_pixel(x, y, Luma([255]));
            }
        }
        Mask::new(image)
    }

    fn state(rect: Rect, index: i64, frames: usize) -> RenderState {
        let layer = Layer::new(
            LayerSource::Frames {
                frames: vec![Frame::new(RgbaImage::from_pixel(
                    rect.width,
                    rect.height,
                    Rgba([100, 100, 100, 255]),
                )); frames],
                frame_rate: 30.0,
            },
            rect,
            index,
        );
        RenderState::open(layer, 30.0).unwrap()
    }

    fn ctx(layer_index: usize, global_time: f64) -> FrameContext {
        FrameContext {
            layer_index,
            frame_index: (global_time * 30.0) as u64,
            global_time,
            local_time: global_time,
            output_fps: 30.0,
            canvas_width: 64,
            canvas_height: 64,
            roi: None,
        }
    }

    fn settings() -> OverlapSettings {
        OverlapSettings {
            layer: 0,
            object: 1,
            kind: crate::effects::config::OverlapKind::Front,
        }
    }

    #[test]
    fn test_first_frame_anchors_then_deltas_translate() {
        let mut states = vec![
            state(Rect::new(0, 0, 32, 32), 0, 60),
            state(Rect::new(3, 5, 8, 8), 1, 60),
        ];

        let mut maps = HashMap::new();
        let mut map = MaskMap::new();
        // Centroid (5.5, 5.5) at frame 0, then shifted right by 10
        map.insert(0, BTreeMap::from([(1, mask_square(32, 32, 4, 4, 4))]));
        map.insert(1, BTreeMap::from([(1, mask_square(32, 32, 14, 4, 4))]));
        maps.insert(0i64, map);

        follow_reference(&ctx(1, 0.0), &mut states, &settings(), &maps).unwrap();
        // Anchor: configured (3, 5) acts as an offset from the centroid
        assert_eq!(states[1].layer.rect.x, 3 + 6);
        assert_eq!(states[1].layer.rect.y, 5 + 6);

        follow_reference(&ctx(1, 1.0 / 30.0), &mut states, &settings(), &maps).unwrap();
        assert_eq!(states[1].layer.rect.x, 3 + 6 + 10);
        assert_eq!(states[1].layer.rect.y, 5 + 6);
    }

    #[test]
    fn test_missing_mask_skips_without_moving() {
        let mut states = vec![
            state(Rect::new(0, 0, 32, 32), 0, 60),
            state(Rect::new(3, 5, 8, 8), 1, 60),
        ];
        let maps = HashMap::new();

        follow_reference(&ctx(1, 0.0), &mut states, &settings(), &maps).unwrap();
        assert_eq!(states[1].layer.rect.x, 3);
        assert_eq!(states[1].layer.rect.y, 5);
    }

    #[test]
    fn test_punch_back_zeroes_alpha_under_mask() {
        let states = vec![
            state(Rect::new(10, 10, 16, 16), 0, 60),
            state(Rect::new(0, 0, 64, 64), 1, 60),
        ];

        let mut maps = HashMap::new();
        let mut map = MaskMap::new();
        map.insert(0, BTreeMap::from([(1, mask_square(16, 16, 0, 0, 8))]));
        maps.insert(0i64, map);

        let mut sub = Frame::new(RgbaImage::from_pixel(64, 64, Rgba([5, 5, 5, 255])));
        let mut context = ctx(1, 0.0);
        context.roi = Rect::new(0, 0, 64, 64).clip_to_canvas(64, 64);

        punch_back(&mut sub, &context, &states, &settings(), &maps).unwrap();

        // Mask covers canvas (10..18, 10..18)
        assert_eq!(sub.image().get_pixel(12, 12).0[3], 0);
        assert_eq!(sub.image().get_pixel(30, 30).0[3], 255);
        assert_eq!(sub.image().get_pixel(9, 9).0[3], 255);
    }
}
