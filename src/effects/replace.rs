//! Temporal background replacement.
//!
//! Erases a tracked object without a known background plate by borrowing
//! pixels from another frame of the same source where the object has moved
//! away.

use tracing::{debug, warn};

use crate::compositor::RenderState;
use crate::effects::config::BackgroundRemoveSettings;
use crate::error::Result;
use crate::mask::{Mask, MaskMap};
use crate::source::Frame;

/// Replace the object's pixels with background borrowed from the nearest
/// frame where the object does not overlap the current (dilated) region.
///
/// `object_mask` must already be prepared to the frame's size and flip
/// state. Candidate masks from the map are prepared here the same way.
/// Finding no safe candidate leaves the frame untouched.
pub fn erase_object(
    frame: &mut Frame,
    state: &mut RenderState,
    masks: &MaskMap,
    current_index: u64,
    object_id: i64,
    object_mask: &Mask,
    settings: &BackgroundRemoveSettings,
) -> Result<()> {
    let dilated = object_mask.dilated(settings.radius).binarized();
    let flipped = state.layer.flipped;
    let (w, h) = (frame.width(), frame.height());

    // Nearest frames first
    let mut candidates: Vec<u64> = masks
        .iter()
        .filter(|(index, objects)| **index != current_index && objects.contains_key(&object_id))
        .map(|(index, _)| *index)
        .collect();
    candidates.sort_by_key(|index| index.abs_diff(current_index));

    for candidate_index in candidates {
        let Some(candidate_mask) = masks.get(&candidate_index).and_then(|m| m.get(&object_id))
        else {
            continue;
        };
        let mut candidate_mask = candidate_mask.resized(w, h);
        if flipped {
            candidate_mask = candidate_mask.flipped_horizontal();
        }
        let candidate_mask = candidate_mask.binarized();

        if dilated.overlaps(&candidate_mask) {
            continue;
        }

        let candidate_frame = match state.frame_at(candidate_index)? {
            Some(frame) => frame,
            None => continue,
        };

        debug!(
            "Replacing object {} at frame {} with background from frame {}",
            object_id, current_index, candidate_index
        );

        let image = frame.image_mut();
        for (x, y, pixel) in image.enumerate_pixels_mut() {
            if dilated.is_set(x, y) && !candidate_mask.is_set(x, y) {
                *pixel = *candidate_frame.image().get_pixel(x, y);
            }
        }
        return Ok(());
    }

    warn!(
        "No replacement frame found for object {} at frame {}",
        object_id, current_index
    );
    Ok(())
}
