use std::collections::HashMap;

use image::imageops::{self, FilterType};
use tracing::warn;

use crate::animation::apply_animations;
use crate::compositor::{FrameContext, FrameHook, RenderState};
use crate::effects::chroma::apply_chroma_key;
use crate::effects::color::change_color;
use crate::effects::config::{
    AnimationSpec, BlendSettings, ChromaKeySettings, CutObjectSettings, EffectConfig, EffectSet,
    EffectTarget, OverlapKind,
};
use crate::effects::overlap::{follow_reference, punch_back};
use crate::effects::replace::erase_object;
use crate::error::Result;
use crate::mask::{Mask, MaskMap};
use crate::source::Frame;

/// The stock [`FrameHook`] implementation: mask-indexed effects and
/// animations, configured per layer by the layer's stable index.
pub struct EffectsPipeline {
    enable_transparency: bool,
    chroma: HashMap<i64, ChromaKeySettings>,
    effects: HashMap<i64, EffectConfig>,
    animations: HashMap<i64, Vec<AnimationSpec>>,
    mask_maps: HashMap<i64, MaskMap>,
}

impl EffectsPipeline {
    /// `enable_transparency` gates the chroma key stage globally.
    pub fn new(enable_transparency: bool) -> Self {
        Self {
            enable_transparency,
            chroma: HashMap::new(),
            effects: HashMap::new(),
            animations: HashMap::new(),
            mask_maps: HashMap::new(),
        }
    }

    pub fn set_chroma_key(&mut self, layer_index: i64, settings: ChromaKeySettings) {
        self.chroma.insert(layer_index, settings);
    }

    pub fn set_effects(&mut self, layer_index: i64, config: EffectConfig) {
        self.effects.insert(layer_index, config);
    }

    pub fn set_animations(&mut self, layer_index: i64, specs: Vec<AnimationSpec>) {
        self.animations.insert(layer_index, specs);
    }

    pub fn set_mask_map(&mut self, layer_index: i64, masks: MaskMap) {
        self.mask_maps.insert(layer_index, masks);
    }

    /// Union of every object mask in the frame, inverted: 255 where no
    /// tracked object is present. With no tracked objects at all, the
    /// whole frame is background and the mask is all-white.
    fn background_mask(&self, layer_index: i64, frame_index: u64, width: u32, height: u32) -> Mask {
        let objects = self
            .mask_maps
            .get(&layer_index)
            .and_then(|m| m.get(&frame_index));
        let Some(objects) = objects else {
            return Mask::full(width, height);
        };
        let mut iter = objects.values();
        let Some(first) = iter.next() else {
            return Mask::full(width, height);
        };
        iter.fold(first.clone(), |acc, m| acc.union(m)).inverted()
    }

    /// Run one target's cut / color / blend set against its mask.
    fn apply_effect_set(
        &self,
        frame: &mut Frame,
        mask: &Mask,
        set: &EffectSet,
        ctx: &FrameContext,
        states: &mut [RenderState],
    ) -> Result<()> {
        if let Some(cut) = &set.cut_object_effect {
            apply_cut_object(frame, mask, cut);
        }
        if let Some(color) = &set.color_effect {
            if let Err(e) = change_color(frame, mask, color) {
                warn!("Color effect failed: {}; skipping", e);
            }
        }
        if let Some(blend) = &set.blend_effect {
            self.apply_blend(frame, mask, blend, ctx, states)?;
        }
        Ok(())
    }

    /// Copy pixels from a reference layer's frame at the same global time
    /// wherever the mask equals the detection value.
    fn apply_blend(
        &self,
        frame: &mut Frame,
        mask: &Mask,
        settings: &BlendSettings,
        ctx: &FrameContext,
        states: &mut [RenderState],
    ) -> Result<()> {
        let Some(ref_pos) = states.iter().position(|s| s.layer.index == settings.layer)
        else {
            warn!("Blend reference layer {} not found; skipping", settings.layer);
            return Ok(());
        };

        let ref_index = {
            let ref_state = &states[ref_pos];
            let local = ref_state.layer.local_time(ctx.global_time);
            (local * ref_state.source.frame_rate() + 1e-6).max(0.0) as u64
        };
        let Some(ref_frame) = states[ref_pos].frame_at(ref_index)? else {
            warn!("Blend reference layer {} has no frame {}; skipping", settings.layer, ref_index);
            return Ok(());
        };

        let ref_image = if ref_frame.width() != frame.width()
            || ref_frame.height() != frame.height()
        {
            imageops::resize(
                ref_frame.image(),
                frame.width(),
                frame.height(),
                FilterType::Lanczos3,
            )
        } else {
            ref_frame.into_image()
        };

        let mask = mask.resized(frame.width(), frame.height()).binarized();
        let image = frame.image_mut();
        for (x, y, pixel) in image.enumerate_pixels_mut() {
            if mask.get(x, y) == settings.detection {
                *pixel = *ref_image.get_pixel(x, y);
            }
        }
        Ok(())
    }
}

impl FrameHook for EffectsPipeline {
    fn pre_transform(
        &mut self,
        frame: &mut Frame,
        ctx: &FrameContext,
        states: &mut [RenderState],
    ) -> Result<bool> {
        let layer_index = states[ctx.layer_index].layer.index;
        let flipped = states[ctx.layer_index].layer.flipped;

        if self.enable_transparency {
            if let Some(settings) = self.chroma.get(&layer_index) {
                apply_chroma_key(frame, settings)?;
            }
        }

        if let Some(config) = self.effects.get(&layer_index).cloned() {
            // Background slots first, sharing one inverted-union mask
            for target in [EffectTarget::Background, EffectTarget::SecondaryBackground] {
                let Some(set) = config.get(&target) else { continue };
                let mask = self.background_mask(
                    layer_index,
                    ctx.frame_index,
                    frame.width(),
                    frame.height(),
                );
                let mask = prepare_mask(&mask, frame, flipped);
                self.apply_effect_set(frame, &mask, set, ctx, states)?;
            }

            // Per-object effects in ascending object-id order
            let object_ids: Vec<i64> = self
                .mask_maps
                .get(&layer_index)
                .and_then(|m| m.get(&ctx.frame_index))
                .map(|objects| objects.keys().copied().collect())
                .unwrap_or_default();

            for object_id in object_ids {
                let Some(set) = config.get(&EffectTarget::Object(object_id)) else {
                    continue;
                };
                let Some(raw_mask) = self
                    .mask_maps
                    .get(&layer_index)
                    .and_then(|m| m.get(&ctx.frame_index))
                    .and_then(|objects| objects.get(&object_id))
                    .cloned()
                else {
                    continue;
                };
                let mask = prepare_mask(&raw_mask, frame, flipped);

                if let Some(remove) = &set.background_remove_effect {
                    if let Some(masks) = self.mask_maps.get(&layer_index) {
                        erase_object(
                            frame,
                            &mut states[ctx.layer_index],
                            masks,
                            ctx.frame_index,
                            object_id,
                            &mask,
                            remove,
                        )?;
                    }
                }

                self.apply_effect_set(frame, &mask, set, ctx, states)?;
            }

            // Occlusion tracking rewrites the layer rectangle last, before
            // the transform reads it
            if let Some(overlap) = config
                .get(&EffectTarget::Occlusion)
                .and_then(|set| set.overlap_video.as_ref())
            {
                follow_reference(ctx, states, overlap, &self.mask_maps)?;
            }
        }

        if let Some(specs) = self.animations.get(&layer_index) {
            apply_animations(specs, &mut states[ctx.layer_index], ctx);
        }

        Ok(true)
    }

    fn post_transform(
        &mut self,
        frame: &mut Frame,
        ctx: &FrameContext,
        states: &mut [RenderState],
    ) -> Result<bool> {
        let layer_index = states[ctx.layer_index].layer.index;

        if let Some(overlap) = self
            .effects
            .get(&layer_index)
            .and_then(|config| config.get(&EffectTarget::Occlusion))
            .and_then(|set| set.overlap_video.as_ref())
        {
            if overlap.kind == OverlapKind::Back {
                punch_back(frame, ctx, states, overlap, &self.mask_maps)?;
            }
        }

        Ok(true)
    }
}

/// Zero alpha where the mask matches the detection polarity. Detection 255
/// cuts the masked region out of the frame; detection 0 cuts everything
/// outside it. Alpha elsewhere is left as it was.
fn apply_cut_object(frame: &mut Frame, mask: &Mask, settings: &CutObjectSettings) {
    let mask = mask.resized(frame.width(), frame.height()).binarized();
    let mask = if settings.detection == 0 {
        mask.inverted()
    } else {
        mask
    };

    let image = frame.image_mut();
    for (x, y, pixel) in image.enumerate_pixels_mut() {
        if mask.get(x, y) == 255 {
            pixel.0[3] = 0;
        }
    }
}

/// Resize a raw mask to the working frame and mirror it when the layer's
/// cached frames are flipped.
fn prepare_mask(mask: &Mask, frame: &Frame, flipped: bool) -> Mask {
    let mask = mask.resized(frame.width(), frame.height());
    if flipped {
        mask.flipped_horizontal()
    } else {
        mask
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compositor::{Layer, LayerSource};
    use crate::geometry::Rect;
    use image::{GrayImage, Luma, Rgba, RgbaImage};
    use std::collections::BTreeMap;

    fn full_mask(w: u32, h: u32) -> Mask {
        Mask::new(GrayImage::from_pixel(w, h, Luma([255])))
    }

    fn state(rect: Rect, index: i64, color: [u8; 4]) -> RenderState {
        let layer = Layer::new(
            LayerSource::Frames {
                frames: vec![
                    Frame::new(RgbaImage::from_pixel(rect.width, rect.height, Rgba(color)));
                    30
                ],
                frame_rate: 30.0,
            },
            rect,
            index,
        );
        RenderState::open(layer, 30.0).unwrap()
    }

    fn ctx(layer_index: usize) -> FrameContext {
        FrameContext {
            layer_index,
            frame_index: 0,
            global_time: 0.0,
            local_time: 0.0,
            output_fps: 30.0,
            canvas_width: 8,
            canvas_height: 8,
            roi: None,
        }
    }

    #[test]
    fn test_cut_object_full_mask_clears_all_alpha() {
        let mut frame = Frame::new(RgbaImage::from_pixel(8, 8, Rgba([50, 50, 50, 255])));
        apply_cut_object(
            &mut frame,
            &full_mask(8, 8),
            &CutObjectSettings { detection: 255 },
        );
        assert!(frame.image().pixels().all(|p| p.0[3] == 0));
    }

    #[test]
    fn test_cut_object_detection_zero_inverts_polarity() {
        let mut mask_image = GrayImage::new(4, 4);
        mask_image.put_pixel(0, 0, Luma([255]));
        let mask = Mask::new(mask_image);

        let mut frame = Frame::new(RgbaImage::from_pixel(4, 4, Rgba([50, 50, 50, 255])));
        apply_cut_object(&mut frame, &mask, &CutObjectSettings { detection: 0 });

        // Masked pixel keeps alpha; everything else is cut
        assert_eq!(frame.image().get_pixel(0, 0).0[3], 255);
        assert_eq!(frame.image().get_pixel(2, 2).0[3], 0);
    }

    #[test]
    fn test_object_cut_through_pipeline() {
        let mut pipeline = EffectsPipeline::new(false);
        let mut config = EffectConfig::new();
        config.insert(
            EffectTarget::Object(1),
            EffectSet {
                cut_object_effect: Some(CutObjectSettings { detection: 255 }),
                ..Default::default()
            },
        );
        pipeline.set_effects(0, config);

        let mut masks = MaskMap::new();
        masks.insert(0, BTreeMap::from([(1, full_mask(8, 8))]));
        pipeline.set_mask_map(0, masks);

        let mut states = vec![state(Rect::new(0, 0, 8, 8), 0, [50, 50, 50, 255])];
        let mut frame = states[0].frame_at(0).unwrap().unwrap();

        let keep = pipeline
            .pre_transform(&mut frame, &ctx(0), &mut states)
            .unwrap();
        assert!(keep);
        assert!(frame.image().pixels().all(|p| p.0[3] == 0));
    }

    #[test]
    fn test_blend_copies_reference_layer_pixels() {
        let mut pipeline = EffectsPipeline::new(false);
        let mut config = EffectConfig::new();
        config.insert(
            EffectTarget::Object(1),
            EffectSet {
                blend_effect: Some(BlendSettings {
                    layer: 7,
                    detection: 255,
                }),
                ..Default::default()
            },
        );
        pipeline.set_effects(0, config);

        let mut mask_image = GrayImage::new(8, 8);
        for y in 0..4 {
            for x in 0..8 {
                mask_image.put_pixel(x, y, Luma([255]));
            }
        }
        let mut masks = MaskMap::new();
        masks.insert(0, BTreeMap::from([(1, Mask::new(mask_image))]));
        pipeline.set_mask_map(0, masks);

        let mut states = vec![
            state(Rect::new(0, 0, 8, 8), 0, [10, 10, 10, 255]),
            state(Rect::new(0, 0, 8, 8), 7, [250, 0, 0, 255]),
        ];
        let mut frame = states[0].frame_at(0).unwrap().unwrap();
        pipeline
            .pre_transform(&mut frame, &ctx(0), &mut states)
            .unwrap();

        // Top half comes from the reference layer
        assert_eq!(frame.image().get_pixel(0, 0).0, [250, 0, 0, 255]);
        assert_eq!(frame.image().get_pixel(0, 7).0, [10, 10, 10, 255]);
    }

    #[test]
    fn test_background_mask_is_union_inverted() {
        let mut pipeline = EffectsPipeline::new(false);
        let mut a = GrayImage::new(8, 8);
        a.put_pixel(0, 0, Luma([255]));
        let mut b = GrayImage::new(8, 8);
        b.put_pixel(7, 7, Luma([255]));

        let mut masks = MaskMap::new();
        masks.insert(0, BTreeMap::from([(1, Mask::new(a)), (2, Mask::new(b))]));
        pipeline.set_mask_map(0, masks);

        let bg = pipeline.background_mask(0, 0, 8, 8);
        assert!(!bg.is_set(0, 0));
        assert!(!bg.is_set(7, 7));
        assert!(bg.is_set(3, 3));
    }

    #[test]
    fn test_background_mask_without_objects_is_all_white() {
        let pipeline = EffectsPipeline::new(false);
        let bg = pipeline.background_mask(0, 0, 4, 4);
        assert!(bg.image().pixels().all(|p| p.0[0] == 255));
    }

    #[test]
    fn test_background_effect_covers_whole_frame_without_masks() {
        // No tracked objects means the entire frame is background
        let mut pipeline = EffectsPipeline::new(false);
        let mut config = EffectConfig::new();
        config.insert(
            EffectTarget::Background,
            EffectSet {
                color_effect: Some(crate::effects::config::ColorSettings {
                    color: Some("#ff0000".to_string()),
                    factor: 2.0,
                    ..Default::default()
                }),
                ..Default::default()
            },
        );
        pipeline.set_effects(0, config);

        let mut states = vec![state(Rect::new(0, 0, 8, 8), 0, [50, 50, 50, 255])];
        let mut frame = states[0].frame_at(0).unwrap().unwrap();
        pipeline
            .pre_transform(&mut frame, &ctx(0), &mut states)
            .unwrap();

        assert!(frame
            .image()
            .pixels()
            .all(|p| p.0 == [255, 0, 0, 255]));
    }

    #[test]
    fn test_cut_object_not_gated_by_transparency_flag() {
        // Only the chroma key reads the transparency toggle; mask cuts
        // always run
        let mut pipeline = EffectsPipeline::new(false);
        let mut config = EffectConfig::new();
        config.insert(
            EffectTarget::Object(1),
            EffectSet {
                cut_object_effect: Some(CutObjectSettings { detection: 255 }),
                ..Default::default()
            },
        );
        pipeline.set_effects(0, config);

        let mut masks = MaskMap::new();
        masks.insert(0, BTreeMap::from([(1, full_mask(8, 8))]));
        pipeline.set_mask_map(0, masks);

        let mut states = vec![state(Rect::new(0, 0, 8, 8), 0, [50, 50, 50, 255])];
        let mut frame = states[0].frame_at(0).unwrap().unwrap();
        pipeline
            .pre_transform(&mut frame, &ctx(0), &mut states)
            .unwrap();
        assert!(frame.image().pixels().all(|p| p.0[3] == 0));
    }

    #[test]
    fn test_chroma_gated_by_transparency_flag() {
        let settings = ChromaKeySettings {
            color: Some("#0a0a0a".to_string()),
            position: None,
            tolerance: 1.0,
        };

        for (enabled, expected_alpha) in [(true, 0u8), (false, 255u8)] {
            let mut pipeline = EffectsPipeline::new(enabled);
            pipeline.set_chroma_key(0, settings.clone());

            let mut states = vec![state(Rect::new(0, 0, 8, 8), 0, [10, 10, 10, 255])];
            let mut frame = states[0].frame_at(0).unwrap().unwrap();
            pipeline
                .pre_transform(&mut frame, &ctx(0), &mut states)
                .unwrap();
            assert_eq!(frame.image().get_pixel(0, 0).0[3], expected_alpha);
        }
    }

    #[test]
    fn test_missing_effect_references_never_abort() {
        let mut pipeline = EffectsPipeline::new(false);
        let mut config = EffectConfig::new();
        config.insert(
            EffectTarget::Object(9),
            EffectSet {
                blend_effect: Some(BlendSettings {
                    layer: 99,
                    detection: 255,
                }),
                ..Default::default()
            },
        );
        config.insert(
            EffectTarget::Occlusion,
            EffectSet {
                overlap_video: Some(crate::effects::config::OverlapSettings {
                    layer: 42,
                    object: 1,
                    kind: OverlapKind::Front,
                }),
                ..Default::default()
            },
        );
        pipeline.set_effects(0, config);

        let mut states = vec![state(Rect::new(0, 0, 8, 8), 0, [10, 10, 10, 255])];
        let mut frame = states[0].frame_at(0).unwrap().unwrap();
        let keep = pipeline
            .pre_transform(&mut frame, &ctx(0), &mut states)
            .unwrap();
        assert!(keep);
    }
}
