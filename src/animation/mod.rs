//! Opacity fades and keyframe motion.
//!
//! Animations are re-evaluated statelessly every frame from the current
//! global time; the only persisted state is the opacity authority carried
//! in the layer scratch, which stops a settled fade from stomping another
//! fade's in-progress ramp.

use crate::compositor::{FrameContext, OpacityOrigin, RenderState};
use crate::effects::config::{AnimationSpec, MotionPoint};

/// Run every animation attached to the layer for this frame. Fades write
/// the scratch opacity; motion rewrites the layer rectangle.
pub fn apply_animations(specs: &[AnimationSpec], state: &mut RenderState, ctx: &FrameContext) {
    // Fades and motion both measure time from the layer's first visible
    // moment
    let elapsed_base = ctx.global_time - state.layer.start_offset;

    for spec in specs {
        match spec {
            AnimationSpec::FadeIn { start, duration } => {
                let start = start.unwrap_or(0.0);
                let (opacity, origin) = fade_value(elapsed_base - start, *duration, true);
                set_opacity(state, opacity, origin, "fadeIn");
            }
            AnimationSpec::FadeOut { start, duration } => {
                let start = start.unwrap_or_else(|| {
                    state.layer.content_duration(state.source.duration()) - duration
                });
                let (opacity, origin) = fade_value(elapsed_base - start, *duration, false);
                set_opacity(state, opacity, origin, "fadeOut");
            }
            AnimationSpec::Motion { points } => {
                if let Some((x, y)) = interpolate_motion(points, elapsed_base) {
                    state.layer.rect.x = x;
                    state.layer.rect.y = y;
                }
            }
        }
    }
}

/// Opacity for a fade at `elapsed` seconds into its window. Inside the
/// window the value ramps and carries animation authority; outside it
/// clamps to the boundary value with limit authority.
fn fade_value(elapsed: f64, duration: f64, fade_in: bool) -> (f64, OpacityOrigin) {
    if duration <= 0.0 {
        let settled = if fade_in { 1.0 } else { 0.0 };
        return (settled, OpacityOrigin::Limit);
    }
    if elapsed >= 0.0 && elapsed < duration {
        let ramp = elapsed / duration;
        let opacity = if fade_in { ramp } else { 1.0 - ramp };
        (opacity, OpacityOrigin::Animation)
    } else if elapsed >= duration {
        (if fade_in { 1.0 } else { 0.0 }, OpacityOrigin::Limit)
    } else {
        (if fade_in { 0.0 } else { 1.0 }, OpacityOrigin::Limit)
    }
}

/// Write the opacity unless a different fade's ramp currently holds
/// authority and this write is only a settled limit.
fn set_opacity(state: &mut RenderState, opacity: f64, origin: OpacityOrigin, name: &str) {
    if let Some((held_origin, held_name)) = &state.scratch.opacity_authority {
        if held_name != name
            && *held_origin == OpacityOrigin::Animation
            && origin == OpacityOrigin::Limit
        {
            return;
        }
    }
    state.scratch.animated_opacity = Some(opacity);
    state.scratch.opacity_authority = Some((origin, name.to_string()));
}

/// Piecewise-linear interpolation over the keyframes. Before the first and
/// after the last keyframe the position clamps to the endpoint.
fn interpolate_motion(points: &[MotionPoint], time: f64) -> Option<(i64, i64)> {
    let first = points.first()?;
    if time <= first.time {
        return Some((first.x, first.y));
    }
    let last = points.last()?;
    if time >= last.time {
        return Some((last.x, last.y));
    }

    for pair in points.windows(2) {
        let (a, b) = (&pair[0], &pair[1]);
        if time >= a.time && time < b.time {
            let span = b.time - a.time;
            if span <= 0.0 {
                return Some((b.x, b.y));
            }
            let t = (time - a.time) / span;
            let x = a.x as f64 + (b.x - a.x) as f64 * t;
            let y = a.y as f64 + (b.y - a.y) as f64 * t;
            return Some((x.round() as i64, y.round() as i64));
        }
    }
    Some((last.x, last.y))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compositor::{Layer, LayerSource};
    use crate::geometry::Rect;
    use crate::source::Frame;

    fn state_with(start_offset: f64, frames: usize) -> RenderState {
        let mut layer = Layer::new(
            LayerSource::Frames {
                frames: vec![Frame::black(4, 4); frames],
                frame_rate: 30.0,
            },
            Rect::new(0, 0, 4, 4),
            0,
        );
        layer.start_offset = start_offset;
        RenderState::open(layer, 30.0).unwrap()
    }

    fn ctx_at(global_time: f64) -> FrameContext {
        FrameContext {
            layer_index: 0,
            frame_index: 0,
            global_time,
            local_time: global_time,
            output_fps: 30.0,
            canvas_width: 4,
            canvas_height: 4,
            roi: None,
        }
    }

    fn opacity_at(state: &mut RenderState, specs: &[AnimationSpec], t: f64) -> f64 {
        apply_animations(specs, state, &ctx_at(t));
        state.effective_opacity()
    }

    #[test]
    fn test_fade_in_endpoints() {
        let specs = [AnimationSpec::FadeIn {
            start: None,
            duration: 1.0,
        }];
        let mut state = state_with(0.0, 300);

        assert!((opacity_at(&mut state, &specs, 0.0) - 0.0).abs() < 1e-9);
        assert!((opacity_at(&mut state, &specs, 0.5) - 0.5).abs() < 1e-9);
        assert!((opacity_at(&mut state, &specs, 1.0) - 1.0).abs() < 1e-9);
        assert!((opacity_at(&mut state, &specs, 5.0) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_fade_in_respects_start_offset() {
        // Layer starts at global 2 s; fade runs over its first second
        let specs = [AnimationSpec::FadeIn {
            start: None,
            duration: 1.0,
        }];
        let mut state = state_with(2.0, 300);

        assert!((opacity_at(&mut state, &specs, 2.5) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_fade_out_defaults_to_end_of_content() {
        // 300 frames at 30 fps is 10 s of content
        let specs = [AnimationSpec::FadeOut {
            start: None,
            duration: 2.0,
        }];
        let mut state = state_with(0.0, 300);

        assert!((opacity_at(&mut state, &specs, 7.9) - 1.0).abs() < 1e-9);
        assert!((opacity_at(&mut state, &specs, 9.0) - 0.5).abs() < 1e-9);
        assert!((opacity_at(&mut state, &specs, 10.0) - 0.0).abs() < 1e-9);
    }

    #[test]
    fn test_limit_does_not_override_other_fades_ramp() {
        // Mid fade-in, the fade-out's settled limit of 1.0 must not stomp
        // the ramp
        let specs = [
            AnimationSpec::FadeIn {
                start: None,
                duration: 1.0,
            },
            AnimationSpec::FadeOut {
                start: Some(8.0),
                duration: 2.0,
            },
        ];
        let mut state = state_with(0.0, 300);

        assert!((opacity_at(&mut state, &specs, 0.5) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_settled_limit_hands_over_authority() {
        let specs = [
            AnimationSpec::FadeIn {
                start: None,
                duration: 1.0,
            },
            AnimationSpec::FadeOut {
                start: Some(8.0),
                duration: 2.0,
            },
        ];
        let mut state = state_with(0.0, 300);

        // Past the fade-in, both are limits; then the fade-out ramp wins
        assert!((opacity_at(&mut state, &specs, 5.0) - 1.0).abs() < 1e-9);
        assert!((opacity_at(&mut state, &specs, 9.0) - 0.5).abs() < 1e-9);
        assert!((opacity_at(&mut state, &specs, 10.0) - 0.0).abs() < 1e-9);
    }

    #[test]
    fn test_motion_clamps_and_interpolates() {
        let points = vec![
            MotionPoint { x: 0, y: 0, time: 1.0 },
            MotionPoint { x: 100, y: 50, time: 3.0 },
        ];
        let specs = [AnimationSpec::Motion { points }];
        let mut state = state_with(0.0, 300);

        apply_animations(&specs, &mut state, &ctx_at(0.0));
        assert_eq!((state.layer.rect.x, state.layer.rect.y), (0, 0));

        apply_animations(&specs, &mut state, &ctx_at(2.0));
        assert_eq!((state.layer.rect.x, state.layer.rect.y), (50, 25));

        apply_animations(&specs, &mut state, &ctx_at(9.0));
        assert_eq!((state.layer.rect.x, state.layer.rect.y), (100, 50));
    }
}
