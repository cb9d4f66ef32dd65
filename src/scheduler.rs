use crate::error::Result;
use crate::scene::{EntityId, KeyTarget, Scene};

/// The four frames of one scheduled note: baseline keys at the ends, the
/// event-driven value held across `[peak_start, peak_end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeakWindow {
    pub start_frame: i64,
    pub peak_start: i64,
    pub peak_end: i64,
    pub end_frame: i64,
}

/// Computes the peak window for one note from its onset and duration.
///
/// All frame numbers are truncated, not rounded. Returns `None` when the
/// note spans fewer than four frames; such notes are skipped silently, not
/// reported. Clamps keep the peak keys strictly inside the base keys for
/// any `start_frac < end_frac` in `(0, 1)`.
pub fn schedule_note(
    fps: f64,
    time: f64,
    duration: f64,
    start_frac: f64,
    end_frac: f64,
) -> Option<PeakWindow> {
    let start_frame = (fps * time) as i64;
    let end_frame = (fps * time + fps * duration) as i64;
    if start_frame + 3 >= end_frame {
        return None;
    }

    let frames = (end_frame - start_frame) as f64;
    let peak_start = (start_frame + 1).max(start_frame + (frames * start_frac) as i64);
    let peak_end = (end_frame - 1).min((end_frame as f64 - frames * (1.0 - end_frac)) as i64);

    Some(PeakWindow {
        start_frame,
        peak_start,
        peak_end,
        end_frame,
    })
}

/// Writes the four keys onto an entity: base value at the window ends, the
/// resolved value across the peak. Each key is set-then-sampled through the
/// host keyframe primitive, so the entity is left holding the last written
/// value.
pub fn apply_window(
    scene: &mut Scene,
    entity: EntityId,
    target: &KeyTarget,
    base_value: f64,
    resolved_value: f64,
    window: &PeakWindow,
) -> Result<()> {
    let mut write = |scene: &mut Scene, value: f64, frame: i64| -> Result<()> {
        scene.set_target_value(entity, target, value)?;
        scene.keyframe_insert(entity, target, frame)
    };
    write(scene, base_value, window.start_frame)?;
    write(scene, base_value, window.end_frame)?;
    write(scene, resolved_value, window.peak_start)?;
    write(scene, resolved_value, window.peak_end)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::Channel;

    #[test]
    fn one_second_note_at_24_fps() {
        // time 0.0, duration 1.0, fracs 0.25/0.75 => keys at 0, 6, 18, 24.
        let w = schedule_note(24.0, 0.0, 1.0, 0.25, 0.75).unwrap();
        assert_eq!(w.start_frame, 0);
        assert_eq!(w.peak_start, 6);
        assert_eq!(w.peak_end, 18);
        assert_eq!(w.end_frame, 24);
    }

    #[test]
    fn too_short_note_is_skipped() {
        // duration 0.1 at 24 fps spans frames 0..2; 0 + 3 >= 2.
        assert!(schedule_note(24.0, 0.0, 0.1, 0.25, 0.75).is_none());
    }

    #[test]
    fn four_frame_note_is_the_shortest_schedulable() {
        assert!(schedule_note(24.0, 0.0, 3.0 / 24.0, 0.25, 0.75).is_none());
        assert!(schedule_note(24.0, 0.0, 4.0 / 24.0, 0.25, 0.75).is_some());
    }

    #[test]
    fn peak_keys_stay_strictly_inside_the_base_keys() {
        for (time, duration, start, end) in [
            (0.0, 1.0, 0.01, 0.99),
            (0.5, 0.2, 0.25, 0.75),
            (2.3, 3.7, 0.5, 0.6),
            (0.0, 10.0, 0.9, 0.95),
            (1.0, 0.25, 0.1, 0.9),
        ] {
            let Some(w) = schedule_note(24.0, time, duration, start, end) else {
                continue;
            };
            assert!(w.start_frame <= w.peak_start, "{w:?}");
            assert!(w.peak_start < w.peak_end, "{w:?}");
            assert!(w.peak_end <= w.end_frame, "{w:?}");
        }
    }

    #[test]
    fn fractional_ramp_floors_the_whole_peak_end_expression() {
        // frames = 10, end_frac 0.66: 10 - 10 * 0.34 = 6.6 => frame 6.
        // Truncating only the subtrahend would land one frame late at 7.
        let w = schedule_note(20.0, 0.0, 0.5, 0.25, 0.66).unwrap();
        assert_eq!(w.peak_start, 2);
        assert_eq!(w.peak_end, 6);
    }

    #[test]
    fn frame_math_truncates() {
        // 24 * 0.99 = 23.76 => frame 23, not 24.
        let w = schedule_note(24.0, 0.99, 1.0, 0.25, 0.75).unwrap();
        assert_eq!(w.start_frame, 23);
        assert_eq!(w.end_frame, 47);
    }

    #[test]
    fn apply_window_writes_base_and_peak_keys() {
        let mut scene = crate::scene::Scene::new(24.0);
        let id = scene.add_entity("cube", None);
        let target = KeyTarget::Channel {
            channel: Channel::Scale,
            axis: 0,
        };
        let w = schedule_note(24.0, 0.0, 1.0, 0.25, 0.75).unwrap();

        apply_window(&mut scene, id, &target, 1.0, 3.0, &w).unwrap();

        let keys = scene.keyframes(id, &target);
        let frames: Vec<i64> = keys.iter().map(|k| k.frame).collect();
        let values: Vec<f64> = keys.iter().map(|k| k.value).collect();
        assert_eq!(frames, vec![0, 6, 18, 24]);
        assert_eq!(values, vec![1.0, 3.0, 3.0, 1.0]);
    }
}
