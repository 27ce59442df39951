use std::time::{Duration, Instant};

use crate::types::CrossfadeCurve;

/// Maps linear fade progress in `[0, 1]` onto the eased blend weight.
fn ease(curve: CrossfadeCurve, x: f32) -> f32 {
    let x = x.clamp(0.0, 1.0);
    match curve {
        CrossfadeCurve::Linear => x,
        CrossfadeCurve::Smoothstep => x * x * (3.0 - 2.0 * x),
        // Quadratic in, mirrored quadratic out.
        CrossfadeCurve::EaseInOut if x < 0.5 => 2.0 * x * x,
        CrossfadeCurve::EaseInOut => 1.0 - 2.0 * (1.0 - x) * (1.0 - x),
    }
}

/// Output-wide fade from the previous wallpaper to the current one.
///
/// Before the first `start` the progress is 0; after the fade ends it stays
/// at 1 until the next `start`.
#[derive(Debug, Clone)]
pub struct Crossfade {
    started: Option<Instant>,
    duration: Duration,
    curve: CrossfadeCurve,
}

impl Crossfade {
    pub fn new(duration: Duration, curve: CrossfadeCurve) -> Self {
        Self {
            started: None,
            duration,
            curve,
        }
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Takes effect for the next `start`.
    pub fn configure(&mut self, duration: Duration, curve: CrossfadeCurve) {
        self.duration = duration;
        self.curve = curve;
    }

    pub fn start(&mut self, now: Instant) {
        self.started = Some(now);
    }

    fn linear_progress(&self, now: Instant) -> Option<f32> {
        let start = self.started?;
        if self.duration.is_zero() {
            return Some(1.0);
        }
        let elapsed = now.saturating_duration_since(start);
        Some((elapsed.as_secs_f32() / self.duration.as_secs_f32()).min(1.0))
    }

    pub fn running(&self, now: Instant) -> bool {
        matches!(self.linear_progress(now), Some(progress) if progress < 1.0)
    }

    /// Eased progress in `[0, 1]`.
    pub fn progress(&self, now: Instant) -> f32 {
        match self.linear_progress(now) {
            None => 0.0,
            Some(progress) if progress >= 1.0 => 1.0,
            Some(progress) => ease(self.curve, progress),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sampled(curve: CrossfadeCurve) -> Vec<f32> {
        let start = Instant::now();
        let mut fade = Crossfade::new(Duration::from_millis(1000), curve);
        fade.start(start);
        (0..=10)
            .map(|tenth| fade.progress(start + Duration::from_millis(tenth * 100)))
            .collect()
    }

    #[test]
    fn every_curve_climbs_from_zero_to_one() {
        for curve in [
            CrossfadeCurve::Linear,
            CrossfadeCurve::Smoothstep,
            CrossfadeCurve::EaseInOut,
        ] {
            let samples = sampled(curve);
            assert_eq!(samples[0], 0.0, "{curve:?}");
            assert_eq!(samples[10], 1.0, "{curve:?}");
            assert!(
                samples.windows(2).all(|pair| pair[1] >= pair[0]),
                "{curve:?} went backwards: {samples:?}"
            );
        }
    }

    #[test]
    fn eased_curves_start_slow_and_meet_linear_halfway() {
        let linear = sampled(CrossfadeCurve::Linear);
        for curve in [CrossfadeCurve::Smoothstep, CrossfadeCurve::EaseInOut] {
            let eased = sampled(curve);
            assert!(eased[2] < linear[2], "{curve:?}");
            assert!(eased[8] > linear[8], "{curve:?}");
            assert!((eased[5] - 0.5).abs() < 1e-3, "{curve:?}");
        }
    }

    #[test]
    fn crossfade_runs_from_zero_to_one() {
        let start = Instant::now();
        let mut fade = Crossfade::new(Duration::from_millis(100), CrossfadeCurve::Linear);
        assert_eq!(fade.progress(start), 0.0);
        assert!(!fade.running(start));

        fade.start(start);
        assert!(fade.running(start));
        assert_eq!(fade.progress(start), 0.0);
        let mid = fade.progress(start + Duration::from_millis(50));
        assert!((mid - 0.5).abs() < 0.05);
        assert!(!fade.running(start + Duration::from_millis(100)));
        assert_eq!(fade.progress(start + Duration::from_secs(3)), 1.0);
    }

    #[test]
    fn zero_duration_finishes_immediately() {
        let now = Instant::now();
        let mut fade = Crossfade::new(Duration::ZERO, CrossfadeCurve::Smoothstep);
        fade.start(now);
        assert!(!fade.running(now));
        assert_eq!(fade.progress(now), 1.0);
    }
}
