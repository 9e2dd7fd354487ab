// Geometry primitives: the ray and hit types every tree intersects against, plain
// triangle intersection, and the SIMD-lane "quad ray" / "quad triangle" shapes the QBVH
// leaves use.

use pmath::bbox::BBox3;
use pmath::ray::Ray as PRay;
use pmath::vector::Vec3;

/// A single ray, carried through every traversal routine in this crate.
pub type Ray = PRay<f64>;

/// Sentinel `meshIndex` value meaning "no hit".
pub const NULL_INDEX: u32 = u32::MAX;

/// The result of intersecting a ray against the scene: hit distance, two barycentric
/// coordinates, and the (mesh, triangle) identifying the hit primitive. On miss every
/// field but `mesh_index` is indeterminate, so only `mesh_index` is read by callers.
#[derive(Clone, Copy, Debug)]
pub struct RayHit {
    pub t: f64,
    pub b1: f64,
    pub b2: f64,
    pub mesh_index: u32,
    pub triangle_index: u32,
}

impl RayHit {
    pub fn miss() -> Self {
        RayHit {
            t: f64::INFINITY,
            b1: 0.0,
            b2: 0.0,
            mesh_index: NULL_INDEX,
            triangle_index: NULL_INDEX,
        }
    }

    pub fn is_miss(&self) -> bool {
        self.mesh_index == NULL_INDEX
    }
}

/// A triangle given by its three world-space vertices at the ray's time.
#[derive(Clone, Copy, Debug)]
pub struct Triangle {
    pub v0: Vec3<f64>,
    pub v1: Vec3<f64>,
    pub v2: Vec3<f64>,
}

impl Triangle {
    pub fn bound(&self) -> BBox3<f64> {
        BBox3::from_pnts(self.v0, self.v1).combine_pnt(self.v2)
    }

    pub fn centroid(&self) -> Vec3<f64> {
        (self.v0 + self.v1 + self.v2).scale(1.0 / 3.0)
    }

    /// Möller–Trumbore ray/triangle intersection. Returns `(t, b1, b2)` when the ray hits
    /// the triangle within `(ray.t_near, max_t]`; `b1, b2` are the barycentric weights of
    /// `v1` and `v2` (so the weight of `v0` is `1 - b1 - b2`).
    pub fn intersect(&self, ray: Ray, max_t: f64) -> Option<(f64, f64, f64)> {
        let e1 = self.v1 - self.v0;
        let e2 = self.v2 - self.v0;
        let pvec = ray.dir.cross(e2);
        let det = e1.dot(pvec);
        if det.abs() < 1e-14 {
            return None;
        }
        let inv_det = 1.0 / det;

        let tvec = ray.org - self.v0;
        let b1 = tvec.dot(pvec) * inv_det;
        if b1 < 0.0 || b1 > 1.0 {
            return None;
        }

        let qvec = tvec.cross(e1);
        let b2 = ray.dir.dot(qvec) * inv_det;
        if b2 < 0.0 || b1 + b2 > 1.0 {
            return None;
        }

        let t = e2.dot(qvec) * inv_det;
        if t > ray.t_near && t <= max_t {
            Some((t, b1, b2))
        } else {
            None
        }
    }

    pub fn intersect_p(&self, ray: Ray, max_t: f64) -> bool {
        self.intersect(ray, max_t).is_some()
    }
}

/// Number of lanes packed per SIMD ray/triangle group.
pub const QUAD_WIDTH: usize = 4;

/// Four triangles packed laterally so the QBVH leaf traversal can test them together.
/// Unused lanes (when a leaf holds fewer than four triangles) are filled with a
/// degenerate triangle that can never report a hit.
#[derive(Clone, Copy, Debug)]
pub struct QuadTriangle {
    pub v0: [Vec3<f64>; QUAD_WIDTH],
    pub v1: [Vec3<f64>; QUAD_WIDTH],
    pub v2: [Vec3<f64>; QUAD_WIDTH],
    pub mesh_index: [u32; QUAD_WIDTH],
    pub triangle_index: [u32; QUAD_WIDTH],
    pub active: [bool; QUAD_WIDTH],
}

impl QuadTriangle {
    /// A quad-triangle with every lane flagged inactive; used to pad a leaf's final group.
    pub fn empty() -> Self {
        let degenerate = Vec3::zero();
        QuadTriangle {
            v0: [degenerate; QUAD_WIDTH],
            v1: [degenerate; QUAD_WIDTH],
            v2: [degenerate; QUAD_WIDTH],
            mesh_index: [NULL_INDEX; QUAD_WIDTH],
            triangle_index: [NULL_INDEX; QUAD_WIDTH],
            active: [false; QUAD_WIDTH],
        }
    }

    pub fn lane(&self, i: usize) -> Option<Triangle> {
        if self.active[i] {
            Some(Triangle {
                v0: self.v0[i],
                v1: self.v1[i],
                v2: self.v2[i],
            })
        } else {
            None
        }
    }

    /// Scalar fallback across the four lanes; a true SIMD backend would vectorize this,
    /// but the host routine only needs byte-identical results with the device kernel, not
    /// identical instruction selection.
    pub fn intersect(&self, ray: Ray, max_t: f64, hit: &mut RayHit) -> bool {
        let mut shrinking_max_t = max_t;
        let mut found = false;
        for i in 0..QUAD_WIDTH {
            if let Some(tri) = self.lane(i) {
                if let Some((t, b1, b2)) = tri.intersect(ray, shrinking_max_t) {
                    shrinking_max_t = t;
                    hit.t = t;
                    hit.b1 = b1;
                    hit.b2 = b2;
                    hit.mesh_index = self.mesh_index[i];
                    hit.triangle_index = self.triangle_index[i];
                    found = true;
                }
            }
        }
        found
    }

    pub fn intersect_p(&self, ray: Ray, max_t: f64) -> bool {
        for i in 0..QUAD_WIDTH {
            if let Some(tri) = self.lane(i) {
                if tri.intersect_p(ray, max_t) {
                    return true;
                }
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_triangle() -> Triangle {
        Triangle {
            v0: Vec3 { x: 0.0, y: 0.0, z: 0.0 },
            v1: Vec3 { x: 1.0, y: 0.0, z: 0.0 },
            v2: Vec3 { x: 0.0, y: 1.0, z: 0.0 },
        }
    }

    #[test]
    fn axis_aligned_triangle_hit_matches_scenario() {
        let tri = unit_triangle();
        let ray = Ray::new(
            Vec3 { x: 0.25, y: 0.25, z: 1.0 },
            Vec3 { x: 0.0, y: 0.0, z: -1.0 },
            0.0,
        );
        let (t, b1, b2) = tri.intersect(ray, f64::INFINITY).unwrap();
        assert!((t - 1.0).abs() < 1e-9);
        assert!((b1 + b2 - 0.5).abs() < 1e-9);
    }

    #[test]
    fn miss_when_ray_points_away() {
        let tri = unit_triangle();
        let ray = Ray::new(
            Vec3 { x: 0.25, y: 0.25, z: 1.0 },
            Vec3 { x: 0.0, y: 0.0, z: 1.0 },
            0.0,
        );
        assert!(tri.intersect(ray, f64::INFINITY).is_none());
    }

    #[test]
    fn nearer_of_two_overlapping_triangles_wins() {
        let near = Triangle {
            v0: Vec3 { x: 0.0, y: 0.0, z: 1.0 },
            v1: Vec3 { x: 1.0, y: 0.0, z: 1.0 },
            v2: Vec3 { x: 0.0, y: 1.0, z: 1.0 },
        };
        let far = Triangle {
            v0: Vec3 { x: 0.0, y: 0.0, z: 2.0 },
            v1: Vec3 { x: 1.0, y: 0.0, z: 2.0 },
            v2: Vec3 { x: 0.0, y: 1.0, z: 2.0 },
        };
        let ray = Ray::new(
            Vec3 { x: 0.3, y: 0.3, z: 0.0 },
            Vec3 { x: 0.0, y: 0.0, z: 1.0 },
            0.0,
        );
        let mut max_t = f64::INFINITY;
        let (t_near, _, _) = near.intersect(ray, max_t).unwrap();
        max_t = t_near;
        assert!(far.intersect(ray, max_t).is_none());
        assert!((t_near - 1.0).abs() < 1e-9);
    }
}
