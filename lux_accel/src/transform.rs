// A cached affine transform: the matrix and its inverse are computed once, since both
// directions are needed repeatedly during traversal (forward for vertex instancing,
// inverse for transforming the ray into a leaf's local frame).

use pmath::matrix::Mat3x4;
use pmath::ray::Ray as PRay;
use pmath::vector::Vec3;

#[derive(Clone, Copy, Debug)]
pub struct Transform {
    mat: Mat3x4<f64>,
    inv: Mat3x4<f64>,
}

impl Transform {
    pub fn new(mat: Mat3x4<f64>) -> Self {
        Transform {
            mat,
            inv: mat.inverse(),
        }
    }

    pub fn identity() -> Self {
        let m = Mat3x4::new_identity();
        Transform { mat: m, inv: m }
    }

    pub fn mat(&self) -> Mat3x4<f64> {
        self.mat
    }

    pub fn inv(&self) -> Mat3x4<f64> {
        self.inv
    }

    pub fn inverse(&self) -> Transform {
        Transform {
            mat: self.inv,
            inv: self.mat,
        }
    }

    pub fn transform_point(&self, p: Vec3<f64>) -> Vec3<f64> {
        self.mat.mul_vec_one(p)
    }

    pub fn transform_vector(&self, v: Vec3<f64>) -> Vec3<f64> {
        self.mat.mul_vec_zero(v)
    }

    /// Transforms `ray` into this transform's local frame (applies `self`, not its inverse
    /// — callers pass the *inverse* instance transform here to go world -> local).
    pub fn transform_ray(&self, ray: PRay<f64>) -> PRay<f64> {
        PRay {
            org: self.transform_point(ray.org),
            dir: self.transform_vector(ray.dir),
            time: ray.time,
            t_near: ray.t_near,
            t_far: ray.t_far,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn translate_then_inverse_is_identity() {
        let t = Transform::new(Mat3x4::new_translate(Vec3 { x: 10.0, y: 0.0, z: 0.0 }));
        let p = Vec3 { x: 0.25, y: 0.25, z: 1.0 };
        let world = t.transform_point(p);
        let back = t.inverse().transform_point(world);
        assert!((back.x - p.x).abs() < 1e-9);
        assert!((back.y - p.y).abs() < 1e-9);
        assert!((back.z - p.z).abs() < 1e-9);
    }
}
