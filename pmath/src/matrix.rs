// A 3x4 affine matrix (the implicit fourth row is always (0, 0, 0, 1)). This is the only
// matrix shape the accelerator needs: instance and motion transforms are affine, never
// projective, so carrying a full 4x4 would waste a row of multiplies on every transform.

use crate::numbers::Float;
use crate::vector::{Vec3, Vec4};

use std::ops::Mul;

#[derive(Clone, Copy, Debug)]
pub struct Mat3x4<T: Float> {
    m: [Vec4<T>; 3], // row-major
}

impl<T: Float> Mat3x4<T> {
    pub fn new(m: [Vec4<T>; 3]) -> Self {
        Mat3x4 { m }
    }

    pub fn new_identity() -> Self {
        Mat3x4 {
            m: [
                Vec4 {
                    x: T::one(),
                    y: T::zero(),
                    z: T::zero(),
                    w: T::zero(),
                },
                Vec4 {
                    x: T::zero(),
                    y: T::one(),
                    z: T::zero(),
                    w: T::zero(),
                },
                Vec4 {
                    x: T::zero(),
                    y: T::zero(),
                    z: T::one(),
                    w: T::zero(),
                },
            ],
        }
    }

    pub fn new_translate(trans: Vec3<T>) -> Self {
        Mat3x4 {
            m: [
                Vec4 {
                    x: T::one(),
                    y: T::zero(),
                    z: T::zero(),
                    w: trans.x,
                },
                Vec4 {
                    x: T::zero(),
                    y: T::one(),
                    z: T::zero(),
                    w: trans.y,
                },
                Vec4 {
                    x: T::zero(),
                    y: T::zero(),
                    z: T::one(),
                    w: trans.z,
                },
            ],
        }
    }

    pub fn new_scale(scale: Vec3<T>) -> Self {
        Mat3x4 {
            m: [
                Vec4 {
                    x: scale.x,
                    y: T::zero(),
                    z: T::zero(),
                    w: T::zero(),
                },
                Vec4 {
                    x: T::zero(),
                    y: scale.y,
                    z: T::zero(),
                    w: T::zero(),
                },
                Vec4 {
                    x: T::zero(),
                    y: T::zero(),
                    z: scale.z,
                    w: T::zero(),
                },
            ],
        }
    }

    pub fn new_rotate(deg: T, axis: Vec3<T>) -> Self {
        let axis = axis.normalize();
        let rad = deg.to_radians();
        let (sin, cos) = rad.sin_cos();
        let one_m_cos = T::one() - cos;

        Mat3x4 {
            m: [
                Vec4 {
                    x: axis.x * axis.x + (T::one() - axis.x * axis.x) * cos,
                    y: axis.x * axis.y * one_m_cos - axis.z * sin,
                    z: axis.x * axis.z * one_m_cos + axis.y * sin,
                    w: T::zero(),
                },
                Vec4 {
                    x: axis.x * axis.y * one_m_cos + axis.z * sin,
                    y: axis.y * axis.y + (T::one() - axis.y * axis.y) * cos,
                    z: axis.y * axis.z * one_m_cos - axis.x * sin,
                    w: T::zero(),
                },
                Vec4 {
                    x: axis.x * axis.z * one_m_cos - axis.y * sin,
                    y: axis.y * axis.z * one_m_cos + axis.x * sin,
                    z: axis.z * axis.z + (T::one() - axis.z * axis.z) * cos,
                    w: T::zero(),
                },
            ],
        }
    }

    pub fn row(self, i: usize) -> Vec4<T> {
        self.m[i]
    }

    /// Determinant of the (implicit) 4x4 matrix with bottom row (0, 0, 0, 1) — this is just
    /// the determinant of the upper-left 3x3 block.
    pub fn determinant(self) -> T {
        let m = &self.m;
        m[0].x * (m[1].y * m[2].z - m[1].z * m[2].y)
            - m[0].y * (m[1].x * m[2].z - m[1].z * m[2].x)
            + m[0].z * (m[1].x * m[2].y - m[1].y * m[2].x)
    }

    pub fn is_invertible(self) -> bool {
        self.determinant() != T::zero()
    }

    /// Inverts the affine transform. Callers must check `is_invertible` first (a singular
    /// instance transform is a scene-authoring error the builder refuses to guess around).
    pub fn inverse(self) -> Self {
        let m = &self.m;
        let inv_det = T::one() / self.determinant();

        // Cofactor-expand the 3x3 rotation/scale block, then solve the translation so that
        // inverse * self == identity.
        let c00 = m[1].y * m[2].z - m[1].z * m[2].y;
        let c01 = m[1].z * m[2].x - m[1].x * m[2].z;
        let c02 = m[1].x * m[2].y - m[1].y * m[2].x;
        let c10 = m[0].z * m[2].y - m[0].y * m[2].z;
        let c11 = m[0].x * m[2].z - m[0].z * m[2].x;
        let c12 = m[0].y * m[2].x - m[0].x * m[2].y;
        let c20 = m[0].y * m[1].z - m[0].z * m[1].y;
        let c21 = m[0].z * m[1].x - m[0].x * m[1].z;
        let c22 = m[0].x * m[1].y - m[0].y * m[1].x;

        let r0 = Vec4 {
            x: c00 * inv_det,
            y: c10 * inv_det,
            z: c20 * inv_det,
            w: T::zero(),
        };
        let r1 = Vec4 {
            x: c01 * inv_det,
            y: c11 * inv_det,
            z: c21 * inv_det,
            w: T::zero(),
        };
        let r2 = Vec4 {
            x: c02 * inv_det,
            y: c12 * inv_det,
            z: c22 * inv_det,
            w: T::zero(),
        };

        let trans = Vec3 {
            x: m[0].w,
            y: m[1].w,
            z: m[2].w,
        };
        let inv_rot = Mat3x4 {
            m: [r0, r1, r2],
        };
        let inv_trans = -inv_rot.mul_vec_zero(trans);

        Mat3x4 {
            m: [
                Vec4 { w: inv_trans.x, ..r0 },
                Vec4 { w: inv_trans.y, ..r1 },
                Vec4 { w: inv_trans.z, ..r2 },
            ],
        }
    }

    /// Transforms `vec` as a point (implicit w = 1).
    pub fn mul_vec_one(self, vec: Vec3<T>) -> Vec3<T> {
        Vec3 {
            x: self.m[0].dot_one(vec),
            y: self.m[1].dot_one(vec),
            z: self.m[2].dot_one(vec),
        }
    }

    /// Transforms `vec` as a direction (implicit w = 0, translation dropped).
    pub fn mul_vec_zero(self, vec: Vec3<T>) -> Vec3<T> {
        Vec3 {
            x: self.m[0].dot_zero(vec),
            y: self.m[1].dot_zero(vec),
            z: self.m[2].dot_zero(vec),
        }
    }

    /// Componentwise linear interpolation between two transforms, used to sample a
    /// `MotionSystem` segment at an intermediate ray time.
    pub fn lerp(self, other: Self, time: T) -> Self {
        Mat3x4 {
            m: [
                self.m[0].lerp(other.m[0], time),
                self.m[1].lerp(other.m[1], time),
                self.m[2].lerp(other.m[2], time),
            ],
        }
    }
}

impl<T: Float> Mul for Mat3x4<T> {
    type Output = Mat3x4<T>;

    fn mul(self, o: Mat3x4<T>) -> Mat3x4<T> {
        // Treat `o`'s implicit fourth row as (0, 0, 0, 1) while composing.
        let col = |j: usize| Vec3 {
            x: o.m[0][j],
            y: o.m[1][j],
            z: o.m[2][j],
        };
        let mul_row = |row: Vec4<T>| Vec4 {
            x: row.x * col(0).x + row.y * col(0).y + row.z * col(0).z,
            y: row.x * col(1).x + row.y * col(1).y + row.z * col(1).z,
            z: row.x * col(2).x + row.y * col(2).y + row.z * col(2).z,
            w: row.dot_one(Vec3 {
                x: o.m[0].w,
                y: o.m[1].w,
                z: o.m[2].w,
            }),
        };
        Mat3x4 {
            m: [mul_row(self.m[0]), mul_row(self.m[1]), mul_row(self.m[2])],
        }
    }
}
