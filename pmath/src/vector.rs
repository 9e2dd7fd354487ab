// Vector types used throughout the accelerator. Float is needed for sqrt and friends;
// the types themselves stay generic so both f32 (device-facing) and f64 (host-facing,
// matching the original's double-precision host path) share one implementation.

use crate::{max, min};

use num_traits::{Float, Signed, Zero};

use std::cmp::PartialOrd;
use std::ops::{Add, Div, Index, IndexMut, Mul, Neg, Sub};

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Vec2<T: Copy> {
    pub x: T,
    pub y: T,
}

pub type Vec2f = Vec2<f32>;
pub type Vec2i = Vec2<i32>;

impl<T: Zero + Copy> Vec2<T> {
    pub fn zero() -> Self {
        Vec2 {
            x: T::zero(),
            y: T::zero(),
        }
    }
}

impl<T: Mul<Output = T> + Add<Output = T> + Copy> Vec2<T> {
    pub fn dot(self, o: Vec2<T>) -> T {
        self.x * o.x + self.y * o.y
    }

    pub fn scale(self, s: T) -> Self {
        Vec2 {
            x: self.x * s,
            y: self.y * s,
        }
    }
}

impl<T: PartialOrd + Copy> Vec2<T> {
    pub fn max(self, o: Vec2<T>) -> Self {
        Vec2 {
            x: max(self.x, o.x),
            y: max(self.y, o.y),
        }
    }

    pub fn min(self, o: Vec2<T>) -> Self {
        Vec2 {
            x: min(self.x, o.x),
            y: min(self.y, o.y),
        }
    }
}

impl<T: Add<Output = T> + Copy> Add for Vec2<T> {
    type Output = Vec2<T>;
    fn add(self, o: Vec2<T>) -> Self {
        Vec2 {
            x: self.x + o.x,
            y: self.y + o.y,
        }
    }
}

impl<T: Sub<Output = T> + Copy> Sub for Vec2<T> {
    type Output = Vec2<T>;
    fn sub(self, o: Vec2<T>) -> Self {
        Vec2 {
            x: self.x - o.x,
            y: self.y - o.y,
        }
    }
}

impl<T: Copy> Index<usize> for Vec2<T> {
    type Output = T;
    fn index(&self, i: usize) -> &T {
        match i {
            0 => &self.x,
            1 => &self.y,
            _ => panic!("index out of range for Vec2"),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Vec3<T: Copy> {
    pub x: T,
    pub y: T,
    pub z: T,
}

pub type Vec3f = Vec3<f32>;

impl<T: Zero + Copy> Vec3<T> {
    pub fn zero() -> Self {
        Vec3 {
            x: T::zero(),
            y: T::zero(),
            z: T::zero(),
        }
    }
}

impl<T: Signed + Copy> Vec3<T> {
    pub fn abs(self) -> Self {
        Vec3 {
            x: self.x.abs(),
            y: self.y.abs(),
            z: self.z.abs(),
        }
    }
}

impl Vec3<f64> {
    pub fn comp_wise_is_neg(self) -> Vec3<bool> {
        Vec3 {
            x: self.x < 0.,
            y: self.y < 0.,
            z: self.z < 0.,
        }
    }

    pub fn to_f32(self) -> Vec3<f32> {
        Vec3 {
            x: self.x as f32,
            y: self.y as f32,
            z: self.z as f32,
        }
    }
}

impl Vec3<f32> {
    pub fn to_f64(self) -> Vec3<f64> {
        Vec3 {
            x: self.x as f64,
            y: self.y as f64,
            z: self.z as f64,
        }
    }
}

impl<T: Mul<Output = T> + Add<Output = T> + Sub<Output = T> + Copy> Vec3<T> {
    pub fn dot(self, o: Vec3<T>) -> T {
        self.x * o.x + self.y * o.y + self.z * o.z
    }

    pub fn scale(self, s: T) -> Self {
        Vec3 {
            x: self.x * s,
            y: self.y * s,
            z: self.z * s,
        }
    }

    pub fn length2(self) -> T {
        self.dot(self)
    }

    pub fn cross(self, o: Vec3<T>) -> Self {
        Vec3 {
            x: self.y * o.z - self.z * o.y,
            y: self.z * o.x - self.x * o.z,
            z: self.x * o.y - self.y * o.x,
        }
    }
}

impl<T: Div<Output = T> + Copy> Vec3<T> {
    pub fn inv_scale(self, s: T) -> Self {
        Vec3 {
            x: self.x / s,
            y: self.y / s,
            z: self.z / s,
        }
    }
}

impl<T: PartialOrd + Copy> Vec3<T> {
    pub fn max_dim(self) -> usize {
        if self.x > self.y {
            if self.x > self.z {
                0
            } else {
                2
            }
        } else if self.y > self.z {
            1
        } else {
            2
        }
    }

    pub fn max(self, o: Vec3<T>) -> Self {
        Vec3 {
            x: max(self.x, o.x),
            y: max(self.y, o.y),
            z: max(self.z, o.z),
        }
    }

    pub fn min(self, o: Vec3<T>) -> Self {
        Vec3 {
            x: min(self.x, o.x),
            y: min(self.y, o.y),
            z: min(self.z, o.z),
        }
    }
}

impl<T: Float + Copy> Vec3<T> {
    pub fn length(self) -> T {
        self.length2().sqrt()
    }

    pub fn normalize(self) -> Self {
        let scale = T::one() / self.length();
        self.scale(scale)
    }
}

impl<T: Add<Output = T> + Copy> Add for Vec3<T> {
    type Output = Vec3<T>;
    fn add(self, o: Vec3<T>) -> Self {
        Vec3 {
            x: self.x + o.x,
            y: self.y + o.y,
            z: self.z + o.z,
        }
    }
}

impl<T: Sub<Output = T> + Copy> Sub for Vec3<T> {
    type Output = Vec3<T>;
    fn sub(self, o: Vec3<T>) -> Self {
        Vec3 {
            x: self.x - o.x,
            y: self.y - o.y,
            z: self.z - o.z,
        }
    }
}

impl<T: Neg<Output = T> + Copy> Neg for Vec3<T> {
    type Output = Vec3<T>;
    fn neg(self) -> Self {
        Vec3 {
            x: -self.x,
            y: -self.y,
            z: -self.z,
        }
    }
}

impl<T: Copy> Index<usize> for Vec3<T> {
    type Output = T;
    fn index(&self, i: usize) -> &T {
        match i {
            0 => &self.x,
            1 => &self.y,
            2 => &self.z,
            _ => panic!("index out of range for Vec3"),
        }
    }
}

impl<T: Copy> IndexMut<usize> for Vec3<T> {
    fn index_mut(&mut self, i: usize) -> &mut T {
        match i {
            0 => &mut self.x,
            1 => &mut self.y,
            2 => &mut self.z,
            _ => panic!("index out of range for Vec3"),
        }
    }
}

/// A homogeneous 4-vector, used only as matrix rows/columns.
#[derive(Copy, Clone, Debug)]
pub struct Vec4<T: Copy> {
    pub x: T,
    pub y: T,
    pub z: T,
    pub w: T,
}

impl<T: Mul<Output = T> + Add<Output = T> + Copy> Vec4<T> {
    pub fn scale(self, s: T) -> Self {
        Vec4 {
            x: self.x * s,
            y: self.y * s,
            z: self.z * s,
            w: self.w * s,
        }
    }

    /// Dot product treating `vec`'s w component as 1 (point transform).
    pub fn dot_one(self, vec: Vec3<T>) -> T {
        self.x * vec.x + self.y * vec.y + self.z * vec.z + self.w
    }

    /// Dot product treating `vec`'s w component as 0 (vector transform).
    pub fn dot_zero(self, vec: Vec3<T>) -> T {
        self.x * vec.x + self.y * vec.y + self.z * vec.z
    }
}

impl<T: Add<Output = T> + Sub<Output = T> + Mul<Output = T> + Copy> Vec4<T> {
    /// Linear interpolation, used to blend the rows of two `Mat3x4`s for motion blur.
    pub fn lerp(self, o: Vec4<T>, time: T) -> Self {
        Vec4 {
            x: self.x + (o.x - self.x) * time,
            y: self.y + (o.y - self.y) * time,
            z: self.z + (o.z - self.z) * time,
            w: self.w + (o.w - self.w) * time,
        }
    }
}

impl<T: Copy> Index<usize> for Vec4<T> {
    type Output = T;
    fn index(&self, i: usize) -> &T {
        match i {
            0 => &self.x,
            1 => &self.y,
            2 => &self.z,
            3 => &self.w,
            _ => panic!("index out of range for Vec4"),
        }
    }
}
