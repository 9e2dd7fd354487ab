pub mod bbox;
pub mod matrix;
pub mod numbers;
pub mod ray;
pub mod vector;

use numbers::Float;
use vector::Vec3;

/// This is used so that we can have efficient comparisons
/// with `PartialOrd` types (like floats). According to the compiler
/// explorer, this converts to the proper minsd/maxsd instruction:
pub fn min<T: PartialOrd>(v0: T, v1: T) -> T {
    if v0 < v1 {
        v0
    } else {
        v1
    }
}

/// See `min` for details.
pub fn max<T: PartialOrd>(v0: T, v1: T) -> T {
    if v0 > v1 {
        v0
    } else {
        v1
    }
}

/// Aligns `vec` so that it faces the same direction as `refv`, negating it if needed.
pub fn align<T: Float>(refv: Vec3<T>, vec: Vec3<T>) -> Vec3<T> {
    if refv.dot(vec) < T::zero() {
        -vec
    } else {
        vec
    }
}
