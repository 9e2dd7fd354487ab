// Holds traits used throughout the crate to keep float-generic code ergonomic.

use num_traits;

/// Our own float trait layered on top of `num_traits::Float`, adding the constants and
/// helpers that come up constantly in geometric code (and that `num_traits` doesn't carry).
pub trait Float: num_traits::Float + num_traits::Bounded {
    const PI: Self;
    const INV_PI: Self;

    fn two() -> Self;
    fn half() -> Self;
}

impl Float for f32 {
    const PI: Self = 3.14159265358979323846f32;
    const INV_PI: Self = 0.31830988618379067154f32;

    fn two() -> Self {
        2f32
    }

    fn half() -> Self {
        0.5f32
    }
}

impl Float for f64 {
    const PI: Self = 3.14159265358979323846;
    const INV_PI: Self = 0.31830988618379067154;

    fn two() -> Self {
        2.
    }

    fn half() -> Self {
        0.5
    }
}
