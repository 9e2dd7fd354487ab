// Configuration keys enumerated in the external-interfaces section, collected into one
// struct so a caller can build it from whatever property/ini system they already have
// rather than the accelerator parsing text itself.

use crate::error::{AccelError, AccelResult};

/// Which tree family `Dispatcher::set_data_set` should instantiate a kernel for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AcceleratorType {
    Bvh,
    Qbvh,
    Mqbvh,
}

impl Default for AcceleratorType {
    fn default() -> Self {
        AcceleratorType::Bvh
    }
}

impl AcceleratorType {
    pub fn parse(s: &str) -> AccelResult<Self> {
        match s {
            "BVH" | "bvh" => Ok(AcceleratorType::Bvh),
            "QBVH" | "qbvh" => Ok(AcceleratorType::Qbvh),
            "MQBVH" | "mqbvh" => Ok(AcceleratorType::Mqbvh),
            other => Err(AccelError::configuration(format!(
                "unknown accelerator.type '{}'",
                other
            ))),
        }
    }
}

/// `accelerator.bvh.*` parameters driving SAH split selection.
///
/// Defaults match the original `treeType = 4, costSamples = 0, isectCost = 80,
/// traversalCost = 1, emptyBonus = 0.5`.
#[derive(Clone, Copy, Debug)]
pub struct BvhParams {
    pub tree_type: u32,
    pub cost_samples: u32,
    pub isect_cost: f32,
    pub traversal_cost: f32,
    pub empty_bonus: f32,
}

impl Default for BvhParams {
    fn default() -> Self {
        BvhParams {
            tree_type: 4,
            cost_samples: 0,
            isect_cost: 80.0,
            traversal_cost: 1.0,
            empty_bonus: 0.5,
        }
    }
}

impl BvhParams {
    /// Snaps `tree_type` up to the nearest of {2, 4, 8} and validates the rest.
    pub fn validated(mut self) -> AccelResult<Self> {
        self.tree_type = match self.tree_type {
            0..=2 => 2,
            3..=4 => 4,
            _ => 8,
        };
        if self.empty_bonus < 0.0 || self.empty_bonus > 1.0 {
            return Err(AccelError::configuration(format!(
                "accelerator.bvh.emptybonus {} out of range [0, 1]",
                self.empty_bonus
            )));
        }
        Ok(self)
    }
}

/// `accelerator.qbvh.*` parameters. `full_sweep_threshold` resolves the distilled spec's
/// silence on the exact number: below this many primitives in a range, every primitive is
/// scanned for binning rather than every `skip_factor`-th.
#[derive(Clone, Copy, Debug)]
pub struct QbvhParams {
    pub cost_samples: u32,
    pub isect_cost: f32,
    pub traversal_cost: f32,
    pub empty_bonus: f32,
    pub skip_factor: usize,
    pub full_sweep_threshold: usize,
    pub max_stack_size: usize,
}

impl Default for QbvhParams {
    fn default() -> Self {
        QbvhParams {
            cost_samples: 0,
            isect_cost: 80.0,
            traversal_cost: 1.0,
            empty_bonus: 0.5,
            skip_factor: 1,
            full_sweep_threshold: 4 * NB_BINS,
            max_stack_size: 24,
        }
    }
}

/// Number of bins used by the QBVH builder's binned SAH evaluation.
pub const NB_BINS: usize = 12;

/// `opencl.*` keys governing batch size and device-side paging.
#[derive(Clone, Copy, Debug)]
pub struct DeviceLimits {
    pub task_count: usize,
    pub max_page_size_bytes: u64,
}

impl Default for DeviceLimits {
    fn default() -> Self {
        DeviceLimits {
            task_count: 65536,
            max_page_size_bytes: 256 * 1024 * 1024,
        }
    }
}

/// Top-level configuration aggregating every key enumerated under "External interfaces".
#[derive(Clone, Copy, Debug, Default)]
pub struct Config {
    pub accelerator_type: AcceleratorType,
    pub bvh: BvhParams,
    pub qbvh: QbvhParams,
    pub device: DeviceLimits,
}

impl Config {
    pub fn validated(mut self) -> AccelResult<Self> {
        self.bvh = self.bvh.validated()?;
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tree_type_snaps_to_nearest_allowed() {
        let p = BvhParams { tree_type: 3, ..Default::default() }.validated().unwrap();
        assert_eq!(p.tree_type, 4);
        let p = BvhParams { tree_type: 1, ..Default::default() }.validated().unwrap();
        assert_eq!(p.tree_type, 2);
        let p = BvhParams { tree_type: 5, ..Default::default() }.validated().unwrap();
        assert_eq!(p.tree_type, 8);
    }

    #[test]
    fn unknown_accelerator_type_is_configuration_error() {
        let err = AcceleratorType::parse("FOO").unwrap_err();
        assert!(matches!(err, AccelError::Configuration { .. }));
    }

    #[test]
    fn default_config_validates() {
        Config::default().validated().unwrap();
    }
}
