//! Ray-intersection acceleration: BVH, QBVH and MQBVH construction and traversal, a device
//! abstraction for running the same traversal on a compute device, and a batch dispatcher
//! that pipelines ray buffers across it. Everything here is built once from an immutable
//! mesh list and is read-only during intersection, except MQBVH's `update`, which rebuilds
//! only the top-level tree.

pub mod bvh;
pub mod config;
pub mod device;
pub mod dispatcher;
pub mod error;
pub mod geometry;
pub mod kernel;
pub mod mesh;
pub mod motion;
pub mod mqbvh;
pub mod paging;
pub mod qbvh;
pub mod transform;

pub use bvh::Bvh;
pub use config::{AcceleratorType, BvhParams, Config, DeviceLimits, QbvhParams};
pub use error::{AccelError, AccelResult};
pub use geometry::{Ray, RayHit};
pub use mesh::{ExtAttributes, Mesh, OwnedMesh};
pub use motion::{InterpolatedTransform, MotionSystem};
pub use mqbvh::Mqbvh;
pub use qbvh::Qbvh;
pub use transform::Transform;

/// The host-side accelerator, instantiated for whichever tree family `Config` selects.
/// `Mqbvh` is the only variant that owns `Arc<Mesh>` (its per-mesh QBVH cache is keyed by
/// mesh identity); `Bvh`/`Qbvh` borrow the mesh list for the duration of a call instead.
pub enum Accelerator {
    Bvh(Bvh),
    Qbvh(Qbvh),
    Mqbvh(Box<Mqbvh>),
}

impl Accelerator {
    /// Builds the tree family selected by `config.accelerator_type`.
    pub fn build(meshes: &[std::sync::Arc<Mesh>], config: Config) -> AccelResult<Self> {
        let config = config.validated()?;
        match config.accelerator_type {
            AcceleratorType::Bvh => {
                let owned: Vec<Mesh> = meshes.iter().map(|m| m.as_ref().clone()).collect();
                Ok(Accelerator::Bvh(Bvh::build(&owned, config.bvh)?))
            }
            AcceleratorType::Qbvh => {
                let owned: Vec<Mesh> = meshes.iter().map(|m| m.as_ref().clone()).collect();
                Ok(Accelerator::Qbvh(Qbvh::build(&owned, config.qbvh)?))
            }
            AcceleratorType::Mqbvh => Ok(Accelerator::Mqbvh(Box::new(Mqbvh::build(meshes, config.qbvh)?))),
        }
    }

    /// Refreshes per-instance transforms. Only meaningful for `Mqbvh`; a no-op otherwise,
    /// since BVH/QBVH have no incremental update path and require a full rebuild.
    pub fn update(&mut self, meshes: &[std::sync::Arc<Mesh>]) -> AccelResult<()> {
        match self {
            Accelerator::Mqbvh(mqbvh) => mqbvh.update(meshes),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pmath::ray::Ray as PRay;
    use pmath::vector::Vec3;
    use std::sync::Arc;

    fn single_triangle_mesh() -> Arc<Mesh> {
        Arc::new(Mesh::Triangle(OwnedMesh {
            vertices: vec![
                Vec3 { x: 0.0, y: 0.0, z: 0.0 },
                Vec3 { x: 1.0, y: 0.0, z: 0.0 },
                Vec3 { x: 0.0, y: 1.0, z: 0.0 },
            ],
            indices: vec![[0, 1, 2]],
            ext: None,
        }))
    }

    #[test]
    fn bvh_qbvh_and_mqbvh_agree_on_the_same_scene() {
        let meshes = vec![single_triangle_mesh()];
        let ray = PRay::new(Vec3 { x: 0.25, y: 0.25, z: 1.0 }, Vec3 { x: 0.0, y: 0.0, z: -1.0 }, 0.0);

        let bvh = Accelerator::build(&meshes, Config { accelerator_type: AcceleratorType::Bvh, ..Config::default() }).unwrap();
        let qbvh = Accelerator::build(&meshes, Config { accelerator_type: AcceleratorType::Qbvh, ..Config::default() }).unwrap();
        let mqbvh = Accelerator::build(&meshes, Config { accelerator_type: AcceleratorType::Mqbvh, ..Config::default() }).unwrap();

        let owned: Vec<Mesh> = meshes.iter().map(|m| m.as_ref().clone()).collect();
        let bvh_hit = match &bvh {
            Accelerator::Bvh(b) => b.intersect(&owned, ray),
            _ => unreachable!(),
        };
        let qbvh_hit = match &qbvh {
            Accelerator::Qbvh(q) => q.intersect(ray),
            _ => unreachable!(),
        };
        let mqbvh_hit = match &mqbvh {
            Accelerator::Mqbvh(m) => m.intersect(ray),
            _ => unreachable!(),
        };

        assert!(!bvh_hit.is_miss());
        assert!((bvh_hit.t - qbvh_hit.t).abs() < 1e-6);
        assert!((bvh_hit.t - mqbvh_hit.t).abs() < 1e-6);
    }
}
