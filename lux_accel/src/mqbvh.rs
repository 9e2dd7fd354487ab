// Top-level 4-way tree over per-mesh QBVHs, composing per-instance transforms and motion
// systems. `Update()` rebuilds only the top level, reusing cached per-mesh QBVHs keyed by
// source-mesh identity — the subsystem's only mutable state outside construction.

use crate::config::QbvhParams;
use crate::error::AccelResult;
use crate::geometry::{Ray, RayHit};
use crate::mesh::Mesh;
use crate::qbvh::Qbvh;
use pmath::matrix::Mat3x4;

use once_cell::sync::OnceCell;
use std::collections::HashMap;
use std::sync::Arc;

/// How a leaf's ray should be transformed before delegating to its per-mesh QBVH.
enum LeafKind {
    Plain,
    Instanced { inverse: Mat3x4<f64> },
    Motion { source: Arc<Mesh> },
}

struct Leaf {
    qbvh: Arc<Qbvh>,
    kind: LeafKind,
    triangle_index_offset: u32,
    /// The instance's position in the scene's mesh list, reported in `RayHit::mesh_index`.
    /// Every per-mesh QBVH is built over a single source mesh and so always bakes
    /// `mesh_index = 0` into its own quads; that value identifies a triangle's mesh within
    /// the per-mesh QBVH, not the instance within the scene.
    mesh_index: u32,
}

/// Keys the per-mesh QBVH cache by the stable identity of the mesh's root source (an
/// owned triangle mesh), not by pointer — two `Arc<Mesh>` clones of the same source mesh
/// must share one cached QBVH.
type MeshKey = usize;

fn mesh_key(mesh: &Mesh) -> MeshKey {
    mesh as *const Mesh as usize
}

/// A two-level accelerator: a top-level QBVH whose leaves reference per-mesh QBVHs
/// through instance/motion descriptors.
pub struct Mqbvh {
    top_level: Qbvh,
    leaves: Vec<Leaf>,
    qbvh_cache: HashMap<MeshKey, Arc<Qbvh>>,
    params: QbvhParams,
}

impl Mqbvh {
    /// Builds one QBVH per unique underlying mesh and a top-level tree over the
    /// instances, building independent per-mesh QBVHs concurrently with a bounded worker
    /// pool sized to available parallelism.
    pub fn build(meshes: &[Arc<Mesh>], params: QbvhParams) -> AccelResult<Self> {
        let worker_count = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
            .min(meshes.len().max(1));
        Self::build_with_workers(meshes, params, worker_count)
    }

    /// Sequential alternative to `build`, matching the original's single-threaded build.
    pub fn build_single_threaded(meshes: &[Arc<Mesh>], params: QbvhParams) -> AccelResult<Self> {
        Self::build_with_workers(meshes, params, 1)
    }

    fn build_with_workers(meshes: &[Arc<Mesh>], params: QbvhParams, worker_count: usize) -> AccelResult<Self> {
        let mut unique_sources: Vec<Arc<Mesh>> = Vec::new();
        let mut seen: HashMap<MeshKey, usize> = HashMap::new();
        for mesh in meshes {
            let key = mesh_key(mesh.root_source());
            if !seen.contains_key(&key) {
                seen.insert(key, unique_sources.len());
                unique_sources.push(Arc::new(mesh.root_source().clone()));
            }
        }

        let built: Vec<OnceCell<Arc<Qbvh>>> = unique_sources.iter().map(|_| OnceCell::new()).collect();
        if worker_count <= 1 {
            for (i, source) in unique_sources.iter().enumerate() {
                let qbvh = Qbvh::build(std::slice::from_ref(source.as_ref()), params)?;
                built[i].set(Arc::new(qbvh)).ok();
            }
        } else {
            crossbeam::thread::scope(|scope| -> AccelResult<()> {
                let chunk_size = (unique_sources.len() + worker_count - 1) / worker_count.max(1);
                let chunk_size = chunk_size.max(1);
                for (chunk_start, chunk) in unique_sources.chunks(chunk_size).enumerate() {
                    let built = &built;
                    let offset = chunk_start * chunk_size;
                    scope.spawn(move |_| {
                        for (i, source) in chunk.iter().enumerate() {
                            if let Ok(qbvh) = Qbvh::build(std::slice::from_ref(source.as_ref()), params) {
                                built[offset + i].set(Arc::new(qbvh)).ok();
                            }
                        }
                    });
                }
                Ok(())
            })
            .expect("worker thread panicked during concurrent QBVH build")?;
        }

        let mut qbvh_cache = HashMap::new();
        for (key, idx) in &seen {
            if let Some(qbvh) = built[*idx].get() {
                qbvh_cache.insert(*key, qbvh.clone());
            }
        }

        let mut mqbvh = Mqbvh {
            top_level: Qbvh::build(&[], params)?,
            leaves: Vec::new(),
            qbvh_cache,
            params,
        };
        mqbvh.rebuild_top_level(meshes)?;
        Ok(mqbvh)
    }

    /// Rebuilds only the top-level tree from the current per-instance transforms,
    /// reusing cached per-mesh QBVHs. Calling this with unchanged transforms produces a
    /// tree whose traversal results match the pre-update tree exactly.
    pub fn update(&mut self, meshes: &[Arc<Mesh>]) -> AccelResult<()> {
        self.rebuild_top_level(meshes)
    }

    fn rebuild_top_level(&mut self, meshes: &[Arc<Mesh>]) -> AccelResult<()> {
        let mut leaves = Vec::with_capacity(meshes.len());
        let mut offset = 0u32;
        let mut one_leaf_meshes = Vec::with_capacity(meshes.len());

        for (scene_mesh_index, mesh) in meshes.iter().enumerate() {
            let source_key = mesh_key(mesh.root_source());
            let qbvh = self
                .qbvh_cache
                .get(&source_key)
                .expect("every mesh's source must have been built into the cache")
                .clone();

            let kind = match mesh.as_ref() {
                Mesh::Triangle(_) => LeafKind::Plain,
                Mesh::TriangleInstance { transform, .. } => LeafKind::Instanced {
                    inverse: transform.inv(),
                },
                Mesh::TriangleMotion { .. } => LeafKind::Motion { source: mesh.clone() },
            };

            // The top level needs one "mesh" per instance so the outer QBVH can bound
            // each instance independently; we build a single-mesh placeholder whose
            // bound is the instance's world-space bound. Its baked `mesh_index` (the
            // position of this placeholder within `one_leaf_meshes`) is what
            // `Qbvh::candidate_leaves` returns, and by construction it equals this
            // leaf's own index within `leaves` below.
            one_leaf_meshes.push(Mesh::Triangle(crate::mesh::OwnedMesh {
                vertices: instance_bound_corners(mesh.as_ref()),
                indices: vec![[0, 1, 2], [1, 2, 3], [4, 5, 6], [5, 6, 7]],
                ext: None,
            }));

            leaves.push(Leaf {
                qbvh,
                kind,
                triangle_index_offset: offset,
                mesh_index: scene_mesh_index as u32,
            });
            offset += mesh.triangle_count() as u32;
        }

        self.top_level = Qbvh::build(&one_leaf_meshes, self.params)?;
        self.leaves = leaves;
        Ok(())
    }

    pub fn bound(&self) -> pmath::bbox::BBox3<f64> {
        self.top_level.bound()
    }

    /// Culls instances against the top-level tree before descending into each surviving
    /// leaf's own QBVH, rather than testing every instance in the scene.
    pub fn intersect(&self, ray: Ray) -> RayHit {
        let mut best = RayHit::miss();
        let mut max_t = ray.t_far;

        let candidates = self.top_level.candidate_leaves(ray, max_t);
        for leaf_index in candidates {
            let leaf = &self.leaves[leaf_index as usize];
            let local_ray = match &leaf.kind {
                LeafKind::Plain => pmath::ray::Ray { t_far: max_t, ..ray },
                LeafKind::Instanced { inverse } => pmath::ray::Ray {
                    org: inverse.mul_vec_one(ray.org),
                    dir: inverse.mul_vec_zero(ray.dir),
                    time: ray.time,
                    t_near: ray.t_near,
                    t_far: max_t,
                },
                LeafKind::Motion { source: _ } => {
                    // The motion leaf's inverse transform is re-sampled at the ray's
                    // time on every intersection, since the instance moves.
                    let inverse = leaf_motion_inverse(leaf, ray.time);
                    pmath::ray::Ray {
                        org: inverse.mul_vec_one(ray.org),
                        dir: inverse.mul_vec_zero(ray.dir),
                        time: ray.time,
                        t_near: ray.t_near,
                        t_far: max_t,
                    }
                }
            };

            let leaf_hit = leaf.qbvh.intersect(local_ray);
            if !leaf_hit.is_miss() {
                max_t = leaf_hit.t;
                best = RayHit {
                    t: leaf_hit.t,
                    b1: leaf_hit.b1,
                    b2: leaf_hit.b2,
                    mesh_index: leaf.mesh_index,
                    triangle_index: leaf_hit.triangle_index + leaf.triangle_index_offset,
                };
            }
        }

        best
    }
}

fn leaf_motion_inverse(leaf: &Leaf, time: f64) -> Mat3x4<f64> {
    match &leaf.kind {
        LeafKind::Motion { source } => match source.as_ref() {
            Mesh::TriangleMotion { motion, .. } => motion.sample_inverse(time),
            _ => Mat3x4::new_identity(),
        },
        _ => Mat3x4::new_identity(),
    }
}

/// A cheap 8-corner "mesh" standing in for an instance's world-space bound, so the
/// top-level QBVH can bound each leaf without needing to know its internal geometry.
fn instance_bound_corners(mesh: &Mesh) -> Vec<pmath::vector::Vec3<f64>> {
    let mut bound = pmath::bbox::BBox3::new_initial();
    for triangle_index in 0..mesh.triangle_count() as u32 {
        bound = bound.combine_bnd(mesh.bound(triangle_index));
    }
    (0..8).map(|i| bound.corner(i)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::OwnedMesh;
    use crate::motion::{InterpolatedTransform, MotionSystem};
    use crate::transform::Transform;
    use pmath::ray::Ray as PRay;
    use pmath::vector::Vec3;

    fn single_triangle_source() -> Arc<Mesh> {
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
    fn instancing_offsets_triangle_index() {
        let source = single_triangle_source();
        let instance = Arc::new(Mesh::TriangleInstance {
            source: source.clone(),
            transform: Transform::new(Mat3x4::new_translate(Vec3 { x: 10.0, y: 0.0, z: 0.0 })),
        });
        let meshes = vec![source, instance];
        let mqbvh = Mqbvh::build_single_threaded(&meshes, QbvhParams::default()).unwrap();

        let ray = PRay::new(
            Vec3 { x: 10.25, y: 0.25, z: 1.0 },
            Vec3 { x: 0.0, y: 0.0, z: -1.0 },
            0.0,
        );
        let hit = mqbvh.intersect(ray);
        assert!(!hit.is_miss());
        assert!((hit.t - 1.0).abs() < 1e-6);
        assert_eq!(hit.mesh_index, 1);
    }

    #[test]
    fn update_with_unchanged_transforms_is_idempotent() {
        let source = single_triangle_source();
        let meshes = vec![source];
        let mut mqbvh = Mqbvh::build_single_threaded(&meshes, QbvhParams::default()).unwrap();
        let ray = PRay::new(Vec3 { x: 0.25, y: 0.25, z: 1.0 }, Vec3 { x: 0.0, y: 0.0, z: -1.0 }, 0.0);
        let before = mqbvh.intersect(ray);
        mqbvh.update(&meshes).unwrap();
        let after = mqbvh.intersect(ray);
        assert_eq!(before.is_miss(), after.is_miss());
        assert!((before.t - after.t).abs() < 1e-9);
    }

    #[test]
    fn motion_instance_matches_scenario() {
        let source = single_triangle_source();
        let motion = MotionSystem::new(vec![
            InterpolatedTransform {
                start_time: 0.0,
                transform: Transform::new(Mat3x4::new_translate(Vec3::zero())),
            },
            InterpolatedTransform {
                start_time: 1.0,
                transform: Transform::new(Mat3x4::new_translate(Vec3 { x: 0.0, y: 0.0, z: 1.0 })),
            },
        ]);
        let instance = Arc::new(Mesh::TriangleMotion { source: source.clone(), motion });
        let meshes = vec![source, instance];
        let mqbvh = Mqbvh::build_single_threaded(&meshes, QbvhParams::default()).unwrap();

        let ray = PRay::new(
            Vec3 { x: 0.25, y: 0.25, z: 2.0 },
            Vec3 { x: 0.0, y: 0.0, z: -1.0 },
            0.5,
        );
        let hit = mqbvh.intersect(ray);
        assert!(!hit.is_miss());
        assert!((hit.t - 1.5).abs() < 1e-6);
        assert_eq!(hit.mesh_index, 1);
    }
}
