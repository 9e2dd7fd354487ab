// Binary/N-ary BVH: top-down SAH partition over triangle soup, flattened into a packed
// array walked with a "skip index" so traversal never needs a parent stack.

use crate::config::BvhParams;
use crate::error::{AccelError, AccelResult};
use crate::geometry::{Ray, RayHit};
use crate::mesh::Mesh;
use pmath::bbox::BBox3;
use pmath::vector::Vec3;

use bumpalo::Bump;
use partition::partition;

const MAX_DEPTH: u32 = 64;

/// One leaf's worth of bookkeeping during the build; discarded once the packed array is
/// produced.
#[derive(Clone, Copy)]
struct LeafInfo {
    ordinal: u32,
    mesh_index: u32,
    triangle_index: u32,
    centroid: Vec3<f64>,
    bound: BBox3<f64>,
}

#[derive(Clone, Copy)]
enum LinearBvhNode {
    Inner {
        bound: BBox3<f32>,
        skip_index: u32,
    },
    Leaf {
        bound: BBox3<f32>,
        skip_index: u32,
        mesh_index: u32,
        triangle_index: u32,
    },
}

impl LinearBvhNode {
    fn bound(&self) -> BBox3<f32> {
        match *self {
            LinearBvhNode::Inner { bound, .. } => bound,
            LinearBvhNode::Leaf { bound, .. } => bound,
        }
    }

    fn skip_index(&self) -> u32 {
        match *self {
            LinearBvhNode::Inner { skip_index, .. } => skip_index,
            LinearBvhNode::Leaf { skip_index, .. } => skip_index,
        }
    }
}

enum TreeNode<'a> {
    Leaf {
        bound: BBox3<f64>,
        mesh_index: u32,
        triangle_index: u32,
    },
    Inner {
        bound: BBox3<f64>,
        children: Vec<&'a TreeNode<'a>>,
    },
}

fn to_f32_bbox(b: BBox3<f64>) -> BBox3<f32> {
    BBox3 {
        pmin: Vec3 {
            x: b.pmin.x as f32,
            y: b.pmin.y as f32,
            z: b.pmin.z as f32,
        },
        pmax: Vec3 {
            x: b.pmax.x as f32,
            y: b.pmax.y as f32,
            z: b.pmax.z as f32,
        },
    }
}

/// An immutable BVH over a fixed list of meshes. Triangles are never copied out of the
/// mesh; each leaf remembers only `(mesh_index, triangle_index)` and re-derives the
/// triangle's current vertices through `Mesh::triangle` at traversal time, which is what
/// lets an instanced or motion-blurred mesh participate in the same tree as plain ones.
pub struct Bvh {
    nodes: Vec<LinearBvhNode>,
    bound: BBox3<f64>,
}

impl Bvh {
    pub fn build(meshes: &[Mesh], params: BvhParams) -> AccelResult<Self> {
        let params = params.validated()?;

        let mut infos = Vec::new();
        let mut ordinal = 0u32;
        for (mesh_index, mesh) in meshes.iter().enumerate() {
            for triangle_index in 0..mesh.triangle_count() as u32 {
                let bound = mesh.bound(triangle_index);
                infos.push(LeafInfo {
                    ordinal,
                    mesh_index: mesh_index as u32,
                    triangle_index,
                    centroid: bound.centroid(),
                    bound,
                });
                ordinal += 1;
            }
        }

        let scene_bound = infos
            .iter()
            .fold(BBox3::new_initial(), |acc, info| acc.combine_bnd(info.bound));

        if infos.is_empty() {
            return Ok(Bvh {
                nodes: vec![LinearBvhNode::Inner {
                    bound: to_f32_bbox(scene_bound),
                    skip_index: 1,
                }],
                bound: scene_bound,
            });
        }

        let bump = Bump::new();
        let root = build_node(&mut infos, &params, 0, &bump)?;

        let mut nodes = Vec::new();
        flatten(&mut nodes, root);

        Ok(Bvh {
            nodes,
            bound: scene_bound,
        })
    }

    pub fn bound(&self) -> BBox3<f64> {
        self.bound
    }

    /// Finds the nearest hit, shrinking `ray.t_far` as closer triangles are found.
    pub fn intersect(&self, meshes: &[Mesh], ray: Ray) -> RayHit {
        let mut hit = RayHit::miss();
        let mut max_t = ray.t_far;
        let inv_dir = Vec3 {
            x: 1.0 / ray.dir.x,
            y: 1.0 / ray.dir.y,
            z: 1.0 / ray.dir.z,
        };
        let is_dir_neg = ray.dir.comp_wise_is_neg();

        let mut i = 0usize;
        while i < self.nodes.len() {
            let node = self.nodes[i];
            let node_bound_f64 = BBox3 {
                pmin: Vec3 {
                    x: node.bound().pmin.x as f64,
                    y: node.bound().pmin.y as f64,
                    z: node.bound().pmin.z as f64,
                },
                pmax: Vec3 {
                    x: node.bound().pmax.x as f64,
                    y: node.bound().pmax.y as f64,
                    z: node.bound().pmax.z as f64,
                },
            };
            if node_bound_f64.intersect_test(ray, inv_dir, is_dir_neg) {
                if let LinearBvhNode::Leaf {
                    mesh_index,
                    triangle_index,
                    ..
                } = node
                {
                    let tri = meshes[mesh_index as usize].triangle(ray.time, triangle_index);
                    if let Some((t, b1, b2)) = tri.intersect(ray, max_t) {
                        max_t = t;
                        hit = RayHit {
                            t,
                            b1,
                            b2,
                            mesh_index,
                            triangle_index,
                        };
                    }
                }
                i += 1;
            } else {
                i = node.skip_index() as usize;
            }
        }

        hit
    }

    pub fn intersect_p(&self, meshes: &[Mesh], ray: Ray) -> bool {
        let inv_dir = Vec3 {
            x: 1.0 / ray.dir.x,
            y: 1.0 / ray.dir.y,
            z: 1.0 / ray.dir.z,
        };
        let is_dir_neg = ray.dir.comp_wise_is_neg();

        let mut i = 0usize;
        while i < self.nodes.len() {
            let node = self.nodes[i];
            let node_bound_f64 = BBox3 {
                pmin: Vec3 {
                    x: node.bound().pmin.x as f64,
                    y: node.bound().pmin.y as f64,
                    z: node.bound().pmin.z as f64,
                },
                pmax: Vec3 {
                    x: node.bound().pmax.x as f64,
                    y: node.bound().pmax.y as f64,
                    z: node.bound().pmax.z as f64,
                },
            };
            if node_bound_f64.intersect_test(ray, inv_dir, is_dir_neg) {
                if let LinearBvhNode::Leaf {
                    mesh_index,
                    triangle_index,
                    ..
                } = node
                {
                    let tri = meshes[mesh_index as usize].triangle(ray.time, triangle_index);
                    if tri.intersect_p(ray, ray.t_far) {
                        return true;
                    }
                }
                i += 1;
            } else {
                i = node.skip_index() as usize;
            }
        }
        false
    }
}

/// Evaluates the SAH cost of splitting `left_bound`/`left_count` against
/// `right_bound`/`right_count`, per the formula in the external interface docs.
fn sah_cost(
    params: &BvhParams,
    total_sa: f64,
    left_bound: BBox3<f64>,
    left_count: u32,
    right_bound: BBox3<f64>,
    right_count: u32,
) -> f64 {
    if total_sa <= 0.0 {
        return f64::INFINITY;
    }
    let empty_bonus = if left_count == 0 || right_count == 0 {
        1.0 - params.empty_bonus as f64
    } else {
        1.0
    };
    params.traversal_cost as f64
        + params.isect_cost as f64
            * empty_bonus
            * (left_count as f64 * left_bound.surface_area()
                + right_count as f64 * right_bound.surface_area())
            / total_sa
}

/// Splits `infos` in place, returning the midpoint (`infos[..mid]` is the left child,
/// `infos[mid..]` is the right child). Always makes progress — degenerate centroid
/// distributions fall back to a parity split, per the "never infinite-loop" rule.
fn split(infos: &mut [LeafInfo], params: &BvhParams) -> usize {
    let centroid_bound = infos
        .iter()
        .fold(BBox3::new_initial(), |acc, i| acc.combine_pnt(i.centroid));
    let axis = centroid_bound.max_dim();

    if centroid_bound.pmax[axis] == centroid_bound.pmin[axis] {
        // Every centroid collapses to a single point: ordinary splitting can't make
        // progress, so fall back to parity of the original build order.
        let mid = partition(infos, |info| info.ordinal % 2 == 0);
        return mid.clamp(1, infos.len() - 1);
    }

    let mid = if params.cost_samples > 1 {
        sah_split(infos, &centroid_bound, axis, params)
    } else {
        let split_coord = centroid_bound.centroid()[axis];
        partition(infos, |info| info.centroid[axis] < split_coord)
    };

    if mid == 0 || mid == infos.len() {
        // The chosen plane put everything on one side (common with clustered centroids);
        // fall back to an exact median split to guarantee progress.
        let mid = infos.len() / 2;
        order_stat::kth_by(infos, mid, |a, b| {
            a.centroid[axis].partial_cmp(&b.centroid[axis]).unwrap()
        });
        mid
    } else {
        mid
    }
}

fn sah_split(infos: &mut [LeafInfo], centroid_bound: &BBox3<f64>, axis: usize, params: &BvhParams) -> usize {
    let samples = (params.cost_samples as usize).min(64).max(2);
    let total_sa = infos
        .iter()
        .fold(BBox3::new_initial(), |acc, i| acc.combine_bnd(i.bound))
        .surface_area();

    let lo = centroid_bound.pmin[axis];
    let hi = centroid_bound.pmax[axis];

    let mut best_cost = f64::INFINITY;
    let mut best_coord = (lo + hi) * 0.5;

    for s in 1..samples {
        let t = s as f64 / samples as f64;
        let coord = lo + (hi - lo) * t;

        let mut left_bound = BBox3::new_initial();
        let mut right_bound = BBox3::new_initial();
        let mut left_count = 0u32;
        let mut right_count = 0u32;
        for info in infos.iter() {
            if info.centroid[axis] < coord {
                left_bound = left_bound.combine_bnd(info.bound);
                left_count += 1;
            } else {
                right_bound = right_bound.combine_bnd(info.bound);
                right_count += 1;
            }
        }
        let cost = sah_cost(params, total_sa, left_bound, left_count, right_bound, right_count);
        if cost < best_cost {
            best_cost = cost;
            best_coord = coord;
        }
    }

    partition(infos, |info| info.centroid[axis] < best_coord)
}

/// One level of N-ary subdivision: applies `split` `levels` times in a divide-and-conquer
/// fashion so a single node ends up with `2^levels == tree_type` children, per "recursively
/// split each half up to treeType times per level before descending".
fn subdivide<'a>(infos: &'a mut [LeafInfo], params: &BvhParams, levels: u32) -> Vec<&'a mut [LeafInfo]> {
    if levels == 0 || infos.len() <= 1 {
        return vec![infos];
    }
    let mid = split(infos, params);
    let (left, right) = infos.split_at_mut(mid);
    let mut groups = subdivide(left, params, levels - 1);
    groups.extend(subdivide(right, params, levels - 1));
    groups
}

fn build_node<'a>(
    infos: &mut [LeafInfo],
    params: &BvhParams,
    depth: u32,
    bump: &'a Bump,
) -> AccelResult<&'a TreeNode<'a>> {
    if depth > MAX_DEPTH {
        return Err(AccelError::build(format!(
            "BVH recursion exceeded {} levels",
            MAX_DEPTH
        )));
    }

    let bound = infos
        .iter()
        .fold(BBox3::new_initial(), |acc, i| acc.combine_bnd(i.bound));

    if infos.len() == 1 {
        let info = infos[0];
        return Ok(bump.alloc(TreeNode::Leaf {
            bound,
            mesh_index: info.mesh_index,
            triangle_index: info.triangle_index,
        }));
    }

    let levels = params.tree_type.trailing_zeros();
    let groups = subdivide(infos, params, levels);

    let mut children = Vec::with_capacity(groups.len());
    for group in groups {
        if group.is_empty() {
            continue;
        }
        children.push(build_node(group, params, depth + 1, bump)?);
    }

    if children.len() == 1 {
        // Subdivision failed to separate anything (can happen with very small ranges);
        // just hand back the lone child rather than wrapping it in a useless inner node.
        return Ok(children[0]);
    }

    Ok(bump.alloc(TreeNode::Inner { bound, children }))
}

fn flatten(nodes: &mut Vec<LinearBvhNode>, node: &TreeNode) -> usize {
    match *node {
        TreeNode::Leaf {
            bound,
            mesh_index,
            triangle_index,
        } => {
            let idx = nodes.len();
            nodes.push(LinearBvhNode::Leaf {
                bound: to_f32_bbox(bound),
                skip_index: 0,
                mesh_index,
                triangle_index,
            });
            let next = idx + 1;
            if let LinearBvhNode::Leaf { skip_index, .. } = &mut nodes[idx] {
                *skip_index = next as u32;
            }
            next
        }
        TreeNode::Inner { bound, ref children } => {
            let idx = nodes.len();
            nodes.push(LinearBvhNode::Inner {
                bound: to_f32_bbox(bound),
                skip_index: 0,
            });
            let mut next = idx + 1;
            for child in children {
                next = flatten(nodes, child);
            }
            if let LinearBvhNode::Inner { skip_index, .. } = &mut nodes[idx] {
                *skip_index = next as u32;
            }
            next
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::OwnedMesh;
    use pmath::ray::Ray as PRay;
    use rand::SeedableRng;
    use rand::Rng;

    fn triangle_mesh(tris: Vec<([f64; 3], [f64; 3], [f64; 3])>) -> Mesh {
        let mut vertices = Vec::new();
        let mut indices = Vec::new();
        for (a, b, c) in tris {
            let base = vertices.len() as u32;
            vertices.push(Vec3 { x: a[0], y: a[1], z: a[2] });
            vertices.push(Vec3 { x: b[0], y: b[1], z: b[2] });
            vertices.push(Vec3 { x: c[0], y: c[1], z: c[2] });
            indices.push([base, base + 1, base + 2]);
        }
        Mesh::Triangle(OwnedMesh { vertices, indices, ext: None })
    }

    #[test]
    fn single_triangle_scenario() {
        let meshes = vec![triangle_mesh(vec![(
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
        )])];
        let bvh = Bvh::build(&meshes, BvhParams::default()).unwrap();
        let ray = PRay::new(
            Vec3 { x: 0.25, y: 0.25, z: 1.0 },
            Vec3 { x: 0.0, y: 0.0, z: -1.0 },
            0.0,
        );
        let hit = bvh.intersect(&meshes, ray);
        assert!(!hit.is_miss());
        assert!((hit.t - 1.0).abs() < 1e-9);
    }

    #[test]
    fn empty_scene_misses() {
        let meshes: Vec<Mesh> = vec![];
        let bvh = Bvh::build(&meshes, BvhParams::default()).unwrap();
        let ray = PRay::new(Vec3::zero(), Vec3 { x: 0.0, y: 0.0, z: 1.0 }, 0.0);
        assert!(bvh.intersect(&meshes, ray).is_miss());
    }

    #[test]
    fn nearer_of_two_overlapping_triangles_wins() {
        let meshes = vec![
            triangle_mesh(vec![(
                [0.0, 0.0, 1.0],
                [1.0, 0.0, 1.0],
                [0.0, 1.0, 1.0],
            )]),
            triangle_mesh(vec![(
                [0.0, 0.0, 2.0],
                [1.0, 0.0, 2.0],
                [0.0, 1.0, 2.0],
            )]),
        ];
        let bvh = Bvh::build(&meshes, BvhParams::default()).unwrap();
        let ray = PRay::new(
            Vec3 { x: 0.3, y: 0.3, z: 0.0 },
            Vec3 { x: 0.0, y: 0.0, z: 1.0 },
            0.0,
        );
        let hit = bvh.intersect(&meshes, ray);
        assert_eq!(hit.mesh_index, 0);
        assert!((hit.t - 1.0).abs() < 1e-9);
    }

    fn linear_scan(meshes: &[Mesh], ray: Ray) -> RayHit {
        let mut hit = RayHit::miss();
        let mut max_t = ray.t_far;
        for (mesh_index, mesh) in meshes.iter().enumerate() {
            for triangle_index in 0..mesh.triangle_count() as u32 {
                let tri = mesh.triangle(ray.time, triangle_index);
                if let Some((t, b1, b2)) = tri.intersect(ray, max_t) {
                    max_t = t;
                    hit = RayHit {
                        t,
                        b1,
                        b2,
                        mesh_index: mesh_index as u32,
                        triangle_index,
                    };
                }
            }
        }
        hit
    }

    #[test]
    fn matches_linear_scan_over_random_triangle_soup() {
        let mut rng = rand_pcg::Pcg32::seed_from_u64(42);
        let mut tris = Vec::new();
        for _ in 0..200 {
            let mut rand_pt = || {
                [
                    rng.gen_range(-5.0, 5.0),
                    rng.gen_range(-5.0, 5.0),
                    rng.gen_range(-5.0, 5.0),
                ]
            };
            tris.push((rand_pt(), rand_pt(), rand_pt()));
        }
        let meshes = vec![triangle_mesh(tris)];
        let bvh = Bvh::build(&meshes, BvhParams::default()).unwrap();

        for _ in 0..100 {
            let org = Vec3 {
                x: rng.gen_range(-5.0, 5.0),
                y: rng.gen_range(-5.0, 5.0),
                z: rng.gen_range(-5.0, 5.0),
            };
            let dir = Vec3 {
                x: rng.gen_range(-1.0, 1.0),
                y: rng.gen_range(-1.0, 1.0),
                z: rng.gen_range(-1.0, 1.0),
            }
            .normalize();
            let ray = PRay::new(org, dir, 0.0);

            let expected = linear_scan(&meshes, ray);
            let actual = bvh.intersect(&meshes, ray);
            assert_eq!(expected.is_miss(), actual.is_miss());
            if !expected.is_miss() {
                assert!((expected.t - actual.t).abs() < 1e-6);
            }
        }
    }
}
