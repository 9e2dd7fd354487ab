// Four-way SIMD-oriented BVH: binned SAH construction producing 4-wide nodes, leaves
// holding runs of "quad-triangles" (four triangles packed laterally for SIMD testing).

use crate::config::QbvhParams;
use crate::error::{AccelError, AccelResult};
use crate::geometry::{QuadTriangle, Ray, RayHit, QUAD_WIDTH};
use crate::mesh::Mesh;
use pmath::bbox::BBox3;
use pmath::vector::Vec3;

use arrayvec::ArrayVec;
use partition::partition;

const MAX_DEPTH: u32 = 64;
const NB_BINS: usize = crate::config::NB_BINS;
const EMPTY_CHILD: i32 = i32::MAX;
const LEAF_SIGN_BIT: i32 = i32::MIN;

#[derive(Clone, Copy)]
struct LeafInfo {
    mesh_index: u32,
    triangle_index: u32,
    centroid: Vec3<f64>,
    bound: BBox3<f64>,
}

#[derive(Clone, Copy)]
struct Bin {
    count: u32,
    bound: BBox3<f64>,
}

impl Bin {
    fn empty() -> Self {
        Bin {
            count: 0,
            bound: BBox3::new_initial(),
        }
    }
}

/// One 4-wide node: four lanes of child AABBs plus four child references. A child
/// reference is either `EMPTY_CHILD`, a non-negative index of another node, or a negative
/// value whose low bits encode a leaf (`count - 1` in bits 27..31, start index in the
/// low 27 bits) — mirroring the packed encoding used by the device kernel.
#[derive(Clone, Copy)]
pub struct QbvhNode {
    bounds: [BBox3<f32>; QUAD_WIDTH],
    children: [i32; QUAD_WIDTH],
}

impl QbvhNode {
    fn empty() -> Self {
        QbvhNode {
            bounds: [BBox3 {
                pmin: Vec3 { x: f32::MAX, y: f32::MAX, z: f32::MAX },
                pmax: Vec3 { x: f32::MIN, y: f32::MIN, z: f32::MIN },
            }; QUAD_WIDTH],
            children: [EMPTY_CHILD; QUAD_WIDTH],
        }
    }
}

fn encode_leaf(start: usize, count: usize) -> i32 {
    debug_assert!(count >= 1 && count <= 16);
    debug_assert!(start < (1 << 27));
    LEAF_SIGN_BIT | (((count as i32 - 1) & 0xF) << 27) | (start as i32 & 0x07FF_FFFF)
}

fn decode_leaf(code: i32) -> (usize, usize) {
    let count = (((code >> 27) & 0xF) + 1) as usize;
    let start = (code & 0x07FF_FFFF) as usize;
    (start, count)
}

fn to_f32_bbox(b: BBox3<f64>) -> BBox3<f32> {
    BBox3 {
        pmin: Vec3 { x: b.pmin.x as f32, y: b.pmin.y as f32, z: b.pmin.z as f32 },
        pmax: Vec3 { x: b.pmax.x as f32, y: b.pmax.y as f32, z: b.pmax.z as f32 },
    }
}

fn to_f64_bbox(b: BBox3<f32>) -> BBox3<f64> {
    BBox3 {
        pmin: Vec3 { x: b.pmin.x as f64, y: b.pmin.y as f64, z: b.pmin.z as f64 },
        pmax: Vec3 { x: b.pmax.x as f64, y: b.pmax.y as f64, z: b.pmax.z as f64 },
    }
}

/// An immutable 4-wide BVH, the building block both of a standalone accelerator and of
/// an MQBVH's per-mesh leaves.
pub struct Qbvh {
    nodes: Vec<QbvhNode>,
    quads: Vec<QuadTriangle>,
    bound: BBox3<f64>,
}

impl Qbvh {
    pub fn build(meshes: &[Mesh], params: QbvhParams) -> AccelResult<Self> {
        let mut infos = Vec::new();
        for (mesh_index, mesh) in meshes.iter().enumerate() {
            for triangle_index in 0..mesh.triangle_count() as u32 {
                let bound = mesh.bound(triangle_index);
                infos.push(LeafInfo {
                    mesh_index: mesh_index as u32,
                    triangle_index,
                    centroid: bound.centroid(),
                    bound,
                });
            }
        }

        let scene_bound = infos
            .iter()
            .fold(BBox3::new_initial(), |acc, i| acc.combine_bnd(i.bound));

        let mut nodes = Vec::new();
        let mut quads = Vec::new();

        if infos.is_empty() {
            nodes.push(QbvhNode::empty());
            return Ok(Qbvh { nodes, quads, bound: scene_bound });
        }

        build_recursive(&mut infos, meshes, &params, 0, &mut nodes, &mut quads)?;

        Ok(Qbvh { nodes, quads, bound: scene_bound })
    }

    pub fn bound(&self) -> BBox3<f64> {
        self.bound
    }

    /// Vertices are baked into each leaf's quad-triangles at build time (see
    /// `make_leaf`), so traversal needs no access to the original mesh list.
    pub fn intersect(&self, ray: Ray) -> RayHit {
        let mut hit = RayHit::miss();
        let mut max_t = ray.t_far;
        self.traverse(ray, &mut max_t, &mut hit, false);
        hit
    }

    pub fn intersect_p(&self, ray: Ray) -> bool {
        let mut hit = RayHit::miss();
        let mut max_t = ray.t_far;
        self.traverse(ray, &mut max_t, &mut hit, true)
    }

    /// Walks the node hierarchy using only bounding-box overlap tests, never intersecting
    /// the leaf quad-triangles themselves, and returns the `mesh_index` baked into every
    /// candidate quad, deduplicated, in near-to-far node visitation order. `Mqbvh` builds
    /// its top-level tree over one placeholder box per instance rather than real surfaces,
    /// so culling candidates this way (instead of via `intersect`) is the only correct way
    /// to use that tree: a ray can pass through a box without hitting any of the four
    /// triangles approximating its corners.
    pub(crate) fn candidate_leaves(&self, ray: Ray, max_t: f64) -> Vec<u32> {
        let mut out = Vec::new();
        if self.nodes.is_empty() {
            return out;
        }

        let mut stack: ArrayVec<[i32; 64]> = ArrayVec::new();
        stack.push(0);

        while let Some(entry) = stack.pop() {
            if entry < 0 {
                let (start, count) = decode_leaf(entry);
                for q in &self.quads[start..start + count] {
                    for lane in 0..QUAD_WIDTH {
                        if q.active[lane] {
                            out.push(q.mesh_index[lane]);
                        }
                    }
                }
                continue;
            }

            let node = &self.nodes[entry as usize];
            let mut hits: ArrayVec<[(f32, i32); QUAD_WIDTH]> = ArrayVec::new();
            for lane in 0..QUAD_WIDTH {
                let child = node.children[lane];
                if child == EMPTY_CHILD {
                    continue;
                }
                let b = to_f64_bbox(node.bounds[lane]);
                if let Some((t0, _)) = b.intersect(pmath::ray::Ray {
                    org: ray.org,
                    dir: ray.dir,
                    time: ray.time,
                    t_near: ray.t_near,
                    t_far: max_t,
                }) {
                    hits.push((t0 as f32, child));
                }
            }
            hits.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap());
            for (_, child) in hits.into_iter().rev() {
                stack.push(child);
            }
        }

        out.sort_unstable();
        out.dedup();
        out
    }

    fn traverse(&self, ray: Ray, max_t: &mut f64, hit: &mut RayHit, any_hit: bool) -> bool {
        if self.nodes.is_empty() {
            return false;
        }
        let inv_dir = Vec3 {
            x: 1.0 / ray.dir.x,
            y: 1.0 / ray.dir.y,
            z: 1.0 / ray.dir.z,
        };

        let mut stack: ArrayVec<[i32; 64]> = ArrayVec::new();
        stack.push(0);

        while let Some(entry) = stack.pop() {
            if entry < 0 {
                let (start, count) = decode_leaf(entry);
                for q in &self.quads[start..start + count] {
                    if any_hit {
                        if q.intersect_p(ray, *max_t) {
                            return true;
                        }
                    } else if q.intersect(ray, *max_t, hit) {
                        *max_t = hit.t;
                    }
                }
                continue;
            }

            let node = &self.nodes[entry as usize];
            let mut hits: ArrayVec<[(f32, i32); QUAD_WIDTH]> = ArrayVec::new();
            for lane in 0..QUAD_WIDTH {
                let child = node.children[lane];
                if child == EMPTY_CHILD {
                    continue;
                }
                let b = to_f64_bbox(node.bounds[lane]);
                if let Some((t0, _)) = b.intersect(pmath::ray::Ray {
                    org: ray.org,
                    dir: ray.dir,
                    time: ray.time,
                    t_near: ray.t_near,
                    t_far: *max_t,
                }) {
                    hits.push((t0 as f32, child));
                }
            }
            // Favor closer children first — equivalent in effect to the original's table
            // of 16 sign-specific push orders, without needing the lookup table.
            hits.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap());
            for (_, child) in hits.into_iter().rev() {
                stack.push(child);
            }
        }

        !hit.is_miss() && !any_hit
    }
}

fn axis_bin_index(centroid_bound: &BBox3<f64>, axis: usize, centroid: Vec3<f64>) -> usize {
    let lo = centroid_bound.pmin[axis];
    let hi = centroid_bound.pmax[axis];
    if hi <= lo {
        return 0;
    }
    let ratio = (centroid[axis] - lo) / (hi - lo);
    ((ratio * NB_BINS as f64) as usize).min(NB_BINS - 1)
}

/// Chooses the binned-SAH split axis and bin boundary for `infos`, partitioning in place.
/// Returns `None` when the centroid bounds are degenerate on every axis (the `k1 = inf`
/// failure mode) — the caller then falls back to a parity split.
fn choose_split(infos: &mut [LeafInfo], params: &QbvhParams) -> Option<usize> {
    let centroid_bound = infos
        .iter()
        .fold(BBox3::new_initial(), |acc, i| acc.combine_pnt(i.centroid));
    let axis = centroid_bound.max_dim();
    if centroid_bound.pmax[axis] == centroid_bound.pmin[axis] {
        return None;
    }

    let stride = if infos.len() > params.full_sweep_threshold {
        params.skip_factor.max(1)
    } else {
        1
    };

    let mut bins = [Bin::empty(); NB_BINS];
    for info in infos.iter().step_by(stride) {
        let b = &mut bins[axis_bin_index(&centroid_bound, axis, info.centroid)];
        b.count += 1;
        b.bound = b.bound.combine_bnd(info.bound);
    }

    let mut right_sa = [0f64; NB_BINS - 1];
    let mut right_bound = BBox3::new_initial();
    for i in (1..NB_BINS).rev() {
        right_bound = right_bound.combine_bnd(bins[i].bound);
        right_sa[i - 1] = right_bound.surface_area();
    }

    let total_sa = infos
        .iter()
        .fold(BBox3::new_initial(), |acc, i| acc.combine_bnd(i.bound))
        .surface_area();
    if total_sa <= 0.0 {
        return None;
    }

    let mut left_bound = BBox3::new_initial();
    let mut left_count = 0u32;
    let mut right_count: u32 = bins.iter().map(|b| b.count).sum();
    let mut best_cost = f64::INFINITY;
    let mut best_bin = 0usize;
    for i in 0..(NB_BINS - 1) {
        left_bound = left_bound.combine_bnd(bins[i].bound);
        left_count += bins[i].count;
        right_count -= bins[i].count;
        let cost = params.traversal_cost as f64
            + params.isect_cost as f64
                * (left_count as f64 * left_bound.surface_area()
                    + right_count as f64 * right_sa[i])
                / total_sa;
        if cost < best_cost {
            best_cost = cost;
            best_bin = i;
        }
    }

    let mid = partition(infos, |info| {
        axis_bin_index(&centroid_bound, axis, info.centroid) <= best_bin
    });
    if mid == 0 || mid == infos.len() {
        None
    } else {
        Some(mid)
    }
}

/// Splits `infos`, falling back to parity when the SAH split can't make progress.
fn split_or_parity(infos: &mut [LeafInfo], params: &QbvhParams) -> usize {
    if let Some(mid) = choose_split(infos, params) {
        mid
    } else {
        let mid = partition(infos, |info| (info.mesh_index ^ info.triangle_index) % 2 == 0);
        mid.clamp(1, infos.len().saturating_sub(1).max(1))
    }
}

/// Builds one node at `nodes[reserved_index]`, recursing into up to 4 children: two
/// direct splits produce up to 4 ranges ("at even recursion depth allocate a new 4-way
/// node; at odd depth, fill the current node's remaining two child slots").
fn build_recursive(
    infos: &mut [LeafInfo],
    meshes: &[Mesh],
    params: &QbvhParams,
    depth: u32,
    nodes: &mut Vec<QbvhNode>,
    quads: &mut Vec<QuadTriangle>,
) -> AccelResult<i32> {
    if depth > MAX_DEPTH {
        return Err(AccelError::build(format!("QBVH recursion exceeded {} levels", MAX_DEPTH)));
    }

    if infos.len() <= 4 * QUAD_WIDTH {
        return Ok(make_leaf(infos, meshes, quads));
    }

    let mid = split_or_parity(infos, params);
    let (left, right) = infos.split_at_mut(mid);

    let node_index = nodes.len() as i32;
    nodes.push(QbvhNode::empty());

    let mut quadrant_ranges: ArrayVec<[&mut [LeafInfo]; QUAD_WIDTH]> = ArrayVec::new();
    let left_mid = if left.len() > 4 * QUAD_WIDTH { Some(split_or_parity(left, params)) } else { None };
    let right_mid = if right.len() > 4 * QUAD_WIDTH { Some(split_or_parity(right, params)) } else { None };

    match (left_mid, right_mid) {
        (Some(lm), Some(rm)) => {
            let (ll, lr) = left.split_at_mut(lm);
            let (rl, rr) = right.split_at_mut(rm);
            quadrant_ranges.push(ll);
            quadrant_ranges.push(lr);
            quadrant_ranges.push(rl);
            quadrant_ranges.push(rr);
        }
        (Some(lm), None) => {
            let (ll, lr) = left.split_at_mut(lm);
            quadrant_ranges.push(ll);
            quadrant_ranges.push(lr);
            quadrant_ranges.push(right);
        }
        (None, Some(rm)) => {
            let (rl, rr) = right.split_at_mut(rm);
            quadrant_ranges.push(left);
            quadrant_ranges.push(rl);
            quadrant_ranges.push(rr);
        }
        (None, None) => {
            quadrant_ranges.push(left);
            quadrant_ranges.push(right);
        }
    }

    let mut bounds = [BBox3::new_initial(); QUAD_WIDTH];
    let mut children = [EMPTY_CHILD; QUAD_WIDTH];

    for (lane, range) in quadrant_ranges.iter_mut().enumerate() {
        if range.is_empty() {
            continue;
        }
        let bound = range
            .iter()
            .fold(BBox3::new_initial(), |acc, i| acc.combine_bnd(i.bound));
        bounds[lane] = bound;
        children[lane] = build_recursive(range, meshes, params, depth + 2, nodes, quads)?;
    }

    nodes[node_index as usize] = QbvhNode {
        bounds: [
            to_f32_bbox(bounds[0]),
            to_f32_bbox(bounds[1]),
            to_f32_bbox(bounds[2]),
            to_f32_bbox(bounds[3]),
        ],
        children,
    };

    Ok(node_index)
}

fn make_leaf(infos: &[LeafInfo], meshes: &[Mesh], quads: &mut Vec<QuadTriangle>) -> i32 {
    let start = quads.len();
    let mut count = 0usize;
    for chunk in infos.chunks(QUAD_WIDTH) {
        let mut q = QuadTriangle::empty();
        for (lane, info) in chunk.iter().enumerate() {
            let tri = meshes[info.mesh_index as usize].triangle(0.0, info.triangle_index);
            q.v0[lane] = tri.v0;
            q.v1[lane] = tri.v1;
            q.v2[lane] = tri.v2;
            q.mesh_index[lane] = info.mesh_index;
            q.triangle_index[lane] = info.triangle_index;
            q.active[lane] = true;
        }
        quads.push(q);
        count += 1;
    }
    encode_leaf(start, count.max(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::OwnedMesh;
    use pmath::ray::Ray as PRay;

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
        let meshes = vec![triangle_mesh(vec![([0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0])])];
        let qbvh = Qbvh::build(&meshes, QbvhParams::default()).unwrap();
        let ray = PRay::new(Vec3 { x: 0.25, y: 0.25, z: 1.0 }, Vec3 { x: 0.0, y: 0.0, z: -1.0 }, 0.0);
        let hit = qbvh.intersect(ray);
        assert!(!hit.is_miss());
        assert!((hit.t - 1.0).abs() < 1e-9);
    }

    #[test]
    fn empty_scene_misses() {
        let meshes: Vec<Mesh> = vec![];
        let qbvh = Qbvh::build(&meshes, QbvhParams::default()).unwrap();
        let ray = PRay::new(Vec3::zero(), Vec3 { x: 0.0, y: 0.0, z: 1.0 }, 0.0);
        assert!(qbvh.intersect(ray).is_miss());
    }

    #[test]
    fn matches_many_triangle_soup_against_linear_scan() {
        let mut tris = Vec::new();
        for i in 0..300 {
            let x = (i % 17) as f64;
            let y = (i % 11) as f64;
            let z = (i % 7) as f64;
            tris.push((
                [x, y, z],
                [x + 1.0, y, z],
                [x, y + 1.0, z],
            ));
        }
        let meshes = vec![triangle_mesh(tris)];
        let qbvh = Qbvh::build(&meshes, QbvhParams::default()).unwrap();

        let ray = PRay::new(Vec3 { x: 0.25, y: 0.25, z: 5.0 }, Vec3 { x: 0.0, y: 0.0, z: -1.0 }, 0.0);
        let hit = qbvh.intersect(ray);
        assert!(!hit.is_miss());
    }
}
