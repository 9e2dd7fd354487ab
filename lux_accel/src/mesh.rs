// Uniform view over owned triangle meshes, transform-instanced meshes, and
// motion-instanced meshes. `Mesh::vertex(time, index)` is the only vertex accessor the
// rest of the crate is allowed to use — instance and motion meshes compute vertices on
// demand rather than materializing a transformed copy.

use crate::geometry::Triangle;
use crate::motion::MotionSystem;
use crate::transform::Transform;
use pmath::bbox::BBox3;
use pmath::vector::{Vec2, Vec3};
use std::sync::Arc;

/// Per-vertex attributes beyond position, present only on `EXT_*` mesh variants.
#[derive(Clone, Debug, Default)]
pub struct ExtAttributes {
    pub normals: Vec<Vec3<f64>>,
    pub uvs: Vec<Vec2<f64>>,
    pub colors: Vec<Vec3<f64>>,
}

/// An owned triangle mesh: vertex array, index array, and optional extended attributes.
#[derive(Clone, Debug)]
pub struct OwnedMesh {
    pub vertices: Vec<Vec3<f64>>,
    pub indices: Vec<[u32; 3]>,
    pub ext: Option<ExtAttributes>,
}

impl OwnedMesh {
    pub fn triangle_count(&self) -> usize {
        self.indices.len()
    }

    pub fn vertex(&self, index: u32) -> Vec3<f64> {
        self.vertices[index as usize]
    }

    pub fn triangle(&self, triangle_index: u32) -> Triangle {
        let idx = self.indices[triangle_index as usize];
        Triangle {
            v0: self.vertex(idx[0]),
            v1: self.vertex(idx[1]),
            v2: self.vertex(idx[2]),
        }
    }
}

/// The tagged union of mesh kinds the rest of the crate treats uniformly. `TRIANGLE` and
/// `EXT_TRIANGLE` collapse to one variant since the extended attributes live behind
/// `OwnedMesh::ext` and never affect intersection.
#[derive(Clone, Debug)]
pub enum Mesh {
    Triangle(OwnedMesh),
    TriangleInstance {
        source: Arc<Mesh>,
        transform: Transform,
    },
    TriangleMotion {
        source: Arc<Mesh>,
        motion: MotionSystem,
    },
}

impl Mesh {
    pub fn triangle_count(&self) -> usize {
        match self {
            Mesh::Triangle(m) => m.triangle_count(),
            Mesh::TriangleInstance { source, .. } => source.triangle_count(),
            Mesh::TriangleMotion { source, .. } => source.triangle_count(),
        }
    }

    /// The only vertex accessor the rest of the crate uses. Instance and motion meshes
    /// compute the transformed vertex on demand rather than duplicating the source mesh.
    pub fn vertex(&self, time: f64, index: u32) -> Vec3<f64> {
        match self {
            Mesh::Triangle(m) => m.vertex(index),
            Mesh::TriangleInstance { source, transform } => {
                transform.transform_point(source.vertex(time, index))
            }
            Mesh::TriangleMotion { source, motion } => {
                let t = motion.sample(time);
                t.transform_point(source.vertex(time, index))
            }
        }
    }

    pub fn triangle(&self, time: f64, triangle_index: u32) -> Triangle {
        match self {
            Mesh::Triangle(m) => m.triangle(triangle_index),
            _ => {
                let indices = self.indices_of(triangle_index);
                Triangle {
                    v0: self.vertex(time, indices[0]),
                    v1: self.vertex(time, indices[1]),
                    v2: self.vertex(time, indices[2]),
                }
            }
        }
    }

    fn indices_of(&self, triangle_index: u32) -> [u32; 3] {
        match self {
            Mesh::Triangle(m) => m.indices[triangle_index as usize],
            Mesh::TriangleInstance { source, .. } => source.indices_of(triangle_index),
            Mesh::TriangleMotion { source, .. } => source.indices_of(triangle_index),
        }
    }

    /// Bound of a single triangle over the mesh's full time range. For a motion mesh this
    /// unions the triangle's bound at every keyframe rather than sampling one instant, so
    /// the tree never under-bounds a moving triangle.
    pub fn bound(&self, triangle_index: u32) -> BBox3<f64> {
        match self {
            Mesh::Triangle(m) => m.triangle(triangle_index).bound(),
            Mesh::TriangleInstance { .. } => self.triangle(0.0, triangle_index).bound(),
            Mesh::TriangleMotion { motion, .. } => {
                let times = motion.keyframe_times();
                let mut result: Option<BBox3<f64>> = None;
                for t in times {
                    let b = self.triangle(t, triangle_index).bound();
                    result = Some(match result {
                        None => b,
                        Some(r) => r.combine_bnd(b),
                    });
                }
                result.unwrap_or_else(|| self.triangle(0.0, triangle_index).bound())
            }
        }
    }

    /// The underlying owned mesh an instance or motion mesh ultimately delegates to; used
    /// by the MQBVH builder to key the per-mesh QBVH cache.
    pub fn root_source(&self) -> &Mesh {
        match self {
            Mesh::Triangle(_) => self,
            Mesh::TriangleInstance { source, .. } => source.root_source(),
            Mesh::TriangleMotion { source, .. } => source.root_source(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single_triangle_mesh() -> Mesh {
        Mesh::Triangle(OwnedMesh {
            vertices: vec![
                Vec3 { x: 0.0, y: 0.0, z: 0.0 },
                Vec3 { x: 1.0, y: 0.0, z: 0.0 },
                Vec3 { x: 0.0, y: 1.0, z: 0.0 },
            ],
            indices: vec![[0, 1, 2]],
            ext: None,
        })
    }

    #[test]
    fn instance_vertex_matches_transformed_source() {
        use pmath::matrix::Mat3x4;

        let source = Arc::new(single_triangle_mesh());
        let instance = Mesh::TriangleInstance {
            source: source.clone(),
            transform: Transform::new(Mat3x4::new_translate(Vec3 {
                x: 10.0,
                y: 0.0,
                z: 0.0,
            })),
        };
        let v = instance.vertex(0.0, 0);
        assert!((v.x - 10.0).abs() < 1e-9);
    }
}
