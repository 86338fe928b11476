//! Triangle meshes and bounding boxes.

use glam::{Mat4, Vec3};

/// An indexed triangle mesh, as produced by tessellating one shape.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TriangleMesh {
    /// Vertex positions.
    pub positions: Vec<Vec3>,
    /// Vertex normals (optional).
    pub normals: Option<Vec<Vec3>>,
    /// Triangle indices (3 per facet).
    pub indices: Vec<u32>,
}

impl TriangleMesh {
    /// Create a new empty mesh.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the number of vertices.
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    /// Get the number of facets (triangles).
    pub fn facet_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// True when the mesh has no facets.
    pub fn is_empty(&self) -> bool {
        self.facet_count() == 0
    }

    /// Push a triangle, flipping its winding when `same_sense` is false.
    pub fn push_triangle(&mut self, a: u32, b: u32, c: u32, same_sense: bool) {
        if same_sense {
            self.indices.extend_from_slice(&[a, b, c]);
        } else {
            self.indices.extend_from_slice(&[a, c, b]);
        }
    }

    /// Append another mesh, offsetting its indices.
    pub fn append(&mut self, other: &TriangleMesh) {
        let base = self.positions.len() as u32;
        self.positions.extend_from_slice(&other.positions);
        self.indices.extend(other.indices.iter().map(|i| i + base));
        self.normals = match (self.normals.take(), &other.normals) {
            (Some(mut ours), Some(theirs)) => {
                ours.extend_from_slice(theirs);
                Some(ours)
            }
            _ => None,
        };
    }

    /// Apply a transform to every vertex (and normal, if present).
    pub fn transform(&mut self, transform: &Mat4) {
        for p in &mut self.positions {
            *p = transform.transform_point3(*p);
        }
        if let Some(normals) = &mut self.normals {
            let normal_matrix = transform.inverse().transpose();
            for n in normals.iter_mut() {
                *n = normal_matrix.transform_vector3(*n).normalize_or_zero();
            }
        }
    }

    /// Compute the bounding box.
    pub fn compute_bounds(&self) -> BoundingBox {
        BoundingBox::from_points(&self.positions)
    }

    /// Compute smooth normals if not present.
    pub fn compute_normals(&mut self) {
        if self.normals.is_some() {
            return;
        }

        let mut normals = vec![Vec3::ZERO; self.positions.len()];

        for tri in self.indices.chunks_exact(3) {
            let (i0, i1, i2) = (tri[0] as usize, tri[1] as usize, tri[2] as usize);
            let normal = (self.positions[i1] - self.positions[i0])
                .cross(self.positions[i2] - self.positions[i0]);

            normals[i0] += normal;
            normals[i1] += normal;
            normals[i2] += normal;
        }

        for normal in &mut normals {
            *normal = normal.normalize_or_zero();
        }

        self.normals = Some(normals);
    }
}

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    /// Minimum corner.
    pub min: Vec3,
    /// Maximum corner.
    pub max: Vec3,
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self::empty()
    }
}

impl BoundingBox {
    /// An empty box that any point will expand.
    pub fn empty() -> Self {
        Self {
            min: Vec3::splat(f32::INFINITY),
            max: Vec3::splat(f32::NEG_INFINITY),
        }
    }

    /// Create from two corners.
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Create from a set of points.
    pub fn from_points(points: &[Vec3]) -> Self {
        let mut bounds = Self::empty();
        for p in points {
            bounds.expand_point(*p);
        }
        bounds
    }

    /// True when nothing has been added.
    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    /// True when the box cannot be measured: empty, inverted, or non-finite.
    pub fn is_degenerate(&self) -> bool {
        self.is_empty() || !self.min.is_finite() || !self.max.is_finite()
    }

    /// Get the X/Y/Z extents.
    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    /// Largest of the three extents.
    pub fn max_dimension(&self) -> f32 {
        self.size().max_element()
    }

    /// Expand to include another bounding box.
    pub fn expand(&mut self, other: &BoundingBox) {
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
    }

    /// Expand to include a point.
    pub fn expand_point(&mut self, point: Vec3) {
        self.min = self.min.min(point);
        self.max = self.max.max(point);
    }
}
