//! The capability interface a B-rep geometry kernel exposes to the pipeline.

use std::fmt::Debug;
use std::path::Path;

use crate::error::Result;
use crate::geometry::{BoundingBox, TriangleMesh};
use crate::material::Material;

/// Tessellation tolerances.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TessellationParams {
    /// Maximum distance between a facet and the true surface, in model units.
    pub linear_deflection: f64,
    /// Maximum angle between adjacent facet normals, in radians.
    pub angular_deflection: f64,
    /// When true, `linear_deflection` is relative to the shape size.
    pub relative: bool,
}

impl TessellationParams {
    /// Absolute tolerances.
    pub fn absolute(linear_deflection: f64, angular_deflection: f64) -> Self {
        Self {
            linear_deflection,
            angular_deflection,
            relative: false,
        }
    }
}

impl Default for TessellationParams {
    fn default() -> Self {
        Self::absolute(0.1, 0.25)
    }
}

/// Topological breakdown of a shape.
#[derive(Debug, Clone)]
pub struct Topology<S> {
    /// Solids, in discovery order.
    pub solids: Vec<S>,
    /// Shells, in discovery order, including those owned by solids.
    pub shells: Vec<S>,
    /// Faces, in discovery order.
    pub faces: Vec<S>,
}

impl<S> Default for Topology<S> {
    fn default() -> Self {
        Self {
            solids: Vec::new(),
            shells: Vec::new(),
            faces: Vec::new(),
        }
    }
}

impl<S> Topology<S> {
    /// True when the shape has no solids, shells, or faces.
    pub fn is_empty(&self) -> bool {
        self.solids.is_empty() && self.shells.is_empty() && self.faces.is_empty()
    }
}

/// A B-rep kernel: reads models, measures and classifies shapes, and
/// tessellates them. Any implementation can drive the conversion pipeline.
pub trait GeometryKernel: Send + Sync {
    /// Opaque, read-only shape handle. Equality is shape identity.
    type Shape: Clone + PartialEq + Debug + Send + Sync;

    /// Kernel name for logs.
    fn name(&self) -> &'static str;

    /// Read a model file into its top-level shape.
    fn read(&self, path: &Path) -> Result<Self::Shape>;

    /// Axis-aligned extents of a shape.
    fn bounding_box(&self, shape: &Self::Shape) -> Result<BoundingBox>;

    /// Enumerate the solids, shells, and faces of a shape.
    fn classify(&self, shape: &Self::Shape) -> Topology<Self::Shape>;

    /// The shells that make up a solid.
    fn solid_shells(&self, solid: &Self::Shape) -> Vec<Self::Shape>;

    /// Tessellate a shape within the given tolerances.
    fn tessellate(&self, shape: &Self::Shape, params: &TessellationParams) -> Result<TriangleMesh>;

    /// Material carried by the shape itself, if any.
    fn native_material(&self, _shape: &Self::Shape) -> Option<Material> {
        None
    }
}
