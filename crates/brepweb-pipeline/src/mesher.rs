//! Part Mesher: tessellate one part in isolation.
//!
//! Every failure is caught here and turned into a [`PartOutcome::Failed`];
//! nothing a single part does can abort the job.

use brepweb_core::{GeometryKernel, Material, TriangleMesh};
use glam::Mat4;
use serde::Serialize;

use crate::config::ConvertOptions;
use crate::deflection::DeflectionEstimator;
use crate::error::PartError;
use crate::exchange;
use crate::record::{ShapeClass, ShapeRecord};

/// A part that failed, with the reason.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PartFailure {
    pub index: usize,
    pub class: ShapeClass,
    pub reason: String,
}

/// A part ready for the scene: geometry in scene units plus its material.
#[derive(Debug, Clone)]
pub struct MeshedPart {
    pub index: usize,
    pub class: ShapeClass,
    pub mesh: TriangleMesh,
    pub material: Material,
}

impl MeshedPart {
    /// Scene node name: class plus discovery index.
    pub fn node_name(&self) -> String {
        format!("{}_{}", self.class, self.index)
    }
}

/// Result of meshing one part.
#[derive(Debug, Clone)]
pub enum PartOutcome {
    Meshed(MeshedPart),
    Failed(PartFailure),
}

impl PartOutcome {
    pub fn index(&self) -> usize {
        match self {
            Self::Meshed(part) => part.index,
            Self::Failed(failure) => failure.index,
        }
    }

    pub fn is_meshed(&self) -> bool {
        matches!(self, Self::Meshed(_))
    }
}

/// Meshes parts of one job against a kernel.
pub struct PartMesher<'a, K: GeometryKernel> {
    kernel: &'a K,
    estimator: DeflectionEstimator,
    unit_transform: Mat4,
    min_exchange_bytes: usize,
}

impl<'a, K: GeometryKernel> PartMesher<'a, K> {
    pub fn new(kernel: &'a K, estimator: DeflectionEstimator, options: &ConvertOptions) -> Self {
        Self {
            kernel,
            estimator,
            unit_transform: options.unit_transform(),
            min_exchange_bytes: options.min_exchange_bytes,
        }
    }

    /// Estimate the record's deflection, mesh it, and settle its status.
    pub fn process(&self, record: &mut ShapeRecord<K::Shape>) -> PartOutcome {
        record.deflection = self
            .estimator
            .linear(self.kernel.bounding_box(&record.shape), record.class);

        let outcome = self.mesh(record);
        match &outcome {
            PartOutcome::Meshed(_) => record.mark_meshed(),
            PartOutcome::Failed(failure) => record.mark_failed(failure.reason.clone()),
        }
        outcome
    }

    /// Mesh a record at its current deflection.
    pub fn mesh(&self, record: &ShapeRecord<K::Shape>) -> PartOutcome {
        match self.try_mesh(record) {
            Ok((mesh, material)) => {
                tracing::debug!(
                    index = record.index,
                    class = %record.class,
                    deflection = record.deflection,
                    facets = mesh.facet_count(),
                    "part meshed"
                );
                PartOutcome::Meshed(MeshedPart {
                    index: record.index,
                    class: record.class,
                    mesh,
                    material,
                })
            }
            Err(err) => {
                tracing::warn!(index = record.index, class = %record.class, %err, "part failed");
                PartOutcome::Failed(PartFailure {
                    index: record.index,
                    class: record.class,
                    reason: err.to_string(),
                })
            }
        }
    }

    fn try_mesh(&self, record: &ShapeRecord<K::Shape>) -> Result<(TriangleMesh, Material), PartError> {
        let params = self.estimator.params(record.deflection);
        let tessellated = self.kernel.tessellate(&record.shape, &params)?;
        if tessellated.is_empty() {
            return Err(PartError::EmptyMesh);
        }

        let buffer = exchange::encode(&tessellated)?;
        drop(tessellated);
        let mut mesh = exchange::decode(&buffer, self.min_exchange_bytes)?;
        if mesh.is_empty() {
            return Err(PartError::EmptyMesh);
        }

        if !self.unit_transform.is_finite() || self.unit_transform.determinant() == 0.0 {
            return Err(PartError::Transform("unit transform is singular".into()));
        }
        mesh.transform(&self.unit_transform);
        if let Some(i) = mesh.positions.iter().position(|p| !p.is_finite()) {
            return Err(PartError::Transform(format!("vertex {i} is not finite after scaling")));
        }
        mesh.compute_normals();

        Ok((mesh, self.material(record)?))
    }

    /// The part's own material, or the default gray.
    fn material(&self, record: &ShapeRecord<K::Shape>) -> Result<Material, PartError> {
        let Some(material) = self.kernel.native_material(&record.shape) else {
            return Ok(Material::part_default());
        };
        let unit = |v: f32| v.is_finite() && (0.0..=1.0).contains(&v);
        if !material.base_color.to_array().into_iter().all(unit) {
            return Err(PartError::Material(format!(
                "{} has base color {:?} outside 0..1",
                material.name, material.base_color
            )));
        }
        if !(unit(material.metallic) && unit(material.roughness)) {
            return Err(PartError::Material(format!(
                "{} has metallic {} / roughness {} outside 0..1",
                material.name, material.metallic, material.roughness
            )));
        }
        Ok(material)
    }
}
