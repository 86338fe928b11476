//! Scene Assembler: collect meshed parts into the output scene.

use brepweb_core::{Scene, SceneNode};
use glam::Mat4;

use crate::error::{ConvertError, Result};
use crate::mesher::{PartFailure, PartOutcome};

/// The finished scene and the parts that did not make it.
#[derive(Debug)]
pub struct Assembly {
    pub scene: Scene,
    pub failures: Vec<PartFailure>,
}

/// Accumulates part outcomes in discovery order.
#[derive(Debug)]
pub struct SceneAssembler {
    scene: Scene,
    failures: Vec<PartFailure>,
    total: usize,
}

impl SceneAssembler {
    pub fn new(unit_transform: Mat4) -> Self {
        Self {
            scene: Scene::new(unit_transform),
            failures: Vec::new(),
            total: 0,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.scene.name = Some(name.into());
        self
    }

    /// Add one outcome. Meshed parts become nodes named `{Class}_{index}`.
    pub fn add(&mut self, outcome: PartOutcome) {
        self.total += 1;
        let part = match outcome {
            PartOutcome::Meshed(part) => part,
            PartOutcome::Failed(failure) => {
                self.failures.push(failure);
                return;
            }
        };

        if part.mesh.is_empty() {
            self.failures.push(PartFailure {
                index: part.index,
                class: part.class,
                reason: "empty mesh (0 facets)".to_string(),
            });
            return;
        }

        let name = part.node_name();
        let material = self.scene.intern_material(part.material);
        if let Err(err) = self.scene.add_node(SceneNode::new(name, part.mesh, material)) {
            tracing::warn!(index = part.index, %err, "part rejected by scene");
            self.failures.push(PartFailure {
                index: part.index,
                class: part.class,
                reason: err.to_string(),
            });
        }
    }

    pub fn node_count(&self) -> usize {
        self.scene.node_count()
    }

    /// Finish the scene. A scene with no nodes is fatal.
    pub fn finish(self) -> Result<Assembly> {
        if self.scene.is_empty() {
            return Err(ConvertError::NoMeshableParts {
                total: self.total,
                failed: self.failures.len(),
            });
        }
        Ok(Assembly {
            scene: self.scene,
            failures: self.failures,
        })
    }
}

impl Extend<PartOutcome> for SceneAssembler {
    fn extend<T: IntoIterator<Item = PartOutcome>>(&mut self, outcomes: T) {
        for outcome in outcomes {
            self.add(outcome);
        }
    }
}
