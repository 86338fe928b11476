//! One meshable unit discovered in the input model.

use std::fmt;

use serde::Serialize;

/// Topological class of a part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum ShapeClass {
    Solid,
    Shell,
    Face,
    /// The whole input, used when it has no solids, shells, or faces.
    Unknown,
}

impl ShapeClass {
    pub fn name(self) -> &'static str {
        match self {
            Self::Solid => "Solid",
            Self::Shell => "Shell",
            Self::Face => "Face",
            Self::Unknown => "Unknown",
        }
    }

    /// Open surfaces get a tighter deflection.
    pub fn is_shell_or_face(self) -> bool {
        matches!(self, Self::Shell | Self::Face)
    }
}

impl fmt::Display for ShapeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Where a record is in the meshing loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PartStatus {
    Pending,
    Meshed,
    Failed,
}

/// A part of the input model and what became of it.
#[derive(Debug, Clone)]
pub struct ShapeRecord<S> {
    /// Discovery index; unique across all classes.
    pub index: usize,
    pub shape: S,
    pub class: ShapeClass,
    /// Linear deflection, set before meshing.
    pub deflection: f64,
    pub status: PartStatus,
    /// Failure reason when `status` is `Failed`.
    pub error: Option<String>,
}

impl<S> ShapeRecord<S> {
    pub fn new(index: usize, shape: S, class: ShapeClass) -> Self {
        Self {
            index,
            shape,
            class,
            deflection: 0.0,
            status: PartStatus::Pending,
            error: None,
        }
    }

    /// Scene node name: class plus discovery index.
    pub fn node_name(&self) -> String {
        format!("{}_{}", self.class, self.index)
    }

    pub(crate) fn mark_meshed(&mut self) {
        self.status = PartStatus::Meshed;
        self.error = None;
    }

    pub(crate) fn mark_failed(&mut self, reason: impl Into<String>) {
        self.status = PartStatus::Failed;
        self.error = Some(reason.into());
    }
}
