//! Error types for brepweb-core.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for kernel operations.
pub type Result<T> = std::result::Result<T, KernelError>;

/// Errors raised by a geometry kernel.
#[derive(Debug, Error)]
pub enum KernelError {
    /// The input could not be opened or is not a model the kernel understands.
    #[error("cannot read {path}: {message}")]
    Read {
        /// Input path.
        path: PathBuf,
        /// What went wrong.
        message: String,
    },

    /// The model text is malformed.
    #[error("parse error: {message}")]
    Parse {
        /// Error message.
        message: String,
        /// Byte offset where parsing stopped, when known.
        offset: Option<usize>,
    },

    /// The shape has no usable extent.
    #[error("degenerate shape: {0}")]
    Degenerate(String),

    /// The shape uses a construct the kernel does not handle.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// Tessellation failed.
    #[error("tessellation failed: {0}")]
    Tessellation(String),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl KernelError {
    /// Create a parse error.
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
            offset: None,
        }
    }

    /// Create a parse error with offset.
    pub fn parse_at(message: impl Into<String>, offset: usize) -> Self {
        Self::Parse {
            message: message.into(),
            offset: Some(offset),
        }
    }

    /// Create a read error for a path.
    pub fn read(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Read {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Errors raised while building a [`crate::Scene`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SceneError {
    /// A node with this name is already in the scene.
    #[error("duplicate node name: {0}")]
    DuplicateNode(String),

    /// A node refers to a material that does not exist.
    #[error("node {node} refers to missing material {material}")]
    MissingMaterial {
        /// Node name.
        node: String,
        /// Material index.
        material: usize,
    },
}
