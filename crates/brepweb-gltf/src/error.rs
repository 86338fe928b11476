//! Error types for brepweb-gltf.

use thiserror::Error;

/// Result type for export operations.
pub type Result<T> = std::result::Result<T, ExportError>;

/// Errors raised while writing or inspecting a glTF asset.
#[derive(Debug, Error)]
pub enum ExportError {
    /// The scene has no nodes to write.
    #[error("scene has no nodes")]
    EmptyScene,

    /// A node's mesh cannot be encoded.
    #[error("invalid mesh for node {node}: {reason}")]
    InvalidMesh {
        /// Node name.
        node: String,
        /// What is wrong with it.
        reason: String,
    },

    /// The encoded asset does not fit the 32-bit lengths of a GLB header.
    #[error("asset of {bytes} bytes exceeds the GLB size limit")]
    TooLarge {
        /// Size the container would have.
        bytes: u64,
    },

    /// Malformed GLB container.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Unsupported container version.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
