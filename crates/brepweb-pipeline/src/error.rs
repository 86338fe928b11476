//! Error types for brepweb-pipeline.

use std::path::PathBuf;

use brepweb_core::KernelError;
use brepweb_gltf::ExportError;
use thiserror::Error;

/// Result type for conversion jobs.
pub type Result<T> = std::result::Result<T, ConvertError>;

/// Why one part could not be meshed. Never escapes the meshing loop.
#[derive(Debug, Error)]
pub enum PartError {
    /// The tessellator produced no facets.
    #[error("empty mesh (0 facets)")]
    EmptyMesh,

    /// The exchange buffer is smaller than it must be.
    #[error("exchange buffer is {bytes} bytes, expected at least {minimum}")]
    CorruptIntermediate {
        /// Buffer size.
        bytes: usize,
        /// Required size.
        minimum: usize,
    },

    /// The exchange buffer holds a NaN or infinite coordinate.
    #[error("non-finite vertex in facet {facet}")]
    NonFiniteVertex {
        /// Facet index.
        facet: usize,
    },

    /// Applying the unit transform failed.
    #[error("transform failed: {0}")]
    Transform(String),

    /// The part's material is unusable.
    #[error("material assignment failed: {0}")]
    Material(String),

    /// The kernel failed on this part.
    #[error(transparent)]
    Kernel(#[from] KernelError),
}

/// Errors that end a conversion job.
#[derive(Debug, Error)]
pub enum ConvertError {
    /// The input could not be read.
    #[error("cannot read input {path}")]
    UnreadableInput {
        /// Input path.
        path: PathBuf,
        /// Kernel failure.
        #[source]
        source: KernelError,
    },

    /// Every part failed to mesh.
    #[error("no meshable parts: {failed} of {total} failed")]
    NoMeshableParts {
        /// Parts discovered.
        total: usize,
        /// Parts that failed.
        failed: usize,
    },

    /// Writing the uncompressed asset failed.
    #[error("export failed")]
    ExportFailed(#[from] ExportError),

    /// The job was cancelled.
    #[error("conversion cancelled")]
    Cancelled,

    /// Invalid options.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
