//! brepweb-gltf: glTF 2.0 export for brepweb scenes.
//!
//! Each [`SceneNode`](brepweb_core::SceneNode) becomes one glTF node with one
//! mesh named `{node}_Geo`. Materials are shared between nodes that use the
//! same scene material.
//!
//! ```text
//! Scene ──> GltfBuilder ──┬──> GLB  (header, JSON chunk, BIN chunk)
//!                         └──> glTF (JSON, base64 data URI buffer)
//! ```
//!
//! [`GlbSummary`] reads a GLB back far enough to check what it contains.

pub mod error;
pub mod inspect;
pub mod schema;
pub mod writer;

pub use error::{ExportError, Result};
pub use inspect::{is_glb, GlbSummary};
pub use writer::{to_bytes, write_glb, write_gltf, ExportFormat};
