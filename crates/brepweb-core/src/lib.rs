//! brepweb-core: shared vocabulary for the brepweb conversion pipeline.
//!
//! The pipeline never talks to a concrete CAD kernel or exporter. It works
//! against the types in this crate:
//!
//! - [`GeometryKernel`]: the narrow capability interface a B-rep kernel
//!   exposes (read, bounding box, classify, tessellate).
//! - [`TriangleMesh`] and [`BoundingBox`]: tessellation output and extents.
//! - [`Scene`], [`SceneNode`], [`Material`]: the ordered scene handed to an
//!   exporter.
//!
//! ```text
//! kernel ──> TriangleMesh ──> Scene ──> exporter
//! ```

pub mod error;
pub mod geometry;
pub mod kernel;
pub mod material;
pub mod scene;

pub use error::{KernelError, Result, SceneError};
pub use geometry::{BoundingBox, TriangleMesh};
pub use kernel::{GeometryKernel, TessellationParams, Topology};
pub use material::{AlphaMode, Material};
pub use scene::{Scene, SceneNode};
