//! brepweb-pipeline: fault-tolerant B-rep to glTF conversion.
//!
//! A [`Job`] reads a model through any [`GeometryKernel`](brepweb_core::GeometryKernel),
//! splits it into parts, meshes each part in isolation, assembles the
//! survivors into one scene and writes it to a single output file:
//!
//! ```text
//! read ─> extract ─> mesh (per part) ─> assemble ─> export raw ─> compress / fall back
//! ```
//!
//! A failing part is reported and skipped. The job itself fails only when
//! the input cannot be read, no part meshes, or the export cannot be
//! written; in every case at most one file is left at the output path.

pub mod assemble;
pub mod compress;
pub mod config;
pub mod deflection;
pub mod driver;
pub mod error;
pub mod exchange;
pub mod extract;
pub mod mesher;
pub mod record;
pub mod report;

#[cfg(test)]
mod testkit;

pub use assemble::{Assembly, SceneAssembler};
pub use compress::{CompressionResult, Compressor, OutputSlot};
pub use config::{CompressionOptions, ConvertOptions};
pub use deflection::{linear_deflection, DeflectionEstimator};
pub use driver::{convert, CancelToken, Job, JobState};
pub use error::{ConvertError, PartError, Result};
pub use extract::extract;
pub use mesher::{MeshedPart, PartFailure, PartMesher, PartOutcome};
pub use record::{PartStatus, ShapeClass, ShapeRecord};
pub use report::{ConversionReport, NodeSummary};
