//! brepweb-step: a B-rep geometry kernel over STEP (ISO 10303-21) files.
//!
//! ```text
//! bytes ──p21──> EntityInstance ──> EntityGraph ──> StepShape
//!                                        │
//!                      Tessellator <─────┴─────> ColourIndex
//! ```
//!
//! [`StepKernel`] implements [`brepweb_core::GeometryKernel`]: it reads a
//! file into a whole-model [`StepShape`], classifies solids, shells, and
//! faces in file order, measures extents from sampled face boundaries, and
//! tessellates faces within a linear and angular deflection.

pub mod bspline;
pub mod entities;
pub mod kernel;
pub mod p21;
pub mod polygon;
pub mod style;
pub mod tessellate;

pub use entities::{EntityGraph, StepEntity};
pub use kernel::{ShapeRef, StepKernel, StepModel, StepShape};
pub use tessellate::{Resolution, Tessellator};
