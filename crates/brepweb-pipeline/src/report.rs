//! Job report.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use indexmap::IndexMap;
use serde::Serialize;

use crate::compress::CompressionResult;
use crate::error::Result;
use crate::mesher::PartFailure;
use crate::record::ShapeClass;

/// One node of the written scene.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeSummary {
    pub name: String,
    pub facets: usize,
}

/// Outcome of a successful conversion job.
#[derive(Debug, Clone, Serialize)]
pub struct ConversionReport {
    pub input: PathBuf,
    pub output: PathBuf,
    pub total_parts: usize,
    pub parts_by_class: IndexMap<ShapeClass, usize>,
    pub meshed: usize,
    pub failed: Vec<PartFailure>,
    pub nodes: Vec<NodeSummary>,
    /// Largest extent of the whole model, in model units.
    pub global_max_dimension: f64,
    pub elapsed: Duration,
    pub output_bytes: u64,
    /// `None` when compression was not attempted.
    pub compression: Option<CompressionResult>,
}

impl ConversionReport {
    /// Some parts failed but at least one was written.
    pub fn is_partial(&self) -> bool {
        !self.failed.is_empty()
    }

    /// True when the output holds the uncompressed asset after a failed
    /// compression attempt.
    pub fn fell_back(&self) -> bool {
        self.compression.as_ref().is_some_and(|c| !c.success)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        let json = self.to_json().map_err(std::io::Error::from)?;
        fs::write(path, json)?;
        Ok(())
    }
}
