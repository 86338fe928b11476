//! Pipeline Driver: one conversion job as a state machine.
//!
//! ```text
//! Reading -> Decomposing -> Meshing -> Assembling -> ExportingRaw -> Compressing -> Done
//!    \____________\______________\__________\______________\-----------> Failed
//! ```
//!
//! Per-part failures never leave `Meshing`; only fatal errors reach
//! `Failed`. Compression problems are settled by fallback and still end in
//! `Done`.

use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use brepweb_core::GeometryKernel;
use brepweb_gltf::{ExportError, ExportFormat};
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::assemble::{Assembly, SceneAssembler};
use crate::compress::{self, Compressor, OutputSlot};
use crate::config::ConvertOptions;
use crate::deflection::DeflectionEstimator;
use crate::error::{ConvertError, Result};
use crate::extract::{class_breakdown, extract};
use crate::mesher::{PartMesher, PartOutcome};
use crate::record::{ShapeClass, ShapeRecord};
use crate::report::{ConversionReport, NodeSummary};

/// Where a job is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum JobState {
    Pending,
    Reading,
    Decomposing,
    Meshing,
    Assembling,
    ExportingRaw,
    Compressing,
    Done,
    Failed,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Shared flag that stops a running job at the next part boundary.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A single conversion from `input` to `output`.
#[derive(Debug)]
pub struct Job {
    input: PathBuf,
    output: PathBuf,
    options: ConvertOptions,
    state: JobState,
    global_max_dimension: f64,
}

impl Job {
    pub fn new(input: impl Into<PathBuf>, output: impl Into<PathBuf>, options: ConvertOptions) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            options,
            state: JobState::Pending,
            global_max_dimension: 0.0,
        }
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn input(&self) -> &Path {
        &self.input
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    /// Largest extent of the whole model, known after `Reading`.
    pub fn global_max_dimension(&self) -> f64 {
        self.global_max_dimension
    }

    /// Run the job to a terminal state.
    pub fn run<K: GeometryKernel>(&mut self, kernel: &K, cancel: &CancelToken) -> Result<ConversionReport> {
        let result = self.execute(kernel, cancel);
        match &result {
            Ok(_) => self.enter(JobState::Done),
            Err(err) => {
                self.enter(JobState::Failed);
                error!(input = %self.input.display(), %err, "conversion failed");
            }
        }
        result
    }

    fn enter(&mut self, state: JobState) {
        debug!(from = %self.state, to = %state, "job state");
        self.state = state;
    }

    fn checkpoint(&self, cancel: &CancelToken) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(ConvertError::Cancelled);
        }
        Ok(())
    }

    fn execute<K: GeometryKernel>(&mut self, kernel: &K, cancel: &CancelToken) -> Result<ConversionReport> {
        let started = Instant::now();
        self.options.validate()?;

        self.enter(JobState::Reading);
        info!(input = %self.input.display(), kernel = kernel.name(), "reading model");
        let shape = kernel.read(&self.input).map_err(|source| ConvertError::UnreadableInput {
            path: self.input.clone(),
            source,
        })?;
        self.global_max_dimension = match kernel.bounding_box(&shape) {
            Ok(bounds) if !bounds.is_degenerate() => bounds.max_dimension() as f64,
            Ok(_) => 0.0,
            Err(err) => {
                warn!(%err, "cannot measure model");
                0.0
            }
        };
        self.checkpoint(cancel)?;

        self.enter(JobState::Decomposing);
        let mut records = extract(kernel, &shape);
        let parts_by_class = class_breakdown(&records);
        let count = |class: ShapeClass| parts_by_class.get(&class).copied().unwrap_or(0);
        info!(
            parts = records.len(),
            solids = count(ShapeClass::Solid),
            shells = count(ShapeClass::Shell),
            faces = count(ShapeClass::Face),
            unknown = count(ShapeClass::Unknown),
            max_dimension = self.global_max_dimension,
            "model decomposed"
        );

        self.enter(JobState::Meshing);
        let estimator = DeflectionEstimator::new(self.global_max_dimension, self.options.angular_deflection);
        let mesher = PartMesher::new(kernel, estimator, &self.options);
        let outcomes = self.mesh_all(&mesher, &mut records, cancel)?;
        let total_parts = records.len();
        drop(records);

        self.enter(JobState::Assembling);
        let mut assembler = SceneAssembler::new(self.options.unit_transform());
        if let Some(stem) = self.input.file_stem() {
            assembler = assembler.with_name(stem.to_string_lossy());
        }
        assembler.extend(outcomes);
        let Assembly { scene, failures } = assembler.finish()?;
        if !failures.is_empty() {
            warn!(failed = failures.len(), total = total_parts, "some parts were left out");
        }
        let nodes: Vec<NodeSummary> = scene
            .nodes()
            .map(|node| NodeSummary {
                name: node.name.clone(),
                facets: node.mesh.facet_count(),
            })
            .collect();
        self.checkpoint(cancel)?;

        self.enter(JobState::ExportingRaw);
        let format = ExportFormat::from_path(&self.output);
        let export_io = |err: std::io::Error| ConvertError::ExportFailed(ExportError::Io(err));
        let slot = OutputSlot::new(&self.output).map_err(export_io)?;
        let raw = slot.candidate("raw").map_err(export_io)?;
        let bytes = brepweb_gltf::to_bytes(&scene, format)?;
        drop(scene);
        raw.as_file()
            .write_all(&bytes)
            .and_then(|()| raw.as_file().sync_all())
            .map_err(export_io)?;
        debug!(bytes = bytes.len(), candidate = %raw.path().display(), "raw export written");
        drop(bytes);
        self.checkpoint(cancel)?;

        self.enter(JobState::Compressing);
        let compressor = (self.options.compression.enabled && format == ExportFormat::Glb)
            .then(|| Compressor::new(self.options.compression.clone()));
        let compression = compress::finalize(&slot, raw, compressor.as_ref())?;
        let output_bytes = std::fs::metadata(&self.output)?.len();

        let elapsed = started.elapsed();
        info!(
            processed = nodes.len(),
            total = total_parts,
            elapsed_ms = elapsed.as_millis() as u64,
            output_bytes,
            output = %self.output.display(),
            "conversion finished"
        );

        Ok(ConversionReport {
            input: self.input.clone(),
            output: self.output.clone(),
            total_parts,
            parts_by_class,
            meshed: nodes.len(),
            failed: failures,
            nodes,
            global_max_dimension: self.global_max_dimension,
            elapsed,
            output_bytes,
            compression,
        })
    }

    /// Mesh every record, in discovery order. Per-part failures come back
    /// as outcomes; only cancellation is an error.
    fn mesh_all<K: GeometryKernel>(
        &self,
        mesher: &PartMesher<'_, K>,
        records: &mut [ShapeRecord<K::Shape>],
        cancel: &CancelToken,
    ) -> Result<Vec<PartOutcome>> {
        let total = records.len();
        let interval = self.options.progress_interval.max(1);

        if self.options.jobs <= 1 {
            let mut outcomes = Vec::with_capacity(total);
            for record in records.iter_mut() {
                self.checkpoint(cancel)?;
                if record.index % interval == 0 {
                    info!(part = record.index, total, "meshing");
                }
                outcomes.push(mesher.process(record));
            }
            return Ok(outcomes);
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.options.jobs)
            .build()
            .map_err(|err| ConvertError::Config(format!("cannot start {} workers: {err}", self.options.jobs)))?;
        let done = AtomicUsize::new(0);
        let outcomes: Vec<Option<PartOutcome>> = pool.install(|| {
            records
                .par_iter_mut()
                .map(|record| {
                    if cancel.is_cancelled() {
                        return None;
                    }
                    let outcome = mesher.process(record);
                    let finished = done.fetch_add(1, Ordering::Relaxed) + 1;
                    if finished % interval == 0 {
                        info!(done = finished, total, "meshing");
                    }
                    Some(outcome)
                })
                .collect()
        });
        outcomes.into_iter().collect::<Option<Vec<_>>>().ok_or(ConvertError::Cancelled)
    }
}

/// Convert `input` to `output` with a fresh job and no cancellation.
pub fn convert<K: GeometryKernel>(
    kernel: &K,
    input: &Path,
    output: &Path,
    options: &ConvertOptions,
) -> Result<ConversionReport> {
    Job::new(input, output, options.clone()).run(kernel, &CancelToken::new())
}
