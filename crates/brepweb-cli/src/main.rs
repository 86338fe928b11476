//! brepweb: convert B-rep CAD models to glTF.
//!
//! ```text
//! brepweb convert part.step part.glb
//! brepweb convert assembly.stp out/assembly.glb --jobs 8 --y-up --report report.json
//! brepweb convert part.step part.gltf --scale 1
//! ```
//!
//! The exit code is 0 when an output file was written, including when
//! compression failed and the uncompressed asset was kept, and 1 otherwise.

use std::path::PathBuf;

use anyhow::{Context, Result};
use brepweb_pipeline::{CancelToken, ConvertOptions, Job};
use brepweb_step::StepKernel;
use clap::{ArgAction, Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

/// STEP to glTF converter
#[derive(Parser, Debug)]
#[command(name = "brepweb")]
#[command(about = "Convert B-rep CAD models to glTF", long_about = None)]
#[command(version)]
struct Cli {
    /// Log more (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Log only warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Convert a STEP file to a GLB or glTF file
    Convert(ConvertArgs),
}

#[derive(Args, Debug)]
struct ConvertArgs {
    /// STEP file to read
    input: PathBuf,

    /// Output file; `.gltf` writes JSON, anything else GLB
    output: PathBuf,

    /// JSON file with conversion options
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Skip Draco compression
    #[arg(long)]
    no_compress: bool,

    /// Compressor program
    #[arg(long, value_name = "PROGRAM")]
    compressor: Option<String>,

    /// Argument placed before the compressor's own arguments (repeatable)
    #[arg(long = "compressor-arg", value_name = "ARG", allow_hyphen_values = true)]
    compressor_args: Vec<String>,

    /// Compressor timeout in seconds
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,

    /// Model to scene unit scale (0.001 turns millimetres into metres)
    #[arg(long)]
    scale: Option<f32>,

    /// Rotate Z-up models to Y-up
    #[arg(long)]
    y_up: bool,

    /// Meshing threads
    #[arg(short, long)]
    jobs: Option<usize>,

    /// Write a JSON job report here
    #[arg(long, value_name = "FILE")]
    report: Option<PathBuf>,
}

impl ConvertArgs {
    /// Options from the config file, if any, with flags applied on top.
    fn options(&self) -> Result<ConvertOptions> {
        let mut options = match &self.config {
            Some(path) => ConvertOptions::from_json_file(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => ConvertOptions::default(),
        };

        if let Some(scale) = self.scale {
            options = options.with_unit_scale(scale);
        }
        if self.y_up {
            options = options.with_y_up(true);
        }
        if let Some(jobs) = self.jobs {
            options = options.with_jobs(jobs);
        }
        if let Some(program) = &self.compressor {
            options.compression = options
                .compression
                .with_program(program.clone(), self.compressor_args.clone());
        } else if !self.compressor_args.is_empty() {
            options.compression.program_args = self.compressor_args.clone();
        }
        if let Some(timeout) = self.timeout {
            options.compression = options.compression.with_timeout_secs(timeout);
        }
        if self.no_compress {
            options = options.without_compression();
        }
        Ok(options)
    }
}

fn init_logging(verbose: u8, quiet: bool) {
    let filter = match (quiet, verbose) {
        (true, _) => EnvFilter::new("warn"),
        (false, 0) => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        (false, 1) => EnvFilter::new("debug"),
        (false, _) => EnvFilter::new("trace"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn convert(args: ConvertArgs) -> Result<()> {
    let options = args.options()?;
    let kernel = StepKernel::new();
    let mut job = Job::new(&args.input, &args.output, options);
    let report = job
        .run(&kernel, &CancelToken::new())
        .with_context(|| format!("converting {} to {}", args.input.display(), args.output.display()))?;

    if let Some(path) = &args.report {
        report
            .write_json(path)
            .with_context(|| format!("writing report {}", path.display()))?;
        tracing::debug!(report = %path.display(), "report written");
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    match cli.command {
        Commands::Convert(args) => convert(args),
    }
}
