//! Conversion options.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use glam::{Mat4, Vec3};
use serde::{Deserialize, Serialize};

use crate::error::{ConvertError, Result};

/// Options for one conversion job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvertOptions {
    /// Uniform scale from model units to scene units (mm to m by default).
    pub unit_scale: f32,
    /// Angular deflection for every part, in radians.
    pub angular_deflection: f64,
    /// Rotate Z-up models so +Z becomes +Y.
    pub y_up: bool,
    /// Smallest exchange buffer accepted from the tessellator, in bytes.
    pub min_exchange_bytes: usize,
    /// Log meshing progress every this many parts.
    pub progress_interval: usize,
    /// Worker threads for meshing; 1 meshes in the calling thread.
    pub jobs: usize,
    /// Post-export compression.
    pub compression: CompressionOptions,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            unit_scale: 0.001,
            angular_deflection: 0.25,
            y_up: false,
            min_exchange_bytes: 100,
            progress_interval: 20,
            jobs: 1,
            compression: CompressionOptions::default(),
        }
    }
}

impl ConvertOptions {
    /// Load options from a JSON file. Missing fields keep their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        serde_json::from_str(&text).map_err(|e| ConvertError::Config(format!("{}: {e}", path.display())))
    }

    /// Reject values the pipeline cannot work with.
    pub fn validate(&self) -> Result<()> {
        if !(self.unit_scale.is_finite() && self.unit_scale > 0.0) {
            return Err(ConvertError::Config(format!("unit scale must be positive, got {}", self.unit_scale)));
        }
        if !(self.angular_deflection.is_finite() && self.angular_deflection > 0.0) {
            return Err(ConvertError::Config(format!(
                "angular deflection must be positive, got {}",
                self.angular_deflection
            )));
        }
        if self.compression.enabled && self.compression.timeout_secs == 0 {
            return Err(ConvertError::Config("compression timeout must be positive".into()));
        }
        if self.compression.enabled && self.compression.program.trim().is_empty() {
            return Err(ConvertError::Config("compression program is empty".into()));
        }
        Ok(())
    }

    /// The single model-to-scene transform baked into every vertex.
    pub fn unit_transform(&self) -> Mat4 {
        let scale = Mat4::from_scale(Vec3::splat(self.unit_scale));
        if self.y_up {
            Mat4::from_rotation_x(-std::f32::consts::FRAC_PI_2) * scale
        } else {
            scale
        }
    }

    pub fn with_unit_scale(mut self, unit_scale: f32) -> Self {
        self.unit_scale = unit_scale;
        self
    }

    pub fn with_y_up(mut self, y_up: bool) -> Self {
        self.y_up = y_up;
        self
    }

    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    pub fn with_compression(mut self, compression: CompressionOptions) -> Self {
        self.compression = compression;
        self
    }

    pub fn with_min_exchange_bytes(mut self, bytes: usize) -> Self {
        self.min_exchange_bytes = bytes;
        self
    }

    /// Disable compression.
    pub fn without_compression(mut self) -> Self {
        self.compression.enabled = false;
        self
    }
}

/// External compressor settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressionOptions {
    pub enabled: bool,
    /// Executable to run.
    pub program: String,
    /// Arguments placed before the `draco` subcommand (for example a
    /// package name when `program` is a launcher).
    pub program_args: Vec<String>,
    /// Hard limit on the compressor's run time.
    pub timeout_secs: u64,
    /// Connectivity coding method.
    pub method: String,
    pub encode_speed: u8,
    pub decode_speed: u8,
    pub quantize_position: u8,
    pub quantize_normal: u8,
    pub quantize_texcoord: u8,
    pub quantize_color: u8,
    pub quantize_generic: u8,
}

impl Default for CompressionOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            program: "gltf-transform".to_string(),
            program_args: Vec::new(),
            timeout_secs: 600,
            method: "edgebreaker".to_string(),
            encode_speed: 5,
            decode_speed: 5,
            quantize_position: 14,
            quantize_normal: 10,
            quantize_texcoord: 12,
            quantize_color: 10,
            quantize_generic: 12,
        }
    }
}

impl CompressionOptions {
    pub fn with_program(mut self, program: impl Into<String>, program_args: Vec<String>) -> Self {
        self.program = program.into();
        self.program_args = program_args;
        self
    }

    pub fn with_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// Full argument list for compressing `input` into `output`.
    pub fn command_args(&self, input: &Path, output: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = self.program_args.iter().map(OsString::from).collect();
        args.push("draco".into());
        args.push(PathBuf::from(input).into_os_string());
        args.push(PathBuf::from(output).into_os_string());
        let flags = [
            ("--method", self.method.clone()),
            ("--encode-speed", self.encode_speed.to_string()),
            ("--decode-speed", self.decode_speed.to_string()),
            ("--quantize-position", self.quantize_position.to_string()),
            ("--quantize-normal", self.quantize_normal.to_string()),
            ("--quantize-texcoord", self.quantize_texcoord.to_string()),
            ("--quantize-color", self.quantize_color.to_string()),
            ("--quantize-generic", self.quantize_generic.to_string()),
        ];
        for (flag, value) in flags {
            args.push(flag.into());
            args.push(value.into());
        }
        args
    }
}
