//! Compression Orchestrator: compress the exported asset or fall back.
//!
//! The output path is filled by a two-phase commit. The raw export is
//! written to a candidate next to the output. An external compressor may
//! then produce a second candidate. Exactly one of them is promoted onto
//! the output path with an atomic rename; the other is deleted when it
//! drops.

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver};
use std::thread;
use std::time::{Duration, Instant};

use serde::Serialize;
use tempfile::{Builder, NamedTempFile};

use crate::config::CompressionOptions;
use crate::error::Result;

const POLL_INTERVAL: Duration = Duration::from_millis(50);
const STDERR_TAIL_LINES: usize = 5;
/// How long to keep reading pipes after the compressor itself has exited.
/// Helpers it left behind may hold them open indefinitely.
const DRAIN_GRACE: Duration = Duration::from_secs(2);

/// What happened when compression was attempted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompressionResult {
    pub success: bool,
    pub original_bytes: u64,
    pub compressed_bytes: Option<u64>,
    pub error: Option<String>,
}

impl CompressionResult {
    /// `(1 - compressed / original) * 100`, when compression succeeded.
    pub fn savings_percent(&self) -> Option<f64> {
        match self.compressed_bytes {
            Some(compressed) if self.success && self.original_bytes > 0 => {
                Some((1.0 - compressed as f64 / self.original_bytes as f64) * 100.0)
            }
            _ => None,
        }
    }
}

/// The output path plus the candidates competing for it.
#[derive(Debug)]
pub struct OutputSlot {
    target: PathBuf,
    dir: PathBuf,
    prefix: String,
    extension: String,
}

impl OutputSlot {
    /// Prepare the slot, creating the output directory if needed.
    pub fn new(target: &Path) -> io::Result<Self> {
        let dir = match target.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;
        let name = target
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "output".to_string());
        let extension = target
            .extension()
            .map(|e| e.to_string_lossy().into_owned())
            .unwrap_or_else(|| "glb".to_string());
        Ok(Self {
            target: target.to_path_buf(),
            dir,
            prefix: format!(".{name}."),
            extension,
        })
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    /// A new, empty candidate file in the output directory. It is removed
    /// when dropped unless promoted.
    pub fn candidate(&self, stage: &str) -> io::Result<NamedTempFile> {
        let suffix = format!(".{stage}.{}", self.extension);
        let mut builder = Builder::new();
        builder.prefix(&self.prefix).suffix(&suffix);
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            builder.permissions(fs::Permissions::from_mode(0o644));
        }
        builder.tempfile_in(&self.dir)
    }

    /// Atomically move a candidate onto the target. Returns its size.
    pub fn promote(&self, candidate: NamedTempFile) -> io::Result<u64> {
        candidate.persist(&self.target).map_err(|e| e.error)?;
        Ok(fs::metadata(&self.target)?.len())
    }
}

/// Runs the external compressor under a timeout.
#[derive(Debug, Clone)]
pub struct Compressor {
    options: CompressionOptions,
}

/// Read a pipe to its end on a detached thread.
fn drain<R: Read + Send + 'static>(mut pipe: R) -> Receiver<Vec<u8>> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        let _ = tx.send(buf);
    });
    rx
}

/// Whatever a drained pipe produced by `deadline`. A pipe still held open
/// by an orphaned process yields nothing instead of blocking.
fn collect(pipe: Option<Receiver<Vec<u8>>>, deadline: Instant) -> Vec<u8> {
    pipe.and_then(|rx| rx.recv_timeout(deadline.saturating_duration_since(Instant::now())).ok())
        .unwrap_or_default()
}

/// Kill the child, and on unix everything in its process group.
fn kill(child: &mut Child) {
    #[cfg(unix)]
    {
        // The child leads its own group, so `-pid` addresses the group.
        let group = format!("-{}", child.id());
        let _ = Command::new("kill")
            .args(["-KILL", "--", group.as_str()])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
    }
    let _ = child.kill();
    let _ = child.wait();
}

fn tail(output: &[u8]) -> String {
    let text = String::from_utf8_lossy(output);
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    lines[lines.len().saturating_sub(STDERR_TAIL_LINES)..].join(" | ")
}

impl Compressor {
    pub fn new(options: CompressionOptions) -> Self {
        Self { options }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.options.timeout_secs)
    }

    /// Compress `input` into `output`. Any failure is returned as a reason.
    pub fn run(&self, input: &Path, output: &Path) -> std::result::Result<(), String> {
        let program = &self.options.program;
        let mut command = Command::new(program);
        command
            .args(self.options.command_args(input, output))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }
        let mut child = command
            .spawn()
            .map_err(|e| match e.kind() {
                io::ErrorKind::NotFound => format!("compressor `{program}` not found"),
                _ => format!("cannot start `{program}`: {e}"),
            })?;

        let stdout = child.stdout.take().map(drain);
        let stderr = child.stderr.take().map(drain);

        let status = self.wait(&mut child);

        let grace = match status {
            Ok(Some(_)) => Instant::now() + DRAIN_GRACE,
            _ => Instant::now(),
        };
        let stdout = collect(stdout, grace);
        let stderr = collect(stderr, grace);
        tracing::debug!(stdout = %tail(&stdout), stderr = %tail(&stderr), "compressor output");

        match status {
            Ok(Some(status)) if status.success() => Ok(()),
            Ok(Some(status)) => {
                let detail = tail(&stderr);
                if detail.is_empty() {
                    Err(format!("compressor {status}"))
                } else {
                    Err(format!("compressor {status}: {detail}"))
                }
            }
            Ok(None) => Err(format!("compressor timed out after {}s", self.options.timeout_secs)),
            Err(e) => Err(format!("cannot wait for compressor: {e}")),
        }
    }

    /// Poll the child until it exits or the timeout passes. On timeout the
    /// child's process group is killed and reaped, and `None` is returned.
    /// A polling error also kills it before being returned.
    fn wait(&self, child: &mut Child) -> io::Result<Option<ExitStatus>> {
        let deadline = Instant::now() + self.timeout();
        loop {
            match child.try_wait() {
                Ok(Some(status)) => return Ok(Some(status)),
                Ok(None) if Instant::now() >= deadline => {
                    kill(child);
                    return Ok(None);
                }
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(err) => {
                    kill(child);
                    return Err(err);
                }
            }
        }
    }
}

/// Check a compressor's output, returning its size.
fn check_output(path: &Path) -> std::result::Result<u64, String> {
    let bytes = fs::read(path).map_err(|e| format!("cannot read compressor output: {e}"))?;
    if bytes.is_empty() {
        return Err("compressor wrote no output".into());
    }
    if !brepweb_gltf::is_glb(&bytes) {
        return Err("compressor output is not a GLB".into());
    }
    Ok(bytes.len() as u64)
}

/// Promote the best candidate onto the slot's target.
///
/// Without a compressor the raw candidate is promoted as is and `None` is
/// returned. Otherwise the compressed candidate wins when the compressor
/// succeeds and produces a valid GLB; on any failure the raw candidate is
/// promoted instead.
pub fn finalize(
    slot: &OutputSlot,
    raw: NamedTempFile,
    compressor: Option<&Compressor>,
) -> Result<Option<CompressionResult>> {
    let Some(compressor) = compressor else {
        slot.promote(raw)?;
        return Ok(None);
    };

    let original_bytes = raw.as_file().metadata()?.len();
    let compressed = slot.candidate("draco")?;
    let started = Instant::now();
    let verdict = compressor
        .run(raw.path(), compressed.path())
        .and_then(|()| check_output(compressed.path()));

    let failure = |reason: String| CompressionResult {
        success: false,
        original_bytes,
        compressed_bytes: None,
        error: Some(reason),
    };

    let result = match verdict {
        Ok(_) => match slot.promote(compressed) {
            Ok(compressed_bytes) => CompressionResult {
                success: true,
                original_bytes,
                compressed_bytes: Some(compressed_bytes),
                error: None,
            },
            Err(err) => {
                slot.promote(raw)?;
                failure(format!("cannot promote compressed output: {err}"))
            }
        },
        Err(reason) => {
            drop(compressed);
            slot.promote(raw)?;
            failure(reason)
        }
    };

    match (&result.error, result.savings_percent()) {
        (None, Some(savings)) => tracing::info!(
            original_bytes,
            compressed_bytes = ?result.compressed_bytes,
            savings = %format!("{savings:.1}%"),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "compression succeeded"
        ),
        (reason, _) => tracing::warn!(
            original_bytes,
            reason = reason.as_deref().unwrap_or("unknown"),
            "compression failed, keeping uncompressed output"
        ),
    }
    Ok(Some(result))
}
