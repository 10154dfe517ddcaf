//! Engine configuration, outcomes, and the two-phase pipeline.
//!
//! `sort_file` is the single entry point: partition the input into sorted
//! runs (phase 1), k-way merge them into the output (phase 2), and clean up
//! the scratch space on every exit path.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use log::info;
use thiserror::Error;

use super::merge::merge_runs;
use super::run_builder::build_runs;
use super::temp::TempSpace;

const MIB: usize = 1024 * 1024;

/// Engine failure kinds. Parse rejects are not errors: malformed lines are
/// silently dropped in both phases.
#[derive(Debug, Error)]
pub enum SortError {
    /// Configuration the engine cannot run with.
    #[error("invalid arguments: {0}")]
    InvalidArgs(String),

    /// The input file could not be opened.
    #[error("cannot open {}: {}", path.display(), source)]
    InputMissing { path: PathBuf, source: io::Error },

    /// Any other read/write/fsync failure. Fatal: the pipeline aborts and
    /// cleanup runs.
    #[error("{0}")]
    Io(#[from] io::Error),

    /// The operator interrupted the sort.
    #[error("cancelled")]
    Cancelled,
}

/// Cooperative cancellation flag, polled at line granularity by every loop
/// in the engine. Cloning is cheap; all clones share one flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> CancelToken {
        CancelToken::default()
    }

    /// Trip the flag. Idempotent.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Configuration for one sort. `run_size` is a byte budget measured in
/// *input bytes consumed*, which bounds both run-file size and the memory
/// held by an in-flight batch.
#[derive(Debug, Clone)]
pub struct SortConfig {
    pub in_path: PathBuf,
    pub out_path: PathBuf,
    /// Scratch root; `None` means a `runs` directory next to the output.
    pub temp_dir: Option<PathBuf>,
    /// Per-run byte budget.
    pub run_size: usize,
    /// Writer workers for phase 1.
    pub threads: usize,
    /// Maximum runs merged by one pass of phase 2.
    pub fan_in: usize,
}

impl SortConfig {
    pub fn new(in_path: impl Into<PathBuf>, out_path: impl Into<PathBuf>) -> SortConfig {
        SortConfig {
            in_path: in_path.into(),
            out_path: out_path.into(),
            temp_dir: None,
            run_size: 1024 * MIB,
            threads: default_threads(),
            fan_in: 128,
        }
    }

    pub fn scratch_root(&self) -> PathBuf {
        match &self.temp_dir {
            Some(dir) => dir.clone(),
            None => {
                let parent = self.out_path.parent().unwrap_or(Path::new("."));
                parent.join("runs")
            }
        }
    }

    fn validate(&self) -> Result<(), SortError> {
        if self.fan_in < 2 {
            return Err(SortError::InvalidArgs(format!(
                "fan-in must be at least 2, got {}",
                self.fan_in
            )));
        }
        if self.run_size == 0 {
            return Err(SortError::InvalidArgs(
                "run size budget must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Half the hardware parallelism: phase 1 shares the machine with the reader
/// thread and the page cache.
pub fn default_threads() -> usize {
    let cpus = thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
    (cpus / 2).max(1)
}

/// Summary of a completed sort.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortStats {
    /// Valid records read, sorted, and emitted.
    pub records: u64,
    /// Runs produced by phase 1.
    pub runs: usize,
    /// Merge passes executed by phase 2 (0 when no merge was needed).
    pub merge_passes: usize,
}

/// Sort `config.in_path` into `config.out_path`.
///
/// Scratch files live under a unique directory inside `scratch_root()` and
/// are removed on all exit paths. Once `cancel` is tripped, `Cancelled`
/// supersedes any error raised by I/O against interrupted handles.
pub fn sort_file(config: &SortConfig, cancel: &CancelToken) -> Result<SortStats, SortError> {
    config.validate()?;
    let temp = TempSpace::create(&config.scratch_root())?;
    let result = run_pipeline(config, &temp, cancel);
    match result {
        // I/O against interrupted handles can fail arbitrarily; once the
        // token is tripped, the cancellation outcome wins.
        Err(_) if cancel.is_cancelled() => Err(SortError::Cancelled),
        other => other,
    }
}

fn run_pipeline(
    config: &SortConfig,
    temp: &TempSpace,
    cancel: &CancelToken,
) -> Result<SortStats, SortError> {
    let (runs, records) = build_runs(
        &config.in_path,
        config.run_size,
        config.threads,
        temp,
        cancel,
    )?;
    info!("phase 1 complete: {} records in {} runs", records, runs.len());

    let run_count = runs.len();
    let merge_passes = merge_runs(runs, &config.out_path, config.fan_in, temp, cancel)?;
    info!(
        "phase 2 complete: {} merge passes into {}",
        merge_passes,
        config.out_path.display()
    );

    Ok(SortStats {
        records,
        runs: run_count,
        merge_passes,
    })
}
