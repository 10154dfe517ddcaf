//! Phase 1: partition the input into memory-sized, internally sorted runs.
//!
//! One reader thread scans the input sequentially and accumulates parsed
//! records into a batch. Each time the batch accounts for `run_size` input
//! bytes it is handed to a bounded queue; a pool of writer workers sorts
//! each batch in place and spills it to a fresh run file. The bounded queue
//! is the back-pressure: when every worker is busy the reader blocks on
//! enqueue, so memory stays proportional to `run_size * (workers + queue)`.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::thread;

use crossbeam_channel::{bounded, Receiver, Sender};
use rayon::prelude::*;

use super::core::{CancelToken, SortError};
use super::record::Record;
use super::temp::TempSpace;

/// 1 MiB buffers on both sides: sequential scan in, streaming spill out.
const INPUT_BUF_SIZE: usize = 1024 * 1024;
const RUN_BUF_SIZE: usize = 1024 * 1024;

/// Below this batch size a single-threaded sort wins; above it, rayon.
const PAR_SORT_THRESHOLD: usize = 10_000;

const UTF8_BOM: &[u8] = b"\xef\xbb\xbf";

/// Read `in_path`, spill sorted runs under `temp`, and return the run paths
/// together with the number of valid records read.
///
/// Worker I/O errors are fatal; the first one observed wins. Cancellation
/// closes the queue without enqueueing the in-flight batch and surfaces
/// `Cancelled` after the workers have quiesced.
pub fn build_runs(
    in_path: &Path,
    run_size: usize,
    threads: usize,
    temp: &TempSpace,
    cancel: &CancelToken,
) -> Result<(Vec<PathBuf>, u64), SortError> {
    let file = File::open(in_path).map_err(|e| SortError::InputMissing {
        path: in_path.to_path_buf(),
        source: e,
    })?;

    let workers = threads.max(1);
    let (tx, rx) = bounded::<Vec<Record>>(workers);
    let produced = Mutex::new(Vec::new());

    let records = thread::scope(|scope| -> Result<u64, SortError> {
        let produced = &produced;
        let mut handles = Vec::with_capacity(workers);
        for _ in 0..workers {
            let rx = rx.clone();
            handles.push(scope.spawn(move || spill_worker(rx, temp, produced, cancel)));
        }
        drop(rx);

        let read_result = read_input(file, run_size, tx, cancel);

        let mut worker_err: Option<SortError> = None;
        for handle in handles {
            match handle.join() {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    worker_err.get_or_insert(e);
                }
                Err(panic) => std::panic::resume_unwind(panic),
            }
        }

        let records = read_result?;
        match worker_err {
            Some(e) => Err(e),
            None => Ok(records),
        }
    })?;

    let runs = produced.into_inner().unwrap();
    Ok((runs, records))
}

/// The reader loop. Owns the sending half of the queue; dropping it on any
/// return path signals "no more batches" to the workers.
fn read_input(
    file: File,
    run_size: usize,
    tx: Sender<Vec<Record>>,
    cancel: &CancelToken,
) -> Result<u64, SortError> {
    let mut reader = BufReader::with_capacity(INPUT_BUF_SIZE, file);
    let mut raw: Vec<u8> = Vec::with_capacity(256);
    let mut batch: Vec<Record> = Vec::new();
    let mut records: u64 = 0;

    // Watermark over *input bytes consumed*, not record count: this bounds
    // the on-disk size of each run by run_size plus one line.
    let mut pos: u64 = 0;
    let mut run_start: u64 = 0;
    let mut first_line = true;

    loop {
        if cancel.is_cancelled() {
            return Err(SortError::Cancelled);
        }
        raw.clear();
        let n = reader.read_until(b'\n', &mut raw)?;
        if n == 0 {
            break;
        }
        pos += n as u64;

        if raw.last() == Some(&b'\n') {
            raw.pop();
        }
        if raw.last() == Some(&b'\r') {
            raw.pop();
        }
        let mut line: &[u8] = &raw;
        if first_line {
            first_line = false;
            if line.starts_with(UTF8_BOM) {
                line = &line[UTF8_BOM.len()..];
            }
        }

        if let Some(record) = Record::try_parse(line) {
            batch.push(record);
            records += 1;
        }

        if pos - run_start >= run_size as u64 {
            if !batch.is_empty() {
                // Pre-size the fresh buffer to the outgoing batch's length:
                // consecutive batches cover similar byte ranges.
                let next = Vec::with_capacity(batch.len());
                if tx.send(std::mem::replace(&mut batch, next)).is_err() {
                    // Every worker is gone; their error surfaces after join.
                    break;
                }
            }
            run_start = pos;
        }
    }

    if !batch.is_empty() && !cancel.is_cancelled() {
        let _ = tx.send(batch);
    }
    Ok(records)
}

/// Writer worker: sort each batch in place and stream it to a fresh run
/// file. Publishes the path once the run is durable.
fn spill_worker(
    rx: Receiver<Vec<Record>>,
    temp: &TempSpace,
    produced: &Mutex<Vec<PathBuf>>,
    cancel: &CancelToken,
) -> Result<(), SortError> {
    for mut batch in rx {
        if cancel.is_cancelled() {
            return Err(SortError::Cancelled);
        }
        sort_records(&mut batch);
        let path = temp.fresh_path("run");
        write_run(&path, &batch, cancel)?;
        produced.lock().unwrap().push(path);
    }
    Ok(())
}

/// In-place comparison sort. No stability is required: equal records within
/// a batch are interchangeable under the record order.
fn sort_records(records: &mut [Record]) {
    if records.len() > PAR_SORT_THRESHOLD {
        records.par_sort_unstable();
    } else {
        records.sort_unstable();
    }
}

/// Stream a sorted batch to `path` and make it durable before it can be
/// consumed by phase 2. A cancelled write surfaces `Cancelled` so the
/// partial, unsynced file is never published as a run; it is left on disk
/// for TempSpace cleanup.
fn write_run(path: &Path, records: &[Record], cancel: &CancelToken) -> Result<(), SortError> {
    let file = File::create(path)?;
    let mut writer = BufWriter::with_capacity(RUN_BUF_SIZE, file);
    for record in records {
        if cancel.is_cancelled() {
            return Err(SortError::Cancelled);
        }
        record.write_line(&mut writer)?;
    }
    writer.flush()?;
    writer.get_ref().sync_all()?;
    Ok(())
}
