//! Phase 2: k-way merge of sorted runs, in multiple passes when the run
//! count exceeds the fan-in.
//!
//! Each merge pulls one line at a time from the head of each input run
//! through a min-priority queue. The fan-in cap bounds open file handles
//! and buffer memory per pass at the cost of `ceil(log_F(runs))` passes.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use log::info;

use super::core::{CancelToken, SortError};
use super::record::Record;
use super::temp::{remove_file_best_effort, TempSpace};

const MERGE_BUF_SIZE: usize = 1024 * 1024;

/// Merge `runs` into `out_path`, returning the number of merge passes.
///
/// Consumed runs are deleted best-effort after each pass; a failure while
/// writing the final output removes the partial file before propagating.
pub fn merge_runs(
    mut runs: Vec<PathBuf>,
    out_path: &Path,
    fan_in: usize,
    temp: &TempSpace,
    cancel: &CancelToken,
) -> Result<usize, SortError> {
    if runs.is_empty() {
        File::create(out_path)?;
        return Ok(0);
    }
    if runs.len() == 1 {
        if let Err(e) = copy_run(&runs[0], out_path, cancel) {
            remove_file_best_effort(out_path);
            return Err(e);
        }
        return Ok(0);
    }

    let mut passes = 0;
    while runs.len() > fan_in {
        passes += 1;
        let pass_dir = temp.pass_dir(passes)?;
        let mut next = Vec::with_capacity(runs.len().div_ceil(fan_in));
        for (i, chunk) in runs.chunks(fan_in).enumerate() {
            if cancel.is_cancelled() {
                return Err(SortError::Cancelled);
            }
            let dst = pass_dir.join(format!("merge-{:06}.run", i));
            merge_batch(chunk, &dst, cancel)?;
            next.push(dst);
        }
        for run in &runs {
            remove_file_best_effort(run);
        }
        info!(
            "merge pass {}: {} runs -> {}",
            passes,
            runs.len(),
            next.len()
        );
        runs = next;
    }

    passes += 1;
    if let Err(e) = merge_batch(&runs, out_path, cancel) {
        remove_file_best_effort(out_path);
        return Err(e);
    }
    for run in &runs {
        remove_file_best_effort(run);
    }
    Ok(passes)
}

/// Copy the lone run to the output, polling the cancellation token between
/// buffer-sized chunks the way the merge loop polls per line. A tripped
/// token surfaces `Cancelled`; the caller removes the partial output.
fn copy_run(src: &Path, dst: &Path, cancel: &CancelToken) -> Result<(), SortError> {
    let mut reader = BufReader::with_capacity(MERGE_BUF_SIZE, File::open(src)?);
    let file = File::create(dst)?;
    let mut writer = BufWriter::with_capacity(MERGE_BUF_SIZE, file);
    loop {
        if cancel.is_cancelled() {
            return Err(SortError::Cancelled);
        }
        let chunk = reader.fill_buf()?;
        if chunk.is_empty() {
            break;
        }
        let n = chunk.len();
        writer.write_all(chunk)?;
        reader.consume(n);
    }
    writer.flush()?;
    writer.get_ref().sync_all()?;
    Ok(())
}

/// Merge one batch of sorted runs into `dst` via a min-priority queue over
/// the readers' current records.
fn merge_batch(inputs: &[PathBuf], dst: &Path, cancel: &CancelToken) -> Result<(), SortError> {
    let mut readers = Vec::with_capacity(inputs.len());
    for path in inputs {
        readers.push(RunReader::open(path)?);
    }

    // BinaryHeap is a max-heap; Reverse turns it into the min-heap we need.
    let mut heap: BinaryHeap<Reverse<HeapEntry>> = BinaryHeap::with_capacity(readers.len());
    for (src, reader) in readers.iter_mut().enumerate() {
        if let Some(record) = reader.next_record()? {
            heap.push(Reverse(HeapEntry { record, src }));
        }
    }

    let file = File::create(dst)?;
    let mut writer = BufWriter::with_capacity(MERGE_BUF_SIZE, file);

    while let Some(Reverse(entry)) = heap.pop() {
        if cancel.is_cancelled() {
            return Err(SortError::Cancelled);
        }
        entry.record.write_line(&mut writer)?;
        if let Some(record) = readers[entry.src].next_record()? {
            heap.push(Reverse(HeapEntry {
                record,
                src: entry.src,
            }));
        }
    }

    writer.flush()?;
    writer.get_ref().sync_all()?;
    Ok(())
}

/// Buffered line reader over one run that yields parsed records, skipping
/// any line that fails to parse.
struct RunReader {
    reader: BufReader<File>,
    buf: Vec<u8>,
}

impl RunReader {
    fn open(path: &Path) -> Result<RunReader, SortError> {
        let file = File::open(path)?;
        Ok(RunReader {
            reader: BufReader::with_capacity(MERGE_BUF_SIZE, file),
            buf: Vec::with_capacity(256),
        })
    }

    fn next_record(&mut self) -> Result<Option<Record>, SortError> {
        loop {
            self.buf.clear();
            let n = self.reader.read_until(b'\n', &mut self.buf)?;
            if n == 0 {
                return Ok(None);
            }
            if self.buf.last() == Some(&b'\n') {
                self.buf.pop();
            }
            if self.buf.last() == Some(&b'\r') {
                self.buf.pop();
            }
            if let Some(record) = Record::try_parse(&self.buf) {
                return Ok(Some(record));
            }
        }
    }
}

/// Heap entry: the reader's current record plus the reader's index. The
/// index tie-break keeps heap order deterministic; it is not a cross-run
/// stability guarantee.
struct HeapEntry {
    record: Record,
    src: usize,
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.record
            .cmp(&other.record)
            .then_with(|| self.src.cmp(&other.src))
    }
}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.record == other.record && self.src == other.src
    }
}

impl Eq for HeapEntry {}
