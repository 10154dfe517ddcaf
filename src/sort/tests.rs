use std::collections::HashMap;
use std::fs;
use std::path::Path;

use super::core::*;
use super::record::*;
use super::run_builder::build_runs;
use super::temp::TempSpace;
use crate::datagen::{generate, GenConfig};

fn test_config(in_path: &Path, out_path: &Path, scratch: &Path) -> SortConfig {
    let mut config = SortConfig::new(in_path, out_path);
    config.temp_dir = Some(scratch.to_path_buf());
    config.threads = 2;
    config
}

fn run_sort(input: &[u8], config_tweak: impl FnOnce(&mut SortConfig)) -> (Vec<u8>, SortStats) {
    let dir = tempfile::tempdir().unwrap();
    let in_path = dir.path().join("input.txt");
    let out_path = dir.path().join("output.txt");
    let scratch = dir.path().join("scratch");
    fs::write(&in_path, input).unwrap();

    let mut config = test_config(&in_path, &out_path, &scratch);
    config_tweak(&mut config);
    let stats = sort_file(&config, &CancelToken::new()).unwrap();

    assert!(!scratch.exists(), "scratch root should be cleaned up");
    (fs::read(&out_path).unwrap(), stats)
}

fn multiset(data: &[u8]) -> HashMap<(Vec<u8>, i32), u64> {
    let mut counts = HashMap::new();
    for line in data.split(|&b| b == b'\n').filter(|l| !l.is_empty()) {
        if let Some(r) = Record::try_parse(line) {
            *counts.entry((r.text, r.number)).or_insert(0) += 1;
        }
    }
    counts
}

fn assert_sorted(data: &[u8]) {
    let records: Vec<Record> = data
        .split(|&b| b == b'\n')
        .filter(|l| !l.is_empty())
        .map(|l| Record::try_parse(l).unwrap())
        .collect();
    for pair in records.windows(2) {
        assert!(pair[0] <= pair[1], "disorder: {:?} > {:?}", pair[0], pair[1]);
    }
}

#[test]
fn test_parse_valid_line() {
    let r = Record::try_parse(b"415. Apple is tasty").unwrap();
    assert_eq!(r.number, 415);
    assert_eq!(r.text, b"Apple is tasty");
}

#[test]
fn test_parse_rejects_malformed() {
    assert!(Record::try_parse(b"").is_none());
    assert!(Record::try_parse(b"hello").is_none());
    assert!(Record::try_parse(b". b").is_none());
    assert!(Record::try_parse(b"3.a").is_none());
    assert!(Record::try_parse(b"1. ").is_none());
    assert!(Record::try_parse(b"1.").is_none());
    assert!(Record::try_parse(b"+1. a").is_none());
    assert!(Record::try_parse(b"-1. a").is_none());
    assert!(Record::try_parse(b" 1. a").is_none());
    assert!(Record::try_parse(b"1 2. a").is_none());
}

#[test]
fn test_parse_number_width_is_32_bit_signed() {
    assert_eq!(Record::try_parse(b"2147483647. x").unwrap().number, i32::MAX);
    assert!(Record::try_parse(b"2147483648. x").is_none());
    assert!(Record::try_parse(b"99999999999999999999. x").is_none());
}

#[test]
fn test_parse_splits_on_first_dot() {
    let r = Record::try_parse(b"1. a. b. c").unwrap();
    assert_eq!(r.number, 1);
    assert_eq!(r.text, b"a. b. c");
}

#[test]
fn test_parse_rejects_invalid_utf8_text() {
    assert!(Record::try_parse(b"1. \xff\xfe").is_none());
    assert!(Record::try_parse("1. héllo".as_bytes()).is_some());
}

#[test]
fn test_record_order_text_then_number() {
    let a = Record::try_parse(b"2. Apple").unwrap();
    let b = Record::try_parse(b"1. Banana").unwrap();
    let c = Record::try_parse(b"1. Apple").unwrap();
    assert!(a < b);
    assert!(c < a);
}

#[test]
fn test_record_order_prefix_is_smaller() {
    let short = Record::try_parse(b"9. Apple").unwrap();
    let long = Record::try_parse(b"1. Apple is tasty").unwrap();
    assert!(short < long);
}

#[test]
fn test_record_order_is_ordinal_not_locale() {
    // 0x42 < 0x61: uppercase sorts before lowercase.
    let upper = Record::try_parse(b"1. B").unwrap();
    let lower = Record::try_parse(b"1. a").unwrap();
    assert!(upper < lower);
}

#[test]
fn test_write_line_canonical_form() {
    let mut out = Vec::new();
    Record::try_parse(b"7. hello").unwrap().write_line(&mut out).unwrap();
    assert_eq!(out, b"7. hello\n");
}

#[test]
fn test_duplicates_and_ties() {
    let input = b"2. Apple\n1. Banana\n3. Apple\n5. Apple is tasty\n4. Apple\n2. Banana\n";
    let (output, stats) = run_sort(input, |_| {});
    assert_eq!(
        output,
        b"2. Apple\n3. Apple\n4. Apple\n5. Apple is tasty\n1. Banana\n2. Banana\n"
    );
    assert_eq!(stats.records, 6);
}

#[test]
fn test_empty_input() {
    let (output, stats) = run_sort(b"", |_| {});
    assert!(output.is_empty());
    assert_eq!(stats.records, 0);
    assert_eq!(stats.runs, 0);
    assert_eq!(stats.merge_passes, 0);
}

#[test]
fn test_single_record_without_terminator() {
    let (output, _) = run_sort(b"7. hello", |_| {});
    assert_eq!(output, b"7. hello\n");
}

#[test]
fn test_invalid_lines_are_dropped() {
    let input = b"hello\n1. a\n. b\n2. a\n3.a\n";
    let (output, stats) = run_sort(input, |_| {});
    assert_eq!(output, b"1. a\n2. a\n");
    assert_eq!(stats.records, 2);
}

#[test]
fn test_ordinal_output_order() {
    let (output, _) = run_sort(b"1. a\n1. B\n", |_| {});
    assert_eq!(output, b"1. B\n1. a\n");
}

#[test]
fn test_bom_and_crlf_input() {
    let input = b"\xef\xbb\xbf2. b\r\n1. a\r\n";
    let (output, _) = run_sort(input, |_| {});
    assert_eq!(output, b"1. a\n2. b\n");
}

#[test]
fn test_single_run_skips_merge() {
    let (output, stats) = run_sort(b"2. b\n1. a\n3. c\n", |_| {});
    assert_eq!(output, b"1. a\n2. b\n3. c\n");
    assert_eq!(stats.runs, 1);
    assert_eq!(stats.merge_passes, 0);
}

#[test]
fn test_multi_pass_merge() {
    let dir = tempfile::tempdir().unwrap();
    let in_path = dir.path().join("input.txt");
    let out_path = dir.path().join("output.txt");
    let scratch = dir.path().join("scratch");
    generate(&GenConfig::new(&in_path, 50_000)).unwrap();

    let mut config = test_config(&in_path, &out_path, &scratch);
    config.run_size = 64 * 1024;
    config.fan_in = 4;
    let stats = sort_file(&config, &CancelToken::new()).unwrap();

    assert_eq!(stats.records, 50_000);
    assert!(stats.runs >= 16, "expected >= 16 runs, got {}", stats.runs);
    assert!(
        stats.merge_passes >= 2,
        "expected a multi-pass merge, got {} passes",
        stats.merge_passes
    );

    let input = fs::read(&in_path).unwrap();
    let output = fs::read(&out_path).unwrap();
    assert_sorted(&output);
    assert_eq!(multiset(&input), multiset(&output));
    assert!(!scratch.exists());
}

#[test]
fn test_idempotence() {
    let dir = tempfile::tempdir().unwrap();
    let in_path = dir.path().join("input.txt");
    let once = dir.path().join("once.txt");
    let twice = dir.path().join("twice.txt");
    let scratch = dir.path().join("scratch");
    generate(&GenConfig::new(&in_path, 3_000)).unwrap();

    let mut config = test_config(&in_path, &once, &scratch);
    config.run_size = 16 * 1024;
    sort_file(&config, &CancelToken::new()).unwrap();

    let mut config = test_config(&once, &twice, &scratch);
    config.run_size = 16 * 1024;
    sort_file(&config, &CancelToken::new()).unwrap();

    assert_eq!(fs::read(&once).unwrap(), fs::read(&twice).unwrap());
}

#[test]
fn test_fan_in_equivalence() {
    let dir = tempfile::tempdir().unwrap();
    let in_path = dir.path().join("input.txt");
    let narrow = dir.path().join("narrow.txt");
    let wide = dir.path().join("wide.txt");
    let scratch = dir.path().join("scratch");
    generate(&GenConfig::new(&in_path, 5_000)).unwrap();

    let mut config = test_config(&in_path, &narrow, &scratch);
    config.run_size = 16 * 1024;
    config.fan_in = 2;
    sort_file(&config, &CancelToken::new()).unwrap();

    let mut config = test_config(&in_path, &wide, &scratch);
    config.run_size = 16 * 1024;
    config.fan_in = 128;
    sort_file(&config, &CancelToken::new()).unwrap();

    assert_eq!(fs::read(&narrow).unwrap(), fs::read(&wide).unwrap());
}

#[test]
fn test_runs_are_sorted_and_bounded() {
    let dir = tempfile::tempdir().unwrap();
    let in_path = dir.path().join("input.txt");
    let scratch = dir.path().join("scratch");
    generate(&GenConfig::new(&in_path, 4_000)).unwrap();

    let input = fs::read(&in_path).unwrap();
    let max_line = input
        .split(|&b| b == b'\n')
        .map(|l| l.len() + 1)
        .max()
        .unwrap();

    let run_size = 8 * 1024;
    let temp = TempSpace::create(&scratch).unwrap();
    let (runs, records) =
        build_runs(&in_path, run_size, 2, &temp, &CancelToken::new()).unwrap();

    assert_eq!(records, 4_000);
    assert!(runs.len() > 1);
    for run in &runs {
        let data = fs::read(run).unwrap();
        assert_sorted(&data);
        assert!(
            data.len() <= run_size + max_line,
            "run {} exceeds size bound: {} > {}",
            run.display(),
            data.len(),
            run_size + max_line
        );
    }
    drop(temp);
    assert!(!scratch.exists());
}

#[test]
fn test_cancelled_before_start() {
    let dir = tempfile::tempdir().unwrap();
    let in_path = dir.path().join("input.txt");
    let out_path = dir.path().join("output.txt");
    let scratch = dir.path().join("scratch");
    fs::write(&in_path, b"1. a\n2. b\n").unwrap();

    let cancel = CancelToken::new();
    cancel.cancel();
    let config = test_config(&in_path, &out_path, &scratch);
    match sort_file(&config, &cancel) {
        Err(SortError::Cancelled) => {}
        other => panic!("expected Cancelled, got {:?}", other),
    }
    assert!(!scratch.exists(), "scratch root should be cleaned up");
}

#[test]
fn test_rejects_fan_in_below_two() {
    let dir = tempfile::tempdir().unwrap();
    let in_path = dir.path().join("input.txt");
    fs::write(&in_path, b"1. a\n").unwrap();
    let mut config = test_config(&in_path, &dir.path().join("out.txt"), &dir.path().join("s"));
    config.fan_in = 1;
    match sort_file(&config, &CancelToken::new()) {
        Err(SortError::InvalidArgs(_)) => {}
        other => panic!("expected InvalidArgs, got {:?}", other),
    }
}

#[test]
fn test_missing_input() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(
        &dir.path().join("nonexistent.txt"),
        &dir.path().join("out.txt"),
        &dir.path().join("s"),
    );
    match sort_file(&config, &CancelToken::new()) {
        Err(SortError::InputMissing { .. }) => {}
        other => panic!("expected InputMissing, got {:?}", other),
    }
}

#[test]
fn test_temp_space_mints_unique_names() {
    let dir = tempfile::tempdir().unwrap();
    let temp = TempSpace::create(dir.path()).unwrap();
    let a = temp.fresh_path("run");
    let b = temp.fresh_path("run");
    assert_ne!(a, b);
    assert!(a.starts_with(temp.path()));
}

#[test]
fn test_temp_space_drop_removes_dir() {
    let dir = tempfile::tempdir().unwrap();
    let temp = TempSpace::create(dir.path()).unwrap();
    let inner = temp.path().to_path_buf();
    fs::write(temp.fresh_path("run"), b"1. a\n").unwrap();
    drop(temp);
    assert!(!inner.exists());
}

#[test]
fn test_temp_space_preserves_existing_root() {
    let dir = tempfile::tempdir().unwrap();
    // The root existed before the engine ran, so it must survive cleanup.
    let temp = TempSpace::create(dir.path()).unwrap();
    drop(temp);
    assert!(dir.path().exists());
}
