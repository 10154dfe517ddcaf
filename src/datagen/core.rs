//! Test-input generator: random `<number>. <text>` lines.
//!
//! The vocabulary is deliberately tiny so duplicate texts, the interesting
//! tie cases for the sort, show up even in small files. Output is
//! deterministic for a given seed.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

const GEN_BUF_SIZE: usize = 1024 * 1024;

const WORDS: &[&str] = &[
    "Apple", "Banana", "Cherry", "Date", "Elderberry", "Fig", "Grape", "Kiwi", "Lemon", "Mango",
    "Nectarine", "Orange", "Papaya", "Quince", "Raspberry", "Strawberry", "Tangerine", "Walnut",
    "is", "was", "very", "quite", "tasty", "ripe", "sour", "sweet", "green", "yellow", "red",
    "fresh", "dried", "juicy",
];

/// Configuration for one generated file.
#[derive(Debug, Clone)]
pub struct GenConfig {
    pub out_path: PathBuf,
    pub lines: u64,
    pub seed: u64,
    /// Words per line are drawn uniformly from `1..=max_words`.
    pub max_words: usize,
}

impl GenConfig {
    pub fn new(out_path: impl Into<PathBuf>, lines: u64) -> GenConfig {
        GenConfig {
            out_path: out_path.into(),
            lines,
            seed: 0,
            max_words: 4,
        }
    }
}

/// Write `config.lines` random records in the canonical line form. Returns
/// the number of lines written.
pub fn generate(config: &GenConfig) -> io::Result<u64> {
    let mut rng = SmallRng::seed_from_u64(config.seed);
    let file = File::create(&config.out_path)?;
    let mut writer = BufWriter::with_capacity(GEN_BUF_SIZE, file);

    let max_words = config.max_words.max(1);
    for _ in 0..config.lines {
        let number: i32 = rng.gen_range(0..=i32::MAX);
        write!(writer, "{}. ", number)?;
        let words = rng.gen_range(1..=max_words);
        for i in 0..words {
            if i > 0 {
                writer.write_all(b" ")?;
            }
            let word = WORDS[rng.gen_range(0..WORDS.len())];
            writer.write_all(word.as_bytes())?;
        }
        writer.write_all(b"\n")?;
    }

    writer.flush()?;
    Ok(config.lines)
}
