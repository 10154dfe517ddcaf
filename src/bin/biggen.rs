use std::path::PathBuf;
use std::process;

use clap::Parser;

use bigsort::common::{io_error_msg, reset_sigpipe};
use bigsort::datagen::{generate, GenConfig};

#[derive(Parser)]
#[command(
    name = "biggen",
    about = "Generate random '<number>. <text>' test input"
)]
struct Cli {
    /// Output path
    out_path: PathBuf,

    /// Number of lines to generate
    #[arg(short = 'n', long = "lines", value_name = "N", default_value_t = 1_000_000)]
    lines: u64,

    /// RNG seed; a given seed always produces the same file
    #[arg(long = "seed", value_name = "SEED", default_value_t = 0)]
    seed: u64,

    /// Maximum words per line
    #[arg(long = "max-words", value_name = "W", default_value_t = 4)]
    max_words: usize,
}

fn main() {
    reset_sigpipe();
    env_logger::init();
    let cli = Cli::parse();

    let mut config = GenConfig::new(&cli.out_path, cli.lines);
    config.seed = cli.seed;
    config.max_words = cli.max_words;

    if let Err(e) = generate(&config) {
        eprintln!("biggen: {}", io_error_msg(&e));
        process::exit(1);
    }
}
