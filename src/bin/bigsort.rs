use std::path::PathBuf;
use std::process;

use clap::Parser;

use bigsort::common::{io_error_msg, reset_sigpipe};
use bigsort::sort::{default_threads, sort_file, CancelToken, SortConfig, SortError};

const MIB: usize = 1024 * 1024;

#[derive(Parser)]
#[command(
    name = "bigsort",
    about = "Sort huge '<number>. <text>' files with bounded memory"
)]
struct Cli {
    /// File to sort
    in_path: PathBuf,

    /// Destination for the sorted output
    out_path: PathBuf,

    /// Use DIR for temporary run files, not a 'runs' directory next to the output
    #[arg(short = 'T', long = "temp-dir", value_name = "DIR")]
    temp_dir: Option<PathBuf>,

    /// Coarse memory budget in MiB
    #[arg(short = 'S', long = "mem-mb", value_name = "MB", default_value_t = 1024)]
    mem_mb: usize,

    /// Per-run byte budget in MiB (defaults to the memory budget)
    #[arg(long = "run-size-mb", value_name = "MB")]
    run_size_mb: Option<usize>,

    /// Writer threads for the run-building phase
    #[arg(long = "threads", value_name = "N")]
    threads: Option<usize>,

    /// Maximum runs merged per pass, at least 2
    #[arg(long = "fan-in", value_name = "F", default_value_t = 128)]
    fan_in: usize,
}

fn main() {
    reset_sigpipe();
    env_logger::init();
    let cli = Cli::parse();

    let mut config = SortConfig::new(&cli.in_path, &cli.out_path);
    config.temp_dir = cli.temp_dir;
    config.run_size = cli.run_size_mb.unwrap_or(cli.mem_mb).saturating_mul(MIB);
    config.threads = cli.threads.unwrap_or_else(default_threads);
    config.fan_in = cli.fan_in;

    let cancel = CancelToken::new();
    {
        let cancel = cancel.clone();
        if let Err(e) = ctrlc::set_handler(move || cancel.cancel()) {
            eprintln!("bigsort: cannot install interrupt handler: {}", e);
        }
    }

    match sort_file(&config, &cancel) {
        Ok(_) => {}
        Err(SortError::InvalidArgs(msg)) => {
            eprintln!("bigsort: {}", msg);
            process::exit(2);
        }
        Err(SortError::Cancelled) => {
            eprintln!("bigsort: cancelled");
            process::exit(130);
        }
        Err(SortError::InputMissing { path, source }) => {
            eprintln!(
                "bigsort: cannot open {}: {}",
                path.display(),
                io_error_msg(&source)
            );
            process::exit(1);
        }
        Err(SortError::Io(e)) => {
            eprintln!("bigsort: {}", io_error_msg(&e));
            process::exit(1);
        }
    }
}
