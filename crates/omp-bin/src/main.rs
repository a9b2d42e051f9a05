//! `rompy` — transform a directive-annotated host source file.
//!
//! Writes the parallelized sibling under `__omp__/` next to the input and
//! prints its path. `ROMPY_LOG` controls tracing (same grammar as
//! `RUST_LOG`).

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use omp_transform::{transform_file, Options, TransformError};

#[derive(Parser, Debug)]
#[command(name = "rompy", version, about = "OpenMP-style transformer for host sources")]
struct Cli {
    /// Source file to transform.
    file: PathBuf,

    /// Name the directive function is imported under.
    #[arg(long, default_value = "omp")]
    alias: String,

    /// Skip the content-addressed artifact cache.
    #[arg(long)]
    no_cache: bool,

    /// Cache directory override (default: platform cache dir).
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Verbose diagnostics and debug-level logs.
    #[arg(long)]
    debug: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.debug { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("ROMPY_LOG")
                .unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    let options = Options {
        alias: cli.alias,
        debug: cli.debug,
        cache: !cli.no_cache,
        cache_dir: cli.cache_dir,
    };

    match transform_file(&cli.file, &options) {
        Ok(out_path) => {
            println!("{}", out_path.display());
            Ok(())
        }
        Err(TransformError::Syntax(err)) => {
            // Directive errors render their own file/line/caret block.
            eprintln!("{err}");
            std::process::exit(1);
        }
        Err(err) => Err(err).with_context(|| format!("transforming {}", cli.file.display())),
    }
}
