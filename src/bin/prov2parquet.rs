//! Convert a provenance document into a columnar metric archive.
//!
//! Usage: `prov2parquet <input.json> [output.parquet]`
//!
//! The output path defaults to the input path with the extension swapped.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Context as _};

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    match run() {
        Ok(output) => {
            println!("wrote {}", output.display());
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("prov2parquet: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> anyhow::Result<PathBuf> {
    let mut args = std::env::args_os().skip(1);
    let Some(input) = args.next().map(PathBuf::from) else {
        bail!("usage: prov2parquet <input.json> [output.parquet]");
    };
    if !input.is_file() {
        bail!("input is not a valid file: {}", input.display());
    }

    let output = match args.next().map(PathBuf::from) {
        Some(mut path) => {
            if path.extension().and_then(|e| e.to_str()) != Some("parquet") {
                path.set_extension("parquet");
            }
            path
        }
        None => input.with_extension("parquet"),
    };

    runprov::convert::document_to_parquet(&input, &output)
        .with_context(|| format!("converting {}", input.display()))?;
    Ok(output)
}
