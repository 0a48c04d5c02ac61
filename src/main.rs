//! Command-line front end: decode a legacy Word document to marked-up text.
//!
//! # Usage
//!
//! ```sh
//! doctext report.doc
//! doctext report.doc -o report.txt --no-diagnostics
//! RUST_LOG=doctext=debug doctext report.doc
//! ```
//!
//! Text goes to stdout (or the output file); logs go to stderr.

use clap::Parser;
use doctext::doc::{ExtractOptions, Package};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Reconstruct paragraph text with table and page markup from a .doc file
#[derive(Parser, Debug)]
#[command(
    name = "doctext",
    about = "Extract marked-up text from Word 97-2003 (.doc) documents",
    long_about = "Decodes the text of a Word 97-2003 binary document in a single streaming pass.\n\
                  Paragraph ends are written as ¶, page breaks as §, cell ends as ¤,\n\
                  table terminator rows as ╜, and table regions are opened by ╤ and closed by ╚.",
    version
)]
struct Args {
    /// Input .doc file
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Write the text to this file instead of stdout
    #[arg(short, long, value_name = "OUTPUT")]
    output: Option<PathBuf>,

    /// Do not append container diagnostics after the text
    #[arg(long)]
    no_diagnostics: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    let options = ExtractOptions::new().with_container_diagnostics(!args.no_diagnostics);

    let result = match &args.output {
        Some(path) => File::create(path)
            .map_err(|e| format!("cannot create {}: {}", path.display(), e))
            .and_then(|file| extract(&args.input, &mut BufWriter::new(file), &options)),
        None => extract(&args.input, &mut BufWriter::new(io::stdout().lock()), &options),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("Error: {}", message);
            ExitCode::FAILURE
        },
    }
}

fn extract<W: Write>(input: &Path, out: &mut W, options: &ExtractOptions) -> Result<(), String> {
    let describe = |e: doctext::DocError| format!("{}: {}", input.display(), e);

    let mut package = Package::open(input).map_err(describe)?;
    let summary = package.extract_to(out, options).map_err(describe)?;
    out.flush()
        .map_err(|e| format!("cannot write output: {}", e))?;

    debug!(
        pieces = summary.pieces,
        paragraphs = summary.paragraphs,
        "done"
    );
    Ok(())
}
