//! Command-line interface implementation for docgen.
//! Provides argument parsing using clap.

use clap::Parser;
use std::path::PathBuf;

/// Command-line arguments structure for docgen.
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "docgen: DOCX template document generation service",
    long_about = None
)]
pub struct Args {
    /// Port to listen on (overrides config file and PORT)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Directory containing the .docx templates
    #[arg(short, long, value_name = "DIR")]
    pub templates_dir: Option<PathBuf>,

    /// Configuration file (defaults to docgen.json/.yml/.yaml in the working directory)
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Report every unresolved placeholder as an error unless a request says otherwise
    #[arg(long)]
    pub strict: bool,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,
}

/// Parses command line arguments and returns the Args structure.
pub fn get_args() -> Args {
    Args::parse()
}
