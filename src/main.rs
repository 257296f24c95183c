//! LoopForge Command Line Interface
//!
//! Usage:
//!   loopforge [OPTIONS] <FILE> <COMMAND> --line <LINE> [ARGS]
//!   loopforge --help
//!
//! Examples:
//!   loopforge matmul.c interchange --line 4 --depth 2    # Swap i and k loops
//!   loopforge stencil.c tile --line 7 --factor 32 --depth 1
//!   loopforge saxpy.c parallelize --line 3 --check-only # Report legality only
//!   loopforge sum.c unroll --line 5 --factor 4 -o out.c

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use log::{debug, info};
use loopforge::context::{AnalysisConfig, RefactoringContext};
use loopforge::polyhedral::DEFAULT_MAX_ROWS;
use loopforge::request::{RefactoringKind, RefactoringRequest};
use loopforge::transform::ParallelKind;
use std::fs;
use std::path::PathBuf;

/// LoopForge - dependence-checked loop refactorings for C
#[derive(Parser, Debug)]
#[command(name = "loopforge")]
#[command(version)]
#[command(about = "Dependence-checked loop refactorings for C", long_about = None)]
struct Cli {
    /// C source file
    #[arg(value_name = "FILE")]
    input: PathBuf,

    /// Refactoring to apply
    #[command(subcommand)]
    command: Command,

    /// Output file (defaults to stdout)
    #[arg(short, long, value_name = "FILE", global = true)]
    output: Option<PathBuf>,

    /// Only run the checks and print the status
    #[arg(long, global = true)]
    check_only: bool,

    /// Constraint row limit for the dependence test
    #[arg(long, default_value_t = DEFAULT_MAX_ROWS, global = true)]
    max_rows: usize,

    /// Merge direction vectors into <=, >= and * summaries
    #[arg(long, global = true)]
    merge_directions: bool,

    /// Verbose output (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Quiet mode (suppress warnings)
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Swap the selected loop with the loop DEPTH levels below it
    Interchange {
        #[arg(long)]
        line: usize,
        #[arg(long, default_value_t = 1)]
        depth: usize,
    },
    /// Fuse the selected loop with the following compatible loop
    Fuse {
        #[arg(long)]
        line: usize,
    },
    /// Unroll the selected loop
    Unroll {
        #[arg(long)]
        line: usize,
        #[arg(long)]
        factor: i64,
    },
    /// Split the loop at DEPTH into by-strip and in-strip loops
    StripMine {
        #[arg(long)]
        line: usize,
        #[arg(long)]
        factor: i64,
        #[arg(long, default_value_t = 0)]
        depth: usize,
    },
    /// Tile the nest down to DEPTH with square tiles
    Tile {
        #[arg(long)]
        line: usize,
        #[arg(long)]
        factor: i64,
        #[arg(long, default_value_t = 1)]
        depth: usize,
    },
    /// Introduce `#pragma acc parallel loop`
    Parallelize {
        #[arg(long)]
        line: usize,
    },
    /// Introduce `#pragma acc kernels loop`
    Kernels {
        #[arg(long)]
        line: usize,
    },
}

impl Command {
    fn request(&self) -> RefactoringRequest {
        match *self {
            Command::Interchange { line, depth } => RefactoringRequest::new(line, RefactoringKind::Interchange { depth }),
            Command::Fuse { line } => RefactoringRequest::new(line, RefactoringKind::Fuse),
            Command::Unroll { line, factor } => RefactoringRequest::new(line, RefactoringKind::Unroll { factor }),
            Command::StripMine { line, factor, depth } => {
                RefactoringRequest::new(line, RefactoringKind::StripMine { factor, depth })
            }
            Command::Tile { line, factor, depth } => RefactoringRequest::new(line, RefactoringKind::Tile { factor, depth }),
            Command::Parallelize { line } => {
                RefactoringRequest::new(line, RefactoringKind::Parallelize(ParallelKind::Parallel))
            }
            Command::Kernels { line } => RefactoringRequest::new(line, RefactoringKind::Parallelize(ParallelKind::Kernels)),
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.quiet {
        log::LevelFilter::Error
    } else {
        match cli.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            2 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        }
    };

    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .format_timestamp(None)
        .init();

    info!("LoopForge v{}", loopforge::VERSION);
    debug!("Input file: {:?}", cli.input);

    // Read input file
    let source = fs::read_to_string(&cli.input)
        .with_context(|| format!("Failed to read input file: {:?}", cli.input))?;

    // Parse the source
    info!("Parsing...");
    let unit = loopforge::parse(&source).with_context(|| "Failed to parse input")?;

    let config = AnalysisConfig { max_rows: cli.max_rows, merge_directions: cli.merge_directions };
    debug!("Analysis config: {:?}", config);
    let ctx = RefactoringContext::new(&unit).with_config(config);

    let request = cli.command.request();
    let outcome = request
        .run(&ctx, cli.check_only)
        .with_context(|| format!("{} at line {} failed", request.kind, request.line))?;

    if !outcome.status.entries().is_empty() {
        eprintln!("{}", outcome.status);
    }
    match outcome.source {
        Some(rewritten) => write_output(&cli.output, &rewritten)?,
        None if cli.check_only => {
            if outcome.status.has_error() {
                bail!("{} is not applicable ({})", request.kind, outcome.status.severity());
            }
            println!("{}: {}", request.kind, outcome.status.severity());
        }
        None => bail!("{} refused ({})", request.kind, outcome.status.severity()),
    }

    Ok(())
}

fn write_output(path: &Option<PathBuf>, content: &str) -> Result<()> {
    match path {
        Some(p) => {
            fs::write(p, content)
                .with_context(|| format!("Failed to write output file: {:?}", p))?;
        }
        None => {
            print!("{}", content);
        }
    }
    Ok(())
}
