//! Rime Translator CLI
//!
//! # Usage
//!
//! ```text
//! rimec [OPTIONS] <COMMAND>
//!
//! Commands:
//!   translate  Translate a bitcode module and report diagnostics
//!
//! Options:
//!   -v, --verbose  Increase verbosity (can be repeated)
//!   -h, --help     Print help information
//!   -V, --version  Print version information
//! ```

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use rimec::ir::cfg::Cfg;
use rimec::ir::globals::VariableDecl;
use rimec::lower::Lower;
use rimec::{Flags, TranslationError, Translator};

/// The Rime bitcode translator.
///
/// Decodes a sandboxed portable bitcode module into a typed IR, reporting
/// diagnostics for malformed input.
#[derive(Parser)]
#[command(name = "rimec")]
#[command(version)]
#[command(about = "The Rime bitcode translator", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Increase verbosity (can be repeated: -v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Translate a bitcode module and report diagnostics
    Translate(TranslateArgs),
}

#[derive(Args)]
struct TranslateArgs {
    /// Bitcode module to translate
    #[arg(value_name = "FILE")]
    file: PathBuf,

    /// Keep decoding after recoverable errors to surface more diagnostics
    #[arg(long)]
    allow_error_recovery: bool,

    /// Number of lowering worker threads (0 = synchronous)
    #[arg(long, default_value_t = 0)]
    workers: usize,

    /// Prefix for generated names of unnamed functions
    #[arg(long, value_name = "PREFIX")]
    function_prefix: Option<String>,

    /// Prefix for generated names of unnamed global variables
    #[arg(long, value_name = "PREFIX")]
    global_prefix: Option<String>,
}

/// Stand-in backend: counts the functions that reach lowering. Real
/// instruction selection plugs in behind the same trait.
struct CountingLower {
    functions: AtomicUsize,
}

impl Lower for CountingLower {
    fn lower(&self, _cfg: Cfg) {
        self.functions.fetch_add(1, Ordering::SeqCst);
    }

    fn emit_globals(&self, _variables: &[VariableDecl]) {}
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Translate(args) => run_translate(args),
    }
}

fn run_translate(args: TranslateArgs) -> ExitCode {
    let bytes = match fs::read(&args.file) {
        Ok(bytes) => bytes,
        Err(err) => {
            eprintln!("error: cannot read {}: {}", args.file.display(), err);
            return ExitCode::FAILURE;
        }
    };

    let mut flags = Flags::default();
    flags.allow_error_recovery = args.allow_error_recovery;
    flags.num_workers = args.workers;
    if let Some(prefix) = args.function_prefix {
        flags.function_prefix = prefix;
    }
    if let Some(prefix) = args.global_prefix {
        flags.global_prefix = prefix;
    }

    let backend = Arc::new(CountingLower {
        functions: AtomicUsize::new(0),
    });
    let mut translator = Translator::new(flags, Arc::clone(&backend) as Arc<dyn Lower>);

    match translator.translate(&bytes) {
        Ok(()) => {
            println!(
                "{}: translated {} function(s)",
                args.file.display(),
                backend.functions.load(Ordering::SeqCst)
            );
            ExitCode::SUCCESS
        }
        Err(err) => {
            for diag in translator.diagnostics() {
                eprintln!("{}", diag);
            }
            match err {
                // Already rendered above as diagnostics.
                TranslationError::Malformed(_) | TranslationError::Invalid(_) => {
                    eprintln!("error: translation failed");
                }
                other => eprintln!("error: {}", other),
            }
            ExitCode::FAILURE
        }
    }
}
