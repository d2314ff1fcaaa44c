use clap::{Parser, Subcommand, ValueEnum};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::process;

use tree_reduce::{
    render_diagnostics, Diagnostic, DescriptionFile, KernelSet, ReductionTemplate, SynthError,
};

#[derive(Parser)]
#[command(
    name = "tree-reduce",
    version,
    about = "Synthesize tree-reduction GPU kernels from reduction descriptions"
)]
struct Cli {
    /// Print debug tracing to stderr
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate kernel text (or IR) from description files
    Emit {
        /// Reduction description files (.yaml)
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
        /// Which kernels to emit
        #[arg(long, value_enum, default_value = "all")]
        kernel: KernelChoice,
        /// Emit the front-end IR listing instead of kernel text
        #[arg(long)]
        ir: bool,
        /// Override the target named in the description
        #[arg(long)]
        target: Option<String>,
        /// Write one file per kernel into this directory (default: stdout)
        #[arg(short, long, value_name = "DIR")]
        output: Option<PathBuf>,
    },
    /// Synthesize and report diagnostics without emitting
    Check {
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
    },
    /// Show BLAKE3 fingerprints of the generated kernels
    Hash {
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
        /// Show full 256-bit hashes instead of short form
        #[arg(long)]
        full: bool,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum KernelChoice {
    Main,
    Remainder,
    All,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Emit {
            inputs,
            kernel,
            ir,
            target,
            output,
        } => cmd_emit(&inputs, kernel, ir, target.as_deref(), output.as_deref()),
        Command::Check { inputs } => cmd_check(&inputs),
        Command::Hash { inputs, full } => cmd_hash(&inputs, full),
    }
}

fn init_tracing(verbose: bool) {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(level)
        .with_target(false)
        .init();
}

// --- shared ---

/// Result of synthesizing one description file.
struct Outcome {
    path: PathBuf,
    /// File contents, kept for rendering diagnostics.
    source: Option<String>,
    result: Result<KernelSet, SynthError>,
}

fn synthesize_one(path: &Path, target: Option<&str>) -> Outcome {
    let source = match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) => {
            return Outcome {
                path: path.to_path_buf(),
                source: None,
                result: Err(SynthError::Io(e)),
            }
        }
    };
    let result = DescriptionFile::parse(&source).and_then(|mut file| {
        if let Some(t) = target {
            file.options.target = t.to_string();
        }
        file.synthesize()
    });
    Outcome {
        path: path.to_path_buf(),
        source: Some(source),
        result,
    }
}

/// Synthesize all inputs in parallel; results keep input order.
fn synthesize_all(inputs: &[PathBuf], target: Option<&str>) -> Vec<Outcome> {
    inputs
        .par_iter()
        .map(|path| synthesize_one(path, target))
        .collect()
}

/// Report a failed outcome. Returns the kernel set on success.
fn report(outcome: &Outcome) -> Option<&KernelSet> {
    match &outcome.result {
        Ok(set) => Some(set),
        Err(err) => {
            match &outcome.source {
                Some(source) => {
                    let filename = outcome.path.to_string_lossy().to_string();
                    render_diagnostics(&[Diagnostic::from_error(err)], &filename, source);
                }
                None => eprintln!("error: cannot read '{}': {}", outcome.path.display(), err),
            }
            None
        }
    }
}

fn selected(set: &KernelSet, choice: KernelChoice) -> Vec<&dyn ReductionTemplate> {
    let mut out: Vec<&dyn ReductionTemplate> = Vec::new();
    if choice != KernelChoice::Remainder {
        if let Some(main) = &set.main {
            out.push(main);
        }
    }
    if choice != KernelChoice::Main {
        if let Some(rem) = &set.remainder {
            out.push(rem);
        }
    }
    out
}

// --- tree-reduce emit ---

fn cmd_emit(
    inputs: &[PathBuf],
    choice: KernelChoice,
    ir: bool,
    target: Option<&str>,
    output: Option<&Path>,
) {
    if let Some(dir) = output {
        if let Err(e) = std::fs::create_dir_all(dir) {
            eprintln!("error: cannot create '{}': {}", dir.display(), e);
            process::exit(1);
        }
    }

    let mut failed = false;
    for outcome in synthesize_all(inputs, target) {
        let Some(set) = report(&outcome) else {
            failed = true;
            continue;
        };
        for template in selected(set, choice) {
            let text = if ir {
                template.kernel_ir().to_string()
            } else {
                template.kernel_string().to_string()
            };
            match output {
                Some(dir) => {
                    let ext = if ir { "ir" } else { "py" };
                    let path = dir.join(format!("{}.{}", template.kernel().name, ext));
                    if let Err(e) = std::fs::write(&path, &text) {
                        eprintln!("error: cannot write '{}': {}", path.display(), e);
                        failed = true;
                        continue;
                    }
                    eprintln!("Wrote {}", path.display());
                }
                None => print!("{}", text),
            }
        }
    }

    if failed {
        process::exit(1);
    }
}

// --- tree-reduce check ---

fn cmd_check(inputs: &[PathBuf]) {
    let mut failed = 0;
    for outcome in synthesize_all(inputs, None) {
        match report(&outcome) {
            Some(set) => eprintln!(
                "OK: {} ({} kernel{})",
                outcome.path.display(),
                set.templates().len(),
                if set.templates().len() == 1 { "" } else { "s" }
            ),
            None => failed += 1,
        }
    }
    if failed > 0 {
        eprintln!("{} of {} descriptions failed", failed, inputs.len());
        process::exit(1);
    }
}

// --- tree-reduce hash ---

fn cmd_hash(inputs: &[PathBuf], full: bool) {
    let mut failed = false;
    for outcome in synthesize_all(inputs, None) {
        let Some(set) = report(&outcome) else {
            failed = true;
            continue;
        };
        eprintln!("File: {}", outcome.path.display());
        for template in set.templates() {
            let hash = template.fingerprint();
            let shown = if full { &hash[..] } else { &hash[..16] };
            println!("  {} {}", shown, template.kernel().name);
        }
    }
    if failed {
        process::exit(1);
    }
}
