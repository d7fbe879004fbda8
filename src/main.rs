use std::path::{Path, PathBuf};

use clap::Parser;
use colored::Colorize;
use miette::{IntoDiagnostic, Report, Result};

use lcvm::term::{self, TerminalConsole};
use lcvm::{Image, LoadError, RunState};

/// Exit status when the running program faults.
const FAULT_EXIT_CODE: i32 = 3;

/// Lcvm runs binary LC3 program images on a virtual LC3 machine.
#[derive(Parser)]
#[command(version)]
struct Args {
    /// `.obj` images to load in order, then run from x3000. Glob patterns are expanded
    #[arg(required = true)]
    images: Vec<PathBuf>,
    /// Produce minimal output, suited for blackbox tests
    #[arg(short, long)]
    minimal: bool,
}

fn main() -> miette::Result<()> {
    use MsgColor::*;
    let args = Args::parse();
    lcvm::env::init(args.minimal);
    env_logger::init();

    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new() //
                .context_lines(2)
                .build(),
        )
    }))?;

    // Every image must load before the terminal is touched
    let mut images = Vec::new();
    for path in expand_paths(&args.images)? {
        file_message(Green, "Loading", &path);
        images.push(Image::open(&path)?);
    }

    term::install_interrupt_handler().into_diagnostic()?;
    let console = TerminalConsole::new(lcvm::env::poll_timeout());
    let mut program = RunState::new(console);
    for image in &images {
        program.load_image(image);
    }

    message(Green, "Running", "loaded images");
    let result = program.run();

    match result {
        Ok(()) => {
            message(Green, "Completed", "program halted");
            Ok(())
        }
        Err(fault) => {
            message(Red, "Faulted", "program stopped");
            eprintln!("{:?}", Report::new(fault));
            std::process::exit(FAULT_EXIT_CODE);
        }
    }
}

/// Replace arguments containing glob metacharacters with their sorted matches.
fn expand_paths(args: &[PathBuf]) -> Result<Vec<PathBuf>, LoadError> {
    let mut paths = Vec::new();
    for arg in args {
        let Some(pattern) = arg.to_str().filter(|s| is_pattern(s)) else {
            paths.push(arg.clone());
            continue;
        };

        let matches = glob::glob(pattern).map_err(|source| LoadError::Pattern {
            pattern: pattern.to_string(),
            source,
        })?;
        let start = paths.len();
        for entry in matches {
            let path = entry.map_err(|err| LoadError::Open {
                path: err.path().to_path_buf(),
                source: err.into_error(),
            })?;
            paths.push(path);
        }
        if paths.len() == start {
            return Err(LoadError::NoMatch {
                pattern: pattern.to_string(),
            });
        }
    }
    Ok(paths)
}

fn is_pattern(arg: &str) -> bool {
    arg.chars().any(|ch| matches!(ch, '*' | '?' | '['))
}

enum MsgColor {
    Green,
    Red,
}

fn file_message(color: MsgColor, left: &str, right: &Path) {
    let right = format!("image {}", right.display());
    message(color, left, &right);
}

fn message<S>(color: MsgColor, left: S, right: S)
where
    S: Colorize + std::fmt::Display,
{
    if lcvm::env::is_minimal() {
        return;
    }
    let left = match color {
        MsgColor::Green => left.green(),
        MsgColor::Red => left.red(),
    };
    println!("{left:>12} {right}");
}
