//! `mccopt` — mini-C TAC builder and optimizer CLI.

use clap::{CommandFactory, Parser as ClapParser, Subcommand};
use clap_complete::{generate, Shell};
use minicc_middle::{dump, CompileError, PipelineConfig};
use std::io;
use std::path::{Path, PathBuf};
use std::process;

#[derive(ClapParser)]
#[command(name = "mccopt")]
#[command(about = "Mini-C TAC builder and optimizer", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Source path ending in `.m`, when no subcommand is given.
    input: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Build `<path.m>`, writing `<stem>.x` (TAC listing, pass log, CFG).
    Build { input: PathBuf },
    /// Run construction and optimization, print the TAC listing to stdout.
    DumpTac { input: PathBuf },
    /// Generate shell completions.
    Completions { shell: Shell },
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Some(Commands::Build { input }) => run_build(&input),
        Some(Commands::DumpTac { input }) => run_dump_tac(&input),
        Some(Commands::Completions { shell }) => {
            run_completions(shell);
            Ok(())
        }
        None => match cli.input {
            Some(input) => run_build(&input),
            None => {
                eprintln!("Error: a source path is required (see --help)");
                process::exit(1);
            }
        },
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn check_extension(path: &Path) -> Result<(), CompileError> {
    if path.extension().and_then(|e| e.to_str()) != Some("m") {
        return Err(CompileError::Semantic(format!(
            "source file '{}' must end in '.m'",
            path.display()
        )));
    }
    Ok(())
}

fn run_build(input: &Path) -> Result<(), CompileError> {
    check_extension(input)?;
    let config = PipelineConfig::default();
    let (prog, log) = minicc_middle::compile_file(input, &config)?;

    let mut text = String::new();
    text.push_str(&dump::render_tac(&prog));
    text.push('\n');
    text.push_str(&log.render());
    text.push('\n');
    text.push_str(&dump::render_cfg(&prog));
    if prog.types.names().next().is_some() {
        text.push('\n');
        text.push_str(&dump::render_layouts(&prog));
    }

    let out_path = input.with_extension("x");
    std::fs::write(&out_path, text)?;
    println!("Compiled {} -> {}", input.display(), out_path.display());
    Ok(())
}

fn run_dump_tac(input: &Path) -> Result<(), CompileError> {
    check_extension(input)?;
    let config = PipelineConfig::default();
    let (prog, _log) = minicc_middle::compile_file(input, &config)?;
    print!("{}", dump::render_tac(&prog));
    Ok(())
}

fn run_completions(shell: Shell) {
    let mut cmd = Cli::command();
    generate(shell, &mut cmd, "mccopt", &mut io::stdout());
}
