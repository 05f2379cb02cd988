//! SIL compiler CLI.
//!
//! Compiles `.sil` kernel sources to SPIR-V assembly and runs compile
//! checks over test corpora. Assembling and validating the output binary
//! (`spirv-as`, `spirv-val`) and running the host side are external steps.

use clap::{CommandFactory, Parser as ClapParser, Subcommand};
use clap_complete::{Shell, generate};
use silc::CompilerOptions;
use std::io;
use std::path::{Path, PathBuf};
use std::process;

#[derive(ClapParser)]
#[command(name = "silc")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "SIL compiler - compile .sil kernels to SPIR-V assembly", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a .sil file to SPIR-V assembly
    Build {
        /// Input .sil source file
        input: PathBuf,

        /// Output assembly path (defaults to the input with a .spvasm extension)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Print the token stream after scanning
        #[arg(long)]
        dump_tokens: bool,

        /// Print the parsed AST
        #[arg(long)]
        dump_ast: bool,
    },

    /// Compile every .sil file under the given paths and report results
    Test {
        /// Files or directories to search (defaults to the current directory)
        #[arg(default_value = ".")]
        paths: Vec<PathBuf>,

        /// Only run files whose name contains this pattern
        #[arg(short, long)]
        filter: Option<String>,

        /// Show timing for each file
        #[arg(short, long)]
        verbose: bool,
    },

    /// Generate shell completion scripts
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Build {
            input,
            output,
            dump_tokens,
            dump_ast,
        } => {
            let output = output.unwrap_or_else(|| input.with_extension("spvasm"));
            run_build(&input, &output, dump_tokens, dump_ast);
        }
        Commands::Test {
            paths,
            filter,
            verbose,
        } => {
            run_test(&paths, filter, verbose);
        }
        Commands::Completions { shell } => {
            run_completions(shell);
        }
    }
}

fn run_build(input: &Path, output: &Path, dump_tokens: bool, dump_ast: bool) {
    let options = CompilerOptions::new()
        .with_dump_tokens(dump_tokens)
        .with_dump_ast(dump_ast);

    match silc::compile_file(input, output, &options) {
        Ok(result) => {
            if result.assembly.is_some() {
                println!("Compiled {} -> {}", input.display(), output.display());
            } else {
                println!("{}: no kernels to compile", input.display());
            }
            if let Some(host_code) = result.host_code {
                let host_path = input.with_extension("host");
                if let Err(e) = std::fs::write(&host_path, host_code) {
                    eprintln!("Error writing host code: {}", e);
                    process::exit(1);
                }
                println!("Host code saved to {}", host_path.display());
            }
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
}

fn run_test(paths: &[PathBuf], filter: Option<String>, verbose: bool) {
    use silc::TestRunner;

    let runner = TestRunner::new(verbose, filter);
    let summary = runner.run(paths);

    runner.print_results(&summary);

    if summary.failed > 0 {
        process::exit(1);
    } else if summary.total == 0 {
        eprintln!("No .sil files found");
        process::exit(2);
    }
}

fn run_completions(shell: Shell) {
    let mut cmd = Cli::command();
    generate(shell, &mut cmd, "silc", &mut io::stdout());
}
