//! yamltag CLI - render YAML documents with directives resolved
//!
//! Usage:
//!   yamltag render config.yaml name=prod --format json
//!   yamltag check config.yaml name=prod
//!   cat config.yaml | yamltag render - name=prod

use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use yamltag_core::error::ErrorKind;
use yamltag_core::resolver::DEFAULT_MAX_DEPTH;
use yamltag_core::{Error, Fragment, LoadOptions, Loader, Node};

/// yamltag - YAML loading with !include, !env and !var directives
#[derive(Parser)]
#[command(name = "yamltag")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log resolution steps to stderr
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve a document and print the result
    Render {
        #[command(flatten)]
        source: SourceArgs,

        /// Output format: yaml, json
        #[arg(short, long, default_value = "yaml")]
        format: String,

        /// Write to file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Resolve a document and report whether it succeeded
    Check {
        #[command(flatten)]
        source: SourceArgs,
    },
}

#[derive(Args)]
struct SourceArgs {
    /// Document to load ("-" reads stdin)
    file: PathBuf,

    /// Variables for !var, as KEY=VALUE
    vars: Vec<String>,

    /// Directory relative !include paths resolve against (default: working directory)
    #[arg(long)]
    base_dir: Option<PathBuf>,

    /// Maximum nesting of directive fragments
    #[arg(long, default_value_t = DEFAULT_MAX_DEPTH)]
    max_depth: usize,
}

/// Initialize logging. `--debug` wins over `RUST_LOG`; the default is warnings only.
fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::new("yamltag_core=debug,yamltag_cli=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();
}

/// Run the CLI with the process arguments
pub fn run() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    match cli.command {
        Commands::Render {
            source,
            format,
            output,
        } => cmd_render(&source, &format, output),
        Commands::Check { source } => cmd_check(&source),
    }
}

fn load_source(source: &SourceArgs) -> Result<Node, Error> {
    let mut options = LoadOptions::default().with_max_depth(source.max_depth);
    if let Some(dir) = &source.base_dir {
        options = options.with_base_dir(dir);
    }
    let mut loader = Loader::new().with_options(options);

    log::debug!("Loading {}", source.file.display());
    let fragment: Fragment = if source.file == Path::new("-") {
        loader.load(std::io::stdin().lock(), &source.vars)?
    } else {
        loader.set_args(&source.vars);
        loader.from_path(&source.file)?
    };
    Ok(fragment.into_node())
}

/// Exit code for a load failure: 2 when the input itself could not be read
fn failure_code(err: &Error) -> ExitCode {
    match err.kind {
        ErrorKind::Io => ExitCode::from(2),
        _ => ExitCode::from(1),
    }
}

fn render_output(node: &Node, format: &str) -> Result<String, String> {
    match format {
        "json" => serde_json::to_string_pretty(node)
            .map(|s| s + "\n")
            .map_err(|e| format!("Cannot render as JSON: {}", e)),
        "yaml" | "yml" => {
            serde_yaml::to_string(node).map_err(|e| format!("Cannot render as YAML: {}", e))
        }
        _ => Err(format!("Unsupported format: {}. Use yaml or json.", format)),
    }
}

fn cmd_render(source: &SourceArgs, format: &str, output: Option<PathBuf>) -> ExitCode {
    let node = match load_source(source) {
        Ok(n) => n,
        Err(e) => {
            eprintln!("{} {}\n{}", "✗".red(), source.file.display(), e);
            return failure_code(&e);
        }
    };

    let content = match render_output(&node, format) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{}", e.red());
            return ExitCode::from(2);
        }
    };

    if let Some(output_path) = output {
        if let Err(e) = std::fs::write(&output_path, &content) {
            eprintln!("{}: {}", "Error writing file".red(), e);
            return ExitCode::from(2);
        }
        eprintln!("{} Wrote to {}", "✓".green(), output_path.display());
    } else {
        print!("{}", content);
    }
    ExitCode::SUCCESS
}

fn cmd_check(source: &SourceArgs) -> ExitCode {
    match load_source(source) {
        Ok(_) => {
            println!("{} {}: resolved", "✓".green(), source.file.display());
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{} {}\n{}", "✗".red(), source.file.display(), e);
            failure_code(&e)
        }
    }
}
