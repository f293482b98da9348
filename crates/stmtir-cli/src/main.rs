use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use stmtir_core::{FunctionDef, ModuleDef, StateVariable};
use stmtir_emit::{EmitterConfig, IrEmitter, OutputFormat};
use stmtir_lower::{lower_module, LoweringConfig, StmtLowerer};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "stmtir")]
#[command(about = "Lower type-checked statement trees into EVM-class IR")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Lower a JSON function definition (or a module of them) to IR.
    Lower {
        input: PathBuf,

        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Dump the IR tree as JSON instead of text.
        #[arg(long)]
        json: bool,

        #[arg(long)]
        no_color: bool,

        /// JSON file with `lowering` and `emit` sections.
        #[arg(long)]
        config: Option<PathBuf>,

        #[arg(short, long)]
        verbose: bool,
    },

    /// Check that an IR text file parses.
    Check {
        input: PathBuf,

        #[arg(short, long)]
        verbose: bool,
    },
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CliConfig {
    lowering: LoweringConfig,
    emit: EmitterConfig,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Lower {
            input,
            output,
            json,
            no_color,
            config,
            verbose,
        } => {
            init_tracing(verbose);
            cmd_lower(input, output, json, no_color, config, verbose)
        }
        Commands::Check { input, verbose } => {
            init_tracing(verbose);
            cmd_check(input, verbose)
        }
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .try_init();
}

fn read_config(path: &Path) -> Result<CliConfig> {
    let text = fs::read_to_string(path).with_context(|| format!("failed to read config {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("invalid config {}", path.display()))
}

/// A module (`{"state_vars", "functions"}`) or a single function, which
/// may carry the state variables it touches.
fn read_module(path: &Path) -> Result<ModuleDef> {
    let text = fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let value: serde_json::Value =
        serde_json::from_str(&text).with_context(|| format!("{} is not valid JSON", path.display()))?;

    if value.get("functions").is_some() {
        return serde_json::from_value(value).with_context(|| format!("invalid module in {}", path.display()));
    }
    let state_vars: Vec<StateVariable> = match value.get("state_vars") {
        Some(vars) => serde_json::from_value(vars.clone()).context("invalid state_vars")?,
        None => Vec::new(),
    };
    let def: FunctionDef =
        serde_json::from_value(value).with_context(|| format!("invalid function in {}", path.display()))?;
    Ok(ModuleDef {
        state_vars,
        functions: vec![def],
    })
}

fn cmd_lower(
    input: PathBuf,
    output: Option<PathBuf>,
    json: bool,
    no_color: bool,
    config: Option<PathBuf>,
    verbose: bool,
) -> Result<()> {
    let mut config = match config {
        Some(path) => read_config(&path)?,
        None => CliConfig::default(),
    };
    if no_color || output.is_some() {
        config.emit.use_colors = false;
    }
    debug!(?config, "configuration");

    let module = read_module(&input)?;
    info!(functions = module.functions.len(), input = %input.display(), "lowering");

    let lowerer = StmtLowerer::new(config.lowering);
    let functions = lower_module(&module, &lowerer).with_context(|| format!("failed to lower {}", input.display()))?;

    let format = if json { OutputFormat::Json } else { OutputFormat::Text };
    let rendered = format.render(&functions, &IrEmitter::new(config.emit))?;

    match output {
        Some(path) => {
            fs::write(&path, &rendered).with_context(|| format!("failed to write {}", path.display()))?;
            if verbose {
                println!("{} wrote {}", "SUCCESS:".bright_green().bold(), path.display());
            }
        }
        None => print!("{}", rendered),
    }
    Ok(())
}

fn cmd_check(input: PathBuf, verbose: bool) -> Result<()> {
    match stmtir_parser::parse_file(&input) {
        Ok(node) => {
            println!("{}", "VALID".bright_green().bold());
            if verbose {
                let mut count = 0usize;
                node.visit(&mut |_| count += 1);
                println!("   {} nodes", count);
            }
            Ok(())
        }
        Err(e) => {
            println!("{}", "INVALID".bright_red().bold());
            println!("{}", e);
            Err(anyhow!("{} is not valid IR", input.display()))
        }
    }
}
