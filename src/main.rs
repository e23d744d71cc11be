//! CLI for parsing and running block scripts.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{anyhow, Context as _, Result};
use blockflow::{BlockRegistry, EngineConfig, NamedUser, ScriptOutcome, StaticSite, Value};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "blockflow")]
#[command(author, version, about = "Run visually-authored block scripts", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a script and print its log record as JSON
    Run {
        /// Script JSON file
        input: PathBuf,

        /// Preset input, as NAME=JSON (repeatable)
        #[arg(short, long = "preset", value_parser = parse_preset)]
        presets: Vec<(String, Value)>,

        /// Engine config JSON file (scriptName, scriptId, timeoutMs)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Script name recorded in the log
        #[arg(long)]
        name: Option<String>,

        /// Abort the run after this many milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Identity the run is attributed to
        #[arg(long)]
        user: Option<String>,
    },
    /// Parse a script without running it
    Check {
        /// Script JSON file
        input: PathBuf,
    },
    /// List the registered block kinds
    Kinds,
}

fn parse_preset(raw: &str) -> Result<(String, Value), String> {
    let (name, json) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=JSON, got '{}'", raw))?;
    // Bare words are taken as strings so `-p city=Oslo` works unquoted.
    let value = serde_json::from_str::<serde_json::Value>(json)
        .map(Value::from)
        .unwrap_or_else(|_| Value::from(json));
    Ok((name.to_string(), value))
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let registry = BlockRegistry::standard();

    match args.command {
        Command::Kinds => {
            for kind in registry.kinds() {
                println!("{}", kind);
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Check { input } => {
            let text = std::fs::read_to_string(&input)
                .with_context(|| format!("reading {}", input.display()))?;
            let script = registry.parse(&text)?;
            println!(
                "✓ {} parsed: root '{}', {} statement(s) in the top-level chain",
                input.display(),
                script.root().kind(),
                script.root().chain_len()
            );
            Ok(ExitCode::SUCCESS)
        }
        Command::Run {
            input,
            presets,
            config,
            name,
            timeout_ms,
            user,
        } => {
            let text = std::fs::read_to_string(&input)
                .with_context(|| format!("reading {}", input.display()))?;

            let mut config = match config {
                Some(path) => {
                    let raw = std::fs::read_to_string(&path)
                        .with_context(|| format!("reading {}", path.display()))?;
                    serde_json::from_str::<EngineConfig>(&raw)
                        .with_context(|| format!("parsing {}", path.display()))?
                }
                None => EngineConfig::default(),
            };
            if name.is_some() {
                config.script_name = name;
            }
            if timeout_ms.is_some() {
                config.timeout_ms = timeout_ms;
            }
            if config.script_name.is_none() {
                config.script_name = input
                    .file_stem()
                    .map(|stem| stem.to_string_lossy().into_owned());
            }

            let mut builder = registry.builder().config(&config);
            if let Some(user) = user {
                builder = builder.current_user(Arc::new(NamedUser(user)));
            }
            let script = builder.parse(&text)?;

            let site = presets
                .into_iter()
                .fold(StaticSite::new(), |site, (name, value)| site.with_preset(name, value));
            let run = script.run(Arc::new(site)).await;

            let record = serde_json::to_string_pretty(&run.log)
                .map_err(|e| anyhow!("serializing log record: {}", e))?;
            println!("{}", record);

            Ok(if run.outcome() == ScriptOutcome::Success {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
    }
}
