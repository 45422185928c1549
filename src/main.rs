use anyhow::{Context, Result};
use clap::Parser;
use frame_registry::registry::SuspendedFramesRegistry;
use frame_registry::replay::{Replayer, Script};
use frame_registry::RegistryConfig;
use std::io::Write;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "frame-replay")]
#[command(about = "Replay a recorded suspend episode against the frame registry")]
#[command(version)]
struct Cli {
    /// JSON replay script (heap, frames and protocol steps)
    script: PathBuf,

    /// Registry configuration (YAML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write structured diagnostics to <DIR>/events.jsonl
    #[arg(long, value_name = "DIR")]
    events_dir: Option<PathBuf>,

    /// Pretty-print each result instead of one JSON object per line
    #[arg(long)]
    pretty: bool,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let mut config = match &cli.config {
        Some(path) => RegistryConfig::load(path)?,
        None => RegistryConfig::default(),
    };
    if let Some(dir) = cli.events_dir {
        config.diagnostics.events_dir = Some(dir);
    }

    let script = Script::load(&cli.script)?;
    let mut replayer = Replayer::new(&script, SuspendedFramesRegistry::builder(config))?;
    let results = replayer.run(&script.steps)?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    for result in results {
        let line = if cli.pretty {
            serde_json::to_string_pretty(&result)?
        } else {
            serde_json::to_string(&result)?
        };
        writeln!(out, "{}", line).context("Failed to write result")?;
    }
    tracing::info!(
        script = %cli.script.display(),
        steps = script.steps.len(),
        "replay finished"
    );
    Ok(())
}
