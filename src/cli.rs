use crate::config::load_config;
use crate::editor::{Editor, IntentOutcome};
use crate::intent::EditIntent;
use crate::render::{RenderFrame, render_svg, write_output};
use crate::snapshot::{Snapshot, save_snapshot};
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "canvasctl",
    version,
    about = "Replay diagram edit intents and print the routed canvas"
)]
pub struct Args {
    /// Scene file (JSON: optional `snapshot` plus `intents`) or '-' for stdin
    #[arg(short = 'i', long = "input")]
    pub input: Option<PathBuf>,

    /// Output file. Defaults to stdout if omitted.
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,

    /// Output format
    #[arg(short = 'e', long = "outputFormat", value_enum, default_value = "json")]
    pub output_format: OutputFormat,

    /// Config JSON/JSON5 file (node defaults and router tuning)
    #[arg(short = 'c', long = "configFile")]
    pub config: Option<PathBuf>,

    /// Write the final domain graph and view state here
    #[arg(short = 's', long = "saveSnapshot")]
    pub save_snapshot: Option<PathBuf>,

    /// Pretty-print JSON output
    #[arg(long)]
    pub pretty: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum OutputFormat {
    Json,
    Svg,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Scene {
    #[serde(default)]
    snapshot: Option<Snapshot>,
    #[serde(default)]
    intents: Vec<EditIntent>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Report<'a> {
    frame: &'a RenderFrame,
    outcomes: &'a [IntentOutcome],
}

pub fn run() -> Result<()> {
    let args = Args::parse();
    init_tracing();

    let config = load_config(args.config.as_deref())?;
    let input = read_input(args.input.as_deref())?;
    let scene: Scene = serde_json::from_str(&input).context("failed to parse scene JSON")?;

    let mut editor = match scene.snapshot {
        Some(snapshot) => Editor::from_snapshot(snapshot, config)?,
        None => Editor::new(config),
    };
    for intent in scene.intents {
        editor.submit(intent);
    }
    let report = editor.drain();
    let failed = report.outcomes.iter().filter(|o| !o.is_ok()).count();
    if failed > 0 {
        tracing::warn!(failed, total = report.outcomes.len(), "some intents were rejected");
    }

    if let Some(path) = args.save_snapshot.as_deref() {
        save_snapshot(&editor.snapshot(), path)?;
    }

    let frame = editor.frame();
    let contents = match args.output_format {
        OutputFormat::Svg => render_svg(&frame),
        OutputFormat::Json => {
            let report = Report {
                frame: &frame,
                outcomes: &report.outcomes,
            };
            if args.pretty {
                serde_json::to_string_pretty(&report)?
            } else {
                serde_json::to_string(&report)?
            }
        }
    };
    write_output(&contents, args.output.as_deref())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

fn read_input(path: Option<&Path>) -> Result<String> {
    if let Some(path) = path
        && path != Path::new("-")
    {
        return std::fs::read_to_string(path)
            .with_context(|| format!("failed to read scene {}", path.display()));
    }
    let mut buf = String::new();
    io::stdin().read_to_string(&mut buf)?;
    Ok(buf)
}
