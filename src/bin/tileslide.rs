use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::mpsc;

use anyhow::Context as _;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use tileslide::config::{OVERRIDE_KEYS, PipelineConfig};
use tileslide::host::{HostReport, SystemHost};
use tileslide::pipeline::{Capabilities, Pipeline, discover_sources};

#[derive(Parser, Debug)]
#[command(name = "tileslide", version)]
struct Cli {
    /// Debug-level logging (RUST_LOG overrides).
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Structured JSON logs on stderr.
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render the sliding-grid video.
    Render(RenderArgs),
    /// Print host resources and negotiated capabilities.
    Report(ConfigArgs),
}

#[derive(Args, Debug)]
struct ConfigArgs {
    /// JSON config file applied over the defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override one setting, e.g. `--set GRID_ROWS=4`. Applied after the environment.
    #[arg(long = "set", value_name = "KEY=VALUE", value_parser = parse_key_val)]
    overrides: Vec<(String, String)>,

    /// Ignore `OVERRIDE_KEYS` environment variables.
    #[arg(long)]
    no_env: bool,
}

#[derive(Args, Debug)]
struct RenderArgs {
    #[command(flatten)]
    config: ConfigArgs,

    /// Directory holding `image_NN.{jpeg,jpg,png}`.
    #[arg(long, default_value = "images")]
    source_dir: PathBuf,

    /// Output MP4 path (overrides the config).
    #[arg(long)]
    out: Option<PathBuf>,

    /// Print the run report as JSON on stdout.
    #[arg(long)]
    json_report: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.json_logs);
    match cli.cmd {
        Command::Render(args) => cmd_render(args),
        Command::Report(args) => cmd_report(args),
    }
}

fn init_logging(verbose: bool, json: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .init();
    }
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (k, v) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{s}'"))?;
    let key = k.trim().to_ascii_uppercase();
    if !OVERRIDE_KEYS.contains(&key.as_str()) {
        return Err(format!("unknown setting '{key}'"));
    }
    Ok((key, v.to_string()))
}

/// Defaults, then the JSON file, then the environment, then `--set`.
fn load_config(args: &ConfigArgs) -> anyhow::Result<PipelineConfig> {
    let mut cfg = match &args.config {
        Some(path) => PipelineConfig::load_json(path)?,
        None => PipelineConfig::default(),
    };

    if !args.no_env {
        let from_env: BTreeMap<String, String> = OVERRIDE_KEYS
            .iter()
            .filter_map(|k| std::env::var(k).ok().map(|v| (k.to_string(), v)))
            .collect();
        if !from_env.is_empty() {
            tracing::debug!(keys = ?from_env.keys().collect::<Vec<_>>(), "settings from environment");
        }
        cfg.apply_overrides(&from_env)?;
    }

    let from_cli: BTreeMap<String, String> = args.overrides.iter().cloned().collect();
    cfg.apply_overrides(&from_cli)?;
    Ok(cfg)
}

fn cmd_render(args: RenderArgs) -> anyhow::Result<()> {
    let mut cfg = load_config(&args.config)?;
    if let Some(out) = args.out {
        cfg.output_path = out;
    }

    let (tx, rx) = mpsc::channel();
    let mut pipeline = Pipeline::new(cfg)?.with_progress(tx);
    let (start, end) = (pipeline.config().start_image, pipeline.config().end_image);
    let sources = discover_sources(&args.source_dir, start, end);
    tracing::info!(
        dir = %args.source_dir.display(),
        found = sources.len(),
        wanted = end - start + 1,
        "source images"
    );

    let progress = std::thread::spawn(move || {
        for event in rx {
            tracing::info!(
                stage = ?event.stage,
                done = event.done,
                total = event.total,
                pct = format!("{:.0}", event.percent()),
                "progress"
            );
        }
    });

    let result = pipeline.run(&sources);
    drop(pipeline);
    let _ = progress.join();

    let report = result?;
    if args.json_report {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("serialize run report")?
        );
    } else {
        eprintln!(
            "wrote {} ({} frames, {}x{}, {})",
            report.output_path.display(),
            report.frame_count,
            report.frame_size.width,
            report.frame_size.height,
            report.encoder
        );
    }
    Ok(())
}

fn cmd_report(args: ConfigArgs) -> anyhow::Result<()> {
    let cfg = load_config(&args)?;
    cfg.validate()?;

    let report = HostReport::gather(&SystemHost::new(), cfg.worker_count);
    let caps = Capabilities::probe(&cfg);

    println!(
        "platform: {} {} ({})",
        report.platform.os,
        report.platform.arch,
        report.platform.version.as_deref().unwrap_or("unknown version")
    );
    println!("cpus: {}", report.cpus);
    println!(
        "memory: {} MiB available of {} MiB ({:.1}% used)",
        report.memory.available_bytes >> 20,
        report.memory.total_bytes >> 20,
        report.memory.used_percent()
    );
    println!("workers: {}", report.workers);
    println!("capabilities: {}", caps.summary());
    Ok(())
}
