use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use dailypapers::config::{Config, DEFAULT_CONFIG_PATH};
use dailypapers::pipeline::{Pipeline, Source};
use dailypapers_local::window;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "dailypapers", version)]
#[command(about = "Fetch, rank, summarize and report on freshly published arXiv papers", long_about = None)]
struct Cli {
    /// YAML config file.
    #[arg(long, short, env = "DAILYPAPERS_CONFIG", default_value = DEFAULT_CONFIG_PATH, global = true)]
    config: PathBuf,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the daily pipeline for one date.
    Run(RunCmd),
    /// Run the pipeline over every paper submitted between two dates.
    Backfill(BackfillCmd),
    /// Print the submission window for a date (json; no network).
    Window(WindowCmd),
}

#[derive(clap::Args, Debug)]
struct RunCmd {
    /// Run date (YYYY-MM-DD). Default: today (UTC).
    #[arg(long)]
    date: Option<NaiveDate>,
    /// Replay a crawled snapshot instead of fetching.
    #[arg(long)]
    papers_file: Option<PathBuf>,
}

#[derive(clap::Args, Debug)]
struct BackfillCmd {
    /// First date; its 14:00 America/New_York cutover starts the window.
    #[arg(long)]
    from: NaiveDate,
    /// Last date; its cutover ends the window (exclusive).
    #[arg(long)]
    to: NaiveDate,
}

#[derive(clap::Args, Debug)]
struct WindowCmd {
    /// Scheduler date (YYYY-MM-DD). Default: today (UTC).
    #[arg(long)]
    date: Option<NaiveDate>,
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

fn pipeline(config_path: &Path) -> Result<Pipeline> {
    let config = Config::load(config_path)?;
    dailypapers::logging::init(&config.logging)?;
    Pipeline::from_config(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Never overrides variables already set in the process environment.
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    match cli.command {
        Commands::Window(args) => {
            let w = window::scheduled_window(args.date.unwrap_or_else(today))?;
            println!("{}", serde_json::to_string(&w)?);
        }
        Commands::Run(args) => {
            let p = pipeline(&cli.config)?;
            let date = args.date.unwrap_or_else(today);
            let source = match args.papers_file {
                Some(path) => Source::Snapshot(path),
                None => Source::Window(window::scheduled_window(date)?),
            };
            let out = p.run(source, date).await.context("pipeline run failed")?;
            if let Some(r) = out.report {
                println!("{}", r.display());
            }
        }
        Commands::Backfill(args) => {
            let w = window::window_between(args.from, args.to)?;
            let p = pipeline(&cli.config)?;
            let out = p
                .run(Source::Range(w), args.to)
                .await
                .context("backfill failed")?;
            if let Some(r) = out.report {
                println!("{}", r.display());
            }
        }
    }
    Ok(())
}
