//! CAN Log Post-Processor CLI Application
//!
//! Command-line front end for the can-log-postproc library. It adds:
//! - Argument parsing and an optional TOML job file
//! - Logging setup
//! - Staging of the decoded tree into a scratch directory
//! - A JSON-lines notification outbox
//! - A text run summary

use anyhow::{Context, Result};
use can_log_postproc::{stage_decoded_files, LocalObjectStore, LogNotifier, Notifier, Pipeline};
use clap::Parser;
use std::path::PathBuf;

mod config;
mod notify;
mod report;

/// CAN Log Post-Processor - Derive custom messages and events from decoded CAN data
#[derive(Parser, Debug)]
#[command(name = "can-log-postproc")]
#[command(about = "Post-process decoded CAN log data (Parquet)", long_about = None)]
#[command(version)]
struct Args {
    /// Root of the decoded Parquet tree ({device}/{message}/{yyyy}/{mm}/{dd}/{file})
    #[arg(short, long, value_name = "DIR")]
    decoded: Option<PathBuf>,

    /// Directory holding custom-messages.json and events.json (default: decoded dir)
    #[arg(long, value_name = "DIR")]
    config_dir: Option<PathBuf>,

    /// Directory receiving all Parquet files of the run
    #[arg(short, long, value_name = "DIR")]
    output: Option<PathBuf>,

    /// JSON-lines file receiving event notifications (default: log only)
    #[arg(long, value_name = "FILE")]
    outbox: Option<PathBuf>,

    /// Write derived files directly into the decoded tree instead of a scratch copy
    #[arg(long)]
    in_place: bool,

    /// Path to job configuration file (TOML)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Verbosity level (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(args.verbose, args.quiet);

    log::info!("CAN Log Post-Processor CLI v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Using post-processor library v{}", can_log_postproc::VERSION);

    let app_config = match &args.config {
        Some(path) => {
            log::info!("Loading configuration from: {:?}", path);
            config::load_config(path)?
        }
        None => config::AppConfig::default(),
    };
    let settings = app_config.resolve(config::Overrides {
        decoded_dir: args.decoded.clone(),
        config_dir: args.config_dir.clone(),
        output_dir: args.output.clone(),
        outbox: args.outbox.clone(),
    })?;
    log::debug!("Resolved settings: {:?}", settings);

    let scratch = tempfile::TempDir::new().context("Failed to create scratch directory")?;
    let work_dir = if args.in_place {
        settings.decoded_dir.clone()
    } else {
        let work_dir = scratch.path().join("decoded");
        let source = LocalObjectStore::new(&settings.decoded_dir);
        stage_decoded_files(&source, "", &work_dir)
            .with_context(|| format!("Failed to stage {:?}", settings.decoded_dir))?;
        work_dir
    };

    let notifier: Box<dyn Notifier> = match &settings.outbox {
        Some(path) => Box::new(notify::OutboxNotifier::new(path)),
        None => Box::new(LogNotifier),
    };
    let config_store = LocalObjectStore::new(&settings.config_dir);
    let output_store = LocalObjectStore::new(&settings.output_dir);
    let pipeline = Pipeline::new(&config_store, &output_store, notifier.as_ref());

    let started = chrono::Utc::now();
    let summary = pipeline
        .run(&work_dir, &scratch.path().join("config"))
        .context("Post-processing run failed")?;
    let finished = chrono::Utc::now();

    if !args.quiet {
        println!("{}", report::render(&summary, started, finished));
    }

    Ok(())
}

/// Initialize logging based on verbosity level
fn init_logging(verbose: u8, quiet: bool) {
    use env_logger::Builder;
    use log::LevelFilter;
    use std::io::Write;

    let level = if quiet {
        LevelFilter::Error
    } else {
        match verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };

    Builder::new()
        .filter_level(level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {}] {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();
}
