mod cli;

use airwave::{bootstrap, config, sink, station};
use airwave_av::FfmpegTranscoder;
use airwave_db::pool::init_pool;
use airwave_db::queries::stations;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};
use std::sync::Arc;

async fn serve(station_names: Vec<String>, config_path: Option<&std::path::Path>) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;

    tracing::info!("Starting airwave playout scheduler");

    let db_path = config.storage.db_path.to_string_lossy();
    tracing::info!("Initializing database at {}", db_path);
    let db_pool = init_pool(&db_path)?;

    // The library must be schedulable before any station starts.
    let report =
        bootstrap::run_backfill(&db_pool, &config.tools, config.backfill.concurrency).await?;
    if report.failed > 0 {
        tracing::warn!(
            "{} videos failed metadata backfill and will be skipped",
            report.failed
        );
    }

    let transcoder = Arc::new(FfmpegTranscoder::new(
        config.tools.ffmpeg.clone(),
        config.tools.ffprobe.clone(),
        config.storage.work_dir.clone(),
    ));
    let manager = Arc::new(station::StationManager::new(
        db_pool.clone(),
        transcoder,
        Arc::new(config.playout.clone()),
    ));

    let names = if station_names.is_empty() {
        let conn = db_pool.get()?;
        stations::list_stations(&conn)?
    } else {
        station_names
    };
    if names.is_empty() {
        anyhow::bail!("no stations configured; seed the database first");
    }

    // Headless mode: stand in as the single viewer of every station with a
    // counting sink. A transport layer replaces this with per-viewer sinks.
    for name in &names {
        match manager.viewer_joined(name, Arc::new(sink::DiscardSink::default())) {
            Ok(_) => tracing::info!("station {} on air", name),
            Err(e) => tracing::error!("failed to start station {}: {}", name, e),
        }
    }

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down...");
    for name in &names {
        manager.viewer_left(name);
    }

    Ok(())
}

async fn backfill(
    concurrency: Option<usize>,
    config_path: Option<&std::path::Path>,
) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;
    let db_path = config.storage.db_path.to_string_lossy();
    let db_pool = init_pool(&db_path)?;

    let concurrency = concurrency.unwrap_or(config.backfill.concurrency);
    let report = bootstrap::run_backfill(&db_pool, &config.tools, concurrency).await?;
    println!("Backfilled {} videos, {} failed", report.probed, report.failed);
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG env var if set, otherwise use defaults based on the
    // verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "airwave=trace,airwave_av=debug,airwave_bitstream=debug,airwave_db=debug".to_string()
        } else {
            "airwave=debug,airwave_av=info,airwave_db=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .init();

    match cli.command {
        Commands::Serve { station } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(serve(station, cli.config.as_deref()))
        }
        Commands::Backfill { concurrency } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(backfill(concurrency, cli.config.as_deref()))
        }
        Commands::CheckTools => check_tools(),
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("airwave {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn check_tools() -> Result<()> {
    println!("Checking external tools...\n");

    let tools = airwave_av::check_tools();
    let mut all_ok = true;

    for tool in &tools {
        let status = if tool.available {
            "✓"
        } else {
            all_ok = false;
            "✗"
        };

        print!("{} {}", status, tool.name);

        if let Some(ref version) = tool.version {
            print!(" ({})", version.lines().next().unwrap_or(""));
        }

        if let Some(ref path) = tool.path {
            print!(" - {}", path.display());
        }

        println!();
    }

    println!();
    if all_ok {
        println!("All required tools are available!");
    } else {
        println!("Some tools are missing. Install them to enable playout.");
    }

    Ok(())
}

fn validate_config(path: Option<&std::path::Path>) -> Result<()> {
    match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let config = config::load_config(p)?;
            println!("✓ Configuration is valid");
            println!("  Database: {}", config.storage.db_path.display());
            println!("  Work dir: {}", config.storage.work_dir.display());
            println!(
                "  Chunks: {}s nominal, {}s max",
                config.playout.nominal_chunk_secs, config.playout.max_chunk_secs
            );
            println!("  Ads per break: {}", config.playout.ads_per_break);
        }
        None => {
            println!("No config file specified, using defaults");
            let config = config::Config::default();
            println!("Default config:");
            println!("  Database: {}", config.storage.db_path.display());
        }
    }

    Ok(())
}
