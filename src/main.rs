mod cli;

use loopcast::{config, epoch::EpochStore, server, station::Station, supervisor::Supervisor};

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use cli::{Cli, Commands};
use std::sync::Arc;

async fn start_station(
    host: Option<String>,
    port: Option<u16>,
    config_path: Option<&std::path::Path>,
) -> Result<()> {
    let mut config = config::load_config_or_default(config_path)?;

    // Override host/port from CLI if specified
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    tracing::info!("Starting loopcast station");
    tracing::info!(
        "Server will listen on {}:{}",
        config.server.host,
        config.server.port
    );

    if config.media.source.as_os_str().is_empty() {
        anyhow::bail!("No source video configured (media.source)");
    }
    if !config.media.source.exists() {
        anyhow::bail!("Source video does not exist: {:?}", config.media.source);
    }

    for profile in &config.profiles {
        let dir = config.media.output_dir.join(&profile.name);
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create output directory {:?}", dir))?;
    }

    let ffmpeg = loopcast_av::get_tool_path("ffmpeg", config.tools.ffmpeg.as_deref())
        .context("ffmpeg is required")?;
    let ffprobe = loopcast_av::get_tool_path("ffprobe", config.tools.ffprobe.as_deref())
        .context("ffprobe is required")?;

    // The duration anchors the whole clock; refusing to start without it is
    // better than broadcasting garbage offsets.
    let info = loopcast_av::probe_source(&ffprobe, &config.media.source)
        .context("Failed to probe source video")?;
    tracing::info!(
        source = %config.media.source.display(),
        duration_secs = format_args!("{:.2}", info.duration_secs),
        "Probed source video"
    );

    let store = EpochStore::new(config.media.epoch_path.clone());
    let epoch = store.load_or_create(Utc::now())?;

    let (fatal_tx, mut fatal_rx) = tokio::sync::mpsc::unbounded_channel();

    let transcoder = Arc::new(loopcast_av::FfmpegTranscoder::new(ffmpeg));
    let supervisor = Supervisor::new(
        transcoder,
        config.media.source.clone(),
        config.media.output_dir.clone(),
        config.profiles.clone(),
        config.stream.clone(),
        fatal_tx,
    );

    let station = Arc::new(Station::new(
        store,
        epoch,
        supervisor,
        info.duration_secs,
        config.profiles.clone(),
        config.stream.clone(),
    ));

    let background = station.spawn_background_tasks();

    let config = Arc::new(config);
    let result = tokio::select! {
        result = server::start_server(Arc::clone(&config), Arc::clone(&station)) => result,
        fatal = fatal_rx.recv() => {
            match fatal {
                Some(fatal) => {
                    // Die loudly and let the external supervisor restart us;
                    // the epoch file makes the restart seamless for viewers.
                    tracing::error!(error = %fatal, "Fatal stream error, shutting down");
                    station.shutdown().await;
                    Err(anyhow::anyhow!(fatal))
                }
                None => Ok(()),
            }
        }
    };

    for handle in background {
        handle.abort();
    }

    result
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "loopcast=trace,loopcast_av=trace,tower_http=debug".to_string()
        } else {
            "loopcast=debug,loopcast_av=debug,tower_http=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .init();

    match cli.command {
        Commands::Start { host, port } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(start_station(host, port, cli.config.as_deref()))
        }
        Commands::Probe { file, json } => probe_file(&file, json),
        Commands::CheckTools => check_tools(),
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("loopcast {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn probe_file(file: &std::path::Path, json: bool) -> Result<()> {
    if !file.exists() {
        anyhow::bail!("File does not exist: {:?}", file);
    }

    let ffprobe = loopcast_av::require_tool("ffprobe")?;
    let info = loopcast_av::probe_source(&ffprobe, file)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&info)?);
    } else {
        println!("File: {}", file.display());
        println!("Container: {}", info.container);
        let secs = info.duration_secs as u64;
        println!(
            "Duration: {:02}:{:02}:{:02} ({:.2}s)",
            secs / 3600,
            (secs / 60) % 60,
            secs % 60,
            info.duration_secs
        );
    }

    Ok(())
}

fn check_tools() -> Result<()> {
    println!("Checking external tools...\n");

    let tools = loopcast_av::check_tools();
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
            print!(" ({})", version);
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
        println!("Some tools are missing. Install ffmpeg to run the station.");
    }

    Ok(())
}

fn validate_config(path: Option<&std::path::Path>) -> Result<()> {
    match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let config = config::load_config(p)?;
            println!("✓ Configuration is valid");
            println!("  Server: {}:{}", config.server.host, config.server.port);
            println!("  Source: {:?}", config.media.source);
            println!("  Output dir: {:?}", config.media.output_dir);
            println!("  Profiles: {}", config.profiles.len());
            for profile in &config.profiles {
                println!(
                    "    {} ({}s segments, {} in playlist)",
                    profile.name, profile.segment_duration_secs, profile.list_size
                );
            }
        }
        None => {
            println!("No config file specified, using defaults");
            let config = config::Config::default();
            println!("Default config:");
            println!("  Server: {}:{}", config.server.host, config.server.port);
            println!("  Profiles: {}", config.profiles.len());
        }
    }

    Ok(())
}
