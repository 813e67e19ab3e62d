use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use api_client::{ApiOptions, HttpApi};
use live_poll::{PollSnapshot, Poller, DEFAULT_POLL_INTERVAL};
use plate_search::SearchOutcome;
use platewatch_core::{DetectionApi, StartRequest, DEFAULT_STREAM_URL};
use run_control::Commander;

mod config;
mod render;

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_else(|_| String::new())
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum OutputFormat { Text, Json, Jsonl }

#[derive(Debug, Parser)]
#[command(name = "platewatch", version, about = "Workshop livestream plate-detection monitor")]
struct Cli {
    /// Optional config file (YAML). If omitted, loads ./platewatch.yaml if present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// API base, e.g. http://localhost:8000/api/v1
    #[arg(long, global = true)]
    base_url: Option<String>,
    /// Bearer token attached to every request
    #[arg(long, global = true)]
    token: Option<String>,
    /// Output format: text, json, or jsonl
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print version information
    Version,
    /// Fetch the livestream/task status once
    Status,
    /// Start the detection task on the backend
    Start {
        /// Stream source passed to the detection task
        #[arg(long, default_value = DEFAULT_STREAM_URL)]
        stream_url: String,
        /// Optional output sink (e.g. output.avi for the blurred recording)
        #[arg(long)]
        output_url: Option<String>,
        /// Disable face blurring
        #[arg(long, default_value_t = false)]
        no_face_blur: bool,
        /// Disable plate blurring
        #[arg(long, default_value_t = false)]
        no_plate_blur: bool,
        /// Do not save plate crops on the backend
        #[arg(long, default_value_t = false)]
        no_save_images: bool,
    },
    /// Stop the detection task
    Stop,
    /// Search a license plate across vehicles, customers and appointments
    Search { plate: String },
    /// Manually process a detected plate
    Process { plate: String },
    /// List recent detections
    Detections {
        /// Window size (backend default applies when omitted)
        #[arg(long)]
        limit: Option<u32>,
        /// Output file (overwrites). JSONL unless --csv.
        #[arg(long, value_name = "FILE")]
        out: Option<PathBuf>,
        /// Write CSV instead of JSONL when --out is provided
        #[arg(long, default_value_t = false)]
        csv: bool,
    },
    /// List saved plate images, or delete one
    Images {
        /// Delete this image instead of listing
        #[arg(long, value_name = "FILENAME")]
        delete: Option<String>,
    },
    /// AI system statistics
    Stats,
    /// Poll status/detections/images continuously until Ctrl-C
    Watch {
        /// Poll period in seconds (min 1)
        #[arg(long)]
        interval_secs: Option<u64>,
        /// Detections window per round
        #[arg(long)]
        limit: Option<u32>,
    },
}

fn build_opts(
    base_url: Option<String>,
    token: Option<String>,
    cfg: &Option<config::Config>,
) -> ApiOptions {
    let api_cfg = cfg.as_ref().and_then(|c| c.api.clone()).unwrap_or_default();
    let mut opts = ApiOptions::default();
    if let Some(base) = base_url.or(api_cfg.base_url) {
        opts.base_url = base;
    }
    opts.token = token.or(api_cfg.token);
    if let Some(timeout) = api_cfg.timeout_ms {
        opts.timeout_ms = timeout;
    }
    if let Some(retry) = api_cfg.retry {
        opts.retry = retry;
    }
    opts
}

fn build_api(opts: ApiOptions) -> Result<Arc<dyn DetectionApi>> {
    let api = HttpApi::new(opts).map_err(|e| anyhow!(e.user_message()))?;
    Ok(Arc::new(api))
}

fn print_round(format: OutputFormat, snap: &PollSnapshot) {
    match format {
        OutputFormat::Text => {
            let status = match &snap.status {
                Some(s) => render::status_line(s),
                None => "status: unknown".to_string(),
            };
            println!("[{}] round {}  {}", now_rfc3339(), snap.rounds, status);
            println!("  detections ({}):", snap.detections.len());
            for d in &snap.detections {
                println!("    {}", render::detection_line(d));
            }
            println!("  plate images ({}):", snap.images.len());
            for i in &snap.images {
                println!("    {}", render::image_line(i));
            }
        }
        OutputFormat::Json | OutputFormat::Jsonl => {
            let obj = serde_json::json!({
                "at": now_rfc3339(),
                "round": snap.rounds,
                "status": snap.status,
                "detections": snap.detections,
                "images": snap.images,
            });
            println!("{}", serde_json::to_string(&obj).unwrap_or_default());
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();
    let format = cli.format;
    let loaded_cfg = config::load_config(cli.config.as_deref());
    let api_opts = build_opts(cli.base_url.clone(), cli.token.clone(), &loaded_cfg);

    match cli.command {
        Commands::Version => {
            println!(
                "platewatch {} (core {})",
                env!("CARGO_PKG_VERSION"),
                platewatch_core::version()
            );
        }
        Commands::Status => {
            let api = build_api(api_opts)?;
            let rt = tokio::runtime::Runtime::new()?;
            let status = rt
                .block_on(async move { api.livestream_status().await })
                .map_err(|e| anyhow!(e.user_message()))?;
            match format {
                OutputFormat::Text => println!("{}", render::status_line(&status)),
                OutputFormat::Json | OutputFormat::Jsonl => {
                    println!("{}", serde_json::to_string(&status)?)
                }
            }
        }
        Commands::Start { stream_url, output_url, no_face_blur, no_plate_blur, no_save_images } => {
            let api = build_api(api_opts)?;
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(async move {
                let commander = Commander::new(api.clone());
                if let Ok(status) = api.livestream_status().await {
                    commander.observe_status(&status).await;
                }
                if !commander.can_start().await {
                    println!("detection task already running; start skipped");
                    return anyhow::Ok(());
                }
                let req = StartRequest {
                    stream_url,
                    output_url: output_url.filter(|s| !s.is_empty()),
                    enable_face_blur: !no_face_blur,
                    enable_plate_blur: !no_plate_blur,
                    save_plate_images: !no_save_images,
                };
                let outcome = commander
                    .start(req)
                    .await
                    .map_err(|e| anyhow!(e.user_message()))?;
                match format {
                    OutputFormat::Text => {
                        if let Some(message) = &outcome.ack.message {
                            println!("{message}");
                        }
                        match &outcome.status {
                            Some(s) => println!("{}", render::status_line(s)),
                            None => println!("status refresh failed; the next poll will re-sync"),
                        }
                    }
                    OutputFormat::Json | OutputFormat::Jsonl => {
                        let obj = serde_json::json!({
                            "ack": outcome.ack,
                            "status": outcome.status,
                            "state": commander.state().await.label(),
                        });
                        println!("{}", serde_json::to_string(&obj)?);
                    }
                }
                Ok(())
            })?;
        }
        Commands::Stop => {
            let api = build_api(api_opts)?;
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(async move {
                let commander = Commander::new(api.clone());
                if let Ok(status) = api.livestream_status().await {
                    commander.observe_status(&status).await;
                }
                if !commander.can_stop().await {
                    println!("no detection task is running; stop skipped");
                    return anyhow::Ok(());
                }
                let outcome = commander
                    .stop()
                    .await
                    .map_err(|e| anyhow!(e.user_message()))?;
                match format {
                    OutputFormat::Text => {
                        if let Some(message) = &outcome.ack.message {
                            println!("{message}");
                        }
                        match &outcome.status {
                            Some(s) => println!("{}", render::status_line(s)),
                            None => println!("status refresh failed; the next poll will re-sync"),
                        }
                    }
                    OutputFormat::Json | OutputFormat::Jsonl => {
                        let obj = serde_json::json!({
                            "ack": outcome.ack,
                            "status": outcome.status,
                            "state": commander.state().await.label(),
                        });
                        println!("{}", serde_json::to_string(&obj)?);
                    }
                }
                Ok(())
            })?;
        }
        Commands::Search { plate } => {
            if let Some(normalized) = plate_search::normalize_plate(&plate) {
                if !plate_search::is_valid_plate(&normalized) {
                    eprintln!("warning: {normalized} does not look like an italian plate");
                }
            }
            let api = build_api(api_opts)?;
            let rt = tokio::runtime::Runtime::new()?;
            let outcome = rt
                .block_on(async move { plate_search::search(api.as_ref(), &plate).await })
                .map_err(|e| anyhow!(e.user_message()))?;
            match format {
                OutputFormat::Text => println!("{}", render::search_report(&outcome)),
                OutputFormat::Json | OutputFormat::Jsonl => {
                    let obj = match &outcome {
                        SearchOutcome::Found(result) => {
                            serde_json::json!({ "found": true, "result": result })
                        }
                        SearchOutcome::NothingFound { license_plate } => {
                            serde_json::json!({ "found": false, "license_plate": license_plate })
                        }
                    };
                    println!("{}", serde_json::to_string(&obj)?);
                }
            }
        }
        Commands::Process { plate } => {
            let normalized = plate_search::normalize_plate(&plate)
                .ok_or_else(|| anyhow!("enter a license plate to process"))?;
            let api = build_api(api_opts)?;
            let rt = tokio::runtime::Runtime::new()?;
            let report = rt
                .block_on(async move { api.process_plate(&normalized).await })
                .map_err(|e| anyhow!(e.user_message()))?;
            match format {
                OutputFormat::Text => println!("{}", render::process_report(&report)),
                OutputFormat::Json | OutputFormat::Jsonl => {
                    println!("{}", serde_json::to_string(&report)?)
                }
            }
        }
        Commands::Detections { limit, out, csv } => {
            let api = build_api(api_opts)?;
            let rt = tokio::runtime::Runtime::new()?;
            let list = rt
                .block_on(async move { api.recent_detections(limit).await })
                .map_err(|e| anyhow!(e.user_message()))?;
            if let Some(path) = out {
                if csv {
                    let mut wtr = csv::Writer::from_writer(File::create(&path)?);
                    wtr.write_record(["id", "license_plate", "confidence_score", "is_automatic", "created_at"])?;
                    for d in &list {
                        wtr.write_record([
                            d.id.to_string(),
                            d.license_plate.clone(),
                            format!("{:.3}", d.confidence_score),
                            d.is_automatic.to_string(),
                            d.created_at.clone(),
                        ])?;
                    }
                    wtr.flush()?;
                } else {
                    let mut w = BufWriter::new(File::create(&path)?);
                    for d in &list {
                        writeln!(w, "{}", serde_json::to_string(d)?)?;
                    }
                }
            } else {
                match format {
                    OutputFormat::Text => {
                        if list.is_empty() {
                            println!("no recent detections");
                        } else {
                            for d in &list {
                                println!("{}", render::detection_line(d));
                            }
                        }
                    }
                    OutputFormat::Json => println!("{}", serde_json::to_string(&list)?),
                    OutputFormat::Jsonl => {
                        for d in &list {
                            println!("{}", serde_json::to_string(d)?);
                        }
                    }
                }
            }
        }
        Commands::Images { delete } => {
            let api = build_api(api_opts)?;
            let rt = tokio::runtime::Runtime::new()?;
            match delete {
                Some(filename) => {
                    let ack = rt
                        .block_on(async move { api.delete_plate_image(&filename).await })
                        .map_err(|e| anyhow!(e.user_message()))?;
                    println!("{}", ack.message.unwrap_or(ack.status));
                }
                None => {
                    let list = rt
                        .block_on(async move { api.plate_images().await })
                        .map_err(|e| anyhow!(e.user_message()))?;
                    match format {
                        OutputFormat::Text => {
                            if list.is_empty() {
                                println!("no plate images saved");
                            } else {
                                for i in &list {
                                    println!("{}", render::image_line(i));
                                }
                            }
                        }
                        OutputFormat::Json => println!("{}", serde_json::to_string(&list)?),
                        OutputFormat::Jsonl => {
                            for i in &list {
                                println!("{}", serde_json::to_string(i)?);
                            }
                        }
                    }
                }
            }
        }
        Commands::Stats => {
            let api = build_api(api_opts)?;
            let rt = tokio::runtime::Runtime::new()?;
            let stats = rt
                .block_on(async move { api.ai_stats().await })
                .map_err(|e| anyhow!(e.user_message()))?;
            match format {
                OutputFormat::Text => println!("{}", render::stats_block(&stats)),
                OutputFormat::Json | OutputFormat::Jsonl => {
                    println!("{}", serde_json::to_string(&stats)?)
                }
            }
        }
        Commands::Watch { interval_secs, limit } => {
            let watch_cfg = loaded_cfg
                .as_ref()
                .and_then(|c| c.watch.clone())
                .unwrap_or_default();
            let secs = interval_secs
                .or(watch_cfg.interval_secs)
                .unwrap_or(DEFAULT_POLL_INTERVAL.as_secs())
                .max(1);
            let limit = limit.or(watch_cfg.detection_limit);
            let api = build_api(api_opts)?;
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(async move {
                let poller = Poller::spawn_with(api, Duration::from_secs(secs), limit);
                let mut ticker = tokio::time::interval(Duration::from_secs(secs));
                loop {
                    tokio::select! {
                        _ = tokio::signal::ctrl_c() => break,
                        _ = ticker.tick() => print_round(format, &poller.snapshot().await),
                    }
                }
                poller.shutdown().await;
                anyhow::Ok(())
            })?;
        }
    }
    Ok(())
}
