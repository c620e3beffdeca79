//! TACMAP command-line front end.
//!
//! `run` drives the live pipeline and prints tracker signals (human text or
//! JSON lines for another process to consume); the other commands inspect
//! the map store and existing log files without going live.

use std::error::Error;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use tacmap_core::config::{self, AppConfig};
use tacmap_core::geometry;
use tacmap_core::map::store;
use tacmap_core::{
    MapRegistry, Pipeline, PositionTracker, TrackerEvent, TrackerSignal, reader,
};
use tacmap_types::formatting;

#[derive(Parser)]
#[command(name = "tacmap", about = "Tactical map position tracker", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Watch the screenshot directory and game log, print tracker signals.
    Run {
        /// Override the configured screenshot directory.
        #[arg(long)]
        screenshot_dir: Option<String>,
        /// Override the configured game log file.
        #[arg(long)]
        log_file: Option<String>,
        /// Scan the existing log before tailing to recover a running raid.
        #[arg(long)]
        scan: bool,
        /// Emit signals as JSON lines instead of human-readable text.
        #[arg(long)]
        json: bool,
    },
    /// Replay an existing log file and print the raid sessions found.
    Scan { file: PathBuf },
    /// List configured maps and their calibration status.
    Maps,
    /// Print transform diagnostics for one map's layers.
    Fit { map_id: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Run {
            screenshot_dir,
            log_file,
            scan,
            json,
        } => run(screenshot_dir, log_file, scan, json).await,
        Command::Scan { file } => scan_file(&file),
        Command::Maps => list_maps(),
        Command::Fit { map_id } => fit_map(&map_id),
    }
}

async fn run(
    screenshot_dir: Option<String>,
    log_file: Option<String>,
    scan: bool,
    json: bool,
) -> Result<(), Box<dyn Error>> {
    let mut config: AppConfig = config::load_config()?;
    if let Some(dir) = screenshot_dir {
        config.screenshot_directory = dir;
    }
    if let Some(file) = log_file {
        config.log_file = file;
    }
    if scan {
        config.scan_existing_log = true;
    }

    let maps_dir = store::default_maps_dir().ok_or("no config directory available")?;
    let pipeline = Pipeline::start(&config, maps_dir).await?;
    let mut signals = pipeline.subscribe();

    println!("Tracking. Press Ctrl-C to stop.");
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            signal = signals.recv() => match signal {
                Ok(signal) => print_signal(&signal, json),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "output fell behind, skipped signals");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    pipeline.shutdown().await;
    Ok(())
}

fn print_signal(signal: &TrackerSignal, json: bool) {
    if json {
        // One JSON object per line; downstream overlays parse this stream.
        match serde_json::to_string(signal) {
            Ok(line) => println!("{line}"),
            Err(err) => tracing::error!(%err, "failed to serialize signal"),
        }
        return;
    }

    match signal {
        TrackerSignal::RaidStarted { session_id, map_id } => match map_id {
            Some(map_id) => println!("raid #{session_id} started on {map_id}"),
            None => println!("raid #{session_id} started, map not yet known"),
        },
        TrackerSignal::MapResolved { session_id, map_id } => {
            println!("raid #{session_id}: map resolved to {map_id}");
        }
        TrackerSignal::PositionUpdated(update) => {
            println!(
                "{} {} on {} layer {} heading {}",
                formatting::format_world(
                    update.game_position.x,
                    update.game_position.y,
                    update.game_position.z
                ),
                formatting::format_pixel(update.map_pixel.0, update.map_pixel.1),
                update.map_id,
                update.layer_id,
                formatting::format_heading(update.yaw_rad),
            );
        }
        TrackerSignal::RaidEnded { session_id } => println!("raid #{session_id} ended"),
    }
}

/// Replay a log file through a fresh tracker and print what it saw.
fn scan_file(file: &PathBuf) -> Result<(), Box<dyn Error>> {
    let maps_dir = store::default_maps_dir().ok_or("no config directory available")?;
    let mut registry = MapRegistry::default();
    for map in store::load_maps(&maps_dir)? {
        registry.insert_map(map);
    }

    let (events, end) = reader::scan_log_file(file)?;
    println!("{} relevant lines in {} bytes", events.len(), end);

    let mut tracker = PositionTracker::new();
    let mut raids = 0usize;
    for event in events {
        for signal in tracker.handle_event(TrackerEvent::Log(event), &mut registry) {
            if matches!(signal, TrackerSignal::RaidStarted { .. }) {
                raids += 1;
            }
            print_signal(&signal, false);
        }
    }

    match tracker.session() {
        Some(session) => {
            println!(
                "log ends mid-raid: #{} on {} (server {})",
                session.session_id,
                session.map_id.as_deref().unwrap_or("<unknown>"),
                session.server_address.as_deref().unwrap_or("<unknown>"),
            );
        }
        None => println!("log ends idle"),
    }
    println!("{raids} raid(s) found");
    Ok(())
}

fn list_maps() -> Result<(), Box<dyn Error>> {
    let maps_dir = store::default_maps_dir().ok_or("no config directory available")?;
    let maps = store::load_maps(&maps_dir)?;
    if maps.is_empty() {
        println!("No maps configured in {}", maps_dir.display());
        return Ok(());
    }

    for map in &maps {
        println!("{} ({})", map.display_name, map.map_id);
        for layer in &map.layers {
            let bounds = layer
                .effective_bounds()
                .map(|(min, max)| format!("{min:.1}..{max:.1}"))
                .unwrap_or_else(|| "unbounded".to_string());
            let status = if layer.is_calibrated() {
                "calibrated"
            } else {
                "needs calibration"
            };
            println!(
                "  layer {:>3} {:<12} height {:<14} {} point(s), {}",
                layer.id,
                layer.display_name,
                bounds,
                layer.calibration_points.len(),
                status,
            );
        }
    }
    Ok(())
}

fn fit_map(map_id: &str) -> Result<(), Box<dyn Error>> {
    let maps_dir = store::default_maps_dir().ok_or("no config directory available")?;
    let config: AppConfig = config::load_config()?;
    let maps = store::load_maps(&maps_dir)?;
    let map = maps
        .iter()
        .find(|m| m.map_id == map_id)
        .ok_or_else(|| format!("map `{map_id}` is not configured"))?;

    for layer in &map.layers {
        println!("layer {} ({})", layer.id, layer.display_name);
        let samples: Vec<_> = layer
            .calibration_points
            .iter()
            .map(|p| ((p.game_position.x, p.game_position.z), p.map_pixel))
            .collect();

        match geometry::fit_with_policy(&samples, config.fit) {
            Ok(outcome) => {
                let diag = outcome.transform.diagnostics();
                println!(
                    "  scale {:.3} x {:.3}, rotation {:.1}°, translation {}",
                    diag.scale_x,
                    diag.scale_z,
                    diag.rotation_rad.to_degrees(),
                    formatting::format_pixel(diag.translation.0, diag.translation.1),
                );
                let rows = layer.calibration_points.iter().zip(&outcome.residuals);
                for (idx, (point, residual)) in rows.enumerate() {
                    let flag = if outcome.excluded.contains(&idx) {
                        " (excluded as outlier)"
                    } else {
                        ""
                    };
                    println!(
                        "  point {:>3}: {} -> {}  residual {:.2}px{}",
                        point.id,
                        formatting::format_world(
                            point.game_position.x,
                            point.game_position.y,
                            point.game_position.z
                        ),
                        formatting::format_pixel(point.map_pixel.0, point.map_pixel.1),
                        residual,
                        flag,
                    );
                }
            }
            Err(err) => println!("  not fittable: {err}"),
        }
    }
    Ok(())
}
