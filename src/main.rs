use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use log::{LevelFilter, error, info, warn};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;

use wheelchair_bridge_lib::config::{AppConfig, Backend};
use wheelchair_bridge_lib::core::bluetooth::{Axis, BlePlatform, BluestPlatform, SimulatedPlatform};
use wheelchair_bridge_lib::core::{AdapterSettings, WheelchairAdapter, WheelchairEvent};
use wheelchair_bridge_lib::logging::init_logging;

#[derive(Parser)]
#[command(name = "wheelchair-bridge")]
#[command(about = "Drive a wheelchair receiver over BLE")]
struct Cli {
    /// Config file; defaults to the per-user config directory
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Override the backend from the config file
    #[arg(short, long, value_enum)]
    backend: Option<Backend>,
    /// Default log level; RUST_LOG takes precedence
    #[arg(short, long, default_value = "info")]
    log_level: LevelFilter,
    /// Write the default config to the config path and exit
    #[arg(long)]
    init_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_level).context("failed to initialise logging")?;

    let path = cli.config.unwrap_or_else(AppConfig::default_path);
    if cli.init_config {
        AppConfig::default().save_config(&path).await?;
        println!("Wrote default config to {}", path.display());
        return Ok(());
    }

    let mut config = AppConfig::load_config(&path).await?;
    if let Some(backend) = cli.backend {
        config.backend = backend;
    }
    let settings = config.adapter_settings()?;

    match config.backend {
        Backend::Bluetooth => {
            let platform = BluestPlatform::new(&settings.identity.adapter_name).await?;
            run(Arc::new(platform), settings).await
        }
        Backend::Simulated => {
            let platform = SimulatedPlatform::for_identity(&settings.identity);
            run(Arc::new(platform), settings).await
        }
    }
}

async fn run<P: BlePlatform>(platform: Arc<P>, settings: AdapterSettings) -> Result<()> {
    let adapter = WheelchairAdapter::new(platform, settings);
    tokio::spawn(log_events(adapter.subscribe()));

    print_help();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let words: Vec<&str> = line.split_whitespace().collect();
        match words.as_slice() {
            [] => {}
            ["connect"] => adapter.connect(),
            ["disconnect"] => adapter.disconnect(),
            ["status"] => println!(
                "{} (drive {}, turn {})",
                adapter.state(),
                on_off(adapter.is_axis_enabled(Axis::Drive)),
                on_off(adapter.is_axis_enabled(Axis::Turn))
            ),
            ["drive"] => report_axis("drive", adapter.toggle_axis(Axis::Drive)),
            ["turn"] => report_axis("turn", adapter.toggle_axis(Axis::Turn)),
            ["drive", flag] | ["turn", flag] => match parse_flag(flag) {
                Some(enabled) => {
                    let axis = if words[0] == "drive" { Axis::Drive } else { Axis::Turn };
                    report_axis(words[0], adapter.set_axis_enabled(axis, enabled));
                }
                None => warn!("Expected on or off, got {:?}", flag),
            },
            ["quit"] | ["exit"] => break,
            ["help"] => print_help(),
            [drive, turn] => match (drive.parse::<i32>(), turn.parse::<i32>()) {
                (Ok(drive), Ok(turn)) => info!("{:?}", adapter.write_command(drive, turn)),
                _ => warn!("Unknown command: {}", line.trim()),
            },
            _ => warn!("Unknown command: {}", line.trim()),
        }
    }

    adapter.shutdown().await;
    Ok(())
}

async fn log_events(mut events: tokio::sync::broadcast::Receiver<WheelchairEvent>) {
    loop {
        match events.recv().await {
            Ok(WheelchairEvent::StatusChanged(state)) => info!("Status: {}", state),
            Ok(WheelchairEvent::CommandSent(command)) => {
                let bars = command.bar_levels();
                info!(
                    "Sent {:?} forward {:.0}% backward {:.0}% left {:.0}% right {:.0}%",
                    command.to_bytes(),
                    bars.forward,
                    bars.backward,
                    bars.left,
                    bars.right
                );
            }
            Ok(WheelchairEvent::AxisEnableChanged { axis, enabled }) => {
                info!("{:?} {}", axis, on_off(enabled))
            }
            Ok(WheelchairEvent::ConnectionFailed(reason)) => {
                error!("Connection failed: {}", reason)
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!("Event log fell behind, {} events skipped", skipped)
            }
            Err(RecvError::Closed) => break,
        }
    }
}

fn parse_flag(flag: &str) -> Option<bool> {
    match flag {
        "on" | "1" | "true" => Some(true),
        "off" | "0" | "false" => Some(false),
        _ => None,
    }
}

fn on_off(enabled: bool) -> &'static str {
    if enabled { "on" } else { "off" }
}

fn report_axis(name: &str, enabled: bool) {
    println!("{} {}", name, on_off(enabled));
}

fn print_help() {
    println!("Commands: connect | disconnect | status | drive [on|off] | turn [on|off]");
    println!("          <drive> <turn> | help | quit");
}
