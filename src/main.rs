//! USB switch bridge.
//!
//! Commissions the (simulated) USB switch, then exposes its channel and
//! on/off state over MQTT.
//!
//! Usage:
//!   cargo run -- --friendly-name desk-usb
//!   cargo run -- --press-every 30

use clap::Parser;
use log::{error, info};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::mpsc;
use usb_switch_converter::config::{Config, load_dotenv};
use usb_switch_converter::device::{CHANNEL_ENDPOINT_ID, Definition};
use usb_switch_converter::input::mqtt::MqttIntegration;
use usb_switch_converter::input::simulation::{SimulatedEndpoint, run_button_simulation};

#[derive(Parser)]
#[command(name = "usb-switch-bridge")]
#[command(about = "Bridge the KONQI USB switch to MQTT")]
struct Cli {
    /// Device friendly name used in MQTT topics
    #[arg(long, env = "DEVICE_FRIENDLY_NAME")]
    friendly_name: Option<String>,

    /// Press the simulated channel button every N seconds
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    press_every: Option<u64>,

    /// Skip binding and reporting configuration on startup
    #[arg(long)]
    skip_configure: bool,
}

fn init_logger() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();
}

#[tokio::main]
async fn main() {
    load_dotenv();
    init_logger();
    let cli = Cli::parse();

    info!("Starting USB switch bridge");

    let mut config = Config::from_env();
    if let Some(name) = cli.friendly_name {
        config.device.friendly_name = name;
    }
    info!("Configuration loaded:");
    info!("  Device: {}", config.device.friendly_name);
    info!(
        "  MQTT: {}:{} ({})",
        config.mqtt.broker_host, config.mqtt.broker_port, config.mqtt.base_topic
    );
    info!("  Coordinator: {}", config.coordinator.endpoint());

    let definition = Arc::new(Definition::usb_switch(config.device.identify_timeout_secs));
    let (report_tx, report_rx) = mpsc::channel(64);
    let endpoint =
        Arc::new(SimulatedEndpoint::new(CHANNEL_ENDPOINT_ID).with_report_channel(report_tx));

    if cli.skip_configure {
        info!("Skipping commissioning");
    } else if let Err(e) = definition
        .configure(endpoint.as_ref(), &config.coordinator.endpoint())
        .await
    {
        error!("Failed to commission {}: {}", config.device.friendly_name, e);
        std::process::exit(1);
    }

    let mqtt_task = MqttIntegration::new(
        config.mqtt.clone(),
        config.device.friendly_name.clone(),
        definition.clone(),
        endpoint.clone(),
        Arc::new(config.device.options()),
    )
    .with_reports(report_rx)
    .start();

    let press_task = cli
        .press_every
        .map(|secs| run_button_simulation(endpoint.clone(), Duration::from_secs(secs)));

    info!("USB switch bridge is running");
    info!("  - Press Ctrl+C to exit");

    match signal::ctrl_c().await {
        Ok(()) => {
            info!("Received shutdown signal");
        }
        Err(e) => {
            error!("Failed to listen for shutdown signal: {}", e);
        }
    }

    if let Some(task) = press_task {
        task.abort();
    }
    mqtt_task.abort();

    info!("USB switch bridge stopped");
}
