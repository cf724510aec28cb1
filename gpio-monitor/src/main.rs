//! # mqtt-gpio-monitor
//!
//! Bridges Raspberry Pi header GPIO or a PiFace Digital board to an MQTT
//! broker. Input changes are published to `{topic}/out/{pin}`; messages on
//! `{topic}/in/{pin}` drive the pin as an output.
//!
//! ## Example
//!
//! ```bash
//! # Run against the hardware named in the config file
//! mqtt-gpio-monitor --config /etc/mqtt-gpio-monitor.toml
//!
//! # Try the broker side without any I/O board, logging to the terminal
//! mqtt-gpio-monitor --mock --stderr
//! ```
//!
//! The process exits with the number of the signal that stopped it, or 2
//! if startup failed.

use anyhow::{Context, Result};
use clap::Parser;
use gpio_bridge::{
    open_backend, BackendOptions, ControllerConfig, IoBackend, LifecycleController, MockBackend,
    MqttSession, SyncEngine, OFFLINE_PAYLOAD,
};
use gpio_core::{PinRegistry, TopicRouter, FATAL_EXIT_CODE};
use std::path::PathBuf;

mod config;
mod logging;
mod signals;

use config::{Config, DEFAULT_CONFIG_PATH};
use logging::{LogTarget, DEFAULT_LOG_PATH};
use signals::ShutdownSignals;

/// Bridge GPIO pins to an MQTT broker.
#[derive(Parser, Debug)]
#[command(name = "mqtt-gpio-monitor")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(long, short, env = "MQTT_GPIO_MONITOR_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Log file (appended to)
    #[arg(long, env = "MQTT_GPIO_MONITOR_LOG", default_value = DEFAULT_LOG_PATH)]
    log_file: PathBuf,

    /// Log to stderr instead of the log file
    #[arg(long)]
    stderr: bool,

    /// Use a mock I/O backend instead of real hardware (for testing/demo)
    #[arg(long)]
    mock: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let code = match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{:#}", e);
            eprintln!("mqtt-gpio-monitor: {:#}", e);
            FATAL_EXIT_CODE
        }
    };
    std::process::exit(code);
}

async fn run(cli: Cli) -> Result<i32> {
    let config = Config::from_file(&cli.config)?;
    config.validate()?;

    let target = if cli.stderr {
        LogTarget::Stderr
    } else {
        LogTarget::File(cli.log_file.clone())
    };
    logging::init(&target, config.global.debug)?;

    tracing::info!("Starting mqtt-gpio-monitor");
    if config.global.debug {
        tracing::info!("DEBUG MODE");
    } else {
        tracing::info!("INFO MODE");
    }
    tracing::debug!("Configuration file: {}", cli.config.display());
    tracing::debug!("Log target: {:?}", target);

    let signals = ShutdownSignals::install().context("cannot install signal handlers")?;

    let registry = PinRegistry::new(config.pins()?)?;
    let backend: Box<dyn IoBackend> = if cli.mock {
        tracing::info!("Using mock I/O backend");
        Box::new(MockBackend::new())
    } else {
        let options = BackendOptions {
            numbering: config.gpio.numbering,
        };
        match open_backend(config.global.module, &options) {
            Ok(backend) => backend,
            Err(e) => {
                tracing::error!("Cannot open {} module: {}", config.global.module, e);
                return Ok(FATAL_EXIT_CODE);
            }
        }
    };
    let engine = SyncEngine::new(backend, registry, config.polarity());

    let settings = config.mqtt_settings(OFFLINE_PAYLOAD);
    tracing::debug!("Broker settings: {:?}", settings);
    let (session, events) = MqttSession::new(&settings);

    let router = TopicRouter::new(&config.mqtt.topic, config.refresh_topic());
    let controller_config = ControllerConfig {
        presence_topic: config.mqtt.lwt.clone(),
        qos: config.qos()?,
        retain: config.mqtt.retain,
        poll_interval: config.poll_interval()?,
    };

    let controller = LifecycleController::new(engine, session, events, router, controller_config);
    Ok(controller.run(signals.recv()).await)
}
