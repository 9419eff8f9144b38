//! gdl90-listen: GDL90 listener over an ESP8266 serial Wi-Fi modem
//!
//! Brings up a UDP socket on the modem, then logs the GDL90 traffic it
//! relays until the serial link drops or Ctrl-C is pressed.
//!
//! Usage: `gdl90-listen [SERIAL_DEVICE]`
//!
//! Environment:
//! - `GDL90_PORT`: serial device (default `/dev/ttyUSB0`)
//! - `GDL90_BAUD`: baud rate (default 115200)
//! - `GDL90_OUTPUT`: `log` (default) or `json` messages on stdout
//! - `GDL90_UNKNOWN`: `drop` (default) or `log` unrecognized messages
//! - `RUST_LOG`: log filter (default `info`)

mod config;

use anyhow::{Context, Result};
use config::{CliConfig, OutputFormat};
use modem_bridge::{EventSink, JsonSink, Session, TracingSink, serial};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = CliConfig::from_env(std::env::args().skip(1))?;
    info!("Starting gdl90-listen on {} at {} baud", config.port, config.baud);

    let (reader, writer) = serial::open(&config.port, config.baud)
        .with_context(|| format!("opening serial device {}", config.port))?;

    let sink: Arc<dyn EventSink> = match config.output {
        OutputFormat::Log => Arc::new(TracingSink),
        OutputFormat::Json => Arc::new(JsonSink::stdout()),
    };

    let session = Session::new(reader, writer, config.session(), sink);
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    session
        .run_until(shutdown)
        .await
        .context("modem session ended")?;

    info!("gdl90-listen stopped");
    Ok(())
}
