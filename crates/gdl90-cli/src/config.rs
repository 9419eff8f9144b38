//! Command line and environment configuration

use anyhow::{Context, Result, bail};
use modem_bridge::serial::{DEFAULT_BAUD, DEFAULT_PORT};
use modem_bridge::{SessionConfig, UnknownMessagePolicy};

/// How decoded messages are reported
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Log,
    Json,
}

/// Configuration for the listener binary
#[derive(Debug, Clone)]
pub struct CliConfig {
    /// Serial device path
    pub port: String,
    /// Serial baud rate
    pub baud: u32,
    pub output: OutputFormat,
    pub unknown_messages: UnknownMessagePolicy,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT.to_string(),
            baud: DEFAULT_BAUD,
            output: OutputFormat::Log,
            unknown_messages: UnknownMessagePolicy::Drop,
        }
    }
}

impl CliConfig {
    /// Build from positional arguments and the process environment
    pub fn from_env(args: impl IntoIterator<Item = String>) -> Result<Self> {
        Self::from_sources(args, |key| std::env::var(key).ok())
    }

    /// Build from positional arguments and an environment lookup
    ///
    /// A positional device path takes precedence over `GDL90_PORT`.
    pub fn from_sources(
        args: impl IntoIterator<Item = String>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let mut config = Self::default();

        if let Some(port) = env("GDL90_PORT") {
            config.port = port;
        }
        if let Some(baud) = env("GDL90_BAUD") {
            config.baud = baud
                .parse()
                .with_context(|| format!("invalid GDL90_BAUD {:?}", baud))?;
        }
        if let Some(output) = env("GDL90_OUTPUT") {
            config.output = match output.to_ascii_lowercase().as_str() {
                "log" => OutputFormat::Log,
                "json" => OutputFormat::Json,
                other => bail!("invalid GDL90_OUTPUT {:?}, expected log or json", other),
            };
        }
        if let Some(unknown) = env("GDL90_UNKNOWN") {
            config.unknown_messages = match unknown.to_ascii_lowercase().as_str() {
                "drop" => UnknownMessagePolicy::Drop,
                "log" => UnknownMessagePolicy::Log,
                other => bail!("invalid GDL90_UNKNOWN {:?}, expected drop or log", other),
            };
        }

        let mut args = args.into_iter();
        if let Some(port) = args.next() {
            config.port = port;
        }
        if let Some(extra) = args.next() {
            bail!("unexpected argument {:?}", extra);
        }

        Ok(config)
    }

    /// Session configuration derived from this config
    pub fn session(&self) -> SessionConfig {
        let mut session = SessionConfig::default();
        session.extractor.unknown_messages = self.unknown_messages;
        session
    }
}
