use std::path::PathBuf;

use clap::{Args, Subcommand};
use malstack_transport::TransportConfig;

use crate::exit::{transport_error, CliResult};
use crate::output::OutputFormat;

pub mod decode;
pub mod listen;
pub mod send;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Send messages to an endpoint behind a Unix socket.
    Send(SendArgs),
    /// Host an endpoint on a Unix socket and print received messages.
    Listen(ListenArgs),
    /// Decode a hex-encoded message and print its header.
    Decode(DecodeArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Send(args) => send::run(args, format),
        Command::Listen(args) => listen::run(args, format),
        Command::Decode(args) => decode::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

/// Transport settings shared by every command that encodes or decodes.
#[derive(Args, Debug, Default)]
pub struct TransportArgs {
    /// JSON transport configuration file.
    #[arg(long, value_name = "FILE", env = "MALSTACK_CONFIG")]
    pub config: Option<PathBuf>,
    /// Wire encoding (binary, fixed, spp). Overrides the config file.
    #[arg(long, value_name = "NAME")]
    pub encoding: Option<String>,
    /// Body parts are individually encoded and wrapped in Blobs.
    #[arg(long)]
    pub wrap_body_parts: bool,
}

impl TransportArgs {
    pub fn resolve(&self) -> CliResult<TransportConfig> {
        let mut config = match &self.config {
            Some(path) => TransportConfig::from_json_file(path)
                .map_err(|err| transport_error("config load failed", err))?,
            None => TransportConfig::default(),
        };
        if let Some(encoding) = &self.encoding {
            config.encoding = encoding.clone();
        }
        if self.wrap_body_parts {
            config.wrap_body_parts = true;
        }
        Ok(config)
    }
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Socket path to connect to.
    pub path: PathBuf,
    /// Destination endpoint URI.
    #[arg(long)]
    pub to: String,
    /// Name of the local sending endpoint.
    #[arg(long, default_value = "cli")]
    pub from: String,
    /// String body part; repeat for several parts.
    #[arg(long)]
    pub text: Vec<String>,
    /// Number of messages to send.
    #[arg(long, default_value = "1")]
    pub count: u32,
    /// Transaction id of the first message; later ones count up.
    #[arg(long, default_value = "0")]
    pub transaction_id: i64,
    /// Send all messages as one batch.
    #[arg(long)]
    pub batch: bool,
    /// How long to wait for each delivery (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
    #[command(flatten)]
    pub transport: TransportArgs,
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    /// Socket path to bind.
    pub path: PathBuf,
    /// Name of the receiving endpoint.
    #[arg(long, default_value = "app")]
    pub endpoint: String,
    /// Exit after receiving N messages.
    #[arg(long)]
    pub count: Option<usize>,
    #[command(flatten)]
    pub transport: TransportArgs,
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// Hex dump of an encoded message. Whitespace is ignored.
    pub hex: String,
    /// The input starts with a socket frame header.
    #[arg(long)]
    pub framed: bool,
    #[command(flatten)]
    pub transport: TransportArgs,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_defaults() {
        let args = TransportArgs {
            config: None,
            encoding: Some("fixed".into()),
            wrap_body_parts: true,
        };
        let config = args.resolve().unwrap();
        assert_eq!(config.encoding, "fixed");
        assert!(config.wrap_body_parts);
    }

    #[test]
    fn missing_config_file_is_an_error() {
        let args = TransportArgs {
            config: Some(PathBuf::from("/nonexistent/malstack.json")),
            ..TransportArgs::default()
        };
        assert!(args.resolve().is_err());
    }
}
