use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use tokio::signal::unix::{SignalKind, signal};
use tracing_subscriber::EnvFilter;
use uinject::client::SOCKET_ENV;
use uinject::{DaemonConfig, DaemonServer, VirtualInputDevice};

#[derive(Parser, Debug)]
#[command(author, version, about = "Relay input events from unprivileged clients to uinput", long_about = None)]
struct Args {
    /// JSON config file; flags override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Socket path for clients
    #[arg(short, long, env = SOCKET_ENV)]
    socket: Option<PathBuf>,

    /// Socket permissions, in octal
    #[arg(short, long, value_parser = parse_mode)]
    mode: Option<u32>,

    /// Concurrent client connections; extra ones are closed on accept
    #[arg(long)]
    max_connections: Option<usize>,

    /// Name the virtual device registers with
    #[arg(long)]
    device_name: Option<String>,

    /// Pause after every event written to the device, in microseconds
    #[arg(long)]
    pacing_us: Option<u64>,

    /// Wait after creating the device, in milliseconds
    #[arg(long)]
    settle_ms: Option<u64>,
}

fn parse_mode(value: &str) -> Result<u32, String> {
    let digits = value.trim_start_matches("0o");
    let mode = u32::from_str_radix(digits, 8).map_err(|e| format!("not an octal mode: {}", e))?;
    if mode > 0o777 {
        return Err(format!("{:o} is not a permission mask", mode));
    }
    Ok(mode)
}

impl Args {
    /// Defaults, then the config file, then the environment and flags
    fn into_config(self) -> anyhow::Result<DaemonConfig> {
        let mut config = match &self.config {
            Some(path) => DaemonConfig::load(path)?,
            None => DaemonConfig::default(),
        };

        if let Some(socket) = self.socket {
            config.socket_path = socket;
        }
        if let Some(mode) = self.mode {
            config.socket_mode = mode;
        }
        if let Some(max_connections) = self.max_connections {
            config.max_connections = max_connections;
        }
        if let Some(name) = self.device_name {
            config.device.name = name;
        }
        if let Some(pacing_us) = self.pacing_us {
            config.device.pacing_us = pacing_us;
        }
        if let Some(settle_ms) = self.settle_ms {
            config.device.settle_ms = settle_ms;
        }

        config.validate()?;
        Ok(config)
    }
}

async fn shutdown_signal() {
    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(terminate) => terminate,
        Err(e) => {
            tracing::warn!("Cannot listen for SIGTERM: {}", e);
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => tracing::info!("Received SIGINT"),
        _ = terminate.recv() => tracing::info!("Received SIGTERM"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Args::parse().into_config()?;

    tracing::info!("Starting uinject daemon");
    tracing::info!("Socket path: {}", config.socket_path.display());

    // Create the device up front so permission problems surface at startup
    let mut device = VirtualInputDevice::new(config.device.clone());
    let device = tokio::task::spawn_blocking(move || device.init().map(|()| device))
        .await
        .context("Device setup panicked")??;

    let server = DaemonServer::bind(config, device)?;
    server.run_until(shutdown_signal()).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modes_are_octal() {
        assert_eq!(parse_mode("666"), Ok(0o666));
        assert_eq!(parse_mode("0o600"), Ok(0o600));
        assert_eq!(parse_mode("0660"), Ok(0o660));
        assert!(parse_mode("888").is_err());
        assert!(parse_mode("7777").is_err());
    }

    #[test]
    fn flags_override_defaults() {
        let args = Args::try_parse_from([
            "uinject-daemon",
            "--socket",
            "/run/uinject.sock",
            "--mode",
            "660",
            "--max-connections",
            "8",
            "--settle-ms",
            "0",
        ])
        .unwrap();

        let config = args.into_config().unwrap();

        assert_eq!(config.socket_path, PathBuf::from("/run/uinject.sock"));
        assert_eq!(config.socket_mode, 0o660);
        assert_eq!(config.max_connections, 8);
        assert_eq!(config.device.settle_ms, 0);
        assert_eq!(config.device.pacing_us, 50);
    }

    #[test]
    fn zero_connections_is_rejected() {
        let args =
            Args::try_parse_from(["uinject-daemon", "--max-connections", "0"]).unwrap();
        assert!(args.into_config().is_err());
    }
}
