#![warn(missing_docs)]
//!
//! # mlgw-bridge
//!
//! A standards-compliant bridge to Bang & Olufsen MasterLink Gateways. It holds the
//! MLGW binary session and, when enabled, the ML trace session open, tracks every
//! configured product's state, and emits a line-delimited JSON event per telegram
//! on stdout.
//!
//! This program is free software: you can redistribute it and/or modify it under the terms of the
//! GNU General Public License as published by the Free Software Foundation, either version 3 of
//! the License, or (at your option) any later version.
//!
//! This program is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY;
//! without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See
//! the GNU General Public License for more details.
//!
//! You should have received a copy of the GNU General Public License along with this program. If
//! not, see <https://www.gnu.org/licenses/>.
//!

use anyhow::{Context, Result};
use clap::Parser;
use env_logger::Env;
use log::*;
use mlgw_core::gateway::{Event, GatewayConfig};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use validator::Validate;

mod config;

use config::Config;

/// Command line options
#[derive(Parser)]
#[command(author, version, about = "Bridge to a Bang & Olufsen MasterLink Gateway")]
struct Opt {
    #[command(subcommand)]
    cmd: Command,
}

/// Subcommands
#[derive(clap::Subcommand)]
enum Command {
    /// Connect to the gateway and stream events until interrupted
    Run {
        /// TOML configuration file describing the hub and its products
        #[arg(short, long)]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let Command::Run { config: conf_path } = Opt::parse().cmd;

    let config: Config = toml::from_str(
        &fs::read_to_string(&conf_path)
            .with_context(|| format!("Failed to read {:?}", conf_path))?,
    )
    .with_context(|| format!("Failed to parse the {:?} config file", conf_path))?;

    config
        .validate()
        .with_context(|| format!("Failed to validate the {:?} config file", conf_path))?;

    env_logger::Builder::from_env(Env::default().default_filter_or(config.log_level.clone())).init();

    info!("mlgw-bridge {}", env!("CARGO_PKG_VERSION"));

    let gateway_config = GatewayConfig {
        host: config.host.clone(),
        mlgw_port: config.port,
        trace_port: config.trace_port,
        username: config.username.clone(),
        password: config.password.clone(),
        use_mllog: config.use_mllog,
        max_reconnects: config.max_reconnects,
        reconnect_backoff: Duration::from_secs(config.reconnect_backoff_secs),
        products: config.products(),
    };

    let (gateway, mut events) = mlgw_core::gateway::start(gateway_config)
        .await
        .context("Failed to start the gateway")?;

    info!("Connected to {}", config.host);

    loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    Some(Event::MlTelegram(value)) | Some(Event::MlgwTelegram(value)) => {
                        match serde_json::to_string(&value) {
                            Ok(line) => println!("{line}"),
                            Err(e) => warn!("Failed to serialise event: {e}"),
                        }
                    }
                    None => {
                        warn!("Event channel closed, shutting down");
                        break;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received interrupt, shutting down");
                break;
            }
        }
    }

    gateway.stop();

    Ok(())
}
