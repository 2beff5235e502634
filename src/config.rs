//! Configuration surface (C10): loads and validates the TOML document that
//! describes a hub and its products.
//!
//! Built on the same `toml::from_str` + `Validate::validate` pattern used
//! elsewhere in this workspace. Field names mirror `const.py`'s `CONF_*`
//! keys from the reference integration: host, port, username/password
//! defaulting to `admin`/`admin`, and the `use_mllog` flag gating the ML
//! trace session.

use mlgw_core::model::{Channel, SelectCmd, SelectSeqToken, Source};
use serde::Deserialize;
use validator::Validate;

fn default_port() -> u16 {
    9000
}

fn default_trace_port() -> u16 {
    23
}

fn default_username() -> String {
    "admin".to_string()
}

fn default_password() -> String {
    "admin".to_string()
}

fn default_true() -> bool {
    true
}

fn default_max_reconnects() -> u32 {
    10
}

fn default_reconnect_backoff_secs() -> u64 {
    60
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Top-level configuration document
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct Config {
    /// Hub hostname or IP address
    #[validate(length(min = 1, message = "host must not be empty"))]
    pub host: String,
    /// MLGW binary protocol port
    #[serde(default = "default_port")]
    pub port: u16,
    /// ML trace telnet port
    #[serde(default = "default_trace_port")]
    pub trace_port: u16,
    /// Login username
    #[serde(default = "default_username")]
    pub username: String,
    /// Login password
    #[serde(default = "default_password")]
    pub password: String,
    /// Whether to attempt the administrative ML trace session
    #[serde(default = "default_true")]
    pub use_mllog: bool,
    /// Reconnect attempt cap, before either session is marked broken (§9 Open Question 3)
    #[serde(default = "default_max_reconnects")]
    pub max_reconnects: u32,
    /// Seconds between reconnect attempts
    #[serde(default = "default_reconnect_backoff_secs")]
    pub reconnect_backoff_secs: u64,
    /// Log level passed to `env_logger`
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Rooms/zones, each grouping one or more products
    #[validate(length(min = 1, message = "at least one zone must be configured"), nested)]
    pub zones: Vec<ZoneConfig>,
}

/// One room/zone grouping of products
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ZoneConfig {
    /// Zone/room number
    pub number: u8,
    /// Zone/room name
    #[validate(length(min = 1, message = "zone name must not be empty"))]
    pub name: String,
    /// Products in this zone
    #[validate(nested)]
    pub products: Vec<ProductConfig>,
}

/// One product/device as described by the hub's configuration document
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ProductConfig {
    /// MasterLink Node (1-indexed)
    pub mln: u8,
    /// Display name
    #[validate(length(min = 1, message = "product name must not be empty"))]
    pub name: String,
    /// Serial number, present only for network-link devices
    #[serde(default)]
    pub serial: Option<String>,
    /// Sources configured for this product
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

/// One selectable source, as it appears in the configuration document
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    /// Status byte the hub reports in source-status frames
    pub status_id: u8,
    /// Beo4 key byte used to select this source
    pub select_id: u8,
    /// Human-readable name, e.g. `"RADIO"`
    pub name: String,
    /// Destination selector this source is requested on
    pub destination: u8,
    /// `"F0"` for Beo4 sources, `"F20"` for BeoRemote One sources
    pub format: String,
    /// Secondary routing byte used with Beo4 sends
    #[serde(default)]
    pub secondary: u8,
    /// Network link byte used with BeoRemote One sends
    #[serde(default)]
    pub link: u8,
    /// Commands usable to select this source
    #[serde(default)]
    pub select_cmds: Vec<SelectCmdConfig>,
    /// Whether this source reports over the BeoRemote One network bit
    #[serde(default)]
    pub network_bit: Option<bool>,
    /// Favourites/channels configured under this source
    #[serde(default)]
    pub channels: Vec<ChannelConfig>,
}

/// A command usable to select a [`SourceConfig`]
#[derive(Debug, Clone, Deserialize)]
pub struct SelectCmdConfig {
    /// Beo4 or BeoRemote One command byte
    pub cmd: u8,
    /// `"F0"` or `"F20"`
    pub format: String,
    /// BeoRemote One unit byte, only meaningful for `"F20"`
    #[serde(default)]
    pub unit: Option<u8>,
}

/// A favourite/preset channel inside a [`SourceConfig`]
#[derive(Debug, Clone, Deserialize)]
pub struct ChannelConfig {
    /// Favourite display name
    pub name: String,
    /// Icon identifier/URL
    pub icon: String,
    /// The Beo4 replay sequence used to recover the channel number
    pub select_seq: Vec<SelectSeqTokenConfig>,
}

/// One token in a [`ChannelConfig`]'s replay sequence
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectSeqTokenConfig {
    /// A decimal digit 0-9
    Digit(u8),
    /// A pause with no semantic content
    Delay,
    /// The final select/confirm keypress
    Select,
}

impl Config {
    /// Flatten `zones` into the engine's `Product` list, in configuration order
    pub fn products(&self) -> Vec<mlgw_core::model::Product> {
        self.zones
            .iter()
            .flat_map(|zone| {
                zone.products.iter().map(move |product| mlgw_core::model::Product {
                    mln: product.mln,
                    ml_address: None,
                    name: product.name.clone(),
                    zone_number: zone.number,
                    zone_name: zone.name.clone(),
                    sources: product.sources.iter().map(Source::from).collect(),
                    serial: product.serial.clone(),
                })
            })
            .collect()
    }
}

impl From<&SourceConfig> for Source {
    fn from(c: &SourceConfig) -> Self {
        Source {
            status_id: c.status_id,
            select_id: c.select_id,
            name: c.name.clone(),
            destination: c.destination,
            format: c.format.clone(),
            secondary: c.secondary,
            link: c.link,
            select_cmds: c.select_cmds.iter().map(SelectCmd::from).collect(),
            network_bit: c.network_bit,
            channels: c.channels.iter().map(Channel::from).collect(),
        }
    }
}

impl From<&SelectCmdConfig> for SelectCmd {
    fn from(c: &SelectCmdConfig) -> Self {
        SelectCmd {
            cmd: c.cmd,
            format: c.format.clone(),
            unit: c.unit,
        }
    }
}

impl From<&ChannelConfig> for Channel {
    fn from(c: &ChannelConfig) -> Self {
        Channel {
            name: c.name.clone(),
            icon: c.icon.clone(),
            select_seq: c.select_seq.iter().map(SelectSeqToken::from).collect(),
        }
    }
}

impl From<&SelectSeqTokenConfig> for SelectSeqToken {
    fn from(c: &SelectSeqTokenConfig) -> Self {
        match c {
            SelectSeqTokenConfig::Digit(d) => SelectSeqToken::Digit(*d),
            SelectSeqTokenConfig::Delay => SelectSeqToken::Delay,
            SelectSeqTokenConfig::Select => SelectSeqToken::Select,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        host = "192.168.1.50"

        [[zones]]
        number = 1
        name = "Living Room"

        [[zones.products]]
        mln = 1
        name = "Main Speaker"
    "#;

    #[test]
    fn loads_minimal_document_with_defaults() {
        let config: Config = toml::from_str(MINIMAL).unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.trace_port, 23);
        assert_eq!(config.username, "admin");
        assert_eq!(config.password, "admin");
        assert!(config.use_mllog);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_empty_host() {
        let mut config: Config = toml::from_str(MINIMAL).unwrap();
        config.host.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_document_with_no_zones() {
        let mut config: Config = toml::from_str(MINIMAL).unwrap();
        config.zones.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn flattens_zones_into_products() {
        let config: Config = toml::from_str(MINIMAL).unwrap();
        let products = config.products();
        assert_eq!(products.len(), 1);
        assert_eq!(products[0].mln, 1);
        assert_eq!(products[0].zone_name, "Living Room");
        assert_eq!(products[0].ml_address, None);
    }
}
