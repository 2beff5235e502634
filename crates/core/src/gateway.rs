//! Gateway facade (C7): owns the two sessions and the tracked state, runs
//! MLN↔ML-address discovery, and exposes the command API.

use std::sync::Arc;
use std::time::Duration;

use log::*;
use tokio::sync::{mpsc, Mutex};
use tokio::time::Instant;

use crate::codec::mlgw as codec;
use crate::codec::tables;
use crate::error::{Error, Result};
use crate::events;
pub use crate::events::Event;
use crate::model::{GatewayState, MlPayload, MlgwPayload, Product};
use crate::session::mlgw::{self, MlgwHandle};
use crate::session::trace::{self, TraceHandle, TraceSession};

const READY_TIMEOUT: Duration = Duration::from_secs(20);
const ML_ID_TIMEOUT: Duration = Duration::from_secs(10);

/// Everything needed to start one gateway instance
pub struct GatewayConfig {
    /// Hub hostname or IP
    pub host: String,
    /// MLGW binary protocol port, normally 9000
    pub mlgw_port: u16,
    /// ML trace telnet port, normally 23
    pub trace_port: u16,
    /// Login username
    pub username: String,
    /// Login password
    pub password: String,
    /// Whether to attempt the ML trace session at all
    pub use_mllog: bool,
    /// Reconnect attempt cap, before either session is marked broken
    pub max_reconnects: u32,
    /// Delay between reconnect attempts
    pub reconnect_backoff: Duration,
    /// The hub's product configuration, one entry per MLN
    pub products: Vec<Product>,
}

/// A running gateway: holds the handles needed to drive it and to stop it
pub struct Gateway {
    mlgw: MlgwHandle,
    trace: Option<TraceHandle>,
    state: Arc<Mutex<GatewayState>>,
}

/// Start the gateway: bring both sessions up, run discovery, and begin
/// dispatching inbound traffic. Returns the facade plus the event stream.
pub async fn start(config: GatewayConfig) -> Result<(Gateway, mpsc::Receiver<Event>)> {
    let (events_tx, events_rx) = mpsc::channel(256);
    let state = Arc::new(Mutex::new(GatewayState::new(config.products)));

    let (mlgw_session, mlgw_handle, mlgw_inbound) = mlgw::new(
        config.host.clone(),
        config.mlgw_port,
        config.username.clone(),
        config.password.clone(),
        config.max_reconnects,
        config.reconnect_backoff,
    );
    tokio::spawn(async move {
        if let Err(e) = mlgw_session.run().await {
            error!("mlgw session ended: {e}");
        }
    });

    let trace_parts = if config.use_mllog && TraceSession::is_eligible(&config.username) {
        let (trace_session, trace_handle, trace_inbound) = trace::new(
            config.host.clone(),
            config.trace_port,
            config.username.clone(),
            config.password.clone(),
            config.max_reconnects,
            config.reconnect_backoff,
        );
        tokio::spawn(async move {
            if let Err(e) = trace_session.run().await {
                error!("ml trace session ended: {e}");
            }
        });
        Some((trace_handle, trace_inbound))
    } else {
        None
    };

    tokio::spawn(dispatch_mlgw(state.clone(), mlgw_inbound, events_tx.clone()));

    let deadline = Instant::now() + READY_TIMEOUT;
    mlgw_handle
        .wait_ready(deadline.saturating_duration_since(Instant::now()))
        .await?;
    let trace_handle = match trace_parts {
        Some((handle, inbound)) => {
            handle
                .wait_ready(deadline.saturating_duration_since(Instant::now()))
                .await?;
            let inbound = run_discovery(&state, &mlgw_handle, inbound).await;
            tokio::spawn(dispatch_trace(state.clone(), inbound, events_tx));
            Some(handle)
        }
        None => None,
    };

    {
        let mut guard = state.lock().await;
        guard.connected_mlgw = true;
        guard.connected_ml = trace_handle.is_some();
    }

    let gateway = Gateway {
        mlgw: mlgw_handle,
        trace: trace_handle,
        state,
    };
    Ok((gateway, events_rx))
}

/// Discovery (§4.7): probe every non-network-link product in `mln` order,
/// consuming the trace stream directly (ahead of the general dispatcher) to
/// bind the first matching `MLGW_REMOTE_BEO4 Light Timeout` reply to the
/// product that was just probed. Returns the receiver so the caller can hand
/// it to the ongoing dispatch loop afterward.
async fn run_discovery(
    state: &Arc<Mutex<GatewayState>>,
    mlgw: &MlgwHandle,
    mut inbound: mpsc::Receiver<trace::TraceRecord>,
) -> mpsc::Receiver<trace::TraceRecord> {
    let mlns: Vec<u8> = {
        let guard = state.lock().await;
        let mut mlns: Vec<u8> = guard
            .products
            .values()
            .filter(|(p, _)| !p.is_network_link())
            .map(|(p, _)| p.mln)
            .collect();
        mlns.sort_unstable();
        mlns
    };
    if mlns.is_empty() {
        return inbound;
    }

    let dest = tables::ml_dest_selector_code("Audio Source").unwrap_or(0x01);
    let light_timeout = tables::beo4_command_code("Light Timeout").unwrap_or(0x58);
    let deadline = Instant::now() + ML_ID_TIMEOUT;

    let mut probed = 0usize;
    for &mln in &mlns {
        if Instant::now() >= deadline {
            break;
        }
        if mlgw.send_raw(codec::encode_beo4(mln, dest, light_timeout, 0x00, 0x00)).await.is_err() {
            break;
        }
        probed += 1;
    }

    let mut matched = 0usize;
    while matched < probed && Instant::now() < deadline {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let record = match tokio::time::timeout(remaining, inbound.recv()).await {
            Ok(Some(record)) => record,
            _ => break,
        };
        let telegram = &record.telegram;
        if telegram.from_device == "MLGW" && telegram.payload_type == "MLGW_REMOTE_BEO4" {
            if let MlPayload::MlgwRemoteBeo4 { command, .. } = &telegram.payload {
                if command == "Light Timeout" {
                    let mln = mlns[matched];
                    let mut guard = state.lock().await;
                    if let Some((product, _)) = guard.products.get_mut(&mln) {
                        product.ml_address = Some(telegram.to_device.clone());
                        info!("discovery: bound mln {mln} to ml address {}", telegram.to_device);
                    }
                    matched += 1;
                    continue;
                }
            }
        }
        // Not a discovery reply; still route it through the normal pipeline
        // so nothing observed during discovery is silently dropped.
        let mut guard = state.lock().await;
        guard.handle_ml(telegram);
    }

    inbound
}

async fn dispatch_mlgw(
    state: Arc<Mutex<GatewayState>>,
    mut inbound: mpsc::Receiver<crate::model::MlgwTelegram>,
    events_tx: mpsc::Sender<Event>,
) {
    while let Some(telegram) = inbound.recv().await {
        if matches!(telegram.payload, MlgwPayload::ConfigChanged) {
            warn!("mlgw: hub configuration changed, host should reload product config");
        }
        {
            let mut guard = state.lock().await;
            guard.handle_mlgw(&telegram);
        }
        let event = events::mlgw_event(&telegram);
        if events_tx.send(Event::MlgwTelegram(event)).await.is_err() {
            return;
        }
    }
}

async fn dispatch_trace(
    state: Arc<Mutex<GatewayState>>,
    mut inbound: mpsc::Receiver<trace::TraceRecord>,
    events_tx: mpsc::Sender<Event>,
) {
    while let Some(record) = inbound.recv().await {
        let event = {
            let mut guard = state.lock().await;
            guard.handle_ml(&record.telegram);
            events::ml_event(&guard, &record.telegram, record.timestamp, record.bytes_hex)
        };
        if events_tx.send(Event::MlTelegram(event)).await.is_err() {
            return;
        }
    }
}

impl Gateway {
    /// Request cooperative shutdown of both sessions
    pub fn stop(&self) {
        self.mlgw.stop();
        if let Some(trace) = &self.trace {
            trace.stop();
        }
    }

    /// Snapshot of the tracked state, for callers that need to read it directly
    pub async fn state(&self) -> GatewayState {
        self.state.lock().await.clone()
    }

    /// `turn_on(mln)`: reselect `beolink_source` if known to this product, else the
    /// product's last source, else its first configured source (§4.7).
    pub async fn turn_on(&self, mln: u8) -> Result<()> {
        let (beolink_source, remembered, first) = {
            let guard = self.state.lock().await;
            let (product, entity) = guard.products.get(&mln).ok_or(Error::Config(format!("unknown mln {mln}")))?;
            let beolink_source = guard.beolink_source.clone().filter(|s| {
                product.sources.iter().any(|src| &src.name == s)
            });
            (beolink_source, entity.current_source.clone(), product.sources.first().map(|s| s.name.clone()))
        };
        let source = beolink_source.or(remembered).or(first);
        match source {
            Some(name) => self.select_source(mln, &name).await,
            None => Ok(()),
        }
    }

    /// `turn_off(mln)`: send a Beo4 `Standby` to the product's audio destination
    pub async fn turn_off(&self, mln: u8) -> Result<()> {
        let dest = self.audio_destination(mln).await?;
        let cmd = tables::beo4_command_code("Standby").ok_or_else(|| Error::Config("missing Standby code".into()))?;
        self.send_beo4_cmd(mln, dest, cmd, 0x00, 0x00).await
    }

    /// `select_source(mln, name)`: dispatches on the source's wire format (§4.7)
    pub async fn select_source(&self, mln: u8, source_name: &str) -> Result<()> {
        let source = {
            let guard = self.state.lock().await;
            let (product, _) = guard.products.get(&mln).ok_or(Error::Config(format!("unknown mln {mln}")))?;
            product
                .sources
                .iter()
                .find(|s| s.name == source_name)
                .cloned()
                .ok_or_else(|| Error::Config(format!("no source {source_name:?} on mln {mln}")))?
        };

        match source.format.as_str() {
            "F0" => {
                let cmd = source
                    .select_cmds
                    .first()
                    .ok_or_else(|| Error::Config(format!("source {source_name:?} has no select_cmds")))?;
                self.send_beo4_cmd(mln, source.destination, cmd.cmd, source.secondary, source.link)
                    .await?;
                let mut guard = self.state.lock().await;
                guard.beolink_source = Some(source.name.clone());
                Ok(())
            }
            "F20" => {
                let cmd = source
                    .select_cmds
                    .first()
                    .ok_or_else(|| Error::Config(format!("source {source_name:?} has no select_cmds")))?;
                let unit = cmd.unit.unwrap_or(0);
                let network_bit = source.network_bit.unwrap_or(false);
                self.send_beoremoteone_select(mln, cmd.cmd, unit, network_bit).await
            }
            other => Err(Error::Config(format!("unknown source format {other:?}"))),
        }
    }

    /// `volume_up(mln)`
    pub async fn volume_up(&self, mln: u8) -> Result<()> {
        self.beo4_to_current_dest(mln, "Volume UP").await
    }

    /// `volume_down(mln)`
    pub async fn volume_down(&self, mln: u8) -> Result<()> {
        self.beo4_to_current_dest(mln, "Volume DOWN").await
    }

    /// `mute(mln)`
    pub async fn mute(&self, mln: u8) -> Result<()> {
        self.beo4_to_current_dest(mln, "Mute").await
    }

    /// `play(mln)`
    pub async fn play(&self, mln: u8) -> Result<()> {
        self.beo4_to_current_dest(mln, "Go / Play").await
    }

    /// `stop(mln)`
    pub async fn stop_playback(&self, mln: u8) -> Result<()> {
        self.beo4_to_current_dest(mln, "Stop").await
    }

    /// `pause(mln)`: the hub has no distinct pause key, so this sends `Stop` (§4.7, original source parity)
    pub async fn pause(&self, mln: u8) -> Result<()> {
        self.beo4_to_current_dest(mln, "Stop").await
    }

    /// `prev_track(mln)`
    pub async fn prev_track(&self, mln: u8) -> Result<()> {
        self.beo4_to_current_dest(mln, "STEP DOWN").await
    }

    /// `next_track(mln)`
    pub async fn next_track(&self, mln: u8) -> Result<()> {
        self.beo4_to_current_dest(mln, "STEP UP").await
    }

    /// `shuffle(mln)`
    pub async fn shuffle(&self, mln: u8) -> Result<()> {
        self.beo4_to_current_dest(mln, "Random").await
    }

    /// `repeat(mln)`
    pub async fn repeat(&self, mln: u8) -> Result<()> {
        self.beo4_to_current_dest(mln, "Repeat").await
    }

    /// `all_standby()`: broadcast the MLGW all-standby command
    pub async fn all_standby(&self) -> Result<()> {
        self.mlgw.send_raw(codec::encode_frame(0x05, &[])).await
    }

    /// `virtual_button(code, action)`
    pub async fn virtual_button(&self, button: u8, action: &str) -> Result<()> {
        let action_code = tables::mlgw_virtual_action_code(action).unwrap_or(0x01);
        self.mlgw.send_raw(codec::encode_virtual_button(button, action_code)).await
    }

    /// `send_beo4_cmd(mln, dest, cmd, sec, link)`
    pub async fn send_beo4_cmd(&self, mln: u8, dest: u8, cmd: u8, sec: u8, link: u8) -> Result<()> {
        self.mlgw.send_raw(codec::encode_beo4(mln, dest, cmd, sec, link)).await
    }

    /// `send_beoremoteone_cmd(mln, cmd, net_bit)`
    pub async fn send_beoremoteone_cmd(&self, mln: u8, cmd: u8, net_bit: bool) -> Result<()> {
        self.mlgw.send_raw(codec::encode_beoremoteone(mln, cmd, net_bit)).await
    }

    async fn send_beoremoteone_select(&self, mln: u8, cmd: u8, unit: u8, net_bit: bool) -> Result<()> {
        self.mlgw.send_raw(codec::encode_beoremoteone_select(mln, cmd, unit, net_bit)).await
    }

    async fn audio_destination(&self, mln: u8) -> Result<u8> {
        let guard = self.state.lock().await;
        let (product, entity) = guard.products.get(&mln).ok_or(Error::Config(format!("unknown mln {mln}")))?;
        let dest = entity
            .current_source
            .as_deref()
            .and_then(|name| product.sources.iter().find(|s| s.name == name))
            .map(|s| s.destination)
            .or_else(|| product.sources.first().map(|s| s.destination))
            .unwrap_or(0x01);
        Ok(dest)
    }

    async fn beo4_to_current_dest(&self, mln: u8, command_name: &str) -> Result<()> {
        let dest = self.audio_destination(mln).await?;
        let cmd = tables::beo4_command_code(command_name)
            .ok_or_else(|| Error::Config(format!("unknown beo4 command {command_name:?}")))?;
        self.send_beo4_cmd(mln, dest, cmd, 0x00, 0x00).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{SelectCmd, Source};

    fn radio_product() -> Product {
        Product {
            mln: 1,
            ml_address: Some("AUDIO_MASTER".to_string()),
            name: "Kitchen".to_string(),
            zone_number: 1,
            zone_name: "Kitchen".to_string(),
            sources: vec![Source {
                status_id: 0x6F,
                select_id: 0x81,
                name: "RADIO".to_string(),
                destination: 0x01,
                format: "F0".to_string(),
                secondary: 0,
                link: 0,
                select_cmds: vec![SelectCmd { cmd: 0x81, format: "F0".to_string(), unit: None }],
                network_bit: None,
                channels: vec![],
            }],
            serial: None,
        }
    }

    #[tokio::test]
    async fn turn_on_falls_back_to_first_source_when_nothing_remembered() {
        let state = Arc::new(Mutex::new(GatewayState::new(vec![radio_product()])));
        let (_, handle, _) = mlgw::new(
            "127.0.0.1".to_string(),
            9000,
            "admin".to_string(),
            "x".to_string(),
            10,
            Duration::from_secs(60),
        );
        let gateway = Gateway { mlgw: handle, trace: None, state };
        // select_source will fail to send since no session is running, but we
        // only assert the source-resolution policy here via turn_on's error path
        // being the channel-closed Gone error, not a "no source" Config error.
        let err = gateway.turn_on(1).await.unwrap_err();
        assert!(matches!(err, Error::Gone));
    }

    #[tokio::test]
    async fn select_source_rejects_unknown_source_name() {
        let state = Arc::new(Mutex::new(GatewayState::new(vec![radio_product()])));
        let (_, handle, _) = mlgw::new(
            "127.0.0.1".to_string(),
            9000,
            "admin".to_string(),
            "x".to_string(),
            10,
            Duration::from_secs(60),
        );
        let gateway = Gateway { mlgw: handle, trace: None, state };
        let err = gateway.select_source(1, "DVD").await.unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
