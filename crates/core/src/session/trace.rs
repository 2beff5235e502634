//! ML trace session (C5): the telnet-based MasterLink bus trace on port 23.
//!
//! Only attempted when the configured account is `admin` (§4.5); the hub
//! only streams `_MLLOG ONLINE` to an administrative login. Structured the
//! same way as [`crate::session::mlgw::MlgwSession`]: an outer reconnect
//! loop around an inner per-connection loop.

use std::time::Duration;

use log::*;
use time::{format_description, PrimitiveDateTime};
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::TcpStream,
    sync::{mpsc, watch},
    time::{sleep, timeout, Instant},
};
use tokio_util::sync::CancellationToken;

use crate::codec::ml::decode_ml;
use crate::error::{Error, Result};
use crate::model::MlTelegram;

/// One decoded trace line, with the metadata C8 needs to build an `ML_TELEGRAM` event
#[derive(Debug, Clone)]
pub struct TraceRecord {
    /// Decoded telegram
    pub telegram: MlTelegram,
    /// The line's timestamp prefix, unmodified
    pub timestamp: String,
    /// Raw bytes, lower-hex encoded
    pub bytes_hex: String,
}

const RECV_TIMEOUT: Duration = Duration::from_secs(5);
const IDLE_KEEPALIVE: Duration = Duration::from_secs(600);
const LOGIN_TIMEOUT: Duration = Duration::from_secs(3);
const PROMPT_RETRY_SPACING: Duration = Duration::from_millis(500);
const PROMPT_RETRIES: u32 = 3;

/// Same lifecycle shape as [`crate::session::mlgw::SessionState`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Not yet started
    Idle,
    /// TCP connect in flight
    Connecting,
    /// Telnet login/prompt handshake in progress
    Authenticating,
    /// `_MLLOG ONLINE` acknowledged, trace lines flowing
    Ready,
    /// Stop requested
    Draining,
    /// Socket closed
    Closed,
}

/// Handle used by C7 to observe the trace session
#[derive(Clone)]
pub struct TraceHandle {
    state_rx: watch::Receiver<SessionState>,
    cancel: CancellationToken,
}

impl TraceHandle {
    /// Current connection state
    pub fn state(&self) -> SessionState {
        *self.state_rx.borrow()
    }

    /// Block until `Ready`, or `wait` elapses
    pub async fn wait_ready(&self, wait: Duration) -> Result<()> {
        let mut rx = self.state_rx.clone();
        match timeout(wait, rx.wait_for(|s| *s == SessionState::Ready)).await {
            Ok(Ok(_)) => Ok(()),
            _ => Err(Error::Timeout("ML trace session to reach Ready")),
        }
    }

    /// Request cooperative shutdown
    pub fn stop(&self) {
        self.cancel.cancel();
    }
}

/// Construct a trace session and its handle
pub fn new(
    host: String,
    port: u16,
    username: String,
    password: String,
    max_reconnects: u32,
    reconnect_backoff: Duration,
) -> (TraceSession, TraceHandle, mpsc::Receiver<TraceRecord>) {
    let (state_tx, state_rx) = watch::channel(SessionState::Idle);
    let (inbound_tx, inbound_rx) = mpsc::channel(256);
    let cancel = CancellationToken::new();

    let handle = TraceHandle {
        state_rx,
        cancel: cancel.clone(),
    };
    let session = TraceSession {
        host,
        port,
        username,
        password,
        max_reconnects,
        reconnect_backoff,
        inbound_tx,
        state_tx,
        cancel,
    };
    (session, handle, inbound_rx)
}

/// The owned half of the trace session
pub struct TraceSession {
    host: String,
    port: u16,
    username: String,
    password: String,
    max_reconnects: u32,
    reconnect_backoff: Duration,
    inbound_tx: mpsc::Sender<TraceRecord>,
    state_tx: watch::Sender<SessionState>,
    cancel: CancellationToken,
}

impl TraceSession {
    /// Only `admin` may open the debug trace stream (§4.5, §4.7)
    pub fn is_eligible(username: &str) -> bool {
        username == "admin"
    }

    /// Drive the session until cancelled or the reconnect budget is exhausted
    pub async fn run(mut self) -> Result<()> {
        let mut attempts = 0u32;
        loop {
            if self.cancel.is_cancelled() {
                let _ = self.state_tx.send(SessionState::Closed);
                return Ok(());
            }

            let _ = self.state_tx.send(SessionState::Connecting);
            match self.run_once().await {
                Ok(()) => {
                    let _ = self.state_tx.send(SessionState::Closed);
                    return Ok(());
                }
                Err(e) => {
                    warn!("ml trace: connection lost: {e}");
                    attempts += 1;
                    if attempts >= self.max_reconnects {
                        let _ = self.state_tx.send(SessionState::Closed);
                        return Err(Error::ReconnectExhausted("ml_trace", self.max_reconnects));
                    }
                    let _ = self.state_tx.send(SessionState::Draining);
                    tokio::select! {
                        _ = self.cancel.cancelled() => {
                            let _ = self.state_tx.send(SessionState::Closed);
                            return Ok(());
                        }
                        _ = sleep(self.reconnect_backoff) => {}
                    }
                }
            }
        }
    }

    async fn run_once(&mut self) -> Result<()> {
        let addr = format!("{}:{}", self.host, self.port);
        let stream = TcpStream::connect(&addr)
            .await
            .map_err(|e| Error::CannotConnect(addr.clone(), e))?;

        let _ = self.state_tx.send(SessionState::Authenticating);
        let (reader, mut writer) = stream.into_split();
        let mut reader = BufReader::new(reader);

        read_until_contains(&mut reader, "login: ", LOGIN_TIMEOUT).await?;
        writer
            .write_all(format!("{}\n", self.password).as_bytes())
            .await
            .map_err(Error::BrokenPipe)?;

        let mut prompted = false;
        for _ in 0..PROMPT_RETRIES {
            if read_until_contains(&mut reader, "LGW >", PROMPT_RETRY_SPACING)
                .await
                .is_ok()
            {
                prompted = true;
                break;
            }
        }
        if !prompted {
            return Err(Error::AuthInvalid);
        }

        writer
            .write_all(b"_MLLOG ONLINE\r\n")
            .await
            .map_err(Error::BrokenPipe)?;
        let _ = self.state_tx.send(SessionState::Ready);

        let mut last_activity = Instant::now();
        let mut line = String::new();
        loop {
            if self.cancel.is_cancelled() {
                return Ok(());
            }
            line.clear();
            match timeout(RECV_TIMEOUT, reader.read_line(&mut line)).await {
                Ok(Ok(0)) => {
                    return Err(Error::BrokenPipe(std::io::Error::new(
                        std::io::ErrorKind::ConnectionReset,
                        "eof",
                    )))
                }
                Ok(Ok(_)) => {
                    last_activity = Instant::now();
                    match parse_trace_line(&line) {
                        Ok((timestamp, bytes)) => match decode_ml(&bytes) {
                            Ok(telegram) => {
                                let record = TraceRecord {
                                    telegram,
                                    timestamp,
                                    bytes_hex: hex_encode(&bytes),
                                };
                                if self.inbound_tx.send(record).await.is_err() {
                                    return Ok(());
                                }
                            }
                            Err(e) => debug!("ml trace: failed to decode telegram: {e}"),
                        },
                        Err(e) => debug!("ml trace: failed to parse line {line:?}: {e}"),
                    }
                }
                Ok(Err(e)) => return Err(Error::BrokenPipe(e)),
                Err(_elapsed) => {
                    if last_activity.elapsed() >= IDLE_KEEPALIVE {
                        writer.write_all(&[0u8]).await.map_err(Error::BrokenPipe)?;
                        last_activity = Instant::now();
                    }
                }
            }
        }
    }
}

async fn read_until_contains<R: tokio::io::AsyncBufRead + Unpin>(
    reader: &mut R,
    needle: &str,
    wait: Duration,
) -> Result<()> {
    let mut acc = String::new();
    let deadline = Instant::now() + wait;
    loop {
        if Instant::now() >= deadline {
            return Err(Error::Timeout("telnet prompt"));
        }
        let mut chunk = String::new();
        let remaining = deadline.saturating_duration_since(Instant::now());
        match timeout(remaining, reader.read_line(&mut chunk)).await {
            Ok(Ok(0)) => {
                return Err(Error::BrokenPipe(std::io::Error::new(
                    std::io::ErrorKind::ConnectionReset,
                    "eof during handshake",
                )))
            }
            Ok(Ok(_)) => {
                acc.push_str(&chunk);
                if acc.contains(needle) {
                    return Ok(());
                }
            }
            Ok(Err(e)) => return Err(Error::BrokenPipe(e)),
            Err(_) => return Err(Error::Timeout("telnet prompt")),
        }
    }
}

/// Parse one trace line `YYYYMMDD-HH:MM:SS:µs: BB, BB, … BB,` into its
/// timestamp prefix and the raw telegram bytes. Lines that fail to parse are
/// never fatal (§4.5).
fn parse_trace_line(line: &str) -> Result<(String, Vec<u8>)> {
    let fmt = format_description::parse(
        "[year][month][day]-[hour]:[minute]:[second]:[subsecond digits:1+]",
    )
    .map_err(|e| Error::ParseFailure(format!("bad timestamp format description: {e}")))?;

    let mut parts = line.split_whitespace();
    let timestamp = parts
        .next()
        .ok_or_else(|| Error::ParseFailure("empty trace line".to_string()))?
        .trim_end_matches(':');

    PrimitiveDateTime::parse(timestamp, &fmt)
        .map_err(|e| Error::ParseFailure(format!("bad timestamp {timestamp:?}: {e}")))?;

    let mut bytes = Vec::new();
    for token in parts {
        let token = token.trim_end_matches(',');
        if token.is_empty() {
            continue;
        }
        let byte = u8::from_str_radix(token, 16)
            .map_err(|e| Error::ParseFailure(format!("bad hex byte {token:?}: {e}")))?;
        bytes.push(byte);
    }
    Ok((timestamp.to_string(), bytes))
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_well_formed_trace_line() {
        let line = "20240115-12:34:56:789012: C1, C0, 00, 0A, 00, 00, 01, 45, 05, 00, 00, 6F, 02, 00, 00,\n";
        let (timestamp, bytes) = parse_trace_line(line).unwrap();
        assert_eq!(timestamp, "20240115-12:34:56:789012");
        assert_eq!(bytes, vec![0xC1, 0xC0, 0x00, 0x0A, 0x00, 0x00, 0x01, 0x45, 0x05, 0x00, 0x00, 0x6F, 0x02, 0x00, 0x00]);
    }

    #[test]
    fn bad_timestamp_is_an_error_not_a_panic() {
        assert!(parse_trace_line("garbage line\n").is_err());
    }

    #[test]
    fn bad_hex_byte_is_an_error() {
        let line = "20240115-12:34:56:789012: ZZ,\n";
        assert!(parse_trace_line(line).is_err());
    }
}
