//! MLGW session (C4): the persistent TCP connection to port 9000.
//!
//! An outer loop owns reconnect/backoff, an inner loop owns one live
//! connection and exits back to the outer loop on any I/O error or
//! cancellation.

use std::time::Duration;

use bytes::BytesMut;
use log::*;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
    sync::{mpsc, watch},
    time::{sleep, timeout, Instant},
};
use tokio_util::sync::CancellationToken;

use crate::codec::mlgw as codec;
use crate::error::{Error, Result};
use crate::model::MlgwPayload;
use crate::model::MlgwTelegram;

const RECV_TIMEOUT: Duration = Duration::from_secs(5);
const PING_IDLE: Duration = Duration::from_secs(600);

/// Connection lifecycle state, observable through [`MlgwHandle::state`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Not yet started
    Idle,
    /// TCP connect in flight
    Connecting,
    /// TCP established, login handshake in progress
    Authenticating,
    /// Logged in, serving traffic
    Ready,
    /// Stop requested, finishing in-flight I/O
    Draining,
    /// Socket closed; the outer loop will reconnect unless `stopped`
    Closed,
}

/// Handle used by callers (C7) to drive and observe the session
#[derive(Clone)]
pub struct MlgwHandle {
    outbound_tx: mpsc::Sender<Vec<u8>>,
    state_rx: watch::Receiver<SessionState>,
    cancel: CancellationToken,
}

impl MlgwHandle {
    /// Current connection state
    pub fn state(&self) -> SessionState {
        *self.state_rx.borrow()
    }

    /// Send a pre-encoded MLGW frame; fire-and-forget (§5: all commands but
    /// Request Serial Number are fire-and-forget)
    pub async fn send_raw(&self, frame: Vec<u8>) -> Result<()> {
        self.outbound_tx.send(frame).await.map_err(|_| Error::Gone)
    }

    /// Block until the session reaches `Ready`, or `timeout` elapses
    pub async fn wait_ready(&self, wait: Duration) -> Result<()> {
        let mut rx = self.state_rx.clone();
        match timeout(wait, rx.wait_for(|s| *s == SessionState::Ready)).await {
            Ok(Ok(_)) => Ok(()),
            _ => Err(Error::Timeout("MLGW session to reach Ready")),
        }
    }

    /// Request cooperative shutdown (§5 `stopped` flag)
    pub fn stop(&self) {
        self.cancel.cancel();
    }
}

/// Construct a session and its handle; call [`MlgwSession::run`] to drive it
pub fn new(
    host: String,
    port: u16,
    username: String,
    password: String,
    max_reconnects: u32,
    reconnect_backoff: Duration,
) -> (MlgwSession, MlgwHandle, mpsc::Receiver<MlgwTelegram>) {
    let (outbound_tx, outbound_rx) = mpsc::channel(32);
    let (state_tx, state_rx) = watch::channel(SessionState::Idle);
    let (inbound_tx, inbound_rx) = mpsc::channel(256);
    let cancel = CancellationToken::new();

    let handle = MlgwHandle {
        outbound_tx,
        state_rx,
        cancel: cancel.clone(),
    };
    let session = MlgwSession {
        host,
        port,
        username,
        password,
        max_reconnects,
        reconnect_backoff,
        outbound_rx,
        inbound_tx,
        state_tx,
        cancel,
    };
    (session, handle, inbound_rx)
}

/// The owned half of the session: runs as a background task
pub struct MlgwSession {
    host: String,
    port: u16,
    username: String,
    password: String,
    max_reconnects: u32,
    reconnect_backoff: Duration,
    outbound_rx: mpsc::Receiver<Vec<u8>>,
    inbound_tx: mpsc::Sender<MlgwTelegram>,
    state_tx: watch::Sender<SessionState>,
    cancel: CancellationToken,
}

impl MlgwSession {
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
                    // Clean shutdown requested
                    let _ = self.state_tx.send(SessionState::Closed);
                    return Ok(());
                }
                Err(Error::AuthRetryExhausted) => {
                    error!("mlgw: login was rejected twice, giving up");
                    let _ = self.state_tx.send(SessionState::Closed);
                    return Err(Error::AuthRetryExhausted);
                }
                Err(e) => {
                    warn!("mlgw: connection lost: {e}");
                    attempts += 1;
                    if attempts >= self.max_reconnects {
                        let _ = self.state_tx.send(SessionState::Closed);
                        return Err(Error::ReconnectExhausted("mlgw", self.max_reconnects));
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
        let mut stream = TcpStream::connect(&addr)
            .await
            .map_err(|e| Error::CannotConnect(addr.clone(), e))?;

        let _ = self.state_tx.send(SessionState::Authenticating);
        self.authenticate(&mut stream).await?;
        let _ = self.state_tx.send(SessionState::Ready);

        stream
            .write_all(&codec::encode_request_serial())
            .await
            .map_err(Error::BrokenPipe)?;

        self.serve(stream).await
    }

    /// Connecting → Authenticating → Ready handshake (§4.4)
    async fn authenticate(&mut self, stream: &mut TcpStream) -> Result<()> {
        stream
            .write_all(&codec::encode_ping())
            .await
            .map_err(Error::BrokenPipe)?;

        let mut buf = BytesMut::with_capacity(256);
        let mut fail_count = 0;
        loop {
            let telegram = read_one_frame(stream, &mut buf).await?;
            match telegram.payload {
                MlgwPayload::LoginStatus { ok: true } => return Ok(()),
                MlgwPayload::LoginStatus { ok: false } => {
                    fail_count += 1;
                    if fail_count > 1 {
                        return Err(Error::AuthRetryExhausted);
                    }
                    stream
                        .write_all(&codec::encode_login(&self.username, &self.password))
                        .await
                        .map_err(Error::BrokenPipe)?;
                }
                _ => continue,
            }
        }
    }

    /// The `Ready` loop: decode inbound frames, serve outbound sends, ping on idle
    async fn serve(&mut self, mut stream: TcpStream) -> Result<()> {
        let mut buf = BytesMut::with_capacity(4096);
        let mut last_activity = Instant::now();

        loop {
            if self.cancel.is_cancelled() {
                return Ok(());
            }

            tokio::select! {
                _ = self.cancel.cancelled() => {
                    return Ok(());
                }
                outbound = self.outbound_rx.recv() => {
                    match outbound {
                        Some(frame) => {
                            stream.write_all(&frame).await.map_err(Error::BrokenPipe)?;
                            last_activity = Instant::now();
                        }
                        None => return Ok(()), // handle dropped
                    }
                }
                read = timeout(RECV_TIMEOUT, read_some(&mut stream, &mut buf)) => {
                    match read {
                        Ok(Ok(0)) => return Err(Error::BrokenPipe(
                            std::io::Error::new(std::io::ErrorKind::ConnectionReset, "eof"),
                        )),
                        Ok(Ok(_)) => {
                            last_activity = Instant::now();
                            while let Some(telegram) = codec::try_decode_frame(&mut buf)? {
                                if self.inbound_tx.send(telegram).await.is_err() {
                                    return Ok(());
                                }
                            }
                        }
                        Ok(Err(e)) => return Err(Error::BrokenPipe(e)),
                        Err(_elapsed) => {
                            if last_activity.elapsed() >= PING_IDLE {
                                stream.write_all(&codec::encode_ping()).await.map_err(Error::BrokenPipe)?;
                                last_activity = Instant::now();
                            }
                        }
                    }
                }
            }
        }
    }
}

async fn read_some(stream: &mut TcpStream, buf: &mut BytesMut) -> std::io::Result<usize> {
    let mut scratch = [0u8; 4096];
    let n = stream.read(&mut scratch).await?;
    buf.extend_from_slice(&scratch[..n]);
    Ok(n)
}

async fn read_one_frame(stream: &mut TcpStream, buf: &mut BytesMut) -> Result<MlgwTelegram> {
    loop {
        if let Some(telegram) = codec::try_decode_frame(buf)? {
            return Ok(telegram);
        }
        let n = timeout(RECV_TIMEOUT, read_some(stream, buf))
            .await
            .map_err(|_| Error::Timeout("MLGW login response"))?
            .map_err(Error::BrokenPipe)?;
        if n == 0 {
            return Err(Error::BrokenPipe(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "eof during handshake",
            )));
        }
    }
}
