use thiserror::Error;

/// All errors that can be raised by the gateway protocol engine
///
/// These map onto the `{cannot_connect, invalid_auth, invalid_host, invalid_gateway, unknown}`
/// buckets a host config flow needs at setup time; see [`Error::setup_bucket`].
#[derive(Debug, Error)]
pub enum Error {
    /// Username/password rejected twice during the MLGW login handshake
    #[error("Authentication was rejected by the gateway")]
    AuthInvalid,

    /// The configured host did not answer like an MLGW/BLGW at all
    #[error("Host does not look like a MasterLink Gateway")]
    HostInvalid,

    /// The HTTP configuration endpoint returned 404: wrong device at this address
    #[error("No gateway configuration found at this address")]
    GatewayInvalid,

    /// TCP connect failed or timed out
    #[error("Could not connect to {0}: {1}")]
    CannotConnect(String, std::io::Error),

    /// A frame failed the fixed structural checks (bad SOH, bad reserved byte, short read)
    #[error("Malformed protocol frame: {0}")]
    ProtocolMalformed(&'static str),

    /// A frame had a correct envelope but its body could not be decoded
    #[error("Failed to parse telegram payload: {0}")]
    ParseFailure(String),

    /// The initial `Ready` wait, or a blocking request/response exchange, took too long
    #[error("Timed out waiting for {0}")]
    Timeout(&'static str),

    /// Login was retried the maximum number of times without success
    #[error("Exhausted login retries against the gateway")]
    AuthRetryExhausted,

    /// Session hit the reconnect attempt cap and gave up
    #[error("Gave up reconnecting to {0} after {1} attempts")]
    ReconnectExhausted(&'static str, u32),

    /// The TCP write side reported a broken pipe; the session must reconnect
    #[error("Connection to the gateway was lost: {0}")]
    BrokenPipe(std::io::Error),

    /// Generic I/O failure not otherwise classified
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Configuration document failed to load or validate
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Internal channel used to talk to a background task was closed
    #[error("Gateway task is no longer running")]
    Gone,
}

/// Convenience alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Classify this error into the coarse bucket a setup/config flow cares about
    pub fn setup_bucket(&self) -> &'static str {
        match self {
            Error::AuthInvalid | Error::AuthRetryExhausted => "invalid_auth",
            Error::HostInvalid => "invalid_host",
            Error::GatewayInvalid => "invalid_gateway",
            Error::CannotConnect(..) | Error::Timeout(_) => "cannot_connect",
            _ => "unknown",
        }
    }
}

impl<I: std::fmt::Debug> From<nom::Err<nom::error::VerboseError<I>>> for Error {
    fn from(e: nom::Err<nom::error::VerboseError<I>>) -> Self {
        Error::ParseFailure(format!("{:?}", e))
    }
}
