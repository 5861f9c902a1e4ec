use thiserror::Error;

pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Error taxonomy shared by every layer of the stack.
///
/// Low-level protocol failures on the receive path (bad session id, failed
/// decrypt, stale counter) are deliberately *not* represented here: they are
/// dropped at dispatch without surfacing anything to the sender.
#[derive(Debug, Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("config: {0}")]
    Config(String),
    #[error("incorrect state: {0}")]
    IncorrectState(&'static str),
    #[error("{0} pool exhausted")]
    NoSpace(&'static str),
    #[error("scratch buffer too small for {0}")]
    NoMemory(&'static str),
    #[error("payload exceeds maximum application message length")]
    MessageTooLong,
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("wrong TLV element type")]
    WrongTlvType,
    #[error("unexpected TLV element")]
    UnexpectedTlvElement,
    #[error("crypto: {0}")]
    Crypto(String),
    #[error("feature not supported by this platform")]
    Unsupported,
    #[error("internal: {0}")]
    Internal(&'static str),
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
    pub fn crypto(msg: impl Into<String>) -> Self {
        Self::Crypto(msg.into())
    }
}

// Map TOML deserialization errors into the config error domain without adding a new variant
impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::Config(e.to_string())
    }
}
