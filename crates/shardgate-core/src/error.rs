use thiserror::Error;

#[derive(Debug, Error)]
pub enum ShardgateError {
    #[error("malformed frame: {0}")]
    MalformedFrame(String),
    #[error("invalid command payload: {0}")]
    Decoding(String),
    #[error("sql parse error: {0}")]
    Parse(String),
    #[error("prepared statement identifier space exhausted")]
    RegistryExhausted,
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ShardgateError {
    /// Framing and transport faults close the connection; everything else is
    /// answered in-band with an ERR packet and the connection stays open.
    pub fn connection_fatal(&self) -> bool {
        matches!(
            self,
            ShardgateError::MalformedFrame(_)
                | ShardgateError::Io(_)
                | ShardgateError::RegistryExhausted
        )
    }
}
