use thiserror::Error;
use whispee_store::StoreError;

use crate::protocol::ProtocolError;

/// Failure while handling one inbound frame. Always fatal to the
/// connection that sent it; never to the process.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    #[error("`{command}` requires a bound session")]
    NoSession { command: &'static str },

    #[error("failed to encode reply: {0}")]
    Encode(#[from] serde_json::Error),
}
