use crate::chain::ChainError;
use alloy_primitives::B256;
use relay_core::{CallDataError, HeaderError, PowError, TrieError};
use std::time::Duration;
use thiserror::Error;

/// Errors from relay operations. None of them are retried; each aborts the
/// current operation.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error(transparent)]
    MalformedHeader(#[from] HeaderError),

    #[error("transaction {tx_hash} that submitted the header is still pending")]
    PendingTransaction { tx_hash: B256 },

    #[error("transaction {tx_hash} is not a header submission: {source}")]
    SignatureMismatch { tx_hash: B256, source: CallDataError },

    #[error("transaction {tx_hash} carries malformed submission calldata: {source}")]
    MalformedCallData { tx_hash: B256, source: CallDataError },

    #[error("no submission event found for block {block_hash}")]
    NoSubmissionFound { block_hash: B256 },

    #[error("block {block_hash} is inconsistent: {source}")]
    TrieInconsistency { block_hash: B256, source: TrieError },

    #[error("no receipt for transaction {tx_hash} after {waited:?}")]
    ReceiptTimeout { tx_hash: B256, waited: Duration },

    #[error("transaction {} reverted: {reason}", display_tx(.tx_hash))]
    TransactionReverted { tx_hash: Option<B256>, reason: String },

    #[error("event {event} not emitted by transaction {tx_hash} in block {block_number}")]
    EventNotFound {
        event: &'static str,
        block_number: u64,
        tx_hash: B256,
    },

    #[error("{what} {id} not found")]
    NotFound { what: &'static str, id: String },

    #[error("remote unavailable: {0}")]
    RemoteUnavailable(String),

    #[error("decode error: {0}")]
    Decode(String),

    #[error(transparent)]
    Pow(#[from] PowError),

    #[error("{0} is not configured")]
    NotConfigured(&'static str),

    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),
}

fn display_tx(tx_hash: &Option<B256>) -> String {
    tx_hash.map_or_else(|| "<unsent>".to_string(), |h| h.to_string())
}

impl From<ChainError> for RelayError {
    fn from(err: ChainError) -> Self {
        match err {
            ChainError::Unavailable(msg) => Self::RemoteUnavailable(msg),
            ChainError::Decode(msg) => Self::Decode(msg),
            // Raised before a hash exists, e.g. during gas estimation.
            ChainError::Reverted { message, data } => Self::TransactionReverted {
                tx_hash: None,
                reason: if data.is_empty() {
                    message
                } else {
                    relay_core::revert_reason(&data)
                },
            },
        }
    }
}

impl RelayError {
    pub(crate) fn not_found(what: &'static str, id: impl std::fmt::Display) -> Self {
        Self::NotFound {
            what,
            id: id.to_string(),
        }
    }
}
