//! Recover submitted header bytes by replaying `SubmitHeader` events.
//!
//! The relay contract does not index submissions by block hash, so the
//! lookup is a linear scan over the contract's event history in pages of
//! `page_size` blocks, oldest first. A block hash is submitted at most once,
//! so the first match is used.

use crate::chain::{ChainClient, ChainLog, LogFilter};
use crate::contract::SUBMIT_HEADER;
use crate::error::RelayError;
use alloy_primitives::{Address, Bytes, B256};
use relay_core::{CallDataError, DynamicBytesCall, SUBMIT_BLOCK_V1};
use std::sync::Arc;
use tracing::{debug, info};

pub const DEFAULT_PAGE_SIZE: u64 = 10_000;

#[derive(Clone)]
pub struct SubmissionLocator {
    chain: Arc<dyn ChainClient>,
    relay: Address,
    from_block: u64,
    page_size: u64,
    layout: DynamicBytesCall,
}

impl SubmissionLocator {
    pub fn new(chain: Arc<dyn ChainClient>, relay: Address, from_block: u64) -> Self {
        Self {
            chain,
            relay,
            from_block,
            page_size: DEFAULT_PAGE_SIZE,
            layout: SUBMIT_BLOCK_V1,
        }
    }

    /// Blocks per `eth_getLogs` request. Zero is treated as one.
    pub fn with_page_size(mut self, page_size: u64) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// The first `SubmitHeader` log whose payload is exactly `block_hash`.
    pub async fn find_submission_event(&self, block_hash: B256) -> Result<ChainLog, RelayError> {
        let latest = self.chain.block_number().await?;
        let mut from = self.from_block;
        while from <= latest {
            let to = from.saturating_add(self.page_size - 1).min(latest);
            let filter = LogFilter {
                address: self.relay,
                topic0: SUBMIT_HEADER.topic,
                from_block: from,
                to_block: to,
            };
            let logs = self.chain.logs(&filter).await?;
            debug!(from, to, logs = logs.len(), "scanned submission events");
            if let Some(log) = logs
                .into_iter()
                .find(|log| log.data.as_ref() == block_hash.as_slice())
            {
                return Ok(log);
            }
            match to.checked_add(1) {
                Some(next) => from = next,
                None => break,
            }
        }
        Err(RelayError::NoSubmissionFound { block_hash })
    }

    /// Raw header bytes exactly as they were submitted for `block_hash`.
    pub async fn find_submitted_header_bytes(&self, block_hash: B256) -> Result<Bytes, RelayError> {
        let event = self.find_submission_event(block_hash).await?;
        let tx_hash = event.transaction_hash;
        let tx = self
            .chain
            .transaction(tx_hash)
            .await?
            .ok_or_else(|| RelayError::not_found("transaction", tx_hash))?;
        if tx.is_pending() {
            return Err(RelayError::PendingTransaction { tx_hash });
        }

        let header = self.layout.extract(&tx.input).map_err(|source| match source {
            CallDataError::SelectorMismatch { .. } => {
                RelayError::SignatureMismatch { tx_hash, source }
            }
            _ => RelayError::MalformedCallData { tx_hash, source },
        })?;
        info!(%block_hash, %tx_hash, len = header.len(), "recovered submitted header");
        Ok(header)
    }
}
