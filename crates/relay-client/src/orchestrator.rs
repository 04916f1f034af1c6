//! Transaction orchestration: send, await the receipt, extract the event.
//!
//! Every state-changing relay operation goes through [`Orchestrator`]. Nonce
//! and gas price are fetched fresh for each call. The receipt is polled on a
//! spawned task that is aborted when the deadline passes.

use crate::chain::{CallRequest, ChainClient, ChainLog, LogFilter, TxRequest};
use crate::contract::EventSpec;
use crate::error::RelayError;
use alloy_primitives::{Address, Bytes, B256, U256};
use relay_core::Receipt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// How long to wait for a receipt before giving up.
pub const DEFAULT_RECEIPT_TIMEOUT: Duration = Duration::from_secs(120);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrchestratorConfig {
    pub receipt_timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            receipt_timeout: DEFAULT_RECEIPT_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// A state-changing contract call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractCall {
    pub to: Address,
    pub data: Bytes,
    pub value: U256,
    /// Short name used in logs.
    pub label: &'static str,
}

impl ContractCall {
    pub fn new(label: &'static str, to: Address, data: Bytes) -> Self {
        Self {
            to,
            data,
            value: U256::ZERO,
            label,
        }
    }

    pub fn with_value(mut self, value: U256) -> Self {
        self.value = value;
        self
    }
}

/// Outcome of a successful call: the receipt and the expected event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submitted {
    pub receipt: Receipt,
    pub event: ChainLog,
}

#[derive(Clone)]
pub struct Orchestrator {
    chain: Arc<dyn ChainClient>,
    account: Address,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(chain: Arc<dyn ChainClient>, account: Address, config: OrchestratorConfig) -> Self {
        Self {
            chain,
            account,
            config,
        }
    }

    pub fn account(&self) -> Address {
        self.account
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Attach a fresh pending nonce and gas price.
    async fn prepare(&self, call: &ContractCall) -> Result<TxRequest, RelayError> {
        let nonce = self.chain.pending_nonce(self.account).await?;
        let gas_price = self.chain.gas_price().await?;
        Ok(TxRequest {
            from: self.account,
            to: call.to,
            data: call.data.clone(),
            value: call.value,
            nonce,
            gas_price,
        })
    }

    /// Send `call` and wait for a successful receipt.
    ///
    /// A failed receipt is turned into [`RelayError::TransactionReverted`]
    /// carrying the reason obtained by replaying the call at the receipt's
    /// block.
    pub async fn submit_and_await(&self, call: &ContractCall) -> Result<Receipt, RelayError> {
        let tx = self.prepare(call).await?;
        let tx_hash = self.chain.send_transaction(&tx).await?;
        info!(
            call = call.label,
            %tx_hash,
            nonce = tx.nonce,
            gas_price = %tx.gas_price,
            "transaction sent"
        );

        let receipt = self.await_receipt(tx_hash).await?;
        if receipt.succeeded() {
            debug!(call = call.label, %tx_hash, block = receipt.block_number, "transaction mined");
            return Ok(receipt);
        }

        let reason = self.failure_reason(call, receipt.block_number).await;
        warn!(call = call.label, %tx_hash, %reason, "transaction failed");
        Err(RelayError::TransactionReverted {
            tx_hash: Some(tx_hash),
            reason,
        })
    }

    /// Poll for the receipt of `tx_hash` until it appears or the configured
    /// timeout elapses. The polling task is cancelled on timeout.
    pub async fn await_receipt(&self, tx_hash: B256) -> Result<Receipt, RelayError> {
        let chain = Arc::clone(&self.chain);
        let interval = self.config.poll_interval;
        let mut handle = tokio::spawn(async move {
            loop {
                match chain.receipt(tx_hash).await {
                    Ok(Some(receipt)) => return receipt,
                    Ok(None) => {}
                    Err(err) => warn!(%tx_hash, error = %err, "receipt poll failed"),
                }
                tokio::time::sleep(interval).await;
            }
        });

        match tokio::time::timeout(self.config.receipt_timeout, &mut handle).await {
            Ok(Ok(receipt)) => Ok(receipt),
            Ok(Err(join_err)) => Err(RelayError::RemoteUnavailable(format!(
                "receipt poll for {tx_hash} aborted: {join_err}"
            ))),
            Err(_) => {
                handle.abort();
                warn!(%tx_hash, waited = ?self.config.receipt_timeout, "gave up waiting for receipt");
                Err(RelayError::ReceiptTimeout {
                    tx_hash,
                    waited: self.config.receipt_timeout,
                })
            }
        }
    }

    /// Replay `call` read-only at `block` to recover the revert reason.
    async fn failure_reason(&self, call: &ContractCall, block: u64) -> String {
        let request = CallRequest {
            from: self.account,
            to: call.to,
            data: call.data.clone(),
            value: call.value,
        };
        match self.chain.call(&request, Some(block)).await {
            Ok(_) => "transaction failed but the replayed call succeeded".to_string(),
            Err(crate::chain::ChainError::Reverted { message, data }) => {
                if data.is_empty() {
                    message
                } else {
                    relay_core::revert_reason(&data)
                }
            }
            Err(err) => format!("transaction failed; replaying the call failed: {err}"),
        }
    }

    /// First log of `event` emitted by `contract` within the receipt's
    /// transaction.
    pub async fn find_event(
        &self,
        receipt: &Receipt,
        contract: Address,
        event: EventSpec,
    ) -> Result<Option<ChainLog>, RelayError> {
        let filter = LogFilter {
            address: contract,
            topic0: event.topic,
            from_block: receipt.block_number,
            to_block: receipt.block_number,
        };
        let logs = self.chain.logs(&filter).await?;
        Ok(logs
            .into_iter()
            .find(|log| log.transaction_hash == receipt.transaction_hash))
    }

    pub async fn expect_event(
        &self,
        receipt: &Receipt,
        contract: Address,
        event: EventSpec,
    ) -> Result<ChainLog, RelayError> {
        self.find_event(receipt, contract, event)
            .await?
            .ok_or(RelayError::EventNotFound {
                event: event.name,
                block_number: receipt.block_number,
                tx_hash: receipt.transaction_hash,
            })
    }

    /// Send, await and extract `event` in one step.
    pub async fn submit_and_extract(
        &self,
        call: &ContractCall,
        event: EventSpec,
    ) -> Result<Submitted, RelayError> {
        let receipt = self.submit_and_await(call).await?;
        let event = self.expect_event(&receipt, call.to, event).await?;
        Ok(Submitted { receipt, event })
    }

    /// Read-only call against the latest block.
    pub async fn view(&self, to: Address, data: Bytes) -> Result<Bytes, RelayError> {
        let request = CallRequest {
            from: self.account,
            to,
            data,
            value: U256::ZERO,
        };
        Ok(self.chain.call(&request, None).await?)
    }
}
