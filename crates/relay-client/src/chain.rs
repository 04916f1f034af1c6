//! Transport-agnostic chain access.
//!
//! Relay operations only need a handful of JSON-RPC primitives. They are
//! collected in [`ChainClient`] so the same code drives a live node (see the
//! `eth-relay-cli` adapter) and the in-memory [`crate::mock::MockChain`].

use alloy_primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;
use relay_core::{Header, Receipt};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors surfaced by a [`ChainClient`] implementation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChainError {
    #[error("remote unavailable: {0}")]
    Unavailable(String),

    #[error("decode error: {0}")]
    Decode(String),

    /// A read-only call or gas estimation reverted.
    #[error("execution reverted: {message}")]
    Reverted { message: String, data: Bytes },
}

/// Block selector for [`ChainClient::block`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockRef {
    Hash(B256),
    Number(u64),
    Latest,
}

impl std::fmt::Display for BlockRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Hash(hash) => write!(f, "{hash}"),
            Self::Number(number) => write!(f, "#{number}"),
            Self::Latest => f.write_str("latest"),
        }
    }
}

/// A transaction as listed in a block, in its canonical (EIP-2718 envelope)
/// encoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockTransaction {
    pub hash: B256,
    pub raw: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Hash reported by the node.
    pub hash: B256,
    pub header: Header,
    pub transactions: Vec<BlockTransaction>,
}

/// A transaction looked up by hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub hash: B256,
    pub from: Address,
    pub to: Option<Address>,
    pub value: U256,
    pub input: Bytes,
    /// `None` while the transaction is pending.
    pub block_number: Option<u64>,
}

impl Transaction {
    pub fn is_pending(&self) -> bool {
        self.block_number.is_none()
    }
}

/// A fully specified transaction, ready to be signed and sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxRequest {
    pub from: Address,
    pub to: Address,
    pub data: Bytes,
    pub value: U256,
    pub nonce: u64,
    pub gas_price: U256,
}

/// A read-only contract call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRequest {
    pub from: Address,
    pub to: Address,
    pub data: Bytes,
    pub value: U256,
}

/// Logs of one contract with a given first topic over an inclusive block range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogFilter {
    pub address: Address,
    pub topic0: B256,
    pub from_block: u64,
    pub to_block: u64,
}

/// A log as returned by a log filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainLog {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
    pub block_number: u64,
    pub transaction_hash: B256,
    pub log_index: u64,
}

/// Async chain access used by every relay operation.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// EIP-155 chain id of the connected network.
    fn chain_id(&self) -> u64;

    async fn block_number(&self) -> Result<u64, ChainError>;

    async fn balance(&self, account: Address) -> Result<U256, ChainError>;

    /// Nonce including pending transactions.
    async fn pending_nonce(&self, account: Address) -> Result<u64, ChainError>;

    /// The node's suggested gas price.
    async fn gas_price(&self) -> Result<U256, ChainError>;

    async fn block(&self, id: BlockRef) -> Result<Option<Block>, ChainError>;

    async fn transaction(&self, hash: B256) -> Result<Option<Transaction>, ChainError>;

    /// `None` until the transaction is mined.
    async fn receipt(&self, hash: B256) -> Result<Option<Receipt>, ChainError>;

    /// Matching logs in ascending block order.
    async fn logs(&self, filter: &LogFilter) -> Result<Vec<ChainLog>, ChainError>;

    /// Execute a call without submitting it, at `block` or the latest block.
    async fn call(&self, call: &CallRequest, block: Option<u64>) -> Result<Bytes, ChainError>;

    /// Sign and broadcast; returns the transaction hash.
    async fn send_transaction(&self, tx: &TxRequest) -> Result<B256, ChainError>;
}
