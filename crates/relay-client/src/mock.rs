//! Deterministic in-memory chain for tests and offline runs.
//!
//! Blocks are mined explicitly with [`MockChain::mine_block`] or implicitly
//! by [`ChainClient::send_transaction`], which consumes scripted
//! [`SendOutcome`]s. Header roots are computed from the block contents, so
//! proofs built against a mock block check out against its header.

use crate::chain::{
    Block, BlockRef, BlockTransaction, CallRequest, ChainClient, ChainError, ChainLog, LogFilter,
    Transaction, TxRequest,
};
use alloy_primitives::{keccak256, Address, Bloom, BloomInput, Bytes, B256, B64, U256};
use alloy_rlp::Encodable;
use async_trait::async_trait;
use relay_core::{ordered_trie_root, Header, Log, Receipt, ReceiptOutcome};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

const MOCK_GAS_PER_TX: u64 = 21_000;
const MOCK_BLOCK_TIME: u64 = 13;
const MOCK_GENESIS_TIME: u64 = 1_438_269_973;

/// What happens to the next transaction sent to the mock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// Mined in a fresh block, emitting `logs`.
    Mined { success: bool, logs: Vec<Log> },
    /// Accepted but never mined; no receipt ever appears.
    NeverMined,
    /// Rejected by the node.
    Rejected(ChainError),
}

impl SendOutcome {
    pub fn success(logs: Vec<Log>) -> Self {
        Self::Mined {
            success: true,
            logs,
        }
    }

    pub fn failure() -> Self {
        Self::Mined {
            success: false,
            logs: Vec::new(),
        }
    }
}

/// A transaction to include in a mined block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockTx {
    pub from: Address,
    pub to: Address,
    pub value: U256,
    pub input: Bytes,
    /// EIP-2718 type; zero for legacy.
    pub tx_type: u8,
    pub success: bool,
    pub logs: Vec<Log>,
}

impl MockTx {
    pub fn call(from: Address, to: Address, input: Bytes) -> Self {
        Self {
            from,
            to,
            value: U256::ZERO,
            input,
            tx_type: 0,
            success: true,
            logs: Vec::new(),
        }
    }

    pub fn typed(mut self, tx_type: u8) -> Self {
        self.tx_type = tx_type;
        self
    }

    pub fn with_logs(mut self, logs: Vec<Log>) -> Self {
        self.logs = logs;
        self
    }
}

#[derive(Debug, Default)]
struct MockState {
    blocks: Vec<Block>,
    transactions: HashMap<B256, Transaction>,
    receipts: HashMap<B256, Receipt>,
    logs: Vec<ChainLog>,
    balances: HashMap<Address, U256>,
    nonces: HashMap<Address, u64>,
    gas_price: U256,
    call_results: HashMap<[u8; 4], Result<Bytes, ChainError>>,
    send_outcomes: VecDeque<SendOutcome>,
    sent: Vec<TxRequest>,
    calls: Vec<(CallRequest, Option<u64>)>,
    receipt_polls: usize,
    failing_receipt_polls: usize,
    tx_counter: u64,
}

#[derive(Debug)]
pub struct MockChain {
    chain_id: u64,
    state: Mutex<MockState>,
}

impl MockChain {
    pub fn new(chain_id: u64) -> Self {
        let chain = Self {
            chain_id,
            state: Mutex::new(MockState {
                gas_price: U256::from(1_000_000_000u64),
                ..MockState::default()
            }),
        };
        chain.mine_block(Vec::new());
        chain
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().expect("mutex poisoned")
    }

    /// Mine a block containing `txs` in order and return it.
    pub fn mine_block(&self, txs: Vec<MockTx>) -> Block {
        let mut state = self.lock();
        mine_locked(&mut state, txs)
    }

    /// Make `tx` known without mining it.
    pub fn insert_pending_transaction(&self, tx: Transaction) {
        self.lock().transactions.insert(tx.hash, tx);
    }

    /// Inject a raw log, e.g. one pointing at a transaction mined elsewhere.
    pub fn push_log(&self, log: ChainLog) {
        self.lock().logs.push(log);
    }

    /// Script the result of read-only calls whose calldata starts with `selector`.
    pub fn set_call_result(&self, selector: [u8; 4], result: Result<Bytes, ChainError>) {
        self.lock().call_results.insert(selector, result);
    }

    pub fn push_send_outcome(&self, outcome: SendOutcome) {
        self.lock().send_outcomes.push_back(outcome);
    }

    /// The next `count` receipt requests fail with `Unavailable`.
    pub fn fail_receipt_polls(&self, count: usize) {
        self.lock().failing_receipt_polls = count;
    }

    pub fn set_gas_price(&self, gas_price: U256) {
        self.lock().gas_price = gas_price;
    }

    pub fn set_nonce(&self, account: Address, nonce: u64) {
        self.lock().nonces.insert(account, nonce);
    }

    pub fn set_balance(&self, account: Address, balance: U256) {
        self.lock().balances.insert(account, balance);
    }

    /// Edit a stored block in place. The node-reported hash is kept.
    pub fn update_block(&self, hash: B256, edit: impl FnOnce(&mut Block)) {
        let mut state = self.lock();
        if let Some(block) = state.blocks.iter_mut().find(|b| b.hash == hash) {
            edit(block);
        }
    }

    pub fn sent(&self) -> Vec<TxRequest> {
        self.lock().sent.clone()
    }

    pub fn calls(&self) -> Vec<(CallRequest, Option<u64>)> {
        self.lock().calls.clone()
    }

    pub fn receipt_polls(&self) -> usize {
        self.lock().receipt_polls
    }
}

fn mine_locked(state: &mut MockState, txs: Vec<MockTx>) -> Block {
    let number = u64::try_from(state.blocks.len()).unwrap_or(u64::MAX);
    let parent_hash = state.blocks.last().map(|b| b.hash).unwrap_or_default();

    let mut header = Header {
        parent_hash,
        uncle_hash: keccak256([0xc0]),
        coinbase: Address::repeat_byte(0xcb),
        state_root: keccak256(number.to_be_bytes()),
        transactions_root: B256::ZERO,
        receipts_root: B256::ZERO,
        logs_bloom: Bloom::ZERO,
        difficulty: U256::from(131_072u64),
        number,
        gas_limit: 8_000_000,
        gas_used: 0,
        timestamp: MOCK_GENESIS_TIME + number * MOCK_BLOCK_TIME,
        extra_data: Bytes::from_static(b"mock"),
        mix_digest: keccak256(b"mix"),
        nonce: B64::new(number.to_be_bytes()),
    };

    let mut block_txs = Vec::with_capacity(txs.len());
    let mut receipts = Vec::with_capacity(txs.len());
    let mut pending_logs = Vec::new();
    for (index, tx) in (0u64..).zip(txs) {
        state.tx_counter += 1;
        let raw = raw_transaction(&tx, state.tx_counter);
        let hash = keccak256(&raw);
        let cumulative_gas_used = MOCK_GAS_PER_TX * (index + 1);

        let mut logs_bloom = Bloom::ZERO;
        for log in &tx.logs {
            logs_bloom.accrue(BloomInput::Raw(log.address.as_slice()));
            for topic in &log.topics {
                logs_bloom.accrue(BloomInput::Raw(topic.as_slice()));
            }
        }
        header.logs_bloom.accrue_bloom(&logs_bloom);
        header.gas_used = cumulative_gas_used;

        pending_logs.extend(tx.logs.iter().cloned().map(|log| (hash, log)));
        receipts.push(Receipt {
            transaction_hash: hash,
            transaction_index: index,
            block_hash: B256::ZERO,
            block_number: number,
            tx_type: tx.tx_type,
            outcome: ReceiptOutcome::Status(tx.success),
            cumulative_gas_used,
            logs_bloom,
            logs: tx.logs.clone(),
        });
        state.transactions.insert(
            hash,
            Transaction {
                hash,
                from: tx.from,
                to: Some(tx.to),
                value: tx.value,
                input: tx.input.clone(),
                block_number: Some(number),
            },
        );
        block_txs.push(BlockTransaction {
            hash,
            raw: raw.into(),
        });
    }

    header.transactions_root = ordered_trie_root(
        &block_txs.iter().map(|tx| tx.raw.to_vec()).collect::<Vec<_>>(),
    );
    header.receipts_root = ordered_trie_root(
        &receipts.iter().map(Receipt::encode_consensus).collect::<Vec<_>>(),
    );
    let block_hash = header.hash();

    for mut receipt in receipts {
        receipt.block_hash = block_hash;
        state.receipts.insert(receipt.transaction_hash, receipt);
    }
    for (log_index, (transaction_hash, log)) in (0u64..).zip(pending_logs) {
        state.logs.push(ChainLog {
            address: log.address,
            topics: log.topics,
            data: log.data,
            block_number: number,
            transaction_hash,
            log_index,
        });
    }

    let block = Block {
        hash: block_hash,
        header,
        transactions: block_txs,
    };
    state.blocks.push(block.clone());
    block
}

/// Stand-in for a signed transaction envelope. Unique per `counter`.
fn raw_transaction(tx: &MockTx, counter: u64) -> Vec<u8> {
    let mut payload = Vec::new();
    counter.encode(&mut payload);
    tx.from.encode(&mut payload);
    tx.to.encode(&mut payload);
    tx.value.encode(&mut payload);
    tx.input.encode(&mut payload);

    let mut out = Vec::with_capacity(payload.len() + 5);
    if tx.tx_type != 0 {
        out.push(tx.tx_type);
    }
    alloy_rlp::Header {
        list: true,
        payload_length: payload.len(),
    }
    .encode(&mut out);
    out.extend_from_slice(&payload);
    out
}

#[async_trait]
impl ChainClient for MockChain {
    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    async fn block_number(&self) -> Result<u64, ChainError> {
        let mined = u64::try_from(self.lock().blocks.len()).unwrap_or(u64::MAX);
        Ok(mined.saturating_sub(1))
    }

    async fn balance(&self, account: Address) -> Result<U256, ChainError> {
        Ok(self.lock().balances.get(&account).copied().unwrap_or_default())
    }

    async fn pending_nonce(&self, account: Address) -> Result<u64, ChainError> {
        Ok(self.lock().nonces.get(&account).copied().unwrap_or_default())
    }

    async fn gas_price(&self) -> Result<U256, ChainError> {
        Ok(self.lock().gas_price)
    }

    async fn block(&self, id: BlockRef) -> Result<Option<Block>, ChainError> {
        let state = self.lock();
        Ok(match id {
            BlockRef::Hash(hash) => state.blocks.iter().find(|b| b.hash == hash).cloned(),
            BlockRef::Number(number) => usize::try_from(number)
                .ok()
                .and_then(|n| state.blocks.get(n))
                .cloned(),
            BlockRef::Latest => state.blocks.last().cloned(),
        })
    }

    async fn transaction(&self, hash: B256) -> Result<Option<Transaction>, ChainError> {
        Ok(self.lock().transactions.get(&hash).cloned())
    }

    async fn receipt(&self, hash: B256) -> Result<Option<Receipt>, ChainError> {
        let mut state = self.lock();
        state.receipt_polls += 1;
        if state.failing_receipt_polls > 0 {
            state.failing_receipt_polls -= 1;
            return Err(ChainError::Unavailable("mock receipt poll failure".to_string()));
        }
        Ok(state.receipts.get(&hash).cloned())
    }

    async fn logs(&self, filter: &LogFilter) -> Result<Vec<ChainLog>, ChainError> {
        let state = self.lock();
        let mut logs: Vec<ChainLog> = state
            .logs
            .iter()
            .filter(|log| {
                log.address == filter.address
                    && log.topics.first() == Some(&filter.topic0)
                    && (filter.from_block..=filter.to_block).contains(&log.block_number)
            })
            .cloned()
            .collect();
        logs.sort_by_key(|log| (log.block_number, log.log_index));
        Ok(logs)
    }

    async fn call(&self, call: &CallRequest, block: Option<u64>) -> Result<Bytes, ChainError> {
        let mut state = self.lock();
        state.calls.push((call.clone(), block));
        let selector: [u8; 4] = call
            .data
            .get(..4)
            .and_then(|s| s.try_into().ok())
            .ok_or_else(|| ChainError::Decode("calldata shorter than a selector".to_string()))?;
        state
            .call_results
            .get(&selector)
            .cloned()
            .unwrap_or_else(|| {
                Err(ChainError::Unavailable(format!(
                    "no scripted result for selector 0x{}",
                    hex::encode(selector)
                )))
            })
    }

    async fn send_transaction(&self, tx: &TxRequest) -> Result<B256, ChainError> {
        let mut state = self.lock();
        state.sent.push(tx.clone());
        let outcome = state
            .send_outcomes
            .pop_front()
            .unwrap_or_else(|| SendOutcome::success(Vec::new()));

        let mock_tx = |success: bool, logs: Vec<Log>| MockTx {
            from: tx.from,
            to: tx.to,
            value: tx.value,
            input: tx.data.clone(),
            tx_type: 0,
            success,
            logs,
        };
        let hash = match outcome {
            SendOutcome::Rejected(err) => return Err(err),
            SendOutcome::Mined { success, logs } => {
                let block = mine_locked(&mut state, vec![mock_tx(success, logs)]);
                block.transactions[0].hash
            }
            SendOutcome::NeverMined => {
                state.tx_counter += 1;
                let hash = keccak256(raw_transaction(&mock_tx(true, Vec::new()), state.tx_counter));
                state.transactions.insert(
                    hash,
                    Transaction {
                        hash,
                        from: tx.from,
                        to: Some(tx.to),
                        value: tx.value,
                        input: tx.data.clone(),
                        block_number: None,
                    },
                );
                hash
            }
        };
        let nonce = state.nonces.entry(tx.from).or_default();
        *nonce = tx.nonce + 1;
        Ok(hash)
    }
}
