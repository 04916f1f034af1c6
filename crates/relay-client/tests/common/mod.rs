//! Shared fixtures for relay-client integration tests.
#![allow(dead_code)]

use alloy_primitives::{address, b256, Address, Bloom, Bytes, B256, B64, U256};
use async_trait::async_trait;
use relay_client::contract::SUBMIT_HEADER;
use relay_client::mock::{MockChain, SendOutcome};
use relay_client::{
    DatasetProvider, OrchestratorConfig, RelayClient, RelayClientConfig, VerifyingChain,
};
use relay_core::{DatasetProof, DatasetQuery, Header, Log, PowError};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const RELAY: Address = address!("00000000000000000000000000000000000000aa");
pub const ETHASH: Address = address!("00000000000000000000000000000000000000bb");
pub const ACCOUNT: Address = address!("00000000000000000000000000000000000000c1");

/// A PoW header on the target chain. Distinct `number`s give distinct hashes.
pub fn pow_header(number: u64, parent_hash: B256) -> Header {
    Header {
        parent_hash,
        uncle_hash: b256!("1dcc4de8dec75d7aab85b567b6ccd41ad312451b948a7413f0a142fd40d49347"),
        coinbase: address!("05a56e2d52c817161883f50c441c3228cfe54d9f"),
        state_root: B256::repeat_byte(0x11),
        transactions_root: B256::repeat_byte(0x22),
        receipts_root: B256::repeat_byte(0x33),
        logs_bloom: Bloom::ZERO,
        difficulty: U256::from(17_171_480_576u64),
        number,
        gas_limit: 5000,
        gas_used: 0,
        timestamp: 1_438_269_988 + number,
        extra_data: Bytes::from_static(b"Geth/v1.0.0/linux/go1.4.2"),
        mix_digest: B256::repeat_byte(0x44),
        nonce: B64::new((0x539b_d497_9fef_1ec4u64 ^ number).to_be_bytes()),
    }
}

pub fn relay_log(topic: B256, data: Vec<u8>) -> Log {
    Log {
        address: RELAY,
        topics: vec![topic],
        data: data.into(),
    }
}

pub fn submit_header_log(block_hash: B256) -> Log {
    relay_log(SUBMIT_HEADER.topic, block_hash.to_vec())
}

pub fn word(value: u64) -> Vec<u8> {
    U256::from(value).to_be_bytes::<32>().to_vec()
}

pub fn fast_config() -> RelayClientConfig {
    RelayClientConfig {
        orchestrator: OrchestratorConfig {
            receipt_timeout: Duration::from_secs(5),
            poll_interval: Duration::from_millis(10),
        },
        log_page_size: 4,
    }
}

pub struct Setup {
    pub target: Arc<MockChain>,
    pub verifying: Arc<MockChain>,
    pub client: RelayClient,
}

pub fn setup() -> Setup {
    let target = Arc::new(MockChain::new(1));
    let verifying = Arc::new(MockChain::new(11_155_111));
    let client = RelayClient::new(
        target.clone(),
        VerifyingChain {
            client: verifying.clone(),
            relay: RELAY,
            ethash: Some(ETHASH),
            deployment_block: 0,
        },
        ACCOUNT,
        fast_config(),
    );
    Setup {
        target,
        verifying,
        client,
    }
}

impl Setup {
    /// Submit `header` through the client with the contract's success event.
    pub async fn submit(&self, header: &Header) {
        self.verifying
            .push_send_outcome(SendOutcome::success(vec![submit_header_log(header.hash())]));
        self.client
            .submit_header(header)
            .await
            .expect("submission succeeds");
    }
}

/// Returns a fixed proof and records every query it receives.
#[derive(Default)]
pub struct RecordingDataset {
    pub proof: DatasetProof,
    pub queries: Mutex<Vec<DatasetQuery>>,
}

#[async_trait]
impl DatasetProvider for RecordingDataset {
    async fn dataset_proof(&self, query: &DatasetQuery) -> Result<DatasetProof, PowError> {
        self.queries.lock().unwrap().push(*query);
        Ok(self.proof.clone())
    }
}
