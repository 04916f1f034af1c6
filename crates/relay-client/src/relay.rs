//! Top-level relay operations.
//!
//! A [`RelayClient`] reads blocks from a target chain and drives the relay
//! and Ethash contracts on a verifying chain.

use crate::chain::{BlockRef, ChainClient};
use crate::contract::{
    self, PowValidation, StakeWithdrawn, StoredHeader, VerificationRequest, VerificationResult,
    POW_VALIDATION_RESULT, REMOVE_BRANCH, SUBMIT_HEADER, WITHDRAW_STAKE,
};
use crate::error::RelayError;
use crate::locator::{SubmissionLocator, DEFAULT_PAGE_SIZE};
use crate::orchestrator::{ContractCall, Orchestrator, OrchestratorConfig};
use alloy_primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;
use relay_core::{
    build_proof, DatasetProof, DatasetQuery, EpochData, Header, MerkleProof, PowError, TrieKind,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Derives the dataset lookup and witness arrays for a header.
#[async_trait]
pub trait DatasetProvider: Send + Sync {
    async fn dataset_proof(&self, query: &DatasetQuery) -> Result<DatasetProof, PowError>;
}

/// The chain hosting the relay contracts.
#[derive(Clone)]
pub struct VerifyingChain {
    pub client: Arc<dyn ChainClient>,
    pub relay: Address,
    pub ethash: Option<Address>,
    /// First block to scan for submission events.
    pub deployment_block: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayClientConfig {
    pub orchestrator: OrchestratorConfig,
    pub log_page_size: u64,
}

impl Default for RelayClientConfig {
    fn default() -> Self {
        Self {
            orchestrator: OrchestratorConfig::default(),
            log_page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmittedHeader {
    pub tx_hash: B256,
    pub block_hash: B256,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisputeOutcome {
    pub tx_hash: B256,
    /// Root of the branch removed by a successful dispute.
    pub removed_branch: Option<B256>,
    pub pow_result: PowValidation,
}

/// Everything the relay needs to check inclusion of one value in a block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InclusionProof {
    pub kind: TrieKind,
    pub block_hash: B256,
    pub header: Bytes,
    pub proof: MerkleProof,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationOutcome {
    pub tx_hash: B256,
    pub result: VerificationResult,
}

fn state_proof_unsupported() -> RelayError {
    RelayError::Unsupported("state proofs are built by the caller and sent with verify_merkle_proof")
}

pub struct RelayClient {
    target: Arc<dyn ChainClient>,
    verifying: VerifyingChain,
    orchestrator: Orchestrator,
    locator: SubmissionLocator,
    dataset: Option<Arc<dyn DatasetProvider>>,
}

impl RelayClient {
    pub fn new(
        target: Arc<dyn ChainClient>,
        verifying: VerifyingChain,
        account: Address,
        config: RelayClientConfig,
    ) -> Self {
        let orchestrator =
            Orchestrator::new(Arc::clone(&verifying.client), account, config.orchestrator);
        let locator = SubmissionLocator::new(
            Arc::clone(&verifying.client),
            verifying.relay,
            verifying.deployment_block,
        )
        .with_page_size(config.log_page_size);
        Self {
            target,
            verifying,
            orchestrator,
            locator,
            dataset: None,
        }
    }

    pub fn with_dataset_provider(mut self, provider: Arc<dyn DatasetProvider>) -> Self {
        self.dataset = Some(provider);
        self
    }

    pub fn locator(&self) -> &SubmissionLocator {
        &self.locator
    }

    pub fn account(&self) -> Address {
        self.orchestrator.account()
    }

    // ---------------------------------------------------------------------
    // Header submission
    // ---------------------------------------------------------------------

    pub async fn submit_header(&self, header: &Header) -> Result<SubmittedHeader, RelayError> {
        self.submit_rlp(Bytes::from(header.encode())).await
    }

    /// Submit raw header bytes. They must decode as a sealed header.
    pub async fn submit_encoded_header(&self, rlp: Bytes) -> Result<SubmittedHeader, RelayError> {
        Header::decode(&rlp)?;
        self.submit_rlp(rlp).await
    }

    /// Fetch a block from the target chain and submit its header.
    pub async fn submit_block(&self, block: BlockRef) -> Result<SubmittedHeader, RelayError> {
        let header = self.target_header(block).await?;
        self.submit_header(&header).await
    }

    /// Submit a forged copy of a target block's header; see
    /// [`Header::randomized`]. The submission can then be disputed.
    pub async fn submit_randomized_block(
        &self,
        block: BlockRef,
    ) -> Result<SubmittedHeader, RelayError> {
        let header = self.target_header(block).await?.randomized();
        warn!(number = header.number, forged = %header.hash(), "submitting randomized header");
        self.submit_header(&header).await
    }

    async fn target_header(&self, block: BlockRef) -> Result<Header, RelayError> {
        let block = self
            .target
            .block(block)
            .await?
            .ok_or_else(|| RelayError::not_found("block", block))?;
        if block.header.hash() != block.hash {
            warn!(
                reported = %block.hash,
                computed = %block.header.hash(),
                "header hash differs from the node's block hash"
            );
        }
        Ok(block.header)
    }

    async fn submit_rlp(&self, rlp: Bytes) -> Result<SubmittedHeader, RelayError> {
        let call = ContractCall::new("submitBlock", self.verifying.relay, contract::submit_block(rlp));
        let submitted = self.orchestrator.submit_and_extract(&call, SUBMIT_HEADER).await?;
        let block_hash = contract::decode_submit_header(&submitted.event)?;
        info!(%block_hash, tx_hash = %submitted.receipt.transaction_hash, "header submitted");
        Ok(SubmittedHeader {
            tx_hash: submitted.receipt.transaction_hash,
            block_hash,
        })
    }

    // ---------------------------------------------------------------------
    // Disputes
    // ---------------------------------------------------------------------

    pub async fn build_dispute_proof(&self, header: &Header) -> Result<DatasetProof, RelayError> {
        let provider = self
            .dataset
            .as_ref()
            .ok_or(RelayError::NotConfigured("dataset provider"))?;
        let query = DatasetQuery::for_header(header);
        debug!(block = query.block_number, nonce = query.nonce, seal_hash = %query.seal_hash, "requesting dataset proof");
        Ok(provider.dataset_proof(&query).await?)
    }

    /// Dispute the proof of work of the header submitted for `block_hash`.
    pub async fn dispute_header(&self, block_hash: B256) -> Result<DisputeOutcome, RelayError> {
        let rlp_header = self.locator.find_submitted_header_bytes(block_hash).await?;
        let header = Header::decode(&rlp_header)?;
        let rlp_parent = self
            .locator
            .find_submitted_header_bytes(header.parent_hash)
            .await?;
        let proof = self.build_dispute_proof(&header).await?;

        let call = ContractCall::new(
            "disputeBlockHeader",
            self.verifying.relay,
            contract::dispute_block_header(rlp_header, rlp_parent, proof.dataset_lookup, proof.witness),
        );
        let receipt = self.orchestrator.submit_and_await(&call).await?;
        let removed_branch = match self
            .orchestrator
            .find_event(&receipt, self.verifying.relay, REMOVE_BRANCH)
            .await?
        {
            Some(log) => Some(contract::decode_remove_branch(&log)?),
            None => None,
        };
        let log = self
            .orchestrator
            .expect_event(&receipt, self.verifying.relay, POW_VALIDATION_RESULT)
            .await?;
        let pow_result = contract::decode_pow_validation(&log)?;
        info!(
            %block_hash,
            return_code = %pow_result.return_code,
            removed = removed_branch.is_some(),
            "dispute settled"
        );
        Ok(DisputeOutcome {
            tx_hash: receipt.transaction_hash,
            removed_branch,
            pow_result,
        })
    }

    // ---------------------------------------------------------------------
    // Inclusion proofs
    // ---------------------------------------------------------------------

    pub async fn build_tx_proof(&self, tx_hash: B256) -> Result<InclusionProof, RelayError> {
        self.inclusion_proof(TrieKind::Transaction, tx_hash).await
    }

    pub async fn build_receipt_proof(&self, tx_hash: B256) -> Result<InclusionProof, RelayError> {
        self.inclusion_proof(TrieKind::Receipt, tx_hash).await
    }

    async fn inclusion_proof(&self, kind: TrieKind, tx_hash: B256) -> Result<InclusionProof, RelayError> {
        if kind == TrieKind::State {
            return Err(state_proof_unsupported());
        }
        let located = self
            .target
            .receipt(tx_hash)
            .await?
            .ok_or_else(|| RelayError::not_found("receipt", tx_hash))?;
        let block = self
            .target
            .block(BlockRef::Hash(located.block_hash))
            .await?
            .ok_or_else(|| RelayError::not_found("block", located.block_hash))?;

        let (values, root) = match kind {
            TrieKind::Transaction => (
                block.transactions.iter().map(|tx| tx.raw.to_vec()).collect::<Vec<_>>(),
                block.header.transactions_root,
            ),
            TrieKind::Receipt => {
                let mut values = Vec::with_capacity(block.transactions.len());
                for tx in &block.transactions {
                    let receipt = self
                        .target
                        .receipt(tx.hash)
                        .await?
                        .ok_or_else(|| RelayError::not_found("receipt", tx.hash))?;
                    values.push(receipt.encode_consensus());
                }
                (values, block.header.receipts_root)
            }
            TrieKind::State => return Err(state_proof_unsupported()),
        };

        let proof = build_proof(&values, located.transaction_index, root).map_err(|source| {
            RelayError::TrieInconsistency {
                block_hash: block.hash,
                source,
            }
        })?;
        debug!(%kind, %tx_hash, nodes = proof.nodes.len(), "built inclusion proof");
        Ok(InclusionProof {
            kind,
            block_hash: block.hash,
            header: Bytes::from(block.header.encode()),
            proof,
        })
    }

    /// Ask the relay to verify `proof` with at least `confirmations` blocks on
    /// top of its header. `fee` is sent as the transaction value.
    pub async fn verify_merkle_proof(
        &self,
        proof: &InclusionProof,
        fee: U256,
        confirmations: u8,
    ) -> Result<VerificationOutcome, RelayError> {
        let request = VerificationRequest {
            kind: proof.kind,
            fee,
            rlp_header: proof.header.clone(),
            confirmations,
            value: proof.proof.value.clone(),
            path: proof.proof.path.clone(),
            encoded_nodes: Bytes::from(proof.proof.encoded_nodes()),
        };
        let label = match proof.kind {
            TrieKind::Transaction => "verifyTransaction",
            TrieKind::Receipt => "verifyReceipt",
            TrieKind::State => "verifyState",
        };
        let call = ContractCall::new(label, self.verifying.relay, contract::verify(&request))
            .with_value(fee);
        let submitted = self
            .orchestrator
            .submit_and_extract(&call, contract::verification_event(proof.kind))
            .await?;
        let result = contract::decode_verification(proof.kind, &submitted.event)?;
        info!(block_hash = %proof.block_hash, %result, "verification finished");
        Ok(VerificationOutcome {
            tx_hash: submitted.receipt.transaction_hash,
            result,
        })
    }

    /// Build the proof for `tx_hash` and have the relay verify it.
    pub async fn verify_inclusion(
        &self,
        kind: TrieKind,
        tx_hash: B256,
        fee: U256,
        confirmations: u8,
    ) -> Result<VerificationOutcome, RelayError> {
        let proof = self.inclusion_proof(kind, tx_hash).await?;
        self.verify_merkle_proof(&proof, fee, confirmations).await
    }

    // ---------------------------------------------------------------------
    // Stake
    // ---------------------------------------------------------------------

    pub async fn deposit_stake(&self, amount: U256) -> Result<B256, RelayError> {
        let call = ContractCall::new(
            "depositStake",
            self.verifying.relay,
            contract::deposit_stake(amount),
        )
        .with_value(amount);
        let receipt = self.orchestrator.submit_and_await(&call).await?;
        info!(%amount, tx_hash = %receipt.transaction_hash, "stake deposited");
        Ok(receipt.transaction_hash)
    }

    pub async fn withdraw_stake(&self, amount: U256) -> Result<StakeWithdrawn, RelayError> {
        let call = ContractCall::new(
            "withdrawStake",
            self.verifying.relay,
            contract::withdraw_stake(amount),
        );
        let submitted = self.orchestrator.submit_and_extract(&call, WITHDRAW_STAKE).await?;
        let withdrawn = contract::decode_withdraw_stake(&submitted.event)?;
        info!(amount = %withdrawn.amount, client = %withdrawn.client, "stake withdrawn");
        Ok(withdrawn)
    }

    pub async fn stake(&self) -> Result<U256, RelayError> {
        let out = self
            .orchestrator
            .view(self.verifying.relay, contract::get_stake())
            .await?;
        contract::decode_stake(&out)
    }

    // ---------------------------------------------------------------------
    // Queries
    // ---------------------------------------------------------------------

    pub async fn is_header_stored(&self, hash: B256) -> Result<bool, RelayError> {
        let out = self
            .orchestrator
            .view(self.verifying.relay, contract::is_header_stored(hash))
            .await?;
        contract::decode_is_header_stored(&out)
    }

    pub async fn longest_chain_endpoint(&self) -> Result<B256, RelayError> {
        let out = self
            .orchestrator
            .view(self.verifying.relay, contract::get_longest_chain_endpoint())
            .await?;
        contract::decode_longest_chain_endpoint(&out)
    }

    pub async fn required_verification_fee(&self) -> Result<U256, RelayError> {
        let out = self
            .orchestrator
            .view(self.verifying.relay, contract::get_required_verification_fee())
            .await?;
        contract::decode_required_verification_fee(&out)
    }

    pub async fn stored_header(&self, hash: B256) -> Result<StoredHeader, RelayError> {
        let out = self
            .orchestrator
            .view(self.verifying.relay, contract::get_header(hash))
            .await?;
        contract::decode_stored_header(&out)
    }

    // ---------------------------------------------------------------------
    // Epoch data
    // ---------------------------------------------------------------------

    /// Upload `data` to the Ethash contract in chunks, starting at node
    /// `resume_from`. Each chunk is mined before the next is sent.
    pub async fn set_epoch_data(
        &self,
        data: &EpochData,
        resume_from: usize,
    ) -> Result<Vec<B256>, RelayError> {
        let ethash = self
            .verifying
            .ethash
            .ok_or(RelayError::NotConfigured("ethash contract"))?;
        let chunks = data.chunks(resume_from)?;
        let mut sent = Vec::with_capacity(chunks.len());
        for chunk in &chunks {
            let call = ContractCall::new("setEpochData", ethash, contract::set_epoch_data(data, chunk));
            let receipt = self.orchestrator.submit_and_await(&call).await?;
            debug!(epoch = %data.epoch, start = chunk.start, len = chunk.nodes.len(), "epoch chunk accepted");
            sent.push(receipt.transaction_hash);
        }
        info!(epoch = %data.epoch, chunks = sent.len(), "epoch data uploaded");
        Ok(sent)
    }
}
