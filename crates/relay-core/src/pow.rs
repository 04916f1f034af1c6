//! Proof-of-work dispute inputs and ethash epoch data.

use crate::header::Header;
use alloy_primitives::{B256, U256};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum number of Merkle nodes the Ethash contract accepts per `setEpochData` call.
pub const EPOCH_CHUNK_SIZE: usize = 40;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PowError {
    #[error("dataset provider failed for block {block_number}: {reason}")]
    Provider { block_number: u64, reason: String },

    #[error("dataset provider returned malformed output: {0}")]
    MalformedOutput(String),

    #[error("resume offset {resume_from} is not a chunk boundary (chunks of {chunk})")]
    UnalignedResume { resume_from: usize, chunk: usize },

    #[error("resume offset {resume_from} is past the {len} epoch nodes")]
    ResumePastEnd { resume_from: usize, len: usize },
}

/// The triple a dataset lookup is keyed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetQuery {
    pub block_number: u64,
    pub nonce: u64,
    pub seal_hash: B256,
}

impl DatasetQuery {
    pub fn for_header(header: &Header) -> Self {
        Self {
            block_number: header.number,
            nonce: header.nonce_value(),
            seal_hash: header.seal_hash(),
        }
    }
}

/// Dataset elements touched by the hashimoto loop and their Merkle witness.
/// Forwarded to the contract unmodified.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetProof {
    pub dataset_lookup: Vec<U256>,
    pub witness: Vec<U256>,
}

/// Ethash epoch metadata uploaded ahead of disputes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochData {
    pub epoch: U256,
    pub full_size_in_128_resolution: U256,
    pub branch_depth: U256,
    pub merkle_nodes: Vec<U256>,
}

/// One `setEpochData` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpochChunk<'a> {
    /// Index of the first node of this chunk within the epoch.
    pub start: usize,
    pub nodes: &'a [U256],
}

impl EpochData {
    /// Split the nodes into upload chunks, skipping the first `resume_from`
    /// nodes. `resume_from` must fall on a chunk boundary so that the
    /// contract sees the same `(start, len)` pairs as a full upload.
    pub fn chunks(&self, resume_from: usize) -> Result<Vec<EpochChunk<'_>>, PowError> {
        if resume_from % EPOCH_CHUNK_SIZE != 0 {
            return Err(PowError::UnalignedResume {
                resume_from,
                chunk: EPOCH_CHUNK_SIZE,
            });
        }
        if resume_from > self.merkle_nodes.len() {
            return Err(PowError::ResumePastEnd {
                resume_from,
                len: self.merkle_nodes.len(),
            });
        }

        Ok(self.merkle_nodes[resume_from..]
            .chunks(EPOCH_CHUNK_SIZE)
            .enumerate()
            .map(|(i, nodes)| EpochChunk {
                start: resume_from + i * EPOCH_CHUNK_SIZE,
                nodes,
            })
            .collect())
    }
}
