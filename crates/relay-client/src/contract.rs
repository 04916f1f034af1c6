//! Relay and Ethash contract bindings.
//!
//! Calls, view returns and events all go through the `sol!` generated types.
//! Decoding validates word padding, so a dirty `address` or an out-of-range
//! `uint8` is a decode error.

use crate::chain::ChainLog;
use crate::error::RelayError;
use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_sol_types::{sol, SolCall, SolEvent};
use relay_core::{EpochChunk, EpochData, TrieKind};
use serde::{Deserialize, Serialize};

sol! {
    interface IRelay {
        function submitBlock(bytes rlpHeader);
        function disputeBlockHeader(
            bytes rlpHeader,
            bytes rlpParent,
            uint256[] dataSetLookup,
            uint256[] witnessForLookup
        );
        function verifyTransaction(
            uint256 feeInWei,
            bytes rlpHeader,
            uint8 noOfConfirmations,
            bytes rlpEncodedTx,
            bytes path,
            bytes rlpEncodedNodes
        ) payable returns (uint8);
        function verifyReceipt(
            uint256 feeInWei,
            bytes rlpHeader,
            uint8 noOfConfirmations,
            bytes rlpEncodedReceipt,
            bytes path,
            bytes rlpEncodedNodes
        ) payable returns (uint8);
        function verifyState(
            uint256 feeInWei,
            bytes rlpHeader,
            uint8 noOfConfirmations,
            bytes rlpEncodedState,
            bytes path,
            bytes rlpEncodedNodes
        ) payable returns (uint8);
        function depositStake(uint256 amount) payable;
        function withdrawStake(uint256 amount);
        function getStake() view returns (uint256);
        function isHeaderStored(bytes32 hash) view returns (bool);
        function getRequiredVerificationFee() view returns (uint256);
        function getLongestChainEndpoint() view returns (bytes32);
        function getHeader(bytes32 blockHash) view returns (bytes32 hash, uint256 blockNumber, uint256 totalDifficulty);

        event SubmitHeader(bytes32 blockHash);
        event RemoveBranch(bytes32 root);
        event PoWValidationResult(uint256 returnCode, uint256 errorInfo);
        event VerifyTransaction(uint8 result);
        event VerifyReceipt(uint8 result);
        event VerifyState(uint8 result);
        event WithdrawStake(address client, uint256 withdrawnStake);
    }

    interface IEthash {
        function setEpochData(
            uint256 epoch,
            uint256 fullSizeIn128Resultion,
            uint256 branchDepth,
            uint256[] merkleNodes,
            uint256 start,
            uint256 numElems
        );
    }
}

/// An event the orchestrator can look for in a receipt's block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventSpec {
    pub name: &'static str,
    pub topic: B256,
}

pub const SUBMIT_HEADER: EventSpec = EventSpec {
    name: "SubmitHeader",
    topic: IRelay::SubmitHeader::SIGNATURE_HASH,
};

pub const REMOVE_BRANCH: EventSpec = EventSpec {
    name: "RemoveBranch",
    topic: IRelay::RemoveBranch::SIGNATURE_HASH,
};

pub const POW_VALIDATION_RESULT: EventSpec = EventSpec {
    name: "PoWValidationResult",
    topic: IRelay::PoWValidationResult::SIGNATURE_HASH,
};

pub const WITHDRAW_STAKE: EventSpec = EventSpec {
    name: "WithdrawStake",
    topic: IRelay::WithdrawStake::SIGNATURE_HASH,
};

pub fn verification_event(kind: TrieKind) -> EventSpec {
    match kind {
        TrieKind::Transaction => EventSpec {
            name: "VerifyTransaction",
            topic: IRelay::VerifyTransaction::SIGNATURE_HASH,
        },
        TrieKind::Receipt => EventSpec {
            name: "VerifyReceipt",
            topic: IRelay::VerifyReceipt::SIGNATURE_HASH,
        },
        TrieKind::State => EventSpec {
            name: "VerifyState",
            topic: IRelay::VerifyState::SIGNATURE_HASH,
        },
    }
}

/// Contract-defined verification outcome, kept opaque.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub kind: TrieKind,
    pub code: u8,
}

impl std::fmt::Display for VerificationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} verification returned code {}", self.kind, self.code)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PowValidation {
    pub return_code: U256,
    pub error_info: U256,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakeWithdrawn {
    pub client: Address,
    pub amount: U256,
}

/// Header record as stored by the relay contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredHeader {
    pub hash: B256,
    pub block_number: U256,
    pub total_difficulty: U256,
}

pub fn submit_block(rlp_header: Bytes) -> Bytes {
    IRelay::submitBlockCall {
        rlpHeader: rlp_header,
    }
    .abi_encode()
    .into()
}

pub fn dispute_block_header(
    rlp_header: Bytes,
    rlp_parent: Bytes,
    dataset_lookup: Vec<U256>,
    witness: Vec<U256>,
) -> Bytes {
    IRelay::disputeBlockHeaderCall {
        rlpHeader: rlp_header,
        rlpParent: rlp_parent,
        dataSetLookup: dataset_lookup,
        witnessForLookup: witness,
    }
    .abi_encode()
    .into()
}

/// Arguments shared by the three verification entry points.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationRequest {
    pub kind: TrieKind,
    pub fee: U256,
    pub rlp_header: Bytes,
    pub confirmations: u8,
    pub value: Bytes,
    pub path: Bytes,
    pub encoded_nodes: Bytes,
}

pub fn verify(request: &VerificationRequest) -> Bytes {
    let r = request.clone();
    let data = match r.kind {
        TrieKind::Transaction => IRelay::verifyTransactionCall {
            feeInWei: r.fee,
            rlpHeader: r.rlp_header,
            noOfConfirmations: r.confirmations,
            rlpEncodedTx: r.value,
            path: r.path,
            rlpEncodedNodes: r.encoded_nodes,
        }
        .abi_encode(),
        TrieKind::Receipt => IRelay::verifyReceiptCall {
            feeInWei: r.fee,
            rlpHeader: r.rlp_header,
            noOfConfirmations: r.confirmations,
            rlpEncodedReceipt: r.value,
            path: r.path,
            rlpEncodedNodes: r.encoded_nodes,
        }
        .abi_encode(),
        TrieKind::State => IRelay::verifyStateCall {
            feeInWei: r.fee,
            rlpHeader: r.rlp_header,
            noOfConfirmations: r.confirmations,
            rlpEncodedState: r.value,
            path: r.path,
            rlpEncodedNodes: r.encoded_nodes,
        }
        .abi_encode(),
    };
    data.into()
}

pub fn deposit_stake(amount: U256) -> Bytes {
    IRelay::depositStakeCall { amount }.abi_encode().into()
}

pub fn withdraw_stake(amount: U256) -> Bytes {
    IRelay::withdrawStakeCall { amount }.abi_encode().into()
}

pub fn get_stake() -> Bytes {
    IRelay::getStakeCall {}.abi_encode().into()
}

pub fn is_header_stored(hash: B256) -> Bytes {
    IRelay::isHeaderStoredCall { hash }.abi_encode().into()
}

pub fn get_required_verification_fee() -> Bytes {
    IRelay::getRequiredVerificationFeeCall {}.abi_encode().into()
}

pub fn get_longest_chain_endpoint() -> Bytes {
    IRelay::getLongestChainEndpointCall {}.abi_encode().into()
}

pub fn get_header(block_hash: B256) -> Bytes {
    IRelay::getHeaderCall {
        blockHash: block_hash,
    }
    .abi_encode()
    .into()
}

pub fn set_epoch_data(data: &EpochData, chunk: &EpochChunk<'_>) -> Bytes {
    IEthash::setEpochDataCall {
        epoch: data.epoch,
        fullSizeIn128Resultion: data.full_size_in_128_resolution,
        branchDepth: data.branch_depth,
        merkleNodes: chunk.nodes.to_vec(),
        start: U256::from(chunk.start),
        numElems: U256::from(chunk.nodes.len()),
    }
    .abi_encode()
    .into()
}

fn decode_error(what: &'static str) -> impl Fn(alloy_sol_types::Error) -> RelayError {
    move |e| RelayError::Decode(format!("{what}: {e}"))
}

fn decode_event<E: SolEvent>(log: &ChainLog, what: &'static str) -> Result<E, RelayError> {
    E::decode_raw_log_validate(log.topics.iter().copied(), &log.data).map_err(decode_error(what))
}

fn decode_returns<C: SolCall>(output: &[u8], what: &'static str) -> Result<C::Return, RelayError> {
    C::abi_decode_returns_validate(output).map_err(decode_error(what))
}

pub fn decode_submit_header(log: &ChainLog) -> Result<B256, RelayError> {
    decode_event::<IRelay::SubmitHeader>(log, "SubmitHeader").map(|e| e.blockHash)
}

pub fn decode_remove_branch(log: &ChainLog) -> Result<B256, RelayError> {
    decode_event::<IRelay::RemoveBranch>(log, "RemoveBranch").map(|e| e.root)
}

pub fn decode_pow_validation(log: &ChainLog) -> Result<PowValidation, RelayError> {
    let event = decode_event::<IRelay::PoWValidationResult>(log, "PoWValidationResult")?;
    Ok(PowValidation {
        return_code: event.returnCode,
        error_info: event.errorInfo,
    })
}

pub fn decode_verification(kind: TrieKind, log: &ChainLog) -> Result<VerificationResult, RelayError> {
    let code = match kind {
        TrieKind::Transaction => {
            decode_event::<IRelay::VerifyTransaction>(log, "VerifyTransaction")?.result
        }
        TrieKind::Receipt => decode_event::<IRelay::VerifyReceipt>(log, "VerifyReceipt")?.result,
        TrieKind::State => decode_event::<IRelay::VerifyState>(log, "VerifyState")?.result,
    };
    Ok(VerificationResult { kind, code })
}

pub fn decode_withdraw_stake(log: &ChainLog) -> Result<StakeWithdrawn, RelayError> {
    let event = decode_event::<IRelay::WithdrawStake>(log, "WithdrawStake")?;
    Ok(StakeWithdrawn {
        client: event.client,
        amount: event.withdrawnStake,
    })
}

pub fn decode_stake(output: &[u8]) -> Result<U256, RelayError> {
    decode_returns::<IRelay::getStakeCall>(output, "getStake")
}

pub fn decode_is_header_stored(output: &[u8]) -> Result<bool, RelayError> {
    decode_returns::<IRelay::isHeaderStoredCall>(output, "isHeaderStored")
}

pub fn decode_required_verification_fee(output: &[u8]) -> Result<U256, RelayError> {
    decode_returns::<IRelay::getRequiredVerificationFeeCall>(output, "getRequiredVerificationFee")
}

pub fn decode_longest_chain_endpoint(output: &[u8]) -> Result<B256, RelayError> {
    decode_returns::<IRelay::getLongestChainEndpointCall>(output, "getLongestChainEndpoint")
}

pub fn decode_stored_header(output: &[u8]) -> Result<StoredHeader, RelayError> {
    let ret = decode_returns::<IRelay::getHeaderCall>(output, "getHeader")?;
    Ok(StoredHeader {
        hash: ret.hash,
        block_number: ret.blockNumber,
        total_difficulty: ret.totalDifficulty,
    })
}
