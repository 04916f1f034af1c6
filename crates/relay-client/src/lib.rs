#![forbid(unsafe_code)]
#![deny(clippy::float_arithmetic)]
#![deny(clippy::float_cmp)]
#![deny(clippy::cast_precision_loss)]
#![deny(clippy::cast_possible_truncation)]
#![deny(clippy::cast_possible_wrap)]
#![deny(clippy::cast_sign_loss)]

//! Relay operations against a verifying chain.
//!
//! [`RelayClient`] submits and disputes PoW headers, proves transactions and
//! receipts, manages stake and uploads ethash epoch data. Chain access goes
//! through the [`ChainClient`] trait; [`mock::MockChain`] implements it in
//! memory.

pub mod chain;
pub mod contract;
pub mod error;
pub mod locator;
pub mod mock;
pub mod orchestrator;
pub mod relay;

pub use chain::{
    Block, BlockRef, BlockTransaction, CallRequest, ChainClient, ChainError, ChainLog, LogFilter,
    Transaction, TxRequest,
};
pub use contract::{EventSpec, PowValidation, StakeWithdrawn, StoredHeader, VerificationResult};
pub use error::RelayError;
pub use locator::SubmissionLocator;
pub use orchestrator::{ContractCall, Orchestrator, OrchestratorConfig, Submitted};
pub use relay::{
    DatasetProvider, DisputeOutcome, InclusionProof, RelayClient, RelayClientConfig,
    SubmittedHeader, VerificationOutcome, VerifyingChain,
};
