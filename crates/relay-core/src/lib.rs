#![forbid(unsafe_code)]
#![deny(clippy::float_arithmetic)]
#![deny(clippy::cast_possible_truncation)]
#![deny(clippy::cast_possible_wrap)]
#![deny(clippy::cast_sign_loss)]

//! Core primitives for the PoW relay client.
//!
//! Everything in this crate is pure and synchronous: header encoding, the
//! submission calldata layout, receipt encoding, Merkle-Patricia proofs and
//! the proof-of-work dispute inputs. Chain access lives in `relay-client`.

pub mod calldata;
pub mod header;
pub mod pow;
pub mod receipt;
pub mod trie;

pub use calldata::{revert_reason, CallDataError, DynamicBytesCall, SUBMIT_BLOCK_V1};
pub use header::{Header, HeaderError};
pub use pow::{DatasetProof, DatasetQuery, EpochChunk, EpochData, PowError, EPOCH_CHUNK_SIZE};
pub use receipt::{Log, Receipt, ReceiptOutcome};
pub use trie::{
    build_proof, index_key, ordered_trie_root, verify_proof, MerkleProof, TrieError, TrieKind,
};
