#![no_main]
//! Fuzz target for Merkle Patricia Trie proof verification.
//!
//! Arbitrary roots, paths and node lists must be rejected without panicking.

use alloy_primitives::{Bytes, B256};
use arbitrary::{Arbitrary, Unstructured};
use libfuzzer_sys::fuzz_target;
use relay_core::verify_proof;

#[derive(Debug, Arbitrary)]
struct FuzzMptInput {
    root: [u8; 32],
    path: Vec<u8>,
    value: Vec<u8>,
    proof_nodes: Vec<Vec<u8>>,
}

fuzz_target!(|data: &[u8]| {
    let mut u = Unstructured::new(data);
    let Ok(input) = FuzzMptInput::arbitrary(&mut u) else {
        return;
    };

    // Bound proof node sizes and count
    if input.proof_nodes.len() > 32 {
        return;
    }
    let total_bytes: usize = input.proof_nodes.iter().map(|n| n.len()).sum();
    if total_bytes > 64 * 1024 {
        return;
    }

    let nodes: Vec<Bytes> = input.proof_nodes.into_iter().map(Bytes::from).collect();
    let _ = verify_proof(B256::from(input.root), &input.path, &input.value, &nodes);
});
