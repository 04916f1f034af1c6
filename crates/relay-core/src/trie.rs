//! Merkle-Patricia inclusion proofs for transactions and receipts.
//!
//! ## Building
//!
//! The transactions and receipts tries of a block are keyed by `rlp(index)`.
//! [`build_proof`] rebuilds the whole trie with [`HashBuilder`], checks the
//! rebuilt root against the root the header commits to, and retains the
//! root-to-leaf node sequence for the target index.
//!
//! ## Verification Steps
//!
//! [`verify_proof`] replays such a sequence the way the relay contract does:
//!
//! 1. The first node must hash to the root.
//! 2. Branch nodes consume one nibble of the path; extension nodes consume
//!    their shared prefix; a leaf must match the rest of the path exactly.
//! 3. Child references are either 32-byte hashes of the next proof node or
//!    nodes shorter than 32 bytes embedded inline in their parent.
//! 4. The value found at the end of the path must equal the expected value,
//!    and no proof nodes may be left over.

use alloy_primitives::{keccak256, Bytes, B256};
use alloy_trie::{proof::ProofRetainer, HashBuilder, Nibbles};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TrieError {
    #[error("no value at index {index}: the block has {len} entries")]
    IndexOutOfRange { index: u64, len: usize },

    #[error("trie root mismatch: header commits to {expected}, rebuilt {computed}")]
    RootMismatch { expected: B256, computed: B256 },

    #[error("no proof nodes retained for path {path}")]
    LeafNotFound { path: Bytes },

    #[error("empty proof")]
    EmptyProof,

    #[error("proof rejected: {0}")]
    ProofRejected(String),
}

/// Which root a proof is anchored in. Discriminants match the contract's
/// verification entry points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrieKind {
    Transaction = 0,
    Receipt = 1,
    State = 2,
}

impl std::fmt::Display for TrieKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Transaction => "transaction",
            Self::Receipt => "receipt",
            Self::State => "state",
        };
        f.write_str(name)
    }
}

/// Inclusion proof of one trie value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleProof {
    pub root: B256,
    /// Trie key, `rlp(index)`.
    pub path: Bytes,
    pub value: Bytes,
    /// Root first, leaf last.
    pub nodes: Vec<Bytes>,
}

impl MerkleProof {
    /// RLP list of the proof nodes, each as a byte string.
    pub fn encoded_nodes(&self) -> Vec<u8> {
        alloy_rlp::encode(&self.nodes)
    }

    pub fn verify(&self) -> Result<(), TrieError> {
        verify_proof(self.root, &self.path, &self.value, &self.nodes)
    }
}

/// Trie key of the `index`-th transaction or receipt.
pub fn index_key(index: u64) -> Vec<u8> {
    alloy_rlp::encode(index)
}

/// Root of the trie mapping `rlp(i)` to `values[i]`.
pub fn ordered_trie_root<V: AsRef<[u8]>>(values: &[V]) -> B256 {
    let mut builder = HashBuilder::default();
    for (key, value) in sorted_entries(values) {
        builder.add_leaf(key, value);
    }
    builder.root()
}

/// Build the proof for `values[index]` and check the rebuilt root against
/// `expected_root`.
pub fn build_proof<V: AsRef<[u8]>>(
    values: &[V],
    index: u64,
    expected_root: B256,
) -> Result<MerkleProof, TrieError> {
    let value = usize::try_from(index)
        .ok()
        .and_then(|i| values.get(i))
        .ok_or(TrieError::IndexOutOfRange {
            index,
            len: values.len(),
        })?;

    let path = index_key(index);
    let target = Nibbles::unpack(&path);
    let retainer = ProofRetainer::new(vec![target.clone()]);
    let mut builder = HashBuilder::default().with_proof_retainer(retainer);
    for (key, leaf) in sorted_entries(values) {
        builder.add_leaf(key, leaf);
    }

    let computed = builder.root();
    if computed != expected_root {
        return Err(TrieError::RootMismatch {
            expected: expected_root,
            computed,
        });
    }

    let nodes: Vec<Bytes> = builder
        .take_proof_nodes()
        .matching_nodes_sorted(&target)
        .into_iter()
        .map(|(_, node)| node)
        .collect();
    if nodes.is_empty() {
        return Err(TrieError::LeafNotFound { path: path.into() });
    }

    let proof = MerkleProof {
        root: computed,
        path: path.into(),
        value: Bytes::copy_from_slice(value.as_ref()),
        nodes,
    };
    proof.verify()?;
    Ok(proof)
}

fn sorted_entries<V: AsRef<[u8]>>(values: &[V]) -> Vec<(Nibbles, &[u8])> {
    let mut entries: Vec<(Nibbles, &[u8])> = (0u64..)
        .zip(values)
        .map(|(i, v)| (Nibbles::unpack(index_key(i)), v.as_ref()))
        .collect();
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    entries
}

/// Verify that `value` is stored under `path` in the trie with `root`.
pub fn verify_proof(
    root: B256,
    path: &[u8],
    value: &[u8],
    nodes: &[Bytes],
) -> Result<(), TrieError> {
    if nodes.is_empty() {
        return Err(TrieError::EmptyProof);
    }

    let key = bytes_to_nibbles(path);
    let mut key_idx = 0;
    let mut next_node = 0;
    let mut target = NodeRef::Hash(root);

    loop {
        let node: &[u8] = match target {
            NodeRef::Hash(expected) => {
                let node = nodes.get(next_node).ok_or_else(|| {
                    TrieError::ProofRejected("proof ended before reaching the value".to_string())
                })?;
                let got = keccak256(node);
                if got != expected {
                    return Err(TrieError::ProofRejected(format!(
                        "node {next_node} hash mismatch: expected {expected}, got {got}"
                    )));
                }
                next_node += 1;
                node
            }
            NodeRef::Inline(node) => {
                // Some provers also list embedded nodes on their own.
                if nodes.get(next_node).is_some_and(|n| n.as_ref() == node) {
                    next_node += 1;
                }
                node
            }
        };

        let items = node_items(node)?;
        match items.len() {
            17 => {
                if key_idx == key.len() {
                    check_value(&items[16], value)?;
                    return check_consumed(next_node, nodes.len());
                }
                let nibble = usize::from(key[key_idx]);
                key_idx += 1;
                target = child_ref(&items[nibble])?.ok_or_else(|| {
                    TrieError::ProofRejected(format!("branch has no child at nibble {nibble:x}"))
                })?;
            }
            2 => {
                let (node_path, is_leaf) = hp_decode(items[0].payload)?;
                let remaining = &key[key_idx..];
                if is_leaf {
                    if node_path != remaining {
                        return Err(TrieError::ProofRejected(format!(
                            "leaf path mismatch: expected {remaining:?}, got {node_path:?}"
                        )));
                    }
                    check_value(&items[1], value)?;
                    return check_consumed(next_node, nodes.len());
                }
                if !remaining.starts_with(&node_path) {
                    return Err(TrieError::ProofRejected(format!(
                        "extension path mismatch: {node_path:?} is not a prefix of {remaining:?}"
                    )));
                }
                key_idx += node_path.len();
                target = child_ref(&items[1])?.ok_or_else(|| {
                    TrieError::ProofRejected("extension node without child".to_string())
                })?;
            }
            n => {
                return Err(TrieError::ProofRejected(format!(
                    "invalid node item count: {n}"
                )))
            }
        }
    }
}

enum NodeRef<'a> {
    Hash(B256),
    Inline(&'a [u8]),
}

/// One RLP item of a trie node.
struct Item<'a> {
    list: bool,
    payload: &'a [u8],
    raw: &'a [u8],
}

fn node_items(node: &[u8]) -> Result<Vec<Item<'_>>, TrieError> {
    let reject = |e: alloy_rlp::Error| TrieError::ProofRejected(format!("invalid node RLP: {e}"));

    let mut buf = node;
    let header = alloy_rlp::Header::decode(&mut buf).map_err(reject)?;
    if !header.list {
        return Err(TrieError::ProofRejected("node is not a list".to_string()));
    }
    if buf.len() != header.payload_length {
        return Err(TrieError::ProofRejected(format!(
            "node declares {} payload bytes, has {}",
            header.payload_length,
            buf.len()
        )));
    }

    let mut items = Vec::with_capacity(17);
    while !buf.is_empty() {
        let start = buf;
        let item = alloy_rlp::Header::decode(&mut buf).map_err(reject)?;
        if buf.len() < item.payload_length {
            return Err(TrieError::ProofRejected(
                "node item extends past the node".to_string(),
            ));
        }
        let header_len = start.len() - buf.len();
        let (payload, rest) = buf.split_at(item.payload_length);
        items.push(Item {
            list: item.list,
            payload,
            raw: &start[..header_len + item.payload_length],
        });
        buf = rest;
    }
    Ok(items)
}

fn child_ref<'a>(item: &Item<'a>) -> Result<Option<NodeRef<'a>>, TrieError> {
    if item.list {
        return Ok(Some(NodeRef::Inline(item.raw)));
    }
    match item.payload.len() {
        0 => Ok(None),
        32 => Ok(Some(NodeRef::Hash(B256::from_slice(item.payload)))),
        n => Err(TrieError::ProofRejected(format!(
            "child reference of {n} bytes"
        ))),
    }
}

fn check_value(item: &Item<'_>, value: &[u8]) -> Result<(), TrieError> {
    if item.list || item.payload != value {
        return Err(TrieError::ProofRejected(
            "value at the end of the path does not match".to_string(),
        ));
    }
    Ok(())
}

fn check_consumed(used: usize, total: usize) -> Result<(), TrieError> {
    if used != total {
        return Err(TrieError::ProofRejected(format!(
            "{} proof nodes left after the value",
            total - used
        )));
    }
    Ok(())
}

/// Convert key bytes to nibbles.
pub(crate) fn bytes_to_nibbles(bytes: &[u8]) -> Vec<u8> {
    let mut nibbles = Vec::with_capacity(bytes.len() * 2);
    for b in bytes {
        nibbles.push(b >> 4);
        nibbles.push(b & 0x0f);
    }
    nibbles
}

/// Decode a hex-prefix encoded path.
/// Returns (nibbles, is_leaf)
pub(crate) fn hp_decode(encoded: &[u8]) -> Result<(Vec<u8>, bool), TrieError> {
    let Some((&first, rest)) = encoded.split_first() else {
        return Err(TrieError::ProofRejected("empty node path".to_string()));
    };

    let flags = first >> 4;
    if flags > 3 {
        return Err(TrieError::ProofRejected(format!(
            "invalid hex-prefix flags {flags:#x}"
        )));
    }
    let is_odd = flags & 0x01 != 0;
    let is_leaf = flags & 0x02 != 0;

    let mut nibbles = Vec::with_capacity(rest.len() * 2 + 1);
    if is_odd {
        nibbles.push(first & 0x0f);
    }
    nibbles.extend(bytes_to_nibbles(rest));
    Ok((nibbles, is_leaf))
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_rlp::Decodable;
    use alloy_trie::EMPTY_ROOT_HASH;

    /// Values long enough that every leaf is referenced by hash.
    fn tx_like(count: usize) -> Vec<Vec<u8>> {
        (0..count)
            .map(|i| {
                let seed = u8::try_from(i % 251).unwrap();
                let mut v = vec![0xf8, 0x6c];
                v.extend((0..108u8).map(|j| seed.wrapping_mul(31).wrapping_add(j)));
                v
            })
            .collect()
    }

    #[test]
    fn test_index_key() {
        assert_eq!(index_key(0), vec![0x80]);
        assert_eq!(index_key(1), vec![0x01]);
        assert_eq!(index_key(127), vec![0x7f]);
        assert_eq!(index_key(128), vec![0x81, 0x80]);
        assert_eq!(index_key(255), vec![0x81, 0xff]);
        assert_eq!(index_key(256), vec![0x82, 0x01, 0x00]);
    }

    #[test]
    fn test_bytes_to_nibbles() {
        assert_eq!(bytes_to_nibbles(&[0xab, 0xcd]), vec![0x0a, 0x0b, 0x0c, 0x0d]);
        assert_eq!(bytes_to_nibbles(&[0x00]), vec![0x00, 0x00]);
    }

    #[test]
    fn test_hp_decode() {
        let (nibbles, is_leaf) = hp_decode(&[0x00, 0xab, 0xcd]).unwrap();
        assert_eq!(nibbles, vec![0x0a, 0x0b, 0x0c, 0x0d]);
        assert!(!is_leaf);

        let (nibbles, is_leaf) = hp_decode(&[0x1a, 0xbc]).unwrap();
        assert_eq!(nibbles, vec![0x0a, 0x0b, 0x0c]);
        assert!(!is_leaf);

        let (nibbles, is_leaf) = hp_decode(&[0x20, 0xab]).unwrap();
        assert_eq!(nibbles, vec![0x0a, 0x0b]);
        assert!(is_leaf);

        let (nibbles, is_leaf) = hp_decode(&[0x3a]).unwrap();
        assert_eq!(nibbles, vec![0x0a]);
        assert!(is_leaf);

        assert!(hp_decode(&[]).is_err());
        assert!(hp_decode(&[0x40]).is_err());
    }

    #[test]
    fn empty_block_has_empty_root() {
        let values: Vec<Vec<u8>> = Vec::new();
        assert_eq!(ordered_trie_root(&values), EMPTY_ROOT_HASH);
        assert_eq!(
            build_proof(&values, 0, EMPTY_ROOT_HASH),
            Err(TrieError::IndexOutOfRange { index: 0, len: 0 })
        );
    }

    #[test]
    fn single_value_proof_is_one_node() {
        let values = tx_like(1);
        let root = ordered_trie_root(&values);
        let proof = build_proof(&values, 0, root).unwrap();
        assert_eq!(proof.nodes.len(), 1);
        assert_eq!(proof.path.as_ref(), &[0x80]);
        assert_eq!(proof.value.as_ref(), &values[0][..]);
    }

    #[test]
    fn every_index_proves_against_rebuilt_root() {
        for count in [2usize, 3, 17, 130] {
            let values = tx_like(count);
            let root = ordered_trie_root(&values);
            for index in 0..count {
                let index = u64::try_from(index).unwrap();
                let proof = build_proof(&values, index, root).unwrap();
                assert_eq!(proof.root, root);
                assert_eq!(proof.path.as_ref(), &index_key(index)[..]);
                verify_proof(root, &proof.path, &proof.value, &proof.nodes).unwrap();
            }
        }
    }

    #[test]
    fn small_values_use_inline_nodes() {
        let values: Vec<Vec<u8>> = (0..5u8).map(|i| vec![i + 1]).collect();
        let root = ordered_trie_root(&values);
        for index in 0..5u64 {
            build_proof(&values, index, root).unwrap();
        }
    }

    #[test]
    fn root_mismatch_is_reported() {
        let values = tx_like(3);
        let wrong = B256::repeat_byte(0x99);
        let err = build_proof(&values, 1, wrong).unwrap_err();
        assert_eq!(
            err,
            TrieError::RootMismatch {
                expected: wrong,
                computed: ordered_trie_root(&values),
            }
        );
    }

    #[test]
    fn corrupted_middle_node_is_rejected() {
        let values = tx_like(3);
        let root = ordered_trie_root(&values);
        let proof = build_proof(&values, 1, root).unwrap();
        assert!(proof.nodes.len() >= 3);

        let middle = proof.nodes.len() / 2;
        let len = proof.nodes[middle].len();
        for pos in [0, len / 2, len - 1] {
            let mut nodes = proof.nodes.clone();
            let mut node = nodes[middle].to_vec();
            node[pos] ^= 0x01;
            nodes[middle] = node.into();
            assert!(matches!(
                verify_proof(root, &proof.path, &proof.value, &nodes),
                Err(TrieError::ProofRejected(_))
            ));
        }
    }

    #[test]
    fn wrong_value_or_path_is_rejected() {
        let values = tx_like(3);
        let root = ordered_trie_root(&values);
        let proof = build_proof(&values, 1, root).unwrap();

        assert!(verify_proof(root, &proof.path, &values[2], &proof.nodes).is_err());
        assert!(verify_proof(root, &index_key(2), &proof.value, &proof.nodes).is_err());
        assert_eq!(
            verify_proof(root, &proof.path, &proof.value, &[]),
            Err(TrieError::EmptyProof)
        );
    }

    #[test]
    fn trailing_nodes_are_rejected() {
        let values = tx_like(3);
        let root = ordered_trie_root(&values);
        let proof = build_proof(&values, 1, root).unwrap();

        let mut nodes = proof.nodes.clone();
        nodes.push(Bytes::from_static(&[0xde, 0xad]));
        assert!(matches!(
            verify_proof(root, &proof.path, &proof.value, &nodes),
            Err(TrieError::ProofRejected(_))
        ));

        let mut doubled = proof.nodes.clone();
        doubled.extend(proof.nodes.iter().cloned());
        assert!(verify_proof(root, &proof.path, &proof.value, &doubled).is_err());
    }

    #[test]
    fn encoded_nodes_is_a_list_of_strings() {
        let values = tx_like(3);
        let root = ordered_trie_root(&values);
        let proof = build_proof(&values, 2, root).unwrap();

        let encoded = proof.encoded_nodes();
        let decoded = Vec::<Bytes>::decode(&mut encoded.as_slice()).unwrap();
        assert_eq!(decoded, proof.nodes);
    }
}
