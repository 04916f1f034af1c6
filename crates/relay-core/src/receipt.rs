//! Transaction receipts and their consensus encoding.
//!
//! The receipts trie stores `rlp([outcome, cumulative_gas_used, logs_bloom, logs])`
//! for legacy receipts and `type || rlp(...)` for EIP-2718 typed receipts.
//! `outcome` is the status byte after Byzantium and the intermediate state
//! root before it.

use alloy_primitives::{Address, Bloom, Bytes, B256};
use alloy_rlp::{BufMut, Encodable};
use serde::{Deserialize, Serialize};

/// Ethereum log entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Log {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
}

impl Log {
    fn payload_length(&self) -> usize {
        self.address.length() + self.topics.length() + self.data.length()
    }
}

impl Encodable for Log {
    fn encode(&self, out: &mut dyn BufMut) {
        alloy_rlp::Header {
            list: true,
            payload_length: self.payload_length(),
        }
        .encode(out);
        self.address.encode(out);
        self.topics.encode(out);
        self.data.encode(out);
    }

    fn length(&self) -> usize {
        let payload_length = self.payload_length();
        payload_length + alloy_rlp::length_of_length(payload_length)
    }
}

/// First field of a receipt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReceiptOutcome {
    /// Post-Byzantium execution status.
    Status(bool),
    /// Pre-Byzantium intermediate state root.
    PostState(B256),
}

impl ReceiptOutcome {
    pub fn succeeded(&self) -> bool {
        match self {
            Self::Status(ok) => *ok,
            // No status before Byzantium; inclusion is all a receipt says.
            Self::PostState(_) => true,
        }
    }
}

impl Encodable for ReceiptOutcome {
    fn encode(&self, out: &mut dyn BufMut) {
        match self {
            // `true` is the single byte 0x01, `false` the empty string.
            Self::Status(ok) => ok.encode(out),
            Self::PostState(root) => root.encode(out),
        }
    }

    fn length(&self) -> usize {
        match self {
            Self::Status(ok) => ok.length(),
            Self::PostState(root) => root.length(),
        }
    }
}

/// Receipt fields that go into the receipts trie, plus its location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub transaction_hash: B256,
    pub transaction_index: u64,
    pub block_hash: B256,
    pub block_number: u64,
    /// EIP-2718 type; 0 for legacy.
    pub tx_type: u8,
    pub outcome: ReceiptOutcome,
    pub cumulative_gas_used: u64,
    pub logs_bloom: Bloom,
    pub logs: Vec<Log>,
}

impl Receipt {
    pub fn succeeded(&self) -> bool {
        self.outcome.succeeded()
    }

    /// Consensus encoding, as stored in the receipts trie.
    pub fn encode_consensus(&self) -> Vec<u8> {
        let payload_length = self.outcome.length()
            + self.cumulative_gas_used.length()
            + self.logs_bloom.length()
            + self.logs.length();

        let mut out = Vec::with_capacity(payload_length + 8);
        if self.tx_type != 0 {
            out.push(self.tx_type);
        }
        alloy_rlp::Header {
            list: true,
            payload_length,
        }
        .encode(&mut out);
        self.outcome.encode(&mut out);
        self.cumulative_gas_used.encode(&mut out);
        self.logs_bloom.encode(&mut out);
        self.logs.encode(&mut out);
        out
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use alloy_primitives::{address, b256, bytes};

    pub(crate) fn sample_receipt(index: u64, tx_type: u8) -> Receipt {
        Receipt {
            transaction_hash: B256::with_last_byte(u8::try_from(index).unwrap_or(0xff)),
            transaction_index: index,
            block_hash: B256::repeat_byte(0x42),
            block_number: 100,
            tx_type,
            outcome: ReceiptOutcome::Status(true),
            cumulative_gas_used: 21_000 * (index + 1),
            logs_bloom: Bloom::ZERO,
            logs: vec![Log {
                address: address!("00000000000000000000000000000000000000aa"),
                topics: vec![b256!(
                    "ddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef"
                )],
                data: bytes!("0000000000000000000000000000000000000000000000000000000000000001"),
            }],
        }
    }

    #[test]
    fn legacy_receipt_is_a_bare_list() {
        let encoded = sample_receipt(0, 0).encode_consensus();
        assert!(encoded[0] >= 0xc0);
    }

    #[test]
    fn typed_receipt_carries_type_prefix() {
        let legacy = sample_receipt(0, 0).encode_consensus();
        let typed = sample_receipt(0, 2).encode_consensus();
        assert_eq!(typed[0], 0x02);
        assert_eq!(&typed[1..], &legacy[..]);
    }

    #[test]
    fn failed_status_encodes_as_empty_string() {
        let mut receipt = sample_receipt(0, 0);
        receipt.logs.clear();
        receipt.outcome = ReceiptOutcome::Status(false);
        let encoded = receipt.encode_consensus();

        let mut buf = &encoded[..];
        let list = alloy_rlp::Header::decode(&mut buf).unwrap();
        assert!(list.list);
        assert_eq!(buf[0], 0x80);
        assert!(!receipt.succeeded());
    }

    #[test]
    fn log_length_matches_encoding() {
        let log = &sample_receipt(0, 0).logs[0];
        let encoded = alloy_rlp::encode(log);
        assert_eq!(encoded.len(), log.length());
    }
}
