//! Block header codec for PoW target chains.
//!
//! The relay contract recomputes hashes from the bytes it is handed, so the
//! encoding produced here must match the target chain byte for byte.
//!
//! ## Field Order (RLP encoding order)
//!
//! 0. parent_hash
//! 1. uncle_hash
//! 2. coinbase
//! 3. state_root
//! 4. transactions_root
//! 5. receipts_root
//! 6. logs_bloom
//! 7. difficulty
//! 8. number
//! 9. gas_limit
//! 10. gas_used
//! 11. timestamp
//! 12. extra_data
//! 13. mix_digest
//! 14. nonce (fixed 8-byte string)
//!
//! The *block hash* is keccak256 over all 15 fields. The *seal hash* covers
//! only fields 0..=12 and keys the ethash dataset lookup during disputes.

use alloy_primitives::{keccak256, Address, Bloom, Bytes, B256, B64, U256};
use alloy_rlp::{BufMut, Decodable, Encodable};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of RLP fields in a sealed header.
pub const SEALED_FIELD_COUNT: usize = 15;

/// Number of RLP fields in the seal-less encoding.
pub const UNSEALED_FIELD_COUNT: usize = 13;

/// Maximum accepted header RLP size.
pub const MAX_HEADER_RLP_SIZE: usize = 8192;

/// Errors from header decoding and hash checks.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HeaderError {
    #[error("malformed header: invalid RLP encoding: {0}")]
    Rlp(String),

    #[error("malformed header: expected an RLP list")]
    NotAList,

    #[error("malformed header: {len} bytes exceeds the {max} byte limit")]
    TooLarge { len: usize, max: usize },

    #[error("malformed header: missing field `{0}`")]
    MissingField(&'static str),

    #[error("malformed header: field `{field}`: {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("malformed header: unexpected data after field `nonce`")]
    ExtraFields,

    #[error("malformed header: {0} trailing bytes after the header list")]
    TrailingBytes(usize),

    #[error("header hash mismatch: expected {expected}, got {got}")]
    HashMismatch { expected: B256, got: B256 },
}

/// PoW block header as submitted to the relay contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub parent_hash: B256,
    pub uncle_hash: B256,
    pub coinbase: Address,
    pub state_root: B256,
    pub transactions_root: B256,
    pub receipts_root: B256,
    pub logs_bloom: Bloom,
    pub difficulty: U256,
    pub number: u64,
    pub gas_limit: u64,
    pub gas_used: u64,
    pub timestamp: u64,
    pub extra_data: Bytes,
    pub mix_digest: B256,
    pub nonce: B64,
}

impl Header {
    /// RLP encoding of all 15 fields.
    pub fn encode(&self) -> Vec<u8> {
        self.encode_with(true)
    }

    /// RLP encoding of the first 13 fields, without `mix_digest` and `nonce`.
    pub fn encode_without_nonce(&self) -> Vec<u8> {
        self.encode_with(false)
    }

    /// keccak256 of [`Header::encode`]; the block hash on the target chain.
    pub fn hash(&self) -> B256 {
        keccak256(self.encode())
    }

    /// keccak256 of [`Header::encode_without_nonce`].
    pub fn seal_hash(&self) -> B256 {
        keccak256(self.encode_without_nonce())
    }

    /// The nonce as the integer the dataset lookup is keyed on.
    pub fn nonce_value(&self) -> u64 {
        u64::from_be_bytes(self.nonce.0)
    }

    pub fn verify_hash(&self, expected: &B256) -> Result<(), HeaderError> {
        let got = self.hash();
        if &got != expected {
            return Err(HeaderError::HashMismatch {
                expected: *expected,
                got,
            });
        }
        Ok(())
    }

    /// Copy with the transactions, receipts and state roots rotated.
    ///
    /// The seal fields are kept, so the proof of work no longer covers the
    /// header and the relay accepts it only until it is disputed. Used to
    /// exercise disputes on test networks.
    pub fn randomized(&self) -> Self {
        Self {
            transactions_root: self.receipts_root,
            receipts_root: self.state_root,
            state_root: self.transactions_root,
            ..self.clone()
        }
    }

    /// Decode a sealed header. Exact inverse of [`Header::encode`].
    pub fn decode(bytes: &[u8]) -> Result<Self, HeaderError> {
        if bytes.len() > MAX_HEADER_RLP_SIZE {
            return Err(HeaderError::TooLarge {
                len: bytes.len(),
                max: MAX_HEADER_RLP_SIZE,
            });
        }

        let mut buf = bytes;
        let list = alloy_rlp::Header::decode(&mut buf).map_err(|e| HeaderError::Rlp(e.to_string()))?;
        if !list.list {
            return Err(HeaderError::NotAList);
        }
        if buf.len() < list.payload_length {
            return Err(HeaderError::Rlp(format!(
                "list declares {} payload bytes, {} available",
                list.payload_length,
                buf.len()
            )));
        }
        let (mut payload, rest) = buf.split_at(list.payload_length);
        if !rest.is_empty() {
            return Err(HeaderError::TrailingBytes(rest.len()));
        }

        let header = Self {
            parent_hash: take(&mut payload, "parent_hash")?,
            uncle_hash: take(&mut payload, "uncle_hash")?,
            coinbase: take(&mut payload, "coinbase")?,
            state_root: take(&mut payload, "state_root")?,
            transactions_root: take(&mut payload, "transactions_root")?,
            receipts_root: take(&mut payload, "receipts_root")?,
            logs_bloom: take(&mut payload, "logs_bloom")?,
            difficulty: take(&mut payload, "difficulty")?,
            number: take(&mut payload, "number")?,
            gas_limit: take(&mut payload, "gas_limit")?,
            gas_used: take(&mut payload, "gas_used")?,
            timestamp: take(&mut payload, "timestamp")?,
            extra_data: take(&mut payload, "extra_data")?,
            mix_digest: take(&mut payload, "mix_digest")?,
            nonce: take(&mut payload, "nonce")?,
        };

        if !payload.is_empty() {
            return Err(HeaderError::ExtraFields);
        }
        Ok(header)
    }

    fn payload_length(&self, sealed: bool) -> usize {
        let mut len = self.parent_hash.length()
            + self.uncle_hash.length()
            + self.coinbase.length()
            + self.state_root.length()
            + self.transactions_root.length()
            + self.receipts_root.length()
            + self.logs_bloom.length()
            + self.difficulty.length()
            + self.number.length()
            + self.gas_limit.length()
            + self.gas_used.length()
            + self.timestamp.length()
            + self.extra_data.length();
        if sealed {
            len += self.mix_digest.length() + self.nonce.length();
        }
        len
    }

    fn encode_with(&self, sealed: bool) -> Vec<u8> {
        let payload_length = self.payload_length(sealed);
        let mut out = Vec::with_capacity(payload_length + 4);
        self.encode_fields(&mut out, payload_length, sealed);
        out
    }

    fn encode_fields(&self, out: &mut dyn BufMut, payload_length: usize, sealed: bool) {
        alloy_rlp::Header {
            list: true,
            payload_length,
        }
        .encode(out);
        self.parent_hash.encode(out);
        self.uncle_hash.encode(out);
        self.coinbase.encode(out);
        self.state_root.encode(out);
        self.transactions_root.encode(out);
        self.receipts_root.encode(out);
        self.logs_bloom.encode(out);
        self.difficulty.encode(out);
        self.number.encode(out);
        self.gas_limit.encode(out);
        self.gas_used.encode(out);
        self.timestamp.encode(out);
        self.extra_data.encode(out);
        if sealed {
            self.mix_digest.encode(out);
            self.nonce.encode(out);
        }
    }
}

fn take<T: Decodable>(buf: &mut &[u8], field: &'static str) -> Result<T, HeaderError> {
    if buf.is_empty() {
        return Err(HeaderError::MissingField(field));
    }
    T::decode(buf).map_err(|e| HeaderError::InvalidField {
        field,
        reason: e.to_string(),
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use alloy_primitives::{address, b256, bytes, hex};

    /// Mainnet block 1.
    pub(crate) fn block_one() -> Header {
        Header {
            parent_hash: b256!("d4e56740f876aef8c010b86a40d5f56745a118d0906a34e69aec8c0db1cb8fa3"),
            uncle_hash: b256!("1dcc4de8dec75d7aab85b567b6ccd41ad312451b948a7413f0a142fd40d49347"),
            coinbase: address!("05a56e2d52c817161883f50c441c3228cfe54d9f"),
            state_root: b256!("d67e4d450343046425ae4271474353857ab860dbc0a1dde64b41b5cd3a532bf3"),
            transactions_root: b256!(
                "56e81f171bcc55a6ff8345e692c0f86e5b48e01b996cadc001622fb5e363b421"
            ),
            receipts_root: b256!("56e81f171bcc55a6ff8345e692c0f86e5b48e01b996cadc001622fb5e363b421"),
            logs_bloom: Bloom::ZERO,
            difficulty: U256::from(17_171_480_576_u64),
            number: 1,
            gas_limit: 5000,
            gas_used: 0,
            timestamp: 1_438_269_988,
            extra_data: bytes!("476574682f76312e302e302f6c696e75782f676f312e342e32"),
            mix_digest: b256!("969b900de27b6ac6a67742365dd65f55a0526c41fd18e1b16f1a1215c2e66f59"),
            nonce: B64::new(hex!("539bd4979fef1ec4")),
        }
    }

    fn strip_list_header(encoded: &[u8]) -> &[u8] {
        let mut buf = encoded;
        let list = alloy_rlp::Header::decode(&mut buf).unwrap();
        assert!(list.list);
        buf
    }

    #[test]
    fn rlp_roundtrip() {
        let header = block_one();
        let rlp = header.encode();
        let decoded = Header::decode(&rlp).expect("decode");
        assert_eq!(decoded, header);
    }

    #[test]
    fn mainnet_block_one_hashes() {
        let header = block_one();
        assert_eq!(header.encode().len(), 532);
        assert_eq!(
            header.hash(),
            b256!("88e96d4537bea4d9c05d12549907b32561d3bf31f45aae734cdc119f13406cb6")
        );
        assert_eq!(
            header.seal_hash(),
            b256!("85913a3057ea8bec78cd916871ca73802e77724e014dda65add3405d02240eb7")
        );
        assert_eq!(header.nonce_value(), 0x539b_d497_9fef_1ec4);
    }

    #[test]
    fn encoding_is_deterministic() {
        let header = block_one();
        assert_eq!(header.encode(), header.clone().encode());
        assert_eq!(header.encode_without_nonce(), header.encode_without_nonce());
    }

    #[test]
    fn seal_encoding_ignores_mix_digest_and_nonce() {
        let header = block_one();
        let mut resealed = block_one();
        resealed.mix_digest = B256::repeat_byte(0xee);
        resealed.nonce = B64::repeat_byte(0x01);

        assert_eq!(header.encode_without_nonce(), resealed.encode_without_nonce());
        assert_eq!(header.seal_hash(), resealed.seal_hash());
        assert_ne!(header.hash(), resealed.hash());
    }

    #[test]
    fn seal_encoding_is_a_field_prefix_of_full_encoding() {
        let header = block_one();
        let full = header.encode();
        let unsealed = header.encode_without_nonce();

        let full_payload = strip_list_header(&full);
        let unsealed_payload = strip_list_header(&unsealed);
        assert!(full_payload.starts_with(unsealed_payload));

        let mut tail = &full_payload[unsealed_payload.len()..];
        assert_eq!(B256::decode(&mut tail).unwrap(), header.mix_digest);
        assert_eq!(B64::decode(&mut tail).unwrap(), header.nonce);
        assert!(tail.is_empty());
    }

    #[test]
    fn nonce_is_fixed_width() {
        let mut header = block_one();
        header.nonce = B64::ZERO;
        let rlp = header.encode();
        assert_eq!(&rlp[rlp.len() - 9..], &[0x88, 0, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(Header::decode(&rlp).unwrap(), header);
    }

    #[test]
    fn header_hash_changes_with_field() {
        let header1 = block_one();
        let mut header2 = block_one();
        header2.number = 2;
        assert_ne!(header1.hash(), header2.hash());
    }

    #[test]
    fn verify_hash_failure() {
        let header = block_one();
        assert!(header.verify_hash(&header.hash()).is_ok());
        let result = header.verify_hash(&B256::repeat_byte(0xff));
        assert!(matches!(result, Err(HeaderError::HashMismatch { .. })));
    }

    #[test]
    fn decode_rejects_string_payload() {
        let result = Header::decode(&[0x83, 0x01, 0x02, 0x03]);
        assert_eq!(result, Err(HeaderError::NotAList));
    }

    #[test]
    fn decode_rejects_trailing_bytes() {
        let mut rlp = block_one().encode();
        rlp.push(0x00);
        assert_eq!(Header::decode(&rlp), Err(HeaderError::TrailingBytes(1)));
    }

    #[test]
    fn decode_rejects_truncated_input() {
        let rlp = block_one().encode();
        let result = Header::decode(&rlp[..rlp.len() - 4]);
        assert!(matches!(result, Err(HeaderError::Rlp(_))));
    }

    #[test]
    fn decode_rejects_unsealed_encoding() {
        let rlp = block_one().encode_without_nonce();
        assert_eq!(
            Header::decode(&rlp),
            Err(HeaderError::MissingField("mix_digest"))
        );
    }

    #[test]
    fn decode_rejects_extra_field() {
        let header = block_one();
        let payload = strip_list_header(&header.encode()).to_vec();
        let mut extended = payload.clone();
        7u64.encode(&mut extended);

        let mut rlp = Vec::new();
        alloy_rlp::Header {
            list: true,
            payload_length: extended.len(),
        }
        .encode(&mut rlp);
        rlp.extend_from_slice(&extended);

        assert_eq!(Header::decode(&rlp), Err(HeaderError::ExtraFields));
    }

    #[test]
    fn randomized_header_keeps_seal_but_changes_hash() {
        let header = block_one();
        let forged = header.randomized();

        assert_eq!(forged.transactions_root, header.receipts_root);
        assert_eq!(forged.receipts_root, header.state_root);
        assert_eq!(forged.state_root, header.transactions_root);
        assert_eq!(forged.mix_digest, header.mix_digest);
        assert_eq!(forged.nonce, header.nonce);
        assert_eq!(forged.number, header.number);
        assert_ne!(forged.hash(), header.hash());
        assert_ne!(forged.seal_hash(), header.seal_hash());
        assert_eq!(Header::decode(&forged.encode()).unwrap(), forged);
    }

    #[test]
    fn decode_rejects_short_hash_field() {
        let header = block_one();
        let encoded = header.encode();
        let payload = strip_list_header(&encoded);
        // Replace parent_hash (33 bytes) with a 31-byte string.
        let mut patched = vec![0x9f];
        patched.extend_from_slice(&[0x11; 31]);
        patched.extend_from_slice(&payload[33..]);

        let mut rlp = Vec::new();
        alloy_rlp::Header {
            list: true,
            payload_length: patched.len(),
        }
        .encode(&mut rlp);
        rlp.extend_from_slice(&patched);

        assert!(matches!(
            Header::decode(&rlp),
            Err(HeaderError::InvalidField {
                field: "parent_hash",
                ..
            })
        ));
    }

    #[test]
    fn decode_rejects_oversized_input() {
        let bytes = vec![0u8; MAX_HEADER_RLP_SIZE + 1];
        assert!(matches!(
            Header::decode(&bytes),
            Err(HeaderError::TooLarge { .. })
        ));
    }

    #[test]
    fn serde_json_roundtrip() {
        let header = block_one();
        let json = serde_json::to_string(&header).unwrap();
        let parsed: Header = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, header);
    }
}
