//! Calldata layout for the header submission call.
//!
//! Only one function signature is ever parsed: `submitBlock(bytes)`. Its
//! calldata is
//!
//! ```text
//! [0..4)            selector
//! [4..36)           offset of the bytes argument, relative to byte 4
//! [4+off..4+off+32) length word
//! [4+off+32..)      `length` raw header bytes
//! ```
//!
//! This is deliberately not an ABI decoder. When the contract changes the
//! submission signature, add a new layout version next to
//! [`SUBMIT_BLOCK_V1`].

use alloy_primitives::{Bytes, U256};
use thiserror::Error;

/// ABI word size.
pub const WORD: usize = 32;

/// First four bytes of keccak256("Error(string)").
pub const ERROR_STRING_SELECTOR: [u8; 4] = [0x08, 0xc3, 0x79, 0xa0];

/// Layout v1: `submitBlock(bytes)`, selector `0xd5107381`.
pub const SUBMIT_BLOCK_V1: DynamicBytesCall = DynamicBytesCall {
    version: 1,
    signature: "submitBlock(bytes)",
    selector: [0xd5, 0x10, 0x73, 0x81],
};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CallDataError {
    #[error("calldata selector 0x{} does not match {signature} (0x{})", hex::encode(.found), hex::encode(.expected))]
    SelectorMismatch {
        signature: &'static str,
        expected: [u8; 4],
        found: [u8; 4],
    },

    #[error("calldata too short: need {needed} bytes for {what}, have {len}")]
    Truncated {
        what: &'static str,
        needed: usize,
        len: usize,
    },

    #[error("calldata {what} word does not fit in memory: {value}")]
    WordOverflow { what: &'static str, value: U256 },
}

/// A contract call taking a single dynamic `bytes` argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DynamicBytesCall {
    pub version: u8,
    pub signature: &'static str,
    pub selector: [u8; 4],
}

impl DynamicBytesCall {
    /// Encode `selector || offset(0x20) || len || payload || zero padding`.
    pub fn encode(&self, payload: &[u8]) -> Vec<u8> {
        let padded = payload.len().div_ceil(WORD) * WORD;
        let mut out = Vec::with_capacity(4 + 2 * WORD + padded);
        out.extend_from_slice(&self.selector);
        out.extend_from_slice(&U256::from(WORD).to_be_bytes::<32>());
        out.extend_from_slice(&U256::from(payload.len()).to_be_bytes::<32>());
        out.extend_from_slice(payload);
        out.resize(4 + 2 * WORD + padded, 0);
        out
    }

    /// Recover the `bytes` argument from calldata of this call.
    pub fn extract(&self, calldata: &[u8]) -> Result<Bytes, CallDataError> {
        let found: [u8; 4] = calldata
            .get(..4)
            .and_then(|s| s.try_into().ok())
            .ok_or(CallDataError::Truncated {
                what: "selector",
                needed: 4,
                len: calldata.len(),
            })?;
        if found != self.selector {
            return Err(CallDataError::SelectorMismatch {
                signature: self.signature,
                expected: self.selector,
                found,
            });
        }

        let args = &calldata[4..];
        let offset = read_usize(args, 0, "offset")?;
        let length = read_usize(args, offset, "length")?;
        let start = offset
            .checked_add(WORD)
            .ok_or(CallDataError::WordOverflow {
                what: "offset",
                value: U256::from(offset),
            })?;
        let end = start.checked_add(length).ok_or(CallDataError::WordOverflow {
            what: "length",
            value: U256::from(length),
        })?;
        let payload = args.get(start..end).ok_or(CallDataError::Truncated {
            what: "payload",
            needed: end.saturating_add(4),
            len: calldata.len(),
        })?;
        Ok(Bytes::copy_from_slice(payload))
    }
}

/// Read the 32-byte word at `at` as a `usize`.
fn read_usize(args: &[u8], at: usize, what: &'static str) -> Result<usize, CallDataError> {
    let word = read_word(args, at, what)?;
    usize::try_from(word).map_err(|_| CallDataError::WordOverflow { what, value: word })
}

/// Read the 32-byte big-endian word at `at`.
pub fn read_word(data: &[u8], at: usize, what: &'static str) -> Result<U256, CallDataError> {
    let end = at.checked_add(WORD).ok_or(CallDataError::WordOverflow {
        what,
        value: U256::from(at),
    })?;
    let word = data.get(at..end).ok_or(CallDataError::Truncated {
        what,
        needed: end,
        len: data.len(),
    })?;
    Ok(U256::from_be_slice(word))
}

/// Human-readable reason from revert data.
///
/// Decodes `Error(string)` payloads; anything else is rendered as hex.
pub fn revert_reason(data: &[u8]) -> String {
    if data.is_empty() {
        return "execution reverted without reason".to_string();
    }
    if let Some(reason) = decode_error_string(data) {
        return reason;
    }
    format!("execution reverted: 0x{}", hex::encode(data))
}

fn decode_error_string(data: &[u8]) -> Option<String> {
    let args = data.strip_prefix(&ERROR_STRING_SELECTOR[..])?;
    let offset = read_usize(args, 0, "offset").ok()?;
    let length = read_usize(args, offset, "length").ok()?;
    let start = offset.checked_add(WORD)?;
    let raw = args.get(start..start.checked_add(length)?)?;
    Some(String::from_utf8_lossy(raw).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn error_string(reason: &str) -> Vec<u8> {
        let mut out = ERROR_STRING_SELECTOR.to_vec();
        out.extend_from_slice(&U256::from(32).to_be_bytes::<32>());
        out.extend_from_slice(&U256::from(reason.len()).to_be_bytes::<32>());
        out.extend_from_slice(reason.as_bytes());
        out.resize(out.len().div_ceil(32) * 32 + 4, 0);
        out
    }

    #[test]
    fn encode_then_extract() {
        let payload: Vec<u8> = (0..70u8).collect();
        let calldata = SUBMIT_BLOCK_V1.encode(&payload);
        assert_eq!(&calldata[..4], &[0xd5, 0x10, 0x73, 0x81]);
        assert_eq!(calldata.len(), 4 + 64 + 96);
        assert_eq!(SUBMIT_BLOCK_V1.extract(&calldata).unwrap().as_ref(), &payload[..]);
    }

    #[test]
    fn extract_honours_non_canonical_offset() {
        // Offset 0x40 with a junk word before the length word.
        let mut calldata = SUBMIT_BLOCK_V1.selector.to_vec();
        calldata.extend_from_slice(&U256::from(64).to_be_bytes::<32>());
        calldata.extend_from_slice(&[0xaa; 32]);
        calldata.extend_from_slice(&U256::from(3).to_be_bytes::<32>());
        calldata.extend_from_slice(&[1, 2, 3]);

        assert_eq!(SUBMIT_BLOCK_V1.extract(&calldata).unwrap().as_ref(), &[1, 2, 3]);
    }

    #[test]
    fn extract_rejects_other_selector() {
        let mut calldata = SUBMIT_BLOCK_V1.encode(&[1, 2, 3]);
        calldata[0] = 0x00;
        let err = SUBMIT_BLOCK_V1.extract(&calldata).unwrap_err();
        assert_eq!(
            err,
            CallDataError::SelectorMismatch {
                signature: "submitBlock(bytes)",
                expected: [0xd5, 0x10, 0x73, 0x81],
                found: [0x00, 0x10, 0x73, 0x81],
            }
        );
    }

    #[test]
    fn extract_rejects_truncated_words() {
        assert!(matches!(
            SUBMIT_BLOCK_V1.extract(&[0xd5, 0x10]),
            Err(CallDataError::Truncated { what: "selector", .. })
        ));

        let calldata = SUBMIT_BLOCK_V1.encode(&[9; 40]);
        assert!(matches!(
            SUBMIT_BLOCK_V1.extract(&calldata[..20]),
            Err(CallDataError::Truncated { what: "offset", .. })
        ));
        assert!(matches!(
            SUBMIT_BLOCK_V1.extract(&calldata[..40]),
            Err(CallDataError::Truncated { what: "length", .. })
        ));
        assert!(matches!(
            SUBMIT_BLOCK_V1.extract(&calldata[..90]),
            Err(CallDataError::Truncated { what: "payload", .. })
        ));
    }

    #[test]
    fn extract_rejects_huge_offset() {
        let mut calldata = SUBMIT_BLOCK_V1.selector.to_vec();
        calldata.extend_from_slice(&U256::MAX.to_be_bytes::<32>());
        assert!(matches!(
            SUBMIT_BLOCK_V1.extract(&calldata),
            Err(CallDataError::WordOverflow { what: "offset", .. })
        ));
    }

    #[test]
    fn revert_reason_decodes_error_string() {
        assert_eq!(revert_reason(&error_string("stake too low")), "stake too low");
    }

    #[test]
    fn revert_reason_falls_back_to_hex() {
        assert_eq!(revert_reason(&[]), "execution reverted without reason");
        assert_eq!(revert_reason(&[0xde, 0xad]), "execution reverted: 0xdead");
    }
}
