#![no_main]
//! Fuzz target for submission calldata parsing.

use libfuzzer_sys::fuzz_target;
use relay_core::{revert_reason, SUBMIT_BLOCK_V1};

fuzz_target!(|data: &[u8]| {
    if let Ok(payload) = SUBMIT_BLOCK_V1.extract(data) {
        assert!(payload.len() <= data.len());
    }
    let _ = revert_reason(data);
});
