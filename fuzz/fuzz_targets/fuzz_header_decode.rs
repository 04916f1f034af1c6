#![no_main]
//! Fuzz target for PoW header decoding.
//!
//! Decoding must never panic, and anything it accepts must re-encode to the
//! exact input bytes.

use libfuzzer_sys::fuzz_target;
use relay_core::Header;

fuzz_target!(|data: &[u8]| {
    if let Ok(header) = Header::decode(data) {
        assert_eq!(header.encode(), data);
        let _ = header.seal_hash();
    }
});
