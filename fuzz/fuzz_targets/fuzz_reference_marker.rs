//! Fuzz target for Internet-shortcut reference markers.
//!
//! Any marker that decodes must re-encode to a marker that decodes to the
//! same URI.

#![no_main]

use libfuzzer_sys::fuzz_target;
use rob_bundle::{decode_reference_marker, encode_reference_marker};

fuzz_target!(|data: &[u8]| {
    if let Ok(uri) = decode_reference_marker(data) {
        let again = decode_reference_marker(&encode_reference_marker(&uri))
            .expect("re-encoded marker must decode");
        assert_eq!(uri, again);
    }
});
