//! Fuzz target for opening bundle archives into a working tree.
//!
//! Archives may come from untrusted sources: opening must never panic and
//! must never write outside the bundle's own temporary root.

#![no_main]

use libfuzzer_sys::fuzz_target;
use rob_bundle::BundleArchiver;

fuzz_target!(|data: &[u8]| {
    // Most random data fails quickly at the ZIP layer
    if let Ok(mut bundle) = BundleArchiver::default().open_bytes(data.to_vec()) {
        let _ = bundle.walk();
        let _ = bundle.close();
    }
});
