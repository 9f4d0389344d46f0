//! Fuzz target for read-only archive inspection.

#![no_main]

use libfuzzer_sys::fuzz_target;
use rob_bundle::ArchiveReader;

fuzz_target!(|data: &[u8]| {
    if let Ok(mut reader) = ArchiveReader::from_bytes(data.to_vec()) {
        let _ = reader.verify_all();
    }
});
