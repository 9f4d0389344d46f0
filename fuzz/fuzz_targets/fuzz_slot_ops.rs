//! Fuzz target for sequences of editing operations.
//!
//! Applies arbitrary operations to a bundle, seals it, reopens it, and checks
//! that the reopened tree matches the one that was sealed.

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use rob_bundle::{Bundle, BundleArchiver};

#[derive(Arbitrary, Debug)]
enum Op {
    Dir(String),
    Value(String, String),
    Bytes(String, Vec<u8>),
    Reference(String, String),
    Delete(String),
}

fuzz_target!(|ops: Vec<Op>| {
    let Ok(mut bundle) = Bundle::create() else {
        return;
    };

    for op in ops.iter().take(32) {
        // Rejected operations must leave the bundle usable
        let _ = match op {
            Op::Dir(path) => bundle.create_directory(path.as_str()).map(|_| ()),
            Op::Value(path, text) => bundle.set_inline_value(path.as_str(), text),
            Op::Bytes(path, data) => bundle.set_bytes(path.as_str(), data),
            Op::Reference(path, uri) => bundle.set_reference(path.as_str(), uri),
            Op::Delete(path) => bundle.delete(path.as_str()),
        };
    }

    let before: Vec<_> = bundle
        .walk()
        .expect("bundle is open")
        .iter()
        .map(|h| (h.path().to_string(), h.kind()))
        .collect();

    let archiver = BundleArchiver::default();
    let (bytes, _) = archiver.seal_to_vec(&mut bundle).expect("seal");
    let reopened = archiver.open_bytes(bytes).expect("reopen sealed bundle");

    let after: Vec<_> = reopened
        .walk()
        .expect("bundle is open")
        .iter()
        .map(|h| (h.path().to_string(), h.kind()))
        .collect();
    assert_eq!(before, after);
});
