//! No-mock bundle integration tests.
//!
//! Exercises real working trees and archives on disk:
//! - The tutorial walkthrough (values, references, copy in/out, seal, reopen)
//! - Lifecycle: every operation fails once a bundle is sealed or closed
//! - Corrupt archives: non-zip, missing manifest, bad checksum, bad marker
//! - Atomic seal: failures never touch an existing archive
//! - Slot rules: directory conflicts, listing order, marker name clashes

use rob_bundle::{
    ArchiveReader, Bundle, BundleArchiver, BundleConfig, BundleError, OverwritePolicy, SlotKind,
    SlotPath, BUNDLE_MIMETYPE, MANIFEST_FILE_NAME, MAX_URI_BYTES,
};
use std::io::{Cursor, Read, Write};
use std::path::Path;
use tempfile::TempDir;
use zip::write::{FileOptions, ZipWriter};
use zip::ZipArchive;

// ============================================================================
// Helpers
// ============================================================================

const EXTERNAL_URI: &str = "http://example.com/external.txt";

/// Bundle laid out like the tutorial: three values and one reference.
fn build_tutorial_bundle(scratch: &Path) -> Bundle {
    let mut bundle = Bundle::create().expect("create bundle");
    bundle.create_directory("inputs").expect("inputs dir");
    bundle.set_inline_value("inputs/in1", "Hello").expect("in1");
    bundle.set_bytes("inputs/in2", &[32]).expect("in2");

    let local = scratch.join("in3.txt");
    std::fs::write(&local, b"contents of in3").expect("write local file");
    bundle
        .copy_in(&local, "inputs/in3", OverwritePolicy::FailIfExists)
        .expect("copy in3");

    bundle.set_reference("inputs/in4", EXTERNAL_URI).expect("in4");
    bundle.create_directory("outputs").expect("outputs dir");
    bundle
}

fn slot_paths(bundle: &Bundle) -> Vec<String> {
    bundle
        .walk()
        .expect("walk")
        .iter()
        .map(|h| h.path().to_string())
        .collect()
}

/// Copy an archive entry by entry, letting `edit` replace file contents.
fn rewrite_archive(bytes: Vec<u8>, edit: impl Fn(&str, Vec<u8>) -> Option<Vec<u8>>) -> Vec<u8> {
    let mut source = ZipArchive::new(Cursor::new(bytes)).expect("read zip");
    let mut out = Cursor::new(Vec::new());
    {
        let mut zip = ZipWriter::new(&mut out);
        let options: FileOptions<'_, ()> = FileOptions::default();
        for i in 0..source.len() {
            let mut entry = source.by_index(i).expect("entry");
            let name = entry.name().to_string();
            if entry.is_dir() {
                zip.add_directory(name, options).expect("add dir");
                continue;
            }
            let mut data = Vec::new();
            entry.read_to_end(&mut data).expect("read entry");
            if let Some(data) = edit(&name, data) {
                zip.start_file(name, options).expect("start file");
                zip.write_all(&data).expect("write entry");
            }
        }
        zip.finish().expect("finish zip");
    }
    out.into_inner()
}

fn sealed_tutorial_bytes() -> Vec<u8> {
    let scratch = TempDir::new().expect("tempdir");
    let mut bundle = build_tutorial_bundle(scratch.path());
    let (bytes, _) = BundleArchiver::default()
        .seal_to_vec(&mut bundle)
        .expect("seal");
    bytes
}

// ============================================================================
// Scenarios
// ============================================================================

#[test]
fn scenario_inline_value_survives_seal_and_open() {
    let scratch = TempDir::new().expect("tempdir");
    let archive = scratch.path().join("x.bundle.zip");

    let mut bundle = Bundle::create().expect("create");
    bundle.create_directory("inputs").expect("inputs");
    bundle.set_inline_value("inputs/in1", "Hello").expect("set");
    bundle.seal(&archive).expect("seal");

    let reopened = Bundle::open(&archive).expect("open");
    assert!(reopened.is_value("inputs/in1").unwrap());
    assert!(!reopened.is_reference("inputs/in1").unwrap());
    assert_eq!(reopened.get_inline_value("inputs/in1").unwrap(), "Hello");
}

#[test]
fn scenario_reference_survives_seal_and_open() {
    let scratch = TempDir::new().expect("tempdir");
    let archive = scratch.path().join("x.bundle.zip");

    let mut bundle = Bundle::create().expect("create");
    bundle.set_reference("inputs/in4", EXTERNAL_URI).expect("set");
    bundle.seal(&archive).expect("seal");

    let reopened = Bundle::open(&archive).expect("open");
    assert!(reopened.is_reference("inputs/in4").unwrap());
    assert!(!reopened.is_value("inputs/in4").unwrap());
    assert_eq!(reopened.get_reference("inputs/in4").unwrap(), EXTERNAL_URI);
    assert!(matches!(
        reopened.get_inline_value("inputs/in4"),
        Err(BundleError::NotAValue(_))
    ));
}

#[test]
fn scenario_reopen_delete_and_reseal() {
    let scratch = TempDir::new().expect("tempdir");
    let first = scratch.path().join("x.bundle.zip");
    let second = scratch.path().join("y.bundle.zip");

    let mut bundle = build_tutorial_bundle(scratch.path());
    bundle.seal(&first).expect("seal x");

    let mut reopened = Bundle::open(&first).expect("open x");
    reopened.delete("inputs/in3").expect("delete in3");
    reopened.seal(&second).expect("seal y");

    let y = Bundle::open(&second).expect("open y");
    assert!(matches!(
        y.resolve("inputs/in3"),
        Err(BundleError::NotFound(_))
    ));
    assert_eq!(y.get_inline_value("inputs/in1").unwrap(), "Hello");
    assert_eq!(y.get_bytes("inputs/in2").unwrap(), vec![32]);
    assert_eq!(y.get_reference("inputs/in4").unwrap(), EXTERNAL_URI);

    // X is untouched by edits made after opening it
    let x = Bundle::open(&first).expect("reopen x");
    assert_eq!(
        x.get_bytes("inputs/in3").unwrap(),
        b"contents of in3".to_vec()
    );
}

#[test]
fn tutorial_copy_out_and_back_in() {
    let scratch = TempDir::new().expect("tempdir");
    let mut bundle = build_tutorial_bundle(scratch.path());

    let exported = scratch.path().join("in1.txt");
    let bytes = bundle
        .copy_out("inputs/in1", &exported, OverwritePolicy::FailIfExists)
        .expect("copy out");
    assert_eq!(bytes, 5);
    assert_eq!(std::fs::read_to_string(&exported).unwrap(), "Hello");

    std::fs::write(&exported, "Hello, edited").unwrap();
    assert!(matches!(
        bundle.copy_in(&exported, "inputs/in1", OverwritePolicy::FailIfExists),
        Err(BundleError::AlreadyExists(_))
    ));
    bundle
        .copy_in(&exported, "outputs/out1", OverwritePolicy::FailIfExists)
        .expect("copy back in");

    assert_eq!(
        bundle.resolve("outputs/out1").unwrap().kind(),
        SlotKind::BinaryStream
    );
    assert_eq!(
        bundle.get_inline_value("outputs/out1").unwrap(),
        "Hello, edited"
    );
}

// ============================================================================
// Round trip and lifecycle
// ============================================================================

#[test]
fn round_trip_preserves_paths_kinds_and_payloads() {
    let scratch = TempDir::new().expect("tempdir");
    let archive = scratch.path().join("rt.bundle.zip");
    let mut bundle = build_tutorial_bundle(scratch.path());
    bundle.create_directory("outputs/empty/nested").unwrap();
    bundle.set_description("round trip").unwrap();

    let before: Vec<(String, SlotKind)> = bundle
        .walk()
        .unwrap()
        .iter()
        .map(|h| (h.path().to_string(), h.kind()))
        .collect();
    let id = bundle.id();

    bundle.seal(&archive).expect("seal");
    let reopened = Bundle::open(&archive).expect("open");

    let after: Vec<(String, SlotKind)> = reopened
        .walk()
        .unwrap()
        .iter()
        .map(|h| (h.path().to_string(), h.kind()))
        .collect();
    assert_eq!(before, after);
    assert_eq!(reopened.id(), id);
    assert_eq!(reopened.description(), Some("round trip"));
    assert_eq!(
        reopened.get_bytes("inputs/in3").unwrap(),
        b"contents of in3".to_vec()
    );
}

#[test]
fn sealed_bundle_rejects_every_operation() {
    let scratch = TempDir::new().expect("tempdir");
    let mut bundle = build_tutorial_bundle(scratch.path());
    bundle
        .seal(&scratch.path().join("closed.bundle.zip"))
        .expect("seal");

    assert!(!bundle.is_open());
    assert!(matches!(
        bundle.get_inline_value("inputs/in1"),
        Err(BundleError::BundleClosed)
    ));
    assert!(matches!(
        bundle.set_inline_value("inputs/in1", "again"),
        Err(BundleError::BundleClosed)
    ));
    assert!(matches!(bundle.list("/"), Err(BundleError::BundleClosed)));
    assert!(matches!(
        bundle.resolve("inputs"),
        Err(BundleError::BundleClosed)
    ));
    assert!(matches!(
        bundle.delete("inputs"),
        Err(BundleError::BundleClosed)
    ));
    assert!(matches!(
        bundle.seal(&scratch.path().join("again.bundle.zip")),
        Err(BundleError::BundleClosed)
    ));
    assert!(!scratch.path().join("again.bundle.zip").exists());
}

#[test]
fn seal_removes_working_root() {
    let scratch = TempDir::new().expect("tempdir");
    let mut bundle = build_tutorial_bundle(scratch.path());
    let root = bundle.working_root().unwrap().to_path_buf();
    assert!(root.is_dir());

    bundle.seal(&scratch.path().join("b.bundle.zip")).unwrap();
    assert!(!root.exists());
}

#[test]
fn recursive_delete_then_not_found() {
    let scratch = TempDir::new().expect("tempdir");
    let mut bundle = build_tutorial_bundle(scratch.path());

    bundle.delete("inputs").expect("delete dir");
    for path in ["inputs", "inputs/in1", "inputs/in2", "inputs/in3", "inputs/in4"] {
        assert!(
            matches!(bundle.resolve(path), Err(BundleError::NotFound(_))),
            "{} still resolves",
            path
        );
    }
    assert_eq!(slot_paths(&bundle), vec!["outputs".to_string()]);
}

#[test]
fn reseal_to_the_same_path_replaces_archive() {
    let scratch = TempDir::new().expect("tempdir");
    let archive = scratch.path().join("same.bundle.zip");

    let mut bundle = build_tutorial_bundle(scratch.path());
    bundle.seal(&archive).unwrap();

    let mut reopened = Bundle::open(&archive).unwrap();
    reopened.set_inline_value("outputs/result", "done").unwrap();
    reopened.seal(&archive).unwrap();

    let latest = Bundle::open(&archive).unwrap();
    assert_eq!(latest.get_inline_value("outputs/result").unwrap(), "done");
    assert_eq!(latest.get_inline_value("inputs/in1").unwrap(), "Hello");
}

#[test]
fn failed_seal_keeps_prior_archive() {
    let scratch = TempDir::new().expect("tempdir");
    let archive = scratch.path().join("keep.bundle.zip");

    let mut original = build_tutorial_bundle(scratch.path());
    original.seal(&archive).unwrap();
    let before = std::fs::read(&archive).unwrap();

    // a directory at the destination makes the final rename fail
    let blocked = scratch.path().join("blocked");
    std::fs::create_dir(&blocked).unwrap();
    std::fs::write(blocked.join("occupant"), b"x").unwrap();

    let mut bundle = Bundle::create().unwrap();
    bundle.set_inline_value("a", "b").unwrap();
    assert!(bundle.seal(&blocked).is_err());
    assert!(bundle.is_open());
    assert!(blocked.is_dir());

    assert_eq!(std::fs::read(&archive).unwrap(), before);
    let leftovers: Vec<_> = std::fs::read_dir(scratch.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().starts_with(".rob-seal-"))
        .collect();
    assert!(leftovers.is_empty(), "staging files left behind");
}

// ============================================================================
// Corrupt archives
// ============================================================================

#[test]
fn open_missing_path_is_not_found() {
    let scratch = TempDir::new().expect("tempdir");
    let result = Bundle::open(&scratch.path().join("nope.bundle.zip"));
    assert!(matches!(result, Err(BundleError::NotFound(_))));
}

#[test]
fn open_non_zip_is_corrupt() {
    let scratch = TempDir::new().expect("tempdir");
    let path = scratch.path().join("junk.bundle.zip");
    std::fs::write(&path, b"this is not a zip file").unwrap();

    assert!(matches!(
        Bundle::open(&path),
        Err(BundleError::CorruptArchive(_))
    ));
}

#[test]
fn open_without_manifest_is_corrupt() {
    let bytes = rewrite_archive(sealed_tutorial_bytes(), |name, data| {
        (name != MANIFEST_FILE_NAME).then_some(data)
    });
    assert!(matches!(
        BundleArchiver::default().open_bytes(bytes),
        Err(BundleError::CorruptArchive(_))
    ));
}

#[test]
fn open_with_tampered_content_is_corrupt() {
    let bytes = rewrite_archive(sealed_tutorial_bytes(), |name, data| {
        Some(if name == "inputs/in1" {
            b"Jello".to_vec()
        } else {
            data
        })
    });

    let result = BundleArchiver::default().open_bytes(bytes.clone());
    assert!(matches!(result, Err(BundleError::CorruptArchive(ref m)) if m.contains("checksum")));

    let mut reader = ArchiveReader::from_bytes(bytes).unwrap();
    assert_eq!(reader.verify_all(), vec!["inputs/in1".to_string()]);
}

#[test]
fn tampered_content_opens_when_verification_disabled() {
    let bytes = rewrite_archive(sealed_tutorial_bytes(), |name, data| {
        Some(if name == "inputs/in1" {
            b"Jello".to_vec()
        } else {
            data
        })
    });

    let mut config = BundleConfig::default();
    config.archive.verify_checksums = false;
    let bundle = BundleArchiver::new(config).open_bytes(bytes).unwrap();
    assert_eq!(bundle.get_inline_value("inputs/in1").unwrap(), "Jello");
}

#[test]
fn open_with_bad_marker_is_corrupt() {
    let bytes = rewrite_archive(sealed_tutorial_bytes(), |name, data| {
        Some(if name == "inputs/in4.url" {
            b"not a shortcut".to_vec()
        } else {
            data
        })
    });

    let mut config = BundleConfig::default();
    config.archive.verify_checksums = false;
    assert!(matches!(
        BundleArchiver::new(config).open_bytes(bytes),
        Err(BundleError::CorruptArchive(_))
    ));
}

#[test]
fn open_adopts_unlisted_entries_as_binary() {
    let mut source = ZipArchive::new(Cursor::new(sealed_tutorial_bytes())).unwrap();

    // append an entry the manifest knows nothing about
    let mut out = Cursor::new(Vec::new());
    {
        let mut zip = ZipWriter::new(&mut out);
        let options: FileOptions<'_, ()> = FileOptions::default();
        for i in 0..source.len() {
            let entry = source.by_index_raw(i).unwrap();
            zip.raw_copy_file(entry).unwrap();
        }
        zip.start_file("extras/notes.txt", options).unwrap();
        zip.write_all(b"added by hand").unwrap();
        zip.finish().unwrap();
    }

    let bundle = BundleArchiver::default()
        .open_bytes(out.into_inner())
        .unwrap();
    assert_eq!(
        bundle.resolve("extras/notes.txt").unwrap().kind(),
        SlotKind::BinaryStream
    );
    assert!(bundle.resolve("extras").unwrap().is_directory());
    assert_eq!(
        bundle.get_bytes("extras/notes.txt").unwrap(),
        b"added by hand".to_vec()
    );
}

#[test]
fn failed_open_leaves_no_working_root() {
    let scratch = TempDir::new().expect("tempdir");
    let work = scratch.path().join("work");
    let config = BundleConfig::default().with_temp_root(&work);

    let bytes = rewrite_archive(sealed_tutorial_bytes(), |name, data| {
        Some(if name == "inputs/in2" { vec![0, 0, 0] } else { data })
    });
    assert!(BundleArchiver::new(config).open_bytes(bytes).is_err());

    let remaining = std::fs::read_dir(&work).map(|d| d.count()).unwrap_or(0);
    assert_eq!(remaining, 0);
}

#[test]
fn archive_starts_with_mimetype() {
    let bytes = sealed_tutorial_bytes();
    let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
    let mut first = archive.by_index(0).unwrap();
    assert_eq!(first.name(), "mimetype");

    let mut mimetype = String::new();
    first.read_to_string(&mut mimetype).unwrap();
    assert_eq!(mimetype, BUNDLE_MIMETYPE);
}

#[test]
fn slot_path_rejects_traversal() {
    assert!(SlotPath::parse("inputs/../etc").is_err());
    assert!(SlotPath::parse(".ro/manifest.json").is_err());

    let mut bundle = Bundle::create().unwrap();
    assert!(matches!(
        bundle.set_inline_value("a/./b", "x"),
        Err(BundleError::InvalidPath { .. })
    ));
}

#[test]
fn open_rejects_literal_shadowing_a_reference_marker() {
    // list a literal `inputs/in4.url` next to the reference `inputs/in4`
    let bytes = rewrite_archive(sealed_tutorial_bytes(), |name, data| {
        if name != MANIFEST_FILE_NAME {
            return Some(data);
        }
        let mut manifest: serde_json::Value = serde_json::from_slice(&data).unwrap();
        let entries = manifest["entries"].as_array_mut().unwrap();
        let mut shadow = entries
            .iter()
            .find(|e| e["path"] == "inputs/in4")
            .cloned()
            .unwrap();
        shadow["path"] = "inputs/in4.url".into();
        shadow["kind"] = "inline_value".into();
        shadow.as_object_mut().unwrap().remove("uri");
        entries.push(shadow);
        Some(serde_json::to_vec(&manifest).unwrap())
    });

    let mut config = BundleConfig::default();
    config.archive.verify_checksums = false;
    assert!(matches!(
        BundleArchiver::new(config).open_bytes(bytes),
        Err(BundleError::CorruptArchive(_))
    ));
}

// ============================================================================
// Slot rules
// ============================================================================

#[test]
fn create_directory_is_idempotent() {
    let mut bundle = Bundle::create().unwrap();
    bundle.create_directory("a/b/c").unwrap();
    bundle.create_directory("a/b/c").unwrap();
    bundle.create_directory("a/b").unwrap();

    assert_eq!(slot_paths(&bundle), vec!["a", "a/b", "a/b/c"]);
}

#[test]
fn create_directory_over_literal_is_already_exists() {
    let mut bundle = Bundle::create().unwrap();
    bundle.set_inline_value("inputs/in1", "Hello").unwrap();

    assert!(matches!(
        bundle.create_directory("inputs/in1"),
        Err(BundleError::AlreadyExists(_))
    ));
    assert!(matches!(
        bundle.create_directory("inputs/in1/nested"),
        Err(BundleError::AlreadyExists(_))
    ));

    // the value is untouched and nothing was created beneath it
    assert_eq!(bundle.get_inline_value("inputs/in1").unwrap(), "Hello");
    assert_eq!(slot_paths(&bundle), vec!["inputs", "inputs/in1"]);
}

#[test]
fn list_is_lexical_and_one_level_deep() {
    let mut bundle = Bundle::create().unwrap();
    bundle.set_inline_value("d/b", "2").unwrap();
    bundle.set_inline_value("d/a.b", "3").unwrap();
    bundle.set_reference("d/C", EXTERNAL_URI).unwrap();
    bundle.set_inline_value("d/a/deep", "4").unwrap();

    let names: Vec<String> = bundle
        .list("d")
        .unwrap()
        .iter()
        .map(|h| h.name().to_string())
        .collect();
    assert_eq!(names, vec!["C", "a", "a.b", "b"]);
}

#[test]
fn list_on_value_is_not_a_directory() {
    let mut bundle = Bundle::create().unwrap();
    bundle.set_inline_value("inputs/in1", "Hello").unwrap();

    assert!(matches!(
        bundle.list("inputs/in1"),
        Err(BundleError::NotADirectory(_))
    ));
    assert!(matches!(
        bundle.list("missing"),
        Err(BundleError::NotFound(_))
    ));
}

#[test]
fn marker_name_clashes_are_already_exists() {
    let mut bundle = Bundle::create().unwrap();

    // literal `x.url` first, then reference `x`
    bundle.set_inline_value("inputs/x.url", "literal").unwrap();
    assert!(matches!(
        bundle.set_reference("inputs/x", EXTERNAL_URI),
        Err(BundleError::AlreadyExists(_))
    ));
    assert!(!bundle.exists("inputs/x").unwrap());

    // reference `y` first, then literal `y.url`
    bundle.set_reference("inputs/y", EXTERNAL_URI).unwrap();
    assert!(matches!(
        bundle.set_inline_value("inputs/y.url", "literal"),
        Err(BundleError::AlreadyExists(_))
    ));
    assert!(matches!(
        bundle.set_bytes("inputs/y.url", b"raw"),
        Err(BundleError::AlreadyExists(_))
    ));
    assert_eq!(bundle.get_reference("inputs/y").unwrap(), EXTERNAL_URI);
}

#[test]
fn oversize_reference_is_rejected_before_seal() {
    let mut bundle = Bundle::create().unwrap();
    let big = format!("data:text/plain;base64,{}", "A".repeat(70 * 1024));

    assert!(matches!(
        bundle.set_reference("inputs/big", &big),
        Err(BundleError::InvalidUri(_))
    ));
    assert!(!bundle.exists("inputs").unwrap());
}

#[test]
fn largest_reference_survives_seal_and_open() {
    let mut bundle = Bundle::create().unwrap();
    let prefix = "data:text/plain;base64,";
    let uri = format!("{}{}", prefix, "A".repeat(MAX_URI_BYTES - prefix.len()));
    bundle.set_reference("inputs/big", &uri).unwrap();

    let archiver = BundleArchiver::default();
    let (bytes, _) = archiver.seal_to_vec(&mut bundle).unwrap();
    let reopened = archiver.open_bytes(bytes).unwrap();
    assert_eq!(reopened.get_reference("inputs/big").unwrap(), uri);
}

#[test]
fn failed_write_leaves_no_new_directories() {
    let mut bundle = Bundle::create().unwrap();
    // a 300-byte segment exceeds the file name limit of common filesystems
    let path = format!("newdir/inner/{}", "x".repeat(300));

    assert!(matches!(
        bundle.set_inline_value(path.as_str(), "v"),
        Err(BundleError::Io(_))
    ));
    assert!(!bundle.exists("newdir").unwrap());
    assert!(bundle.walk().unwrap().is_empty());
    let on_disk = std::fs::read_dir(bundle.working_root().unwrap()).unwrap().count();
    assert_eq!(on_disk, 0);

    // same for the streaming writer
    assert!(bundle.open_writer(path.as_str()).is_err());
    assert!(!bundle.exists("newdir").unwrap());
}

#[test]
fn seal_succeeds_when_working_root_cleanup_fails() {
    let scratch = TempDir::new().expect("tempdir");
    let archive = scratch.path().join("cleanup.bundle.zip");
    let mut bundle = Bundle::create().unwrap();
    bundle.set_reference("link", EXTERNAL_URI).unwrap();

    // references have no local bytes, so the root can go before sealing
    std::fs::remove_dir(bundle.working_root().unwrap()).unwrap();

    let manifest = bundle.seal(&archive).unwrap();
    assert_eq!(manifest.entry_count(), 1);
    assert!(!bundle.is_open());
    assert_eq!(
        Bundle::open(&archive).unwrap().get_reference("link").unwrap(),
        EXTERNAL_URI
    );
}
