//! Research Object bundles: editable slot trees sealed into zip archives.
//!
//! A bundle is a directory-like tree of named *slots*. Leaf slots hold an
//! inline UTF-8 value, a binary stream, or a reference to external content by
//! URI. Bundles are edited in a private temporary working tree and sealed
//! atomically into a single zip-compatible file.
//!
//! # Archive Format
//!
//! Archives are ZIP files containing:
//! - `mimetype`: `application/vnd.wf4ever.robundle+zip`, stored first
//! - `.ro/manifest.json`: bundle metadata and one checksummed entry per slot
//! - `<dir>/`: directory slots
//! - `<path>`: inline and binary slots
//! - `<path>.url`: reference slots as Internet-shortcut markers
//!
//! # Example
//!
//! ```no_run
//! use rob_bundle::Bundle;
//! use std::path::Path;
//!
//! let mut bundle = Bundle::create().unwrap();
//! bundle.set_inline_value("inputs/in1", "Hello").unwrap();
//! bundle
//!     .set_reference("inputs/in4", "http://example.com/external.txt")
//!     .unwrap();
//! bundle.seal(Path::new("demo.bundle.zip")).unwrap();
//!
//! let reopened = Bundle::open(Path::new("demo.bundle.zip")).unwrap();
//! assert_eq!(reopened.get_inline_value("inputs/in1").unwrap(), "Hello");
//! ```

pub mod archiver;
pub mod codec;
pub mod error;
pub mod manifest;
pub mod path;
pub mod reader;
pub mod store;

pub use archiver::BundleArchiver;
pub use codec::{
    decode_reference_marker, encode_reference_marker, validate_uri, SlotKind, SlotReader,
    SlotWriter, MARKER_SUFFIX, MAX_URI_BYTES,
};
pub use error::{BundleError, Result};
pub use manifest::{
    BundleManifest, SlotEntry, BUNDLE_MIMETYPE, BUNDLE_SCHEMA_VERSION, MANIFEST_FILE_NAME,
};
pub use path::{IntoSlotPath, SlotHandle, SlotPath};
pub use reader::ArchiveReader;
pub use rob_config::{BundleConfig, Compression, OverwritePolicy};
pub use store::Bundle;
