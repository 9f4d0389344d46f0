//! Guided walkthrough of the bundle API.
//!
//! Creates a bundle, fills an `inputs` directory with a string value, a
//! binary value, a copied-in file and a reference, seals it, then reopens
//! the archive, deletes one slot and seals the result to a second archive.
//! Every step is recorded so the CLI can print it.

use rob_bundle::{Bundle, BundleArchiver, BundleConfig, OverwritePolicy, Result};
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

/// URI stored in the walkthrough's reference slot.
pub const EXAMPLE_REFERENCE: &str = "http://example.com/external.txt";

#[derive(Debug, Clone, Serialize)]
pub struct TutorialStep {
    pub step: &'static str,
    pub detail: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TutorialReport {
    pub bundle_id: String,
    pub sealed: PathBuf,
    pub edited: PathBuf,
    pub steps: Vec<TutorialStep>,
}

impl TutorialReport {
    fn record(&mut self, step: &'static str, detail: impl Into<String>) {
        let detail = detail.into();
        info!(step, %detail, "Tutorial step");
        self.steps.push(TutorialStep { step, detail });
    }
}

/// Run the walkthrough, writing archives and scratch files under `workdir`.
pub fn run_tutorial(workdir: &Path, config: &BundleConfig) -> Result<TutorialReport> {
    std::fs::create_dir_all(workdir)?;
    let extension = &config.archive.extension;
    let sealed = workdir.join(format!("tutorial.{}", extension));
    let edited = workdir.join(format!("tutorial-edited.{}", extension));
    let local_copy = workdir.join("in1.txt");

    let mut bundle = Bundle::create_with(config)?;
    let mut report = TutorialReport {
        bundle_id: bundle.id().to_string(),
        sealed: sealed.clone(),
        edited: edited.clone(),
        steps: Vec::new(),
    };
    report.record(
        "create",
        format!("new bundle with {} top-level slots", bundle.list("/")?.len()),
    );

    bundle.create_directory("inputs")?;
    report.record("create_directory", "inputs");

    bundle.set_inline_value("inputs/in1", "Hello")?;
    if bundle.is_value("inputs/in1")? {
        report.record(
            "set_inline_value",
            format!("inputs/in1 = {:?}", bundle.get_inline_value("inputs/in1")?),
        );
    }

    let mut writer = bundle.open_writer("inputs/in2")?;
    writer.write_all(&[32])?;
    let written = writer.finish()?;
    report.record("open_writer", format!("inputs/in2 <- {} byte(s)", written));

    let copied = bundle.copy_out("inputs/in1", &local_copy, OverwritePolicy::Replace)?;
    report.record(
        "copy_out",
        format!("inputs/in1 -> {} ({} bytes)", local_copy.display(), copied),
    );

    let copied = bundle.copy_in(&local_copy, "inputs/in3", OverwritePolicy::FailIfExists)?;
    report.record(
        "copy_in",
        format!("{} -> inputs/in3 ({} bytes)", local_copy.display(), copied),
    );

    bundle.set_reference("inputs/in4", EXAMPLE_REFERENCE)?;
    report.record(
        "set_reference",
        format!("inputs/in4 -> {}", bundle.get_reference("inputs/in4")?),
    );

    let archiver = BundleArchiver::new(config.clone());
    let manifest = archiver.seal(&mut bundle, &sealed)?;
    report.record(
        "seal",
        format!("{} slots -> {}", manifest.entry_count(), sealed.display()),
    );

    let mut reopened = archiver.open(&sealed)?;
    report.record(
        "open",
        format!("{} slots under inputs", reopened.list("inputs")?.len()),
    );

    reopened.delete("inputs/in3")?;
    report.record("delete", "inputs/in3");

    let manifest = archiver.seal(&mut reopened, &edited)?;
    report.record(
        "seal",
        format!("{} slots -> {}", manifest.entry_count(), edited.display()),
    );

    Ok(report)
}
