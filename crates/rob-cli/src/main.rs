//! rob - Research Object bundle tool
//!
//! Creates, inspects, edits, and verifies bundle archives:
//! - `create` builds a bundle from directories, values, files, and references
//! - `ls`, `cat`, `ref` inspect a sealed archive
//! - `extract`, `rm` copy slots out or delete them and reseal
//! - `verify` checks every checksum in the manifest
//! - `tutorial` walks through the whole API

use clap::{Args, Parser, Subcommand};
use rob_bundle::{
    ArchiveReader, Bundle, BundleArchiver, BundleError, SlotHandle, SlotKind, SlotPath,
};
use rob_cli::logging::{init_logging, LogConfig, LogFormat, LogLevel};
use rob_cli::output::{error_envelope, success_envelope, to_pretty};
use rob_cli::tutorial::run_tutorial;
use rob_cli::{ExitCode, OutputFormat};
use rob_config::{load_config, BundleConfig, Compression, OverwritePolicy};
use serde_json::{json, Value};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// rob - Create, inspect, and edit Research Object bundles
#[derive(Parser)]
#[command(name = "rob")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    global: GlobalOpts,
}

/// Global options available to all commands
#[derive(Args, Debug)]
struct GlobalOpts {
    /// Config file (overrides ROB_CONFIG and the standard locations)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(long, short = 'f', global = true, default_value = "human")]
    format: OutputFormat,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Log format on stderr: human or jsonl
    #[arg(long, global = true)]
    log_format: Option<LogFormat>,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a new bundle and seal it
    Create(CreateArgs),

    /// List slots in a bundle
    Ls(LsArgs),

    /// Print the content of a value slot
    Cat(SlotArgs),

    /// Print the target URI of a reference slot
    Ref(SlotArgs),

    /// Copy a value slot out to the filesystem
    Extract(ExtractArgs),

    /// Delete a slot and reseal the bundle
    Rm(RmArgs),

    /// Verify every checksum in a bundle
    Verify(ArchiveArgs),

    /// Run the guided walkthrough, writing archives into a directory
    Tutorial(TutorialArgs),
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Commands::Create(_) => "create",
            Commands::Ls(_) => "ls",
            Commands::Cat(_) => "cat",
            Commands::Ref(_) => "ref",
            Commands::Extract(_) => "extract",
            Commands::Rm(_) => "rm",
            Commands::Verify(_) => "verify",
            Commands::Tutorial(_) => "tutorial",
        }
    }
}

// ============================================================================
// Command argument structs
// ============================================================================

#[derive(Args, Debug)]
struct CreateArgs {
    /// Archive to write
    out: PathBuf,

    /// Create a directory slot (repeatable)
    #[arg(long = "dir", value_name = "PATH")]
    dirs: Vec<String>,

    /// Set an inline value slot (repeatable)
    #[arg(long = "value", value_name = "PATH=TEXT", value_parser = parse_assignment)]
    values: Vec<(String, String)>,

    /// Copy a local file into a slot (repeatable)
    #[arg(long = "file", value_name = "PATH=LOCAL", value_parser = parse_assignment)]
    files: Vec<(String, String)>,

    /// Set a reference slot (repeatable)
    #[arg(long = "reference", value_name = "PATH=URI", value_parser = parse_assignment)]
    references: Vec<(String, String)>,

    /// Bundle description stored in the manifest
    #[arg(long)]
    description: Option<String>,

    /// Entry compression (stored|deflated); overrides the config file
    #[arg(long, value_parser = parse_compression)]
    compression: Option<Compression>,

    /// Replace an existing archive at OUT
    #[arg(long)]
    force: bool,
}

#[derive(Args, Debug)]
struct ArchiveArgs {
    /// Bundle archive
    archive: PathBuf,
}

#[derive(Args, Debug)]
struct LsArgs {
    /// Bundle archive
    archive: PathBuf,

    /// Directory to list (default: root)
    #[arg(default_value = "/")]
    dir: String,

    /// List the whole subtree
    #[arg(long, short = 'r')]
    recursive: bool,
}

#[derive(Args, Debug)]
struct SlotArgs {
    /// Bundle archive
    archive: PathBuf,

    /// Slot path, e.g. inputs/in1
    slot: String,
}

#[derive(Args, Debug)]
struct ExtractArgs {
    /// Bundle archive
    archive: PathBuf,

    /// Slot path
    slot: String,

    /// Destination file
    dest: PathBuf,

    /// Replace an existing destination file
    #[arg(long)]
    force: bool,
}

#[derive(Args, Debug)]
struct RmArgs {
    /// Bundle archive
    archive: PathBuf,

    /// Slot path
    slot: String,

    /// Write the result here instead of replacing the archive
    #[arg(long, short = 'o')]
    output: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct TutorialArgs {
    /// Directory for the archives and scratch files
    workdir: PathBuf,
}

fn parse_compression(s: &str) -> Result<Compression, String> {
    Compression::parse_str(s).ok_or_else(|| format!("unknown compression '{}'", s))
}

/// Parse `PATH=VALUE`; only the first `=` separates.
fn parse_assignment(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((path, value)) if !path.is_empty() => Ok((path.to_string(), value.to_string())),
        _ => Err(format!("expected PATH=VALUE, got '{}'", s)),
    }
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            if !e.use_stderr() {
                e.exit();
            }
            let _ = e.print();
            std::process::exit(ExitCode::ArgsError.as_i32());
        }
    };

    let log_level = LogLevel::from_flags(cli.global.quiet, cli.global.verbose);
    init_logging(&LogConfig::from_env(log_level, cli.global.log_format));

    let command = cli.command.name();
    let config = match load_config(cli.global.config.as_deref()) {
        Ok((config, paths)) => {
            debug!(source = %paths.source, path = ?paths.config, "Configuration loaded");
            config
        }
        Err(e) => {
            let code = ExitCode::from(&e);
            report_error(&cli.global, command, code, &format!("config error: {}", e));
            std::process::exit(code.as_i32());
        }
    };

    let result = match &cli.command {
        Commands::Create(args) => run_create(&cli.global, &config, args),
        Commands::Ls(args) => run_ls(&cli.global, &config, args),
        Commands::Cat(args) => run_cat(&cli.global, &config, args),
        Commands::Ref(args) => run_ref(&cli.global, &config, args),
        Commands::Extract(args) => run_extract(&cli.global, &config, args),
        Commands::Rm(args) => run_rm(&cli.global, &config, args),
        Commands::Verify(args) => run_verify(&cli.global, args),
        Commands::Tutorial(args) => run_tutorial_command(&cli.global, &config, args),
    };

    let exit_code = match result {
        Ok(code) => code,
        Err(e) => {
            let code = ExitCode::from(&e);
            report_error(&cli.global, command, code, &e.to_string());
            code
        }
    };

    std::process::exit(exit_code.as_i32());
}

/// Print an error on stderr in the requested format.
fn report_error(global: &GlobalOpts, command: &str, code: ExitCode, message: &str) {
    match global.format {
        OutputFormat::Json => {
            eprintln!("{}", to_pretty(&error_envelope(command, code, message)));
        }
        OutputFormat::Human => {
            eprintln!("rob {}: {}", command, message);
        }
    }
}

fn print_json(command: &str, result: Value) {
    println!("{}", to_pretty(&success_envelope(command, result)));
}

fn handle_json(handle: &SlotHandle, bundle: &Bundle) -> rob_bundle::Result<Value> {
    let mut value = json!({
        "path": handle.path().to_string(),
        "kind": handle.kind(),
    });
    if handle.is_reference() {
        value["uri"] = json!(bundle.get_reference(handle.path())?);
    }
    Ok(value)
}

fn handle_line(handle: &SlotHandle, bundle: &Bundle) -> rob_bundle::Result<String> {
    let path = handle.path();
    let kind = handle.kind().to_string();
    Ok(match handle.kind() {
        SlotKind::Directory => format!("{:<14} {}/", kind, path),
        SlotKind::Reference => {
            format!("{:<14} {} -> {}", kind, path, bundle.get_reference(path)?)
        }
        SlotKind::InlineValue | SlotKind::BinaryStream => format!("{:<14} {}", kind, path),
    })
}

// ============================================================================
// Commands
// ============================================================================

fn run_create(
    global: &GlobalOpts,
    config: &BundleConfig,
    args: &CreateArgs,
) -> rob_bundle::Result<ExitCode> {
    if args.out.exists() && !args.force && !config.store.overwrite.allows_replace() {
        return Err(BundleError::AlreadyExists(args.out.display().to_string()));
    }

    let config = match args.compression {
        Some(compression) => config.clone().with_compression(compression),
        None => config.clone(),
    };

    let mut bundle = Bundle::create_with(&config)?;
    if let Some(description) = &args.description {
        bundle.set_description(description.as_str())?;
    }
    for dir in &args.dirs {
        bundle.create_directory(dir)?;
    }
    for (path, text) in &args.values {
        bundle.set_inline_value(path, text)?;
    }
    for (path, local) in &args.files {
        bundle.copy_in(Path::new(local), path, config.store.overwrite)?;
    }
    for (path, uri) in &args.references {
        bundle.set_reference(path, uri)?;
    }

    let manifest = BundleArchiver::new(config).seal(&mut bundle, &args.out)?;

    match global.format {
        OutputFormat::Json => print_json(
            "create",
            json!({
                "archive": args.out,
                "bundle_id": manifest.bundle_id,
                "slots": manifest.entry_count(),
                "bytes": manifest.total_bytes(),
            }),
        ),
        OutputFormat::Human => println!(
            "Sealed {} slots into {} (bundle {})",
            manifest.entry_count(),
            args.out.display(),
            manifest.bundle_id
        ),
    }
    Ok(ExitCode::Ok)
}

fn run_ls(global: &GlobalOpts, config: &BundleConfig, args: &LsArgs) -> rob_bundle::Result<ExitCode> {
    let bundle = BundleArchiver::new(config.clone()).open(&args.archive)?;
    let dir = SlotPath::parse(&args.dir)?;

    let handles = if args.recursive {
        // validates that `dir` exists and is a directory
        bundle.list(&dir)?;
        bundle
            .walk()?
            .into_iter()
            .filter(|h| h.path().starts_with(&dir) && h.path() != &dir)
            .collect()
    } else {
        bundle.list(&dir)?
    };

    match global.format {
        OutputFormat::Json => {
            let slots = handles
                .iter()
                .map(|h| handle_json(h, &bundle))
                .collect::<rob_bundle::Result<Vec<_>>>()?;
            print_json(
                "ls",
                json!({
                    "archive": args.archive,
                    "directory": dir.to_string(),
                    "bundle_id": bundle.id(),
                    "slots": slots,
                }),
            );
        }
        OutputFormat::Human => {
            for handle in &handles {
                println!("{}", handle_line(handle, &bundle)?);
            }
        }
    }
    Ok(ExitCode::Ok)
}

fn run_cat(global: &GlobalOpts, config: &BundleConfig, args: &SlotArgs) -> rob_bundle::Result<ExitCode> {
    let bundle = BundleArchiver::new(config.clone()).open(&args.archive)?;
    let handle = bundle.resolve(args.slot.as_str())?;
    let data = bundle.get_bytes(handle.path())?;

    match global.format {
        OutputFormat::Json => {
            let mut result = json!({
                "path": handle.path().to_string(),
                "kind": handle.kind(),
                "bytes": data.len(),
            });
            match std::str::from_utf8(&data) {
                Ok(text) => result["text"] = json!(text),
                Err(_) => result["hex"] = json!(hex::encode(&data)),
            }
            print_json("cat", result);
        }
        OutputFormat::Human => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&data)?;
            stdout.flush()?;
        }
    }
    Ok(ExitCode::Ok)
}

fn run_ref(global: &GlobalOpts, config: &BundleConfig, args: &SlotArgs) -> rob_bundle::Result<ExitCode> {
    let bundle = BundleArchiver::new(config.clone()).open(&args.archive)?;
    let uri = bundle.get_reference(args.slot.as_str())?;

    match global.format {
        OutputFormat::Json => print_json("ref", json!({ "path": args.slot, "uri": uri })),
        OutputFormat::Human => println!("{}", uri),
    }
    Ok(ExitCode::Ok)
}

fn run_extract(
    global: &GlobalOpts,
    config: &BundleConfig,
    args: &ExtractArgs,
) -> rob_bundle::Result<ExitCode> {
    let policy = if args.force {
        OverwritePolicy::Replace
    } else {
        config.store.overwrite
    };

    let bundle = BundleArchiver::new(config.clone()).open(&args.archive)?;
    let bytes = bundle.copy_out(args.slot.as_str(), &args.dest, policy)?;

    match global.format {
        OutputFormat::Json => print_json(
            "extract",
            json!({ "path": args.slot, "dest": args.dest, "bytes": bytes }),
        ),
        OutputFormat::Human => println!(
            "Extracted {} to {} ({} bytes)",
            args.slot,
            args.dest.display(),
            bytes
        ),
    }
    Ok(ExitCode::Ok)
}

fn run_rm(global: &GlobalOpts, config: &BundleConfig, args: &RmArgs) -> rob_bundle::Result<ExitCode> {
    let archiver = BundleArchiver::new(config.clone());
    let mut bundle = archiver.open(&args.archive)?;
    bundle.delete(args.slot.as_str())?;

    let dest = args.output.as_deref().unwrap_or(args.archive.as_path());
    let manifest = archiver.seal(&mut bundle, dest)?;

    match global.format {
        OutputFormat::Json => print_json(
            "rm",
            json!({ "path": args.slot, "archive": dest, "slots": manifest.entry_count() }),
        ),
        OutputFormat::Human => println!("Deleted {}; sealed {}", args.slot, dest.display()),
    }
    Ok(ExitCode::Ok)
}

fn run_verify(global: &GlobalOpts, args: &ArchiveArgs) -> rob_bundle::Result<ExitCode> {
    let mut reader = ArchiveReader::open(&args.archive)?;
    let failures = reader.verify_all();
    let checked = reader
        .entries()
        .iter()
        .filter(|e| e.kind != SlotKind::Directory)
        .count();

    match global.format {
        OutputFormat::Json => print_json(
            "verify",
            json!({
                "archive": args.archive,
                "bundle_id": reader.manifest().bundle_id,
                "checked": checked,
                "failures": failures,
            }),
        ),
        OutputFormat::Human => {
            if failures.is_empty() {
                println!("OK: {} slots verified in {}", checked, args.archive.display());
            } else {
                for path in &failures {
                    println!("FAILED: {}", path);
                }
            }
        }
    }

    Ok(if failures.is_empty() {
        ExitCode::Ok
    } else {
        ExitCode::CorruptArchive
    })
}

fn run_tutorial_command(
    global: &GlobalOpts,
    config: &BundleConfig,
    args: &TutorialArgs,
) -> rob_bundle::Result<ExitCode> {
    let report = run_tutorial(&args.workdir, config)?;

    match global.format {
        OutputFormat::Json => print_json("tutorial", serde_json::to_value(&report)?),
        OutputFormat::Human => {
            for step in &report.steps {
                println!("[{}] {}", step.step, step.detail);
            }
        }
    }
    Ok(ExitCode::Ok)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_assignment() {
        assert_eq!(
            parse_assignment("inputs/in1=Hello").unwrap(),
            ("inputs/in1".to_string(), "Hello".to_string())
        );
        assert_eq!(
            parse_assignment("in4=http://example.com/?a=b").unwrap(),
            ("in4".to_string(), "http://example.com/?a=b".to_string())
        );
        assert_eq!(
            parse_assignment("empty=").unwrap(),
            ("empty".to_string(), String::new())
        );
        assert!(parse_assignment("novalue").is_err());
        assert!(parse_assignment("=text").is_err());
    }

    #[test]
    fn test_cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
