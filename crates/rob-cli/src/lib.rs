//! Support library for the `rob` command-line tool.
//!
//! The binary in `main.rs` parses arguments and dispatches; this crate holds
//! the pieces shared with tests: exit codes, logging setup, output envelopes,
//! and the tutorial walkthrough.

pub mod exit_codes;
pub mod logging;
pub mod output;
pub mod tutorial;

pub use exit_codes::ExitCode;
pub use output::OutputFormat;
