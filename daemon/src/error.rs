use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failures that can occur inside one supervisor iteration or during startup.
///
/// The supervisor loop matches on the variant to decide whether to retry the
/// spawn, pause briefly, or degrade the emitted record. None of them terminate
/// the process.
#[derive(Debug, Error)]
pub enum MediaError {
    /// The metadata source process could not be started.
    #[error("failed to spawn `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    /// Reading the metadata stream failed (not end-of-stream, which is normal).
    #[error("failed to read metadata stream: {0}")]
    Read(#[source] io::Error),

    /// Writing a record to standard output failed.
    #[error("failed to emit record: {0}")]
    Emit(#[source] io::Error),

    /// The configuration file could not be read, parsed, or written.
    #[error("config error at {}: {message}", .path.display())]
    Config { path: PathBuf, message: String },
}

/// A display format template that cannot be rendered.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("unknown placeholder `{{{0}}}` in display format")]
    UnknownPlaceholder(String),
    #[error("unbalanced brace at byte {0} in display format")]
    UnbalancedBrace(usize),
}

/// A bounded call to an external command that did not succeed.
#[derive(Debug, Error)]
pub enum ExternalCallError {
    #[error("`{command}` timed out after {timeout:?}")]
    Timeout {
        command: String,
        timeout: std::time::Duration,
    },
    #[error("`{command}` could not be run: {source}")]
    Io {
        command: String,
        #[source]
        source: io::Error,
    },
    #[error("`{command}` exited with {status}")]
    Status {
        command: String,
        status: std::process::ExitStatus,
    },
}
