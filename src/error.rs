//! Error types for altd.
//!
//! Three categories, matching how far a request got:
//! - [`Rejection`]: a line was dropped before anything ran. Never reported
//!   outward; the dispatch loop only traces the stage that dropped it.
//! - [`SpawnError`]: the request was admitted but the OS refused to start or
//!   supervise the process.
//! - [`RegistryError`] / [`ConfigError`]: start-up failures, surfaced to the
//!   operator before watching begins.

use std::path::PathBuf;
use thiserror::Error;

/// Why a line was silently dropped.
///
/// All messages are safe to log: they name limits, never the contents of
/// the registry.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Rejection {
    // Extraction
    /// Line exceeds the configured maximum length
    #[error("line too long: max {max}, got {got}")]
    LineTooLong { max: usize, got: usize },

    /// No `METHOD target HTTP/x` request line in the input
    #[error("no request line found")]
    NoRequestLine,

    /// Request target could not be parsed as a URL
    #[error("malformed request target")]
    MalformedTarget,

    /// Extracted path exceeds the configured maximum length
    #[error("path too long: max {max}, got {got}")]
    PathTooLong { max: usize, got: usize },

    // Parsing
    /// Path does not start with `/`
    #[error("path must start with '/'")]
    PathNotAbsolute,

    /// Path has no non-empty segments
    #[error("path has no segments")]
    EmptyPath,

    /// Too many path segments
    #[error("too many segments: max {max}, got {got}")]
    TooManySegments { max: usize, got: usize },

    /// A segment (raw or decoded) exceeds the per-segment cap
    #[error("segment too long: max {max}, got {got}")]
    SegmentTooLong { max: usize, got: usize },

    /// Invalid `%XX` escape or escape decoding to invalid UTF-8
    #[error("invalid percent-encoding in segment {index}")]
    InvalidEncoding { index: usize },

    // Authorization
    /// Command name is not a registry key
    #[error("command not allowed")]
    NotAllowed,

    /// Too many arguments for the command's policy
    #[error("too many arguments: max {max}, got {got}")]
    TooManyArgs { max: usize, got: usize },

    /// Argument longer than the policy or global cap
    #[error("argument {index} too long: max {max}, got {got}")]
    ArgTooLong { index: usize, max: usize, got: usize },

    /// Argument that looks like an option where only positionals are accepted
    #[error("argument {index} looks like an option")]
    ArgLooksLikeOption { index: usize },

    /// Argument outside the command's fixed set of values
    #[error("argument {index} is not an accepted value")]
    ArgNotAChoice { index: usize },

    /// Argument containing a NUL byte, which cannot reach `execve`
    #[error("argument {index} contains a NUL byte")]
    ArgContainsNul { index: usize },

    /// Custom argument builder refused the arguments
    #[error("argument builder rejected: {reason}")]
    BuilderRejected { reason: String },

    // Governor
    /// Rate window quota used up
    #[error("rate limit: {max} per {window_ms}ms")]
    RateLimited { max: u32, window_ms: u128 },

    /// Concurrency ceiling reached
    #[error("concurrency ceiling reached: {max}")]
    ConcurrencyLimited { max: usize },

    /// Arrived too soon after the previous accepted execution
    #[error("minimum spacing not met: {min_ms}ms")]
    TooSoon { min_ms: u128 },
}

impl Rejection {
    /// Pipeline stage that produced this rejection, for trace output.
    pub fn stage(&self) -> &'static str {
        match self {
            Rejection::LineTooLong { .. }
            | Rejection::NoRequestLine
            | Rejection::MalformedTarget
            | Rejection::PathTooLong { .. } => "extract",
            Rejection::PathNotAbsolute
            | Rejection::EmptyPath
            | Rejection::TooManySegments { .. }
            | Rejection::SegmentTooLong { .. }
            | Rejection::InvalidEncoding { .. } => "parse",
            Rejection::RateLimited { .. }
            | Rejection::ConcurrencyLimited { .. }
            | Rejection::TooSoon { .. } => "govern",
            // Authorization failures share one label so traces do not reveal
            // whether a name was registered.
            _ => "resolve",
        }
    }
}

/// Registry construction failure.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// Command name is empty, `.`/`..`, or contains NUL
    #[error("invalid command name: {name:?}")]
    InvalidName { name: String },

    /// Command path contains `/` but is not absolute
    #[error("command path must be absolute: {name}")]
    NotAbsolute { name: String },

    /// No executable with that name on the search path
    #[error("command not found on search path: {name}")]
    NotFound { name: String },

    /// Path exists but is not an executable regular file
    #[error("not an executable file: {}", .path.display())]
    NotExecutable { path: PathBuf },

    /// Canonicalization failed for a reason other than absence
    #[error("failed to resolve {name}: {reason}")]
    ResolveFailed { name: String, reason: String },

    /// Nothing in the allowlist resolved
    #[error("no allowlisted command could be resolved")]
    Empty,
}

/// Failure to start or supervise an admitted process.
#[derive(Debug, Error)]
pub enum SpawnError {
    /// The OS refused to create the process
    #[error("failed to spawn {}: {source}", .program.display())]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Reading from or waiting on the child failed
    #[error("i/o error while supervising pid {pid:?}: {source}")]
    Io {
        pid: Option<u32>,
        #[source]
        source: std::io::Error,
    },
}

/// Configuration file failure.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid value for {key}: {reason}")]
    Invalid { key: String, reason: String },
}
