//! The error taxonomy of the core.
//!
//! Every kind is pattern-matchable and `Clone`: results are memoized inside
//! set caches and once-cells, so errors must be as copyable as successes.

use lode_config::config_file::ConfigFileError;
use lode_config::error::ParseError;
use lode_config::lock_file::LockFileError;
use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Clone, Error, Diagnostic)]
pub enum Error {
    /// Syntactic validation failure; rendered as invalid-argument.
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Config(#[from] ConfigFileError),

    #[error(transparent)]
    Lock(#[from] LockFileError),

    /// The registry could not resolve a ref, commit, or label.
    #[error("{kind} {input:?} not found")]
    NotFound { kind: &'static str, input: String },

    /// Create attempted over an existing entity.
    #[error("{kind} {input:?} already exists")]
    AlreadyExists { kind: &'static str, input: String },

    /// Invariant violation during set or lock file construction.
    #[error("duplicate {kind} {name:?}")]
    DuplicateEntity { kind: &'static str, name: String },

    /// More than one module owns a file path.
    #[error("file {path:?} exists in multiple modules: {}", candidates.join(", "))]
    AmbiguousPath {
        path: String,
        candidates: Vec<String>,
    },

    /// Downloaded content does not match the digest the key pinned.
    #[error("digest verification failed for {key}: expected {expected}, got {actual}")]
    Tamper {
        key: String,
        expected: String,
        actual: String,
    },

    #[error("unsupported digest type {digest_type:?}")]
    UnsupportedDigest { digest_type: String },

    #[error("unknown version {version:?}")]
    UnknownVersion { version: String },

    /// A dependency chain leads back to the module it started from.
    #[error("modules form an import cycle through {opaque_id:?}")]
    ImportCycle { opaque_id: String },

    #[error("operation cancelled")]
    Cancelled,

    #[error("{context}: {message}")]
    Io { context: String, message: String },

    #[error("registry {host}: {message}")]
    Transport { host: String, message: String },

    #[error("failed to decompress payload: {message}")]
    Decompress { message: String },

    #[error("unknown compression type {compression:?}")]
    UnknownCompression { compression: String },

    #[error("wasm compilation failed: {message}")]
    WasmCompile { message: String },

    #[error("flag {flag} is not implemented")]
    Unimplemented { flag: &'static str },

    /// Lock file update failed; the previous content was restored.
    #[error("lock file update failed: {cause}")]
    LockUpdate { cause: Box<Error> },

    /// Lock file update failed and restoring the previous content failed
    /// too. Both failures are carried.
    #[error("lock file update failed: {cause}; restoring the previous lock file also failed: {revert}")]
    LockUpdateAndRevert { cause: Box<Error>, revert: Box<Error> },

    /// Invariant-violation catch-all; a bug in the core, not user input.
    #[error("internal error: {message}")]
    System { message: String },
}

impl Error {
    pub fn io(context: impl Into<String>, error: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            message: error.to_string(),
        }
    }

    pub fn system(message: impl Into<String>) -> Self {
        Self::System {
            message: message.into(),
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
