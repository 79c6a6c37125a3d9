//! Rich diagnostic error types for the xi-kernel.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]` derives,
//! providing error codes and help text so operators know exactly what went
//! wrong and how to fix it.

use miette::Diagnostic;
use thiserror::Error;

pub use crate::port::GenerationError;

/// Top-level error type for the xi-kernel.
///
/// Each variant wraps a subsystem-specific error, preserving the full diagnostic
/// chain through to the user.
#[derive(Debug, Error, Diagnostic)]
pub enum XiError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Kernel(#[from] KernelError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Generation(#[from] GenerationError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),
}

// ---------------------------------------------------------------------------
// Kernel errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum KernelError {
    #[error("write denied: kernel authority required for {operation}")]
    #[diagnostic(
        code(xi::kernel::authorization),
        help(
            "Graph mutations must present the write token of the authority the \
             store was bound to. Route the change through `Kernel` instead of \
             touching the store directly."
        )
    )]
    Authorization { operation: &'static str },

    #[error("edge {src} -> {dst} ({rel}) has no warrant")]
    #[diagnostic(
        code(xi::kernel::missing_warrant),
        help(
            "Every edge must carry a non-empty warrant explaining why it exists. \
             Provide at least a `reason` entry."
        )
    )]
    MissingWarrant { src: String, dst: String, rel: String },

    #[error("symbol not found: {id}")]
    #[diagnostic(
        code(xi::kernel::not_found),
        help("No symbol with this id exists in the graph. Create it first or check the id.")
    )]
    NotFound { id: String },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Generation(#[from] GenerationError),
}

// ---------------------------------------------------------------------------
// Config errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("failed to read config: {path}")]
    #[diagnostic(
        code(xi::config::read),
        help("Ensure the config file exists and is readable.")
    )]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {message}")]
    #[diagnostic(
        code(xi::config::parse),
        help("Check the TOML syntax. Unknown keys are rejected; omitted keys fall back to defaults.")
    )]
    Parse { path: String, message: String },

    #[error("failed to write config: {path}")]
    #[diagnostic(
        code(xi::config::write),
        help("Ensure you have write permissions to the target directory.")
    )]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {message}")]
    #[diagnostic(code(xi::config::invalid), help("{message}"))]
    Invalid { message: String },
}

/// Convenience alias for kernel operations.
pub type KernelResult<T> = std::result::Result<T, KernelError>;

/// Convenience alias for functions returning xi-kernel results.
pub type XiResult<T> = std::result::Result<T, XiError>;
