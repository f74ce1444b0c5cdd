//! Error types for module loading and invocation.

use thiserror::Error;

/// Errors from materializing raw bytes into a module handle.
#[derive(Debug, Error)]
pub enum LoadError {
    /// The bytes do not constitute a valid WebAssembly module.
    #[error("module bytes are malformed: {0}")]
    Malformed(String),

    /// A unit with this name has already been materialized by this loader.
    #[error("unit {0:?} is already defined in this process")]
    DefinitionConflict(String),
}

/// Errors from one invocation of a loaded module.
///
/// All variants are recoverable: the handle stays valid and the next
/// request gets a fresh execution context regardless of how this one ended.
#[derive(Debug, Error)]
pub enum InvocationError {
    /// The module lacks a required export, or exports it with the wrong
    /// signature. Names the capability that is missing.
    #[error("module is missing required capability: {0}")]
    MissingCapability(String),

    /// Instantiating a fresh execution context failed, for example because
    /// the module declares imports this engine does not provide or its
    /// start function trapped.
    #[error("failed to construct execution context: {0}")]
    ConstructionFailed(String),

    /// The entry call itself trapped or faulted, carrying the underlying
    /// cause.
    #[error("entry call failed: {0}")]
    ExecutionFailed(String),

    /// The module returned a region the host cannot decode: out of bounds,
    /// or not valid JSON.
    #[error("module returned an invalid result: {0}")]
    InvalidResult(String),
}
