//! Error types for artifact resolution.

use thiserror::Error;

/// Errors from resolving a transport-encoded artifact into unit bytes.
#[derive(Debug, Error)]
pub enum ResolutionError {
    /// The artifact text is not valid base64.
    #[error("artifact is not valid base64: {0}")]
    BadEncoding(#[from] base64::DecodeError),

    /// The artifact claims to be an archive but cannot be parsed as one,
    /// or an entry's bytes cannot be read out of it.
    #[error("artifact archive is corrupt: {0}")]
    ArchiveCorrupt(#[from] zip::result::ZipError),

    /// The archive was scanned to the end without finding the named unit.
    #[error("unit {0:?} not found in archive")]
    UnitNotFound(String),
}
