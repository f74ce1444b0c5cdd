//! Module artifact decoding and unit resolution.
//!
//! A module artifact arrives as one opaque base64 string inside a
//! `function` message. Two artifact shapes are supported:
//!
//! - **Direct**: the decoded bytes are the unit itself, returned without
//!   inspection.
//! - **Archive**: the decoded bytes are a zip archive whose entries are
//!   named `<UnitName><extension>` (for example `Function.wasm`). The
//!   archive's entry table is scanned in on-disk order and the first entry
//!   with the required name wins; later duplicates are never consulted.
//!
//! This crate only produces raw unit bytes. Turning those bytes into an
//! invocable handle is the engine's job.

use std::io::{Cursor, Read};

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use zip::result::ZipError;
use zip::ZipArchive;

mod error;

#[cfg(any(test, feature = "test-fixtures"))]
pub mod fixtures;

pub use error::ResolutionError;

/// How to interpret the decoded artifact bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    /// The bytes are the unit itself.
    Direct,
    /// The bytes are a zip archive containing the unit as a named entry.
    Archive,
}

/// Resolve a transport-encoded artifact into the named unit's raw bytes.
///
/// `extension` is appended to `unit_name` when matching archive entry
/// names; it is ignored for direct artifacts.
pub fn resolve(
    artifact: &str,
    unit_name: &str,
    extension: &str,
    kind: ArtifactKind,
) -> Result<Vec<u8>, ResolutionError> {
    let bytes = BASE64_STANDARD.decode(artifact)?;
    match kind {
        ArtifactKind::Direct => Ok(bytes),
        ArtifactKind::Archive => extract_unit(bytes, &format!("{unit_name}{extension}")),
    }
}

/// Scan the archive's entry table for the first entry named `target`.
fn extract_unit(archive_bytes: Vec<u8>, target: &str) -> Result<Vec<u8>, ResolutionError> {
    let mut archive = ZipArchive::new(Cursor::new(archive_bytes))?;
    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        tracing::trace!(name = entry.name(), "scanning archive entry");
        if entry.name() == target {
            // The declared entry size is wire input; let the bytes
            // actually read drive the buffer's growth.
            let mut bytes = Vec::new();
            entry
                .read_to_end(&mut bytes)
                .map_err(ZipError::Io)?;
            return Ok(bytes);
        }
    }
    Err(ResolutionError::UnitNotFound(target.to_string()))
}
