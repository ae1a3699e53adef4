//! Versioned, serializable wire format for compiled programs (spec.md §4.2).
//!
//! The AST in `ast.rs` already mirrors the wire shape one-to-one, so this
//! module is thin: it wraps a [`Program`] in a version envelope, rejects
//! unknown versions on read, and guarantees that `decode(encode(p)) == p`
//! for any `p` produced by this crate's own parser.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ast::Program;

/// The only IR version this crate currently emits or accepts.
pub const CURRENT_VERSION: &str = "0.1.0";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IrError {
    #[error("unsupported IR version '{found}', expected '{expected}'")]
    VersionMismatch { found: String, expected: String },
    #[error("malformed IR: {0}")]
    Malformed(String),
}

/// The on-wire envelope: a version tag plus the compiled program.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IrDocument {
    pub version: String,
    pub probes: Vec<crate::ast::Probe>,
}

impl IrDocument {
    #[must_use]
    pub fn from_program(program: &Program) -> Self {
        Self {
            version: CURRENT_VERSION.to_owned(),
            probes: program.probes.clone(),
        }
    }

    /// # Errors
    ///
    /// Returns [`IrError::VersionMismatch`] if `self.version` isn't
    /// [`CURRENT_VERSION`].
    pub fn into_program(self) -> Result<Program, IrError> {
        if self.version != CURRENT_VERSION {
            return Err(IrError::VersionMismatch {
                found: self.version,
                expected: CURRENT_VERSION.to_owned(),
            });
        }
        Ok(Program { probes: self.probes })
    }
}

/// Serializes a program to its canonical JSON wire form.
///
/// # Errors
///
/// Returns an error if JSON serialization fails, which should not happen
/// for any well-formed `Program`.
pub fn to_json(program: &Program) -> Result<String, IrError> {
    serde_json::to_string(&IrDocument::from_program(program)).map_err(|e| IrError::Malformed(e.to_string()))
}

/// Parses a program from its JSON wire form.
///
/// # Errors
///
/// Returns [`IrError::Malformed`] if the JSON doesn't match the envelope
/// shape, or [`IrError::VersionMismatch`] if its `version` field doesn't
/// match [`CURRENT_VERSION`].
pub fn from_json(text: &str) -> Result<Program, IrError> {
    let doc: IrDocument = serde_json::from_str(text).map_err(|e| IrError::Malformed(e.to_string()))?;
    doc.into_program()
}

/// Serializes a program to its compact binary wire form.
///
/// # Errors
///
/// Returns an error if binary serialization fails, which should not happen
/// for any well-formed `Program`.
pub fn to_bytes(program: &Program) -> Result<Vec<u8>, IrError> {
    postcard::to_allocvec(&IrDocument::from_program(program)).map_err(|e| IrError::Malformed(e.to_string()))
}

/// Parses a program from its compact binary wire form.
///
/// # Errors
///
/// Returns [`IrError::Malformed`] if the bytes don't decode to the envelope
/// shape, or [`IrError::VersionMismatch`] if its `version` field doesn't
/// match [`CURRENT_VERSION`].
pub fn from_bytes(bytes: &[u8]) -> Result<Program, IrError> {
    let doc: IrDocument = postcard::from_bytes(bytes).map_err(|e| IrError::Malformed(e.to_string()))?;
    doc.into_program()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn sample_program() -> Program {
        parse("http:server:request_end / status_code >= 500 / { sample 10%; }").unwrap()
    }

    #[test]
    fn json_roundtrips() {
        let program = sample_program();
        let json = to_json(&program).unwrap();
        assert!(json.contains("\"version\":\"0.1.0\""));
        let decoded = from_json(&json).unwrap();
        assert_eq!(decoded, program);
    }

    #[test]
    fn bytes_roundtrip() {
        let program = sample_program();
        let bytes = to_bytes(&program).unwrap();
        let decoded = from_bytes(&bytes).unwrap();
        assert_eq!(decoded, program);
    }

    #[test]
    fn rejects_unknown_version() {
        let doc = IrDocument {
            version: "99.0.0".to_owned(),
            probes: Vec::new(),
        };
        let json = serde_json::to_string(&doc).unwrap();
        let err = from_json(&json).unwrap_err();
        assert!(matches!(err, IrError::VersionMismatch { .. }));
    }
}
