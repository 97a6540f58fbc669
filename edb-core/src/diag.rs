//! Non-fatal anomalies.
//!
//! The database format carries no checksums; cross-field consistency is the
//! only corruption signal. Every inconsistency is recorded here and decoding
//! carries on with whatever can still be read.

use serde::Serialize;
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// Header, file-table or fragment fields disagree with each other.
    Structural,
    /// Header carries a version whose layout may differ.
    UnsupportedVersion,
    /// Block payload tag differs from what the consumer expected.
    TypeMismatch,
    /// Declared and computed element counts differ.
    CountMismatch,
    /// Payload could not be decoded (truncated or malformed sentinel stream).
    Payload,
    /// Key is not part of the schema used for this member file.
    UnknownKey,
    /// Writing output failed.
    Resource,
    /// A field that should always hold a known value does not. The field's
    /// purpose is unknown, so this never fails a run.
    Warning,
}

impl DiagnosticKind {
    /// Whether this kind marks an extraction run as failed.
    pub fn is_failure(self) -> bool {
        matches!(self, Self::Structural | Self::Payload | Self::Resource)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:?}] {}", self.kind, self.message)
    }
}

/// Ordered collection of diagnostics. Each push is mirrored to `tracing`.
#[derive(Clone, Debug, Default, Serialize)]
#[serde(transparent)]
pub struct Diagnostics(Vec<Diagnostic>);

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, kind: DiagnosticKind, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(kind = ?kind, "{message}");
        self.0.push(Diagnostic { kind, message });
    }

    pub fn structural(&mut self, message: impl Into<String>) {
        self.push(DiagnosticKind::Structural, message);
    }

    pub fn extend(&mut self, other: Diagnostics) {
        self.0.extend(other.0);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.0.iter()
    }

    pub fn has_failures(&self) -> bool {
        self.0.iter().any(|d| d.kind.is_failure())
    }

    pub fn count(&self, kind: DiagnosticKind) -> usize {
        self.0.iter().filter(|d| d.kind == kind).count()
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.0
    }
}
