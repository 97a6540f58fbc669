use thiserror::Error;

use crate::assemble::JoinError;
use crate::block::typed::BlockType;
use crate::diag::DiagnosticKind;

#[derive(Error, Debug)]
pub enum EdbError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Format error: {0}")]
    Format(String),

    #[error("archive too small: {len} bytes, need at least {need}")]
    TooSmall { len: u64, need: u64 },

    #[error("type mismatch: expected {expected}, found tag {actual:#010x}")]
    TypeMismatch { expected: BlockType, actual: u32 },

    #[error("count mismatch: expected {expected} elements, decoded {found}")]
    CountMismatch { expected: usize, found: usize },

    #[error("payload truncated at offset {offset}: {context}")]
    Truncated { offset: usize, context: &'static str },

    #[error("malformed payload at offset {offset}: {context}")]
    Malformed { offset: usize, context: &'static str },

    #[error("payload at offset {offset} expands past {limit} bytes")]
    Oversized { offset: usize, limit: usize },

    #[error("could not allocate {bytes} bytes")]
    Alloc { bytes: usize },

    #[error("inflate failed: {0}")]
    Inflate(String),

    #[error(transparent)]
    Join(#[from] JoinError),
}

impl EdbError {
    /// How a block-level failure is classified when it is downgraded to a
    /// diagnostic.
    pub fn diagnostic_kind(&self) -> DiagnosticKind {
        match self {
            EdbError::TypeMismatch { .. } => DiagnosticKind::TypeMismatch,
            EdbError::CountMismatch { .. } => DiagnosticKind::CountMismatch,
            EdbError::Truncated { .. } | EdbError::Malformed { .. } | EdbError::Inflate(_) => {
                DiagnosticKind::Payload
            }
            EdbError::Io(_) | EdbError::Oversized { .. } | EdbError::Alloc { .. } => {
                DiagnosticKind::Resource
            }
            EdbError::Format(_) | EdbError::TooSmall { .. } | EdbError::Join(_) => {
                DiagnosticKind::Structural
            }
        }
    }
}

// Convenient crate-wide result type
pub type Result<T> = std::result::Result<T, EdbError>;
