#![forbid(unsafe_code)]

pub mod diag;
pub mod error;
pub mod policy;

pub mod block;
pub mod codec;

pub mod container {
    pub mod filetab;
    pub mod fragment;
    pub mod header;
}

pub mod read {
    pub mod archive;
    pub mod extract;
}

pub mod assemble;
pub mod decode;
pub mod domain;
pub mod list;
pub mod schematic;
pub mod stats;

// Re-exports: stable API surface
pub use decode::{BlockMap, DecodedFile, Schema, decode_member_file, decode_with_schema};
pub use diag::{Diagnostic, DiagnosticKind, Diagnostics};
pub use list::{Listing, list};
pub use policy::{DuplicatePolicy, ExtractOptions};
pub use read::archive::{Archive, Member};
pub use read::extract::{ExtractReport, extract};
pub use schematic::{Entity, EntityKind, Sheet};
