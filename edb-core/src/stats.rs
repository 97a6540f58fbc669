use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ExtractStats {
    pub written: u64,
    pub linked: u64,
    pub skipped: u64,
    pub failed: u64,
    /// Bytes reassembled from fragment chains.
    pub stored_bytes: u64,
    /// Bytes written after inflation.
    pub output_bytes: u64,
    pub compressed_members: u64,
}
