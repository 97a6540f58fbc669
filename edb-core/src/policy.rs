use serde::{Deserialize, Serialize};

/// What to do with an entry whose content starts at a fragment an earlier
/// entry already claimed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DuplicatePolicy {
    /// Write every entry's bytes out separately.
    #[default]
    MaterializeAll,
    /// Hard-link the output of the earlier entry.
    LinkDuplicates,
    /// Write nothing for the duplicate.
    SkipDuplicates,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExtractOptions {
    /// Inflate members that carry a zlib signature.
    pub decompress: bool,
    pub duplicates: DuplicatePolicy,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            decompress: true,
            duplicates: DuplicatePolicy::MaterializeAll,
        }
    }
}
