//! Member-file decode: walk every block and collect decoded payloads by key.

use rayon::prelude::*;
use std::collections::{BTreeMap, HashMap};

use crate::block::cursor::BlockCursor;
use crate::block::stream::{BlockHeader, walk_blocks};
use crate::block::typed::{BlockType, CountCell, TypedArray};
use crate::block::{decode_by_tag, decode_payload};
use crate::diag::{DiagnosticKind, Diagnostics};
use crate::error::EdbError;

/// Decoded arrays of one member file, by key.
pub type BlockMap = BTreeMap<String, TypedArray>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FieldSpec {
    pub block_type: BlockType,
    /// Fields naming the same group must all decode to the same length.
    pub count_group: Option<&'static str>,
}

/// Keys a member-file kind is expected to contain, with their shapes.
#[derive(Clone, Debug, Default)]
pub struct Schema {
    fields: BTreeMap<&'static str, FieldSpec>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, key: &'static str, block_type: BlockType) -> Self {
        self.fields.insert(
            key,
            FieldSpec {
                block_type,
                count_group: None,
            },
        );
        self
    }

    pub fn grouped(
        mut self,
        key: &'static str,
        block_type: BlockType,
        group: &'static str,
    ) -> Self {
        self.fields.insert(
            key,
            FieldSpec {
                block_type,
                count_group: Some(group),
            },
        );
        self
    }

    pub fn get(&self, key: &str) -> Option<&FieldSpec> {
        self.fields.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.fields.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct DecodedFile {
    pub blocks: BlockMap,
    /// Blocks seen, including ones that failed to decode.
    pub block_count: usize,
    pub diagnostics: Diagnostics,
}

/// Decode every block by its own tag. Blocks with unknown tags are skipped.
pub fn decode_member_file(buf: &[u8]) -> DecodedFile {
    let mut blocks = BlockMap::new();
    let mut diags = Diagnostics::new();
    let summary = walk_blocks(buf, |h, cur| {
        let mut count = CountCell::Unconstrained;
        match decode_by_tag(cur, h.tag, &mut count)? {
            Some(arr) => insert(&mut blocks, h, arr, &mut diags),
            None => tracing::debug!(
                key = %h.key,
                tag = format_args!("{:#010x}", h.tag),
                "unknown tag skipped"
            ),
        }
        Ok(())
    });
    finish(blocks, summary.blocks, summary.diagnostics, diags)
}

/// Decode the blocks `schema` names, each as the shape it declares.
///
/// Keys outside the schema, and blocks whose tag disagrees with it, are
/// recorded and stepped over.
pub fn decode_with_schema(buf: &[u8], schema: &Schema) -> DecodedFile {
    let mut blocks = BlockMap::new();
    let mut diags = Diagnostics::new();
    let mut groups: HashMap<&'static str, CountCell> = HashMap::new();

    let summary = walk_blocks(buf, |h, cur| {
        let Some(spec) = schema.get(&h.key) else {
            diags.push(
                DiagnosticKind::UnknownKey,
                format!("block {:?} ({:#010x}) is not part of this file kind", h.key, h.tag),
            );
            step_over(cur, h.tag);
            return Ok(());
        };

        let mut own = CountCell::Unconstrained;
        let cell = match spec.count_group {
            Some(g) => groups.entry(g).or_default(),
            None => &mut own,
        };
        match decode_payload(cur, h.tag, spec.block_type, cell) {
            Ok(arr) => {
                insert(&mut blocks, h, arr, &mut diags);
                Ok(())
            }
            Err(e @ EdbError::TypeMismatch { .. }) => {
                step_over(cur, h.tag);
                Err(e)
            }
            Err(e) => Err(e),
        }
    });
    finish(blocks, summary.blocks, summary.diagnostics, diags)
}

/// Decode independent member files on the rayon pool.
pub fn decode_members_parallel<B>(members: &[B], schema: Option<&Schema>) -> Vec<DecodedFile>
where
    B: AsRef<[u8]> + Sync,
{
    members
        .par_iter()
        .map(|m| match schema {
            Some(s) => decode_with_schema(m.as_ref(), s),
            None => decode_member_file(m.as_ref()),
        })
        .collect()
}

/// Move the cursor past a payload that will not be kept, so the terminator
/// scan starts after any data that could imitate a terminator.
fn step_over(cur: &mut BlockCursor<'_>, tag: u32) {
    let start = cur.position();
    if decode_by_tag(cur, tag, &mut CountCell::Unconstrained).is_err() {
        cur.set_position(start);
    }
}

fn insert(blocks: &mut BlockMap, h: &BlockHeader<'_>, arr: TypedArray, diags: &mut Diagnostics) {
    tracing::debug!(key = %h.key, ty = %arr.block_type(), len = arr.len(), "block decoded");
    if blocks.contains_key(&*h.key) {
        diags.push(
            DiagnosticKind::Warning,
            format!("block {:?} at {:#x} repeats an earlier key; first kept", h.key, h.offset),
        );
        return;
    }
    blocks.insert(h.key.to_string(), arr);
}

fn finish(
    blocks: BlockMap,
    block_count: usize,
    walk: Diagnostics,
    own: Diagnostics,
) -> DecodedFile {
    let mut diagnostics = walk;
    diagnostics.extend(own);
    DecodedFile {
        blocks,
        block_count,
        diagnostics,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::testutil::{Payload, block};
    use crate::block::typed::TAG_STRINGS;
    use crate::block::{SENTINEL_END, SENTINEL_INCREMENT};

    fn u32_block(key: &str, vals: &[u32]) -> Vec<u8> {
        block(
            key,
            BlockType::records(4).tag(),
            &Payload::records().words(vals).word(SENTINEL_END).finish(),
        )
    }

    fn strings_block(key: &str, vals: &[&[u8]]) -> Vec<u8> {
        let p = vals.iter().fold(Payload::strings(), |p, s| p.short_str(s));
        block(key, TAG_STRINGS, &p.byte(0xFF).finish())
    }

    #[test]
    fn decodes_every_block_by_tag() {
        let mut buf = u32_block("Ids", &[5, SENTINEL_INCREMENT, 2]);
        buf.extend(strings_block("Names", &[b"a", b"b", b"c"]));
        buf.extend_from_slice(&0u32.to_le_bytes());

        let f = decode_member_file(&buf);
        assert!(f.diagnostics.is_empty(), "{:?}", f.diagnostics);
        assert_eq!(f.block_count, 2);
        assert_eq!(f.blocks["Ids"].as_records().unwrap().column_u32(0), [5, 6, 7]);
        assert_eq!(f.blocks["Names"].len(), 3);
    }

    #[test]
    fn unknown_keys_are_reported_and_skipped() {
        let schema = Schema::new().field("Ids", BlockType::records(4));
        // 0xFF inside the skipped payload must not be taken as its end.
        let mut buf = strings_block("Extra", &[&[0xFF, 0xFF]]);
        buf.extend(u32_block("Ids", &[1, 2]));

        let f = decode_with_schema(&buf, &schema);
        assert_eq!(f.diagnostics.count(DiagnosticKind::UnknownKey), 1);
        assert_eq!(f.diagnostics.len(), 1);
        assert!(!f.blocks.contains_key("Extra"));
        assert_eq!(f.blocks["Ids"].len(), 2);
    }

    #[test]
    fn type_mismatch_fails_only_that_block() {
        let schema = Schema::new()
            .field("Names", BlockType::records(4))
            .field("Ids", BlockType::records(4));
        let mut buf = strings_block("Names", &[b"x"]);
        buf.extend(u32_block("Ids", &[9]));

        let f = decode_with_schema(&buf, &schema);
        assert_eq!(f.diagnostics.count(DiagnosticKind::TypeMismatch), 1);
        assert!(!f.blocks.contains_key("Names"));
        assert_eq!(f.blocks["Ids"].as_records().unwrap().column_u32(0), [9]);
    }

    #[test]
    fn count_groups_isolate_the_disagreeing_block() {
        let schema = Schema::new()
            .grouped("A", BlockType::records(4), "g")
            .grouped("B", BlockType::records(4), "g")
            .grouped("C", BlockType::records(4), "g");
        let mut buf = u32_block("A", &[1, 2, 3]);
        buf.extend(u32_block("B", &[1, 2]));
        buf.extend(u32_block("C", &[4, 5, 6]));

        let f = decode_with_schema(&buf, &schema);
        assert_eq!(f.diagnostics.count(DiagnosticKind::CountMismatch), 1);
        assert!(f.blocks.contains_key("A"));
        assert!(!f.blocks.contains_key("B"));
        assert!(f.blocks.contains_key("C"));
    }

    #[test]
    fn repeated_key_keeps_first() {
        let mut buf = u32_block("Ids", &[1]);
        buf.extend(u32_block("Ids", &[2, 3]));
        let f = decode_member_file(&buf);
        assert_eq!(f.blocks["Ids"].len(), 1);
        assert_eq!(f.diagnostics.count(DiagnosticKind::Warning), 1);
    }

    #[test]
    fn parallel_matches_sequential() {
        let files: Vec<Vec<u8>> = (1..=8u32)
            .map(|n| u32_block("Ids", &(0..n).collect::<Vec<_>>()))
            .collect();
        let out = decode_members_parallel(&files, None);
        for (n, f) in (1..=8usize).zip(&out) {
            assert_eq!(f.blocks["Ids"].len(), n);
        }
    }
}
