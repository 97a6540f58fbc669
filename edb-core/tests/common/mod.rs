#![allow(dead_code)]

use byteorder::{LittleEndian, WriteBytesExt};
use flate2::Compression;
use flate2::write::ZlibEncoder;
use std::io::Write;

use edb_core::block::typed::{TAG_SEGMENTS, TAG_STRINGS};
use edb_core::block::SENTINEL_END;
use edb_core::container::filetab::{
    ENTRIES_PER_LIST, ENTRY_SIZE, LIST_BLOCK_LEN, LIST_HEADER_LEN, LIST_MARKER, NAME_FIELD_LEN,
};
use edb_core::container::fragment::FRAGMENT_HEADER_LEN;
use edb_core::container::header::{FIXED_LEN, GUID_LEN, ORIGIN_OFF, SUPPORTED_FILE_VERSION};

enum Content {
    Data { bytes: Vec<u8>, chunk: usize },
    SameAs(usize),
}

struct Spec {
    name: String,
    content: Content,
}

/// Writes synthetic database archives.
#[derive(Default)]
pub struct ArchiveBuilder {
    files: Vec<Spec>,
}

pub struct BuiltArchive {
    pub bytes: Vec<u8>,
    /// Offset of each file entry.
    pub entries: Vec<usize>,
    /// Fragment offsets of each entry's own chain (empty for duplicates).
    pub fragments: Vec<Vec<usize>>,
}

impl BuiltArchive {
    pub fn patch_u32(&mut self, at: usize, v: u32) {
        self.bytes[at..at + 4].copy_from_slice(&v.to_le_bytes());
    }
}

impl ArchiveBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn file(self, name: &str, bytes: &[u8]) -> Self {
        let chunk = bytes.len().max(1);
        self.fragmented(name, bytes, chunk)
    }

    pub fn fragmented(mut self, name: &str, bytes: &[u8], chunk: usize) -> Self {
        self.files.push(Spec {
            name: name.to_string(),
            content: Content::Data {
                bytes: bytes.to_vec(),
                chunk,
            },
        });
        self
    }

    /// An entry whose content starts at the first fragment of entry `of`.
    pub fn duplicate(mut self, name: &str, of: usize) -> Self {
        self.files.push(Spec {
            name: name.to_string(),
            content: Content::SameAs(of),
        });
        self
    }

    pub fn build(self) -> BuiltArchive {
        let mut buf = vec![0u8; ORIGIN_OFF];
        write_origin(&mut buf);
        align(&mut buf, 16);

        let n = self.files.len();
        let lists = n.div_ceil(ENTRIES_PER_LIST);
        let first_list = if lists == 0 { 0 } else { buf.len() };
        let list_offsets: Vec<usize> = (0..lists)
            .map(|k| first_list + k * LIST_BLOCK_LEN)
            .collect();
        buf.resize(buf.len() + lists * LIST_BLOCK_LEN, 0);

        let sharers: Vec<u32> = (0..n)
            .map(|i| {
                self.files
                    .iter()
                    .filter(|f| matches!(f.content, Content::SameAs(j) if j == i))
                    .count() as u32
            })
            .collect();

        let mut addresses = vec![0u32; n];
        let mut sizes = vec![0u32; n];
        let mut fragments = vec![Vec::new(); n];
        for (i, f) in self.files.iter().enumerate() {
            let Content::Data { bytes, chunk } = &f.content else {
                continue;
            };
            sizes[i] = bytes.len() as u32;
            let pieces: Vec<&[u8]> = bytes.chunks(*chunk).collect();
            for (k, piece) in pieces.iter().enumerate() {
                let at = buf.len();
                let pad = (4 - piece.len() % 4) % 4;
                let total = FRAGMENT_HEADER_LEN + piece.len() + pad;
                let next = if k + 1 < pieces.len() { at + total } else { 0 };
                for v in [piece.len(), total, sharers[i] as usize, next] {
                    buf.write_u32::<LittleEndian>(v as u32).unwrap();
                }
                buf.extend_from_slice(piece);
                buf.resize(buf.len() + pad, 0);
                fragments[i].push(at);
            }
            addresses[i] = fragments[i].first().map_or(0, |&a| a as u32);
        }
        for (i, f) in self.files.iter().enumerate() {
            if let Content::SameAs(j) = f.content {
                addresses[i] = addresses[j];
                sizes[i] = sizes[j];
            }
        }

        let mut entries = Vec::with_capacity(n);
        for (k, &list_at) in list_offsets.iter().enumerate() {
            let lo = k * ENTRIES_PER_LIST;
            let hi = (lo + ENTRIES_PER_LIST).min(n);
            let next = list_offsets.get(k + 1).copied().unwrap_or(0);
            let mut head = Vec::new();
            for v in [LIST_MARKER, (hi - lo) as u32, (hi - lo) as u32, next as u32, 0, 0] {
                head.write_u32::<LittleEndian>(v).unwrap();
            }
            buf[list_at..list_at + LIST_HEADER_LEN].copy_from_slice(&head);

            for i in lo..hi {
                let at = list_at + LIST_HEADER_LEN + (i - lo) * ENTRY_SIZE;
                let name = self.files[i].name.as_bytes();
                assert!(name.len() <= NAME_FIELD_LEN);
                let mut e = Vec::with_capacity(ENTRY_SIZE);
                e.write_u32::<LittleEndian>(at as u32).unwrap();
                e.write_u32::<LittleEndian>(name.len() as u32).unwrap();
                let mut field = [0u8; NAME_FIELD_LEN];
                field[..name.len()].copy_from_slice(name);
                e.extend_from_slice(&field);
                e.extend_from_slice(&[i as u8; GUID_LEN]);
                for v in [sizes[i], addresses[i], 0, 0] {
                    e.write_u32::<LittleEndian>(v).unwrap();
                }
                buf[at..at + ENTRY_SIZE].copy_from_slice(&e);
                entries.push(at);
            }
        }

        let mut head = Vec::with_capacity(FIXED_LEN);
        head.write_u32::<LittleEndian>(SUPPORTED_FILE_VERSION).unwrap();
        head.write_u32::<LittleEndian>(0x0200_0011).unwrap();
        head.extend_from_slice(&[0x11; GUID_LEN]);
        head.extend_from_slice(&[0x22; GUID_LEN]);
        for v in [n, lists, first_list, buf.len()] {
            head.write_u32::<LittleEndian>(v as u32).unwrap();
        }
        head.resize(FIXED_LEN, 0);
        buf[..FIXED_LEN].copy_from_slice(&head);

        BuiltArchive {
            bytes: buf,
            entries,
            fragments,
        }
    }
}

fn write_origin(buf: &mut Vec<u8>) {
    let put = |buf: &mut Vec<u8>, s: &str| {
        buf.write_u32::<LittleEndian>(s.len() as u32).unwrap();
        buf.extend_from_slice(s.as_bytes());
    };
    put(buf, "19.0.1");
    put(buf, "bench-07");
    put(buf, "designer");
    buf.write_u32::<LittleEndian>(1_600_000_000).unwrap();
    buf.write_u32::<LittleEndian>(4321).unwrap();
    put(buf, "Windows 10");
    put(buf, "Schematic Editor");
    put(buf, "C:\\work\\board.db");
    put(buf, "C:\\work\\settings");
}

fn align(buf: &mut Vec<u8>, to: usize) {
    let len = buf.len().div_ceil(to) * to;
    buf.resize(len, 0);
}

pub fn zlib(data: &[u8]) -> Vec<u8> {
    let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
    enc.write_all(data).unwrap();
    enc.finish().unwrap()
}

/// Writes a member-file block stream with literal elements only.
#[derive(Default)]
pub struct BlockWriter(Vec<u8>);

impl BlockWriter {
    pub fn new() -> Self {
        Self::default()
    }

    fn header(&mut self, key: &str, tag: u32) {
        self.0.write_u32::<LittleEndian>(key.len() as u32).unwrap();
        self.0.extend_from_slice(key.as_bytes());
        self.0.write_u32::<LittleEndian>(tag).unwrap();
    }

    fn payload(&mut self, padding: usize, body: &[u8]) {
        self.0.write_u32::<LittleEndian>((padding + body.len()) as u32).unwrap();
        self.0.resize(self.0.len() + padding, 0);
        self.0.extend_from_slice(body);
    }

    /// Records of `size` bytes given as flat `u32` fields, optionally with
    /// extra raw control words appended before the terminator.
    pub fn records(mut self, key: &str, size: u32, fields: &[u32], controls: &[u32]) -> Self {
        self.header(key, 0x0100_0000 | size);
        let mut body = Vec::new();
        for v in fields.iter().chain(controls).chain([&SENTINEL_END]) {
            body.write_u32::<LittleEndian>(*v).unwrap();
        }
        self.payload(20, &body);
        self
    }

    pub fn u32s(self, key: &str, vals: &[u32]) -> Self {
        self.records(key, 4, vals, &[])
    }

    pub fn strings(mut self, key: &str, vals: &[&str]) -> Self {
        self.header(key, TAG_STRINGS);
        let mut body = Vec::new();
        for s in vals {
            if s.len() <= 252 {
                body.push(s.len() as u8);
            } else {
                body.push(0xFD);
                body.write_u32::<LittleEndian>(s.len() as u32).unwrap();
            }
            body.extend_from_slice(s.as_bytes());
        }
        body.push(0xFF);
        self.payload(16, &body);
        self
    }

    /// Strings with a padding slot after the first element.
    pub fn strings_with_padding(mut self, key: &str, first: &str, rest: &[&str]) -> Self {
        self.header(key, TAG_STRINGS);
        let mut body = vec![first.len() as u8];
        body.extend_from_slice(first.as_bytes());
        body.push(0xFE);
        body.extend_from_slice(&[0; 4]);
        for s in rest {
            body.push(s.len() as u8);
            body.extend_from_slice(s.as_bytes());
        }
        body.push(0xFF);
        self.payload(16, &body);
        self
    }

    pub fn segments(mut self, key: &str, segs: &[&[u32]]) -> Self {
        self.header(key, TAG_SEGMENTS);
        let mut body = Vec::new();
        for s in segs {
            body.write_u32::<LittleEndian>(s.len() as u32).unwrap();
            for v in *s {
                body.write_u32::<LittleEndian>(*v).unwrap();
            }
        }
        body.write_u32::<LittleEndian>(SENTINEL_END).unwrap();
        self.payload(20, &body);
        self
    }

    pub fn finish(mut self) -> Vec<u8> {
        self.0.write_u32::<LittleEndian>(0).unwrap();
        self.0
    }
}
