use crate::diag::Diagnostics;

/// How a member file's stored bytes are encoded.
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CodecId {
    Store = 0,
    Zlib = 1,
}

/// Second bytes that may follow `0x78` in a zlib stream header written by
/// the vendor tool.
const ZLIB_FLG: [u8; 4] = [0x01, 0x5E, 0x9C, 0xDA];

pub fn detect(bytes: &[u8]) -> CodecId {
    match bytes {
        [0x78, flg, ..] if ZLIB_FLG.contains(flg) => CodecId::Zlib,
        _ => CodecId::Store,
    }
}

/// Member bytes after optional inflation.
#[derive(Debug)]
pub struct Inflated {
    pub bytes: Vec<u8>,
    /// Codec the stored bytes were found in, whether or not they were
    /// inflated.
    pub codec: CodecId,
    /// True when the bytes were actually inflated.
    pub inflated: bool,
}

/// Inflate `raw` when `allow` is set and it carries a zlib signature.
///
/// A stream that fails to inflate is reported and the raw bytes are kept.
pub fn inflate_member(raw: Vec<u8>, allow: bool, diags: &mut Diagnostics) -> Inflated {
    let codec = detect(&raw);
    if !allow || codec == CodecId::Store {
        return Inflated {
            bytes: raw,
            codec,
            inflated: false,
        };
    }
    match zlib::inflate(&raw) {
        Ok(out) => {
            tracing::debug!(stored = raw.len(), inflated = out.len(), "member inflated");
            Inflated {
                bytes: out,
                codec,
                inflated: true,
            }
        }
        Err(e) => {
            diags.push(e.diagnostic_kind(), format!("member inflate: {e}"));
            Inflated {
                bytes: raw,
                codec,
                inflated: false,
            }
        }
    }
}

pub mod zlib;
