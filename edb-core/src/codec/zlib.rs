use crate::error::{EdbError, Result};
use flate2::read::ZlibDecoder;
use std::io::Read;

const CHUNK: usize = 1 << 16;

/// Largest member accepted after inflation.
pub const MAX_INFLATED_BYTES: usize = 1 << 30;

/// Inflate a whole zlib stream in 64 KiB reads.
pub fn inflate(src: &[u8]) -> Result<Vec<u8>> {
    inflate_limited(src, MAX_INFLATED_BYTES)
}

pub(crate) fn inflate_limited(src: &[u8], limit: usize) -> Result<Vec<u8>> {
    let mut dec = ZlibDecoder::new(src);
    let mut buf = vec![0u8; CHUNK];
    let mut out = Vec::new();
    loop {
        let k = dec
            .read(&mut buf)
            .map_err(|e| EdbError::Inflate(e.to_string()))?;
        if k == 0 {
            return Ok(out);
        }
        if out.len() + k > limit {
            return Err(EdbError::Oversized {
                offset: out.len(),
                limit,
            });
        }
        out.try_reserve(k)
            .map_err(|_| EdbError::Alloc { bytes: out.len() + k })?;
        out.extend_from_slice(&buf[..k]);
    }
}
