use byteorder::{ByteOrder, LittleEndian};

use crate::error::{EdbError, Result};

/// Forward cursor over one member-file buffer.
///
/// Every read is bounds-checked and reports the offset it failed at; the
/// cursor never moves past the end of the buffer.
#[derive(Clone, Debug)]
pub struct BlockCursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> BlockCursor<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn at(buf: &'a [u8], pos: usize) -> Self {
        Self {
            buf,
            pos: pos.min(buf.len()),
        }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn set_position(&mut self, pos: usize) {
        self.pos = pos.min(self.buf.len());
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Unread tail of the buffer.
    pub fn rest(&self) -> &'a [u8] {
        &self.buf[self.pos..]
    }

    pub fn advance(&mut self, n: usize) {
        self.set_position(self.pos.saturating_add(n));
    }

    pub fn rewind(&mut self, n: usize) {
        self.pos = self.pos.saturating_sub(n);
    }

    fn need(&self, n: usize, context: &'static str) -> Result<()> {
        if self.remaining() < n {
            return Err(EdbError::Truncated {
                offset: self.pos,
                context,
            });
        }
        Ok(())
    }

    pub fn read_u8(&mut self, context: &'static str) -> Result<u8> {
        self.need(1, context)?;
        let b = self.buf[self.pos];
        self.pos += 1;
        Ok(b)
    }

    pub fn read_u32(&mut self, context: &'static str) -> Result<u32> {
        self.need(4, context)?;
        let v = LittleEndian::read_u32(&self.buf[self.pos..self.pos + 4]);
        self.pos += 4;
        Ok(v)
    }

    pub fn read_bytes(&mut self, n: usize, context: &'static str) -> Result<&'a [u8]> {
        self.need(n, context)?;
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    pub fn skip(&mut self, n: usize, context: &'static str) -> Result<()> {
        self.need(n, context)?;
        self.pos += n;
        Ok(())
    }
}
