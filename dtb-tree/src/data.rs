//! Byte-level access to blob data.
//!
//! Everything on the wire is big-endian and cell (4-byte) granular. The
//! [`Cursor`] here is the one primitive the rest of the crate reads
//! through: it consumes from the front of a borrowed slice and remembers
//! how many bytes it has eaten, which is what padding skips and error
//! offsets are computed from.

use core::ffi::CStr;

use crate::define::{FdtError, Token};

/// Size of one cell in bytes.
pub const CELL_SIZE: usize = 4;

/// Size of one memory reservation entry in bytes (two u64 words).
pub const MEM_RSV_ENTRY_SIZE: usize = 16;

/// Rounds `value` up to the next multiple of `alignment`.
pub(crate) fn align_up(value: usize, alignment: usize) -> usize {
    value.div_ceil(alignment) * alignment
}

/// Consuming reader over a borrowed byte slice.
///
/// Every read chops bytes off the front; the slices handed back keep the
/// original borrow's lifetime, so they stay usable after the cursor moves
/// on or is dropped. Running out of data yields `None` and leaves the
/// cursor where it was.
#[derive(Clone)]
pub struct Cursor<'a> {
    rest: &'a [u8],
    consumed: usize,
}

impl<'a> Cursor<'a> {
    /// Starts a cursor at the beginning of `data`.
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            rest: data,
            consumed: 0,
        }
    }

    /// Bytes consumed so far.
    pub fn offset(&self) -> usize {
        self.consumed
    }

    /// The bytes not yet consumed.
    pub fn rest(&self) -> &'a [u8] {
        self.rest
    }

    /// True once every byte has been consumed.
    pub fn is_exhausted(&self) -> bool {
        self.rest.is_empty()
    }

    /// Consumes `count` bytes and returns them.
    pub fn take(&mut self, count: usize) -> Option<&'a [u8]> {
        if count > self.rest.len() {
            return None;
        }
        let (head, tail) = self.rest.split_at(count);
        self.rest = tail;
        self.consumed += count;
        Some(head)
    }

    /// Consumes one cell as a big-endian u32.
    pub fn take_u32(&mut self) -> Option<u32> {
        let bytes: [u8; CELL_SIZE] = self.take(CELL_SIZE)?.try_into().ok()?;
        Some(u32::from_be_bytes(bytes))
    }

    /// Consumes two cells as one big-endian u64.
    pub fn take_u64(&mut self) -> Option<u64> {
        let bytes: [u8; 8] = self.take(8)?.try_into().ok()?;
        Some(u64::from_be_bytes(bytes))
    }

    /// Consumes `count` cells, concatenated big-endian into one value.
    ///
    /// Concatenations wider than two cells keep their low 64 bits.
    pub fn take_cells(&mut self, count: usize) -> Option<u64> {
        let mut value = 0u64;
        for _ in 0..count {
            value = (value << 32) | u64::from(self.take_u32()?);
        }
        Some(value)
    }

    /// Consumes one structure-block marker.
    pub fn take_token(&mut self) -> Result<Token, FdtError> {
        match self.take_u32() {
            Some(cell) => Ok(Token::from_cell(cell)),
            None => Err(FdtError::Truncated {
                offset: self.consumed,
            }),
        }
    }

    /// Consumes a NUL-terminated string, terminator included.
    pub fn take_cstr(&mut self) -> Result<&'a str, FdtError> {
        let text = CStr::from_bytes_until_nul(self.rest)?.to_str()?;
        let _ = self.take(text.len() + 1);
        Ok(text)
    }

    /// Consumes padding up to the next cell boundary.
    ///
    /// Boundaries are relative to where the cursor started, which for the
    /// structure block is the block base.
    pub fn skip_padding(&mut self) {
        let over = self.consumed % CELL_SIZE;
        if over != 0 {
            let _ = self.take(CELL_SIZE - over);
        }
    }
}

/// Iterates a payload cell by cell as u32 values.
#[derive(Clone)]
pub struct CellIter<'a> {
    cursor: Cursor<'a>,
}

impl<'a> CellIter<'a> {
    /// Iterates the cells of `data`; trailing partial cells are dropped.
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            cursor: Cursor::new(data),
        }
    }
}

impl Iterator for CellIter<'_> {
    type Item = u32;

    fn next(&mut self) -> Option<Self::Item> {
        self.cursor.take_u32()
    }
}

/// Iterates the entries of a NUL-separated string list.
#[derive(Clone)]
pub struct StringListIter<'a> {
    cursor: Cursor<'a>,
}

impl<'a> StringListIter<'a> {
    /// Iterates the strings packed into `data`, empty entries included.
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            cursor: Cursor::new(data),
        }
    }
}

impl<'a> Iterator for StringListIter<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor.is_exhausted() {
            return None;
        }
        self.cursor.take_cstr().ok()
    }
}
