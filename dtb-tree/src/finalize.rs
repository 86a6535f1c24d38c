//! Blob emission.
//!
//! Serialization runs in two passes over the same pre-order walk: a sizing
//! pass that tallies structure-block cells and strings-block bytes, and an
//! emission pass that writes the header, the memory reservation block, the
//! token stream and the string pool into a caller buffer.

use alloc::vec::Vec;
use core::ops::Deref;

use crate::{
    FDT_LAST_COMP_VERSION, FDT_MAGIC, FDT_VERSION, FdtError, Token,
    data::{CELL_SIZE, MEM_RSV_ENTRY_SIZE, align_up},
    header::HEADER_SIZE,
    node::NodeRef,
    tree::DeviceTree,
};

/// An emitted device tree blob.
///
/// Backed by u32 storage so the data is always 4-byte aligned, as the
/// format requires of in-memory blobs.
#[derive(Clone, Debug)]
pub struct Blob {
    words: Vec<u32>,
    len: usize,
}

impl Blob {
    /// Returns the blob length in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if the blob is empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Deref for Blob {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        unsafe { core::slice::from_raw_parts(self.words.as_ptr() as *const u8, self.len) }
    }
}

impl AsRef<[u8]> for Blob {
    fn as_ref(&self) -> &[u8] {
        self
    }
}

/// Cell and byte tallies gathered by the sizing pass.
struct Sizes {
    struct_cells: usize,
    strings_bytes: usize,
}

/// Write cursor over the structure and strings windows of the output
/// buffer. Every write is bounds-checked against its window.
struct Emitter<'e> {
    buf: &'e mut [u8],
    struct_pos: usize,
    struct_end: usize,
    strings_start: usize,
    string_pos: usize,
    string_end: usize,
}

impl Emitter<'_> {
    fn push_struct_u32(&mut self, value: u32) -> Result<(), FdtError> {
        let end = self.struct_pos + CELL_SIZE;
        if end > self.struct_end {
            return Err(FdtError::OutputTooSmall { needed: end });
        }
        self.buf[self.struct_pos..end].copy_from_slice(&value.to_be_bytes());
        self.struct_pos = end;
        Ok(())
    }

    fn push_struct_token(&mut self, token: Token) -> Result<(), FdtError> {
        self.push_struct_u32(token.cell())
    }

    /// Writes `bytes` plus a NUL terminator, zero-padded to a cell boundary.
    fn push_struct_padded(&mut self, bytes: &[u8]) -> Result<(), FdtError> {
        self.push_struct_region(bytes, align_up(bytes.len() + 1, CELL_SIZE))
    }

    /// Writes a payload zero-padded to a cell boundary, without the
    /// terminator `push_struct_padded` adds.
    fn push_struct_payload(&mut self, bytes: &[u8]) -> Result<(), FdtError> {
        self.push_struct_region(bytes, align_up(bytes.len(), CELL_SIZE))
    }

    fn push_struct_region(&mut self, bytes: &[u8], padded: usize) -> Result<(), FdtError> {
        let end = self.struct_pos + padded;
        if end > self.struct_end {
            return Err(FdtError::OutputTooSmall { needed: end });
        }
        self.buf[self.struct_pos..self.struct_pos + bytes.len()].copy_from_slice(bytes);
        self.buf[self.struct_pos + bytes.len()..end].fill(0);
        self.struct_pos = end;
        Ok(())
    }

    /// Appends a NUL-terminated name to the string pool, returning its
    /// offset within the strings block.
    fn push_string(&mut self, name: &str) -> Result<u32, FdtError> {
        let offset = self.string_pos - self.strings_start;
        let end = self.string_pos + name.len() + 1;
        if end > self.string_end {
            return Err(FdtError::OutputTooSmall { needed: end });
        }
        self.buf[self.string_pos..self.string_pos + name.len()].copy_from_slice(name.as_bytes());
        self.buf[self.string_pos + name.len()] = 0;
        self.string_pos = end;
        Ok(offset as u32)
    }
}

impl<'a> DeviceTree<'a> {
    /// Returns the number of bytes [`DeviceTree::finalize_into`] needs.
    pub fn finalized_size(&self) -> usize {
        let sizes = self.sizes();
        let rsv_count = self.memory_reservations().count();
        HEADER_SIZE
            + (rsv_count + 1) * MEM_RSV_ENTRY_SIZE
            + sizes.struct_cells * CELL_SIZE
            + sizes.strings_bytes
    }

    /// Serializes the tree into `buffer` and returns the bytes written.
    ///
    /// The buffer must be 4-byte aligned and at least
    /// [`DeviceTree::finalized_size`] bytes long. On error the buffer
    /// contents are unspecified.
    pub fn finalize_into(&self, buffer: &mut [u8]) -> Result<usize, FdtError> {
        if buffer.as_ptr() as usize % CELL_SIZE != 0 {
            return Err(FdtError::MisalignedBuffer);
        }

        let sizes = self.sizes();
        let rsv_count = self.memory_reservations().count();
        let struct_bytes = sizes.struct_cells * CELL_SIZE;
        let off_struct = HEADER_SIZE + (rsv_count + 1) * MEM_RSV_ENTRY_SIZE;
        let off_strings = off_struct + struct_bytes;
        let total = off_strings + sizes.strings_bytes;
        if buffer.len() < total {
            return Err(FdtError::OutputTooSmall { needed: total });
        }

        let fields: [u32; 10] = [
            FDT_MAGIC,
            total as u32,
            off_struct as u32,
            off_strings as u32,
            HEADER_SIZE as u32,
            FDT_VERSION,
            FDT_LAST_COMP_VERSION,
            self.boot_cpuid_phys,
            sizes.strings_bytes as u32,
            struct_bytes as u32,
        ];
        for (chunk, value) in buffer[..HEADER_SIZE].chunks_mut(CELL_SIZE).zip(fields) {
            chunk.copy_from_slice(&value.to_be_bytes());
        }

        let mut pos = HEADER_SIZE;
        for entry in self.memory_reservations() {
            buffer[pos..pos + 8].copy_from_slice(&entry.address.to_be_bytes());
            buffer[pos + 8..pos + 16].copy_from_slice(&entry.size.to_be_bytes());
            pos += MEM_RSV_ENTRY_SIZE;
        }
        // The reservation block has no size field; an all-zero entry
        // terminates it.
        buffer[pos..pos + MEM_RSV_ENTRY_SIZE].fill(0);

        let mut emitter = Emitter {
            buf: buffer,
            struct_pos: off_struct,
            struct_end: off_strings,
            strings_start: off_strings,
            string_pos: off_strings,
            string_end: total,
        };
        // Offset 0 of the strings block holds the empty string.
        emitter.push_string("")?;

        for root in self.roots() {
            self.emit_node(root, &mut emitter)?;
        }

        Ok(total)
    }

    /// Serializes the tree into a fresh, aligned buffer.
    pub fn to_blob(&self) -> Result<Blob, FdtError> {
        let size = self.finalized_size();
        let mut words = alloc::vec![0u32; size.div_ceil(CELL_SIZE)];
        let len = {
            let bytes = unsafe {
                core::slice::from_raw_parts_mut(
                    words.as_mut_ptr() as *mut u8,
                    words.len() * CELL_SIZE,
                )
            };
            self.finalize_into(bytes)?
        };
        Ok(Blob { words, len })
    }

    fn sizes(&self) -> Sizes {
        let mut sizes = Sizes {
            struct_cells: 0,
            // One byte so that offset 0 is the empty string.
            strings_bytes: 1,
        };
        for root in self.roots() {
            self.size_node(root, &mut sizes);
        }
        sizes
    }

    fn size_node(&self, node: NodeRef<'_, 'a>, sizes: &mut Sizes) {
        sizes.struct_cells += 2 + align_up(node.name().len() + 1, CELL_SIZE) / CELL_SIZE;
        for prop in node.properties() {
            sizes.struct_cells += 3 + align_up(prop.len(), CELL_SIZE) / CELL_SIZE;
            sizes.strings_bytes += prop.name().len() + 1;
        }
        for child in node.children() {
            self.size_node(child, sizes);
        }
    }

    fn emit_node(&self, node: NodeRef<'_, 'a>, emitter: &mut Emitter<'_>) -> Result<(), FdtError> {
        emitter.push_struct_token(Token::BeginNode)?;
        emitter.push_struct_padded(node.name().as_bytes())?;

        for prop in node.properties() {
            emitter.push_struct_token(Token::Prop)?;
            emitter.push_struct_u32(prop.len() as u32)?;
            let nameoff = emitter.push_string(prop.name())?;
            emitter.push_struct_u32(nameoff)?;
            emitter.push_struct_payload(prop.data())?;
        }

        for child in node.children() {
            self.emit_node(child, emitter)?;
        }

        emitter.push_struct_token(Token::EndNode)
    }
}
