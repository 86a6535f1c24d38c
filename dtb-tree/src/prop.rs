//! Property handles and typed payload decoding.
//!
//! Payloads are plain byte sequences; the decoders here read them as
//! NUL-separated string lists or as arrays of big-endian cell groups. All
//! decoders are pure over the payload bytes: counts are floor divisions of
//! the payload length by the group stride, and trailing bytes that do not
//! fill a whole group are ignored.

use core::ffi::CStr;

use crate::{
    Pair, Quad, Triplet,
    arena::{PropCell, PropId},
    data::{CELL_SIZE, Cursor, StringListIter},
    node::NodeRef,
    tree::DeviceTree,
};

/// A handle to one property of a [`DeviceTree`].
#[derive(Clone, Copy)]
pub struct PropRef<'t, 'b> {
    pub(crate) tree: &'t DeviceTree<'b>,
    pub(crate) id: PropId,
}

impl<'t, 'b> PropRef<'t, 'b> {
    pub(crate) fn cell(&self) -> &'t PropCell<'b> {
        // Handles borrow the tree, so the cell cannot have been removed.
        self.tree.arena.prop(self.id).expect("stale property id")
    }

    /// Returns this property's id, usable with the edit API.
    pub fn id(&self) -> PropId {
        self.id
    }

    /// Returns the property name.
    pub fn name(&self) -> &'t str {
        &self.cell().name
    }

    /// Returns the node this property belongs to.
    pub fn node(&self) -> Option<NodeRef<'t, 'b>> {
        self.tree.node(self.cell().node)
    }

    /// Returns the raw payload bytes.
    pub fn data(&self) -> &'t [u8] {
        self.cell().data.as_slice()
    }

    /// Returns the payload length in bytes.
    pub fn len(&self) -> usize {
        self.data().len()
    }

    /// Returns true if the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.data().is_empty()
    }

    /// Returns the payload as a single big-endian u32.
    ///
    /// Returns `None` unless the payload is exactly 4 bytes.
    pub fn as_u32(&self) -> Option<u32> {
        let data: &[u8; 4] = self.data().try_into().ok()?;
        Some(u32::from_be_bytes(*data))
    }

    /// Returns the payload as a single big-endian u64.
    ///
    /// Returns `None` unless the payload is exactly 8 bytes.
    pub fn as_u64(&self) -> Option<u64> {
        let data: &[u8; 8] = self.data().try_into().ok()?;
        Some(u64::from_be_bytes(*data))
    }

    /// Returns the payload as a NUL-terminated string.
    pub fn as_str(&self) -> Option<&'t str> {
        let cstr = CStr::from_bytes_until_nul(self.data()).ok()?;
        cstr.to_str().ok()
    }

    /// Returns the `index`-th string of a NUL-separated string list.
    ///
    /// Every NUL in the payload advances the index, so an empty entry in
    /// the middle of the list consumes an index of its own (and, having no
    /// bytes, can itself never be returned). Returns `None` once the list
    /// is exhausted.
    pub fn string_at(&self, index: usize) -> Option<&'t str> {
        let data = self.data();
        let mut current = 0;
        for (at, byte) in data.iter().enumerate() {
            if *byte == 0 {
                current += 1;
                continue;
            }
            if current == index {
                let cstr = CStr::from_bytes_until_nul(&data[at..]).ok()?;
                return cstr.to_str().ok();
            }
        }
        None
    }

    /// Returns an iterator over every NUL-terminated string in the payload.
    pub fn strings(&self) -> StringListIter<'t> {
        StringListIter::new(self.data())
    }

    /// Decodes the payload as an array of values, each `cell_count` cells
    /// wide.
    ///
    /// Values wider than two cells keep their low 64 bits. A zero
    /// `cell_count` yields an empty iterator.
    pub fn values(&self, cell_count: usize) -> Values<'t> {
        let data = self.data();
        let remaining = match cell_count {
            0 => 0,
            n => data.len() / (n * CELL_SIZE),
        };
        Values {
            cursor: Cursor::new(data),
            cell_count,
            remaining,
        }
    }

    /// Decodes the payload as an array of two-field groups, `layout`
    /// giving the cell count of each field. This is how `reg` is read:
    /// `pairs(Pair { a: address_cells, b: size_cells })`.
    pub fn pairs(&self, layout: Pair<usize>) -> Pairs<'t> {
        let stride = layout.a + layout.b;
        Pairs {
            cursor: Cursor::new(self.data()),
            layout,
            remaining: self.group_count(&[layout.a, layout.b], stride),
        }
    }

    /// Decodes the payload as an array of three-field groups.
    pub fn triplets(&self, layout: Triplet<usize>) -> Triplets<'t> {
        let stride = layout.a + layout.b + layout.c;
        Triplets {
            cursor: Cursor::new(self.data()),
            layout,
            remaining: self.group_count(&[layout.a, layout.b, layout.c], stride),
        }
    }

    /// Decodes the payload as an array of four-field groups.
    pub fn quads(&self, layout: Quad<usize>) -> Quads<'t> {
        let stride = layout.a + layout.b + layout.c + layout.d;
        Quads {
            cursor: Cursor::new(self.data()),
            layout,
            remaining: self.group_count(&[layout.a, layout.b, layout.c, layout.d], stride),
        }
    }

    fn group_count(&self, fields: &[usize], stride: usize) -> usize {
        if fields.contains(&0) {
            return 0;
        }
        self.len() / (stride * CELL_SIZE)
    }
}

impl PartialEq for PropRef<'_, '_> {
    fn eq(&self, other: &Self) -> bool {
        core::ptr::eq(self.tree, other.tree) && self.id == other.id
    }
}

impl core::fmt::Debug for PropRef<'_, '_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_tuple("PropRef")
            .field(&self.id)
            .field(&self.name())
            .finish()
    }
}

/// Iterator over fixed-width values of a property payload.
#[derive(Clone)]
pub struct Values<'a> {
    cursor: Cursor<'a>,
    cell_count: usize,
    remaining: usize,
}

impl Iterator for Values<'_> {
    type Item = u64;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        self.cursor.take_cells(self.cell_count)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for Values<'_> {}

/// Iterator over two-field cell groups of a property payload.
#[derive(Clone)]
pub struct Pairs<'a> {
    cursor: Cursor<'a>,
    layout: Pair<usize>,
    remaining: usize,
}

impl Iterator for Pairs<'_> {
    type Item = Pair;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        Some(Pair {
            a: self.cursor.take_cells(self.layout.a)?,
            b: self.cursor.take_cells(self.layout.b)?,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for Pairs<'_> {}

/// Iterator over three-field cell groups of a property payload.
#[derive(Clone)]
pub struct Triplets<'a> {
    cursor: Cursor<'a>,
    layout: Triplet<usize>,
    remaining: usize,
}

impl Iterator for Triplets<'_> {
    type Item = Triplet;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        Some(Triplet {
            a: self.cursor.take_cells(self.layout.a)?,
            b: self.cursor.take_cells(self.layout.b)?,
            c: self.cursor.take_cells(self.layout.c)?,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for Triplets<'_> {}

/// Iterator over four-field cell groups of a property payload.
#[derive(Clone)]
pub struct Quads<'a> {
    cursor: Cursor<'a>,
    layout: Quad<usize>,
    remaining: usize,
}

impl Iterator for Quads<'_> {
    type Item = Quad;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        Some(Quad {
            a: self.cursor.take_cells(self.layout.a)?,
            b: self.cursor.take_cells(self.layout.b)?,
            c: self.cursor.take_cells(self.layout.c)?,
            d: self.cursor.take_cells(self.layout.d)?,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for Quads<'_> {}
