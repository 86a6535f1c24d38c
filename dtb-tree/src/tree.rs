//! The parsed device tree.
//!
//! `DeviceTree` owns the arena behind one parsed (or programmatically
//! built) tree and is the entry point for every lookup. Nodes and
//! properties are handed out as lightweight [`NodeRef`]/[`PropRef`] handles
//! borrowing the tree.

use crate::{
    FdtError, MemoryReservation, Phandle,
    arena::{Arena, NodeCell, NodeId, PropId, Str},
    builder,
    data::{Cursor, MEM_RSV_ENTRY_SIZE},
    header::Header,
    node::{NodeRef, Siblings},
    prop::PropRef,
};

/// Iterator over memory reservation entries.
///
/// Entries are read until the terminating all-zero entry (or the end of
/// the block, for blobs that lack the terminator).
pub struct MemoryReservationIter<'a> {
    cursor: Cursor<'a>,
}

impl Iterator for MemoryReservationIter<'_> {
    type Item = MemoryReservation;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor.rest().len() < MEM_RSV_ENTRY_SIZE {
            return None;
        }
        let address = self.cursor.take_u64()?;
        let size = self.cursor.take_u64()?;
        if address == 0 && size == 0 {
            return None;
        }
        Some(MemoryReservation { address, size })
    }
}

/// A navigable Flattened Device Tree.
///
/// Created either by parsing a blob with [`DeviceTree::from_bytes`] or as
/// an empty tree with [`DeviceTree::empty`]. Parsing borrows the blob:
/// node names and property payloads point into the caller's buffer and the
/// buffer must outlive the tree. The blob itself is never written to.
///
/// Dropping the tree releases the arena and any storage the edit API
/// allocated; re-initialization is simply building a new value.
pub struct DeviceTree<'a> {
    pub(crate) arena: Arena<'a>,
    pub(crate) first_root: Option<NodeId>,
    mem_rsv: &'a [u8],
    /// Boot CPU id, captured from the header and written back on finalize.
    pub boot_cpuid_phys: u32,
}

impl<'a> DeviceTree<'a> {
    /// Parses a device tree blob.
    ///
    /// The slice must hold a complete blob; the header's `totalsize` and
    /// block offsets are validated against it. The structure block is
    /// scanned once to size the arena, then the tree is built in a second
    /// pass.
    ///
    /// # Errors
    ///
    /// Any failure leaves no tree behind: bad magic, a header pointing
    /// outside the slice, a node without its terminating tag, or arena
    /// exhaustion in static-buffer mode.
    pub fn from_bytes(data: &'a [u8]) -> Result<Self, FdtError> {
        let header = Header::from_bytes(data)?;
        let total = header.totalsize as usize;
        if data.len() < total {
            return Err(FdtError::Truncated { offset: data.len() });
        }

        let block = |off: u32, size: u32| -> Result<&'a [u8], FdtError> {
            let (off, size) = (off as usize, size as usize);
            let end = off.checked_add(size).filter(|end| *end <= total);
            match end {
                Some(end) => Ok(&data[off..end]),
                None => Err(FdtError::Truncated { offset: total }),
            }
        };

        let structs = block(header.off_dt_struct, header.size_dt_struct)?;
        let strings = block(header.off_dt_strings, header.size_dt_strings)?;
        let mem_rsv = block(
            header.off_mem_rsvmap,
            (total as u32).saturating_sub(header.off_mem_rsvmap),
        )?;

        let sizing = builder::scan(structs);
        let mut arena = Arena::with_capacity(sizing.node_count, sizing.prop_count)?;
        let first_root = builder::build(&mut arena, structs, strings)?;

        Ok(Self {
            arena,
            first_root,
            mem_rsv,
            boot_cpuid_phys: header.boot_cpuid_phys,
        })
    }

    /// Creates an empty tree holding a single root node with no name.
    ///
    /// This is the starting point for building a tree from scratch with
    /// the edit API.
    pub fn empty() -> Self {
        let mut tree = Self {
            arena: Arena::new(),
            first_root: None,
            mem_rsv: &[],
            boot_cpuid_phys: 0,
        };
        // The arena always has room for at least the root node.
        if let Ok(root) = tree.arena.push_node(NodeCell::new(Str::Borrowed(""), None)) {
            tree.first_root = Some(root);
        }
        tree
    }

    /// Returns the first root node.
    ///
    /// Most blobs have exactly one; the rare multi-root blob exposes the
    /// extra roots through [`DeviceTree::roots`].
    pub fn root(&self) -> Option<NodeRef<'_, 'a>> {
        self.node(self.first_root?)
    }

    /// Returns an iterator over all top-level nodes.
    pub fn roots(&self) -> Siblings<'_, 'a> {
        Siblings::new(self, self.first_root)
    }

    /// Resolves a node id into a handle.
    ///
    /// Returns `None` for ids whose node has been removed.
    pub fn node(&self, id: NodeId) -> Option<NodeRef<'_, 'a>> {
        self.arena.node(id)?;
        Some(NodeRef { tree: self, id })
    }

    /// Resolves a property id into a handle. See [`DeviceTree::node`].
    pub fn prop(&self, id: PropId) -> Option<PropRef<'_, 'a>> {
        self.arena.prop(id)?;
        Some(PropRef { tree: self, id })
    }

    /// Returns an iterator over every node, in parse order.
    pub fn all_nodes(&self) -> impl Iterator<Item = NodeRef<'_, 'a>> {
        (0..self.arena.node_count()).filter_map(|index| self.node(NodeId(index as u32)))
    }

    /// Finds a node by its absolute path.
    ///
    /// Leading and duplicate slashes are absorbed; the empty path (or
    /// `"/"`) returns the root. Each segment is matched like
    /// [`NodeRef::find_child`], so a segment may name a child either
    /// exactly (`serial@12000000`) or by its name before the unit address
    /// (`serial`).
    pub fn find(&self, path: &str) -> Option<NodeRef<'_, 'a>> {
        let mut id = self.first_root?;
        let mut rest = path;
        loop {
            rest = rest.trim_start_matches('/');
            if rest.is_empty() {
                return self.node(id);
            }
            let (segment, tail) = match rest.find('/') {
                Some(at) => rest.split_at(at),
                None => (rest, ""),
            };
            id = self.find_child_id(id, segment)?;
            rest = tail;
        }
    }

    /// Finds the next node carrying `compat` in its `compatible` list.
    ///
    /// Iterates nodes in parse order starting after `after` (from the
    /// beginning when `after` is `None`), so repeated calls passing the
    /// previous result walk every match.
    pub fn find_compatible(
        &self,
        after: Option<NodeId>,
        compat: &str,
    ) -> Option<NodeRef<'_, 'a>> {
        let start = after.map(|id| id.index() + 1).unwrap_or(0);
        for index in start..self.arena.node_count() {
            let Some(node) = self.node(NodeId(index as u32)) else {
                continue;
            };
            if node.is_compatible(compat) {
                return Some(node);
            }
        }
        None
    }

    /// Returns an iterator over all nodes compatible with `compat`.
    pub fn compatible_nodes<'s>(
        &'s self,
        compat: &'s str,
    ) -> impl Iterator<Item = NodeRef<'s, 'a>> + 's {
        self.all_nodes().filter(move |node| node.is_compatible(compat))
    }

    /// Finds the node that owns `handle`.
    ///
    /// Handles inside the dense lookup table resolve in constant time;
    /// out-of-range handles fall back to a linear scan over the tree.
    pub fn find_phandle(&self, handle: Phandle) -> Option<NodeRef<'_, 'a>> {
        match self.arena.phandle_slot(handle.value()) {
            Some(slot) => slot.and_then(|id| self.node(id)),
            None => self.all_nodes().find(|node| node.phandle() == Some(handle)),
        }
    }

    /// Returns an iterator over the memory reservation block.
    pub fn memory_reservations(&self) -> MemoryReservationIter<'a> {
        MemoryReservationIter {
            cursor: Cursor::new(self.mem_rsv),
        }
    }

    /// Matches `name` against `parent`'s children: exact name first, then
    /// the portion of each child's name before the unit address.
    pub(crate) fn find_child_id(&self, parent: NodeId, name: &str) -> Option<NodeId> {
        let mut base_match = None;
        let mut next = self.arena.node(parent)?.child;
        while let Some(id) = next {
            let cell = self.arena.node(id)?;
            let child_name: &str = &cell.name;
            if child_name == name {
                return Some(id);
            }
            if base_match.is_none() {
                let base = child_name.split('@').next().unwrap_or(child_name);
                if base == name {
                    base_match = Some(id);
                }
            }
            next = cell.sibling;
        }
        base_match
    }
}

impl Default for DeviceTree<'_> {
    fn default() -> Self {
        Self::empty()
    }
}
