//! Tree editing.
//!
//! Nodes and properties created here live in the same arena as the
//! blob-derived ones, but their names (and any written payloads) are owned
//! rather than borrowed from the source blob. Removal unlinks a cell and
//! releases its owned storage; the cell itself stays in the arena as
//! unreachable garbage until the tree is dropped.

use alloc::{string::String, vec::Vec};
use log::error;

use crate::{
    FdtError, Pair, Quad, Triplet,
    arena::{NodeCell, NodeId, Payload, PropCell, PropId, Str},
    builder::check_for_special_prop,
    data::CELL_SIZE,
    tree::DeviceTree,
};

/// Bounds a node name at the first `/`, so path tails passed down from
/// `find_or_create_node` never leak into names.
fn name_segment(name: &str) -> &str {
    name.split('/').next().unwrap_or(name)
}

/// Appends `value` as `cell_count` big-endian cells. Cells above the low
/// 64 bits of a wide value are zero.
fn push_cells(buf: &mut Vec<u8>, value: u64, cell_count: usize) {
    for i in 0..cell_count {
        let shift = 32 * (cell_count - 1 - i);
        let cell = if shift >= 64 { 0 } else { (value >> shift) as u32 };
        buf.extend_from_slice(&cell.to_be_bytes());
    }
}

impl<'a> DeviceTree<'a> {
    /// Walks `path` like [`DeviceTree::find`], creating every segment that
    /// does not exist as a child of the last found ancestor. Returns the
    /// node at the end of the path.
    pub fn find_or_create_node(&mut self, path: &str) -> Result<NodeId, FdtError> {
        let mut id = self.first_root.ok_or(FdtError::NotFound)?;
        let mut rest = path;
        loop {
            rest = rest.trim_start_matches('/');
            if rest.is_empty() {
                return Ok(id);
            }
            let (segment, tail) = match rest.find('/') {
                Some(at) => rest.split_at(at),
                None => (rest, ""),
            };
            id = match self.find_child_id(id, segment) {
                Some(child) => child,
                None => self.create_child(id, segment)?,
            };
            rest = tail;
        }
    }

    /// Creates a new child of `parent`.
    ///
    /// The recorded name is `name` up to its first `/`. Fails with
    /// `DuplicateName` if a child of that exact name already exists.
    pub fn create_child(&mut self, parent: NodeId, name: &str) -> Result<NodeId, FdtError> {
        self.arena.node(parent).ok_or(FdtError::NotFound)?;
        let segment = name_segment(name);
        self.check_child_collision(parent, segment)?;

        let head = self.arena.node(parent).and_then(|cell| cell.child);
        let mut cell = NodeCell::new(Str::Owned(String::from(segment)), Some(parent));
        cell.sibling = head;
        let id = self.arena.push_node(cell)?;
        if let Some(cell) = self.arena.node_mut(parent) {
            cell.child = Some(id);
        }
        Ok(id)
    }

    /// Creates a new node in the same child list as `node`, linked right
    /// after it.
    ///
    /// Roots have no parent, so siblings cannot be created for them; build
    /// on an empty tree and add children to its root instead.
    pub fn create_sibling(&mut self, node: NodeId, name: &str) -> Result<NodeId, FdtError> {
        let parent = match self.arena.node(node).ok_or(FdtError::NotFound)?.parent {
            Some(parent) => parent,
            None => {
                error!("cannot create a sibling of a root node");
                return Err(FdtError::SiblingOfRoot);
            }
        };
        let segment = name_segment(name);
        self.check_child_collision(parent, segment)?;

        let next = self.arena.node(node).and_then(|cell| cell.sibling);
        let mut cell = NodeCell::new(Str::Owned(String::from(segment)), Some(parent));
        cell.sibling = next;
        let id = self.arena.push_node(cell)?;
        if let Some(cell) = self.arena.node_mut(node) {
            cell.sibling = Some(id);
        }
        Ok(id)
    }

    /// Creates a property with a zero-length payload on `node`.
    ///
    /// Fails with `DuplicateName` if the node already has a property of
    /// that name.
    pub fn create_prop(&mut self, node: NodeId, name: &str) -> Result<PropId, FdtError> {
        self.arena.node(node).ok_or(FdtError::NotFound)?;
        if self.find_prop_id(node, name).is_some() {
            error!("failed to create property with duplicate name `{}`", name);
            return Err(FdtError::DuplicateName);
        }

        let head = self.arena.node(node).and_then(|cell| cell.props);
        let id = self.arena.push_prop(PropCell {
            name: Str::Owned(String::from(name)),
            node,
            data: Payload::Borrowed(&[]),
            next: head,
            dead: false,
        })?;
        if let Some(cell) = self.arena.node_mut(node) {
            cell.props = Some(id);
        }
        Ok(id)
    }

    /// Returns the named property of `node`, creating it when absent.
    pub fn find_or_create_prop(&mut self, node: NodeId, name: &str) -> Result<PropId, FdtError> {
        self.arena.node(node).ok_or(FdtError::NotFound)?;
        match self.find_prop_id(node, name) {
            Some(id) => Ok(id),
            None => self.create_prop(node, name),
        }
    }

    /// Replaces the payload with `bytes`, copied verbatim.
    pub fn write_prop_bytes(&mut self, prop: PropId, bytes: &[u8]) -> Result<(), FdtError> {
        self.set_payload(prop, bytes.to_vec())
    }

    /// Replaces the payload with `value` as a NUL-terminated string.
    pub fn write_prop_string(&mut self, prop: PropId, value: &str) -> Result<(), FdtError> {
        let mut bytes = Vec::with_capacity(value.len() + 1);
        bytes.extend_from_slice(value.as_bytes());
        bytes.push(0);
        self.set_payload(prop, bytes)
    }

    /// Replaces the payload with an array of values, each encoded as
    /// `cell_count` big-endian cells.
    pub fn write_prop_values(
        &mut self,
        prop: PropId,
        cell_count: usize,
        values: &[u64],
    ) -> Result<(), FdtError> {
        let mut bytes = Vec::with_capacity(values.len() * cell_count * CELL_SIZE);
        for value in values {
            push_cells(&mut bytes, *value, cell_count);
        }
        self.set_payload(prop, bytes)
    }

    /// Replaces the payload with an array of two-field cell groups.
    pub fn write_prop_pairs(
        &mut self,
        prop: PropId,
        layout: Pair<usize>,
        values: &[Pair],
    ) -> Result<(), FdtError> {
        let stride = layout.a + layout.b;
        let mut bytes = Vec::with_capacity(values.len() * stride * CELL_SIZE);
        for value in values {
            push_cells(&mut bytes, value.a, layout.a);
            push_cells(&mut bytes, value.b, layout.b);
        }
        self.set_payload(prop, bytes)
    }

    /// Replaces the payload with an array of three-field cell groups.
    pub fn write_prop_triplets(
        &mut self,
        prop: PropId,
        layout: Triplet<usize>,
        values: &[Triplet],
    ) -> Result<(), FdtError> {
        let stride = layout.a + layout.b + layout.c;
        let mut bytes = Vec::with_capacity(values.len() * stride * CELL_SIZE);
        for value in values {
            push_cells(&mut bytes, value.a, layout.a);
            push_cells(&mut bytes, value.b, layout.b);
            push_cells(&mut bytes, value.c, layout.c);
        }
        self.set_payload(prop, bytes)
    }

    /// Replaces the payload with an array of four-field cell groups.
    pub fn write_prop_quads(
        &mut self,
        prop: PropId,
        layout: Quad<usize>,
        values: &[Quad],
    ) -> Result<(), FdtError> {
        let stride = layout.a + layout.b + layout.c + layout.d;
        let mut bytes = Vec::with_capacity(values.len() * stride * CELL_SIZE);
        for value in values {
            push_cells(&mut bytes, value.a, layout.a);
            push_cells(&mut bytes, value.b, layout.b);
            push_cells(&mut bytes, value.c, layout.c);
            push_cells(&mut bytes, value.d, layout.d);
        }
        self.set_payload(prop, bytes)
    }

    /// Unlinks `prop` from its node and releases its owned storage.
    ///
    /// Returns false if the id is stale or the property is not on its
    /// node's list.
    pub fn remove_prop(&mut self, prop: PropId) -> bool {
        let owner = match self.arena.prop(prop) {
            Some(cell) => cell.node,
            None => return false,
        };
        if !self.unlink_prop(owner, prop) {
            return false;
        }
        self.kill_prop(prop);
        true
    }

    /// Unlinks `node` from its parent (or the root list), then removes its
    /// whole subtree: children recursively, then properties, then the node
    /// itself.
    pub fn remove_node(&mut self, node: NodeId) -> bool {
        let (parent, sibling) = match self.arena.node(node) {
            Some(cell) => (cell.parent, cell.sibling),
            None => return false,
        };

        let unlinked = match parent {
            Some(parent) => self.unlink_child(parent, node, sibling),
            None => self.unlink_root(node, sibling),
        };
        if !unlinked {
            return false;
        }

        self.destroy_subtree(node);
        true
    }

    fn set_payload(&mut self, prop: PropId, bytes: Vec<u8>) -> Result<(), FdtError> {
        let node = {
            let cell = self.arena.prop_mut(prop).ok_or(FdtError::NotFound)?;
            // Assignment drops the previous payload if it was owned.
            cell.data = Payload::Owned(bytes);
            cell.node
        };
        // A freshly written phandle must be findable, same as a parsed one.
        check_for_special_prop(&mut self.arena, node, prop);
        Ok(())
    }

    fn find_prop_id(&self, node: NodeId, name: &str) -> Option<PropId> {
        let mut next = self.arena.node(node)?.props;
        while let Some(id) = next {
            let cell = self.arena.prop(id)?;
            if &*cell.name == name {
                return Some(id);
            }
            next = cell.next;
        }
        None
    }

    fn check_child_collision(&self, parent: NodeId, name: &str) -> Result<(), FdtError> {
        let mut next = self.arena.node(parent).and_then(|cell| cell.child);
        while let Some(id) = next {
            let Some(cell) = self.arena.node(id) else { break };
            if &*cell.name == name {
                error!("failed to create node with duplicate name `{}`", name);
                return Err(FdtError::DuplicateName);
            }
            next = cell.sibling;
        }
        Ok(())
    }

    fn unlink_prop(&mut self, owner: NodeId, prop: PropId) -> bool {
        let head = match self.arena.node(owner) {
            Some(cell) => cell.props,
            None => return false,
        };
        let target_next = match self.arena.prop(prop) {
            Some(cell) => cell.next,
            None => return false,
        };

        if head == Some(prop) {
            if let Some(cell) = self.arena.node_mut(owner) {
                cell.props = target_next;
            }
            return true;
        }

        let mut scan = head;
        while let Some(id) = scan {
            let next = match self.arena.prop(id) {
                Some(cell) => cell.next,
                None => break,
            };
            if next == Some(prop) {
                if let Some(cell) = self.arena.prop_mut(id) {
                    cell.next = target_next;
                }
                return true;
            }
            scan = next;
        }

        error!("corrupt linkage: property not in its node's list");
        false
    }

    fn unlink_child(&mut self, parent: NodeId, node: NodeId, node_sibling: Option<NodeId>) -> bool {
        let head = match self.arena.node(parent) {
            Some(cell) => cell.child,
            None => return false,
        };

        if head == Some(node) {
            if let Some(cell) = self.arena.node_mut(parent) {
                cell.child = node_sibling;
            }
            return true;
        }

        let mut scan = head;
        while let Some(id) = scan {
            let next = match self.arena.node(id) {
                Some(cell) => cell.sibling,
                None => break,
            };
            if next == Some(node) {
                if let Some(cell) = self.arena.node_mut(id) {
                    cell.sibling = node_sibling;
                }
                return true;
            }
            scan = next;
        }

        error!("corrupt linkage: node not in parent's child list");
        false
    }

    fn unlink_root(&mut self, node: NodeId, node_sibling: Option<NodeId>) -> bool {
        if self.first_root == Some(node) {
            self.first_root = node_sibling;
            return true;
        }

        let mut scan = self.first_root;
        while let Some(id) = scan {
            let next = match self.arena.node(id) {
                Some(cell) => cell.sibling,
                None => break,
            };
            if next == Some(node) {
                if let Some(cell) = self.arena.node_mut(id) {
                    cell.sibling = node_sibling;
                }
                return true;
            }
            scan = next;
        }

        error!("corrupt linkage: root not in the top-level list");
        false
    }

    fn destroy_subtree(&mut self, node: NodeId) {
        let mut child = self.arena.node(node).and_then(|cell| cell.child);
        while let Some(id) = child {
            let next = self.arena.node(id).and_then(|cell| cell.sibling);
            self.destroy_subtree(id);
            child = next;
        }

        let mut prop = self.arena.node(node).and_then(|cell| cell.props);
        while let Some(id) = prop {
            let next = self.arena.prop(id).and_then(|cell| cell.next);
            self.kill_prop(id);
            prop = next;
        }

        if let Some(cell) = self.arena.node_mut(node) {
            cell.dead = true;
            cell.name = Str::Borrowed("");
            cell.parent = None;
            cell.sibling = None;
            cell.child = None;
            cell.props = None;
        }
    }

    fn kill_prop(&mut self, prop: PropId) {
        if let Some(cell) = self.arena.prop_mut(prop) {
            cell.dead = true;
            cell.name = Str::Borrowed("");
            cell.data = Payload::Borrowed(&[]);
            cell.next = None;
        }
    }
}
