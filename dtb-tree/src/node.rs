//! Node handles and traversal.

use crate::{
    Phandle,
    arena::{NodeCell, NodeId, PropId},
    prop::PropRef,
    tree::DeviceTree,
};

/// A handle to one node of a [`DeviceTree`].
///
/// Handles are plain copies of a tree borrow plus an id, so they are cheap
/// to pass around. Because a handle borrows the tree, it can never outlive
/// an edit that would have removed the node.
#[derive(Clone, Copy)]
pub struct NodeRef<'t, 'b> {
    pub(crate) tree: &'t DeviceTree<'b>,
    pub(crate) id: NodeId,
}

/// Summary of a node, as returned by [`NodeRef::stat`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeStat<'a> {
    /// The node's name; roots report `/`
    pub name: &'a str,
    /// Number of direct children
    pub child_count: usize,
    /// Number of properties
    pub prop_count: usize,
    /// Number of entries in the parent's child list, this node included
    pub sibling_count: usize,
}

impl<'t, 'b> NodeRef<'t, 'b> {
    fn cell(&self) -> &'t NodeCell<'b> {
        // Handles borrow the tree, so the cell cannot have been removed.
        self.tree.arena.node(self.id).expect("stale node id")
    }

    /// Returns this node's id, usable with the edit API.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Returns the node's name as recorded in the blob (or by the edit
    /// API). Root nodes have the empty name; see [`NodeRef::display_name`].
    pub fn name(&self) -> &'t str {
        &self.cell().name
    }

    /// Returns the node's name with roots rendered as `/`.
    pub fn display_name(&self) -> &'t str {
        let cell = self.cell();
        if cell.parent.is_none() && cell.name.is_empty() {
            "/"
        } else {
            &cell.name
        }
    }

    /// Returns the parent node, absent on roots.
    pub fn parent(&self) -> Option<NodeRef<'t, 'b>> {
        self.tree.node(self.cell().parent?)
    }

    /// Returns the head of this node's child list.
    pub fn first_child(&self) -> Option<NodeRef<'t, 'b>> {
        self.tree.node(self.cell().child?)
    }

    /// Returns the next node in the parent's child list.
    pub fn next_sibling(&self) -> Option<NodeRef<'t, 'b>> {
        self.tree.node(self.cell().sibling?)
    }

    /// Returns an iterator over this node's children.
    ///
    /// Lists are built by prepending during the parse, so iteration order
    /// is reverse parse order. Nothing in the format makes that order
    /// meaningful; callers must not rely on it.
    pub fn children(&self) -> Siblings<'t, 'b> {
        Siblings::new(self.tree, self.cell().child)
    }

    /// Returns an iterator over this node's properties. The same ordering
    /// caveat as [`NodeRef::children`] applies.
    pub fn properties(&self) -> Props<'t, 'b> {
        Props {
            tree: self.tree,
            next: self.cell().props,
        }
    }

    /// Finds a child by name.
    ///
    /// A child matches if its full name equals `name`, or failing that, if
    /// the portion of its name before the `@` unit address does. With
    /// several unit-addressed children of the same base name, the first in
    /// list order wins.
    pub fn find_child(&self, name: &str) -> Option<NodeRef<'t, 'b>> {
        self.tree
            .find_child_id(self.id, name)
            .and_then(|id| self.tree.node(id))
    }

    /// Finds a property by exact name.
    pub fn find_property(&self, name: &str) -> Option<PropRef<'t, 'b>> {
        self.properties().find(|prop| prop.name() == name)
    }

    /// Returns the property at `index` in list order.
    pub fn property(&self, index: usize) -> Option<PropRef<'t, 'b>> {
        self.properties().nth(index)
    }

    /// Returns an iterator over the node's `compatible` strings.
    pub fn compatibles(&self) -> impl Iterator<Item = &'t str> {
        self.find_property("compatible")
            .into_iter()
            .flat_map(|prop| prop.strings())
    }

    /// Checks whether `compat` appears in the node's `compatible` list.
    pub fn is_compatible(&self, compat: &str) -> bool {
        self.compatibles().any(|s| s == compat)
    }

    /// Returns the node's phandle, from either the `phandle` or the legacy
    /// `linux,phandle` property.
    pub fn phandle(&self) -> Option<Phandle> {
        self.find_property("phandle")
            .or_else(|| self.find_property("linux,phandle"))
            .and_then(|prop| prop.as_u32())
            .map(Phandle::from)
    }

    /// Returns the `#address-cells` declared on this node, defaulting to 2.
    ///
    /// This is the value that applies to the node's children.
    pub fn address_cells(&self) -> usize {
        self.cells_value("#address-cells").unwrap_or(2)
    }

    /// Returns the `#size-cells` declared on this node, defaulting to 1.
    pub fn size_cells(&self) -> usize {
        self.cells_value("#size-cells").unwrap_or(1)
    }

    /// Returns the `#address-cells` in force *for* this node, i.e. the
    /// value its own `reg`/`ranges` entries are encoded with. Looked up on
    /// the parent; 2 when there is none.
    pub fn address_cells_for(&self) -> usize {
        match self.parent() {
            Some(parent) => parent.address_cells(),
            None => 2,
        }
    }

    /// Returns the `#size-cells` in force for this node. See
    /// [`NodeRef::address_cells_for`].
    pub fn size_cells_for(&self) -> usize {
        match self.parent() {
            Some(parent) => parent.size_cells(),
            None => 1,
        }
    }

    /// Gathers the counts reported by [`NodeStat`].
    pub fn stat(&self) -> NodeStat<'t> {
        let sibling_count = match self.parent() {
            Some(parent) => parent.children().count(),
            None => 0,
        };
        NodeStat {
            name: self.display_name(),
            child_count: self.children().count(),
            prop_count: self.properties().count(),
            sibling_count,
        }
    }

    fn cells_value(&self, name: &str) -> Option<usize> {
        self.find_property(name)?.as_u32().map(|v| v as usize)
    }
}

impl PartialEq for NodeRef<'_, '_> {
    fn eq(&self, other: &Self) -> bool {
        core::ptr::eq(self.tree, other.tree) && self.id == other.id
    }
}

impl core::fmt::Debug for NodeRef<'_, '_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_tuple("NodeRef")
            .field(&self.id)
            .field(&self.display_name())
            .finish()
    }
}

/// Iterator over a sibling-linked list of nodes: the children of one node,
/// or the top-level roots.
pub struct Siblings<'t, 'b> {
    tree: &'t DeviceTree<'b>,
    next: Option<NodeId>,
}

impl<'t, 'b> Siblings<'t, 'b> {
    pub(crate) fn new(tree: &'t DeviceTree<'b>, next: Option<NodeId>) -> Self {
        Self { tree, next }
    }
}

impl<'t, 'b> Iterator for Siblings<'t, 'b> {
    type Item = NodeRef<'t, 'b>;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.tree.node(self.next?)?;
        self.next = node.cell().sibling;
        Some(node)
    }
}

/// Iterator over the property list of one node.
pub struct Props<'t, 'b> {
    tree: &'t DeviceTree<'b>,
    next: Option<PropId>,
}

impl<'t, 'b> Iterator for Props<'t, 'b> {
    type Item = PropRef<'t, 'b>;

    fn next(&mut self) -> Option<Self::Item> {
        let prop = self.tree.prop(self.next?)?;
        self.next = prop.cell().next;
        Some(prop)
    }
}
