//! Arena storage for the logical tree.
//!
//! Nodes and properties live in two bump-allocated slabs sized by a
//! preliminary scan of the structure block. Cross-references between them
//! (parent, sibling, child, property chains, the phandle table) are typed
//! indices into the slabs rather than pointers, so cells stay addressable
//! for the lifetime of the tree no matter how the backing storage grows.
//! Removed cells are unlinked and marked dead but never reclaimed.
//!
//! Two backends exist: growable `Vec` slabs under the `alloc` feature, and
//! fixed-capacity `heapless::Vec` slabs under `static-buffers` for targets
//! without an allocator.

use core::ops::Deref;

use crate::FdtError;

#[cfg(feature = "alloc")]
use alloc::{string::String, vec::Vec};

#[cfg(all(not(feature = "alloc"), not(feature = "static-buffers")))]
compile_error!(
    "dtb-tree needs a storage backend: enable the `alloc` feature or `static-buffers`"
);

/// Node slab capacity in static-buffer mode.
#[cfg(feature = "static-buffers")]
pub const STATIC_NODE_CAPACITY: usize = 256;

/// Property slab capacity in static-buffer mode.
#[cfg(feature = "static-buffers")]
pub const STATIC_PROP_CAPACITY: usize = 1024;

/// Identifies a node in the tree.
///
/// Ids are stable for the lifetime of the [`DeviceTree`](crate::DeviceTree)
/// they came from; they are not meaningful across trees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub(crate) u32);

/// Identifies a property in the tree. See [`NodeId`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PropId(pub(crate) u32);

impl NodeId {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl PropId {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// A name that is either borrowed from the source blob or owned.
///
/// Blob-derived nodes and properties point straight into the caller's
/// buffer; names created by the edit API carry their own storage. Dropping
/// the enum releases owned storage and leaves borrowed data untouched.
pub(crate) enum Str<'a> {
    Borrowed(&'a str),
    #[cfg(feature = "alloc")]
    Owned(String),
}

impl Deref for Str<'_> {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        match self {
            Str::Borrowed(s) => s,
            #[cfg(feature = "alloc")]
            Str::Owned(s) => s,
        }
    }
}

/// A property payload, borrowed from the source blob or owned. See [`Str`].
pub(crate) enum Payload<'a> {
    Borrowed(&'a [u8]),
    #[cfg(feature = "alloc")]
    Owned(Vec<u8>),
}

impl Payload<'_> {
    pub fn as_slice(&self) -> &[u8] {
        match self {
            Payload::Borrowed(b) => b,
            #[cfg(feature = "alloc")]
            Payload::Owned(b) => b,
        }
    }
}

/// One node in the slab.
///
/// Children and properties are singly-linked lists threaded through the
/// slabs; only the head of each list is stored here. Lists are built by
/// prepending, so they run in reverse insertion order.
pub(crate) struct NodeCell<'a> {
    pub name: Str<'a>,
    pub parent: Option<NodeId>,
    pub sibling: Option<NodeId>,
    pub child: Option<NodeId>,
    pub props: Option<PropId>,
    pub dead: bool,
}

impl<'a> NodeCell<'a> {
    pub fn new(name: Str<'a>, parent: Option<NodeId>) -> Self {
        Self {
            name,
            parent,
            sibling: None,
            child: None,
            props: None,
            dead: false,
        }
    }
}

/// One property in the slab.
pub(crate) struct PropCell<'a> {
    pub name: Str<'a>,
    pub node: NodeId,
    pub data: Payload<'a>,
    pub next: Option<PropId>,
    pub dead: bool,
}

/// The slab storage behind one [`DeviceTree`](crate::DeviceTree).
pub(crate) struct Arena<'a> {
    #[cfg(not(feature = "static-buffers"))]
    nodes: Vec<NodeCell<'a>>,
    #[cfg(feature = "static-buffers")]
    nodes: heapless::Vec<NodeCell<'a>, STATIC_NODE_CAPACITY>,

    #[cfg(not(feature = "static-buffers"))]
    props: Vec<PropCell<'a>>,
    #[cfg(feature = "static-buffers")]
    props: heapless::Vec<PropCell<'a>, STATIC_PROP_CAPACITY>,

    /// Dense phandle lookup, indexed by handle value. Sized to the node
    /// count on the assumption that every node might carry a phandle.
    #[cfg(not(feature = "static-buffers"))]
    phandles: Vec<Option<NodeId>>,
    #[cfg(feature = "static-buffers")]
    phandles: heapless::Vec<Option<NodeId>, STATIC_NODE_CAPACITY>,
}

impl<'a> Arena<'a> {
    /// Creates an empty arena with no phandle table.
    ///
    /// Used by empty trees, where every phandle lookup takes the linear
    /// fallback path.
    pub fn new() -> Self {
        Self {
            #[cfg(not(feature = "static-buffers"))]
            nodes: Vec::new(),
            #[cfg(feature = "static-buffers")]
            nodes: heapless::Vec::new(),
            #[cfg(not(feature = "static-buffers"))]
            props: Vec::new(),
            #[cfg(feature = "static-buffers")]
            props: heapless::Vec::new(),
            #[cfg(not(feature = "static-buffers"))]
            phandles: Vec::new(),
            #[cfg(feature = "static-buffers")]
            phandles: heapless::Vec::new(),
        }
    }

    /// Creates an arena sized for the given node and property counts.
    ///
    /// In static-buffer mode this fails with `FdtError::NoMemory` when the
    /// counts exceed the compile-time capacities.
    pub fn with_capacity(node_count: usize, prop_count: usize) -> Result<Self, FdtError> {
        #[cfg(not(feature = "static-buffers"))]
        {
            Ok(Self {
                nodes: Vec::with_capacity(node_count),
                props: Vec::with_capacity(prop_count),
                phandles: alloc::vec![None; node_count],
            })
        }

        #[cfg(feature = "static-buffers")]
        {
            if node_count > STATIC_NODE_CAPACITY || prop_count > STATIC_PROP_CAPACITY {
                log::error!("too much data for statically sized arena");
                return Err(FdtError::NoMemory);
            }
            let mut phandles = heapless::Vec::new();
            for _ in 0..node_count {
                let _ = phandles.push(None);
            }
            Ok(Self {
                nodes: heapless::Vec::new(),
                props: heapless::Vec::new(),
                phandles,
            })
        }
    }

    pub fn push_node(&mut self, cell: NodeCell<'a>) -> Result<NodeId, FdtError> {
        let id = NodeId(self.nodes.len() as u32);
        #[cfg(not(feature = "static-buffers"))]
        self.nodes.push(cell);
        #[cfg(feature = "static-buffers")]
        self.nodes.push(cell).map_err(|_| {
            log::error!("not enough space for node");
            FdtError::NoMemory
        })?;
        Ok(id)
    }

    pub fn push_prop(&mut self, cell: PropCell<'a>) -> Result<PropId, FdtError> {
        let id = PropId(self.props.len() as u32);
        #[cfg(not(feature = "static-buffers"))]
        self.props.push(cell);
        #[cfg(feature = "static-buffers")]
        self.props.push(cell).map_err(|_| {
            log::error!("not enough space for property");
            FdtError::NoMemory
        })?;
        Ok(id)
    }

    /// Returns the cell for `id`, or `None` if the id is stale (dead cell).
    pub fn node(&self, id: NodeId) -> Option<&NodeCell<'a>> {
        self.nodes.get(id.index()).filter(|cell| !cell.dead)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut NodeCell<'a>> {
        self.nodes.get_mut(id.index()).filter(|cell| !cell.dead)
    }

    pub fn prop(&self, id: PropId) -> Option<&PropCell<'a>> {
        self.props.get(id.index()).filter(|cell| !cell.dead)
    }

    pub fn prop_mut(&mut self, id: PropId) -> Option<&mut PropCell<'a>> {
        self.props.get_mut(id.index()).filter(|cell| !cell.dead)
    }

    /// Number of node cells ever allocated, dead ones included. Slab order
    /// below this bound is parse order.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Records `node` as the owner of `handle`. Handles beyond the table
    /// capacity are silently left unregistered; lookups for them fall back
    /// to a linear scan.
    pub fn register_phandle(&mut self, handle: u32, node: NodeId) {
        if let Some(slot) = self.phandles.get_mut(handle as usize) {
            *slot = Some(node);
        }
    }

    /// Returns the table slot for `handle`, or `None` if the handle is
    /// outside the table.
    pub fn phandle_slot(&self, handle: u32) -> Option<Option<NodeId>> {
        self.phandles.get(handle as usize).copied()
    }
}
