//! An arena-backed library for reading, editing and emitting Flattened
//! Device Tree (FDT) blobs.
//!
//! Parsing borrows the caller's blob: a preliminary scan sizes two slab
//! allocations (nodes and properties), then a single recursive pass links
//! the logical tree inside them. All cross-references are typed indices,
//! so handles stay valid for the lifetime of the tree. The optional edit
//! API (`write` feature) grows the same tree with owned names and payloads
//! and serializes it back to a conformant blob.
//!
//! On targets without an allocator the `static-buffers` feature switches
//! the slabs to fixed-capacity storage.

#![no_std]

#[cfg(feature = "alloc")]
extern crate alloc;

mod arena;
mod builder;
pub mod data;
mod define;
mod display;
#[cfg(feature = "write")]
mod edit;
#[cfg(feature = "write")]
mod finalize;
mod header;
mod node;
mod prop;
mod tree;

pub use arena::{NodeId, PropId};
#[cfg(feature = "static-buffers")]
pub use arena::{STATIC_NODE_CAPACITY, STATIC_PROP_CAPACITY};
pub use define::*;
#[cfg(feature = "write")]
pub use finalize::Blob;
pub use header::{HEADER_SIZE, Header, total_size};
pub use node::{NodeRef, NodeStat, Props, Siblings};
pub use prop::{Pairs, PropRef, Quads, Triplets, Values};
pub use tree::{DeviceTree, MemoryReservationIter};
