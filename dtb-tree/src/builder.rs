//! Structure-block scanning and tree construction.
//!
//! Building happens in two passes over the same token stream. The first
//! pass only counts `BEGIN_NODE` and `PROP` markers so the arena slabs
//! can be sized up front; the second pass is a recursive descent that
//! carves cells out of the arena and links them into the node/property
//! graph.

use log::error;

use crate::{
    FdtError, Token,
    arena::{Arena, NodeCell, NodeId, Payload, PropCell, PropId, Str},
    data::{CELL_SIZE, Cursor, align_up},
};

/// Slab sizes gathered by the preliminary scan.
pub(crate) struct TreeSizing {
    pub node_count: usize,
    pub prop_count: usize,
}

/// Walks the structure block once, counting nodes and properties.
///
/// Node names and property payloads are skipped wholesale so stray bytes
/// inside them are never mistaken for markers. Malformed tails just end
/// the scan; the build pass reports the actual error.
pub(crate) fn scan(structs: &[u8]) -> TreeSizing {
    let mut sizing = TreeSizing {
        node_count: 0,
        prop_count: 0,
    };

    let mut cursor = Cursor::new(structs);
    loop {
        let Ok(token) = cursor.take_token() else {
            break;
        };
        match token {
            Token::BeginNode => {
                sizing.node_count += 1;
                if cursor.take_cstr().is_err() {
                    break;
                }
                cursor.skip_padding();
            }
            Token::Prop => {
                sizing.prop_count += 1;
                let Some(len) = cursor.take_u32() else { break };
                let Some(_nameoff) = cursor.take_u32() else {
                    break;
                };
                if cursor.take(align_up(len as usize, CELL_SIZE)).is_none() {
                    break;
                }
            }
            Token::End => break,
            Token::EndNode | Token::Nop | Token::Unknown(_) => {}
        }
    }

    sizing
}

/// Builds the node/property graph from the structure block.
///
/// Returns the first root node. Blobs with several top-level nodes are
/// accepted; the extra roots end up linked as siblings of the first, in
/// reverse parse order like every other list in the tree.
pub(crate) fn build<'a>(
    arena: &mut Arena<'a>,
    structs: &'a [u8],
    strings: &'a [u8],
) -> Result<Option<NodeId>, FdtError> {
    let mut cursor = Cursor::new(structs);
    let mut first_root = None;

    loop {
        let Ok(token) = cursor.take_token() else {
            break;
        };
        match token {
            Token::BeginNode => {
                let root = parse_node(arena, &mut cursor, strings, None)?;
                if let Some(cell) = arena.node_mut(root) {
                    cell.sibling = first_root;
                }
                first_root = Some(root);
            }
            Token::End => break,
            _ => {}
        }
    }

    Ok(first_root)
}

/// Parses one node. The cursor sits just past the `BEGIN_NODE` marker.
fn parse_node<'a>(
    arena: &mut Arena<'a>,
    cursor: &mut Cursor<'a>,
    strings: &'a [u8],
    parent: Option<NodeId>,
) -> Result<NodeId, FdtError> {
    let name = cursor.take_cstr()?;
    cursor.skip_padding();

    let id = arena.push_node(NodeCell::new(Str::Borrowed(name), parent))?;

    loop {
        let Ok(token) = cursor.take_token() else {
            error!("node `{}` is missing its terminating tag", name);
            return Err(FdtError::UnterminatedNode);
        };

        match token {
            Token::EndNode => return Ok(id),
            Token::BeginNode => {
                let child = parse_node(arena, cursor, strings, Some(id))?;
                let head = arena.node(id).and_then(|cell| cell.child);
                if let Some(cell) = arena.node_mut(child) {
                    cell.sibling = head;
                }
                if let Some(cell) = arena.node_mut(id) {
                    cell.child = Some(child);
                }
            }
            Token::Prop => {
                let prop = parse_prop(arena, cursor, strings, id)?;
                let head = arena.node(id).and_then(|cell| cell.props);
                if let Some(cell) = arena.prop_mut(prop) {
                    cell.next = head;
                }
                if let Some(cell) = arena.node_mut(id) {
                    cell.props = Some(prop);
                }
                check_for_special_prop(arena, id, prop);
            }
            // NOPs, stray END markers and unknown values are skipped one
            // cell at a time.
            Token::Nop | Token::End | Token::Unknown(_) => {}
        }
    }
}

/// Parses one property. The cursor sits just past the `PROP` marker.
fn parse_prop<'a>(
    arena: &mut Arena<'a>,
    cursor: &mut Cursor<'a>,
    strings: &'a [u8],
    node: NodeId,
) -> Result<PropId, FdtError> {
    let truncated = |cursor: &Cursor<'_>| FdtError::Truncated {
        offset: cursor.offset(),
    };

    let len = cursor.take_u32().ok_or_else(|| truncated(cursor))? as usize;
    let nameoff = cursor.take_u32().ok_or_else(|| truncated(cursor))? as usize;

    let data = if len > 0 {
        let bytes = cursor.take(len).ok_or_else(|| truncated(cursor))?;
        cursor.skip_padding();
        bytes
    } else {
        &[]
    };

    let name_tail = strings
        .get(nameoff..)
        .ok_or(FdtError::Truncated { offset: nameoff })?;
    let name = Cursor::new(name_tail).take_cstr()?;

    arena.push_prop(PropCell {
        name: Str::Borrowed(name),
        node,
        data: Payload::Borrowed(data),
        next: None,
        dead: false,
    })
}

/// Registers `phandle` / `linux,phandle` values as they are attached.
///
/// The handle value is the property's first cell. Handles that do not fit
/// the lookup table stay unregistered; `find_phandle` falls back to a
/// linear scan for those.
pub(crate) fn check_for_special_prop(arena: &mut Arena<'_>, node: NodeId, prop: PropId) {
    let Some(cell) = arena.prop(prop) else { return };
    if !matches!(&*cell.name, "phandle" | "linux,phandle") {
        return;
    }

    let Some(handle) = Cursor::new(cell.data.as_slice()).take_u32() else {
        return;
    };
    arena.register_phandle(handle, node);
}
