//! DTS-style text rendering.
//!
//! `Display` implementations that render a tree (or a subtree, or a single
//! property) as device tree source text. Payload formatting is heuristic:
//! printable NUL-terminated data renders as strings, cell-multiple data as
//! `<...>` cell lists, anything else as a `[...]` byte array.

use core::fmt;

use crate::{data::CellIter, node::NodeRef, prop::PropRef, tree::DeviceTree};

fn write_indent(f: &mut fmt::Formatter<'_>, count: usize) -> fmt::Result {
    for _ in 0..count {
        write!(f, "    ")?;
    }
    Ok(())
}

impl fmt::Display for DeviceTree<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "/dts-v1/;")?;
        for entry in self.memory_reservations() {
            writeln!(f, "/memreserve/ {:#x} {:#x};", entry.address, entry.size)?;
        }
        writeln!(f)?;
        for root in self.roots() {
            fmt_node(f, &root, 0)?;
        }
        Ok(())
    }
}

impl fmt::Display for NodeRef<'_, '_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_node(f, self, 0)
    }
}

fn fmt_node(f: &mut fmt::Formatter<'_>, node: &NodeRef<'_, '_>, level: usize) -> fmt::Result {
    write_indent(f, level)?;
    writeln!(f, "{} {{", node.display_name())?;

    for prop in node.properties() {
        write_indent(f, level + 1)?;
        writeln!(f, "{};", prop)?;
    }
    for child in node.children() {
        fmt_node(f, &child, level + 1)?;
    }

    write_indent(f, level)?;
    writeln!(f, "}};")
}

impl fmt::Display for PropRef<'_, '_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let data = self.data();
        if data.is_empty() {
            return write!(f, "{}", self.name());
        }

        write!(f, "{} = ", self.name())?;
        if looks_like_strings(data) {
            let mut first = true;
            for s in self.strings() {
                if !first {
                    write!(f, ", ")?;
                }
                write!(f, "\"{}\"", s)?;
                first = false;
            }
            Ok(())
        } else if data.len() % 4 == 0 {
            write!(f, "<")?;
            let mut first = true;
            for cell in CellIter::new(data) {
                if !first {
                    write!(f, " ")?;
                }
                write!(f, "{:#x}", cell)?;
                first = false;
            }
            write!(f, ">")
        } else {
            write!(f, "[")?;
            for (i, byte) in data.iter().enumerate() {
                if i > 0 {
                    write!(f, " ")?;
                }
                write!(f, "{:02x}", byte)?;
            }
            write!(f, "]")
        }
    }
}

/// True if the payload reads as one or more printable NUL-terminated
/// strings.
fn looks_like_strings(data: &[u8]) -> bool {
    if data.is_empty() || data[0] == 0 || data[data.len() - 1] != 0 {
        return false;
    }
    data.iter()
        .all(|b| *b == 0 || b.is_ascii_graphic() || *b == b' ')
}
