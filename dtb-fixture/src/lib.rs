//! Test fixtures: hand-assembled Device Tree Blobs.
//!
//! This crate builds FDT blobs token by token, independently of any parser
//! or encoder under test, so tests exercising the library never depend on
//! the code they are checking. It also provides a 4-byte-aligned buffer
//! wrapper, since the FDT specification requires aligned blobs in memory.

use core::ops::Deref;

const FDT_MAGIC: u32 = 0xd00dfeed;
const FDT_BEGIN_NODE: u32 = 0x1;
const FDT_END_NODE: u32 = 0x2;
const FDT_PROP: u32 = 0x3;
const FDT_NOP: u32 = 0x4;
const FDT_END: u32 = 0x9;

const HEADER_SIZE: usize = 40;

fn push_u32(buf: &mut Vec<u8>, value: u32) {
    buf.extend_from_slice(&value.to_be_bytes());
}

fn pad4(buf: &mut Vec<u8>) {
    while buf.len() % 4 != 0 {
        buf.push(0);
    }
}

/// Assembles an FDT blob from explicit tokens.
///
/// Calls are not validated; tests can produce malformed blobs on purpose
/// (for example a node without its END_NODE token) by just leaving calls
/// out.
#[derive(Default)]
pub struct BlobBuilder {
    structs: Vec<u8>,
    strings: Vec<u8>,
    string_offsets: Vec<(String, u32)>,
    reservations: Vec<(u64, u64)>,
    boot_cpuid: u32,
}

impl BlobBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the boot CPU id written into the header.
    pub fn boot_cpuid(&mut self, id: u32) -> &mut Self {
        self.boot_cpuid = id;
        self
    }

    /// Appends a memory reservation entry.
    pub fn reservation(&mut self, address: u64, size: u64) -> &mut Self {
        self.reservations.push((address, size));
        self
    }

    /// Opens a node: BEGIN_NODE token plus the padded name.
    pub fn begin_node(&mut self, name: &str) -> &mut Self {
        push_u32(&mut self.structs, FDT_BEGIN_NODE);
        self.structs.extend_from_slice(name.as_bytes());
        self.structs.push(0);
        pad4(&mut self.structs);
        self
    }

    /// Closes the most recently opened node.
    pub fn end_node(&mut self) -> &mut Self {
        push_u32(&mut self.structs, FDT_END_NODE);
        self
    }

    /// Appends a NOP token.
    pub fn nop(&mut self) -> &mut Self {
        push_u32(&mut self.structs, FDT_NOP);
        self
    }

    /// Appends a property with a raw payload.
    pub fn prop_bytes(&mut self, name: &str, data: &[u8]) -> &mut Self {
        let nameoff = self.string_offset(name);
        push_u32(&mut self.structs, FDT_PROP);
        push_u32(&mut self.structs, data.len() as u32);
        push_u32(&mut self.structs, nameoff);
        self.structs.extend_from_slice(data);
        pad4(&mut self.structs);
        self
    }

    /// Appends a property with no payload.
    pub fn prop_empty(&mut self, name: &str) -> &mut Self {
        self.prop_bytes(name, &[])
    }

    /// Appends a property holding one big-endian u32.
    pub fn prop_u32(&mut self, name: &str, value: u32) -> &mut Self {
        self.prop_bytes(name, &value.to_be_bytes())
    }

    /// Appends a property holding a list of big-endian cells.
    pub fn prop_cells(&mut self, name: &str, cells: &[u32]) -> &mut Self {
        let mut data = Vec::with_capacity(cells.len() * 4);
        for cell in cells {
            push_u32(&mut data, *cell);
        }
        self.prop_bytes(name, &data)
    }

    /// Appends a property holding one NUL-terminated string.
    pub fn prop_str(&mut self, name: &str, value: &str) -> &mut Self {
        let mut data = Vec::with_capacity(value.len() + 1);
        data.extend_from_slice(value.as_bytes());
        data.push(0);
        self.prop_bytes(name, &data)
    }

    /// Appends a property holding a NUL-separated string list.
    pub fn prop_strs(&mut self, name: &str, values: &[&str]) -> &mut Self {
        let mut data = Vec::new();
        for value in values {
            data.extend_from_slice(value.as_bytes());
            data.push(0);
        }
        self.prop_bytes(name, &data)
    }

    /// Assembles header, reservation block, structure block (terminated
    /// with END) and strings block into an aligned blob.
    pub fn build(&self) -> AlignedBlob {
        let mut structs = self.structs.clone();
        push_u32(&mut structs, FDT_END);

        let rsv_size = (self.reservations.len() + 1) * 16;
        let off_rsv = HEADER_SIZE;
        let off_struct = off_rsv + rsv_size;
        let off_strings = off_struct + structs.len();
        let total = off_strings + self.strings.len();

        let mut blob = Vec::with_capacity(total);
        for field in [
            FDT_MAGIC,
            total as u32,
            off_struct as u32,
            off_strings as u32,
            off_rsv as u32,
            17,
            16,
            self.boot_cpuid,
            self.strings.len() as u32,
            structs.len() as u32,
        ] {
            push_u32(&mut blob, field);
        }

        for (address, size) in &self.reservations {
            blob.extend_from_slice(&address.to_be_bytes());
            blob.extend_from_slice(&size.to_be_bytes());
        }
        blob.extend_from_slice(&[0u8; 16]);

        blob.extend_from_slice(&structs);
        blob.extend_from_slice(&self.strings);

        AlignedBlob::new(&blob)
    }

    fn string_offset(&mut self, name: &str) -> u32 {
        for (existing, offset) in &self.string_offsets {
            if existing == name {
                return *offset;
            }
        }
        let offset = self.strings.len() as u32;
        self.strings.extend_from_slice(name.as_bytes());
        self.strings.push(0);
        self.string_offsets.push((name.into(), offset));
        offset
    }
}

/// A 4-byte aligned buffer holding a blob.
///
/// Backed by u32 storage so the data always satisfies the alignment the
/// FDT specification requires of in-memory blobs.
pub struct AlignedBlob {
    words: Vec<u32>,
    len: usize,
}

impl AlignedBlob {
    /// Creates a new aligned buffer holding a copy of `data`.
    pub fn new(data: &[u8]) -> Self {
        let mut words = vec![0u32; data.len().div_ceil(4)];
        let bytes = unsafe {
            core::slice::from_raw_parts_mut(words.as_mut_ptr() as *mut u8, words.len() * 4)
        };
        bytes[..data.len()].copy_from_slice(data);
        Self {
            words,
            len: data.len(),
        }
    }
}

impl Deref for AlignedBlob {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        unsafe { core::slice::from_raw_parts(self.words.as_ptr() as *const u8, self.len) }
    }
}

/// A QEMU-virt flavored machine tree used by tests that want something
/// bigger than a hand-rolled minimal blob.
pub fn fdt_machine() -> AlignedBlob {
    let mut b = BlobBuilder::new();
    b.reservation(0x4000_0000, 0x1000);
    b.begin_node("");
    b.prop_u32("#address-cells", 2);
    b.prop_u32("#size-cells", 2);
    b.prop_str("compatible", "linux,dummy-virt");
    b.prop_str("model", "linux,dummy-virt");

    b.begin_node("memory@40000000");
    b.prop_str("device_type", "memory");
    b.prop_cells("reg", &[0x0, 0x4000_0000, 0x0, 0x1000_0000]);
    b.end_node();

    b.begin_node("intc@8000000");
    b.prop_str("compatible", "arm,gic-v3");
    b.prop_u32("#interrupt-cells", 3);
    b.prop_empty("interrupt-controller");
    b.prop_u32("phandle", 1);
    b.end_node();

    b.begin_node("soc");
    b.prop_u32("#address-cells", 1);
    b.prop_u32("#size-cells", 1);
    b.prop_strs("compatible", &["simple-bus", "acme,soc"]);

    b.begin_node("serial@12000000");
    b.prop_strs("compatible", &["arm,pl011", "arm,primecell"]);
    b.prop_cells("reg", &[0x1200_0000, 0x1000]);
    b.prop_u32("interrupt-parent", 1);
    b.end_node();

    b.begin_node("serial@13000000");
    b.prop_strs("compatible", &["arm,pl011", "arm,primecell"]);
    b.prop_cells("reg", &[0x1300_0000, 0x1000]);
    b.end_node();

    b.end_node(); // soc

    b.begin_node("chosen");
    b.prop_str("bootargs", "console=ttyAMA0 earlycon");
    b.end_node();

    b.end_node(); // root
    b.build()
}
