#![cfg(not(target_os = "none"))]

use std::collections::BTreeMap;
use std::sync::Once;

use dtb_fixture::*;
use dtb_tree::*;

fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = env_logger::builder()
            .is_test(true)
            .filter_level(log::LevelFilter::Trace)
            .try_init();
    });
}

type Signature = BTreeMap<String, BTreeMap<String, Vec<u8>>>;

/// Collects every path with its property bytes, so trees can be compared
/// without assuming anything about sibling or property order.
fn signature(tree: &DeviceTree) -> Signature {
    fn walk(node: NodeRef<'_, '_>, path: String, out: &mut Signature) {
        let mut props = BTreeMap::new();
        for prop in node.properties() {
            props.insert(prop.name().to_string(), prop.data().to_vec());
        }
        out.insert(path.clone(), props);

        for child in node.children() {
            let child_path = if path == "/" {
                format!("/{}", child.name())
            } else {
                format!("{}/{}", path, child.name())
            };
            walk(child, child_path, out);
        }
    }

    let mut out = Signature::new();
    for root in tree.roots() {
        walk(root, "/".to_string(), &mut out);
    }
    out
}

#[test]
fn test_empty_tree_round_trips() {
    let tree = DeviceTree::empty();
    let blob = tree.to_blob().unwrap();

    let reparsed = DeviceTree::from_bytes(&blob).unwrap();
    assert_eq!(reparsed.roots().count(), 1);
    let root = reparsed.find("/").unwrap();
    assert_eq!(root.name(), "");
    assert_eq!(root.properties().count(), 0);
    assert_eq!(root.children().count(), 0);
    assert_eq!(reparsed.memory_reservations().count(), 0);
}

#[test]
fn test_emitted_header_fields() {
    let tree = DeviceTree::empty();
    let blob = tree.to_blob().unwrap();

    let header = Header::from_bytes(&blob).unwrap();
    assert_eq!(header.magic, FDT_MAGIC);
    assert_eq!(header.version, FDT_VERSION);
    assert_eq!(header.last_comp_version, FDT_LAST_COMP_VERSION);
    assert_eq!(header.totalsize as usize, blob.len());
    assert_eq!(header.off_mem_rsvmap as usize, HEADER_SIZE);
    assert_eq!(
        header.off_dt_struct,
        header.off_mem_rsvmap + 16 // one terminating reservation entry
    );
    assert_eq!(
        header.off_dt_strings,
        header.off_dt_struct + header.size_dt_struct
    );
    // offset 0 of the strings block holds the empty string
    assert_eq!(blob[header.off_dt_strings as usize], 0);
}

#[test]
fn test_finalize_into_size_contract() {
    let raw = fdt_machine();
    let tree = DeviceTree::from_bytes(&raw).unwrap();
    let size = tree.finalized_size();

    let mut backing = vec![0u8; size + 8];
    let base = backing.as_ptr() as usize;
    let aligned_at = (0..4).find(|o| (base + o) % 4 == 0).unwrap();

    // a buffer one byte short reports the required size
    let short = &mut backing[aligned_at..aligned_at + size - 1];
    assert_eq!(
        tree.finalize_into(short),
        Err(FdtError::OutputTooSmall { needed: size })
    );

    let full = &mut backing[aligned_at..aligned_at + size];
    assert_eq!(tree.finalize_into(full), Ok(size));
}

#[test]
fn test_finalize_into_rejects_misaligned_buffer() {
    let tree = DeviceTree::empty();
    let size = tree.finalized_size();

    let mut backing = vec![0u8; size + 8];
    let base = backing.as_ptr() as usize;
    let misaligned_at = (1..=4).find(|o| (base + o) % 4 != 0).unwrap();

    assert_eq!(
        tree.finalize_into(&mut backing[misaligned_at..]),
        Err(FdtError::MisalignedBuffer)
    );
}

#[test]
fn test_parse_finalize_round_trip() {
    let raw = fdt_machine();
    let tree = DeviceTree::from_bytes(&raw).unwrap();

    let blob = tree.to_blob().unwrap();
    let reparsed = DeviceTree::from_bytes(&blob).unwrap();

    assert_eq!(signature(&tree), signature(&reparsed));
    assert_eq!(tree.boot_cpuid_phys, reparsed.boot_cpuid_phys);
    assert_eq!(
        tree.memory_reservations().collect::<Vec<_>>(),
        reparsed.memory_reservations().collect::<Vec<_>>()
    );
}

#[test]
fn test_finalize_is_idempotent() {
    let raw = fdt_machine();
    let tree = DeviceTree::from_bytes(&raw).unwrap();

    let first = tree.to_blob().unwrap();
    let second = DeviceTree::from_bytes(&first).unwrap().to_blob().unwrap();
    let third = DeviceTree::from_bytes(&second).unwrap();

    assert_eq!(first.len(), second.len());
    assert_eq!(signature(&tree), signature(&third));
}

#[test]
fn test_boot_cpuid_carried_through() {
    let mut b = BlobBuilder::new();
    b.boot_cpuid(7);
    b.begin_node("");
    b.end_node();
    let raw = b.build();

    let tree = DeviceTree::from_bytes(&raw).unwrap();
    assert_eq!(tree.boot_cpuid_phys, 7);

    let blob = tree.to_blob().unwrap();
    assert_eq!(DeviceTree::from_bytes(&blob).unwrap().boot_cpuid_phys, 7);
}

#[test]
fn test_reservations_emitted_with_terminator() {
    let mut b = BlobBuilder::new();
    b.reservation(0x8000_0000, 0x1_0000);
    b.reservation(0x9000_0000, 0x2_0000);
    b.begin_node("");
    b.end_node();
    let raw = b.build();

    let tree = DeviceTree::from_bytes(&raw).unwrap();
    let blob = tree.to_blob().unwrap();

    let header = Header::from_bytes(&blob).unwrap();
    // two entries plus the terminator between header and structure block
    assert_eq!(
        header.off_dt_struct as usize,
        HEADER_SIZE + 3 * 16
    );

    let reparsed = DeviceTree::from_bytes(&blob).unwrap();
    let entries: Vec<MemoryReservation> = reparsed.memory_reservations().collect();
    assert_eq!(
        entries,
        [
            MemoryReservation {
                address: 0x8000_0000,
                size: 0x1_0000
            },
            MemoryReservation {
                address: 0x9000_0000,
                size: 0x2_0000
            }
        ]
    );
}

#[test]
fn test_display_renders_dts() {
    init_logging();
    let raw = fdt_machine();
    let tree = DeviceTree::from_bytes(&raw).unwrap();
    let output = tree.to_string();
    log::info!("rendered DTS:\n{}", output);

    for pattern in [
        "/dts-v1/;",
        "/memreserve/ 0x40000000 0x1000;",
        "/ {",
        "serial@12000000 {",
        "compatible = \"arm,pl011\", \"arm,primecell\";",
        "bootargs = \"console=ttyAMA0 earlycon\";",
        "#address-cells = <0x2>;",
        "interrupt-controller;",
        "};",
    ] {
        assert!(output.contains(pattern), "output should contain {pattern}");
    }
}
