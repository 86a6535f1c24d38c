#![cfg(not(target_os = "none"))]

use dtb_fixture::*;
use dtb_tree::*;

#[test]
fn test_build_cpu_tree_from_scratch() {
    let mut tree = DeviceTree::empty();
    let root = tree.root().unwrap().id();

    let cpus = tree.create_child(root, "cpus").unwrap();
    let cpu0 = tree.create_child(cpus, "cpu@0").unwrap();
    let reg = tree.find_or_create_prop(cpu0, "reg").unwrap();
    tree.write_prop_values(reg, 1, &[0]).unwrap();

    let blob = tree.to_blob().unwrap();
    let reparsed = DeviceTree::from_bytes(&blob).unwrap();
    let reg = reparsed
        .find("/cpus/cpu@0")
        .unwrap()
        .find_property("reg")
        .unwrap();
    assert_eq!(reg.values(1).next(), Some(0));
}

#[test]
fn test_duplicate_child_rejected() {
    let mut tree = DeviceTree::empty();
    let root = tree.root().unwrap().id();

    tree.create_child(root, "foo").unwrap();
    assert_eq!(
        tree.create_child(root, "foo"),
        Err(FdtError::DuplicateName)
    );

    // the failed call left the tree unchanged
    let root = tree.root().unwrap();
    assert_eq!(root.children().count(), 1);
    assert_eq!(
        root.children().filter(|c| c.name() == "foo").count(),
        1
    );
}

#[test]
fn test_duplicate_prop_rejected() {
    let mut tree = DeviceTree::empty();
    let root = tree.root().unwrap().id();

    tree.create_prop(root, "model").unwrap();
    assert_eq!(
        tree.create_prop(root, "model"),
        Err(FdtError::DuplicateName)
    );
    assert_eq!(tree.root().unwrap().properties().count(), 1);
}

#[test]
fn test_sibling_of_root_rejected() {
    let mut tree = DeviceTree::empty();
    let root = tree.root().unwrap().id();
    assert_eq!(
        tree.create_sibling(root, "rogue"),
        Err(FdtError::SiblingOfRoot)
    );
}

#[test]
fn test_create_sibling() {
    let mut tree = DeviceTree::empty();
    let root = tree.root().unwrap().id();

    let a = tree.create_child(root, "a").unwrap();
    let b = tree.create_sibling(a, "b").unwrap();
    assert_eq!(
        tree.create_sibling(a, "a"),
        Err(FdtError::DuplicateName)
    );

    let root = tree.root().unwrap();
    assert_eq!(root.children().count(), 2);
    assert_eq!(tree.node(a).unwrap().parent().unwrap().id(), root.id());
    assert_eq!(tree.node(b).unwrap().parent().unwrap().id(), root.id());
}

#[test]
fn test_find_or_create_node_creates_segments() {
    let mut tree = DeviceTree::empty();

    let clock = tree.find_or_create_node("/soc/clocks/clock@0").unwrap();
    assert_eq!(tree.node(clock).unwrap().name(), "clock@0");
    assert!(tree.find("/soc/clocks").is_some());

    // a second call finds the same nodes instead of duplicating them
    let again = tree.find_or_create_node("/soc/clocks/clock@0").unwrap();
    assert_eq!(clock, again);
    assert_eq!(tree.root().unwrap().children().count(), 1);
}

#[test]
fn test_find_or_create_on_parsed_tree() {
    let raw = fdt_machine();
    let mut tree = DeviceTree::from_bytes(&raw).unwrap();

    // existing segments are reused, only the tail is created
    let led = tree.find_or_create_node("/soc/leds/led@0").unwrap();
    assert_eq!(tree.node(led).unwrap().name(), "led@0");

    let soc = tree.find("/soc").unwrap();
    assert_eq!(soc.children().count(), 3);
    assert!(tree.find("/soc/serial@12000000").is_some());
}

#[test]
fn test_write_read_round_trip() {
    let mut tree = DeviceTree::empty();
    let root = tree.root().unwrap().id();

    let values = tree.create_prop(root, "values").unwrap();
    tree.write_prop_values(values, 2, &[0x1_0000_0002, 0xdead_beef])
        .unwrap();
    let prop = tree.prop(values).unwrap();
    let back: Vec<u64> = prop.values(2).collect();
    assert_eq!(back, [0x1_0000_0002, 0xdead_beef]);

    let pairs = tree.create_prop(root, "ranges").unwrap();
    let layout = Pair { a: 1, b: 2 };
    let entries = [
        Pair {
            a: 0x10,
            b: 0x2_0000_0001,
        },
        Pair { a: 0x20, b: 0x30 },
    ];
    tree.write_prop_pairs(pairs, layout, &entries).unwrap();
    let back: Vec<Pair> = tree.prop(pairs).unwrap().pairs(layout).collect();
    assert_eq!(back, entries);

    let triplets = tree.create_prop(root, "triplets").unwrap();
    let layout = Triplet { a: 1, b: 1, c: 1 };
    let entries = [Triplet { a: 1, b: 2, c: 3 }, Triplet { a: 4, b: 5, c: 6 }];
    tree.write_prop_triplets(triplets, layout, &entries).unwrap();
    let back: Vec<Triplet> = tree.prop(triplets).unwrap().triplets(layout).collect();
    assert_eq!(back, entries);

    let quads = tree.create_prop(root, "quads").unwrap();
    let layout = Quad {
        a: 1,
        b: 1,
        c: 1,
        d: 2,
    };
    let entries = [Quad {
        a: 9,
        b: 8,
        c: 7,
        d: 0x6_0000_0005,
    }];
    tree.write_prop_quads(quads, layout, &entries).unwrap();
    let back: Vec<Quad> = tree.prop(quads).unwrap().quads(layout).collect();
    assert_eq!(back, entries);
}

#[test]
fn test_write_strings() {
    let mut tree = DeviceTree::empty();
    let root = tree.root().unwrap().id();

    let model = tree.find_or_create_prop(root, "model").unwrap();
    tree.write_prop_string(model, "acme,board").unwrap();
    assert_eq!(tree.prop(model).unwrap().as_str(), Some("acme,board"));

    // rewriting replaces the payload outright
    tree.write_prop_string(model, "other").unwrap();
    assert_eq!(tree.prop(model).unwrap().as_str(), Some("other"));

    let raw = tree.find_or_create_prop(root, "raw").unwrap();
    tree.write_prop_bytes(raw, &[1, 2, 3]).unwrap();
    assert_eq!(tree.prop(raw).unwrap().data(), [1, 2, 3]);
}

#[test]
fn test_written_phandle_is_registered() {
    let mut tree = DeviceTree::empty();
    let root = tree.root().unwrap().id();

    let intc = tree.create_child(root, "intc").unwrap();
    let handle = tree.create_prop(intc, "phandle").unwrap();
    tree.write_prop_values(handle, 1, &[3]).unwrap();

    // small handles may still land outside the dense table of a tiny
    // tree; either way the lookup must resolve
    let found = tree.find_phandle(Phandle::from(3)).unwrap();
    assert_eq!(found.id(), intc);
}

#[test]
fn test_remove_prop() {
    let raw = fdt_machine();
    let mut tree = DeviceTree::from_bytes(&raw).unwrap();

    let uart = tree.find("/soc/serial@12000000").unwrap().id();
    let reg = tree
        .node(uart)
        .unwrap()
        .find_property("reg")
        .unwrap()
        .id();

    assert!(tree.remove_prop(reg));
    assert!(tree.node(uart).unwrap().find_property("reg").is_none());
    assert_eq!(tree.node(uart).unwrap().properties().count(), 2);
    assert!(tree.prop(reg).is_none());

    // removing it again fails: the id is stale now
    assert!(!tree.remove_prop(reg));
}

#[test]
fn test_remove_node_subtree() {
    let raw = fdt_machine();
    let mut tree = DeviceTree::from_bytes(&raw).unwrap();

    let soc = tree.find("/soc").unwrap().id();
    let uart = tree.find("/soc/serial@12000000").unwrap().id();

    assert!(tree.remove_node(soc));
    assert!(tree.find("/soc").is_none());
    assert!(tree.node(soc).is_none());
    assert!(tree.node(uart).is_none());
    assert_eq!(tree.root().unwrap().children().count(), 3);

    // the rest of the tree is untouched
    assert!(tree.find("/memory@40000000").is_some());
    assert!(tree.find("/chosen").is_some());
    assert!(!tree.remove_node(soc));
}

#[test]
fn test_removed_nodes_skipped_by_queries() {
    let raw = fdt_machine();
    let mut tree = DeviceTree::from_bytes(&raw).unwrap();

    let uart = tree.find("/soc/serial@12000000").unwrap().id();
    assert!(tree.remove_node(uart));

    assert_eq!(tree.compatible_nodes("arm,pl011").count(), 1);
    let survivor = tree.find_compatible(None, "arm,pl011").unwrap();
    assert_eq!(survivor.name(), "serial@13000000");
}

#[test]
fn test_edit_then_finalize_round_trip() {
    let raw = fdt_machine();
    let mut tree = DeviceTree::from_bytes(&raw).unwrap();

    let chosen = tree.find("/chosen").unwrap().id();
    let stdout = tree.find_or_create_prop(chosen, "stdout-path").unwrap();
    tree.write_prop_string(stdout, "/soc/serial@12000000").unwrap();

    let extra = tree.find_or_create_node("/soc/timer@14000000").unwrap();
    let compat = tree.find_or_create_prop(extra, "compatible").unwrap();
    tree.write_prop_string(compat, "arm,armv8-timer").unwrap();

    let blob = tree.to_blob().unwrap();
    let reparsed = DeviceTree::from_bytes(&blob).unwrap();

    assert_eq!(
        reparsed
            .find("/chosen")
            .unwrap()
            .find_property("stdout-path")
            .unwrap()
            .as_str(),
        Some("/soc/serial@12000000")
    );
    assert!(reparsed.find("/soc/timer@14000000").unwrap().is_compatible("arm,armv8-timer"));
    // blob-borrowed content survives alongside edited content
    assert!(reparsed.find("/soc/serial@13000000").is_some());
}
