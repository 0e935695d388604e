//! Tree construction, naming, and scope-resolution behavior.

mod common;

use std::sync::Arc;

use aquila::graph::{NodeHandle, NodeRegistry};
use proptest::prelude::*;

fn registry() -> NodeRegistry {
    NodeRegistry::with_builtins()
}

fn root_with_name(registry: &NodeRegistry, type_name: &str) -> Arc<NodeHandle> {
    let handle = registry.create(type_name).unwrap();
    let node = handle.current().unwrap();
    let name = format!("{type_name}-0");
    node.set_tree_name(&name);
    handle
}

#[test]
fn sibling_names_count_per_base_name() {
    common::init_tracing();
    let registry = registry();
    let root = root_with_name(&registry, "TestPattern");
    let root_node = root.current().unwrap();

    // Two siblings named "BoxBlur" get indices 0 and 1; an interleaved
    // "Gain" keeps its own counter.
    let blur_a = root_node.add_child(registry.create("BoxBlur").unwrap()).unwrap();
    let gain = root_node.add_child(registry.create("Gain").unwrap()).unwrap();
    let blur_b = root_node.add_child(registry.create("BoxBlur").unwrap()).unwrap();

    assert_eq!(blur_a.current().unwrap().tree_name(), "BoxBlur-0");
    assert_eq!(gain.current().unwrap().tree_name(), "Gain-0");
    assert_eq!(blur_b.current().unwrap().tree_name(), "BoxBlur-1");
}

#[test]
fn full_tree_name_is_parent_joined() {
    common::init_tracing();
    let registry = registry();
    let root = root_with_name(&registry, "TestPattern");
    let root_node = root.current().unwrap();

    let child = root_node.add_child(registry.create("Gain").unwrap()).unwrap();
    let grandchild = child
        .current()
        .unwrap()
        .add_child(registry.create("Gain").unwrap())
        .unwrap();

    assert_eq!(
        child.current().unwrap().full_tree_name(),
        "TestPattern-0.Gain-0"
    );
    assert_eq!(
        grandchild.current().unwrap().full_tree_name(),
        "TestPattern-0.Gain-0.Gain-0"
    );
}

#[test]
fn rename_updates_all_descendants_and_parameters() {
    common::init_tracing();
    let registry = registry();
    let root = root_with_name(&registry, "TestPattern");
    let root_node = root.current().unwrap();
    let child = root_node.add_child(registry.create("Threshold").unwrap()).unwrap();

    root_node.set_tree_name("Source-7");

    let child_node = child.current().unwrap();
    assert_eq!(child_node.full_tree_name(), "Source-7.Threshold-0");
    assert_eq!(
        child_node.get_parameter("mask").unwrap().tree_name(),
        "Source-7.Threshold-0:mask"
    );
}

#[test]
fn removal_does_not_recycle_indices() {
    common::init_tracing();
    let registry = registry();
    let root = root_with_name(&registry, "TestPattern");
    let root_node = root.current().unwrap();

    for _ in 0..3 {
        root_node.add_child(registry.create("Gain").unwrap()).unwrap();
    }
    assert!(root_node.remove_child_by_name("Gain-1"));
    assert!(root_node.remove_child_at(0)); // Gain-0

    let next = root_node.add_child(registry.create("Gain").unwrap()).unwrap();
    assert_eq!(next.current().unwrap().tree_name(), "Gain-3");
    assert_eq!(root_node.child_count(), 2);
}

#[test]
fn scope_walk_is_preorder_from_root() {
    common::init_tracing();
    let registry = registry();
    let root = root_with_name(&registry, "TestPattern");
    let root_node = root.current().unwrap();

    let a = root_node.add_child(registry.create("Gain").unwrap()).unwrap();
    let b = root_node.add_child(registry.create("Gain").unwrap()).unwrap();
    let a_child = a
        .current()
        .unwrap()
        .add_child(registry.create("Threshold").unwrap())
        .unwrap();

    // Asking a leaf for the scope yields the same order as asking the root.
    let names: Vec<String> = b
        .current()
        .unwrap()
        .nodes_in_scope()
        .iter()
        .filter_map(|h| h.current().map(|n| n.full_tree_name()))
        .collect();
    assert_eq!(
        names,
        vec![
            "TestPattern-0",
            "TestPattern-0.Gain-0",
            "TestPattern-0.Gain-0.Threshold-0",
            "TestPattern-0.Gain-1",
        ]
    );

    let found = b
        .current()
        .unwrap()
        .node_in_scope("TestPattern-0.Gain-0.Threshold-0")
        .unwrap();
    assert_eq!(found.id(), a_child.id());
    assert!(b
        .current()
        .unwrap()
        .node_in_scope("TestPattern-0.Missing-0")
        .is_none());
}

#[test]
fn swap_children_changes_order_only() {
    common::init_tracing();
    let registry = registry();
    let root = root_with_name(&registry, "TestPattern");
    let root_node = root.current().unwrap();
    root_node.add_child(registry.create("Gain").unwrap()).unwrap();
    root_node.add_child(registry.create("BoxBlur").unwrap()).unwrap();

    assert!(root_node.swap_children_by_name("Gain-0", "BoxBlur-0"));
    let order: Vec<String> = root_node
        .children()
        .iter()
        .filter_map(|c| c.current().map(|n| n.tree_name()))
        .collect();
    assert_eq!(order, vec!["BoxBlur-0", "Gain-0"]);

    assert!(!root_node.swap_children(0, 9));
}

proptest! {
    /// For any number of same-named additions interleaved with deletions,
    /// assigned indices are 0,1,2,... in insertion order with no reuse.
    #[test]
    fn prop_tree_name_indices_are_monotone(ops in proptest::collection::vec(any::<bool>(), 1..24)) {
        let registry = NodeRegistry::with_builtins();
        let root = registry.create("TestPattern").unwrap();
        let root_node = root.current().unwrap();

        let mut next_expected = 0usize;
        for add in ops {
            if add || root_node.child_count() == 0 {
                let child = root_node.add_child(registry.create("Gain").unwrap()).unwrap();
                let name = child.current().unwrap().tree_name();
                prop_assert_eq!(name, format!("Gain-{next_expected}"));
                next_expected += 1;
            } else {
                // Remove the first remaining child; its index is gone for good.
                prop_assert!(root_node.remove_child_at(0));
            }
        }
    }

    /// full_tree_name is always parent.full_tree_name + "." + tree_name.
    #[test]
    fn prop_full_names_compose(depth in 1usize..6) {
        let registry = NodeRegistry::with_builtins();
        let root = registry.create("TestPattern").unwrap();
        root.current().unwrap().set_tree_name("TestPattern-0");

        let mut current = root;
        for _ in 0..depth {
            let child = current
                .current()
                .unwrap()
                .add_child(registry.create("Gain").unwrap())
                .unwrap();
            let parent_full = current.current().unwrap().full_tree_name();
            let child_node = child.current().unwrap();
            prop_assert_eq!(
                child_node.full_tree_name(),
                format!("{parent_full}.{}", child_node.tree_name())
            );
            current = child;
        }
    }
}
