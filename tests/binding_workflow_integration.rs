//! Parameter binding across the graph: discovery, connection, teardown.

mod common;

use std::sync::Arc;

use aquila::graph::{DataStream, NodeRegistry, VariableManager};
use aquila::{AquilaError, ParamValue, ValueKind};

#[test]
fn discovery_offers_only_foreign_outputs_of_accepted_kind() {
    common::init_tracing();
    let registry = Arc::new(NodeRegistry::with_builtins());
    let stream = DataStream::new(registry.clone());

    let root = stream.create_root("TestPattern").unwrap();
    let root_node = root.current().unwrap();
    let threshold = root_node.add_child(registry.create("Threshold").unwrap()).unwrap();
    let overlay = root_node.add_child(registry.create("Overlay").unwrap()).unwrap();

    let overlay_node = overlay.current().unwrap();
    let candidates = overlay_node.find_compatible_inputs("mask").unwrap();

    // Frame outputs elsewhere in the graph qualify.
    assert!(candidates.contains(&"TestPattern-0:output".to_string()));
    assert!(candidates.contains(&"TestPattern-0.Threshold-0:mask".to_string()));
    // Float outputs and the overlay's own output never do.
    assert!(!candidates.contains(&"TestPattern-0.Threshold-0:fraction_above".to_string()));
    assert!(candidates
        .iter()
        .all(|c| !c.starts_with("TestPattern-0.Overlay-0")));

    // Per-input listing covers every input parameter.
    let all = overlay_node.find_all_compatible_inputs();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].0, "mask");
    let _ = threshold;
}

#[test]
fn variable_manager_agrees_with_scope_walk() {
    common::init_tracing();
    let registry = Arc::new(NodeRegistry::with_builtins());
    let stream = DataStream::new(registry.clone());

    let root = stream.create_root("TestPattern").unwrap();
    let root_node = root.current().unwrap();
    let overlay = root_node.add_child(registry.create("Overlay").unwrap()).unwrap();
    stream.rebuild_variables();

    let mask = overlay.current().unwrap().get_parameter("mask").unwrap();
    let mut from_manager = stream.variables().find_compatible(&mask);
    let mut from_walk = overlay
        .current()
        .unwrap()
        .find_compatible_inputs("mask")
        .unwrap();
    from_manager.sort();
    from_walk.sort();
    assert_eq!(from_manager, from_walk);

    assert!(stream.variables().resolve("TestPattern-0:output").is_some());
    assert_eq!(
        stream.variables().outputs_of_kind(ValueKind::Frame).len(),
        2 // TestPattern output + Overlay output
    );
}

#[test]
fn binding_is_pull_not_push() {
    common::init_tracing();
    let registry = Arc::new(NodeRegistry::with_builtins());
    let stream = DataStream::new(registry.clone());

    let root = stream.create_root("TestPattern").unwrap();
    let root_node = root.current().unwrap();
    let overlay = root_node.add_child(registry.create("Overlay").unwrap()).unwrap();
    let overlay_node = overlay.current().unwrap();

    overlay_node
        .set_input_parameter("TestPattern-0:output", "mask")
        .unwrap();
    let mask = overlay_node.get_parameter("mask").unwrap();

    // Nothing was copied at bind time: the source has produced nothing yet.
    assert_eq!(mask.read(), ParamValue::Empty);

    stream.process_pass();
    // Reads now see whatever the producer last published.
    assert!(mask.read().as_frame().is_some());
}

#[test]
fn incompatible_binding_is_rejected_without_side_effects() {
    common::init_tracing();
    let registry = Arc::new(NodeRegistry::with_builtins());
    let stream = DataStream::new(registry.clone());

    let root = stream.create_root("TestPattern").unwrap();
    let root_node = root.current().unwrap();
    let threshold = root_node.add_child(registry.create("Threshold").unwrap()).unwrap();
    let overlay = root_node.add_child(registry.create("Overlay").unwrap()).unwrap();
    let overlay_node = overlay.current().unwrap();

    let err = overlay_node
        .set_input_parameter("TestPattern-0.Threshold-0:fraction_above", "mask")
        .unwrap_err();
    assert!(matches!(err, AquilaError::IncompatibleBinding { .. }));
    assert!(overlay_node
        .get_parameter("mask")
        .unwrap()
        .input_source()
        .is_none());
    let _ = threshold;
}

#[test]
fn deleting_source_node_nulls_every_bound_input() {
    common::init_tracing();
    let registry = Arc::new(NodeRegistry::with_builtins());
    let stream = DataStream::new(registry.clone());

    let root = stream.create_root("TestPattern").unwrap();
    let root_node = root.current().unwrap();
    let threshold = root_node.add_child(registry.create("Threshold").unwrap()).unwrap();
    let overlay_a = root_node.add_child(registry.create("Overlay").unwrap()).unwrap();
    let overlay_b = root_node.add_child(registry.create("Overlay").unwrap()).unwrap();

    for overlay in [&overlay_a, &overlay_b] {
        overlay
            .current()
            .unwrap()
            .set_input_parameter("TestPattern-0.Threshold-0:mask", "mask")
            .unwrap();
    }

    // Remove the threshold node; dropping the handle releases the node and
    // its parameters.
    assert!(root_node.remove_child(&threshold));
    threshold.detach();
    drop(threshold);

    for overlay in [&overlay_a, &overlay_b] {
        let mask = overlay.current().unwrap().get_parameter("mask").unwrap();
        assert!(mask.input_source().is_none());
        // Reads come up empty instead of crashing.
        assert_eq!(mask.read(), ParamValue::Empty);
    }

    // The graph still processes: overlays degrade to passthrough.
    stream.process_pass();
}

#[test]
fn throwing_and_optional_accessors() {
    common::init_tracing();
    let registry = Arc::new(NodeRegistry::with_builtins());
    let handle = registry.create("Gain").unwrap();
    let node = handle.current().unwrap();

    assert!(node.get_parameter("gain").is_ok());
    assert!(matches!(
        node.get_parameter("missing"),
        Err(AquilaError::ParamNotFound(_))
    ));
    assert!(node.get_parameter_opt("missing").is_none());
    assert!(node.get_parameter_at(0).is_ok());
    assert!(matches!(
        node.get_parameter_at(99),
        Err(AquilaError::ParamIndexOutOfBounds { .. })
    ));
    assert!(node.get_parameter_at_opt(99).is_none());
}

#[test]
fn standalone_variable_manager_prunes_dead_entries() {
    common::init_tracing();
    let registry = NodeRegistry::with_builtins();
    let vm = VariableManager::new();

    let handle = registry.create("TestPattern").unwrap();
    vm.register_node(&handle.current().unwrap());
    assert!(vm.len() > 0);

    handle.detach();
    drop(handle);
    assert_eq!(vm.len(), 0);
}
