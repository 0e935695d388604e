//! Persisted graph configuration.
//!
//! A graph saves to a tree-structured JSON document: per node `NodeName`,
//! `NodeTreeName`, `FullTreeName`, the display/enable flags, a `Children`
//! block keyed `Node-<i>` with a `Count`, and a `Parameters` block keyed by
//! parameter name holding either an input-binding record (`TreeName`,
//! `InputParameter`, `Type`, `ToolTip`) or a serialized control value.
//!
//! Round-trip contract: save-then-load reconstructs an isomorphic tree —
//! same node count, tree names, and fan-out order — with input bindings
//! re-resolved by path. A dangling source path is logged and left unbound,
//! never fatal.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{AquilaError, Result};
use crate::graph::hotswap::NodeHandle;
use crate::graph::node::Node;
use crate::graph::param::{ParamFlags, ParamValue, ValueKind};
use crate::graph::registry::NodeRegistry;

/// Top-level document: the root nodes of one graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphConfig {
    #[serde(rename = "Count")]
    pub count: usize,
    #[serde(flatten)]
    pub roots: BTreeMap<String, NodeConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    #[serde(rename = "NodeName")]
    pub node_name: String,
    #[serde(rename = "NodeTreeName")]
    pub tree_name: String,
    #[serde(rename = "FullTreeName")]
    pub full_tree_name: String,
    #[serde(rename = "DrawResults")]
    pub draw_results: bool,
    #[serde(rename = "Enabled")]
    pub enabled: bool,
    #[serde(rename = "ExternalDisplay")]
    pub external_display: bool,
    #[serde(rename = "Children")]
    pub children: ChildrenConfig,
    #[serde(rename = "Parameters")]
    pub parameters: BTreeMap<String, ParamConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChildrenConfig {
    #[serde(rename = "Count")]
    pub count: usize,
    #[serde(flatten)]
    pub nodes: BTreeMap<String, NodeConfig>,
}

/// A parameter entry: a bound input, or a control value.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamConfig {
    Input(InputBindingConfig),
    Control(ParamValue),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputBindingConfig {
    #[serde(rename = "TreeName")]
    pub tree_name: String,
    #[serde(rename = "InputParameter")]
    pub input_parameter: String,
    #[serde(rename = "Type")]
    pub kind: ValueKind,
    #[serde(rename = "ToolTip", default, skip_serializing_if = "Option::is_none")]
    pub tooltip: Option<String>,
}

// ── Saving ──

/// Serialize one node and its subtree.
pub fn node_to_config(node: &Arc<Node>) -> NodeConfig {
    let mut children = BTreeMap::new();
    for (i, child) in node.children().iter().enumerate() {
        if let Some(child_node) = child.current() {
            children.insert(format!("Node-{i}"), node_to_config(&child_node));
        }
    }
    let count = children.len();

    let mut parameters = BTreeMap::new();
    for p in node.parameters() {
        if p.has_flag(ParamFlags::INPUT) {
            // Only bound inputs are recorded.
            if let Some(source) = p.input_source() {
                let tooltip = p.tooltip();
                parameters.insert(
                    p.name().to_string(),
                    ParamConfig::Input(InputBindingConfig {
                        tree_name: p.tree_name(),
                        input_parameter: source.tree_name(),
                        kind: p.kind(),
                        tooltip: if tooltip.is_empty() { None } else { Some(tooltip) },
                    }),
                );
            }
        } else if p.has_flag(ParamFlags::CONTROL) {
            parameters.insert(p.name().to_string(), ParamConfig::Control(p.own_value()));
        }
    }

    NodeConfig {
        node_name: node.node_name().to_string(),
        tree_name: node.tree_name(),
        full_tree_name: node.full_tree_name(),
        draw_results: node.draw_results(),
        enabled: node.enabled(),
        external_display: node.external_display(),
        children: ChildrenConfig {
            count,
            nodes: children,
        },
        parameters,
    }
}

/// Serialize a whole graph (its root list).
pub fn graph_to_config(roots: &[Arc<NodeHandle>]) -> GraphConfig {
    let mut out = BTreeMap::new();
    for (i, root) in roots.iter().enumerate() {
        if let Some(node) = root.current() {
            out.insert(format!("Node-{i}"), node_to_config(&node));
        }
    }
    GraphConfig {
        count: out.len(),
        roots: out,
    }
}

pub fn save_graph_to_path(path: &Path, roots: &[Arc<NodeHandle>]) -> Result<()> {
    let config = graph_to_config(roots);
    let file = File::create(path)?;
    serde_json::to_writer_pretty(BufWriter::new(file), &config)?;
    tracing::info!(path = %path.display(), roots = config.count, "graph saved");
    Ok(())
}

// ── Loading ──

fn parse_name_index(tree_name: &str) -> Option<(&str, usize)> {
    let (base, idx) = tree_name.rsplit_once('-')?;
    idx.parse::<usize>().ok().map(|i| (base, i))
}

/// Rebuild one node and its subtree from config. Control values are
/// restored here; input bindings need the whole tree and are applied in a
/// second pass by [`apply_bindings`].
pub fn node_from_config(cfg: &NodeConfig, registry: &NodeRegistry) -> Result<Arc<NodeHandle>> {
    let handle = registry.create(&cfg.node_name)?;
    let node = handle
        .current()
        .ok_or_else(|| AquilaError::DetachedHandle(cfg.node_name.clone()))?;

    node.set_enabled(cfg.enabled);
    node.set_draw_results(cfg.draw_results);
    node.set_external_display(cfg.external_display);
    node.set_tree_name(&cfg.tree_name);

    for i in 0..cfg.children.count {
        let key = format!("Node-{i}");
        match cfg.children.nodes.get(&key) {
            Some(child_cfg) => {
                let child = node_from_config(child_cfg, registry)?;
                node.add_child(child.clone())?;
                if let Some(child_node) = child.current() {
                    // Restore the saved name (which may have index gaps
                    // after deletions) and keep the counter past it.
                    child_node.set_tree_name(&child_cfg.tree_name);
                    if let Some((base, index)) = parse_name_index(&child_cfg.tree_name) {
                        node.ensure_sibling_counter_at_least(base, index + 1);
                    }
                }
            }
            None => {
                tracing::error!(child = %key, node = %cfg.tree_name, "missing child block in config");
            }
        }
    }

    for (name, entry) in &cfg.parameters {
        if let ParamConfig::Control(value) = entry {
            match node.get_parameter_opt(name) {
                Some(p) => {
                    if let Err(e) = p.write(value.clone()) {
                        tracing::warn!(param = %name, error = %e, "failed to restore control value");
                    }
                }
                None => {
                    tracing::warn!(param = %name, node = %cfg.tree_name, "config references unknown parameter");
                }
            }
        }
    }

    Ok(handle)
}

/// Second pass: resolve and apply the recorded input bindings by path. A
/// source path that no longer resolves is logged and the input left
/// unbound.
pub fn apply_bindings(cfg: &NodeConfig, handle: &Arc<NodeHandle>) {
    let Some(node) = handle.current() else { return };

    for (name, entry) in &cfg.parameters {
        if let ParamConfig::Input(binding) = entry {
            let Some(input) = node.get_parameter_opt(name) else {
                tracing::warn!(param = %name, "config binds unknown input parameter");
                continue;
            };
            match node.resolve_parameter(&binding.input_parameter) {
                Ok(source) => {
                    if let Err(e) = input.set_input(Some(&source)) {
                        tracing::warn!(
                            input = %name,
                            source = %binding.input_parameter,
                            error = %e,
                            "recorded binding rejected"
                        );
                    }
                }
                Err(_) => {
                    tracing::warn!(
                        input = %name,
                        source = %binding.input_parameter,
                        "unresolvable input source; left unbound"
                    );
                }
            }
        }
    }

    for i in 0..cfg.children.count {
        if let Some(child_cfg) = cfg.children.nodes.get(&format!("Node-{i}")) {
            if let Some(child) = node.get_child(&child_cfg.tree_name) {
                apply_bindings(child_cfg, &child);
            }
        }
    }
}

/// Rebuild a whole graph: all roots first, then the binding pass.
pub fn graph_from_config(
    cfg: &GraphConfig,
    registry: &NodeRegistry,
) -> Result<Vec<Arc<NodeHandle>>> {
    let mut built = Vec::new();
    for i in 0..cfg.count {
        let key = format!("Node-{i}");
        match cfg.roots.get(&key) {
            Some(root_cfg) => {
                let handle = node_from_config(root_cfg, registry)?;
                built.push((root_cfg, handle));
            }
            None => {
                tracing::error!(root = %key, "missing root block in config");
            }
        }
    }
    for (root_cfg, handle) in &built {
        apply_bindings(root_cfg, handle);
    }
    Ok(built.into_iter().map(|(_, h)| h).collect())
}

pub fn load_graph_from_path(
    path: &Path,
    registry: &NodeRegistry,
) -> Result<Vec<Arc<NodeHandle>>> {
    let file = File::open(path)?;
    let config: GraphConfig = serde_json::from_reader(BufReader::new(file))?;
    let roots = graph_from_config(&config, registry)?;
    tracing::info!(path = %path.display(), roots = roots.len(), "graph loaded");
    Ok(roots)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::param::ParamValue;

    fn build_sample_graph(registry: &NodeRegistry) -> Arc<NodeHandle> {
        let root = registry.create("TestPattern").unwrap();
        let root_node = root.current().unwrap();
        root_node.set_tree_name("TestPattern-0");

        let threshold = root_node
            .add_child(registry.create("Threshold").unwrap())
            .unwrap();
        threshold
            .current()
            .unwrap()
            .get_parameter("threshold")
            .unwrap()
            .write(ParamValue::Float(0.25))
            .unwrap();

        let overlay = root_node
            .add_child(registry.create("Overlay").unwrap())
            .unwrap();
        overlay
            .current()
            .unwrap()
            .set_input_parameter("TestPattern-0.Threshold-0:mask", "mask")
            .unwrap();
        root
    }

    #[test]
    fn test_node_config_shape() {
        let registry = NodeRegistry::with_builtins();
        let root = build_sample_graph(&registry);
        let cfg = node_to_config(&root.current().unwrap());

        assert_eq!(cfg.node_name, "TestPattern");
        assert_eq!(cfg.children.count, 2);
        assert!(cfg.children.nodes.contains_key("Node-0"));
        assert!(cfg.children.nodes.contains_key("Node-1"));

        let overlay = &cfg.children.nodes["Node-1"];
        match &overlay.parameters["mask"] {
            ParamConfig::Input(binding) => {
                assert_eq!(binding.input_parameter, "TestPattern-0.Threshold-0:mask");
                assert_eq!(binding.kind, ValueKind::Frame);
            }
            other => panic!("expected input binding, got {other:?}"),
        }
    }

    #[test]
    fn test_round_trip_preserves_shape_and_bindings() {
        let registry = NodeRegistry::with_builtins();
        let root = build_sample_graph(&registry);
        let cfg = graph_to_config(std::slice::from_ref(&root));

        let json = serde_json::to_string_pretty(&cfg).unwrap();
        let parsed: GraphConfig = serde_json::from_str(&json).unwrap();
        let loaded = graph_from_config(&parsed, &registry).unwrap();
        assert_eq!(loaded.len(), 1);

        let new_root = loaded[0].current().unwrap();
        assert_eq!(new_root.tree_name(), "TestPattern-0");
        assert_eq!(new_root.child_count(), 2);

        let threshold = new_root.get_child("Threshold-0").unwrap();
        assert_eq!(
            threshold
                .current()
                .unwrap()
                .get_parameter("threshold")
                .unwrap()
                .read()
                .as_float(),
            Some(0.25)
        );

        let overlay = new_root.get_child("Overlay-0").unwrap();
        let mask = overlay.current().unwrap().get_parameter("mask").unwrap();
        assert_eq!(
            mask.input_source().map(|s| s.tree_name()),
            Some("TestPattern-0.Threshold-0:mask".to_string())
        );
    }

    #[test]
    fn test_gapped_sibling_names_restore_without_collision() {
        let registry = NodeRegistry::with_builtins();
        let root = registry.create("TestPattern").unwrap();
        let root_node = root.current().unwrap();
        root_node.set_tree_name("TestPattern-0");
        root_node
            .add_child(registry.create("Gain").unwrap())
            .unwrap();
        let second = root_node
            .add_child(registry.create("Gain").unwrap())
            .unwrap();
        // Delete Gain-0; the saved graph keeps only Gain-1.
        assert!(root_node.remove_child_by_name("Gain-0"));
        assert_eq!(second.current().unwrap().tree_name(), "Gain-1");

        let cfg = node_to_config(&root_node);
        let loaded = node_from_config(&cfg, &registry).unwrap();
        let loaded_node = loaded.current().unwrap();
        assert!(loaded_node.get_child("Gain-1").is_some());

        // New siblings continue past the restored index.
        let next = loaded_node
            .add_child(registry.create("Gain").unwrap())
            .unwrap();
        assert_eq!(next.current().unwrap().tree_name(), "Gain-2");
    }

    #[test]
    fn test_dangling_binding_is_left_unbound() {
        let registry = NodeRegistry::with_builtins();
        let root = build_sample_graph(&registry);
        let mut cfg = node_to_config(&root.current().unwrap());

        // Point the recorded binding at a node that will not exist.
        let overlay_cfg = cfg.children.nodes.get_mut("Node-1").unwrap();
        if let Some(ParamConfig::Input(binding)) = overlay_cfg.parameters.get_mut("mask") {
            binding.input_parameter = "TestPattern-0.Gone-9:mask".to_string();
        }

        let loaded = node_from_config(&cfg, &registry).unwrap();
        apply_bindings(&cfg, &loaded);

        let overlay = loaded.current().unwrap().get_child("Overlay-0").unwrap();
        let mask = overlay.current().unwrap().get_parameter("mask").unwrap();
        assert!(mask.input_source().is_none());
    }
}
