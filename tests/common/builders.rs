//! Test graph builders.

use std::sync::Arc;

use aquila::graph::{NodeHandle, NodeRegistry};
use aquila::ParamValue;

/// Builder for a serial chain: the first type becomes the root, each
/// following type a child of the previous node.
pub struct ChainBuilder<'a> {
    registry: &'a NodeRegistry,
    types: Vec<String>,
}

impl<'a> ChainBuilder<'a> {
    pub fn new(registry: &'a NodeRegistry) -> Self {
        Self {
            registry,
            types: Vec::new(),
        }
    }

    pub fn then(mut self, type_name: &str) -> Self {
        self.types.push(type_name.to_string());
        self
    }

    /// Build the chain; returns every handle, root first.
    pub fn build(self) -> Vec<Arc<NodeHandle>> {
        let mut handles = Vec::with_capacity(self.types.len());
        for type_name in &self.types {
            let handle = self.registry.create(type_name).expect("known node type");
            if let Some(last) = handles.last() {
                let parent: &Arc<NodeHandle> = last;
                parent
                    .current()
                    .expect("live parent")
                    .add_child(handle.clone())
                    .expect("add child");
            }
            handles.push(handle);
        }
        handles
    }
}

/// A Script node child whose body applies `pixels[i] = pixels[i] * mul + add`.
/// Affine bodies make execution order observable in the output values.
pub fn affine_script(registry: &NodeRegistry, mul: f64, add: f64) -> Arc<NodeHandle> {
    let handle = registry.create("Script").expect("Script registered");
    // {:?} keeps a float literal ("2.0", not "2") so the script stays in
    // FLOAT arithmetic.
    let source = format!(
        r#"
        let len = pixels.len();
        for i in 0..len {{
            pixels[i] = pixels[i] * {mul:?} + {add:?};
        }}
        pixels
    "#
    );
    handle
        .current()
        .unwrap()
        .get_parameter("source")
        .unwrap()
        .write(ParamValue::Text(source))
        .unwrap();
    handle
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_builder() {
        let registry = NodeRegistry::with_builtins();
        let handles = ChainBuilder::new(&registry)
            .then("TestPattern")
            .then("Gain")
            .build();
        assert_eq!(handles.len(), 2);
        assert_eq!(handles[0].current().unwrap().child_count(), 1);
    }
}
