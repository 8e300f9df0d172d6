//! Property-tree merging for effect inheritance.
//!
//! `merge(child, parent)` produces the resolved tree of an effect that
//! inherits from `parent`. Nodes are matched by `(name, index)`; child leaves
//! override whatever the parent has at the same position, branches are merged
//! recursively and parent-only branches survive untouched. Child-derived
//! entries come first in child order, followed by leftover parent entries in
//! parent order.

use crate::data_structures::config_node::ConfigNode;

/// Merges `child` over `parent`. Inputs are assumed acyclic.
///
/// A child without children overrides the parent wholesale when it carries a
/// value. A child with neither children nor a value is an empty branch and
/// contributes nothing but its identity, so the parent's content shows through.
pub fn merge(child: &ConfigNode, parent: &ConfigNode) -> ConfigNode {
    if child.is_leaf() && !child.value().is_none() {
        return child.clone();
    }

    let mut result = ConfigNode::new(child.name()).at(child.index());
    *result.attributes_mut() = parent.attributes().clone();
    for (key, value) in child.attributes() {
        result.attributes_mut().insert(key.clone(), value.clone());
    }
    result.set_value(if child.value().is_none() {
        parent.value().clone()
    } else {
        child.value().clone()
    });

    let mut remaining: Vec<Option<&ConfigNode>> = parent.children().iter().map(Some).collect();
    for child_node in child.children() {
        let matched = remaining.iter_mut().find(|slot| {
            slot.is_some_and(|p| p.name() == child_node.name() && p.index() == child_node.index())
        });
        let merged = match matched.and_then(Option::take) {
            Some(parent_node) => merge(child_node, parent_node),
            None => child_node.clone(),
        };
        result.insert_child(merged);
    }
    for parent_node in remaining.into_iter().flatten() {
        result.insert_child(parent_node.clone());
    }
    result
}
