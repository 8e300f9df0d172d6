//! Effect property indirection.
//!
//! Any value in an effect description may be written literally, or as a
//! `use` reference into the effect's `parameters` subtree. A parameter may in
//! turn `use` a live property, which makes the value dynamic. Builders read
//! every leaf through [`PropertyResolver`] so the three cases are handled in
//! one place.

use crate::{
    data_structures::{
        config_node::{ConfigNode, Value},
        property_root::PropertyRoot,
    },
    error::build_error,
};

/// Where a property's value actually lives.
#[derive(Clone, Debug, PartialEq)]
pub enum EffectValue<'a> {
    /// A value fixed in the description or its parameters.
    Literal(&'a ConfigNode),
    /// A structured node without indirection.
    Branch(&'a ConfigNode),
    /// A live property path.
    Live(String),
}

pub struct PropertyResolver<'a> {
    parameters: Option<&'a ConfigNode>,
    root: Option<&'a PropertyRoot>,
}

impl<'a> PropertyResolver<'a> {
    pub fn new(parameters: Option<&'a ConfigNode>, root: Option<&'a PropertyRoot>) -> Self {
        Self { parameters, root }
    }

    pub fn root(&self) -> Option<&'a PropertyRoot> {
        self.root
    }

    pub fn resolve(&self, prop: &'a ConfigNode) -> anyhow::Result<EffectValue<'a>> {
        let Some(use_node) = prop.child("use") else {
            return Ok(if prop.is_leaf() {
                EffectValue::Literal(prop)
            } else {
                EffectValue::Branch(prop)
            });
        };
        let Some(path) = use_node.value().as_str() else {
            return build_error(
                format!("'use' under {} does not name a path", prop.name()),
                prop.name(),
            );
        };
        match self.parameters.and_then(|p| p.get(path)) {
            Some(param) if param.is_leaf() => Ok(EffectValue::Literal(param)),
            Some(param) => match param.child("use").and_then(|u| u.value().as_str()) {
                Some(global) => self.live(global, prop),
                None => Ok(EffectValue::Branch(param)),
            },
            None => self.live(path, prop),
        }
    }

    fn live(&self, path: &str, prop: &ConfigNode) -> anyhow::Result<EffectValue<'a>> {
        if self.root.is_none() {
            return build_error(
                format!("can't resolve '{path}' without a property root"),
                prop.name(),
            );
        }
        Ok(EffectValue::Live(path.to_string()))
    }

    /// The node whose children describe `prop` after indirection.
    pub fn node(&self, prop: &'a ConfigNode) -> anyhow::Result<&'a ConfigNode> {
        Ok(match self.resolve(prop)? {
            EffectValue::Literal(node) | EffectValue::Branch(node) => node,
            EffectValue::Live(_) => prop,
        })
    }

    /// Current value of `prop` after indirection.
    pub fn value(&self, prop: &'a ConfigNode) -> anyhow::Result<Value> {
        Ok(match self.resolve(prop)? {
            EffectValue::Literal(node) | EffectValue::Branch(node) => node.value().clone(),
            EffectValue::Live(path) => self
                .root
                .and_then(|r| r.get(&path))
                .unwrap_or_default(),
        })
    }

    pub fn child_value(&self, parent: &'a ConfigNode, name: &str) -> anyhow::Result<Option<Value>> {
        match parent.child(name) {
            Some(child) => Ok(Some(self.value(child)?).filter(|v| !v.is_none())),
            None => Ok(None),
        }
    }

    pub fn child_f64(&self, parent: &'a ConfigNode, name: &str) -> anyhow::Result<Option<f64>> {
        Ok(self.child_value(parent, name)?.and_then(|v| v.as_f64()))
    }

    pub fn child_i64(&self, parent: &'a ConfigNode, name: &str) -> anyhow::Result<Option<i64>> {
        Ok(self.child_value(parent, name)?.and_then(|v| v.as_i64()))
    }

    pub fn child_bool(&self, parent: &'a ConfigNode, name: &str) -> anyhow::Result<Option<bool>> {
        Ok(self.child_value(parent, name)?.and_then(|v| v.as_bool()))
    }

    pub fn child_string(
        &self,
        parent: &'a ConfigNode,
        name: &str,
    ) -> anyhow::Result<Option<String>> {
        Ok(self.child_value(parent, name)?.map(|v| v.serialize()))
    }

    pub fn child_vec4(
        &self,
        parent: &'a ConfigNode,
        name: &str,
    ) -> anyhow::Result<Option<[f64; 4]>> {
        Ok(self.child_value(parent, name)?.and_then(|v| v.as_vec4()))
    }

    /// The `active` convention: a block with `active` false is skipped.
    pub fn is_active(&self, prop: &'a ConfigNode) -> anyhow::Result<bool> {
        Ok(self.child_bool(prop, "active")?.unwrap_or(true))
    }
}
