//! Rendering schemes and their fallback effects.
//!
//! The table is a small document of the form
//!
//! ```json
//! { "scheme": [ { "name": "shadow", "fallback": "Effects/shadow-fallback" } ] }
//! ```
//!
//! and is read once per [`Context`](crate::context::Context), on first use.

use std::path::Path;

use crate::data_structures::config_node::ConfigNode;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Scheme {
    pub name: String,
    pub fallback: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SchemeTable {
    schemes: Vec<Scheme>,
}

impl SchemeTable {
    pub fn new(schemes: Vec<Scheme>) -> Self {
        Self { schemes }
    }

    pub fn from_node(root: &ConfigNode) -> Self {
        let schemes = root
            .children_named("scheme")
            .filter_map(|node| {
                let Some(name) = node.get_string("name") else {
                    log::warn!("Scheme entry {} has no name, skipping", node.index());
                    return None;
                };
                Some(Scheme {
                    name,
                    fallback: node.get_string("fallback"),
                })
            })
            .collect();
        Self { schemes }
    }

    /// Loads the table, or an empty one if `path` can't be read.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };
        match ConfigNode::load_json(path) {
            Ok(root) => {
                let table = Self::from_node(&root);
                log::info!("Loaded {} scheme(s) from {}", table.schemes.len(), path.display());
                table
            }
            Err(e) => {
                log::warn!("Couldn't read scheme table {}: {e:#}", path.display());
                Self::default()
            }
        }
    }

    pub fn schemes(&self) -> &[Scheme] {
        &self.schemes
    }

    pub fn fallback(&self, scheme: &str) -> Option<&str> {
        self.schemes
            .iter()
            .find(|s| s.name == scheme)
            .and_then(|s| s.fallback.as_deref())
    }
}
