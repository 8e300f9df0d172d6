//! Effects: declarative material descriptions compiled into render state.
//!
//! An effect description is a [`ConfigNode`] tree with `technique` children,
//! each holding `pass` children whose attributes describe GPU state. Effects
//! may inherit from a named parent (`inherits-from`); the two trees are merged
//! with [`merge::merge`] before anything is built.
//!
//! Effects are shared as `Arc<Effect>`. Techniques are compiled lazily, once,
//! by [`Effect::realize_techniques`].

use std::{
    collections::HashMap,
    path::PathBuf,
    sync::{Arc, Mutex, OnceLock, RwLock, Weak},
};

use crate::{
    context::Context,
    data_structures::config_node::ConfigNode,
    effect::{
        compiler::Compiled,
        technique::{ProbeScheduler, Technique},
    },
    error::{BuildDiagnostic, BuildError, build_error},
    resources::{SearchPath, backend::ContextId},
};

pub mod builders;
pub mod compiler;
pub mod expression;
pub mod merge;
pub mod pass;
pub mod property;
pub mod scheme;
pub mod technique;

#[derive(Clone, Debug)]
pub struct Effect {
    name: String,
    root: ConfigNode,
    realized: OnceLock<Compiled>,
}

impl Effect {
    pub fn new(name: impl Into<String>, root: ConfigNode) -> Self {
        Self {
            name: name.into(),
            root,
            realized: OnceLock::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The merged description this effect was built from.
    pub fn root(&self) -> &ConfigNode {
        &self.root
    }

    pub fn parameters(&self) -> Option<&ConfigNode> {
        self.root.child("parameters")
    }

    pub fn is_realized(&self) -> bool {
        self.realized.get().is_some()
    }

    /// Compiles the techniques on first call and returns them.
    ///
    /// Before compiling, every scheme of the context's scheme table that no
    /// technique implements pulls in its fallback effect's description.
    pub fn realize_techniques(&self, ctx: &Context) -> &[Technique] {
        &self
            .realized
            .get_or_init(|| {
                let root = self.with_scheme_fallbacks(ctx);
                let compiled = compiler::compile(&self.name, &root, ctx);
                log::debug!(
                    "Effect {}: {} technique(s), {} diagnostic(s)",
                    self.name,
                    compiled.techniques.len(),
                    compiled.diagnostics.len()
                );
                compiled
            })
            .techniques
    }

    fn with_scheme_fallbacks(&self, ctx: &Context) -> ConfigNode {
        let mut root = self.root.clone();
        for scheme in ctx.schemes().schemes() {
            let Some(fallback) = &scheme.fallback else {
                continue;
            };
            let covered = root
                .children_named("technique")
                .any(|t| t.get_string("scheme").as_deref() == Some(scheme.name.as_str()));
            if covered || fallback == &self.name {
                continue;
            }
            match ctx.library().make_effect(fallback, ctx) {
                Ok(effect) => root = merge::merge(&root, effect.root()),
                Err(e) => log::warn!(
                    "Effect {}: fallback {fallback} for scheme {} unavailable: {e:#}",
                    self.name,
                    scheme.name
                ),
            }
        }
        root
    }

    /// Compiled techniques, empty until realized.
    pub fn techniques(&self) -> &[Technique] {
        self.realized
            .get()
            .map(|c| c.techniques.as_slice())
            .unwrap_or_default()
    }

    pub fn diagnostics(&self) -> &[BuildDiagnostic] {
        self.realized
            .get()
            .map(|c| c.diagnostics.as_slice())
            .unwrap_or_default()
    }

    /// First technique of `scheme` that is valid on `context` right now.
    ///
    /// Techniques whose validity is still being probed are passed over, so an
    /// effect may render with a later technique (or not at all) for a frame or
    /// two after it first appears.
    pub fn choose_technique(
        &self,
        scheme: &str,
        context: ContextId,
        scheduler: &dyn ProbeScheduler,
    ) -> Option<&Technique> {
        self.techniques()
            .iter()
            .find(|t| t.scheme == scheme && t.is_valid(context, scheduler))
    }
}

type EffectKey = (ConfigNode, Vec<PathBuf>);

/// Compiled effects keyed by their unmerged description and search path.
///
/// Entries don't keep effects alive: once every user has dropped an effect the
/// next lookup builds a fresh one. Each key has its own lock so building one
/// effect doesn't hold up lookups of another.
#[derive(Default)]
pub struct EffectCache {
    slots: Mutex<HashMap<EffectKey, Arc<Mutex<Weak<Effect>>>>>,
}

impl EffectCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_create(
        &self,
        node: &ConfigNode,
        search_path: &SearchPath,
        build: impl FnOnce() -> anyhow::Result<Effect>,
    ) -> anyhow::Result<Arc<Effect>> {
        let slot = self
            .slots
            .lock()
            .map_err(|_| BuildError::new("effect cache lock poisoned", "effect"))?
            .entry((node.clone(), search_path.dirs().to_vec()))
            .or_default()
            .clone();
        let mut weak = slot
            .lock()
            .map_err(|_| BuildError::new("effect cache slot poisoned", "effect"))?;
        if let Some(effect) = weak.upgrade() {
            return Ok(effect);
        }
        let effect = Arc::new(build()?);
        *weak = Arc::downgrade(&effect);
        Ok(effect)
    }

    /// Number of entries whose effect is still alive.
    pub fn live_count(&self) -> usize {
        self.slots
            .lock()
            .map(|slots| {
                slots
                    .values()
                    .filter(|slot| slot.lock().is_ok_and(|w| w.strong_count() > 0))
                    .count()
            })
            .unwrap_or(0)
    }

    /// Drops entries whose effect has been released. Returns how many went.
    pub fn purge(&self) -> usize {
        let Ok(mut slots) = self.slots.lock() else {
            return 0;
        };
        let before = slots.len();
        slots.retain(|_, slot| {
            Arc::strong_count(slot) > 1 || slot.lock().is_ok_and(|w| w.strong_count() > 0)
        });
        before - slots.len()
    }
}

/// Named effect descriptions and the effects resolved from them.
#[derive(Default)]
pub struct EffectLibrary {
    descriptions: RwLock<HashMap<String, ConfigNode>>,
    effects: Mutex<HashMap<String, Arc<Effect>>>,
}

impl EffectLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a description under `name`, replacing any earlier one.
    pub fn register(&self, name: impl Into<String>, description: ConfigNode) {
        let name = name.into();
        if let Ok(mut effects) = self.effects.lock() {
            effects.remove(&name);
        }
        if let Ok(mut descriptions) = self.descriptions.write() {
            descriptions.insert(name, description);
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.descriptions
            .read()
            .is_ok_and(|d| d.contains_key(name))
    }

    /// Resolves the named effect and its `inherits-from` chain. Techniques
    /// are not realized.
    pub fn make_effect(&self, name: &str, ctx: &Context) -> anyhow::Result<Arc<Effect>> {
        self.resolve_named(name, ctx, &mut Vec::new())
    }

    /// Builds an effect from an anonymous description, resolving its parent.
    pub fn effect_from_node(&self, node: &ConfigNode, ctx: &Context) -> anyhow::Result<Effect> {
        let name = node
            .get_string("name")
            .unwrap_or_else(|| "anonymous".to_string());
        let root = self.inherit(node, ctx, &mut Vec::new())?;
        Ok(Effect::new(name, root))
    }

    fn resolve_named(
        &self,
        name: &str,
        ctx: &Context,
        visiting: &mut Vec<String>,
    ) -> anyhow::Result<Arc<Effect>> {
        if let Some(effect) = self.effects.lock().ok().and_then(|e| e.get(name).cloned()) {
            return Ok(effect);
        }
        if visiting.iter().any(|v| v == name) {
            return build_error(
                format!("inheritance cycle: {} -> {name}", visiting.join(" -> ")),
                "effect",
            );
        }
        visiting.push(name.to_string());
        let description = self.description(name, ctx)?;
        let root = self.inherit(&description, ctx, visiting)?;
        visiting.pop();

        let effect = Arc::new(Effect::new(name, root));
        match self.effects.lock() {
            Ok(mut effects) => Ok(effects.entry(name.to_string()).or_insert(effect).clone()),
            Err(_) => Ok(effect),
        }
    }

    fn inherit(
        &self,
        description: &ConfigNode,
        ctx: &Context,
        visiting: &mut Vec<String>,
    ) -> anyhow::Result<ConfigNode> {
        match description.get_string("inherits-from") {
            Some(parent) => {
                let parent = self.resolve_named(&parent, ctx, visiting)?;
                Ok(merge::merge(description, parent.root()))
            }
            None => Ok(description.clone()),
        }
    }

    /// A registered description, or `<name>.json` from the search path.
    fn description(&self, name: &str, ctx: &Context) -> anyhow::Result<ConfigNode> {
        if let Some(node) = self.descriptions.read().ok().and_then(|d| d.get(name).cloned()) {
            return Ok(node);
        }
        let file = if name.ends_with(".json") {
            name.to_string()
        } else {
            format!("{name}.json")
        };
        let Some(path) = ctx.search_path().resolve(&file) else {
            return build_error(format!("couldn't find effect {name}"), "effect");
        };
        let node = ConfigNode::load_json(&path)?;
        if let Ok(mut descriptions) = self.descriptions.write() {
            descriptions.insert(name.to_string(), node.clone());
        }
        Ok(node)
    }
}
