//! Turns a resolved effect tree into techniques and passes.
//!
//! Compilation never fails as a whole. A pass whose attribute raises a build
//! error is dropped and its technique can no longer be selected; an unknown
//! attribute is skipped; a predicate that doesn't parse makes its technique
//! never valid. Every such event is logged and recorded as a
//! [`BuildDiagnostic`] on the effect.

use std::sync::Arc;

use crate::{
    context::Context,
    data_structures::{
        config_node::ConfigNode,
        property_root::{ListenerId, PropertyRoot},
    },
    effect::{
        builders::{Applied, BuildContext, apply_attribute},
        expression::Expr,
        pass::Pass,
        property::PropertyResolver,
        technique::{Predicate, Technique},
    },
    error::BuildDiagnostic,
};

/// Property listeners registered for an effect; removed when the last clone
/// of the effect goes away.
pub struct ListenerGuard {
    root: Arc<PropertyRoot>,
    ids: Vec<ListenerId>,
}

impl std::fmt::Debug for ListenerGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerGuard").field("ids", &self.ids).finish()
    }
}

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        for id in &self.ids {
            self.root.remove_listener(*id);
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct Compiled {
    pub techniques: Vec<Technique>,
    pub diagnostics: Vec<BuildDiagnostic>,
    pub listeners: Option<Arc<ListenerGuard>>,
}

struct Compiler<'a> {
    effect: &'a str,
    ctx: &'a Context,
    diagnostics: Vec<BuildDiagnostic>,
    listener_ids: Vec<ListenerId>,
}

pub fn compile(effect: &str, root: &ConfigNode, ctx: &Context) -> Compiled {
    let mut compiler = Compiler {
        effect,
        ctx,
        diagnostics: Vec::new(),
        listener_ids: Vec::new(),
    };
    let techniques = root
        .children_named("technique")
        .enumerate()
        .map(|(position, node)| compiler.technique(position, node, root.child("parameters")))
        .collect();
    let listeners = match (ctx.properties(), compiler.listener_ids.is_empty()) {
        (Some(props), false) => Some(Arc::new(ListenerGuard {
            root: props.clone(),
            ids: compiler.listener_ids,
        })),
        _ => None,
    };
    Compiled {
        techniques,
        diagnostics: compiler.diagnostics,
        listeners,
    }
}

impl Compiler<'_> {
    fn record(
        &mut self,
        technique: usize,
        pass: Option<usize>,
        attribute: Option<&str>,
        message: String,
    ) {
        let diagnostic = BuildDiagnostic {
            effect: self.effect.to_string(),
            technique: Some(technique),
            pass,
            attribute: attribute.map(str::to_string),
            message,
        };
        log::warn!("{diagnostic}");
        self.diagnostics.push(diagnostic);
    }

    fn predicate(&mut self, position: usize, node: &ConfigNode) -> Predicate {
        let Some(predicate) = node.child("predicate") else {
            return Predicate::Always;
        };
        match Expr::parse_predicate(predicate) {
            Ok(expr) => Predicate::Expression(Arc::new(expr)),
            Err(e) => {
                self.record(
                    position,
                    None,
                    Some("predicate"),
                    format!("{e:#}; technique will never be used"),
                );
                Predicate::Never
            }
        }
    }

    fn technique(
        &mut self,
        position: usize,
        node: &ConfigNode,
        parameters: Option<&ConfigNode>,
    ) -> Technique {
        let name = node
            .get_string("name")
            .unwrap_or_else(|| position.to_string());
        let ctx = self.ctx;
        let predicate = self.predicate(position, node);
        let props = ctx.properties().cloned();
        let mut broken = false;

        let mut technique = Technique::new(name, predicate.clone(), ctx.max_contexts())
            .with_properties(props.clone());
        technique.scheme = node.get_string("scheme").unwrap_or_default();

        let resolver = PropertyResolver::new(parameters, props.as_deref());
        let build = BuildContext {
            effect: self.effect,
            resolver,
            resources: ctx.resources(),
            backend: ctx.backend(),
            search_path: ctx.search_path(),
        };
        for (pass_position, pass_node) in node.children_named("pass").enumerate() {
            match self.pass(position, pass_position, pass_node, &build) {
                Some(pass) => technique.passes.push(pass),
                None => broken = true,
            }
        }
        if broken {
            technique.set_predicate(Predicate::Never);
        }

        if let (Predicate::Expression(expr), Some(root)) = (&predicate, &props) {
            for path in expr.property_refs() {
                let validity = Arc::downgrade(technique.validity_state());
                let id = root.add_listener(&path, move |_, _| {
                    if let Some(v) = validity.upgrade() {
                        v.invalidate_all();
                    }
                });
                self.listener_ids.push(id);
            }
        }
        technique
    }

    fn pass(
        &mut self,
        technique: usize,
        position: usize,
        node: &ConfigNode,
        build: &BuildContext,
    ) -> Option<Pass> {
        let mut pass = Pass::new(position.to_string());
        for attribute in node.children() {
            match apply_attribute(&mut pass, attribute, build) {
                Ok(Applied::Unknown) => log::warn!(
                    "Effect {}: technique {technique} pass {position}: unknown attribute '{}', skipping",
                    self.effect,
                    attribute.name()
                ),
                Ok(Applied::Built(_) | Applied::Inactive(_)) => {}
                Err(e) => {
                    self.record(
                        technique,
                        Some(position),
                        Some(attribute.name()),
                        format!("{e:#}"),
                    );
                    return None;
                }
            }
        }
        Some(pass)
    }
}
