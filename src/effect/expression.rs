//! Boolean predicate expressions for technique selection.
//!
//! A technique's `predicate` is a small expression tree written in the same
//! configuration format as the rest of the effect:
//!
//! ```text
//! predicate
//!   and
//!     less-equal
//!       value: 2.0
//!       api-version
//!     extension-supported: GL_ARB_shader_objects
//! ```

use crate::{
    data_structures::{
        config_node::{ConfigNode, Value},
        property_root::PropertyRoot,
    },
    error::build_error,
    resources::backend::Capabilities,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompareOp {
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Literal(Value),
    Property(String),
    ApiVersion,
    ShadingLanguageVersion,
    ExtensionSupported(String),
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Not(Box<Expr>),
    Compare(CompareOp, Box<Expr>, Box<Expr>),
}

/// Bindings an expression is evaluated against.
pub struct EvalContext<'a> {
    pub capabilities: &'a Capabilities,
    pub properties: Option<&'a PropertyRoot>,
}

#[derive(Clone, Debug, PartialEq)]
enum Evaluated {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl Evaluated {
    fn from_value(value: &Value) -> Self {
        match value {
            Value::Bool(b) => Evaluated::Bool(*b),
            Value::String(s) => match s.trim().parse::<f64>() {
                Ok(n) => Evaluated::Number(n),
                Err(_) => Evaluated::Text(s.clone()),
            },
            Value::None => Evaluated::Bool(false),
            other => other
                .as_f64()
                .map(Evaluated::Number)
                .unwrap_or_else(|| Evaluated::Text(other.serialize())),
        }
    }

    fn truthy(&self) -> bool {
        match self {
            Evaluated::Bool(b) => *b,
            Evaluated::Number(n) => *n != 0.0,
            Evaluated::Text(s) => matches!(s.as_str(), "true" | "1"),
        }
    }

    fn text(&self) -> String {
        match self {
            Evaluated::Bool(b) => b.to_string(),
            Evaluated::Number(n) => n.to_string(),
            Evaluated::Text(s) => s.clone(),
        }
    }

    fn number(&self) -> Option<f64> {
        match self {
            Evaluated::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Evaluated::Number(n) => Some(*n),
            Evaluated::Text(_) => None,
        }
    }
}

impl Expr {
    /// Parses the body of a `predicate` node. Several top-level terms are
    /// combined with `and`.
    pub fn parse_predicate(predicate: &ConfigNode) -> anyhow::Result<Expr> {
        let terms = predicate
            .children()
            .iter()
            .map(Expr::parse)
            .collect::<anyhow::Result<Vec<_>>>()?;
        let mut terms = terms.into_iter();
        match (terms.next(), terms.len()) {
            (None, _) => build_error("empty predicate", "predicate"),
            (Some(term), 0) => Ok(term),
            (Some(first), _) => Ok(Expr::And(std::iter::once(first).chain(terms).collect())),
        }
    }

    pub fn parse(node: &ConfigNode) -> anyhow::Result<Expr> {
        let operands = || {
            node.children()
                .iter()
                .map(Expr::parse)
                .collect::<anyhow::Result<Vec<_>>>()
        };
        let compare = |op: CompareOp| -> anyhow::Result<Expr> {
            let ops = operands()?;
            let count = ops.len();
            let Ok([lhs, rhs]) = <[Expr; 2]>::try_from(ops) else {
                return build_error(
                    format!("'{}' needs exactly two operands, got {count}", node.name()),
                    "predicate",
                );
            };
            Ok(Expr::Compare(op, Box::new(lhs), Box::new(rhs)))
        };
        match node.name() {
            "and" => Ok(Expr::And(operands()?)),
            "or" => Ok(Expr::Or(operands()?)),
            "not" => {
                let mut ops = operands()?;
                if ops.len() != 1 {
                    return build_error("'not' needs exactly one operand", "predicate");
                }
                Ok(Expr::Not(Box::new(ops.remove(0))))
            }
            "equal" => compare(CompareOp::Equal),
            "not-equal" => compare(CompareOp::NotEqual),
            "less" => compare(CompareOp::Less),
            "less-equal" => compare(CompareOp::LessEqual),
            "greater" => compare(CompareOp::Greater),
            "greater-equal" => compare(CompareOp::GreaterEqual),
            "value" => Ok(Expr::Literal(node.value().clone())),
            "property" => match node.value().as_str() {
                Some(path) => Ok(Expr::Property(path.to_string())),
                None => build_error("'property' needs a path", "predicate"),
            },
            "api-version" | "glversion" => Ok(Expr::ApiVersion),
            "shader-language" => Ok(Expr::ShadingLanguageVersion),
            "extension-supported" => match node.value().as_str() {
                Some(ext) => Ok(Expr::ExtensionSupported(ext.to_string())),
                None => build_error("'extension-supported' needs a name", "predicate"),
            },
            other => build_error(format!("unknown expression '{other}'"), "predicate"),
        }
    }

    pub fn eval_bool(&self, ctx: &EvalContext) -> bool {
        self.eval(ctx).truthy()
    }

    fn eval(&self, ctx: &EvalContext) -> Evaluated {
        match self {
            Expr::Literal(v) => Evaluated::from_value(v),
            Expr::Property(path) => ctx
                .properties
                .and_then(|p| p.get(path))
                .map(|v| Evaluated::from_value(&v))
                .unwrap_or(Evaluated::Bool(false)),
            Expr::ApiVersion => Evaluated::Number(ctx.capabilities.api_version),
            Expr::ShadingLanguageVersion => {
                Evaluated::Number(ctx.capabilities.shading_language_version)
            }
            Expr::ExtensionSupported(ext) => Evaluated::Bool(ctx.capabilities.supports(ext)),
            Expr::And(terms) => Evaluated::Bool(terms.iter().all(|t| t.eval_bool(ctx))),
            Expr::Or(terms) => Evaluated::Bool(terms.iter().any(|t| t.eval_bool(ctx))),
            Expr::Not(term) => Evaluated::Bool(!term.eval_bool(ctx)),
            Expr::Compare(op, lhs, rhs) => {
                let (l, r) = (lhs.eval(ctx), rhs.eval(ctx));
                let ordering = match (l.number(), r.number()) {
                    (Some(a), Some(b)) => a.partial_cmp(&b),
                    _ => Some(l.text().cmp(&r.text())),
                };
                let Some(ordering) = ordering else {
                    return Evaluated::Bool(false);
                };
                Evaluated::Bool(match op {
                    CompareOp::Equal => ordering.is_eq(),
                    CompareOp::NotEqual => ordering.is_ne(),
                    CompareOp::Less => ordering.is_lt(),
                    CompareOp::LessEqual => ordering.is_le(),
                    CompareOp::Greater => ordering.is_gt(),
                    CompareOp::GreaterEqual => ordering.is_ge(),
                })
            }
        }
    }

    /// Live property paths the expression reads.
    pub fn property_refs(&self) -> Vec<String> {
        let mut refs = Vec::new();
        self.collect_refs(&mut refs);
        refs
    }

    fn collect_refs(&self, refs: &mut Vec<String>) {
        match self {
            Expr::Property(path) => {
                if !refs.contains(path) {
                    refs.push(path.clone());
                }
            }
            Expr::And(terms) | Expr::Or(terms) => terms.iter().for_each(|t| t.collect_refs(refs)),
            Expr::Not(term) => term.collect_refs(refs),
            Expr::Compare(_, l, r) => {
                l.collect_refs(refs);
                r.collect_refs(refs);
            }
            _ => {}
        }
    }
}
