//! Ordered, named configuration trees.
//!
//! A [`ConfigNode`] is the in-memory form of an effect description, a material
//! definition or any other declarative document the engine consumes. Siblings
//! are identified by their `(name, index)` pair, which is also the identity used
//! when two trees are merged (see [`crate::effect::merge`]).

use std::{
    collections::BTreeMap,
    fmt,
    hash::{Hash, Hasher},
    path::Path,
};

use anyhow::{Context as _, bail};

/// A typed leaf value.
#[derive(Clone, Debug, Default)]
pub enum Value {
    #[default]
    None,
    Bool(bool),
    Int(i64),
    Float(f32),
    Double(f64),
    String(String),
    Vec2([f64; 2]),
    Vec3([f64; 3]),
    Vec4([f64; 4]),
}

impl Value {
    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::Int(i) => Some(*i != 0),
            Value::Float(f) => Some(*f != 0.0),
            Value::Double(d) => Some(*d != 0.0),
            Value::String(s) => match s.trim() {
                "true" | "1" => Some(true),
                "false" | "0" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f as f64),
            Value::Double(d) => Some(*d),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Bool(b) => Some(*b as i64),
            Value::Float(f) => Some(*f as i64),
            Value::Double(d) => Some(*d as i64),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Vector view of the value. Scalars broadcast into the first component,
    /// strings are parsed as whitespace separated numbers.
    pub fn as_vec4(&self) -> Option<[f64; 4]> {
        match self {
            Value::Vec2(v) => Some([v[0], v[1], 0.0, 0.0]),
            Value::Vec3(v) => Some([v[0], v[1], v[2], 0.0]),
            Value::Vec4(v) => Some(*v),
            Value::String(s) => {
                let parsed: Vec<f64> = s
                    .split(|c: char| c.is_whitespace() || c == ',')
                    .filter(|t| !t.is_empty())
                    .map(|t| t.parse::<f64>())
                    .collect::<Result<_, _>>()
                    .ok()?;
                if parsed.is_empty() || parsed.len() > 4 {
                    return None;
                }
                let mut out = [0.0; 4];
                out[..parsed.len()].copy_from_slice(&parsed);
                Some(out)
            }
            other => other.as_f64().map(|f| [f, 0.0, 0.0, 0.0]),
        }
    }

    /// Stable textual form, used wherever a value takes part in a cache key.
    pub fn serialize(&self) -> String {
        match self {
            Value::None => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => format!("{f:?}"),
            Value::Double(d) => format!("{d:?}"),
            Value::String(s) => s.clone(),
            Value::Vec2(v) => format!("{:?} {:?}", v[0], v[1]),
            Value::Vec3(v) => format!("{:?} {:?} {:?}", v[0], v[1], v[2]),
            Value::Vec4(v) => format!("{:?} {:?} {:?} {:?}", v[0], v[1], v[2], v[3]),
        }
    }

    fn discriminant(&self) -> u8 {
        match self {
            Value::None => 0,
            Value::Bool(_) => 1,
            Value::Int(_) => 2,
            Value::Float(_) => 3,
            Value::Double(_) => 4,
            Value::String(_) => 5,
            Value::Vec2(_) => 6,
            Value::Vec3(_) => 7,
            Value::Vec4(_) => 8,
        }
    }
}

// Floats compare by bit pattern so that trees can act as hash keys.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Double(a), Value::Double(b)) => a.to_bits() == b.to_bits(),
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Vec2(a), Value::Vec2(b)) => bits_eq(a, b),
            (Value::Vec3(a), Value::Vec3(b)) => bits_eq(a, b),
            (Value::Vec4(a), Value::Vec4(b)) => bits_eq(a, b),
            _ => false,
        }
    }
}

impl Eq for Value {}

fn bits_eq(a: &[f64], b: &[f64]) -> bool {
    a.iter().zip(b).all(|(x, y)| x.to_bits() == y.to_bits())
}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.discriminant().hash(state);
        match self {
            Value::None => {}
            Value::Bool(b) => b.hash(state),
            Value::Int(i) => i.hash(state),
            Value::Float(f) => f.to_bits().hash(state),
            Value::Double(d) => d.to_bits().hash(state),
            Value::String(s) => s.hash(state),
            Value::Vec2(v) => v.iter().for_each(|c| c.to_bits().hash(state)),
            Value::Vec3(v) => v.iter().for_each(|c| c.to_bits().hash(state)),
            Value::Vec4(v) => v.iter().for_each(|c| c.to_bits().hash(state)),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.serialize())
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}
impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}
impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}
impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v)
    }
}
impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}
impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}
impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}
impl From<[f64; 4]> for Value {
    fn from(v: [f64; 4]) -> Self {
        Value::Vec4(v)
    }
}
impl From<[f64; 3]> for Value {
    fn from(v: [f64; 3]) -> Self {
        Value::Vec3(v)
    }
}

/// A node of an ordered configuration tree.
///
/// Children keep document order. No two children share the same
/// `(name, index)` pair; [`push_child`](Self::push_child) assigns the next free
/// index for a name and [`insert_child`](Self::insert_child) replaces an
/// existing sibling with the same identity.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct ConfigNode {
    name: String,
    index: usize,
    value: Value,
    attributes: BTreeMap<String, String>,
    children: Vec<ConfigNode>,
}

impl ConfigNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn leaf(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            ..Default::default()
        }
    }

    /// Builder helper: appends `child` with the next free index for its name.
    pub fn with(mut self, child: ConfigNode) -> Self {
        self.push_child(child);
        self
    }

    /// Builder helper: sets an explicit sibling index.
    pub fn at(mut self, index: usize) -> Self {
        self.index = index;
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn identity(&self) -> (&str, usize) {
        (&self.name, self.index)
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn set_index(&mut self, index: usize) {
        self.index = index;
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn set_value(&mut self, value: impl Into<Value>) {
        self.value = value.into();
    }

    pub fn attributes(&self) -> &BTreeMap<String, String> {
        &self.attributes
    }

    pub fn attributes_mut(&mut self) -> &mut BTreeMap<String, String> {
        &mut self.attributes
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    pub fn children(&self) -> &[ConfigNode] {
        &self.children
    }

    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    pub fn child(&self, name: &str) -> Option<&ConfigNode> {
        self.child_at(name, 0)
    }

    pub fn child_at(&self, name: &str, index: usize) -> Option<&ConfigNode> {
        self.children
            .iter()
            .find(|c| c.name == name && c.index == index)
    }

    pub fn child_at_mut(&mut self, name: &str, index: usize) -> Option<&mut ConfigNode> {
        self.children
            .iter_mut()
            .find(|c| c.name == name && c.index == index)
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a ConfigNode> {
        self.children.iter().filter(move |c| c.name == name)
    }

    fn next_index(&self, name: &str) -> usize {
        self.children_named(name)
            .map(|c| c.index + 1)
            .max()
            .unwrap_or(0)
    }

    /// Appends `child` under the next free index for its name.
    pub fn push_child(&mut self, mut child: ConfigNode) -> &mut ConfigNode {
        child.index = self.next_index(&child.name);
        let pos = self.children.len();
        self.children.push(child);
        &mut self.children[pos]
    }

    /// Inserts `child` keeping its index; an existing sibling with the same
    /// identity is replaced in place.
    pub fn insert_child(&mut self, child: ConfigNode) -> &mut ConfigNode {
        match self
            .children
            .iter()
            .position(|c| c.name == child.name && c.index == child.index)
        {
            Some(pos) => {
                self.children[pos] = child;
                &mut self.children[pos]
            }
            None => {
                let pos = self.children.len();
                self.children.push(child);
                &mut self.children[pos]
            }
        }
    }

    pub fn remove_child(&mut self, name: &str, index: usize) -> Option<ConfigNode> {
        let pos = self
            .children
            .iter()
            .position(|c| c.name == name && c.index == index)?;
        Some(self.children.remove(pos))
    }

    pub fn get(&self, path: &str) -> Option<&ConfigNode> {
        let mut node = self;
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            let (name, index) = parse_segment(segment)?;
            node = node.child_at(name, index)?;
        }
        Some(node)
    }

    /// Resolves `path`, creating missing nodes along the way.
    pub fn get_or_create(&mut self, path: &str) -> Option<&mut ConfigNode> {
        let mut node = self;
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            let (name, index) = parse_segment(segment)?;
            if node.child_at(name, index).is_none() {
                node.insert_child(ConfigNode::new(name).at(index));
            }
            node = node.child_at_mut(name, index)?;
        }
        Some(node)
    }

    pub fn get_value(&self, path: &str) -> Option<&Value> {
        self.get(path).map(|n| &n.value)
    }

    pub fn get_bool(&self, path: &str) -> Option<bool> {
        self.get_value(path).and_then(Value::as_bool)
    }

    pub fn get_f64(&self, path: &str) -> Option<f64> {
        self.get_value(path).and_then(Value::as_f64)
    }

    pub fn get_i64(&self, path: &str) -> Option<i64> {
        self.get_value(path).and_then(Value::as_i64)
    }

    pub fn get_string(&self, path: &str) -> Option<String> {
        self.get_value(path).and_then(|v| match v {
            Value::None => None,
            other => Some(other.serialize()),
        })
    }

    /// Total node count including `self`.
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(ConfigNode::node_count).sum::<usize>()
    }

    /// Builds a tree from a JSON document.
    ///
    /// Objects become branches in key order, arrays become repeated siblings
    /// with ascending indices and scalars become leaves. The reserved members
    /// `@index`, `@value` and `@attr` set the node's index, own value and
    /// attributes.
    pub fn from_json(name: &str, json: &serde_json::Value) -> anyhow::Result<Self> {
        let mut node = ConfigNode::new(name);
        match json {
            serde_json::Value::Object(map) => {
                for (key, member) in map {
                    match key.as_str() {
                        "@index" => {
                            let Some(index) = member.as_u64() else {
                                bail!("@index of '{name}' must be a non-negative integer");
                            };
                            node.index = index as usize;
                        }
                        "@value" => node.value = json_scalar(member)?,
                        "@attr" => {
                            let Some(attrs) = member.as_object() else {
                                bail!("@attr of '{name}' must be an object");
                            };
                            for (k, v) in attrs {
                                let text = match v {
                                    serde_json::Value::String(s) => s.clone(),
                                    other => other.to_string(),
                                };
                                node.attributes.insert(k.clone(), text);
                            }
                        }
                        _ => match member {
                            serde_json::Value::Array(items) if is_numeric_vector(items) => {
                                node.push_child(ConfigNode {
                                    name: key.clone(),
                                    value: json_scalar(member)?,
                                    ..Default::default()
                                });
                            }
                            serde_json::Value::Array(items) => {
                                for item in items {
                                    let child = ConfigNode::from_json(key, item)?;
                                    if has_explicit_index(item) {
                                        node.insert_child(child);
                                    } else {
                                        node.push_child(child);
                                    }
                                }
                            }
                            other => {
                                let child = ConfigNode::from_json(key, other)?;
                                if has_explicit_index(other) {
                                    node.insert_child(child);
                                } else {
                                    node.push_child(child);
                                }
                            }
                        },
                    }
                }
            }
            scalar => node.value = json_scalar(scalar)?,
        }
        Ok(node)
    }

    pub fn from_json_str(name: &str, text: &str) -> anyhow::Result<Self> {
        let json: serde_json::Value = serde_json::from_str(text)?;
        Self::from_json(name, &json)
    }

    pub fn load_json(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading configuration {}", path.display()))?;
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("PropertyList");
        Self::from_json_str(name, &text).with_context(|| format!("parsing {}", path.display()))
    }
}

fn is_numeric_vector(items: &[serde_json::Value]) -> bool {
    (2..=4).contains(&items.len()) && items.iter().all(serde_json::Value::is_number)
}

fn has_explicit_index(json: &serde_json::Value) -> bool {
    json.as_object()
        .map(|o| o.contains_key("@index"))
        .unwrap_or(false)
}

fn json_scalar(json: &serde_json::Value) -> anyhow::Result<Value> {
    Ok(match json {
        serde_json::Value::Null => Value::None,
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Value::Int(i),
            None => Value::Double(n.as_f64().unwrap_or_default()),
        },
        serde_json::Value::String(s) => Value::String(s.clone()),
        serde_json::Value::Array(items) => {
            let nums: Option<Vec<f64>> = items.iter().map(|i| i.as_f64()).collect();
            match nums.as_deref() {
                Some([x, y]) => Value::Vec2([*x, *y]),
                Some([x, y, z]) => Value::Vec3([*x, *y, *z]),
                Some([x, y, z, w]) => Value::Vec4([*x, *y, *z, *w]),
                _ => bail!("only numeric arrays of 2 to 4 elements can be used as values"),
            }
        }
        serde_json::Value::Object(_) => bail!("objects cannot be used as leaf values"),
    })
}

/// Splits `name[3]` into `("name", 3)`.
fn parse_segment(segment: &str) -> Option<(&str, usize)> {
    match segment.find('[') {
        Some(open) => {
            let close = segment.rfind(']')?;
            let index = segment[open + 1..close].trim().parse().ok()?;
            Some((&segment[..open], index))
        }
        None => Some((segment, 0)),
    }
}
