//! Uniform cache and deferred listener registration.

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex, RwLock,
        atomic::{AtomicU64, Ordering},
    },
};

use crate::{
    data_structures::{config_node::Value, property_root::PropertyRoot},
    error::BuildError,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UniformType {
    Bool,
    Int,
    Float,
    FloatVec2,
    FloatVec3,
    FloatVec4,
    FloatMat4,
    Sampler1D,
    Sampler2D,
    Sampler3D,
    SamplerCube,
    Sampler2DShadow,
}

impl UniformType {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "bool" => UniformType::Bool,
            "int" => UniformType::Int,
            "float" => UniformType::Float,
            "float-vec2" => UniformType::FloatVec2,
            "float-vec3" => UniformType::FloatVec3,
            "float-vec4" => UniformType::FloatVec4,
            "float-mat4" => UniformType::FloatMat4,
            "sampler-1d" => UniformType::Sampler1D,
            "sampler-2d" => UniformType::Sampler2D,
            "sampler-3d" => UniformType::Sampler3D,
            "sampler-cube" => UniformType::SamplerCube,
            "sampler-2d-shadow" => UniformType::Sampler2DShadow,
            _ => return None,
        })
    }

    pub fn is_sampler(self) -> bool {
        matches!(
            self,
            UniformType::Sampler1D
                | UniformType::Sampler2D
                | UniformType::Sampler3D
                | UniformType::SamplerCube
                | UniformType::Sampler2DShadow
        )
    }

    /// Converts `value` into this type's canonical representation.
    pub fn coerce(self, value: &Value) -> Option<Value> {
        Some(match self {
            UniformType::Bool => Value::Bool(value.as_bool()?),
            UniformType::Int => Value::Int(value.as_i64()?),
            t if t.is_sampler() => Value::Int(value.as_i64()?),
            UniformType::Float => Value::Float(value.as_f64()? as f32),
            UniformType::FloatVec2 => {
                let v = value.as_vec4()?;
                Value::Vec2([v[0], v[1]])
            }
            UniformType::FloatVec3 => {
                let v = value.as_vec4()?;
                Value::Vec3([v[0], v[1], v[2]])
            }
            UniformType::FloatVec4 => Value::Vec4(value.as_vec4()?),
            UniformType::FloatMat4 => match value {
                Value::String(s) => Value::String(s.clone()),
                _ => return None,
            },
            _ => return None,
        })
    }
}

/// Where a uniform's value comes from.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum UniformSource {
    /// Fixed at build time.
    Static(Value),
    /// Follows a live property.
    Live(String),
}

impl UniformSource {
    fn serialize(&self) -> String {
        match self {
            UniformSource::Static(v) => v.serialize(),
            UniformSource::Live(path) => format!("live:{path}"),
        }
    }
}

/// A named shader uniform with a current value.
#[derive(Debug)]
pub struct Uniform {
    name: String,
    ty: UniformType,
    source: UniformSource,
    value: RwLock<Value>,
    version: AtomicU64,
}

impl Uniform {
    pub fn new(name: impl Into<String>, ty: UniformType, source: UniformSource) -> Self {
        let value = match &source {
            UniformSource::Static(v) => ty.coerce(v).unwrap_or_default(),
            UniformSource::Live(_) => Value::None,
        };
        Self {
            name: name.into(),
            ty,
            source,
            value: RwLock::new(value),
            version: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ty(&self) -> UniformType {
        self.ty
    }

    pub fn source(&self) -> &UniformSource {
        &self.source
    }

    pub fn is_live(&self) -> bool {
        matches!(self.source, UniformSource::Live(_))
    }

    pub fn value(&self) -> Value {
        self.value.read().map(|v| v.clone()).unwrap_or_default()
    }

    /// Bumped on every change; lets the renderer skip unchanged uploads.
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    pub fn set(&self, value: &Value) {
        let Some(coerced) = self.ty.coerce(value) else {
            log::warn!(
                "Ignoring value '{}' for uniform {} of type {:?}",
                value,
                self.name,
                self.ty
            );
            return;
        };
        if let Ok(mut current) = self.value.write() {
            *current = coerced;
            self.version.fetch_add(1, Ordering::AcqRel);
        }
    }

    /// Flattened `f32` components, ready for a uniform buffer.
    pub fn as_f32s(&self) -> Vec<f32> {
        match self.value() {
            Value::Bool(b) => vec![if b { 1.0 } else { 0.0 }],
            Value::Int(i) => vec![i as f32],
            Value::Float(f) => vec![f],
            Value::Double(d) => vec![d as f32],
            Value::Vec2(v) => v.iter().map(|c| *c as f32).collect(),
            Value::Vec3(v) => v.iter().map(|c| *c as f32).collect(),
            Value::Vec4(v) => v.iter().map(|c| *c as f32).collect(),
            Value::String(s) => s
                .split_whitespace()
                .filter_map(|t| t.parse::<f32>().ok())
                .collect(),
            Value::None => Vec::new(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct UniformKey {
    pub name: String,
    pub ty: UniformType,
    pub value: String,
    pub effect: String,
}

/// All uniforms built so far, behind one coarse lock.
#[derive(Default)]
pub struct UniformCache {
    uniforms: Mutex<HashMap<UniformKey, Arc<Uniform>>>,
}

impl UniformCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached uniform for `(name, type, value, effect)`, creating it
    /// on first request. Live uniforms queue their listener registration on
    /// `deferred` instead of touching the property tree here.
    pub fn get_or_create(
        &self,
        name: &str,
        ty: UniformType,
        source: UniformSource,
        effect: &str,
        deferred: &DeferredListeners,
    ) -> anyhow::Result<Arc<Uniform>> {
        let key = UniformKey {
            name: name.to_string(),
            ty,
            value: source.serialize(),
            effect: effect.to_string(),
        };
        let mut uniforms = self
            .uniforms
            .lock()
            .map_err(|_| BuildError::new("uniform cache lock poisoned", "uniform"))?;
        if let Some(uniform) = uniforms.get(&key) {
            return Ok(uniform.clone());
        }
        let uniform = Arc::new(Uniform::new(name, ty, source.clone()));
        if let UniformSource::Live(path) = source {
            let target = Arc::downgrade(&uniform);
            deferred.push(move |root: &PropertyRoot| {
                if let Some(current) = root.get(&path) {
                    if let Some(u) = target.upgrade() {
                        u.set(&current);
                    }
                }
                let listener_target = target.clone();
                root.add_listener(&path, move |_, value| {
                    if let Some(u) = listener_target.upgrade() {
                        u.set(value);
                    }
                });
            });
        }
        uniforms.insert(key, uniform.clone());
        Ok(uniform)
    }

    pub fn len(&self) -> usize {
        self.uniforms.lock().map(|u| u.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

type Registration = Box<dyn FnOnce(&PropertyRoot) + Send>;

/// Listener registrations waiting for the owning thread.
///
/// Effects may be built on loader threads, but attaching listeners to the live
/// property tree must happen on the thread that owns it. Builders queue a
/// registration here and the host calls [`flush`](Self::flush) once per frame.
#[derive(Default)]
pub struct DeferredListeners {
    queue: Mutex<Vec<Registration>>,
}

impl DeferredListeners {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, registration: impl FnOnce(&PropertyRoot) + Send + 'static) {
        if let Ok(mut queue) = self.queue.lock() {
            queue.push(Box::new(registration));
        }
    }

    pub fn pending(&self) -> usize {
        self.queue.lock().map(|q| q.len()).unwrap_or(0)
    }

    /// Runs every queued registration against `root`; returns how many ran.
    pub fn flush(&self, root: &PropertyRoot) -> usize {
        let drained: Vec<Registration> = match self.queue.lock() {
            Ok(mut queue) => queue.drain(..).collect(),
            Err(_) => return 0,
        };
        let count = drained.len();
        for registration in drained {
            registration(root);
        }
        count
    }
}
