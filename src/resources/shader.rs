//! Shader and program cache.
//!
//! Programs are cached in two tiers. The logical tier is keyed by shader names
//! exactly as an effect authored them, so repeat requests skip file
//! resolution. The resolved tier is keyed by absolute shader paths, so two
//! effects naming the same file through different relative paths still share
//! one linked program. Individual shaders are cached by `(path, stage)` and
//! parsed once no matter how many programs use them.

use std::{
    collections::HashMap,
    hash::Hash,
    path::{Path, PathBuf},
    sync::{
        Arc, Mutex, MutexGuard,
        atomic::{AtomicU64, Ordering},
    },
};

use anyhow::Context as _;

use crate::{
    error::{BuildError, build_error},
    resources::{
        SearchPath,
        backend::{GraphicsBackend, ShaderStage},
    },
};

/// A loaded, compiled shader source.
#[derive(Debug)]
pub struct Shader {
    pub path: PathBuf,
    pub stage: ShaderStage,
    pub source: String,
}

/// Stage-specific link parameters.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct ProgramParameters {
    pub geometry_vertices_out: Option<u32>,
    pub geometry_input_type: Option<String>,
    pub geometry_output_type: Option<String>,
    pub uniform_block_bindings: Vec<(String, u32)>,
}

/// A linked shader program.
#[derive(Debug)]
pub struct Program {
    id: u64,
    shaders: Vec<Arc<Shader>>,
    attributes: Vec<(String, u32)>,
    parameters: ProgramParameters,
}

impl Program {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn shaders(&self) -> &[Arc<Shader>] {
        &self.shaders
    }

    pub fn attributes(&self) -> &[(String, u32)] {
        &self.attributes
    }

    pub fn attribute_location(&self, name: &str) -> Option<u32> {
        self.attributes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, loc)| *loc)
    }

    pub fn parameters(&self) -> &ProgramParameters {
        &self.parameters
    }

    pub fn stages(&self) -> wgpu::ShaderStages {
        self.shaders
            .iter()
            .fold(wgpu::ShaderStages::NONE, |acc, s| acc | s.stage.to_wgpu())
    }
}

/// Program request as authored: shader names are not yet resolved.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct ProgramKey {
    pub search_paths: Vec<PathBuf>,
    pub shaders: Vec<(String, ShaderStage)>,
    pub attributes: Vec<(String, u32)>,
    pub parameters: ProgramParameters,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct ResolvedProgramKey {
    shaders: Vec<(PathBuf, ShaderStage)>,
    attributes: Vec<(String, u32)>,
    parameters: ProgramParameters,
}

/// Cache entry filled by whichever request gets to it first. A failed build
/// leaves it empty for the next request to retry.
type Slot<T> = Arc<Mutex<Option<Arc<T>>>>;

/// Hands out the slot for `key`. The map lock is only held for the lookup.
fn slot<K: Eq + Hash + Clone, T>(
    map: &Mutex<HashMap<K, Slot<T>>>,
    key: &K,
) -> anyhow::Result<Slot<T>> {
    let mut map = map
        .lock()
        .map_err(|_| BuildError::new("program cache lock poisoned", "program"))?;
    Ok(map.entry(key.clone()).or_default().clone())
}

fn lock<T>(slot: &Slot<T>) -> anyhow::Result<MutexGuard<'_, Option<Arc<T>>>> {
    slot.lock()
        .map_err(|_| BuildError::new("program cache slot poisoned", "program").into())
}

/// Number of filled slots. Entries still being built are not counted.
fn filled<K, T>(map: &Mutex<HashMap<K, Slot<T>>>) -> usize {
    let slots: Vec<_> = match map.lock() {
        Ok(map) => map.values().cloned().collect(),
        Err(_) => return 0,
    };
    slots
        .iter()
        .filter(|slot| slot.try_lock().is_ok_and(|entry| entry.is_some()))
        .count()
}

#[derive(Default)]
pub struct ProgramCache {
    logical: Mutex<HashMap<ProgramKey, Slot<Program>>>,
    resolved: Mutex<HashMap<ResolvedProgramKey, Slot<Program>>>,
    shaders: Mutex<HashMap<(PathBuf, ShaderStage), Slot<Shader>>>,
    next_id: AtomicU64,
}

impl ProgramCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the program for `key`, building it at most once.
    ///
    /// Each key has its own slot. Concurrent requests for the same key wait
    /// for the first one and share its result; other keys build in parallel.
    pub fn get_or_create(
        &self,
        key: &ProgramKey,
        backend: &dyn GraphicsBackend,
    ) -> anyhow::Result<Arc<Program>> {
        let logical = slot(&self.logical, key)?;
        let mut logical = lock(&logical)?;
        if let Some(program) = logical.as_ref() {
            return Ok(program.clone());
        }

        let search_path = SearchPath::new(key.search_paths.clone());
        let mut resolved_shaders = Vec::with_capacity(key.shaders.len());
        for (name, stage) in &key.shaders {
            match search_path.resolve(name) {
                Some(path) => resolved_shaders.push((path, *stage)),
                None => return build_error(format!("couldn't find shader {name}"), "program"),
            }
        }
        let resolved_key = ResolvedProgramKey {
            shaders: resolved_shaders,
            attributes: key.attributes.clone(),
            parameters: key.parameters.clone(),
        };
        let resolved = slot(&self.resolved, &resolved_key)?;
        let mut resolved = lock(&resolved)?;
        if let Some(program) = resolved.as_ref() {
            *logical = Some(program.clone());
            return Ok(program.clone());
        }

        let mut shaders = Vec::with_capacity(resolved_key.shaders.len());
        for (path, stage) in &resolved_key.shaders {
            shaders.push(self.get_or_load_shader(path, *stage, backend)?);
        }
        let program = Arc::new(Program {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            shaders,
            attributes: resolved_key.attributes,
            parameters: resolved_key.parameters,
        });
        backend
            .link_program(&program)
            .map_err(|e| BuildError::new(format!("link failed: {e:#}"), "program"))?;
        log::debug!(
            "Linked program {} from {} shader(s)",
            program.id,
            program.shaders.len()
        );
        *resolved = Some(program.clone());
        *logical = Some(program.clone());
        Ok(program)
    }

    fn get_or_load_shader(
        &self,
        path: &Path,
        stage: ShaderStage,
        backend: &dyn GraphicsBackend,
    ) -> anyhow::Result<Arc<Shader>> {
        let entry = slot(&self.shaders, &(path.to_path_buf(), stage))?;
        let mut entry = lock(&entry)?;
        if let Some(shader) = entry.as_ref() {
            return Ok(shader.clone());
        }
        let source = std::fs::read_to_string(path)
            .with_context(|| format!("reading shader {}", path.display()))
            .map_err(|e| BuildError::new(format!("{e:#}"), "program"))?;
        let shader = Arc::new(Shader {
            path: path.to_path_buf(),
            stage,
            source,
        });
        backend
            .compile_shader(&shader)
            .map_err(|e| BuildError::new(format!("{e:#}"), "program"))?;
        *entry = Some(shader.clone());
        Ok(shader)
    }

    pub fn program_count(&self) -> usize {
        filled(&self.resolved)
    }

    pub fn shader_count(&self) -> usize {
        filled(&self.shaders)
    }

    pub fn clear(&self) {
        if let Ok(mut logical) = self.logical.lock() {
            logical.clear();
        }
        if let Ok(mut resolved) = self.resolved.lock() {
            resolved.clear();
        }
        if let Ok(mut shaders) = self.shaders.lock() {
            shaders.clear();
        }
    }
}
