use std::path::{Path, PathBuf};

use anyhow::Context as _;

use crate::resources::{
    shader::ProgramCache,
    texture::TextureCache,
    uniform::{DeferredListeners, UniformCache},
};

/**
 * This module contains all logic for locating and loading external files and
 * the keyed caches that guarantee one GPU object per distinct configuration.
 */
pub mod backend;
pub mod shader;
pub mod texture;
pub mod uniform;

/// Ordered list of directories a relative resource name is looked up in.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct SearchPath {
    dirs: Vec<PathBuf>,
}

impl SearchPath {
    pub fn new(dirs: Vec<PathBuf>) -> Self {
        Self { dirs }
    }

    pub fn dirs(&self) -> &[PathBuf] {
        &self.dirs
    }

    pub fn push(&mut self, dir: impl Into<PathBuf>) {
        self.dirs.push(dir.into());
    }

    /// Resolves `name` to an absolute, canonical path. Absolute names are
    /// accepted as they are; relative names are tried against each directory
    /// in order.
    pub fn resolve(&self, name: &str) -> Option<PathBuf> {
        let candidate = Path::new(name);
        if candidate.is_absolute() {
            return candidate.is_file().then(|| canonical(candidate));
        }
        self.dirs
            .iter()
            .map(|dir| dir.join(candidate))
            .find(|path| path.is_file())
            .map(|path| canonical(&path))
    }
}

fn canonical(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

pub fn load_string(path: &Path) -> anyhow::Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
}

pub fn load_binary(path: &Path) -> anyhow::Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("reading {}", path.display()))
}

/// Every process-wide GPU resource cache, owned by one renderer instance.
///
/// Independent instances never share entries, which keeps tests and multiple
/// renderers from contaminating each other.
#[derive(Default)]
pub struct ResourceCache {
    pub programs: ProgramCache,
    pub uniforms: UniformCache,
    pub textures: TextureCache,
    pub deferred_listeners: DeferredListeners,
}

impl ResourceCache {
    pub fn new() -> Self {
        Self::default()
    }
}
