use std::{
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use cgmath::Vector2;
use terrafx::{
    config::EngineConfig,
    context::Context,
    data_structures::config_node::ConfigNode,
    resources::{
        backend::{Capabilities, ContextId, GraphicsBackend},
        shader::{Program, Shader},
    },
    terrain::layer::{ElevationLayer, Locator},
};

pub(crate) fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Headless backend that counts what it was asked to do.
pub(crate) struct CountingBackend {
    compiled: AtomicUsize,
    linked: AtomicUsize,
    capabilities: Capabilities,
}

impl CountingBackend {
    pub fn new(capabilities: Capabilities) -> Self {
        Self {
            compiled: AtomicUsize::new(0),
            linked: AtomicUsize::new(0),
            capabilities,
        }
    }

    pub fn compiled(&self) -> usize {
        self.compiled.load(Ordering::SeqCst)
    }

    pub fn linked(&self) -> usize {
        self.linked.load(Ordering::SeqCst)
    }
}

impl Default for CountingBackend {
    fn default() -> Self {
        Self::new(Capabilities::new(4.5, 4.5))
    }
}

impl GraphicsBackend for CountingBackend {
    fn compile_shader(&self, _shader: &Shader) -> anyhow::Result<()> {
        self.compiled.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn link_program(&self, _program: &Program) -> anyhow::Result<()> {
        self.linked.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn capabilities(&self, _context: ContextId) -> Capabilities {
        self.capabilities.clone()
    }
}

/// Scratch directory under the system temp dir, removed on drop.
pub(crate) struct Fixture {
    dir: PathBuf,
}

impl Fixture {
    pub fn new(name: &str) -> Self {
        static NEXT: AtomicUsize = AtomicUsize::new(0);
        let dir = std::env::temp_dir().join(format!(
            "terrafx-{name}-{}-{}",
            std::process::id(),
            NEXT.fetch_add(1, Ordering::SeqCst)
        ));
        std::fs::create_dir_all(&dir).expect("Failed to create fixture directory.");
        Self { dir }
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    pub fn write(&self, file: &str, contents: &str) -> PathBuf {
        let path = self.dir.join(file);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create fixture subdirectory.");
        }
        std::fs::write(&path, contents).expect("Failed to write fixture file.");
        path
    }
}

impl Drop for Fixture {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.dir);
    }
}

/// A context searching `dir`, backed by a fresh counting backend.
pub(crate) fn context(dir: &Path) -> (Context, Arc<CountingBackend>) {
    let mut config = EngineConfig::default();
    config.effects.search_paths = vec![dir.to_path_buf()];
    let backend = Arc::new(CountingBackend::default());
    (Context::new(config, backend.clone()), backend)
}

pub(crate) fn node(json: &str) -> ConfigNode {
    ConfigNode::from_json_str("PropertyList", json).expect("Invalid test document.")
}

/// Square tile `size` metres wide with its south-west corner at
/// `(x * size, y * size)`.
pub(crate) fn tile_locator(x: i32, y: i32, size: f64) -> Locator {
    Locator::new(
        Vector2::new(x as f64 * size, y as f64 * size),
        Vector2::new(size, size),
    )
}

/// `n × n` heights from `f(column, row)`.
pub(crate) fn elevation(
    n: usize,
    locator: Locator,
    f: impl Fn(usize, usize) -> f32,
) -> ElevationLayer {
    let heights = (0..n)
        .flat_map(|r| (0..n).map(move |c| (c, r)))
        .map(|(c, r)| f(c, r))
        .collect();
    ElevationLayer::new(n, n, heights, locator).expect("Invalid test elevation.")
}
