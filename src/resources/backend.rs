//! The seam between resource caches and the graphics API.
//!
//! Caches never talk to the GPU directly. Shader compilation, program linking
//! and capability queries go through a [`GraphicsBackend`]; the engine ships a
//! `wgpu` implementation and a [`NullBackend`] for headless use.

use std::{
    collections::{HashMap, HashSet},
    path::PathBuf,
    sync::Mutex,
};

use anyhow::bail;

use crate::resources::shader::{Program, Shader};

/// Index of a graphics context (one per render thread / window).
pub type ContextId = usize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ShaderStage {
    Vertex,
    TessControl,
    TessEvaluation,
    Geometry,
    Fragment,
    Compute,
}

impl ShaderStage {
    /// Maps a `program` child element name to its stage.
    pub fn from_element(name: &str) -> Option<Self> {
        Some(match name {
            "vertex-shader" => ShaderStage::Vertex,
            "tessellation-control-shader" => ShaderStage::TessControl,
            "tessellation-evaluation-shader" => ShaderStage::TessEvaluation,
            "geometry-shader" => ShaderStage::Geometry,
            "fragment-shader" => ShaderStage::Fragment,
            "compute-shader" => ShaderStage::Compute,
            _ => return None,
        })
    }

    pub fn to_wgpu(self) -> wgpu::ShaderStages {
        match self {
            ShaderStage::Vertex => wgpu::ShaderStages::VERTEX,
            ShaderStage::Fragment => wgpu::ShaderStages::FRAGMENT,
            ShaderStage::Compute => wgpu::ShaderStages::COMPUTE,
            // Stages without a wgpu counterpart are folded into the vertex stage.
            ShaderStage::TessControl | ShaderStage::TessEvaluation | ShaderStage::Geometry => {
                wgpu::ShaderStages::VERTEX
            }
        }
    }
}

/// What a graphics context can do. Technique predicates are evaluated
/// against this.
#[derive(Clone, Debug, Default)]
pub struct Capabilities {
    pub api_version: f64,
    pub shading_language_version: f64,
    pub extensions: HashSet<String>,
    pub renderer: String,
}

impl Capabilities {
    pub fn new(api_version: f64, shading_language_version: f64) -> Self {
        Self {
            api_version,
            shading_language_version,
            ..Default::default()
        }
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extensions.insert(extension.into());
        self
    }

    pub fn supports(&self, extension: &str) -> bool {
        self.extensions.contains(extension)
    }

    pub fn from_adapter_info(info: &wgpu::AdapterInfo, api_version: f64) -> Self {
        Self {
            api_version,
            shading_language_version: api_version,
            extensions: HashSet::new(),
            renderer: format!("{} ({:?})", info.name, info.backend),
        }
    }
}

pub trait GraphicsBackend: Send + Sync {
    fn compile_shader(&self, shader: &Shader) -> anyhow::Result<()>;
    fn link_program(&self, program: &Program) -> anyhow::Result<()>;
    fn capabilities(&self, context: ContextId) -> Capabilities;
}

/// Accepts every shader and reports fixed capabilities.
#[derive(Debug, Default)]
pub struct NullBackend {
    pub capabilities: Capabilities,
}

impl GraphicsBackend for NullBackend {
    fn compile_shader(&self, _shader: &Shader) -> anyhow::Result<()> {
        Ok(())
    }

    fn link_program(&self, _program: &Program) -> anyhow::Result<()> {
        Ok(())
    }

    fn capabilities(&self, _context: ContextId) -> Capabilities {
        self.capabilities.clone()
    }
}

/// Compiles WGSL sources into `wgpu` shader modules.
pub struct WgpuBackend {
    device: wgpu::Device,
    capabilities: Capabilities,
    modules: Mutex<HashMap<(PathBuf, ShaderStage), wgpu::ShaderModule>>,
}

impl WgpuBackend {
    pub fn new(device: wgpu::Device, capabilities: Capabilities) -> Self {
        Self {
            device,
            capabilities,
            modules: Mutex::new(HashMap::new()),
        }
    }

    pub fn module(&self, shader: &Shader) -> Option<wgpu::ShaderModule> {
        self.modules
            .lock()
            .ok()?
            .get(&(shader.path.clone(), shader.stage))
            .cloned()
    }
}

impl GraphicsBackend for WgpuBackend {
    fn compile_shader(&self, shader: &Shader) -> anyhow::Result<()> {
        let label = shader.path.to_string_lossy();
        let module = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(&label),
                source: wgpu::ShaderSource::Wgsl(shader.source.as_str().into()),
            });
        let info = futures::executor::block_on(module.get_compilation_info());
        let errors: Vec<String> = info
            .messages
            .iter()
            .filter(|m| matches!(m.message_type, wgpu::CompilationMessageType::Error))
            .map(|m| m.message.clone())
            .collect();
        if !errors.is_empty() {
            bail!("{} failed to compile: {}", label, errors.join("; "));
        }
        if let Ok(mut modules) = self.modules.lock() {
            modules.insert((shader.path.clone(), shader.stage), module);
        }
        Ok(())
    }

    fn link_program(&self, program: &Program) -> anyhow::Result<()> {
        let stages: HashSet<ShaderStage> = program.shaders().iter().map(|s| s.stage).collect();
        if !stages.contains(&ShaderStage::Vertex) && !stages.contains(&ShaderStage::Compute) {
            bail!("program {} has neither a vertex nor a compute stage", program.id());
        }
        for shader in program.shaders() {
            if self.module(shader).is_none() {
                bail!("{} was never compiled", shader.path.display());
            }
        }
        Ok(())
    }

    fn capabilities(&self, _context: ContextId) -> Capabilities {
        self.capabilities.clone()
    }
}
