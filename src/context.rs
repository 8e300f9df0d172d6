use std::sync::{Arc, OnceLock};

use crate::{
    config::EngineConfig,
    data_structures::{config_node::ConfigNode, property_root::PropertyRoot},
    effect::{Effect, EffectCache, EffectLibrary, scheme::SchemeTable, technique::ProbeQueue},
    resources::{
        ResourceCache, SearchPath,
        backend::{Capabilities, ContextId, GraphicsBackend, NullBackend, WgpuBackend},
    },
};

/// Central renderer state: the resource caches, the graphics backend, the live
/// property tree and the effect caches built on top of them.
///
/// Every cache lives here rather than in process-wide statics, so two contexts
/// never share compiled programs, uniforms or effects.
pub struct Context {
    config: EngineConfig,
    search_path: SearchPath,
    resources: ResourceCache,
    backend: Arc<dyn GraphicsBackend>,
    properties: Option<Arc<PropertyRoot>>,
    probes: ProbeQueue,
    effects: EffectCache,
    library: EffectLibrary,
    schemes: OnceLock<SchemeTable>,
}

impl Context {
    pub fn new(config: EngineConfig, backend: Arc<dyn GraphicsBackend>) -> Self {
        let search_path = SearchPath::new(config.effects.search_paths.clone());
        Self {
            config,
            search_path,
            resources: ResourceCache::new(),
            backend,
            properties: None,
            probes: ProbeQueue::new(),
            effects: EffectCache::new(),
            library: EffectLibrary::new(),
            schemes: OnceLock::new(),
        }
    }

    /// A context without a GPU; every shader compiles and `capabilities`
    /// answers every probe.
    pub fn headless(config: EngineConfig, capabilities: Capabilities) -> Self {
        Self::new(config, Arc::new(NullBackend { capabilities }))
    }

    /// Creates a context on the default adapter, compiling shaders with
    /// `wgpu`. No surface is created; presenting is up to the host.
    pub async fn wgpu(config: EngineConfig) -> anyhow::Result<Self> {
        log::info!("WGPU setup");
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..wgpu::InstanceDescriptor::new_without_display_handle()
        });
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await?;
        log::info!("device and queue");
        let (device, _queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("terrafx device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                ..Default::default()
            })
            .await?;
        let capabilities = Capabilities::from_adapter_info(&adapter.get_info(), 4.5);
        log::info!("Using {}", capabilities.renderer);
        Ok(Self::new(config, Arc::new(WgpuBackend::new(device, capabilities))))
    }

    pub fn with_properties(mut self, properties: Arc<PropertyRoot>) -> Self {
        self.properties = Some(properties);
        self
    }

    pub fn with_scheme_table(self, table: SchemeTable) -> Self {
        if self.schemes.set(table).is_err() {
            log::warn!("Scheme table already loaded, keeping the first one");
        }
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn search_path(&self) -> &SearchPath {
        &self.search_path
    }

    pub fn resources(&self) -> &ResourceCache {
        &self.resources
    }

    pub fn backend(&self) -> &dyn GraphicsBackend {
        self.backend.as_ref()
    }

    pub fn properties(&self) -> Option<&Arc<PropertyRoot>> {
        self.properties.as_ref()
    }

    pub fn probes(&self) -> &ProbeQueue {
        &self.probes
    }

    pub fn effects(&self) -> &EffectCache {
        &self.effects
    }

    pub fn library(&self) -> &EffectLibrary {
        &self.library
    }

    pub fn max_contexts(&self) -> usize {
        self.config.effects.max_contexts
    }

    /// The scheme table, read from the configured file on first use.
    pub fn schemes(&self) -> &SchemeTable {
        self.schemes.get_or_init(|| {
            SchemeTable::load_or_default(self.config.effects.scheme_table.as_deref())
        })
    }

    /// Resolves a named effect, realizing its techniques if asked to.
    pub fn make_effect(&self, name: &str, realize: bool) -> anyhow::Result<Arc<Effect>> {
        let effect = self.library.make_effect(name, self)?;
        if realize {
            effect.realize_techniques(self);
        }
        Ok(effect)
    }

    /// Returns the shared effect for an anonymous description, building it
    /// when no live effect with the same description exists.
    pub fn make_effect_from_node(
        &self,
        node: &ConfigNode,
        realize: bool,
    ) -> anyhow::Result<Arc<Effect>> {
        let effect = self.effects.get_or_create(node, &self.search_path, || {
            self.library.effect_from_node(node, self)
        })?;
        if realize {
            effect.realize_techniques(self);
        }
        Ok(effect)
    }

    /// Attaches queued live-property listeners. Call from the thread that owns
    /// the property tree, once per update phase.
    pub fn flush_listeners(&self) -> usize {
        match &self.properties {
            Some(root) => self.resources.deferred_listeners.flush(root),
            None => 0,
        }
    }

    /// Runs the validity probes queued for `context`. Call from that
    /// context's render thread.
    pub fn run_probes(&self, context: ContextId) -> usize {
        if self.probes.pending(context) == 0 {
            return 0;
        }
        let capabilities = self.backend.capabilities(context);
        self.probes.run_pending(context, &capabilities)
    }
}
