use std::sync::{
    Arc, Mutex,
    mpsc::{self, Receiver, Sender},
};

use terrafx::{
    data_structures::{config_node::Value, property_root::PropertyRoot},
    resources::{
        SearchPath,
        backend::{Capabilities, ContextId, GraphicsBackend, ShaderStage},
        shader::{Program, ProgramCache, ProgramKey, Shader},
        texture::{Placeholder, TextureCache},
        uniform::{DeferredListeners, UniformCache, UniformSource, UniformType},
    },
};

use crate::common::test_utils::{CountingBackend, Fixture, init_logger};

mod common;

fn terrain_program(fixture: &Fixture, vertex: &str) -> ProgramKey {
    ProgramKey {
        search_paths: vec![fixture.path().to_path_buf()],
        shaders: vec![
            (vertex.to_string(), ShaderStage::Vertex),
            ("terrain.frag".to_string(), ShaderStage::Fragment),
        ],
        ..Default::default()
    }
}

#[test]
fn concurrent_program_requests_compile_once() {
    init_logger();
    let fixture = Fixture::new("programs");
    fixture.write("terrain.vert", "// vertex");
    fixture.write("terrain.frag", "// fragment");
    let cache = ProgramCache::new();
    let backend = CountingBackend::default();
    let key = terrain_program(&fixture, "terrain.vert");

    let programs: Vec<_> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..16)
            .map(|_| s.spawn(|| cache.get_or_create(&key, &backend)))
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().expect("Request thread panicked."))
            .collect()
    });

    let first = programs[0].as_ref().expect("Program failed to build.").clone();
    for program in &programs {
        let program = program.as_ref().expect("Program failed to build.");
        assert!(Arc::ptr_eq(program, &first));
    }
    assert_eq!(backend.compiled(), 2);
    assert_eq!(backend.linked(), 1);
    assert_eq!(cache.shader_count(), 2);
    assert_eq!(cache.program_count(), 1);
}

#[test]
fn differently_spelled_paths_share_a_program() {
    init_logger();
    let fixture = Fixture::new("aliases");
    fixture.write("terrain.vert", "// vertex");
    fixture.write("terrain.frag", "// fragment");
    let cache = ProgramCache::new();
    let backend = CountingBackend::default();

    let plain = cache
        .get_or_create(&terrain_program(&fixture, "terrain.vert"), &backend)
        .expect("Program failed to build.");
    let dotted = cache
        .get_or_create(&terrain_program(&fixture, "./terrain.vert"), &backend)
        .expect("Program failed to build.");

    assert!(Arc::ptr_eq(&plain, &dotted));
    assert_eq!(cache.program_count(), 1);
    assert_eq!(backend.compiled(), 2);
}

#[test]
fn attribute_bindings_are_part_of_the_program_key() {
    init_logger();
    let fixture = Fixture::new("attributes");
    fixture.write("terrain.vert", "// vertex");
    fixture.write("terrain.frag", "// fragment");
    let cache = ProgramCache::new();
    let backend = CountingBackend::default();
    let plain = terrain_program(&fixture, "terrain.vert");
    let mut bound = plain.clone();
    bound.attributes.push(("normal".to_string(), 15));

    let a = cache.get_or_create(&plain, &backend).expect("Program failed to build.");
    let b = cache.get_or_create(&bound, &backend).expect("Program failed to build.");

    assert!(!Arc::ptr_eq(&a, &b));
    assert_eq!(b.attribute_location("normal"), Some(15));
    // Shaders are still shared between the two programs.
    assert_eq!(backend.compiled(), 2);
    assert_eq!(backend.linked(), 2);
}

/// Holds compilation of `slow.vert` until the test lets it go.
struct GatedBackend {
    inner: CountingBackend,
    started: Mutex<Sender<()>>,
    release: Mutex<Receiver<()>>,
}

impl GraphicsBackend for GatedBackend {
    fn compile_shader(&self, shader: &Shader) -> anyhow::Result<()> {
        if shader.path.ends_with("slow.vert") {
            self.started.lock().expect("Lock poisoned.").send(())?;
            self.release.lock().expect("Lock poisoned.").recv()?;
        }
        self.inner.compile_shader(shader)
    }

    fn link_program(&self, program: &Program) -> anyhow::Result<()> {
        self.inner.link_program(program)
    }

    fn capabilities(&self, context: ContextId) -> Capabilities {
        self.inner.capabilities(context)
    }
}

#[test]
fn unrelated_programs_build_while_another_compiles() {
    init_logger();
    let fixture = Fixture::new("parallel-programs");
    fixture.write("slow.vert", "// vertex");
    fixture.write("fast.vert", "// vertex");
    fixture.write("terrain.frag", "// fragment");
    let (started_tx, started_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel();
    let backend = GatedBackend {
        inner: CountingBackend::default(),
        started: Mutex::new(started_tx),
        release: Mutex::new(release_rx),
    };
    let cache = ProgramCache::new();
    let slow_key = terrain_program(&fixture, "slow.vert");
    let fast_key = terrain_program(&fixture, "fast.vert");

    let (fast, slow) = std::thread::scope(|s| {
        let slow = s.spawn(|| cache.get_or_create(&slow_key, &backend));
        started_rx.recv().expect("Slow build never started.");

        let fast = cache
            .get_or_create(&fast_key, &backend)
            .expect("Program failed to build.");
        // Only the unblocked program has been linked so far.
        assert_eq!(cache.program_count(), 1);
        assert_eq!(backend.inner.linked(), 1);

        release_tx.send(()).expect("Slow build went away.");
        let slow = slow
            .join()
            .expect("Request thread panicked.")
            .expect("Program failed to build.");
        (fast, slow)
    });

    assert!(!Arc::ptr_eq(&fast, &slow));
    assert_eq!(cache.program_count(), 2);
    assert_eq!(backend.inner.compiled(), 3);
    assert!(Arc::ptr_eq(&fast.shaders()[1], &slow.shaders()[1]));
}

#[test]
fn missing_shader_is_a_build_error() {
    init_logger();
    let fixture = Fixture::new("missing-shader");
    fixture.write("terrain.frag", "// fragment");
    let cache = ProgramCache::new();
    let backend = CountingBackend::default();

    let result = cache.get_or_create(&terrain_program(&fixture, "nowhere.vert"), &backend);

    let error = result.expect_err("A missing shader must not link.");
    let build = error
        .downcast_ref::<terrafx::BuildError>()
        .expect("Expected a build error.");
    assert_eq!(build.origin, "program");
    assert!(build.message.contains("nowhere.vert"));
    assert_eq!(backend.linked(), 0);
}

#[test]
fn uniforms_are_keyed_by_name_type_value_and_effect() {
    init_logger();
    let cache = UniformCache::new();
    let deferred = DeferredListeners::new();
    let fog = |effect: &str, value: f64| {
        cache
            .get_or_create(
                "fogDensity",
                UniformType::Float,
                UniformSource::Static(Value::Double(value)),
                effect,
                &deferred,
            )
            .expect("Uniform failed to build.")
    };

    let a = fog("terrain", 0.5);
    let b = fog("terrain", 0.5);
    let other_value = fog("terrain", 0.25);
    let other_effect = fog("water", 0.5);

    assert!(Arc::ptr_eq(&a, &b));
    assert!(!Arc::ptr_eq(&a, &other_value));
    assert!(!Arc::ptr_eq(&a, &other_effect));
    assert_eq!(cache.len(), 3);
    assert_eq!(a.as_f32s(), vec![0.5]);
    assert!(!a.is_live());
}

#[test]
fn live_uniform_follows_its_property_after_flush() {
    init_logger();
    let cache = UniformCache::new();
    let deferred = DeferredListeners::new();
    let root = PropertyRoot::new();
    root.set("/environment/visibility-m", 12_000.0);

    let uniform = cache
        .get_or_create(
            "visibility",
            UniformType::Float,
            UniformSource::Live("/environment/visibility-m".to_string()),
            "terrain",
            &deferred,
        )
        .expect("Uniform failed to build.");
    assert!(uniform.is_live());
    assert_eq!(uniform.value(), Value::None);
    assert_eq!(deferred.pending(), 1);
    assert_eq!(root.listener_count(), 0);

    assert_eq!(deferred.flush(&root), 1);
    assert_eq!(uniform.as_f32s(), vec![12_000.0]);
    assert_eq!(root.listener_count(), 1);

    let version = uniform.version();
    root.set("/environment/visibility-m", 800.0);
    assert_eq!(uniform.as_f32s(), vec![800.0]);
    assert!(uniform.version() > version);
}

#[test]
fn missing_texture_falls_back_to_a_cached_placeholder() {
    init_logger();
    let fixture = Fixture::new("textures");
    let search_path = SearchPath::new(vec![fixture.path().to_path_buf()]);
    let cache = TextureCache::new();

    let first = cache.get_or_load("missing.png", &search_path, false, Placeholder::White);
    let second = cache.get_or_load("missing.png", &search_path, false, Placeholder::White);

    assert!(first.placeholder);
    assert_eq!(first.dimensions(), (1, 1));
    assert_eq!(first.image.get_pixel(0, 0).0, [255, 255, 255, 255]);
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(cache.len(), 1);
}

#[test]
fn texture_is_loaded_from_the_search_path() {
    init_logger();
    let fixture = Fixture::new("texture-load");
    image::RgbaImage::from_pixel(4, 2, image::Rgba([10, 20, 30, 255]))
        .save(fixture.path().join("grass.png"))
        .expect("Failed to write test image.");
    let search_path = SearchPath::new(vec![fixture.path().to_path_buf()]);
    let cache = TextureCache::new();

    let texture = cache.get_or_load("grass.png", &search_path, false, Placeholder::Transparent);

    assert!(!texture.placeholder);
    assert_eq!(texture.dimensions(), (4, 2));
    assert_eq!(texture.image.get_pixel(3, 1).0, [10, 20, 30, 255]);
}
