//! Render composition and pass batching.
//!
//! This module defines the [`Render`] enum, which describes what a tile (or
//! any other producer of geometry) wants drawn and with which effect. The
//! engine resolves each item's technique for the requested scheme and
//! context, then sorts the technique's passes into render bins so passes of
//! the same bin are issued together.
//!
//! # Key types
//!
//! - [`Render<'a>`] is the primary enum describing render operations
//! - [`Instanced<'a>`] holds one spatial-grid leaf of scattered instances
//! - [`Flat<'a>`] holds indexed geometry (terrain, water, features)
//! - [`RenderQueue<'a>`] is the result: draw calls grouped by render bin
//!

use std::collections::BTreeMap;

use crate::{
    data_structures::instance::Instance,
    effect::{Effect, pass::Pass, technique::ProbeScheduler},
    resources::backend::ContextId,
    scatter::ScatterKind,
    terrain::tile::TileBuffer,
};

/// Data for instanced rendering: a batch of instances and their effect.
pub struct Instanced<'a> {
    pub effect: &'a Effect,
    pub instances: &'a [Instance],
    /// Distance beyond which the batch is culled.
    pub range: f32,
    pub id: u32,
}

/// Data for indexed rendering of flat (non-instanced) geometry.
pub struct Flat<'a> {
    pub effect: &'a Effect,
    pub indices: &'a [u32],
    pub vertices: usize,
    pub id: u32,
}

/// Specifies how an object should be rendered.
///
/// # Variants
///
/// - `None` renders nothing
/// - `Terrain(Flat)` renders a tile's land triangles
/// - `Water(Flat)` renders a tile's water triangles
/// - `Feature(Flat)` renders a draped road, area or coastline
/// - `Instanced(Instanced)` renders one leaf of scattered instances
/// - `Composed(Vec<Render>)` recursively renders composition of multiple renders
///
pub enum Render<'a> {
    None,
    Terrain(Flat<'a>),
    Water(Flat<'a>),
    Feature(Flat<'a>),
    Instanced(Instanced<'a>),
    Composed(Vec<Render<'a>>),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Draw {
    Indexed { vertices: usize, indices: usize },
    Instanced { instances: usize },
}

/// One pass of one item.
pub struct DrawCall<'a> {
    pub id: u32,
    pub effect: &'a str,
    pub technique: &'a str,
    pub pass: &'a Pass,
    pub draw: Draw,
}

/// Draw calls by render bin, lowest bin first.
#[derive(Default)]
pub struct RenderQueue<'a> {
    bins: BTreeMap<i32, Vec<DrawCall<'a>>>,
    skipped: usize,
}

impl<'a> RenderQueue<'a> {
    pub fn bins(&self) -> impl Iterator<Item = (i32, &[DrawCall<'a>])> {
        self.bins.iter().map(|(bin, calls)| (*bin, calls.as_slice()))
    }

    /// All draw calls in issue order.
    pub fn calls(&self) -> impl Iterator<Item = &DrawCall<'a>> {
        self.bins.values().flatten()
    }

    pub fn len(&self) -> usize {
        self.bins.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Items with no technique usable this frame.
    pub fn skipped(&self) -> usize {
        self.skipped
    }
}

impl<'a> Render<'a> {
    /// Picks each item's technique for `scheme` on `context` and queues its
    /// passes by render bin. Items whose techniques are all invalid, or still
    /// being probed, are skipped for this frame.
    pub fn select_passes(
        self,
        scheme: &str,
        context: ContextId,
        probes: &dyn ProbeScheduler,
    ) -> RenderQueue<'a> {
        let mut queue = RenderQueue::default();
        self.collect(scheme, context, probes, &mut queue);
        queue
    }

    fn collect(
        self,
        scheme: &str,
        context: ContextId,
        probes: &dyn ProbeScheduler,
        queue: &mut RenderQueue<'a>,
    ) {
        let (effect, id, draw) = match self {
            Render::Terrain(flat) | Render::Water(flat) | Render::Feature(flat) => (
                flat.effect,
                flat.id,
                Draw::Indexed {
                    vertices: flat.vertices,
                    indices: flat.indices.len(),
                },
            ),
            Render::Instanced(instanced) => (
                instanced.effect,
                instanced.id,
                Draw::Instanced {
                    instances: instanced.instances.len(),
                },
            ),
            Render::Composed(renders) => {
                renders
                    .into_iter()
                    .for_each(|render| render.collect(scheme, context, probes, queue));
                return;
            }
            Render::None => return,
        };
        let Some(technique) = effect.choose_technique(scheme, context, probes) else {
            queue.skipped += 1;
            return;
        };
        for pass in &technique.passes {
            queue.bins.entry(pass.bin_number()).or_default().push(DrawCall {
                id,
                effect: effect.name(),
                technique: &technique.name,
                pass,
                draw,
            });
        }
    }
}

/// Effects used to draw a tile's outputs. Outputs without an effect are left
/// out.
#[derive(Clone, Copy, Default)]
pub struct TileEffects<'a> {
    pub land: Option<&'a Effect>,
    pub water: Option<&'a Effect>,
    pub features: Option<&'a Effect>,
    pub trees: Option<&'a Effect>,
    pub buildings: Option<&'a Effect>,
    pub lights: Option<&'a Effect>,
    pub objects: Option<&'a Effect>,
}

impl<'a> TileEffects<'a> {
    /// Composes everything in `buffer` that has an effect.
    pub fn render(&self, buffer: &'a TileBuffer) -> Render<'a> {
        let mesh = &buffer.mesh;
        let mut renders = Vec::new();
        let mut next_id = 0u32;
        let mut id = || {
            next_id += 1;
            next_id
        };
        if let Some(effect) = self.land
            && !mesh.land.is_empty()
        {
            renders.push(Render::Terrain(Flat {
                effect,
                indices: &mesh.land,
                vertices: mesh.vertices.len(),
                id: id(),
            }));
        }
        if let Some(effect) = self.water
            && !mesh.water.is_empty()
        {
            renders.push(Render::Water(Flat {
                effect,
                indices: &mesh.water,
                vertices: mesh.vertices.len(),
                id: id(),
            }));
        }
        if let Some(effect) = self.features {
            for feature in &buffer.features {
                renders.push(Render::Feature(Flat {
                    effect,
                    indices: &feature.indices,
                    vertices: feature.vertices.len(),
                    id: id(),
                }));
            }
        }
        for batch in &buffer.batches {
            let effect = match batch.kind {
                ScatterKind::Trees => self.trees,
                ScatterKind::Buildings => self.buildings,
                ScatterKind::Lights => self.lights,
                ScatterKind::Objects => self.objects,
            };
            let Some(effect) = effect else {
                continue;
            };
            for leaf in batch.grid.leaves() {
                renders.push(Render::Instanced(Instanced {
                    effect,
                    instances: &leaf.instances,
                    range: leaf.range,
                    id: id(),
                }));
            }
        }
        match renders.len() {
            0 => Render::None,
            _ => Render::Composed(renders),
        }
    }
}
