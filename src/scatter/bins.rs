//! Placed instances grouped by the visual attributes they share.
//!
//! Every scatter kind has its own key type. Instances whose keys compare
//! equal end up in the same [`Bin`] and are drawn as one batch, however many
//! triangles or materials they came from.

use std::{collections::HashMap, hash::Hash};

use crate::data_structures::instance::Instance;

/// What a bin key needs to expose to the spatial index.
pub trait BinKey: Clone + Eq + Hash {
    /// Distance beyond which the batch is not drawn.
    fn range(&self) -> f32;
    /// Human-readable identification for logs and draw labels.
    fn label(&self) -> String;
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TreeKey {
    pub texture: String,
    height: u32,
    width: u32,
    range: u32,
    pub varieties: u32,
}

impl TreeKey {
    pub fn new(texture: &str, height: f32, width: f32, range: f32, varieties: u32) -> Self {
        Self {
            texture: texture.to_string(),
            height: height.to_bits(),
            width: width.to_bits(),
            range: range.to_bits(),
            varieties,
        }
    }

    pub fn height(&self) -> f32 {
        f32::from_bits(self.height)
    }

    pub fn width(&self) -> f32 {
        f32::from_bits(self.width)
    }
}

impl BinKey for TreeKey {
    fn range(&self) -> f32 {
        f32::from_bits(self.range)
    }

    fn label(&self) -> String {
        format!("trees {} {}x{}", self.texture, self.width(), self.height())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct BuildingKey {
    pub texture: String,
    range: u32,
}

impl BuildingKey {
    pub fn new(texture: &str, range: f32) -> Self {
        Self {
            texture: texture.to_string(),
            range: range.to_bits(),
        }
    }
}

impl BinKey for BuildingKey {
    fn range(&self) -> f32 {
        f32::from_bits(self.range)
    }

    fn label(&self) -> String {
        format!("buildings {}", self.texture)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct LightKey {
    size: u32,
    color: [u32; 4],
    range: u32,
}

impl LightKey {
    pub fn new(size: f32, color: [f32; 4], range: f32) -> Self {
        Self {
            size: size.to_bits(),
            color: color.map(f32::to_bits),
            range: range.to_bits(),
        }
    }

    pub fn size(&self) -> f32 {
        f32::from_bits(self.size)
    }

    pub fn color(&self) -> [f32; 4] {
        self.color.map(f32::from_bits)
    }
}

impl BinKey for LightKey {
    fn range(&self) -> f32 {
        f32::from_bits(self.range)
    }

    fn label(&self) -> String {
        format!("lights {} {:?}", self.size(), self.color())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ObjectKey {
    pub model: String,
    range: u32,
}

impl ObjectKey {
    pub fn new(model: &str, range: f32) -> Self {
        Self {
            model: model.to_string(),
            range: range.to_bits(),
        }
    }
}

impl BinKey for ObjectKey {
    fn range(&self) -> f32 {
        f32::from_bits(self.range)
    }

    fn label(&self) -> String {
        format!("objects {}", self.model)
    }
}

#[derive(Clone, Debug)]
pub struct Bin<K> {
    pub key: K,
    pub instances: Vec<Instance>,
}

pub type TreeBin = Bin<TreeKey>;
pub type BuildingBin = Bin<BuildingKey>;
pub type LightBin = Bin<LightKey>;
pub type ObjectBin = Bin<ObjectKey>;

/// Bins in first-use order.
#[derive(Clone, Debug)]
pub struct Bins<K> {
    bins: Vec<Bin<K>>,
    index: HashMap<K, usize>,
}

impl<K> Default for Bins<K> {
    fn default() -> Self {
        Self {
            bins: Vec::new(),
            index: HashMap::new(),
        }
    }
}

impl<K: BinKey> Bins<K> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, key: &K, instance: Instance) {
        let slot = match self.index.get(key) {
            Some(&slot) => slot,
            None => {
                self.bins.push(Bin {
                    key: key.clone(),
                    instances: Vec::new(),
                });
                self.index.insert(key.clone(), self.bins.len() - 1);
                self.bins.len() - 1
            }
        };
        self.bins[slot].instances.push(instance);
    }

    pub fn get(&self, key: &K) -> Option<&Bin<K>> {
        self.index.get(key).map(|&i| &self.bins[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Bin<K>> {
        self.bins.iter()
    }

    pub fn len(&self) -> usize {
        self.bins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }

    pub fn instance_count(&self) -> usize {
        self.bins.iter().map(|b| b.instances.len()).sum()
    }

    pub fn into_bins(self) -> Vec<Bin<K>> {
        self.bins
    }
}
