use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use crate::{
    data_structures::texture::Texture,
    resources::{SearchPath, load_binary},
};

/// What to substitute when an image cannot be loaded.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Placeholder {
    White,
    Transparent,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct TextureKey {
    name: String,
    is_normal_map: bool,
    search_paths: Vec<std::path::PathBuf>,
}

/// Loaded images shared between texture units.
#[derive(Default)]
pub struct TextureCache {
    textures: Mutex<HashMap<TextureKey, Arc<Texture>>>,
}

impl TextureCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads `name` through `search_path`, reusing an earlier load.
    ///
    /// A missing or undecodable file is not an error: a placeholder texture is
    /// returned (and cached) instead so rendering degrades rather than fails.
    pub fn get_or_load(
        &self,
        name: &str,
        search_path: &SearchPath,
        is_normal_map: bool,
        placeholder: Placeholder,
    ) -> Arc<Texture> {
        let key = TextureKey {
            name: name.to_string(),
            is_normal_map,
            search_paths: search_path.dirs().to_vec(),
        };
        if let Some(texture) = self.textures.lock().ok().and_then(|t| t.get(&key).cloned()) {
            return texture;
        }
        let texture = Arc::new(load_texture(name, search_path, is_normal_map).unwrap_or_else(
            |e| {
                log::warn!("Texture {name} unavailable ({e:#}), using placeholder");
                match placeholder {
                    Placeholder::White => Texture::white(),
                    Placeholder::Transparent => Texture::transparent(),
                }
            },
        ));
        if let Ok(mut textures) = self.textures.lock() {
            return textures.entry(key).or_insert(texture).clone();
        }
        texture
    }

    pub fn len(&self) -> usize {
        self.textures.lock().map(|t| t.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub fn load_texture(
    file_name: &str,
    search_path: &SearchPath,
    is_normal_map: bool,
) -> anyhow::Result<Texture> {
    let Some(path) = search_path.resolve(file_name) else {
        anyhow::bail!("{file_name} not found on the search path");
    };
    let data = load_binary(&path)?;
    let extension = path.extension().and_then(|e| e.to_str());
    Texture::from_bytes(&data, file_name, extension, is_normal_map)
}
