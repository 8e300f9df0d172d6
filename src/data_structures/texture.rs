//! Textures and sampler state.
//!
//! This module provides [`Texture`], the CPU-side image plus the sampling
//! state a texture unit applies to it, and helpers for the placeholder
//! textures used when an image cannot be loaded.

use std::sync::Arc;

use anyhow::*;
use image::{ImageFormat, RgbaImage, load_from_memory_with_format};

/// How a texture unit samples its image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SamplerState {
    pub address_mode_u: wgpu::AddressMode,
    pub address_mode_v: wgpu::AddressMode,
    pub address_mode_w: wgpu::AddressMode,
    pub mag_filter: wgpu::FilterMode,
    pub min_filter: wgpu::FilterMode,
    pub mipmap_filter: wgpu::FilterMode,
}

impl Default for SamplerState {
    fn default() -> Self {
        Self {
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            address_mode_w: wgpu::AddressMode::Repeat,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Linear,
        }
    }
}

/// An image ready to be bound to a texture unit.
///
/// Typically created via [`from_bytes`](Self::from_bytes) or, when a file is
/// missing, via one of the placeholder constructors.
#[derive(Clone, Debug)]
pub struct Texture {
    pub label: String,
    pub image: Arc<RgbaImage>,
    pub format: wgpu::TextureFormat,
    pub dimension: wgpu::TextureViewDimension,
    /// Set when the texture stands in for an image that failed to load.
    pub placeholder: bool,
}

impl Texture {
    /// Solid white 1×1 texture.
    pub fn white() -> Self {
        Self::solid("white placeholder", [255, 255, 255, 255])
    }

    /// Fully transparent 1×1 texture.
    pub fn transparent() -> Self {
        Self::solid("transparent placeholder", [255, 255, 255, 0])
    }

    fn solid(label: &str, rgba: [u8; 4]) -> Self {
        Self {
            label: label.to_string(),
            image: Arc::new(RgbaImage::from_pixel(1, 1, image::Rgba(rgba))),
            format: wgpu::TextureFormat::Rgba8UnormSrgb,
            dimension: wgpu::TextureViewDimension::D2,
            placeholder: true,
        }
    }

    /// Create a default normal map (neutral blue, representing no deformation).
    pub fn create_default_normal_map(width: u32, height: u32) -> Texture {
        Self {
            label: "default normal map".to_string(),
            image: Arc::new(RgbaImage::from_pixel(
                width.max(1),
                height.max(1),
                image::Rgba([127, 127, 255, 255]),
            )),
            format: wgpu::TextureFormat::Rgba8Unorm,
            dimension: wgpu::TextureViewDimension::D2,
            placeholder: false,
        }
    }

    /// Load a texture from raw byte data (image file contents).
    ///
    /// * `format` is an optional file extension hint (e.g. "png"). If None, auto-detect.
    /// * `is_normal_map` toggles between sRGB (false) and linear (true) color space
    pub fn from_bytes(
        bytes: &[u8],
        label: &str,
        format: Option<&str>,
        is_normal_map: bool,
    ) -> Result<Self> {
        let img = match format.and_then(ImageFormat::from_extension) {
            None => image::load_from_memory(bytes)?,
            Some(fmt) => load_from_memory_with_format(bytes, fmt)?,
        };
        Ok(Self::from_image(&img, label, is_normal_map))
    }

    pub fn from_image(img: &image::DynamicImage, label: &str, is_normal_map: bool) -> Self {
        let format = if is_normal_map {
            wgpu::TextureFormat::Rgba8Unorm
        } else {
            wgpu::TextureFormat::Rgba8UnormSrgb
        };
        Self {
            label: label.to_string(),
            image: Arc::new(img.to_rgba8()),
            format,
            dimension: wgpu::TextureViewDimension::D2,
            placeholder: false,
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }
}
