//! Texture images and their GPU counterparts.
//!
//! A [`TextureSlot`] is what materials hold: it exists as soon as a load is
//! issued and gets its pixels once the load finishes. The renderer turns
//! filled slots into [`Texture`]s and binds neutral defaults until then.

use std::{borrow::Cow, sync::OnceLock};

use anyhow::*;

/// An image that may still be loading.
#[derive(Debug)]
pub struct TextureSlot {
    label: String,
    image: OnceLock<image::RgbaImage>,
}

impl TextureSlot {
    /// A slot waiting for its image.
    pub fn pending(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            image: OnceLock::new(),
        }
    }

    /// A slot that already holds its image (e.g. embedded in a glTF).
    pub fn ready(label: impl Into<String>, image: image::RgbaImage) -> Self {
        let slot = Self::pending(label);
        // A fresh OnceLock cannot be occupied
        let _ = slot.image.set(image);
        slot
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn image(&self) -> Option<&image::RgbaImage> {
        self.image.get()
    }

    pub fn is_ready(&self) -> bool {
        self.image.get().is_some()
    }

    /// Stores the loaded image. A slot is filled at most once.
    pub fn fill(&self, image: image::RgbaImage) -> Result<()> {
        self.image
            .set(image)
            .map_err(|_| anyhow!("texture {} was already loaded", self.label))
    }
}

/// A GPU texture with a view and optional sampler.
#[derive(Clone, Debug)]
pub struct Texture {
    #[allow(unused)]
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub sampler: Option<wgpu::Sampler>,
}

impl Texture {
    /// Standard depth buffer texture format (32-bit float).
    pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

    /// Create a depth texture for depth-testing during rendering.
    ///
    /// # Arguments
    ///
    /// * `size` is [width, height] of the texture in pixels
    /// * `label` is used as a debug label for the GPU resource
    pub fn create_depth_texture(device: &wgpu::Device, size: [u32; 2], label: &str) -> Self {
        let size = wgpu::Extent3d {
            width: size[0].max(1),
            height: size[1].max(1),
            depth_or_array_layers: 1,
        };
        let desc = wgpu::TextureDescriptor {
            label: Some(label),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: Self::DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[Self::DEPTH_FORMAT],
        };
        let texture = device.create_texture(&desc);
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        Self {
            texture,
            view,
            sampler: None,
        }
    }

    /// A solid single-colour texture, used while a slot is still empty or
    /// when a material has no map at all.
    ///
    /// `[255; 4]` in sRGB is the neutral colour map, `[127, 127, 255, 255]`
    /// in linear space the neutral normal map (no deformation).
    pub fn create_solid(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        rgba: [u8; 4],
        is_normal_map: bool,
        label: &str,
    ) -> Self {
        let image = image::RgbaImage::from_pixel(1, 1, image::Rgba(rgba));
        Self::from_image(device, queue, &image, Some(label), is_normal_map)
    }

    /// Uploads a decoded image, downscaled if it exceeds the device's
    /// texture size limit.
    ///
    /// `is_normal_map` toggles between sRGB (false) and linear (true) colour space.
    pub fn from_image(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        img: &image::RgbaImage,
        label: Option<&str>,
        is_normal_map: bool,
    ) -> Self {
        let max_dimension = device.limits().max_texture_dimension_2d;
        let img = fit_within(img, max_dimension);
        if let Cow::Owned(fitted) = &img {
            log::warn!(
                "{} is larger than {max_dimension}px, uploading it at {}x{}",
                label.unwrap_or("texture"),
                fitted.width(),
                fitted.height()
            );
        }
        let dimensions = img.dimensions();

        let size = wgpu::Extent3d {
            width: dimensions.0,
            height: dimensions.1,
            depth_or_array_layers: 1,
        };
        let format = if is_normal_map {
            wgpu::TextureFormat::Rgba8Unorm
        } else {
            wgpu::TextureFormat::Rgba8UnormSrgb
        };
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label,
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                aspect: wgpu::TextureAspect::All,
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
            },
            img.as_raw(),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4 * dimensions.0),
                rows_per_image: Some(dimensions.1),
            },
            size,
        );

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let sampler = Some(create_default_sampler(device));

        Self {
            texture,
            view,
            sampler,
        }
    }
}

/// Shrinks `img` so neither side exceeds `max_dimension`, keeping the
/// aspect ratio. Images that already fit are borrowed as they are.
pub fn fit_within(img: &image::RgbaImage, max_dimension: u32) -> Cow<'_, image::RgbaImage> {
    let (width, height) = img.dimensions();
    let longest = width.max(height);
    if longest <= max_dimension {
        return Cow::Borrowed(img);
    }
    let scale = max_dimension as f64 / longest as f64;
    let fit = |side: u32| ((side as f64 * scale).round() as u32).clamp(1, max_dimension);
    Cow::Owned(image::imageops::resize(
        img,
        fit(width),
        fit(height),
        image::imageops::FilterType::Triangle,
    ))
}

pub fn create_default_sampler(device: &wgpu::Device) -> wgpu::Sampler {
    device.create_sampler(&wgpu::SamplerDescriptor {
        address_mode_u: wgpu::AddressMode::Repeat,
        address_mode_v: wgpu::AddressMode::Repeat,
        address_mode_w: wgpu::AddressMode::Repeat,
        mag_filter: wgpu::FilterMode::Linear,
        min_filter: wgpu::FilterMode::Linear,
        mipmap_filter: wgpu::FilterMode::Linear,
        ..Default::default()
    })
}
