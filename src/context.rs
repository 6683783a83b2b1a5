//! The GPU context: device, queue and surface plus the resources shared by
//! every frame (camera and light uniforms, the model pipeline and the
//! neutral fallback textures).

use std::sync::Arc;

use anyhow::Context as _;
use wgpu::util::DeviceExt;
use winit::window::Window;

use crate::{
    camera::{Camera, CameraUniform, Projection},
    config::{ColorSpace, ViewerConfig},
    data_structures::{scene_graph::Color, texture},
    pipelines::{
        basic,
        light::{LightResources, LightUniform, OutputUniform},
    },
};

pub struct CameraResources {
    pub uniform: CameraUniform,
    pub buffer: wgpu::Buffer,
    pub bind_group: wgpu::BindGroup,
    pub bind_group_layout: wgpu::BindGroupLayout,
}

impl CameraResources {
    fn new(device: &wgpu::Device) -> Self {
        let uniform = CameraUniform::new();
        let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Camera Buffer"),
            contents: bytemuck::cast_slice(&[uniform]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
            label: Some("camera_bind_group_layout"),
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: &bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: buffer.as_entire_binding(),
            }],
            label: Some("camera_bind_group"),
        });

        Self {
            uniform,
            buffer,
            bind_group,
            bind_group_layout,
        }
    }

    pub fn update(&mut self, queue: &wgpu::Queue, camera: &Camera, projection: &Projection) {
        self.uniform.update_view_proj(camera, projection);
        queue.write_buffer(&self.buffer, 0, bytemuck::cast_slice(&[self.uniform]));
    }
}

/// Stand-ins bound while a material has no map or its map is still loading.
pub struct DefaultTextures {
    pub color: texture::Texture,
    pub normal: texture::Texture,
    pub sampler: wgpu::Sampler,
}

pub struct Context {
    pub(crate) window: Arc<Window>,
    pub(crate) depth_texture: texture::Texture,
    pub(crate) is_surface_configured: bool,
    pub surface: wgpu::Surface<'static>,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub config: wgpu::SurfaceConfiguration,
    pub camera: CameraResources,
    pub light: LightResources,
    pub material_layout: wgpu::BindGroupLayout,
    pub pipeline: wgpu::RenderPipeline,
    pub defaults: DefaultTextures,
    pub clear_colour: wgpu::Color,
}

impl Context {
    pub async fn new(window: Arc<Window>, viewer: &ViewerConfig) -> anyhow::Result<Self> {
        let size = window.inner_size();

        log::info!("WGPU setup");
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            #[cfg(not(target_arch = "wasm32"))]
            backends: wgpu::Backends::PRIMARY,
            #[cfg(target_arch = "wasm32")]
            backends: wgpu::Backends::GL,
            ..Default::default()
        });

        let surface = instance
            .create_surface(window.clone())
            .context("cannot create a drawing surface for the window")?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .context("no suitable graphics adapter")?;
        log::info!("Using adapter {:?}", adapter.get_info().name);

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: None,
                required_features: wgpu::Features::empty(),
                // WebGL doesn't support all of wgpu's features, so if
                // we're building for the web we'll have to disable some.
                required_limits: if cfg!(target_arch = "wasm32") {
                    wgpu::Limits::downlevel_webgl2_defaults()
                } else {
                    wgpu::Limits::default()
                },
                memory_hints: Default::default(),
                trace: wgpu::Trace::Off,
                ..Default::default()
            })
            .await
            .context("cannot open the graphics device")?;

        let surface_caps = surface.get_capabilities(&adapter);
        let wants_srgb = viewer.output_color_space == ColorSpace::Srgb;
        let surface_format = surface_caps
            .formats
            .iter()
            .copied()
            .find(|f| f.is_srgb() == wants_srgb)
            .or_else(|| surface_caps.formats.first().copied())
            .context("the surface supports no formats")?;
        let surface_is_srgb = surface_format.is_srgb();
        log::info!("Surface format {surface_format:?}");

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width,
            height: size.height,
            present_mode: surface_caps
                .present_modes
                .first()
                .copied()
                .unwrap_or(wgpu::PresentMode::Fifo),
            alpha_mode: surface_caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };

        let camera = CameraResources::new(&device);
        let light = LightResources::new(
            &device,
            LightUniform::from_lights(&[]),
            OutputUniform::new(viewer.tone_mapping, viewer.output_color_space, surface_is_srgb),
        );
        let material_layout = basic::mk_material_layout(&device);
        let pipeline = basic::mk_basic_pipeline(
            &device,
            config.format,
            &material_layout,
            &camera.bind_group_layout,
            &light.bind_group_layout,
        );

        let defaults = DefaultTextures {
            color: texture::Texture::create_solid(&device, &queue, [255; 4], false, "default colour"),
            normal: texture::Texture::create_solid(
                &device,
                &queue,
                [127, 127, 255, 255],
                true,
                "default normal",
            ),
            sampler: texture::create_default_sampler(&device),
        };

        let depth_texture = texture::Texture::create_depth_texture(
            &device,
            [config.width, config.height],
            "depth_texture",
        );

        Ok(Self {
            window,
            depth_texture,
            is_surface_configured: false,
            surface,
            device,
            queue,
            config,
            camera,
            light,
            material_layout,
            pipeline,
            defaults,
            clear_colour: clear_colour(viewer.background, surface_is_srgb),
        })
    }

    pub fn window(&self) -> &Arc<Window> {
        &self.window
    }

    /// Reconfigures the surface and depth buffer. Zero sizes are ignored.
    pub fn resize(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.config.width = width;
            self.config.height = height;
            self.is_surface_configured = true;
            self.surface.configure(&self.device, &self.config);
            self.depth_texture = texture::Texture::create_depth_texture(
                &self.device,
                [self.config.width, self.config.height],
                "depth_texture",
            );
        }
    }
}

/// The clear colour that shows `background` as authored. Clear values
/// bypass the shader, so only an sRGB surface needs linear input.
pub fn clear_colour(background: Color, surface_is_srgb: bool) -> wgpu::Color {
    let c = if surface_is_srgb {
        background.to_linear()
    } else {
        background
    };
    wgpu::Color {
        r: c.r as f64,
        g: c.g as f64,
        b: c.b as f64,
        a: 1.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clear_colour_matches_surface_encoding() {
        let background = Color::from_hex(0xbfd1e5);
        let plain = clear_colour(background, false);
        let srgb = clear_colour(background, true);
        assert!((plain.r - 191.0 / 255.0).abs() < 1e-6);
        assert!(srgb.r < plain.r);
        assert_eq!(srgb.a, 1.0);
    }
}
