//! Drawing a [`Scene`] with wgpu.
//!
//! The viewer only talks to a [`SceneRenderer`]; [`GpuRenderer`] is the
//! implementation backed by a [`Context`]. GPU buffers mirror the scene and
//! are rebuilt whenever the scene's revision changes. Material bind groups
//! are keyed by material identity and rebuilt once a texture slot fills.

use std::{collections::HashMap, iter, sync::Arc};

use cgmath::Matrix4;
use wgpu::util::DeviceExt;

use crate::{
    camera::{Camera, Projection},
    context::Context,
    data_structures::{
        instance::InstanceRaw,
        model::{Geometry, Material},
        scene_graph::Scene,
        texture::{Texture, TextureSlot},
    },
    pipelines::{basic, light::LightUniform},
};

/// Something that can draw a frame of a scene.
pub trait SceneRenderer {
    type Error: std::fmt::Debug;

    /// Current drawing size in pixels.
    fn size(&self) -> (u32, u32);

    /// Adapts the output to a new size. Callers never pass zero sizes.
    fn resize(&mut self, width: u32, height: u32);

    fn render(
        &mut self,
        scene: &Scene,
        camera: &Camera,
        projection: &Projection,
    ) -> Result<(), Self::Error>;
}

struct GeometryBuffers {
    // keeps the allocation alive so its address stays a valid key
    _geometry: Arc<Geometry>,
    vertex: wgpu::Buffer,
    index: wgpu::Buffer,
    num_indices: u32,
}

struct MaterialBinding {
    material: Arc<Material>,
    bind_group: wgpu::BindGroup,
    uniform: wgpu::Buffer,
    ready: (bool, bool),
}

struct DrawItem {
    geometry: usize,
    material: usize,
    instance: wgpu::Buffer,
}

#[derive(Default)]
struct SceneBuffers {
    revision: Option<u64>,
    geometries: HashMap<usize, GeometryBuffers>,
    materials: HashMap<usize, MaterialBinding>,
    items: Vec<DrawItem>,
}

fn key<T>(arc: &Arc<T>) -> usize {
    Arc::as_ptr(arc) as *const () as usize
}

fn slot_ready(slot: &Option<Arc<TextureSlot>>) -> bool {
    slot.as_ref().is_some_and(|slot| slot.is_ready())
}

impl SceneBuffers {
    fn sync(&mut self, ctx: &Context, scene: &Scene) {
        if self.revision != Some(scene.revision()) {
            self.rebuild(ctx, scene);
            self.revision = Some(scene.revision());
        }
        for binding in self.materials.values_mut() {
            let ready = (
                slot_ready(&binding.material.color_map),
                slot_ready(&binding.material.normal_map),
            );
            if ready != binding.ready {
                log::debug!("textures of {} arrived, rebinding", binding.material.name);
                binding.bind_group = material_bind_group(ctx, &binding.material, &binding.uniform);
                binding.ready = ready;
            }
        }
    }

    fn rebuild(&mut self, ctx: &Context, scene: &Scene) {
        let mut geometries = HashMap::new();
        let mut materials = HashMap::new();
        let mut items = Vec::new();

        for (world, mesh) in scene.meshes() {
            if mesh.geometry.indices.is_empty() {
                continue;
            }
            let geometry = key(&mesh.geometry);
            if !geometries.contains_key(&geometry) {
                let buffers = self
                    .geometries
                    .remove(&geometry)
                    .unwrap_or_else(|| upload_geometry(ctx, &mesh.geometry));
                geometries.insert(geometry, buffers);
            }
            let material = key(&mesh.material);
            if !materials.contains_key(&material) {
                let binding = self
                    .materials
                    .remove(&material)
                    .unwrap_or_else(|| bind_material(ctx, &mesh.material));
                materials.insert(material, binding);
            }
            items.push(DrawItem {
                geometry,
                material,
                instance: upload_instance(ctx, world),
            });
        }

        log::debug!(
            "scene buffers rebuilt: {} draws, {} geometries, {} materials",
            items.len(),
            geometries.len(),
            materials.len()
        );
        self.geometries = geometries;
        self.materials = materials;
        self.items = items;
    }
}

fn upload_geometry(ctx: &Context, geometry: &Arc<Geometry>) -> GeometryBuffers {
    let vertex = ctx
        .device
        .create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{:?} Vertex Buffer", geometry.name)),
            contents: bytemuck::cast_slice(&geometry.vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
    let index = ctx
        .device
        .create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{:?} Index Buffer", geometry.name)),
            contents: bytemuck::cast_slice(&geometry.indices),
            usage: wgpu::BufferUsages::INDEX,
        });
    GeometryBuffers {
        _geometry: geometry.clone(),
        vertex,
        index,
        num_indices: geometry.indices.len() as u32,
    }
}

fn upload_instance(ctx: &Context, world: Matrix4<f32>) -> wgpu::Buffer {
    ctx.device
        .create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Instance Buffer"),
            contents: bytemuck::cast_slice(&[InstanceRaw::from(world)]),
            usage: wgpu::BufferUsages::VERTEX,
        })
}

fn bind_material(ctx: &Context, material: &Arc<Material>) -> MaterialBinding {
    let uniform = ctx
        .device
        .create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{} Material Buffer", material.name)),
            contents: bytemuck::cast_slice(&[basic::MaterialUniform::from(material.as_ref())]),
            usage: wgpu::BufferUsages::UNIFORM,
        });
    MaterialBinding {
        material: material.clone(),
        bind_group: material_bind_group(ctx, material, &uniform),
        uniform,
        ready: (
            slot_ready(&material.color_map),
            slot_ready(&material.normal_map),
        ),
    }
}

fn material_bind_group(ctx: &Context, material: &Material, uniform: &wgpu::Buffer) -> wgpu::BindGroup {
    let upload = |slot: &Option<Arc<TextureSlot>>, is_normal_map: bool| {
        let slot = slot.as_ref()?;
        let image = slot.image()?;
        Some(Texture::from_image(
            &ctx.device,
            &ctx.queue,
            image,
            Some(slot.label()),
            is_normal_map,
        ))
    };
    let color = upload(&material.color_map, false);
    let normal = upload(&material.normal_map, true);
    basic::mk_material_bind_group(
        &ctx.device,
        &ctx.material_layout,
        color.as_ref().unwrap_or(&ctx.defaults.color),
        normal.as_ref().unwrap_or(&ctx.defaults.normal),
        uniform,
        &ctx.defaults.sampler,
        &material.name,
    )
}

/// Renders scenes into the window surface owned by its [`Context`].
pub struct GpuRenderer {
    ctx: Context,
    buffers: SceneBuffers,
}

impl GpuRenderer {
    pub fn new(ctx: Context) -> Self {
        Self {
            ctx,
            buffers: SceneBuffers::default(),
        }
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }
}

impl SceneRenderer for GpuRenderer {
    type Error = wgpu::SurfaceError;

    fn size(&self) -> (u32, u32) {
        (self.ctx.config.width, self.ctx.config.height)
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.ctx.resize(width, height);
    }

    fn render(
        &mut self,
        scene: &Scene,
        camera: &Camera,
        projection: &Projection,
    ) -> Result<(), Self::Error> {
        // Rendering requires the surface to be configured
        if !self.ctx.is_surface_configured {
            return Ok(());
        }

        let ctx = &mut self.ctx;
        ctx.camera.update(&ctx.queue, camera, projection);
        ctx.light
            .update(&ctx.queue, LightUniform::from_lights(scene.lights()));
        self.buffers.sync(ctx, scene);

        let output = ctx.surface.get_current_texture()?;
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Render Encoder"),
            });
        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Render Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(ctx.clear_colour),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &ctx.depth_texture.view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                occlusion_query_set: None,
                timestamp_writes: None,
            });

            render_pass.set_pipeline(&ctx.pipeline);
            render_pass.set_bind_group(1, &ctx.camera.bind_group, &[]);
            render_pass.set_bind_group(2, &ctx.light.bind_group, &[]);
            for item in &self.buffers.items {
                let (Some(geometry), Some(material)) = (
                    self.buffers.geometries.get(&item.geometry),
                    self.buffers.materials.get(&item.material),
                ) else {
                    continue;
                };
                render_pass.set_bind_group(0, &material.bind_group, &[]);
                render_pass.set_vertex_buffer(0, geometry.vertex.slice(..));
                render_pass.set_vertex_buffer(1, item.instance.slice(..));
                render_pass.set_index_buffer(geometry.index.slice(..), wgpu::IndexFormat::Uint32);
                render_pass.draw_indexed(0..geometry.num_indices, 0, 0..1);
            }
        }

        ctx.queue.submit(iter::once(encoder.finish()));
        ctx.window.pre_present_notify();
        output.present();
        Ok(())
    }
}
