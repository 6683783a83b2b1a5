use cgmath::InnerSpace;
use wgpu::util::DeviceExt;

use crate::{
    config::{ColorSpace, ToneMapping},
    data_structures::scene_graph::Light,
};

/// GPU side of the scene lights: one summed ambient term and one
/// directional light.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct LightUniform {
    ambient: [f32; 3],
    // Due to uniforms requiring 16 byte (4 float) spacing, we need to use a padding field here
    _padding: u32,
    direction: [f32; 3],
    _padding2: u32,
    directional: [f32; 3],
    _padding3: u32,
}

impl LightUniform {
    /// Folds the scene lights into the uniform. Colours are pre-multiplied
    /// with their intensity. Only the first directional light is used.
    pub fn from_lights(lights: &[Light]) -> Self {
        let mut uniform: Self = bytemuck::Zeroable::zeroed();
        let mut directional_seen = false;
        for light in lights {
            match light {
                Light::Ambient { color, intensity } => {
                    let color = color.to_linear();
                    uniform.ambient[0] += color.r * intensity;
                    uniform.ambient[1] += color.g * intensity;
                    uniform.ambient[2] += color.b * intensity;
                }
                Light::Directional {
                    color,
                    intensity,
                    position,
                } if !directional_seen => {
                    directional_seen = true;
                    let color = color.to_linear();
                    // pointing from the surface towards the light
                    uniform.direction = if position.magnitude2() > 0.0 {
                        position.normalize().into()
                    } else {
                        [0.0, 1.0, 0.0]
                    };
                    uniform.directional = [
                        color.r * intensity,
                        color.g * intensity,
                        color.b * intensity,
                    ];
                }
                Light::Directional { .. } => {
                    log::warn!("only one directional light is supported, ignoring the rest")
                }
            }
        }
        uniform
    }
}

/// How the shader turns lit linear colour into the surface's pixels.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct OutputUniform {
    tone_mapping: u32,
    output_mode: u32,
    exposure: f32,
    _padding: u32,
}

impl OutputUniform {
    /// Writes values as computed.
    pub const PASSTHROUGH: u32 = 0;
    /// Encodes to sRGB in the shader (surface stores values verbatim).
    pub const ENCODE_SRGB: u32 = 1;
    /// Decodes from sRGB in the shader so that an sRGB surface re-encodes
    /// to the original linear values.
    pub const DECODE_SRGB: u32 = 2;

    pub fn new(tone_mapping: ToneMapping, output: ColorSpace, surface_is_srgb: bool) -> Self {
        let output_mode = match (output, surface_is_srgb) {
            (ColorSpace::Srgb, true) | (ColorSpace::Linear, false) => Self::PASSTHROUGH,
            (ColorSpace::Srgb, false) => Self::ENCODE_SRGB,
            (ColorSpace::Linear, true) => Self::DECODE_SRGB,
        };
        Self {
            tone_mapping: match tone_mapping {
                ToneMapping::None => 0,
                ToneMapping::AcesFilmic => 1,
            },
            output_mode,
            exposure: 1.0,
            _padding: 0,
        }
    }

    pub fn output_mode(&self) -> u32 {
        self.output_mode
    }
}

pub struct LightResources {
    pub uniform: LightUniform,
    pub buffer: wgpu::Buffer,
    pub output_buffer: wgpu::Buffer,
    pub bind_group: wgpu::BindGroup,
    pub bind_group_layout: wgpu::BindGroupLayout,
}

impl LightResources {
    pub fn new(device: &wgpu::Device, uniform: LightUniform, output: OutputUniform) -> Self {
        let buffer = mk_buffer(device, "Light Buffer", bytemuck::cast_slice(&[uniform]));
        let output_buffer = mk_buffer(device, "Output Buffer", bytemuck::cast_slice(&[output]));
        let bind_group_layout = mk_bind_group_layout(device);
        let bind_group = mk_bind_group(device, &bind_group_layout, &buffer, &output_buffer);
        Self {
            uniform,
            buffer,
            output_buffer,
            bind_group,
            bind_group_layout,
        }
    }

    /// Uploads `uniform` if it differs from what the GPU has.
    pub fn update(&mut self, queue: &wgpu::Queue, uniform: LightUniform) {
        if uniform != self.uniform {
            self.uniform = uniform;
            queue.write_buffer(&self.buffer, 0, bytemuck::cast_slice(&[uniform]));
        }
    }
}

fn mk_buffer(device: &wgpu::Device, label: &str, contents: &[u8]) -> wgpu::Buffer {
    device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some(label),
        contents,
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
    })
}

fn uniform_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

pub fn mk_bind_group_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        entries: &[uniform_entry(0), uniform_entry(1)],
        label: Some("light_bind_group_layout"),
    })
}

pub fn mk_bind_group(
    device: &wgpu::Device,
    bind_group_layout: &wgpu::BindGroupLayout,
    light_buffer: &wgpu::Buffer,
    output_buffer: &wgpu::Buffer,
) -> wgpu::BindGroup {
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        layout: bind_group_layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: light_buffer.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: output_buffer.as_entire_binding(),
            },
        ],
        label: Some("light_bind_group"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_structures::scene_graph::Color;

    #[test]
    fn lights_fold_into_one_uniform() {
        let uniform = LightUniform::from_lights(&[
            Light::Ambient {
                color: Color::WHITE,
                intensity: 0.8,
            },
            Light::Directional {
                color: Color::WHITE,
                intensity: 1.5,
                position: [0.0, 10.0, 0.0].into(),
            },
        ]);
        let close = |a: [f32; 3], b: f32| a.iter().all(|c| (c - b).abs() < 1e-5);
        assert!(close(uniform.ambient, 0.8));
        assert!(close(uniform.directional, 1.5));
        assert_eq!(uniform.direction, [0.0, 1.0, 0.0]);
    }

    #[test]
    fn output_mode_depends_on_surface() {
        let srgb_on_srgb = OutputUniform::new(ToneMapping::AcesFilmic, ColorSpace::Srgb, true);
        let srgb_on_plain = OutputUniform::new(ToneMapping::AcesFilmic, ColorSpace::Srgb, false);
        let linear_on_srgb = OutputUniform::new(ToneMapping::None, ColorSpace::Linear, true);
        let linear_on_plain = OutputUniform::new(ToneMapping::None, ColorSpace::Linear, false);
        assert_eq!(srgb_on_srgb.output_mode(), OutputUniform::PASSTHROUGH);
        assert_eq!(srgb_on_plain.output_mode(), OutputUniform::ENCODE_SRGB);
        assert_eq!(linear_on_srgb.output_mode(), OutputUniform::DECODE_SRGB);
        assert_eq!(linear_on_plain.output_mode(), OutputUniform::PASSTHROUGH);
    }
}
