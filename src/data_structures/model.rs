//! Geometry and material definitions shared by the loaders and the renderer.

use std::sync::Arc;

use cgmath::InnerSpace;

use crate::data_structures::texture::TextureSlot;

pub trait Vertex {
    fn desc() -> wgpu::VertexBufferLayout<'static>;
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ModelVertex {
    pub position: [f32; 3],
    pub tex_coords: [f32; 2],
    pub normal: [f32; 3],
    pub tangent: [f32; 3],
    pub bitangent: [f32; 3],
}

impl Vertex for ModelVertex {
    fn desc() -> wgpu::VertexBufferLayout<'static> {
        use std::mem;
        wgpu::VertexBufferLayout {
            array_stride: mem::size_of::<ModelVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[
                wgpu::VertexAttribute {
                    offset: 0,
                    shader_location: 0,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 3]>() as wgpu::BufferAddress,
                    shader_location: 1,
                    format: wgpu::VertexFormat::Float32x2,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 5]>() as wgpu::BufferAddress,
                    shader_location: 2,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 8]>() as wgpu::BufferAddress,
                    shader_location: 3,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 11]>() as wgpu::BufferAddress,
                    shader_location: 4,
                    format: wgpu::VertexFormat::Float32x3,
                },
            ],
        }
    }
}

/// CPU copy of an indexed triangle list. Uploaded lazily by the renderer.
#[derive(Debug, Default)]
pub struct Geometry {
    pub name: String,
    pub vertices: Vec<ModelVertex>,
    pub indices: Vec<u32>,
}

impl Geometry {
    pub fn new(name: impl Into<String>, vertices: Vec<ModelVertex>, indices: Vec<u32>) -> Self {
        Self {
            name: name.into(),
            vertices,
            indices,
        }
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }
}

/// A physically based surface description.
///
/// Materials are shared through `Arc`; two meshes use "the same material"
/// exactly when their `Arc`s point to the same allocation.
#[derive(Debug)]
pub struct Material {
    pub name: String,
    /// Linear RGBA multiplier applied to the colour map.
    pub base_color: [f32; 4],
    pub color_map: Option<Arc<TextureSlot>>,
    pub normal_map: Option<Arc<TextureSlot>>,
    pub roughness: f32,
    pub metalness: f32,
}

impl Material {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_color: [1.0; 4],
            color_map: None,
            normal_map: None,
            roughness: 1.0,
            metalness: 0.0,
        }
    }

    pub fn with_maps(
        name: impl Into<String>,
        color_map: Arc<TextureSlot>,
        normal_map: Arc<TextureSlot>,
    ) -> Self {
        Self {
            color_map: Some(color_map),
            normal_map: Some(normal_map),
            ..Self::new(name)
        }
    }
}

impl Default for Material {
    fn default() -> Self {
        Self::new("default")
    }
}

/// Fills in smooth vertex normals by accumulating face normals.
///
/// Used when a file carries no normals at all.
pub fn compute_normals(vertices: &mut [ModelVertex], indices: &[u32]) {
    let mut accumulated = vec![cgmath::Vector3::new(0.0f32, 0.0, 0.0); vertices.len()];
    for c in indices.chunks_exact(3) {
        let (i0, i1, i2) = (c[0] as usize, c[1] as usize, c[2] as usize);
        if i0 >= vertices.len() || i1 >= vertices.len() || i2 >= vertices.len() {
            continue;
        }
        let p0: cgmath::Vector3<f32> = vertices[i0].position.into();
        let p1: cgmath::Vector3<f32> = vertices[i1].position.into();
        let p2: cgmath::Vector3<f32> = vertices[i2].position.into();
        // Not normalized so larger faces weigh more
        let face = (p1 - p0).cross(p2 - p0);
        accumulated[i0] += face;
        accumulated[i1] += face;
        accumulated[i2] += face;
    }
    for (vertex, normal) in vertices.iter_mut().zip(accumulated) {
        if normal.magnitude2() > f32::EPSILON {
            vertex.normal = normal.normalize().into();
        }
    }
}

/**
 * Computes per-vertex tangents and bitangents from positions and UVs so normal
 * maps work on formats that don't ship them (OBJ, most small glTFs).
 *
 * Triangles with degenerate UVs are skipped; vertices touched by no usable
 * triangle keep zero tangents.
 */
pub fn compute_tangents(vertices: &mut [ModelVertex], indices: &[u32]) {
    let mut triangles_included = vec![0u32; vertices.len()];
    let mut tangents = vec![cgmath::Vector3::new(0.0f32, 0.0, 0.0); vertices.len()];
    let mut bitangents = tangents.clone();

    // Loop through the indices in chunks of 3 (one triangle each)
    for c in indices.chunks_exact(3) {
        let (i0, i1, i2) = (c[0] as usize, c[1] as usize, c[2] as usize);
        if i0 >= vertices.len() || i1 >= vertices.len() || i2 >= vertices.len() {
            continue;
        }
        let v0 = vertices[i0];
        let v1 = vertices[i1];
        let v2 = vertices[i2];

        let pos0: cgmath::Vector3<_> = v0.position.into();
        let pos1: cgmath::Vector3<_> = v1.position.into();
        let pos2: cgmath::Vector3<_> = v2.position.into();

        let uv0: cgmath::Vector2<_> = v0.tex_coords.into();
        let uv1: cgmath::Vector2<_> = v1.tex_coords.into();
        let uv2: cgmath::Vector2<_> = v2.tex_coords.into();

        // Edges of the triangle in position and UV space
        let delta_pos1 = pos1 - pos0;
        let delta_pos2 = pos2 - pos0;
        let delta_uv1 = uv1 - uv0;
        let delta_uv2 = uv2 - uv0;

        // Solving:
        //     delta_pos1 = delta_uv1.x * T + delta_uv1.y * B
        //     delta_pos2 = delta_uv2.x * T + delta_uv2.y * B
        let r = 1.0 / (delta_uv1.x * delta_uv2.y - delta_uv1.y * delta_uv2.x);
        if !r.is_finite() {
            continue;
        }
        let tangent = (delta_pos1 * delta_uv2.y - delta_pos2 * delta_uv1.y) * r;
        // Flipped to get right-handed normal maps with the wgpu texture coordinate system
        let bitangent = (delta_pos2 * delta_uv1.x - delta_pos1 * delta_uv2.x) * -r;

        for i in [i0, i1, i2] {
            tangents[i] += tangent;
            bitangents[i] += bitangent;
            triangles_included[i] += 1;
        }
    }

    // Average the tangents/bitangents
    for (i, n) in triangles_included.into_iter().enumerate() {
        if n == 0 {
            continue;
        }
        let denom = 1.0 / n as f32;
        vertices[i].tangent = (tangents[i] * denom).into();
        vertices[i].bitangent = (bitangents[i] * denom).into();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad() -> (Vec<ModelVertex>, Vec<u32>) {
        let vertex = |position: [f32; 3], tex_coords: [f32; 2]| ModelVertex {
            position,
            tex_coords,
            ..Default::default()
        };
        (
            vec![
                vertex([0.0, 0.0, 0.0], [0.0, 1.0]),
                vertex([1.0, 0.0, 0.0], [1.0, 1.0]),
                vertex([1.0, 1.0, 0.0], [1.0, 0.0]),
                vertex([0.0, 1.0, 0.0], [0.0, 0.0]),
            ],
            vec![0, 1, 2, 0, 2, 3],
        )
    }

    #[test]
    fn normals_of_flat_quad_face_forward() {
        let (mut vertices, indices) = quad();
        compute_normals(&mut vertices, &indices);
        for v in &vertices {
            assert_eq!(v.normal, [0.0, 0.0, 1.0]);
        }
    }

    #[test]
    fn tangents_follow_u_axis() {
        let (mut vertices, indices) = quad();
        compute_tangents(&mut vertices, &indices);
        for v in &vertices {
            assert!((v.tangent[0] - 1.0).abs() < 1e-5, "{:?}", v.tangent);
            assert!(v.tangent[1].abs() < 1e-5);
        }
    }

    #[test]
    fn degenerate_uvs_leave_tangents_untouched() {
        let (mut vertices, indices) = quad();
        vertices.iter_mut().for_each(|v| v.tex_coords = [0.5, 0.5]);
        compute_tangents(&mut vertices, &indices);
        assert!(vertices.iter().all(|v| v.tangent == [0.0; 3]));
    }

    #[test]
    fn default_material_is_rough_dielectric() {
        let material = Material::default();
        assert_eq!(material.roughness, 1.0);
        assert_eq!(material.metalness, 0.0);
        assert!(material.color_map.is_none());
    }
}
