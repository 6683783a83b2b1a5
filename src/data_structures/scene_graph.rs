//! Scene graph and hierarchical scene organization.
//!
//! The [`Scene`] is the root container of everything that is rendered or
//! lights a frame. Loaded models arrive as a [`Node`] subtree whose nodes are
//! tagged with a [`NodeKind`], so code that cares about meshes matches on
//! the kind instead of probing capabilities at runtime.

use std::sync::Arc;

use cgmath::{Matrix4, SquareMatrix};

use crate::data_structures::{
    instance::Instance,
    model::{Geometry, Material},
};

/// An RGB colour with components in `0.0..=1.0`, stored as authored (sRGB).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Color {
    pub const WHITE: Color = Color {
        r: 1.0,
        g: 1.0,
        b: 1.0,
    };

    pub fn from_hex(hex: u32) -> Self {
        let channel = |shift: u32| ((hex >> shift) & 0xff) as f32 / 255.0;
        Self {
            r: channel(16),
            g: channel(8),
            b: channel(0),
        }
    }

    /// Converts the sRGB-encoded components to linear light.
    pub fn to_linear(self) -> Self {
        let decode = |c: f32| {
            if c <= 0.04045 {
                c / 12.92
            } else {
                ((c + 0.055) / 1.055).powf(2.4)
            }
        };
        Self {
            r: decode(self.r),
            g: decode(self.g),
            b: decode(self.b),
        }
    }

    pub fn to_array(self) -> [f32; 3] {
        [self.r, self.g, self.b]
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Light {
    /// Uniform, non-directional light.
    Ambient { color: Color, intensity: f32 },
    /// Parallel light shining from `position` towards the origin.
    Directional {
        color: Color,
        intensity: f32,
        position: cgmath::Vector3<f32>,
    },
}

impl Light {
    pub fn intensity(&self) -> f32 {
        match self {
            Light::Ambient { intensity, .. } | Light::Directional { intensity, .. } => *intensity,
        }
    }
}

#[derive(Debug)]
pub struct Mesh {
    pub geometry: Arc<Geometry>,
    pub material: Arc<Material>,
}

#[derive(Debug)]
pub enum NodeKind {
    Mesh(Mesh),
    /// Pure transform node.
    Group,
    /// Anything else a file may contain (cameras, lights, skins); kept so the
    /// hierarchy and transforms survive but never drawn.
    Other,
}

#[derive(Debug)]
pub struct Node {
    pub name: Option<String>,
    pub transform: Instance,
    pub kind: NodeKind,
    pub children: Vec<Node>,
}

impl Node {
    pub fn group(name: impl Into<String>, children: Vec<Node>) -> Self {
        Self {
            name: Some(name.into()),
            transform: Instance::default(),
            kind: NodeKind::Group,
            children,
        }
    }

    pub fn mesh(name: impl Into<String>, geometry: Arc<Geometry>, material: Arc<Material>) -> Self {
        Self {
            name: Some(name.into()),
            transform: Instance::default(),
            kind: NodeKind::Mesh(Mesh { geometry, material }),
            children: Vec::new(),
        }
    }

    pub fn as_mesh(&self) -> Option<&Mesh> {
        match &self.kind {
            NodeKind::Mesh(mesh) => Some(mesh),
            NodeKind::Group | NodeKind::Other => None,
        }
    }

    /// Visits `self` and every descendant, parents before children.
    pub fn traverse<'a>(&'a self, visit: &mut dyn FnMut(&'a Node)) {
        visit(self);
        for child in &self.children {
            child.traverse(visit);
        }
    }

    pub fn traverse_mut(&mut self, visit: &mut dyn FnMut(&mut Node)) {
        visit(self);
        for child in &mut self.children {
            child.traverse_mut(visit);
        }
    }

    /// Points every mesh in the subtree at `material`. Returns how many
    /// meshes were rebound; groups and other nodes are left alone.
    pub fn bind_material(&mut self, material: &Arc<Material>) -> usize {
        let mut rebound = 0;
        self.traverse_mut(&mut |node| match &mut node.kind {
            NodeKind::Mesh(mesh) => {
                mesh.material = Arc::clone(material);
                rebound += 1;
            }
            NodeKind::Group | NodeKind::Other => {}
        });
        rebound
    }

    pub fn mesh_count(&self) -> usize {
        let mut count = 0;
        self.traverse(&mut |node| {
            if node.as_mesh().is_some() {
                count += 1;
            }
        });
        count
    }

    fn collect_meshes<'a>(
        &'a self,
        parent: Matrix4<f32>,
        out: &mut Vec<(Matrix4<f32>, &'a Mesh)>,
    ) {
        let world = parent * self.transform.to_matrix();
        if let NodeKind::Mesh(mesh) = &self.kind {
            out.push((world, mesh));
        }
        for child in &self.children {
            child.collect_meshes(world, out);
        }
    }
}

/// Root of everything drawn in a frame.
#[derive(Debug)]
pub struct Scene {
    pub background: Color,
    lights: Vec<Light>,
    children: Vec<Node>,
    revision: u64,
}

impl Scene {
    pub fn new(background: Color) -> Self {
        Self {
            background,
            lights: Vec::new(),
            children: Vec::new(),
            revision: 0,
        }
    }

    pub fn add(&mut self, node: Node) {
        self.children.push(node);
        self.revision += 1;
    }

    pub fn add_light(&mut self, light: Light) {
        self.lights.push(light);
        self.revision += 1;
    }

    pub fn children(&self) -> &[Node] {
        &self.children
    }

    pub fn lights(&self) -> &[Light] {
        &self.lights
    }

    /// Bumped on every structural change; the renderer resyncs GPU buffers
    /// when it differs from the last one it saw.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Every mesh in the scene with its world matrix.
    pub fn meshes(&self) -> Vec<(Matrix4<f32>, &Mesh)> {
        let mut out = Vec::new();
        for child in &self.children {
            child.collect_meshes(Matrix4::identity(), &mut out);
        }
        out
    }
}
