use std::{cell::RefCell, collections::HashMap, convert::Infallible, io::Cursor, rc::Rc};

use anyhow::{Context as _, bail};
use view_ngin::{
    WindowEvent,
    camera::{Camera, CameraControls, Projection},
    data_structures::scene_graph::Scene,
    render::SceneRenderer,
    resources::{AssetSource, LoadFuture, Progress, ProgressFn},
};

/// Serves assets from memory and reports one progress step per fetch.
#[derive(Default)]
pub(crate) struct MemorySource {
    files: HashMap<String, Vec<u8>>,
    hide_total: bool,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, path: &str, bytes: impl Into<Vec<u8>>) -> Self {
        self.files.insert(path.to_string(), bytes.into());
        self
    }

    /// Behave like a transport that doesn't know the content length.
    pub fn without_total(mut self) -> Self {
        self.hide_total = true;
        self
    }
}

impl AssetSource for MemorySource {
    fn fetch<'a>(
        &'a self,
        path: &'a str,
        progress: ProgressFn<'a>,
    ) -> LoadFuture<'a, anyhow::Result<Vec<u8>>> {
        Box::pin(async move {
            let bytes = self
                .files
                .get(path)
                .with_context(|| format!("{path} not found"))?
                .clone();
            progress(Progress {
                loaded: bytes.len() as u64,
                total: (!self.hide_total).then_some(bytes.len() as u64),
            });
            Ok(bytes)
        })
    }
}

/// Every fetch fails, like a server answering 404.
pub(crate) struct FailingSource;

impl AssetSource for FailingSource {
    fn fetch<'a>(
        &'a self,
        path: &'a str,
        _progress: ProgressFn<'a>,
    ) -> LoadFuture<'a, anyhow::Result<Vec<u8>>> {
        Box::pin(async move { bail!("404 Not Found: {path}") })
    }
}

pub(crate) type CallLog = Rc<RefCell<Vec<&'static str>>>;

/// Renderer stand-in that records what the viewer asks of it.
pub(crate) struct RecordingRenderer {
    pub size: (u32, u32),
    pub log: CallLog,
    pub resizes: Vec<(u32, u32)>,
    pub meshes_drawn: usize,
}

impl RecordingRenderer {
    pub fn new(width: u32, height: u32, log: CallLog) -> Self {
        Self {
            size: (width, height),
            log,
            resizes: Vec::new(),
            meshes_drawn: 0,
        }
    }
}

impl SceneRenderer for RecordingRenderer {
    type Error = Infallible;

    fn size(&self) -> (u32, u32) {
        self.size
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.size = (width, height);
        self.resizes.push((width, height));
    }

    fn render(
        &mut self,
        scene: &Scene,
        _camera: &Camera,
        _projection: &Projection,
    ) -> Result<(), Self::Error> {
        self.log.borrow_mut().push("render");
        self.meshes_drawn = scene.meshes().len();
        Ok(())
    }
}

/// Controls stand-in that only records updates.
pub(crate) struct RecordingControls {
    pub log: CallLog,
    pub viewport: (u32, u32),
}

impl RecordingControls {
    pub fn new(log: CallLog) -> Self {
        Self {
            log,
            viewport: (0, 0),
        }
    }
}

impl CameraControls for RecordingControls {
    fn handle_window_event(&mut self, _: &WindowEvent, _: &Camera, _: &Projection) -> bool {
        false
    }

    fn set_viewport(&mut self, width: u32, height: u32) {
        self.viewport = (width, height);
    }

    fn update(&mut self, _camera: &mut Camera) -> bool {
        self.log.borrow_mut().push("update");
        false
    }
}

pub(crate) fn png(rgba: [u8; 4]) -> Vec<u8> {
    let img = image::RgbaImage::from_pixel(2, 2, image::Rgba(rgba));
    let mut bytes = Vec::new();
    img.write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
        .expect("PNG encoding of a tiny image");
    bytes
}

/// Two objects, four vertices each, no normals.
pub(crate) const TWO_QUADS_OBJ: &str = "\
o left
v -2 0 0
v -1 0 0
v -1 1 0
v -2 1 0
vt 0 0
vt 1 0
vt 1 1
vt 0 1
f 1/1 2/2 3/3 4/4
o right
v 1 0 0
v 2 0 0
v 2 1 0
v 1 1 0
f 5/1 6/2 7/3 8/4
";

/// A GLB with one triangle below a translated root node.
///
/// Scene "Stage" → node "Root" (translation 0,1,0) → node "Triangle" with
/// a mesh using material "painted" (roughness 0.25, metallic 0.5).
pub(crate) fn triangle_glb() -> Vec<u8> {
    let json = r#"{
        "asset": { "version": "2.0" },
        "scene": 0,
        "scenes": [{ "name": "Stage", "nodes": [0] }],
        "nodes": [
            { "name": "Root", "translation": [0.0, 1.0, 0.0], "children": [1] },
            { "name": "Triangle", "mesh": 0 }
        ],
        "meshes": [{
            "name": "Tri",
            "primitives": [{ "attributes": { "POSITION": 0 }, "indices": 1, "material": 0 }]
        }],
        "materials": [{
            "name": "painted",
            "pbrMetallicRoughness": {
                "baseColorFactor": [1.0, 0.5, 0.25, 1.0],
                "metallicFactor": 0.5,
                "roughnessFactor": 0.25
            }
        }],
        "buffers": [{ "byteLength": 44 }],
        "bufferViews": [
            { "buffer": 0, "byteOffset": 0, "byteLength": 36, "target": 34962 },
            { "buffer": 0, "byteOffset": 36, "byteLength": 6, "target": 34963 }
        ],
        "accessors": [
            {
                "bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3",
                "min": [0.0, 0.0, 0.0], "max": [1.0, 1.0, 0.0]
            },
            { "bufferView": 1, "componentType": 5123, "count": 3, "type": "SCALAR" }
        ]
    }"#;

    let mut bin = Vec::new();
    for position in [[0.0f32, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]] {
        for c in position {
            bin.extend_from_slice(&c.to_le_bytes());
        }
    }
    for index in [0u16, 1, 2] {
        bin.extend_from_slice(&index.to_le_bytes());
    }
    bin.resize(44, 0);

    let mut json = json.as_bytes().to_vec();
    while json.len() % 4 != 0 {
        json.push(b' ');
    }

    let total = 12 + 8 + json.len() + 8 + bin.len();
    let mut glb = Vec::with_capacity(total);
    glb.extend_from_slice(b"glTF");
    glb.extend_from_slice(&2u32.to_le_bytes());
    glb.extend_from_slice(&(total as u32).to_le_bytes());
    glb.extend_from_slice(&(json.len() as u32).to_le_bytes());
    glb.extend_from_slice(b"JSON");
    glb.extend_from_slice(&json);
    glb.extend_from_slice(&(bin.len() as u32).to_le_bytes());
    glb.extend_from_slice(b"BIN\0");
    glb.extend_from_slice(&bin);
    glb
}
