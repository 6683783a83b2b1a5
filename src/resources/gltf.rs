use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use anyhow::{Context, Result, bail};

use crate::{
    data_structures::{
        instance::Instance,
        model::{self, Geometry, Material, ModelVertex},
        scene_graph::{Mesh, Node, NodeKind},
        texture::TextureSlot,
    },
    resources::{AssetSource, sibling, texture},
};

/**
 * Loads a glTF (binary or JSON) into a single group node holding the
 * document's default scene.
 *
 * Geometry, UVs and materials come from the file and are used as-is.
 * External buffers and images are fetched next to the model through
 * `source`; `data:` URIs are not supported.
 */
pub async fn load_gltf<S>(source: &S, file_name: &str, bytes: &[u8]) -> Result<Node>
where
    S: AssetSource + ?Sized,
{
    let ::gltf::Gltf { document, mut blob } =
        ::gltf::Gltf::from_slice(bytes).context("not a valid glTF document")?;

    // Load buffers
    let mut buffer_data: Vec<Vec<u8>> = Vec::new();
    for buffer in document.buffers() {
        match buffer.source() {
            ::gltf::buffer::Source::Bin => {
                let bin = blob.take().context("GLB references a missing binary chunk")?;
                buffer_data.push(bin);
            }
            ::gltf::buffer::Source::Uri(uri) if uri.starts_with("data:") => {
                bail!("buffer {} uses an embedded data URI", buffer.index());
            }
            ::gltf::buffer::Source::Uri(uri) => {
                let bin = source.fetch(&sibling(file_name, uri), &mut |_| {}).await?;
                buffer_data.push(bin);
            }
        }
    }

    // Load image bytes that live outside the buffers
    let mut external_images: HashMap<usize, (Vec<u8>, Option<String>)> = HashMap::new();
    for image in document.images() {
        if let ::gltf::image::Source::Uri { uri, mime_type } = image.source() {
            if uri.starts_with("data:") {
                log::warn!("{file_name}: image {} uses a data URI, skipped", image.index());
                continue;
            }
            match source.fetch(&sibling(file_name, uri), &mut |_| {}).await {
                Ok(bin) => {
                    external_images.insert(image.index(), (bin, mime_type.map(str::to_string)));
                }
                Err(e) => log::error!("{file_name}: image {uri} could not be fetched: {e:?}"),
            }
        }
    }

    let images = decode_images(&document, &buffer_data, &external_images, file_name);
    let materials = build_materials(&document, &images);
    let default_material = Arc::new(Material::default());
    let meshes = build_meshes(&document, &buffer_data, &materials, &default_material)?;

    let scene = document
        .default_scene()
        .or_else(|| document.scenes().next())
        .context("document contains no scene")?;
    let mut ancestors = HashSet::new();
    let children = scene
        .nodes()
        .map(|node| to_scene_node(node, &meshes, &mut ancestors))
        .collect::<Result<Vec<_>>>()?;
    let name = scene.name().unwrap_or(file_name);

    Ok(Node::group(name, children))
}

/// Decoded images by index. Images that fail to decode get a slot that
/// never fills, which renders with neutral defaults.
fn decode_images(
    document: &::gltf::Document,
    buffer_data: &[Vec<u8>],
    external_images: &HashMap<usize, (Vec<u8>, Option<String>)>,
    file_name: &str,
) -> Vec<Arc<TextureSlot>> {
    document
        .images()
        .map(|image| {
            let label = image
                .name()
                .map(str::to_string)
                .unwrap_or_else(|| format!("{file_name} image {}", image.index()));
            let decoded = match image.source() {
                ::gltf::image::Source::View { view, mime_type } => buffer_data
                    .get(view.buffer().index())
                    .and_then(|buffer| buffer.get(view.offset()..view.offset() + view.length()))
                    .context("image view out of bounds")
                    .and_then(|bytes| texture::decode(bytes, Some(mime_type))),
                ::gltf::image::Source::Uri { .. } => external_images
                    .get(&image.index())
                    .context("image was not fetched")
                    .and_then(|(bytes, mime)| texture::decode(bytes, mime.as_deref())),
            };
            match decoded {
                Ok(rgba) => Arc::new(TextureSlot::ready(label, rgba)),
                Err(e) => {
                    log::error!("{label} could not be decoded: {e:?}");
                    Arc::new(TextureSlot::pending(label))
                }
            }
        })
        .collect()
}

fn build_materials(
    document: &::gltf::Document,
    images: &[Arc<TextureSlot>],
) -> Vec<Arc<Material>> {
    let image_of = |texture: ::gltf::Texture| images.get(texture.source().index()).cloned();
    document
        .materials()
        .enumerate()
        .map(|(idx, material)| {
            let pbr = material.pbr_metallic_roughness();
            Arc::new(Material {
                name: material
                    .name()
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("material {idx}")),
                base_color: pbr.base_color_factor(),
                color_map: pbr.base_color_texture().and_then(|info| image_of(info.texture())),
                normal_map: material
                    .normal_texture()
                    .and_then(|normal| image_of(normal.texture())),
                roughness: pbr.roughness_factor(),
                metalness: pbr.metallic_factor(),
            })
        })
        .collect()
}

/// One entry per glTF mesh, one `(geometry, material)` pair per primitive.
type MeshPrimitives = Vec<(Arc<Geometry>, Arc<Material>)>;

fn build_meshes(
    document: &::gltf::Document,
    buffer_data: &[Vec<u8>],
    materials: &[Arc<Material>],
    default_material: &Arc<Material>,
) -> Result<Vec<MeshPrimitives>> {
    let mut meshes = Vec::new();
    for mesh in document.meshes() {
        let mesh_name = mesh
            .name()
            .map(str::to_string)
            .unwrap_or_else(|| format!("mesh {}", mesh.index()));
        let mut primitives = Vec::new();
        for primitive in mesh.primitives() {
            if primitive.mode() != ::gltf::mesh::Mode::Triangles {
                log::warn!(
                    "{mesh_name}: primitive {} is {:?}, only triangles are drawn",
                    primitive.index(),
                    primitive.mode()
                );
                continue;
            }
            let reader = primitive.reader(|buffer| buffer_data.get(buffer.index()).map(Vec::as_slice));

            let Some(positions) = reader.read_positions() else {
                log::warn!("{mesh_name}: primitive {} has no positions", primitive.index());
                continue;
            };
            let mut vertices: Vec<ModelVertex> = positions
                .map(|position| ModelVertex {
                    position,
                    ..Default::default()
                })
                .collect();

            let has_normals = match reader.read_normals() {
                Some(normals) => {
                    vertices.iter_mut().zip(normals).for_each(|(v, n)| v.normal = n);
                    true
                }
                None => false,
            };
            if let Some(tex_coords) = reader.read_tex_coords(0) {
                vertices
                    .iter_mut()
                    .zip(tex_coords.into_f32())
                    .for_each(|(v, uv)| v.tex_coords = uv);
            }

            let indices: Vec<u32> = match reader.read_indices() {
                Some(indices) => indices.into_u32().collect(),
                None => (0..vertices.len() as u32).collect(),
            };
            if indices.iter().any(|&i| i as usize >= vertices.len()) {
                bail!("{mesh_name}: primitive {} indexes past its vertices", primitive.index());
            }

            if !has_normals {
                model::compute_normals(&mut vertices, &indices);
            }
            match reader.read_tangents() {
                Some(tangents) => {
                    vertices.iter_mut().zip(tangents).for_each(|(v, tangent)| {
                        // glTF tangents are vec4, w holds the bitangent sign
                        let tangent: cgmath::Vector4<f32> = tangent.into();
                        let normal: cgmath::Vector3<f32> = v.normal.into();
                        v.tangent = tangent.truncate().into();
                        v.bitangent = (normal.cross(tangent.truncate()) * tangent.w).into();
                    });
                }
                None => model::compute_tangents(&mut vertices, &indices),
            }

            let material = primitive
                .material()
                .index()
                .and_then(|idx| materials.get(idx))
                .unwrap_or(default_material)
                .clone();
            let geometry = Geometry::new(mesh_name.clone(), vertices, indices);
            primitives.push((Arc::new(geometry), material));
        }
        meshes.push(primitives);
    }
    Ok(meshes)
}

/// Converts `node` and its subtree. `ancestors` holds the indices on the
/// path from the scene root; meeting one of them again is a cycle.
fn to_scene_node(
    node: ::gltf::Node,
    meshes: &[MeshPrimitives],
    ancestors: &mut HashSet<usize>,
) -> Result<Node> {
    if !ancestors.insert(node.index()) {
        bail!("node {} is its own ancestor", node.index());
    }
    let name = node.name().map(str::to_string);
    let primitives = node.mesh().and_then(|mesh| meshes.get(mesh.index()));
    let (kind, mut children) = match primitives {
        // A single primitive becomes the node itself
        Some(primitives) if primitives.len() == 1 => {
            let (geometry, material) = &primitives[0];
            (
                NodeKind::Mesh(Mesh {
                    geometry: geometry.clone(),
                    material: material.clone(),
                }),
                Vec::new(),
            )
        }
        // Several primitives hang below a group, one mesh node each
        Some(primitives) => (
            NodeKind::Group,
            primitives
                .iter()
                .enumerate()
                .map(|(idx, (geometry, material))| {
                    let prim_name = format!("{} primitive {idx}", name.as_deref().unwrap_or("mesh"));
                    Node::mesh(prim_name, geometry.clone(), material.clone())
                })
                .collect(),
        ),
        None if node.camera().is_some() => (NodeKind::Other, Vec::new()),
        None => (NodeKind::Group, Vec::new()),
    };

    for child in node.children() {
        children.push(to_scene_node(child, meshes, ancestors)?);
    }
    ancestors.remove(&node.index());

    Ok(Node {
        name,
        transform: Instance::from(node.transform().decomposed()),
        kind,
        children,
    })
}

#[cfg(test)]
mod tests {
    use std::{io::Cursor, sync::Mutex};

    use futures::executor::block_on;

    use super::*;
    use crate::resources::{LoadFuture, ProgressFn};

    struct NoFiles;

    impl AssetSource for NoFiles {
        fn fetch<'a>(
            &'a self,
            path: &'a str,
            _progress: ProgressFn<'a>,
        ) -> LoadFuture<'a, Result<Vec<u8>>> {
            Box::pin(async move { bail!("{path} does not exist") })
        }
    }

    /// In-memory files that remember what was asked for.
    #[derive(Default)]
    struct Files {
        files: HashMap<String, Vec<u8>>,
        fetched: Mutex<Vec<String>>,
    }

    impl Files {
        fn with(mut self, path: &str, bytes: Vec<u8>) -> Self {
            self.files.insert(path.to_string(), bytes);
            self
        }

        fn fetched(&self) -> Vec<String> {
            self.fetched.lock().unwrap().clone()
        }
    }

    impl AssetSource for Files {
        fn fetch<'a>(
            &'a self,
            path: &'a str,
            _progress: ProgressFn<'a>,
        ) -> LoadFuture<'a, Result<Vec<u8>>> {
            Box::pin(async move {
                self.fetched.lock().unwrap().push(path.to_string());
                self.files
                    .get(path)
                    .cloned()
                    .with_context(|| format!("{path} does not exist"))
            })
        }
    }

    /// Positions, normals, tangents and u16 indices of one triangle.
    const BIN_LEN: usize = 128;

    fn triangle_bin() -> Vec<u8> {
        let mut bin = Vec::with_capacity(BIN_LEN);
        let mut floats = |values: &[f32]| {
            for v in values {
                bin.extend_from_slice(&v.to_le_bytes());
            }
        };
        floats(&[0.0f32, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0]);
        floats(&[0.0f32, 0.0, 1.0].repeat(3));
        floats(&[1.0f32, 0.0, 0.0, -1.0].repeat(3));
        for index in [0u16, 1, 2] {
            bin.extend_from_slice(&index.to_le_bytes());
        }
        bin.resize(BIN_LEN, 0);
        bin
    }

    /// A document over `triangle_bin`, optionally followed by an image
    /// of `image_len` bytes. `tail` adds further top-level members.
    fn document(
        buffer: &str,
        meshes: &str,
        nodes: &str,
        tail: &str,
        image_len: Option<usize>,
    ) -> String {
        let image_view = image_len
            .map(|len| format!(r#", {{ "buffer": 0, "byteOffset": {BIN_LEN}, "byteLength": {len} }}"#))
            .unwrap_or_default();
        format!(
            r#"{{
            "asset": {{ "version": "2.0" }},
            "scene": 0,
            "scenes": [{{ "nodes": [0] }}],
            "nodes": {nodes},
            "meshes": {meshes},
            "buffers": [{buffer}],
            "bufferViews": [
                {{ "buffer": 0, "byteOffset": 0, "byteLength": 36 }},
                {{ "buffer": 0, "byteOffset": 36, "byteLength": 36 }},
                {{ "buffer": 0, "byteOffset": 72, "byteLength": 48 }},
                {{ "buffer": 0, "byteOffset": 120, "byteLength": 6 }}
                {image_view}
            ],
            "accessors": [
                {{ "bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3",
                   "min": [0.0, 0.0, 0.0], "max": [1.0, 1.0, 0.0] }},
                {{ "bufferView": 1, "componentType": 5126, "count": 3, "type": "VEC3" }},
                {{ "bufferView": 2, "componentType": 5126, "count": 3, "type": "VEC4" }},
                {{ "bufferView": 3, "componentType": 5123, "count": 3, "type": "SCALAR" }}
            ]
            {tail}
        }}"#
        )
    }

    const TRIANGLE: &str = r#"{ "attributes": { "POSITION": 0, "NORMAL": 1 }, "indices": 3 }"#;
    const ONE_NODE: &str = r#"[{ "name": "Tri", "mesh": 0 }]"#;

    fn glb(json: &str, mut bin: Vec<u8>) -> Vec<u8> {
        let mut json = json.as_bytes().to_vec();
        while json.len() % 4 != 0 {
            json.push(b' ');
        }
        while bin.len() % 4 != 0 {
            bin.push(0);
        }
        let total = 12 + 8 + json.len() + 8 + bin.len();
        let mut out = Vec::with_capacity(total);
        out.extend_from_slice(b"glTF");
        out.extend_from_slice(&2u32.to_le_bytes());
        out.extend_from_slice(&(total as u32).to_le_bytes());
        out.extend_from_slice(&(json.len() as u32).to_le_bytes());
        out.extend_from_slice(b"JSON");
        out.extend_from_slice(&json);
        out.extend_from_slice(&(bin.len() as u32).to_le_bytes());
        out.extend_from_slice(b"BIN\0");
        out.extend_from_slice(&bin);
        out
    }

    fn png(rgba: [u8; 4]) -> Vec<u8> {
        let img = image::RgbaImage::from_pixel(2, 2, image::Rgba(rgba));
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        bytes
    }

    fn only_mesh(node: &Node) -> &Mesh {
        let mut found = None;
        node.traverse(&mut |n| {
            if let Some(mesh) = n.as_mesh() {
                found = Some(mesh);
            }
        });
        found.unwrap()
    }

    #[test]
    fn rejects_non_gltf_bytes() {
        assert!(block_on(load_gltf(&NoFiles, "broken.glb", b"nope")).is_err());
    }

    #[test]
    fn missing_external_buffer_fails_the_load() {
        let json = r#"{
            "asset": { "version": "2.0" },
            "buffers": [{ "uri": "missing.bin", "byteLength": 4 }],
            "nodes": [{}],
            "scenes": [{ "nodes": [0] }],
            "scene": 0
        }"#;
        assert!(block_on(load_gltf(&NoFiles, "models/a.gltf", json.as_bytes())).is_err());
    }

    #[test]
    fn empty_scene_yields_empty_group() {
        let json = r#"{
            "asset": { "version": "2.0" },
            "scenes": [{ "name": "Stage", "nodes": [0] }],
            "nodes": [{ "name": "Empty", "translation": [1.0, 2.0, 3.0] }],
            "scene": 0
        }"#;
        let node = block_on(load_gltf(&NoFiles, "a.gltf", json.as_bytes())).unwrap();
        assert_eq!(node.name.as_deref(), Some("Stage"));
        assert_eq!(node.children.len(), 1);
        assert!(matches!(node.children[0].kind, NodeKind::Group));
        assert_eq!(node.children[0].transform.position, cgmath::Vector3::new(1.0, 2.0, 3.0));
        assert_eq!(node.mesh_count(), 0);
    }

    #[test]
    fn node_cycle_fails_the_load() {
        let json = r#"{
            "asset": { "version": "2.0" },
            "scenes": [{ "nodes": [0] }],
            "nodes": [{ "children": [1] }, { "children": [0] }],
            "scene": 0
        }"#;
        let err = block_on(load_gltf(&NoFiles, "loop.gltf", json.as_bytes())).unwrap_err();
        assert!(err.to_string().contains("own ancestor"));
    }

    #[test]
    fn external_buffer_is_read_next_to_the_model() {
        let json = document(
            &format!(r#"{{ "uri": "tri.bin", "byteLength": {BIN_LEN} }}"#),
            &format!(r#"[{{ "primitives": [{TRIANGLE}] }}]"#),
            ONE_NODE,
            "",
            None,
        );
        let source = Files::default().with("models/tri.bin", triangle_bin());

        let node = block_on(load_gltf(&source, "models/tri.gltf", json.as_bytes())).unwrap();
        assert_eq!(source.fetched(), vec!["models/tri.bin".to_string()]);
        assert_eq!(node.mesh_count(), 1);
        let mesh = only_mesh(&node);
        assert_eq!(mesh.geometry.triangle_count(), 1);
        assert_eq!(mesh.geometry.vertices[1].position, [1.0, 0.0, 0.0]);
    }

    #[test]
    fn embedded_image_fills_the_colour_map() {
        let image = png([10, 20, 30, 255]);
        let json = document(
            &format!(r#"{{ "byteLength": {} }}"#, BIN_LEN + image.len()),
            r#"[{ "primitives": [{ "attributes": { "POSITION": 0, "NORMAL": 1 }, "indices": 3, "material": 0 }] }]"#,
            ONE_NODE,
            r#",
            "images": [{ "bufferView": 4, "mimeType": "image/png" }],
            "textures": [{ "source": 0 }],
            "materials": [{ "pbrMetallicRoughness": { "baseColorTexture": { "index": 0 } } }]"#,
            Some(image.len()),
        );
        let mut bin = triangle_bin();
        bin.extend_from_slice(&image);

        let node = block_on(load_gltf(&NoFiles, "tex.glb", &glb(&json, bin))).unwrap();
        let slot = only_mesh(&node).material.color_map.clone().unwrap();
        assert!(slot.is_ready());
        assert_eq!(slot.image().unwrap().get_pixel(1, 1), &image::Rgba([10, 20, 30, 255]));
    }

    #[test]
    fn data_uri_images_are_skipped() {
        let json = document(
            &format!(r#"{{ "byteLength": {BIN_LEN} }}"#),
            r#"[{ "primitives": [{ "attributes": { "POSITION": 0, "NORMAL": 1 }, "indices": 3, "material": 0 }] }]"#,
            ONE_NODE,
            r#",
            "images": [{ "uri": "data:image/png;base64,AAAA" }],
            "textures": [{ "source": 0 }],
            "materials": [{ "pbrMetallicRoughness": { "baseColorTexture": { "index": 0 } } }]"#,
            None,
        );
        let source = Files::default();

        let node = block_on(load_gltf(&source, "inline.glb", &glb(&json, triangle_bin()))).unwrap();
        assert!(source.fetched().is_empty());
        let slot = only_mesh(&node).material.color_map.clone().unwrap();
        assert!(!slot.is_ready());
    }

    #[test]
    fn primitives_split_into_meshes_and_non_triangles_are_dropped() {
        let points = r#"{ "attributes": { "POSITION": 0 }, "mode": 0 }"#;
        let json = document(
            &format!(r#"{{ "byteLength": {BIN_LEN} }}"#),
            &format!(
                r#"[{{ "primitives": [{points}, {TRIANGLE}] }}, {{ "primitives": [{TRIANGLE}, {TRIANGLE}] }}]"#
            ),
            r#"[{ "name": "Single", "mesh": 0, "children": [1] }, { "name": "Double", "mesh": 1 }]"#,
            "",
            None,
        );

        let node = block_on(load_gltf(&NoFiles, "split.glb", &glb(&json, triangle_bin()))).unwrap();
        let single = &node.children[0];
        assert!(matches!(single.kind, NodeKind::Mesh(_)));
        assert_eq!(single.children.len(), 1);

        let double = &single.children[0];
        assert!(matches!(double.kind, NodeKind::Group));
        assert_eq!(double.children.len(), 2);
        assert!(double.children.iter().all(|child| child.as_mesh().is_some()));
        assert_eq!(node.mesh_count(), 3);
    }

    #[test]
    fn file_tangents_take_precedence() {
        let json = document(
            &format!(r#"{{ "byteLength": {BIN_LEN} }}"#),
            r#"[{ "primitives": [{ "attributes": { "POSITION": 0, "NORMAL": 1, "TANGENT": 2 }, "indices": 3 }] }]"#,
            ONE_NODE,
            "",
            None,
        );

        let node = block_on(load_gltf(&NoFiles, "tangent.glb", &glb(&json, triangle_bin()))).unwrap();
        let vertex = only_mesh(&node).geometry.vertices[0];
        assert_eq!(vertex.tangent, [1.0, 0.0, 0.0]);
        // n x t flipped by w = -1
        assert_eq!(vertex.bitangent, [0.0, -1.0, 0.0]);
    }
}
