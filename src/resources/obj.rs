use std::{
    io::{BufReader, Cursor},
    sync::Arc,
};

use anyhow::Result;

use crate::data_structures::{
    model::{self, Geometry, Material},
    scene_graph::Node,
};

/**
 * Parses an OBJ file into a group with one mesh node per object.
 *
 * MTL libraries are not fetched: the viewer replaces every material with
 * its shared one anyway, so meshes start out with a plain default material.
 * OBJ files don't come with tangents (and often not with normals), so
 * both are generated here.
 */
pub fn parse_obj(file_name: &str, bytes: &[u8]) -> Result<Node> {
    let mut obj_reader = BufReader::new(Cursor::new(bytes));
    let (models, _materials) = tobj::load_obj_buf(
        &mut obj_reader,
        &tobj::LoadOptions {
            triangulate: true,
            single_index: true,
            ..Default::default()
        },
        |_| Err(tobj::LoadError::OpenFileFailed),
    )?;

    if models.is_empty() {
        log::warn!("{file_name} contains no objects");
    }

    let default_material = Arc::new(Material::new(format!("{file_name} default")));
    let children = models
        .iter()
        .map(|m| {
            let geometry = to_geometry(m);
            Node::mesh(m.name.clone(), Arc::new(geometry), default_material.clone())
        })
        .collect();

    Ok(Node::group(file_name, children))
}

fn to_geometry(m: &tobj::Model) -> Geometry {
    let mut vertices = (0..m.mesh.positions.len() / 3)
        .map(|i| model::ModelVertex {
            position: [
                m.mesh.positions[i * 3],
                m.mesh.positions[i * 3 + 1],
                m.mesh.positions[i * 3 + 2],
            ],
            // OBJ's v axis points up, wgpu's texture origin is top-left
            tex_coords: [
                m.mesh.texcoords.get(i * 2).map_or(0.0, |f| *f),
                1.0 - m.mesh.texcoords.get(i * 2 + 1).map_or(0.0, |f| *f),
            ],
            normal: [
                m.mesh.normals.get(i * 3).map_or(0.0, |f| *f),
                m.mesh.normals.get(i * 3 + 1).map_or(0.0, |f| *f),
                m.mesh.normals.get(i * 3 + 2).map_or(0.0, |f| *f),
            ],
            // We'll calculate these later
            tangent: [0.0; 3],
            bitangent: [0.0; 3],
        })
        .collect::<Vec<_>>();

    let indices = m.mesh.indices.clone();
    if m.mesh.normals.is_empty() {
        model::compute_normals(&mut vertices, &indices);
    }
    model::compute_tangents(&mut vertices, &indices);

    Geometry::new(m.name.clone(), vertices, indices)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_structures::scene_graph::NodeKind;

    const CUBE_FACES: &str = "\
mtllib cube.mtl
o front
v 0 0 0
v 1 0 0
v 1 1 0
v 0 1 0
vt 0 0
vt 1 0
vt 1 1
vt 0 1
f 1/1 2/2 3/3 4/4
o back
v 0 0 -1
v 1 0 -1
v 1 1 -1
f 5 7 6
";

    #[test]
    fn one_mesh_per_object() {
        let node = parse_obj("cube.obj", CUBE_FACES.as_bytes()).unwrap();
        assert!(matches!(node.kind, NodeKind::Group));
        assert_eq!(node.children.len(), 2);
        assert_eq!(node.mesh_count(), 2);

        let front = node.children[0].as_mesh().unwrap();
        // quad triangulated into two triangles
        assert_eq!(front.geometry.triangle_count(), 2);
        assert_eq!(node.children[0].name.as_deref(), Some("front"));
    }

    #[test]
    fn flips_v_and_generates_normals() {
        let node = parse_obj("cube.obj", CUBE_FACES.as_bytes()).unwrap();
        let front = node.children[0].as_mesh().unwrap();
        let first = front.geometry.vertices[0];
        assert_eq!(first.tex_coords, [0.0, 1.0]);
        assert_eq!(first.normal, [0.0, 0.0, 1.0]);
        assert!(first.tangent[0] > 0.0);
    }

    #[test]
    fn objects_share_a_default_material() {
        let node = parse_obj("cube.obj", CUBE_FACES.as_bytes()).unwrap();
        let a = node.children[0].as_mesh().unwrap();
        let b = node.children[1].as_mesh().unwrap();
        assert!(Arc::ptr_eq(&a.material, &b.material));
    }
}
