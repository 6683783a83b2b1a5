//! Viewer data structures: scene graph, geometry, materials, textures and
//! transforms.
//!
//! - `scene_graph` holds the scene, its lights and the node tree of a model
//! - `model` contains vertex layout, geometry and material definitions
//! - `texture` contains texture slots and the GPU texture wrapper
//! - `instance` holds node transforms and their per-draw GPU layout

pub mod instance;
pub mod model;
pub mod scene_graph;
pub mod texture;
