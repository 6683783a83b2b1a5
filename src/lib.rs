//! view-ngin
//!
//! A small single-model 3D viewer for native targets and the web. It loads
//! one GLB, or one OBJ together with a colour and a normal texture, shows it
//! under an ambient and a directional light and lets the user orbit around
//! it. The two variants differ only in their [`config::ViewerConfig`].
//!
//! High-level modules
//! - `config`: variants, lighting and camera presets, output settings
//! - `camera`: camera, projection, uniforms and the damped orbit controls
//! - `data_structures`: scene graph, geometry, materials and textures
//! - `resources`: asset sources and the glTF / OBJ / image loaders
//! - `viewer`: the application context tying scene, camera and renderer together
//! - `context`, `render`, `pipelines`: the wgpu renderer
//! - `flow`: the winit event loop and [`flow::run`]
//!

pub mod camera;
pub mod config;
pub mod context;
pub mod data_structures;
pub mod flow;
pub mod pipelines;
pub mod render;
pub mod resources;
pub mod viewer;

// Re-exports commonly used types for convenience in downstream code.
pub use config::{Variant, ViewerConfig};
pub use flow::run;
pub use viewer::Viewer;
pub use winit::event::WindowEvent;
