//! The viewer application context.
//!
//! A [`Viewer`] owns everything one window shows: the scene with its lights,
//! the camera and projection, the orbit controls and the renderer. It is
//! driven from outside by the event loop in [`crate::flow`]:
//!
//! 1. [`Viewer::begin_load`] hands out what to fetch (exactly once),
//! 2. every [`LoadEvent`] of that load goes to [`Viewer::handle_load_event`],
//! 3. [`Viewer::frame`] runs once per redraw and [`Viewer::resize`] on
//!    window resizes.
//!
//! Nothing here touches the GPU directly, so the viewer works with any
//! [`SceneRenderer`].

use std::{fmt, sync::Arc};

use instant::Instant;
use winit::event::WindowEvent;

use crate::{
    camera::{Camera, CameraControls, OrbitControls, Projection},
    config::{Variant, ViewerConfig},
    data_structures::{
        model::Material,
        scene_graph::{Color, Light, Node, Scene},
        texture::TextureSlot,
    },
    render::SceneRenderer,
    resources::{LoadEvent, ModelRequest, TextureRequest},
};

/// Where the single model load stands.
#[derive(Clone, Debug, PartialEq)]
pub enum LoadState {
    Idle,
    Pending { path: String, started: Instant },
    Loaded,
    Failed,
}

/// The fetches a viewer needs: one model and, for textured OBJ, the maps
/// of the shared material.
#[derive(Clone, Debug)]
pub struct LoadPlan {
    pub model: ModelRequest,
    pub textures: Vec<TextureRequest>,
}

pub struct Viewer<R, C = OrbitControls> {
    config: ViewerConfig,
    scene: Scene,
    camera: Camera,
    projection: Projection,
    controls: C,
    renderer: R,
    shared_material: Option<Arc<Material>>,
    load: LoadState,
}

impl<R, C> fmt::Debug for Viewer<R, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Viewer")
            .field("model", &self.config.variant.model_path())
            .field("load", &self.load)
            .field("scene_revision", &self.scene.revision())
            .finish()
    }
}

impl<R: SceneRenderer> Viewer<R, OrbitControls> {
    /// A viewer with damped orbit controls around the camera target.
    pub fn new(config: ViewerConfig, renderer: R) -> Self {
        let controls = OrbitControls::damped(config.camera.target, config.damping_factor);
        Self::with_controls(config, renderer, controls)
    }
}

impl<R, C> Viewer<R, C>
where
    R: SceneRenderer,
    C: CameraControls,
{
    pub fn with_controls(config: ViewerConfig, renderer: R, mut controls: C) -> Self {
        let (width, height) = renderer.size();
        let camera = Camera::from(&config.camera);
        let projection = Projection::from_config(&config.camera, width, height);
        controls.set_viewport(width, height);

        let mut scene = Scene::new(config.background);
        scene.add_light(Light::Ambient {
            color: Color::WHITE,
            intensity: config.lighting.ambient_intensity,
        });
        scene.add_light(Light::Directional {
            color: Color::WHITE,
            intensity: config.lighting.directional_intensity,
            position: config.lighting.directional_position.into(),
        });

        let shared_material = match &config.variant {
            Variant::Glb { .. } => None,
            Variant::ObjTextured {
                model,
                diffuse,
                normal,
            } => Some(Arc::new(Material::with_maps(
                format!("{model} material"),
                Arc::new(TextureSlot::pending(diffuse.as_str())),
                Arc::new(TextureSlot::pending(normal.as_str())),
            ))),
        };

        Self {
            config,
            scene,
            camera,
            projection,
            controls,
            renderer,
            shared_material,
            load: LoadState::Idle,
        }
    }

    /// Starts the one and only model load. Returns `None` if a load was
    /// already started, whatever its outcome.
    pub fn begin_load(&mut self) -> Option<LoadPlan> {
        if self.load != LoadState::Idle {
            log::warn!("a model was already requested, ignoring another load");
            return None;
        }
        let model = ModelRequest::from(&self.config.variant);
        let textures = match (&self.config.variant, &self.shared_material) {
            (
                Variant::ObjTextured {
                    diffuse, normal, ..
                },
                Some(material),
            ) => [
                (diffuse, &material.color_map),
                (normal, &material.normal_map),
            ]
            .into_iter()
            .filter_map(|(path, slot)| {
                Some(TextureRequest {
                    path: path.clone(),
                    slot: slot.clone()?,
                })
            })
            .collect(),
            _ => Vec::new(),
        };
        log::info!("loading {}", model.path);
        self.load = LoadState::Pending {
            path: model.path.clone(),
            started: Instant::now(),
        };
        Some(LoadPlan { model, textures })
    }

    /// Applies one event of the model load. Never panics: failures are
    /// logged and leave the scene as it was.
    pub fn handle_load_event(&mut self, event: LoadEvent) {
        let (path, started) = match &self.load {
            LoadState::Pending { path, started } => (path.clone(), *started),
            state => {
                log::warn!("ignoring load event in state {state:?}: {event:?}");
                return;
            }
        };

        match event {
            LoadEvent::Progress(progress) => log::info!("{path}: {progress}"),
            LoadEvent::Success(mut node) => {
                if let Some(material) = &self.shared_material {
                    let bound = node.bind_material(material);
                    log::debug!("{path}: bound the shared material to {bound} meshes");
                }
                log::info!(
                    "{path}: loaded {} meshes in {:.2?}",
                    node.mesh_count(),
                    started.elapsed()
                );
                self.scene.add(node);
                self.load = LoadState::Loaded;
            }
            LoadEvent::Failure(e) => {
                log::error!("{path}: model could not be loaded: {e:?}");
                self.load = LoadState::Failed;
            }
        }
    }

    /// Advances the controls and draws one frame.
    pub fn frame(&mut self) -> Result<(), R::Error> {
        self.controls.update(&mut self.camera);
        self.renderer
            .render(&self.scene, &self.camera, &self.projection)
    }

    /// Adapts projection, renderer and controls to a new size. Zero sizes
    /// are ignored.
    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            log::debug!("ignoring resize to {width}x{height}");
            return;
        }
        self.projection.resize(width, height);
        self.renderer.resize(width, height);
        self.controls.set_viewport(width, height);
    }

    /// Forwards input to the controls. Returns `true` if they used it.
    pub fn handle_window_event(&mut self, event: &WindowEvent) -> bool {
        self.controls
            .handle_window_event(event, &self.camera, &self.projection)
    }

    pub fn config(&self) -> &ViewerConfig {
        &self.config
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn projection(&self) -> &Projection {
        &self.projection
    }

    pub fn controls(&self) -> &C {
        &self.controls
    }

    pub fn controls_mut(&mut self) -> &mut C {
        &mut self.controls
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn renderer_mut(&mut self) -> &mut R {
        &mut self.renderer
    }

    /// The material every OBJ mesh ends up with. `None` for glTF.
    pub fn shared_material(&self) -> Option<&Arc<Material>> {
        self.shared_material.as_ref()
    }

    pub fn load_state(&self) -> &LoadState {
        &self.load
    }

    /// The loaded model, once it arrived.
    pub fn model(&self) -> Option<&Node> {
        match self.load {
            LoadState::Loaded => self.scene.children().last(),
            _ => None,
        }
    }
}
