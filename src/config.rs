//! Viewer configuration.
//!
//! The viewer ships in two variants that differ only in how the model is
//! loaded, how bright the lights are and whether tone mapping is applied.
//! Both are expressed as a [`ViewerConfig`] rather than separate programs.

use crate::data_structures::scene_graph::Color;

/// Background colour of the scene (`#bfd1e5`).
pub const BACKGROUND: u32 = 0xbfd1e5;

/// Id of the DOM element the canvas is appended to on the web.
pub const CONTAINER_ID: &str = "container";

pub const GLB_MODEL_PATH: &str = "models/model.glb";
pub const OBJ_MODEL_PATH: &str = "models/model.obj";
pub const DIFFUSE_TEXTURE_PATH: &str = "textures/diffuse.jpg";
pub const NORMAL_TEXTURE_PATH: &str = "textures/normal.jpg";

/// Which model format the viewer loads and how the result is treated.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Variant {
    /// A binary glTF whose embedded materials are used as-is.
    Glb { model: String },
    /// An OBJ whose meshes all get one shared material built from a
    /// diffuse and a normal texture.
    ObjTextured {
        model: String,
        diffuse: String,
        normal: String,
    },
}

impl Variant {
    pub fn model_path(&self) -> &str {
        match self {
            Variant::Glb { model } => model,
            Variant::ObjTextured { model, .. } => model,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ToneMapping {
    #[default]
    None,
    AcesFilmic,
}

/// Colour space of the values written to the drawing surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ColorSpace {
    #[default]
    Linear,
    Srgb,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LightingPreset {
    pub ambient_intensity: f32,
    pub directional_intensity: f32,
    pub directional_position: [f32; 3],
}

impl LightingPreset {
    pub const OBJ: LightingPreset = LightingPreset {
        ambient_intensity: 0.6,
        directional_intensity: 1.0,
        directional_position: [5.0, 10.0, 7.5],
    };

    pub const GLB: LightingPreset = LightingPreset {
        ambient_intensity: 0.8,
        directional_intensity: 1.5,
        directional_position: [5.0, 10.0, 7.5],
    };
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CameraConfig {
    /// Vertical field of view in degrees.
    pub fovy: f32,
    pub znear: f32,
    pub zfar: f32,
    pub position: [f32; 3],
    pub target: [f32; 3],
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            fovy: 75.0,
            znear: 0.1,
            zfar: 1000.0,
            position: [0.0, 0.0, 5.0],
            target: [0.0, 0.0, 0.0],
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ViewerConfig {
    pub variant: Variant,
    pub background: Color,
    pub camera: CameraConfig,
    pub lighting: LightingPreset,
    pub tone_mapping: ToneMapping,
    pub output_color_space: ColorSpace,
    pub damping_factor: f32,
    pub container_id: String,
    /// Directory (native) or URL path (web) that asset paths are relative to.
    pub asset_root: String,
}

impl ViewerConfig {
    pub fn glb(model: impl Into<String>) -> Self {
        Self {
            variant: Variant::Glb {
                model: model.into(),
            },
            background: Color::from_hex(BACKGROUND),
            camera: CameraConfig::default(),
            lighting: LightingPreset::GLB,
            tone_mapping: ToneMapping::AcesFilmic,
            output_color_space: ColorSpace::Srgb,
            damping_factor: 0.05,
            container_id: CONTAINER_ID.to_string(),
            asset_root: "assets".to_string(),
        }
    }

    pub fn obj_textured(
        model: impl Into<String>,
        diffuse: impl Into<String>,
        normal: impl Into<String>,
    ) -> Self {
        Self {
            variant: Variant::ObjTextured {
                model: model.into(),
                diffuse: diffuse.into(),
                normal: normal.into(),
            },
            lighting: LightingPreset::OBJ,
            tone_mapping: ToneMapping::None,
            output_color_space: ColorSpace::Linear,
            ..Self::glb(String::new())
        }
    }

    /// Picks the variant from the model's file extension. Anything that is
    /// not `.obj` is treated as glTF.
    pub fn from_model_path(model: &str) -> Self {
        let is_obj = std::path::Path::new(model)
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("obj"));
        if is_obj {
            Self::obj_textured(model, DIFFUSE_TEXTURE_PATH, NORMAL_TEXTURE_PATH)
        } else {
            Self::glb(model)
        }
    }

    pub fn with_asset_root(mut self, root: impl Into<String>) -> Self {
        self.asset_root = root.into();
        self
    }
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self::glb(GLB_MODEL_PATH)
    }
}
