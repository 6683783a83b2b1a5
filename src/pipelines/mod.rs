//! Render pipelines and the bind group layouts they use.
//!
//! - `basic` is the lit model pipeline with its material bind group
//! - `light` holds the light and output uniforms shared by every draw

pub mod basic;
pub mod light;
