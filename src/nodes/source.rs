//! Source node types.

use crate::params::{Blob, Params, Vec3};

pub const SPHERE: &str = "SphereNode";
pub const IMAGE_PLANE: &str = "ImagePlaneNode";
pub const GLB_MODEL: &str = "GLBModelNode";
pub const AUDIO_FILE: &str = "AudioFileNode";

/// Uniform scale a bound object returns to when there is no audio.
///
/// A missing, non-numeric or zero `scale` reads as 1.
pub fn base_scale(params: &Params) -> f64 {
    params
        .f64("scale")
        .filter(|s| *s != 0.0 && s.is_finite())
        .unwrap_or(1.0)
}

fn position(params: &Params) -> Vec3 {
    params.vec3("position").unwrap_or(Vec3::ZERO)
}

/// View over a [`SPHERE`] node's parameters.
#[derive(Clone, Debug, PartialEq)]
pub struct SphereParams {
    pub position: Vec3,
    pub scale: f64,
    pub color: String,
}

impl SphereParams {
    pub fn from_params(params: &Params) -> Self {
        Self {
            position: position(params),
            scale: base_scale(params),
            color: params.str("color").unwrap_or("#ffffff").to_owned(),
        }
    }

    pub fn defaults() -> Params {
        Params::new()
            .with("position", Vec3::ZERO)
            .with("scale", 1.0)
            .with("color", "#ffffff")
    }
}

/// View over an [`IMAGE_PLANE`] node's parameters.
#[derive(Clone, Debug, PartialEq)]
pub struct ImagePlaneParams {
    pub position: Vec3,
    pub scale: f64,
    pub source: String,
}

impl ImagePlaneParams {
    pub fn from_params(params: &Params) -> Self {
        Self {
            position: position(params),
            scale: base_scale(params),
            source: params.str("source").unwrap_or("/vite.svg").to_owned(),
        }
    }

    pub fn defaults() -> Params {
        Params::new()
            .with("position", Vec3::ZERO)
            .with("scale", 1.0)
            .with("source", "/vite.svg")
    }
}

/// View over a [`GLB_MODEL`] node's parameters.
#[derive(Clone, Debug, PartialEq)]
pub struct GlbModelParams {
    pub position: Vec3,
    pub scale: f64,
    /// Empty when no model has been chosen yet; renderers show a placeholder.
    pub source: String,
}

impl GlbModelParams {
    pub fn from_params(params: &Params) -> Self {
        Self {
            position: position(params),
            scale: base_scale(params),
            source: params.str("source").unwrap_or_default().to_owned(),
        }
    }

    pub fn defaults() -> Params {
        Params::new()
            .with("position", Vec3::ZERO)
            .with("scale", 1.0)
            .with("source", "")
    }
}

/// View over an [`AUDIO_FILE`] node's parameters.
#[derive(Clone, Debug, PartialEq)]
pub struct AudioFileParams {
    pub position: Vec3,
    /// Playback volume, clamped to `[0, 1]`.
    pub volume: f32,
    pub file: Option<Blob>,
}

impl AudioFileParams {
    pub fn from_params(params: &Params) -> Self {
        Self {
            position: position(params),
            volume: params.f64("volume").unwrap_or(1.0).clamp(0.0, 1.0) as f32,
            file: params.blob("file").cloned(),
        }
    }

    pub fn defaults() -> Params {
        Params::new()
            .with("position", Vec3::ZERO)
            .with("volume", 1.0)
            .with("file", crate::ParamValue::Null)
    }
}
