//! Effect node types.

use crate::params::Params;

pub const AUDIO_REACTIVE: &str = "AudioReactiveNode";
pub const SHADER_EFFECT: &str = "ShaderEffectNode";
pub const ASCII_EFFECT: &str = "AsciiEffectNode";

/// Which property of a bound object an [`AUDIO_REACTIVE`] node drives.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TargetProperty {
    Scale,
    Rotation,
    Color,
}

impl TargetProperty {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "scale" => Some(Self::Scale),
            "rotation" => Some(Self::Rotation),
            "color" => Some(Self::Color),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scale => "scale",
            Self::Rotation => "rotation",
            Self::Color => "color",
        }
    }
}

/// View over an [`AUDIO_REACTIVE`] node's parameters.
#[derive(Clone, Debug, PartialEq)]
pub struct AudioReactiveParams {
    /// Multiplier applied to the amplitude. Defaults to 1.
    pub sensitivity: f32,
    /// `None` when `targetProperty` names something unsupported or is an
    /// explicit null; such nodes bind nothing. Absent means scale.
    pub target: Option<TargetProperty>,
    /// Explicit feature source. `None` selects the default capture source.
    pub audio_source_id: Option<String>,
}

impl AudioReactiveParams {
    pub fn from_params(params: &Params) -> Self {
        let target = match params.get("targetProperty") {
            None => Some(TargetProperty::Scale),
            Some(v) => v.as_str().and_then(TargetProperty::parse),
        };

        Self {
            sensitivity: params.f64("sensitivity").unwrap_or(1.0) as f32,
            target,
            audio_source_id: params
                .str("audioSourceId")
                .filter(|s| !s.is_empty())
                .map(str::to_owned),
        }
    }

    /// Source id this node reads features from, falling back to `default_id`.
    pub fn source_id<'a>(&'a self, default_id: &'a str) -> &'a str {
        self.audio_source_id.as_deref().unwrap_or(default_id)
    }

    pub fn defaults() -> Params {
        Params::new()
            .with("sensitivity", 1.0)
            .with("targetProperty", "scale")
    }
}

/// View over a [`SHADER_EFFECT`] node's parameters.
///
/// Empty shader strings mean "use the renderer's built-in shader".
#[derive(Clone, Debug, PartialEq)]
pub struct ShaderEffectParams {
    pub vertex_shader: String,
    pub fragment_shader: String,
    pub uniforms: Params,
}

impl ShaderEffectParams {
    pub fn from_params(params: &Params) -> Self {
        Self {
            vertex_shader: params.str("vertexShader").unwrap_or_default().to_owned(),
            fragment_shader: params.str("fragmentShader").unwrap_or_default().to_owned(),
            uniforms: params.map("uniforms").cloned().unwrap_or_default(),
        }
    }

    pub fn defaults() -> Params {
        Params::new()
            .with("vertexShader", "")
            .with("fragmentShader", "")
            .with("uniforms", Params::new())
    }
}

/// View over an [`ASCII_EFFECT`] node's parameters.
#[derive(Clone, Debug, PartialEq)]
pub struct AsciiEffectParams {
    pub background_color: String,
    pub color: String,
    pub characters: String,
    pub font_size: f64,
    pub enabled: bool,
}

impl AsciiEffectParams {
    pub fn from_params(params: &Params) -> Self {
        Self {
            background_color: params.str("backgroundColor").unwrap_or("#000000").to_owned(),
            color: params.str("color").unwrap_or("#ffffff").to_owned(),
            characters: params.str("characters").unwrap_or(" .:-=+*#%@").to_owned(),
            font_size: params.f64("fontSize").unwrap_or(15.0),
            enabled: params.bool("enabled").unwrap_or(true),
        }
    }

    pub fn defaults() -> Params {
        Params::new()
            .with("backgroundColor", "#000000")
            .with("color", "#ffffff")
            .with("characters", " .:-=+*#%@")
            .with("fontSize", 15.0)
            .with("enabled", true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::ParamValue;

    #[test]
    fn audio_reactive_defaults() {
        let view = AudioReactiveParams::from_params(&Params::new());
        assert_eq!(view.sensitivity, 1.0);
        assert_eq!(view.target, Some(TargetProperty::Scale));
        assert_eq!(view.source_id("default-microphone"), "default-microphone");
    }

    #[test]
    fn empty_source_id_falls_back() {
        let view = AudioReactiveParams::from_params(&Params::new().with("audioSourceId", ""));
        assert_eq!(view.audio_source_id, None);

        let view =
            AudioReactiveParams::from_params(&Params::new().with("audioSourceId", "audio-file-1"));
        assert_eq!(view.source_id("default-microphone"), "audio-file-1");
    }

    #[test]
    fn unknown_target_binds_nothing() {
        let view =
            AudioReactiveParams::from_params(&Params::new().with("targetProperty", "opacity"));
        assert_eq!(view.target, None);
    }

    #[test]
    fn null_target_binds_nothing() {
        let view = AudioReactiveParams::from_params(
            &Params::new().with("targetProperty", ParamValue::Null),
        );
        assert_eq!(view.target, None);
    }
}
