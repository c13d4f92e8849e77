//! Built-in node types.
//!
//! Node types are organized into three categories, matching [`NodeKind`]:
//!
//! ## Sources ([`source`])
//!
//! Things the rendering layer mounts as objects or feeds:
//! - [`SPHERE`](source::SPHERE) - Sphere primitive
//! - [`IMAGE_PLANE`](source::IMAGE_PLANE) - Textured plane
//! - [`GLB_MODEL`](source::GLB_MODEL) - Loaded GLB/GLTF model
//! - [`AUDIO_FILE`](source::AUDIO_FILE) - Audio file feeding the analyser
//!
//! ## Effects ([`effect`])
//!
//! Behaviors attached to the nodes feeding them:
//! - [`AUDIO_REACTIVE`](effect::AUDIO_REACTIVE) - Drives scale, rotation or color from audio
//! - [`SHADER_EFFECT`](effect::SHADER_EFFECT) - Custom GLSL material
//! - [`ASCII_EFFECT`](effect::ASCII_EFFECT) - ASCII post-processing
//!
//! ## Output ([`output`])
//!
//! - [`OUTPUT`](output::OUTPUT) - The camera the active set is resolved from
//!
//! # Typed Views
//!
//! Parameters are stored untyped on the node. Each type has a view struct
//! (e.g. [`SphereParams`], [`AudioReactiveParams`]) built on read with
//! `from_params`, which fills in defaults for missing or mistyped fields.

pub mod effect;
pub mod output;
pub mod source;

pub use effect::{AsciiEffectParams, AudioReactiveParams, ShaderEffectParams, TargetProperty};
pub use output::OutputParams;
pub use source::{AudioFileParams, GlbModelParams, ImagePlaneParams, SphereParams};

use crate::node::{Node, NodeId, NodeKind};
use crate::params::Params;

/// Palette entry describing a node type the editor can create.
#[derive(Clone, Copy, Debug)]
pub struct NodeTemplate {
    pub node_type: &'static str,
    pub kind: NodeKind,
    pub label: &'static str,
    pub description: &'static str,
    default_params: fn() -> Params,
}

impl NodeTemplate {
    pub fn default_params(&self) -> Params {
        (self.default_params)()
    }

    /// Create a node of this type with a generated id.
    pub fn instantiate(&self) -> Node {
        self.instantiate_with_id(NodeId::generate())
    }

    pub fn instantiate_with_id(&self, id: impl Into<NodeId>) -> Node {
        Node::new(id, self.kind, self.node_type).with_params(self.default_params())
    }
}

const CATALOG: &[NodeTemplate] = &[
    NodeTemplate {
        node_type: source::SPHERE,
        kind: NodeKind::Source,
        label: "Sphere",
        description: "A 3D sphere primitive",
        default_params: SphereParams::defaults,
    },
    NodeTemplate {
        node_type: source::IMAGE_PLANE,
        kind: NodeKind::Source,
        label: "Image Plane",
        description: "A plane with an image texture",
        default_params: ImagePlaneParams::defaults,
    },
    NodeTemplate {
        node_type: source::GLB_MODEL,
        kind: NodeKind::Source,
        label: "GLB Model",
        description: "Load a GLB/GLTF 3D model",
        default_params: GlbModelParams::defaults,
    },
    NodeTemplate {
        node_type: source::AUDIO_FILE,
        kind: NodeKind::Source,
        label: "Audio File",
        description: "Load audio file for visualization",
        default_params: AudioFileParams::defaults,
    },
    NodeTemplate {
        node_type: effect::AUDIO_REACTIVE,
        kind: NodeKind::Effect,
        label: "Audio Reactive",
        description: "Make objects react to audio",
        default_params: AudioReactiveParams::defaults,
    },
    NodeTemplate {
        node_type: effect::SHADER_EFFECT,
        kind: NodeKind::Effect,
        label: "Shader Effect",
        description: "Apply custom GLSL shaders",
        default_params: ShaderEffectParams::defaults,
    },
    NodeTemplate {
        node_type: effect::ASCII_EFFECT,
        kind: NodeKind::Effect,
        label: "ASCII Effect",
        description: "Render the scene as ASCII characters",
        default_params: AsciiEffectParams::defaults,
    },
    NodeTemplate {
        node_type: output::OUTPUT,
        kind: NodeKind::Output,
        label: "Output",
        description: "Camera and render target",
        default_params: OutputParams::defaults,
    },
];

/// All built-in node types.
pub fn catalog() -> &'static [NodeTemplate] {
    CATALOG
}

/// Look up a built-in node type by its tag.
pub fn template(node_type: &str) -> Option<&'static NodeTemplate> {
    CATALOG.iter().find(|t| t.node_type == node_type)
}
