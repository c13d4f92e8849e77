//! Preset documents.
//!
//! A preset is a whole graph in exchange form:
//!
//! ```json
//! {
//!   "name": "Audio Reactive Sphere",
//!   "description": "A sphere that pulses with audio input",
//!   "nodes": [
//!     { "id": "sphere-1", "kind": "source", "type": "SphereNode",
//!       "params": { "scale": 1 }, "inputs": [], "position": { "x": 100, "y": 150 } }
//!   ],
//!   "edges": [ { "id": "sphere-audio", "source": "sphere-1", "target": "audio-1" } ]
//! }
//! ```
//!
//! Each node's `inputs` is written on export for readers that expect it, and
//! ignored on import: edges alone define connectivity.

use alloc::string::String;
use alloc::vec::Vec;

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::PresetError;
use crate::graph::GraphStore;
use crate::node::{Edge, Node, NodeId, NodeKind, Position};
use crate::nodes::effect::{AUDIO_REACTIVE, SHADER_EFFECT};
use crate::nodes::output::{DEFAULT_OUTPUT_ID, OUTPUT};
use crate::nodes::source::{AUDIO_FILE, SPHERE};
use crate::params::{ParamValue, Params, Vec3};

/// A node as it appears in a preset document.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeDocument {
    pub id: NodeId,
    pub kind: NodeKind,
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default)]
    pub params: Params,
    #[serde(default)]
    pub inputs: Vec<NodeId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
}

impl NodeDocument {
    fn from_node(node: &Node, inputs: Vec<NodeId>) -> Self {
        Self {
            id: node.id.clone(),
            kind: node.kind(),
            node_type: node.node_type.clone(),
            params: node.params.clone(),
            inputs,
            position: node.position,
        }
    }

    pub fn to_node(&self) -> Node {
        let mut node = Node::new(self.id.clone(), self.kind, self.node_type.clone())
            .with_params(self.params.clone());
        node.position = self.position;
        node
    }
}

/// A named, shareable graph.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Preset {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub nodes: Vec<NodeDocument>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

impl Preset {
    /// Parse and validate a preset document.
    pub fn from_json(json: &str) -> Result<Self, PresetError> {
        let preset: Preset = serde_json::from_str(json)?;
        preset.validate()?;
        Ok(preset)
    }

    pub fn to_json(&self) -> Result<String, PresetError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// A preset must contain an output node.
    pub fn validate(&self) -> Result<(), PresetError> {
        if self.nodes.iter().any(|n| n.kind == NodeKind::Output) {
            Ok(())
        } else {
            Err(PresetError::NoOutput(self.name.clone()))
        }
    }

    /// The presets shipped with the crate.
    pub fn builtin() -> Vec<Preset> {
        vec![
            audio_reactive_sphere(),
            shader_sphere(),
            audio_file_visualizer(),
        ]
    }

    pub fn find_builtin(name: &str) -> Option<Preset> {
        Self::builtin().into_iter().find(|p| p.name == name)
    }
}

impl GraphStore {
    /// Replace the graph with `preset`.
    ///
    /// The store is cleared first. If the preset brings its own output node,
    /// it replaces the default one.
    pub fn load_preset(&mut self, preset: &Preset) -> Result<(), PresetError> {
        preset.validate()?;

        for id in preset.nodes.iter().map(|n| &n.id).duplicates() {
            warn!(preset = %preset.name, %id, "duplicate node id in preset");
        }

        self.clear_graph();
        self.remove_node(DEFAULT_OUTPUT_ID);
        for node in &preset.nodes {
            self.add_node(node.to_node());
        }
        for edge in &preset.edges {
            self.add_edge(edge.clone());
        }

        debug!(
            preset = %preset.name,
            nodes = preset.nodes.len(),
            edges = preset.edges.len(),
            "preset loaded"
        );
        Ok(())
    }

    /// Export the graph as a preset, with each node's computed inputs.
    ///
    /// File blobs are not exported; they serialize as `null`.
    pub fn to_preset(&self, name: impl Into<String>, description: impl Into<String>) -> Preset {
        let graph = self.snapshot();
        let index = graph.input_index();
        Preset {
            name: name.into(),
            description: description.into(),
            nodes: graph
                .nodes()
                .iter()
                .map(|n| {
                    let inputs = index.get(n.id.as_str()).iter().map(|&id| id.clone()).collect();
                    NodeDocument::from_node(n, inputs)
                })
                .collect(),
            edges: graph.edges().to_vec(),
        }
    }
}

fn doc(id: &str, kind: NodeKind, node_type: &str, params: Params, x: f32, y: f32) -> NodeDocument {
    NodeDocument {
        id: NodeId::from(id),
        kind,
        node_type: node_type.into(),
        params,
        inputs: Vec::new(),
        position: Some(Position::new(x, y)),
    }
}

fn output(z: f64, x: f32, y: f32) -> NodeDocument {
    doc(
        DEFAULT_OUTPUT_ID,
        NodeKind::Output,
        OUTPUT,
        Params::new().with("cameraPosition", Vec3::new(0.0, 0.0, z)),
        x,
        y,
    )
}

fn sphere(id: &str, x: f64, scale: f64, color: &str, at: (f32, f32)) -> NodeDocument {
    let params = Params::new()
        .with("position", Vec3::new(x, 0.0, 0.0))
        .with("scale", scale)
        .with("color", color);
    doc(id, NodeKind::Source, SPHERE, params, at.0, at.1)
}

/// Fill in `inputs` from the edges, as an export would.
fn with_inputs(mut preset: Preset) -> Preset {
    for node in &mut preset.nodes {
        node.inputs = preset
            .edges
            .iter()
            .filter(|e| e.target == node.id)
            .map(|e| e.source.clone())
            .collect();
    }
    preset
}

fn audio_reactive_sphere() -> Preset {
    with_inputs(Preset {
        name: "Audio Reactive Sphere".into(),
        description: "A sphere that pulses with audio input".into(),
        nodes: vec![
            sphere("sphere-1", 0.0, 1.0, "#4CAF50", (100.0, 150.0)),
            doc(
                "audio-1",
                NodeKind::Effect,
                AUDIO_REACTIVE,
                Params::new()
                    .with("sensitivity", 2.0)
                    .with("targetProperty", "scale"),
                350.0,
                150.0,
            ),
            output(5.0, 600.0, 150.0),
        ],
        edges: vec![
            Edge::new("sphere-audio", "sphere-1", "audio-1"),
            Edge::new("audio-output", "audio-1", DEFAULT_OUTPUT_ID),
        ],
    })
}

const WAVE_VERTEX: &str = "varying vec2 vUv;
void main() {
  vUv = uv;
  gl_Position = projectionMatrix * modelViewMatrix * vec4(position, 1.0);
}
";

const WAVE_FRAGMENT: &str = "uniform float time;
uniform vec3 color;
varying vec2 vUv;
void main() {
  vec3 finalColor = color * (0.5 + 0.5 * sin(time + vUv.x * 10.0));
  gl_FragColor = vec4(finalColor, 1.0);
}
";

fn shader_sphere() -> Preset {
    with_inputs(Preset {
        name: "Shader Sphere".into(),
        description: "A sphere with an animated shader effect".into(),
        nodes: vec![
            sphere("sphere-2", 0.0, 1.5, "#2196F3", (100.0, 150.0)),
            doc(
                "shader-1",
                NodeKind::Effect,
                SHADER_EFFECT,
                Params::new()
                    .with("vertexShader", WAVE_VERTEX)
                    .with("fragmentShader", WAVE_FRAGMENT)
                    .with("uniforms", Params::new()),
                350.0,
                150.0,
            ),
            output(5.0, 600.0, 150.0),
        ],
        edges: vec![
            Edge::new("sphere-shader", "sphere-2", "shader-1"),
            Edge::new("shader-output", "shader-1", DEFAULT_OUTPUT_ID),
        ],
    })
}

fn audio_file_visualizer() -> Preset {
    with_inputs(Preset {
        name: "Audio File Visualizer".into(),
        description: "Load an audio file and visualize it with a reactive sphere".into(),
        nodes: vec![
            doc(
                "audio-file-1",
                NodeKind::Source,
                AUDIO_FILE,
                Params::new()
                    .with("position", Vec3::new(-2.0, 0.0, 0.0))
                    .with("volume", 0.8)
                    .with("file", ParamValue::Null),
                50.0,
                100.0,
            ),
            sphere("sphere-3", 2.0, 1.0, "#FF5722", (250.0, 150.0)),
            doc(
                "audio-reactive-2",
                NodeKind::Effect,
                AUDIO_REACTIVE,
                Params::new()
                    .with("sensitivity", 3.0)
                    .with("targetProperty", "scale")
                    .with("audioSourceId", "audio-file-1"),
                450.0,
                150.0,
            ),
            output(8.0, 650.0, 125.0),
        ],
        edges: vec![
            Edge::new("sphere-audio-reactive", "sphere-3", "audio-reactive-2"),
            Edge::new("audio-reactive-output", "audio-reactive-2", DEFAULT_OUTPUT_ID),
            Edge::new("audio-file-output", "audio-file-1", DEFAULT_OUTPUT_ID),
        ],
    })
}
