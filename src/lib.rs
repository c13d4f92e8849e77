//! Resonode - node-graph scenes driven by live audio features
//!
//! Design principles:
//! - The graph is data: nodes and edges, replaced wholesale on every mutation
//! - Edges are the only connectivity record; a node's inputs are computed
//! - Audio acquisition never blocks the tick; unready sources read as silence
//! - Reactive bindings write transient render state, never the graph
//! - Nothing a single node does can stop the tick loop
//!
//! # Quick Start
//!
//! ```
//! use resonode::{Edge, MeshHandle, Node, Scene, SceneConfig};
//! use resonode::nodes::{effect, source};
//!
//! let mut scene = Scene::new(SceneConfig::default());
//! scene.add_node(Node::source("sphere-1", source::SPHERE).with_param("scale", 1.0));
//! scene.add_node(
//!     Node::effect("audio-1", effect::AUDIO_REACTIVE)
//!         .with_param("sensitivity", 2.0)
//!         .with_param("targetProperty", "scale"),
//! );
//! scene.add_edge(Edge::new("sphere-audio", "sphere-1", "audio-1"));
//! scene.add_edge(Edge::new("audio-output", "audio-1", "output-1"));
//!
//! // The rendering layer mounts a handle per object it draws.
//! scene.mount("sphere-1", MeshHandle::new());
//!
//! // Once per frame:
//! let report = scene.tick();
//! assert_eq!(report.effects, 1);
//! ```
//!
//! # Modules
//!
//! - [`graph`]: the node/edge store
//! - [`resolve`]: which nodes are active on a tick
//! - [`audio`]: capture and file sources, frequency analysis
//! - [`binding`]: applying features to live handles
//! - [`preset`]: JSON documents and built-in presets

extern crate alloc;

pub mod audio;
pub mod binding;
pub mod config;
mod device;
mod error;
pub mod graph;
mod node;
pub mod nodes;
mod params;
pub mod preset;
pub mod resolve;
mod scene;

pub use audio::{AudioEngine, FeatureSnapshot, SourceKind, SourceStatus};
pub use binding::{HandleRegistry, LiveHandle, MeshHandle, ReactiveBinding, Rgb, TickReport};
pub use config::{AnalyserConfig, BindingConfig, EngineConfig, SceneConfig, DEFAULT_SOURCE_ID};
pub use device::CaptureDevice;
pub use error::{AcquireError, PresetError};
pub use graph::{GraphSnapshot, GraphStore};
pub use node::{Edge, EdgeId, Node, NodeId, NodeKind, NodeUpdate, Position};
pub use params::{Blob, ParamValue, Params, Vec3};
pub use preset::Preset;
pub use resolve::{ActiveSet, ActiveSetResolver, Traversal};
pub use scene::Scene;
