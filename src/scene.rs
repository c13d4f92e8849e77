//! The top-level facade.
//!
//! A [`Scene`] owns the graph, the audio engine and the live handles, and
//! runs one binding pass per [`tick`](Scene::tick):
//!
//! 1. register acquisitions that finished since the last tick
//! 2. keep audio sources in step with the graph (file blobs, volume, the
//!    default microphone)
//! 3. resolve the active set, cached while the graph is unchanged
//! 4. apply audio features to the mounted handles
//!
//! ```
//! use resonode::{Edge, MeshHandle, Node, Scene, SceneConfig};
//!
//! let mut scene = Scene::new(SceneConfig::default());
//! scene.add_node(Node::source("ball", "SphereNode"));
//! scene.add_node(Node::effect("pulse", "AudioReactiveNode"));
//! scene.add_edge(Edge::new("e1", "ball", "pulse"));
//! scene.add_edge(Edge::new("e2", "pulse", "output-1"));
//! scene.mount("ball", MeshHandle::new());
//!
//! let report = scene.tick();
//! assert_eq!(report.effects, 1);
//! ```

use alloc::string::String;
use alloc::vec::Vec;

use delegate::delegate;
use hashbrown::HashMap;
use tracing::{debug, warn};

use crate::audio::{AudioEngine, FeatureSnapshot, SourceStatus};
use crate::binding::{HandleRegistry, LiveHandle, ReactiveBinding, TickReport};
use crate::config::SceneConfig;
use crate::error::PresetError;
use crate::graph::{GraphSnapshot, GraphStore};
use crate::node::{Edge, Node, NodeId, NodeUpdate};
use crate::nodes::effect::{AudioReactiveParams, AUDIO_REACTIVE};
use crate::nodes::source::{AudioFileParams, AUDIO_FILE};
use crate::params::{Blob, Params};
use crate::preset::Preset;
use crate::resolve::{ActiveSet, ActiveSetResolver};

pub struct Scene {
    config: SceneConfig,
    graph: GraphStore,
    engine: AudioEngine,
    handles: HandleRegistry,
    resolver: ActiveSetResolver,
    binding: ReactiveBinding,
    /// Last file blob requested per audio file node, so a failed decode isn't
    /// retried every tick.
    requested_files: HashMap<String, Blob>,
    default_capture_requested: bool,
}

impl Scene {
    /// A scene with the default output node and an engine using the default
    /// backends.
    pub fn new(config: SceneConfig) -> Self {
        let engine = AudioEngine::new(config.engine);
        Self::with_engine(config, engine)
    }

    /// A scene driving an existing engine.
    pub fn with_engine(config: SceneConfig, engine: AudioEngine) -> Self {
        Self {
            resolver: ActiveSetResolver::new(config.binding.traversal),
            binding: ReactiveBinding::new(config.binding.clone()),
            config,
            graph: GraphStore::new(),
            engine,
            handles: HandleRegistry::new(),
            requested_files: HashMap::new(),
            default_capture_requested: false,
        }
    }

    pub fn config(&self) -> &SceneConfig {
        &self.config
    }

    delegate! {
        to self.graph {
            pub fn snapshot(&self) -> &GraphSnapshot;
            pub fn nodes(&self) -> &[Node];
            pub fn edges(&self) -> &[Edge];
            pub fn selected_node_id(&self) -> Option<&NodeId>;
            pub fn get_node(&self, id: &str) -> Option<&Node>;
            pub fn get_nodes_by_type(&self, node_type: &str) -> Vec<&Node>;
            pub fn inputs(&self, id: &str) -> Vec<NodeId>;
            pub fn add_node(&mut self, node: Node);
            pub fn update_node(&mut self, id: &str, update: NodeUpdate) -> bool;
            pub fn update_node_params(&mut self, id: &str, params: Params) -> bool;
            pub fn add_edge(&mut self, edge: Edge);
            pub fn remove_edge(&mut self, id: &str) -> bool;
            pub fn set_selected_node(&mut self, id: Option<&str>);
            pub fn to_preset(&self, name: impl Into<String>, description: impl Into<String>) -> Preset;
        }

        to self.engine {
            pub fn play(&mut self, id: &str);
            pub fn pause(&mut self, id: &str);
            #[call(status)]
            pub fn audio_status(&self, id: &str) -> SourceStatus;
            #[call(get_features)]
            pub fn features(&mut self, id: &str) -> FeatureSnapshot;
        }

        to self.handles {
            pub fn mount(&mut self, id: impl Into<String>, handle: impl LiveHandle + 'static);
            pub fn unmount(&mut self, id: &str) -> Option<Box<dyn LiveHandle>>;
        }
    }

    pub fn graph(&self) -> &GraphStore {
        &self.graph
    }

    pub fn engine(&self) -> &AudioEngine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut AudioEngine {
        &mut self.engine
    }

    pub fn handles(&self) -> &HandleRegistry {
        &self.handles
    }

    pub fn handles_mut(&mut self) -> &mut HandleRegistry {
        &mut self.handles
    }

    /// Remove a node and release the audio source registered under its id.
    pub fn remove_node(&mut self, id: &str) -> bool {
        let removed = self.graph.remove_node(id);
        if removed {
            self.forget(id);
        }
        removed
    }

    /// Reset the graph to a lone output node, releasing every node's audio.
    pub fn clear_graph(&mut self) {
        self.forget_all_nodes();
        self.graph.clear_graph();
    }

    /// Replace the graph with a preset.
    pub fn load_preset(&mut self, preset: &Preset) -> Result<(), PresetError> {
        preset.validate()?;
        self.forget_all_nodes();
        self.graph.load_preset(preset)
    }

    fn forget_all_nodes(&mut self) {
        let ids: Vec<NodeId> = self.graph.nodes().iter().map(|n| n.id.clone()).collect();
        for id in &ids {
            self.forget(id.as_str());
        }
    }

    fn forget(&mut self, id: &str) {
        self.engine.release(id);
        self.handles.unmount(id);
        self.requested_files.remove(id);
    }

    /// The active set of the current graph.
    pub fn active_set(&mut self) -> &ActiveSet {
        self.resolver.resolve(self.graph.snapshot())
    }

    /// Run one binding pass.
    pub fn tick(&mut self) -> TickReport {
        for (id, outcome) in self.engine.poll() {
            match outcome {
                Ok(kind) => debug!(%id, ?kind, "audio source ready"),
                Err(e) => warn!(%id, error = %e, "audio source failed"),
            }
        }

        self.sync_audio();

        let active = self.resolver.resolve(self.graph.snapshot());
        self.binding.apply(
            self.graph.snapshot(),
            active,
            &mut self.engine,
            &mut self.handles,
        )
    }

    /// Release every audio source and shut the engine down.
    pub fn release_all(&mut self) {
        self.requested_files.clear();
        self.engine.release_all();
    }

    fn sync_audio(&mut self) {
        if self.engine.is_disposed() {
            return;
        }
        let graph = self.graph.snapshot().clone();

        for node in graph.nodes_by_type(AUDIO_FILE) {
            let id = node.id.as_str();
            let params = AudioFileParams::from_params(&node.params);

            match params.file {
                Some(blob) => {
                    let known = self
                        .requested_files
                        .get(id)
                        .is_some_and(|b| b.ptr_eq(&blob));
                    if !known {
                        debug!(id, bytes = blob.len(), "audio file changed");
                        self.requested_files.insert(id.into(), blob.clone());
                        if let Err(e) = self.engine.acquire_file(id, blob) {
                            warn!(id, error = %e, "could not load audio file");
                        }
                    }
                }
                None => {
                    if self.requested_files.remove(id).is_some() {
                        self.engine.release(id);
                    }
                }
            }

            self.engine.set_volume(id, params.volume);
        }

        if self.config.binding.auto_acquire_default_capture && !self.default_capture_requested {
            let wants_default = graph
                .nodes_by_type(AUDIO_REACTIVE)
                .any(|n| AudioReactiveParams::from_params(&n.params).audio_source_id.is_none());
            if wants_default {
                self.default_capture_requested = true;
                let id = self.config.binding.default_source_id.as_str();
                debug!(id, "starting default capture");
                if let Err(e) = self.engine.acquire_capture(id) {
                    warn!(id, error = %e, "could not start default capture");
                }
            }
        }
    }
}

impl Default for Scene {
    fn default() -> Self {
        Self::new(SceneConfig::default())
    }
}
