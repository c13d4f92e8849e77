//! Reactive binding.
//!
//! Once per tick, every active audio-reactive effect reads the features of
//! its audio source and writes a transform into the live handle of each node
//! feeding it. The writes are transient render state; nothing is stored back
//! into the graph.
//!
//! Failures are contained per effect node. A missing handle or a handle
//! without a color channel is skipped for this tick, and a handle that panics
//! only aborts the effect it belongs to.

use alloc::boxed::Box;
use alloc::string::String;
use core::panic::AssertUnwindSafe;
use std::panic::catch_unwind;

use hashbrown::HashMap;
use tracing::{trace, warn};

use crate::audio::{AudioEngine, FeatureSnapshot};
use crate::config::BindingConfig;
use crate::graph::GraphSnapshot;
use crate::node::{Node, NodeId};
use crate::nodes::effect::{AudioReactiveParams, TargetProperty, AUDIO_REACTIVE};
use crate::nodes::source::base_scale;
use crate::resolve::ActiveSet;

/// Linear RGB, nominally in `[0, 1]` per channel.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Rgb {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Rgb {
    pub const WHITE: Self = Self::gray(1.0);

    pub const fn new(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }

    pub const fn gray(intensity: f32) -> Self {
        Self::new(intensity, intensity, intensity)
    }
}

/// The mutable render object mounted for a node.
pub trait LiveHandle {
    /// Uniform scale.
    fn scale(&self) -> f32;
    fn set_scale(&mut self, scale: f32);

    /// Rotation angle in radians.
    fn rotation(&self) -> f32;
    fn set_rotation(&mut self, radians: f32);

    /// The settable color, if the object's material has one.
    fn color_mut(&mut self) -> Option<&mut Rgb> {
        None
    }
}

/// A plain handle holding its transform as fields.
#[derive(Clone, Debug, PartialEq)]
pub struct MeshHandle {
    pub scale: f32,
    pub rotation: f32,
    pub color: Option<Rgb>,
}

impl Default for MeshHandle {
    fn default() -> Self {
        Self {
            scale: 1.0,
            rotation: 0.0,
            color: None,
        }
    }
}

impl MeshHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_color(mut self, color: Rgb) -> Self {
        self.color = Some(color);
        self
    }
}

impl LiveHandle for MeshHandle {
    fn scale(&self) -> f32 {
        self.scale
    }

    fn set_scale(&mut self, scale: f32) {
        self.scale = scale;
    }

    fn rotation(&self) -> f32 {
        self.rotation
    }

    fn set_rotation(&mut self, radians: f32) {
        self.rotation = radians;
    }

    fn color_mut(&mut self) -> Option<&mut Rgb> {
        self.color.as_mut()
    }
}

/// Live handles of the currently mounted nodes, by node id.
#[derive(Default)]
pub struct HandleRegistry {
    handles: HashMap<String, Box<dyn LiveHandle>>,
}

impl HandleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mount `handle` for node `id`, replacing any previous one.
    pub fn mount(&mut self, id: impl Into<String>, handle: impl LiveHandle + 'static) {
        self.handles.insert(id.into(), Box::new(handle));
    }

    pub fn unmount(&mut self, id: &str) -> Option<Box<dyn LiveHandle>> {
        self.handles.remove(id)
    }

    pub fn get(&self, id: &str) -> Option<&dyn LiveHandle> {
        self.handles.get(id).map(|h| h.as_ref())
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut (dyn LiveHandle + 'static)> {
        self.handles.get_mut(id).map(|h| h.as_mut())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.handles.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Unmount every handle whose id fails `keep`.
    pub fn retain(&mut self, mut keep: impl FnMut(&str) -> bool) {
        self.handles.retain(|id, _| keep(id));
    }

    pub fn clear(&mut self) {
        self.handles.clear();
    }
}

/// Where the binding reads features from.
pub trait FeatureSource {
    fn features(&mut self, source_id: &str) -> FeatureSnapshot;
}

impl FeatureSource for AudioEngine {
    fn features(&mut self, source_id: &str) -> FeatureSnapshot {
        self.get_features(source_id)
    }
}

impl<F> FeatureSource for F
where
    F: FnMut(&str) -> FeatureSnapshot,
{
    fn features(&mut self, source_id: &str) -> FeatureSnapshot {
        self(source_id)
    }
}

/// What one tick of binding did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Audio-reactive effects evaluated.
    pub effects: usize,
    /// Handles written.
    pub applied: usize,
    /// Inputs skipped because no handle is mounted for them.
    pub missing_handles: usize,
    /// Inputs skipped because they name no node.
    pub missing_nodes: usize,
    /// Color targets without a color channel.
    pub missing_color: usize,
    /// Effects skipped for an unsupported `targetProperty`.
    pub unsupported_targets: usize,
    /// Effects aborted by a panicking handle.
    pub panicked: usize,
}

impl TickReport {
    pub fn skipped(&self) -> usize {
        self.missing_handles + self.missing_nodes + self.missing_color
    }
}

/// Applies audio features to live handles.
#[derive(Clone, Debug, Default)]
pub struct ReactiveBinding {
    config: BindingConfig,
}

impl ReactiveBinding {
    pub fn new(config: BindingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BindingConfig {
        &self.config
    }

    /// Run one tick.
    ///
    /// Each audio-reactive effect in `active` is evaluated exactly once, and
    /// each audio source is read at most once per call.
    pub fn apply(
        &self,
        graph: &GraphSnapshot,
        active: &ActiveSet,
        features: &mut dyn FeatureSource,
        handles: &mut HandleRegistry,
    ) -> TickReport {
        let mut report = TickReport::default();
        let mut read: HashMap<String, FeatureSnapshot> = HashMap::new();
        let index = graph.input_index();

        for effect_id in active.effects() {
            let Some(effect) = graph.get_node(effect_id.as_str()) else {
                continue;
            };
            if effect.node_type != AUDIO_REACTIVE {
                continue;
            }

            let inputs = index.get(effect_id.as_str());
            if inputs.is_empty() {
                trace!(effect = %effect_id, "audio-reactive node has no inputs");
                continue;
            }

            let params = AudioReactiveParams::from_params(&effect.params);
            let Some(target) = params.target else {
                trace!(effect = %effect_id, "unsupported target property");
                report.unsupported_targets += 1;
                continue;
            };
            report.effects += 1;

            let source_id = params.source_id(&self.config.default_source_id);
            let amplitude = read
                .entry_ref(source_id)
                .or_insert_with(|| features.features(source_id))
                .amplitude;
            let drive = amplitude * params.sensitivity;

            let mut local = TickReport::default();
            let outcome = catch_unwind(AssertUnwindSafe(|| {
                for &input in inputs {
                    self.bind_one(graph, input, target, drive, handles, &mut local);
                }
            }));

            report.applied += local.applied;
            report.missing_handles += local.missing_handles;
            report.missing_nodes += local.missing_nodes;
            report.missing_color += local.missing_color;
            if outcome.is_err() {
                warn!(effect = %effect_id, "live handle panicked, skipping effect this tick");
                report.panicked += 1;
            }
        }

        report
    }

    fn bind_one(
        &self,
        graph: &GraphSnapshot,
        input: &NodeId,
        target: TargetProperty,
        drive: f32,
        handles: &mut HandleRegistry,
        report: &mut TickReport,
    ) {
        let Some(node) = graph.get_node(input.as_str()) else {
            trace!(%input, "dangling input");
            report.missing_nodes += 1;
            return;
        };
        let Some(handle) = handles.get_mut(input.as_str()) else {
            trace!(%input, "no live handle mounted");
            report.missing_handles += 1;
            return;
        };

        if apply_target(node, handle, target, drive, self.config.rotation_step) {
            report.applied += 1;
        } else {
            report.missing_color += 1;
        }
    }
}

/// Write one transform. Returns `false` if the handle lacks the channel.
fn apply_target(
    node: &Node,
    handle: &mut dyn LiveHandle,
    target: TargetProperty,
    drive: f32,
    rotation_step: f32,
) -> bool {
    match target {
        TargetProperty::Scale => {
            let base = base_scale(&node.params) as f32;
            handle.set_scale(base * (1.0 + drive));
            true
        }
        TargetProperty::Rotation => {
            handle.set_rotation(handle.rotation() + drive * rotation_step);
            true
        }
        TargetProperty::Color => match handle.color_mut() {
            // Not clamped: sensitivity above 1 can push this past 1.
            Some(color) => {
                *color = Rgb::gray(0.5 + drive * 0.5);
                true
            }
            None => false,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphStore;
    use crate::node::{Edge, Node};
    use crate::resolve::{resolve, Traversal};

    fn loud(amplitude: f32) -> impl FnMut(&str) -> FeatureSnapshot {
        move |_| FeatureSnapshot {
            amplitude,
            frequencies: vec![128; 4],
            average_frequency: amplitude,
        }
    }

    fn reactive(target: &str, sensitivity: f64) -> Node {
        Node::effect("fx", AUDIO_REACTIVE)
            .with_param("targetProperty", target)
            .with_param("sensitivity", sensitivity)
    }

    fn graph(effect: Node) -> GraphStore {
        let mut store = GraphStore::new();
        store.add_node(Node::source("ball", "SphereNode").with_param("scale", 1.5));
        store.add_node(effect);
        store.add_edge(Edge::new("e1", "ball", "fx"));
        store.add_edge(Edge::new("e2", "fx", "output-1"));
        store
    }

    fn tick(store: &GraphStore, handles: &mut HandleRegistry, amplitude: f32) -> TickReport {
        let active = resolve(store.snapshot(), Traversal::PerPath);
        ReactiveBinding::default().apply(store.snapshot(), &active, &mut loud(amplitude), handles)
    }

    #[test]
    fn scale_uses_base_scale() {
        let store = graph(reactive("scale", 2.0));
        let mut handles = HandleRegistry::new();
        handles.mount("ball", MeshHandle::new());

        let report = tick(&store, &mut handles, 0.5);
        assert_eq!(report.applied, 1);
        assert_eq!(handles.get("ball").unwrap().scale(), 3.0);
    }

    #[test]
    fn rotation_accumulates() {
        let store = graph(reactive("rotation", 1.0));
        let mut handles = HandleRegistry::new();
        handles.mount("ball", MeshHandle::new());

        tick(&store, &mut handles, 1.0);
        tick(&store, &mut handles, 1.0);
        assert!((handles.get("ball").unwrap().rotation() - 0.2).abs() < 1e-6);
    }

    #[test]
    fn color_is_unclamped_gray() {
        let store = graph(reactive("color", 3.0));
        let mut handles = HandleRegistry::new();
        handles.mount("ball", MeshHandle::new().with_color(Rgb::WHITE));

        tick(&store, &mut handles, 1.0);
        let mut handle = handles.unmount("ball").unwrap();
        assert_eq!(*handle.color_mut().unwrap(), Rgb::gray(2.0));
    }

    #[test]
    fn color_without_channel_is_skipped() {
        let store = graph(reactive("color", 1.0));
        let mut handles = HandleRegistry::new();
        handles.mount("ball", MeshHandle::new());

        let report = tick(&store, &mut handles, 1.0);
        assert_eq!(report.missing_color, 1);
        assert_eq!(report.applied, 0);
    }

    #[test]
    fn unmounted_inputs_are_skipped() {
        let store = graph(reactive("scale", 1.0));
        let mut handles = HandleRegistry::new();

        let report = tick(&store, &mut handles, 1.0);
        assert_eq!(report.effects, 1);
        assert_eq!(report.missing_handles, 1);
    }

    #[test]
    fn unknown_target_binds_nothing() {
        let store = graph(reactive("wobble", 1.0));
        let mut handles = HandleRegistry::new();
        handles.mount("ball", MeshHandle::new());

        let report = tick(&store, &mut handles, 1.0);
        assert_eq!(report.unsupported_targets, 1);
        assert_eq!(handles.get("ball").unwrap().scale(), 1.0);
    }

    #[test]
    fn explicit_source_id_is_used() {
        let store = graph(reactive("scale", 1.0).with_param("audioSourceId", "song"));
        let mut handles = HandleRegistry::new();
        handles.mount("ball", MeshHandle::new());

        let mut asked = Vec::new();
        let mut source = |id: &str| {
            asked.push(id.to_owned());
            FeatureSnapshot::silent()
        };
        let active = resolve(store.snapshot(), Traversal::PerPath);
        ReactiveBinding::default().apply(store.snapshot(), &active, &mut source, &mut handles);
        assert_eq!(asked, ["song"]);
    }

    struct Exploding;

    impl LiveHandle for Exploding {
        fn scale(&self) -> f32 {
            1.0
        }
        fn set_scale(&mut self, _: f32) {
            panic!("renderer went away");
        }
        fn rotation(&self) -> f32 {
            0.0
        }
        fn set_rotation(&mut self, _: f32) {}
    }

    #[test]
    fn panicking_handle_is_contained() {
        let mut store = graph(reactive("scale", 1.0));
        store.add_node(Node::source("other", "SphereNode"));
        store.add_node(Node::effect("fx2", AUDIO_REACTIVE));
        store.add_edge(Edge::new("e3", "other", "fx2"));

        let mut handles = HandleRegistry::new();
        handles.mount("ball", Exploding);
        handles.mount("other", MeshHandle::new());

        let report = tick(&store, &mut handles, 1.0);
        assert_eq!(report.panicked, 1);
        assert_eq!(report.applied, 1);
        assert_eq!(handles.get("other").unwrap().scale(), 2.0);
    }
}
