//! The output node type.

use crate::node::{Node, NodeKind};
use crate::params::{Params, Vec3};

pub const OUTPUT: &str = "OutputNode";

/// Id of the output node created by [`GraphStore::clear_graph`](crate::GraphStore::clear_graph).
pub const DEFAULT_OUTPUT_ID: &str = "output-1";

const DEFAULT_CAMERA: Vec3 = Vec3 { x: 0.0, y: 0.0, z: 5.0 };

/// View over an [`OUTPUT`] node's parameters.
#[derive(Clone, Debug, PartialEq)]
pub struct OutputParams {
    pub camera_position: Vec3,
}

impl OutputParams {
    pub fn from_params(params: &Params) -> Self {
        Self {
            camera_position: params.vec3("cameraPosition").unwrap_or(DEFAULT_CAMERA),
        }
    }

    pub fn defaults() -> Params {
        Params::new().with("cameraPosition", DEFAULT_CAMERA)
    }
}

/// The output node a fresh graph starts with.
pub fn default_output() -> Node {
    Node::new(DEFAULT_OUTPUT_ID, NodeKind::Output, OUTPUT)
        .with_params(OutputParams::defaults())
        .at(600.0, 200.0)
}
