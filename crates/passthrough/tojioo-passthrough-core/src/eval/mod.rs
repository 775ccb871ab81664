//! Execution surface for registered nodes.
//!
//! The host calls [`run_node`] (or [`run_by_class`]) once per evaluation with the node's
//! keyword inputs. Everything a node needs beyond its inputs travels in [`RunContext`]:
//!
//! - the prompt graph snapshot and the node's unique id, for prompt provenance in previews;
//! - extra PNG info embedded next to the prompt in saved previews;
//! - an [`ImageSink`] for preview frames and a [`TextEncoder`] for the dual CLIP encoder;
//! - the [`PassthroughConfig`].

use indexmap::IndexMap;
use serde_json::Value as JsonValue;
use tojioo_api_core::Value;

use crate::config::PassthroughConfig;
use crate::error::NodeError;
use crate::preview::ImageSink;
use crate::schema::Registry;
use crate::types::NodeOutput;

pub mod run_node;

pub use run_node::run_node;


/// Ordered keyword inputs; `None` marks a disconnected or bypassed socket.
pub type NodeInputs = IndexMap<String, Option<Value>>;

/// Host CLIP text encoding.
pub trait TextEncoder {
    /// Encode `text` with the `clip` handle into a conditioning list.
    fn encode(&self, clip: &Value, text: &str) -> Result<Value, NodeError>;
}

/// Per-call collaborators and host metadata.
#[derive(Default)]
pub struct RunContext<'a> {
    /// Raw prompt graph (`node id -> {class_type, inputs}`).
    pub prompt: Option<&'a JsonValue>,
    pub unique_id: Option<&'a str>,
    pub extra_pnginfo: Option<&'a JsonValue>,
    pub image_sink: Option<&'a mut dyn ImageSink>,
    pub text_encoder: Option<&'a dyn TextEncoder>,
    pub config: PassthroughConfig,
}

impl<'a> RunContext<'a> {
    pub fn new(config: PassthroughConfig) -> Self {
        RunContext {
            config,
            ..RunContext::default()
        }
    }

    pub fn with_prompt(mut self, prompt: &'a JsonValue, unique_id: &'a str) -> Self {
        self.prompt = Some(prompt);
        self.unique_id = Some(unique_id);
        self
    }

    pub fn with_extra_pnginfo(mut self, extra: &'a JsonValue) -> Self {
        self.extra_pnginfo = Some(extra);
        self
    }

    pub fn with_sink(mut self, sink: &'a mut dyn ImageSink) -> Self {
        self.image_sink = Some(sink);
        self
    }

    pub fn with_encoder(mut self, encoder: &'a dyn TextEncoder) -> Self {
        self.text_encoder = Some(encoder);
        self
    }
}

/// Look `class_name` up in `registry` and run it.
pub fn run_by_class(
    registry: &Registry,
    class_name: &str,
    inputs: NodeInputs,
    ctx: RunContext<'_>,
) -> Result<NodeOutput, NodeError> {
    let signature = registry
        .get(class_name)
        .ok_or_else(|| NodeError::UnknownNode(class_name.to_string()))?;
    run_node(signature, inputs, ctx)
}
