//! Prompt provenance: walk the host's graph snapshot backward from a conditioning input to
//! the text-encode node that produced it and recover the literal prompt.
//!
//! Every failure path (missing node, cycle, unknown class, linked text field) yields `None`.

use hashbrown::HashSet;
use indexmap::IndexMap;
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::slot::is_reserved;

/// One node of the host graph snapshot.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    #[serde(default)]
    pub class_type: String,
    #[serde(default)]
    pub inputs: IndexMap<String, JsonValue>,
}

/// Node id -> record, in the snapshot's natural order.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GraphMap {
    pub nodes: IndexMap<String, NodeRecord>,
}

impl GraphMap {
    /// Lenient decode: nodes that are not `{class_type, inputs}` objects are skipped.
    pub fn from_json(json: &JsonValue) -> GraphMap {
        let Some(obj) = json.as_object() else {
            return GraphMap::default();
        };
        let nodes = obj
            .iter()
            .filter_map(|(id, node)| match NodeRecord::deserialize(node) {
                Ok(record) => Some((id.clone(), record)),
                Err(err) => {
                    debug!("provenance: skipping malformed node '{id}': {err}");
                    None
                }
            })
            .collect();
        GraphMap { nodes }
    }

    pub fn get(&self, id: &str) -> Option<&NodeRecord> {
        self.nodes.get(id)
    }
}

/// `[upstream_node_id, output_index]`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Link {
    pub node_id: String,
    pub output: usize,
}

impl Link {
    pub fn parse(value: &JsonValue) -> Option<Link> {
        let [id, output] = value.as_array()?.as_slice() else {
            return None;
        };
        let node_id = match id {
            JsonValue::String(s) => s.clone(),
            JsonValue::Number(n) if n.is_u64() || n.is_i64() => n.to_string(),
            _ => return None,
        };
        let output = usize::try_from(output.as_u64()?).ok()?;
        Some(Link { node_id, output })
    }
}

/// Literal text fields per output of the known text-encode classes.
fn encoder_outputs(class_type: &str) -> Option<&'static [&'static [&'static str]]> {
    let outputs: &'static [&'static [&'static str]] = match class_type {
        "CLIPTextEncode" | "CLIPTextEncodeSDXLRefiner" => &[&["text"]],
        "CLIPTextEncodeSDXL" => &[&["text_g", "text_l"]],
        "CLIPTextEncodeFlux" => &[&["clip_l", "t5xxl"]],
        "PT_DualCLIPEncode" => &[&["positive"], &["negative"]],
        _ => return None,
    };
    Some(outputs)
}

/// Prompt text feeding output `output_index` of `node_id`.
pub fn extract_text(graph: &GraphMap, node_id: &str, output_index: usize) -> Option<String> {
    let mut visited = HashSet::new();
    walk(graph, node_id, output_index, &mut visited)
}

/// Prompt text feeding input `input_key` of `node_id` (typically the preview node itself).
pub fn text_for_input(graph: &GraphMap, node_id: &str, input_key: &str) -> Option<String> {
    let link = graph
        .get(node_id)
        .and_then(|node| node.inputs.get(input_key))
        .and_then(Link::parse)?;
    extract_text(graph, &link.node_id, link.output)
}

fn walk<'g>(
    graph: &'g GraphMap,
    node_id: &'g str,
    output_index: usize,
    visited: &mut HashSet<&'g str>,
) -> Option<String> {
    let (id, node) = graph.nodes.get_key_value(node_id)?;
    if !visited.insert(id.as_str()) {
        debug!("provenance: cycle at node {node_id}");
        return None;
    }

    if let Some(outputs) = encoder_outputs(&node.class_type) {
        let fields = outputs.get(output_index)?;
        let parts: Vec<&str> = fields
            .iter()
            .filter_map(|field| node.inputs.get(*field)?.as_str())
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .collect();
        return (!parts.is_empty()).then(|| parts.join("\n"));
    }

    node.inputs
        .iter()
        .filter(|(key, _)| !is_reserved(key))
        .filter_map(|(_, value)| Link::parse(value))
        .find_map(|link| {
            let (upstream, _) = graph.nodes.get_key_value(link.node_id.as_str())?;
            walk(graph, upstream.as_str(), link.output, visited)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn graph(json: JsonValue) -> GraphMap {
        GraphMap::from_json(&json)
    }

    #[test]
    fn follows_passthrough_to_encoder() {
        let g = graph(json!({
            "1": { "class_type": "CLIPTextEncode", "inputs": { "text": "a cat", "clip": ["4", 1] } },
            "2": { "class_type": "PT_Conditioning", "inputs": { "positive": ["1", 0], "note": "not a prompt" } },
            "3": { "class_type": "PT_DynamicPreview", "inputs": { "input_1": ["2", 0] } },
        }));
        assert_eq!(extract_text(&g, "2", 0).as_deref(), Some("a cat"));
        assert_eq!(text_for_input(&g, "3", "input_1").as_deref(), Some("a cat"));
    }

    #[test]
    fn cycle_terminates_with_none() {
        let g = graph(json!({
            "1": { "class_type": "PT_Conditioning", "inputs": { "positive": ["2", 0] } },
            "2": { "class_type": "PT_Conditioning", "inputs": { "positive": ["1", 0] } },
        }));
        assert_eq!(extract_text(&g, "1", 0), None);
    }

    #[test]
    fn linked_text_field_is_not_a_prompt() {
        let g = graph(json!({
            "1": { "class_type": "CLIPTextEncode", "inputs": { "text": ["5", 0] } },
            "5": { "class_type": "PrimitiveString", "inputs": { "value": "hidden" } },
        }));
        assert_eq!(extract_text(&g, "1", 0), None);
    }

    #[test]
    fn multi_field_encoders_join_non_blank_fields() {
        let g = graph(json!({
            "7": { "class_type": "CLIPTextEncodeSDXL", "inputs": { "text_g": "global", "text_l": "  " } },
            "8": { "class_type": "CLIPTextEncodeFlux", "inputs": { "clip_l": "short", "t5xxl": "long" } },
        }));
        assert_eq!(extract_text(&g, "7", 0).as_deref(), Some("global"));
        assert_eq!(extract_text(&g, "8", 0).as_deref(), Some("short\nlong"));
    }

    #[test]
    fn dual_encoder_maps_outputs_to_fields() {
        let g = graph(json!({
            "9": { "class_type": "PT_DualCLIPEncode", "inputs": { "positive": "sunny", "negative": "blurry" } },
            "10": { "class_type": "PT_Conditioning", "inputs": { "positive": ["9", 0], "negative": [9, 1] } },
        }));
        assert_eq!(extract_text(&g, "9", 1).as_deref(), Some("blurry"));
        assert_eq!(extract_text(&g, "9", 2), None);
        assert_eq!(text_for_input(&g, "10", "negative").as_deref(), Some("blurry"));
    }

    #[test]
    fn missing_nodes_and_malformed_graphs_degrade() {
        assert_eq!(extract_text(&GraphMap::default(), "1", 0), None);
        let g = graph(json!({ "1": "garbage", "2": { "class_type": "X", "inputs": { "_hidden": ["1", 0] } } }));
        assert!(g.get("1").is_none());
        assert_eq!(extract_text(&g, "2", 0), None);
        assert_eq!(GraphMap::from_json(&json!([1, 2])), GraphMap::default());
    }

    #[test]
    fn first_resolving_link_wins_in_key_order() {
        let g = graph(json!({
            "1": { "class_type": "CLIPTextEncode", "inputs": { "text": "first" } },
            "2": { "class_type": "CLIPTextEncode", "inputs": { "text": "second" } },
            "3": { "class_type": "ConditioningCombine", "inputs": { "conditioning_1": ["404", 0], "conditioning_2": ["2", 0], "conditioning_3": ["1", 0] } },
        }));
        assert_eq!(extract_text(&g, "3", 0).as_deref(), Some("second"));
    }
}
