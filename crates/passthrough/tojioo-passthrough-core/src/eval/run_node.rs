//! Per-node execution: one body per [`NodeKind`].

use log::debug;
use tojioo_api_core::Value;

use crate::batch::{merge_values, BatchKind};
use crate::bus::{self, StepOptions, BUS_INPUT};
use crate::error::NodeError;
use crate::preview::{metadata_chunks, ImageSink, Previewer};
use crate::provenance::GraphMap;
use crate::schema::NodeSignature;
use crate::slot::{compare_slot_keys, family_index, is_reserved, DEFAULT_SLOT};
use crate::types::{NodeKind, NodeOutput};

use super::{NodeInputs, RunContext};

/// Hidden keywords the preview node receives next to its dynamic inputs.
const PREVIEW_HIDDEN: &[&str] = &["prompt", "extra_pnginfo", "unique_id"];

pub fn run_node(
    signature: &NodeSignature,
    mut inputs: NodeInputs,
    ctx: RunContext<'_>,
) -> Result<NodeOutput, NodeError> {
    debug!(
        "run {} with inputs {:?}",
        signature.class_name,
        inputs.keys().collect::<Vec<_>>()
    );
    let values = match signature.kind {
        NodeKind::Passthrough
        | NodeKind::MultiPass
        | NodeKind::Conditioning => echo_outputs(signature, &inputs),
        NodeKind::Switch => vec![Some(first_connected(signature, inputs)?)],
        NodeKind::BatchSwitch(kind) => vec![Some(batch_switch(signature, kind, inputs)?)],
        NodeKind::DynamicAny => {
            let value = inputs
                .shift_remove("input_1")
                .flatten()
                .or_else(|| inputs.shift_remove("input").flatten());
            vec![value]
        }
        NodeKind::DynamicPassthrough => dynamic_passthrough(signature.outputs.len(), inputs),
        NodeKind::DynamicBus => dynamic_bus(signature.outputs.len(), inputs),
        NodeKind::DynamicPreview => return dynamic_preview(inputs, ctx),
        NodeKind::DualClipEncode => dual_clip_encode(signature, inputs, &ctx)?,
        NodeKind::TiledVaeSettings => tiled_vae_settings(signature, &inputs),
    };
    Ok(NodeOutput::Values(values))
}

/// Outputs named like inputs echo them; anything unconnected is `None`.
fn echo_outputs(signature: &NodeSignature, inputs: &NodeInputs) -> Vec<Option<Value>> {
    signature
        .output_names()
        .map(|name| inputs.get(name).cloned().flatten())
        .collect()
}

/// Connected inputs of the switch's family in slot order.
fn connected_family(signature: &NodeSignature, inputs: NodeInputs) -> Vec<(String, Value)> {
    let prefix = signature
        .dynamic_inputs
        .as_ref()
        .and_then(|d| d.prefix.as_deref())
        .unwrap_or("");
    let mut connected: Vec<(String, Value)> = inputs
        .into_iter()
        .filter(|(key, _)| family_index(key, prefix).is_some())
        .filter_map(|(key, value)| Some((key, value?)))
        .collect();
    connected.sort_by(|(a, _), (b, _)| compare_slot_keys(a, b));
    connected
}

fn first_connected(signature: &NodeSignature, inputs: NodeInputs) -> Result<Value, NodeError> {
    connected_family(signature, inputs)
        .into_iter()
        .next()
        .map(|(_, value)| value)
        .ok_or_else(|| NodeError::no_input(&signature.display_name))
}

fn batch_switch(signature: &NodeSignature, kind: BatchKind, inputs: NodeInputs) -> Result<Value, NodeError> {
    let mut values: Vec<Value> = connected_family(signature, inputs)
        .into_iter()
        .map(|(_, value)| value)
        .collect();
    match values.len() {
        0 => Err(NodeError::no_typed_input(&signature.display_name, kind.type_name())),
        1 => Ok(values.swap_remove(0)),
        _ => merge_values(kind, &signature.display_name, values),
    }
}

/// `input_N` feeds output `N - 1`; keys without a suffix feed the first output.
fn dynamic_passthrough(width: usize, inputs: NodeInputs) -> Vec<Option<Value>> {
    let mut outputs = vec![None; width];
    for (key, value) in inputs {
        if is_reserved(&key) {
            continue;
        }
        let Some(value) = value else {
            continue;
        };
        let slot = bus::bus_slot(&key).unwrap_or(DEFAULT_SLOT);
        match slot.checked_sub(1).and_then(|idx| outputs.get_mut(idx)) {
            Some(out) => *out = Some(value),
            None => debug!("dynamic passthrough: '{key}' is outside the {width} outputs"),
        }
    }
    outputs
}

fn text_input(inputs: &mut NodeInputs, key: &str, default: &str) -> String {
    inputs
        .shift_remove(key)
        .flatten()
        .and_then(|v| match v {
            Value::Text(s) => Some(s),
            Value::Int(i) => Some(i.to_string()),
            _ => None,
        })
        .unwrap_or_else(|| default.to_string())
}

fn dynamic_bus(width: usize, mut inputs: NodeInputs) -> Vec<Option<Value>> {
    let incoming = inputs.shift_remove(BUS_INPUT).flatten();
    let options = StepOptions::from_hidden(
        &text_input(&mut inputs, "_slot_types", ""),
        &text_input(&mut inputs, "_output_hints", ""),
        &text_input(&mut inputs, "_overwrite_mode", "0"),
    );
    bus::step(incoming, inputs, &options, width).into_tuple()
}

fn dynamic_preview(mut inputs: NodeInputs, ctx: RunContext<'_>) -> Result<NodeOutput, NodeError> {
    for key in PREVIEW_HIDDEN {
        inputs.shift_remove(*key);
    }
    let slots: Vec<(String, Option<Value>)> = inputs
        .into_iter()
        .filter(|(key, _)| !is_reserved(key))
        .collect();

    let graph = ctx.prompt.map(GraphMap::from_json);
    let previewer = Previewer {
        sink: ctx.image_sink.map(|sink| sink as &mut dyn ImageSink),
        metadata: metadata_chunks(ctx.prompt, ctx.extra_pnginfo),
        graph: graph.as_ref(),
        unique_id: ctx.unique_id,
        max_text_len: ctx.config.max_text_len,
    };
    previewer.render(slots).map(NodeOutput::Ui)
}

fn dual_clip_encode(
    signature: &NodeSignature,
    mut inputs: NodeInputs,
    ctx: &RunContext<'_>,
) -> Result<Vec<Option<Value>>, NodeError> {
    let Some(clip) = inputs.shift_remove("clip").flatten() else {
        debug!("{}: no clip connected, emitting empty conditioning", signature.class_name);
        return Ok(vec![Some(Value::List(Vec::new())), Some(Value::List(Vec::new()))]);
    };
    let encoder = ctx.text_encoder.ok_or_else(|| NodeError::MissingCollaborator {
        node: signature.display_name.clone(),
        collaborator: "text encoder",
    })?;
    let positive = text_input(&mut inputs, "positive", "");
    let negative = text_input(&mut inputs, "negative", "");
    Ok(vec![
        Some(encoder.encode(&clip, &positive)?),
        Some(encoder.encode(&clip, &negative)?),
    ])
}

/// Widget values (or their defaults) clamped into range.
fn tiled_vae_settings(signature: &NodeSignature, inputs: &NodeInputs) -> Vec<Option<Value>> {
    signature
        .required
        .iter()
        .map(|port| {
            let widget = port.widget.as_ref()?;
            let default = widget.default.as_i64().unwrap_or_default();
            let value = inputs
                .get(&port.name)
                .and_then(|v| v.as_ref())
                .and_then(Value::as_int)
                .unwrap_or(default);
            Some(Value::Int(widget.clamp_int(value)))
        })
        .collect()
}
