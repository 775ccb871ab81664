//! Dynamic preview rendering.
//!
//! Inputs are walked in slot order. Image-like tensors are saved frame by frame through an
//! [`ImageSink`], mask-like tensors are expanded to RGB first, and every other value becomes
//! a capped text entry. Conditioning lists show the prompt recovered by the provenance walk
//! when the host supplied a graph snapshot.

mod sink;

pub use sink::{encode_png, frame_to_bytes, TempDirSink};

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tojioo_api_core::json::to_plain_json;
use tojioo_api_core::{ShapeError, Tensor, TensorLike, Value};

use crate::error::NodeError;
use crate::provenance::{text_for_input, GraphMap};
use crate::slot::sort_by_slot;

pub const TRUNCATION_MARKER: &str = "\n... (truncated)";

/// Channel counts accepted as an image's colour axis.
const IMAGE_CHANNELS: [usize; 3] = [1, 3, 4];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    pub filename: String,
    pub subfolder: String,
    #[serde(rename = "type")]
    pub storage: String,
    pub slot: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextEntry {
    pub slot: usize,
    pub text: String,
}

/// UI payload returned by the preview node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviewUi {
    pub preview_data: Vec<ImageRef>,
    pub text_data: Vec<TextEntry>,
}

/// Location of a saved frame, relative to the sink's storage class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedImage {
    pub filename: String,
    pub subfolder: String,
}

/// File-saving capability supplied by the host.
pub trait ImageSink {
    /// Persist one `H,W,C` frame (C in 1/3/4, values in `0..=1`) with PNG text metadata.
    fn save(&mut self, frame: &Tensor, metadata: &[(String, String)]) -> Result<SavedImage, NodeError>;

    /// Storage class reported to the UI.
    fn storage_type(&self) -> &str {
        "temp"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreviewClass {
    Image,
    Mask,
    Text,
}

/// Decide how a tensor is shown. Image checks run first, so `3,H,W` is an image.
pub fn classify(tensor: &Tensor) -> PreviewClass {
    let shape = tensor.shape();
    let channel = |c: usize| IMAGE_CHANNELS.contains(&c);
    let image = match shape {
        [_, _, _, last] if channel(*last) => true,
        [_, _, last] if channel(*last) => true,
        [_, c, _, _] if channel(*c) => true,
        [c, _, _] if *c == 3 || *c == 4 => true,
        _ => false,
    };
    if image {
        return PreviewClass::Image;
    }
    match shape {
        [_, _] => PreviewClass::Mask,
        [b, _, _] if *b != 3 && *b != 4 => PreviewClass::Mask,
        _ => PreviewClass::Text,
    }
}

/// Split an image tensor into channels-last frames.
pub fn image_frames(tensor: &Tensor) -> Result<Vec<Tensor>, ShapeError> {
    let frames = match tensor.dim() {
        4 => (0..tensor.shape()[0])
            .map(|i| tensor.frame(i))
            .collect::<Result<Vec<_>, _>>()?,
        3 => vec![tensor.clone()],
        _ => Vec::new(),
    };
    frames
        .into_iter()
        .map(|frame| {
            let channel_first = matches!(
                frame.shape(),
                [c, _, last] if !IMAGE_CHANNELS.contains(last) && IMAGE_CHANNELS.contains(c)
            );
            if channel_first {
                frame.channels_last()
            } else {
                Ok(frame)
            }
        })
        .collect()
}

/// Split a mask into RGB frames (`H,W` -> `H,W,3`).
pub fn mask_frames(tensor: &Tensor) -> Result<Vec<Tensor>, ShapeError> {
    match tensor.dim() {
        2 => Ok(vec![gray_to_rgb(tensor)?]),
        3 => (0..tensor.shape()[0])
            .map(|i| tensor.frame(i).and_then(|frame| gray_to_rgb(&frame)))
            .collect(),
        _ => Ok(Vec::new()),
    }
}

fn gray_to_rgb(mask: &Tensor) -> Result<Tensor, ShapeError> {
    let &[h, w] = mask.shape() else {
        return Err(ShapeError::Rank {
            kind: "MASK frame".to_string(),
            expected: 2,
            shape: mask.shape().to_vec(),
        });
    };
    let data = mask.data().iter().flat_map(|&v| [v, v, v]).collect();
    Tensor::new(vec![h, w, 3], data)
}

/// Cap `text` at `max_chars` characters, appending the truncation marker.
pub fn truncate_text(text: String, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => {
            let mut capped = text[..cut].to_string();
            capped.push_str(TRUNCATION_MARKER);
            capped
        }
        None => text,
    }
}

/// Shapes of a conditioning list's embeddings, or `None` when `value` is not one.
fn conditioning_shapes(value: &Value) -> Option<Vec<Vec<usize>>> {
    let Value::List(items) = value else {
        return None;
    };
    let first = items.first()?.as_items()?;
    if first.len() != 2 || first[0].as_tensor().is_none() {
        return None;
    }
    Some(
        items
            .iter()
            .filter_map(|entry| entry.as_items()?.first()?.as_tensor())
            .map(|t| t.shape().to_vec())
            .collect(),
    )
}

pub fn is_conditioning(value: &Value) -> bool {
    conditioning_shapes(value).is_some()
}

/// Text rendering for values that are not shown as images (before truncation).
pub fn value_to_text(value: &Value) -> String {
    if let Some(shapes) = conditioning_shapes(value) {
        let count = value.as_items().map_or(0, <[Value]>::len);
        return format!("CONDITIONING: {count} entries\nShapes: {shapes:?}");
    }
    match value {
        Value::Tensor(t) => format!("Tensor: shape={:?}, dtype=float32", t.shape()),
        Value::Bool(b) => b.to_string(),
        Value::Int(i) => i.to_string(),
        Value::Float(f) => f.to_string(),
        Value::Text(s) => s.clone(),
        Value::Handle { kind, id } => format!("<{kind} {id}>"),
        other => serde_json::to_string_pretty(&to_plain_json(other))
            .unwrap_or_else(|_| format!("{other:?}")),
    }
}

/// PNG text chunks: the prompt graph plus each extra info entry, JSON encoded.
pub fn metadata_chunks(prompt: Option<&JsonValue>, extra_pnginfo: Option<&JsonValue>) -> Vec<(String, String)> {
    let mut chunks = Vec::new();
    let mut push = |key: &str, value: &JsonValue| match serde_json::to_string(value) {
        Ok(text) => chunks.push((key.to_string(), text)),
        Err(err) => warn!("preview: skipping metadata '{key}': {err}"),
    };
    if let Some(prompt) = prompt {
        push("prompt", prompt);
    }
    match extra_pnginfo {
        Some(JsonValue::Object(extra)) => {
            for (key, value) in extra {
                push(key.as_str(), value);
            }
        }
        Some(JsonValue::Null) | None => {}
        Some(_) => debug!("preview: extra_pnginfo is not an object, ignoring"),
    }
    chunks
}

/// One preview invocation.
pub struct Previewer<'a> {
    pub sink: Option<&'a mut dyn ImageSink>,
    pub metadata: Vec<(String, String)>,
    pub graph: Option<&'a GraphMap>,
    pub unique_id: Option<&'a str>,
    pub max_text_len: usize,
}

impl<'a> Previewer<'a> {
    /// Render every input. Slot numbers count all inputs in slot order, connected or not.
    pub fn render<K: AsRef<str>>(
        mut self,
        mut inputs: Vec<(K, Option<Value>)>,
    ) -> Result<PreviewUi, NodeError> {
        sort_by_slot(&mut inputs);
        let mut ui = PreviewUi::default();

        for (slot, (key, value)) in inputs.into_iter().enumerate() {
            let Some(value) = value else {
                continue;
            };
            if let Value::Tensor(tensor) = &value {
                let frames = match classify(tensor) {
                    PreviewClass::Image => Some(image_frames(tensor)?),
                    PreviewClass::Mask => Some(mask_frames(tensor)?),
                    PreviewClass::Text => None,
                };
                if let Some(frames) = frames {
                    for frame in frames.iter().filter(|f| f.dim() == 3) {
                        ui.preview_data.push(self.save(frame, slot)?);
                    }
                    continue;
                }
            }
            let text = self
                .prompt_text(key.as_ref(), &value)
                .unwrap_or_else(|| value_to_text(&value));
            ui.text_data.push(TextEntry {
                slot,
                text: truncate_text(text, self.max_text_len),
            });
        }
        Ok(ui)
    }

    fn prompt_text(&self, key: &str, value: &Value) -> Option<String> {
        if !is_conditioning(value) {
            return None;
        }
        let resolved = text_for_input(self.graph?, self.unique_id?, key);
        if resolved.is_none() {
            debug!("preview: no prompt text found for '{key}'");
        }
        resolved
    }

    fn save(&mut self, frame: &Tensor, slot: usize) -> Result<ImageRef, NodeError> {
        let sink = self
            .sink
            .as_deref_mut()
            .ok_or_else(|| NodeError::MissingCollaborator {
                node: "Dynamic Preview".to_string(),
                collaborator: "image sink",
            })?;
        let saved = sink.save(frame, &self.metadata)?;
        Ok(ImageRef {
            filename: saved.filename,
            subfolder: saved.subfolder,
            storage: sink.storage_type().to_string(),
            slot,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Default)]
    struct RecordingSink {
        frames: Vec<Vec<usize>>,
        metadata: Vec<(String, String)>,
    }

    impl ImageSink for RecordingSink {
        fn save(&mut self, frame: &Tensor, metadata: &[(String, String)]) -> Result<SavedImage, NodeError> {
            self.frames.push(frame.shape().to_vec());
            self.metadata = metadata.to_vec();
            Ok(SavedImage {
                filename: format!("frame_{}.png", self.frames.len()),
                subfolder: String::new(),
            })
        }
    }

    fn previewer<'a>(sink: &'a mut RecordingSink) -> Previewer<'a> {
        Previewer {
            sink: Some(sink),
            metadata: Vec::new(),
            graph: None,
            unique_id: None,
            max_text_len: 2000,
        }
    }

    #[test]
    fn classifies_images_masks_and_others() {
        assert_eq!(classify(&Tensor::zeros(vec![2, 8, 8, 3])), PreviewClass::Image);
        assert_eq!(classify(&Tensor::zeros(vec![1, 3, 8, 8])), PreviewClass::Image);
        assert_eq!(classify(&Tensor::zeros(vec![3, 8, 8])), PreviewClass::Image);
        assert_eq!(classify(&Tensor::zeros(vec![8, 8])), PreviewClass::Mask);
        assert_eq!(classify(&Tensor::zeros(vec![2, 8, 8])), PreviewClass::Mask);
        assert_eq!(classify(&Tensor::zeros(vec![1, 4, 77, 768])), PreviewClass::Image);
        assert_eq!(classify(&Tensor::zeros(vec![5])), PreviewClass::Text);
        assert_eq!(classify(&Tensor::zeros(vec![2, 16, 8, 8])), PreviewClass::Text);
    }

    #[test]
    fn channel_first_frames_are_permuted() {
        let frames = image_frames(&Tensor::zeros(vec![2, 3, 5, 7])).expect("frames");
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].shape(), &[5, 7, 3]);
    }

    #[test]
    fn masks_expand_to_rgb() {
        let frames = mask_frames(&Tensor::filled(vec![2, 4, 4], 0.5)).expect("frames");
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1].shape(), &[4, 4, 3]);
        assert!(frames[1].data().iter().all(|v| (*v - 0.5).abs() < f32::EPSILON));
    }

    #[test]
    fn truncation_is_char_based() {
        let long = "é".repeat(10);
        let capped = truncate_text(long, 4);
        assert_eq!(capped, format!("éééé{TRUNCATION_MARKER}"));
        assert_eq!(truncate_text("short".into(), 5), "short");
    }

    #[test]
    fn conditioning_summary_lists_shapes() {
        let entry = Value::Tuple(vec![
            Value::Tensor(Tensor::zeros(vec![1, 77, 768])),
            Value::record(Vec::<(String, Value)>::new()),
        ]);
        let cond = Value::List(vec![entry.clone(), entry]);
        assert_eq!(
            value_to_text(&cond),
            "CONDITIONING: 2 entries\nShapes: [[1, 77, 768], [1, 77, 768]]"
        );
        assert_eq!(value_to_text(&Value::Int(3)), "3");
        assert_eq!(
            value_to_text(&Value::Tensor(Tensor::zeros(vec![5]))),
            "Tensor: shape=[5], dtype=float32"
        );
    }

    #[test]
    fn render_orders_by_slot_and_splits_images_from_text() {
        let mut sink = RecordingSink::default();
        let ui = previewer(&mut sink)
            .render(vec![
                ("input_3", Some(Value::text("third"))),
                ("input_1", Some(Value::Tensor(Tensor::zeros(vec![2, 4, 4, 3])))),
                ("input_2", None),
                ("input_4", Some(Value::Tensor(Tensor::zeros(vec![4, 4])))),
            ])
            .expect("render");
        let slots: Vec<_> = ui.preview_data.iter().map(|r| r.slot).collect();
        assert_eq!(slots, vec![0, 0, 3]);
        assert_eq!(ui.text_data, vec![TextEntry { slot: 2, text: "third".into() }]);
        assert!(ui.preview_data.iter().all(|r| r.storage == "temp"));
        assert_eq!(sink.frames, vec![vec![4, 4, 3], vec![4, 4, 3], vec![4, 4, 3]]);
    }

    #[test]
    fn images_without_sink_are_an_error() {
        let err = Previewer {
            sink: None,
            metadata: Vec::new(),
            graph: None,
            unique_id: None,
            max_text_len: 10,
        }
        .render(vec![("input_1", Some(Value::Tensor(Tensor::zeros(vec![4, 4, 3]))))])
        .expect_err("no sink");
        assert!(matches!(err, NodeError::MissingCollaborator { .. }));
    }

    #[test]
    fn conditioning_uses_resolved_prompt() {
        let graph = GraphMap::from_json(&json!({
            "1": { "class_type": "CLIPTextEncode", "inputs": { "text": "a red fox" } },
            "5": { "class_type": "PT_DynamicPreview", "inputs": { "input_1": ["1", 0] } },
        }));
        let cond = Value::List(vec![Value::Tuple(vec![
            Value::Tensor(Tensor::zeros(vec![1, 77, 768])),
            Value::record(Vec::<(String, Value)>::new()),
        ])]);
        let ui = Previewer {
            sink: None,
            metadata: Vec::new(),
            graph: Some(&graph),
            unique_id: Some("5"),
            max_text_len: 2000,
        }
        .render(vec![("input_1", Some(cond))])
        .expect("render");
        assert_eq!(ui.text_data[0].text, "a red fox");
    }

    #[test]
    fn metadata_chunks_encode_prompt_and_extras() {
        let chunks = metadata_chunks(
            Some(&json!({ "1": { "class_type": "X" } })),
            Some(&json!({ "workflow": { "nodes": [] } })),
        );
        let keys: Vec<_> = chunks.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["prompt", "workflow"]);
        assert_eq!(chunks[1].1, r#"{"nodes":[]}"#);
        assert!(metadata_chunks(None, Some(&json!(3))).is_empty());
    }
}
