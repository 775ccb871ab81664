//! Shape grouping and batch merging for the batch-switch nodes.
//!
//! Values are normalised to their kind's canonical rank, grouped by trailing shape
//! (batch axis excluded), and the group with the largest total batch wins. Ties go to the
//! group encountered first. A winning group of one returns that input untouched.

use std::borrow::Cow;
use std::hash::Hash;

use indexmap::IndexMap;
use log::debug;
use serde::{Deserialize, Serialize};
use tojioo_api_core::{ShapeError, Tensor, TensorLike, Value};

use crate::error::NodeError;

/// Keys dropped from a merged latent because they describe individual batch elements.
pub const BATCH_DEPENDENT_LATENT_KEYS: &[&str] = &["noise_mask", "batch_index"];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchKind {
    Image,
    Mask,
    Latent,
    Conditioning,
}

impl BatchKind {
    pub const ALL: [BatchKind; 4] = [
        BatchKind::Image,
        BatchKind::Mask,
        BatchKind::Latent,
        BatchKind::Conditioning,
    ];

    pub fn type_name(self) -> &'static str {
        match self {
            BatchKind::Image => "IMAGE",
            BatchKind::Mask => "MASK",
            BatchKind::Latent => "LATENT",
            BatchKind::Conditioning => "CONDITIONING",
        }
    }

    /// Canonical batched rank of the tensor payload (`B,H,W,C` / `B,H,W` / `B,C,H,W`).
    pub fn rank(self) -> Option<usize> {
        match self {
            BatchKind::Image | BatchKind::Latent => Some(4),
            BatchKind::Mask => Some(3),
            BatchKind::Conditioning => None,
        }
    }

    pub fn from_type_name(name: &str) -> Option<BatchKind> {
        BatchKind::ALL.into_iter().find(|k| k.type_name() == name)
    }
}

/// Outcome of grouping: either one untouched input or a merged batch.
#[derive(Clone, Debug, PartialEq)]
pub enum Selection<T> {
    Single(usize),
    Batched { members: Vec<usize>, value: T },
}

/// Indices of the group with the highest summed weight, in input order.
pub fn select_largest_group<K: Eq + Hash>(keys: &[K], weights: &[usize]) -> Vec<usize> {
    let mut groups: IndexMap<&K, (usize, Vec<usize>)> = IndexMap::new();
    for (idx, (key, weight)) in keys.iter().zip(weights).enumerate() {
        let group = groups.entry(key).or_insert_with(|| (0, Vec::new()));
        group.0 += weight;
        group.1.push(idx);
    }
    let mut best: Option<(usize, Vec<usize>)> = None;
    for (_, (score, members)) in groups {
        if best.as_ref().map_or(true, |(top, _)| score > *top) {
            best = Some((score, members));
        }
    }
    best.map(|(_, members)| members).unwrap_or_default()
}

/// Insert a missing leading batch axis, then require exactly `rank` axes.
pub fn normalize_rank<'a, T: TensorLike + Clone>(
    value: &'a T,
    rank: usize,
    kind: &str,
) -> Result<Cow<'a, T>, ShapeError> {
    let normalized = if value.dim() + 1 == rank {
        Cow::Owned(value.unsqueeze0())
    } else {
        Cow::Borrowed(value)
    };
    if normalized.dim() != rank {
        return Err(ShapeError::Rank {
            kind: kind.to_string(),
            expected: rank,
            shape: normalized.shape().to_vec(),
        });
    }
    Ok(normalized)
}

/// Group tensors by trailing shape and merge the largest group along the batch axis.
pub fn group_and_select<T: TensorLike + Clone>(
    values: &[T],
    rank: usize,
    kind: &str,
) -> Result<Selection<T>, ShapeError> {
    let normalized = values
        .iter()
        .map(|v| normalize_rank(v, rank, kind))
        .collect::<Result<Vec<_>, _>>()?;
    let keys: Vec<&[usize]> = normalized.iter().map(|t| t.trailing_shape()).collect();
    let weights: Vec<usize> = normalized.iter().map(|t| t.batch_size()).collect();

    let members = select_largest_group(&keys, &weights);
    if members.len() < values.len() {
        debug!(
            "batch: {kind} kept {} of {} inputs with trailing shape {:?}",
            members.len(),
            values.len(),
            members.first().map(|&i| keys[i])
        );
    }
    match members.as_slice() {
        [] => Err(ShapeError::Empty),
        [only] => Ok(Selection::Single(*only)),
        _ => {
            let parts: Vec<&T> = members.iter().map(|&i| normalized[i].as_ref()).collect();
            let value = T::cat0(&parts)?;
            Ok(Selection::Batched { members, value })
        }
    }
}

/// Grouping key for conditioning lists, taken from the first entry's embedding tensor.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ConditioningKey {
    Empty,
    Embedding { tokens: usize, width: usize },
    Opaque { len: usize },
}

pub fn conditioning_key(items: &[Value]) -> ConditioningKey {
    let Some(first) = items.first() else {
        return ConditioningKey::Empty;
    };
    let tensor = first
        .as_items()
        .and_then(|pair| pair.first())
        .and_then(Value::as_tensor);
    match tensor.map(|t| t.shape()) {
        Some([.., tokens, width]) => ConditioningKey::Embedding {
            tokens: *tokens,
            width: *width,
        },
        Some([width]) => ConditioningKey::Embedding {
            tokens: 1,
            width: *width,
        },
        _ => ConditioningKey::Opaque { len: items.len() },
    }
}

/// Merge two or more connected values of `kind`. `node` names the caller in errors.
pub fn merge_values(kind: BatchKind, node: &str, values: Vec<Value>) -> Result<Value, NodeError> {
    match kind {
        BatchKind::Image | BatchKind::Mask => merge_tensors(kind, node, values),
        BatchKind::Latent => merge_latents(node, values),
        BatchKind::Conditioning => merge_conditioning(node, values),
    }
}

fn take(mut values: Vec<Value>, index: usize) -> Value {
    values.swap_remove(index)
}

fn merge_tensors(kind: BatchKind, node: &str, values: Vec<Value>) -> Result<Value, NodeError> {
    let rank = kind.rank().unwrap_or(4);
    let tensors = values
        .iter()
        .map(|v| {
            v.as_tensor()
                .ok_or_else(|| NodeError::type_mismatch(node, format!("{} tensors", kind.type_name())))
        })
        .collect::<Result<Vec<&Tensor>, _>>()?;
    let owned: Vec<Tensor> = tensors.into_iter().cloned().collect();
    match group_and_select(&owned, rank, kind.type_name())? {
        Selection::Single(idx) => Ok(take(values, idx)),
        Selection::Batched { value, .. } => Ok(Value::Tensor(value)),
    }
}

fn merge_latents(node: &str, values: Vec<Value>) -> Result<Value, NodeError> {
    let mut samples = Vec::with_capacity(values.len());
    for value in &values {
        let record = value
            .as_record()
            .filter(|r| r.contains_key("samples"))
            .ok_or_else(|| NodeError::type_mismatch(node, "LATENT dicts with 'samples'"))?;
        let tensor = record
            .get("samples")
            .and_then(Value::as_tensor)
            .ok_or_else(|| NodeError::type_mismatch(node, "'samples' to be a Tensor"))?;
        samples.push(tensor.clone());
    }
    match group_and_select(&samples, 4, "LATENT samples")? {
        Selection::Single(idx) => Ok(take(values, idx)),
        Selection::Batched { members, value } => {
            let mut latent = match take(values, members[0]) {
                Value::Record(map) => map,
                _ => IndexMap::new(),
            };
            latent.insert("samples".to_string(), Value::Tensor(value));
            for key in BATCH_DEPENDENT_LATENT_KEYS {
                latent.shift_remove(*key);
            }
            Ok(Value::Record(latent))
        }
    }
}

fn merge_conditioning(node: &str, values: Vec<Value>) -> Result<Value, NodeError> {
    let mut keys = Vec::with_capacity(values.len());
    let mut weights = Vec::with_capacity(values.len());
    for value in &values {
        let Value::List(items) = value else {
            return Err(NodeError::type_mismatch(node, "CONDITIONING lists"));
        };
        keys.push(conditioning_key(items));
        weights.push(items.len());
    }
    let members = select_largest_group(&keys, &weights);
    if members.len() == 1 {
        return Ok(take(values, members[0]));
    }
    let mut slots: Vec<Option<Value>> = values.into_iter().map(Some).collect();
    let mut merged = Vec::new();
    for idx in members {
        if let Some(Value::List(items)) = slots[idx].take() {
            merged.extend(items);
        }
    }
    Ok(Value::List(merged))
}
