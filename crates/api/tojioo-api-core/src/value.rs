//! Value: runtime instances passed between host sockets.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::bus::Bus;
use crate::tensor::Tensor;

/// Lightweight kind enum for pattern-matching and log messages.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ValueKind {
    Bool,
    Int,
    Float,
    Text,
    Tensor,
    List,
    Tuple,
    Record,
    Handle,
    Bus,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum Value {
    Bool(bool),

    Int(i64),

    Float(f64),

    Text(String),

    /// Image, mask or latent sample data
    Tensor(Tensor),

    /// Ordered sequence; conditioning is a list of `Tuple([Tensor, Record])` pairs
    List(Vec<Value>),

    Tuple(Vec<Value>),

    /// String-keyed structure in natural key order (latent dicts, metadata)
    Record(IndexMap<String, Value>),

    /// Opaque host object (MODEL, CLIP, VAE, ...) referenced by id
    Handle { kind: String, id: String },

    /// Dynamic bus threaded between bus nodes
    Bus(Bus),
}

impl Value {
    /// Return the coarse kind of this value.
    #[inline]
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Bool(_) => ValueKind::Bool,
            Value::Int(_) => ValueKind::Int,
            Value::Float(_) => ValueKind::Float,
            Value::Text(_) => ValueKind::Text,
            Value::Tensor(_) => ValueKind::Tensor,
            Value::List(_) => ValueKind::List,
            Value::Tuple(_) => ValueKind::Tuple,
            Value::Record(_) => ValueKind::Record,
            Value::Handle { .. } => ValueKind::Handle,
            Value::Bus(_) => ValueKind::Bus,
        }
    }

    /// Convenience constructors
    pub fn text(s: impl Into<String>) -> Self {
        Value::Text(s.into())
    }

    pub fn handle(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Value::Handle {
            kind: kind.into(),
            id: id.into(),
        }
    }

    pub fn record<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        Value::Record(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn as_tensor(&self) -> Option<&Tensor> {
        match self {
            Value::Tensor(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&IndexMap<String, Value>> {
        match self {
            Value::Record(map) => Some(map),
            _ => None,
        }
    }

    /// Items of a `List` or `Tuple`.
    pub fn as_items(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) | Value::Tuple(items) => Some(items),
            _ => None,
        }
    }
}
