//! Errors surfaced to the host as node execution failures.

use thiserror::Error;
use tojioo_api_core::ShapeError;

#[derive(Debug, Error)]
pub enum NodeError {
    /// A value had the wrong rank or trailing shape for its kind during batching.
    #[error(transparent)]
    Shape(#[from] ShapeError),

    /// A "first connected" or batching node received nothing to work with.
    #[error("{node}: no {what}inputs connected.")]
    NoInput { node: String, what: String },

    /// A value claiming to be tensor-like (or a latent / conditioning container) was not.
    #[error("{node} expects {expected}.")]
    TypeMismatch { node: String, expected: String },

    #[error("preview io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("preview encode error: {0}")]
    Encode(String),

    /// A node needs a host capability (image sink, text encoder) that was not supplied.
    #[error("{node} requires a {collaborator}")]
    MissingCollaborator {
        node: String,
        collaborator: &'static str,
    },

    #[error("unknown node class '{0}'")]
    UnknownNode(String),

    #[error("invalid config: {0}")]
    Config(String),
}

impl NodeError {
    pub fn no_input(node: &str) -> Self {
        NodeError::NoInput {
            node: node.to_string(),
            what: String::new(),
        }
    }

    /// `"{node}: no IMAGE inputs connected."`
    pub fn no_typed_input(node: &str, type_name: &str) -> Self {
        NodeError::NoInput {
            node: node.to_string(),
            what: format!("{type_name} "),
        }
    }

    pub fn type_mismatch(node: &str, expected: impl Into<String>) -> Self {
        NodeError::TypeMismatch {
            node: node.to_string(),
            expected: expected.into(),
        }
    }
}

impl From<png::EncodingError> for NodeError {
    fn from(err: png::EncodingError) -> Self {
        match err {
            png::EncodingError::IoError(io) => NodeError::Io(io),
            other => NodeError::Encode(other.to_string()),
        }
    }
}
