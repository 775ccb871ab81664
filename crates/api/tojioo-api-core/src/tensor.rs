//! Tensor-like values: shape inspection, batch-axis insertion and axis-0 concatenation.
//!
//! The batching and preview code only talks to [`TensorLike`]; [`Tensor`] is the dense
//! `f32` implementation hosts use when handing image, mask and latent data across.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Shape failures raised while preparing or concatenating tensors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShapeError {
    #[error("{kind} must be {expected}D, got shape {shape:?}")]
    Rank {
        kind: String,
        expected: usize,
        shape: Vec<usize>,
    },
    #[error("cannot concatenate shape {found:?} onto trailing shape {expected:?}")]
    TrailingMismatch {
        expected: Vec<usize>,
        found: Vec<usize>,
    },
    #[error("tensor data length {len} does not match shape {shape:?}")]
    DataLength { shape: Vec<usize>, len: usize },
    #[error("frame {index} is out of range for shape {shape:?}")]
    FrameOutOfRange { index: usize, shape: Vec<usize> },
    #[error("cannot concatenate an empty list of tensors")]
    Empty,
}

/// Minimal tensor surface consumed by batching and preview.
pub trait TensorLike: Sized {
    fn shape(&self) -> &[usize];

    /// Insert a leading batch axis of size one.
    fn unsqueeze0(&self) -> Self;

    /// Concatenate along the batch axis. Every operand must share rank and trailing shape.
    fn cat0(parts: &[&Self]) -> Result<Self, ShapeError>;

    #[inline]
    fn dim(&self) -> usize {
        self.shape().len()
    }

    /// Size of the leading axis (1 for scalars).
    #[inline]
    fn batch_size(&self) -> usize {
        self.shape().first().copied().unwrap_or(1)
    }

    /// Every axis except the batch axis.
    #[inline]
    fn trailing_shape(&self) -> &[usize] {
        self.shape().get(1..).unwrap_or(&[])
    }
}

/// Dense row-major `f32` tensor. Decoding goes through [`Tensor::new`], so a tensor
/// never holds fewer elements than its shape claims.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawTensor")]
pub struct Tensor {
    shape: Vec<usize>,
    data: Vec<f32>,
}

/// Unchecked wire form of [`Tensor`].
#[derive(Deserialize)]
struct RawTensor {
    shape: Vec<usize>,
    data: Vec<f32>,
}

impl TryFrom<RawTensor> for Tensor {
    type Error = ShapeError;

    fn try_from(raw: RawTensor) -> Result<Self, Self::Error> {
        Tensor::new(raw.shape, raw.data)
    }
}

impl Tensor {
    pub fn new(shape: Vec<usize>, data: Vec<f32>) -> Result<Self, ShapeError> {
        let expected = shape.iter().try_fold(1usize, |acc, &d| acc.checked_mul(d));
        if expected != Some(data.len()) {
            return Err(ShapeError::DataLength {
                shape,
                len: data.len(),
            });
        }
        Ok(Tensor { shape, data })
    }

    pub fn filled(shape: Vec<usize>, value: f32) -> Self {
        let len = shape.iter().product();
        Tensor {
            shape,
            data: vec![value; len],
        }
    }

    pub fn zeros(shape: Vec<usize>) -> Self {
        Tensor::filled(shape, 0.0)
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Slice out entry `index` of the leading axis, dropping that axis.
    pub fn frame(&self, index: usize) -> Result<Tensor, ShapeError> {
        let Some((&lead, rest)) = self.shape.split_first() else {
            return Err(ShapeError::FrameOutOfRange {
                index,
                shape: self.shape.clone(),
            });
        };
        if index >= lead {
            return Err(ShapeError::FrameOutOfRange {
                index,
                shape: self.shape.clone(),
            });
        }
        let stride: usize = rest.iter().product();
        let start = index * stride;
        Ok(Tensor {
            shape: rest.to_vec(),
            data: self.data[start..start + stride].to_vec(),
        })
    }

    /// Move the leading axis of a rank-3 tensor to the back (`C,H,W` -> `H,W,C`).
    pub fn channels_last(&self) -> Result<Tensor, ShapeError> {
        let &[c, h, w] = self.shape.as_slice() else {
            return Err(ShapeError::Rank {
                kind: "channel-first image".to_string(),
                expected: 3,
                shape: self.shape.clone(),
            });
        };
        let mut data = Vec::with_capacity(self.data.len());
        for y in 0..h {
            for x in 0..w {
                for ch in 0..c {
                    data.push(self.data[ch * h * w + y * w + x]);
                }
            }
        }
        Ok(Tensor {
            shape: vec![h, w, c],
            data,
        })
    }
}

impl TensorLike for Tensor {
    fn shape(&self) -> &[usize] {
        &self.shape
    }

    fn unsqueeze0(&self) -> Self {
        let mut shape = Vec::with_capacity(self.shape.len() + 1);
        shape.push(1);
        shape.extend_from_slice(&self.shape);
        Tensor {
            shape,
            data: self.data.clone(),
        }
    }

    fn cat0(parts: &[&Self]) -> Result<Self, ShapeError> {
        let first = parts.first().ok_or(ShapeError::Empty)?;
        if first.shape.is_empty() {
            return Err(ShapeError::Rank {
                kind: "concatenated tensor".to_string(),
                expected: 1,
                shape: Vec::new(),
            });
        }
        let trailing = first.trailing_shape();
        let mut batch = 0;
        let mut data = Vec::with_capacity(parts.iter().map(|p| p.data.len()).sum());
        for part in parts {
            if part.dim() != first.dim() || part.trailing_shape() != trailing {
                return Err(ShapeError::TrailingMismatch {
                    expected: trailing.to_vec(),
                    found: part.shape.clone(),
                });
            }
            batch += part.batch_size();
            data.extend_from_slice(&part.data);
        }
        let mut shape = Vec::with_capacity(first.shape.len());
        shape.push(batch);
        shape.extend_from_slice(trailing);
        Ok(Tensor { shape, data })
    }
}
