//! tojioo-api-core: host value model shared by the passthrough nodes (engine-agnostic).

pub mod bus;
pub mod json;
pub mod tensor;
pub mod type_tag;
pub mod value;

pub use bus::{Bus, BusEntry};
pub use tensor::{ShapeError, Tensor, TensorLike};
pub use type_tag::TypeTag;
pub use value::{Value, ValueKind};
