//! tojioo-passthrough-core: node registry and execution for the Tojioo passthrough nodes.
//!
//! Host-agnostic: values come from `tojioo-api-core`, and host services (image storage,
//! CLIP text encoding) are injected through [`RunContext`].

pub mod batch;
pub mod bus;
pub mod config;
pub mod error;
pub mod eval;
pub mod preview;
pub mod provenance;
pub mod schema;
pub mod slot;
pub mod types;

pub use batch::{merge_values, BatchKind};
pub use config::{Categories, PassthroughConfig};
pub use error::NodeError;
pub use eval::{run_by_class, run_node, NodeInputs, RunContext, TextEncoder};
pub use preview::{ImageSink, PreviewUi, TempDirSink};
pub use provenance::GraphMap;
pub use schema::{registry, registry_with, NodeSignature, PortSpec, Registry};
pub use types::{NodeKind, NodeOutput};
