//! Configuration for the passthrough node library.

use serde::{Deserialize, Serialize};

use crate::error::NodeError;

/// Sizing and presentation knobs shared by every node.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PassthroughConfig {
    /// Width of the dynamic output tuple (bus outputs exclude the leading bus slot).
    pub max_sockets: usize,
    /// Preview text entries longer than this many chars are truncated.
    pub max_text_len: usize,
    pub preview_prefix: String,
    pub categories: Categories,
}

/// Category paths shown in the host's node menu.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Categories {
    pub root: String,
    pub simple: String,
    pub widgets: String,
    pub dynamic: String,
    pub batch_switch: String,
    pub switch: String,
}

impl Default for Categories {
    fn default() -> Self {
        let root = "Tojioo Passthrough";
        Self {
            root: root.to_string(),
            simple: format!("{root}/Simple Passthrough"),
            widgets: format!("{root}/Simple Passthrough/Widget Variants"),
            dynamic: format!("{root}/Dynamic Nodes"),
            batch_switch: format!("{root}/Dynamic Nodes/Batch Switch Nodes"),
            switch: format!("{root}/Dynamic Nodes/Switch Nodes"),
        }
    }
}

impl Default for PassthroughConfig {
    fn default() -> Self {
        Self {
            max_sockets: 32,
            max_text_len: 2000,
            preview_prefix: "preview_".to_string(),
            categories: Categories::default(),
        }
    }
}

impl PassthroughConfig {
    /// Parse a (possibly partial) JSON config; missing fields take their defaults.
    pub fn from_json_str(text: &str) -> Result<Self, NodeError> {
        let cfg: PassthroughConfig =
            serde_json::from_str(text).map_err(|e| NodeError::Config(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), NodeError> {
        if self.max_sockets == 0 {
            return Err(NodeError::Config("max_sockets must be at least 1".into()));
        }
        if self.max_text_len == 0 {
            return Err(NodeError::Config("max_text_len must be at least 1".into()));
        }
        if self.preview_prefix.contains(['/', '\\']) {
            return Err(NodeError::Config(format!(
                "preview_prefix '{}' must not contain path separators",
                self.preview_prefix
            )));
        }
        Ok(())
    }
}
