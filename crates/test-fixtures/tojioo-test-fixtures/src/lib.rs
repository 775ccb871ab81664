//! Shared JSON fixtures: prompt graph snapshots and wire-form buses, listed in
//! `fixtures/manifest.json` at the workspace root.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use serde::Deserialize;
use serde_json::Value as JsonValue;

static MANIFEST: Lazy<Manifest> = Lazy::new(|| {
    let raw = include_str!("../../../../fixtures/manifest.json");
    serde_json::from_str(raw).expect("fixtures manifest should parse")
});

#[derive(Debug, Deserialize)]
struct Manifest {
    #[serde(rename = "prompt-graphs")]
    prompt_graphs: HashMap<String, String>,
    buses: HashMap<String, String>,
}

fn read_fixture(table: &HashMap<String, String>, group: &str, name: &str) -> Result<JsonValue> {
    let rel = table
        .get(name)
        .with_context(|| format!("unknown {group} fixture '{name}'"))?;
    let path = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("../../../fixtures")
        .join(rel);
    let text = fs::read_to_string(&path)
        .with_context(|| format!("failed to read fixture at {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("failed to parse {group} fixture {rel}"))
}

/// Host prompt snapshots (`node id -> {class_type, inputs}`).
pub mod prompt_graphs {
    use super::*;

    pub fn json(name: &str) -> Result<JsonValue> {
        read_fixture(&MANIFEST.prompt_graphs, "prompt graph", name)
    }
}

/// Buses as they arrive on the wire, including legacy untyped entries.
pub mod buses {
    use serde::de::DeserializeOwned;

    use super::*;

    pub fn json(name: &str) -> Result<JsonValue> {
        read_fixture(&MANIFEST.buses, "bus", name)
    }

    pub fn load<T: DeserializeOwned>(name: &str) -> Result<T> {
        serde_json::from_value(json(name)?).with_context(|| format!("bus fixture '{name}' has the wrong shape"))
    }
}
