//! Print the node registry as JSON for host-side tooling.
//!
//! Usage: `tojioo-registry-export [--pretty] [--config <path>]`

use std::fs;

use anyhow::{bail, Context, Result};
use log::info;
use tojioo_passthrough_core::{registry_with, PassthroughConfig};

fn main() -> Result<()> {
    env_logger::init();

    let mut pretty = false;
    let mut config_path = None;
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--pretty" => pretty = true,
            "--config" => {
                config_path = Some(args.next().context("--config needs a path")?);
            }
            other => bail!("unknown argument '{other}'"),
        }
    }

    let cfg = match &config_path {
        Some(path) => {
            let text = fs::read_to_string(path).with_context(|| format!("failed to read config {path}"))?;
            PassthroughConfig::from_json_str(&text)?
        }
        None => PassthroughConfig::default(),
    };
    let registry = registry_with(&cfg);
    info!("exporting {} nodes", registry.len());

    let json = if pretty {
        serde_json::to_string_pretty(&registry)?
    } else {
        serde_json::to_string(&registry)?
    };
    println!("{json}");
    Ok(())
}
