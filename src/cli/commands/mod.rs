//! CLI command implementations.

pub mod deploy;
pub mod destroy;
pub mod ingest;
pub mod outputs;
pub mod query;

use anyhow::{Context, Result};

use crate::domain::models::StackOutputs;

/// Where a successful deploy records its outputs.
pub const OUTPUTS_PATH: &str = ".ragstack/outputs.json";

pub(crate) fn write_outputs(outputs: &StackOutputs) -> Result<()> {
    if let Some(parent) = std::path::Path::new(OUTPUTS_PATH).parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let rendered = serde_json::to_string_pretty(outputs)?;
    std::fs::write(OUTPUTS_PATH, rendered)
        .with_context(|| format!("Failed to write {OUTPUTS_PATH}"))?;
    Ok(())
}

pub(crate) fn read_outputs() -> Result<StackOutputs> {
    let raw = std::fs::read_to_string(OUTPUTS_PATH).with_context(|| {
        format!("No recorded outputs at {OUTPUTS_PATH}. Run 'ragstack deploy' first")
    })?;
    serde_json::from_str(&raw).with_context(|| format!("Failed to parse {OUTPUTS_PATH}"))
}
