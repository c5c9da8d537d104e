// Purpose: Serializable summary of the descriptors one lowering emitted.
// Inputs/Outputs: Filled by the lowering context; written as pretty JSON next to the module.
// Invariants: Records are sorted by symbol so the manifest is stable across runs.
// Gotchas: The manifest describes emitted globals only; it is not the runtime layout.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const MANIFEST_VERSION: u32 = 1;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeRecord {
    pub symbol: String,
    pub key: String,
    pub kind: u8,
    pub named: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method_set: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Manifest {
    pub version: u32,
    pub word_size: u64,
    pub types: Vec<TypeRecord>,
}

impl Manifest {
    pub fn new(word_size: u64, types: Vec<TypeRecord>) -> Self {
        Self {
            version: MANIFEST_VERSION,
            word_size,
            types,
        }
    }
}

pub fn write_manifest(path: &Path, manifest: &Manifest) -> Result<()> {
    let json =
        serde_json::to_string_pretty(manifest).context("serialize descriptor manifest")?;
    fs::write(path, json)
        .with_context(|| format!("write descriptor manifest {}", path.display()))?;
    Ok(())
}
