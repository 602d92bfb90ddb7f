//! Foundry and Hardhat artifact parsing.

use serde::Deserialize;
use std::path::Path;

use chainctl_core::{ChainError, Result};

use crate::adapter::ContractArtifact;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawArtifact {
    #[serde(default)]
    contract_name: Option<String>,
    #[serde(default)]
    abi: Vec<AbiEntry>,
    bytecode: Bytecode,
}

/// Hardhat stores a hex string, Foundry an object with `object`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Bytecode {
    Hex(String),
    Object { object: String },
}

#[derive(Debug, Deserialize)]
struct AbiEntry {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    inputs: Vec<serde_json::Value>,
}

pub fn load_artifact(path: &Path) -> Result<ContractArtifact> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| ChainError::invalid(format!("cannot read artifact {}: {e}", path.display())))?;
    parse_artifact(path, &content)
}

pub fn parse_artifact(path: &Path, content: &str) -> Result<ContractArtifact> {
    let raw: RawArtifact = serde_json::from_str(content)
        .map_err(|e| ChainError::invalid(format!("{} is not a contract artifact: {e}", path.display())))?;

    let hex_code = match &raw.bytecode {
        Bytecode::Hex(s) => s.as_str(),
        Bytecode::Object { object } => object.as_str(),
    };
    let body = hex_code.strip_prefix("0x").unwrap_or(hex_code);
    if body.is_empty() {
        return Err(ChainError::invalid(format!(
            "{} has no bytecode (abstract contract or interface?)",
            path.display()
        )));
    }
    let bytecode = hex::decode(body).map_err(|e| {
        ChainError::invalid(format!("{} has unlinked or invalid bytecode: {e}", path.display()))
    })?;

    let operations = raw
        .abi
        .iter()
        .filter(|e| e.kind == "function")
        .filter_map(|e| e.name.clone())
        .collect();
    let constructor_inputs = raw
        .abi
        .iter()
        .find(|e| e.kind == "constructor")
        .map(|e| e.inputs.len())
        .unwrap_or(0);
    let name = raw.contract_name.clone().unwrap_or_else(|| {
        path.file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "Contract".into())
    });

    Ok(ContractArtifact {
        path: path.to_path_buf(),
        name,
        bytecode,
        operations,
        constructor_inputs,
    })
}
