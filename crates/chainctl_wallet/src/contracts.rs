use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::PathBuf;
use tracing::{info, warn};

use chainctl_core::{ChainError, Result};

/// Record of one deployed contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractMetadata {
    pub contract_address: String,
    pub deployed_at: DateTime<Utc>,
    pub contract_path: String,
    pub network: String,
    pub deploy_tx_hash: String,
    #[serde(alias = "circuits")]
    pub operations: Vec<String>,
}

/// One JSON file per contract under `<config_dir>/contracts/`.
pub struct ContractStore {
    dir: PathBuf,
}

impl ContractStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, address: &str) -> Result<PathBuf> {
        let key = address.trim().to_ascii_lowercase();
        if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(ChainError::invalid(format!("\"{address}\" is not a contract address")));
        }
        Ok(self.dir.join(format!("{key}.json")))
    }

    pub fn save(&self, metadata: &ContractMetadata) -> Result<PathBuf> {
        let path = self.path_for(&metadata.contract_address)?;
        std::fs::create_dir_all(&self.dir).map_err(|e| ChainError::persistence(&self.dir, e))?;
        let json = serde_json::to_string_pretty(metadata).map_err(|e| ChainError::persistence(&path, e))?;
        let mut tmp =
            tempfile::NamedTempFile::new_in(&self.dir).map_err(|e| ChainError::persistence(&self.dir, e))?;
        tmp.write_all(json.as_bytes())
            .map_err(|e| ChainError::persistence(tmp.path(), e))?;
        tmp.persist(&path)
            .map_err(|e| ChainError::persistence(&path, e.error))?;
        info!(address = %metadata.contract_address, network = %metadata.network, "contract metadata saved");
        Ok(path)
    }

    pub fn get(&self, address: &str) -> Result<Option<ContractMetadata>> {
        let path = self.path_for(address)?;
        match std::fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content)
                .map(Some)
                .map_err(|e| ChainError::persistence(&path, e)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ChainError::persistence(&path, e)),
        }
    }

    /// Like [`ContractStore::get`] but absence is an error.
    pub fn require(&self, address: &str) -> Result<ContractMetadata> {
        self.get(address)?
            .ok_or_else(|| ChainError::ContractNotFound(address.to_string()))
    }

    /// All records, oldest deployment first. Unreadable files are skipped
    /// with a warning.
    pub fn list(&self) -> Result<Vec<ContractMetadata>> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(ChainError::persistence(&self.dir, e)),
        };
        let mut records = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let parsed = std::fs::read_to_string(&path)
                .map_err(|e| e.to_string())
                .and_then(|c| serde_json::from_str::<ContractMetadata>(&c).map_err(|e| e.to_string()));
            match parsed {
                Ok(record) => records.push(record),
                Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable contract metadata"),
            }
        }
        records.sort_by(|a, b| a.deployed_at.cmp(&b.deployed_at));
        Ok(records)
    }
}
