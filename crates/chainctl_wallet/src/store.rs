use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use chainctl_chain::{AddressSet, Seed};
use chainctl_core::{ChainError, Result};

use crate::lock::StoreLock;

/// Current on-disk schema version.
pub const STORE_VERSION: u32 = 1;

const READ_RETRY_DELAY: Duration = Duration::from_millis(50);

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// A named wallet. Immutable once written; only removal changes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredWallet {
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub network: String,
    /// Stored as plaintext hex in schema version 1.
    pub seed: Seed,
    pub addresses: AddressSet,
}

/// The whole wallet file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletStore {
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    default: Option<String>,
    #[serde(default)]
    wallets: IndexMap<String, StoredWallet>,
}

impl Default for WalletStore {
    fn default() -> Self {
        Self::new()
    }
}

impl WalletStore {
    pub fn new() -> Self {
        Self {
            version: STORE_VERSION,
            default: None,
            wallets: IndexMap::new(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&StoredWallet> {
        self.wallets.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.wallets.contains_key(name)
    }

    /// Wallets in insertion order.
    pub fn wallets(&self) -> impl Iterator<Item = &StoredWallet> {
        self.wallets.values()
    }

    pub fn len(&self) -> usize {
        self.wallets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wallets.is_empty()
    }

    pub fn default_name(&self) -> Option<&str> {
        self.default.as_deref()
    }

    pub fn default_wallet(&self) -> Option<&StoredWallet> {
        self.default.as_deref().and_then(|name| self.wallets.get(name))
    }

    /// Adds a wallet; names are unique.
    pub fn insert(&mut self, wallet: StoredWallet) -> Result<()> {
        if self.wallets.contains_key(&wallet.name) {
            return Err(ChainError::DuplicateWallet(wallet.name));
        }
        self.wallets.insert(wallet.name.clone(), wallet);
        Ok(())
    }

    /// Removes a wallet. Removing the default clears it; no other wallet
    /// is promoted.
    pub fn remove(&mut self, name: &str) -> Result<StoredWallet> {
        let removed = self
            .wallets
            .shift_remove(name)
            .ok_or_else(|| ChainError::WalletNotFound(name.to_string()))?;
        if self.default.as_deref() == Some(name) {
            self.default = None;
        }
        Ok(removed)
    }

    pub fn set_default(&mut self, name: &str) -> Result<()> {
        if !self.wallets.contains_key(name) {
            return Err(ChainError::WalletNotFound(name.to_string()));
        }
        self.default = Some(name.to_string());
        Ok(())
    }

    /// Decodes and validates a store file. Never repairs: a newer schema,
    /// a dangling default or a mismatched key are all errors.
    pub fn from_json(path: &Path, content: &str) -> Result<Self> {
        let store: Self = serde_json::from_str(content).map_err(|e| ChainError::persistence(path, e))?;
        if store.version != STORE_VERSION {
            return Err(ChainError::persistence(
                path,
                format!(
                    "unsupported wallet store version {} (this build reads version {STORE_VERSION})",
                    store.version
                ),
            ));
        }
        if let Some((key, wallet)) = store.wallets.iter().find(|(k, w)| *k != &w.name) {
            return Err(ChainError::persistence(
                path,
                format!("entry \"{key}\" holds wallet named \"{}\"", wallet.name),
            ));
        }
        if let Some(name) = &store.default {
            if !store.wallets.contains_key(name) {
                return Err(ChainError::persistence(
                    path,
                    format!("default wallet \"{name}\" does not exist"),
                ));
            }
        }
        Ok(store)
    }
}

// ---------------------------------------------------------------------------
// File access
// ---------------------------------------------------------------------------

/// The wallet store on disk.
///
/// Writes go through [`StoreFile::update`]: exclusive lock, reload, mutate,
/// write a temp file in the same directory, rename over the store. Reads
/// take no lock.
pub struct StoreFile {
    path: PathBuf,
    lock_path: PathBuf,
}

impl StoreFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut lock_name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        lock_name.push(".lock");
        let lock_path = path.with_file_name(lock_name);
        Self { path, lock_path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Lock-free read. A parse failure is retried once in case a writer
    /// replaced the file mid-read.
    pub fn load(&self) -> Result<WalletStore> {
        retry_once(&self.path, || self.read_once())
    }

    /// Read-modify-write under the store lock. Nothing is written when `f`
    /// fails.
    pub fn update<T>(&self, f: impl FnOnce(&mut WalletStore) -> Result<T>) -> Result<T> {
        let _lock = StoreLock::acquire(&self.lock_path)?;
        let mut store = self.read_once()?;
        let out = f(&mut store)?;
        self.write(&store)?;
        Ok(out)
    }

    fn read_once(&self) -> Result<WalletStore> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => WalletStore::from_json(&self.path, &content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(WalletStore::new()),
            Err(e) => Err(ChainError::persistence(&self.path, e)),
        }
    }

    fn write(&self, store: &WalletStore) -> Result<()> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir).map_err(|e| ChainError::persistence(&dir, e))?;

        let json = serde_json::to_string_pretty(store).map_err(|e| ChainError::persistence(&self.path, e))?;
        let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(|e| ChainError::persistence(&dir, e))?;
        tmp.write_all(json.as_bytes())
            .and_then(|_| tmp.as_file().sync_all())
            .map_err(|e| ChainError::persistence(tmp.path(), e))?;

        // Restrict file permissions to owner-only on Unix (0o600 = rw-------).
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tmp.as_file()
                .set_permissions(std::fs::Permissions::from_mode(0o600))
                .map_err(|e| ChainError::persistence(tmp.path(), e))?;
        }

        tmp.persist(&self.path).map_err(|e| {
            warn!(path = %self.path.display(), error = %e, "atomic replace failed");
            ChainError::persistence(&self.path, e.error)
        })?;
        info!(path = %self.path.display(), count = store.len(), "wallet store saved");
        Ok(())
    }
}

/// Runs `read` again after a short pause if it fails with a persistence
/// error. Other errors and a second failure are returned as is.
fn retry_once<T>(path: &Path, mut read: impl FnMut() -> Result<T>) -> Result<T> {
    match read() {
        Err(ChainError::Persistence(first)) => {
            debug!(path = %path.display(), error = %first, "store read failed, retrying once");
            std::thread::sleep(READ_RETRY_DELAY);
            read()
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wallet(name: &str, network: &str) -> StoredWallet {
        StoredWallet {
            name: name.into(),
            created_at: Utc::now(),
            network: network.into(),
            seed: Seed::from_hex(&"11".repeat(32)).unwrap(),
            addresses: AddressSet {
                unshielded: format!("addr_{name}"),
                shielded: Some(format!("shield_{name}")),
                fee: None,
                public_key: "02aa".into(),
            },
        }
    }

    #[test]
    fn wallet_store_insert_and_get() {
        let mut store = WalletStore::new();
        store.insert(wallet("alice", "testnet")).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("alice").unwrap().network, "testnet");
        assert!(store.get("bob").is_none());
    }

    #[test]
    fn wallet_store_rejects_duplicates() {
        let mut store = WalletStore::new();
        store.insert(wallet("alice", "testnet")).unwrap();
        let err = store.insert(wallet("alice", "devnet")).unwrap_err();
        assert_eq!(err, ChainError::DuplicateWallet("alice".into()));
        assert_eq!(store.get("alice").unwrap().network, "testnet");
    }

    #[test]
    fn removing_default_clears_it() {
        let mut store = WalletStore::new();
        store.insert(wallet("alice", "testnet")).unwrap();
        store.insert(wallet("bob", "testnet")).unwrap();
        store.set_default("alice").unwrap();
        store.remove("alice").unwrap();
        assert_eq!(store.default_name(), None);
        assert!(store.contains("bob"));
    }

    #[test]
    fn remove_keeps_insertion_order() {
        let mut store = WalletStore::new();
        for name in ["c", "a", "b", "d"] {
            store.insert(wallet(name, "testnet")).unwrap();
        }
        store.remove("a").unwrap();
        let names: Vec<&str> = store.wallets().map(|w| w.name.as_str()).collect();
        assert_eq!(names, vec!["c", "b", "d"]);
    }

    #[test]
    fn set_default_requires_existing_wallet() {
        let mut store = WalletStore::new();
        assert_eq!(
            store.set_default("ghost").unwrap_err(),
            ChainError::WalletNotFound("ghost".into())
        );
    }

    #[test]
    fn wallet_store_file_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let file = StoreFile::new(tmp.path().join("wallets.json"));
        let (zed, amy) = (wallet("zed", "localnet"), wallet("amy", "testnet"));
        file.update(|store| {
            store.insert(zed.clone())?;
            store.insert(amy.clone())?;
            store.set_default("amy")
        })
        .unwrap();

        let loaded = file.load().unwrap();
        assert_eq!(loaded.get("zed"), Some(&zed));
        assert_eq!(loaded.default_wallet(), Some(&amy));
        let names: Vec<&str> = loaded.wallets().map(|w| w.name.as_str()).collect();
        assert_eq!(names, vec!["zed", "amy"]);
    }

    #[test]
    fn save_then_load_is_identity() {
        let tmp = tempfile::tempdir().unwrap();
        let file = StoreFile::new(tmp.path().join("wallets.json"));
        let mut store = WalletStore::new();
        store.insert(wallet("alice", "testnet")).unwrap();
        store.insert(wallet("bob", "devnet")).unwrap();
        store.set_default("bob").unwrap();
        file.write(&store).unwrap();
        assert_eq!(file.load().unwrap(), store);
    }

    #[test]
    fn on_disk_format_uses_documented_fields() {
        let tmp = tempfile::tempdir().unwrap();
        let file = StoreFile::new(tmp.path().join("wallets.json"));
        file.update(|store| {
            store.insert(wallet("alice", "testnet"))?;
            store.set_default("alice")
        })
        .unwrap();
        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(file.path()).unwrap()).unwrap();
        assert_eq!(raw["version"], 1);
        assert_eq!(raw["default"], "alice");
        let alice = &raw["wallets"]["alice"];
        assert_eq!(alice["seed"], "11".repeat(32));
        assert!(alice["createdAt"].is_string());
        assert_eq!(alice["addresses"]["unshielded"], "addr_alice");
        assert_eq!(alice["addresses"]["coinPublicKey"], "02aa");
    }

    #[test]
    fn missing_file_loads_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let file = StoreFile::new(tmp.path().join("wallets.json"));
        assert!(file.load().unwrap().is_empty());
    }

    #[test]
    fn newer_version_is_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("wallets.json");
        std::fs::write(&path, r#"{"version": 2, "wallets": {}}"#).unwrap();
        let err = StoreFile::new(&path).load().unwrap_err();
        assert!(matches!(err, ChainError::Persistence(msg) if msg.contains("version 2")));
    }

    #[test]
    fn corrupt_store_is_never_overwritten() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("wallets.json");
        std::fs::write(&path, "{ not json").unwrap();
        let file = StoreFile::new(&path);
        assert!(matches!(file.load(), Err(ChainError::Persistence(_))));
        let err = file
            .update(|store| store.insert(wallet("alice", "testnet")))
            .unwrap_err();
        assert!(matches!(err, ChainError::Persistence(_)));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{ not json");
    }

    #[test]
    fn dangling_default_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("wallets.json");
        std::fs::write(&path, r#"{"version": 1, "default": "ghost", "wallets": {}}"#).unwrap();
        assert!(matches!(
            StoreFile::new(&path).load(),
            Err(ChainError::Persistence(msg)) if msg.contains("ghost")
        ));
    }

    #[test]
    fn failed_mutation_writes_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let file = StoreFile::new(tmp.path().join("wallets.json"));
        let err = file.update(|store| store.remove("bob")).unwrap_err();
        assert_eq!(err, ChainError::WalletNotFound("bob".into()));
        assert!(!file.path().exists());
    }

    #[test]
    fn lock_file_sits_next_to_store() {
        let file = StoreFile::new("/data/chainctl/wallets.json");
        assert_eq!(file.lock_path, PathBuf::from("/data/chainctl/wallets.json.lock"));
    }

    #[cfg(unix)]
    #[test]
    fn store_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let tmp = tempfile::tempdir().unwrap();
        let file = StoreFile::new(tmp.path().join("wallets.json"));
        file.update(|store| store.insert(wallet("alice", "testnet"))).unwrap();
        let mode = std::fs::metadata(file.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn parallel_updates_lose_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("wallets.json");
        let handles: Vec<_> = (0..16)
            .map(|i| {
                let path = path.clone();
                std::thread::spawn(move || {
                    StoreFile::new(path)
                        .update(|store| store.insert(wallet(&format!("w{i}"), "localnet")))
                        .unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let store = StoreFile::new(&path).load().unwrap();
        assert_eq!(store.len(), 16);
        for i in 0..16 {
            assert!(store.contains(&format!("w{i}")), "w{i} lost");
        }
    }

    #[test]
    fn read_retries_once_after_parse_failure() {
        let mut calls = 0;
        let result = retry_once(Path::new("wallets.json"), || {
            calls += 1;
            if calls == 1 {
                Err(ChainError::Persistence("truncated".into()))
            } else {
                Ok(WalletStore::new())
            }
        });
        assert_eq!(result.unwrap(), WalletStore::new());
        assert_eq!(calls, 2);
    }

    #[test]
    fn read_gives_up_after_second_failure() {
        let mut calls = 0;
        let result: Result<()> = retry_once(Path::new("wallets.json"), || {
            calls += 1;
            Err(ChainError::Persistence(format!("attempt {calls}")))
        });
        assert_eq!(result.unwrap_err(), ChainError::Persistence("attempt 2".into()));
        assert_eq!(calls, 2);
    }

    #[test]
    fn read_does_not_retry_other_errors() {
        let mut calls = 0;
        let result: Result<()> = retry_once(Path::new("wallets.json"), || {
            calls += 1;
            Err(ChainError::InvalidInput("nope".into()))
        });
        assert!(result.is_err());
        assert_eq!(calls, 1);
    }

    #[test]
    fn load_recovers_when_file_is_replaced_mid_read() {
        let tmp = tempfile::tempdir().unwrap();
        let file = StoreFile::new(tmp.path().join("wallets.json"));
        file.update(|store| store.insert(wallet("alice", "testnet"))).unwrap();
        let good = std::fs::read_to_string(file.path()).unwrap();

        let mut calls = 0;
        let store = retry_once(file.path(), || {
            calls += 1;
            if calls == 1 {
                // A reader catching a half-written file.
                WalletStore::from_json(file.path(), &good[..good.len() / 2])
            } else {
                file.read_once()
            }
        })
        .unwrap();
        assert!(store.contains("alice"));
    }
}
