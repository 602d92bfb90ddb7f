use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{ChainError, Result};

/// Default location of the deployment-wide `config.env`.
pub const DEFAULT_CONFIG_DIR: &str = "/etc/chain";

// ---------------------------------------------------------------------------
// Chain configuration
// ---------------------------------------------------------------------------

/// Resolved configuration for one invocation.
///
/// Values come from the process environment first and from
/// `$CHAIN_CONFIG_DIR/config.env` second. Nothing here is cached between
/// invocations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainConfig {
    pub cli_name: String,
    /// Adapter id used when `--chain` is not given.
    pub chain_type: String,
    pub chain_name: String,
    pub chain_id: u64,
    pub network_id: String,
    pub rpc_url: String,
    pub explorer_url: Option<String>,
    pub faucet_url: Option<String>,
    pub native_currency: String,
    pub native_decimals: u8,
    /// `CHAINCTL_HOME`: replaces the per-user config directory.
    pub home_override: Option<PathBuf>,
    /// `CHAIN_ENVIRONMENT`: explicit network override.
    pub network_override: Option<String>,
    /// `CHAINCTL_LOG`: tracing filter directive.
    pub log_filter: Option<String>,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            cli_name: "chainctl".into(),
            chain_type: "evm".into(),
            chain_name: "EVM".into(),
            chain_id: 1,
            network_id: "testnet".into(),
            rpc_url: "http://localhost:8545".into(),
            explorer_url: None,
            faucet_url: None,
            native_currency: "ETH".into(),
            native_decimals: 18,
            home_override: None,
            network_override: None,
            log_filter: None,
        }
    }
}

impl ChainConfig {
    /// Loads configuration from the process environment layered over
    /// `$CHAIN_CONFIG_DIR/config.env`.
    pub fn load() -> Result<Self> {
        let config_dir = std::env::var("CHAIN_CONFIG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_DIR));
        let file_values = read_env_file(&config_dir.join("config.env"))?;
        Self::from_lookup(layered(|key| std::env::var(key).ok(), file_values))
    }

    /// Builds a config from an arbitrary key lookup. Empty values count as
    /// unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Self::default();

        let rpc_url = get("RPC_URL").unwrap_or(defaults.rpc_url);
        validate_url("RPC_URL", &rpc_url)?;
        let explorer_url = get("EXPLORER_URL");
        if let Some(url) = &explorer_url {
            validate_url("EXPLORER_URL", url)?;
        }
        let faucet_url = get("FAUCET_URL");
        if let Some(url) = &faucet_url {
            validate_url("FAUCET_URL", url)?;
        }

        let config = Self {
            cli_name: get("CLI_NAME").unwrap_or(defaults.cli_name),
            chain_type: get("CHAIN_TYPE")
                .map(|v| v.to_lowercase())
                .unwrap_or(defaults.chain_type),
            chain_name: get("CHAIN_NAME").unwrap_or(defaults.chain_name),
            chain_id: parse_number("CHAIN_ID", get("CHAIN_ID"), defaults.chain_id)?,
            network_id: get("NETWORK_ID")
                .map(|v| v.to_lowercase())
                .unwrap_or(defaults.network_id),
            rpc_url,
            explorer_url,
            faucet_url,
            native_currency: get("NATIVE_CURRENCY").unwrap_or(defaults.native_currency),
            native_decimals: parse_number(
                "NATIVE_DECIMALS",
                get("NATIVE_DECIMALS"),
                defaults.native_decimals,
            )?,
            home_override: get("CHAINCTL_HOME").map(PathBuf::from),
            network_override: get("CHAIN_ENVIRONMENT").map(|v| v.to_lowercase()),
            log_filter: get("CHAINCTL_LOG"),
        };

        if config.native_decimals > 38 {
            return Err(ChainError::Config(format!(
                "NATIVE_DECIMALS must be at most 38, got {}",
                config.native_decimals
            )));
        }
        debug!(chain = %config.chain_name, rpc = %config.rpc_url, "configuration resolved");
        Ok(config)
    }
}

/// Process environment over file values. A variable that is set but empty
/// does not hide the file value.
fn layered<E>(env: E, file_values: HashMap<String, String>) -> impl Fn(&str) -> Option<String>
where
    E: Fn(&str) -> Option<String>,
{
    move |key| {
        env(key)
            .filter(|v| !v.trim().is_empty())
            .or_else(|| file_values.get(key).cloned())
    }
}

// `from_path_iter` is deprecated upstream, but it is the only dotenv entry
// point that reads a file without exporting it into the process environment.
#[allow(deprecated)]
fn read_env_file(path: &Path) -> Result<HashMap<String, String>> {
    if !path.exists() {
        return Ok(HashMap::new());
    }
    let iter = dotenv::from_path_iter(path)
        .map_err(|e| ChainError::Config(format!("{}: {e}", path.display())))?;
    let mut values = HashMap::new();
    for item in iter {
        let (key, value) =
            item.map_err(|e| ChainError::Config(format!("{}: {e}", path.display())))?;
        values.insert(key, value);
    }
    info!(path = %path.display(), entries = values.len(), "loaded config.env");
    Ok(values)
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: Option<String>, default: T) -> Result<T> {
    match raw {
        None => Ok(default),
        Some(value) => value
            .parse()
            .map_err(|_| ChainError::Config(format!("{key} must be a number, got \"{value}\""))),
    }
}

/// Validates that `value` is an absolute http(s) or ws(s) URL.
pub fn validate_url(key: &str, value: &str) -> Result<()> {
    let parsed = url::Url::parse(value)
        .map_err(|e| ChainError::Config(format!("{key} is not a valid URL ({value}): {e}")))?;
    match parsed.scheme() {
        "http" | "https" | "ws" | "wss" => Ok(()),
        other => Err(ChainError::Config(format!(
            "{key} has unsupported scheme \"{other}\""
        ))),
    }
}

// ---------------------------------------------------------------------------
// Config directory layout
// ---------------------------------------------------------------------------

/// Paths under the per-user config directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigPaths {
    root: PathBuf,
}

impl ConfigPaths {
    /// `CHAINCTL_HOME` if set, otherwise `<config_dir>/<cli_name>`.
    pub fn resolve(config: &ChainConfig) -> Result<Self> {
        if let Some(home) = &config.home_override {
            return Ok(Self::at(home));
        }
        let base = dirs::config_dir()
            .or_else(|| dirs::home_dir().map(|h| h.join(".config")))
            .ok_or_else(|| ChainError::Config("could not determine a config directory".into()))?;
        Ok(Self::at(base.join(&config.cli_name)))
    }

    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `<root>/wallets.json`
    pub fn wallets_file(&self) -> PathBuf {
        self.root.join("wallets.json")
    }

    /// `<root>/contracts/`
    pub fn contracts_dir(&self) -> PathBuf {
        self.root.join("contracts")
    }

    /// `<root>/node/`: pid and log files of the local dev node.
    pub fn node_dir(&self) -> PathBuf {
        self.root.join("node")
    }

    /// `<root>/logs/`
    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    /// Creates the root directory (owner-only on unix).
    pub fn ensure_root(&self) -> Result<()> {
        std::fs::create_dir_all(&self.root).map_err(|e| ChainError::persistence(&self.root, e))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o700);
            std::fs::set_permissions(&self.root, perms)
                .map_err(|e| ChainError::persistence(&self.root, e))?;
        }
        Ok(())
    }
}
