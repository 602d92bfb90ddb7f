use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::path::{Path, PathBuf};

use chainctl_core::{ChainError, Result};

use crate::detect::NodeProbe;
use crate::network::NetworkConfig;

// ---------------------------------------------------------------------------
// Secrets and addresses
// ---------------------------------------------------------------------------

/// Opaque wallet secret. Serialized as lowercase hex; never printed by
/// `Debug`.
#[derive(Clone, PartialEq, Eq)]
pub struct Seed(Vec<u8>);

impl Seed {
    /// Parses a hex seed, with or without a `0x` prefix.
    pub fn from_hex(text: &str) -> Result<Self> {
        let trimmed = text.trim();
        let body = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);
        if body.is_empty() {
            return Err(ChainError::invalid("seed is empty"));
        }
        let bytes = hex::decode(body)
            .map_err(|e| ChainError::invalid(format!("seed is not valid hex: {e}")))?;
        Ok(Self(bytes))
    }

    /// Fresh random seed of `len` bytes.
    pub fn generate(len: usize) -> Self {
        let bytes: Vec<u8> = (0..len).map(|_| rand::random::<u8>()).collect();
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }
}

impl fmt::Debug for Seed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Seed(<{} bytes redacted>)", self.0.len())
    }
}

impl Serialize for Seed {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Seed {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Seed::from_hex(&text).map_err(serde::de::Error::custom)
    }
}

/// Addresses derived from one seed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressSet {
    /// Primary, value-holding address.
    pub unshielded: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shielded: Option<String>,
    /// Fee-resource address.
    #[serde(rename = "dust", default, skip_serializing_if = "Option::is_none")]
    pub fee: Option<String>,
    #[serde(rename = "coinPublicKey")]
    pub public_key: String,
}

/// A pre-funded development wallet used to top up new wallets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenesisWallet {
    pub label: &'static str,
    pub seed_hex: &'static str,
}

impl GenesisWallet {
    pub fn seed(&self) -> Result<Seed> {
        Seed::from_hex(self.seed_hex)
    }
}

// ---------------------------------------------------------------------------
// Transfers
// ---------------------------------------------------------------------------

/// Who pays for a transfer.
#[derive(Debug, Clone)]
pub enum TransferSource {
    /// Signed locally with the wallet secret.
    Seed(Seed),
    /// Signed by the node for an unlocked account.
    Address(String),
}

#[derive(Debug, Clone)]
pub struct Transfer {
    pub from: TransferSource,
    pub to: String,
    /// Base units.
    pub amount: u128,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxStatus {
    Pending,
    Confirmed,
    Failed,
}

/// Result of submitting a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TxHandle {
    pub hash: String,
    pub from: String,
    pub to: String,
    #[serde(serialize_with = "u128_as_string")]
    pub amount: u128,
    pub status: TxStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_number: Option<u64>,
}

pub fn u128_as_string<S: Serializer>(
    value: &u128,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(&value.to_string())
}

// ---------------------------------------------------------------------------
// Contracts
// ---------------------------------------------------------------------------

/// A compiled contract ready to deploy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractArtifact {
    pub path: PathBuf,
    pub name: String,
    pub bytecode: Vec<u8>,
    /// Exposed operation names, in artifact order.
    pub operations: Vec<String>,
    pub constructor_inputs: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Deployment {
    pub address: String,
    pub tx_hash: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_number: Option<u64>,
}

// ---------------------------------------------------------------------------
// Local node
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeOptions {
    pub port: u16,
    pub accounts: u32,
    /// Whole units of native currency per dev account.
    pub balance: u64,
    pub block_time: Option<u64>,
    pub fork_url: Option<String>,
    pub fork_block: Option<u64>,
}

impl Default for NodeOptions {
    fn default() -> Self {
        Self {
            port: 8545,
            accounts: 10,
            balance: 10_000,
            block_time: None,
            fork_url: None,
            fork_block: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeStatus {
    pub running: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rpc_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
}

/// What `start` did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeStart {
    pub status: NodeStatus,
    /// `false` when a node was already listening and nothing was spawned.
    pub spawned: bool,
}

// ---------------------------------------------------------------------------
// Capabilities
// ---------------------------------------------------------------------------

/// Optional capability sets an adapter may implement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    Wallet,
    Contract,
    Node,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Wallet => "wallet",
            Self::Contract => "contract",
            Self::Node => "node",
        };
        f.write_str(label)
    }
}

/// Key management, balances and transfers.
#[async_trait]
pub trait WalletOps: Send + Sync {
    /// Number of bytes in a freshly generated seed.
    fn seed_len(&self) -> usize {
        32
    }

    async fn derive_addresses(&self, seed: &Seed, network: &NetworkConfig) -> Result<AddressSet>;

    /// Balance in base units.
    async fn query_balance(&self, address: &str, network: &NetworkConfig) -> Result<u128>;

    async fn submit_transfer(&self, transfer: &Transfer, network: &NetworkConfig)
    -> Result<TxHandle>;

    /// Fixed, pre-funded wallets usable on fundable networks.
    fn genesis_wallets(&self) -> &[GenesisWallet];

    /// Whether `text` is a raw address on this chain.
    fn is_address(&self, text: &str) -> bool;
}

/// Contract artifact loading and deployment.
#[async_trait]
pub trait ContractOps: Send + Sync {
    fn load_artifact(&self, path: &Path) -> Result<ContractArtifact>;

    async fn deploy(
        &self,
        artifact: &ContractArtifact,
        deployer: &Seed,
        network: &NetworkConfig,
    ) -> Result<Deployment>;
}

/// Lifecycle of a local development node.
#[async_trait]
pub trait NodeOps: Send + Sync {
    /// Starts the node unless one already listens on `options.port`.
    async fn start(&self, options: &NodeOptions) -> Result<NodeStart>;

    /// Stops the managed node. Returns `false` when nothing was running.
    async fn stop(&self) -> Result<bool>;

    async fn status(&self) -> Result<NodeStatus>;

    /// Last `lines` lines of the node log.
    async fn logs(&self, lines: usize) -> Result<String>;
}

// ---------------------------------------------------------------------------
// Adapter
// ---------------------------------------------------------------------------

/// A backend for one blockchain family.
///
/// Optional capabilities are exposed through `*_ops` hooks; callers use the
/// checked accessors ([`ChainAdapter::wallet`], [`ChainAdapter::contracts`],
/// [`ChainAdapter::node`]) which return a typed handle or
/// [`ChainError::UnsupportedCapability`].
pub trait ChainAdapter: Send + Sync {
    /// Stable chain id, e.g. `"evm"`.
    fn id(&self) -> &str;

    fn display_name(&self) -> &str;

    /// Known networks in display order.
    fn networks(&self) -> &[NetworkConfig];

    fn current_network(&self) -> &NetworkConfig;

    /// Selects the active network. Unknown ids are rejected.
    fn set_current_network(&mut self, id: &str) -> Result<()>;

    fn wallet_ops(&self) -> Option<&dyn WalletOps> {
        None
    }

    fn contract_ops(&self) -> Option<&dyn ContractOps> {
        None
    }

    fn node_ops(&self) -> Option<&dyn NodeOps> {
        None
    }

    /// Live-node introspection used by network detection.
    fn probe(&self) -> Option<&dyn NodeProbe> {
        None
    }

    /// Id of the local dev-node network, if the chain has one.
    fn local_network_id(&self) -> Option<&str> {
        None
    }

    /// Looks a network up by id.
    fn network(&self, id: &str) -> Result<&NetworkConfig> {
        self.networks()
            .iter()
            .find(|n| n.id.eq_ignore_ascii_case(id))
            .ok_or_else(|| unsupported_network(self.networks(), id))
    }

    /// The statically configured default network.
    fn default_network(&self) -> &NetworkConfig {
        self.networks()
            .iter()
            .find(|n| n.is_default)
            .unwrap_or_else(|| self.current_network())
    }

    fn capabilities(&self) -> Vec<Capability> {
        let mut caps = Vec::new();
        if self.wallet_ops().is_some() {
            caps.push(Capability::Wallet);
        }
        if self.contract_ops().is_some() {
            caps.push(Capability::Contract);
        }
        if self.node_ops().is_some() {
            caps.push(Capability::Node);
        }
        caps
    }

    fn supports(&self, capability: Capability) -> bool {
        self.capabilities().contains(&capability)
    }

    fn wallet(&self) -> Result<&dyn WalletOps> {
        self.wallet_ops()
            .ok_or_else(|| self.unsupported(Capability::Wallet))
    }

    fn contracts(&self) -> Result<&dyn ContractOps> {
        self.contract_ops()
            .ok_or_else(|| self.unsupported(Capability::Contract))
    }

    fn node(&self) -> Result<&dyn NodeOps> {
        self.node_ops()
            .ok_or_else(|| self.unsupported(Capability::Node))
    }

    fn unsupported(&self, capability: Capability) -> ChainError {
        ChainError::UnsupportedCapability {
            chain: self.display_name().to_string(),
            capability: capability.to_string(),
        }
    }
}

/// Builds the error for an unknown network id, listing the known ones.
pub fn unsupported_network(networks: &[NetworkConfig], id: &str) -> ChainError {
    let known: Vec<&str> = networks.iter().map(|n| n.id.as_str()).collect();
    ChainError::UnsupportedNetwork(format!("{id} (known: {})", known.join(", ")))
}
