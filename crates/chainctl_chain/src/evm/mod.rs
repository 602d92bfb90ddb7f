//! EVM chain adapter.
//!
//! Keys are raw 32-byte secp256k1 secrets. Transfers from a seed are signed
//! locally as legacy EIP-155 transactions; transfers from a bare address
//! are handed to the node (`eth_sendTransaction`), which only works for
//! accounts the node has unlocked, such as Anvil's dev accounts.

pub mod anvil;
pub mod artifact;
pub mod keys;
pub mod tx;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

use chainctl_core::{ChainConfig, ChainError, ConfigPaths, Result};

use crate::adapter::{
    AddressSet, ChainAdapter, ContractArtifact, ContractOps, Deployment, GenesisWallet, NodeOps,
    Seed, Transfer, TransferSource, TxHandle, TxStatus, WalletOps, unsupported_network,
};
use crate::detect::NodeProbe;
use crate::network::{NativeCurrency, NetworkConfig, is_loopback_url};
use crate::rpc::{RpcClient, parse_quantity, to_quantity};

use self::anvil::{AnvilNode, local_rpc_url};
use self::keys::{EvmKey, parse_address, to_checksum};
use self::tx::{LegacyTx, TRANSFER_GAS, create_address};

pub const EVM_CHAIN_ID: &str = "evm";
pub const LOCALNET_ID: &str = "localnet";
pub const LOCALNET_CHAIN_ID: u64 = 31337;

const RECEIPT_POLL: Duration = Duration::from_millis(500);
const RECEIPT_TIMEOUT: Duration = Duration::from_secs(30);
const PROBE_TIMEOUT: Duration = Duration::from_millis(1500);

/// The first four accounts of Anvil's default mnemonic.
pub const ANVIL_GENESIS: &[GenesisWallet] = &[
    GenesisWallet {
        label: "Genesis #1",
        seed_hex: "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80",
    },
    GenesisWallet {
        label: "Genesis #2",
        seed_hex: "59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d",
    },
    GenesisWallet {
        label: "Genesis #3",
        seed_hex: "5de4111afa1a4b94908f83103eb1f1706367c2e68ca870fc3fb9a804cdab365a",
    },
    GenesisWallet {
        label: "Genesis #4",
        seed_hex: "7c852118294e51e653712a81e05800f419141751be58f605c371e15141b007a6",
    },
];

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Receipt {
    #[serde(default)]
    block_number: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

// ---------------------------------------------------------------------------
// Adapter
// ---------------------------------------------------------------------------

pub struct EvmAdapter {
    display_name: String,
    networks: Vec<NetworkConfig>,
    current: usize,
    node: AnvilNode,
    probe: EvmProbe,
}

impl EvmAdapter {
    pub fn new(config: &ChainConfig, paths: &ConfigPaths) -> Self {
        let networks = Self::networks_from(config);
        let current = networks.iter().position(|n| n.is_default).unwrap_or(0);
        Self {
            display_name: config.chain_name.clone(),
            networks,
            current,
            node: AnvilNode::new(paths.node_dir()),
            probe: EvmProbe,
        }
    }

    /// Registry entry point.
    pub fn boxed(config: &ChainConfig, paths: &ConfigPaths) -> Result<Box<dyn ChainAdapter>> {
        Ok(Box::new(Self::new(config, paths)))
    }

    /// Local Anvil plus the configured network.
    fn networks_from(config: &ChainConfig) -> Vec<NetworkConfig> {
        let currency = NativeCurrency {
            symbol: config.native_currency.clone(),
            decimals: config.native_decimals,
        };
        let configured_is_local = config.network_id == LOCALNET_ID;
        let localnet = NetworkConfig {
            id: LOCALNET_ID.into(),
            name: "Local (Anvil)".into(),
            rpc_url: local_rpc_url(8545),
            chain_id: LOCALNET_CHAIN_ID,
            explorer_url: None,
            faucet_url: None,
            currency: currency.clone(),
            is_testnet: true,
            is_default: configured_is_local,
            is_local: true,
        };
        if configured_is_local {
            return vec![localnet];
        }
        let configured = NetworkConfig {
            id: config.network_id.clone(),
            name: config.chain_name.clone(),
            rpc_url: config.rpc_url.clone(),
            chain_id: config.chain_id,
            explorer_url: config.explorer_url.clone(),
            faucet_url: config.faucet_url.clone(),
            currency,
            is_testnet: config.network_id != "mainnet",
            is_default: true,
            is_local: is_loopback_url(&config.rpc_url),
        };
        vec![localnet, configured]
    }

    fn client(network: &NetworkConfig) -> Result<RpcClient> {
        RpcClient::new(&network.rpc_url)
    }

    async fn wait_for_receipt(&self, client: &RpcClient, hash: &str) -> Result<(TxStatus, Option<u64>)> {
        let deadline = tokio::time::Instant::now() + RECEIPT_TIMEOUT;
        loop {
            let receipt: Option<Receipt> = client
                .call("eth_getTransactionReceipt", json!([hash]))
                .await?;
            if let Some(receipt) = receipt {
                let block = match receipt.block_number.as_deref() {
                    Some(b) => Some(parse_quantity(b)? as u64),
                    None => None,
                };
                let status = match receipt.status.as_deref() {
                    Some("0x0") => TxStatus::Failed,
                    _ => TxStatus::Confirmed,
                };
                return Ok((status, block));
            }
            if tokio::time::Instant::now() >= deadline {
                debug!(hash, "receipt not available yet, reporting pending");
                return Ok((TxStatus::Pending, None));
            }
            tokio::time::sleep(RECEIPT_POLL).await;
        }
    }

    async fn nonce_and_price(&self, client: &RpcClient, from: &str) -> Result<(u128, u128)> {
        let nonce: String = client
            .call("eth_getTransactionCount", json!([from, "pending"]))
            .await?;
        let price: String = client.call("eth_gasPrice", json!([])).await?;
        Ok((parse_quantity(&nonce)?, parse_quantity(&price)?))
    }

    async fn send_raw(&self, client: &RpcClient, raw: &[u8]) -> Result<String> {
        client
            .call("eth_sendRawTransaction", json!([format!("0x{}", hex::encode(raw))]))
            .await
    }
}

impl ChainAdapter for EvmAdapter {
    fn id(&self) -> &str {
        EVM_CHAIN_ID
    }

    fn display_name(&self) -> &str {
        &self.display_name
    }

    fn networks(&self) -> &[NetworkConfig] {
        &self.networks
    }

    fn current_network(&self) -> &NetworkConfig {
        &self.networks[self.current]
    }

    fn set_current_network(&mut self, id: &str) -> Result<()> {
        let index = self
            .networks
            .iter()
            .position(|n| n.id.eq_ignore_ascii_case(id))
            .ok_or_else(|| unsupported_network(&self.networks, id))?;
        self.current = index;
        Ok(())
    }

    fn wallet_ops(&self) -> Option<&dyn WalletOps> {
        Some(self)
    }

    fn contract_ops(&self) -> Option<&dyn ContractOps> {
        Some(self)
    }

    fn node_ops(&self) -> Option<&dyn NodeOps> {
        Some(&self.node)
    }

    fn probe(&self) -> Option<&dyn NodeProbe> {
        Some(&self.probe)
    }

    fn local_network_id(&self) -> Option<&str> {
        Some(LOCALNET_ID)
    }
}

#[async_trait]
impl WalletOps for EvmAdapter {
    async fn derive_addresses(&self, seed: &Seed, _network: &NetworkConfig) -> Result<AddressSet> {
        let key = EvmKey::from_seed(seed)?;
        Ok(AddressSet {
            unshielded: key.address(),
            shielded: None,
            fee: None,
            public_key: key.public_key_hex(),
        })
    }

    async fn query_balance(&self, address: &str, network: &NetworkConfig) -> Result<u128> {
        parse_address(address)?;
        let client = Self::client(network)?;
        let balance: String = client
            .call("eth_getBalance", json!([address, "latest"]))
            .await?;
        parse_quantity(&balance)
    }

    async fn submit_transfer(&self, transfer: &Transfer, network: &NetworkConfig) -> Result<TxHandle> {
        let to = parse_address(&transfer.to)?;
        let client = Self::client(network)?;

        let (from, hash) = match &transfer.from {
            TransferSource::Seed(seed) => {
                let key = EvmKey::from_seed(seed)?;
                let from = key.address();
                let (nonce, gas_price) = self.nonce_and_price(&client, &from).await?;
                let tx = LegacyTx {
                    nonce,
                    gas_price,
                    gas: TRANSFER_GAS,
                    to: Some(to),
                    value: transfer.amount,
                    data: Vec::new(),
                    chain_id: network.chain_id,
                };
                let hash = self.send_raw(&client, &tx.sign(&key)?).await?;
                (from, hash)
            }
            TransferSource::Address(address) => {
                parse_address(address)?;
                let hash: String = client
                    .call(
                        "eth_sendTransaction",
                        json!([{
                            "from": address,
                            "to": to_checksum(&to),
                            "value": to_quantity(transfer.amount),
                        }]),
                    )
                    .await?;
                (address.clone(), hash)
            }
        };
        info!(%hash, %from, network = %network.id, "transfer submitted");

        let (status, block_number) = self.wait_for_receipt(&client, &hash).await?;
        Ok(TxHandle {
            hash,
            from,
            to: to_checksum(&to),
            amount: transfer.amount,
            status,
            block_number,
        })
    }

    fn genesis_wallets(&self) -> &[GenesisWallet] {
        ANVIL_GENESIS
    }

    fn is_address(&self, text: &str) -> bool {
        keys::is_address(text)
    }
}

#[async_trait]
impl ContractOps for EvmAdapter {
    fn load_artifact(&self, path: &Path) -> Result<ContractArtifact> {
        artifact::load_artifact(path)
    }

    async fn deploy(
        &self,
        artifact: &ContractArtifact,
        deployer: &Seed,
        network: &NetworkConfig,
    ) -> Result<Deployment> {
        if artifact.constructor_inputs > 0 {
            return Err(ChainError::invalid(format!(
                "{} takes {} constructor argument(s); constructor arguments are not supported",
                artifact.name, artifact.constructor_inputs
            )));
        }
        let key = EvmKey::from_seed(deployer)?;
        let from = key.address();
        let client = Self::client(network)?;
        let (nonce, gas_price) = self.nonce_and_price(&client, &from).await?;
        let data = format!("0x{}", hex::encode(&artifact.bytecode));
        let estimate: String = client
            .call("eth_estimateGas", json!([{ "from": from, "data": data }]))
            .await?;
        let gas = parse_quantity(&estimate)?;

        let tx = LegacyTx {
            nonce,
            gas_price,
            // 20% headroom over the estimate.
            gas: gas + gas / 5,
            to: None,
            value: 0,
            data: artifact.bytecode.clone(),
            chain_id: network.chain_id,
        };
        let tx_hash = self.send_raw(&client, &tx.sign(&key)?).await?;
        let address = to_checksum(&create_address(&key.address_bytes(), nonce));
        info!(%tx_hash, %address, contract = %artifact.name, "deployment submitted");

        let (status, block_number) = self.wait_for_receipt(&client, &tx_hash).await?;
        if status == TxStatus::Failed {
            return Err(ChainError::Rpc {
                code: 0,
                message: format!("deployment transaction {tx_hash} reverted"),
            });
        }
        Ok(Deployment {
            address,
            tx_hash,
            block_number,
        })
    }
}

// ---------------------------------------------------------------------------
// Node probe
// ---------------------------------------------------------------------------

/// Reads `eth_chainId` with a short timeout.
pub struct EvmProbe;

#[async_trait]
impl NodeProbe for EvmProbe {
    async fn chain_id(&self, rpc_url: &str) -> Option<u64> {
        let client = RpcClient::with_timeout(rpc_url, PROBE_TIMEOUT).ok()?;
        match client.call::<String>("eth_chainId", json!([])).await {
            Ok(raw) => parse_quantity(&raw).ok().map(|id| id as u64),
            Err(e) => {
                debug!(rpc_url, error = %e, "node probe failed");
                None
            }
        }
    }
}
