use anyhow::Result;
use tracing::{debug, info};

use chainctl_chain::{AdapterRegistry, ChainAdapter, Confidence, NetworkDetection, NetworkDetector};
use chainctl_core::{ChainConfig, ConfigPaths};
use chainctl_wallet::{ContractStore, WalletManager};

use crate::cli::GlobalArgs;
use crate::output::Reporter;

/// Everything a command needs, rebuilt on every invocation.
pub struct CommandContext {
    pub config: ChainConfig,
    pub paths: ConfigPaths,
    pub adapter: Box<dyn ChainAdapter>,
    pub detection: NetworkDetection,
    pub reporter: Reporter,
}

impl CommandContext {
    /// Resolves the adapter, detects the active network and applies it.
    ///
    /// An explicit network that the adapter does not know fails here with
    /// an unsupported-network error.
    pub async fn build(global: &GlobalArgs, config: ChainConfig, paths: ConfigPaths) -> Result<Self> {
        let reporter = Reporter::new(global.json);
        let registry = AdapterRegistry::with_builtin();
        let chain_id = global.chain.as_deref().unwrap_or(&config.chain_type);
        let mut adapter = registry.resolve(chain_id, &config, &paths)?;

        let explicit = global
            .network
            .as_deref()
            .or(config.network_override.as_deref());
        let detection = NetworkDetector::for_adapter(adapter.as_ref())
            .detect(explicit, &config.rpc_url, adapter.probe())
            .await;
        adapter.set_current_network(&detection.network)?;

        if detection.confidence == Confidence::Low {
            reporter.warn(&format!(
                "could not detect the network from {}; using default \"{}\" (pass --network to choose)",
                config.rpc_url, detection.network
            ));
        }
        info!(
            chain = adapter.id(),
            network = %detection.network,
            source = %detection.source,
            confidence = %detection.confidence,
            "command context ready"
        );
        debug!(root = %paths.root().display(), "config directory");

        Ok(Self {
            config,
            paths,
            adapter,
            detection,
            reporter,
        })
    }

    pub fn wallets(&self) -> WalletManager<'_> {
        WalletManager::new(self.paths.wallets_file(), self.adapter.as_ref())
    }

    pub fn contracts(&self) -> ContractStore {
        ContractStore::new(self.paths.contracts_dir())
    }
}
