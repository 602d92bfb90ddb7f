use std::collections::BTreeMap;
use tracing::debug;

use chainctl_core::{ChainConfig, ChainError, ConfigPaths, Result};

use crate::adapter::ChainAdapter;
use crate::evm::{EVM_CHAIN_ID, EvmAdapter};

/// Builds a fresh adapter for one invocation.
pub type AdapterFactory = fn(&ChainConfig, &ConfigPaths) -> Result<Box<dyn ChainAdapter>>;

/// Maps chain ids to adapter factories.
#[derive(Default)]
pub struct AdapterRegistry {
    factories: BTreeMap<String, AdapterFactory>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every adapter shipped in this crate.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(EVM_CHAIN_ID, EvmAdapter::boxed);
        registry
    }

    /// Registers `factory` under `id`, replacing any previous entry.
    pub fn register(&mut self, id: &str, factory: AdapterFactory) {
        self.factories.insert(id.to_ascii_lowercase(), factory);
    }

    /// Registered ids in sorted order.
    pub fn ids(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.factories.contains_key(&id.to_ascii_lowercase())
    }

    /// Instantiates the adapter for `id`.
    pub fn resolve(
        &self,
        id: &str,
        config: &ChainConfig,
        paths: &ConfigPaths,
    ) -> Result<Box<dyn ChainAdapter>> {
        let factory = self.factories.get(&id.to_ascii_lowercase()).ok_or_else(|| {
            ChainError::UnsupportedNetwork(format!(
                "unknown chain \"{id}\" (available: {})",
                self.ids().join(", ")
            ))
        })?;
        debug!(chain = id, "resolving chain adapter");
        factory(config, paths)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::Capability;
    use crate::network::{NativeCurrency, NetworkConfig};

    struct ReadOnlyChain {
        networks: Vec<NetworkConfig>,
    }

    impl ChainAdapter for ReadOnlyChain {
        fn id(&self) -> &str {
            "readonly"
        }
        fn display_name(&self) -> &str {
            "Read Only"
        }
        fn networks(&self) -> &[NetworkConfig] {
            &self.networks
        }
        fn current_network(&self) -> &NetworkConfig {
            &self.networks[0]
        }
        fn set_current_network(&mut self, id: &str) -> Result<()> {
            self.network(id).map(|_| ())
        }
    }

    fn readonly(_: &ChainConfig, _: &ConfigPaths) -> Result<Box<dyn ChainAdapter>> {
        Ok(Box::new(ReadOnlyChain {
            networks: vec![NetworkConfig {
                id: "solo".into(),
                name: "Solo".into(),
                rpc_url: "http://localhost:1".into(),
                chain_id: 1,
                explorer_url: None,
                faucet_url: None,
                currency: NativeCurrency {
                    symbol: "RO".into(),
                    decimals: 6,
                },
                is_testnet: true,
                is_default: true,
                is_local: true,
            }],
        }))
    }

    fn paths() -> ConfigPaths {
        ConfigPaths::at("/tmp/chainctl-registry-tests")
    }

    #[test]
    fn builtin_resolves_evm() {
        let registry = AdapterRegistry::with_builtin();
        let adapter = registry
            .resolve("EVM", &ChainConfig::default(), &paths())
            .unwrap();
        assert_eq!(adapter.id(), "evm");
        assert_eq!(registry.ids(), vec!["evm"]);
    }

    #[test]
    fn unknown_chain_is_unsupported_network() {
        let registry = AdapterRegistry::with_builtin();
        let err = registry
            .resolve("cosmos", &ChainConfig::default(), &paths())
            .err()
            .unwrap();
        assert!(matches!(err, ChainError::UnsupportedNetwork(msg) if msg.contains("evm")));
    }

    #[test]
    fn missing_capabilities_yield_typed_error() {
        let mut registry = AdapterRegistry::new();
        registry.register("readonly", readonly);
        let adapter = registry
            .resolve("readonly", &ChainConfig::default(), &paths())
            .unwrap();
        assert!(adapter.capabilities().is_empty());
        assert!(!adapter.supports(Capability::Node));
        let err = adapter.node().err().unwrap();
        assert_eq!(err.to_string(), "Read Only does not support node operations");
        assert!(matches!(
            adapter.wallet().err().unwrap(),
            ChainError::UnsupportedCapability { .. }
        ));
    }

    #[test]
    fn each_resolution_is_a_fresh_instance() {
        let registry = AdapterRegistry::with_builtin();
        let mut first = registry
            .resolve("evm", &ChainConfig::default(), &paths())
            .unwrap();
        first.set_current_network("localnet").unwrap();
        let second = registry
            .resolve("evm", &ChainConfig::default(), &paths())
            .unwrap();
        assert_eq!(second.current_network().id, "testnet");
    }
}
