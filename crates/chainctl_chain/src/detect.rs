use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use tracing::{debug, info};

use crate::adapter::ChainAdapter;
use crate::network::{NetworkConfig, is_loopback_url, same_endpoint};

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

/// Where a detected network id came from, strongest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DetectionSource {
    Env,
    Node,
    UrlPattern,
    Default,
}

impl fmt::Display for DetectionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Env => "env",
            Self::Node => "node",
            Self::UrlPattern => "url-pattern",
            Self::Default => "default",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        })
    }
}

/// Outcome of network detection. Recomputed on every invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetworkDetection {
    pub network: String,
    pub source: DetectionSource,
    pub confidence: Confidence,
}

impl NetworkDetection {
    fn new(network: impl Into<String>, source: DetectionSource, confidence: Confidence) -> Self {
        Self {
            network: network.into(),
            source,
            confidence,
        }
    }
}

/// Asks a live node which chain it serves.
#[async_trait]
pub trait NodeProbe: Send + Sync {
    /// Chain id reported by the node at `rpc_url`, or `None` when the node
    /// cannot be reached.
    async fn chain_id(&self, rpc_url: &str) -> Option<u64>;
}

// ---------------------------------------------------------------------------
// Detector
// ---------------------------------------------------------------------------

/// Resolves the active network with strict precedence:
/// explicit override, live node, URL pattern, static default.
pub struct NetworkDetector<'a> {
    networks: &'a [NetworkConfig],
    default_id: &'a str,
    /// Dev-node network that loopback URLs resolve to.
    local_id: Option<&'a str>,
}

impl<'a> NetworkDetector<'a> {
    pub fn new(networks: &'a [NetworkConfig], default_id: &'a str) -> Self {
        Self {
            networks,
            default_id,
            local_id: None,
        }
    }

    pub fn with_local_network(mut self, id: &'a str) -> Self {
        self.local_id = Some(id);
        self
    }

    pub fn for_adapter(adapter: &'a dyn ChainAdapter) -> Self {
        let detector = Self::new(adapter.networks(), &adapter.default_network().id);
        match adapter.local_network_id() {
            Some(id) => detector.with_local_network(id),
            None => detector,
        }
    }

    pub async fn detect(
        &self,
        explicit: Option<&str>,
        rpc_url: &str,
        probe: Option<&dyn NodeProbe>,
    ) -> NetworkDetection {
        if let Some(id) = explicit.map(str::trim).filter(|s| !s.is_empty()) {
            debug!(network = id, "network set explicitly");
            return NetworkDetection::new(id.to_lowercase(), DetectionSource::Env, Confidence::High);
        }

        if let Some(probe) = probe {
            if let Some(chain_id) = probe.chain_id(rpc_url).await {
                if let Some(net) = self.match_chain_id(chain_id, rpc_url) {
                    info!(network = %net.id, chain_id, "network identified by node");
                    return NetworkDetection::new(&net.id, DetectionSource::Node, Confidence::High);
                }
                debug!(chain_id, "node reported an unknown chain id");
            }
        }

        if let Some(net) = self.match_url(rpc_url) {
            debug!(network = %net.id, rpc_url, "network matched by URL");
            return NetworkDetection::new(&net.id, DetectionSource::UrlPattern, Confidence::Medium);
        }

        NetworkDetection::new(self.default_id, DetectionSource::Default, Confidence::Low)
    }

    /// Network whose chain id matches; ties go to the one serving `rpc_url`.
    pub fn match_chain_id(&self, chain_id: u64, rpc_url: &str) -> Option<&'a NetworkConfig> {
        let mut candidates = self.networks.iter().filter(|n| n.chain_id == chain_id);
        let first = candidates.next()?;
        if same_endpoint(&first.rpc_url, rpc_url) {
            return Some(first);
        }
        Some(
            candidates
                .find(|n| same_endpoint(&n.rpc_url, rpc_url))
                .unwrap_or(first),
        )
    }

    /// Known endpoint patterns, in order: exact endpoint of a remote
    /// network, a network id inside the URL, loopback host → local network.
    pub fn match_url(&self, rpc_url: &str) -> Option<&'a NetworkConfig> {
        if let Some(net) = self
            .networks
            .iter()
            .find(|n| !n.is_local && same_endpoint(&n.rpc_url, rpc_url))
        {
            return Some(net);
        }

        let lowered = rpc_url.to_ascii_lowercase();
        let mut by_len: Vec<&NetworkConfig> = self.networks.iter().filter(|n| !n.is_local).collect();
        by_len.sort_by(|a, b| b.id.len().cmp(&a.id.len()));
        if let Some(net) = by_len.into_iter().find(|n| lowered.contains(&n.id.to_ascii_lowercase())) {
            return Some(net);
        }

        if is_loopback_url(rpc_url) {
            let dedicated = self.local_id.and_then(|id| {
                self.networks
                    .iter()
                    .find(|n| n.is_local && n.id.eq_ignore_ascii_case(id))
            });
            if dedicated.is_some() {
                return dedicated;
            }
            return self
                .networks
                .iter()
                .filter(|n| n.is_local)
                .min_by_key(|n| !same_endpoint(&n.rpc_url, rpc_url));
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::NativeCurrency;

    fn net(id: &str, rpc: &str, chain_id: u64, local: bool, default: bool) -> NetworkConfig {
        NetworkConfig {
            id: id.into(),
            name: id.to_uppercase(),
            rpc_url: rpc.into(),
            chain_id,
            explorer_url: None,
            faucet_url: None,
            currency: NativeCurrency {
                symbol: "ETH".into(),
                decimals: 18,
            },
            is_testnet: true,
            is_default: default,
            is_local: local,
        }
    }

    fn networks() -> Vec<NetworkConfig> {
        vec![
            net("localnet", "http://127.0.0.1:8545", 31337, true, false),
            net("testnet", "https://rpc.testnet.example.org", 50312, false, true),
            net("mainnet", "https://rpc.example.org", 5031, false, false),
        ]
    }

    struct FixedProbe(Option<u64>);

    #[async_trait]
    impl NodeProbe for FixedProbe {
        async fn chain_id(&self, _rpc_url: &str) -> Option<u64> {
            self.0
        }
    }

    #[tokio::test]
    async fn loopback_without_node_is_url_pattern() {
        let nets = networks();
        let detector = NetworkDetector::new(&nets, "testnet");
        let probe = FixedProbe(None);
        let result = detector
            .detect(None, "http://127.0.0.1:8545", Some(&probe))
            .await;
        assert_eq!(
            result,
            NetworkDetection {
                network: "localnet".into(),
                source: DetectionSource::UrlPattern,
                confidence: Confidence::Medium,
            }
        );
    }

    #[tokio::test]
    async fn loopback_prefers_dedicated_local_network() {
        let mut nets = networks();
        // A configured network that also points at a loopback node.
        nets.push(net("devbox", "http://localhost:9999", 7, true, false));
        let detector = NetworkDetector::new(&nets, "testnet").with_local_network("localnet");
        let result = detector.detect(None, "http://localhost:9999", None).await;
        assert_eq!(result.network, "localnet");
        assert_eq!(result.source, DetectionSource::UrlPattern);

        let plain = NetworkDetector::new(&nets, "testnet");
        let result = plain.detect(None, "http://localhost:9999", None).await;
        assert_eq!(result.network, "devbox");
    }

    #[tokio::test]
    async fn explicit_override_always_wins() {
        let nets = networks();
        let detector = NetworkDetector::new(&nets, "testnet");
        let probe = FixedProbe(Some(31337));
        for url in ["http://127.0.0.1:8545", "https://rpc.example.org", "garbage"] {
            let result = detector.detect(Some("MainNet"), url, Some(&probe)).await;
            assert_eq!(result.network, "mainnet");
            assert_eq!(result.source, DetectionSource::Env);
            assert_eq!(result.confidence, Confidence::High);
        }
    }

    #[tokio::test]
    async fn node_beats_url_pattern() {
        let nets = networks();
        let detector = NetworkDetector::new(&nets, "testnet");
        let probe = FixedProbe(Some(5031));
        let result = detector
            .detect(None, "http://127.0.0.1:8545", Some(&probe))
            .await;
        assert_eq!(result.network, "mainnet");
        assert_eq!(result.source, DetectionSource::Node);
        assert_eq!(result.confidence, Confidence::High);
    }

    #[tokio::test]
    async fn unknown_chain_id_falls_through() {
        let nets = networks();
        let detector = NetworkDetector::new(&nets, "testnet");
        let probe = FixedProbe(Some(999));
        let result = detector
            .detect(None, "http://localhost:8545", Some(&probe))
            .await;
        assert_eq!(result.source, DetectionSource::UrlPattern);
        assert_eq!(result.network, "localnet");
    }

    #[tokio::test]
    async fn network_id_in_url_matches() {
        let nets = networks();
        let detector = NetworkDetector::new(&nets, "mainnet");
        let result = detector
            .detect(None, "https://node.testnet.other-provider.io", None)
            .await;
        assert_eq!(result.network, "testnet");
        assert_eq!(result.confidence, Confidence::Medium);
    }

    #[tokio::test]
    async fn exact_endpoint_matches() {
        let nets = networks();
        let detector = NetworkDetector::new(&nets, "testnet");
        let result = detector.detect(None, "https://rpc.example.org/", None).await;
        assert_eq!(result.network, "mainnet");
        assert_eq!(result.source, DetectionSource::UrlPattern);
    }

    #[tokio::test]
    async fn unknown_url_falls_back_to_default() {
        let nets = networks();
        let detector = NetworkDetector::new(&nets, "testnet");
        let result = detector.detect(None, "https://unknown.example.net", None).await;
        assert_eq!(
            result,
            NetworkDetection {
                network: "testnet".into(),
                source: DetectionSource::Default,
                confidence: Confidence::Low,
            }
        );
    }

    #[test]
    fn tags_serialize_as_documented() {
        let result = NetworkDetection::new("localnet", DetectionSource::UrlPattern, Confidence::Medium);
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["source"], "url-pattern");
        assert_eq!(json["confidence"], "medium");
        assert_eq!(DetectionSource::UrlPattern.to_string(), "url-pattern");
    }
}
