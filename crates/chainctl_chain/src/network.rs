use serde::{Deserialize, Serialize};

/// Native currency of a network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeCurrency {
    pub symbol: String,
    pub decimals: u8,
}

/// A network an adapter can talk to. Owned by the adapter and immutable for
/// the life of the process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkConfig {
    pub id: String,
    pub name: String,
    pub rpc_url: String,
    pub chain_id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explorer_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub faucet_url: Option<String>,
    pub currency: NativeCurrency,
    pub is_testnet: bool,
    pub is_default: bool,
    pub is_local: bool,
}

impl NetworkConfig {
    /// Link to a transaction on the block explorer, if one is configured.
    pub fn explorer_tx_url(&self, tx_hash: &str) -> Option<String> {
        self.explorer_url
            .as_ref()
            .map(|base| format!("{}/tx/{tx_hash}", base.trim_end_matches('/')))
    }

    /// Link to an address on the block explorer, if one is configured.
    pub fn explorer_address_url(&self, address: &str) -> Option<String> {
        self.explorer_url
            .as_ref()
            .map(|base| format!("{}/address/{address}", base.trim_end_matches('/')))
    }
}

const LOOPBACK_HOSTS: &[&str] = &["localhost", "127.0.0.1", "::1", "[::1]", "0.0.0.0"];

/// Whether `rpc_url` points at the local machine.
pub fn is_loopback_url(rpc_url: &str) -> bool {
    match url::Url::parse(rpc_url) {
        Ok(parsed) => parsed
            .host_str()
            .map(|h| LOOPBACK_HOSTS.contains(&h.to_ascii_lowercase().as_str()))
            .unwrap_or(false),
        Err(_) => false,
    }
}

/// Compares two RPC URLs ignoring case and a trailing slash.
pub fn same_endpoint(a: &str, b: &str) -> bool {
    let norm = |s: &str| s.trim().trim_end_matches('/').to_ascii_lowercase();
    norm(a) == norm(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> NetworkConfig {
        NetworkConfig {
            id: "testnet".into(),
            name: "Test".into(),
            rpc_url: "https://rpc.example.org".into(),
            chain_id: 5,
            explorer_url: Some("https://scan.example.org/".into()),
            faucet_url: None,
            currency: NativeCurrency {
                symbol: "ETH".into(),
                decimals: 18,
            },
            is_testnet: true,
            is_default: true,
            is_local: false,
        }
    }

    #[test]
    fn loopback_hosts_are_detected() {
        assert!(is_loopback_url("http://127.0.0.1:8545"));
        assert!(is_loopback_url("http://localhost:8545"));
        assert!(is_loopback_url("ws://[::1]:9944"));
        assert!(!is_loopback_url("https://rpc.example.org"));
        assert!(!is_loopback_url("garbage"));
    }

    #[test]
    fn explorer_links_strip_trailing_slash() {
        let net = sample();
        assert_eq!(
            net.explorer_tx_url("0xabc").as_deref(),
            Some("https://scan.example.org/tx/0xabc")
        );
        let mut bare = sample();
        bare.explorer_url = None;
        assert_eq!(bare.explorer_address_url("0x1"), None);
    }

    #[test]
    fn endpoint_comparison_is_lenient() {
        assert!(same_endpoint("https://RPC.example.org/", "https://rpc.example.org"));
        assert!(!same_endpoint("https://a.org", "https://b.org"));
    }

    #[test]
    fn serializes_camel_case() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["rpcUrl"], "https://rpc.example.org");
        assert_eq!(json["isDefault"], true);
        assert!(json.get("faucetUrl").is_none());
    }
}
