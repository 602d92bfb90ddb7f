use chainctl_chain::GenesisWallet;
use chainctl_core::{ChainError, Result};

/// Networks eligible for funding from genesis wallets. Closed set.
pub const FUNDABLE_NETWORKS: &[&str] = &["localnet", "standalone", "undeployed", "devnet"];

/// Whole units sent by `fund` when no amount is given.
pub const DEFAULT_FUND_UNITS: u128 = 100;

pub fn is_fundable(network: &str) -> bool {
    FUNDABLE_NETWORKS
        .iter()
        .any(|n| n.eq_ignore_ascii_case(network))
}

/// Fails with [`ChainError::FundingNotAllowed`] for networks outside the set.
pub fn ensure_fundable(network: &str) -> Result<()> {
    if is_fundable(network) {
        Ok(())
    } else {
        Err(ChainError::FundingNotAllowed {
            network: network.to_string(),
            allowed: FUNDABLE_NETWORKS.join(", "),
        })
    }
}

/// Picks a genesis wallet by 1-based index.
pub fn select_genesis(wallets: &[GenesisWallet], index: usize) -> Result<&GenesisWallet> {
    if wallets.is_empty() {
        return Err(ChainError::invalid("this chain has no genesis wallets"));
    }
    index
        .checked_sub(1)
        .and_then(|i| wallets.get(i))
        .ok_or_else(|| {
            ChainError::invalid(format!(
                "genesis wallet index must be between 1 and {}, got {index}",
                wallets.len()
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    const GENESIS: &[GenesisWallet] = &[
        GenesisWallet {
            label: "Genesis #1",
            seed_hex: "01",
        },
        GenesisWallet {
            label: "Genesis #2",
            seed_hex: "02",
        },
    ];

    #[test]
    fn fundable_set_is_closed() {
        for net in ["localnet", "standalone", "undeployed", "devnet", "DevNet"] {
            assert!(is_fundable(net), "{net}");
        }
        for net in ["mainnet", "testnet", "preprod", "preview", ""] {
            assert!(!is_fundable(net), "{net}");
        }
    }

    #[test]
    fn ensure_fundable_names_network() {
        let err = ensure_fundable("mainnet").unwrap_err();
        assert!(matches!(
            err,
            ChainError::FundingNotAllowed { ref network, .. } if network == "mainnet"
        ));
    }

    #[test]
    fn genesis_index_is_one_based() {
        assert_eq!(select_genesis(GENESIS, 1).unwrap().label, "Genesis #1");
        assert_eq!(select_genesis(GENESIS, 2).unwrap().label, "Genesis #2");
        assert!(select_genesis(GENESIS, 0).is_err());
        assert!(select_genesis(GENESIS, 3).is_err());
        assert!(select_genesis(&[], 1).is_err());
    }
}
