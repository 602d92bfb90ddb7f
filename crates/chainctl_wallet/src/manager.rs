use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::path::PathBuf;
use tracing::info;

use chainctl_chain::adapter::u128_as_string;
use chainctl_chain::{ChainAdapter, NetworkConfig, Seed, Transfer, TransferSource, TxHandle};
use chainctl_core::{ChainError, Result, format_units, parse_positive_units};

use crate::funding::{DEFAULT_FUND_UNITS, ensure_fundable, select_genesis};
use crate::store::{StoreFile, StoredWallet};

static WALLET_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.-]{0,63}$").expect("wallet name pattern"));

/// Balance of one wallet on its network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletBalance {
    pub name: String,
    pub address: String,
    pub network: String,
    #[serde(serialize_with = "u128_as_string")]
    pub amount: u128,
    pub formatted: String,
    pub symbol: String,
}

/// Outcome of funding a wallet from a genesis wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FundReceipt {
    pub wallet: String,
    pub network: String,
    pub genesis: String,
    pub formatted: String,
    pub tx: TxHandle,
}

/// Wallet CRUD plus balance, funding and transfers.
///
/// The manager is the only writer of the wallet store. Chain-specific work
/// (key derivation, balances, transfers) goes through the adapter.
pub struct WalletManager<'a> {
    store: StoreFile,
    adapter: &'a dyn ChainAdapter,
}

impl<'a> WalletManager<'a> {
    pub fn new(store_path: impl Into<PathBuf>, adapter: &'a dyn ChainAdapter) -> Self {
        Self {
            store: StoreFile::new(store_path),
            adapter,
        }
    }

    // -- CRUD ---------------------------------------------------------------

    /// Creates a wallet with a fresh random seed.
    pub async fn create(&self, name: &str, network: &NetworkConfig) -> Result<StoredWallet> {
        validate_name(self.adapter, name)?;
        if self.store.load()?.contains(name) {
            return Err(ChainError::DuplicateWallet(name.to_string()));
        }
        let seed = Seed::generate(self.adapter.wallet()?.seed_len());
        self.insert(name, seed, network).await
    }

    /// Creates a wallet from an existing hex seed.
    pub async fn import(&self, name: &str, seed_hex: &str, network: &NetworkConfig) -> Result<StoredWallet> {
        validate_name(self.adapter, name)?;
        let seed = Seed::from_hex(seed_hex)?;
        if self.store.load()?.contains(name) {
            return Err(ChainError::DuplicateWallet(name.to_string()));
        }
        self.insert(name, seed, network).await
    }

    async fn insert(&self, name: &str, seed: Seed, network: &NetworkConfig) -> Result<StoredWallet> {
        let addresses = self
            .adapter
            .wallet()?
            .derive_addresses(&seed, network)
            .await?;
        let wallet = StoredWallet {
            name: name.to_string(),
            created_at: Utc::now(),
            network: network.id.clone(),
            seed,
            addresses,
        };
        let became_default = self.store.update(|store| {
            store.insert(wallet.clone())?;
            if store.default_name().is_none() {
                store.set_default(name)?;
                return Ok(true);
            }
            Ok(false)
        })?;
        info!(
            wallet = %name,
            network = %network.id,
            address = %wallet.addresses.unshielded,
            became_default,
            "wallet created"
        );
        Ok(wallet)
    }

    /// All wallets in insertion order.
    pub fn list(&self) -> Result<Vec<StoredWallet>> {
        Ok(self.store.load()?.wallets().cloned().collect())
    }

    /// The named wallet, or `None`.
    pub fn get(&self, name: &str) -> Result<Option<StoredWallet>> {
        Ok(self.store.load()?.get(name).cloned())
    }

    pub fn default_name(&self) -> Result<Option<String>> {
        Ok(self.store.load()?.default_name().map(str::to_string))
    }

    /// The named wallet, or the default one when `name` is `None`.
    pub fn resolve(&self, name: Option<&str>) -> Result<StoredWallet> {
        let store = self.store.load()?;
        match name {
            Some(name) => store
                .get(name)
                .cloned()
                .ok_or_else(|| ChainError::WalletNotFound(name.to_string())),
            None => store.default_wallet().cloned().ok_or_else(|| {
                ChainError::invalid("no wallet name given and no default wallet is set")
            }),
        }
    }

    pub fn remove(&self, name: &str) -> Result<StoredWallet> {
        let removed = self.store.update(|store| store.remove(name))?;
        info!(wallet = %name, "wallet removed");
        Ok(removed)
    }

    pub fn set_default(&self, name: &str) -> Result<()> {
        self.store.update(|store| store.set_default(name))?;
        info!(wallet = %name, "default wallet set");
        Ok(())
    }

    /// Seed of the named wallet as hex.
    pub fn export(&self, name: &str) -> Result<String> {
        Ok(self.resolve(Some(name))?.seed.to_hex())
    }

    // -- Chain operations ---------------------------------------------------

    /// Balance of the wallet's primary address on the wallet's network.
    pub async fn balance(&self, name: &str) -> Result<WalletBalance> {
        let wallet = self.resolve(Some(name))?;
        let network = self.adapter.network(&wallet.network)?;
        let amount = self
            .adapter
            .wallet()?
            .query_balance(&wallet.addresses.unshielded, network)
            .await?;
        Ok(WalletBalance {
            name: wallet.name,
            address: wallet.addresses.unshielded,
            network: network.id.clone(),
            amount,
            formatted: format_units(amount, network.currency.decimals),
            symbol: network.currency.symbol.clone(),
        })
    }

    /// Tops up a wallet from genesis wallet `genesis_index` (1-based).
    ///
    /// Only wallets on a fundable network qualify; the store is never
    /// written.
    pub async fn fund(
        &self,
        name: &str,
        amount: Option<&str>,
        genesis_index: usize,
    ) -> Result<FundReceipt> {
        let wallet = self.resolve(Some(name))?;
        ensure_fundable(&wallet.network)?;

        let ops = self.adapter.wallet()?;
        let network = self.adapter.network(&wallet.network)?;
        let decimals = network.currency.decimals;
        let amount = match amount {
            Some(text) => parse_positive_units(text, decimals)?,
            None => DEFAULT_FUND_UNITS
                .checked_mul(10u128.pow(decimals as u32))
                .ok_or_else(|| ChainError::invalid("default funding amount overflows"))?,
        };
        let genesis = select_genesis(ops.genesis_wallets(), genesis_index)?;

        let transfer = Transfer {
            from: TransferSource::Seed(genesis.seed()?),
            to: wallet.addresses.unshielded.clone(),
            amount,
        };
        let tx = ops.submit_transfer(&transfer, network).await?;
        info!(wallet = %name, genesis = genesis.label, hash = %tx.hash, "wallet funded");
        Ok(FundReceipt {
            wallet: wallet.name,
            network: network.id.clone(),
            genesis: genesis.label.to_string(),
            formatted: format!("{} {}", format_units(amount, decimals), network.currency.symbol),
            tx,
        })
    }

    /// Sends `amount` (decimal, whole units) from a wallet or raw address
    /// to a wallet or raw address.
    pub async fn send(&self, from: &str, to: &str, amount: &str) -> Result<TxHandle> {
        let ops = self.adapter.wallet()?;
        let store = self.store.load()?;

        let (source, network) = match store.get(from) {
            Some(wallet) => (
                TransferSource::Seed(wallet.seed.clone()),
                self.adapter.network(&wallet.network)?,
            ),
            None if ops.is_address(from) => (
                TransferSource::Address(from.to_string()),
                self.adapter.current_network(),
            ),
            None => return Err(ChainError::WalletNotFound(from.to_string())),
        };
        let recipient = match store.get(to) {
            Some(wallet) => wallet.addresses.unshielded.clone(),
            None if ops.is_address(to) => to.to_string(),
            None => return Err(ChainError::WalletNotFound(to.to_string())),
        };
        let amount = parse_positive_units(amount, network.currency.decimals)?;

        let transfer = Transfer {
            from: source,
            to: recipient,
            amount,
        };
        let tx = ops.submit_transfer(&transfer, network).await?;
        info!(from, to, hash = %tx.hash, network = %network.id, "transfer sent");
        Ok(tx)
    }
}

/// Wallet names are short identifiers and must not look like addresses.
fn validate_name(adapter: &dyn ChainAdapter, name: &str) -> Result<()> {
    if !WALLET_NAME.is_match(name) {
        return Err(ChainError::invalid(format!(
            "invalid wallet name \"{name}\": use letters, digits, '.', '-' or '_' (max 64)"
        )));
    }
    if adapter.wallet_ops().is_some_and(|ops| ops.is_address(name)) {
        return Err(ChainError::invalid(format!(
            "wallet name \"{name}\" looks like an address"
        )));
    }
    Ok(())
}
