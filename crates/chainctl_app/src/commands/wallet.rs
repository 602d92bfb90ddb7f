use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::{Args, Subcommand};
use serde::Serialize;
use serde_json::json;

use chainctl_chain::{AddressSet, TxHandle, TxStatus};
use chainctl_wallet::StoredWallet;

use crate::context::CommandContext;

#[derive(Args, Debug)]
pub struct WalletArgs {
    #[command(subcommand)]
    pub command: WalletCommand,
}

#[derive(Subcommand, Debug)]
pub enum WalletCommand {
    /// Create a wallet with a fresh random seed
    Create { name: String },
    /// Import a wallet from a hex seed
    Import { name: String, seed: String },
    /// List wallets
    List,
    /// Show the addresses of a wallet (default wallet if omitted)
    Address { name: Option<String> },
    /// Remove a wallet
    Remove { name: String },
    /// Make a wallet the default
    SetDefault { name: String },
    /// Show the balance of a wallet (default wallet if omitted)
    Balance { name: Option<String> },
    /// Top up a wallet from a genesis wallet (local networks only)
    Fund {
        name: String,
        /// Amount in whole units of the native currency
        #[arg(long)]
        amount: Option<String>,
        /// Genesis wallet to pay from (1-based)
        #[arg(long, default_value_t = 1)]
        from: usize,
    },
    /// Send native currency
    Send {
        /// Wallet name or address
        from: String,
        /// Wallet name or address
        to: String,
        /// Amount in whole units, e.g. 1.5
        amount: String,
    },
    /// Print the seed of a wallet
    Export { name: String },
}

/// A wallet as shown to the user. Never includes the seed.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WalletView {
    name: String,
    network: String,
    created_at: DateTime<Utc>,
    addresses: AddressSet,
    is_default: bool,
}

impl WalletView {
    fn new(wallet: StoredWallet, default: Option<&str>) -> Self {
        Self {
            is_default: default == Some(wallet.name.as_str()),
            name: wallet.name,
            network: wallet.network,
            created_at: wallet.created_at,
            addresses: wallet.addresses,
        }
    }
}

pub async fn run(ctx: &CommandContext, args: WalletArgs) -> Result<()> {
    let wallets = ctx.wallets();
    let out = ctx.reporter;

    match args.command {
        WalletCommand::Create { name } => {
            let network = ctx.adapter.current_network();
            let wallet = wallets.create(&name, network).await?;
            let view = WalletView::new(wallet, wallets.default_name()?.as_deref());
            out.success(&view, || created_text("Created", &view))
        }
        WalletCommand::Import { name, seed } => {
            let network = ctx.adapter.current_network();
            let wallet = wallets.import(&name, &seed, network).await?;
            let view = WalletView::new(wallet, wallets.default_name()?.as_deref());
            out.success(&view, || created_text("Imported", &view))
        }
        WalletCommand::List => {
            let default = wallets.default_name()?;
            let views: Vec<WalletView> = wallets
                .list()?
                .into_iter()
                .map(|w| WalletView::new(w, default.as_deref()))
                .collect();
            let body = json!({ "wallets": views, "default": default });
            out.success(&body, || list_text(&views))
        }
        WalletCommand::Address { name } => {
            let wallet = wallets.resolve(name.as_deref())?;
            let view = WalletView::new(wallet, wallets.default_name()?.as_deref());
            out.success(&view, || {
                let mut text = view.addresses.unshielded.clone();
                if let Some(shielded) = &view.addresses.shielded {
                    text.push_str(&format!("\nShielded: {shielded}"));
                }
                if let Some(fee) = &view.addresses.fee {
                    text.push_str(&format!("\nFee:      {fee}"));
                }
                text
            })
        }
        WalletCommand::Remove { name } => {
            wallets.remove(&name)?;
            let body = json!({ "removed": name, "default": wallets.default_name()? });
            out.success(&body, || format!("Removed wallet \"{name}\""))
        }
        WalletCommand::SetDefault { name } => {
            wallets.set_default(&name)?;
            out.success(&json!({ "default": name }), || {
                format!("Default wallet is now \"{name}\"")
            })
        }
        WalletCommand::Balance { name } => {
            let name = match name {
                Some(name) => name,
                None => wallets.resolve(None)?.name,
            };
            let balance = wallets.balance(&name).await?;
            out.success(&balance, || {
                format!(
                    "{}: {} {} ({} on {})",
                    balance.name, balance.formatted, balance.symbol, balance.address, balance.network
                )
            })
        }
        WalletCommand::Fund { name, amount, from } => {
            let receipt = wallets.fund(&name, amount.as_deref(), from).await?;
            out.success(&receipt, || {
                format!(
                    "Funded \"{}\" with {} from {}\n{}",
                    receipt.wallet,
                    receipt.formatted,
                    receipt.genesis,
                    tx_text(ctx, &receipt.tx)
                )
            })
        }
        WalletCommand::Send { from, to, amount } => {
            let tx = wallets.send(&from, &to, &amount).await?;
            out.success(&tx, || tx_text(ctx, &tx))
        }
        WalletCommand::Export { name } => {
            let seed = wallets.export(&name)?;
            out.success(&json!({ "name": name, "seed": seed }), || seed.clone())
        }
    }
}

fn created_text(verb: &str, view: &WalletView) -> String {
    let mut text = format!(
        "{verb} wallet \"{}\" on {}\nAddress: {}",
        view.name, view.network, view.addresses.unshielded
    );
    if view.is_default {
        text.push_str("\n(default wallet)");
    }
    text
}

fn list_text(views: &[WalletView]) -> String {
    if views.is_empty() {
        return "No wallets yet. Create one with `wallet create <name>`.".into();
    }
    let width = views.iter().map(|v| v.name.len()).max().unwrap_or(0);
    views
        .iter()
        .map(|v| {
            let marker = if v.is_default { '*' } else { ' ' };
            format!(
                "{marker} {:<width$}  {:<10}  {}",
                v.name, v.network, v.addresses.unshielded
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn tx_text(ctx: &CommandContext, tx: &TxHandle) -> String {
    let status = match tx.status {
        TxStatus::Confirmed => match tx.block_number {
            Some(block) => format!("confirmed in block {block}"),
            None => "confirmed".into(),
        },
        TxStatus::Pending => "pending".into(),
        TxStatus::Failed => "failed".into(),
    };
    let mut text = format!("Transaction {} ({status})", tx.hash);
    if let Some(url) = ctx.adapter.current_network().explorer_tx_url(&tx.hash) {
        text.push_str(&format!("\n{url}"));
    }
    text
}
