use clap::{ArgAction, Args, Parser, Subcommand};

use crate::commands::{contract, network, node, wallet};

#[derive(Parser, Debug)]
#[command(name = "chainctl", version)]
#[command(about = "Developer CLI for wallets, networks, local nodes and contracts", long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// Flags accepted by every command.
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Print a single JSON document instead of human-readable text
    #[arg(long, global = true)]
    pub json: bool,

    /// Use this network instead of detecting one
    #[arg(long, global = true, value_name = "ID")]
    pub network: Option<String>,

    /// Chain adapter to use (defaults to CHAIN_TYPE)
    #[arg(long, global = true, value_name = "ID")]
    pub chain: Option<String>,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create, import and use wallets
    Wallet(wallet::WalletArgs),
    /// Inspect networks
    Network(network::NetworkArgs),
    /// Manage the local development node
    Node(node::NodeArgs),
    /// Deploy and inspect contracts
    Contract(contract::ContractArgs),
}
