pub mod contract;
pub mod network;
pub mod node;
pub mod wallet;

use anyhow::Result;

use crate::cli::Command;
use crate::context::CommandContext;

pub async fn dispatch(ctx: &CommandContext, command: Command) -> Result<()> {
    match command {
        Command::Wallet(args) => wallet::run(ctx, args).await,
        Command::Network(args) => network::run(ctx, args).await,
        Command::Node(args) => node::run(ctx, args).await,
        Command::Contract(args) => contract::run(ctx, args).await,
    }
}
