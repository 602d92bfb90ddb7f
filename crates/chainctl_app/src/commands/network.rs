use anyhow::Result;
use clap::{Args, Subcommand};
use serde_json::json;

use chainctl_chain::NetworkConfig;

use crate::context::CommandContext;

#[derive(Args, Debug)]
pub struct NetworkArgs {
    #[command(subcommand)]
    pub command: NetworkCommand,
}

#[derive(Subcommand, Debug)]
pub enum NetworkCommand {
    /// List the networks of the active chain
    List,
    /// Show the active network
    Current,
    /// Show how the active network was chosen
    Detect,
}

pub async fn run(ctx: &CommandContext, args: NetworkArgs) -> Result<()> {
    let out = ctx.reporter;
    let current = ctx.adapter.current_network();

    match args.command {
        NetworkCommand::List => {
            let networks = ctx.adapter.networks();
            let body = json!({
                "chain": ctx.adapter.id(),
                "current": current.id,
                "networks": networks,
            });
            out.success(&body, || {
                networks
                    .iter()
                    .map(|n| {
                        let marker = if n.id == current.id { '*' } else { ' ' };
                        format!("{marker} {:<12} {}", n.id, describe(n))
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            })
        }
        NetworkCommand::Current => {
            let body = json!({ "network": current, "detection": ctx.detection });
            out.success(&body, || {
                let mut text = format!("{} ({})\nRPC:      {}", current.name, current.id, current.rpc_url);
                text.push_str(&format!("\nChain id: {}", current.chain_id));
                if let Some(explorer) = &current.explorer_url {
                    text.push_str(&format!("\nExplorer: {explorer}"));
                }
                if let Some(faucet) = &current.faucet_url {
                    text.push_str(&format!("\nFaucet:   {faucet}"));
                }
                text
            })
        }
        NetworkCommand::Detect => {
            let detection = &ctx.detection;
            let body = json!({
                "network": detection.network,
                "source": detection.source,
                "confidence": detection.confidence,
                "rpcUrl": ctx.config.rpc_url,
            });
            out.success(&body, || {
                format!(
                    "{} (source: {}, confidence: {}, rpc: {})",
                    detection.network, detection.source, detection.confidence, ctx.config.rpc_url
                )
            })
        }
    }
}

fn describe(network: &NetworkConfig) -> String {
    let mut tags = Vec::new();
    if network.is_local {
        tags.push("local");
    }
    if network.is_testnet {
        tags.push("testnet");
    }
    if network.is_default {
        tags.push("default");
    }
    let tags = if tags.is_empty() {
        String::new()
    } else {
        format!(" [{}]", tags.join(", "))
    };
    format!("{} {}{tags}", network.name, network.rpc_url)
}
