use anyhow::Result;
use clap::{Args, Subcommand};
use serde_json::json;

use chainctl_chain::{NodeOptions, NodeStatus};

use crate::context::CommandContext;

#[derive(Args, Debug)]
pub struct NodeArgs {
    #[command(subcommand)]
    pub command: NodeCommand,
}

#[derive(Subcommand, Debug)]
pub enum NodeCommand {
    /// Start the local node in the background
    Start {
        #[arg(long, default_value_t = 8545)]
        port: u16,
        /// Number of pre-funded dev accounts
        #[arg(long, default_value_t = 10)]
        accounts: u32,
        /// Balance of each dev account, in whole units
        #[arg(long, default_value_t = 10_000)]
        balance: u64,
        /// Seconds between blocks (instant mining if omitted)
        #[arg(long)]
        block_time: Option<u64>,
        /// Fork state from this RPC endpoint
        #[arg(long)]
        fork_url: Option<String>,
        #[arg(long, requires = "fork_url")]
        fork_block: Option<u64>,
    },
    /// Stop the local node
    Stop,
    /// Show whether the local node is running
    Status,
    /// Print the last lines of the node log
    Logs {
        #[arg(short = 'n', long, default_value_t = 50)]
        lines: usize,
    },
}

pub async fn run(ctx: &CommandContext, args: NodeArgs) -> Result<()> {
    let node = ctx.adapter.node()?;
    let out = ctx.reporter;

    match args.command {
        NodeCommand::Start {
            port,
            accounts,
            balance,
            block_time,
            fork_url,
            fork_block,
        } => {
            let options = NodeOptions {
                port,
                accounts,
                balance,
                block_time,
                fork_url,
                fork_block,
            };
            let started = node.start(&options).await?;
            out.success(&started, || {
                let head = if started.spawned {
                    "Local node started"
                } else {
                    "Local node already running"
                };
                format!("{head}\n{}", status_text(&started.status))
            })
        }
        NodeCommand::Stop => {
            let stopped = node.stop().await?;
            out.success(&json!({ "stopped": stopped }), || {
                if stopped {
                    "Local node stopped".into()
                } else {
                    "Local node was not running".into()
                }
            })
        }
        NodeCommand::Status => {
            let status = node.status().await?;
            out.success(&status, || status_text(&status))
        }
        NodeCommand::Logs { lines } => {
            let logs = node.logs(lines).await?;
            out.success(&json!({ "lines": lines, "logs": logs }), || logs.trim_end().to_string())
        }
    }
}

fn status_text(status: &NodeStatus) -> String {
    if !status.running {
        return "Local node is not running".into();
    }
    let mut text = String::from("Running");
    if let Some(pid) = status.pid {
        text.push_str(&format!(" (pid {pid})"));
    }
    if let Some(url) = &status.rpc_url {
        text.push_str(&format!("\nRPC: {url}"));
    }
    if let Some(started) = status.started_at {
        text.push_str(&format!("\nStarted: {}", started.to_rfc3339()));
    }
    text
}
