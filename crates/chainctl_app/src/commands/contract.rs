use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Args, Subcommand};
use serde_json::json;
use std::path::PathBuf;
use tracing::info;

use chainctl_wallet::ContractMetadata;

use crate::context::CommandContext;

#[derive(Args, Debug)]
pub struct ContractArgs {
    #[command(subcommand)]
    pub command: ContractCommand,
}

#[derive(Subcommand, Debug)]
pub enum ContractCommand {
    /// Deploy a compiled contract artifact
    Deploy {
        artifact: PathBuf,
        /// Paying wallet (default wallet if omitted)
        #[arg(long)]
        wallet: Option<String>,
    },
    /// List deployed contracts
    List,
    /// Show one deployed contract
    Show { address: String },
}

pub async fn run(ctx: &CommandContext, args: ContractArgs) -> Result<()> {
    let out = ctx.reporter;
    let store = ctx.contracts();

    match args.command {
        ContractCommand::Deploy { artifact, wallet } => {
            let ops = ctx.adapter.contracts()?;
            let loaded = ops.load_artifact(&artifact)?;
            let deployer = ctx.wallets().resolve(wallet.as_deref())?;
            let network = ctx.adapter.network(&deployer.network)?;

            let deployment = ops.deploy(&loaded, &deployer.seed, network).await?;
            let metadata = ContractMetadata {
                contract_address: deployment.address.clone(),
                deployed_at: Utc::now(),
                contract_path: artifact.display().to_string(),
                network: network.id.clone(),
                deploy_tx_hash: deployment.tx_hash.clone(),
                operations: loaded.operations.clone(),
            };
            let saved = store.save(&metadata).with_context(|| {
                format!("contract deployed at {} but metadata was not saved", deployment.address)
            })?;
            info!(address = %deployment.address, wallet = %deployer.name, "contract deployed");

            out.success(&metadata, || {
                let mut text = format!(
                    "Deployed {} at {}\nTransaction: {}",
                    loaded.name, deployment.address, deployment.tx_hash
                );
                if let Some(block) = deployment.block_number {
                    text.push_str(&format!(" (block {block})"));
                }
                if let Some(url) = network.explorer_address_url(&deployment.address) {
                    text.push_str(&format!("\n{url}"));
                }
                text.push_str(&format!("\nMetadata: {}", saved.display()));
                text
            })
        }
        ContractCommand::List => {
            let records = store.list()?;
            out.success(&json!({ "contracts": records }), || {
                if records.is_empty() {
                    return "No contracts deployed yet".into();
                }
                records
                    .iter()
                    .map(|r| {
                        format!(
                            "{}  {:<10}  {}  {}",
                            r.contract_address,
                            r.network,
                            r.deployed_at.format("%Y-%m-%d %H:%M"),
                            r.contract_path
                        )
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            })
        }
        ContractCommand::Show { address } => {
            let record = store.require(&address)?;
            out.success(&record, || {
                format!(
                    "Address:    {}\nNetwork:    {}\nDeployed:   {}\nArtifact:   {}\nTx:         {}\nOperations: {}",
                    record.contract_address,
                    record.network,
                    record.deployed_at.to_rfc3339(),
                    record.contract_path,
                    record.deploy_tx_hash,
                    record.operations.join(", ")
                )
            })
        }
    }
}
