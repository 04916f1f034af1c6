use alloy_primitives::{Address, B256, U256};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use eth_relay_cli::config::AppConfig;
use eth_relay_cli::{chain_client, connect, parse_block_ref, signing_client};
use relay_client::ChainClient;
use relay_core::{EpochData, TrieKind};
use serde::Serialize;
use serde_json::json;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "eth-relay", about = "Relay PoW headers and prove inclusion on a verifying chain")]
struct Args {
    #[arg(long, default_value = "integrations/eth-relay/configs/example.toml")]
    config: PathBuf,

    /// Chain the relayed headers come from.
    #[arg(long, global = true, default_value_t = 0)]
    target: u8,

    /// Chain hosting the relay contract.
    #[arg(long, global = true, default_value_t = 1)]
    chain: u8,

    #[command(subcommand)]
    command: Cli,
}

#[derive(Subcommand, Debug)]
enum Cli {
    /// Print the configured account address.
    Account,
    /// Account balance on `--chain`, or on every configured chain with `--all`.
    Balance {
        #[arg(long)]
        all: bool,
    },
    /// Submit a target-chain block header (number, hash or `latest`).
    Submit {
        #[arg(long, default_value = "latest")]
        block: String,
        /// Rotate the header's roots first, producing a disputable submission.
        #[arg(long)]
        randomize: bool,
    },
    /// Dispute the proof of work of a submitted header.
    Dispute {
        #[arg(long)]
        hash: B256,
    },
    /// Build a Merkle proof without sending it.
    Proof {
        #[command(subcommand)]
        kind: ProofKind,
    },
    /// Build a Merkle proof and have the relay verify it.
    Verify {
        #[command(subcommand)]
        kind: ProofKind,
        /// Fee in wei; defaults to the contract's required fee.
        #[arg(long)]
        fee: Option<U256>,
        #[arg(long, default_value_t = 0)]
        confirmations: u8,
    },
    Stake {
        #[command(subcommand)]
        action: StakeAction,
    },
    Header {
        #[command(subcommand)]
        query: HeaderQuery,
    },
    Epoch {
        #[command(subcommand)]
        action: EpochAction,
    },
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum ProofKind {
    Tx {
        #[arg(long)]
        tx: B256,
    },
    Receipt {
        #[arg(long)]
        tx: B256,
    },
}

impl ProofKind {
    fn split(self) -> (TrieKind, B256) {
        match self {
            Self::Tx { tx } => (TrieKind::Transaction, tx),
            Self::Receipt { tx } => (TrieKind::Receipt, tx),
        }
    }
}

#[derive(Subcommand, Debug)]
enum StakeAction {
    Show,
    Deposit {
        /// Amount in wei.
        #[arg(long)]
        amount: U256,
    },
    Withdraw {
        #[arg(long)]
        amount: U256,
    },
}

#[derive(Subcommand, Debug)]
enum HeaderQuery {
    Stored {
        #[arg(long)]
        hash: B256,
    },
    Endpoint,
    Fee,
    Get {
        #[arg(long)]
        hash: B256,
    },
}

#[derive(Subcommand, Debug)]
enum EpochAction {
    /// Upload ethash epoch data from a JSON file.
    Set {
        #[arg(long)]
        file: PathBuf,
        /// Node offset to resume from; must be a multiple of 40.
        #[arg(long, default_value_t = 0)]
        resume_from: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let cfg = AppConfig::from_toml(&args.config)?;

    let ctx = || format!("chain {} (target {})", args.chain, args.target);
    match args.command {
        Cli::Account => run_account(&cfg, args.chain).await,
        Cli::Balance { all } => run_balance(&cfg, args.chain, all).await,
        Cli::Submit { block, randomize } => {
            let client = connect(&cfg, args.target, args.chain, true)?;
            let block = parse_block_ref(&block)?;
            let submitted = if randomize {
                client.submit_randomized_block(block).await
            } else {
                client.submit_block(block).await
            }
            .with_context(ctx)?;
            print(&submitted)
        }
        Cli::Dispute { hash } => {
            let client = connect(&cfg, args.target, args.chain, true)?;
            print(&client.dispute_header(hash).await.with_context(ctx)?)
        }
        Cli::Proof { kind } => {
            let client = connect(&cfg, args.target, args.chain, false)?;
            let proof = match kind.split() {
                (TrieKind::Receipt, tx) => client.build_receipt_proof(tx).await,
                (_, tx) => client.build_tx_proof(tx).await,
            }
            .with_context(ctx)?;
            print(&json!({
                "kind": proof.kind,
                "block_hash": proof.block_hash,
                "header": proof.header,
                "value": proof.proof.value,
                "path": proof.proof.path,
                "nodes": alloy_primitives::Bytes::from(proof.proof.encoded_nodes()),
            }))
        }
        Cli::Verify {
            kind,
            fee,
            confirmations,
        } => {
            let client = connect(&cfg, args.target, args.chain, true)?;
            let fee = match fee {
                Some(fee) => fee,
                None => client.required_verification_fee().await.with_context(ctx)?,
            };
            let (kind, tx) = kind.split();
            let outcome = client
                .verify_inclusion(kind, tx, fee, confirmations)
                .await
                .with_context(ctx)?;
            print(&outcome)
        }
        Cli::Stake { action } => {
            let sign = !matches!(action, StakeAction::Show);
            let client = connect(&cfg, args.target, args.chain, sign)?;
            match action {
                StakeAction::Show => {
                    let stake = client.stake().await.with_context(ctx)?;
                    print(&json!({ "stake": stake }))
                }
                StakeAction::Deposit { amount } => {
                    let tx_hash = client.deposit_stake(amount).await.with_context(ctx)?;
                    print(&json!({ "tx_hash": tx_hash, "amount": amount }))
                }
                StakeAction::Withdraw { amount } => {
                    print(&client.withdraw_stake(amount).await.with_context(ctx)?)
                }
            }
        }
        Cli::Header { query } => {
            let client = connect(&cfg, args.target, args.chain, false)?;
            match query {
                HeaderQuery::Stored { hash } => {
                    let stored = client.is_header_stored(hash).await.with_context(ctx)?;
                    print(&json!({ "hash": hash, "stored": stored }))
                }
                HeaderQuery::Endpoint => {
                    let endpoint = client.longest_chain_endpoint().await.with_context(ctx)?;
                    print(&json!({ "endpoint": endpoint }))
                }
                HeaderQuery::Fee => {
                    let fee = client.required_verification_fee().await.with_context(ctx)?;
                    print(&json!({ "fee": fee }))
                }
                HeaderQuery::Get { hash } => {
                    print(&client.stored_header(hash).await.with_context(ctx)?)
                }
            }
        }
        Cli::Epoch {
            action: EpochAction::Set { file, resume_from },
        } => {
            let raw = std::fs::read(&file)
                .with_context(|| format!("failed reading epoch file: {}", file.display()))?;
            let data: EpochData =
                serde_json::from_slice(&raw).context("failed parsing epoch data json")?;
            let client = connect(&cfg, args.target, args.chain, true)?;
            let sent = client
                .set_epoch_data(&data, resume_from)
                .await
                .with_context(ctx)?;
            print(&json!({ "epoch": data.epoch, "transactions": sent }))
        }
    }
}

async fn run_account(cfg: &AppConfig, chain: u8) -> Result<()> {
    let client = signing_client(cfg, cfg.chain(chain)?)?;
    print(&json!({ "account": client.account().unwrap_or(Address::ZERO) }))
}

async fn run_balance(cfg: &AppConfig, chain: u8, all: bool) -> Result<()> {
    let selected = cfg.chain(chain)?;
    let account = signing_client(cfg, selected)?
        .account()
        .unwrap_or(Address::ZERO);

    let chains: Vec<_> = if all {
        cfg.chains.iter().collect()
    } else {
        vec![selected]
    };
    let mut balances = serde_json::Map::new();
    let mut total = U256::ZERO;
    for chain in chains {
        let balance = chain_client(chain)?
            .balance(account)
            .await
            .with_context(|| format!("balance on chain {}", chain.id))?;
        info!(chain = chain.id, %balance, "fetched balance");
        total = total.saturating_add(balance);
        balances.insert(chain.id.to_string(), json!(balance));
    }
    print(&json!({ "account": account, "balances": balances, "total": total }))
}

fn print<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
