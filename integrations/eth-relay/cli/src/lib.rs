//! Command line relay client.
//!
//! Wires [`config::AppConfig`] chains to ethers-backed [`relay_client::ChainClient`]s
//! and builds a [`relay_client::RelayClient`] for one target/verifying pair.

pub mod config;
pub mod dataset;
pub mod eth_client;

use alloy_primitives::{Address, B256};
use anyhow::{bail, Context, Result};
use config::{AppConfig, ChainConfig};
use dataset::CommandDatasetProvider;
use eth_client::EthersChainClient;
use relay_client::{BlockRef, RelayClient, VerifyingChain};
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;

/// Parse `latest`, a decimal block number or a 0x-prefixed block hash.
pub fn parse_block_ref(raw: &str) -> Result<BlockRef> {
    let raw = raw.trim();
    if raw.eq_ignore_ascii_case("latest") {
        return Ok(BlockRef::Latest);
    }
    if raw.starts_with("0x") || raw.starts_with("0X") {
        let hash = B256::from_str(raw).with_context(|| format!("invalid block hash {raw}"))?;
        return Ok(BlockRef::Hash(hash));
    }
    let number = raw
        .parse::<u64>()
        .with_context(|| format!("invalid block number {raw}"))?;
    Ok(BlockRef::Number(number))
}

/// Read-only client for one configured chain.
pub fn chain_client(chain: &ChainConfig) -> Result<EthersChainClient> {
    EthersChainClient::new(&chain.rpc_url, chain.chain_id)
        .with_context(|| format!("connecting chain {}", chain.id))
}

/// Client for `chain` that signs with the configured account.
pub fn signing_client(cfg: &AppConfig, chain: &ChainConfig) -> Result<EthersChainClient> {
    let key = cfg.private_key()?;
    EthersChainClient::with_signer(&chain.rpc_url, chain.chain_id, &key)
        .with_context(|| format!("connecting chain {}", chain.id))
}

/// Build a relay client that reads from chain `target` and talks to the
/// relay contract on chain `verifying`. Without `sign`, only read-only
/// operations succeed.
pub fn connect(cfg: &AppConfig, target: u8, verifying: u8, sign: bool) -> Result<RelayClient> {
    if target == verifying {
        bail!("target and verifying chain must differ (both are {target})");
    }
    let target_cfg = cfg.chain(target)?;
    let verifying_cfg = cfg.chain(verifying)?;

    let target_client = chain_client(target_cfg)?;
    let verifying_client = if sign {
        signing_client(cfg, verifying_cfg)?
    } else {
        chain_client(verifying_cfg)?
    };
    let account = verifying_client.account().unwrap_or(Address::ZERO);

    info!(
        target,
        verifying,
        relay = %verifying_cfg.relay_address()?,
        %account,
        "relay client configured"
    );
    let mut client = RelayClient::new(
        Arc::new(target_client),
        VerifyingChain {
            client: Arc::new(verifying_client),
            relay: verifying_cfg.relay_address()?,
            ethash: verifying_cfg.ethash_address()?,
            deployment_block: verifying_cfg.deployment_block,
        },
        account,
        cfg.client_config(),
    );
    if let Some(pow) = &cfg.pow {
        client = client.with_dataset_provider(Arc::new(CommandDatasetProvider::new(
            pow.dataset_command.clone(),
            pow.dataset_args.clone(),
        )));
    }
    Ok(client)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_block_refs() {
        assert_eq!(parse_block_ref("latest").unwrap(), BlockRef::Latest);
        assert_eq!(parse_block_ref(" 1234 ").unwrap(), BlockRef::Number(1234));
        let hash = format!("0x{}", "ab".repeat(32));
        assert_eq!(
            parse_block_ref(&hash).unwrap(),
            BlockRef::Hash(B256::repeat_byte(0xab))
        );
        assert!(parse_block_ref("0x1234").is_err());
        assert!(parse_block_ref("-1").is_err());
    }
}
