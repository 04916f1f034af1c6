use alloy_primitives::Address;
use anyhow::{anyhow, bail, Context, Result};
use relay_client::{OrchestratorConfig, RelayClientConfig};
use serde::Deserialize;
use std::collections::HashSet;
use std::env;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub account: AccountConfig,
    #[serde(default)]
    pub relay: RelaySettings,
    pub pow: Option<PowConfig>,
    pub chains: Vec<ChainConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccountConfig {
    /// Hex private key or an `env:VAR` reference. Resolved when a signer is
    /// needed, so read-only commands work without it.
    pub private_key: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RelaySettings {
    pub receipt_timeout_secs: u64,
    pub poll_interval_ms: u64,
    pub log_page_size: u64,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            receipt_timeout_secs: 120,
            poll_interval_ms: 1000,
            log_page_size: 10_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PowConfig {
    /// Program printing the dataset proof as JSON.
    pub dataset_command: String,
    #[serde(default)]
    pub dataset_args: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    pub id: u8,
    pub rpc_url: String,
    pub chain_id: u64,
    /// Set on chains hosting a relay contract.
    pub relay_address: Option<String>,
    pub ethash_address: Option<String>,
    #[serde(default)]
    pub deployment_block: u64,
}

impl ChainConfig {
    pub fn relay_address(&self) -> Result<Address> {
        let raw = self
            .relay_address
            .as_deref()
            .ok_or_else(|| anyhow!("chain {} has no relay_address", self.id))?;
        parse_address(raw).with_context(|| format!("chain {} relay_address", self.id))
    }

    pub fn ethash_address(&self) -> Result<Option<Address>> {
        self.ethash_address
            .as_deref()
            .map(|raw| {
                parse_address(raw).with_context(|| format!("chain {} ethash_address", self.id))
            })
            .transpose()
    }
}

impl AppConfig {
    pub fn from_toml(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed reading config file: {}", path.display()))?;
        let mut cfg: AppConfig = toml::from_str(&raw).context("failed parsing config toml")?;

        // Env overrides (explicit) first.
        if let Ok(v) = env::var("RELAY_PRIVATE_KEY") {
            if !v.trim().is_empty() {
                cfg.account.private_key = v;
            }
        }
        for chain in &mut cfg.chains {
            if let Ok(v) = env::var(format!("RELAY_CHAIN_{}_RPC_URL", chain.id)) {
                if !v.trim().is_empty() {
                    chain.rpc_url = v;
                }
            }
            chain.rpc_url = resolve_env_ref(&chain.rpc_url)?;
        }

        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<()> {
        if self.relay.receipt_timeout_secs == 0 {
            bail!("relay.receipt_timeout_secs must be > 0");
        }
        if self.relay.poll_interval_ms == 0 {
            bail!("relay.poll_interval_ms must be > 0");
        }
        if self.relay.log_page_size == 0 {
            bail!("relay.log_page_size must be > 0");
        }
        if self.chains.is_empty() {
            bail!("at least one [[chains]] entry is required");
        }

        let mut seen = HashSet::new();
        for chain in &self.chains {
            if !seen.insert(chain.id) {
                bail!("duplicate chain id {}", chain.id);
            }
            if chain.relay_address.is_some() {
                chain.relay_address()?;
            }
            chain.ethash_address()?;
        }
        Ok(())
    }

    pub fn chain(&self, id: u8) -> Result<&ChainConfig> {
        self.chains
            .iter()
            .find(|c| c.id == id)
            .ok_or_else(|| anyhow!("chain {id} is not configured"))
    }

    pub fn private_key(&self) -> Result<String> {
        resolve_env_ref(&self.account.private_key)
    }

    pub fn client_config(&self) -> RelayClientConfig {
        RelayClientConfig {
            orchestrator: OrchestratorConfig {
                receipt_timeout: Duration::from_secs(self.relay.receipt_timeout_secs),
                poll_interval: Duration::from_millis(self.relay.poll_interval_ms),
            },
            log_page_size: self.relay.log_page_size,
        }
    }
}

fn parse_address(raw: &str) -> Result<Address> {
    Address::from_str(raw.trim()).map_err(|e| anyhow!("invalid address {raw}: {e}"))
}

pub fn resolve_env_ref(value: &str) -> Result<String> {
    const PREFIX: &str = "env:";
    if let Some(var) = value.strip_prefix(PREFIX) {
        let var = var.trim();
        if var.is_empty() {
            return Err(anyhow!("invalid env ref: {value}"));
        }
        return env::var(var).with_context(|| format!("missing env var {var} for {value}"));
    }
    Ok(value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(body: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(f, "{body}").unwrap();
        f
    }

    const MINIMAL: &str = r#"
[account]
private_key = "0x01"

[[chains]]
id = 0
rpc_url = "http://target.example"
chain_id = 1

[[chains]]
id = 1
rpc_url = "http://verifying.example"
chain_id = 11155111
relay_address = "0x00000000000000000000000000000000000000aa"
"#;

    #[test]
    fn resolve_env_ref_reads_env_var() {
        env::set_var("RELAY_TEST_ENV_REF", "http://example.com");
        let resolved = resolve_env_ref("env:RELAY_TEST_ENV_REF").unwrap();
        assert_eq!(resolved, "http://example.com");
        assert!(resolve_env_ref("env: ").is_err());
        assert_eq!(resolve_env_ref("plain").unwrap(), "plain");
    }

    #[test]
    fn relay_settings_default_when_omitted() {
        let f = write_config(MINIMAL);
        let cfg = AppConfig::from_toml(f.path()).unwrap();
        assert_eq!(cfg.relay.receipt_timeout_secs, 120);
        assert_eq!(cfg.relay.log_page_size, 10_000);
        assert_eq!(
            cfg.client_config().orchestrator.receipt_timeout,
            Duration::from_secs(120)
        );
        assert!(cfg.pow.is_none());
        assert_eq!(cfg.chain(1).unwrap().relay_address().unwrap(), Address::with_last_byte(0xaa));
        assert!(cfg.chain(0).unwrap().relay_address().is_err());
        assert!(cfg.chain(7).is_err());
    }

    #[test]
    fn rejects_zero_page_size() {
        let f = write_config(&format!("{MINIMAL}\n[relay]\nlog_page_size = 0\n"));
        let err = AppConfig::from_toml(f.path()).unwrap_err();
        assert!(err.to_string().contains("log_page_size"));
    }

    #[test]
    fn rejects_duplicate_chain_ids() {
        let body = format!(
            "{MINIMAL}\n[[chains]]\nid = 1\nrpc_url = \"http://dup.example\"\nchain_id = 5\n"
        );
        let f = write_config(&body);
        let err = AppConfig::from_toml(f.path()).unwrap_err();
        assert!(err.to_string().contains("duplicate chain id 1"));
    }

    #[test]
    fn rejects_bad_addresses() {
        let body = MINIMAL.replace("0x00000000000000000000000000000000000000aa", "0xnothex");
        let f = write_config(&body);
        assert!(AppConfig::from_toml(f.path()).is_err());
    }
}
