//! Dataset proofs from an external ethash tool.
//!
//! The tool is invoked as `<command> <args..> <block number> <nonce> <seal hash>`
//! and must print a JSON object with `dataset_lookup` and `witness` arrays of
//! 0x-prefixed hex integers.

use async_trait::async_trait;
use relay_client::DatasetProvider;
use relay_core::{DatasetProof, DatasetQuery, PowError};
use tokio::process::Command;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct CommandDatasetProvider {
    command: String,
    args: Vec<String>,
}

impl CommandDatasetProvider {
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
        }
    }
}

#[async_trait]
impl DatasetProvider for CommandDatasetProvider {
    async fn dataset_proof(&self, query: &DatasetQuery) -> Result<DatasetProof, PowError> {
        let provider_err = |reason: String| PowError::Provider {
            block_number: query.block_number,
            reason,
        };

        debug!(command = %self.command, block = query.block_number, "running dataset tool");
        let output = Command::new(&self.command)
            .args(&self.args)
            .arg(query.block_number.to_string())
            .arg(format!("0x{:016x}", query.nonce))
            .arg(query.seal_hash.to_string())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| provider_err(format!("failed to run {}: {e}", self.command)))?;

        if !output.status.success() {
            return Err(provider_err(format!(
                "{} exited with {}: {}",
                self.command,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        serde_json::from_slice(&output.stdout).map_err(|e| PowError::MalformedOutput(e.to_string()))
    }
}
