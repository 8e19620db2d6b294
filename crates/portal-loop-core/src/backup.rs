use crate::error::{LoopError, Result};
use crate::instance::{Endpoint, Instance};
use crate::io::{atomic_write, ensure_dir};
use crate::probe::parse_status;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// File a freshly launched node replays at genesis.
pub const LATEST_BACKUP: &str = "backup.jsonl";

/// Persists the transactions of the active instance before it is replaced.
///
/// A failed backup must leave earlier backups intact so the next cycle can
/// retry.
#[async_trait]
pub trait BackupAgent: Send + Sync {
    async fn backup(&self, source: &Instance) -> Result<()>;
}

/// One archived transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupLine {
    pub height: u64,
    /// Base64 amino-encoded transaction, as served by `/block`.
    pub tx: String,
}

#[derive(Deserialize)]
struct BlockResponse {
    result: BlockResult,
}

#[derive(Deserialize)]
struct BlockResult {
    block: Block,
}

#[derive(Deserialize)]
struct Block {
    data: BlockData,
}

#[derive(Deserialize)]
struct BlockData {
    #[serde(default)]
    txs: Option<Vec<String>>,
}

/// Walks the chain over RPC and writes every transaction as a JSON line.
pub struct RpcBackupAgent {
    client: reqwest::Client,
    fallback: Endpoint,
    dir: PathBuf,
}

impl RpcBackupAgent {
    /// `fallback` is used when the source instance has no published RPC port.
    pub fn new(fallback: Endpoint, dir: impl Into<PathBuf>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            fallback,
            dir: dir.into(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    async fn get(&self, url: String) -> Result<Vec<u8>> {
        let resp = self.client.get(url).send().await?.error_for_status()?;
        Ok(resp.bytes().await?.to_vec())
    }

    async fn block_txs(&self, endpoint: &Endpoint, height: u64) -> Result<Vec<String>> {
        let body = self
            .get(endpoint.join(&format!("/block?height={height}")))
            .await?;
        let block: BlockResponse = serde_json::from_slice(&body)?;
        Ok(block.result.block.data.txs.unwrap_or_default())
    }
}

#[async_trait]
impl BackupAgent for RpcBackupAgent {
    async fn backup(&self, source: &Instance) -> Result<()> {
        let endpoint = source
            .rpc_endpoint()
            .unwrap_or_else(|| self.fallback.clone());
        let latest = parse_status(&self.get(endpoint.join("/status")).await?)?;
        tracing::info!(instance = source.short_id(), %endpoint, latest, "backing up transactions");

        let mut out = Vec::new();
        let mut count = 0usize;
        for height in 1..=latest {
            for tx in self.block_txs(&endpoint, height).await? {
                serde_json::to_writer(&mut out, &BackupLine { height, tx })?;
                out.push(b'\n');
                count += 1;
            }
        }

        ensure_dir(&self.dir)?;
        let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%SZ");
        let archive = self.dir.join(format!("backup-{stamp}.jsonl"));
        atomic_write(&archive, &out)?;
        atomic_write(&self.dir.join(LATEST_BACKUP), &out)?;
        tracing::info!(txs = count, file = %archive.display(), "backup written");
        Ok(())
    }
}

/// Read a backup file back into lines.
pub fn read_backup(path: &Path) -> Result<Vec<BackupLine>> {
    let data = std::fs::read_to_string(path)?;
    data.lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| serde_json::from_str(l).map_err(LoopError::from))
        .collect()
}
