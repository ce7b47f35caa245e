//! Note Synchronizer
//!
//! Follows the node's head and moves notes whose nullifiers land on chain
//! to the nullified set. Block processing runs on the PXE's serial queue,
//! so a simulation never sees a half-applied block.
//!
//! ```text
//!   ticker ──▶ node.get_block_number()
//!                  │ head > synced
//!                  ▼
//!          node.get_blocks(synced + 1, ..)
//!                  │
//!                  ▼
//!   SerialQueue ──▶ remove_nullified_notes per account ──▶ set_synced_block_number
//! ```

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use zelana_config::SyncConfig;
use zelana_privacy::Field;

use crate::database::PxeDatabase;
use crate::error::Result;
use crate::node::LedgerNode;
use crate::queue::SerialQueue;
use crate::types::L2Block;

/// Blocks fetched per sync step
const BLOCK_BATCH: u64 = 50;

/// Last block whose nullifiers have been applied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStatus {
    pub blocks: u64,
}

struct Running {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

#[derive(Clone)]
pub struct Synchronizer {
    node: Arc<dyn LedgerNode>,
    db: Arc<dyn PxeDatabase>,
    job_queue: Arc<SerialQueue>,
    poll_interval: Duration,
    running: Arc<Mutex<Option<Running>>>,
}

impl Synchronizer {
    pub fn new(
        node: Arc<dyn LedgerNode>,
        db: Arc<dyn PxeDatabase>,
        job_queue: Arc<SerialQueue>,
        config: &SyncConfig,
    ) -> Self {
        Self {
            node,
            db,
            job_queue,
            poll_interval: Duration::from_millis(config.polling_interval_ms.max(1)),
            running: Arc::new(Mutex::new(None)),
        }
    }

    /// Spawn the polling loop; a second call while running is a no-op
    pub async fn start(&self) {
        let mut running = self.running.lock().await;
        if running.is_some() {
            return;
        }

        let (shutdown, mut shutdown_rx) = oneshot::channel();
        let sync = self.clone();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(sync.poll_interval);
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    _ = ticker.tick() => {
                        if let Err(e) = sync.sync_once().await {
                            warn!(error = %e, "Note sync step failed");
                        }
                    }
                }
            }
            debug!("Synchronizer loop exited");
        });

        *running = Some(Running { shutdown, task });
        info!(interval_ms = self.poll_interval.as_millis() as u64, "Synchronizer started");
    }

    /// Stop polling and wait for the loop to exit
    pub async fn stop(&self) {
        let running = self.running.lock().await.take();
        if let Some(Running { shutdown, task }) = running {
            let _ = shutdown.send(());
            if let Err(e) = task.await {
                warn!(error = %e, "Synchronizer task failed");
            }
            info!("Synchronizer stopped");
        }
    }

    /// Apply the next batch of blocks, if the node has any.
    /// Returns the number of blocks applied.
    pub async fn sync_once(&self) -> Result<u64> {
        let synced = self.db.get_synced_block_number()?.unwrap_or(0);
        let head = self.node.get_block_number().await?;
        if head <= synced {
            return Ok(0);
        }

        let limit = (head - synced).min(BLOCK_BATCH);
        let blocks = self.node.get_blocks(synced + 1, limit).await?;
        if blocks.is_empty() {
            return Ok(0);
        }

        let db = self.db.clone();
        self.job_queue
            .put(async move { apply_blocks(db.as_ref(), &blocks) })
            .await
    }

    pub fn get_sync_status(&self) -> Result<SyncStatus> {
        let blocks = self.db.get_synced_block_number()?.unwrap_or(0);
        Ok(SyncStatus { blocks })
    }

    /// True once every block the node has produced is applied
    pub async fn is_global_state_synchronized(&self) -> Result<bool> {
        let head = self.node.get_block_number().await?;
        let synced = self.db.get_synced_block_number()?.unwrap_or(0);
        Ok(head <= synced)
    }
}

fn apply_blocks(db: &dyn PxeDatabase, blocks: &[L2Block]) -> Result<u64> {
    let accounts = db.get_complete_addresses()?;
    let mut applied = 0;

    for block in blocks {
        let nullifiers: Vec<Field> = block
            .tx_effects
            .iter()
            .flat_map(|effect| effect.nullifiers.iter().copied())
            .filter(|nullifier| !nullifier.is_zero())
            .collect();

        if !nullifiers.is_empty() {
            for account in &accounts {
                let removed =
                    db.remove_nullified_notes(&nullifiers, account.address.to_address_point())?;
                if !removed.is_empty() {
                    debug!(
                        account = %account.address,
                        block = block.number,
                        count = removed.len(),
                        "Nullified notes"
                    );
                }
            }
        }

        db.set_synced_block_number(block.number)?;
        applied += 1;
    }

    Ok(applied)
}
