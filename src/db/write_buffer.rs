//! Write buffer for page-view access logs
//!
//! The access logger queues rows on a channel; a background task flushes
//! them to the store in batches so page responses never wait on the store.

use tokio::sync::mpsc;
use tracing::{debug, error, info};

use super::{AccessLog, SharedStore};

/// Sender handle for queueing access-log rows
pub type WriteSender = mpsc::UnboundedSender<AccessLog>;

const BATCH_SIZE: usize = 100;
const FLUSH_INTERVAL_MS: u64 = 250;

/// Start the write buffer background task
/// Returns a sender that the access logger uses to queue rows
pub fn start_write_buffer(store: SharedStore) -> WriteSender {
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(write_buffer_task(store, rx));

    tx
}

/// Background task that collects rows and writes them in batches
async fn write_buffer_task(store: SharedStore, mut rx: mpsc::UnboundedReceiver<AccessLog>) {
    let mut buffer: Vec<AccessLog> = Vec::with_capacity(BATCH_SIZE);
    let mut flush_interval = tokio::time::interval(
        tokio::time::Duration::from_millis(FLUSH_INTERVAL_MS)
    );

    info!("Access-log buffer started (batch_size={}, flush_interval={}ms)", BATCH_SIZE, FLUSH_INTERVAL_MS);

    loop {
        tokio::select! {
            row = rx.recv() => {
                match row {
                    Some(r) => {
                        buffer.push(r);
                        if buffer.len() >= BATCH_SIZE {
                            flush_batch(&store, &mut buffer).await;
                        }
                    }
                    None => {
                        // Channel closed, flush remaining and exit
                        if !buffer.is_empty() {
                            flush_batch(&store, &mut buffer).await;
                        }
                        info!("Access-log buffer shutting down");
                        break;
                    }
                }
            }
            _ = flush_interval.tick() => {
                if !buffer.is_empty() {
                    flush_batch(&store, &mut buffer).await;
                }
            }
        }
    }
}

async fn flush_batch(store: &SharedStore, buffer: &mut Vec<AccessLog>) {
    let count = buffer.len();
    debug!("Flushing {} access logs", count);

    match store.insert_access_logs(buffer).await {
        Ok(()) => debug!("Flushed {} access logs", count),
        // Page views are best effort; a failed batch is dropped
        Err(e) => error!("Failed to flush {} access logs: {}", count, e),
    }

    buffer.clear();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{AccessLogQuery, LeadStore, SqliteStore};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn queued_rows_reach_the_store() {
        let store = Arc::new(SqliteStore::in_memory().await.unwrap());
        let tx = start_write_buffer(store.clone());

        tx.send(AccessLog::new("/")).unwrap();
        tx.send(AccessLog::new("/about.html")).unwrap();
        drop(tx);

        // Closing the channel forces a final flush
        let mut logs = Vec::new();
        for _ in 0..50 {
            logs = store.recent_access_logs(&AccessLogQuery::default()).await.unwrap();
            if logs.len() == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(logs.len(), 2);
    }
}
