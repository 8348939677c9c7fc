use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::DataSink;
use crate::error::Result;
use crate::job::{KeyValue, Split};

/// One recorded `write_result` call.
#[derive(Debug, Clone)]
pub struct WriteRecord {
    pub splits: Vec<Split>,
    pub results: Vec<Vec<KeyValue>>,
}

/// In-memory sink used by single-process clusters and tests.
pub struct MemorySink {
    addr: String,
    lines: Vec<String>,
    writes: Mutex<Vec<WriteRecord>>,
}

impl MemorySink {
    pub fn new(addr: impl Into<String>, lines: Vec<String>) -> Arc<Self> {
        Arc::new(Self {
            addr: addr.into(),
            lines,
            writes: Mutex::new(Vec::new()),
        })
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    pub async fn writes(&self) -> Vec<WriteRecord> {
        self.writes.lock().await.clone()
    }

    pub async fn write_count(&self) -> usize {
        self.writes.lock().await.len()
    }

    /// Split ids in the order they were written, duplicates included.
    pub async fn written_splits(&self) -> Vec<u32> {
        self.writes
            .lock()
            .await
            .iter()
            .flat_map(|w| w.splits.iter().map(|s| s.id))
            .collect()
    }
}

#[async_trait]
impl DataSink for MemorySink {
    fn addr(&self) -> &str {
        &self.addr
    }

    async fn fetch_lines(&self, split: Split) -> Result<Vec<String>> {
        let lines: Vec<String> = split
            .lines()
            .map_while(|i| self.lines.get(i as usize).cloned())
            .collect();
        tracing::trace!(split_id = split.id, "Served {} lines", lines.len());
        Ok(lines)
    }

    async fn write_result(&self, results: Vec<Vec<KeyValue>>, splits: Vec<Split>) -> Result<()> {
        self.writes.lock().await.push(WriteRecord { splits, results });
        Ok(())
    }
}
