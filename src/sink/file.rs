use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;

use super::{DataSink, render_split};
use crate::error::{ClusterError, Result};
use crate::job::{KeyValue, Split};

struct WriteJob {
    results: Vec<Vec<KeyValue>>,
    splits: Vec<Split>,
}

/// Serves an input file line by line and appends results to
/// `<output_dir>/<split_id>.out`.
///
/// Writes are queued and applied in arrival order by a background task, so
/// `write_result` returns as soon as the job is enqueued.
pub struct FileSink {
    addr: String,
    lines: Vec<String>,
    output_dir: PathBuf,
    queue: mpsc::UnboundedSender<WriteJob>,
}

impl FileSink {
    pub async fn open(
        addr: impl Into<String>,
        input: impl AsRef<Path>,
        output_dir: impl Into<PathBuf>,
    ) -> Result<Arc<Self>> {
        let content = tokio::fs::read_to_string(input.as_ref()).await?;
        let lines: Vec<String> = content.lines().map(str::to_string).collect();
        Ok(Self::from_lines(addr, lines, output_dir))
    }

    /// Must be called inside a tokio runtime: it spawns the writer task.
    pub fn from_lines(
        addr: impl Into<String>,
        lines: Vec<String>,
        output_dir: impl Into<PathBuf>,
    ) -> Arc<Self> {
        let output_dir = output_dir.into();
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(write_loop(output_dir.clone(), rx));

        tracing::info!(
            "File sink ready: {} input lines, output in {}",
            lines.len(),
            output_dir.display()
        );

        Arc::new(Self {
            addr: addr.into(),
            lines,
            output_dir,
            queue: tx,
        })
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn output_path(&self, split_id: u32) -> PathBuf {
        self.output_dir.join(format!("{}.out", split_id))
    }
}

async fn write_loop(output_dir: PathBuf, mut rx: mpsc::UnboundedReceiver<WriteJob>) {
    while let Some(job) = rx.recv().await {
        for (split, result) in job.splits.iter().zip(job.results.iter()) {
            if let Err(e) = append_split(&output_dir, split, result).await {
                tracing::error!(split_id = split.id, "Failed to write result: {}", e);
            }
        }
    }
    tracing::debug!("Result writer stopped");
}

async fn append_split(output_dir: &Path, split: &Split, result: &[KeyValue]) -> std::io::Result<()> {
    tokio::fs::create_dir_all(output_dir).await?;
    let path = output_dir.join(format!("{}.out", split.id));
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .await?;
    file.write_all(render_split(split, result).as_bytes()).await?;
    file.flush().await?;
    tracing::debug!(split_id = split.id, "Appended {} pairs to {}", result.len(), path.display());
    Ok(())
}

#[async_trait]
impl DataSink for FileSink {
    fn addr(&self) -> &str {
        &self.addr
    }

    async fn fetch_lines(&self, split: Split) -> Result<Vec<String>> {
        Ok(split
            .lines()
            .map_while(|i| self.lines.get(i as usize).cloned())
            .collect())
    }

    async fn write_result(&self, results: Vec<Vec<KeyValue>>, splits: Vec<Split>) -> Result<()> {
        self.queue
            .send(WriteJob { results, splits })
            .map_err(|_| ClusterError::State("result writer has stopped".to_string()))
    }
}
