//! Client-Side Data Sink
//!
//! The collaborator that owns the input and takes the output. Workers only
//! need two calls from it: fetch the lines of a split, and append a finished
//! split's results.
//!
//! - **`memory`**: in-process sink over a `Vec<String>`, recording every write.
//! - **`file`**: serves an input file and appends results to `<id>.out` files
//!   from a background writer task.
//! - **`handlers`** / **`http`**: the HTTP face of a sink and its client.

pub mod file;
pub mod handlers;
pub mod http;
pub mod memory;

use async_trait::async_trait;

use crate::error::Result;
use crate::job::{KeyValue, Split};

pub use file::FileSink;
pub use http::HttpSinkClient;
pub use memory::MemorySink;

#[async_trait]
pub trait DataSink: Send + Sync {
    fn addr(&self) -> &str;

    /// Lines `split.from..=split.to`, truncated at the end of the input.
    async fn fetch_lines(&self, split: Split) -> Result<Vec<String>>;

    /// Best-effort append; `results[i]` belongs to `splits[i]`.
    async fn write_result(&self, results: Vec<Vec<KeyValue>>, splits: Vec<Split>) -> Result<()>;
}

/// Renders one split's block the way result files are laid out.
pub fn render_split(split: &Split, result: &[KeyValue]) -> String {
    let mut block = format!("Split[{}]:\n", split.id);
    for (key, value) in result {
        block.push_str(key);
        block.push_str(", ");
        block.push_str(value);
        block.push('\n');
    }
    block
}
