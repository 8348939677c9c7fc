use async_trait::async_trait;
use std::time::Duration;

use super::DataSink;
use crate::error::{ClusterError, Result};
use crate::job::{KeyValue, Split};
use crate::rpc::http::send_with_retry;
use crate::rpc::protocol::{
    ENDPOINT_SINK_FETCH, ENDPOINT_SINK_WRITE, FetchLinesRequest, FetchLinesResponse,
    WriteResultRequest,
};

/// Client for a sink served by [`super::handlers::router`].
pub struct HttpSinkClient {
    addr: String,
    http_client: reqwest::Client,
    timeout: Duration,
}

impl HttpSinkClient {
    pub fn new(addr: impl Into<String>, http_client: reqwest::Client, timeout: Duration) -> Self {
        Self {
            addr: addr.into(),
            http_client,
            timeout,
        }
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.addr.trim_end_matches('/'), endpoint)
    }
}

#[async_trait]
impl DataSink for HttpSinkClient {
    fn addr(&self) -> &str {
        &self.addr
    }

    async fn fetch_lines(&self, split: Split) -> Result<Vec<String>> {
        let url = self.url(ENDPOINT_SINK_FETCH);
        let payload = FetchLinesRequest { split };

        let resp = send_with_retry(
            || {
                self.http_client
                    .post(url.as_str())
                    .json(&payload)
                    .timeout(self.timeout)
            },
            3,
        )
        .await
        .map_err(|e| ClusterError::communication(&self.addr, e))?;

        if !resp.status().is_success() {
            return Err(ClusterError::communication(
                &self.addr,
                format!("fetch of split {} returned {}", split.id, resp.status()),
            ));
        }

        let body: FetchLinesResponse = resp
            .json()
            .await
            .map_err(|e| ClusterError::communication(&self.addr, e))?;
        Ok(body.lines)
    }

    async fn write_result(&self, results: Vec<Vec<KeyValue>>, splits: Vec<Split>) -> Result<()> {
        let url = self.url(ENDPOINT_SINK_WRITE);
        let payload = WriteResultRequest { results, splits };

        let resp = send_with_retry(
            || {
                self.http_client
                    .post(url.as_str())
                    .json(&payload)
                    .timeout(self.timeout)
            },
            3,
        )
        .await
        .map_err(|e| ClusterError::communication(&self.addr, e))?;

        if !resp.status().is_success() {
            return Err(ClusterError::communication(
                &self.addr,
                format!("write returned {}", resp.status()),
            ));
        }
        Ok(())
    }
}
