//! HTTP client for the worker side of the dispatch protocol.
//!
//! Wraps the worker endpoints (heartbeat, poll, start, progress, complete,
//! fail) using [`reqwest`]. Every report carries `?client_id=` so the
//! server can reject reports for operations assigned to another worker.

use savesync_core::operation::{OperationKind, Progress};
use savesync_core::types::{BatchId, OperationId};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;

use crate::error::{WorkerError, WorkerResult};

/// A pending operation as returned by `GET /worker/poll`.
#[derive(Debug, Clone, Deserialize)]
pub struct PendingOperation {
    pub operation_id: OperationId,
    pub kind: OperationKind,
    #[serde(default)]
    pub payload: serde_json::Value,
    pub batch_id: Option<BatchId>,
}

/// This worker as the server sees it.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerStatus {
    pub client_id: String,
    pub claimed: bool,
    pub linked_user: Option<i64>,
    pub online: bool,
}

#[derive(Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Deserialize)]
struct WorkerBody {
    worker: WorkerStatus,
}

#[derive(Deserialize)]
struct PollBody {
    operations: Vec<PendingOperation>,
}

#[derive(Deserialize)]
struct TransitionBody {
    applied: bool,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
    code: String,
}

/// HTTP client bound to one server and one client id. Cheap to clone.
#[derive(Debug, Clone)]
pub struct DispatchClient {
    client: reqwest::Client,
    base_url: String,
    client_id: String,
}

impl DispatchClient {
    /// * `base_url` - server root, e.g. `http://host:3000` (no `/api/v1`).
    pub fn new(base_url: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url, client_id)
    }

    pub fn with_client(
        client: reqwest::Client,
        base_url: impl Into<String>,
        client_id: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client_id: client_id.into(),
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub async fn heartbeat(&self) -> WorkerResult<WorkerStatus> {
        let response = self
            .client
            .post(self.url("/worker/heartbeat"))
            .json(&json!({ "client_id": self.client_id }))
            .send()
            .await?;
        let body: WorkerBody = parse_data(response).await?;
        Ok(body.worker)
    }

    /// Pending operations for this worker, oldest first.
    pub async fn poll(&self) -> WorkerResult<Vec<PendingOperation>> {
        let response = self
            .client
            .get(self.url("/worker/poll"))
            .query(&[("client_id", self.client_id.as_str())])
            .send()
            .await?;
        let body: PollBody = parse_data(response).await?;
        Ok(body.operations)
    }

    /// Returns `false` when the server ignored the start (already started).
    pub async fn start(&self, id: OperationId) -> WorkerResult<bool> {
        self.transition(id, "start", None).await
    }

    pub async fn progress(&self, id: OperationId, progress: &Progress) -> WorkerResult<()> {
        self.transition(id, "progress", Some(json!(progress))).await?;
        Ok(())
    }

    pub async fn complete(&self, id: OperationId) -> WorkerResult<bool> {
        self.transition(id, "complete", None).await
    }

    pub async fn fail(&self, id: OperationId, error: &str) -> WorkerResult<bool> {
        self.transition(id, "fail", Some(json!({ "error": error })))
            .await
    }

    async fn transition(
        &self,
        id: OperationId,
        action: &str,
        body: Option<serde_json::Value>,
    ) -> WorkerResult<bool> {
        let response = self
            .client
            .post(self.url(&format!("/operations/{id}/{action}")))
            .query(&[("client_id", self.client_id.as_str())])
            .json(&body.unwrap_or_else(|| json!({})))
            .send()
            .await?;
        let body: TransitionBody = parse_data(response).await?;
        Ok(body.applied)
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v1{path}", self.base_url)
    }
}

/// Decode `{ "data": T }`, or turn a non-2xx response into
/// [`WorkerError::Api`].
async fn parse_data<T: DeserializeOwned>(response: reqwest::Response) -> WorkerResult<T> {
    let status = response.status();
    if !status.is_success() {
        let text = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable body>".to_string());
        let (code, message) = match serde_json::from_str::<ErrorBody>(&text) {
            Ok(body) => (body.code, body.error),
            Err(_) => ("UNKNOWN".to_string(), text),
        };
        return Err(WorkerError::Api {
            status: status.as_u16(),
            code,
            message,
        });
    }
    Ok(response.json::<Envelope<T>>().await?.data)
}
