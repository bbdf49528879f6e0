//! HTTP client for a remote assignment service.
//!
//! Requests go out with blocking `ureq` calls moved onto tokio's blocking
//! pool, so the async session never stalls a runtime worker.

use crate::error::{Result, SessionError};
use crate::service::AssignmentService;
use crate::wire::{
    decode_state, AddNodeEnvelope, AlgorithmComparison, ComparisonEnvelope, Operation, WireState,
};
use async_trait::async_trait;
use ring_layout::{Algorithm, NodeId};
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

/// Where the service listens unless told otherwise.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RemoveNodeRequest<'a> {
    node_id: &'a str,
}

#[derive(Serialize)]
struct RegenerateKeysRequest {
    count: usize,
}

#[derive(Serialize)]
struct SetAlgorithmRequest<'a> {
    algorithm: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SetCapacityConfigRequest {
    load_factor: f64,
    expected_keys: u64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CompareOperationRequest<'a> {
    operation: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    node_id: Option<&'a str>,
}

/// [`AssignmentService`] over JSON/HTTP.
#[derive(Clone, Debug)]
pub struct HttpService {
    agent: ureq::Agent,
    base_url: String,
}

impl Default for HttpService {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

impl HttpService {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { agent, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get(&self, path: &str) -> Result<String> {
        let request = self.agent.get(&self.url(path));
        run_blocking(move || read_body(request.call())).await
    }

    async fn post<B: Serialize>(&self, path: &str, body: &B) -> Result<String> {
        let payload = serde_json::to_string(body)?;
        let request = self
            .agent
            .post(&self.url(path))
            .set("Content-Type", "application/json");
        run_blocking(move || read_body(request.send_string(&payload))).await
    }

    async fn post_empty(&self, path: &str, query: Option<(&str, String)>) -> Result<String> {
        let mut request = self.agent.post(&self.url(path));
        if let Some((name, value)) = query {
            request = request.query(name, &value);
        }
        run_blocking(move || read_body(request.call())).await
    }
}

async fn run_blocking<F>(call: F) -> Result<String>
where
    F: FnOnce() -> Result<String> + Send + 'static,
{
    tokio::task::spawn_blocking(call)
        .await
        .map_err(|e| SessionError::Transport(format!("request task failed: {}", e)))?
}

fn read_body(response: std::result::Result<ureq::Response, ureq::Error>) -> Result<String> {
    match response {
        Ok(response) => response
            .into_string()
            .map_err(|e| SessionError::Transport(e.to_string())),
        Err(ureq::Error::Status(code, response)) => {
            let message = response
                .into_string()
                .unwrap_or_default()
                .trim()
                .to_string();
            Err(SessionError::Status { code, message })
        }
        Err(ureq::Error::Transport(err)) => Err(SessionError::Transport(err.to_string())),
    }
}

#[async_trait]
impl AssignmentService for HttpService {
    async fn fetch_state(&self) -> Result<WireState> {
        debug!(url = %self.base_url, "fetching state");
        decode_state(&self.get("/state").await?)
    }

    async fn add_node(&self) -> Result<WireState> {
        let body = self.post_empty("/add-node", None).await?;
        let envelope: AddNodeEnvelope = serde_json::from_str(&body)?;
        debug!(node = %envelope.node_id, "node added");
        Ok(envelope.state)
    }

    async fn remove_node(&self, node: &NodeId) -> Result<WireState> {
        let request = RemoveNodeRequest {
            node_id: node.as_str(),
        };
        decode_state(&self.post("/remove-node", &request).await?)
    }

    async fn regenerate_keys(&self, count: usize) -> Result<WireState> {
        decode_state(
            &self
                .post("/regenerate-keys", &RegenerateKeysRequest { count })
                .await?,
        )
    }

    async fn set_key_count(&self, count: usize) -> Result<WireState> {
        let body = self
            .post_empty("/set-key-count", Some(("count", count.to_string())))
            .await?;
        decode_state(&body)
    }

    async fn set_algorithm(&self, algorithm: &Algorithm) -> Result<WireState> {
        let request = SetAlgorithmRequest {
            algorithm: algorithm.as_str(),
        };
        decode_state(&self.post("/set-algorithm", &request).await?)
    }

    async fn set_capacity_config(
        &self,
        load_factor: f64,
        expected_keys: u64,
    ) -> Result<WireState> {
        let request = SetCapacityConfigRequest {
            load_factor,
            expected_keys,
        };
        decode_state(&self.post("/set-chbl-config", &request).await?)
    }

    async fn compare_operation(
        &self,
        operation: Operation,
        node: Option<&NodeId>,
    ) -> Result<Vec<AlgorithmComparison>> {
        let request = CompareOperationRequest {
            operation: operation.as_str(),
            node_id: node.map(NodeId::as_str),
        };
        let body = self.post("/compare-operation", &request).await?;
        let envelope: ComparisonEnvelope = serde_json::from_str(&body)?;
        Ok(envelope.comparison)
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trimmed() {
        let service = HttpService::new("http://localhost:9000/");
        assert_eq!(service.base_url(), "http://localhost:9000");
        assert_eq!(service.url("/state"), "http://localhost:9000/state");
    }

    #[test]
    fn test_default_base_url() {
        assert_eq!(HttpService::default().base_url(), DEFAULT_BASE_URL);
    }

    #[test]
    fn test_request_bodies() {
        let body = serde_json::to_string(&CompareOperationRequest {
            operation: "remove-node",
            node_id: Some("node-1"),
        })
        .unwrap();
        assert_eq!(body, r#"{"operation":"remove-node","nodeId":"node-1"}"#);

        let body = serde_json::to_string(&SetCapacityConfigRequest {
            load_factor: 1.25,
            expected_keys: 1000,
        })
        .unwrap();
        assert_eq!(body, r#"{"loadFactor":1.25,"expectedKeys":1000}"#);
    }

    #[tokio::test]
    async fn test_unreachable_service_is_transport_error() {
        let service = HttpService::with_timeout("http://127.0.0.1:1", Duration::from_millis(200));
        let err = service.fetch_state().await.unwrap_err();
        assert!(matches!(err, SessionError::Transport(_)), "got {:?}", err);
        assert!(err.is_retryable());
    }
}
