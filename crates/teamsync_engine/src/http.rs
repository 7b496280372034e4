//! HTTP remote implementation.
//!
//! This module provides a JSON-over-HTTP [`RemoteApi`]. The actual HTTP
//! client is abstracted via a trait so the host can plug in whatever it
//! already uses (reqwest, a browser fetch bridge, ...).

use crate::error::{SyncError, SyncResult};
use crate::remote::{RemoteApi, TaskPage};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use teamsync_model::{EntityFilter, ExternalId, Member, PendingOperation, TimeEntry};

/// HTTP client abstraction.
///
/// Implementations return the response body for 2xx responses and an error
/// message for everything else (including connection failures).
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Sends a GET request and returns the response body.
    async fn get(&self, url: &str) -> Result<Vec<u8>, String>;

    /// Sends a POST request with a JSON body and returns the response body.
    async fn post(&self, url: &str, body: Vec<u8>) -> Result<Vec<u8>, String>;
}

/// HTTP-based remote.
pub struct HttpRemote<C: HttpClient> {
    /// Base URL of the service (e.g., "https://api.example.com/v1").
    base_url: String,
    /// HTTP client implementation.
    client: C,
    /// Last error message.
    last_error: RwLock<Option<String>>,
}

impl<C: HttpClient> HttpRemote<C> {
    /// Creates a new HTTP remote.
    pub fn new(base_url: impl Into<String>, client: C) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            last_error: RwLock::new(None),
        }
    }

    /// Returns the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the last transport error message.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    fn url(&self, path_and_query: &str) -> String {
        format!("{}{}", self.base_url, path_and_query)
    }

    fn record<T>(&self, result: Result<T, String>) -> SyncResult<T> {
        match result {
            Ok(value) => {
                *self.last_error.write() = None;
                Ok(value)
            }
            Err(e) => {
                *self.last_error.write() = Some(e.clone());
                Err(SyncError::transport_retryable(e))
            }
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, path_and_query: &str) -> SyncResult<T> {
        let url = self.url(path_and_query);
        let body = self.record(self.client.get(&url).await)?;
        serde_json::from_slice(&body)
            .map_err(|e| SyncError::Protocol(format!("failed to decode {path_and_query}: {e}")))
    }
}

#[async_trait]
impl<C: HttpClient> RemoteApi for HttpRemote<C> {
    async fn list_entities(&self, filter: &EntityFilter) -> SyncResult<Vec<Member>> {
        self.get_json(&format!("/members?ids={}", join_ids(filter.iter())))
            .await
    }

    async fn list_time_entries(
        &self,
        start_ms: u64,
        end_ms: u64,
        member_ids: &[ExternalId],
    ) -> SyncResult<Vec<TimeEntry>> {
        self.get_json(&format!(
            "/time-entries?start={start_ms}&end={end_ms}&members={}",
            join_ids(member_ids.iter())
        ))
        .await
    }

    async fn list_tasks_page(&self, filter: &EntityFilter, page: u32) -> SyncResult<TaskPage> {
        self.get_json(&format!(
            "/tasks?members={}&page={page}",
            join_ids(filter.iter())
        ))
        .await
    }

    async fn submit_operation(&self, operation: &PendingOperation) -> SyncResult<()> {
        let body = serde_json::to_vec(operation)
            .map_err(|e| SyncError::Protocol(format!("failed to encode operation: {e}")))?;
        let url = self.url("/operations");
        self.record(self.client.post(&url, body).await)?;
        Ok(())
    }
}

fn join_ids<'a>(ids: impl Iterator<Item = &'a ExternalId>) -> String {
    ids.map(|id| encode_component(id.as_str()))
        .collect::<Vec<_>>()
        .join(",")
}

/// Percent-encodes everything outside the RFC 3986 unreserved set.
fn encode_component(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use teamsync_model::{OperationId, OperationPayload};

    struct TestClient {
        response: RwLock<Result<Vec<u8>, String>>,
        requests: RwLock<Vec<String>>,
    }

    impl TestClient {
        fn new() -> Self {
            Self {
                response: RwLock::new(Err("No response set".into())),
                requests: RwLock::new(Vec::new()),
            }
        }

        fn set_response(&self, response: Result<Vec<u8>, String>) {
            *self.response.write() = response;
        }
    }

    #[async_trait]
    impl HttpClient for TestClient {
        async fn get(&self, url: &str) -> Result<Vec<u8>, String> {
            self.requests.write().push(format!("GET {url}"));
            self.response.read().clone()
        }

        async fn post(&self, url: &str, _body: Vec<u8>) -> Result<Vec<u8>, String> {
            self.requests.write().push(format!("POST {url}"));
            self.response.read().clone()
        }
    }

    fn filter(ids: &[&str]) -> EntityFilter {
        ids.iter().copied().collect()
    }

    #[test]
    fn remote_creation() {
        let remote = HttpRemote::new("https://api.example.com/", TestClient::new());
        assert_eq!(remote.base_url(), "https://api.example.com");
        assert!(remote.last_error().is_none());
    }

    #[tokio::test]
    async fn decodes_task_page() {
        let client = TestClient::new();
        client.set_response(Ok(br#"{"tasks":[{"id":"t1","name":"Ship"}],"has_more":true}"#.to_vec()));
        let remote = HttpRemote::new("https://api.example.com", client);

        let page = remote.list_tasks_page(&filter(&["m 1", "m2"]), 3).await.unwrap();
        assert!(page.has_more);
        assert_eq!(page.tasks[0].name, "Ship");
        assert_eq!(
            remote.client.requests.read()[0],
            "GET https://api.example.com/tasks?members=m%201,m2&page=3"
        );
    }

    #[tokio::test]
    async fn client_failure_is_retryable_transport_error() {
        let client = TestClient::new();
        client.set_response(Err("connection refused".into()));
        let remote = HttpRemote::new("https://api.example.com", client);

        let err = remote.list_entities(&filter(&["m1"])).await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(remote.last_error().as_deref(), Some("connection refused"));
    }

    #[tokio::test]
    async fn undecodable_body_is_protocol_error() {
        let client = TestClient::new();
        client.set_response(Ok(b"<html>".to_vec()));
        let remote = HttpRemote::new("https://api.example.com", client);

        let err = remote.list_time_entries(0, 10, &[]).await.unwrap_err();
        assert!(matches!(err, SyncError::Protocol(_)));
    }

    #[tokio::test]
    async fn submit_posts_operation() {
        let client = TestClient::new();
        client.set_response(Ok(Vec::new()));
        let remote = HttpRemote::new("https://api.example.com", client);

        let op = PendingOperation {
            operation_id: OperationId(1),
            payload: OperationPayload::SetTaskDone {
                task_id: "t1".into(),
                done: true,
            },
            created_at_ms: 0,
        };
        remote.submit_operation(&op).await.unwrap();
        assert_eq!(
            remote.client.requests.read()[0],
            "POST https://api.example.com/operations"
        );
    }
}
