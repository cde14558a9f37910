// HTTP client for the pact API of one chainweb chain
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::retry::{EndpointKind, RetryPolicy};
use crate::command::{SendRequest, SignedCommand};
use crate::error::{ReporterError, Result};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Body returned by `send` and accepted verbatim by `poll`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RequestKeys {
    pub request_keys: Vec<String>,
}

impl RequestKeys {
    pub fn first(&self) -> Result<&str> {
        self.request_keys
            .first()
            .map(String::as_str)
            .ok_or_else(|| ReporterError::Chain("node returned no request keys".to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxStatus {
    Success,
    Failure,
}

/// Outcome of a mined transaction.
#[derive(Debug, Clone)]
pub struct Receipt {
    pub request_key: String,
    pub status: TxStatus,
    /// The full `result` object (`data` on success, `error` on failure)
    pub result: Value,
}

impl Receipt {
    pub fn is_success(&self) -> bool {
        self.status == TxStatus::Success
    }

    pub fn error_message(&self) -> Option<&str> {
        self.result
            .get("error")
            .and_then(|e| e.get("message"))
            .and_then(Value::as_str)
    }

    fn from_poll(request_key: &str, entry: &Value) -> Result<Self> {
        let result = entry
            .get("result")
            .ok_or_else(|| ReporterError::Chain(format!("receipt {} has no result", request_key)))?;
        let status = match result.get("status").and_then(Value::as_str) {
            Some("success") => TxStatus::Success,
            Some("failure") => TxStatus::Failure,
            other => {
                return Err(ReporterError::Chain(format!(
                    "receipt {} has unknown status {:?}",
                    request_key, other
                )))
            }
        };
        Ok(Self {
            request_key: request_key.to_string(),
            status,
            result: result.clone(),
        })
    }
}

/// Unwrap a `local` response: `data` on success, `Chain` error on failure.
pub fn parse_local_result(response: &Value) -> Result<Value> {
    let result = response
        .get("result")
        .ok_or_else(|| ReporterError::Chain("error reading from chainweb".to_string()))?;
    match result.get("status").and_then(Value::as_str) {
        Some("success") => Ok(result.get("data").cloned().unwrap_or(Value::Null)),
        Some("failure") => {
            let message = result
                .get("error")
                .and_then(|e| e.get("message"))
                .and_then(Value::as_str)
                .unwrap_or("unknown error");
            Err(ReporterError::Chain(message.to_string()))
        }
        other => Err(ReporterError::Chain(format!(
            "local call returned unknown status {:?}",
            other
        ))),
    }
}

#[derive(Debug, Clone)]
pub struct ChainwebClient {
    base_url: String,
    client: Client,
    policy: RetryPolicy,
}

impl ChainwebClient {
    /// `base_url` is the chain's pact API root, e.g.
    /// `https://api.chainweb.com/chainweb/0.0/mainnet01/chain/1/pact/api/v1/`.
    pub fn new(base_url: impl Into<String>, policy: RetryPolicy) -> Result<Self> {
        let mut base_url = base_url.into();
        if base_url.is_empty() {
            return Err(ReporterError::Config("endpoint url is empty".to_string()));
        }
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ReporterError::Network {
                url: base_url.clone(),
                source: e,
            })?;
        Ok(Self {
            base_url,
            client,
            policy,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn endpoint(&self, kind: EndpointKind) -> String {
        format!("{}{}", self.base_url, kind)
    }

    /// POST `payload` as JSON, retrying transport failures and the
    /// endpoint's retryable statuses on the policy's schedule.
    pub async fn request<T: Serialize + ?Sized>(
        &self,
        payload: &T,
        kind: EndpointKind,
    ) -> Result<Value> {
        let url = self.endpoint(kind);
        let mut attempt: u32 = 0;
        loop {
            let outcome = self
                .client
                .post(&url)
                .json(payload)
                .send()
                .await
                .and_then(|resp| resp.error_for_status());

            let err = match outcome {
                Ok(resp) => {
                    debug!(endpoint = %kind, status = %resp.status(), "request ok");
                    return resp
                        .json::<Value>()
                        .await
                        .map_err(|e| ReporterError::Network { url, source: e });
                }
                Err(e) => e,
            };

            let retryable = match err.status() {
                Some(status) => kind.retry_statuses().contains(&status.as_u16()),
                // a send that may have reached the node must not be repeated
                None if kind == EndpointKind::Send => err.is_connect(),
                None => err.is_connect() || err.is_timeout() || err.is_request(),
            };
            attempt += 1;
            if !retryable || attempt > self.policy.max_retries {
                error!(endpoint = %kind, attempts = attempt, error = %err, "request failed");
                return Err(ReporterError::Network { url, source: err });
            }
            let wait = self.policy.backoff(attempt);
            warn!(
                endpoint = %kind,
                attempt,
                wait_ms = wait.as_millis() as u64,
                error = %err,
                "request failed, retrying"
            );
            tokio::time::sleep(wait).await;
        }
    }

    /// Dry-run a signed command on the node.
    pub async fn local(&self, cmd: &SignedCommand) -> Result<Value> {
        let response = self.request(cmd, EndpointKind::Local).await?;
        parse_local_result(&response)
    }

    pub async fn send(&self, request: &SendRequest) -> Result<RequestKeys> {
        let response = self.request(request, EndpointKind::Send).await?;
        let keys: RequestKeys = serde_json::from_value(response)?;
        let request_key = keys.first()?;
        info!(%request_key, "transaction submitted");
        Ok(keys)
    }

    /// One poll round. `None` while the transaction is still pending.
    pub async fn poll(&self, keys: &RequestKeys) -> Result<Option<Receipt>> {
        let request_key = keys.first()?;
        let response = self.request(keys, EndpointKind::Poll).await?;
        match response.get(request_key) {
            Some(entry) => Receipt::from_poll(request_key, entry).map(Some),
            None => Ok(None),
        }
    }

    /// Poll until a receipt appears, at most `retry_count` extra rounds.
    pub async fn fetch_receipt_with_retry(
        &self,
        keys: &RequestKeys,
        retry_count: u32,
    ) -> Result<Receipt> {
        let request_key = keys.first()?.to_string();
        for round in 0..=retry_count {
            if let Some(receipt) = self.poll(keys).await? {
                return Ok(receipt);
            }
            if round < retry_count {
                let wait = self.policy.backoff(round + 1);
                debug!(%request_key, round, wait_ms = wait.as_millis() as u64, "receipt pending");
                tokio::time::sleep(wait).await;
            }
        }
        warn!(%request_key, rounds = retry_count + 1, "no receipt after polling");
        Err(ReporterError::ReceiptNotFound(request_key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::mock::{fast_policy, spawn_node, MockNode};
    use serde_json::json;
    use std::sync::Arc;

    async fn client_for(node: &Arc<MockNode>) -> ChainwebClient {
        let url = spawn_node(node.clone()).await;
        ChainwebClient::new(url, fast_policy()).unwrap()
    }

    fn keys(k: &str) -> RequestKeys {
        RequestKeys {
            request_keys: vec![k.to_string()],
        }
    }

    #[test]
    fn test_endpoint_urls() {
        let client =
            ChainwebClient::new("http://node.test/pact/api/v1", RetryPolicy::default()).unwrap();
        assert_eq!(
            client.endpoint(EndpointKind::Local),
            "http://node.test/pact/api/v1/local"
        );
        assert_eq!(
            client.endpoint(EndpointKind::Poll),
            "http://node.test/pact/api/v1/poll"
        );
    }

    #[test]
    fn test_parse_local_result() {
        let ok = json!({"result": {"status": "success", "data": 7}});
        assert_eq!(parse_local_result(&ok).unwrap(), json!(7));

        let failed = json!({"result": {"status": "failure", "error": {"message": "row not found"}}});
        match parse_local_result(&failed) {
            Err(ReporterError::Chain(msg)) => assert_eq!(msg, "row not found"),
            other => panic!("unexpected {:?}", other),
        }
        assert!(parse_local_result(&json!({"oops": 1})).is_err());
    }

    #[tokio::test]
    async fn test_retries_then_succeeds() {
        let node = Arc::new(MockNode::default());
        node.script("local", 503, json!({}));
        node.script("local", 400, json!({}));
        node.script("local", 200, json!({"result": {"status": "success", "data": "ok"}}));
        let client = client_for(&node).await;

        let response = client
            .request(&json!({"cmd": "x"}), EndpointKind::Local)
            .await
            .unwrap();
        assert_eq!(response["result"]["data"], "ok");
        assert_eq!(node.hits("local"), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let node = Arc::new(MockNode::default());
        node.always("send", 502, json!({}));
        let client = client_for(&node).await;

        let err = client
            .request(&json!({"cmds": []}), EndpointKind::Send)
            .await
            .unwrap_err();
        assert!(matches!(err, ReporterError::Network { .. }));
        assert_eq!(node.hits("send"), 1 + fast_policy().max_retries as usize);
    }

    #[tokio::test]
    async fn test_non_retryable_status_fails_fast() {
        let node = Arc::new(MockNode::default());
        node.always("send", 400, json!({}));
        let client = client_for(&node).await;

        assert!(client
            .request(&json!({"cmds": []}), EndpointKind::Send)
            .await
            .is_err());
        assert_eq!(node.hits("send"), 1);
    }

    #[tokio::test]
    async fn test_unreachable_node() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let client = ChainwebClient::new(format!("http://{}/", addr), fast_policy()).unwrap();

        let err = client
            .request(&json!({}), EndpointKind::Poll)
            .await
            .unwrap_err();
        assert!(matches!(err, ReporterError::Network { .. }));
    }

    // Reads one request body per connection, then hangs up without answering.
    async fn spawn_hangup_node() -> (String, Arc<std::sync::atomic::AtomicUsize>) {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use tokio::io::AsyncReadExt;

        let delivered = Arc::new(AtomicUsize::new(0));
        let counter = delivered.clone();
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let mut received = Vec::new();
                let mut buf = [0u8; 1024];
                loop {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => received.extend_from_slice(&buf[..n]),
                    }
                    let text = String::from_utf8_lossy(&received);
                    if let Some(split) = text.find("\r\n\r\n") {
                        if text[split..].contains('}') {
                            counter.fetch_add(1, Ordering::SeqCst);
                            break;
                        }
                    }
                }
                drop(socket);
            }
        });
        (format!("http://{}/", addr), delivered)
    }

    #[tokio::test]
    async fn test_send_not_repeated_after_delivery() {
        use std::sync::atomic::Ordering;
        let (url, delivered) = spawn_hangup_node().await;
        let client = ChainwebClient::new(url, fast_policy()).unwrap();

        let err = client.send(&SendRequest { cmds: vec![] }).await.unwrap_err();
        assert!(matches!(err, ReporterError::Network { .. }));
        assert_eq!(delivered.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_poll_retries_dropped_connection() {
        use std::sync::atomic::Ordering;
        let (url, delivered) = spawn_hangup_node().await;
        let client = ChainwebClient::new(url, fast_policy()).unwrap();

        assert!(client.poll(&keys("rk")).await.is_err());
        assert_eq!(
            delivered.load(Ordering::SeqCst),
            1 + fast_policy().max_retries as usize
        );
    }

    #[tokio::test]
    async fn test_receipt_after_pending_rounds() {
        let node = Arc::new(MockNode::default());
        node.script("poll", 200, json!({}));
        node.script("poll", 200, json!({}));
        node.script(
            "poll",
            200,
            json!({"rk1": {"reqKey": "rk1", "result": {"status": "success", "data": "Write succeeded"}}}),
        );
        let client = client_for(&node).await;

        let receipt = client.fetch_receipt_with_retry(&keys("rk1"), 3).await.unwrap();
        assert!(receipt.is_success());
        assert_eq!(receipt.request_key, "rk1");
        assert_eq!(receipt.result["data"], "Write succeeded");
        assert_eq!(node.hits("poll"), 3);
        assert_eq!(node.last_body("poll").unwrap(), json!({"requestKeys": ["rk1"]}));
    }

    #[tokio::test]
    async fn test_receipt_not_found() {
        let node = Arc::new(MockNode::default());
        node.always("poll", 200, json!({}));
        let client = client_for(&node).await;

        let err = client
            .fetch_receipt_with_retry(&keys("rk2"), 2)
            .await
            .unwrap_err();
        assert!(matches!(err, ReporterError::ReceiptNotFound(ref k) if k == "rk2"));
        assert_eq!(node.hits("poll"), 3);
    }

    #[tokio::test]
    async fn test_failed_receipt() {
        let node = Arc::new(MockNode::default());
        node.always(
            "poll",
            200,
            json!({"rk3": {"result": {"status": "failure", "error": {"message": "Keyset failure"}}}}),
        );
        let client = client_for(&node).await;

        let receipt = client.fetch_receipt_with_retry(&keys("rk3"), 0).await.unwrap();
        assert!(!receipt.is_success());
        assert_eq!(receipt.error_message(), Some("Keyset failure"));
    }

    #[tokio::test]
    async fn test_send_returns_request_keys() {
        let node = Arc::new(MockNode::default());
        node.always("send", 200, json!({"requestKeys": ["abc"]}));
        let client = client_for(&node).await;

        let keys = client.send(&SendRequest { cmds: vec![] }).await.unwrap();
        assert_eq!(keys.first().unwrap(), "abc");
        assert_eq!(node.last_body("send").unwrap(), json!({"cmds": []}));
    }
}
