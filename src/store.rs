use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::debug;
use zeroize::Zeroize;

use crate::resolver::ProposalSource;
use crate::types::{Proposal, WakeRequest};

/// The wake-queue operations the daemon consumes. Split from the concrete
/// client so the poll loop can run against a stub in tests.
#[async_trait]
pub trait WakeStore: Send + Sync {
    /// Best-effort liveness ping carrying this worker's hostname.
    async fn update_heartbeat(&self, hostname: &str) -> anyhow::Result<()>;

    /// Atomically claim at most one pending wake request, optionally scoped
    /// to a single agent. The store guarantees a request is handed to
    /// exactly one caller.
    async fn claim_wake_request(
        &self,
        agent_slug: Option<&str>,
    ) -> anyhow::Result<Option<WakeRequest>>;

    /// Report the outcome of a claimed request back to the store.
    async fn complete_wake_request(
        &self,
        request_id: &str,
        proposal_id: Option<&str>,
        error_message: Option<&str>,
    ) -> anyhow::Result<()>;
}

/// HTTP client for the hosted Task Store (BaaS REST + RPC surface).
pub struct TaskStore {
    client: Client,
    base_url: String,
    service_key: String,
}

impl Drop for TaskStore {
    fn drop(&mut self) {
        self.service_key.zeroize();
    }
}

impl TaskStore {
    pub fn new(base_url: &str, service_key: &str, timeout_secs: u64) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build HTTP client: {}", e))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            service_key: service_key.to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Call a store RPC. Results come back as JSON; void RPCs return an
    /// empty body which maps to `Value::Null`.
    async fn rpc(&self, function: &str, body: Value) -> anyhow::Result<Value> {
        let url = format!("{}/rest/v1/rpc/{}", self.base_url, function);
        let response = self
            .client
            .post(&url)
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("{} failed: {} - {}", function, status, text);
        }

        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text)
            .map_err(|e| anyhow::anyhow!("{} returned malformed JSON: {}", function, e))
    }

    /// Read rows from a store table with a REST filter.
    async fn select(&self, table: &str, filter: &str) -> anyhow::Result<Value> {
        let url = format!("{}/rest/v1/{}?{}", self.base_url, table, filter);
        let response = self
            .client
            .get(&url)
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("select {} failed: {} - {}", table, status, text);
        }
        Ok(response.json().await?)
    }
}

/// RPCs and row reads return arrays; unwrap the first element if present.
fn first_row<T: DeserializeOwned>(value: Value) -> anyhow::Result<Option<T>> {
    match value {
        Value::Array(rows) => match rows.into_iter().next() {
            Some(row) if !row.is_null() => Ok(Some(serde_json::from_value(row)?)),
            _ => Ok(None),
        },
        Value::Null => Ok(None),
        other => Ok(Some(serde_json::from_value(other)?)),
    }
}

#[async_trait]
impl WakeStore for TaskStore {
    async fn update_heartbeat(&self, hostname: &str) -> anyhow::Result<()> {
        self.rpc("update_daemon_heartbeat", json!({ "p_hostname": hostname }))
            .await?;
        Ok(())
    }

    async fn claim_wake_request(
        &self,
        agent_slug: Option<&str>,
    ) -> anyhow::Result<Option<WakeRequest>> {
        let body = match agent_slug {
            Some(slug) => json!({ "p_agent_slug": slug }),
            None => json!({}),
        };
        let value = self.rpc("claim_wake_request", body).await?;
        first_row(value)
    }

    async fn complete_wake_request(
        &self,
        request_id: &str,
        proposal_id: Option<&str>,
        error_message: Option<&str>,
    ) -> anyhow::Result<()> {
        self.rpc(
            "complete_wake_request",
            json!({
                "p_request_id": request_id,
                "p_proposal_id": proposal_id,
                "p_error_message": error_message,
            }),
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl ProposalSource for TaskStore {
    async fn fetch_proposal(&self, id: &str) -> anyhow::Result<Option<Proposal>> {
        debug!(proposal = %id, "Fetching proposal");
        let rows = self
            .select("factory_proposals", &format!("id=eq.{}", id))
            .await?;
        first_row(rows)
    }
}
