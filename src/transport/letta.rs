//! HTTP transport for the Letta agent service.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::config::RelayConfig;
use crate::context::to_agent_messages;
use crate::error::RelayError;
use crate::types::{PollBatch, RawEnvelope, RunHandle, RunStatus, TurnRequest};
use crate::util::timeout::with_timeout;

use super::http::{agent_headers, shared_client, status_to_error};
use super::AgentTransport;

/// Talks to `POST /v1/agents/{id}/messages/async` and `/v1/runs/{id}/...`.
pub struct HttpAgentTransport {
    config: Arc<RelayConfig>,
    client: reqwest::Client,
}

impl HttpAgentTransport {
    pub fn new(config: Arc<RelayConfig>) -> Self {
        Self {
            config,
            client: shared_client().clone(),
        }
    }

    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    async fn get_text(
        &self,
        url: &str,
        query: &[(&str, String)],
        conversation_id: &str,
    ) -> Result<String, RelayError> {
        let request = self
            .client
            .get(url)
            .headers(agent_headers(self.config.credential.as_ref(), conversation_id))
            .query(query);
        with_timeout(self.config.request_timeout, async {
            let resp = request.send().await?;
            read_body(resp).await
        })
        .await
    }

    async fn run_status(&self, handle: &RunHandle) -> Result<RunStatus, RelayError> {
        let url = format!("{}/v1/runs/{}", self.config.api_base(), handle.run_id);
        let text = self.get_text(&url, &[], &handle.conversation_id).await?;
        let run: RunBody = serde_json::from_str(&text)?;
        // Statuses this relay does not know yet mean the run is still going.
        Ok(run
            .status
            .as_deref()
            .and_then(|s| s.parse().ok())
            .unwrap_or(RunStatus::Running))
    }

    async fn run_messages(
        &self,
        handle: &RunHandle,
        cursor: Option<&str>,
    ) -> Result<Vec<RawEnvelope>, RelayError> {
        let url = format!("{}/v1/runs/{}/messages", self.config.api_base(), handle.run_id);
        let mut query = vec![("limit", self.config.page_limit.to_string())];
        if let Some(cursor) = cursor {
            query.push(("after", cursor.to_string()));
        }
        let text = self.get_text(&url, &query, &handle.conversation_id).await?;
        let page: MessagesPage = serde_json::from_str(&text)?;
        Ok(page.into_envelopes())
    }
}

#[async_trait]
impl AgentTransport for HttpAgentTransport {
    async fn send_turn(&self, request: &TurnRequest) -> Result<RunHandle, RelayError> {
        let url = format!(
            "{}/v1/agents/{}/messages/async",
            self.config.api_base(),
            request.agent_id
        );
        let body = serde_json::json!({
            "messages": to_agent_messages(request),
            "assistant_message_tool_name": self.config.assistant_message_tool_name,
            "assistant_message_tool_kwarg": self.config.assistant_message_tool_kwarg,
        });

        debug!(
            agent_id = %request.agent_id,
            conversation_id = %request.conversation_id,
            has_context = request.system_context.is_some(),
            "Letta send_turn"
        );

        let post = self
            .client
            .post(&url)
            .headers(agent_headers(self.config.credential.as_ref(), &request.conversation_id))
            .json(&body);
        let text = with_timeout(self.config.request_timeout, async {
            let resp = post.send().await?;
            read_body(resp).await
        })
        .await?;

        let run: RunBody = serde_json::from_str(&text)
            .map_err(|e| RelayError::Protocol(format!("run handle is not valid JSON: {e}")))?;
        match run.id.filter(|id| !id.is_empty()) {
            Some(run_id) => Ok(RunHandle::new(run_id, request.conversation_id.clone())),
            None => Err(RelayError::Protocol("response carries no run id".into())),
        }
    }

    async fn poll(&self, handle: &RunHandle, cursor: Option<&str>) -> Result<PollBatch, RelayError> {
        // Status first: if the run had already ended, the page that follows
        // holds everything it produced.
        let status = self.run_status(handle).await?;
        let envelopes = self.run_messages(handle, cursor).await?;

        let next_cursor = envelopes
            .iter()
            .rev()
            .find_map(|e| e.id().map(str::to_string))
            .or_else(|| cursor.map(str::to_string));
        let is_final = status.is_terminal() && envelopes.len() < self.config.page_limit as usize;

        debug!(
            run_id = %handle.run_id,
            %status,
            batch = envelopes.len(),
            cursor = next_cursor.as_deref().unwrap_or(""),
            is_final,
            "Letta poll"
        );

        Ok(PollBatch {
            envelopes,
            cursor: next_cursor,
            is_final,
        })
    }
}

async fn read_body(resp: reqwest::Response) -> Result<String, RelayError> {
    let status = resp.status().as_u16();
    if !(200..300).contains(&status) {
        let body_text = resp.text().await.unwrap_or_default();
        return Err(status_to_error(status, &body_text));
    }
    Ok(resp.text().await?)
}

// Letta API response types (internal)

#[derive(Deserialize)]
struct RunBody {
    id: Option<String>,
    status: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum MessagesPage {
    List(Vec<Value>),
    Wrapped { messages: Vec<Value> },
}

impl MessagesPage {
    fn into_envelopes(self) -> Vec<RawEnvelope> {
        let (Self::List(values) | Self::Wrapped { messages: values }) = self;
        values.into_iter().map(RawEnvelope::new).collect()
    }
}
