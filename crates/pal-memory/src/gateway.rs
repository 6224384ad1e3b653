//! [`ToolGateway`] – client for the agent gateway's tool endpoint.
//!
//! The gateway exposes every tool behind one route:
//!
//! ```text
//! POST {base_url}/tools/invoke
//! Authorization: Bearer <token>
//! {"tool": "<name>", "args": {...}, "sessionKey": "<session>"}
//! ```
//!
//! and answers with `{"ok": true, "result": {"content": [{"text": ...}]}}`.
//! [`ToolGateway::invoke`] returns the `text` of every content item.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from a gateway tool call.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// The request failed, timed out, or returned a non-2xx status.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    /// The gateway answered with `ok: false`.
    #[error("Gateway rejected {tool}: {message}")]
    Rejected { tool: String, message: String },
}

#[derive(Serialize)]
struct InvokeRequest<'a> {
    tool: &'a str,
    args: serde_json::Value,
    #[serde(rename = "sessionKey")]
    session_key: &'a str,
}

#[derive(Deserialize)]
struct InvokeResponse {
    #[serde(default)]
    ok: bool,
    #[serde(default)]
    result: Option<InvokeResult>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Deserialize, Default)]
struct InvokeResult {
    #[serde(default)]
    content: Vec<ContentItem>,
}

#[derive(Deserialize)]
struct ContentItem {
    #[serde(default)]
    text: String,
}

/// Async client for `/tools/invoke`. Construct once and share.
#[derive(Clone)]
pub struct ToolGateway {
    base_url: String,
    token: String,
    session_key: String,
    client: reqwest::Client,
}

impl fmt::Debug for ToolGateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolGateway")
            .field("base_url", &self.base_url)
            .field("token", &"[REDACTED]")
            .field("session_key", &self.session_key)
            .finish()
    }
}

impl ToolGateway {
    pub fn new(
        base_url: impl Into<String>,
        token: impl Into<String>,
        session_key: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            session_key: session_key.into(),
            client: reqwest::Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Invoke `tool` with `args`, giving up after `timeout`.
    ///
    /// Returns the text of each content item in order; an empty `content`
    /// array yields an empty vector.
    ///
    /// # Errors
    ///
    /// [`GatewayError::Http`] for transport failures, timeouts, non-2xx
    /// statuses and undecodable bodies; [`GatewayError::Rejected`] when the
    /// gateway reports `ok: false`.
    pub async fn invoke(
        &self,
        tool: &str,
        args: serde_json::Value,
        timeout: Duration,
    ) -> Result<Vec<String>, GatewayError> {
        let url = format!("{}/tools/invoke", self.base_url);
        let body = InvokeRequest {
            tool,
            args,
            session_key: &self.session_key,
        };

        let response: InvokeResponse = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .timeout(timeout)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if !response.ok {
            let message = match response.error {
                Some(serde_json::Value::String(s)) => s,
                Some(other) => other.to_string(),
                None => "unknown".to_string(),
            };
            return Err(GatewayError::Rejected {
                tool: tool.to_string(),
                message,
            });
        }

        Ok(response
            .result
            .unwrap_or_default()
            .content
            .into_iter()
            .map(|c| c.text)
            .collect())
    }
}
