use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// What the pipeline needs to know about an agent to decide whether it can
/// run a diagnosis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentDescriptor {
    pub id: String,
    pub display_name: Option<String>,
    pub slug: Option<String>,
    pub runtime_id: Option<String>,
    pub session_key: Option<String>,
    pub status: Option<String>,
    pub dispatch_eligible: bool,
    /// Epoch milliseconds.
    pub updated_at: Option<i64>,
}

/// Wire shape of one agent object; gateways disagree on casing and on whether
/// `name` is the id or a label.
#[derive(Deserialize)]
struct AgentEntry {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default, alias = "displayName")]
    display_name: Option<String>,
    #[serde(default)]
    slug: Option<String>,
    #[serde(default, alias = "runtimeId")]
    runtime_id: Option<String>,
    #[serde(default, alias = "sessionKey")]
    session_key: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default = "default_dispatch_eligible", alias = "dispatchEligible")]
    dispatch_eligible: bool,
    #[serde(default, alias = "updatedAt")]
    updated_at: Option<i64>,
}

fn default_dispatch_eligible() -> bool {
    true
}

impl AgentEntry {
    fn into_descriptor(self) -> Option<AgentDescriptor> {
        let (id, display_name) = match (self.id, self.name) {
            (Some(id), name) => (id, self.display_name.or(name)),
            (None, Some(name)) => (name, self.display_name),
            (None, None) => return None,
        };
        Some(AgentDescriptor {
            id,
            display_name,
            slug: self.slug,
            runtime_id: self.runtime_id,
            session_key: self.session_key,
            status: self.status,
            dispatch_eligible: self.dispatch_eligible,
            updated_at: self.updated_at,
        })
    }
}

impl AgentDescriptor {
    pub fn named(id: &str) -> Self {
        Self {
            id: id.to_string(),
            display_name: None,
            slug: None,
            runtime_id: None,
            session_key: None,
            status: None,
            dispatch_eligible: true,
            updated_at: None,
        }
    }

    pub fn name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.id)
    }

    pub fn is_errored(&self) -> bool {
        matches!(
            self.status.as_deref().map(str::to_ascii_lowercase).as_deref(),
            Some("error" | "errored" | "failed" | "crashed")
        )
    }
}

/// Messaging seam to the agents that write diagnoses. No latency guarantee:
/// callers bound `send_prompt` themselves.
#[async_trait]
pub trait AgentGateway: Send + Sync {
    async fn list_agents(&self) -> Result<Vec<AgentDescriptor>>;
    async fn send_prompt(&self, agent_id: &str, prompt: &str) -> Result<String>;
}

/// Used when no gateway is configured. Lists nobody, so diagnosis fails fast
/// with "no eligible agent".
pub struct NoAgents;

#[async_trait]
impl AgentGateway for NoAgents {
    async fn list_agents(&self) -> Result<Vec<AgentDescriptor>> {
        Ok(Vec::new())
    }

    async fn send_prompt(&self, agent_id: &str, _prompt: &str) -> Result<String> {
        Err(anyhow!("No agent gateway configured (agent '{}')", agent_id))
    }
}

/// Talks to a gateway exposing `GET /api/agents` and
/// `POST /api/agents/{id}/chat`.
pub struct HttpAgentGateway {
    client: Client,
    base_url: Url,
    api_token: Option<String>,
}

impl HttpAgentGateway {
    /// Every request is cut off after `timeout`.
    pub fn new(base_url: &str, api_token: Option<String>, timeout: Duration) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .with_context(|| format!("Invalid agent gateway URL: {base_url}"))?;
        if base_url.cannot_be_a_base() {
            bail!("Agent gateway URL cannot carry a path: {base_url}");
        }
        let client = Client::builder()
            .user_agent("errsight")
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            base_url,
            api_token,
        })
    }

    /// Appends percent-encoded path segments to the base URL.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

/// `{"agents": [...]}` where each entry is a bare name or a descriptor object.
pub fn parse_agent_list(body: &serde_json::Value) -> Result<Vec<AgentDescriptor>> {
    let Some(entries) = body.get("agents").and_then(|v| v.as_array()) else {
        bail!("Agent list response has no 'agents' array");
    };
    let mut agents = Vec::with_capacity(entries.len());
    for entry in entries {
        match entry {
            serde_json::Value::String(name) => agents.push(AgentDescriptor::named(name)),
            serde_json::Value::Object(_) => {
                match serde_json::from_value::<AgentEntry>(entry.clone()) {
                    Ok(raw) => agents.extend(raw.into_descriptor()),
                    Err(e) => debug!("Skipping unreadable agent entry: {}", e),
                }
            }
            _ => {}
        }
    }
    Ok(agents)
}

#[async_trait]
impl AgentGateway for HttpAgentGateway {
    async fn list_agents(&self) -> Result<Vec<AgentDescriptor>> {
        let url = self.endpoint(&["api", "agents"]);
        let resp = self.authorize(self.client.get(url)).send().await?;
        if !resp.status().is_success() {
            return Err(anyhow!("Listing agents failed with status {}", resp.status()));
        }
        let body = resp.json::<serde_json::Value>().await?;
        parse_agent_list(&body)
    }

    async fn send_prompt(&self, agent_id: &str, prompt: &str) -> Result<String> {
        let url = self.endpoint(&["api", "agents", agent_id, "chat"]);
        let resp = self
            .authorize(self.client.post(url))
            .json(&serde_json::json!({ "prompt": prompt }))
            .send()
            .await?;
        let status = resp.status();
        let body = resp.json::<serde_json::Value>().await?;
        let ok = body
            .get("success")
            .and_then(|v| v.as_bool())
            .unwrap_or(status.is_success());
        if !ok {
            let message = body
                .get("error")
                .and_then(|v| v.as_str())
                .unwrap_or("agent request failed");
            return Err(anyhow!("{}", message));
        }
        Ok(body
            .get("response")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn agent_list_accepts_names_and_objects() {
        let body = json!({
            "agents": [
                "default",
                {"id": "a-1", "name": "Main", "slug": "main", "status": "idle", "updatedAt": 5},
                {"name": "ops", "dispatchEligible": false},
                {"slug": "nameless"},
                42
            ]
        });
        let agents = parse_agent_list(&body).unwrap();
        assert_eq!(agents.len(), 3);
        assert_eq!(agents[0], AgentDescriptor::named("default"));
        assert_eq!(agents[1].slug.as_deref(), Some("main"));
        assert_eq!(agents[1].name(), "Main");
        assert_eq!(agents[1].updated_at, Some(5));
        assert_eq!(agents[2].id, "ops");
        assert!(!agents[2].dispatch_eligible);
    }

    #[test]
    fn agent_list_requires_array() {
        assert!(parse_agent_list(&json!({"success": false})).is_err());
    }

    #[test]
    fn error_statuses_are_detected() {
        let mut agent = AgentDescriptor::named("x");
        assert!(!agent.is_errored());
        agent.status = Some("Error".to_string());
        assert!(agent.is_errored());
    }

    #[test]
    fn agent_ids_are_encoded_into_one_segment() {
        let gateway =
            HttpAgentGateway::new("http://127.0.0.1:3000/", None, Duration::from_secs(1)).unwrap();
        assert_eq!(
            gateway.endpoint(&["api", "agents", "ops/team lead", "chat"]).as_str(),
            "http://127.0.0.1:3000/api/agents/ops%2Fteam%20lead/chat"
        );

        let nested =
            HttpAgentGateway::new("http://gw.local/base", None, Duration::from_secs(1)).unwrap();
        assert_eq!(
            nested.endpoint(&["api", "agents"]).as_str(),
            "http://gw.local/base/api/agents"
        );
    }

    #[test]
    fn gateway_url_must_parse() {
        let timeout = Duration::from_secs(1);
        assert!(HttpAgentGateway::new("not a url", None, timeout).is_err());
        assert!(HttpAgentGateway::new("mailto:ops@example.com", None, timeout).is_err());
    }

    #[tokio::test]
    async fn no_agents_lists_nobody() {
        assert!(NoAgents.list_agents().await.unwrap().is_empty());
        assert!(NoAgents.send_prompt("main", "hi").await.is_err());
    }
}
