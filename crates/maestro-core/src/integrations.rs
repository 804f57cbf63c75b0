//! Side channels: Slack-style escalation, CRM mirroring, and the demo
//! enrichment providers (person lookup, follow-up scheduling).
//!
//! Every method is fire-and-forget from the engine's point of view: failures
//! are logged here and never propagate into dispatch.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{error, info, warn};

#[async_trait]
pub trait IntegrationSink: Send + Sync {
    /// Posts an escalation alert. Returns whether a notification went out.
    async fn notify_escalation(&self, session_id: &str, message: &str, priority: &str) -> bool;
    /// Mirrors a payload (a dispatched action or a call summary) to the CRM
    /// channel.
    async fn log_crm(&self, session_id: &str, payload: &Value) -> bool;
    /// Person enrichment for rapport building.
    async fn lookup_person(&self, name: &str) -> Value;
    /// Books the follow-up slot for a session.
    async fn schedule_followup(&self, session_id: &str) -> Value;
}

/// Webhook-backed sink. URLs come from `SLACK_WEBHOOK_URL` and
/// `CRM_WEBHOOK_URL`; either may be absent, in which case that channel logs
/// locally instead of posting.
pub struct WebhookSink {
    slack_url: Option<String>,
    crm_url: Option<String>,
    client: reqwest::Client,
}

impl WebhookSink {
    pub fn new(slack_url: Option<String>, crm_url: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            slack_url: slack_url.filter(|s| !s.trim().is_empty()),
            crm_url: crm_url.filter(|s| !s.trim().is_empty()),
            client,
        }
    }

    pub fn from_env() -> Self {
        Self::new(
            std::env::var("SLACK_WEBHOOK_URL").ok(),
            std::env::var("CRM_WEBHOOK_URL").ok(),
        )
    }
}

#[async_trait]
impl IntegrationSink for WebhookSink {
    async fn notify_escalation(&self, session_id: &str, message: &str, priority: &str) -> bool {
        let Some(ref url) = self.slack_url else {
            info!(
                target: "maestro::integrations",
                "Slack webhook not configured. Escalation log: {message}"
            );
            return false;
        };

        let payload = json!({
            "text": format!(
                "MAESTRO ESCALATION [{}]\nSession: {session_id}\nAlert: {message}",
                priority.to_uppercase()
            ),
            "username": "Maestro Bot",
        });

        match self.client.post(url).json(&payload).send().await {
            Ok(resp) if resp.status().is_success() => true,
            Ok(resp) => {
                warn!(
                    target: "maestro::integrations",
                    "Slack webhook returned {}", resp.status()
                );
                false
            }
            Err(e) => {
                error!(target: "maestro::integrations", "Slack notification failed: {e}");
                false
            }
        }
    }

    async fn log_crm(&self, session_id: &str, payload: &Value) -> bool {
        let Some(ref url) = self.crm_url else {
            info!(
                target: "maestro::integrations",
                "CRM webhook not configured. Mocking CRM log for session {session_id}"
            );
            return true;
        };

        match self.client.post(url).json(payload).send().await {
            Ok(resp) if resp.status().is_success() => true,
            Ok(resp) => {
                warn!(
                    target: "maestro::integrations",
                    "CRM webhook returned {}", resp.status()
                );
                false
            }
            Err(e) => {
                error!(target: "maestro::integrations", "CRM logging failed: {e}");
                false
            }
        }
    }

    // Demo-grade providers. Real connectors slot in behind the same trait.
    async fn lookup_person(&self, name: &str) -> Value {
        let name = if name.trim().is_empty() { "Customer" } else { name };
        json!({
            "name": name,
            "title": "Director of Operations",
            "company": "Enterprise Corp",
            "recent_post": "Passionate about scaling customer success teams through AI.",
            "common_interests": ["AI Ethics", "Mountain Biking"],
        })
    }

    async fn schedule_followup(&self, _session_id: &str) -> Value {
        json!({
            "status": "scheduled",
            "time": "Tomorrow 10am",
            "calendar_link": "https://calendly.com/maestro-demo/followup",
        })
    }
}

/// Counts invocations per channel, for engine tests.
#[derive(Default)]
pub struct CountingSink {
    pub escalations: AtomicUsize,
    pub crm_logs: AtomicUsize,
    pub person_lookups: AtomicUsize,
    pub followups: AtomicUsize,
}

#[async_trait]
impl IntegrationSink for CountingSink {
    async fn notify_escalation(&self, _session_id: &str, _message: &str, _priority: &str) -> bool {
        self.escalations.fetch_add(1, Ordering::SeqCst);
        true
    }

    async fn log_crm(&self, _session_id: &str, _payload: &Value) -> bool {
        self.crm_logs.fetch_add(1, Ordering::SeqCst);
        true
    }

    async fn lookup_person(&self, name: &str) -> Value {
        self.person_lookups.fetch_add(1, Ordering::SeqCst);
        json!({ "name": if name.is_empty() { "Customer" } else { name } })
    }

    async fn schedule_followup(&self, _session_id: &str) -> Value {
        self.followups.fetch_add(1, Ordering::SeqCst);
        json!({ "status": "scheduled" })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unconfigured_channels_log_instead_of_posting() {
        let sink = WebhookSink::new(None, None);
        // Slack reports "nothing sent"; the CRM channel mocks success.
        assert!(!sink.notify_escalation("s1", "alert", "critical").await);
        assert!(sink.log_crm("s1", &json!({"k": "v"})).await);
    }

    #[tokio::test]
    async fn person_lookup_defaults_the_name() {
        let sink = WebhookSink::new(None, None);
        let person = sink.lookup_person("").await;
        assert_eq!(person["name"], "Customer");
        let person = sink.lookup_person("Dana Reyes").await;
        assert_eq!(person["name"], "Dana Reyes");
        assert_eq!(person["company"], "Enterprise Corp");
    }

    #[tokio::test]
    async fn followup_slot_shape() {
        let sink = WebhookSink::new(None, None);
        let slot = sink.schedule_followup("s1").await;
        assert_eq!(slot["status"], "scheduled");
        assert_eq!(slot["time"], "Tomorrow 10am");
        assert!(slot["calendar_link"]
            .as_str()
            .unwrap()
            .starts_with("https://calendly.com/"));
    }

    #[tokio::test]
    async fn counting_sink_tallies() {
        let sink = CountingSink::default();
        sink.notify_escalation("s", "m", "high").await;
        sink.notify_escalation("s", "m", "high").await;
        sink.log_crm("s", &json!({})).await;
        assert_eq!(sink.escalations.load(Ordering::SeqCst), 2);
        assert_eq!(sink.crm_logs.load(Ordering::SeqCst), 1);
        assert_eq!(sink.followups.load(Ordering::SeqCst), 0);
    }
}
