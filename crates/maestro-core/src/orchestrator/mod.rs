//! Decision engine: one agent task per live call session.
//!
//! Every perception flows reflex-first. The instant rules fire locally with
//! zero latency; only windows they ignore may open an LLM consultation, and
//! consultations are paced by a cooldown so a loud call cannot burn the
//! token budget. All session state has a single writer: the engine task.

pub mod parser;
pub mod prompts;
pub mod reflex;

pub use parser::{parse_action_draft, salvage_json};
pub use prompts::{strategic_prompt, summary_prompt};

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::battlecards;
use crate::config::MaestroConfig;
use crate::integrations::IntegrationSink;
use crate::knowledge::KnowledgeBase;
use crate::reasoning::ReasoningService;
use crate::session::SessionState;
use crate::shared::{
    Action, ActionDraft, ActionType, AudioSource, CallSummaryData, ClientMessage, FeedbackRecord,
    OutboundMessage, Perception, PerceptionSnapshot,
};
use crate::store::CallArchive;
use crate::transport::OutboundSender;

/// Everything the engine reacts to, serialized onto one channel.
#[derive(Debug)]
pub enum EngineEvent {
    /// A message from the connected client (call control, feedback, queries).
    Client(ClientMessage),
    /// One gated audio window, fully perceived.
    Perception {
        perception: Perception,
        source: AudioSource,
    },
    /// A consultation task finished; `None` when the model declined or the
    /// response did not survive parsing.
    ConsultationDone(Option<ActionDraft>),
    /// A slow side effect finished and wants its payload on the logged action.
    Enriched { action_id: Uuid, data: Value },
    Shutdown,
}

/// The per-session call agent. Owns the session state, fans decisions out to
/// the UI channel, and supervises its own side-effect tasks.
pub struct MaestroAgent {
    session: SessionState,
    config: MaestroConfig,
    kb: Arc<KnowledgeBase>,
    reasoner: Arc<dyn ReasoningService>,
    sink: Arc<dyn IntegrationSink>,
    archive: Arc<dyn CallArchive>,
    ui: OutboundSender,
    events_tx: mpsc::UnboundedSender<EngineEvent>,
    events_rx: mpsc::UnboundedReceiver<EngineEvent>,
    tasks: JoinSet<()>,
}

impl MaestroAgent {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        session_id: impl Into<String>,
        config: MaestroConfig,
        kb: Arc<KnowledgeBase>,
        reasoner: Arc<dyn ReasoningService>,
        sink: Arc<dyn IntegrationSink>,
        archive: Arc<dyn CallArchive>,
        ui: OutboundSender,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            session: SessionState::new(session_id),
            config,
            kb,
            reasoner,
            sink,
            archive,
            ui,
            events_tx,
            events_rx,
            tasks: JoinSet::new(),
        }
    }

    /// Event handle for producers (the socket reader and the voice pipeline).
    pub fn sender(&self) -> mpsc::UnboundedSender<EngineEvent> {
        self.events_tx.clone()
    }

    /// Runs until `Shutdown`, then drains outstanding side-effect tasks and
    /// returns the final state for inspection.
    pub async fn run(mut self) -> Self {
        info!(
            target: "maestro::engine",
            "🎼 Agent online for session {}", self.session.session_id
        );

        while let Some(event) = self.events_rx.recv().await {
            match event {
                EngineEvent::Client(message) => self.on_client(message).await,
                EngineEvent::Perception { perception, source } => {
                    self.on_perception(perception, source)
                }
                EngineEvent::ConsultationDone(draft) => self.on_consultation_done(draft),
                EngineEvent::Enriched { action_id, data } => self.on_enriched(action_id, data),
                EngineEvent::Shutdown => break,
            }
        }

        while self.tasks.join_next().await.is_some() {}
        info!(
            target: "maestro::engine",
            "Agent for session {} stopped", self.session.session_id
        );
        self
    }

    async fn on_client(&mut self, message: ClientMessage) {
        match message {
            ClientMessage::CallStart { call_metadata } => {
                let call_id = self.session.begin_call(call_metadata);
                info!(target: "maestro::engine", "📞 Call started: {call_id}");
                self.send_ui(OutboundMessage::CallStarted {
                    call_id,
                    timestamp: Utc::now(),
                });
            }
            ClientMessage::CallEnd => self.on_call_end().await,
            ClientMessage::Feedback {
                action_id,
                rating,
                outcome,
            } => {
                let record = FeedbackRecord {
                    action_id,
                    rating,
                    outcome,
                    timestamp: Utc::now(),
                };
                if let Err(e) = self.archive.record_feedback(&self.session.session_id, &record) {
                    warn!(target: "maestro::engine", "Failed to store feedback: {e}");
                }
            }
            ClientMessage::ManualQuery { query } => {
                let lookup = self.kb.search(&query);
                self.send_ui(OutboundMessage::KbResult { data: lookup });
            }
        }
    }

    fn on_perception(&mut self, perception: Perception, source: AudioSource) {
        if !self.session.is_active() {
            debug!(target: "maestro::engine", "Perception outside an active call, dropped");
            return;
        }

        let risk = self.session.observe(&perception);

        let mut snapshot = PerceptionSnapshot::new(&perception, risk);
        snapshot.source = Some(source.as_str().to_string());
        snapshot.battlecard = battlecards::scan(&perception.transcript);
        if snapshot.battlecard.is_some() {
            info!(target: "maestro::engine", "⚔️ Competitor mentioned, battlecard attached");
        }
        self.send_ui(OutboundMessage::PerceptionUpdate { data: snapshot });

        if let Some(draft) = reflex::evaluate(&perception, risk) {
            self.dispatch(draft);
            return;
        }

        if self.should_consult(&perception.transcript) {
            // Stamp the cooldown and the inflight flag before the task exists,
            // so a burst of windows cannot start a second consultation.
            self.session.last_consultation_at = Some(Instant::now());
            self.session.consultation_inflight = true;

            let prompt = prompts::strategic_prompt(&self.session);
            let reasoner = Arc::clone(&self.reasoner);
            let events = self.events_tx.clone();
            self.tasks.spawn(async move {
                let draft = match reasoner.complete(&prompt).await {
                    Ok(text) => parser::parse_action_draft(&text),
                    Err(e) => {
                        warn!(target: "maestro::engine", "Consultation failed: {e}");
                        None
                    }
                };
                let _ = events.send(EngineEvent::ConsultationDone(draft));
            });
        }
    }

    fn should_consult(&self, transcript: &str) -> bool {
        if self.session.consultation_inflight {
            return false;
        }
        let cooldown = Duration::from_secs_f64(self.config.consult_cooldown_secs);
        let cooled = match self.session.last_consultation_at {
            Some(at) => at.elapsed() >= cooldown,
            None => true,
        };
        if !cooled {
            return false;
        }
        self.session.risk_score > self.config.risk_consult_threshold
            || reflex::mentions_consult_trigger(transcript)
            || self.session.perception_count % self.config.periodic_consult_every == 0
    }

    fn on_consultation_done(&mut self, draft: Option<ActionDraft>) {
        self.session.consultation_inflight = false;

        let Some(draft) = draft else {
            return;
        };
        if draft.action_type == ActionType::None {
            debug!(target: "maestro::engine", "Consultation advised no action");
            return;
        }
        if !self.session.is_active() {
            debug!(target: "maestro::engine", "Consultation finished after call end, dropped");
            return;
        }
        self.dispatch(draft);
    }

    /// Stamps a draft, resolves any knowledge attachment, pushes the action
    /// to the UI, and spawns at most one side effect for it.
    fn dispatch(&mut self, draft: ActionDraft) {
        let mut action = Action::from_draft(draft);

        if let Some(query) = action.kb_query.as_deref() {
            let lookup = self.kb.search(query);
            match serde_json::to_value(&lookup) {
                Ok(value) => action.kb_data = Some(value),
                Err(e) => warn!(target: "maestro::engine", "KB attachment failed: {e}"),
            }
        }

        info!(
            target: "maestro::engine",
            "⚡ Agent action: [{}] {}", action.priority.as_str(), action.headline
        );
        self.session.record_action(action.clone());
        self.send_ui(OutboundMessage::AgentAction {
            data: action.clone(),
        });

        let session_id = self.session.session_id.clone();
        let sink = Arc::clone(&self.sink);
        match action.action_type {
            ActionType::Escalate => {
                let message = action.headline.clone();
                let priority = action.priority;
                self.tasks.spawn(async move {
                    sink.notify_escalation(&session_id, &message, priority.as_str())
                        .await;
                });
            }
            ActionType::UpdateCrm => match serde_json::to_value(&action) {
                Ok(payload) => {
                    self.tasks.spawn(async move {
                        sink.log_crm(&session_id, &payload).await;
                    });
                }
                Err(e) => warn!(target: "maestro::engine", "Action serialization failed: {e}"),
            },
            ActionType::SearchLinkedin => {
                let name = self
                    .session
                    .call_metadata
                    .get("customer_name")
                    .and_then(Value::as_str)
                    .unwrap_or("Customer")
                    .to_string();
                let action_id = action.action_id;
                let events = self.events_tx.clone();
                self.tasks.spawn(async move {
                    let data = sink.lookup_person(&name).await;
                    let _ = events.send(EngineEvent::Enriched { action_id, data });
                });
            }
            ActionType::ScheduleFollowup => {
                let action_id = action.action_id;
                let events = self.events_tx.clone();
                self.tasks.spawn(async move {
                    let data = sink.schedule_followup(&session_id).await;
                    let _ = events.send(EngineEvent::Enriched { action_id, data });
                });
            }
            _ => {}
        }
    }

    fn on_enriched(&mut self, action_id: Uuid, data: Value) {
        match self
            .session
            .actions_taken
            .iter_mut()
            .find(|a| a.action_id == action_id)
        {
            Some(logged) => {
                logged.enriched_data = Some(data);
                debug!(target: "maestro::engine", "Action {action_id} enriched");
            }
            None => {
                debug!(target: "maestro::engine", "Enrichment for unknown action {action_id}, dropped");
            }
        }
    }

    async fn on_call_end(&mut self) {
        if !self.session.is_active() {
            debug!(target: "maestro::engine", "call_end outside an active call, ignored");
            return;
        }
        self.session.end_call();

        let prompt = prompts::summary_prompt(&self.session);
        let mut analysis = match self.reasoner.complete(&prompt).await {
            Ok(text) => parser::salvage_json(&text),
            Err(e) => {
                warn!(target: "maestro::engine", "Summary generation failed: {e}");
                None
            }
        }
        .unwrap_or_else(|| json!({"outcome": "unknown"}));
        if !analysis.is_object() {
            analysis = json!({"outcome": "unknown"});
        }
        // The fixed summary keys are computed here, never by the model.
        if let Some(map) = analysis.as_object_mut() {
            for key in ["call_id", "duration_minutes", "total_interventions", "peak_risk"] {
                map.remove(key);
            }
        }

        let summary = CallSummaryData {
            call_id: self.session.call_id.clone().unwrap_or_default(),
            duration_minutes: self.session.duration_minutes(),
            total_interventions: self.session.actions_taken.len() as u64,
            peak_risk: self.session.peak_risk,
            analysis,
        };

        info!(
            target: "maestro::engine",
            "📋 Call ended. Duration: {}m, Interventions: {}",
            summary.duration_minutes, summary.total_interventions
        );

        // Short accidental connections leave no archive or CRM trace.
        if self.session.transcript.len() > 3 {
            let session_id = self.session.session_id.clone();
            let archive = Arc::clone(&self.archive);
            let sink = Arc::clone(&self.sink);
            let stored = summary.clone();
            self.tasks.spawn(async move {
                if let Err(e) = archive.store_call(&session_id, &stored) {
                    warn!(target: "maestro::engine", "Failed to archive call: {e}");
                }
                match serde_json::to_value(&stored) {
                    Ok(payload) => {
                        sink.log_crm(&session_id, &payload).await;
                    }
                    Err(e) => warn!(target: "maestro::engine", "Summary serialization failed: {e}"),
                }
            });
        }

        self.send_ui(OutboundMessage::CallSummary { data: summary });
    }

    fn send_ui(&self, message: OutboundMessage) {
        if self.ui.send(message).is_err() {
            debug!(
                target: "maestro::engine",
                "UI channel closed for session {}", self.session.session_id
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CoreError, CoreResult};
    use crate::integrations::CountingSink;
    use crate::reasoning::{PlaceholderReasoner, ScriptedReasoner};
    use crate::shared::{EmotionLabel, EmotionResult, Priority};
    use crate::store::RecordingArchive;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fails every completion but remembers how often it was asked.
    #[derive(Default)]
    struct CountingReasoner {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ReasoningService for CountingReasoner {
        async fn complete(&self, _prompt: &str) -> CoreResult<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(CoreError::Reasoning("counting only".to_string()))
        }
    }

    struct Harness {
        events: mpsc::UnboundedSender<EngineEvent>,
        ui: mpsc::UnboundedReceiver<OutboundMessage>,
        sink: Arc<CountingSink>,
        archive: Arc<RecordingArchive>,
        handle: tokio::task::JoinHandle<MaestroAgent>,
        _dir: tempfile::TempDir,
    }

    impl Harness {
        fn send(&self, event: EngineEvent) {
            self.events.send(event).unwrap();
        }

        async fn finish(mut self) -> (MaestroAgent, Vec<OutboundMessage>) {
            self.send(EngineEvent::Shutdown);
            let agent = self.handle.await.unwrap();
            let mut messages = Vec::new();
            while let Ok(msg) = self.ui.try_recv() {
                messages.push(msg);
            }
            (agent, messages)
        }
    }

    fn spawn_agent(reasoner: Arc<dyn ReasoningService>) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let db = sled::open(dir.path().join("db")).unwrap();
        let kb = Arc::new(KnowledgeBase::open(db).unwrap());
        let sink = Arc::new(CountingSink::default());
        let archive = Arc::new(RecordingArchive::default());
        let (ui_tx, ui_rx) = mpsc::unbounded_channel();

        let agent = MaestroAgent::new(
            "test-session",
            MaestroConfig::default(),
            kb,
            reasoner,
            sink.clone(),
            archive.clone(),
            ui_tx,
        );
        let events = agent.sender();
        let handle = tokio::spawn(agent.run());

        Harness {
            events,
            ui: ui_rx,
            sink,
            archive,
            handle,
            _dir: dir,
        }
    }

    fn call_start() -> EngineEvent {
        EngineEvent::Client(ClientMessage::CallStart {
            call_metadata: json!({}),
        })
    }

    fn window(text: &str, label: EmotionLabel, score: f64, risk: f64) -> EngineEvent {
        EngineEvent::Perception {
            perception: Perception {
                transcript: text.to_string(),
                emotion: EmotionResult {
                    label,
                    score,
                    risk_level: risk,
                },
                speech_ratio: 0.9,
                timestamp: Utc::now(),
            },
            source: AudioSource::Microphone,
        }
    }

    fn quiet(text: &str) -> EngineEvent {
        window(text, EmotionLabel::Neutral, 0.6, 0.2)
    }

    /// Lets the agent and its side-effect tasks drain under paused time.
    async fn quiesce() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    fn actions_in(messages: &[OutboundMessage]) -> Vec<&Action> {
        messages
            .iter()
            .filter_map(|m| match m {
                OutboundMessage::AgentAction { data } => Some(data),
                _ => None,
            })
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn call_start_emits_call_started() {
        let harness = spawn_agent(Arc::new(PlaceholderReasoner));
        harness.send(call_start());
        quiesce().await;

        let (agent, messages) = harness.finish().await;
        let call_id = match &messages[0] {
            OutboundMessage::CallStarted { call_id, .. } => call_id.clone(),
            other => panic!("expected call_started, got {other:?}"),
        };
        assert_eq!(agent.session.call_id.as_deref(), Some(call_id.as_str()));
        assert!(agent.session.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn perceptions_outside_a_call_are_dropped() {
        let harness = spawn_agent(Arc::new(PlaceholderReasoner));
        harness.send(quiet("hello?"));
        quiesce().await;

        let (agent, messages) = harness.finish().await;
        assert!(messages.is_empty());
        assert_eq!(agent.session.perception_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn perception_updates_carry_risk_battlecard_and_source() {
        let harness = spawn_agent(Arc::new(PlaceholderReasoner));
        harness.send(call_start());
        harness.send(quiet("we also looked at Gong last quarter"));
        quiesce().await;

        let (_, messages) = harness.finish().await;
        let snapshot = messages
            .iter()
            .find_map(|m| match m {
                OutboundMessage::PerceptionUpdate { data } => Some(data),
                _ => None,
            })
            .expect("perception update");

        assert_eq!(snapshot.risk_score, 0.06);
        assert_eq!(snapshot.source.as_deref(), Some("mic"));
        let card = snapshot.battlecard.as_ref().expect("battlecard");
        assert_eq!(card["competitor"], "Gong");
    }

    #[tokio::test(start_paused = true)]
    async fn churn_reflex_preempts_consultation() {
        let reasoner = Arc::new(CountingReasoner::default());
        let harness = spawn_agent(reasoner.clone());
        harness.send(call_start());

        harness.send(quiet("hi"));
        harness.send(window("I want to cancel", EmotionLabel::Angry, 0.9, 0.9));
        harness.send(quiet("ok fine"));
        harness.send(quiet("thanks"));
        harness.send(quiet("bye"));
        quiesce().await;

        let (agent, messages) = harness.finish().await;
        let actions = actions_in(&messages);
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].action_type, ActionType::ShowRiskAlert);
        assert_eq!(actions[0].priority, Priority::High);
        assert_eq!(actions[0].headline, "Churn risk detected");
        assert_eq!(agent.session.actions_taken.len(), 1);
        assert_eq!(reasoner.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn reflex_wins_even_when_risk_is_consult_worthy() {
        let reasoner = Arc::new(CountingReasoner::default());
        let harness = spawn_agent(reasoner.clone());
        harness.send(call_start());

        // Prime the session risk above the consult threshold, then hit a
        // churn keyword: the reflex must still preempt the consultation.
        harness.send(window("this is absolutely awful", EmotionLabel::Angry, 0.9, 0.9));
        harness.send(window("just cancel my account", EmotionLabel::Angry, 0.9, 0.9));
        quiesce().await;

        let (agent, messages) = harness.finish().await;
        assert!(agent.session.risk_score > 0.4);
        assert_eq!(actions_in(&messages).len(), 1);
        assert_eq!(reasoner.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn consultation_flows_from_trigger_to_dispatched_action() {
        let reasoner = Arc::new(ScriptedReasoner::new([
            r#"{"action_type": "show_kb_result", "priority": "medium", "headline": "Refund terms", "suggestion": "Walk them through the refund window.", "kb_query": "refund policy"}"#,
        ]));
        let harness = spawn_agent(reasoner);
        harness.send(call_start());
        harness.send(quiet("I was promised a refund last week"));
        quiesce().await;

        let (agent, messages) = harness.finish().await;
        let actions = actions_in(&messages);
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].action_type, ActionType::ShowKbResult);

        let kb_data = actions[0].kb_data.as_ref().expect("kb attachment");
        assert_eq!(kb_data["found"], true);
        assert_eq!(kb_data["results"][0]["title"], "Refund Policy");
        assert_eq!(agent.session.actions_taken[0].kb_query.as_deref(), Some("refund policy"));
    }

    #[tokio::test(start_paused = true)]
    async fn consultation_cooldown_limits_frequency() {
        let reasoner = Arc::new(CountingReasoner::default());
        let harness = spawn_agent(reasoner.clone());
        harness.send(call_start());

        harness.send(quiet("I am frustrated with this"));
        quiesce().await;
        assert_eq!(reasoner.calls.load(Ordering::SeqCst), 1);

        // One second later the cooldown still holds.
        tokio::time::sleep(Duration::from_secs(1)).await;
        harness.send(quiet("still frustrated over here"));
        quiesce().await;
        assert_eq!(reasoner.calls.load(Ordering::SeqCst), 1);

        // Past the 8 s cooldown a new consultation may start.
        tokio::time::sleep(Duration::from_secs(8)).await;
        harness.send(quiet("extremely frustrated now"));
        quiesce().await;
        assert_eq!(reasoner.calls.load(Ordering::SeqCst), 2);

        harness.finish().await;
    }

    #[tokio::test(start_paused = true)]
    async fn late_consultation_after_call_end_is_dropped() {
        let harness = spawn_agent(Arc::new(PlaceholderReasoner));
        harness.send(call_start());
        harness.send(quiet("short call"));
        harness.send(EngineEvent::Client(ClientMessage::CallEnd));
        quiesce().await;

        // A consultation that was still in flight when the call ended.
        harness.send(EngineEvent::ConsultationDone(Some(ActionDraft {
            action_type: ActionType::ShowPrompt,
            headline: "Too late".to_string(),
            suggestion: "This should never reach the UI.".to_string(),
            ..Default::default()
        })));
        quiesce().await;

        let (agent, messages) = harness.finish().await;
        assert!(actions_in(&messages).is_empty());
        assert!(agent.session.actions_taken.is_empty());
        assert!(!agent.session.consultation_inflight);

        // The summary still went out, with the fallback analysis.
        let summary = messages
            .iter()
            .find_map(|m| match m {
                OutboundMessage::CallSummary { data } => Some(data),
                _ => None,
            })
            .expect("call summary");
        let json = serde_json::to_value(summary).unwrap();
        assert_eq!(json["outcome"], "unknown");
    }

    #[tokio::test(start_paused = true)]
    async fn persistence_gate_requires_more_than_three_entries() {
        // Four entries: archived and mirrored to CRM.
        let harness = spawn_agent(Arc::new(PlaceholderReasoner));
        let sink = harness.sink.clone();
        let archive = harness.archive.clone();
        harness.send(call_start());
        for text in ["one", "two", "three", "four"] {
            harness.send(quiet(text));
        }
        harness.send(EngineEvent::Client(ClientMessage::CallEnd));
        quiesce().await;
        harness.finish().await;
        assert_eq!(archive.stored_calls.load(Ordering::SeqCst), 1);
        assert_eq!(sink.crm_logs.load(Ordering::SeqCst), 1);

        // Two entries: neither runs.
        let harness = spawn_agent(Arc::new(PlaceholderReasoner));
        let sink = harness.sink.clone();
        let archive = harness.archive.clone();
        harness.send(call_start());
        harness.send(quiet("one"));
        harness.send(quiet("two"));
        harness.send(EngineEvent::Client(ClientMessage::CallEnd));
        quiesce().await;
        let (_, messages) = harness.finish().await;
        assert_eq!(archive.stored_calls.load(Ordering::SeqCst), 0);
        assert_eq!(sink.crm_logs.load(Ordering::SeqCst), 0);
        // The UI still gets a summary for short calls.
        assert!(messages
            .iter()
            .any(|m| matches!(m, OutboundMessage::CallSummary { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn summary_fixed_keys_override_model_output() {
        let reasoner = Arc::new(ScriptedReasoner::new([
            r#"{"outcome": "resolved", "call_id": "SPOOFED", "peak_risk": 99, "main_issue": "billing"}"#,
        ]));
        let harness = spawn_agent(reasoner);
        harness.send(call_start());
        harness.send(quiet("hello"));
        harness.send(window("hello", EmotionLabel::Angry, 0.5, 0.9));
        harness.send(quiet("better now"));
        harness.send(quiet("thanks"));
        harness.send(EngineEvent::Client(ClientMessage::CallEnd));
        quiesce().await;

        let (agent, messages) = harness.finish().await;
        let summary = messages
            .iter()
            .find_map(|m| match m {
                OutboundMessage::CallSummary { data } => Some(data),
                _ => None,
            })
            .expect("call summary");

        assert_eq!(Some(summary.call_id.as_str()), agent.session.call_id.as_deref());
        assert_ne!(summary.call_id, "SPOOFED");
        assert_eq!(summary.peak_risk, 0.9);
        assert_eq!(summary.total_interventions, 0);

        let json = serde_json::to_value(summary).unwrap();
        assert_eq!(json["outcome"], "resolved");
        assert_eq!(json["main_issue"], "billing");
        assert_eq!(json["peak_risk"], 0.9);
    }

    #[tokio::test(start_paused = true)]
    async fn escalation_notifies_the_slack_channel() {
        let reasoner = Arc::new(ScriptedReasoner::new([
            r#"{"action_type": "escalate", "priority": "critical", "headline": "Supervisor needed", "suggestion": "Bring in a manager now."}"#,
        ]));
        let harness = spawn_agent(reasoner);
        let sink = harness.sink.clone();
        harness.send(call_start());
        harness.send(quiet("I am very disappointed in this service"));
        quiesce().await;

        let (agent, _) = harness.finish().await;
        assert_eq!(sink.escalations.load(Ordering::SeqCst), 1);
        assert_eq!(agent.session.actions_taken[0].action_type, ActionType::Escalate);
    }

    #[tokio::test(start_paused = true)]
    async fn linkedin_enrichment_lands_on_the_logged_copy() {
        let reasoner = Arc::new(ScriptedReasoner::new([
            r#"{"action_type": "search_linkedin", "priority": "low", "headline": "VIP on the line", "suggestion": "Mention their recent post."}"#,
        ]));
        let harness = spawn_agent(reasoner);
        let sink = harness.sink.clone();
        harness.send(EngineEvent::Client(ClientMessage::CallStart {
            call_metadata: json!({"customer_name": "Dana Reyes"}),
        }));
        harness.send(quiet("why is my invoice different"));
        quiesce().await;

        let (agent, messages) = harness.finish().await;
        assert_eq!(sink.person_lookups.load(Ordering::SeqCst), 1);

        // The UI copy went out before enrichment; the logged copy gained it.
        let actions = actions_in(&messages);
        assert_eq!(actions.len(), 1);
        assert!(actions[0].enriched_data.is_none());
        let logged = &agent.session.actions_taken[0];
        assert_eq!(logged.enriched_data.as_ref().unwrap()["name"], "Dana Reyes");
    }

    #[tokio::test(start_paused = true)]
    async fn manual_query_returns_a_kb_result() {
        let harness = spawn_agent(Arc::new(PlaceholderReasoner));
        harness.send(EngineEvent::Client(ClientMessage::ManualQuery {
            query: "refund policy".to_string(),
        }));
        quiesce().await;

        let (_, messages) = harness.finish().await;
        let lookup = messages
            .iter()
            .find_map(|m| match m {
                OutboundMessage::KbResult { data } => Some(data),
                _ => None,
            })
            .expect("kb result");
        assert!(lookup.found);
        assert_eq!(lookup.results[0].title, "Refund Policy");
    }

    #[tokio::test(start_paused = true)]
    async fn feedback_reaches_the_archive() {
        let harness = spawn_agent(Arc::new(PlaceholderReasoner));
        let archive = harness.archive.clone();
        harness.send(EngineEvent::Client(ClientMessage::Feedback {
            action_id: "a-17".to_string(),
            rating: Some(1),
            outcome: Some("worked".to_string()),
        }));
        quiesce().await;
        harness.finish().await;

        let records = archive.feedback_records.lock().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].0, "test-session");
        assert_eq!(records[0].1.action_id, "a-17");
    }
}
