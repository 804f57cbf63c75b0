//! maestro-core: call-intelligence core (shared wire types, session state,
//! decision engine, knowledge base, integrations, call archive).
//!
//! The voice crate feeds perceptions in; the gateway wires everything to a
//! WebSocket session. One `MaestroAgent` task runs per live session.

mod battlecards;
mod config;
mod error;
mod integrations;
mod knowledge;
mod orchestrator;
mod reasoning;
mod session;
mod shared;
mod store;
mod transport;

// Wire and domain types shared with the voice crate and the gateway
pub use shared::{
    round3, Action, ActionDraft, ActionType, AudioSource, CallSummaryData, ClientMessage,
    EmotionLabel, EmotionResult, FeedbackRecord, KbHit, KbLookup, OutboundMessage, Perception,
    PerceptionSnapshot, Priority, TranscriptEntry,
};

// Errors and configuration
pub use config::MaestroConfig;
pub use error::{CoreError, CoreResult};

// Session state
pub use session::{CallPhase, SessionState, EMOTION_CAPACITY, TRANSCRIPT_CAPACITY, TREND_LEN};

// Decision engine
pub use orchestrator::{
    parse_action_draft, salvage_json, strategic_prompt, summary_prompt, EngineEvent, MaestroAgent,
};

// Battlecards
pub use battlecards::scan as scan_battlecards;

// Knowledge base
pub use knowledge::{KbDocument, KnowledgeBase};

// Reasoning backends
pub use reasoning::{
    create_best_reasoner, OpenRouterReasoner, PlaceholderReasoner, ReasoningService,
    ScriptedReasoner,
};

// Integrations
pub use integrations::{CountingSink, IntegrationSink, WebhookSink};

// Call archive
pub use store::{CallArchive, RecordingArchive, SledCallStore};

// Gateway transport bookkeeping
pub use transport::{ConnectionRegistry, OutboundSender};
