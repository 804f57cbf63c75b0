//! Prompt builders for the strategic coach and the end-of-call summary.
//!
//! The wording is product copy; change it deliberately, not in passing.

use crate::session::SessionState;

/// Transcript lines folded into the strategic context block.
const CONTEXT_LINES: usize = 5;
/// Transcript lines quoted in the summary prompt.
const HIGHLIGHT_LINES: usize = 15;

/// Builds the mid-call coaching prompt from the session's rolling state.
pub fn strategic_prompt(session: &SessionState) -> String {
    let recent_transcript = session.recent_context(CONTEXT_LINES);
    let emotion_trend: Vec<&str> = session
        .emotion_trend()
        .iter()
        .map(|label| label.as_str())
        .collect();

    format!(
        r#"You are MAESTRO, an AI sales coach monitoring a live customer call.

CURRENT CALL STATE:
- Recent transcript (last ~30 sec): "{recent_transcript}"
- Emotion trend: {emotion_trend:?}
- Current risk score: {risk:.2}/1.0
- Call duration: {duration} minutes

Analyze this situation and provide ONE tactical coaching action.
Respond ONLY with a raw JSON object. NO markdown blocks (no ```json).

{{
  "action_type": "show_prompt|show_kb_result|escalate|draft_email|search_linkedin|schedule_call|none",
  "priority": "low|medium|high|critical",
  "headline": "5 words max",
  "suggestion": "1-2 sentences exactly what the agent should say",
  "reasoning": "1 sentence logic",
  "kb_query": "null or search query"
}}

Rules:
- If customer mentions a specific problem, use "show_kb_result".
- If customer is a VIP or high-value, use "search_linkedin" to find rapport triggers.
- If customer is happy and closing, use "schedule_call" for next steps.
- Be bold but concise. Script should sound natural, not robotic.
- Match urgency to emotion intensity."#,
        recent_transcript = recent_transcript,
        emotion_trend = emotion_trend,
        risk = session.risk_score,
        duration = session.duration_minutes(),
    )
}

/// Builds the end-of-call summary prompt.
pub fn summary_prompt(session: &SessionState) -> String {
    let skip = session.transcript.len().saturating_sub(HIGHLIGHT_LINES);
    let highlights = session
        .transcript
        .iter()
        .skip(skip)
        .map(|entry| entry.text.as_str())
        .collect::<Vec<_>>()
        .join("\n");
    let journey: Vec<&str> = session
        .emotions
        .iter()
        .map(|e| e.label.as_str())
        .collect();

    format!(
        r#"Summarize this customer service call:

Transcript highlights:
{highlights}

Emotion journey: {journey:?}
Peak risk score: {peak:.2}
Duration: {duration} minutes

Provide:
1. Call outcome (resolved/unresolved/escalated/churned)
2. Main issue discussed (1 sentence)
3. Customer sentiment (improved/worsened/neutral)
4. Follow-up actions needed (list max 3)
5. Draft follow-up email subject line

JSON format."#,
        highlights = highlights,
        journey = journey,
        peak = session.peak_risk,
        duration = session.duration_minutes(),
    )
}
