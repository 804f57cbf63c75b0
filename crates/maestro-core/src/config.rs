//! Runtime configuration loaded from `.env`.
//!
//! Knobs for the call copilot: storage location, consultation pacing, model
//! selection, and the gateway port. Change behavior without code edits.

use serde::{Deserialize, Serialize};

/// Copilot configuration loaded from environment.
///
/// | Env | Default | Description |
/// |-----|---------|--------------|
/// | MAESTRO_STORAGE_PATH | ./data | sled directory for knowledge + call archive. |
/// | MAESTRO_PORT | 8000 | Gateway listen port. |
/// | MAESTRO_CONSULT_COOLDOWN_SECS | 8.0 | Minimum seconds between LLM consultations. |
/// | MAESTRO_RISK_CONSULT_THRESHOLD | 0.4 | Session risk above which a consultation may start. |
/// | MAESTRO_PERIODIC_CONSULT_EVERY | 10 | Consult every Nth perception even when quiet. |
/// | MAESTRO_LLM_MODEL | google/gemini-flash-1.5 | OpenRouter model for consultations and summaries. |
///
/// Component-owned variables (OPENROUTER_*, STT_*, EMOTION_*, webhook URLs,
/// MAESTRO_AUDIO_DEVICE) are read by their components, not parsed here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaestroConfig {
    /// MAESTRO_STORAGE_PATH: sled directory for the knowledge base and call archive.
    pub storage_path: String,
    /// MAESTRO_PORT: gateway listen port.
    pub port: u16,
    /// MAESTRO_CONSULT_COOLDOWN_SECS: minimum spacing between consultations.
    pub consult_cooldown_secs: f64,
    /// MAESTRO_RISK_CONSULT_THRESHOLD: session risk that qualifies a window for consultation.
    pub risk_consult_threshold: f64,
    /// MAESTRO_PERIODIC_CONSULT_EVERY: periodic check-in every Nth perception.
    pub periodic_consult_every: u64,
    /// MAESTRO_LLM_MODEL: OpenRouter model id used for consultations and call summaries.
    pub llm_model: String,
}

impl Default for MaestroConfig {
    fn default() -> Self {
        Self {
            storage_path: "./data".to_string(),
            port: 8000,
            consult_cooldown_secs: 8.0,
            risk_consult_threshold: 0.4,
            periodic_consult_every: 10,
            llm_model: "google/gemini-flash-1.5".to_string(),
        }
    }
}

impl MaestroConfig {
    /// Load from environment. Unset or invalid => defaults (see struct field docs).
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            storage_path: env_opt_string("MAESTRO_STORAGE_PATH").unwrap_or(defaults.storage_path),
            port: env_u64("MAESTRO_PORT", defaults.port as u64).min(u16::MAX as u64) as u16,
            consult_cooldown_secs: env_f64(
                "MAESTRO_CONSULT_COOLDOWN_SECS",
                defaults.consult_cooldown_secs,
            )
            .max(0.0),
            risk_consult_threshold: env_f64(
                "MAESTRO_RISK_CONSULT_THRESHOLD",
                defaults.risk_consult_threshold,
            )
            .clamp(0.0, 1.0),
            periodic_consult_every: env_u64(
                "MAESTRO_PERIODIC_CONSULT_EVERY",
                defaults.periodic_consult_every,
            )
            .max(1),
            llm_model: env_opt_string("MAESTRO_LLM_MODEL").unwrap_or(defaults.llm_model),
        }
    }
}

fn env_f64(name: &str, default: f64) -> f64 {
    match std::env::var(name) {
        Ok(v) => match v.trim().parse::<f64>() {
            Ok(parsed) => parsed,
            Err(_) => {
                tracing::warn!(target: "maestro::config", "{} is not a number, using {}", name, default);
                default
            }
        },
        Err(_) => default,
    }
}

fn env_u64(name: &str, default: u64) -> u64 {
    match std::env::var(name) {
        Ok(v) => match v.trim().parse::<u64>() {
            Ok(parsed) => parsed,
            Err(_) => {
                tracing::warn!(target: "maestro::config", "{} is not an integer, using {}", name, default);
                default
            }
        },
        Err(_) => default,
    }
}

fn env_opt_string(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_env() {
        let config = MaestroConfig::default();
        assert_eq!(config.port, 8000);
        assert_eq!(config.consult_cooldown_secs, 8.0);
        assert_eq!(config.risk_consult_threshold, 0.4);
        assert_eq!(config.periodic_consult_every, 10);
        assert_eq!(config.llm_model, "google/gemini-flash-1.5");
    }

    #[test]
    fn periodic_consult_never_zero() {
        std::env::set_var("MAESTRO_PERIODIC_CONSULT_EVERY", "0");
        let config = MaestroConfig::from_env();
        assert_eq!(config.periodic_consult_every, 1);
        std::env::remove_var("MAESTRO_PERIODIC_CONSULT_EVERY");
    }
}
