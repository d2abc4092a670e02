//! Meta-reasoner: model-driven configuration proposals.
//!
//! Every run consults a free routing model; every Nth run (default 10)
//! upgrades to an auto-routing model for a deeper look. The response parse
//! is deliberately permissive because small routed models answer in many
//! shapes.

use std::sync::Arc;

use llm::{ChatMessage, ChatProvider, ChatRequest};
use tracing::{debug, info};

use crate::prompt::{RunHistory, build_meta_prompt};
use crate::types::{ConfigChange, HillClimberConfig, TaskRunResult};

/// Run cadence for the deeper auto-routing model.
pub const DEFAULT_AUTO_EVERY: i64 = 10;

/// Proposals longer than this are treated as the model rambling, not a hint.
const MAX_HINT_LEN: usize = 500;

pub struct MetaReasoner {
    provider: Arc<dyn ChatProvider>,
    free_model: String,
    auto_model: String,
    auto_every: i64,
}

impl MetaReasoner {
    pub fn new(provider: Arc<dyn ChatProvider>) -> Self {
        Self {
            provider,
            free_model: "openrouter/auto".to_string(),
            auto_model: "openrouter/auto:online".to_string(),
            auto_every: DEFAULT_AUTO_EVERY,
        }
    }

    pub fn with_models(
        mut self,
        free_model: impl Into<String>,
        auto_model: impl Into<String>,
    ) -> Self {
        self.free_model = free_model.into();
        self.auto_model = auto_model.into();
        self
    }

    pub fn with_auto_every(mut self, auto_every: i64) -> Self {
        self.auto_every = auto_every.max(1);
        self
    }

    /// Which model a given run number uses.
    pub fn model_for_run(&self, run_number: i64) -> &str {
        if run_number > 0 && run_number % self.auto_every == 0 {
            &self.auto_model
        } else {
            &self.free_model
        }
    }

    /// Ask for a configuration change after a completed run.
    pub async fn propose(
        &self,
        run_number: i64,
        task_description: &str,
        config: &HillClimberConfig,
        result: &TaskRunResult,
        history: &RunHistory,
    ) -> crate::Result<(ConfigChange, String)> {
        let model = self.model_for_run(run_number).to_string();
        let prompt = build_meta_prompt(task_description, config, result, history);
        debug!(run_number, %model, "meta proposal request");

        let request = ChatRequest::new(vec![ChatMessage::user(prompt)])
            .with_model(model.clone())
            .with_temperature(0.4);
        let response = self.provider.chat(request).await?;
        let raw = response.content().unwrap_or_default().to_string();

        let change = parse_meta_response(&raw);
        info!(run_number, %model, change = ?change, "meta proposal");
        Ok((change, model))
    }
}

/// Parse the meta model's reply into a change.
///
/// `KEEP`, "keep the current ...", "no change", an empty reply, or anything
/// implausibly long all mean keep; otherwise the stripped, quote-trimmed
/// text becomes the new hint.
pub fn parse_meta_response(raw: &str) -> ConfigChange {
    let stripped = raw.trim();
    let lower = stripped.to_lowercase();

    if stripped.is_empty()
        || lower == "keep"
        || lower.starts_with("keep the current")
        || lower.contains("no change")
        || stripped.len() > MAX_HINT_LEN
    {
        return ConfigChange::Keep {
            reasoning: "meta model kept the current configuration".to_string(),
        };
    }

    let trimmed = stripped
        .trim_matches(|c| c == '"' || c == '\'' || c == '`')
        .trim();
    if trimmed.is_empty() {
        return ConfigChange::Keep {
            reasoning: "meta model returned only quotes".to_string(),
        };
    }

    ConfigChange::UpdateHint {
        new_hint: trimmed.to_string(),
        reasoning: "meta model proposed a new hint".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use llm::{ChatChoice, ChatResponse, ResponseMessage};
    use std::sync::Mutex;

    struct CannedProvider {
        reply: String,
        models_seen: Mutex<Vec<String>>,
    }

    #[async_trait::async_trait]
    impl ChatProvider for CannedProvider {
        async fn chat(&self, request: ChatRequest) -> llm::Result<ChatResponse> {
            self.models_seen
                .lock()
                .unwrap()
                .push(request.model.unwrap_or_default());
            Ok(ChatResponse {
                id: "canned".into(),
                usage: None,
                choices: vec![ChatChoice {
                    message: ResponseMessage {
                        role: "assistant".into(),
                        content: self.reply.clone(),
                        tool_calls: None,
                    },
                }],
            })
        }
    }

    #[test]
    fn test_parse_keep_variants() {
        for raw in [
            "KEEP",
            "keep",
            "Keep the current hint, it works",
            "No change needed here.",
            "",
            "   ",
        ] {
            assert!(
                matches!(parse_meta_response(raw), ConfigChange::Keep { .. }),
                "{raw:?} should parse as keep"
            );
        }
    }

    #[test]
    fn test_parse_overlong_reply_is_keep() {
        let rambling = "try this ".repeat(100);
        assert!(matches!(
            parse_meta_response(&rambling),
            ConfigChange::Keep { .. }
        ));
    }

    #[test]
    fn test_parse_new_hint_strips_quotes() {
        let change = parse_meta_response("\"Write the output file before verifying.\"");
        match change {
            ConfigChange::UpdateHint { new_hint, .. } => {
                assert_eq!(new_hint, "Write the output file before verifying.");
            }
            other => panic!("expected UpdateHint, got {other:?}"),
        }
    }

    #[test]
    fn test_model_cadence_every_nth_run() {
        let provider = Arc::new(CannedProvider {
            reply: "KEEP".into(),
            models_seen: Mutex::new(Vec::new()),
        });
        let reasoner = MetaReasoner::new(provider)
            .with_models("free-model", "auto-model")
            .with_auto_every(10);

        assert_eq!(reasoner.model_for_run(1), "free-model");
        assert_eq!(reasoner.model_for_run(9), "free-model");
        assert_eq!(reasoner.model_for_run(10), "auto-model");
        assert_eq!(reasoner.model_for_run(20), "auto-model");
        assert_eq!(reasoner.model_for_run(21), "free-model");
    }

    #[tokio::test]
    async fn test_propose_round_trip() {
        let provider = Arc::new(CannedProvider {
            reply: "'Check the output path first.'".into(),
            models_seen: Mutex::new(Vec::new()),
        });
        let reasoner = MetaReasoner::new(Arc::clone(&provider) as Arc<dyn ChatProvider>)
            .with_models("free-model", "auto-model");

        let config = HillClimberConfig {
            id: 1,
            task_id: "t".into(),
            hint: None,
            use_skills: false,
            max_turns_override: None,
            config_hash: "h".into(),
            created_at: "2025-01-01T00:00:00Z".into(),
        };
        let (change, model) = reasoner
            .propose(
                3,
                "some task",
                &config,
                &TaskRunResult::new(false, 10),
                &RunHistory::default(),
            )
            .await
            .unwrap();

        assert_eq!(model, "free-model");
        assert!(matches!(change, ConfigChange::UpdateHint { .. }));
        assert_eq!(provider.models_seen.lock().unwrap().as_slice(), ["free-model"]);
    }
}
