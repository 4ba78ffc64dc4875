//! Conversational assistant over the manual corpus.
//!
//! A value holding its model client, prompt name, retrieval handle, and a
//! bounded history buffer. History is per-instance and never shared across
//! requests; one assistant instance serves one conversation.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use stagewright_llm::{ChatClient, ChatMessage, ChatOptions, PromptCatalog};
use stagewright_retrieval::{CorpusId, CorpusStore};

use crate::error::EngineResult;
use crate::grounding::context_for;

/// Messages of history (user + assistant turns) kept per conversation.
const HISTORY_WINDOW: usize = 6;

/// Manual chunks retrieved per question.
const QUESTION_CHUNKS: usize = 3;

/// One assistant answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssistantReply {
    pub answer: String,
    /// Whether manual context was available to ground the answer.
    pub manual_grounded: bool,
}

/// A conversational helper that answers questions about generated code
/// and the target PLC platform.
pub struct Assistant {
    chat: Arc<dyn ChatClient>,
    corpus: Arc<CorpusStore>,
    prompts: PromptCatalog,
    agent: String,
    history: Vec<ChatMessage>,
}

impl Assistant {
    /// Create an assistant using the prompt stored for `agent`.
    #[must_use]
    pub fn new(
        chat: Arc<dyn ChatClient>,
        corpus: Arc<CorpusStore>,
        prompts: PromptCatalog,
        agent: impl Into<String>,
    ) -> Self {
        Self {
            chat,
            corpus,
            prompts,
            agent: agent.into(),
            history: Vec::new(),
        }
    }

    /// Forget the conversation so far.
    pub fn reset_conversation(&mut self) {
        self.history.clear();
    }

    /// Answer `question`, optionally grounded in generated code and the
    /// current stage.
    pub async fn reply(
        &mut self,
        question: &str,
        code_context: Option<&str>,
        stage_context: Option<&str>,
    ) -> EngineResult<AssistantReply> {
        let system_prompt = self.prompts.load_current(&self.agent)?;
        let manual_context =
            context_for(&self.corpus, &CorpusId::Primary, question, QUESTION_CHUNKS).await?;
        let manual_grounded = !manual_context.is_empty()
            && manual_context != CorpusStore::format_context(&[]);

        let mut system = system_prompt;
        if manual_grounded {
            system.push_str(&format!("\n\n=== MANUAL REFERENCE ===\n{manual_context}\n"));
        }
        if let Some(code) = code_context {
            system.push_str(&format!("\n\n=== CODE TO EXPLAIN ===\n{code}\n"));
        }
        if let Some(stage) = stage_context {
            system.push_str(&format!("\n\n=== STAGE CONTEXT ===\n{stage}\n"));
        }
        system.push_str("\n\nIMPORTANT: Be CONCISE. Provide only the required answer. Do not over-explain.");

        let mut messages = vec![ChatMessage::system(system)];
        let start = self.history.len().saturating_sub(HISTORY_WINDOW);
        messages.extend_from_slice(&self.history[start..]);
        messages.push(ChatMessage::user(question));

        let answer = self
            .chat
            .chat(
                &messages,
                ChatOptions {
                    temperature: 0.2,
                    max_tokens: 1500,
                },
            )
            .await?;

        self.history.push(ChatMessage::user(question));
        self.history.push(ChatMessage::assistant(answer.clone()));

        Ok(AssistantReply {
            answer,
            manual_grounded,
        })
    }
}
