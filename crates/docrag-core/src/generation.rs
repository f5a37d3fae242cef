//! Prompt construction and text generation.

use std::sync::Arc;

use docrag_model::{ModelSession, ModelSessionManager, ModelTask};
use tracing::debug;

use crate::errors::{DocragError, DocragResult};

/// Text-to-text generation over the generator sessions.
#[derive(Debug, Clone)]
pub struct GenerationService {
    sessions: Arc<ModelSessionManager>,
    answer_task: ModelTask,
    answer_model: Option<String>,
    summary_model: Option<String>,
    max_answer_tokens: usize,
}

impl GenerationService {
    pub fn new(sessions: Arc<ModelSessionManager>, max_answer_tokens: usize) -> Self {
        Self {
            sessions,
            answer_task: ModelTask::TextGeneration,
            answer_model: None,
            summary_model: None,
            max_answer_tokens: max_answer_tokens.max(1),
        }
    }

    pub fn with_answer_model(mut self, name: Option<String>) -> Self {
        self.answer_model = name;
        self
    }

    pub fn with_summary_model(mut self, name: Option<String>) -> Self {
        self.summary_model = name;
        self
    }

    /// Session used by [`GenerationService::answer`]; text generation unless
    /// configured for document QA.
    pub fn with_answer_task(mut self, task: ModelTask) -> Self {
        self.answer_task = task;
        self
    }

    /// Answer a question from context passages, most relevant first.
    pub async fn answer(&self, question: &str, contexts: &[String]) -> DocragResult<String> {
        let session = self
            .sessions
            .try_get_instance(self.answer_task, self.answer_model.as_deref())
            .await?;

        let question = question.to_string();
        let contexts = contexts.to_vec();
        let max_tokens = self.max_answer_tokens;
        run_blocking(move || {
            let prompt = build_qa_prompt(&session, &question, &contexts)?;
            generate(&session, &prompt, max_tokens)
        })
        .await
    }

    /// Summarize a passage with the summarization session.
    pub async fn summarize(&self, text: &str) -> DocragResult<String> {
        let session = self
            .sessions
            .try_get_instance(ModelTask::Summarization, self.summary_model.as_deref())
            .await?;

        let prompt = format!("summarize: {}", text.trim());
        let max_tokens = self.max_answer_tokens;
        run_blocking(move || generate(&session, &prompt, max_tokens)).await
    }
}

async fn run_blocking<F>(f: F) -> DocragResult<String>
where
    F: FnOnce() -> DocragResult<String> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| DocragError::Inference(format!("generation task failed: {e}")))?
}

fn generate(session: &ModelSession, prompt: &str, max_tokens: usize) -> DocragResult<String> {
    let text = session.generate(prompt, max_tokens)?;
    debug!(
        model = %session.descriptor().model_id,
        prompt_chars = prompt.len(),
        answer_chars = text.len(),
        "Generated text"
    );
    Ok(text)
}

/// `question: … context: …`, adding passages in order while the prompt
/// stays within the generator's context.
pub fn build_qa_prompt(session: &ModelSession, question: &str, contexts: &[String]) -> DocragResult<String> {
    let tokenizer = session.tokenizer();
    let budget = session.descriptor().max_context_length.min(tokenizer.max_length());
    let header = format!("question: {} context:", question.trim());

    let mut prompt = header.clone();
    let mut used = tokenizer.count_tokens(&header)?;
    let mut added = 0usize;
    for passage in contexts {
        let passage = passage.trim();
        if passage.is_empty() {
            continue;
        }
        let cost = tokenizer.count_tokens(passage)?;
        // The best passage is always kept; the tokenizer truncates it if needed.
        if used + cost > budget && added > 0 {
            debug!(used, cost, budget, added, "Context budget reached");
            break;
        }
        prompt.push(' ');
        prompt.push_str(passage);
        used += cost;
        added += 1;
    }
    Ok(prompt)
}
