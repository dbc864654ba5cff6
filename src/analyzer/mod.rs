//! ErrorAnalyzer: bounded log excerpt in, [`Diagnosis`] out.
//!
//! Never fails. When the model is unreachable or its reply cannot be parsed
//! the result is [`Diagnosis::unavailable`], so the retry logic always has
//! something to work with.

pub mod excerpt;
mod parse;

pub use excerpt::{extract_excerpt, strip_timestamps, Excerpt, MAX_EXCERPT_CHARS};
pub use parse::{json_object, parse_diagnosis};

use std::sync::Arc;

use crate::llm::{LlmBackend, LlmRequest};
use crate::models::Diagnosis;

pub const SYSTEM_PROMPT: &str = "You are an expert DevOps engineer who specializes in debugging GitHub Actions workflows. You provide accurate, actionable analysis of workflow failures.";

/// Workflow files above this size are left out of the prompt.
const MAX_WORKFLOW_FILE_CHARS: usize = 6000;

/// What the analyzer knows about the run besides its logs.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnalysisContext<'a> {
    pub workflow_name: &'a str,
    pub workflow_file: Option<&'a str>,
    pub commit_message: Option<&'a str>,
}

pub struct ErrorAnalyzer {
    backend: Arc<dyn LlmBackend>,
    max_tokens: u32,
}

impl ErrorAnalyzer {
    pub fn new(backend: Arc<dyn LlmBackend>, max_tokens: u32) -> Self {
        Self {
            backend,
            max_tokens,
        }
    }

    pub fn analyze(&self, log_text: &str, context: &AnalysisContext<'_>) -> Diagnosis {
        let excerpt = extract_excerpt(log_text);
        let prompt = build_prompt(&excerpt, context);
        let request = LlmRequest::new(prompt)
            .with_system(SYSTEM_PROMPT)
            .with_max_tokens(self.max_tokens)
            .with_temperature(0.3);

        let reply = match self.backend.complete(&request) {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!(
                    backend = self.backend.name(),
                    error = %e,
                    "diagnosis request failed"
                );
                return Diagnosis::unavailable(e.to_string());
            }
        };

        match parse_diagnosis(&reply.content) {
            Ok(diagnosis) => {
                tracing::info!(
                    workflow = context.workflow_name,
                    category = %diagnosis.category,
                    confidence = diagnosis.confidence,
                    truncated = excerpt.truncated,
                    "diagnosed failure"
                );
                diagnosis
            }
            Err(reason) => {
                tracing::warn!(reason = %reason, "unparseable diagnosis reply");
                Diagnosis::unavailable(reason)
            }
        }
    }
}

pub fn build_prompt(excerpt: &Excerpt, context: &AnalysisContext<'_>) -> String {
    let mut prompt = format!(
        "Analyze the following GitHub Actions workflow failure and provide a structured analysis.\n\n\
         Workflow Name: {}\n\nError Logs:\n```\n{}\n```\n",
        context.workflow_name, excerpt.text
    );

    if let Some(file) = context.workflow_file {
        if file.chars().count() <= MAX_WORKFLOW_FILE_CHARS {
            prompt.push_str(&format!("\nWorkflow File Content:\n```yaml\n{file}\n```\n"));
        }
    }

    if let Some(message) = context.commit_message {
        prompt.push_str(&format!("\nCommit Message: {}\n", message.trim()));
    }

    prompt.push_str(
        r#"
Respond with a single JSON object:
{
    "category": "one of: dependency-conflict, missing-env-var, config-error, test-failure, timeout, unknown",
    "summary": "Brief one-line summary of the error",
    "root_cause": "Detailed explanation of the root cause",
    "suggested_fix": "Step-by-step instructions to fix the issue",
    "confidence": 0.0-1.0 confidence that the suggested fix will work,
    "requires_manual_intervention": true/false whether a human needs to intervene,
    "relevant_files": ["files", "to", "modify"]
}

Respond ONLY with the JSON object, no additional text.
"#,
    );
    prompt
}
