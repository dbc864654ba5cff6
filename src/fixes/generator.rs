//! FixGenerator: patterns first, the model second, the safety policy always.

use serde::Deserialize;
use std::sync::Arc;

use super::patterns::{FixPatternMatcher, FixTarget, MatchOutcome};
use super::safety::SafetyPolicy;
use crate::analyzer::json_object;
use crate::llm::{LlmBackend, LlmRequest};
use crate::models::{
    ChangeSet, Diagnosis, FailureCategory, FailureRecord, FileEdit, FixAttempt, FixProposal,
    FixSource,
};

pub const FIX_SYSTEM_PROMPT: &str = "You are an expert DevOps engineer who repairs failing GitHub Actions workflows with minimal, targeted file changes.";

/// Files above this size are not shown to the model.
const MAX_PROMPT_FILE_CHARS: usize = 12_000;

#[derive(Debug, Clone, PartialEq)]
pub enum Proposal {
    /// Passed the safety policy; may be committed.
    Ready(FixProposal),
    /// A concrete fix exists but violates the safety policy.
    Unsafe {
        proposal: FixProposal,
        violations: Vec<String>,
    },
    NoFix { reason: String },
}

/// Everything the generator may look at for one failure.
#[derive(Debug, Clone, Copy)]
pub struct FixRequest<'a> {
    pub failure: &'a FailureRecord,
    pub diagnosis: &'a Diagnosis,
    /// Whole run log without timestamps. Fix patterns search this.
    pub log_text: &'a str,
    /// Bounded error text for the model, usually the analyzer's excerpt
    pub error_text: &'a str,
    /// Current content of `failure.workflow_path` on the fix base
    pub workflow_file: Option<&'a str>,
    /// Other candidate files as `(path, content)`
    pub extra_files: &'a [(String, String)],
    pub previous_attempts: &'a [FixAttempt],
}

#[derive(Debug, Deserialize)]
struct RawFix {
    #[serde(default)]
    description: String,
    #[serde(default)]
    edits: Vec<FileEdit>,
}

pub struct FixGenerator {
    matcher: FixPatternMatcher,
    policy: SafetyPolicy,
    backend: Arc<dyn LlmBackend>,
    min_confidence: f64,
    max_tokens: u32,
}

impl FixGenerator {
    pub fn new(
        matcher: FixPatternMatcher,
        policy: SafetyPolicy,
        backend: Arc<dyn LlmBackend>,
        min_confidence: f64,
        max_tokens: u32,
    ) -> Self {
        Self {
            matcher,
            policy,
            backend,
            min_confidence,
            max_tokens,
        }
    }

    pub fn policy(&self) -> &SafetyPolicy {
        &self.policy
    }

    pub fn propose(&self, request: &FixRequest<'_>) -> Proposal {
        let failure = request.failure;
        let tried: Vec<String> = request
            .previous_attempts
            .iter()
            .filter_map(|a| a.source.pattern_name().map(String::from))
            .collect();

        let target = FixTarget {
            path: &failure.workflow_path,
            content: request.workflow_file,
        };

        match self.matcher.match_failure(request.log_text, target, &tried) {
            MatchOutcome::Matched {
                pattern,
                description,
                change_set,
            } => {
                tracing::info!(
                    correlation_id = %failure.correlation_id,
                    pattern,
                    "fix pattern matched"
                );
                return self.vet(FixProposal {
                    source: FixSource::Pattern(pattern.to_string()),
                    description: description.to_string(),
                    change_set,
                });
            }
            MatchOutcome::FixFailed { pattern, reason } => {
                tracing::warn!(
                    correlation_id = %failure.correlation_id,
                    pattern,
                    reason = %reason,
                    "fix pattern matched but could not be applied, falling back"
                );
            }
            MatchOutcome::NoMatch => {}
        }

        if request.diagnosis.category == FailureCategory::Timeout || failure.timed_out() {
            return Proposal::Ready(FixProposal {
                source: FixSource::Rerun,
                description: "Re-run the timed out workflow".to_string(),
                change_set: ChangeSet::default(),
            });
        }

        if request.diagnosis.is_unknown() {
            return Proposal::NoFix {
                reason: "diagnosis is unknown and no fix pattern applies".to_string(),
            };
        }

        if request.diagnosis.requires_manual_intervention {
            return Proposal::NoFix {
                reason: "diagnosis requires manual intervention".to_string(),
            };
        }

        if request.diagnosis.confidence < self.min_confidence {
            return Proposal::NoFix {
                reason: format!(
                    "diagnosis confidence {:.2} is below {:.2}",
                    request.diagnosis.confidence, self.min_confidence
                ),
            };
        }

        self.ai_fix(request)
    }

    fn ai_fix(&self, request: &FixRequest<'_>) -> Proposal {
        let prompt = self.build_prompt(request);
        let llm_request = LlmRequest::new(prompt)
            .with_system(FIX_SYSTEM_PROMPT)
            .with_max_tokens(self.max_tokens)
            .with_temperature(0.2);

        let reply = match self.backend.complete(&llm_request) {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!(
                    correlation_id = %request.failure.correlation_id,
                    error = %e,
                    "fix generation request failed"
                );
                return Proposal::NoFix {
                    reason: format!("fix generation failed: {e}"),
                };
            }
        };

        let raw = match parse_fix(&reply.content) {
            Ok(raw) => raw,
            Err(reason) => {
                return Proposal::NoFix {
                    reason: format!("unparseable fix reply: {reason}"),
                }
            }
        };

        let edits: Vec<FileEdit> = raw
            .edits
            .into_iter()
            .filter(|edit| current_content(request, &edit.path) != Some(edit.content.as_str()))
            .collect();

        if edits.is_empty() {
            return Proposal::NoFix {
                reason: "model proposed no file changes".to_string(),
            };
        }

        let description = match raw.description.trim() {
            "" => request.diagnosis.summary.clone(),
            text => text.to_string(),
        };

        self.vet(FixProposal {
            source: FixSource::AiGenerated,
            description,
            change_set: ChangeSet::new(edits),
        })
    }

    fn vet(&self, proposal: FixProposal) -> Proposal {
        let violations = self
            .policy
            .check(&proposal.change_set, proposal.is_rerun_only());
        if violations.is_empty() {
            Proposal::Ready(proposal)
        } else {
            tracing::warn!(
                source = %proposal.source,
                violations = violations.len(),
                "fix rejected by safety policy"
            );
            Proposal::Unsafe {
                proposal,
                violations,
            }
        }
    }

    fn build_prompt(&self, request: &FixRequest<'_>) -> String {
        let failure = request.failure;
        let diagnosis = request.diagnosis;

        let mut prompt = format!(
            "A GitHub Actions workflow failed and needs a fix.\n\n\
             Repository: {}\nWorkflow: {} ({})\nBranch: {}\n\n\
             Diagnosis ({}, confidence {:.2}):\n{}\n\nRoot cause:\n{}\n\nSuggested fix:\n{}\n\n\
             Error Logs:\n```\n{}\n```\n",
            failure.repo,
            failure.workflow_name,
            failure.workflow_path,
            failure.head_branch,
            diagnosis.category,
            diagnosis.confidence,
            diagnosis.summary,
            diagnosis.root_cause,
            diagnosis.suggested_fix,
            request.error_text
        );

        if let Some(content) = request.workflow_file {
            push_file(&mut prompt, &failure.workflow_path, content);
        }
        for (path, content) in request.extra_files {
            push_file(&mut prompt, path, content);
        }

        if !request.previous_attempts.is_empty() {
            prompt.push_str("\nThese fixes were already tried and did not work:\n");
            for attempt in request.previous_attempts {
                prompt.push_str(&format!(
                    "- attempt {} ({}): {} [{}]\n",
                    attempt.number, attempt.source, attempt.description, attempt.outcome
                ));
            }
            prompt.push_str("Propose something different.\n");
        }

        prompt.push_str(&format!(
            "\nYou may only modify files matching: {}\n",
            allowed_summary(&self.policy)
        ));
        prompt.push_str(
            r#"
Respond with a single JSON object:
{
    "description": "One line describing the change",
    "edits": [
        {"path": "repository-relative path", "content": "the complete new file content"}
    ]
}

Respond ONLY with the JSON object, no additional text.
"#,
        );
        prompt
    }
}

fn allowed_summary(policy: &SafetyPolicy) -> String {
    policy.allowed_patterns().join(", ")
}

fn push_file(prompt: &mut String, path: &str, content: &str) {
    if content.chars().count() <= MAX_PROMPT_FILE_CHARS {
        prompt.push_str(&format!("\nFile `{path}`:\n```\n{content}\n```\n"));
    }
}

fn current_content<'a>(request: &FixRequest<'a>, path: &str) -> Option<&'a str> {
    if path == request.failure.workflow_path {
        return request.workflow_file;
    }
    request
        .extra_files
        .iter()
        .find(|(p, _)| p == path)
        .map(|(_, c)| c.as_str())
}

fn parse_fix(reply: &str) -> Result<RawFix, String> {
    let json = json_object(reply).ok_or_else(|| "no JSON object in response".to_string())?;
    serde_json::from_str(json).map_err(|e| format!("invalid fix JSON: {e}"))
}
