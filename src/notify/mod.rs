//! Notifier: one GitHub issue per escalated failure, never two.

mod issue;

pub use issue::{body as issue_body, marker, title as issue_title, IssueContent};

use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::config::NotifyConfig;
use crate::error::MedicError;
use crate::github::{GitHubApi, IssueRequest};
use crate::models::EscalationRecord;

pub struct Notifier {
    github: Arc<dyn GitHubApi>,
    config: NotifyConfig,
}

impl Notifier {
    pub fn new(github: Arc<dyn GitHubApi>, config: NotifyConfig) -> Self {
        Self { github, config }
    }

    /// Escalate a failure.
    ///
    /// Idempotent per correlation id: an `existing` record is returned as is,
    /// and an issue already carrying the correlation marker is reused instead
    /// of creating a second one. With issue creation disabled the record is
    /// still produced, without an issue number.
    pub fn escalate(
        &self,
        content: &IssueContent<'_>,
        existing: Option<&EscalationRecord>,
        now: DateTime<Utc>,
    ) -> Result<EscalationRecord, MedicError> {
        let failure = content.failure;
        if let Some(record) = existing {
            tracing::debug!(
                correlation_id = %failure.correlation_id,
                "escalation already recorded"
            );
            return Ok(record.clone());
        }

        let mut record = EscalationRecord {
            correlation_id: failure.correlation_id.clone(),
            reason: content.reason,
            issue_number: None,
            issue_url: None,
            created_at: now,
        };

        if !self.config.create_issues {
            tracing::info!(
                correlation_id = %failure.correlation_id,
                reason = %content.reason,
                "issue creation disabled, escalation recorded only"
            );
            return Ok(record);
        }

        let marker = marker(&failure.correlation_id);
        let issue = match self
            .github
            .find_issue_with_marker(&failure.repo, &self.config.label, &marker)?
        {
            Some(found) => {
                tracing::info!(
                    correlation_id = %failure.correlation_id,
                    number = found.number,
                    "reusing existing issue"
                );
                found
            }
            None => {
                self.github.ensure_label(
                    &failure.repo,
                    &self.config.label,
                    issue::LABEL_COLOR,
                    issue::LABEL_DESCRIPTION,
                )?;
                let request = IssueRequest {
                    title: issue_title(failure),
                    body: issue_body(content),
                    labels: vec![self.config.label.clone()],
                    assignees: self.config.assignees.clone(),
                };
                let created = self.github.create_issue(&failure.repo, &request)?;
                tracing::info!(
                    correlation_id = %failure.correlation_id,
                    number = created.number,
                    url = %created.html_url,
                    reason = %content.reason,
                    "created escalation issue"
                );
                created
            }
        };

        record.issue_number = Some(issue.number);
        record.issue_url = Some(issue.html_url);
        Ok(record)
    }
}
