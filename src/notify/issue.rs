//! Issue title and body rendering.

use crate::models::{Diagnosis, EscalationReason, FailureRecord, FixAttempt};

pub const LABEL_COLOR: &str = "d73a4a";
pub const LABEL_DESCRIPTION: &str = "Automated workflow failure notification";

/// Hidden marker that ties an issue to one correlation id.
pub fn marker(correlation_id: &str) -> String {
    format!("<!-- medic:correlation-id={correlation_id} -->")
}

pub fn title(failure: &FailureRecord) -> String {
    let branch = if failure.head_branch.is_empty() {
        "(detached)"
    } else {
        failure.head_branch.as_str()
    };
    format!("Workflow failure: {} on {}", failure.workflow_name, branch)
}

/// Everything that goes into the issue body.
#[derive(Debug, Clone, Copy)]
pub struct IssueContent<'a> {
    pub failure: &'a FailureRecord,
    pub diagnosis: Option<&'a Diagnosis>,
    pub attempts: &'a [FixAttempt],
    pub reason: EscalationReason,
}

pub fn body(content: &IssueContent<'_>) -> String {
    let failure = content.failure;
    let short_sha: String = failure.head_sha.chars().take(8).collect();

    let mut body = format!(
        "## Workflow Failure Details\n\n\
         | Field | Value |\n\
         |-------|-------|\n\
         | **Workflow** | `{}` |\n\
         | **Repository** | `{}` |\n\
         | **Branch** | `{}` |\n\
         | **Conclusion** | `{}` |\n\
         | **Run ID** | `{}` |\n\
         | **Commit** | `{}` |\n\
         | **Time** | {} |\n\
         | **Correlation ID** | `{}` |\n\n\
         ### Links\n\
         - [View Workflow Run]({})\n",
        failure.workflow_name,
        failure.repo,
        failure.head_branch,
        failure.conclusion,
        failure.run_id,
        short_sha,
        failure.created_at.format("%Y-%m-%d %H:%M:%S UTC"),
        failure.correlation_id,
        failure.html_url,
    );

    if let Some(message) = failure.commit_message.as_deref() {
        body.push_str(&format!("\n### Commit Message\n```\n{}\n```\n", message.trim()));
    }

    body.push_str(&format!(
        "\n## Why this needs a human\n\n{} (`{}`).\n",
        content.reason.describe(),
        content.reason
    ));

    if let Some(diagnosis) = content.diagnosis {
        body.push_str(&format!(
            "\n## Analysis\n\n\
             ### Category\n`{}`\n\n\
             ### Summary\n{}\n\n\
             ### Root Cause\n{}\n\n\
             ### Suggested Fix\n{}\n\n\
             ### Confidence Level\n{:.0}% ({})\n\n\
             ### Manual Intervention Required\n{}\n",
            diagnosis.category,
            diagnosis.summary,
            or_none(&diagnosis.root_cause),
            or_none(&diagnosis.suggested_fix),
            diagnosis.confidence * 100.0,
            diagnosis.confidence_level().as_str(),
            if diagnosis.requires_manual_intervention {
                "Yes"
            } else {
                "No"
            }
        ));

        if !diagnosis.relevant_files.is_empty() {
            body.push_str("\n### Relevant Files\n");
            for file in &diagnosis.relevant_files {
                body.push_str(&format!("- `{file}`\n"));
            }
        }
    }

    body.push_str("\n## Fix Attempts\n\n");
    if content.attempts.is_empty() {
        body.push_str("No automated fix was attempted.\n");
    } else {
        body.push_str("| # | Source | Description | Outcome | Branch |\n");
        body.push_str("|---|--------|-------------|---------|--------|\n");
        for attempt in content.attempts {
            body.push_str(&format!(
                "| {} | `{}` | {} | {} | {} |\n",
                attempt.number,
                attempt.source,
                table_cell(&attempt.description),
                attempt.outcome,
                attempt
                    .branch
                    .as_deref()
                    .map(|b| format!("`{b}`"))
                    .unwrap_or_else(|| "-".to_string())
            ));
        }
        for attempt in content.attempts {
            if let Some(detail) = &attempt.detail {
                body.push_str(&format!(
                    "\nAttempt {} detail:\n```\n{}\n```\n",
                    attempt.number,
                    detail.trim()
                ));
            }
        }
    }

    body.push_str(&format!(
        "\n---\n*This issue was created automatically by medic.*\n{}\n",
        marker(&failure.correlation_id)
    ));
    body
}

fn or_none(text: &str) -> &str {
    if text.trim().is_empty() {
        "_none_"
    } else {
        text
    }
}

fn table_cell(text: &str) -> String {
    text.replace('|', "\\|").replace('\n', " ")
}
