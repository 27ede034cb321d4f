//! Events recorded while processing failed jobs.

use remedy_types::{EventLevel, Observable};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::decision::{ActionTag, Priority};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AgentEvent {
    JobProcessingStarted {
        job_id: u64,
        run_id: u64,
        attempt_number: u32,
    },
    RunLookupFailed {
        run_id: u64,
        error: String,
    },
    OutputLookupFailed {
        run_id: u64,
        error: String,
    },
    AnalysisUnavailable {
        job_id: u64,
        error: String,
    },
    DecisionMade {
        decision_id: Uuid,
        job_id: u64,
        action: ActionTag,
        error_category: String,
        priority: Priority,
    },
    RetryBudgetExhausted {
        job_id: u64,
        attempt_number: u32,
        max_retries: u32,
        proposed: ActionTag,
    },
    CancelFailed {
        run_id: u64,
    },
    RetrySubmitted {
        job_id: u64,
        new_run_id: u64,
    },
    RetryFailed {
        job_id: u64,
        error: String,
    },
    DraftFallback {
        job_id: u64,
        error: String,
    },
    NotificationSent {
        subject: String,
        recipients: Vec<String>,
    },
    NotificationFailed {
        subject: String,
    },
    Escalated {
        job_id: u64,
        run_id: u64,
    },
    ActionIgnored {
        job_id: u64,
        action: ActionTag,
    },
    JobProcessingCompleted {
        job_id: u64,
        action: ActionTag,
        status: String,
    },
    MonitoringCompleted {
        jobs_checked: usize,
        annotated: usize,
    },
    MonitoringFailed {
        error: String,
    },
}

impl Observable for AgentEvent {
    fn level(&self) -> EventLevel {
        match self {
            AgentEvent::JobProcessingStarted { .. }
            | AgentEvent::DecisionMade { .. }
            | AgentEvent::RetrySubmitted { .. }
            | AgentEvent::NotificationSent { .. }
            | AgentEvent::JobProcessingCompleted { .. }
            | AgentEvent::MonitoringCompleted { .. } => EventLevel::Info,
            AgentEvent::OutputLookupFailed { .. }
            | AgentEvent::AnalysisUnavailable { .. }
            | AgentEvent::RetryBudgetExhausted { .. }
            | AgentEvent::CancelFailed { .. }
            | AgentEvent::DraftFallback { .. }
            | AgentEvent::Escalated { .. }
            | AgentEvent::ActionIgnored { .. } => EventLevel::Warn,
            AgentEvent::RunLookupFailed { .. }
            | AgentEvent::RetryFailed { .. }
            | AgentEvent::NotificationFailed { .. }
            | AgentEvent::MonitoringFailed { .. } => EventLevel::Error,
        }
    }

    fn message(&self) -> String {
        match self {
            AgentEvent::JobProcessingStarted {
                job_id,
                run_id,
                attempt_number,
            } => format!("Processing failed job {job_id} run {run_id} (attempt {attempt_number})"),
            AgentEvent::RunLookupFailed { run_id, error } => {
                format!("Failed to get details for run {run_id}: {error}")
            }
            AgentEvent::OutputLookupFailed { run_id, error } => {
                format!("Failed to get output for run {run_id}: {error}")
            }
            AgentEvent::AnalysisUnavailable { job_id, error } => {
                format!("Model analysis unavailable for job {job_id}: {error}")
            }
            AgentEvent::DecisionMade {
                action,
                error_category,
                priority,
                ..
            } => format!("Decision made: {action} ({error_category}, {priority})"),
            AgentEvent::RetryBudgetExhausted {
                attempt_number,
                max_retries,
                proposed,
                ..
            } => format!(
                "Max retries ({max_retries}) reached at attempt {attempt_number}; {proposed} replaced by send_email"
            ),
            AgentEvent::CancelFailed { run_id } => format!("Could not cancel run {run_id}"),
            AgentEvent::RetrySubmitted { job_id, new_run_id } => {
                format!("Retry for job {job_id} submitted as run {new_run_id}")
            }
            AgentEvent::RetryFailed { job_id, error } => {
                format!("Retry for job {job_id} failed: {error}")
            }
            AgentEvent::DraftFallback { job_id, error } => {
                format!("Using fallback notification for job {job_id}: {error}")
            }
            AgentEvent::NotificationSent {
                subject,
                recipients,
            } => format!("Notification '{subject}' sent to {}", recipients.join(", ")),
            AgentEvent::NotificationFailed { subject } => {
                format!("Notification '{subject}' was not delivered")
            }
            AgentEvent::Escalated { job_id, run_id } => {
                format!("Job {job_id} run {run_id} escalated for manual review")
            }
            AgentEvent::ActionIgnored { job_id, action } => {
                format!("No handler for action {action} on job {job_id}")
            }
            AgentEvent::JobProcessingCompleted {
                job_id,
                action,
                status,
            } => format!("Job {job_id} processed: {action} -> {status}"),
            AgentEvent::MonitoringCompleted {
                jobs_checked,
                annotated,
            } => format!("Monitored {jobs_checked} jobs, {annotated} within window"),
            AgentEvent::MonitoringFailed { error } => format!("Monitoring failed: {error}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_follow_outcome() {
        let ok = AgentEvent::RetrySubmitted {
            job_id: 1,
            new_run_id: 2,
        };
        let budget = AgentEvent::RetryBudgetExhausted {
            job_id: 1,
            attempt_number: 3,
            max_retries: 3,
            proposed: ActionTag::Retry,
        };
        let failed = AgentEvent::MonitoringFailed {
            error: "boom".into(),
        };
        assert_eq!(ok.level(), EventLevel::Info);
        assert_eq!(budget.level(), EventLevel::Warn);
        assert_eq!(failed.level(), EventLevel::Error);
    }

    #[test]
    fn message_mentions_replacement() {
        let event = AgentEvent::RetryBudgetExhausted {
            job_id: 1,
            attempt_number: 4,
            max_retries: 3,
            proposed: ActionTag::RetryWithNewParams,
        };
        assert_eq!(
            event.message(),
            "Max retries (3) reached at attempt 4; retry_with_new_params replaced by send_email"
        );
    }

    #[test]
    fn event_serialization() {
        let event = AgentEvent::Escalated {
            job_id: 9,
            run_id: 90,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["Escalated"]["run_id"], 90);
    }
}
