//! Action dispatch: carries out a decision against the collaborators.
//!
//! Dispatch never fails. Every collaborator error is folded into the
//! returned [`ActionResult`] so one bad job cannot abort a batch.

use std::sync::Arc;

use remedy_types::{EventSink, TracingSink};
use serde::{Deserialize, Serialize};

use crate::analysis::{AnalysisService, DraftInfo, EmailDraft, JobContext};
use crate::decision::{ActionTag, Decision, JobParams, Priority};
use crate::events::AgentEvent;
use crate::jobs::JobControl;
use crate::notify::{format_error_details, Notifier};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ActionResult {
    RetrySubmitted {
        new_run_id: u64,
    },
    RetryWithParamsSubmitted {
        new_run_id: u64,
        new_parameters: JobParams,
    },
    /// The job-control API answered but refused the submission.
    RetryFailed {
        error: String,
    },
    /// The submission never got an answer.
    RetryError {
        error: String,
    },
    NotificationSent {
        email_subject: String,
        recipients: Vec<String>,
    },
    NotificationFailed {
        email_subject: String,
        recipients: Vec<String>,
    },
    Escalated {
        job_id: u64,
        run_id: u64,
        error_category: String,
        priority: Priority,
        requires_manual_review: bool,
    },
    Unhandled {
        action: ActionTag,
    },
}

impl ActionResult {
    pub fn status(&self) -> &'static str {
        match self {
            ActionResult::RetrySubmitted { .. } => "retry_submitted",
            ActionResult::RetryWithParamsSubmitted { .. } => "retry_with_params_submitted",
            ActionResult::RetryFailed { .. } => "retry_failed",
            ActionResult::RetryError { .. } => "retry_error",
            ActionResult::NotificationSent { .. } => "notification_sent",
            ActionResult::NotificationFailed { .. } => "notification_failed",
            ActionResult::Escalated { .. } => "escalated",
            ActionResult::Unhandled { .. } => "unhandled",
        }
    }
}

pub struct ActionDispatcher {
    jobs: Arc<dyn JobControl>,
    analyst: Arc<dyn AnalysisService>,
    notifier: Arc<dyn Notifier>,
    recipients: Vec<String>,
    sink: Arc<dyn EventSink<AgentEvent>>,
}

impl ActionDispatcher {
    pub fn new(
        jobs: Arc<dyn JobControl>,
        analyst: Arc<dyn AnalysisService>,
        notifier: Arc<dyn Notifier>,
        recipients: Vec<String>,
    ) -> Self {
        Self {
            jobs,
            analyst,
            notifier,
            recipients,
            sink: Arc::new(TracingSink),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn EventSink<AgentEvent>>) -> Self {
        self.sink = sink;
        self
    }

    pub async fn dispatch(
        &self,
        decision: &Decision,
        job_id: u64,
        run_id: u64,
        context: &JobContext,
        error_message: &str,
    ) -> ActionResult {
        match decision.action {
            ActionTag::Retry => {
                let params = Some(&context.parameters).filter(|p| !p.is_empty());
                self.resubmit(job_id, run_id, params, false).await
            }
            ActionTag::RetryWithNewParams => {
                let params = decision
                    .suggested_params
                    .clone()
                    .unwrap_or_else(|| self.analyst.extract_parameters(decision));
                self.resubmit(job_id, run_id, Some(&params), true).await
            }
            ActionTag::SendEmail => self.notify(decision, job_id, run_id, error_message).await,
            ActionTag::Escalate => {
                self.sink.record(AgentEvent::Escalated { job_id, run_id });
                ActionResult::Escalated {
                    job_id,
                    run_id,
                    error_category: decision.error_category.clone(),
                    priority: decision.priority,
                    requires_manual_review: true,
                }
            }
            ActionTag::Ignore => {
                self.sink.record(AgentEvent::ActionIgnored {
                    job_id,
                    action: decision.action,
                });
                ActionResult::Unhandled {
                    action: decision.action,
                }
            }
        }
    }

    /// Cancel the old run (best effort) and submit a new one.
    async fn resubmit(
        &self,
        job_id: u64,
        run_id: u64,
        params: Option<&JobParams>,
        new_params: bool,
    ) -> ActionResult {
        if !self.jobs.cancel_run(run_id).await {
            self.sink.record(AgentEvent::CancelFailed { run_id });
        }

        match self.jobs.submit_run(job_id, params).await {
            Ok(new_run_id) => {
                self.sink
                    .record(AgentEvent::RetrySubmitted { job_id, new_run_id });
                if new_params {
                    ActionResult::RetryWithParamsSubmitted {
                        new_run_id,
                        new_parameters: params.cloned().unwrap_or_default(),
                    }
                } else {
                    ActionResult::RetrySubmitted { new_run_id }
                }
            }
            Err(e) => {
                let error = e.to_string();
                self.sink.record(AgentEvent::RetryFailed {
                    job_id,
                    error: error.clone(),
                });
                if e.is_transport() {
                    ActionResult::RetryError { error }
                } else {
                    ActionResult::RetryFailed { error }
                }
            }
        }
    }

    async fn notify(
        &self,
        decision: &Decision,
        job_id: u64,
        run_id: u64,
        error_message: &str,
    ) -> ActionResult {
        let info = DraftInfo {
            error_category: decision.error_category.clone(),
            root_cause: decision.root_cause.clone(),
            severity: decision.priority.to_string(),
            error_message: error_message.to_string(),
            job_id,
            run_id,
        };

        let draft = match self
            .analyst
            .draft_message(&info, &decision.recipient_team)
            .await
        {
            Ok(draft) => draft,
            Err(e) => {
                self.sink.record(AgentEvent::DraftFallback {
                    job_id,
                    error: e.to_string(),
                });
                EmailDraft::fallback(error_message)
            }
        };

        let priority = decision.priority.to_string();
        let mut body = draft.body.clone();
        body.push_str(&format_error_details(&[
            ("Error Category", decision.error_category.as_str()),
            ("Root Cause", decision.root_cause.as_str()),
            ("Priority", priority.as_str()),
            ("Error Message", error_message),
        ]));

        let recipients = self.recipients.clone();
        if self.notifier.send(&draft.subject, &body, &recipients).await {
            self.sink.record(AgentEvent::NotificationSent {
                subject: draft.subject.clone(),
                recipients: recipients.clone(),
            });
            ActionResult::NotificationSent {
                email_subject: draft.subject,
                recipients,
            }
        } else {
            self.sink.record(AgentEvent::NotificationFailed {
                subject: draft.subject.clone(),
            });
            ActionResult::NotificationFailed {
                email_subject: draft.subject,
                recipients,
            }
        }
    }
}
