//! Agent orchestration: the failed-job flow and job monitoring.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use remedy_llm::{AzureOpenAiAdapter, DynProvider};
use remedy_types::{EventSink, Result, TracingSink};
use serde::{Deserialize, Serialize};

use crate::analysis::{AnalysisService, JobContext, ModelAnalyst};
use crate::classifier::ErrorClassifier;
use crate::config::AgentConfig;
use crate::decision::{Decision, DecisionEngine, ErrorReport, ExternalAnalysis};
use crate::dispatch::{ActionDispatcher, ActionResult};
use crate::events::AgentEvent;
use crate::jobs::{HttpJobControl, JobControl, RunDetails, RunOutput};
use crate::notify::{MailRelayNotifier, Notifier};

/// Number of jobs inspected per monitoring pass.
pub const MONITOR_LIMIT: usize = 50;

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// A failed run waiting to be processed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedJob {
    pub job_id: u64,
    pub run_id: u64,
    #[serde(default = "first_attempt")]
    pub attempt_number: u32,
    #[serde(default)]
    pub previous_error: Option<String>,
}

fn first_attempt() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobReport {
    pub success: bool,
    pub job_id: u64,
    pub run_id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis: Option<ExternalAnalysis>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decision: Option<Decision>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action_result: Option<ActionResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JobReport {
    fn failed(job_id: u64, run_id: u64, error: String) -> Self {
        Self {
            success: false,
            job_id,
            run_id,
            error_message: None,
            analysis: None,
            decision: None,
            action_result: None,
            error: Some(error),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitoredJob {
    pub job_id: u64,
    pub name: String,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorReport {
    pub status: String,
    pub jobs_checked: usize,
    pub failed_jobs: Vec<MonitoredJob>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ---------------------------------------------------------------------------
// Agent
// ---------------------------------------------------------------------------

pub struct Agent {
    jobs: Arc<dyn JobControl>,
    analyst: Arc<dyn AnalysisService>,
    classifier: ErrorClassifier,
    engine: DecisionEngine,
    dispatcher: ActionDispatcher,
    sink: Arc<dyn EventSink<AgentEvent>>,
}

impl Agent {
    pub fn new(
        config: &AgentConfig,
        jobs: Arc<dyn JobControl>,
        analyst: Arc<dyn AnalysisService>,
        notifier: Arc<dyn Notifier>,
        sink: Arc<dyn EventSink<AgentEvent>>,
    ) -> Self {
        let engine = DecisionEngine::new(config.max_retries).with_sink(sink.clone());
        let dispatcher = ActionDispatcher::new(
            jobs.clone(),
            analyst.clone(),
            notifier,
            config.email.recipients.clone(),
        )
        .with_sink(sink.clone());

        Self {
            jobs,
            analyst,
            classifier: ErrorClassifier::new(config.classifier.patterns.clone()),
            engine,
            dispatcher,
            sink,
        }
    }

    /// Build an agent whose collaborators are the HTTP clients described by
    /// `config`, logging through `tracing`.
    pub fn from_config(config: &AgentConfig) -> Result<Self> {
        config.validate()?;
        let timeout = Duration::from_secs(config.request_timeout_secs);

        let mut llm = config.llm.clone();
        llm.timeout_secs = config.request_timeout_secs;
        let provider = DynProvider::new(AzureOpenAiAdapter::new(llm)?);

        Ok(Self::new(
            config,
            Arc::new(HttpJobControl::new(&config.jobs, timeout)?),
            Arc::new(ModelAnalyst::new(Arc::new(provider))),
            Arc::new(MailRelayNotifier::new(config.email.clone(), timeout)?),
            Arc::new(TracingSink),
        ))
    }

    pub fn classifier(&self) -> &ErrorClassifier {
        &self.classifier
    }

    /// Inspect a failed run and carry out the chosen remediation.
    pub async fn process_failed_job(
        &self,
        job_id: u64,
        run_id: u64,
        attempt_number: u32,
        previous_error: Option<&str>,
    ) -> JobReport {
        self.sink.record(AgentEvent::JobProcessingStarted {
            job_id,
            run_id,
            attempt_number,
        });

        let details = match self.jobs.get_run(run_id).await {
            Ok(details) => details,
            Err(e) => {
                self.sink.record(AgentEvent::RunLookupFailed {
                    run_id,
                    error: e.to_string(),
                });
                return JobReport::failed(job_id, run_id, e.to_string());
            }
        };

        let output = match self.jobs.get_run_output(run_id).await {
            Ok(output) => output,
            Err(e) => {
                self.sink.record(AgentEvent::OutputLookupFailed {
                    run_id,
                    error: e.to_string(),
                });
                RunOutput::default()
            }
        };

        let error_message = extract_error_message(&details, &output, previous_error);
        let context = JobContext {
            job_id,
            run_id,
            attempt_number,
            parameters: details.parameters(),
            state: details.state_label(),
            state_message: details.state_message().map(String::from),
        };

        let analysis = match self.analyst.analyze(&error_message, &context).await {
            Ok(analysis) => Some(analysis),
            Err(e) => {
                self.sink.record(AgentEvent::AnalysisUnavailable {
                    job_id,
                    error: e.to_string(),
                });
                None
            }
        };

        let report = ErrorReport {
            message: error_message.clone(),
            job_id,
            run_id,
            attempt_number,
            previous_error: previous_error.map(String::from),
        };
        let pattern = self.classifier.classify(&report.message);
        let decision = self.engine.decide(&report, &pattern, analysis.as_ref());

        let action_result = self
            .dispatcher
            .dispatch(&decision, job_id, run_id, &context, &error_message)
            .await;

        self.sink.record(AgentEvent::JobProcessingCompleted {
            job_id,
            action: decision.action,
            status: action_result.status().to_string(),
        });

        JobReport {
            success: true,
            job_id,
            run_id,
            error_message: Some(error_message),
            analysis,
            decision: Some(decision),
            action_result: Some(action_result),
            error: None,
        }
    }

    /// Process a batch concurrently. Reports come back in input order.
    pub async fn process_many(&self, failures: &[FailedJob]) -> Vec<JobReport> {
        join_all(failures.iter().map(|f| {
            self.process_failed_job(
                f.job_id,
                f.run_id,
                f.attempt_number,
                f.previous_error.as_deref(),
            )
        }))
        .await
    }

    pub async fn monitor(&self, max_age_hours: u64) -> MonitorReport {
        self.monitor_at(max_age_hours, Utc::now()).await
    }

    /// Monitor relative to a fixed clock reading.
    pub async fn monitor_at(&self, max_age_hours: u64, now: DateTime<Utc>) -> MonitorReport {
        tracing::info!(max_age_hours, "Monitoring recent jobs");

        let jobs = match self.jobs.list_jobs(MONITOR_LIMIT).await {
            Ok(jobs) => jobs,
            Err(e) => {
                self.sink.record(AgentEvent::MonitoringFailed {
                    error: e.to_string(),
                });
                return MonitorReport {
                    status: "monitoring_error".into(),
                    jobs_checked: 0,
                    failed_jobs: Vec::new(),
                    error: Some(e.to_string()),
                };
            }
        };

        // Jobs without a creation time are kept.
        let cutoff_ms = i64::try_from(max_age_hours)
            .ok()
            .and_then(chrono::TimeDelta::try_hours)
            .and_then(|window| now.checked_sub_signed(window))
            .map(|t| t.timestamp_millis())
            .unwrap_or(i64::MIN);

        let failed_jobs: Vec<MonitoredJob> = jobs
            .iter()
            .filter(|job| job.created_time.map_or(true, |created| created >= cutoff_ms))
            .map(|job| MonitoredJob {
                job_id: job.job_id,
                name: job.name().to_string(),
                status: "monitored".into(),
            })
            .collect();

        self.sink.record(AgentEvent::MonitoringCompleted {
            jobs_checked: jobs.len(),
            annotated: failed_jobs.len(),
        });

        MonitorReport {
            status: "monitoring_complete".into(),
            jobs_checked: jobs.len(),
            failed_jobs,
            error: None,
        }
    }
}

/// Join every available piece of error text with `" | "`.
pub fn extract_error_message(
    details: &RunDetails,
    output: &RunOutput,
    previous_error: Option<&str>,
) -> String {
    let mut parts: Vec<String> = Vec::new();
    if let Some(prev) = previous_error.filter(|p| !p.trim().is_empty()) {
        parts.push(format!("Previous attempt error: {prev}"));
    }
    if let Some(msg) = details.state_message() {
        parts.push(msg.to_string());
    }
    for text in [&output.error, &output.error_trace].into_iter().flatten() {
        if !text.trim().is_empty() {
            parts.push(text.clone());
        }
    }

    if parts.is_empty() {
        "Unknown error".to_string()
    } else {
        parts.join(" | ")
    }
}
