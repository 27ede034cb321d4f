//! Job-failure remediation agent.
//!
//! A failed run flows through four stages:
//! - [`ErrorClassifier`] maps the error text to a [`PatternMatch`]
//! - [`AnalysisService`] optionally adds a model's opinion
//! - [`DecisionEngine`] fuses both and enforces the retry budget
//! - [`ActionDispatcher`] carries out the chosen action
//!
//! [`Agent`] wires the stages to the job-control, analysis, and
//! notification collaborators.

pub mod agent;
pub mod analysis;
pub mod classifier;
pub mod config;
pub mod decision;
pub mod dispatch;
pub mod events;
pub mod feedback;
pub mod jobs;
pub mod notify;

pub use agent::{extract_error_message, Agent, FailedJob, JobReport, MonitorReport, MonitoredJob};
pub use analysis::{AnalysisService, DraftInfo, EmailDraft, JobContext, ModelAnalyst};
pub use classifier::{default_patterns, ErrorClassifier, PatternRule};
pub use config::{AgentConfig, ClassifierConfig};
pub use decision::{
    ActionTag, Decision, DecisionEngine, ErrorCategory, ErrorReport, ExternalAnalysis, JobParams,
    PatternMatch, Priority,
};
pub use dispatch::{ActionDispatcher, ActionResult};
pub use events::AgentEvent;
pub use jobs::{HttpJobControl, JobControl, JobSummary, JobsConfig, RunDetails, RunOutput};
pub use notify::{EmailConfig, MailRelayNotifier, Notifier};
