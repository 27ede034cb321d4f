//! Decision combining: fuses a classifier match with optional model analysis
//! and enforces the retry budget.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use remedy_types::{EventSink, RemedyError, TracingSink};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::events::AgentEvent;

/// Parameters handed to a job run, keyed by parameter name.
pub type JobParams = BTreeMap<String, serde_json::Value>;

// ---------------------------------------------------------------------------
// ActionTag
// ---------------------------------------------------------------------------

/// Remediation action chosen for a failed run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionTag {
    Retry,
    RetryWithNewParams,
    SendEmail,
    Escalate,
    Ignore,
}

impl ActionTag {
    pub const ALL: [ActionTag; 5] = [
        ActionTag::Retry,
        ActionTag::RetryWithNewParams,
        ActionTag::SendEmail,
        ActionTag::Escalate,
        ActionTag::Ignore,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionTag::Retry => "retry",
            ActionTag::RetryWithNewParams => "retry_with_new_params",
            ActionTag::SendEmail => "send_email",
            ActionTag::Escalate => "escalate",
            ActionTag::Ignore => "ignore",
        }
    }

    /// Resolve free text into a tag, falling back when the text is absent or
    /// names no tag. Never fails.
    pub fn resolve(text: Option<&str>, fallback: ActionTag) -> ActionTag {
        text.and_then(|t| t.parse().ok()).unwrap_or(fallback)
    }

    pub fn is_retry(&self) -> bool {
        matches!(self, ActionTag::Retry | ActionTag::RetryWithNewParams)
    }
}

impl fmt::Display for ActionTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionTag {
    type Err = RemedyError;

    /// Case-insensitive; surrounding whitespace is ignored.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase();
        ActionTag::ALL
            .into_iter()
            .find(|tag| tag.as_str() == needle)
            .ok_or_else(|| RemedyError::Other(format!("unknown action: {s}")))
    }
}

// ---------------------------------------------------------------------------
// Priority
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Critical,
    High,
    Medium,
    Low,
}

impl Priority {
    /// Case-insensitive parse; unknown text yields `None`.
    pub fn parse(text: &str) -> Option<Priority> {
        match text.trim().to_ascii_lowercase().as_str() {
            "critical" => Some(Priority::Critical),
            "high" => Some(Priority::High),
            "medium" => Some(Priority::Medium),
            "low" => Some(Priority::Low),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Critical => "critical",
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// ErrorCategory
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Timeout,
    Resource,
    Permission,
    Syntax,
    Network,
    Data,
    Unknown,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Timeout => "timeout",
            ErrorCategory::Resource => "resource",
            ErrorCategory::Permission => "permission",
            ErrorCategory::Syntax => "syntax",
            ErrorCategory::Network => "network",
            ErrorCategory::Data => "data",
            ErrorCategory::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// A failed run as seen by the decision engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorReport {
    pub message: String,
    pub job_id: u64,
    pub run_id: u64,
    /// 1-based.
    pub attempt_number: u32,
    pub previous_error: Option<String>,
}

/// Classifier output for one error message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternMatch {
    pub category: ErrorCategory,
    pub action: ActionTag,
    pub priority: Priority,
    pub matched_keyword: Option<String>,
}

impl PatternMatch {
    pub fn unmatched() -> Self {
        Self {
            category: ErrorCategory::Unknown,
            action: ActionTag::SendEmail,
            priority: Priority::Medium,
            matched_keyword: None,
        }
    }
}

/// Advisory analysis produced by a language model. Every field is optional
/// and untrusted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExternalAnalysis {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommendation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root_cause: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_params: Option<JobParams>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient_team: Option<String>,
}

impl ExternalAnalysis {
    /// Build an analysis from arbitrary JSON. Anything other than an object
    /// yields `None`; fields of the wrong shape are dropped.
    pub fn from_value(value: &serde_json::Value) -> Option<Self> {
        let obj = value.as_object()?;
        let text = |key: &str| {
            obj.get(key)
                .and_then(|v| v.as_str())
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
        };

        let suggested_params = match obj.get("suggested_params") {
            Some(serde_json::Value::Object(map)) => {
                Some(map.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            }
            Some(serde_json::Value::String(raw)) => {
                serde_json::from_str::<JobParams>(raw).ok()
            }
            _ => None,
        };

        Some(Self {
            recommendation: text("recommendation"),
            error_category: text("error_category"),
            root_cause: text("root_cause"),
            reason: text("reason"),
            severity: text("severity"),
            suggested_params,
            recipient_team: text("recipient_team"),
        })
    }
}

// ---------------------------------------------------------------------------
// Decision
// ---------------------------------------------------------------------------

pub const DEFAULT_TEAM: &str = "DevOps";
pub const RETRY_BUDGET_REASON: &str = "max retries exceeded";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub id: Uuid,
    pub action: ActionTag,
    pub error_category: String,
    pub root_cause: String,
    pub reason: String,
    pub priority: Priority,
    pub suggested_params: Option<JobParams>,
    pub recipient_team: String,
    pub timestamp: DateTime<Utc>,
    pub attempt_number: u32,
}

impl Decision {
    pub fn should_retry_immediately(&self) -> bool {
        self.action.is_retry()
    }

    pub fn should_notify(&self) -> bool {
        matches!(self.action, ActionTag::SendEmail | ActionTag::Escalate)
    }
}

// ---------------------------------------------------------------------------
// DecisionEngine
// ---------------------------------------------------------------------------

pub struct DecisionEngine {
    max_retries: u32,
    sink: Arc<dyn EventSink<AgentEvent>>,
}

impl DecisionEngine {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            sink: Arc::new(TracingSink),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn EventSink<AgentEvent>>) -> Self {
        self.sink = sink;
        self
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Reduce a classifier match and optional analysis to one decision.
    ///
    /// The retry budget is checked last: once `attempt_number` reaches
    /// `max_retries`, a retry action becomes `SendEmail`. Escalate and ignore
    /// are left alone.
    pub fn decide(
        &self,
        error: &ErrorReport,
        pattern: &PatternMatch,
        external: Option<&ExternalAnalysis>,
    ) -> Decision {
        let action = ActionTag::resolve(
            external.and_then(|a| a.recommendation.as_deref()),
            pattern.action,
        );

        let mut decision = match external {
            Some(analysis) => combine(action, pattern, analysis),
            None => from_pattern(action, pattern),
        };
        decision.attempt_number = error.attempt_number;

        if error.attempt_number >= self.max_retries && decision.action.is_retry() {
            self.sink.record(AgentEvent::RetryBudgetExhausted {
                job_id: error.job_id,
                attempt_number: error.attempt_number,
                max_retries: self.max_retries,
                proposed: decision.action,
            });
            decision.action = ActionTag::SendEmail;
            decision.reason = RETRY_BUDGET_REASON.to_string();
        }

        self.sink.record(AgentEvent::DecisionMade {
            decision_id: decision.id,
            job_id: error.job_id,
            action: decision.action,
            error_category: decision.error_category.clone(),
            priority: decision.priority,
        });

        decision
    }
}

fn from_pattern(action: ActionTag, pattern: &PatternMatch) -> Decision {
    let (root_cause, reason) = match &pattern.matched_keyword {
        Some(kw) => (kw.clone(), format!("Matched pattern: {kw}")),
        None => (
            "Unknown error pattern".to_string(),
            "No known error pattern matched".to_string(),
        ),
    };

    Decision {
        id: Uuid::new_v4(),
        action,
        error_category: pattern.category.to_string(),
        root_cause,
        reason,
        priority: pattern.priority,
        suggested_params: None,
        recipient_team: DEFAULT_TEAM.to_string(),
        timestamp: Utc::now(),
        attempt_number: 0,
    }
}

fn combine(action: ActionTag, pattern: &PatternMatch, analysis: &ExternalAnalysis) -> Decision {
    let priority = analysis
        .severity
        .as_deref()
        .and_then(Priority::parse)
        .unwrap_or(pattern.priority);

    Decision {
        id: Uuid::new_v4(),
        action,
        error_category: analysis
            .error_category
            .clone()
            .unwrap_or_else(|| pattern.category.to_string()),
        root_cause: analysis
            .root_cause
            .clone()
            .unwrap_or_else(|| "Unknown".to_string()),
        reason: analysis.reason.clone().unwrap_or_else(|| {
            pattern
                .matched_keyword
                .clone()
                .unwrap_or_else(|| "Pattern matched".to_string())
        }),
        priority,
        suggested_params: analysis.suggested_params.clone(),
        recipient_team: analysis
            .recipient_team
            .clone()
            .unwrap_or_else(|| DEFAULT_TEAM.to_string()),
        timestamp: Utc::now(),
        attempt_number: 0,
    }
}
