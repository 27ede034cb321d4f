//! Model-analysis collaborator: asks a language model for a structured
//! opinion on a failure and for notification copy.

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use regex::Regex;
use remedy_llm::{ChatProvider, ChatRequest};
use remedy_types::{RemedyError, Result};
use serde::{Deserialize, Serialize};

use crate::decision::{Decision, ExternalAnalysis, JobParams};

// ---------------------------------------------------------------------------
// Request / response shapes
// ---------------------------------------------------------------------------

/// What the analysis prompt gets to see about the failing job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobContext {
    pub job_id: u64,
    pub run_id: u64,
    pub attempt_number: u32,
    pub parameters: JobParams,
    pub state: Option<String>,
    pub state_message: Option<String>,
}

/// Facts handed to the drafting prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftInfo {
    pub error_category: String,
    pub root_cause: String,
    pub severity: String,
    pub error_message: String,
    pub job_id: u64,
    pub run_id: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailDraft {
    pub subject: String,
    pub body: String,
}

impl EmailDraft {
    /// Fixed copy used when drafting fails.
    pub fn fallback(error_message: &str) -> Self {
        Self {
            subject: "Job Failure Alert - Immediate Action Required".to_string(),
            body: format!(
                "Job failed with error. Please review and take action.\n\nError: {error_message}"
            ),
        }
    }
}

// ---------------------------------------------------------------------------
// AnalysisService
// ---------------------------------------------------------------------------

#[async_trait]
pub trait AnalysisService: Send + Sync {
    async fn analyze(&self, error_text: &str, context: &JobContext) -> Result<ExternalAnalysis>;

    async fn draft_message(&self, info: &DraftInfo, recipient_team: &str) -> Result<EmailDraft>;

    /// Parameters for a retry when the decision carries none of its own.
    fn extract_parameters(&self, decision: &Decision) -> JobParams {
        decision.suggested_params.clone().unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// ModelAnalyst
// ---------------------------------------------------------------------------

const ANALYSIS_SYSTEM_PROMPT: &str = "You are an experienced DevOps engineer who diagnoses failed data pipeline jobs. Reply with a single JSON object.";
const DRAFT_SYSTEM_PROMPT: &str =
    "You write short, actionable incident notifications for engineering teams. Reply with a single JSON object.";

const DRAFT_TEMPERATURE: f32 = 0.5;
const DRAFT_MAX_TOKENS: u32 = 1000;

pub struct ModelAnalyst {
    provider: Arc<dyn ChatProvider>,
}

impl ModelAnalyst {
    pub fn new(provider: Arc<dyn ChatProvider>) -> Self {
        Self { provider }
    }
}

pub fn analysis_prompt(error_text: &str, context: &JobContext) -> String {
    let params = serde_json::to_string_pretty(&context.parameters).unwrap_or_else(|_| "{}".into());
    format!(
        "A scheduled job failed. Diagnose it and recommend what to do next.\n\
         \n\
         Error text:\n\
         {error_text}\n\
         \n\
         Job id: {job_id}\n\
         Run id: {run_id}\n\
         Attempt: {attempt}\n\
         Run state: {state}\n\
         Parameters: {params}\n\
         \n\
         Answer with a JSON object containing:\n\
         - error_category: timeout, resource, permission, syntax, network, data or unknown\n\
         - root_cause: one sentence\n\
         - recommendation: one of retry, retry_with_new_params, send_email, escalate\n\
         - reason: why you recommend it\n\
         - suggested_params: object of new job parameters when recommending retry_with_new_params\n\
         - recipient_team: team to notify when recommending send_email\n\
         - severity: critical, high, medium or low\n",
        job_id = context.job_id,
        run_id = context.run_id,
        attempt = context.attempt_number,
        state = context.state.as_deref().unwrap_or("unknown"),
    )
}

pub fn draft_prompt(info: &DraftInfo, recipient_team: &str) -> String {
    format!(
        "Write a notification for the {recipient_team} team about a failed job.\n\
         \n\
         Job id: {job_id}\n\
         Run id: {run_id}\n\
         Category: {category}\n\
         Root cause: {root_cause}\n\
         Severity: {severity}\n\
         Error: {error}\n\
         \n\
         Answer with a JSON object with string fields \"subject\" and \"body\". Be brief and say what action is needed.\n",
        job_id = info.job_id,
        run_id = info.run_id,
        category = info.error_category,
        root_cause = info.root_cause,
        severity = info.severity,
        error = info.error_message,
    )
}

/// Remove a surrounding Markdown code fence, if any.
fn strip_code_fence(text: &str) -> &str {
    static FENCE: OnceLock<Option<Regex>> = OnceLock::new();
    let fence = FENCE.get_or_init(|| Regex::new(r"(?s)^\s*```[A-Za-z]*\s*(.*?)\s*```\s*$").ok());
    fence
        .as_ref()
        .and_then(|re| re.captures(text))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .unwrap_or_else(|| text.trim())
}

fn parse_json_reply(provider: &str, text: &str) -> Result<serde_json::Value> {
    serde_json::from_str(strip_code_fence(text)).map_err(|e| RemedyError::MalformedResponse {
        provider: provider.to_string(),
        message: format!("reply is not JSON: {e}"),
    })
}

#[async_trait]
impl AnalysisService for ModelAnalyst {
    async fn analyze(&self, error_text: &str, context: &JobContext) -> Result<ExternalAnalysis> {
        let request =
            ChatRequest::new(ANALYSIS_SYSTEM_PROMPT, analysis_prompt(error_text, context)).json();
        let response = self.provider.complete(&request).await?;
        let value = parse_json_reply(self.provider.name(), &response.text)?;

        let analysis =
            ExternalAnalysis::from_value(&value).ok_or_else(|| RemedyError::MalformedResponse {
                provider: self.provider.name().to_string(),
                message: "analysis is not a JSON object".into(),
            })?;
        tracing::info!(
            job_id = context.job_id,
            recommendation = analysis.recommendation.as_deref().unwrap_or("none"),
            "Error analysis completed"
        );
        Ok(analysis)
    }

    async fn draft_message(&self, info: &DraftInfo, recipient_team: &str) -> Result<EmailDraft> {
        let request = ChatRequest::new(DRAFT_SYSTEM_PROMPT, draft_prompt(info, recipient_team))
            .with_temperature(DRAFT_TEMPERATURE)
            .with_max_tokens(DRAFT_MAX_TOKENS)
            .json();
        let response = self.provider.complete(&request).await?;
        let value = parse_json_reply(self.provider.name(), &response.text)?;

        let field = |key: &str| {
            value[key]
                .as_str()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
        };
        match (field("subject"), field("body")) {
            (Some(subject), Some(body)) => Ok(EmailDraft { subject, body }),
            _ => Err(RemedyError::MalformedResponse {
                provider: self.provider.name().to_string(),
                message: "draft is missing subject or body".into(),
            }),
        }
    }
}
