//! Job-control collaborator: the narrow contract the agent needs from a
//! remote job scheduler, and an implementation over the Databricks Jobs
//! 2.1 REST API.

use std::time::Duration;

use async_trait::async_trait;
use remedy_types::{RemedyError, Result};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::decision::JobParams;

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunState {
    pub life_cycle_state: Option<String>,
    pub result_state: Option<String>,
    pub state_message: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobParameter {
    pub name: String,
    pub default: Option<String>,
    pub value: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunDetails {
    pub run_id: u64,
    pub job_id: Option<u64>,
    pub state: RunState,
    pub job_parameters: Vec<JobParameter>,
}

impl RunDetails {
    pub fn state_message(&self) -> Option<&str> {
        self.state
            .state_message
            .as_deref()
            .filter(|m| !m.trim().is_empty())
    }

    pub fn state_label(&self) -> Option<String> {
        match (&self.state.life_cycle_state, &self.state.result_state) {
            (Some(life), Some(result)) => Some(format!("{life}/{result}")),
            (Some(life), None) => Some(life.clone()),
            (None, Some(result)) => Some(result.clone()),
            (None, None) => None,
        }
    }

    /// Effective parameters of the run; an explicit value beats the default.
    pub fn parameters(&self) -> JobParams {
        self.job_parameters
            .iter()
            .filter_map(|p| {
                p.value
                    .clone()
                    .or_else(|| p.default.clone())
                    .map(|v| (p.name.clone(), serde_json::Value::String(v)))
            })
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunOutput {
    pub error: Option<String>,
    pub error_trace: Option<String>,
    pub logs: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobSettings {
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobSummary {
    pub job_id: u64,
    /// Milliseconds since the Unix epoch.
    pub created_time: Option<i64>,
    pub settings: JobSettings,
}

impl JobSummary {
    pub fn name(&self) -> &str {
        self.settings.name.as_deref().unwrap_or("")
    }
}

// ---------------------------------------------------------------------------
// JobControl
// ---------------------------------------------------------------------------

/// Failures surface as [`RemedyError::JobControl`]; `status: None` means the
/// request never got a response.
#[async_trait]
pub trait JobControl: Send + Sync {
    async fn get_run(&self, run_id: u64) -> Result<RunDetails>;
    async fn get_run_output(&self, run_id: u64) -> Result<RunOutput>;
    /// Returns the id of the new run.
    async fn submit_run(&self, job_id: u64, params: Option<&JobParams>) -> Result<u64>;
    async fn cancel_run(&self, run_id: u64) -> bool;
    async fn list_jobs(&self, limit: usize) -> Result<Vec<JobSummary>>;
}

// ---------------------------------------------------------------------------
// HttpJobControl
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct JobsConfig {
    pub workspace_url: String,
    pub token: String,
    pub cluster_id: Option<String>,
}

#[derive(Debug)]
pub struct HttpJobControl {
    base_url: String,
    token: String,
    client: reqwest::Client,
}

impl HttpJobControl {
    pub fn new(config: &JobsConfig, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RemedyError::Other(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            base_url: format!("{}/api/2.1", config.workspace_url.trim_end_matches('/')),
            token: config.token.clone(),
            client,
        })
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/{endpoint}", self.base_url)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        operation: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let request = self
            .client
            .get(self.url(operation))
            .bearer_auth(&self.token)
            .query(query);
        self.execute(operation, request).await
    }

    async fn post_json<T: serde::de::DeserializeOwned>(
        &self,
        operation: &str,
        body: serde_json::Value,
    ) -> Result<T> {
        let request = self
            .client
            .post(self.url(operation))
            .bearer_auth(&self.token)
            .json(&body);
        self.execute(operation, request).await
    }

    async fn execute<T: serde::de::DeserializeOwned>(
        &self,
        operation: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<T> {
        let resp = request.send().await.map_err(|e| RemedyError::JobControl {
            operation: operation.to_string(),
            status: None,
            message: e.to_string(),
        })?;

        let status = resp.status();
        let body = resp.text().await.map_err(|e| RemedyError::JobControl {
            operation: operation.to_string(),
            status: None,
            message: e.to_string(),
        })?;

        if !status.is_success() {
            return Err(RemedyError::JobControl {
                operation: operation.to_string(),
                status: Some(status.as_u16()),
                message: extract_error_message(&body),
            });
        }

        serde_json::from_str(&body).map_err(|e| RemedyError::JobControl {
            operation: operation.to_string(),
            status: Some(status.as_u16()),
            message: format!("unexpected response body: {e}"),
        })
    }
}

fn extract_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v["message"].as_str().map(String::from))
        .unwrap_or_else(|| body.to_string())
}

/// Notebook parameters travel as strings.
fn notebook_params(params: &JobParams) -> serde_json::Map<String, serde_json::Value> {
    params
        .iter()
        .map(|(k, v)| {
            let text = match v {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (k.clone(), serde_json::Value::String(text))
        })
        .collect()
}

#[derive(Deserialize)]
struct RunNowResponse {
    run_id: Option<u64>,
}

#[derive(Deserialize)]
struct ListJobsResponse {
    #[serde(default)]
    jobs: Vec<JobSummary>,
}

#[async_trait]
impl JobControl for HttpJobControl {
    async fn get_run(&self, run_id: u64) -> Result<RunDetails> {
        self.get_json("jobs/runs/get", &[("run_id", run_id.to_string())])
            .await
    }

    async fn get_run_output(&self, run_id: u64) -> Result<RunOutput> {
        self.get_json("jobs/runs/get-output", &[("run_id", run_id.to_string())])
            .await
    }

    async fn submit_run(&self, job_id: u64, params: Option<&JobParams>) -> Result<u64> {
        let mut payload = json!({ "job_id": job_id });
        if let Some(params) = params.filter(|p| !p.is_empty()) {
            payload["notebook_params"] = serde_json::Value::Object(notebook_params(params));
        }

        let resp: RunNowResponse = self.post_json("jobs/run-now", payload).await?;
        let run_id = resp.run_id.ok_or_else(|| RemedyError::JobControl {
            operation: "jobs/run-now".into(),
            status: Some(200),
            message: "response did not include a run_id".into(),
        })?;
        tracing::info!(job_id, run_id, "Job run submitted");
        Ok(run_id)
    }

    async fn cancel_run(&self, run_id: u64) -> bool {
        match self
            .post_json::<serde_json::Value>("jobs/runs/cancel", json!({ "run_id": run_id }))
            .await
        {
            Ok(_) => {
                tracing::info!(run_id, "Job run cancelled");
                true
            }
            Err(e) => {
                tracing::warn!(run_id, error = %e, "Failed to cancel job run");
                false
            }
        }
    }

    async fn list_jobs(&self, limit: usize) -> Result<Vec<JobSummary>> {
        let resp: ListJobsResponse = self
            .get_json("jobs/list", &[("limit", limit.to_string())])
            .await?;
        Ok(resp.jobs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_details_deserialize() {
        let details: RunDetails = serde_json::from_value(json!({
            "run_id": 11,
            "job_id": 3,
            "state": {
                "life_cycle_state": "INTERNAL_ERROR",
                "result_state": "FAILED",
                "state_message": "Task timed out"
            },
            "job_parameters": [
                {"name": "env", "default": "dev", "value": "prod"},
                {"name": "workers", "default": "4"},
                {"name": "unset"}
            ]
        }))
        .unwrap();

        assert_eq!(details.state_message(), Some("Task timed out"));
        assert_eq!(details.state_label().as_deref(), Some("INTERNAL_ERROR/FAILED"));
        let params = details.parameters();
        assert_eq!(params["env"], json!("prod"));
        assert_eq!(params["workers"], json!("4"));
        assert!(!params.contains_key("unset"));
    }

    #[test]
    fn blank_state_message_is_absent() {
        let details = RunDetails {
            state: RunState {
                state_message: Some("  ".into()),
                ..RunState::default()
            },
            ..RunDetails::default()
        };
        assert_eq!(details.state_message(), None);
        assert_eq!(details.state_label(), None);
    }

    #[test]
    fn notebook_params_stringify_values() {
        let mut params = JobParams::new();
        params.insert("workers".into(), json!(8));
        params.insert("mode".into(), json!("full"));
        let out = notebook_params(&params);
        assert_eq!(out["workers"], json!("8"));
        assert_eq!(out["mode"], json!("full"));
    }

    #[test]
    fn base_url_trims_trailing_slash() {
        let client = HttpJobControl::new(
            &JobsConfig {
                workspace_url: "https://adb-1.azuredatabricks.net/".into(),
                token: "t".into(),
                cluster_id: None,
            },
            Duration::from_secs(30),
        )
        .unwrap();
        assert_eq!(
            client.url("jobs/list"),
            "https://adb-1.azuredatabricks.net/api/2.1/jobs/list"
        );
    }

    #[test]
    fn extract_error_message_prefers_message_field() {
        assert_eq!(
            extract_error_message(r#"{"error_code":"RESOURCE_DOES_NOT_EXIST","message":"Run 5 does not exist."}"#),
            "Run 5 does not exist."
        );
        assert_eq!(extract_error_message("bad gateway"), "bad gateway");
    }
}
