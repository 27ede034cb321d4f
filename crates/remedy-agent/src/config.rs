//! Agent configuration.
//!
//! Precedence, highest first: environment variables, the TOML file passed
//! to [`AgentConfig::load`], built-in defaults.

use std::path::Path;

use remedy_llm::AzureOpenAiConfig;
use remedy_types::{RemedyError, Result};
use serde::{Deserialize, Serialize};

use crate::classifier::{default_patterns, PatternRule};
use crate::jobs::JobsConfig;
use crate::notify::EmailConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub patterns: Vec<PatternRule>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            patterns: default_patterns(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub llm: AzureOpenAiConfig,
    pub jobs: JobsConfig,
    pub email: EmailConfig,
    pub classifier: ClassifierConfig,
    pub log_level: String,
    pub max_retries: u32,
    pub request_timeout_secs: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            llm: AzureOpenAiConfig::default(),
            jobs: JobsConfig::default(),
            email: EmailConfig::default(),
            classifier: ClassifierConfig::default(),
            log_level: "INFO".to_string(),
            max_retries: 3,
            request_timeout_secs: 30,
        }
    }
}

impl AgentConfig {
    /// Load from a TOML file, or defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => {
                if !p.exists() {
                    return Err(RemedyError::ConfigNotFound(p.to_path_buf()));
                }
                let content = std::fs::read_to_string(p)?;
                Self::from_toml_str(&content)
            }
            None => Ok(Self::default()),
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| RemedyError::ConfigParse(e.to_string()))
    }

    /// Apply overrides from the process environment.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key lookup. Unparseable numbers are ignored.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let set = |target: &mut String, key: &str| {
            if let Some(value) = lookup(key) {
                *target = value;
            }
        };

        set(&mut self.llm.api_key, "AZURE_OPENAI_API_KEY");
        set(&mut self.llm.api_version, "AZURE_OPENAI_API_VERSION");
        set(&mut self.llm.endpoint, "AZURE_OPENAI_ENDPOINT");
        set(&mut self.llm.deployment, "AZURE_OPENAI_DEPLOYMENT");
        set(&mut self.llm.model, "AZURE_OPENAI_MODEL");

        set(&mut self.jobs.workspace_url, "DATABRICKS_WORKSPACE_URL");
        set(&mut self.jobs.token, "DATABRICKS_PAT_TOKEN");
        if let Some(cluster) = lookup("DATABRICKS_CLUSTER_ID") {
            self.jobs.cluster_id = Some(cluster);
        }

        set(&mut self.email.relay_url, "EMAIL_RELAY_URL");
        set(&mut self.email.sender, "EMAIL_SENDER");
        set(&mut self.email.password, "EMAIL_PASSWORD");
        if let Some(enabled) = lookup("EMAIL_ENABLED") {
            self.email.enabled = enabled.trim().eq_ignore_ascii_case("true");
        }
        if let Some(recipients) = lookup("EMAIL_RECIPIENTS") {
            self.email.recipients = recipients
                .split(',')
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .map(String::from)
                .collect();
        }

        set(&mut self.log_level, "LOG_LEVEL");
        if let Some(n) = lookup("MAX_RETRIES").and_then(|v| v.trim().parse().ok()) {
            self.max_retries = n;
        }

        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_retries == 0 {
            return Err(RemedyError::InvalidConfig {
                field: "max_retries".into(),
                message: "must be at least 1".into(),
            });
        }
        if self.request_timeout_secs == 0 {
            return Err(RemedyError::InvalidConfig {
                field: "request_timeout_secs".into(),
                message: "must be non-zero".into(),
            });
        }
        for (i, rule) in self.classifier.patterns.iter().enumerate() {
            if rule.keywords.iter().all(|k| k.trim().is_empty()) {
                return Err(RemedyError::InvalidConfig {
                    field: format!("classifier.patterns[{i}].keywords"),
                    message: "at least one keyword is required".into(),
                });
            }
        }
        if self.email.enabled && self.email.relay_url.is_empty() {
            return Err(RemedyError::InvalidConfig {
                field: "email.relay_url".into(),
                message: "required when email is enabled".into(),
            });
        }
        Ok(())
    }

    /// The `tracing` filter directive matching `log_level`.
    pub fn log_filter(&self) -> &'static str {
        match self.log_level.trim().to_ascii_uppercase().as_str() {
            "DEBUG" => "debug",
            "WARNING" | "WARN" => "warn",
            "ERROR" | "CRITICAL" => "error",
            "TRACE" => "trace",
            _ => "info",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::{ActionTag, ErrorCategory};
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn defaults() {
        let config = AgentConfig::default();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.log_level, "INFO");
        assert_eq!(config.llm.api_version, "2024-02-15-preview");
        assert_eq!(config.classifier.patterns.len(), 6);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn parse_partial_toml() {
        let config = AgentConfig::from_toml_str(
            r#"
            max_retries = 5

            [jobs]
            workspace_url = "https://adb-1.azuredatabricks.net"

            [[classifier.patterns]]
            category = "resource"
            keywords = ["executor lost"]
            action = "retry_with_new_params"
            priority = "high"
            "#,
        )
        .unwrap();

        assert_eq!(config.max_retries, 5);
        assert_eq!(config.jobs.workspace_url, "https://adb-1.azuredatabricks.net");
        assert_eq!(config.classifier.patterns.len(), 1);
        assert_eq!(config.classifier.patterns[0].category, ErrorCategory::Resource);
        assert_eq!(config.classifier.patterns[0].action, ActionTag::RetryWithNewParams);
        assert_eq!(config.llm.model, "gpt-4");
    }

    #[test]
    fn load_missing_file() {
        let err = AgentConfig::load(Some(Path::new("/nonexistent/agent.toml"))).unwrap_err();
        assert!(matches!(err, RemedyError::ConfigNotFound(_)));
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "log_level = \"DEBUG\"").unwrap();
        let config = AgentConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.log_filter(), "debug");
    }

    #[test]
    fn load_invalid_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "max_retries = [").unwrap();
        let err = AgentConfig::load(Some(file.path())).unwrap_err();
        assert!(matches!(err, RemedyError::ConfigParse(_)));
    }

    #[test]
    fn overrides_from_lookup() {
        let env: HashMap<&str, &str> = [
            ("AZURE_OPENAI_API_KEY", "k"),
            ("AZURE_OPENAI_DEPLOYMENT", "gpt4-prod"),
            ("DATABRICKS_PAT_TOKEN", "dapi123"),
            ("DATABRICKS_CLUSTER_ID", "0101-abc"),
            ("EMAIL_ENABLED", "TRUE"),
            ("EMAIL_RECIPIENTS", "a@x.io, b@x.io,"),
            ("MAX_RETRIES", "5"),
        ]
        .into_iter()
        .collect();

        let config = AgentConfig::default()
            .with_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.llm.api_key, "k");
        assert_eq!(config.llm.deployment, "gpt4-prod");
        assert_eq!(config.jobs.token, "dapi123");
        assert_eq!(config.jobs.cluster_id.as_deref(), Some("0101-abc"));
        assert!(config.email.enabled);
        assert_eq!(config.email.recipients, vec!["a@x.io", "b@x.io"]);
        assert_eq!(config.max_retries, 5);
    }

    #[test]
    fn bad_number_override_is_ignored() {
        let config = AgentConfig::default().with_overrides(|key| {
            (key == "MAX_RETRIES").then(|| "lots".to_string())
        });
        assert_eq!(config.max_retries, 3);
    }

    #[test]
    fn validate_rejects_zero_retries() {
        let config = AgentConfig {
            max_retries: 0,
            ..AgentConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("max_retries"));
    }

    #[test]
    fn validate_rejects_empty_keywords() {
        let mut config = AgentConfig::default();
        config.classifier.patterns[2].keywords = vec!["  ".into()];
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("classifier.patterns[2].keywords"));
    }

    #[test]
    fn validate_requires_relay_when_enabled() {
        let mut config = AgentConfig::default();
        config.email.enabled = true;
        assert!(config.validate().is_err());
    }
}
