//! Rule-set files.
//!
//! A rule set is a JSON or TOML document with a `name` and an ordered
//! `rules` list. The envelope is checked strictly at load time; individual
//! rules are built leniently (see [`Rule::from_value`]).

use std::path::Path;

use remedy_types::{RemedyError, Result};
use serde_json::Value as Json;

use crate::rules::Rule;

#[derive(Debug, Clone, PartialEq)]
pub struct RuleSet {
    pub name: String,
    pub version: Option<String>,
    pub description: Option<String>,
    pub rules: Vec<Rule>,
}

/// Scalar metadata rendered as text, so `version = 1` and `version = "1"` agree.
fn scalar_text(value: Option<&Json>) -> Option<String> {
    match value? {
        Json::String(s) => Some(s.clone()),
        Json::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

impl RuleSet {
    /// Load a rule set. Files ending in `.toml` are read as TOML, everything
    /// else as JSON.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(RemedyError::ConfigNotFound(path.to_path_buf()));
        }
        let text = std::fs::read_to_string(path)?;
        if text.trim().is_empty() {
            return Err(RemedyError::ConfigParse(format!(
                "configuration file is empty: {}",
                path.display()
            )));
        }

        let is_toml = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
        let rule_set = if is_toml {
            Self::from_toml_str(&text)?
        } else {
            Self::from_json_str(&text)?
        };
        tracing::info!(path = %path.display(), name = %rule_set.name, rules = rule_set.rules.len(), "Parsed rule set");
        Ok(rule_set)
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        let value: Json =
            serde_json::from_str(text).map_err(|e| RemedyError::ConfigParse(e.to_string()))?;
        Self::from_value(&value)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let value: Json =
            toml::from_str(text).map_err(|e| RemedyError::ConfigParse(e.to_string()))?;
        Self::from_value(&value)
    }

    pub fn from_value(value: &Json) -> Result<Self> {
        let object = value.as_object().ok_or_else(|| {
            RemedyError::ConfigParse("rule set must be a mapping at the top level".to_string())
        })?;

        let name = match object.get("name") {
            None | Some(Json::Null) => return Err(RemedyError::MissingKey("name".to_string())),
            Some(other) => scalar_text(Some(other)).ok_or_else(|| RemedyError::InvalidConfig {
                field: "name".to_string(),
                message: "must be a string".to_string(),
            })?,
        };
        let rules = match object.get("rules") {
            None => return Err(RemedyError::MissingKey("rules".to_string())),
            Some(Json::Array(items)) => items.iter().map(Rule::from_value).collect(),
            Some(_) => {
                return Err(RemedyError::InvalidConfig {
                    field: "rules".to_string(),
                    message: "'rules' must be a list".to_string(),
                })
            }
        };

        Ok(Self {
            name,
            version: scalar_text(object.get("version")),
            description: scalar_text(object.get("description")),
            rules,
        })
    }
}
