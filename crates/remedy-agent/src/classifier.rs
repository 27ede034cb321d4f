//! Keyword classifier for job failure messages.
//!
//! Categories are checked in table order and the first category with any
//! keyword contained in the message wins.

use serde::{Deserialize, Serialize};

use crate::decision::{ActionTag, ErrorCategory, PatternMatch, Priority};

/// One row of the classification table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternRule {
    pub category: ErrorCategory,
    pub keywords: Vec<String>,
    pub action: ActionTag,
    pub priority: Priority,
}

impl PatternRule {
    pub fn new(
        category: ErrorCategory,
        keywords: &[&str],
        action: ActionTag,
        priority: Priority,
    ) -> Self {
        Self {
            category,
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            action,
            priority,
        }
    }
}

/// The built-in table. Order matters: "timeout" appears under both timeout
/// and network, and the earlier row wins.
pub fn default_patterns() -> Vec<PatternRule> {
    vec![
        PatternRule::new(
            ErrorCategory::Timeout,
            &["timeout", "timed out", "deadline exceeded"],
            ActionTag::Retry,
            Priority::Medium,
        ),
        PatternRule::new(
            ErrorCategory::Resource,
            &[
                "out of memory",
                "disk space",
                "resource exhausted",
                "insufficient resources",
            ],
            ActionTag::RetryWithNewParams,
            Priority::High,
        ),
        PatternRule::new(
            ErrorCategory::Permission,
            &["permission denied", "access denied", "unauthorized", "forbidden"],
            ActionTag::SendEmail,
            Priority::Critical,
        ),
        PatternRule::new(
            ErrorCategory::Syntax,
            &["syntax error", "invalid", "parse error", "compilation failed"],
            ActionTag::SendEmail,
            Priority::Critical,
        ),
        PatternRule::new(
            ErrorCategory::Network,
            &[
                "connection refused",
                "network error",
                "timeout",
                "connection reset",
            ],
            ActionTag::Retry,
            Priority::High,
        ),
        PatternRule::new(
            ErrorCategory::Data,
            &["no such file", "file not found", "not found", "does not exist"],
            ActionTag::SendEmail,
            Priority::Critical,
        ),
    ]
}

#[derive(Debug, Clone)]
pub struct ErrorClassifier {
    patterns: Vec<PatternRule>,
}

impl ErrorClassifier {
    /// Keywords are lower-cased here so matching only folds the message.
    pub fn new(patterns: Vec<PatternRule>) -> Self {
        let patterns = patterns
            .into_iter()
            .map(|mut rule| {
                rule.keywords = rule
                    .keywords
                    .iter()
                    .map(|k| k.to_lowercase())
                    .filter(|k| !k.is_empty())
                    .collect();
                rule
            })
            .collect();
        Self { patterns }
    }

    pub fn patterns(&self) -> &[PatternRule] {
        &self.patterns
    }

    pub fn classify(&self, message: &str) -> PatternMatch {
        let haystack = message.to_lowercase();
        for rule in &self.patterns {
            if let Some(keyword) = rule.keywords.iter().find(|k| haystack.contains(k.as_str())) {
                return PatternMatch {
                    category: rule.category,
                    action: rule.action,
                    priority: rule.priority,
                    matched_keyword: Some(keyword.clone()),
                };
            }
        }
        PatternMatch::unmatched()
    }
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        Self::new(default_patterns())
    }
}
