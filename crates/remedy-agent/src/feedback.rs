//! Feedback on past decisions and training-data export for model tuning.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

use chrono::{DateTime, Utc};
use remedy_llm::Message;
use remedy_types::Result;
use serde::{Deserialize, Serialize};
use serde_json::json;

/// A past failure together with the decision that was judged correct.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingSample {
    pub error_message: String,
    pub context: serde_json::Value,
    pub decision: String,
    pub error_category: Option<String>,
    pub root_cause: Option<String>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingExample {
    pub messages: Vec<Message>,
}

impl TrainingExample {
    pub fn from_sample(sample: &TrainingSample) -> Self {
        let context = if sample.context.is_null() {
            json!({})
        } else {
            sample.context.clone()
        };
        let answer = json!({
            "recommendation": sample.decision,
            "error_category": sample.error_category,
            "root_cause": sample.root_cause,
            "reason": sample.reason,
        });
        Self {
            messages: vec![
                Message::system("You are an experienced DevOps engineer who diagnoses failed data pipeline jobs."),
                Message::user(format!(
                    "Analyze this error: {}\n\nContext: {context}",
                    sample.error_message
                )),
                Message::assistant(answer.to_string()),
            ],
        }
    }
}

/// Write one chat-format example per line. Returns the number written.
pub fn prepare_training_data(samples: &[TrainingSample], path: &Path) -> Result<usize> {
    let mut file = std::io::BufWriter::new(std::fs::File::create(path)?);
    for sample in samples {
        let line = serde_json::to_string(&TrainingExample::from_sample(sample))?;
        writeln!(file, "{line}")?;
    }
    file.flush()?;
    tracing::info!(count = samples.len(), path = %path.display(), "Training data written");
    Ok(samples.len())
}

// ---------------------------------------------------------------------------
// Feedback
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackRecord {
    pub decision_id: String,
    pub timestamp: DateTime<Utc>,
    pub original_decision: String,
    pub actual_outcome: String,
    pub feedback: Option<String>,
    pub useful: bool,
}

impl FeedbackRecord {
    pub fn new(
        decision_id: impl Into<String>,
        original_decision: impl Into<String>,
        actual_outcome: impl Into<String>,
        feedback: Option<String>,
    ) -> Self {
        let original_decision = original_decision.into();
        let actual_outcome = actual_outcome.into();
        Self {
            decision_id: decision_id.into(),
            timestamp: Utc::now(),
            useful: original_decision == actual_outcome,
            original_decision,
            actual_outcome,
            feedback,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionStats {
    pub total: usize,
    pub correct: usize,
    pub accuracy: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceReport {
    pub total_decisions: usize,
    pub correct_decisions: usize,
    pub accuracy_percentage: f64,
    pub decision_breakdown: BTreeMap<String, DecisionStats>,
}

fn percentage(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    let pct = part as f64 / whole as f64 * 100.0;
    (pct * 100.0).round() / 100.0
}

/// `None` when there is no feedback to analyze.
pub fn analyze_performance(records: &[FeedbackRecord]) -> Option<PerformanceReport> {
    if records.is_empty() {
        return None;
    }

    let mut counts: BTreeMap<String, (usize, usize)> = BTreeMap::new();
    for record in records {
        let entry = counts.entry(record.original_decision.clone()).or_default();
        entry.0 += 1;
        if record.useful {
            entry.1 += 1;
        }
    }

    let correct = records.iter().filter(|r| r.useful).count();
    let report = PerformanceReport {
        total_decisions: records.len(),
        correct_decisions: correct,
        accuracy_percentage: percentage(correct, records.len()),
        decision_breakdown: counts
            .into_iter()
            .map(|(decision, (total, correct))| {
                (
                    decision,
                    DecisionStats {
                        total,
                        correct,
                        accuracy: percentage(correct, total),
                    },
                )
            })
            .collect(),
    };
    tracing::info!(accuracy = report.accuracy_percentage, "Decision performance analyzed");
    Some(report)
}

pub fn improvement_recommendations(report: &PerformanceReport) -> Vec<String> {
    let mut recommendations = Vec::new();
    let accuracy = report.accuracy_percentage;

    if accuracy < 70.0 {
        recommendations.push(
            "Accuracy is below 70%. Retrain on recent failures or revisit the classification table."
                .to_string(),
        );
    }
    for (decision, stats) in &report.decision_breakdown {
        if stats.accuracy < 60.0 {
            recommendations.push(format!(
                "Decision '{decision}' is right only {}% of the time. Review its training examples.",
                stats.accuracy
            ));
        }
    }
    if accuracy > 85.0 {
        recommendations
            .push("Accuracy is above 85%. Keep collecting feedback to hold that level.".to_string());
    }
    recommendations
}
