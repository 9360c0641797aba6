use serde::{Deserialize, Serialize};

/// Severity of a feedback issue
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "critical" => Ok(Severity::Critical),
            "high" => Ok(Severity::High),
            "medium" => Ok(Severity::Medium),
            "low" => Ok(Severity::Low),
            "info" => Ok(Severity::Info),
            _ => Err(format!("Unknown severity: {}", s)),
        }
    }
}

/// Category an issue belongs to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueCategory {
    CodeQuality,
    Functionality,
    Performance,
    Security,
    Maintainability,
    Style,
    /// Evaluators are arbitrary; unknown categories are preserved verbatim
    #[serde(untagged)]
    Other(String),
}

impl std::str::FromStr for IssueCategory {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_lowercase().as_str() {
            "code_quality" | "quality" => IssueCategory::CodeQuality,
            "functionality" | "correctness" => IssueCategory::Functionality,
            "performance" => IssueCategory::Performance,
            "security" => IssueCategory::Security,
            "maintainability" => IssueCategory::Maintainability,
            "style" => IssueCategory::Style,
            _ => IssueCategory::Other(s.to_string()),
        })
    }
}

/// A single issue raised by the evaluator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackIssue {
    pub category: IssueCategory,
    pub severity: Severity,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    /// Free-form location hint (file, line, section)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

impl FeedbackIssue {
    pub fn new(category: IssueCategory, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            category,
            severity,
            message: message.into(),
            suggestion: None,
            location: None,
        }
    }
}

/// Named quality sub-scores, each in [0, 100]. Advisory only; termination
/// decisions use `StructuredFeedback::score`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityMetrics {
    pub complexity: f64,
    pub maintainability: f64,
    pub readability: f64,
    pub test_coverage: f64,
    pub performance: f64,
    pub security: f64,
}

impl QualityMetrics {
    /// Average of all sub-scores
    pub fn overall(&self) -> f64 {
        let scores = [
            self.complexity,
            self.maintainability,
            self.readability,
            self.test_coverage,
            self.performance,
            self.security,
        ];
        scores.iter().sum::<f64>() / scores.len() as f64
    }

    pub fn clamped(mut self) -> Self {
        self.complexity = clamp_score(self.complexity);
        self.maintainability = clamp_score(self.maintainability);
        self.readability = clamp_score(self.readability);
        self.test_coverage = clamp_score(self.test_coverage);
        self.performance = clamp_score(self.performance);
        self.security = clamp_score(self.security);
        self
    }
}

/// Clamp a score into [0, 100]; NaN maps to 0
pub fn clamp_score(score: f64) -> f64 {
    if score.is_nan() {
        0.0
    } else {
        score.clamp(0.0, 100.0)
    }
}

/// Normalized evaluator output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredFeedback {
    /// Overall quality score in [0, 100]
    pub score: f64,
    #[serde(default)]
    pub metrics: QualityMetrics,
    #[serde(default)]
    pub issues: Vec<FeedbackIssue>,
    #[serde(default)]
    pub positives: Vec<String>,
    #[serde(default)]
    pub summary: String,
    /// When true the other fields are best-effort defaults and `summary`
    /// retains the raw evaluator output for diagnosis
    #[serde(default)]
    pub parse_failed: bool,
}

impl Default for StructuredFeedback {
    fn default() -> Self {
        Self {
            score: 0.0,
            metrics: QualityMetrics::default(),
            issues: Vec::new(),
            positives: Vec::new(),
            summary: String::new(),
            parse_failed: false,
        }
    }
}

impl StructuredFeedback {
    pub fn with_score(score: f64) -> Self {
        Self {
            score: clamp_score(score),
            ..Default::default()
        }
    }

    /// Fallback feedback for output nothing could interpret
    pub fn unparsed(raw: impl Into<String>) -> Self {
        Self {
            summary: raw.into(),
            parse_failed: true,
            ..Default::default()
        }
    }

    pub fn meets_threshold(&self, threshold: f64) -> bool {
        self.score >= threshold
    }

    /// Critical and high severity issues only
    pub fn critical_issues(&self) -> impl Iterator<Item = &FeedbackIssue> {
        self.issues
            .iter()
            .filter(|i| matches!(i.severity, Severity::Critical | Severity::High))
    }

    /// Render the feedback as a prompt section for the next improver call
    pub fn to_prompt(&self) -> String {
        let mut out = format!("Review feedback (score: {:.1}/100)\n", self.score);

        if !self.positives.is_empty() {
            out.push_str("\nWhat works well:\n");
            for p in &self.positives {
                out.push_str(&format!("- {}\n", p));
            }
        }

        if !self.issues.is_empty() {
            out.push_str("\nIssues to address:\n");
            for issue in &self.issues {
                out.push_str(&format!("- [{:?}] {}\n", issue.severity, issue.message));
                if let Some(ref suggestion) = issue.suggestion {
                    out.push_str(&format!("  Suggestion: {}\n", suggestion));
                }
                if let Some(ref location) = issue.location {
                    out.push_str(&format!("  Location: {}\n", location));
                }
            }
        }

        if !self.summary.is_empty() {
            out.push_str(&format!("\nSummary: {}\n", self.summary));
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_score_bounds() {
        assert_eq!(clamp_score(-5.0), 0.0);
        assert_eq!(clamp_score(150.0), 100.0);
        assert_eq!(clamp_score(42.5), 42.5);
        assert_eq!(clamp_score(f64::NAN), 0.0);
    }

    #[test]
    fn test_metrics_overall() {
        let metrics = QualityMetrics {
            complexity: 60.0,
            maintainability: 60.0,
            readability: 60.0,
            test_coverage: 60.0,
            performance: 60.0,
            security: 60.0,
        };
        assert!((metrics.overall() - 60.0).abs() < 1e-9);
    }

    #[test]
    fn test_meets_threshold() {
        let feedback = StructuredFeedback::with_score(85.0);
        assert!(feedback.meets_threshold(85.0));
        assert!(!feedback.meets_threshold(85.1));
    }

    #[test]
    fn test_critical_issues_filter() {
        let mut feedback = StructuredFeedback::with_score(50.0);
        feedback.issues = vec![
            FeedbackIssue::new(IssueCategory::Security, Severity::Critical, "sql injection"),
            FeedbackIssue::new(IssueCategory::Style, Severity::Low, "naming"),
            FeedbackIssue::new(IssueCategory::Functionality, Severity::High, "off by one"),
        ];
        assert_eq!(feedback.critical_issues().count(), 2);
    }

    #[test]
    fn test_unparsed_keeps_raw_output() {
        let feedback = StructuredFeedback::unparsed("garbled ~~ output");
        assert!(feedback.parse_failed);
        assert_eq!(feedback.score, 0.0);
        assert_eq!(feedback.summary, "garbled ~~ output");
    }

    #[test]
    fn test_to_prompt_includes_issues() {
        let mut feedback = StructuredFeedback::with_score(70.0);
        feedback.issues = vec![FeedbackIssue {
            category: IssueCategory::Functionality,
            severity: Severity::High,
            message: "missing error handling".into(),
            suggestion: Some("wrap in Result".into()),
            location: Some("src/main.rs:42".into()),
        }];
        feedback.positives = vec!["clear structure".into()];
        let prompt = feedback.to_prompt();
        assert!(prompt.contains("70.0/100"));
        assert!(prompt.contains("missing error handling"));
        assert!(prompt.contains("wrap in Result"));
        assert!(prompt.contains("clear structure"));
    }
}
