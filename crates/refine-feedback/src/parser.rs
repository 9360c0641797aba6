use serde_json::Value;
use tracing::debug;

use crate::model::{
    clamp_score, FeedbackIssue, IssueCategory, QualityMetrics, Severity, StructuredFeedback,
};

/// Synonyms evaluators use for the overall score key
const SCORE_KEYS: &[&str] = &["score", "quality_score", "rating", "overall_score"];
const ISSUE_KEYS: &[&str] = &["issues", "problems", "findings"];
const POSITIVE_KEYS: &[&str] = &["positives", "positive_aspects", "strengths"];
const SUGGESTION_KEYS: &[&str] = &["suggestions", "recommendations"];
const SUMMARY_KEYS: &[&str] = &["summary", "comments", "assessment"];
const METRICS_KEYS: &[&str] = &["metrics", "quality_metrics"];

/// Normalizes arbitrary evaluator output into [`StructuredFeedback`].
///
/// Total over all inputs: interpretations are tried in order (structured
/// match, key-mapped synonyms, heuristic text extraction) and the first
/// success wins. When nothing matches, the fallback preserves the raw
/// output with `parse_failed = true` and a zero score. Never panics.
pub struct FeedbackParser;

impl FeedbackParser {
    pub fn parse(raw: &Value) -> StructuredFeedback {
        if let Some(feedback) = Self::parse_structured(raw) {
            debug!("Parsed feedback via structured match");
            return feedback;
        }

        if let Some(feedback) = Self::parse_key_mapped(raw) {
            debug!("Parsed feedback via key mapping");
            return feedback;
        }

        if let Some(text) = raw.as_str() {
            if let Some(feedback) = Self::parse_heuristic_text(text) {
                debug!("Parsed feedback via text heuristics");
                return feedback;
            }
        }

        debug!("Feedback unparseable, using fallback");
        StructuredFeedback::unparsed(stringify(raw))
    }

    /// Convenience entry point for evaluators that return plain text
    pub fn parse_text(raw: &str) -> StructuredFeedback {
        Self::parse(&Value::String(raw.to_string()))
    }

    /// Raw already conforms to the StructuredFeedback shape
    fn parse_structured(raw: &Value) -> Option<StructuredFeedback> {
        if !raw.is_object() {
            return None;
        }
        let mut feedback: StructuredFeedback = serde_json::from_value(raw.clone()).ok()?;
        feedback.score = clamp_score(feedback.score);
        feedback.metrics = feedback.metrics.clamped();
        feedback.parse_failed = false;
        Some(feedback)
    }

    /// Loosely-typed mapping using known key synonyms
    fn parse_key_mapped(raw: &Value) -> Option<StructuredFeedback> {
        let obj = raw.as_object()?;

        let score = SCORE_KEYS
            .iter()
            .find_map(|k| obj.get(*k))
            .and_then(as_number)?;

        let mut feedback = StructuredFeedback::with_score(score);

        if let Some(metrics) = METRICS_KEYS.iter().find_map(|k| obj.get(*k)) {
            feedback.metrics = Self::map_metrics(metrics);
        }

        if let Some(issues) = ISSUE_KEYS
            .iter()
            .find_map(|k| obj.get(*k))
            .and_then(Value::as_array)
        {
            feedback.issues = issues.iter().filter_map(Self::map_issue).collect();
        }

        if let Some(suggestions) = SUGGESTION_KEYS
            .iter()
            .find_map(|k| obj.get(*k))
            .and_then(Value::as_array)
        {
            feedback
                .issues
                .extend(suggestions.iter().filter_map(Value::as_str).map(|s| {
                    FeedbackIssue {
                        category: IssueCategory::Other("suggestion".into()),
                        severity: Severity::Info,
                        message: s.to_string(),
                        suggestion: None,
                        location: None,
                    }
                }));
        }

        if let Some(positives) = POSITIVE_KEYS
            .iter()
            .find_map(|k| obj.get(*k))
            .and_then(Value::as_array)
        {
            feedback.positives = positives
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect();
        }

        if let Some(summary) = SUMMARY_KEYS
            .iter()
            .find_map(|k| obj.get(*k))
            .and_then(Value::as_str)
        {
            feedback.summary = summary.to_string();
        }

        Some(feedback)
    }

    /// Map a single issue entry: either a bare string or an object with
    /// message/description plus optional severity, category, suggestion,
    /// location fields
    fn map_issue(value: &Value) -> Option<FeedbackIssue> {
        if let Some(text) = value.as_str() {
            return Some(FeedbackIssue::new(
                IssueCategory::CodeQuality,
                Severity::Medium,
                text,
            ));
        }

        let obj = value.as_object()?;
        let message = ["message", "description", "text"]
            .iter()
            .find_map(|k| obj.get(*k))
            .and_then(Value::as_str)?
            .to_string();

        let severity = obj
            .get("severity")
            .and_then(Value::as_str)
            .and_then(|s| s.parse().ok())
            .unwrap_or(Severity::Medium);

        let category = ["category", "type"]
            .iter()
            .find_map(|k| obj.get(*k))
            .and_then(Value::as_str)
            .map(|s| s.parse().unwrap_or(IssueCategory::CodeQuality))
            .unwrap_or(IssueCategory::CodeQuality);

        Some(FeedbackIssue {
            category,
            severity,
            message,
            suggestion: obj
                .get("suggestion")
                .and_then(Value::as_str)
                .map(str::to_string),
            location: ["location", "line", "file"]
                .iter()
                .find_map(|k| obj.get(*k))
                .map(|v| match v.as_str() {
                    Some(s) => s.to_string(),
                    None => v.to_string(),
                }),
        })
    }

    /// Accept both our metric names and the `*_score` variants evaluators
    /// commonly emit
    fn map_metrics(value: &Value) -> QualityMetrics {
        let get = |names: &[&str]| -> f64 {
            names
                .iter()
                .find_map(|n| value.get(*n))
                .and_then(as_number)
                .map(clamp_score)
                .unwrap_or(0.0)
        };

        QualityMetrics {
            complexity: get(&["complexity", "complexity_score"]),
            maintainability: get(&["maintainability", "maintainability_score"]),
            readability: get(&["readability", "readability_score"]),
            test_coverage: get(&["test_coverage", "coverage"]),
            performance: get(&["performance", "performance_score"]),
            security: get(&["security", "security_score"]),
        }
    }

    /// Free-text feedback: pattern rules for an explicit score plus bullet
    /// and suggestion lines. Returns None when the text carries no signal
    /// at all, so the caller falls through to the unparsed branch.
    fn parse_heuristic_text(text: &str) -> Option<StructuredFeedback> {
        if text.trim().is_empty() {
            return None;
        }

        let explicit_score = find_score(text);

        let mut issues = Vec::new();
        let mut positives = Vec::new();

        for line in text.lines() {
            let trimmed = line.trim();
            let bullet = trimmed
                .strip_prefix("- ")
                .or_else(|| trimmed.strip_prefix("* "))
                .or_else(|| trimmed.strip_prefix("• "));

            if let Some(item) = bullet {
                let lower = item.to_lowercase();
                if POSITIVE_WORDS.iter().any(|w| lower.contains(w)) {
                    positives.push(item.to_string());
                } else {
                    issues.push(FeedbackIssue::new(
                        categorize_line(&lower),
                        severity_of_line(&lower),
                        item,
                    ));
                }
            } else if is_suggestion_line(trimmed) {
                issues.push(FeedbackIssue {
                    category: IssueCategory::Other("suggestion".into()),
                    severity: Severity::Info,
                    message: trimmed.to_string(),
                    suggestion: None,
                    location: None,
                });
            }
        }

        let score = match explicit_score {
            Some(s) => s,
            None => {
                // Keyword-weighted estimate, only meaningful if the text
                // actually mentions quality at all
                let lower = text.to_lowercase();
                let pos = POSITIVE_WORDS.iter().filter(|w| lower.contains(*w)).count();
                let neg = NEGATIVE_WORDS.iter().filter(|w| lower.contains(*w)).count();
                if pos == 0 && neg == 0 && issues.is_empty() && positives.is_empty() {
                    return None;
                }
                clamp_score(70.0 + pos as f64 * 5.0 - neg as f64 * 10.0)
            }
        };

        let mut feedback = StructuredFeedback::with_score(score);
        feedback.issues = issues;
        feedback.positives = positives;
        feedback.summary = summarize(text);
        Some(feedback)
    }
}

const POSITIVE_WORDS: &[&str] = &["good", "excellent", "well", "clear", "efficient", "solid"];
const NEGATIVE_WORDS: &[&str] = &["bad", "poor", "unclear", "inefficient", "insecure", "broken"];

fn is_suggestion_line(line: &str) -> bool {
    let lower = line.to_lowercase();
    ["suggest", "recommend", "should", "consider", "improve"]
        .iter()
        .any(|w| lower.contains(w))
}

fn categorize_line(lower: &str) -> IssueCategory {
    if lower.contains("security") || lower.contains("vulnerab") {
        IssueCategory::Security
    } else if lower.contains("performance") || lower.contains("slow") {
        IssueCategory::Performance
    } else if lower.contains("style") || lower.contains("naming") || lower.contains("format") {
        IssueCategory::Style
    } else {
        IssueCategory::CodeQuality
    }
}

fn severity_of_line(lower: &str) -> Severity {
    if lower.contains("critical") || lower.contains("severe") {
        Severity::Critical
    } else {
        Severity::Medium
    }
}

/// Extract an explicit score from text: "Score: NN/100", "score = NN",
/// "NN/100", "NN out of 100"
fn find_score(text: &str) -> Option<f64> {
    let lower = text.to_lowercase();

    if let Some(pos) = lower.find("score") {
        if let Some(n) = first_number(&lower[pos + 5..], 30) {
            return Some(clamp_score(n));
        }
    }

    for marker in ["/100", " out of 100"] {
        if let Some(pos) = lower.find(marker) {
            if let Some(n) = last_number(&lower[..pos]) {
                return Some(clamp_score(n));
            }
        }
    }

    None
}

/// First number within `limit` bytes of the start of `s`
fn first_number(s: &str, limit: usize) -> Option<f64> {
    let window: String = s.chars().take(limit).collect();
    let start = window.find(|c: char| c.is_ascii_digit())?;
    let digits: String = window[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    digits.parse().ok()
}

/// Trailing number at the end of `s` (ignoring trailing spaces)
fn last_number(s: &str) -> Option<f64> {
    let tail: Vec<char> = s
        .trim_end()
        .chars()
        .rev()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    if tail.is_empty() {
        return None;
    }
    let digits: String = tail.into_iter().rev().collect();
    digits.parse().ok()
}

/// Numeric value, accepting numbers encoded as strings
fn as_number(v: &Value) -> Option<f64> {
    v.as_f64().or_else(|| v.as_str()?.trim().parse().ok())
}

/// First non-empty line, truncated, as a short summary
fn summarize(text: &str) -> String {
    let line = text.lines().find(|l| !l.trim().is_empty()).unwrap_or("");
    let line = line.trim();
    if line.chars().count() > 200 {
        let truncated: String = line.chars().take(200).collect();
        format!("{}...", truncated)
    } else {
        line.to_string()
    }
}

fn stringify(raw: &Value) -> String {
    match raw.as_str() {
        Some(s) => s.to_string(),
        None => raw.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_structured_shape() {
        let raw = json!({
            "score": 88.0,
            "metrics": {"complexity": 70.0, "maintainability": 80.0},
            "issues": [
                {"category": "security", "severity": "high", "message": "unvalidated input"}
            ],
            "positives": ["good naming"],
            "summary": "solid work"
        });

        let feedback = FeedbackParser::parse(&raw);
        assert!(!feedback.parse_failed);
        assert_eq!(feedback.score, 88.0);
        assert_eq!(feedback.issues.len(), 1);
        assert_eq!(feedback.issues[0].severity, Severity::High);
        assert_eq!(feedback.positives, vec!["good naming"]);
    }

    #[test]
    fn test_parse_structured_clamps_score() {
        let raw = json!({"score": 250.0, "summary": "x"});
        let feedback = FeedbackParser::parse(&raw);
        assert_eq!(feedback.score, 100.0);
        assert!(!feedback.parse_failed);
    }

    #[test]
    fn test_parse_key_mapped_synonyms() {
        let raw = json!({
            "quality_score": 72.5,
            "problems": ["no tests", {"description": "panics on empty input", "severity": "critical"}],
            "positive_aspects": ["fast"],
            "suggestions": ["add docs"],
            "quality_metrics": {"complexity_score": 65.0, "security_score": 90.0}
        });

        let feedback = FeedbackParser::parse(&raw);
        assert!(!feedback.parse_failed);
        assert_eq!(feedback.score, 72.5);
        assert_eq!(feedback.issues.len(), 3);
        assert_eq!(feedback.issues[1].severity, Severity::Critical);
        assert_eq!(feedback.positives, vec!["fast"]);
        assert_eq!(feedback.metrics.complexity, 65.0);
        assert_eq!(feedback.metrics.security, 90.0);
    }

    #[test]
    fn test_parse_text_with_explicit_score() {
        let text = "Overall assessment of the change.\nScore: 82/100\n- missing edge case handling\n- good use of iterators\n";
        let feedback = FeedbackParser::parse_text(text);
        assert!(!feedback.parse_failed);
        assert_eq!(feedback.score, 82.0);
        assert_eq!(feedback.issues.len(), 1);
        assert_eq!(feedback.positives.len(), 1);
    }

    #[test]
    fn test_parse_text_out_of_100() {
        let feedback = FeedbackParser::parse_text("I rate this 64 out of 100 overall.");
        assert_eq!(feedback.score, 64.0);
    }

    #[test]
    fn test_parse_text_keyword_estimate() {
        let feedback = FeedbackParser::parse_text("The code is well structured but has poor error messages.");
        assert!(!feedback.parse_failed);
        // base 70 + one positive - one negative
        assert_eq!(feedback.score, 65.0);
    }

    #[test]
    fn test_parse_empty_string_falls_back() {
        let feedback = FeedbackParser::parse_text("");
        assert!(feedback.parse_failed);
        assert_eq!(feedback.score, 0.0);
    }

    #[test]
    fn test_parse_unrelated_json_falls_back() {
        let raw = json!([1, 2, 3]);
        let feedback = FeedbackParser::parse(&raw);
        assert!(feedback.parse_failed);
        assert_eq!(feedback.score, 0.0);
        assert_eq!(feedback.summary, "[1,2,3]");
    }

    #[test]
    fn test_parse_prose_without_signal_falls_back() {
        let feedback = FeedbackParser::parse_text("The weather today features scattered rain.");
        assert!(feedback.parse_failed);
        assert_eq!(feedback.summary, "The weather today features scattered rain.");
    }

    #[test]
    fn test_parse_is_deterministic() {
        let raw = json!({
            "rating": 55,
            "issues": ["one", "two"],
            "summary": "needs work"
        });
        let a = FeedbackParser::parse(&raw);
        let b = FeedbackParser::parse(&raw);
        assert_eq!(a, b);
    }

    #[test]
    fn test_parse_never_panics_on_weird_values() {
        for raw in [
            json!(null),
            json!(true),
            json!(3.2),
            json!({"score": "not a number"}),
            json!({"issues": "not an array", "score": 10}),
            json!({"nested": {"deeply": {"score": 1}}}),
        ] {
            let feedback = FeedbackParser::parse(&raw);
            assert!(feedback.score >= 0.0 && feedback.score <= 100.0);
        }
    }
}
