/// Score history across completed iterations.
///
/// Timed-out and failed iterations are not recorded. Plateau detection is
/// an advisory signal; it only terminates the loop when the caller opts in
/// through `LoopConfig.plateau`.
#[derive(Debug, Default, Clone)]
pub struct TrendTracker {
    scores: Vec<f64>,
}

impl TrendTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, score: f64) {
        self.scores.push(score);
    }

    pub fn scores(&self) -> &[f64] {
        &self.scores
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    /// Change from the previous score to the score at position `i`
    /// (0-based). None for the first score or out-of-range positions.
    pub fn delta(&self, i: usize) -> Option<f64> {
        if i == 0 || i >= self.scores.len() {
            return None;
        }
        Some(self.scores[i] - self.scores[i - 1])
    }

    /// Most recent delta, if at least two scores are recorded
    pub fn latest_delta(&self) -> Option<f64> {
        self.delta(self.scores.len().checked_sub(1)?)
    }

    /// Net change from the first to the latest score
    pub fn improvement(&self) -> f64 {
        match (self.scores.first(), self.scores.last()) {
            (Some(first), Some(last)) if self.scores.len() >= 2 => last - first,
            _ => 0.0,
        }
    }

    /// True when every |delta| among the last `window` scores is below
    /// `min_delta`. False until `window` scores have been recorded.
    pub fn is_plateaued(&self, window: usize, min_delta: f64) -> bool {
        if window < 2 || self.scores.len() < window {
            return false;
        }
        let tail = &self.scores[self.scores.len() - window..];
        tail.windows(2)
            .map(|pair| (pair[1] - pair[0]).abs())
            .fold(0.0_f64, f64::max)
            < min_delta
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker(scores: &[f64]) -> TrendTracker {
        let mut t = TrendTracker::new();
        for &s in scores {
            t.record(s);
        }
        t
    }

    #[test]
    fn test_delta_undefined_for_first_score() {
        let t = tracker(&[40.0, 72.0, 55.0]);
        assert_eq!(t.delta(0), None);
        assert_eq!(t.delta(1), Some(32.0));
        assert_eq!(t.delta(2), Some(-17.0));
        assert_eq!(t.delta(3), None);
    }

    #[test]
    fn test_latest_delta() {
        assert_eq!(tracker(&[]).latest_delta(), None);
        assert_eq!(tracker(&[50.0]).latest_delta(), None);
        assert_eq!(tracker(&[50.0, 58.0]).latest_delta(), Some(8.0));
    }

    #[test]
    fn test_improvement() {
        assert_eq!(tracker(&[]).improvement(), 0.0);
        assert_eq!(tracker(&[70.0]).improvement(), 0.0);
        assert_eq!(tracker(&[70.0, 75.0, 78.0]).improvement(), 8.0);
    }

    #[test]
    fn test_plateau_detection() {
        let t = tracker(&[50.0, 70.0, 70.4, 70.2]);
        assert!(t.is_plateaued(3, 1.0));
        // The jump from 50 to 70 is inside a window of 4
        assert!(!t.is_plateaued(4, 1.0));
    }

    #[test]
    fn test_plateau_needs_full_window() {
        let t = tracker(&[70.0, 70.1]);
        assert!(!t.is_plateaued(3, 1.0));
    }
}
