//! Score to verdict mapping.

use vdetect_models::{DetailedScores, InferenceScore, Verdict};

/// Fake probability above which a sequence is called a deepfake.
pub const DEFAULT_THRESHOLD: f32 = 0.5;

/// Deterministic, monotonic mapping from class probabilities to a verdict.
///
/// `confidence` is the fake probability clamped to `[0, 1]`; a video is a
/// deepfake iff it strictly exceeds the threshold. Non-finite scores map to
/// confidence 0.
#[derive(Debug, Clone, Copy)]
pub struct ResultAggregator {
    threshold: f32,
}

impl Default for ResultAggregator {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
        }
    }
}

impl ResultAggregator {
    pub fn new(threshold: f32) -> Self {
        let threshold = if threshold.is_finite() {
            threshold.clamp(0.0, 1.0)
        } else {
            DEFAULT_THRESHOLD
        };
        Self { threshold }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn verdict(&self, score: &InferenceScore) -> Verdict {
        let confidence = clamp_probability(score.fake_probability);
        Verdict {
            is_deepfake: confidence > self.threshold,
            confidence,
        }
    }

    /// Per-class detail reported beside the verdict.
    pub fn detailed_scores(&self, score: &InferenceScore) -> DetailedScores {
        DetailedScores {
            real_score: clamp_probability(score.real_probability),
            fake_score: clamp_probability(score.fake_probability),
            confidence: self.verdict(score).confidence,
        }
    }
}

fn clamp_probability(p: f32) -> f32 {
    if p.is_nan() {
        0.0
    } else {
        p.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_is_exclusive() {
        let aggregator = ResultAggregator::default();
        let at = aggregator.verdict(&InferenceScore::from_fake_probability(0.5));
        assert!(!at.is_deepfake);

        let above = aggregator.verdict(&InferenceScore::from_fake_probability(0.5001));
        assert!(above.is_deepfake);
    }

    #[test]
    fn test_confidence_is_clamped() {
        let aggregator = ResultAggregator::default();
        assert_eq!(aggregator.verdict(&InferenceScore::new(0.0, 1.7)).confidence, 1.0);
        assert_eq!(aggregator.verdict(&InferenceScore::new(1.0, -0.2)).confidence, 0.0);
        assert_eq!(aggregator.verdict(&InferenceScore::new(0.0, f32::NAN)).confidence, 0.0);
    }

    #[test]
    fn test_monotonic_in_score() {
        let aggregator = ResultAggregator::default();
        let mut previous = f32::NEG_INFINITY;
        let mut was_fake = false;
        for step in -20..=120 {
            let verdict = aggregator.verdict(&InferenceScore::from_fake_probability(step as f32 / 100.0));
            assert!(verdict.confidence >= previous);
            // once fake, always fake as the score grows
            assert!(!was_fake || verdict.is_deepfake);
            previous = verdict.confidence;
            was_fake = verdict.is_deepfake;
        }
    }

    #[test]
    fn test_deterministic() {
        let aggregator = ResultAggregator::new(0.7);
        let score = InferenceScore::new(0.25, 0.75);
        assert_eq!(aggregator.verdict(&score), aggregator.verdict(&score));
        assert!(aggregator.verdict(&score).is_deepfake);
        assert_eq!(ResultAggregator::new(f32::NAN).threshold(), DEFAULT_THRESHOLD);
    }
}
