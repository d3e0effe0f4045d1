//! Verdict and analysis result types.

use serde::{Deserialize, Serialize};

/// Binary authenticity verdict for one video.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    /// True when the fake probability exceeds the decision threshold
    pub is_deepfake: bool,
    /// Fake probability in `[0, 1]`
    pub confidence: f32,
}

impl Verdict {
    pub fn prediction(&self) -> Prediction {
        if self.is_deepfake {
            Prediction::Fake
        } else {
            Prediction::Real
        }
    }
}

/// Predicted class label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Prediction {
    Real,
    Fake,
}

impl Prediction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Prediction::Real => "REAL",
            Prediction::Fake => "FAKE",
        }
    }
}

impl std::fmt::Display for Prediction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Frame accounting for one analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionSummary {
    /// Decodable frames reported by the container
    pub total_frames: usize,
    /// Frames fed to the classifier (always the sequence length)
    pub processed_frames: usize,
    pub prediction: Prediction,
}

/// Per-class probabilities.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetailedScores {
    pub real_score: f32,
    pub fake_score: f32,
    pub confidence: f32,
}

/// Full result returned by `/analyze`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    #[serde(flatten)]
    pub verdict: Verdict,
    pub prediction_summary: PredictionSummary,
    pub detailed_scores: DetailedScores,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_serializes_flat_verdict() {
        let verdict = Verdict {
            is_deepfake: true,
            confidence: 0.75,
        };
        let result = AnalysisResult {
            verdict,
            prediction_summary: PredictionSummary {
                total_frames: 300,
                processed_frames: 20,
                prediction: verdict.prediction(),
            },
            detailed_scores: DetailedScores {
                real_score: 0.25,
                fake_score: 0.75,
                confidence: 0.75,
            },
        };

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["is_deepfake"], true);
        assert_eq!(json["confidence"], 0.75);
        assert_eq!(json["prediction_summary"]["prediction"], "FAKE");
        assert_eq!(json["detailed_scores"]["real_score"], 0.25);
    }
}
