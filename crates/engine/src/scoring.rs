use common::types::{Match, Outcome, ScoreLine};

use crate::error::{PoolError, Result};

/// How a prediction fared against the final result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScoreKind {
    /// Both home and away goals exactly right.
    ExactScore,
    /// Draw predicted, draw happened, goals differ.
    CorrectTie,
    /// Right winner, wrong goals.
    CorrectOutcome,
    Miss,
}

impl ScoreKind {
    pub const fn points(self) -> u32 {
        match self {
            Self::ExactScore => 5,
            Self::CorrectTie => 3,
            Self::CorrectOutcome => 2,
            Self::Miss => 0,
        }
    }

    pub fn from_points(points: u32) -> Option<Self> {
        match points {
            5 => Some(Self::ExactScore),
            3 => Some(Self::CorrectTie),
            2 => Some(Self::CorrectOutcome),
            0 => Some(Self::Miss),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ExactScore => "exact_score",
            Self::CorrectTie => "correct_tie",
            Self::CorrectOutcome => "correct_outcome",
            Self::Miss => "miss",
        }
    }
}

/// First matching rule wins: exact, both draws, same outcome, otherwise a miss.
pub fn classify(prediction: ScoreLine, result: ScoreLine) -> ScoreKind {
    if prediction == result {
        return ScoreKind::ExactScore;
    }
    match (prediction.outcome(), result.outcome()) {
        (Outcome::Draw, Outcome::Draw) => ScoreKind::CorrectTie,
        (predicted, actual) if predicted == actual => ScoreKind::CorrectOutcome,
        _ => ScoreKind::Miss,
    }
}

/// Points for a prediction against a final result. Always one of 0, 2, 3, 5.
pub fn score(prediction: ScoreLine, result: ScoreLine) -> u32 {
    classify(prediction, result).points()
}

/// Scores against a match, which must already carry its result.
pub fn score_match(prediction: ScoreLine, m: &Match) -> Result<u32> {
    let result = m.result.ok_or_else(|| PoolError::ResultMissing {
        match_id: m.id.clone(),
    })?;
    Ok(score(prediction, result))
}

/// Validates raw user input into a score line.
pub fn parse_prediction(home: i64, away: i64) -> Result<ScoreLine> {
    ScoreLine::from_signed(home, away).ok_or_else(|| PoolError::InvalidPrediction {
        reason: format!("scores must be non-negative integers, got {home}-{away}"),
    })
}
