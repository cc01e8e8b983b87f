use std::collections::HashMap;

use common::types::{LeaderboardEntry, Prediction};

use crate::scoring::ScoreKind;

/// One settled prediction, reduced to what the leaderboard needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoredPrediction {
    pub user_id: String,
    pub username: String,
    pub points: u32,
}

/// Sums points per user and ranks them.
///
/// Order: total points desc, then correct scores desc, then user id asc.
/// Ranks are 1..=N with no gaps and no shared ranks, even on equal points.
pub fn aggregate<I>(records: I) -> Vec<LeaderboardEntry>
where
    I: IntoIterator<Item = ScoredPrediction>,
{
    let mut by_user: HashMap<String, LeaderboardEntry> = HashMap::new();
    for r in records {
        let entry = by_user
            .entry(r.user_id.clone())
            .or_insert_with(|| LeaderboardEntry {
                user_id: r.user_id,
                username: r.username,
                points: 0,
                correct_scores: 0,
                correct_outcomes: 0,
                correct_ties: 0,
                rank: 0,
            });
        entry.points += r.points;
        match ScoreKind::from_points(r.points) {
            Some(ScoreKind::ExactScore) => entry.correct_scores += 1,
            Some(ScoreKind::CorrectTie) => entry.correct_ties += 1,
            Some(ScoreKind::CorrectOutcome) => entry.correct_outcomes += 1,
            Some(ScoreKind::Miss) | None => {}
        }
    }

    let mut entries: Vec<_> = by_user.into_values().collect();
    entries.sort_by(|a, b| {
        b.points
            .cmp(&a.points)
            .then_with(|| b.correct_scores.cmp(&a.correct_scores))
            .then_with(|| a.user_id.cmp(&b.user_id))
    });
    for (i, entry) in entries.iter_mut().enumerate() {
        entry.rank = u32::try_from(i + 1).unwrap_or(u32::MAX);
    }
    entries
}

/// Settled predictions as leaderboard input. Unsettled ones are skipped.
/// `username_of` falls back to the user id when it returns `None`.
pub fn scored_records<'a, I, F>(predictions: I, username_of: F) -> Vec<ScoredPrediction>
where
    I: IntoIterator<Item = &'a Prediction>,
    F: Fn(&str) -> Option<String>,
{
    predictions
        .into_iter()
        .filter_map(|p| {
            let points = p.points?;
            Some(ScoredPrediction {
                username: username_of(&p.user_id).unwrap_or_else(|| p.user_id.clone()),
                user_id: p.user_id.clone(),
                points,
            })
        })
        .collect()
}

/// Per-user profile summary across all of a user's predictions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PredictionStats {
    pub total: u32,
    pub settled: u32,
    pub points: u32,
    pub correct_scores: u32,
    pub correct_ties: u32,
    pub correct_outcomes: u32,
}

impl PredictionStats {
    pub fn from_predictions<'a, I>(predictions: I) -> Self
    where
        I: IntoIterator<Item = &'a Prediction>,
    {
        let mut stats = Self::default();
        for p in predictions {
            stats.total += 1;
            let Some(points) = p.points else { continue };
            stats.settled += 1;
            stats.points += points;
            match ScoreKind::from_points(points) {
                Some(ScoreKind::ExactScore) => stats.correct_scores += 1,
                Some(ScoreKind::CorrectTie) => stats.correct_ties += 1,
                Some(ScoreKind::CorrectOutcome) => stats.correct_outcomes += 1,
                Some(ScoreKind::Miss) | None => {}
            }
        }
        stats
    }

    /// `count` as a fraction of all predictions, 0.0 when there are none.
    pub fn share(&self, count: u32) -> f64 {
        f64::from(count) / f64::from(self.total.max(1))
    }
}
