use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use common::types::{Match, MatchStatus, Pool, Prediction, ScoreLine};
use tracing::{debug, info};

use crate::error::{PoolError, Result};
use crate::scoring;

/// All predictions, one per (user, match).
#[derive(Debug, Default)]
pub struct PredictionBook {
    by_key: BTreeMap<(String, String), Prediction>,
}

impl PredictionBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads an existing prediction as-is (fixtures, restores).
    pub fn insert(&mut self, p: Prediction) {
        self.by_key
            .insert((p.user_id.clone(), p.match_id.clone()), p);
    }

    /// Creates the user's prediction for `m`, or replaces its scores if one exists.
    /// Only allowed while the match is upcoming and before kickoff.
    pub fn submit(
        &mut self,
        user_id: &str,
        m: &Match,
        score: ScoreLine,
        now: DateTime<Utc>,
    ) -> Result<Prediction> {
        match m.status {
            MatchStatus::Finished => {
                return Err(PoolError::MatchAlreadyFinished {
                    match_id: m.id.clone(),
                })
            }
            MatchStatus::Live => {
                return Err(PoolError::MatchAlreadyStarted {
                    match_id: m.id.clone(),
                })
            }
            MatchStatus::Upcoming if !m.accepts_predictions_at(now) => {
                return Err(PoolError::MatchAlreadyStarted {
                    match_id: m.id.clone(),
                })
            }
            MatchStatus::Upcoming => {}
        }

        let key = (user_id.to_string(), m.id.clone());
        let (prediction, mode) = match self.by_key.get_mut(&key) {
            Some(existing) => {
                existing.score = score;
                existing.updated_at = Some(now);
                (existing.clone(), "replaced")
            }
            None => {
                let p = Prediction {
                    id: format!("pred_{}", uuid::Uuid::new_v4().simple()),
                    user_id: user_id.to_string(),
                    match_id: m.id.clone(),
                    score,
                    points: None,
                    created_at: now,
                    updated_at: None,
                };
                self.by_key.insert(key, p.clone());
                (p, "created")
            }
        };

        metrics::counter!("pool_predictions_submitted_total", "mode" => mode).increment(1);
        debug!(user_id, match_id = %m.id, score = %score, mode, "prediction saved");
        Ok(prediction)
    }

    pub fn get(&self, user_id: &str, match_id: &str) -> Option<&Prediction> {
        self.by_key
            .get(&(user_id.to_string(), match_id.to_string()))
    }

    pub fn all(&self) -> impl Iterator<Item = &Prediction> {
        self.by_key.values()
    }

    pub fn for_user<'a>(&'a self, user_id: &'a str) -> impl Iterator<Item = &'a Prediction> {
        self.by_key.values().filter(move |p| p.user_id == user_id)
    }

    pub fn for_match<'a>(&'a self, match_id: &'a str) -> impl Iterator<Item = &'a Prediction> {
        self.by_key.values().filter(move |p| p.match_id == match_id)
    }

    /// The user's predictions on the pool's matches, in pool match order.
    pub fn for_user_in_pool(&self, user_id: &str, pool: &Pool) -> Vec<&Prediction> {
        pool.matches
            .iter()
            .filter_map(|m| self.get(user_id, &m.id))
            .collect()
    }

    /// Stamps points on every unsettled prediction for a finished match.
    /// Returns how many were newly settled. Settled predictions never change.
    pub fn settle_match(&mut self, m: &Match) -> Result<usize> {
        let result = m.result.ok_or_else(|| PoolError::ResultMissing {
            match_id: m.id.clone(),
        })?;

        let mut settled = 0;
        for p in self
            .by_key
            .values_mut()
            .filter(|p| p.match_id == m.id && p.points.is_none())
        {
            let kind = scoring::classify(p.score, result);
            p.points = Some(kind.points());
            metrics::counter!("pool_predictions_scored_total", "kind" => kind.as_str())
                .increment(1);
            settled += 1;
        }
        info!(match_id = %m.id, result = %result, settled, "predictions settled");
        Ok(settled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use common::types::{League, PoolStatus};
    use rust_decimal::Decimal;

    fn kickoff() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 2, 25, 15, 0, 0).unwrap()
    }

    fn upcoming(id: &str) -> Match {
        Match {
            id: id.to_string(),
            league: League::PremierLeague,
            home_team: "Arsenal".to_string(),
            away_team: "Chelsea".to_string(),
            home_team_logo: None,
            away_team_logo: None,
            match_time: kickoff(),
            status: MatchStatus::Upcoming,
            result: None,
        }
    }

    fn finished(id: &str, result: ScoreLine) -> Match {
        Match {
            status: MatchStatus::Finished,
            result: Some(result),
            ..upcoming(id)
        }
    }

    fn before() -> DateTime<Utc> {
        kickoff() - Duration::hours(1)
    }

    #[test]
    fn test_submit_creates_then_replaces() {
        let mut book = PredictionBook::new();
        let m = upcoming("m1");
        let first = book.submit("1", &m, ScoreLine::new(2, 1), before()).unwrap();
        assert!(first.id.starts_with("pred_"));
        assert_eq!(first.updated_at, None);

        let later = before() + Duration::minutes(30);
        let second = book.submit("1", &m, ScoreLine::new(0, 0), later).unwrap();
        assert_eq!(second.id, first.id);
        assert_eq!(second.created_at, first.created_at);
        assert_eq!(second.score, ScoreLine::new(0, 0));
        assert_eq!(second.updated_at, Some(later));
        assert_eq!(book.all().count(), 1);
    }

    #[test]
    fn test_submit_rejected_at_or_after_kickoff() {
        let mut book = PredictionBook::new();
        let m = upcoming("m1");
        let err = book
            .submit("1", &m, ScoreLine::new(1, 0), kickoff())
            .unwrap_err();
        assert!(matches!(err, PoolError::MatchAlreadyStarted { .. }));
        assert!(book.get("1", "m1").is_none());
    }

    #[test]
    fn test_submit_rejected_for_live_and_finished() {
        let mut book = PredictionBook::new();
        let live = Match {
            status: MatchStatus::Live,
            ..upcoming("m1")
        };
        assert!(matches!(
            book.submit("1", &live, ScoreLine::new(1, 0), before()),
            Err(PoolError::MatchAlreadyStarted { .. })
        ));
        assert!(matches!(
            book.submit("1", &finished("m2", ScoreLine::new(1, 0)), ScoreLine::new(1, 0), before()),
            Err(PoolError::MatchAlreadyFinished { .. })
        ));
    }

    #[test]
    fn test_settle_match_scores_once() {
        let mut book = PredictionBook::new();
        let m = upcoming("m1");
        book.submit("1", &m, ScoreLine::new(2, 1), before()).unwrap();
        book.submit("2", &m, ScoreLine::new(1, 1), before()).unwrap();
        book.submit("3", &upcoming("m2"), ScoreLine::new(1, 1), before())
            .unwrap();

        let done = finished("m1", ScoreLine::new(2, 1));
        assert_eq!(book.settle_match(&done).unwrap(), 2);
        assert_eq!(book.get("1", "m1").unwrap().points, Some(5));
        assert_eq!(book.get("2", "m1").unwrap().points, Some(0));
        assert_eq!(book.get("3", "m2").unwrap().points, None);

        // A second settlement with a different result must not rewrite points.
        let tampered = finished("m1", ScoreLine::new(1, 1));
        assert_eq!(book.settle_match(&tampered).unwrap(), 0);
        assert_eq!(book.get("2", "m1").unwrap().points, Some(0));
    }

    #[test]
    fn test_settle_without_result_fails() {
        let mut book = PredictionBook::new();
        assert!(matches!(
            book.settle_match(&upcoming("m1")),
            Err(PoolError::ResultMissing { .. })
        ));
    }

    #[test]
    fn test_for_user_in_pool_follows_pool_order() {
        let mut book = PredictionBook::new();
        let (m1, m2, m3) = (upcoming("m1"), upcoming("m2"), upcoming("m3"));
        book.submit("1", &m2, ScoreLine::new(1, 0), before()).unwrap();
        book.submit("1", &m1, ScoreLine::new(0, 1), before()).unwrap();
        book.submit("1", &m3, ScoreLine::new(3, 3), before()).unwrap();
        book.submit("2", &m1, ScoreLine::new(2, 2), before()).unwrap();

        let pool = Pool {
            id: "p1".to_string(),
            name: "Premier League Week 26".to_string(),
            league: League::PremierLeague,
            matches: vec![m2.clone(), m1.clone()],
            entry_fee: Decimal::new(10, 0),
            jackpot: Decimal::new(1000, 0),
            start_date: kickoff(),
            end_date: kickoff(),
            status: PoolStatus::Upcoming,
        };
        let mine: Vec<_> = book
            .for_user_in_pool("1", &pool)
            .into_iter()
            .map(|p| p.match_id.as_str())
            .collect();
        assert_eq!(mine, vec!["m2", "m1"]);
        assert_eq!(book.for_user("1").count(), 3);
        assert_eq!(book.for_match("m1").count(), 2);
    }
}
