use std::collections::BTreeMap;

use common::types::{League, Match, MatchStatus, Pool, PoolStatus, ScoreLine};
use tracing::info;

use crate::error::{PoolError, Result};

/// Matches and the pools that bundle them. Pools carry their own copies of
/// their matches; every match update is mirrored into those copies.
#[derive(Debug, Default)]
pub struct MatchBoard {
    matches: BTreeMap<String, Match>,
    pools: Vec<Pool>,
}

impl MatchBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_match(&mut self, m: Match) {
        self.matches.insert(m.id.clone(), m);
    }

    /// Registers a pool. Every match must belong to the pool's league.
    pub fn add_pool(&mut self, pool: Pool) -> Result<()> {
        if let Some(m) = pool.matches.iter().find(|m| m.league != pool.league) {
            return Err(PoolError::LeagueMismatch {
                pool_id: pool.id.clone(),
                match_id: m.id.clone(),
                expected: pool.league.to_string(),
                found: m.league.to_string(),
            });
        }
        for m in &pool.matches {
            self.matches
                .entry(m.id.clone())
                .or_insert_with(|| m.clone());
        }
        self.pools.retain(|p| p.id != pool.id);
        self.pools.push(pool);
        Ok(())
    }

    pub fn match_by_id(&self, id: &str) -> Result<&Match> {
        self.matches
            .get(id)
            .ok_or_else(|| PoolError::UnknownMatch(id.to_string()))
    }

    pub fn matches(&self) -> impl Iterator<Item = &Match> {
        self.matches.values()
    }

    pub fn pool_by_id(&self, id: &str) -> Result<&Pool> {
        self.pools
            .iter()
            .find(|p| p.id == id)
            .ok_or_else(|| PoolError::UnknownPool(id.to_string()))
    }

    pub fn pools(&self) -> &[Pool] {
        &self.pools
    }

    pub fn pools_for_league(&self, league: League) -> impl Iterator<Item = &Pool> {
        self.pools.iter().filter(move |p| p.league == league)
    }

    /// Moves a match forward without a result (kickoff). Finishing a match
    /// goes through [`Self::record_result`].
    pub fn advance_match(&mut self, id: &str, next: MatchStatus) -> Result<Match> {
        let m = self
            .matches
            .get_mut(id)
            .ok_or_else(|| PoolError::UnknownMatch(id.to_string()))?;
        if next == MatchStatus::Finished || !m.status.can_advance_to(next) {
            return Err(PoolError::InvalidTransition {
                entity: "match",
                id: id.to_string(),
                from: m.status.to_string(),
                to: next.to_string(),
            });
        }
        m.status = next;
        let updated = m.clone();
        self.mirror_into_pools(&updated);
        info!(match_id = %id, status = %next, "match status advanced");
        Ok(updated)
    }

    /// Attaches the final result to a live match and finishes it.
    pub fn record_result(&mut self, id: &str, result: ScoreLine) -> Result<Match> {
        let m = self
            .matches
            .get_mut(id)
            .ok_or_else(|| PoolError::UnknownMatch(id.to_string()))?;
        match m.status {
            MatchStatus::Finished => {
                return Err(PoolError::MatchAlreadyFinished {
                    match_id: id.to_string(),
                })
            }
            MatchStatus::Upcoming => {
                return Err(PoolError::InvalidTransition {
                    entity: "match",
                    id: id.to_string(),
                    from: m.status.to_string(),
                    to: MatchStatus::Finished.to_string(),
                })
            }
            MatchStatus::Live => {}
        }
        m.status = MatchStatus::Finished;
        m.result = Some(result);
        let updated = m.clone();
        self.mirror_into_pools(&updated);
        info!(match_id = %id, result = %result, "match result recorded");
        Ok(updated)
    }

    pub fn advance_pool(&mut self, id: &str, next: PoolStatus) -> Result<Pool> {
        let pool = self
            .pools
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| PoolError::UnknownPool(id.to_string()))?;
        if !pool.status.can_advance_to(next) {
            return Err(PoolError::InvalidTransition {
                entity: "pool",
                id: id.to_string(),
                from: pool.status.to_string(),
                to: next.to_string(),
            });
        }
        pool.status = next;
        info!(pool_id = %id, status = %next, "pool status advanced");
        Ok(pool.clone())
    }

    fn mirror_into_pools(&mut self, updated: &Match) {
        for pool in &mut self.pools {
            for m in pool.matches.iter_mut().filter(|m| m.id == updated.id) {
                *m = updated.clone();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use rust_decimal::Decimal;

    fn fixture_match(id: &str, league: League) -> Match {
        Match {
            id: id.to_string(),
            league,
            home_team: "Home".to_string(),
            away_team: "Away".to_string(),
            home_team_logo: None,
            away_team_logo: None,
            match_time: Utc.with_ymd_and_hms(2025, 2, 25, 15, 0, 0).unwrap(),
            status: MatchStatus::Upcoming,
            result: None,
        }
    }

    fn fixture_pool(id: &str, league: League, matches: Vec<Match>) -> Pool {
        Pool {
            id: id.to_string(),
            name: format!("{league} Week 1"),
            league,
            matches,
            entry_fee: Decimal::new(10, 0),
            jackpot: Decimal::new(1000, 0),
            start_date: Utc.with_ymd_and_hms(2025, 2, 25, 0, 0, 0).unwrap(),
            end_date: Utc.with_ymd_and_hms(2025, 2, 27, 0, 0, 0).unwrap(),
            status: PoolStatus::Upcoming,
        }
    }

    fn board() -> MatchBoard {
        let mut board = MatchBoard::new();
        board
            .add_pool(fixture_pool(
                "p1",
                League::PremierLeague,
                vec![
                    fixture_match("m1", League::PremierLeague),
                    fixture_match("m2", League::PremierLeague),
                ],
            ))
            .unwrap();
        board
    }

    #[test]
    fn test_add_pool_registers_matches() {
        let board = board();
        assert_eq!(board.matches().count(), 2);
        assert!(board.pool_by_id("p1").unwrap().contains_match("m2"));
        assert_eq!(board.pools_for_league(League::PremierLeague).count(), 1);
        assert_eq!(board.pools_for_league(League::SerieA).count(), 0);
    }

    #[test]
    fn test_add_pool_rejects_foreign_league_match() {
        let mut board = MatchBoard::new();
        let err = board
            .add_pool(fixture_pool(
                "p2",
                League::LaLiga,
                vec![
                    fixture_match("m6", League::LaLiga),
                    fixture_match("m1", League::PremierLeague),
                ],
            ))
            .unwrap_err();
        assert!(matches!(err, PoolError::LeagueMismatch { ref match_id, .. } if match_id == "m1"));
        assert!(board.pools().is_empty());
    }

    #[test]
    fn test_match_lifecycle_and_pool_mirror() {
        let mut board = board();
        board.advance_match("m1", MatchStatus::Live).unwrap();
        let finished = board.record_result("m1", ScoreLine::new(2, 1)).unwrap();
        assert_eq!(finished.status, MatchStatus::Finished);
        assert_eq!(finished.result, Some(ScoreLine::new(2, 1)));

        let in_pool = &board.pool_by_id("p1").unwrap().matches[0];
        assert_eq!(in_pool.status, MatchStatus::Finished);
        assert_eq!(in_pool.result, Some(ScoreLine::new(2, 1)));
    }

    #[test]
    fn test_result_is_final() {
        let mut board = board();
        board.advance_match("m1", MatchStatus::Live).unwrap();
        board.record_result("m1", ScoreLine::new(0, 0)).unwrap();
        let err = board.record_result("m1", ScoreLine::new(1, 0)).unwrap_err();
        assert!(matches!(err, PoolError::MatchAlreadyFinished { .. }));
        assert_eq!(
            board.match_by_id("m1").unwrap().result,
            Some(ScoreLine::new(0, 0))
        );
    }

    #[test]
    fn test_cannot_skip_or_reverse_match_status() {
        let mut board = board();
        assert!(matches!(
            board.record_result("m1", ScoreLine::new(1, 0)),
            Err(PoolError::InvalidTransition { .. })
        ));
        assert!(matches!(
            board.advance_match("m1", MatchStatus::Finished),
            Err(PoolError::InvalidTransition { .. })
        ));
        board.advance_match("m1", MatchStatus::Live).unwrap();
        assert!(matches!(
            board.advance_match("m1", MatchStatus::Upcoming),
            Err(PoolError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_pool_lifecycle() {
        let mut board = board();
        assert!(board.advance_pool("p1", PoolStatus::Completed).is_err());
        board.advance_pool("p1", PoolStatus::Active).unwrap();
        let done = board.advance_pool("p1", PoolStatus::Completed).unwrap();
        assert_eq!(done.status, PoolStatus::Completed);
        assert!(matches!(
            board.advance_pool("nope", PoolStatus::Active),
            Err(PoolError::UnknownPool(_))
        ));
    }
}
