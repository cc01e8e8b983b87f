//! Demo data the platform is seeded with when `pools.seed_fixtures` is on.

use chrono::{DateTime, Duration, TimeZone, Utc};
use common::types::{
    League, Match, MatchStatus, Pool, PoolStatus, Prediction, ScoreLine, Transaction,
    TransactionStatus, TransactionType, User,
};
use rust_decimal::Decimal;

#[derive(Debug, Clone)]
pub struct Fixtures {
    pub users: Vec<User>,
    pub matches: Vec<Match>,
    pub pools: Vec<Pool>,
    pub predictions: Vec<Prediction>,
    pub transactions: Vec<Transaction>,
}

fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, mo, d, h, mi, 0)
        .single()
        .unwrap_or_default()
}

fn user(id: &str, username: &str, email: &str, wallet: i64, is_admin: bool, created: DateTime<Utc>) -> User {
    User {
        id: id.to_string(),
        username: username.to_string(),
        email: email.to_string(),
        wallet: Decimal::new(wallet, 0),
        is_admin,
        created_at: created,
    }
}

fn fixture_match(
    id: &str,
    league: League,
    home: (&str, &str),
    away: (&str, &str),
    kickoff: DateTime<Utc>,
) -> Match {
    Match {
        id: id.to_string(),
        league,
        home_team: home.0.to_string(),
        away_team: away.0.to_string(),
        home_team_logo: Some(format!("/team-logos/{}.png", home.1)),
        away_team_logo: Some(format!("/team-logos/{}.png", away.1)),
        match_time: kickoff,
        status: MatchStatus::Upcoming,
        result: None,
    }
}

fn prediction(
    id: &str,
    user_id: &str,
    match_id: &str,
    score: ScoreLine,
    created: DateTime<Utc>,
) -> Prediction {
    Prediction {
        id: id.to_string(),
        user_id: user_id.to_string(),
        match_id: match_id.to_string(),
        score,
        points: None,
        created_at: created,
        updated_at: None,
    }
}

fn transaction(
    id: &str,
    user_id: &str,
    amount: i64,
    kind: TransactionType,
    description: &str,
    created: DateTime<Utc>,
) -> Transaction {
    Transaction {
        id: id.to_string(),
        user_id: user_id.to_string(),
        amount: Decimal::new(amount, 0),
        kind,
        status: TransactionStatus::Completed,
        description: description.to_string(),
        created_at: created,
    }
}

/// The demo round as first published: kicking off on 25 Feb 2025.
pub fn demo() -> Fixtures {
    demo_from(at(2025, 2, 25, 0, 0))
}

/// The demo round shifted so its first matchday starts at `round_start`.
/// Kickoffs, pool dates, predictions and transactions keep their relative spacing.
pub fn demo_from(round_start: DateTime<Utc>) -> Fixtures {
    let day = |d: i64, h: i64, mi: i64| {
        round_start + Duration::days(d) + Duration::hours(h) + Duration::minutes(mi)
    };

    let users = vec![
        user("1", "JohnDoe", "john@example.com", 100, false, at(2024, 1, 1, 0, 0)),
        user("2", "JaneSmith", "jane@example.com", 250, false, at(2024, 1, 5, 0, 0)),
        user("3", "AdminUser", "admin@example.com", 1000, true, at(2023, 12, 25, 0, 0)),
    ];

    let pl = League::PremierLeague;
    let ll = League::LaLiga;
    let matches = vec![
        fixture_match("m1", pl, ("Arsenal", "arsenal"), ("Chelsea", "chelsea"), day(0, 15, 0)),
        fixture_match("m2", pl, ("Liverpool", "liverpool"), ("Man City", "mancity"), day(0, 17, 30)),
        fixture_match("m3", pl, ("Man United", "manunited"), ("Tottenham", "tottenham"), day(1, 14, 0)),
        fixture_match("m4", pl, ("Newcastle", "newcastle"), ("Aston Villa", "astonvilla"), day(1, 16, 30)),
        fixture_match("m5", pl, ("Brighton", "brighton"), ("Everton", "everton"), day(2, 20, 0)),
        fixture_match("m6", ll, ("Barcelona", "barcelona"), ("Real Madrid", "realmadrid"), day(0, 20, 0)),
        fixture_match("m7", ll, ("Atletico Madrid", "atletico"), ("Sevilla", "sevilla"), day(1, 18, 0)),
        fixture_match("m8", ll, ("Real Sociedad", "realsociedad"), ("Valencia", "valencia"), day(1, 14, 0)),
        fixture_match("m9", ll, ("Villarreal", "villarreal"), ("Athletic Bilbao", "bilbao"), day(2, 16, 0)),
        fixture_match("m10", ll, ("Real Betis", "betis"), ("Espanyol", "espanyol"), day(2, 21, 0)),
    ];

    let round = |id: &str, name: &str, league: League, jackpot: i64| Pool {
        id: id.to_string(),
        name: name.to_string(),
        league,
        matches: matches
            .iter()
            .filter(|m| m.league == league)
            .take(5)
            .cloned()
            .collect(),
        entry_fee: Decimal::new(10, 0),
        jackpot: Decimal::new(jackpot, 0),
        start_date: day(0, 0, 0),
        end_date: day(2, 0, 0),
        status: PoolStatus::Upcoming,
    };
    let pools = vec![
        round("p1", "Premier League Week 26", pl, 1000),
        round("p2", "La Liga Week 24", ll, 850),
    ];

    let predictions = vec![
        prediction("pred1", "1", "m1", ScoreLine::new(2, 1), day(-1, 0, 0)),
        prediction("pred2", "1", "m2", ScoreLine::new(1, 1), day(-1, 0, 0)),
        prediction("pred3", "2", "m1", ScoreLine::new(1, 2), day(-1, 0, 0)),
    ];

    let fee = "Premier League Week 26 entry fee";
    let transactions = vec![
        transaction("t1", "1", 50, TransactionType::Deposit, "Initial deposit", day(-5, 0, 0)),
        transaction("t2", "1", -10, TransactionType::Fee, fee, day(-1, 0, 0)),
        transaction("t3", "2", 100, TransactionType::Deposit, "Initial deposit", day(-3, 0, 0)),
        transaction("t4", "2", -10, TransactionType::Fee, fee, day(-1, 0, 0)),
    ];

    Fixtures {
        users,
        matches,
        pools,
        predictions,
        transactions,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pools_hold_single_league_rounds() {
        let f = demo();
        assert_eq!(f.pools.len(), 2);
        for pool in &f.pools {
            assert_eq!(pool.matches.len(), 5);
            assert!(pool.matches.iter().all(|m| m.league == pool.league));
        }
    }

    #[test]
    fn test_predictions_reference_known_matches_and_users() {
        let f = demo();
        for p in &f.predictions {
            assert!(f.matches.iter().any(|m| m.id == p.match_id));
            assert!(f.users.iter().any(|u| u.id == p.user_id));
        }
    }

    #[test]
    fn test_demo_from_keeps_spacing() {
        let start = Utc.with_ymd_and_hms(2030, 8, 10, 0, 0, 0).unwrap();
        let f = demo_from(start);
        let m1 = f.matches.iter().find(|m| m.id == "m1").unwrap();
        assert_eq!(m1.match_time, start + Duration::hours(15));
        assert_eq!(f.pools[0].end_date, start + Duration::days(2));
        assert!(f.predictions.iter().all(|p| p.created_at < start));
        assert_eq!(demo().matches[0].match_time, at(2025, 2, 25, 15, 0));
    }

    #[test]
    fn test_one_admin() {
        let f = demo();
        let admins: Vec<_> = f.users.iter().filter(|u| u.is_admin).collect();
        assert_eq!(admins.len(), 1);
        assert_eq!(admins[0].email, "admin@example.com");
    }
}
