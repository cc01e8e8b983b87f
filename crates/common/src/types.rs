use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum League {
    #[serde(rename = "Premier League")]
    PremierLeague,
    #[serde(rename = "La Liga")]
    LaLiga,
    #[serde(rename = "Bundesliga")]
    Bundesliga,
    #[serde(rename = "Serie A")]
    SerieA,
}

impl League {
    pub const ALL: [Self; 4] = [
        Self::PremierLeague,
        Self::LaLiga,
        Self::Bundesliga,
        Self::SerieA,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PremierLeague => "Premier League",
            Self::LaLiga => "La Liga",
            Self::Bundesliga => "Bundesliga",
            Self::SerieA => "Serie A",
        }
    }

    /// Accepts display names as well as compact slugs (`premier-league`, `laliga`).
    pub fn from_str_loose(s: &str) -> Option<Self> {
        let key: String = s
            .chars()
            .filter(char::is_ascii_alphanumeric)
            .map(|c| c.to_ascii_lowercase())
            .collect();
        match key.as_str() {
            "premierleague" | "epl" => Some(Self::PremierLeague),
            "laliga" => Some(Self::LaLiga),
            "bundesliga" => Some(Self::Bundesliga),
            "seriea" => Some(Self::SerieA),
            _ => None,
        }
    }

    /// Accent color token used when rendering league badges.
    pub fn color(&self) -> &'static str {
        match self {
            Self::PremierLeague => "purple-600",
            Self::LaLiga => "red-600",
            Self::Bundesliga => "yellow-600",
            Self::SerieA => "blue-600",
        }
    }
}

impl fmt::Display for League {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    Upcoming,
    Live,
    Finished,
}

impl MatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Upcoming => "upcoming",
            Self::Live => "live",
            Self::Finished => "finished",
        }
    }

    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "upcoming" => Some(Self::Upcoming),
            "live" => Some(Self::Live),
            "finished" => Some(Self::Finished),
            _ => None,
        }
    }

    /// Matches only move forward one step at a time: upcoming -> live -> finished.
    pub fn can_advance_to(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Upcoming, Self::Live) | (Self::Live, Self::Finished)
        )
    }
}

impl fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolStatus {
    Upcoming,
    Active,
    Completed,
}

impl PoolStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Upcoming => "upcoming",
            Self::Active => "active",
            Self::Completed => "completed",
        }
    }

    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "upcoming" => Some(Self::Upcoming),
            "active" => Some(Self::Active),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }

    /// Pools move upcoming -> active -> completed, never backwards.
    pub fn can_advance_to(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Upcoming, Self::Active) | (Self::Active, Self::Completed)
        )
    }
}

impl fmt::Display for PoolStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Deposit,
    Withdrawal,
    Fee,
    Payout,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Deposit => "deposit",
            Self::Withdrawal => "withdrawal",
            Self::Fee => "fee",
            Self::Payout => "payout",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Win/loss/draw classification of a score line, independent of the exact goals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    HomeWin,
    AwayWin,
    Draw,
}

/// Home/away goal pair. Used both for a predicted score and a final result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreLine {
    #[serde(rename = "homeScore")]
    pub home: u32,
    #[serde(rename = "awayScore")]
    pub away: u32,
}

impl ScoreLine {
    pub const fn new(home: u32, away: u32) -> Self {
        Self { home, away }
    }

    /// Converts untrusted signed input. Negative goals are not a score.
    pub fn from_signed(home: i64, away: i64) -> Option<Self> {
        Some(Self {
            home: u32::try_from(home).ok()?,
            away: u32::try_from(away).ok()?,
        })
    }

    pub fn outcome(&self) -> Outcome {
        match self.home.cmp(&self.away) {
            std::cmp::Ordering::Greater => Outcome::HomeWin,
            std::cmp::Ordering::Less => Outcome::AwayWin,
            std::cmp::Ordering::Equal => Outcome::Draw,
        }
    }

    /// The same line with home and away relabelled.
    pub fn swapped(&self) -> Self {
        Self {
            home: self.away,
            away: self.home,
        }
    }
}

impl fmt::Display for ScoreLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.home, self.away)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
    pub wallet: Decimal,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Match {
    pub id: String,
    pub league: League,
    pub home_team: String,
    pub away_team: String,
    pub home_team_logo: Option<String>,
    pub away_team_logo: Option<String>,
    pub match_time: DateTime<Utc>,
    pub status: MatchStatus,
    /// Present iff `status` is `Finished`.
    pub result: Option<ScoreLine>,
}

impl Match {
    /// Predictions may be created or replaced only before kickoff.
    pub fn accepts_predictions_at(&self, now: DateTime<Utc>) -> bool {
        self.status == MatchStatus::Upcoming && now < self.match_time
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prediction {
    pub id: String,
    pub user_id: String,
    pub match_id: String,
    #[serde(flatten)]
    pub score: ScoreLine,
    /// Set once the match has a result; never changed afterwards.
    pub points: Option<u32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pool {
    pub id: String,
    pub name: String,
    pub league: League,
    pub matches: Vec<Match>,
    pub entry_fee: Decimal,
    pub jackpot: Decimal,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub status: PoolStatus,
}

impl Pool {
    pub fn contains_match(&self, match_id: &str) -> bool {
        self.matches.iter().any(|m| m.id == match_id)
    }
}

/// Append-only record of a wallet balance change. `amount` is signed:
/// deposits and payouts are positive, withdrawals and fees negative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: String,
    pub user_id: String,
    pub amount: Decimal,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    pub status: TransactionStatus,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub user_id: String,
    pub username: String,
    pub points: u32,
    pub correct_scores: u32,
    pub correct_outcomes: u32,
    pub correct_ties: u32,
    pub rank: u32,
}
