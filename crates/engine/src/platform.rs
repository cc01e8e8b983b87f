//! The betting pool as one async facade over the match board, predictions,
//! wallets and the session store.
//!
//! Lock order when more than one is held: `jackpots_paid` or `board`, then
//! `memberships` or `predictions`, then the ledger's internal lock.

use std::collections::{BTreeSet, HashSet};

use chrono::{DateTime, Utc};
use common::types::{
    League, LeaderboardEntry, Match, MatchStatus, Pool, PoolStatus, Prediction, ScoreLine,
    Transaction, User,
};
use rust_decimal::{Decimal, RoundingStrategy};
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

use crate::accounts::Accounts;
use crate::catalog::MatchBoard;
use crate::error::{PoolError, Result};
use crate::fixtures::Fixtures;
use crate::leaderboard::{self, PredictionStats};
use crate::ledger::Ledger;
use crate::predictions::PredictionBook;
use crate::scoring::ScoreKind;
use crate::session::{Session, SessionStore};

pub struct Platform<S> {
    store: S,
    accounts: RwLock<Accounts>,
    board: RwLock<MatchBoard>,
    predictions: RwLock<PredictionBook>,
    ledger: Ledger,
    /// (pool_id, user_id)
    memberships: Mutex<HashSet<(String, String)>>,
    jackpots_paid: Mutex<HashSet<String>>,
}

/// Equal share of `jackpot` for each of `winners`, rounded down to cents.
pub fn jackpot_share(jackpot: Decimal, winners: usize) -> Decimal {
    if winners == 0 {
        return Decimal::ZERO;
    }
    (jackpot / Decimal::from(winners)).round_dp_with_strategy(2, RoundingStrategy::ToZero)
}

impl<S: SessionStore> Platform<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            accounts: RwLock::new(Accounts::new()),
            board: RwLock::new(MatchBoard::new()),
            predictions: RwLock::new(PredictionBook::new()),
            ledger: Ledger::new(),
            memberships: Mutex::new(HashSet::new()),
            jackpots_paid: Mutex::new(HashSet::new()),
        }
    }

    /// Builds a platform preloaded with `fixtures`. A user holding a
    /// prediction on a pool's match counts as a member of that pool.
    pub async fn seeded(store: S, fixtures: Fixtures) -> Result<Self> {
        let platform = Self::new(store);
        let Fixtures {
            users,
            matches,
            pools,
            predictions,
            transactions,
        } = fixtures;

        {
            let mut accounts = platform.accounts.write().await;
            for user in users {
                platform.ledger.open_account(&user.id, user.wallet).await;
                accounts.insert(user);
            }
        }

        let mut board = platform.board.write().await;
        for m in matches {
            board.add_match(m);
        }
        for pool in pools {
            board.add_pool(pool)?;
        }

        {
            let mut members = platform.memberships.lock().await;
            let mut book = platform.predictions.write().await;
            for p in predictions {
                for pool in board.pools().iter().filter(|pool| pool.contains_match(&p.match_id)) {
                    members.insert((pool.id.clone(), p.user_id.clone()));
                }
                book.insert(p);
            }
        }
        let pool_count = board.pools().len();
        drop(board);

        platform.ledger.seed_history(transactions).await;
        info!(pools = pool_count, "platform seeded from fixtures");
        Ok(platform)
    }

    /// Picks up a user left signed in by an earlier run. The stored balance
    /// becomes the wallet balance.
    pub async fn restore(&self) -> Result<Option<Session>> {
        let Some(stored) = self.store.current_user().await? else {
            return Ok(None);
        };
        self.ledger.open_account(&stored.id, stored.wallet).await;
        self.accounts.write().await.insert(stored.clone());
        info!(user_id = %stored.id, wallet = %stored.wallet, "session restored");
        Ok(Some(Session::new(stored)))
    }

    pub async fn session(&self) -> Result<Session> {
        self.store
            .current_user()
            .await?
            .map(Session::new)
            .ok_or(PoolError::NotSignedIn)
    }

    /// Creates an account and signs it in.
    pub async fn register(
        &self,
        username: &str,
        email: &str,
        now: DateTime<Utc>,
    ) -> Result<Session> {
        let user = self.accounts.write().await.register(username, email, now)?;
        self.ledger.open_account(&user.id, user.wallet).await;
        self.store.set_current_user(&user).await?;
        Ok(Session::new(user))
    }

    pub async fn sign_in(&self, email: &str) -> Result<Session> {
        let user = self
            .accounts
            .read()
            .await
            .by_email(email)
            .cloned()
            .ok_or_else(|| PoolError::UnknownEmail(email.trim().to_string()))?;
        self.store.set_current_user(&user).await?;
        info!(user_id = %user.id, "signed in");
        Ok(Session::new(user))
    }

    pub async fn sign_out(&self) -> Result<()> {
        self.store.clear_current_user().await?;
        Ok(())
    }

    pub async fn user(&self, user_id: &str) -> Result<User> {
        self.accounts.read().await.by_id(user_id).cloned()
    }

    // Wallet

    pub async fn balance(&self, session: &Session) -> Result<Decimal> {
        self.ledger.balance(session.user_id()).await
    }

    pub async fn history(&self, session: &Session) -> Vec<Transaction> {
        self.ledger.history(session.user_id()).await
    }

    pub async fn deposit(
        &self,
        session: &Session,
        amount: Decimal,
        now: DateTime<Utc>,
    ) -> Result<Transaction> {
        let tx = self.ledger.deposit(session.user_id(), amount, now).await?;
        self.sync_wallet(session.user_id()).await;
        Ok(tx)
    }

    pub async fn withdraw(
        &self,
        session: &Session,
        amount: Decimal,
        now: DateTime<Utc>,
    ) -> Result<Transaction> {
        let tx = self.ledger.withdraw(session.user_id(), amount, now).await?;
        self.sync_wallet(session.user_id()).await;
        Ok(tx)
    }

    /// Copies the ledger balance into the account directory, and into the
    /// session store when `user_id` is the stored user. The ledger change is
    /// already committed here, so failures are logged and not returned.
    async fn sync_wallet(&self, user_id: &str) {
        let user = match self.ledger.balance(user_id).await {
            Ok(balance) => self.accounts.write().await.set_wallet(user_id, balance),
            Err(err) => Err(err),
        };
        let user = match user {
            Ok(user) => user,
            Err(err) => {
                warn!(user_id, error = %err, "account wallet not refreshed");
                return;
            }
        };
        let res = match self.store.current_user().await {
            Ok(Some(stored)) if stored.id == user.id => self.store.set_current_user(&user).await,
            Ok(_) => Ok(()),
            Err(err) => Err(err),
        };
        if let Err(err) = res {
            warn!(user_id, error = %err, "stored user wallet not refreshed");
        }
    }

    // Pools

    pub async fn pools(&self) -> Vec<Pool> {
        self.board.read().await.pools().to_vec()
    }

    pub async fn pools_for_league(&self, league: League) -> Vec<Pool> {
        self.board
            .read()
            .await
            .pools_for_league(league)
            .cloned()
            .collect()
    }

    pub async fn pool(&self, pool_id: &str) -> Result<Pool> {
        self.board.read().await.pool_by_id(pool_id).cloned()
    }

    pub async fn match_by_id(&self, match_id: &str) -> Result<Match> {
        self.board.read().await.match_by_id(match_id).cloned()
    }

    pub async fn has_joined(&self, user_id: &str, pool_id: &str) -> bool {
        self.memberships
            .lock()
            .await
            .contains(&(pool_id.to_string(), user_id.to_string()))
    }

    /// Member ids of a pool, sorted.
    pub async fn members(&self, pool_id: &str) -> Vec<String> {
        let members = self.memberships.lock().await;
        let sorted: BTreeSet<_> = members
            .iter()
            .filter(|(p, _)| p == pool_id)
            .map(|(_, u)| u.clone())
            .collect();
        sorted.into_iter().collect()
    }

    /// Charges the entry fee and records the membership. Returns the fee
    /// transaction, or `None` for a free pool.
    pub async fn join_pool(
        &self,
        session: &Session,
        pool_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Transaction>> {
        let res = self.join_pool_inner(session, pool_id, now).await;
        let status = match &res {
            Ok(_) => "ok",
            Err(e) => e.kind(),
        };
        metrics::counter!("pool_joins_total", "status" => status).increment(1);
        res
    }

    async fn join_pool_inner(
        &self,
        session: &Session,
        pool_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Transaction>> {
        let pool = self.pool(pool_id).await?;
        if pool.status == PoolStatus::Completed {
            return Err(PoolError::PoolClosed(pool.id));
        }

        let user_id = session.user_id();
        let mut members = self.memberships.lock().await;
        let key = (pool.id.clone(), user_id.to_string());
        if members.contains(&key) {
            return Err(PoolError::AlreadyJoined(pool.id));
        }

        let fee = if pool.entry_fee > Decimal::ZERO {
            let description = format!("{} entry fee", pool.name);
            Some(
                self.ledger
                    .charge_fee(user_id, pool.entry_fee, &description, now)
                    .await?,
            )
        } else {
            None
        };
        members.insert(key);
        drop(members);

        if fee.is_some() {
            self.sync_wallet(user_id).await;
        }
        info!(user_id, pool_id = %pool.id, fee = %pool.entry_fee, "pool joined");
        Ok(fee)
    }

    // Predictions

    /// Saves the session user's prediction for a match of a pool they joined.
    pub async fn submit_prediction(
        &self,
        session: &Session,
        pool_id: &str,
        match_id: &str,
        score: ScoreLine,
        now: DateTime<Utc>,
    ) -> Result<Prediction> {
        let board = self.board.read().await;
        let pool = board.pool_by_id(pool_id)?;
        if !self.has_joined(session.user_id(), pool_id).await {
            return Err(PoolError::NotJoined(pool_id.to_string()));
        }
        if !pool.contains_match(match_id) {
            return Err(PoolError::MatchNotInPool {
                pool_id: pool_id.to_string(),
                match_id: match_id.to_string(),
            });
        }
        let m = board.match_by_id(match_id)?.clone();
        let mut book = self.predictions.write().await;
        drop(board);
        book.submit(session.user_id(), &m, score, now)
    }

    pub async fn predictions_for(&self, user_id: &str) -> Vec<Prediction> {
        self.predictions
            .read()
            .await
            .for_user(user_id)
            .cloned()
            .collect()
    }

    /// The user's predictions on a pool, in pool match order.
    pub async fn pool_predictions(&self, user_id: &str, pool_id: &str) -> Result<Vec<Prediction>> {
        let board = self.board.read().await;
        let pool = board.pool_by_id(pool_id)?;
        let book = self.predictions.read().await;
        Ok(book
            .for_user_in_pool(user_id, pool)
            .into_iter()
            .cloned()
            .collect())
    }

    pub async fn profile_stats(&self, user_id: &str) -> PredictionStats {
        PredictionStats::from_predictions(self.predictions.read().await.for_user(user_id))
    }

    // Leaderboards

    pub async fn leaderboard(&self) -> Vec<LeaderboardEntry> {
        self.ranked(|_| true).await
    }

    pub async fn league_leaderboard(&self, league: League) -> Vec<LeaderboardEntry> {
        let ids: HashSet<String> = self
            .board
            .read()
            .await
            .matches()
            .filter(|m| m.league == league)
            .map(|m| m.id.clone())
            .collect();
        self.ranked(|p| ids.contains(&p.match_id)).await
    }

    /// Standings among a pool's members on the pool's matches.
    pub async fn pool_leaderboard(&self, pool_id: &str) -> Result<Vec<LeaderboardEntry>> {
        let pool = self.pool(pool_id).await?;
        let members: HashSet<String> = self.members(pool_id).await.into_iter().collect();
        Ok(self
            .ranked(|p| members.contains(&p.user_id) && pool.contains_match(&p.match_id))
            .await)
    }

    async fn ranked<F>(&self, keep: F) -> Vec<LeaderboardEntry>
    where
        F: Fn(&Prediction) -> bool,
    {
        let accounts = self.accounts.read().await;
        let book = self.predictions.read().await;
        let records =
            leaderboard::scored_records(book.all().filter(|p| keep(*p)), |id| accounts.username_of(id));
        leaderboard::aggregate(records)
    }

    // Admin

    pub async fn start_match(&self, session: &Session, match_id: &str) -> Result<Match> {
        session.require_admin()?;
        self.board
            .write()
            .await
            .advance_match(match_id, MatchStatus::Live)
    }

    /// Finishes a live match with its result and settles its predictions.
    /// Returns how many predictions were scored.
    pub async fn record_result(
        &self,
        session: &Session,
        match_id: &str,
        result: ScoreLine,
    ) -> Result<usize> {
        session.require_admin()?;
        let mut board = self.board.write().await;
        let m = board.record_result(match_id, result)?;
        let mut book = self.predictions.write().await;
        drop(board);
        book.settle_match(&m)
    }

    pub async fn advance_pool(
        &self,
        session: &Session,
        pool_id: &str,
        next: PoolStatus,
    ) -> Result<Pool> {
        session.require_admin()?;
        self.board.write().await.advance_pool(pool_id, next)
    }

    /// Pays a completed pool's jackpot to the members who called every match
    /// exactly. Runs once per pool.
    pub async fn settle_jackpot(
        &self,
        session: &Session,
        pool_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<Transaction>> {
        session.require_admin()?;
        let pool = self.pool(pool_id).await?;
        if pool.status != PoolStatus::Completed {
            return Err(PoolError::PoolNotCompleted(pool.id));
        }

        let mut paid = self.jackpots_paid.lock().await;
        if paid.contains(&pool.id) {
            return Err(PoolError::JackpotSettled(pool.id));
        }

        let members = self.members(&pool.id).await;
        let exact = Some(ScoreKind::ExactScore.points());
        let winners: Vec<String> = {
            let book = self.predictions.read().await;
            members
                .into_iter()
                .filter(|uid| {
                    !pool.matches.is_empty()
                        && pool
                            .matches
                            .iter()
                            .all(|m| book.get(uid, &m.id).and_then(|p| p.points) == exact)
                })
                .collect()
        };
        let share = jackpot_share(pool.jackpot, winners.len());
        if share <= Decimal::ZERO {
            paid.insert(pool.id.clone());
            warn!(pool_id = %pool.id, winners = winners.len(), "jackpot settled without payout");
            return Ok(Vec::new());
        }

        let description = format!("{} jackpot", pool.name);
        let payouts = self
            .ledger
            .payout_all(&winners, share, &description, now)
            .await?;
        paid.insert(pool.id.clone());
        drop(paid);

        metrics::counter!("pool_jackpot_payouts_total").increment(payouts.len() as u64);
        for uid in &winners {
            self.sync_wallet(uid).await;
        }
        info!(pool_id = %pool.id, winners = winners.len(), %share, "jackpot paid");
        Ok(payouts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use crate::session::MemorySessionStore;
    use chrono::{Duration, TimeZone};
    use common::types::TransactionType;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn round_start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2030, 3, 1, 0, 0, 0).unwrap()
    }

    fn before_kickoff() -> DateTime<Utc> {
        round_start() - Duration::hours(2)
    }

    fn d(units: i64) -> Decimal {
        Decimal::new(units, 0)
    }

    async fn platform() -> Platform<MemorySessionStore> {
        Platform::seeded(MemorySessionStore::new(), fixtures::demo_from(round_start()))
            .await
            .unwrap()
    }

    async fn finish<S: SessionStore>(
        p: &Platform<S>,
        admin: &Session,
        match_id: &str,
        h: u32,
        a: u32,
    ) {
        p.start_match(admin, match_id).await.unwrap();
        p.record_result(admin, match_id, ScoreLine::new(h, a))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_session_required_and_unknown_email() {
        let p = platform().await;
        assert!(matches!(p.session().await, Err(PoolError::NotSignedIn)));
        assert!(matches!(
            p.sign_in("nobody@example.com").await,
            Err(PoolError::UnknownEmail(_))
        ));

        let s = p.sign_in("JOHN@example.com").await.unwrap();
        assert_eq!(s.user_id(), "1");
        assert_eq!(p.session().await.unwrap().user_id(), "1");

        p.sign_out().await.unwrap();
        assert!(matches!(p.session().await, Err(PoolError::NotSignedIn)));
    }

    #[tokio::test]
    async fn test_seeded_memberships_follow_predictions() {
        let p = platform().await;
        assert_eq!(p.members("p1").await, vec!["1".to_string(), "2".to_string()]);
        assert!(p.members("p2").await.is_empty());
    }

    #[tokio::test]
    async fn test_join_pool_charges_fee_and_refreshes_session() {
        let p = platform().await;
        let john = p.sign_in("john@example.com").await.unwrap();

        let fee = p.join_pool(&john, "p2", before_kickoff()).await.unwrap().unwrap();
        assert_eq!(fee.kind, TransactionType::Fee);
        assert_eq!(fee.amount, d(-10));
        assert_eq!(fee.description, "La Liga Week 24 entry fee");
        assert_eq!(p.balance(&john).await.unwrap(), d(90));
        assert_eq!(p.session().await.unwrap().user().wallet, d(90));
        assert!(p.has_joined("1", "p2").await);

        assert!(matches!(
            p.join_pool(&john, "p2", before_kickoff()).await,
            Err(PoolError::AlreadyJoined(_))
        ));
        assert_eq!(p.balance(&john).await.unwrap(), d(90));
    }

    #[tokio::test]
    async fn test_failed_join_leaves_no_membership() {
        let p = platform().await;
        let s = p
            .register("Newbie", "new@example.com", before_kickoff())
            .await
            .unwrap();
        assert!(matches!(
            p.join_pool(&s, "p1", before_kickoff()).await,
            Err(PoolError::InsufficientFunds { .. })
        ));
        assert!(!p.has_joined(s.user_id(), "p1").await);
        assert_eq!(p.balance(&s).await.unwrap(), Decimal::ZERO);
        assert!(p.history(&s).await.is_empty());
    }

    #[tokio::test]
    async fn test_completed_pool_is_closed() {
        let p = platform().await;
        let admin = p.sign_in("admin@example.com").await.unwrap();
        p.advance_pool(&admin, "p2", PoolStatus::Active).await.unwrap();
        p.advance_pool(&admin, "p2", PoolStatus::Completed).await.unwrap();

        let john = p.sign_in("john@example.com").await.unwrap();
        assert!(matches!(
            p.join_pool(&john, "p2", before_kickoff()).await,
            Err(PoolError::PoolClosed(_))
        ));
    }

    #[tokio::test]
    async fn test_prediction_needs_membership_and_pool_match() {
        let p = platform().await;
        let s = p
            .register("Newbie", "new@example.com", before_kickoff())
            .await
            .unwrap();
        assert!(matches!(
            p.submit_prediction(&s, "p1", "m3", ScoreLine::new(1, 0), before_kickoff())
                .await,
            Err(PoolError::NotJoined(_))
        ));

        let john = p.sign_in("john@example.com").await.unwrap();
        assert!(matches!(
            p.submit_prediction(&john, "p1", "m6", ScoreLine::new(1, 0), before_kickoff())
                .await,
            Err(PoolError::MatchNotInPool { .. })
        ));
        assert!(matches!(
            p.submit_prediction(&john, "nope", "m1", ScoreLine::new(1, 0), before_kickoff())
                .await,
            Err(PoolError::UnknownPool(_))
        ));

        let saved = p
            .submit_prediction(&john, "p1", "m3", ScoreLine::new(1, 0), before_kickoff())
            .await
            .unwrap();
        assert_eq!(saved.score, ScoreLine::new(1, 0));
        assert_eq!(p.pool_predictions("1", "p1").await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_prediction_after_kickoff_rejected() {
        let p = platform().await;
        let john = p.sign_in("john@example.com").await.unwrap();
        let after = round_start() + Duration::hours(15);
        assert!(matches!(
            p.submit_prediction(&john, "p1", "m1", ScoreLine::new(3, 0), after)
                .await,
            Err(PoolError::MatchAlreadyStarted { .. })
        ));
    }

    #[tokio::test]
    async fn test_admin_only_operations() {
        let p = platform().await;
        let john = p.sign_in("john@example.com").await.unwrap();
        assert!(matches!(
            p.start_match(&john, "m1").await,
            Err(PoolError::AdminOnly)
        ));
        assert!(matches!(
            p.record_result(&john, "m1", ScoreLine::new(1, 0)).await,
            Err(PoolError::AdminOnly)
        ));
        assert!(matches!(
            p.settle_jackpot(&john, "p1", before_kickoff()).await,
            Err(PoolError::AdminOnly)
        ));
    }

    #[tokio::test]
    async fn test_results_settle_predictions_and_rank_users() {
        let p = platform().await;
        let admin = p.sign_in("admin@example.com").await.unwrap();

        // John has 2-1 on m1 and 1-1 on m2; Jane has 1-2 on m1.
        finish(&p, &admin, "m1", 2, 1).await;
        finish(&p, &admin, "m2", 0, 0).await;

        let board = p.leaderboard().await;
        assert_eq!(board.len(), 2);
        assert_eq!(board[0].user_id, "1");
        assert_eq!(board[0].points, 8);
        assert_eq!(board[0].correct_scores, 1);
        assert_eq!(board[0].correct_ties, 1);
        assert_eq!(board[0].rank, 1);
        assert_eq!(board[1].user_id, "2");
        assert_eq!(board[1].points, 0);
        assert_eq!(board[1].rank, 2);

        assert!(p.league_leaderboard(League::LaLiga).await.is_empty());
        assert_eq!(p.pool_leaderboard("p1").await.unwrap().len(), 2);

        let stats = p.profile_stats("1").await;
        assert_eq!(stats.total, 2);
        assert_eq!(stats.points, 8);

        assert!(matches!(
            p.record_result(&admin, "m1", ScoreLine::new(0, 0)).await,
            Err(PoolError::MatchAlreadyFinished { .. })
        ));
        assert_eq!(p.leaderboard().await[0].points, 8);
    }

    #[tokio::test]
    async fn test_jackpot_paid_once_to_exact_predictors() {
        let p = platform().await;
        let john = p.sign_in("john@example.com").await.unwrap();
        for (m, h, a) in [("m3", 0, 0), ("m4", 3, 1), ("m5", 1, 2)] {
            p.submit_prediction(&john, "p1", m, ScoreLine::new(h, a), before_kickoff())
                .await
                .unwrap();
        }

        let admin = p.sign_in("admin@example.com").await.unwrap();
        assert!(matches!(
            p.settle_jackpot(&admin, "p1", before_kickoff()).await,
            Err(PoolError::PoolNotCompleted(_))
        ));

        p.advance_pool(&admin, "p1", PoolStatus::Active).await.unwrap();
        for (m, h, a) in [("m1", 2, 1), ("m2", 1, 1), ("m3", 0, 0), ("m4", 3, 1), ("m5", 1, 2)] {
            finish(&p, &admin, m, h, a).await;
        }
        p.advance_pool(&admin, "p1", PoolStatus::Completed).await.unwrap();

        let payouts = p.settle_jackpot(&admin, "p1", round_start()).await.unwrap();
        assert_eq!(payouts.len(), 1);
        assert_eq!(payouts[0].user_id, "1");
        assert_eq!(payouts[0].amount, d(1000));
        assert_eq!(payouts[0].kind, TransactionType::Payout);
        assert_eq!(p.balance(&john).await.unwrap(), d(1100));
        assert_eq!(p.user("1").await.unwrap().wallet, d(1100));

        assert!(matches!(
            p.settle_jackpot(&admin, "p1", round_start()).await,
            Err(PoolError::JackpotSettled(_))
        ));
        assert_eq!(p.balance(&john).await.unwrap(), d(1100));
    }

    #[tokio::test]
    async fn test_restore_takes_stored_balance() {
        let store = MemorySessionStore::new();
        let mut john = fixtures::demo().users[0].clone();
        john.wallet = d(77);
        store.set_current_user(&john).await.unwrap();

        let p = Platform::seeded(store, fixtures::demo_from(round_start()))
            .await
            .unwrap();
        let s = p.restore().await.unwrap().unwrap();
        assert_eq!(p.balance(&s).await.unwrap(), d(77));

        p.deposit(&s, d(23), before_kickoff()).await.unwrap();
        assert_eq!(p.session().await.unwrap().user().wallet, d(100));
        assert!(matches!(
            p.withdraw(&s, d(101), before_kickoff()).await,
            Err(PoolError::InsufficientFunds { .. })
        ));
        assert_eq!(p.session().await.unwrap().user().wallet, d(100));
    }

    /// Memory store whose writes start failing once `fail_writes` is set.
    #[derive(Default)]
    struct FlakyStore {
        inner: MemorySessionStore,
        fail_writes: AtomicBool,
    }

    impl SessionStore for FlakyStore {
        async fn current_user(&self) -> anyhow::Result<Option<User>> {
            self.inner.current_user().await
        }

        async fn set_current_user(&self, user: &User) -> anyhow::Result<()> {
            if self.fail_writes.load(Ordering::SeqCst) {
                anyhow::bail!("disk full");
            }
            self.inner.set_current_user(user).await
        }

        async fn clear_current_user(&self) -> anyhow::Result<()> {
            self.inner.clear_current_user().await
        }
    }

    #[tokio::test]
    async fn test_store_write_failure_does_not_fail_committed_wallet_ops() {
        let p = Platform::seeded(FlakyStore::default(), fixtures::demo_from(round_start()))
            .await
            .unwrap();
        let admin = p.sign_in("admin@example.com").await.unwrap();

        let rookie = p
            .register("Rookie", "rookie@example.com", before_kickoff())
            .await
            .unwrap();
        p.deposit(&rookie, d(10), before_kickoff()).await.unwrap();
        p.join_pool(&rookie, "p1", before_kickoff()).await.unwrap();
        let john = p.sign_in("john@example.com").await.unwrap();

        let exact = [("m1", 2, 1), ("m2", 1, 1), ("m3", 0, 0), ("m4", 3, 1), ("m5", 1, 2)];
        for (m, h, a) in exact {
            p.submit_prediction(&rookie, "p1", m, ScoreLine::new(h, a), before_kickoff())
                .await
                .unwrap();
        }
        for (m, h, a) in &exact[2..] {
            p.submit_prediction(&john, "p1", m, ScoreLine::new(*h, *a), before_kickoff())
                .await
                .unwrap();
        }

        p.store.fail_writes.store(true, Ordering::SeqCst);

        let before = p.history(&john).await.len();
        p.deposit(&john, d(50), before_kickoff()).await.unwrap();
        assert_eq!(p.balance(&john).await.unwrap(), d(150));
        assert_eq!(p.history(&john).await.len(), before + 1);
        assert_eq!(p.user("1").await.unwrap().wallet, d(150));

        p.advance_pool(&admin, "p1", PoolStatus::Active).await.unwrap();
        for (m, h, a) in exact {
            finish(&p, &admin, m, h, a).await;
        }
        p.advance_pool(&admin, "p1", PoolStatus::Completed).await.unwrap();

        let payouts = p.settle_jackpot(&admin, "p1", round_start()).await.unwrap();
        assert_eq!(payouts.len(), 2);
        assert_eq!(p.balance(&john).await.unwrap(), d(650));
        assert_eq!(p.balance(&rookie).await.unwrap(), d(500));
        assert_eq!(p.user(rookie.user_id()).await.unwrap().wallet, d(500));
        assert!(matches!(
            p.settle_jackpot(&admin, "p1", round_start()).await,
            Err(PoolError::JackpotSettled(_))
        ));
        assert_eq!(p.balance(&john).await.unwrap(), d(650));
    }

    #[test]
    fn test_jackpot_share_rounds_down_to_cents() {
        assert_eq!(jackpot_share(d(1000), 3), Decimal::new(33333, 2));
        assert_eq!(jackpot_share(d(850), 2), d(425));
        assert_eq!(jackpot_share(d(850), 0), Decimal::ZERO);
    }
}
