use std::io::Write;
use std::str::FromStr;

use anyhow::Result;
use chrono::{DateTime, Duration, NaiveTime, Utc};
use common::types::{League, PoolStatus};
use engine::format::{format_currency, format_date, format_match_date, match_status_label};
use engine::{scoring, Platform, PoolError, Session, SessionStore};
use rust_decimal::Decimal;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

const USAGE: &str = "\
commands:
  pools                                list pools
  pool <id>                            matches of a pool, with your picks
  leaderboard [league]                 global or per-league standings
  score <home> <away> <rhome> <raway>  points a prediction earns against a result
  register <username> <email>          create an account and sign in
  login <email> | logout | whoami
  wallet                               balance and transactions
  deposit <amount> | withdraw <amount>
  join <pool>                          pay the entry fee and join
  predict <pool> <match> <home> <away>
  profile                              your prediction record
admin:
  kickoff <match>
  result <match> <home> <away>
  advance <pool> <upcoming|active|completed>
  jackpot <pool>
shell only:
  help | quit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Shell,
    Help,
    Pools,
    Pool { id: String },
    Leaderboard { league: Option<League> },
    ScoreCheck { prediction: (i64, i64), result: (i64, i64) },
    Register { username: String, email: String },
    Login { email: String },
    Logout,
    WhoAmI,
    Wallet,
    Deposit { amount: Decimal },
    Withdraw { amount: Decimal },
    Join { pool: String },
    Predict { pool: String, match_id: String, home: i64, away: i64 },
    Profile,
    Kickoff { match_id: String },
    RecordResult { match_id: String, home: i64, away: i64 },
    Advance { pool: String, status: PoolStatus },
    Jackpot { pool: String },
}

fn required<I>(args: &mut I, usage: &str) -> std::result::Result<String, String>
where
    I: Iterator<Item = String>,
{
    args.next().ok_or_else(|| format!("usage: poolctl {usage}"))
}

fn goals<I>(args: &mut I, usage: &str) -> std::result::Result<i64, String>
where
    I: Iterator<Item = String>,
{
    let raw = required(args, usage)?;
    raw.parse()
        .map_err(|_| format!("not a whole number: {raw} (usage: poolctl {usage})"))
}

fn amount<I>(args: &mut I, usage: &str) -> std::result::Result<Decimal, String>
where
    I: Iterator<Item = String>,
{
    let raw = required(args, usage)?;
    Decimal::from_str(raw.trim_start_matches('$'))
        .map_err(|_| format!("not an amount: {raw} (usage: poolctl {usage})"))
}

pub fn parse_args<I>(mut args: I) -> std::result::Result<Command, String>
where
    I: Iterator<Item = String>,
{
    // Drop argv[0].
    let _ = args.next();

    let Some(cmd) = args.next() else {
        return Ok(Command::Shell);
    };

    match cmd.as_str() {
        "shell" => Ok(Command::Shell),
        "help" => Ok(Command::Help),
        "pools" => Ok(Command::Pools),
        "pool" => Ok(Command::Pool {
            id: required(&mut args, "pool <id>")?,
        }),
        "leaderboard" => {
            let league = match args.next() {
                None => None,
                Some(raw) => Some(
                    League::from_str_loose(&raw).ok_or_else(|| format!("unknown league: {raw}"))?,
                ),
            };
            Ok(Command::Leaderboard { league })
        }
        "score" => {
            let usage = "score <home> <away> <result-home> <result-away>";
            Ok(Command::ScoreCheck {
                prediction: (goals(&mut args, usage)?, goals(&mut args, usage)?),
                result: (goals(&mut args, usage)?, goals(&mut args, usage)?),
            })
        }
        "register" => {
            let usage = "register <username> <email>";
            Ok(Command::Register {
                username: required(&mut args, usage)?,
                email: required(&mut args, usage)?,
            })
        }
        "login" => Ok(Command::Login {
            email: required(&mut args, "login <email>")?,
        }),
        "logout" => Ok(Command::Logout),
        "whoami" => Ok(Command::WhoAmI),
        "wallet" => Ok(Command::Wallet),
        "deposit" => Ok(Command::Deposit {
            amount: amount(&mut args, "deposit <amount>")?,
        }),
        "withdraw" => Ok(Command::Withdraw {
            amount: amount(&mut args, "withdraw <amount>")?,
        }),
        "join" => Ok(Command::Join {
            pool: required(&mut args, "join <pool>")?,
        }),
        "predict" => {
            let usage = "predict <pool> <match> <home> <away>";
            Ok(Command::Predict {
                pool: required(&mut args, usage)?,
                match_id: required(&mut args, usage)?,
                home: goals(&mut args, usage)?,
                away: goals(&mut args, usage)?,
            })
        }
        "profile" => Ok(Command::Profile),
        "kickoff" => Ok(Command::Kickoff {
            match_id: required(&mut args, "kickoff <match>")?,
        }),
        "result" => {
            let usage = "result <match> <home> <away>";
            Ok(Command::RecordResult {
                match_id: required(&mut args, usage)?,
                home: goals(&mut args, usage)?,
                away: goals(&mut args, usage)?,
            })
        }
        "advance" => {
            let usage = "advance <pool> <upcoming|active|completed>";
            let pool = required(&mut args, usage)?;
            let raw = required(&mut args, usage)?;
            let status = PoolStatus::from_str_loose(&raw)
                .ok_or_else(|| format!("unknown pool status: {raw}"))?;
            Ok(Command::Advance { pool, status })
        }
        "jackpot" => Ok(Command::Jackpot {
            pool: required(&mut args, "jackpot <pool>")?,
        }),
        other => Err(format!("unknown command: {other}")),
    }
}

/// One shell line as a command. Blank lines yield `None`.
pub fn parse_line(line: &str) -> Option<std::result::Result<Command, String>> {
    if line.trim().is_empty() {
        return None;
    }
    let args = std::iter::once("poolctl".to_string())
        .chain(line.split_whitespace().map(str::to_string));
    Some(parse_args(args))
}

/// Midnight UTC after `now`. The demo round is anchored here so its matches
/// are still open for predictions.
pub fn next_round_start(now: DateTime<Utc>) -> DateTime<Utc> {
    (now.date_naive() + Duration::days(1))
        .and_time(NaiveTime::MIN)
        .and_utc()
}

async fn optional_session<S: SessionStore>(platform: &Platform<S>) -> Result<Option<Session>> {
    match platform.session().await {
        Ok(s) => Ok(Some(s)),
        Err(PoolError::NotSignedIn) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

#[allow(clippy::too_many_lines)] // one arm per command
pub async fn run_command<S, W>(platform: &Platform<S>, cmd: Command, out: &mut W) -> Result<()>
where
    S: SessionStore,
    W: Write,
{
    let now = Utc::now();
    match cmd {
        Command::Shell => Ok(()),
        Command::Help => {
            writeln!(out, "{USAGE}")?;
            Ok(())
        }
        Command::Pools => show_pools(platform, out).await,
        Command::Pool { id } => show_pool(platform, &id, out).await,
        Command::Leaderboard { league } => show_leaderboard(platform, league, out).await,
        Command::ScoreCheck { prediction, result } => {
            let pick = scoring::parse_prediction(prediction.0, prediction.1)?;
            let actual = scoring::parse_prediction(result.0, result.1)?;
            let kind = scoring::classify(pick, actual);
            writeln!(
                out,
                "{pick} against {actual}: {} points ({})",
                kind.points(),
                kind.as_str()
            )?;
            Ok(())
        }
        Command::Register { username, email } => {
            let session = platform.register(&username, &email, now).await?;
            writeln!(
                out,
                "Welcome, {}. Signed in as {}.",
                session.user().username,
                session.user().email
            )?;
            Ok(())
        }
        Command::Login { email } => {
            let session = platform.sign_in(&email).await?;
            writeln!(out, "Signed in as {}.", session.user().username)?;
            Ok(())
        }
        Command::Logout => {
            platform.sign_out().await?;
            writeln!(out, "Signed out.")?;
            Ok(())
        }
        Command::WhoAmI => {
            let Some(session) = optional_session(platform).await? else {
                writeln!(out, "Not signed in.")?;
                return Ok(());
            };
            let user = session.user();
            let role = if user.is_admin { " (admin)" } else { "" };
            writeln!(
                out,
                "{} <{}>{role}  balance {}",
                user.username,
                user.email,
                format_currency(platform.balance(&session).await?)
            )?;
            Ok(())
        }
        Command::Wallet => show_wallet(platform, out).await,
        Command::Deposit { amount } => {
            let session = platform.session().await?;
            let tx = platform.deposit(&session, amount, now).await?;
            writeln!(
                out,
                "Deposited {}. Balance {}.",
                format_currency(tx.amount),
                format_currency(platform.balance(&session).await?)
            )?;
            Ok(())
        }
        Command::Withdraw { amount } => {
            let session = platform.session().await?;
            let tx = platform.withdraw(&session, amount, now).await?;
            writeln!(
                out,
                "Withdrew {}. Balance {}.",
                format_currency(tx.amount.abs()),
                format_currency(platform.balance(&session).await?)
            )?;
            Ok(())
        }
        Command::Join { pool } => {
            let session = platform.session().await?;
            let fee = platform.join_pool(&session, &pool, now).await?;
            let name = platform.pool(&pool).await?.name;
            match fee {
                Some(tx) => writeln!(
                    out,
                    "Joined {name}. Entry fee {} charged.",
                    format_currency(tx.amount.abs())
                )?,
                None => writeln!(out, "Joined {name}.")?,
            }
            Ok(())
        }
        Command::Predict {
            pool,
            match_id,
            home,
            away,
        } => {
            let session = platform.session().await?;
            let score = scoring::parse_prediction(home, away)?;
            let saved = platform
                .submit_prediction(&session, &pool, &match_id, score, now)
                .await?;
            let m = platform.match_by_id(&match_id).await?;
            let verb = if saved.updated_at.is_some() { "Updated" } else { "Saved" };
            writeln!(
                out,
                "{verb} {} for {} vs {}.",
                saved.score, m.home_team, m.away_team
            )?;
            Ok(())
        }
        Command::Profile => show_profile(platform, out).await,
        Command::Kickoff { match_id } => {
            let session = platform.session().await?;
            let m = platform.start_match(&session, &match_id).await?;
            writeln!(out, "{} vs {} is live.", m.home_team, m.away_team)?;
            Ok(())
        }
        Command::RecordResult {
            match_id,
            home,
            away,
        } => {
            let session = platform.session().await?;
            let result = scoring::parse_prediction(home, away)?;
            let scored = platform.record_result(&session, &match_id, result).await?;
            writeln!(out, "Final {result}. {scored} predictions scored.")?;
            Ok(())
        }
        Command::Advance { pool, status } => {
            let session = platform.session().await?;
            let pool = platform.advance_pool(&session, &pool, status).await?;
            writeln!(out, "{} is now {}.", pool.name, pool.status)?;
            Ok(())
        }
        Command::Jackpot { pool } => {
            let session = platform.session().await?;
            let payouts = platform.settle_jackpot(&session, &pool, now).await?;
            if payouts.is_empty() {
                writeln!(out, "Nobody called every match. No jackpot paid.")?;
            }
            for tx in payouts {
                let name = platform.user(&tx.user_id).await?.username;
                writeln!(out, "Paid {} to {name}.", format_currency(tx.amount))?;
            }
            Ok(())
        }
    }
}

/// Reads commands line by line until EOF or `quit`. Domain errors are
/// printed and the shell carries on; storage and I/O errors end it.
pub async fn run_shell<S, R, W>(platform: &Platform<S>, input: R, out: &mut W) -> Result<()>
where
    S: SessionStore,
    R: AsyncBufRead + Unpin,
    W: Write,
{
    writeln!(out, "Type `help` for commands, `quit` to leave.")?;
    out.flush()?;

    let mut lines = input.lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if matches!(line, "quit" | "exit") {
            break;
        }
        let cmd = match parse_line(line) {
            None => continue,
            Some(Ok(Command::Shell)) => continue,
            Some(Ok(cmd)) => cmd,
            Some(Err(usage)) => {
                writeln!(out, "{usage}")?;
                continue;
            }
        };

        if let Err(e) = run_command(platform, cmd, out).await {
            match e.downcast_ref::<PoolError>() {
                None | Some(PoolError::Storage(_)) => return Err(e),
                Some(domain) => {
                    tracing::debug!(kind = domain.kind(), "command rejected");
                    writeln!(out, "error: {domain}")?;
                }
            }
        }
        out.flush()?;
    }
    Ok(())
}

async fn show_pools<S: SessionStore, W: Write>(platform: &Platform<S>, out: &mut W) -> Result<()> {
    let pools = platform.pools().await;
    if pools.is_empty() {
        writeln!(out, "No pools available.")?;
        return Ok(());
    }
    let session = optional_session(platform).await?;
    for p in pools {
        let joined = match &session {
            Some(s) => platform.has_joined(s.user_id(), &p.id).await,
            None => false,
        };
        let joined = if joined { "  [joined]" } else { "" };
        writeln!(
            out,
            "{:<4} {:<26} {:<15} fee {:>8}  jackpot {:>10}  {:<9} {} to {}{joined}",
            p.id,
            p.name,
            p.league.as_str(),
            format_currency(p.entry_fee),
            format_currency(p.jackpot),
            p.status.as_str(),
            format_date(p.start_date, false),
            format_date(p.end_date, false),
        )?;
    }
    Ok(())
}

async fn show_pool<S: SessionStore, W: Write>(
    platform: &Platform<S>,
    id: &str,
    out: &mut W,
) -> Result<()> {
    let pool = platform.pool(id).await?;
    writeln!(out, "{} ({}, {})", pool.name, pool.league, pool.status)?;
    writeln!(
        out,
        "Entry fee {}  Jackpot {}",
        format_currency(pool.entry_fee),
        format_currency(pool.jackpot)
    )?;

    let picks = match optional_session(platform).await? {
        Some(s) => platform.pool_predictions(s.user_id(), &pool.id).await?,
        None => Vec::new(),
    };
    for m in &pool.matches {
        let result = m.result.map_or_else(|| "-".to_string(), |r| r.to_string());
        let pick = picks
            .iter()
            .find(|p| p.match_id == m.id)
            .map_or_else(String::new, |p| match p.points {
                Some(points) => format!("  your pick {} ({points} pts)", p.score),
                None => format!("  your pick {}", p.score),
            });
        writeln!(
            out,
            "{:<4} {:<11} {:>8}  {} vs {}  {result}{pick}",
            m.id,
            format_match_date(m.match_time),
            match_status_label(m),
            m.home_team,
            m.away_team,
        )?;
    }
    Ok(())
}

async fn show_leaderboard<S: SessionStore, W: Write>(
    platform: &Platform<S>,
    league: Option<League>,
    out: &mut W,
) -> Result<()> {
    let entries = match league {
        Some(l) => platform.league_leaderboard(l).await,
        None => platform.leaderboard().await,
    };
    if entries.is_empty() {
        writeln!(out, "No settled predictions yet.")?;
        return Ok(());
    }
    writeln!(out, "rank  player            points  exact  ties  outcomes")?;
    for e in entries {
        writeln!(
            out,
            "{:>4}  {:<16} {:>7}  {:>5}  {:>4}  {:>8}",
            e.rank, e.username, e.points, e.correct_scores, e.correct_ties, e.correct_outcomes
        )?;
    }
    Ok(())
}

async fn show_wallet<S: SessionStore, W: Write>(platform: &Platform<S>, out: &mut W) -> Result<()> {
    let session = platform.session().await?;
    writeln!(
        out,
        "Balance {}",
        format_currency(platform.balance(&session).await?)
    )?;
    for tx in platform.history(&session).await {
        writeln!(
            out,
            "{}  {:<10} {:>10}  {}",
            format_date(tx.created_at, true),
            tx.kind.as_str(),
            format_currency(tx.amount),
            tx.description
        )?;
    }
    Ok(())
}

async fn show_profile<S: SessionStore, W: Write>(platform: &Platform<S>, out: &mut W) -> Result<()> {
    let session = platform.session().await?;
    let user = session.user();
    let stats = platform.profile_stats(&user.id).await;
    writeln!(
        out,
        "{}  member since {}",
        user.username,
        format_date(user.created_at, false)
    )?;
    writeln!(
        out,
        "Predictions {} ({} settled)  Points {}",
        stats.total, stats.settled, stats.points
    )?;
    for (label, count) in [
        ("Exact scores", stats.correct_scores),
        ("Correct ties", stats.correct_ties),
        ("Correct outcomes", stats.correct_outcomes),
    ] {
        writeln!(
            out,
            "{label:<17} {count:>3}  ({:.0}%)",
            stats.share(count) * 100.0
        )?;
    }
    Ok(())
}
