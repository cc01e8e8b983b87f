use anyhow::{Context, Result};
use chrono::Utc;
use common::config::{Config, SessionBackend};
use engine::{AnySessionStore, MemorySessionStore, Platform, SqliteSessionStore};

mod cli;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load()?;

    let (dispatch, _otel_guard) =
        common::observability::build_dispatch("poolctl", &config.general.log_level);
    tracing::dispatcher::set_global_default(dispatch).map_err(anyhow::Error::msg)?;
    engine::metrics::describe();

    let cmd = cli::parse_args(std::env::args()).map_err(anyhow::Error::msg)?;

    let store = match config.session.backend {
        SessionBackend::Memory => AnySessionStore::Memory(MemorySessionStore::new()),
        SessionBackend::Sqlite => {
            let db = common::db::AsyncDb::open(&config.database.path)
                .await
                .with_context(|| format!("opening session store at {}", config.database.path))?;
            tracing::warn!(
                path = %config.database.path,
                "only the signed-in user is persisted; pools, memberships and predictions reset each run"
            );
            AnySessionStore::Sqlite(SqliteSessionStore::new(db))
        }
    };

    let platform = if config.pools.seed_fixtures {
        let fixtures = engine::fixtures::demo_from(cli::next_round_start(Utc::now()));
        Platform::seeded(store, fixtures).await?
    } else {
        Platform::new(store)
    };
    if let Some(session) = platform.restore().await? {
        tracing::info!(user_id = %session.user_id(), "resuming signed-in user");
    }

    let mut stdout = std::io::stdout();
    match cmd {
        cli::Command::Shell => {
            let stdin = tokio::io::BufReader::new(tokio::io::stdin());
            cli::run_shell(&platform, stdin, &mut stdout).await
        }
        cmd => cli::run_command(&platform, cmd, &mut stdout).await,
    }
}
