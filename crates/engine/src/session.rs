use anyhow::{Context, Result};
use common::db::AsyncDb;
use common::types::User;
use tokio::sync::RwLock;

use crate::error::PoolError;

pub const CURRENT_USER_KEY: &str = "soccer_betting_current_user";

/// Opaque persistence for the signed-in user.
pub trait SessionStore {
    fn current_user(&self) -> impl std::future::Future<Output = Result<Option<User>>> + Send;
    fn set_current_user(&self, user: &User) -> impl std::future::Future<Output = Result<()>> + Send;
    fn clear_current_user(&self) -> impl std::future::Future<Output = Result<()>> + Send;
}

/// Process-local session. Gone when the process exits.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    user: RwLock<Option<User>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySessionStore {
    async fn current_user(&self) -> Result<Option<User>> {
        Ok(self.user.read().await.clone())
    }

    async fn set_current_user(&self, user: &User) -> Result<()> {
        *self.user.write().await = Some(user.clone());
        Ok(())
    }

    async fn clear_current_user(&self) -> Result<()> {
        *self.user.write().await = None;
        Ok(())
    }
}

/// Session kept as a JSON value in the SQLite `kv_store` table.
#[derive(Clone)]
pub struct SqliteSessionStore {
    db: AsyncDb,
}

impl SqliteSessionStore {
    pub fn new(db: AsyncDb) -> Self {
        Self { db }
    }
}

impl SessionStore for SqliteSessionStore {
    async fn current_user(&self) -> Result<Option<User>> {
        self.db
            .get("session.get", CURRENT_USER_KEY)
            .await?
            .map(|json| serde_json::from_str(&json).context("corrupt session record"))
            .transpose()
    }

    async fn set_current_user(&self, user: &User) -> Result<()> {
        let json = serde_json::to_string(user)?;
        self.db.put("session.set", CURRENT_USER_KEY, json).await
    }

    async fn clear_current_user(&self) -> Result<()> {
        self.db.delete("session.clear", CURRENT_USER_KEY).await
    }
}

/// Backend picked at runtime from config.
pub enum AnySessionStore {
    Memory(MemorySessionStore),
    Sqlite(SqliteSessionStore),
}

impl SessionStore for AnySessionStore {
    async fn current_user(&self) -> Result<Option<User>> {
        match self {
            Self::Memory(s) => s.current_user().await,
            Self::Sqlite(s) => s.current_user().await,
        }
    }

    async fn set_current_user(&self, user: &User) -> Result<()> {
        match self {
            Self::Memory(s) => s.set_current_user(user).await,
            Self::Sqlite(s) => s.set_current_user(user).await,
        }
    }

    async fn clear_current_user(&self) -> Result<()> {
        match self {
            Self::Memory(s) => s.clear_current_user().await,
            Self::Sqlite(s) => s.clear_current_user().await,
        }
    }
}

/// The signed-in user, passed explicitly to every operation that acts on
/// their behalf.
#[derive(Debug, Clone)]
pub struct Session {
    user: User,
}

impl Session {
    pub fn new(user: User) -> Self {
        Self { user }
    }

    pub fn user(&self) -> &User {
        &self.user
    }

    pub fn user_id(&self) -> &str {
        &self.user.id
    }

    pub fn require_admin(&self) -> std::result::Result<(), PoolError> {
        if self.user.is_admin {
            Ok(())
        } else {
            Err(PoolError::AdminOnly)
        }
    }
}
