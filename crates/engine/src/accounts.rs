use chrono::{DateTime, Utc};
use common::types::User;
use rust_decimal::Decimal;
use tracing::info;

use crate::error::{PoolError, Result};

/// Registered users. Emails are unique, compared case-insensitively.
#[derive(Debug, Default)]
pub struct Accounts {
    users: Vec<User>,
}

impl Accounts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, user: User) {
        self.users.retain(|u| u.id != user.id);
        self.users.push(user);
    }

    pub fn users(&self) -> &[User] {
        &self.users
    }

    pub fn by_id(&self, id: &str) -> Result<&User> {
        self.users
            .iter()
            .find(|u| u.id == id)
            .ok_or_else(|| PoolError::UnknownUser(id.to_string()))
    }

    pub fn by_email(&self, email: &str) -> Option<&User> {
        self.users
            .iter()
            .find(|u| u.email.eq_ignore_ascii_case(email.trim()))
    }

    pub fn username_of(&self, id: &str) -> Option<String> {
        self.by_id(id).ok().map(|u| u.username.clone())
    }

    /// New accounts start with an empty wallet and no admin rights.
    pub fn register(&mut self, username: &str, email: &str, now: DateTime<Utc>) -> Result<User> {
        let email = email.trim();
        if self.by_email(email).is_some() {
            return Err(PoolError::EmailTaken(email.to_string()));
        }
        let user = User {
            id: format!("user_{}", uuid::Uuid::new_v4().simple()),
            username: username.trim().to_string(),
            email: email.to_string(),
            wallet: Decimal::ZERO,
            is_admin: false,
            created_at: now,
        };
        self.users.push(user.clone());
        info!(user_id = %user.id, username = %user.username, "account registered");
        Ok(user)
    }

    pub fn set_wallet(&mut self, id: &str, balance: Decimal) -> Result<User> {
        let user = self
            .users
            .iter_mut()
            .find(|u| u.id == id)
            .ok_or_else(|| PoolError::UnknownUser(id.to_string()))?;
        user.wallet = balance;
        Ok(user.clone())
    }
}
