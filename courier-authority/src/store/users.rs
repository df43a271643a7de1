// SPDX-FileCopyrightText: 2025 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Portal principal CRUD (§3 "User"). Emails are normalized to lowercase
//! before every lookup and insert, matching the `Email::normalize` rule.

use chrono::{DateTime, Utc};
use courier_common::identifiers::{ClientId, Email, Role};

use super::AuthorityStore;
use crate::error::AuthorityError;

#[derive(Clone, Debug)]
pub struct UserRecord {
    pub email: Email,
    pub password_hash: String,
    pub role: Role,
    pub client_id: Option<ClientId>,
    pub is_active: bool,
    pub last_login: Option<DateTime<Utc>>,
}

pub struct NewUser {
    pub email: Email,
    pub password_hash: String,
    pub role: Role,
    pub client_id: Option<ClientId>,
}

impl AuthorityStore {
    pub async fn insert_user(&self, new: NewUser) -> Result<UserRecord, AuthorityError> {
        sqlx::query!(
            r#"
            INSERT INTO users (email, password_hash, role, client_id, is_active)
            VALUES ($1, $2, $3, $4, true)
            "#,
            new.email.as_str(),
            new.password_hash,
            role_str(new.role),
            new.client_id.as_ref().map(ClientId::as_str),
        )
        .execute(self.pool())
        .await?;

        self.get_user(&new.email).await
    }

    pub async fn get_user(&self, email: &Email) -> Result<UserRecord, AuthorityError> {
        let row = sqlx::query!(
            r#"
            SELECT email, password_hash, role, client_id, is_active, last_login
            FROM users WHERE email = $1
            "#,
            email.as_str(),
        )
        .fetch_optional(self.pool())
        .await?
        .ok_or_else(|| AuthorityError::UserNotFound(email.to_string()))?;

        Ok(UserRecord {
            email: Email::normalize(&row.email),
            password_hash: row.password_hash,
            role: parse_role(&row.role),
            client_id: row.client_id.map(ClientId::from),
            is_active: row.is_active,
            last_login: row.last_login,
        })
    }

    /// Updates `last_login` to now on each successful authentication (§3
    /// "User" lifecycle).
    pub async fn record_login(&self, email: &Email) -> Result<(), AuthorityError> {
        sqlx::query!(
            "UPDATE users SET last_login = $2 WHERE email = $1",
            email.as_str(),
            Utc::now(),
        )
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn set_active(&self, email: &Email, is_active: bool) -> Result<UserRecord, AuthorityError> {
        sqlx::query!(
            "UPDATE users SET is_active = $2 WHERE email = $1",
            email.as_str(),
            is_active,
        )
        .execute(self.pool())
        .await?;
        self.get_user(email).await
    }
}

fn parse_role(raw: &str) -> Role {
    match raw {
        "admin" => Role::Admin,
        _ => Role::User,
    }
}

fn role_str(role: Role) -> &'static str {
    match role {
        Role::Admin => "admin",
        Role::User => "user",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_round_trips_through_string() {
        for role in [Role::Admin, Role::User] {
            assert_eq!(parse_role(role_str(role)), role);
        }
    }
}
