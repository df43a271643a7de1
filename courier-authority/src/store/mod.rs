// SPDX-FileCopyrightText: 2025 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Authority store (C3): the only component that writes to the relational
//! store. Ground: `backend/src/persistence.rs`'s migrate-then-initialize
//! bootstrap.

pub mod audit;
pub mod clients;
pub mod messages;
pub mod users;

use sqlx::PgPool;

use crate::error::AuthorityError;

#[derive(Clone)]
pub struct AuthorityStore {
    pool: PgPool,
}

impl AuthorityStore {
    pub async fn connect(connection_string: &str) -> Result<Self, AuthorityError> {
        let pool = PgPool::connect(connection_string).await?;
        Ok(Self { pool })
    }

    pub async fn run_migrations(&self) -> Result<(), AuthorityError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|err| AuthorityError::Database(sqlx::Error::Migrate(Box::new(err))))?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}
