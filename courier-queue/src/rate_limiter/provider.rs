// SPDX-FileCopyrightText: 2025 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use sqlx::PgPool;

use super::{Allowance, RLKey, StorageProvider};

pub struct RLPostgresStorage {
    pool: PgPool,
}

impl RLPostgresStorage {
    pub fn new(pool: PgPool) -> Self {
        RLPostgresStorage { pool }
    }
}

impl StorageProvider for RLPostgresStorage {
    async fn get(&self, key: &RLKey) -> Option<Allowance> {
        persistence::load(&self.pool, key).await.ok().flatten()
    }

    async fn set(&self, key: RLKey, allowance: Allowance) {
        if let Err(err) = persistence::store(&self.pool, &key, &allowance).await {
            tracing::error!(%err, "failed to store rate-limit allowance in Postgres");
        }
    }
}

mod persistence {
    use sqlx::{
        types::chrono::{DateTime, Utc},
        PgExecutor,
    };

    use super::{Allowance, RLKey};

    pub(super) async fn load(
        connection: impl PgExecutor<'_>,
        key: &RLKey,
    ) -> Result<Option<Allowance>, sqlx::Error> {
        struct Record {
            remaining: i64,
            valid_until: DateTime<Utc>,
        }

        let record = sqlx::query_as!(
            Record,
            r#"SELECT remaining, valid_until FROM rate_limit_allowances WHERE rl_key = $1"#,
            key.serialize(),
        )
        .fetch_optional(connection)
        .await?;

        Ok(record.map(|record| Allowance {
            remaining: record.remaining as u64,
            valid_until: record.valid_until,
        }))
    }

    pub(super) async fn store(
        connection: impl PgExecutor<'_>,
        key: &RLKey,
        allowance: &Allowance,
    ) -> Result<(), sqlx::Error> {
        sqlx::query!(
            r#"
            INSERT INTO rate_limit_allowances (rl_key, remaining, valid_until)
            VALUES ($1, $2, $3)
            ON CONFLICT (rl_key) DO UPDATE
                SET remaining = EXCLUDED.remaining, valid_until = EXCLUDED.valid_until
            "#,
            key.serialize(),
            allowance.remaining as i64,
            allowance.valid_until,
        )
        .execute(connection)
        .await?;
        Ok(())
    }
}

/// In-memory [`StorageProvider`] kept as the unit-test double (ground: the
/// teacher's `InMemoryStorage` in `backend/src/rate_limiter/mod.rs`'s test
/// module).
#[derive(Default)]
pub struct InMemoryStorage {
    data: tokio::sync::Mutex<std::collections::HashMap<Vec<u8>, Allowance>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StorageProvider for InMemoryStorage {
    async fn get(&self, key: &RLKey) -> Option<Allowance> {
        self.data.lock().await.get(key.serialize()).cloned()
    }

    async fn set(&self, key: RLKey, allowance: Allowance) {
        self.data
            .lock()
            .await
            .insert(key.serialize().to_owned(), allowance);
    }
}
