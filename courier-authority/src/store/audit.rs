// SPDX-FileCopyrightText: 2025 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Append-only audit trail (§3 "AuditEvent"). Written on every admin action
//! and every message state transition (§4.4 "Observable side effects");
//! never updated by application code, only pruned by an external retention
//! job.

use chrono::{DateTime, Utc};

use super::AuthorityStore;
use crate::error::AuthorityError;

pub struct AuditEvent<'a> {
    pub actor: &'a str,
    pub action: &'a str,
    pub subject_id: &'a str,
    pub outcome: &'a str,
}

#[derive(Clone, Debug)]
pub struct AuditEventRecord {
    pub id: i64,
    pub actor: String,
    pub action: String,
    pub subject_id: String,
    pub outcome: String,
    pub created_at: DateTime<Utc>,
}

impl AuthorityStore {
    pub async fn append_audit_event(&self, event: AuditEvent<'_>) -> Result<(), AuthorityError> {
        sqlx::query!(
            r#"
            INSERT INTO audit_log (actor, action, subject_id, outcome)
            VALUES ($1, $2, $3, $4)
            "#,
            event.actor,
            event.action,
            event.subject_id,
            event.outcome,
        )
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Most recent audit events, newest first — used by the admin stats
    /// endpoint (§6.2 `GET /admin/stats`).
    pub async fn recent_audit_events(&self, limit: i64) -> Result<Vec<AuditEventRecord>, AuthorityError> {
        let rows = sqlx::query!(
            r#"
            SELECT id, actor, action, subject_id, outcome, created_at
            FROM audit_log ORDER BY id DESC LIMIT $1
            "#,
            limit,
        )
        .fetch_all(self.pool())
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| AuditEventRecord {
                id: row.id,
                actor: row.actor,
                action: row.action,
                subject_id: row.subject_id,
                outcome: row.outcome,
                created_at: row.created_at,
            })
            .collect())
    }
}
