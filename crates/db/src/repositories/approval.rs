use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row};

use procura_core::domain::approval::{Approval, ApprovalLevel, Decision};
use procura_core::domain::request::RequestId;

use super::{ApprovalRepository, RepositoryError};
use crate::DbPool;

pub struct SqlApprovalRepository {
    pool: DbPool,
}

impl SqlApprovalRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ApprovalRepository for SqlApprovalRepository {
    async fn append(&self, approval: Approval) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "INSERT INTO approval (request_id, level, decision, approver, comment, decided_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&approval.request_id.0)
        .bind(i64::from(approval.level.number()))
        .bind(approval.decision.as_str())
        .bind(&approval.approver)
        .bind(approval.comment.as_deref())
        .bind(approval.decided_at.to_rfc3339())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db_error)) if db_error.is_unique_violation() => {
                Err(RepositoryError::DuplicateDecision {
                    request_id: approval.request_id.0.clone(),
                    level: approval.level.number(),
                })
            }
            Err(error) => Err(error.into()),
        }
    }

    async fn history(&self, request_id: &RequestId) -> Result<Vec<Approval>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT request_id, level, decision, approver, comment, decided_at
             FROM approval
             WHERE request_id = ?
             ORDER BY level ASC",
        )
        .bind(&request_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(approval_from_row).collect()
    }

    async fn active_at_level(
        &self,
        request_id: &RequestId,
        level: ApprovalLevel,
    ) -> Result<Option<Approval>, RepositoryError> {
        let row = sqlx::query(
            "SELECT request_id, level, decision, approver, comment, decided_at
             FROM approval
             WHERE request_id = ? AND level = ?",
        )
        .bind(&request_id.0)
        .bind(i64::from(level.number()))
        .fetch_optional(&self.pool)
        .await?;

        row.map(approval_from_row).transpose()
    }
}

fn approval_from_row(row: SqliteRow) -> Result<Approval, RepositoryError> {
    let level_raw = row.try_get::<i64, _>("level")?;
    let level = u8::try_from(level_raw)
        .ok()
        .and_then(ApprovalLevel::from_number)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown approval level `{level_raw}`")))?;

    let decision_raw = row.try_get::<String, _>("decision")?;
    let decision = Decision::parse(&decision_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown decision `{decision_raw}`")))?;

    Ok(Approval {
        request_id: RequestId(row.try_get("request_id")?),
        level,
        decision,
        approver: row.try_get("approver")?,
        comment: row.try_get("comment")?,
        decided_at: parse_timestamp("decided_at", row.try_get("decided_at")?)?,
    })
}

fn parse_timestamp(column: &str, value: String) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(&value).map(|timestamp| timestamp.with_timezone(&Utc)).map_err(
        |error| {
            RepositoryError::Decode(format!("invalid timestamp in `{column}`: `{value}` ({error})"))
        },
    )
}
