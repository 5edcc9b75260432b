use async_trait::async_trait;
use scan_model::{OwnerId, ReportId, ScanRequest, StartFromMode, TaskId};
use sqlx::{PgPool, Row};

use super::QueueStore;
use crate::error::{Result, ScanError};

/// Postgres-backed queue store. One row per in-flight scan request in
/// `scan_queue`; `position` is a monotonic sequence so `move_to_end` is a
/// single `UPDATE ... SET position = nextval(...)`.
pub struct PostgresQueueStore {
    pool: PgPool,
}

impl PostgresQueueStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE SEQUENCE IF NOT EXISTS scan_queue_position_seq;
            CREATE TABLE IF NOT EXISTS scan_queue (
                report_id TEXT PRIMARY KEY,
                report_row_key BIGINT NOT NULL,
                task_row_key BIGINT NOT NULL,
                task_id UUID NOT NULL,
                owner_key UUID NOT NULL,
                start_from SMALLINT NOT NULL,
                handler_pid BIGINT,
                position BIGINT NOT NULL DEFAULT nextval('scan_queue_position_seq')
            );
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    fn start_from_to_i16(mode: StartFromMode) -> i16 {
        match mode {
            StartFromMode::FromScratch => 0,
            StartFromMode::ResumeRequired => 1,
            StartFromMode::ResumeOrScratch => 2,
        }
    }

    fn start_from_from_i16(value: i16) -> StartFromMode {
        match value {
            1 => StartFromMode::ResumeRequired,
            2 => StartFromMode::ResumeOrScratch,
            _ => StartFromMode::FromScratch,
        }
    }
}

#[async_trait]
impl QueueStore for PostgresQueueStore {
    async fn enqueue(&self, request: ScanRequest) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO scan_queue
                (report_id, report_row_key, task_row_key, task_id, owner_key, start_from, handler_pid)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(request.report_id.as_str())
        .bind(request.report_row_key)
        .bind(request.task_row_key)
        .bind(request.task_id.as_uuid())
        .bind(request.owner_key.as_uuid())
        .bind(Self::start_from_to_i16(request.start_from))
        .bind(request.handler_pid.map(i64::from))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn iterate(&self) -> Result<Vec<ScanRequest>> {
        let rows = sqlx::query(
            r#"
            SELECT report_id, report_row_key, task_row_key, task_id, owner_key, start_from, handler_pid, position
            FROM scan_queue
            ORDER BY position ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let handler_pid: Option<i64> = row.get("handler_pid");
                ScanRequest {
                    report_id: ReportId::new(row.get::<String, _>("report_id")),
                    report_row_key: row.get("report_row_key"),
                    task_row_key: row.get("task_row_key"),
                    task_id: TaskId::from(row.get::<uuid::Uuid, _>("task_id")),
                    owner_key: OwnerId::from(row.get::<uuid::Uuid, _>("owner_key")),
                    start_from: Self::start_from_from_i16(row.get("start_from")),
                    handler_pid: handler_pid.map(|pid| pid as u32),
                    position: row.get::<i64, _>("position") as u64,
                }
            })
            .collect())
    }

    async fn move_to_end(&self, report_id: &ReportId) -> Result<()> {
        let result = sqlx::query(
            "UPDATE scan_queue SET position = nextval('scan_queue_position_seq') WHERE report_id = $1",
        )
        .bind(report_id.as_str())
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(ScanError::ScanNotFound(report_id.to_string()));
        }
        Ok(())
    }

    async fn set_handler_pid(&self, report_id: &ReportId, pid: u32) -> Result<()> {
        let result = sqlx::query("UPDATE scan_queue SET handler_pid = $1 WHERE report_id = $2")
            .bind(i64::from(pid))
            .bind(report_id.as_str())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(ScanError::ScanNotFound(report_id.to_string()));
        }
        Ok(())
    }

    async fn remove(&self, report_id: &ReportId) -> Result<()> {
        sqlx::query("DELETE FROM scan_queue WHERE report_id = $1")
            .bind(report_id.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn length(&self) -> Result<usize> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM scan_queue")
            .fetch_one(&self.pool)
            .await?;
        let count: i64 = row.get("count");
        Ok(count as usize)
    }
}
