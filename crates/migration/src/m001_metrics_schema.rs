use sea_orm_migration::prelude::*;

pub struct Migration;

impl MigrationName for Migration {
    fn name(&self) -> &str {
        "m001_metrics_schema"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();
        for sql in UP_SQL {
            db.execute_unprepared(sql).await?;
        }
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();
        for sql in DOWN_SQL {
            db.execute_unprepared(sql).await?;
        }
        Ok(())
    }
}

// Portable between PostgreSQL and SQLite; every statement is idempotent.
const UP_SQL: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS counters (
        name TEXT PRIMARY KEY NOT NULL,
        delta BIGINT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_counters_name ON counters (name)",
    "CREATE TABLE IF NOT EXISTS gauges (
        name TEXT PRIMARY KEY NOT NULL,
        value DOUBLE PRECISION NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_gauges_name ON gauges (name)",
];

const DOWN_SQL: &[&str] = &[
    "DROP INDEX IF EXISTS idx_gauges_name",
    "DROP TABLE IF EXISTS gauges",
    "DROP INDEX IF EXISTS idx_counters_name",
    "DROP TABLE IF EXISTS counters",
];
