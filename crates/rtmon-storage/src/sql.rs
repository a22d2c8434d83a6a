use async_trait::async_trait;
use migration::{Migrator, MigratorTrait};
use rtmon_common::types::MetricKind;
use sea_orm::{
    ConnectionTrait, Database, DatabaseConnection, DbBackend, DbErr, Statement, TransactionTrait, Value,
};
use tokio::sync::Mutex;

use crate::error::{Result, StorageError};
use crate::{CounterMap, GaugeMap, Storage};

/// Rows per multi-row upsert, kept well under SQLite's 999 bind limit.
const UPSERT_CHUNK: usize = 400;

const COUNTER_CONFLICT: &str = "ON CONFLICT (name) DO UPDATE SET delta = counters.delta + excluded.delta";
const GAUGE_CONFLICT: &str = "ON CONFLICT (name) DO UPDATE SET value = excluded.value";

/// PostgreSQL (or SQLite) backend with one row per metric name.
///
/// Counter accumulation is an `INSERT .. ON CONFLICT DO UPDATE` so that
/// concurrent writers, even from other processes, are summed by the
/// database itself.
pub struct SqlStore {
    db: DatabaseConnection,
    batch_lock: Mutex<()>,
}

impl SqlStore {
    /// Connects and brings the schema up to date before returning.
    pub async fn connect(dsn: &str) -> Result<Self> {
        let db = Database::connect(dsn).await?;
        Migrator::up(&db, None).await?;
        tracing::info!(backend = ?db.get_database_backend(), "SQL storage initialized");
        Ok(Self {
            db,
            batch_lock: Mutex::new(()),
        })
    }

    fn backend(&self) -> DbBackend {
        self.db.get_database_backend()
    }

    fn statement(&self, sql: String, values: Vec<Value>) -> Statement {
        Statement::from_sql_and_values(self.backend(), sql, values)
    }

    /// `INSERT INTO table (name, col) VALUES (..), (..) ON CONFLICT ..`
    fn upsert<V>(&self, table: &str, column: &str, conflict: &str, rows: &[(&String, V)]) -> Statement
    where
        V: Into<Value> + Copy,
    {
        let backend = self.backend();
        let mut values = Vec::with_capacity(rows.len() * 2);
        let tuples: Vec<String> = rows
            .iter()
            .enumerate()
            .map(|(i, (name, v))| {
                values.push(Value::from((*name).clone()));
                values.push((*v).into());
                format!("({}, {})", placeholder(backend, i * 2 + 1), placeholder(backend, i * 2 + 2))
            })
            .collect();
        let sql = format!(
            "INSERT INTO {table} (name, {column}) VALUES {} {conflict}",
            tuples.join(", ")
        );
        self.statement(sql, values)
    }

    fn select_one(&self, table: &str, column: &str, name: &str) -> Statement {
        let sql = format!(
            "SELECT {column} FROM {table} WHERE name = {}",
            placeholder(self.backend(), 1)
        );
        self.statement(sql, vec![name.into()])
    }
}

fn placeholder(backend: DbBackend, n: usize) -> String {
    match backend {
        DbBackend::Postgres => format!("${n}"),
        _ => "?".to_string(),
    }
}

#[async_trait]
impl Storage for SqlStore {
    async fn store_gauge(&self, name: &str, value: f64) -> Result<()> {
        let name = name.to_string();
        let stmt = self.upsert("gauges", "value", GAUGE_CONFLICT, &[(&name, value)]);
        self.db.execute(stmt).await?;
        Ok(())
    }

    async fn get_gauge(&self, name: &str) -> Result<f64> {
        let row = self.db.query_one(self.select_one("gauges", "value", name)).await?;
        match row {
            Some(row) => Ok(row.try_get::<f64>("", "value")?),
            None => Err(StorageError::not_found(MetricKind::Gauge, name)),
        }
    }

    async fn store_counter(&self, name: &str, delta: i64) -> Result<()> {
        let name = name.to_string();
        let stmt = self.upsert("counters", "delta", COUNTER_CONFLICT, &[(&name, delta)]);
        self.db.execute(stmt).await?;
        Ok(())
    }

    async fn get_counter(&self, name: &str) -> Result<i64> {
        let row = self.db.query_one(self.select_one("counters", "delta", name)).await?;
        match row {
            Some(row) => Ok(row.try_get::<i64>("", "delta")?),
            None => Err(StorageError::not_found(MetricKind::Counter, name)),
        }
    }

    async fn store_all(&self, counters: &CounterMap, gauges: &GaugeMap) -> Result<()> {
        if counters.is_empty() && gauges.is_empty() {
            return Ok(());
        }
        let counter_rows: Vec<(&String, i64)> = counters.iter().map(|(k, v)| (k, *v)).collect();
        let gauge_rows: Vec<(&String, f64)> = gauges.iter().map(|(k, v)| (k, *v)).collect();

        let _guard = self.batch_lock.lock().await;
        let txn = self.db.begin().await?;
        let applied = async {
            for chunk in counter_rows.chunks(UPSERT_CHUNK) {
                txn.execute(self.upsert("counters", "delta", COUNTER_CONFLICT, chunk)).await?;
            }
            for chunk in gauge_rows.chunks(UPSERT_CHUNK) {
                txn.execute(self.upsert("gauges", "value", GAUGE_CONFLICT, chunk)).await?;
            }
            Ok::<_, DbErr>(())
        }
        .await;
        if let Err(e) = applied {
            if let Err(rollback) = txn.rollback().await {
                tracing::warn!(error = %rollback, "Rollback of failed batch failed");
            }
            return Err(e.into());
        }
        txn.commit().await?;

        tracing::debug!(
            counters = counter_rows.len(),
            gauges = gauge_rows.len(),
            "Stored metric batch"
        );
        Ok(())
    }

    async fn get_all(&self) -> Result<(CounterMap, GaugeMap)> {
        let counter_rows = self
            .db
            .query_all(self.statement("SELECT name, delta FROM counters".into(), Vec::new()))
            .await?;
        let gauge_rows = self
            .db
            .query_all(self.statement("SELECT name, value FROM gauges".into(), Vec::new()))
            .await?;

        let mut counters = CounterMap::with_capacity(counter_rows.len());
        for row in counter_rows {
            counters.insert(row.try_get::<String>("", "name")?, row.try_get::<i64>("", "delta")?);
        }
        let mut gauges = GaugeMap::with_capacity(gauge_rows.len());
        for row in gauge_rows {
            gauges.insert(row.try_get::<String>("", "name")?, row.try_get::<f64>("", "value")?);
        }
        Ok((counters, gauges))
    }

    async fn ping(&self) -> Result<()> {
        self.db.ping().await?;
        Ok(())
    }

    fn is_transient(&self, err: &StorageError) -> bool {
        err.is_connection_exception()
    }
}
