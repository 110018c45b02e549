//! SQLite persistence
//!
//! Every entity lives in its own table with a uniform shape: scoping and
//! filter columns are real columns, the full record is a JSON document in
//! `data`. All entities are keyed by id and reference each other by id
//! (foreign-key fields in the JSON), which keeps the lineage graph acyclic
//! in memory and trivially serializable.
//!
//! Every query binds `organization_slug`; a cross-org lookup by id resolves
//! to `None`/empty, never to a foreign row. Deletes are idempotent: a row
//! that is already gone is a success, not `NOT_FOUND`. That policy is
//! implemented here once, not per call site.

#[cfg(test)]
mod tests;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};

use crate::error::Result;

/// Closed set of entity tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    Universes,
    Targets,
    Sources,
    SeenItems,
    Articles,
    Signals,
    Analysts,
    Predictors,
    Strategies,
    Predictions,
    Evaluations,
    Learnings,
    LearningQueue,
    ReviewQueue,
    PromotionHistory,
    Scenarios,
    PriceData,
    MissedOpportunities,
    Alerts,
}

impl Table {
    pub const ALL: [Table; 19] = [
        Table::Universes,
        Table::Targets,
        Table::Sources,
        Table::SeenItems,
        Table::Articles,
        Table::Signals,
        Table::Analysts,
        Table::Predictors,
        Table::Strategies,
        Table::Predictions,
        Table::Evaluations,
        Table::Learnings,
        Table::LearningQueue,
        Table::ReviewQueue,
        Table::PromotionHistory,
        Table::Scenarios,
        Table::PriceData,
        Table::MissedOpportunities,
        Table::Alerts,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Table::Universes => "universes",
            Table::Targets => "targets",
            Table::Sources => "sources",
            Table::SeenItems => "seen_items",
            Table::Articles => "articles",
            Table::Signals => "signals",
            Table::Analysts => "analysts",
            Table::Predictors => "predictors",
            Table::Strategies => "strategies",
            Table::Predictions => "predictions",
            Table::Evaluations => "evaluations",
            Table::Learnings => "learnings",
            Table::LearningQueue => "learning_queue",
            Table::ReviewQueue => "review_queue",
            Table::PromotionHistory => "promotion_history",
            Table::Scenarios => "scenarios",
            Table::PriceData => "price_data",
            Table::MissedOpportunities => "missed_opportunities",
            Table::Alerts => "alerts",
        }
    }
}

/// A persistable entity. Accessors feed the indexed columns; everything
/// else rides in the JSON document.
pub trait Doc: Serialize + DeserializeOwned + Send + Sync {
    const TABLE: Table;

    fn id(&self) -> &str;
    fn org(&self) -> &str;
    fn created_at(&self) -> DateTime<Utc>;

    fn universe_id(&self) -> Option<&str> {
        None
    }
    fn target_id(&self) -> Option<&str> {
        None
    }
    fn scenario_id(&self) -> Option<&str> {
        None
    }
    /// Secondary lookup key (fingerprint hash, seen-item identity, slug).
    fn doc_key(&self) -> Option<&str> {
        None
    }
    fn status(&self) -> Option<&str> {
        None
    }
    fn is_test(&self) -> bool {
        false
    }
}

/// Column filters for list/count/delete queries.
#[derive(Debug, Clone, Default)]
pub struct DocFilter {
    pub universe_id: Option<String>,
    pub target_id: Option<String>,
    pub scenario_id: Option<String>,
    pub doc_key: Option<String>,
    pub status: Option<String>,
    pub is_test: Option<bool>,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl DocFilter {
    pub fn universe(mut self, id: impl Into<String>) -> Self {
        self.universe_id = Some(id.into());
        self
    }

    pub fn target(mut self, id: impl Into<String>) -> Self {
        self.target_id = Some(id.into());
        self
    }

    pub fn scenario(mut self, id: impl Into<String>) -> Self {
        self.scenario_id = Some(id.into());
        self
    }

    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.doc_key = Some(key.into());
        self
    }

    pub fn status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    pub fn test(mut self, is_test: bool) -> Self {
        self.is_test = Some(is_test);
        self
    }

    pub fn after(mut self, t: DateTime<Utc>) -> Self {
        self.created_after = Some(t);
        self
    }

    pub fn before(mut self, t: DateTime<Utc>) -> Self {
        self.created_before = Some(t);
        self
    }

    pub fn limit(mut self, n: u32) -> Self {
        self.limit = Some(n);
        self
    }

    pub fn offset(mut self, n: u32) -> Self {
        self.offset = Some(n);
        self
    }
}

enum BindVal {
    Text(String),
    Int(i64),
}

fn where_clause(filter: &DocFilter) -> (String, Vec<BindVal>) {
    let mut sql = String::new();
    let mut binds = Vec::new();
    if let Some(v) = &filter.universe_id {
        sql.push_str(" AND universe_id = ?");
        binds.push(BindVal::Text(v.clone()));
    }
    if let Some(v) = &filter.target_id {
        sql.push_str(" AND target_id = ?");
        binds.push(BindVal::Text(v.clone()));
    }
    if let Some(v) = &filter.scenario_id {
        sql.push_str(" AND scenario_id = ?");
        binds.push(BindVal::Text(v.clone()));
    }
    if let Some(v) = &filter.doc_key {
        sql.push_str(" AND doc_key = ?");
        binds.push(BindVal::Text(v.clone()));
    }
    if let Some(v) = &filter.status {
        sql.push_str(" AND status = ?");
        binds.push(BindVal::Text(v.clone()));
    }
    if let Some(v) = filter.is_test {
        sql.push_str(" AND is_test = ?");
        binds.push(BindVal::Int(v as i64));
    }
    if let Some(v) = filter.created_after {
        sql.push_str(" AND created_at >= ?");
        binds.push(BindVal::Text(v.to_rfc3339()));
    }
    if let Some(v) = filter.created_before {
        sql.push_str(" AND created_at <= ?");
        binds.push(BindVal::Text(v.to_rfc3339()));
    }
    (sql, binds)
}

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn connect(url: &str) -> Result<Self> {
        // A :memory: database exists per-connection; keep the pool at one
        // so every query sees the same database.
        let max_connections = if url.contains(":memory:") { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;
        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    pub async fn in_memory() -> Result<Self> {
        Self::connect("sqlite::memory:").await
    }

    async fn migrate(&self) -> Result<()> {
        for table in Table::ALL {
            let name = table.name();
            let ddl = format!(
                "CREATE TABLE IF NOT EXISTS {name} (
                    id TEXT PRIMARY KEY,
                    organization_slug TEXT NOT NULL,
                    universe_id TEXT,
                    target_id TEXT,
                    scenario_id TEXT,
                    doc_key TEXT,
                    status TEXT,
                    is_test INTEGER NOT NULL DEFAULT 0,
                    created_at TEXT NOT NULL,
                    data TEXT NOT NULL
                )"
            );
            sqlx::query(&ddl).execute(&self.pool).await?;
            for col in ["organization_slug", "target_id", "scenario_id", "doc_key"] {
                let idx = format!(
                    "CREATE INDEX IF NOT EXISTS idx_{name}_{col} ON {name} ({col})"
                );
                sqlx::query(&idx).execute(&self.pool).await?;
            }
        }
        Ok(())
    }

    /// Insert or replace one document.
    pub async fn put<T: Doc>(&self, doc: &T) -> Result<()> {
        let sql = format!(
            "INSERT INTO {} (id, organization_slug, universe_id, target_id, scenario_id,
                             doc_key, status, is_test, created_at, data)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                universe_id = excluded.universe_id,
                target_id = excluded.target_id,
                scenario_id = excluded.scenario_id,
                doc_key = excluded.doc_key,
                status = excluded.status,
                is_test = excluded.is_test,
                data = excluded.data",
            T::TABLE.name()
        );
        sqlx::query(&sql)
            .bind(doc.id())
            .bind(doc.org())
            .bind(doc.universe_id())
            .bind(doc.target_id())
            .bind(doc.scenario_id())
            .bind(doc.doc_key())
            .bind(doc.status())
            .bind(doc.is_test() as i64)
            .bind(doc.created_at().to_rfc3339())
            .bind(serde_json::to_string(doc)?)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn get<T: Doc>(&self, org: &str, id: &str) -> Result<Option<T>> {
        let sql = format!(
            "SELECT data FROM {} WHERE id = ? AND organization_slug = ?",
            T::TABLE.name()
        );
        let row = sqlx::query(&sql)
            .bind(id)
            .bind(org)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => {
                let data: String = row.get("data");
                Ok(Some(serde_json::from_str(&data)?))
            }
            None => Ok(None),
        }
    }

    /// List documents newest-first.
    pub async fn list<T: Doc>(&self, org: &str, filter: &DocFilter) -> Result<Vec<T>> {
        let (where_sql, binds) = where_clause(filter);
        let mut sql = format!(
            "SELECT data FROM {} WHERE organization_slug = ?{} ORDER BY created_at DESC",
            T::TABLE.name(),
            where_sql
        );
        if let Some(limit) = filter.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
            if let Some(offset) = filter.offset {
                sql.push_str(&format!(" OFFSET {}", offset));
            }
        }
        let mut query = sqlx::query(&sql).bind(org);
        for bind in binds {
            query = match bind {
                BindVal::Text(v) => query.bind(v),
                BindVal::Int(v) => query.bind(v),
            };
        }
        let rows = query.fetch_all(&self.pool).await?;
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let data: String = row.get("data");
            out.push(serde_json::from_str(&data)?);
        }
        Ok(out)
    }

    pub async fn count<T: Doc>(&self, org: &str, filter: &DocFilter) -> Result<u64> {
        let (where_sql, binds) = where_clause(filter);
        let sql = format!(
            "SELECT COUNT(*) AS n FROM {} WHERE organization_slug = ?{}",
            T::TABLE.name(),
            where_sql
        );
        let mut query = sqlx::query(&sql).bind(org);
        for bind in binds {
            query = match bind {
                BindVal::Text(v) => query.bind(v),
                BindVal::Int(v) => query.bind(v),
            };
        }
        let row = query.fetch_one(&self.pool).await?;
        let n: i64 = row.get("n");
        Ok(n as u64)
    }

    /// Delete by id. Already gone is success.
    pub async fn delete<T: Doc>(&self, org: &str, id: &str) -> Result<()> {
        let sql = format!(
            "DELETE FROM {} WHERE id = ? AND organization_slug = ?",
            T::TABLE.name()
        );
        sqlx::query(&sql)
            .bind(id)
            .bind(org)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Delete everything matching the filter, returning the rows removed.
    /// Safe to retry.
    pub async fn delete_where(&self, table: Table, org: &str, filter: &DocFilter) -> Result<u64> {
        let (where_sql, binds) = where_clause(filter);
        let sql = format!(
            "DELETE FROM {} WHERE organization_slug = ?{}",
            table.name(),
            where_sql
        );
        let mut query = sqlx::query(&sql).bind(org);
        for bind in binds {
            query = match bind {
                BindVal::Text(v) => query.bind(v),
                BindVal::Int(v) => query.bind(v),
            };
        }
        let result = query.execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}
