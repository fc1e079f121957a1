//! PostgreSQL backend over a `PgPool`. Each call acquires a pooled connection for one statement.

use super::Store;
use crate::config::{FieldType, ResolvedEntity, SortSpec};
use crate::error::{AppError, ConfigError};
use crate::record::{Record, RecordKey};
use crate::sql::{self, PgBindValue, QueryBuf};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::PgRow;
use sqlx::{ConnectOptions, PgPool, Row};
use std::str::FromStr;

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        PgStore { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn query_optional(&self, entity: &ResolvedEntity, q: &QueryBuf) -> Result<Option<Record>, AppError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let mut query = sqlx::query(&q.sql);
        for p in &q.params {
            query = query.bind(PgBindValue::from_json(p));
        }
        let row = query.fetch_optional(&self.pool).await.map_err(map_db_error)?;
        row.map(|r| row_to_record(entity, &r)).transpose()
    }

    async fn query_many(&self, entity: &ResolvedEntity, q: &QueryBuf) -> Result<Vec<Record>, AppError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let mut query = sqlx::query(&q.sql);
        for p in &q.params {
            query = query.bind(PgBindValue::from_json(p));
        }
        let rows = query.fetch_all(&self.pool).await.map_err(map_db_error)?;
        rows.iter().map(|r| row_to_record(entity, r)).collect()
    }
}

#[async_trait]
impl Store for PgStore {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    async fn ping(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1").fetch_optional(&self.pool).await?;
        Ok(())
    }

    async fn list(
        &self,
        entity: &ResolvedEntity,
        sort: Option<&SortSpec>,
        skip: u64,
        limit: u64,
    ) -> Result<Vec<Record>, AppError> {
        let q = sql::select_list(entity, sort, skip, limit);
        self.query_many(entity, &q).await
    }

    async fn fetch(&self, entity: &ResolvedEntity, key: &RecordKey) -> Result<Option<Record>, AppError> {
        let q = sql::select_by_key(entity, key);
        self.query_optional(entity, &q).await
    }

    async fn find_by(
        &self,
        entity: &ResolvedEntity,
        column: &str,
        value: &Value,
    ) -> Result<Option<Record>, AppError> {
        let q = sql::select_by_column(entity, column, value);
        self.query_optional(entity, &q).await
    }

    async fn insert(&self, entity: &ResolvedEntity, record: &Record) -> Result<Record, AppError> {
        let q = sql::insert(entity, record);
        self.query_optional(entity, &q)
            .await?
            .ok_or(AppError::Db(sqlx::Error::RowNotFound))
    }

    async fn update(
        &self,
        entity: &ResolvedEntity,
        key: &RecordKey,
        changes: &Record,
    ) -> Result<Option<Record>, AppError> {
        let q = sql::update(entity, key, changes);
        self.query_optional(entity, &q).await
    }

    async fn delete(&self, entity: &ResolvedEntity, key: &RecordKey) -> Result<Option<Record>, AppError> {
        let q = sql::delete(entity, key);
        self.query_optional(entity, &q).await
    }
}

/// Unique violations become `Conflict`, data and not-null errors `InvalidInput`; anything else stays a storage fault.
fn map_db_error(e: sqlx::Error) -> AppError {
    let code = e
        .as_database_error()
        .and_then(|d| d.code().map(|c| c.into_owned()));
    match code.as_deref() {
        Some("23505") => AppError::Conflict(db_message(&e)),
        Some("23502") => AppError::InvalidInput(db_message(&e)),
        Some(c) if c.starts_with("22") => AppError::InvalidInput(db_message(&e)),
        _ => AppError::Db(e),
    }
}

fn db_message(e: &sqlx::Error) -> String {
    e.as_database_error()
        .map(|d| d.message().to_string())
        .unwrap_or_else(|| e.to_string())
}

fn row_to_record(entity: &ResolvedEntity, row: &PgRow) -> Result<Record, AppError> {
    let mut map = Record::new();
    for col in &entity.columns {
        let name = col.name.as_str();
        let v = match col.field_type {
            FieldType::Int => row.try_get::<Option<i32>, _>(name)?.map(|n| Value::Number(n.into())),
            FieldType::BigInt => row.try_get::<Option<i64>, _>(name)?.map(|n| Value::Number(n.into())),
            FieldType::Text => row.try_get::<Option<String>, _>(name)?.map(Value::String),
            FieldType::Uuid => row
                .try_get::<Option<uuid::Uuid>, _>(name)?
                .map(|u| Value::String(u.to_string())),
            FieldType::Date => row
                .try_get::<Option<chrono::NaiveDate>, _>(name)?
                .map(|d| Value::String(d.format("%Y-%m-%d").to_string())),
        };
        map.insert(name.to_string(), v.unwrap_or(Value::Null));
    }
    Ok(map)
}

/// Create the target database when it does not exist yet (connects to the `postgres` maintenance database).
pub async fn ensure_database_exists(database_url: &str) -> Result<(), AppError> {
    let (admin_url, db_name) = parse_db_name_from_url(database_url)?;
    if db_name.is_empty() || db_name == "postgres" {
        return Ok(());
    }
    let opts = sqlx::postgres::PgConnectOptions::from_str(&admin_url)
        .map_err(|e| ConfigError::Validation(format!("invalid DATABASE_URL: {}", e)))?;
    let mut conn: sqlx::PgConnection = opts.connect().await?;
    let exists: (bool,) = sqlx::query_as("SELECT EXISTS(SELECT 1 FROM pg_database WHERE datname = $1)")
        .bind(&db_name)
        .fetch_one(&mut conn)
        .await?;
    if !exists.0 {
        tracing::info!(database = %db_name, "creating database");
        sqlx::query(&format!("CREATE DATABASE {}", quote_ident(&db_name)))
            .execute(&mut conn)
            .await?;
    }
    Ok(())
}

/// Split a connection URL into the maintenance-database URL and the target database name.
/// A URL without a database path yields an empty name.
fn parse_db_name_from_url(url: &str) -> Result<(String, String), ConfigError> {
    let authority_start = url
        .find("://")
        .map(|i| i + 3)
        .ok_or_else(|| ConfigError::Validation("DATABASE_URL must look like postgres://host/db".into()))?;
    let (head, query) = match url.split_once('?') {
        Some((head, q)) => (head, format!("?{}", q)),
        None => (url, String::new()),
    };
    let rest = head.get(authority_start..).unwrap_or("");
    match rest.find('/') {
        Some(i) => {
            let path_start = authority_start + i + 1;
            let db_name = head.get(path_start..).unwrap_or("").trim();
            let base = head.get(..path_start).unwrap_or(head);
            Ok((format!("{}postgres{}", base, query), db_name.to_string()))
        }
        None => Ok((format!("{}/postgres{}", head, query), String::new())),
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
