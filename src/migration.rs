//! Apply the resource schema to PostgreSQL: schemas, then tables with key and unique constraints.
//! Relationships are checked by the engine on write and are not emitted as foreign keys.

use crate::config::{validate, FullConfig};
use crate::error::{AppError, ConfigError};
use sqlx::PgPool;
use std::collections::HashMap;

fn quote(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

fn literal(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

/// DDL for the whole config, in dependency order. Every statement is idempotent.
pub fn migration_statements(config: &FullConfig) -> Result<Vec<String>, ConfigError> {
    validate(config)?;
    let default_sid = crate::config::default_schema_id(config)?;
    let schemas_by_id: HashMap<_, _> = config.schemas.iter().map(|s| (s.id.as_str(), s)).collect();

    let mut statements = Vec::new();
    for s in &config.schemas {
        statements.push(format!("CREATE SCHEMA IF NOT EXISTS {}", quote(&s.name)));
        if let Some(comment) = &s.comment {
            statements.push(format!("COMMENT ON SCHEMA {} IS {}", quote(&s.name), literal(comment)));
        }
    }

    for t in &config.tables {
        let sid = t.schema_id.as_deref().unwrap_or(default_sid);
        let schema = schemas_by_id.get(sid).ok_or_else(|| ConfigError::MissingReference {
            kind: "schema",
            id: sid.to_string(),
        })?;
        let full_name = format!("{}.{}", quote(&schema.name), quote(&t.name));
        let pk_cols = t.primary_key.columns();

        let mut col_defs: Vec<String> = Vec::new();
        let mut col_comments: Vec<String> = Vec::new();
        for c in config.columns.iter().filter(|c| c.table_id == t.id) {
            let mut def = format!("{} {}", quote(&c.name), c.type_.ddl());
            if !c.nullable || pk_cols.contains(&c.name) {
                def.push_str(" NOT NULL");
            }
            if c.generated {
                def.push_str(" DEFAULT gen_random_uuid()");
            }
            col_defs.push(def);
            if let Some(comment) = &c.comment {
                col_comments.push(format!(
                    "COMMENT ON COLUMN {}.{} IS {}",
                    full_name,
                    quote(&c.name),
                    literal(comment)
                ));
            }
        }

        let pk: Vec<String> = pk_cols.iter().map(|s| quote(s)).collect();
        col_defs.push(format!("PRIMARY KEY ({})", pk.join(", ")));
        for u in &t.unique {
            let cols: Vec<String> = u.iter().map(|s| quote(s)).collect();
            col_defs.push(format!("UNIQUE ({})", cols.join(", ")));
        }

        statements.push(format!(
            "CREATE TABLE IF NOT EXISTS {} (\n  {}\n)",
            full_name,
            col_defs.join(",\n  ")
        ));
        if let Some(comment) = &t.comment {
            statements.push(format!("COMMENT ON TABLE {} IS {}", full_name, literal(comment)));
        }
        statements.extend(col_comments);
    }
    Ok(statements)
}

pub async fn apply_migrations(pool: &PgPool, config: &FullConfig) -> Result<(), AppError> {
    let statements = migration_statements(config)?;
    let mut tx = pool.begin().await?;
    for sql in &statements {
        tracing::debug!(sql = %sql, "migration");
        sqlx::query(sql).execute(&mut *tx).await?;
    }
    tx.commit().await?;
    tracing::info!(statements = statements.len(), "schema applied");
    Ok(())
}
