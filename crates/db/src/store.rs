use std::path::{Path, PathBuf};

use serde_json::{Map, Number, Value};
use sqlx::migrate::MigrateError;
use sqlx::query::Query;
use sqlx::sqlite::{SqliteArguments, SqliteConnectOptions, SqliteRow};
use sqlx::{Column, Row, Sqlite, TypeInfo, ValueRef};
use thiserror::Error;

use stockpilot_core::config::DatabaseConfig;

use crate::connection::{self, close_quietly};
use crate::migrations::{self, SCHEMA_OBJECTS};

pub type RowMap = Map<String, Value>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid database url `{url}`: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("could not create database directory `{path}`: {source}")]
    CreateDirectory { path: PathBuf, source: std::io::Error },
    #[error("sqlite error: {0}")]
    Sqlite(#[from] sqlx::Error),
    #[error("schema migration failed: {0}")]
    Migration(#[from] MigrateError),
}

/// Handle on the ERP database file. Holds connection options only; every
/// call opens a fresh connection and closes it before returning.
#[derive(Clone, Debug)]
pub struct ErpStore {
    options: SqliteConnectOptions,
}

impl ErpStore {
    /// Creates the parent directory and the file if needed, then applies the
    /// embedded schema.
    pub async fn open(database_url: &str, timeout_secs: u64) -> Result<Self, StoreError> {
        if !database_url.starts_with("sqlite:") {
            return Err(StoreError::InvalidUrl {
                url: database_url.to_string(),
                reason: "expected a sqlite: url".to_string(),
            });
        }
        let options = connection::connect_options(database_url, timeout_secs).map_err(|error| {
            StoreError::InvalidUrl { url: database_url.to_string(), reason: error.to_string() }
        })?;

        if let Some(parent) = connection::database_path(&options).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|source| {
                    StoreError::CreateDirectory { path: parent.to_path_buf(), source }
                })?;
            }
        }

        let store = Self { options };
        store.ensure_schema().await?;
        tracing::info!(
            event_name = "store.schema.ensured",
            path = %store.path().display(),
            "ERP schema ensured"
        );
        Ok(store)
    }

    pub async fn from_config(config: &DatabaseConfig) -> Result<Self, StoreError> {
        Self::open(&config.url, config.timeout_secs).await
    }

    pub fn path(&self) -> &Path {
        connection::database_path(&self.options)
    }

    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        let mut conn = connection::open(&self.options).await?;
        let result = migrations::run_pending(&mut conn).await;
        close_quietly(conn).await;
        result.map_err(StoreError::from)
    }

    /// Runs a read on a read-only connection and returns rows as ordered
    /// column-name maps.
    pub async fn query_rows(&self, sql: &str, params: &[Value]) -> Result<Vec<RowMap>, StoreError> {
        let mut conn = connection::open_read_only(&self.options).await?;
        let result = bind_params(sqlx::query(sql), params).fetch_all(&mut conn).await;
        close_quietly(conn).await;

        result?.iter().map(row_to_map).collect::<Result<Vec<_>, _>>().map_err(StoreError::from)
    }

    /// Runs a single statement in autocommit mode and returns the number of
    /// affected rows.
    pub async fn execute(&self, sql: &str, params: &[Value]) -> Result<u64, StoreError> {
        let mut conn = connection::open(&self.options).await?;
        let result = bind_params(sqlx::query(sql), params).execute(&mut conn).await;
        close_quietly(conn).await;

        Ok(result?.rows_affected())
    }

    /// Names from [`SCHEMA_OBJECTS`] that are absent from the database file.
    pub async fn missing_schema_objects(&self) -> Result<Vec<String>, StoreError> {
        let rows = self
            .query_rows(
                "SELECT name FROM sqlite_master WHERE type IN ('table', 'index')",
                &[],
            )
            .await?;
        let present: Vec<&str> =
            rows.iter().filter_map(|row| row.get("name").and_then(Value::as_str)).collect();

        Ok(SCHEMA_OBJECTS
            .iter()
            .filter(|name| !present.contains(name))
            .map(|name| name.to_string())
            .collect())
    }
}

fn bind_params<'q>(
    mut query: Query<'q, Sqlite, SqliteArguments<'q>>,
    params: &[Value],
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    for param in params {
        query = match param {
            Value::Null => query.bind(None::<String>),
            Value::Bool(flag) => query.bind(*flag),
            Value::Number(number) => match number.as_i64() {
                Some(integer) => query.bind(integer),
                None => query.bind(number.as_f64().unwrap_or_default()),
            },
            Value::String(text) => query.bind(text.clone()),
            nested @ (Value::Array(_) | Value::Object(_)) => query.bind(nested.to_string()),
        };
    }
    query
}

fn row_to_map(row: &SqliteRow) -> Result<RowMap, sqlx::Error> {
    let mut map = Map::with_capacity(row.len());
    for (index, column) in row.columns().iter().enumerate() {
        let raw = row.try_get_raw(index)?;
        let value = if raw.is_null() {
            Value::Null
        } else {
            let storage_class = raw.type_info().name().to_ascii_uppercase();
            match storage_class.as_str() {
                "INTEGER" | "BIGINT" | "INT4" | "INT8" | "BOOLEAN" => {
                    Value::from(row.try_get_unchecked::<i64, _>(index)?)
                }
                "REAL" | "FLOAT" | "DOUBLE" | "NUMERIC" => {
                    Number::from_f64(row.try_get_unchecked::<f64, _>(index)?)
                        .map(Value::Number)
                        .unwrap_or(Value::Null)
                }
                "BLOB" => {
                    let bytes = row.try_get_unchecked::<Vec<u8>, _>(index)?;
                    Value::String(String::from_utf8_lossy(&bytes).into_owned())
                }
                _ => Value::String(row.try_get_unchecked::<String, _>(index)?),
            }
        };
        map.insert(column.name().to_string(), value);
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::ErpStore;

    async fn temp_store() -> (tempfile::TempDir, ErpStore) {
        let dir = tempfile::tempdir().expect("tempdir");
        let url = format!("sqlite://{}", dir.path().join("nested/erp.db").display());
        let store = ErpStore::open(&url, 5).await.expect("open store");
        (dir, store)
    }

    #[tokio::test]
    async fn open_creates_missing_parent_directory() {
        let (dir, store) = temp_store().await;

        assert!(dir.path().join("nested").is_dir());
        assert!(store.path().exists());
        assert!(store.missing_schema_objects().await.expect("schema check").is_empty());
    }

    #[tokio::test]
    async fn rows_keep_column_order_and_storage_types() {
        let (_dir, store) = temp_store().await;
        store
            .execute(
                "INSERT INTO products (sku, name, price, stock_quantity) VALUES (?, ?, ?, ?)",
                &[json!("widget_a"), json!("Widget A"), json!(32.99), json!(5)],
            )
            .await
            .expect("insert");

        let rows = store
            .query_rows(
                "SELECT sku, price, stock_quantity, min_stock_level, NULL AS nothing, \
                 X'6869' AS raw FROM products",
                &[],
            )
            .await
            .expect("read");

        assert_eq!(rows.len(), 1);
        let columns: Vec<&str> = rows[0].keys().map(String::as_str).collect();
        assert_eq!(columns, vec!["sku", "price", "stock_quantity", "min_stock_level", "nothing", "raw"]);
        assert_eq!(rows[0]["price"], json!(32.99));
        assert_eq!(rows[0]["min_stock_level"], json!(10));
        assert_eq!(rows[0]["nothing"], Value::Null);
        assert_eq!(rows[0]["raw"], json!("hi"));
    }

    #[tokio::test]
    async fn execute_reports_affected_rows() {
        let (_dir, store) = temp_store().await;
        for (sku, price) in [("a", 10.0), ("b", 20.0), ("c", 30.0)] {
            store
                .execute(
                    "INSERT INTO products (sku, name, price) VALUES (?, ?, ?)",
                    &[json!(sku), json!(sku.to_uppercase()), json!(price)],
                )
                .await
                .expect("insert");
        }

        let affected = store
            .execute("UPDATE products SET stock_quantity = ? WHERE price > ?", &[json!(7), json!(15)])
            .await
            .expect("update");
        let restocked = store
            .query_rows("SELECT COUNT(*) AS n FROM products WHERE stock_quantity = 7", &[])
            .await
            .expect("count");

        assert_eq!(affected, 2);
        assert_eq!(restocked[0]["n"], json!(affected));
    }

    #[tokio::test]
    async fn read_only_connection_refuses_mutation() {
        let (_dir, store) = temp_store().await;

        let error = store
            .query_rows("INSERT INTO products (sku, name, price) VALUES ('x', 'X', 1.0)", &[])
            .await
            .expect_err("read path must not write");

        assert!(error.to_string().to_ascii_lowercase().contains("readonly")
            || error.to_string().to_ascii_lowercase().contains("read-only"));
    }

    #[tokio::test]
    async fn invalid_url_is_reported() {
        let error = ErpStore::open("postgres://localhost/erp", 5).await.expect_err("not sqlite");

        assert!(error.to_string().contains("postgres://localhost/erp"));
    }
}
