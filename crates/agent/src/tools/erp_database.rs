use async_trait::async_trait;
use serde_json::{json, Map, Value};

use stockpilot_db::{ErpStore, RowMap};

use super::{decode_json_input, Tool, ToolError};

pub const NAME: &str = "erp_database";
pub const READ_ONLY_VIOLATION: &str =
    "Only SELECT queries are allowed in query mode. Use a statement for writes.";

#[derive(Clone, Debug, PartialEq)]
pub enum ErpRequest {
    Read { query: String, params: Vec<Value> },
    Write { statement: String, params: Vec<Value> },
}

impl ErpRequest {
    pub fn read(query: impl Into<String>) -> Self {
        Self::Read { query: query.into(), params: Vec::new() }
    }

    pub fn read_with(query: impl Into<String>, params: Vec<Value>) -> Self {
        Self::Read { query: query.into(), params }
    }

    pub fn write(statement: impl Into<String>, params: Vec<Value>) -> Self {
        Self::Write { statement: statement.into(), params }
    }

    /// Accepts `{"query": ...}` or `{"statement": ..., "params": [...]}`,
    /// either as a JSON value or as a string holding one.
    pub fn from_value(input: Value) -> Result<Self, ToolError> {
        let Value::Object(mut fields) = decode_json_input(NAME, input)? else {
            return Err(ToolError::invalid(NAME, "expected a JSON object"));
        };

        let params = take_params(&mut fields)?;
        match (fields.remove("query"), fields.remove("statement")) {
            (Some(_), Some(_)) => {
                Err(ToolError::invalid(NAME, "provide either `query` or `statement`, not both"))
            }
            (Some(query), None) => Ok(Self::Read { query: take_sql(query, "query")?, params }),
            (None, Some(statement)) => {
                Ok(Self::Write { statement: take_sql(statement, "statement")?, params })
            }
            (None, None) => Err(ToolError::invalid(NAME, "missing `query` or `statement`")),
        }
    }
}

fn take_params(fields: &mut Map<String, Value>) -> Result<Vec<Value>, ToolError> {
    match fields.remove("params") {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(values)) => Ok(values),
        Some(_) => Err(ToolError::invalid(NAME, "`params` must be an array")),
    }
}

fn take_sql(value: Value, field: &str) -> Result<String, ToolError> {
    match value {
        Value::String(sql) => Ok(sql),
        _ => Err(ToolError::invalid(NAME, format!("`{field}` must be a string"))),
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ErpOutcome {
    Rows(Vec<RowMap>),
    RowCount(u64),
    Error(String),
}

impl ErpOutcome {
    pub fn into_value(self) -> Value {
        match self {
            Self::Rows(rows) => Value::Array(rows.into_iter().map(Value::Object).collect()),
            Self::RowCount(rowcount) => json!({ "rowcount": rowcount, "status": "ok" }),
            Self::Error(message) => json!({ "error": message }),
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Error(message) => Some(message),
            _ => None,
        }
    }
}

pub fn is_select(sql: &str) -> bool {
    sql.trim_start()
        .get(..6)
        .map(|keyword| keyword.eq_ignore_ascii_case("select"))
        .unwrap_or(false)
}

/// Read/write access to the ERP store for the pipeline stages.
#[derive(Clone, Debug)]
pub struct ErpDatabaseTool {
    store: ErpStore,
}

impl ErpDatabaseTool {
    pub fn new(store: ErpStore) -> Self {
        Self { store }
    }

    pub async fn run(&self, request: &ErpRequest) -> ErpOutcome {
        match request {
            ErpRequest::Read { query, .. } if !is_select(query) => {
                tracing::warn!(
                    event_name = "tool.erp_database.read_rejected",
                    "non-SELECT statement rejected on read path"
                );
                ErpOutcome::Error(READ_ONLY_VIOLATION.to_string())
            }
            ErpRequest::Read { query, params } => match self.store.query_rows(query, params).await {
                Ok(rows) => ErpOutcome::Rows(rows),
                Err(error) => {
                    tracing::warn!(
                        event_name = "tool.erp_database.query_failed",
                        error = %error,
                        "erp query failed"
                    );
                    ErpOutcome::Error(format!("Query error: {error}"))
                }
            },
            ErpRequest::Write { statement, params } => {
                match self.store.execute(statement, params).await {
                    Ok(rowcount) => {
                        tracing::info!(
                            event_name = "tool.erp_database.statement_executed",
                            rowcount,
                            "erp statement executed"
                        );
                        ErpOutcome::RowCount(rowcount)
                    }
                    Err(error) => {
                        tracing::warn!(
                            event_name = "tool.erp_database.execute_failed",
                            error = %error,
                            "erp statement failed"
                        );
                        ErpOutcome::Error(format!("Execute error: {error}"))
                    }
                }
            }
        }
    }
}

#[async_trait]
impl Tool for ErpDatabaseTool {
    fn name(&self) -> &'static str {
        NAME
    }

    fn description(&self) -> &'static str {
        "Query or update the ERP database. Use {\"query\": \"SELECT ...\"} for reads and \
         {\"statement\": \"UPDATE ...\", \"params\": [...]} for writes."
    }

    async fn execute(&self, input: Value) -> Result<Value, ToolError> {
        let request = ErpRequest::from_value(input)?;
        Ok(self.run(&request).await.into_value())
    }
}
