//! The SQL tools handed to the agent

use crate::config::{statement_count, DatabaseToolConfig, SqlOperation};
use crate::database::SqlDatabase;
use sqlagent_core::{Error, Result, Tool, ToolResponse};
use sqlagent_tool::{FunctionTool, ToolSchema};
use std::sync::Arc;
use std::time::Duration;

pub const LIST_TABLES_TOOL: &str = "sql_db_list_tables";
pub const SCHEMA_TOOL: &str = "sql_db_schema";
pub const QUERY_TOOL: &str = "sql_db_query";

/// Create the list-tables, schema and query tools over `db`, in that order
pub fn create_sql_tools(
    db: Arc<SqlDatabase>,
    config: &DatabaseToolConfig,
) -> Result<Vec<Arc<dyn Tool>>> {
    let tools: Vec<Arc<dyn Tool>> = vec![
        Arc::new(create_list_tables_tool(db.clone())?),
        Arc::new(create_schema_tool(db.clone())?),
        Arc::new(create_query_tool(db, config.clone())?),
    ];
    Ok(tools)
}

/// Failures go back to the model as data so it can correct itself
fn error_response(e: impl std::fmt::Display) -> ToolResponse {
    ToolResponse {
        result: serde_json::json!({ "error": format!("Error: {}", e) }),
    }
}

fn create_list_tables_tool(db: Arc<SqlDatabase>) -> Result<FunctionTool> {
    FunctionTool::builder()
        .name(LIST_TABLES_TOOL)
        .description(
            "Input is an empty string, output is a comma-separated list of tables in the database.",
        )
        .schema(ToolSchema::new().build())
        .execute(move |ctx, _params| {
            let db = db.clone();
            async move {
                tracing::debug!(
                    invocation_id = %ctx.invocation_id(),
                    call_id = %ctx.call_id(),
                    database = %db.name(),
                    "Listing tables"
                );

                Ok(match db.usable_table_names().await {
                    Ok(tables) => ToolResponse {
                        result: serde_json::json!({ "tables": tables.join(", ") }),
                    },
                    Err(e) => error_response(e),
                })
            }
        })
        .build()
}

fn create_schema_tool(db: Arc<SqlDatabase>) -> Result<FunctionTool> {
    let schema = ToolSchema::new()
        .property(
            "table_names",
            "string",
            "A comma-separated list of the table names for which to return the schema. Example input: 'table1, table2, table3'",
        )
        .required("table_names")
        .build();

    FunctionTool::builder()
        .name(SCHEMA_TOOL)
        .description(
            "Input to this tool is a comma-separated list of tables, output is the schema and sample rows for those tables. \
             Be sure that the tables actually exist by calling sql_db_list_tables first! \
             Example Input: table1, table2, table3",
        )
        .schema(schema)
        .execute(move |ctx, params| {
            let db = db.clone();
            async move {
                let Some(table_names) = params["table_names"].as_str() else {
                    return Ok(error_response("missing 'table_names' parameter"));
                };
                let tables: Vec<&str> = table_names
                    .split(',')
                    .map(|t| t.trim().trim_matches(|c| c == '\'' || c == '"' || c == '`'))
                    .filter(|t| !t.is_empty())
                    .collect();

                tracing::debug!(
                    invocation_id = %ctx.invocation_id(),
                    call_id = %ctx.call_id(),
                    tables = ?tables,
                    "Fetching table schema"
                );

                Ok(match db.table_info(&tables).await {
                    Ok(schema) => ToolResponse {
                        result: serde_json::json!({ "schema": schema }),
                    },
                    Err(e) => error_response(e),
                })
            }
        })
        .build()
}

fn create_query_tool(db: Arc<SqlDatabase>, config: DatabaseToolConfig) -> Result<FunctionTool> {
    let schema = ToolSchema::new()
        .property("query", "string", "A detailed and correct SQL query.")
        .required("query")
        .build();

    FunctionTool::builder()
        .name(QUERY_TOOL)
        .description(
            "Input to this tool is a detailed and correct SQL query, output is a result from the database. \
             If the query is not correct, an error message will be returned. \
             If an error is returned, rewrite the query, check the query, and try again. \
             If you encounter an issue with Unknown column 'xxxx' in 'field list', use sql_db_schema to query the correct table fields.",
        )
        .schema(schema)
        .execute(move |ctx, params| {
            let db = db.clone();
            let config = config.clone();
            async move {
                let Some(sql) = params["query"].as_str() else {
                    return Ok(error_response("missing 'query' parameter"));
                };

                if statement_count(sql) != 1 {
                    return Ok(error_response("exactly one SQL statement must be provided"));
                }
                let operation = SqlOperation::classify(sql);
                if !config.is_allowed(operation) {
                    tracing::warn!(
                        invocation_id = %ctx.invocation_id(),
                        call_id = %ctx.call_id(),
                        sql = %sql,
                        operation = ?operation,
                        "Rejected non-read query"
                    );
                    return Ok(error_response(
                        "only read-only queries are allowed; DML and DDL statements are rejected",
                    ));
                }

                tracing::debug!(
                    invocation_id = %ctx.invocation_id(),
                    call_id = %ctx.call_id(),
                    sql = %sql,
                    "Executing query"
                );

                let timeout = Duration::from_secs(config.timeout_secs);
                let outcome = tokio::time::timeout(timeout, db.run(sql, config.max_rows))
                    .await
                    .map_err(|_| {
                        Error::database(format!("query timed out after {}s", config.timeout_secs))
                    })
                    .and_then(|result| result);

                Ok(match outcome {
                    Ok(result) => ToolResponse {
                        result: result.to_json(),
                    },
                    Err(e) => error_response(e),
                })
            }
        })
        .build()
}
