//! Read-only SQLite handle

use crate::types::{ColumnInfo, QueryResult, TableInfo};
use futures::TryStreamExt;
use sqlagent_core::{Error, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Row, TypeInfo, ValueRef};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Sample rows appended to each table's schema
const SAMPLE_ROWS_IN_TABLE_INFO: usize = 3;

/// Query result text longer than this is cut at a word boundary
const MAX_STRING_LENGTH: usize = 300;

/// Sample row cells are cut to this many characters
const SAMPLE_CELL_LENGTH: usize = 100;

/// A SQLite database opened read-only
#[derive(Debug, Clone)]
pub struct SqlDatabase {
    pool: SqlitePool,
    path: PathBuf,
}

impl SqlDatabase {
    /// Open the SQLite file at `path` read-only
    ///
    /// Fails when the file is missing or is not a SQLite database.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.is_file() {
            return Err(Error::database(format!(
                "Database file not found: {}",
                path.display()
            )));
        }

        let options = SqliteConnectOptions::new()
            .filename(&path)
            .read_only(true)
            .create_if_missing(false);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(30))
            .connect_with(options)
            .await
            .map_err(|e| {
                Error::database(format!("Failed to open {}: {}", path.display(), e))
            })?;

        // Forces SQLite to read the header; non-database files fail here
        sqlx::query("SELECT count(*) FROM sqlite_master")
            .fetch_one(&pool)
            .await
            .map_err(|e| {
                Error::database(format!("{} is not a SQLite database: {}", path.display(), e))
            })?;

        tracing::debug!(path = %path.display(), "Opened SQLite database read-only");
        Ok(Self { pool, path })
    }

    /// Open from a `sqlite:///<path>` URI
    pub async fn open_uri(uri: &str) -> Result<Self> {
        let path = uri
            .strip_prefix("sqlite:///")
            .ok_or_else(|| Error::database(format!("Unsupported database URI: {}", uri)))?;
        Self::open(path).await
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name of the database, as shown to users
    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Names of user tables, sorted
    pub async fn usable_table_names(&self) -> Result<Vec<String>> {
        let rows = sqlx::query(
            r#"
            SELECT name
            FROM sqlite_master
            WHERE type = 'table'
            AND name NOT LIKE 'sqlite_%'
            ORDER BY name
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::database(format!("Failed to list tables: {}", e)))?;

        rows.iter()
            .map(|row| {
                row.try_get::<String, _>("name")
                    .map_err(|e| Error::database(e.to_string()))
            })
            .collect()
    }

    /// Columns and `CREATE` statement of one table
    pub async fn describe_table(&self, table: &str) -> Result<TableInfo> {
        let create_sql: String = sqlx::query_scalar(
            "SELECT sql FROM sqlite_master WHERE type = 'table' AND name = ?",
        )
        .bind(table)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| Error::database(format!("Failed to describe table: {}", e)))?
        .ok_or_else(|| Error::database(format!("no such table: {}", table)))?;

        let rows = sqlx::query(&format!("PRAGMA table_info({})", quote_ident(table)))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| Error::database(format!("Failed to describe table: {}", e)))?;

        let columns = rows
            .iter()
            .map(|row| ColumnInfo {
                name: row.try_get("name").unwrap_or_default(),
                data_type: row.try_get("type").unwrap_or_default(),
                nullable: row.try_get::<i64, _>("notnull").unwrap_or(0) == 0,
                default_value: row.try_get("dflt_value").ok().flatten(),
                primary_key: row.try_get::<i64, _>("pk").unwrap_or(0) > 0,
            })
            .collect();

        Ok(TableInfo {
            name: table.to_string(),
            create_sql: create_sql.trim().to_string(),
            columns,
        })
    }

    /// Schema text for the given tables: each `CREATE` statement followed by
    /// a comment block with a few sample rows
    pub async fn table_info<S: AsRef<str>>(&self, table_names: &[S]) -> Result<String> {
        let usable = self.usable_table_names().await?;

        let requested: Vec<&str> = table_names
            .iter()
            .map(|t| t.as_ref().trim())
            .filter(|t| !t.is_empty())
            .collect();
        let missing: Vec<&str> = requested
            .iter()
            .copied()
            .filter(|t| !usable.iter().any(|u| u == t))
            .collect();
        if !missing.is_empty() {
            let names: Vec<String> = missing.iter().map(|t| format!("'{}'", t)).collect();
            return Err(Error::database(format!(
                "table_names {{{}}} not found in database",
                names.join(", ")
            )));
        }

        let tables: Vec<&str> = if requested.is_empty() {
            usable.iter().map(String::as_str).collect()
        } else {
            requested
        };

        let mut sections = Vec::with_capacity(tables.len());
        for table in tables {
            let info = self.describe_table(table).await?;
            let samples = self.sample_rows(&info).await?;
            sections.push(format!("{}\n\n{}", info.create_sql, samples));
        }

        Ok(sections.join("\n\n"))
    }

    async fn sample_rows(&self, info: &TableInfo) -> Result<String> {
        let sql = format!(
            "SELECT * FROM {} LIMIT {}",
            quote_ident(&info.name),
            SAMPLE_ROWS_IN_TABLE_INFO
        );
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| Error::database(format!("Failed to sample {}: {}", info.name, e)))?;

        let header: Vec<&str> = info.columns.iter().map(|c| c.name.as_str()).collect();
        let mut lines = vec![header.join("\t")];
        for row in &rows {
            let cells: Vec<String> = (0..row.columns().len())
                .map(|i| {
                    display_cell(&decode_cell(row, i))
                        .chars()
                        .take(SAMPLE_CELL_LENGTH)
                        .collect()
                })
                .collect();
            lines.push(cells.join("\t"));
        }

        Ok(format!(
            "/*\n{} rows from {} table:\n{}\n*/",
            SAMPLE_ROWS_IN_TABLE_INFO,
            info.name,
            lines.join("\n")
        ))
    }

    /// Run a statement and collect at most `max_rows` rows
    pub async fn run(&self, sql: &str, max_rows: usize) -> Result<QueryResult> {
        let mut stream = sqlx::query(sql).fetch(&self.pool);
        let mut result = QueryResult::default();

        while let Some(row) = stream
            .try_next()
            .await
            .map_err(|e| Error::database(e.to_string()))?
        {
            if result.columns.is_empty() {
                result.columns = row.columns().iter().map(|c| c.name().to_string()).collect();
            }
            if result.rows.len() >= max_rows {
                result.truncated = true;
                break;
            }
            result.rows.push(
                (0..row.columns().len())
                    .map(|i| match decode_cell(&row, i) {
                        serde_json::Value::String(text) => {
                            serde_json::Value::String(truncate_word(&text, MAX_STRING_LENGTH))
                        }
                        other => other,
                    })
                    .collect(),
            );
        }

        Ok(result)
    }
}

/// Double-quote an identifier for SQLite
pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Render one cell as JSON using the value's runtime storage class
fn decode_cell(row: &SqliteRow, index: usize) -> serde_json::Value {
    use serde_json::Value;

    let Ok(raw) = row.try_get_raw(index) else {
        return Value::Null;
    };
    if raw.is_null() {
        return Value::Null;
    }
    let storage = raw.type_info().name().to_uppercase();

    if storage == "BLOB" {
        return match row.try_get::<Vec<u8>, _>(index) {
            Ok(bytes) => Value::String(format!("<blob {} bytes>", bytes.len())),
            Err(_) => Value::Null,
        };
    }
    if storage == "REAL" {
        if let Ok(v) = row.try_get::<f64, _>(index) {
            return serde_json::json!(v);
        }
    }
    if let Ok(v) = row.try_get::<i64, _>(index) {
        return Value::from(v);
    }
    if let Ok(v) = row.try_get::<f64, _>(index) {
        return serde_json::json!(v);
    }
    if let Ok(v) = row.try_get::<String, _>(index) {
        return Value::String(v);
    }
    Value::Null
}

fn display_cell(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => "None".to_string(),
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Cut `text` to at most `max_len` characters at a word boundary, adding `...`
pub(crate) fn truncate_word(text: &str, max_len: usize) -> String {
    const SUFFIX: &str = "...";

    if text.chars().count() <= max_len {
        return text.to_string();
    }

    let keep: String = text.chars().take(max_len.saturating_sub(SUFFIX.len())).collect();
    let cut = match keep.rfind(' ') {
        Some(pos) if pos > 0 => &keep[..pos],
        _ => keep.as_str(),
    };
    format!("{}{}", cut, SUFFIX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqliteConnectOptions;
    use sqlx::{Connection, SqliteConnection};
    use tempfile::TempDir;

    async fn chinook_like(dir: &TempDir) -> PathBuf {
        let path = dir.path().join("music.db");
        let options = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true);
        let mut conn = SqliteConnection::connect_with(&options).await.unwrap();

        for sql in [
            "CREATE TABLE artists (ArtistId INTEGER PRIMARY KEY, Name TEXT)",
            "CREATE TABLE albums (AlbumId INTEGER PRIMARY KEY, Title TEXT NOT NULL, ArtistId INTEGER, Price REAL, Cover BLOB)",
            "INSERT INTO artists VALUES (1, 'AC/DC'), (2, 'Accept'), (3, 'Aerosmith'), (4, 'Alanis Morissette')",
            "INSERT INTO albums VALUES (1, 'For Those About To Rock We Salute You', 1, 9.99, x'0102'), (2, 'Balls to the Wall', 2, NULL, NULL)",
        ] {
            sqlx::query(sql).execute(&mut conn).await.unwrap();
        }
        conn.close().await.unwrap();
        path
    }

    #[tokio::test]
    async fn test_open_missing_file_fails() {
        let dir = TempDir::new().unwrap();
        let err = SqlDatabase::open(dir.path().join("absent.db")).await.unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[tokio::test]
    async fn test_open_rejects_non_database() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("notes.db");
        std::fs::write(&path, b"this is plainly not a sqlite file, it is just some text padding out the header").unwrap();

        assert!(SqlDatabase::open(&path).await.is_err());
    }

    #[tokio::test]
    async fn test_usable_table_names_sorted() {
        let dir = TempDir::new().unwrap();
        let db = SqlDatabase::open(chinook_like(&dir).await).await.unwrap();

        assert_eq!(db.usable_table_names().await.unwrap(), vec!["albums", "artists"]);
        assert_eq!(db.name(), "music.db");
    }

    #[tokio::test]
    async fn test_open_uri() {
        let dir = TempDir::new().unwrap();
        let path = chinook_like(&dir).await;
        let uri = format!("sqlite:///{}", path.display());

        let db = SqlDatabase::open_uri(&uri).await.unwrap();
        assert_eq!(db.path(), path.as_path());
        assert!(SqlDatabase::open_uri("postgres://localhost/db").await.is_err());
    }

    #[tokio::test]
    async fn test_table_info_includes_create_and_samples() {
        let dir = TempDir::new().unwrap();
        let db = SqlDatabase::open(chinook_like(&dir).await).await.unwrap();

        let info = db.table_info(&["artists"]).await.unwrap();

        assert!(info.starts_with("CREATE TABLE artists"));
        assert!(info.contains("/*\n3 rows from artists table:\nArtistId\tName\n1\tAC/DC\n2\tAccept\n3\tAerosmith\n*/"));
        assert!(!info.contains("Alanis"));
    }

    #[tokio::test]
    async fn test_table_info_unknown_table() {
        let dir = TempDir::new().unwrap();
        let db = SqlDatabase::open(chinook_like(&dir).await).await.unwrap();

        let err = db.table_info(&["albums", "tracks"]).await.unwrap_err();
        assert!(err.to_string().contains("table_names {'tracks'} not found in database"));
    }

    #[tokio::test]
    async fn test_run_decodes_storage_classes() {
        let dir = TempDir::new().unwrap();
        let db = SqlDatabase::open(chinook_like(&dir).await).await.unwrap();

        let result = db
            .run("SELECT AlbumId, Title, Price, Cover FROM albums ORDER BY AlbumId", 10)
            .await
            .unwrap();

        assert_eq!(result.columns, vec!["AlbumId", "Title", "Price", "Cover"]);
        assert_eq!(result.rows[0][0], serde_json::json!(1));
        assert_eq!(result.rows[0][2], serde_json::json!(9.99));
        assert_eq!(result.rows[0][3], serde_json::json!("<blob 2 bytes>"));
        assert_eq!(result.rows[1][2], serde_json::Value::Null);
        assert!(!result.truncated);
    }

    #[tokio::test]
    async fn test_run_caps_rows() {
        let dir = TempDir::new().unwrap();
        let db = SqlDatabase::open(chinook_like(&dir).await).await.unwrap();

        let result = db.run("SELECT Name FROM artists", 2).await.unwrap();
        assert_eq!(result.row_count(), 2);
        assert!(result.truncated);
    }

    #[tokio::test]
    async fn test_handle_is_read_only() {
        let dir = TempDir::new().unwrap();
        let db = SqlDatabase::open(chinook_like(&dir).await).await.unwrap();

        assert!(db.run("DELETE FROM artists", 10).await.is_err());
        let result = db.run("SELECT count(*) AS n FROM artists", 10).await.unwrap();
        assert_eq!(result.rows[0][0], serde_json::json!(4));
    }

    #[test]
    fn test_truncate_word() {
        assert_eq!(truncate_word("short", 100), "short");
        assert_eq!(truncate_word("the quick brown fox jumps", 16), "the quick...");
        assert_eq!(truncate_word("abcdefghij", 6), "abc...");
    }

    #[tokio::test]
    async fn test_long_text_is_shortened() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("notes.db");
        let note = "a".repeat(150);
        let csv = format!("id,note\n1,{}\n", note);
        crate::ingest::csv_to_sqlite(csv.as_bytes(), &path, "notes").await.unwrap();
        let db = SqlDatabase::open(&path).await.unwrap();

        let info = db.table_info(&["notes"]).await.unwrap();
        assert!(info.contains(&format!("\n1\t{}\n*/", "a".repeat(100))));

        let result = db
            .run("SELECT replace(hex(zeroblob(100)), '00', 'word ') AS text", 10)
            .await
            .unwrap();
        let text = result.rows[0][0].as_str().unwrap();
        assert!(text.chars().count() <= 300);
        assert!(text.ends_with("word..."));
    }
}
